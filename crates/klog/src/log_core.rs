//! 日志系统核心实现
//!
//! 所有日志状态封装在 [`LogCore`] 中，可以独立实例化用于测试，
//! 也可以作为全局单例安装到 `log` 门面。

use std::collections::VecDeque;
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::{LevelFilter, Log, Metadata, Record};
use sync::SpinLock;

use crate::config::{DEFAULT_CONSOLE_LEVEL, DEFAULT_LOG_LEVEL, LOG_BUFFER_CAPACITY};
use crate::entry::{LogEntry, format_log_entry};

/// 日志输出 trait
///
/// 实现此 trait 以替换控制台输出（默认写 stderr）。
pub trait LogOutput: Send + Sync {
    /// 输出一行文本（不含换行）
    fn write_line(&self, line: &str);
}

/// 核心日志系统
///
/// 封装环形缓冲区和过滤状态。级别以 `LevelFilter as usize` 原子存储。
pub struct LogCore {
    buffer: SpinLock<VecDeque<LogEntry>>,
    dropped: AtomicUsize,
    global_level: AtomicUsize,
    console_level: AtomicUsize,
    output: SpinLock<Option<Box<dyn LogOutput>>>,
}

fn filter_from_usize(v: usize) -> LevelFilter {
    match v {
        0 => LevelFilter::Off,
        1 => LevelFilter::Error,
        2 => LevelFilter::Warn,
        3 => LevelFilter::Info,
        4 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}

impl LogCore {
    /// 使用默认日志级别创建实例（const，可用于静态初始化）
    pub const fn default() -> Self {
        Self {
            buffer: SpinLock::new(VecDeque::new()),
            dropped: AtomicUsize::new(0),
            global_level: AtomicUsize::new(DEFAULT_LOG_LEVEL as usize),
            console_level: AtomicUsize::new(DEFAULT_CONSOLE_LEVEL as usize),
            output: SpinLock::new(None),
        }
    }

    /// 使用自定义日志级别创建实例
    ///
    /// * `global_level` - 日志被缓冲的最低级别
    /// * `console_level` - 日志被打印到控制台的最低级别
    pub fn new(global_level: LevelFilter, console_level: LevelFilter) -> Self {
        let core = Self::default();
        core.set_global_level(global_level);
        core.set_console_level(console_level);
        core
    }

    /// 设置全局日志级别阈值
    pub fn set_global_level(&self, level: LevelFilter) {
        self.global_level.store(level as usize, Ordering::Release);
    }

    /// 获取当前全局日志级别
    pub fn global_level(&self) -> LevelFilter {
        filter_from_usize(self.global_level.load(Ordering::Acquire))
    }

    /// 设置控制台输出级别阈值
    pub fn set_console_level(&self, level: LevelFilter) {
        self.console_level.store(level as usize, Ordering::Release);
    }

    /// 获取当前控制台输出级别
    pub fn console_level(&self) -> LevelFilter {
        filter_from_usize(self.console_level.load(Ordering::Acquire))
    }

    /// 替换控制台输出
    pub fn set_output(&self, output: Box<dyn LogOutput>) {
        *self.output.lock() = Some(output);
    }

    /// 从缓冲区读取下一个日志条目
    pub fn read_log(&self) -> Option<LogEntry> {
        self.buffer.lock().pop_front()
    }

    /// 未读日志条目的数量
    pub fn log_len(&self) -> usize {
        self.buffer.lock().len()
    }

    /// 由于缓冲区溢出而丢弃的日志计数
    pub fn dropped_count(&self) -> usize {
        self.dropped.load(Ordering::Relaxed)
    }

    fn push(&self, entry: LogEntry) {
        let mut buffer = self.buffer.lock();
        if buffer.len() == LOG_BUFFER_CAPACITY {
            buffer.pop_front();
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
        buffer.push_back(entry);
    }

    fn print(&self, entry: &LogEntry) {
        let line = format_log_entry(entry);
        match self.output.lock().as_ref() {
            Some(output) => output.write_line(&line),
            None => {
                let _ = writeln!(std::io::stderr().lock(), "{}", line);
            }
        }
    }
}

impl Log for LogCore {
    fn enabled(&self, metadata: &Metadata<'_>) -> bool {
        metadata.level() <= self.global_level()
    }

    fn log(&self, record: &Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        let entry = LogEntry::from_record(record);
        if record.level() <= self.console_level() {
            self.print(&entry);
        }
        self.push(entry);
    }

    fn flush(&self) {
        let _ = std::io::stderr().flush();
    }
}
