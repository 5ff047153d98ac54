//! 日志条目

use std::time::{SystemTime, UNIX_EPOCH};

use log::Level;

/// 一条已记录的日志
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    level: Level,
    target: String,
    thread: String,
    timestamp_us: u64,
    message: String,
}

impl LogEntry {
    /// 由 `log::Record` 构造条目，记录当前线程名与时间戳
    pub(crate) fn from_record(record: &log::Record<'_>) -> Self {
        let thread = std::thread::current();
        let timestamp_us = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_micros() as u64)
            .unwrap_or(0);
        Self {
            level: record.level(),
            target: record.target().to_string(),
            thread: thread.name().unwrap_or("?").to_string(),
            timestamp_us,
            message: record.args().to_string(),
        }
    }

    /// 日志级别
    pub fn level(&self) -> Level {
        self.level
    }

    /// 日志目标（通常为模块路径）
    pub fn target(&self) -> &str {
        &self.target
    }

    /// 记录日志的线程名
    pub fn thread(&self) -> &str {
        &self.thread
    }

    /// 时间戳（微秒，UNIX 纪元）
    pub fn timestamp_us(&self) -> u64 {
        self.timestamp_us
    }

    /// 格式化后的消息
    pub fn message(&self) -> &str {
        &self.message
    }
}

/// 把条目格式化为一行控制台文本（不含换行）
///
/// 形如 `[1700000000.123456] <W> irq-7 irq::bridge: message`。
pub fn format_log_entry(entry: &LogEntry) -> String {
    let tag = match entry.level {
        Level::Error => 'E',
        Level::Warn => 'W',
        Level::Info => 'I',
        Level::Debug => 'D',
        Level::Trace => 'T',
    };
    format!(
        "[{}.{:06}] <{}> {} {}: {}",
        entry.timestamp_us / 1_000_000,
        entry.timestamp_us % 1_000_000,
        tag,
        entry.thread,
        entry.target,
        entry.message
    )
}
