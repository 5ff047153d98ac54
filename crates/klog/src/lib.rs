//! 进程日志子系统
//!
//! 各库 crate 统一通过 `log` 门面记录日志（`log::warn!` 等），本 crate 提供
//! 唯一的后端实现 [`LogCore`]，并在 [`init`] 时安装为全局 logger。
//!
//! # 双输出策略
//!
//! 1. **即时控制台输出**：达到控制台级别阈值（默认：Warn 及以上）的日志直接写到 stderr。
//! 2. **环形缓冲区存储**：所有达到全局级别阈值（默认：Info 及以上）的日志写入有界环形缓冲区，
//!    满时丢弃最旧的条目并计数，便于事后分析与测试断言。
//!
//! 中断线程与调用方线程并发记录日志，缓冲区由 [`sync::SpinLock`] 保护，
//! 临界区只包含一次入队/出队。

mod config;
mod entry;
mod log_core;

pub use config::{DEFAULT_CONSOLE_LEVEL, DEFAULT_LOG_LEVEL, LOG_BUFFER_CAPACITY, parse_level};
pub use entry::{LogEntry, format_log_entry};
pub use log_core::{LogCore, LogOutput};

use log::LevelFilter;

/// 全局日志系统实例
///
/// const 初始化，[`init`] 之前也可以安全访问（只是不会被 `log` 门面调用）。
static GLOBAL_LOG: LogCore = LogCore::default();

/// 安装全局 logger 并设置全局级别。
///
/// 可重复调用：第一次安装 logger，之后的调用只调整级别。
pub fn init(level: LevelFilter) {
    // 已安装时 set_logger 返回 Err，忽略即可
    let _ = log::set_logger(&GLOBAL_LOG);
    GLOBAL_LOG.set_global_level(level);
    log::set_max_level(level);
}

/// 从缓冲区读取下一个日志条目
pub fn read_log() -> Option<LogEntry> {
    GLOBAL_LOG.read_log()
}

/// 返回未读日志条目的数量
pub fn log_len() -> usize {
    GLOBAL_LOG.log_len()
}

/// 返回已丢弃日志的计数
pub fn log_dropped_count() -> usize {
    GLOBAL_LOG.dropped_count()
}

/// 设置控制台输出级别阈值
pub fn set_console_level(level: LevelFilter) {
    GLOBAL_LOG.set_console_level(level);
}

/// 替换控制台输出目标（默认 stderr）
pub fn set_output(output: Box<dyn LogOutput>) {
    GLOBAL_LOG.set_output(output);
}

#[cfg(test)]
mod tests;
