//! 日志配置常量

use log::LevelFilter;

/// 默认全局日志级别：Info 及以上进入缓冲区
pub const DEFAULT_LOG_LEVEL: LevelFilter = LevelFilter::Info;

/// 默认控制台级别：Warn 及以上立即打印
pub const DEFAULT_CONSOLE_LEVEL: LevelFilter = LevelFilter::Warn;

/// 环形缓冲区容量（条目数）
pub const LOG_BUFFER_CAPACITY: usize = 64;

/// 解析级别名称（大小写不敏感），如 `"debug"`、`"WARN"`、`"off"`。
pub fn parse_level(s: &str) -> Option<LevelFilter> {
    s.trim().parse().ok()
}
