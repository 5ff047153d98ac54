// Unit tests for klog, driving a local `LogCore` instead of the global logger.

use log::{Level, LevelFilter, Log, Record};

use crate::LogCore;

/// 构造一条记录并交给本地 LogCore
macro_rules! test_log {
    ($logger:expr, $level:expr, $($arg:tt)*) => {
        $logger.log(
            &Record::builder()
                .level($level)
                .target("klog::tests")
                .args(format_args!($($arg)*))
                .build(),
        )
    };
}
