//! 测试支持 crate
//!
//! 提供各 crate 的 Mock 实现和测试工具，只在各 crate 的 `tests/` 目录中使用。

pub mod mock;
pub mod tree;

pub use mock::{
    IrqInjector, MockDmaPlatform, MockIrqSource, MockPageMap, MockPciHost, MockSched,
};
pub use tree::TempTree;

use std::time::{Duration, Instant};

/// 轮询直到条件成立或超时，返回条件最终是否成立
pub fn wait_until(timeout: Duration, mut cond: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + timeout;
    while Instant::now() < deadline {
        if cond() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(1));
    }
    cond()
}
