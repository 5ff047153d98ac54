//! 自旋退避

use core::hint;

/// 超过该次数后改为让出时间片
const SPIN_LIMIT: u32 = 64;

/// 自旋等待的退避状态
pub(crate) struct Backoff {
    spins: u32,
}

impl Backoff {
    pub(crate) const fn new() -> Self {
        Self { spins: 0 }
    }

    /// 执行一次退避
    pub(crate) fn snooze(&mut self) {
        if self.spins < SPIN_LIMIT {
            self.spins += 1;
            hint::spin_loop();
        } else {
            std::thread::yield_now();
        }
    }
}
