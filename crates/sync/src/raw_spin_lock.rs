//! 自旋锁实现
//!
//! 基于原子操作实现 [`lock_api::RawMutex`]，供 [`SpinLock`](crate::SpinLock) 使用。

use core::sync::atomic::{AtomicBool, Ordering};

use crate::backoff::Backoff;

/// 原始自旋锁，提供互斥访问临界区的能力。
///
/// 不可重入 (即同一线程不能嵌套获取)。
#[derive(Debug)]
pub struct RawSpinLock {
    lock: AtomicBool,
}

impl RawSpinLock {
    /// 创建一个新的 RawSpinLock 实例。
    pub const fn new() -> Self {
        RawSpinLock {
            lock: AtomicBool::new(false),
        }
    }
}

impl Default for RawSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: lock/try_lock 通过 Acquire CAS 获得独占，unlock 以 Release 释放，
// 满足 RawMutex 的互斥约定。
unsafe impl lock_api::RawMutex for RawSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawSpinLock::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock(&self) {
        let mut backoff = Backoff::new();
        while self
            .lock
            .compare_exchange_weak(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_err()
        {
            // 先只读等待，减少缓存行争用
            while self.lock.load(Ordering::Relaxed) {
                backoff.snooze();
            }
        }
    }

    fn try_lock(&self) -> bool {
        self.lock
            .compare_exchange(false, true, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock(&self) {
        self.lock.store(false, Ordering::Release);
    }
}
