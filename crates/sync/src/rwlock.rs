//! 读写自旋锁
//!
//! 读多写少的表（如 DMA 反向映射表）使用此锁：查找走共享锁，
//! 插入/删除走独占锁。

use core::sync::atomic::{AtomicUsize, Ordering};

use crate::backoff::Backoff;

/// 写者标志位
const WRITER: usize = 1;
/// 每个读者占用的计数单位
const READER: usize = 2;

/// 原始读写自旋锁
///
/// 状态字最低位为写者标志，其余位为读者计数。不保证公平性。
#[derive(Debug)]
pub struct RawRwSpinLock {
    state: AtomicUsize,
}

impl RawRwSpinLock {
    /// 创建一个未加锁的实例
    pub const fn new() -> Self {
        Self {
            state: AtomicUsize::new(0),
        }
    }
}

impl Default for RawRwSpinLock {
    fn default() -> Self {
        Self::new()
    }
}

// SAFETY: 写者仅在状态为 0 时通过 CAS 置位；读者仅在写者位清零时增加计数。
unsafe impl lock_api::RawRwLock for RawRwSpinLock {
    #[allow(clippy::declare_interior_mutable_const)]
    const INIT: Self = RawRwSpinLock::new();

    type GuardMarker = lock_api::GuardSend;

    fn lock_shared(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock_shared() {
            backoff.snooze();
        }
    }

    fn try_lock_shared(&self) -> bool {
        let state = self.state.load(Ordering::Relaxed);
        if state & WRITER != 0 {
            return false;
        }
        self.state
            .compare_exchange_weak(state, state + READER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_shared(&self) {
        self.state.fetch_sub(READER, Ordering::Release);
    }

    fn lock_exclusive(&self) {
        let mut backoff = Backoff::new();
        while !self.try_lock_exclusive() {
            backoff.snooze();
        }
    }

    fn try_lock_exclusive(&self) -> bool {
        self.state
            .compare_exchange(0, WRITER, Ordering::Acquire, Ordering::Relaxed)
            .is_ok()
    }

    unsafe fn unlock_exclusive(&self) {
        self.state.fetch_and(!WRITER, Ordering::Release);
    }
}

/// 读写自旋锁
pub type RwLock<T> = lock_api::RwLock<RawRwSpinLock, T>;
/// 共享读保护器
pub type RwLockReadGuard<'a, T> = lock_api::RwLockReadGuard<'a, RawRwSpinLock, T>;
/// 独占写保护器
pub type RwLockWriteGuard<'a, T> = lock_api::RwLockWriteGuard<'a, RawRwSpinLock, T>;
