//! 调度交接的 Mock 实现
//!
//! 记录进出调度区的次数，并检测是否有多个线程同时处于调度区。

use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use irq::SchedOps;

/// Mock 调度交接
#[derive(Default)]
pub struct MockSched {
    reentrant: bool,
    inside: AtomicUsize,
    /// 同时处于调度区的最大线程数
    pub max_inside: AtomicUsize,
    /// `schedule` 次数
    pub schedules: AtomicUsize,
    /// `unschedule` 次数
    pub unschedules: AtomicUsize,
    kthreads: Mutex<Vec<String>>,
}

impl MockSched {
    /// 不可重入的客户内核
    pub fn new() -> Self {
        Self::default()
    }

    /// 可重入的客户内核
    pub fn reentrant() -> Self {
        Self {
            reentrant: true,
            ..Self::default()
        }
    }

    /// 当前是否有线程处于调度区
    pub fn is_inside(&self) -> bool {
        self.inside.load(Ordering::SeqCst) > 0
    }

    /// 调用过 `kthread` 的线程名
    pub fn kthreads(&self) -> Vec<String> {
        self.kthreads.lock().unwrap().clone()
    }
}

impl SchedOps for MockSched {
    fn kthread(&self) {
        let name = std::thread::current().name().unwrap_or("").to_string();
        self.kthreads.lock().unwrap().push(name);
    }

    fn schedule(&self) {
        self.schedules.fetch_add(1, Ordering::SeqCst);
        let now = self.inside.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_inside.fetch_max(now, Ordering::SeqCst);
    }

    fn unschedule(&self) {
        self.inside.fetch_sub(1, Ordering::SeqCst);
        self.unschedules.fetch_add(1, Ordering::SeqCst);
    }

    fn is_reentrant(&self) -> bool {
        self.reentrant
    }
}
