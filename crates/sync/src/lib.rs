//! 同步原语
//!
//! 向桥接层各模块提供基于 `lock_api` 的自旋锁和读写锁。
//!
//! 用户态下不存在"关中断"的概念，锁只负责互斥；所有临界区都应当很短
//! （表项插入、查找、删除），长时间持有应使用其它机制。
//!
//! # 退避策略
//!
//! 自旋一定次数后调用 [`std::thread::yield_now`] 让出 CPU，避免中断线程与
//! 调用方线程在同一核上互相空转。

mod backoff;
mod raw_spin_lock;
mod rwlock;
mod spin_lock;

pub use raw_spin_lock::RawSpinLock;
pub use rwlock::{RawRwSpinLock, RwLock, RwLockReadGuard, RwLockWriteGuard};
pub use spin_lock::{SpinLock, SpinLockGuard};
