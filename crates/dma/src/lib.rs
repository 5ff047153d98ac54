//! DMA 内存
//!
//! 为客户内核的驱动提供物理连续、常驻内存的 DMA 缓冲区，以及虚拟地址到
//! 总线（物理）地址的翻译。
//!
//! # 翻译策略
//!
//! 平台分配时可能直接给出物理地址（Mach 的 `vm_allocate_contiguous`），也可能
//! 只给出虚拟地址、需要事后查询页表元数据（Linux 的 `/proc/self/pagemap`）。
//! 两种方式都实现 [`PhysResolver`]，对 [`DmaAllocator`] 的调用方不可区分：
//!
//! - [`TrackedTable`]：分配时登记 va→pa，查找即查表
//! - [`PagemapResolver`]：按需读取页表元数据
//!
//! # 并发
//!
//! 分配表的插入/删除与查找互斥；释放时注销表项与归还平台内存在同一把写锁下
//! 完成，并发的 `virt_to_phys` 不会看到悬空映射。

mod address;
mod allocator;
mod error;
mod pagemap;
mod platform;
mod tracked;

pub use address::{Paddr, Vaddr};
pub use allocator::{DmaAllocator, DmaRegion, DmaSegment};
pub use error::DmaError;
pub use pagemap::{PAGEMAP_ENTRY_SIZE, PageMapSource, PagemapResolver, ProcPagemap, decode_entry};
pub use platform::{Allocation, DmaPlatform};
pub use tracked::TrackedTable;

/// 虚拟地址到物理地址的翻译策略
pub trait PhysResolver: Send + Sync {
    /// 登记一次成功的分配（按需查询的策略忽略）
    fn record(&self, _region: &DmaRegion) {}

    /// 注销一次分配（按需查询的策略忽略）
    fn forget(&self, _vaddr: Vaddr) {}

    /// 翻译虚拟地址，无法翻译时返回 `None`
    fn resolve(&self, vaddr: Vaddr) -> Option<Paddr>;
}
