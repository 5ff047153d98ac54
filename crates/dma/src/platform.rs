//! 平台内存接口

use crate::{DmaError, Paddr, Vaddr};

/// 平台一次连续分配的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Allocation {
    /// 虚拟地址
    pub vaddr: Vaddr,
    /// 平台直接报告的物理地址；`None` 表示需要事后翻译
    pub paddr: Option<Paddr>,
}

/// 物理连续、常驻内存的分配接口
///
/// 实现必须保证分配在释放前不会被换出或迁移。
pub trait DmaPlatform: Send + Sync {
    /// 平台页大小
    fn page_size(&self) -> usize;

    /// 分配 `size` 字节，`align` 已保证不超过页大小
    fn alloc_contiguous(&self, size: usize, align: usize) -> Result<Allocation, DmaError>;

    /// 归还分配
    fn release(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError>;
}
