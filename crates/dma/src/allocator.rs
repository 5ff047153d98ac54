//! DMA 分配器

use hashbrown::HashMap;
use sync::RwLock;

use crate::{DmaError, DmaPlatform, Paddr, PhysResolver, Vaddr};

/// 一块已分配的 DMA 区域
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaRegion {
    /// 虚拟地址
    pub vaddr: Vaddr,
    /// 物理地址
    pub paddr: Paddr,
    /// 长度
    pub size: usize,
}

/// 客户内核描述的 DMA 段
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DmaSegment {
    /// 段的物理地址
    pub paddr: Paddr,
    /// 段长度
    pub len: usize,
    /// 分配时得到的虚拟地址
    pub vaddr: Vaddr,
}

/// DMA 分配器
///
/// 组合平台分配接口与翻译策略，并维护在用区域表。
pub struct DmaAllocator {
    platform: Box<dyn DmaPlatform>,
    resolver: Box<dyn PhysResolver>,
    live: RwLock<HashMap<Vaddr, DmaRegion>>,
}

impl DmaAllocator {
    /// 创建分配器
    pub fn new(platform: Box<dyn DmaPlatform>, resolver: Box<dyn PhysResolver>) -> Self {
        Self {
            platform,
            resolver,
            live: RwLock::new(HashMap::new()),
        }
    }

    /// 平台页大小
    pub fn page_size(&self) -> usize {
        self.platform.page_size()
    }

    /// 分配物理连续的 DMA 内存
    ///
    /// # Panics
    /// 平台声称直接报告物理地址却报告了 0 时 panic：这说明平台契约已被破坏。
    pub fn alloc(&self, size: usize, align: usize) -> Result<DmaRegion, DmaError> {
        let page_size = self.platform.page_size();
        if align > page_size {
            log::warn!(
                "dma: requested alignment {:#x} is larger than page size {:#x}",
                align,
                page_size
            );
            return Err(DmaError::AlignmentUnsupported { align, page_size });
        }
        if size == 0 {
            return Err(DmaError::ZeroSize);
        }

        let allocation = self.platform.alloc_contiguous(size, align)?;
        let vaddr = allocation.vaddr;
        let mut live = self.live.write();
        let paddr = match allocation.paddr {
            Some(paddr) => {
                assert!(
                    !paddr.is_null(),
                    "dma: platform reported physical address 0 for {:?}",
                    vaddr
                );
                paddr
            }
            None => match self.resolver.resolve(vaddr) {
                Some(paddr) => paddr,
                None => {
                    drop(live);
                    if let Err(e) = self.platform.release(vaddr, size) {
                        log::warn!("dma: releasing unresolved {:?} failed: {}", vaddr, e);
                    }
                    return Err(DmaError::Unresolved(vaddr));
                }
            },
        };

        let region = DmaRegion { vaddr, paddr, size };
        self.resolver.record(&region);
        live.insert(vaddr, region);
        log::debug!(
            "dma: allocated {:#x} bytes va={:#x} pa={:#x}",
            size,
            vaddr,
            paddr
        );
        Ok(region)
    }

    /// 释放 DMA 内存
    ///
    /// 注销表项与归还平台内存在同一把写锁下完成。平台释放失败时内存仍然
    /// 映射着，表项保留，翻译结果不变。
    pub fn free(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError> {
        let mut live = self.live.write();
        let Some(region) = live.get(&vaddr).copied() else {
            return Err(DmaError::UnknownRegion(vaddr));
        };
        if region.size != size {
            log::warn!(
                "dma: freeing {:?} with size {:#x}, allocated {:#x}",
                vaddr,
                size,
                region.size
            );
        }
        if let Err(e) = self.platform.release(vaddr, region.size) {
            log::error!("dma: releasing {:?} failed, keeping it: {}", vaddr, e);
            return Err(e);
        }
        live.remove(&vaddr);
        self.resolver.forget(vaddr);
        Ok(())
    }

    /// 虚拟地址到物理地址，无法翻译时返回 [`Paddr::NULL`]
    pub fn virt_to_phys(&self, vaddr: Vaddr) -> Paddr {
        let _live = self.live.read();
        self.resolver.resolve(vaddr).unwrap_or(Paddr::NULL)
    }

    /// 把段列表"映射"到虚拟地址空间
    ///
    /// 分配本身已经映射，单段缓冲区直接返回分配时的虚拟地址；多段不支持。
    pub fn map_segments(
        &self,
        segments: &[DmaSegment],
        total_len: usize,
    ) -> Result<Vaddr, DmaError> {
        let segment = match segments {
            [] => return Err(DmaError::InvalidSegments("empty segment list")),
            [segment] => segment,
            _ => {
                log::warn!(
                    "dma: mapping {} segments is not supported",
                    segments.len()
                );
                return Err(DmaError::MultiSegment(segments.len()));
            }
        };
        if total_len > segment.len {
            return Err(DmaError::InvalidSegments("total length exceeds segment"));
        }
        Ok(segment.vaddr)
    }

    /// 在用区域数
    pub fn live_regions(&self) -> usize {
        self.live.read().len()
    }
}
