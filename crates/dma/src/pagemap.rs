//! 按需查询页表元数据的翻译策略
//!
//! Linux 为每个进程导出 `/proc/self/pagemap`：每个虚拟页对应一个 8 字节
//! 小端表项，位于 `(va / page_size) * 8`。
//!
//! ```text
//! bit 63      页面在内存中
//! bit 0..55   页帧号（PFN）
//! ```
//!
//! 物理地址 = PFN × 页大小 + 页内偏移。读取 PFN 需要 CAP_SYS_ADMIN，
//! 权限不足时内核返回全零的 PFN，此时视为无法翻译。
//!
//! 从未访问过的页没有表项（bit 63 为 0），查询前须先访问一次把它换入。

use std::fs::File;
use std::io;
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::ptr;

use crate::{Paddr, PhysResolver, Vaddr};

/// 每个表项的字节数
pub const PAGEMAP_ENTRY_SIZE: usize = 8;

const PFN_MASK: u64 = (1 << 55) - 1;
const PRESENT: u64 = 1 << 63;

/// 解析一个表项，未驻留或 PFN 为零时返回 `None`
pub fn decode_entry(entry: u64, vaddr: Vaddr, page_size: usize) -> Option<Paddr> {
    if entry & PRESENT == 0 {
        return None;
    }
    let pfn = (entry & PFN_MASK) as usize;
    if pfn == 0 {
        return None;
    }
    Some(Paddr::from_usize(pfn * page_size + vaddr.page_offset(page_size)))
}

/// 页表元数据来源
pub trait PageMapSource: Send + Sync {
    /// 查询前把 `vaddr` 所在的页换入
    fn prefault(&self, _vaddr: Vaddr) {}

    /// 读取第 `vpn` 个虚拟页的原始表项
    fn entry(&self, vpn: usize) -> io::Result<u64>;
}

/// `/proc/self/pagemap`
///
/// 每次查询都重新打开文件，不缓存描述符。
#[derive(Debug, Clone)]
pub struct ProcPagemap {
    path: PathBuf,
    prefault: bool,
}

impl ProcPagemap {
    /// 只读取表项，不访问被查询的地址（测试中可指向普通文件）
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            prefault: false,
        }
    }

    /// 查询前先读一次被查询地址所在的页
    ///
    /// # Safety
    /// 之后交给 [`PageMapSource::prefault`] 的每个地址都必须位于本进程
    /// 可读的映射中。
    pub unsafe fn prefaulting(path: impl AsRef<Path>) -> Self {
        Self {
            prefault: true,
            ..Self::new(path)
        }
    }
}

impl PageMapSource for ProcPagemap {
    fn prefault(&self, vaddr: Vaddr) {
        if self.prefault {
            // SAFETY: 由 `prefaulting` 的调用方保证地址可读
            unsafe { ptr::read_volatile(vaddr.as_usize() as *const u8) };
        }
    }

    fn entry(&self, vpn: usize) -> io::Result<u64> {
        let file = File::open(&self.path)?;
        let mut buf = [0u8; PAGEMAP_ENTRY_SIZE];
        file.read_exact_at(&mut buf, (vpn * PAGEMAP_ENTRY_SIZE) as u64)?;
        Ok(u64::from_le_bytes(buf))
    }
}

/// 按需查询的翻译策略
pub struct PagemapResolver<S> {
    source: S,
    page_size: usize,
}

impl<S: PageMapSource> PagemapResolver<S> {
    /// 创建解析器，`page_size` 必须是 2 的幂
    pub fn new(source: S, page_size: usize) -> Self {
        assert!(page_size.is_power_of_two());
        Self { source, page_size }
    }
}

impl<S: PageMapSource> PhysResolver for PagemapResolver<S> {
    fn resolve(&self, vaddr: Vaddr) -> Option<Paddr> {
        self.source.prefault(vaddr);
        let vpn = vaddr.as_usize() / self.page_size;
        match self.source.entry(vpn) {
            Ok(entry) => decode_entry(entry, vaddr, self.page_size),
            Err(e) => {
                log::warn!("dma: pagemap lookup for {:?} failed: {}", vaddr, e);
                None
            }
        }
    }
}
