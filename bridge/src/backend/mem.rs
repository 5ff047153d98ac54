//! 进程内存映射
//!
//! uio 与端口扫描后端共用：设备文件的共享映射，以及锁定在内存中的匿名 DMA 区域。

use std::fs::{self, File};
use std::io;
use std::os::fd::AsRawFd;
use std::path::Path;
use std::ptr::{self, NonNull};

use dma::{Allocation, DmaAllocator, DmaError, DmaPlatform, PagemapResolver, ProcPagemap, Vaddr};
use pci::MmioWindow;

/// `/proc/meminfo` 不可读时假定的大页大小
const DEFAULT_HUGE_PAGE_SIZE: usize = 2 * 1024 * 1024;

/// 把文件 `[offset, offset + len)` 共享映射为可读写窗口
///
/// 映射在进程生命周期内保留，描述符在返回前关闭。
pub(crate) fn map_shared(file: &File, len: usize, offset: u64) -> io::Result<MmioWindow> {
    // SAFETY: 新建映射，不覆盖已有地址
    let ptr = unsafe {
        libc::mmap(
            ptr::null_mut(),
            len,
            libc::PROT_READ | libc::PROT_WRITE,
            libc::MAP_SHARED,
            file.as_raw_fd(),
            offset as libc::off_t,
        )
    };
    if ptr == libc::MAP_FAILED {
        return Err(io::Error::last_os_error());
    }
    let ptr = NonNull::new(ptr.cast::<u8>())
        .ok_or_else(|| io::Error::from_raw_os_error(libc::EFAULT))?;
    // SAFETY: 映射长度为 len，且从不解除
    Ok(unsafe { MmioWindow::from_raw(ptr, len) })
}

/// 解析 `/proc/meminfo` 中的 `Hugepagesize:` 行（单位 kB）
pub(crate) fn parse_huge_page_size(meminfo: &str) -> Option<usize> {
    meminfo.lines().find_map(|line| {
        let kb = line.strip_prefix("Hugepagesize:")?.trim().strip_suffix("kB")?;
        kb.trim().parse::<usize>().ok().map(|kb| kb * 1024)
    })
}

/// 系统默认大页大小
pub(crate) fn huge_page_size() -> usize {
    fs::read_to_string("/proc/meminfo")
        .ok()
        .and_then(|text| parse_huge_page_size(&text))
        .unwrap_or(DEFAULT_HUGE_PAGE_SIZE)
}

/// 锁定在内存中的匿名映射
///
/// 超过一页的分配使用大页，保证物理连续；物理地址由页表元数据事后查询。
/// 大页映射的长度按大页取整，映射与解除映射使用同一长度。
#[derive(Debug, Clone, Copy)]
pub(crate) struct LockedAnonMemory {
    page_size: usize,
    huge_page_size: usize,
}

impl LockedAnonMemory {
    pub(crate) fn new(page_size: usize, huge_page_size: usize) -> Self {
        Self {
            page_size,
            huge_page_size,
        }
    }

    fn is_huge(&self, size: usize) -> bool {
        size > self.page_size
    }

    /// 实际映射长度
    pub(crate) fn mapping_len(&self, size: usize) -> usize {
        if self.is_huge(size) {
            size.next_multiple_of(self.huge_page_size)
        } else {
            size
        }
    }
}

/// 匿名锁定内存 + pagemap 按需翻译（uio 与端口扫描后端共用）
pub(crate) fn pagemap_allocator(page_size: usize, pagemap_path: &Path) -> DmaAllocator {
    // SAFETY: 翻译的地址来自本进程的分配，或客户内核自己映射的缓冲区
    let pagemap = unsafe { ProcPagemap::prefaulting(pagemap_path) };
    DmaAllocator::new(
        Box::new(LockedAnonMemory::new(page_size, huge_page_size())),
        Box::new(PagemapResolver::new(pagemap, page_size)),
    )
}

impl DmaPlatform for LockedAnonMemory {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_contiguous(&self, size: usize, _align: usize) -> Result<Allocation, DmaError> {
        let mut flags = libc::MAP_ANONYMOUS | libc::MAP_PRIVATE;
        if self.is_huge(size) {
            flags |= libc::MAP_HUGETLB;
        }
        let len = self.mapping_len(size);
        // SAFETY: 新建匿名映射
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                flags,
                -1,
                0,
            )
        };
        if ptr == libc::MAP_FAILED {
            return Err(DmaError::Platform(io::Error::last_os_error()));
        }
        // SAFETY: ptr..ptr+len 刚由 mmap 建立
        if unsafe { libc::mlock(ptr, len) } != 0 {
            let err = io::Error::last_os_error();
            // SAFETY: 同上
            unsafe { libc::munmap(ptr, len) };
            return Err(DmaError::Platform(err));
        }
        Ok(Allocation {
            vaddr: Vaddr::from_usize(ptr as usize),
            paddr: None,
        })
    }

    fn release(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError> {
        let len = self.mapping_len(size);
        // SAFETY: 调用方保证 vaddr 来自 alloc_contiguous 且尚未释放
        if unsafe { libc::munmap(vaddr.as_usize() as *mut libc::c_void, len) } != 0 {
            return Err(DmaError::Platform(io::Error::last_os_error()));
        }
        Ok(())
    }
}
