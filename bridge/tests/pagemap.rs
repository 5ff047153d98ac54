//! pagemap 翻译在真实进程页表上的行为

use std::ptr;

use dma::{PageMapSource, PagemapResolver, PhysResolver, ProcPagemap, Vaddr};
use pcibridge::backend::page_size;

const PAGEMAP: &str = "/proc/self/pagemap";
const PRESENT: u64 = 1 << 63;

/// 页是否驻留；pagemap 不可读时为 `None`
fn present(va: usize) -> Option<bool> {
    let entry = ProcPagemap::new(PAGEMAP).entry(va / page_size()).ok()?;
    Some(entry & PRESENT != 0)
}

struct Anon {
    ptr: *mut libc::c_void,
    len: usize,
}

impl Anon {
    fn new(len: usize) -> Self {
        // SAFETY: 新建匿名映射
        let ptr = unsafe {
            libc::mmap(
                ptr::null_mut(),
                len,
                libc::PROT_READ | libc::PROT_WRITE,
                libc::MAP_PRIVATE | libc::MAP_ANONYMOUS,
                -1,
                0,
            )
        };
        assert_ne!(ptr, libc::MAP_FAILED);
        Self { ptr, len }
    }

    fn va(&self) -> usize {
        self.ptr as usize
    }
}

impl Drop for Anon {
    fn drop(&mut self) {
        // SAFETY: 映射由 new 建立
        unsafe { libc::munmap(self.ptr, self.len) };
    }
}

#[test]
fn test_untouched_mapping_is_faulted_in_before_lookup() {
    let page = page_size();
    let buffer = Anon::new(page);
    let va = buffer.va() + 0x10;
    let Some(before) = present(va) else {
        return;
    };
    assert!(!before, "fresh anonymous page is already resident");

    let cold = PagemapResolver::new(ProcPagemap::new(PAGEMAP), page);
    assert_eq!(cold.resolve(Vaddr::from_usize(va)), None);

    // SAFETY: buffer 在查询期间保持映射
    let pagemap = unsafe { ProcPagemap::prefaulting(PAGEMAP) };
    let resolver = PagemapResolver::new(pagemap, page);
    let paddr = resolver.resolve(Vaddr::from_usize(va));
    assert_eq!(present(va), Some(true));
    // 没有 CAP_SYS_ADMIN 时 PFN 被隐藏，翻译结果为 None
    if let Some(paddr) = paddr {
        assert_eq!(paddr.page_offset(page), 0x10);
    }
}
