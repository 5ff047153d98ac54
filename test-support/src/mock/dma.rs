//! DMA 平台与页表元数据的 Mock 实现
//!
//! 地址均为合成值，不对应真实内存。惰性模式下平台把"页帧"登记到与
//! [`MockPageMap`] 共享的表中，释放时撤销，模拟真实页表。

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use dma::{Allocation, DmaError, DmaPlatform, PageMapSource, Paddr, Vaddr};

const VA_BASE: usize = 0x4000_0000;
const PA_BASE: usize = 0x1000_0000;
const PRESENT: u64 = 1 << 63;

type FrameTable = Arc<Mutex<HashMap<usize, usize>>>;

/// Mock DMA 平台
pub struct MockDmaPlatform {
    page_size: usize,
    direct: bool,
    next_va: AtomicUsize,
    next_pa: AtomicUsize,
    frames: FrameTable,
    hide_frames: AtomicBool,
    zero_phys: AtomicBool,
    fail_release: AtomicBool,
    /// 已释放的 `(vaddr, size)`
    pub released: Mutex<Vec<(Vaddr, usize)>>,
}

impl MockDmaPlatform {
    fn with_mode(page_size: usize, direct: bool) -> Self {
        Self {
            page_size,
            direct,
            next_va: AtomicUsize::new(VA_BASE),
            next_pa: AtomicUsize::new(PA_BASE),
            frames: FrameTable::default(),
            hide_frames: AtomicBool::new(false),
            zero_phys: AtomicBool::new(false),
            fail_release: AtomicBool::new(false),
            released: Mutex::new(Vec::new()),
        }
    }

    /// 分配时直接报告物理地址的平台
    pub fn direct(page_size: usize) -> Self {
        Self::with_mode(page_size, true)
    }

    /// 需要事后查询页表元数据的平台
    pub fn lazy(page_size: usize) -> Self {
        Self::with_mode(page_size, false)
    }

    /// 与本平台共享页帧表的页表元数据源
    pub fn page_map(&self) -> MockPageMap {
        MockPageMap {
            frames: self.frames.clone(),
        }
    }

    /// 此后的分配不登记页帧（页表查询失败）
    pub fn hide_frames(&self) {
        self.hide_frames.store(true, Ordering::SeqCst);
    }

    /// 此后的直接分配报告物理地址 0
    pub fn report_zero_phys(&self) {
        self.zero_phys.store(true, Ordering::SeqCst);
    }

    /// 控制此后的释放是否失败（EINVAL）
    pub fn fail_release(&self, fail: bool) {
        self.fail_release.store(fail, Ordering::SeqCst);
    }

    fn round_up(&self, size: usize) -> usize {
        size.div_ceil(self.page_size) * self.page_size
    }
}

impl DmaPlatform for MockDmaPlatform {
    fn page_size(&self) -> usize {
        self.page_size
    }

    fn alloc_contiguous(&self, size: usize, _align: usize) -> Result<Allocation, DmaError> {
        let len = self.round_up(size);
        let va = self.next_va.fetch_add(len, Ordering::SeqCst);
        let pa = self.next_pa.fetch_add(len, Ordering::SeqCst);
        if !self.hide_frames.load(Ordering::SeqCst) {
            let mut frames = self.frames.lock().unwrap();
            for page in 0..len / self.page_size {
                frames.insert(va / self.page_size + page, pa / self.page_size + page);
            }
        }
        let paddr = if self.zero_phys.load(Ordering::SeqCst) {
            Paddr::NULL
        } else {
            Paddr::from_usize(pa)
        };
        Ok(Allocation {
            vaddr: Vaddr::from_usize(va),
            paddr: self.direct.then_some(paddr),
        })
    }

    fn release(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError> {
        if self.fail_release.load(Ordering::SeqCst) {
            return Err(DmaError::Platform(io::Error::from_raw_os_error(22)));
        }
        let len = self.round_up(size);
        let mut frames = self.frames.lock().unwrap();
        for page in 0..len / self.page_size {
            frames.remove(&(vaddr.as_usize() / self.page_size + page));
        }
        self.released.lock().unwrap().push((vaddr, size));
        Ok(())
    }
}

/// Mock 页表元数据源
#[derive(Clone)]
pub struct MockPageMap {
    frames: FrameTable,
}

impl PageMapSource for MockPageMap {
    fn entry(&self, vpn: usize) -> io::Result<u64> {
        Ok(self
            .frames
            .lock()
            .unwrap()
            .get(&vpn)
            .map_or(0, |&pfn| PRESENT | pfn as u64))
    }
}
