//! DMA 分配器测试（两种翻译策略）

use std::sync::Arc;
use std::thread;

use dma::{
    Allocation, DmaAllocator, DmaError, DmaPlatform, DmaRegion, DmaSegment, Paddr,
    PagemapResolver, PhysResolver, TrackedTable, Vaddr,
};
use test_support::{MockDmaPlatform, MockPageMap};

const PAGE: usize = 4096;

/// 把共享的 Mock 平台包装成分配器可拥有的对象
struct Shared(Arc<MockDmaPlatform>);

impl DmaPlatform for Shared {
    fn page_size(&self) -> usize {
        self.0.page_size()
    }

    fn alloc_contiguous(&self, size: usize, align: usize) -> Result<Allocation, DmaError> {
        self.0.alloc_contiguous(size, align)
    }

    fn release(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError> {
        self.0.release(vaddr, size)
    }
}

fn tracked() -> (Arc<MockDmaPlatform>, DmaAllocator) {
    let platform = Arc::new(MockDmaPlatform::direct(PAGE));
    let allocator = DmaAllocator::new(
        Box::new(Shared(platform.clone())),
        Box::new(TrackedTable::new()),
    );
    (platform, allocator)
}

fn lazy() -> (Arc<MockDmaPlatform>, DmaAllocator) {
    let platform = Arc::new(MockDmaPlatform::lazy(PAGE));
    let resolver: PagemapResolver<MockPageMap> = PagemapResolver::new(platform.page_map(), PAGE);
    let allocator = DmaAllocator::new(Box::new(Shared(platform.clone())), Box::new(resolver));
    (platform, allocator)
}

fn both() -> [(&'static str, Arc<MockDmaPlatform>, DmaAllocator); 2] {
    let (tp, ta) = tracked();
    let (lp, la) = lazy();
    [("tracked", tp, ta), ("lazy", lp, la)]
}

#[test]
fn test_alloc_then_translate_round_trip() {
    for (name, _, allocator) in both() {
        let region = allocator.alloc(3 * PAGE, 64).unwrap();
        assert!(!region.paddr.is_null(), "{name}");
        assert_eq!(allocator.virt_to_phys(region.vaddr), region.paddr, "{name}");
        assert_eq!(
            allocator.virt_to_phys(region.vaddr + PAGE + 0x20),
            region.paddr + PAGE + 0x20,
            "{name}"
        );
    }
}

#[test]
fn test_free_invalidates_translation() {
    for (name, platform, allocator) in both() {
        let region = allocator.alloc(PAGE, PAGE).unwrap();
        allocator.free(region.vaddr, PAGE).unwrap();
        assert_eq!(allocator.virt_to_phys(region.vaddr), Paddr::NULL, "{name}");
        assert_eq!(allocator.live_regions(), 0, "{name}");
        assert_eq!(
            platform.released.lock().unwrap().as_slice(),
            &[(region.vaddr, PAGE)],
            "{name}"
        );
    }
}

#[test]
fn test_alignment_beyond_page_is_unsupported() {
    for (name, platform, allocator) in both() {
        let err = allocator.alloc(PAGE, 2 * PAGE).unwrap_err();
        assert!(err.is_unsupported(), "{name}");
        assert!(matches!(
            err,
            DmaError::AlignmentUnsupported { align, page_size: PAGE } if align == 2 * PAGE
        ));
        assert!(platform.released.lock().unwrap().is_empty());
    }
}

#[test]
fn test_free_unknown_region() {
    let (_, allocator) = tracked();
    assert!(matches!(
        allocator.free(Vaddr::from_usize(0x1234_0000), PAGE),
        Err(DmaError::UnknownRegion(_))
    ));
}

#[test]
fn test_failed_release_keeps_region_tracked() {
    for (name, platform, allocator) in both() {
        let region = allocator.alloc(2 * PAGE, PAGE).unwrap();
        platform.fail_release(true);
        let err = allocator.free(region.vaddr, 2 * PAGE).unwrap_err();
        assert!(matches!(err, DmaError::Platform(_)), "{name}");
        assert_eq!(allocator.live_regions(), 1, "{name}");
        assert_eq!(allocator.virt_to_phys(region.vaddr), region.paddr, "{name}");

        platform.fail_release(false);
        allocator.free(region.vaddr, 2 * PAGE).unwrap();
        assert_eq!(allocator.live_regions(), 0, "{name}");
        assert_eq!(allocator.virt_to_phys(region.vaddr), Paddr::NULL, "{name}");
    }
}

#[test]
fn test_unresolvable_allocation_is_released() {
    let (platform, allocator) = lazy();
    platform.hide_frames();
    let err = allocator.alloc(PAGE, PAGE).unwrap_err();
    assert!(matches!(err, DmaError::Unresolved(_)));
    assert_eq!(platform.released.lock().unwrap().len(), 1);
    assert_eq!(allocator.live_regions(), 0);
}

#[test]
#[should_panic(expected = "physical address 0")]
fn test_direct_zero_physical_address_aborts() {
    let (platform, allocator) = tracked();
    platform.report_zero_phys();
    let _ = allocator.alloc(PAGE, PAGE);
}

#[test]
fn test_map_single_segment() {
    let (_, allocator) = tracked();
    let region = allocator.alloc(2 * PAGE, PAGE).unwrap();
    let seg = DmaSegment {
        paddr: region.paddr,
        len: region.size,
        vaddr: region.vaddr,
    };
    assert_eq!(allocator.map_segments(&[seg], 2 * PAGE).unwrap(), region.vaddr);
    assert!(matches!(
        allocator.map_segments(&[seg], 3 * PAGE),
        Err(DmaError::InvalidSegments(_))
    ));
    assert!(matches!(
        allocator.map_segments(&[], 0),
        Err(DmaError::InvalidSegments(_))
    ));
}

#[test]
fn test_map_multiple_segments_is_unsupported() {
    let (_, allocator) = tracked();
    let a = allocator.alloc(PAGE, PAGE).unwrap();
    let b = allocator.alloc(PAGE, PAGE).unwrap();
    let segs = [
        DmaSegment { paddr: a.paddr, len: PAGE, vaddr: a.vaddr },
        DmaSegment { paddr: b.paddr, len: PAGE, vaddr: b.vaddr },
    ];
    let err = allocator.map_segments(&segs, 2 * PAGE).unwrap_err();
    assert!(matches!(err, DmaError::MultiSegment(2)));
    assert!(err.is_unsupported());
    assert_eq!(allocator.live_regions(), 2);
}

#[test]
fn test_concurrent_alloc_free_never_sees_stale_mapping() {
    for (name, _, allocator) in both() {
        let allocator = Arc::new(allocator);
        let handles: Vec<_> = (0..4)
            .map(|_| {
                let allocator = allocator.clone();
                thread::spawn(move || {
                    for _ in 0..200 {
                        let region = allocator.alloc(PAGE, PAGE).unwrap();
                        assert_eq!(allocator.virt_to_phys(region.vaddr), region.paddr);
                        allocator.free(region.vaddr, PAGE).unwrap();
                        assert_eq!(allocator.virt_to_phys(region.vaddr), Paddr::NULL);
                    }
                })
            })
            .collect();
        for h in handles {
            h.join().unwrap();
        }
        assert_eq!(allocator.live_regions(), 0, "{name}");
    }
}

#[test]
fn test_strategies_share_one_contract() {
    fn check(resolver: &dyn PhysResolver, va: Vaddr, pa: Paddr) {
        assert_eq!(resolver.resolve(va), Some(pa));
    }

    let platform = MockDmaPlatform::lazy(PAGE);
    let alloc = platform.alloc_contiguous(PAGE, PAGE).unwrap();
    let pagemap = PagemapResolver::new(platform.page_map(), PAGE);
    let pa = pagemap.resolve(alloc.vaddr).unwrap();

    let table = TrackedTable::new();
    table.record(&DmaRegion {
        vaddr: alloc.vaddr,
        paddr: pa,
        size: PAGE,
    });
    check(&pagemap, alloc.vaddr + 8, pa + 8);
    check(&table, alloc.vaddr + 8, pa + 8);
}
