//! uio 后端端到端测试（临时 sysfs 目录树）

use std::fs::{self, OpenOptions};
use std::os::unix::fs::FileExt;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use pci::regs::{COMMAND, Command};
use pcibridge::backend::{page_size, uio::UioBackend};
use pcibridge::{
    BridgeConfig, BridgeError, DmaSegment, Paddr, PciAddress, PciBridge, SchedRegion, Vaddr,
};
use test_support::{MockSched, TempTree};

const NIC: PciAddress = PciAddress::new(0, 0, 0);
const DISK: PciAddress = PciAddress::new(0, 1, 0);

fn config_space(vendor: u16, device: u16, command: u16, bar0: u32) -> Vec<u8> {
    let mut space = vec![0u8; 256];
    space[0..4].copy_from_slice(&(u32::from(device) << 16 | u32::from(vendor)).to_le_bytes());
    space[4..8].copy_from_slice(&u32::from(command).to_le_bytes());
    space[0x10..0x14].copy_from_slice(&bar0.to_le_bytes());
    space
}

fn resource_line(start: u64, size: u64, flags: u64) -> String {
    format!(
        "0x{:016x} 0x{:016x} 0x{:016x}\n",
        start,
        start + size - 1,
        flags
    )
}

fn build_tree(irq_events: usize) -> TempTree {
    let tree = TempTree::new("uio");
    tree.write(
        "uio/uio0/device/config",
        config_space(0x8086, 0x100e, 0x0006, 0xfebc_0000),
    );
    tree.write(
        "uio/uio0/device/resource",
        resource_line(0xfebc_0000, 0x1000, 0x40200)
            + "0x0000000000000000 0x0000000000000000 0x0000000000000000\n",
    );
    tree.write("uio/uio0/device/resource0", vec![0u8; 0x1000]);

    tree.write(
        "uio/uio1/device/config",
        config_space(0x1af4, 0x1001, 0x0007, 0xfe00_0000),
    );
    tree.write(
        "uio/uio1/device/resource",
        resource_line(0xfe00_0000, 0x1000, 0x40200),
    );
    tree.write("uio/uio1/device/resource0", vec![0u8; 0x1000]);

    tree.write("dev/uio0", vec![1u8; 4 * irq_events]);
    tree
}

fn bridge(tree: &TempTree) -> (Arc<MockSched>, PciBridge) {
    let config = BridgeConfig {
        uio_root: tree.join("uio"),
        dev_root: tree.join("dev"),
        pagemap_path: tree.join("pagemap"),
        ..BridgeConfig::default()
    };
    let sched = Arc::new(MockSched::new());
    let bridge = PciBridge::new(Box::new(UioBackend::new(config)), sched.clone());
    (sched, bridge)
}

#[test]
fn test_enumerates_uio_nodes() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);
    assert_eq!(bridge.backend_name(), "uio");
    bridge.try_init().unwrap();

    let devices = bridge.registry().devices().unwrap();
    assert_eq!(devices.len(), 2);
    assert_eq!(devices[1].addr(), DISK);
    assert_eq!(devices[1].info().vendor_id, 0x1af4);
    assert_eq!(devices[0].regions().len(), 1);
    assert_eq!(devices[0].regions()[0].size, 0x1000);
}

#[test]
fn test_confread_and_confwrite_hit_sysfs() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);

    assert_eq!(bridge.confread(NIC, 0).unwrap(), 0x100e_8086);
    bridge.confwrite(DISK, 0x3C, 0x0000_010b).unwrap();
    let raw = fs::read(tree.join("uio/uio1/device/config")).unwrap();
    assert_eq!(&raw[0x3C..0x40], &[0x0b, 0x01, 0x00, 0x00]);
    assert_eq!(bridge.confread(DISK, 0x3C).unwrap(), 0x010b);
}

#[test]
fn test_confread_errors() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);

    let missing = bridge.confread(PciAddress::new(0, 9, 0), 0).unwrap_err();
    assert!(missing.is_not_found());
    let other_bus = bridge.confread(PciAddress::new(1, 0, 0), 0).unwrap_err();
    assert!(other_bus.is_unsupported());
    let misaligned = bridge.confread(NIC, 2).unwrap_err();
    assert_eq!(misaligned.to_errno(), libc::EINVAL);
}

#[test]
fn test_map_after_probe_writes_through() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);

    assert!(bridge.map(0xfebc_0000, 0x1000).unwrap_err().is_not_found());
    bridge.confread(NIC, 0).unwrap();
    let window = bridge.map(0xfebc_0000, 0x1000).unwrap();
    assert_eq!(window.len(), 0x1000);
    // SAFETY: 窗口长 0x1000 字节
    unsafe { window.as_ptr().add(0x10).write_volatile(0xAB) };
    assert_eq!(fs::read(tree.join("uio/uio0/device/resource0")).unwrap()[0x10], 0xAB);

    // uio1 尚未被探测
    assert!(bridge.map(0xfe00_0000, 0x1000).is_err());
    assert_eq!(bridge.map(0xfebc_0000, 0x100).unwrap(), window);
}

#[test]
fn test_interrupts_are_delivered_from_dev_node() {
    let tree = build_tree(3);
    let (sched, bridge) = bridge(&tree);

    // 子驱动屏蔽了 INTx
    let disabled = 0x0006 | Command::INTX_DISABLE.bits();
    bridge
        .confwrite(NIC, COMMAND, u32::from(disabled))
        .unwrap();

    bridge.irq_map(NIC, 11, 0xc0de).unwrap();
    let count = Arc::new(AtomicUsize::new(0));
    let c = count.clone();
    let handle = bridge
        .irq_establish(0xc0de, move |_: &SchedRegion| {
            c.fetch_add(1, Ordering::SeqCst);
        })
        .unwrap();
    // 读完三次计数后节点到达末尾，线程退出
    handle.join().unwrap();

    assert_eq!(count.load(Ordering::SeqCst), 3);
    assert_eq!(sched.schedules.load(Ordering::SeqCst), 3);
    assert_eq!(sched.kthreads(), vec!["irq-11".to_string()]);
    let command = bridge.confread(NIC, COMMAND).unwrap() as u16;
    assert!(!Command::from_bits_retain(command).contains(Command::INTX_DISABLE));
}

#[test]
fn test_intx_disable_set_by_handler_is_cleared_before_next_read() {
    let tree = build_tree(1);
    let (_, bridge) = bridge(&tree);
    bridge.irq_map(NIC, 11, 0xbeef).unwrap();

    let config = tree.join("uio/uio0/device/config");
    let handle = bridge
        .irq_establish(0xbeef, move |_: &SchedRegion| {
            // 子驱动在处理函数中屏蔽 INTx
            let file = OpenOptions::new().write(true).open(&config).unwrap();
            let masked = 0x0006 | Command::INTX_DISABLE.bits();
            file.write_all_at(&u32::from(masked).to_le_bytes(), u64::from(COMMAND))
                .unwrap();
        })
        .unwrap();
    // 处理一次后回到阻塞读，读到末尾退出
    handle.join().unwrap();

    assert_eq!(bridge.confread(NIC, COMMAND).unwrap(), 0x0006);
}

#[test]
fn test_establish_without_dev_node_fails_cleanly() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);
    bridge.irq_map(DISK, 10, 1).unwrap();

    let err = bridge
        .irq_establish(1, |_: &SchedRegion| {})
        .unwrap_err();
    assert!(matches!(err, BridgeError::Irq(_)));
    assert_eq!(err.to_errno(), libc::ENOENT);

    // 节点出现后可以重试
    tree.write("dev/uio1", Vec::<u8>::new());
    let handle = bridge.irq_establish(1, |_: &SchedRegion| {}).unwrap();
    handle.join().unwrap();
}

#[test]
fn test_dma_capability_limits() {
    let tree = build_tree(0);
    let (_, bridge) = bridge(&tree);

    let err = bridge.dma_alloc(page_size(), 2 * page_size()).unwrap_err();
    assert!(err.is_unsupported());

    let seg = |va: usize| DmaSegment {
        paddr: Paddr::from_usize(0x1000_0000),
        len: page_size(),
        vaddr: Vaddr::from_usize(va),
    };
    let err = bridge
        .dma_map_segments(&[seg(0x7000_0000), seg(0x7000_1000)], 2 * page_size())
        .unwrap_err();
    assert!(err.is_unsupported());
    assert_eq!(
        bridge.dma_map_segments(&[seg(0x7000_0000)], page_size()).unwrap(),
        Vaddr::from_usize(0x7000_0000)
    );
    // pagemap 不存在时无法翻译；查询前会读一次该地址，必须是真实缓冲区
    let buffer = vec![0u8; page_size()];
    let va = Vaddr::from_usize(buffer.as_ptr() as usize);
    assert_eq!(bridge.virt_to_phys(va), Paddr::NULL);
}
