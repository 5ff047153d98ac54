//! 配置空间访问测试

use std::sync::Arc;
use std::sync::atomic::Ordering;

use pci::regs::{COMMAND, Command, VENDOR_ID};
use pci::{
    CONFIG_READ_FAILED, ConfigAccess, ConfigSpace, DeviceRegistry, HostCaps, PciAddress, PciError,
};
use test_support::MockPciHost;

fn setup(caps: Option<HostCaps>) -> (Arc<MockPciHost>, ConfigSpace) {
    let mut host = MockPciHost::new()
        .with_device(PciAddress::new(0, 2, 0), 0x10ec, 0x8139, &[(0xc000_0000, 0x100)])
        .with_device(PciAddress::new(1, 0, 1), 0x8086, 0x2922, &[]);
    if let Some(caps) = caps {
        host = host.with_caps(caps);
    }
    let host = Arc::new(host);
    let registry = Arc::new(DeviceRegistry::new(host.clone()));
    (host, ConfigSpace::new(registry))
}

#[test]
fn test_read_vendor_and_device() {
    let (_, config) = setup(None);
    let id = config.read32(PciAddress::new(0, 2, 0), VENDOR_ID).unwrap();
    assert_eq!(id, 0x8139_10ec);
}

#[test]
fn test_read_missing_device() {
    let (host, config) = setup(None);
    let err = config.read32(PciAddress::new(0, 9, 0), 0).unwrap_err();
    assert!(matches!(err, PciError::NoDevice(_)));
    assert!(err.is_not_found());
    assert_eq!(host.reads.load(Ordering::SeqCst), 0);
    assert_eq!(config.registry().highest_probed(), None);
    assert_eq!(CONFIG_READ_FAILED, 0xFFFF_FFFF);
}

#[test]
fn test_write_then_read_is_live() {
    let (host, config) = setup(None);
    let addr = PciAddress::new(0, 2, 0);
    let cmd = config.read32(addr, COMMAND).unwrap();
    config
        .write32(addr, COMMAND, cmd | u32::from(Command::INTX_DISABLE.bits()))
        .unwrap();
    let after = config.read32(addr, COMMAND).unwrap();
    assert!(Command::from_bits_retain(after as u16).contains(Command::INTX_DISABLE));
    assert_eq!(host.reads.load(Ordering::SeqCst), 2);
    assert_eq!(host.writes.load(Ordering::SeqCst), 1);
}

#[test]
fn test_misaligned_register() {
    let (host, config) = setup(None);
    assert!(matches!(
        config.read32(PciAddress::new(0, 2, 0), 0x06),
        Err(PciError::Misaligned(0x06))
    ));
    assert_eq!(host.reads.load(Ordering::SeqCst), 0);
}

#[test]
fn test_bus_function_restriction_is_a_capability() {
    let addr = PciAddress::new(1, 0, 1);

    let (_, unrestricted) = setup(None);
    assert_eq!(unrestricted.read32(addr, 0).unwrap(), 0x2922_8086);

    let (_, restricted) = setup(Some(HostCaps {
        bus0_fun0_only: true,
        max_devices: 32,
    }));
    assert!(matches!(
        restricted.read32(addr, 0),
        Err(PciError::Unsupported(_))
    ));
    assert!(restricted.write32(addr, 0x04, 0).is_err());
}

#[test]
fn test_read_tracks_highest_device() {
    let (_, config) = setup(None);
    config.read32(PciAddress::new(1, 0, 1), 0).unwrap();
    config.read32(PciAddress::new(0, 2, 0), 0).unwrap();
    assert_eq!(config.registry().highest_probed(), Some(1));
}
