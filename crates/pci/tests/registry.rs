//! 设备注册表测试

use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::thread;

use pci::{ConfigAccess, ConfigSpace, DeviceRegistry, HostCaps, PciAddress, PciError};
use test_support::MockPciHost;

fn addr(device: u8) -> PciAddress {
    PciAddress::new(0, device, 0)
}

fn two_device_host() -> MockPciHost {
    MockPciHost::new()
        .with_device(addr(0), 0x8086, 0x100e, &[(0xfebc_0000, 0x2_0000)])
        .with_device(addr(3), 0x1af4, 0x1000, &[(0xfe00_0000, 0x1000), (0xfe00_1000, 0x1000)])
}

#[test]
fn test_init_is_idempotent() {
    let host = Arc::new(two_device_host());
    let registry = DeviceRegistry::new(host.clone());
    assert!(!registry.is_initialized());

    registry.init().unwrap();
    registry.init().unwrap();
    assert_eq!(registry.devices().unwrap().len(), 2);
    assert_eq!(host.enumerate_calls.load(Ordering::SeqCst), 1);
    assert_eq!(host.privilege_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_concurrent_first_use_enumerates_once() {
    let host = Arc::new(two_device_host());
    let registry = Arc::new(DeviceRegistry::new(host.clone()));

    let handles: Vec<_> = (0..8)
        .map(|_| {
            let registry = registry.clone();
            thread::spawn(move || registry.find(addr(3)).unwrap().index())
        })
        .collect();
    for h in handles {
        assert_eq!(h.join().unwrap(), 1);
    }
    assert_eq!(host.enumerate_calls.load(Ordering::SeqCst), 1);
}

#[test]
fn test_privilege_failure_is_fatal_and_not_cached() {
    let host = Arc::new(two_device_host().deny_privilege());
    let registry = DeviceRegistry::new(host.clone());

    let err = registry.init().unwrap_err();
    assert!(matches!(err, PciError::Privilege(_)));
    assert!(err.is_fatal());
    assert!(registry.init().is_err());
    assert_eq!(host.privilege_calls.load(Ordering::SeqCst), 2);
    assert_eq!(host.enumerate_calls.load(Ordering::SeqCst), 0);
}

#[test]
fn test_device_table_overflow() {
    let host = two_device_host().with_caps(HostCaps {
        bus0_fun0_only: true,
        max_devices: 1,
    });
    let registry = DeviceRegistry::new(Arc::new(host));
    assert!(matches!(
        registry.init(),
        Err(PciError::TooManyDevices { found: 2, max: 1 })
    ));
}

#[test]
fn test_find_missing_device() {
    let registry = DeviceRegistry::new(Arc::new(two_device_host()));
    let err = registry.find(addr(7)).unwrap_err();
    assert!(err.is_not_found());
}

#[test]
fn test_map_requires_probed_device() {
    let host = Arc::new(two_device_host());
    let registry = Arc::new(DeviceRegistry::new(host.clone()));
    let config = ConfigSpace::new(registry.clone());

    // 尚未探测任何设备
    assert!(matches!(
        registry.map(0xfebc_0000, 0x1000),
        Err(PciError::NoRegion(0xfebc_0000))
    ));

    config.read32(addr(0), 0).unwrap();
    assert_eq!(registry.highest_probed(), Some(0));
    let window = registry.map(0xfebc_0000, 0x1000).unwrap();
    assert_eq!(window.len(), 0x2_0000);

    // 设备 #1 尚未探测
    assert!(registry.map(0xfe00_1000, 0x1000).is_err());
    config.read32(addr(3), 0).unwrap();
    let (device, region) = registry.find_by_region_base(0xfe00_1000).unwrap();
    assert_eq!((device.index(), region), (1, 1));
    registry.map(0xfe00_1000, 0x1000).unwrap();
}

#[test]
fn test_map_is_cached_per_region() {
    let host = Arc::new(two_device_host());
    let registry = DeviceRegistry::new(host.clone());
    registry.note_probed(1);

    let a = registry.map(0xfe00_0000, 0x10).unwrap();
    let b = registry.map(0xfe00_0000, 0x800).unwrap();
    assert_eq!(a, b);
    assert_eq!(host.map_calls.load(Ordering::SeqCst), 1);

    let device = registry.find(addr(3)).unwrap();
    assert_eq!(device.window(0), Some(a));
    assert_eq!(device.window(1), None);
}

#[test]
fn test_map_longer_than_region() {
    let registry = DeviceRegistry::new(Arc::new(two_device_host()));
    registry.note_probed(1);
    assert!(matches!(
        registry.map(0xfe00_0000, 0x2000),
        Err(PciError::RegionTooSmall { len: 0x2000, size: 0x1000 })
    ));
}

#[test]
fn test_highest_probed_is_monotonic() {
    let registry = Arc::new(DeviceRegistry::new(Arc::new(two_device_host())));
    let handles: Vec<_> = (0..16)
        .map(|i| {
            let registry = registry.clone();
            thread::spawn(move || {
                for _ in 0..1000 {
                    registry.note_probed(i % 4);
                }
            })
        })
        .collect();
    for h in handles {
        h.join().unwrap();
    }
    assert_eq!(registry.highest_probed(), Some(3));
    registry.note_probed(1);
    assert_eq!(registry.highest_probed(), Some(3));
}
