//! 错误分类与 errno 映射测试

use std::io;

use dma::{DmaError, Vaddr};
use irq::IrqError;
use pci::{PciAddress, PciError};
use pcibridge::BridgeError;

#[test]
fn test_not_found_maps_to_enoent() {
    let cases: Vec<BridgeError> = vec![
        PciError::NoDevice(PciAddress::new(0, 1, 0)).into(),
        PciError::NoRegion(0xfe00_0000).into(),
        DmaError::UnknownRegion(Vaddr::from_usize(0x1000)).into(),
        IrqError::NotMapped(3).into(),
    ];
    for e in cases {
        assert!(e.is_not_found(), "{e}");
        assert_eq!(e.to_errno(), libc::ENOENT, "{e}");
    }
}

#[test]
fn test_capability_gaps_map_to_enotsup() {
    let cases: Vec<BridgeError> = vec![
        DmaError::MultiSegment(2).into(),
        DmaError::AlignmentUnsupported {
            align: 8192,
            page_size: 4096,
        }
        .into(),
        BridgeError::Unsupported("I/O privilege level"),
    ];
    for e in cases {
        assert!(e.is_unsupported(), "{e}");
        assert!(!e.is_not_found(), "{e}");
        assert_eq!(e.to_errno(), libc::ENOTSUP, "{e}");
    }
    let mmio: BridgeError = PciError::Unsupported("MMIO region mapping").into();
    assert!(mmio.is_unsupported());
    assert_eq!(mmio.to_errno(), libc::ENOSYS);
}

#[test]
fn test_privilege_keeps_os_errno() {
    let e = BridgeError::Privilege(io::Error::from_raw_os_error(libc::EPERM));
    assert_eq!(e.to_errno(), libc::EPERM);
    let e: BridgeError = PciError::Privilege(io::Error::other("denied")).into();
    assert_eq!(e.to_errno(), libc::EPERM);
}

#[test]
fn test_irq_registration_conflicts() {
    let e: BridgeError = IrqError::CookieInUse(1).into();
    assert_eq!(e.to_errno(), libc::EEXIST);
    let e: BridgeError = IrqError::AlreadyEstablished(1).into();
    assert_eq!(e.to_errno(), libc::EEXIST);
    let e: BridgeError = IrqError::Pci(PciError::NoDevice(PciAddress::new(0, 2, 0))).into();
    assert!(e.is_not_found());
}
