//! 桥接错误类型

use std::io;

use dma::DmaError;
use irq::IrqError;
use pci::PciError;
use thiserror::Error;

/// 桥接错误
#[derive(Debug, Error)]
pub enum BridgeError {
    /// 设备表/配置空间/MMIO 映射错误
    #[error(transparent)]
    Pci(#[from] PciError),
    /// DMA 错误
    #[error(transparent)]
    Dma(#[from] DmaError),
    /// 中断错误
    #[error(transparent)]
    Irq(#[from] IrqError),
    /// 配置值非法
    #[error("invalid value {value:?} for {key}")]
    Config {
        /// 配置键
        key: &'static str,
        /// 原始值
        value: String,
    },
    /// 当前平台或后端不支持
    #[error("{0} is not supported on this platform")]
    Unsupported(&'static str),
    /// 无法获得 I/O 特权
    #[error("failed to acquire I/O privilege: {0}")]
    Privilege(#[source] io::Error),
}

fn os_errno(e: &io::Error, fallback: i32) -> i32 {
    e.raw_os_error().unwrap_or(fallback)
}

fn pci_errno(e: &PciError) -> i32 {
    match e {
        PciError::NoDevice(_) | PciError::NoRegion(_) => libc::ENOENT,
        PciError::RegionTooSmall { .. } | PciError::Misaligned(_) => libc::EINVAL,
        PciError::Unsupported(_) => libc::ENOSYS,
        PciError::Privilege(e) => os_errno(e, libc::EPERM),
        PciError::TooManyDevices { .. } => libc::ENOSPC,
        PciError::Io(e) => os_errno(e, libc::EIO),
    }
}

impl BridgeError {
    /// 映射为 errno，交给 C 接口
    pub fn to_errno(&self) -> i32 {
        match self {
            BridgeError::Pci(e) => pci_errno(e),
            BridgeError::Dma(e) => match e {
                DmaError::AlignmentUnsupported { .. } | DmaError::MultiSegment(_) => libc::ENOTSUP,
                DmaError::InvalidSegments(_) | DmaError::ZeroSize => libc::EINVAL,
                DmaError::UnknownRegion(_) => libc::ENOENT,
                DmaError::Unresolved(_) => libc::EFAULT,
                DmaError::Platform(e) => os_errno(e, libc::ENOMEM),
            },
            BridgeError::Irq(e) => match e {
                IrqError::NotMapped(_) => libc::ENOENT,
                IrqError::CookieInUse(_) | IrqError::AlreadyEstablished(_) => libc::EEXIST,
                IrqError::Kernel { .. } | IrqError::ThreadExited(_) => libc::EIO,
                IrqError::Platform(e) => os_errno(e, libc::EIO),
                IrqError::ThreadSpawn(e) => os_errno(e, libc::EAGAIN),
                IrqError::Pci(e) => pci_errno(e),
            },
            BridgeError::Config { .. } => libc::EINVAL,
            BridgeError::Unsupported(_) => libc::ENOTSUP,
            BridgeError::Privilege(e) => os_errno(e, libc::EPERM),
        }
    }

    /// 是否为"不存在"类错误
    pub fn is_not_found(&self) -> bool {
        match self {
            BridgeError::Pci(e) => e.is_not_found(),
            BridgeError::Dma(e) => matches!(e, DmaError::UnknownRegion(_)),
            BridgeError::Irq(e) => e.is_not_found(),
            _ => false,
        }
    }

    /// 是否为能力缺失
    pub fn is_unsupported(&self) -> bool {
        match self {
            BridgeError::Pci(e) => matches!(e, PciError::Unsupported(_)),
            BridgeError::Dma(e) => e.is_unsupported(),
            BridgeError::Unsupported(_) => true,
            _ => false,
        }
    }
}
