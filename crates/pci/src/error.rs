//! PCI 错误类型

use std::io;

use thiserror::Error;

use crate::PciAddress;

/// 设备表与配置空间访问的错误
#[derive(Debug, Error)]
pub enum PciError {
    /// 该地址上没有设备
    #[error("no device at {0}")]
    NoDevice(PciAddress),
    /// 没有设备声明该基址的区域
    #[error("no probed device has a region based at {0:#x}")]
    NoRegion(u64),
    /// 请求的映射长度超出区域大小
    #[error("mapping of {len:#x} bytes exceeds region size {size:#x}")]
    RegionTooSmall {
        /// 请求长度
        len: usize,
        /// 区域大小
        size: u64,
    },
    /// 寄存器偏移未按 4 字节对齐
    #[error("register offset {0:#x} is not 4-byte aligned")]
    Misaligned(u16),
    /// 后端能力不足（例如只支持 bus 0 / function 0）
    #[error("{0} is not supported by this backend")]
    Unsupported(&'static str),
    /// 无法获得访问硬件所需的特权
    #[error("failed to acquire hardware access privilege: {0}")]
    Privilege(#[source] io::Error),
    /// 枚举出的设备超过后端设备表容量
    #[error("host reported {found} devices, backend table holds {max}")]
    TooManyDevices {
        /// 实际枚举数量
        found: usize,
        /// 设备表容量
        max: usize,
    },
    /// 主机侧 I/O 失败
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl PciError {
    /// 是否为"不存在"类错误（可恢复，调用方应视为无此设备）
    pub fn is_not_found(&self) -> bool {
        matches!(self, PciError::NoDevice(_) | PciError::NoRegion(_))
    }

    /// 是否为致命的引导期错误（特权获取失败、设备表溢出）
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            PciError::Privilege(_) | PciError::TooManyDevices { .. }
        )
    }
}
