//! 主机侧协作者接口

use crate::{DeviceInfo, MmioWindow, PciError};

/// 后端能力描述
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HostCaps {
    /// 只能访问 bus 0 / function 0 上的设备
    pub bus0_fun0_only: bool,
    /// 设备表容量，超出即为致命配置错误
    pub max_devices: usize,
}

/// PCI 主机访问接口
///
/// 由各后端实现（sysfs/uio、I/O 端口扫描、Mach 设备服务）。
/// 配置空间访问之间不做互斥，底层机制自行串行化。
pub trait PciHost: Send + Sync {
    /// 后端能力
    fn caps(&self) -> HostCaps;

    /// 获取枚举和访问设备所需的特权，注册表初始化时调用一次
    fn acquire_privilege(&self) -> Result<(), PciError> {
        Ok(())
    }

    /// 枚举设备，返回顺序即注册表序号
    fn enumerate(&self) -> Result<Vec<DeviceInfo>, PciError>;

    /// 读 32 位配置寄存器
    fn read_config(&self, device: &DeviceInfo, reg: u16) -> Result<u32, PciError>;

    /// 写 32 位配置寄存器
    fn write_config(&self, device: &DeviceInfo, reg: u16, value: u32) -> Result<(), PciError>;

    /// 把区域映射到本进程
    fn map_region(
        &self,
        _device: &DeviceInfo,
        _region: usize,
        _len: usize,
    ) -> Result<MmioWindow, PciError> {
        Err(PciError::Unsupported("MMIO region mapping"))
    }
}
