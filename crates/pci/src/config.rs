//! 配置空间访问
//!
//! 每次调用都是一次实时访问，不做缓存。

use std::sync::Arc;

use crate::{DeviceRegistry, PciAddress, PciError};

/// 读失败时交给客户内核的哨兵值
pub const CONFIG_READ_FAILED: u32 = 0xFFFF_FFFF;

/// 32 位配置寄存器读写接口
///
/// 中断线程通过它检查并恢复命令寄存器中的 INTx 屏蔽位。
pub trait ConfigAccess: Send + Sync {
    /// 读寄存器
    fn read32(&self, addr: PciAddress, reg: u16) -> Result<u32, PciError>;
    /// 写寄存器
    fn write32(&self, addr: PciAddress, reg: u16, value: u32) -> Result<(), PciError>;
}

/// 基于注册表的配置空间访问器
#[derive(Clone)]
pub struct ConfigSpace {
    registry: Arc<DeviceRegistry>,
}

impl ConfigSpace {
    /// 创建访问器
    pub fn new(registry: Arc<DeviceRegistry>) -> Self {
        Self { registry }
    }

    /// 所属注册表
    pub fn registry(&self) -> &Arc<DeviceRegistry> {
        &self.registry
    }

    fn check(&self, addr: PciAddress, reg: u16) -> Result<(), PciError> {
        if reg % 4 != 0 {
            return Err(PciError::Misaligned(reg));
        }
        if self.registry.host().caps().bus0_fun0_only && !addr.is_bus0_fun0() {
            return Err(PciError::Unsupported("bus or function other than 0"));
        }
        Ok(())
    }
}

impl ConfigAccess for ConfigSpace {
    fn read32(&self, addr: PciAddress, reg: u16) -> Result<u32, PciError> {
        self.check(addr, reg)?;
        let device = self.registry.find(addr)?;
        let value = self.registry.host().read_config(device.info(), reg)?;
        self.registry.note_probed(device.index());
        Ok(value)
    }

    fn write32(&self, addr: PciAddress, reg: u16, value: u32) -> Result<(), PciError> {
        self.check(addr, reg)?;
        let device = self.registry.find(addr)?;
        self.registry.host().write_config(device.info(), reg, value)
    }
}
