//! PCI 地址

use core::fmt;

/// 设备在 PCI 总线上的位置
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PciAddress {
    /// 总线号
    pub bus: u8,
    /// 设备号（0..32）
    pub device: u8,
    /// 功能号（0..8）
    pub function: u8,
}

impl PciAddress {
    /// 构造地址
    pub const fn new(bus: u8, device: u8, function: u8) -> Self {
        Self {
            bus,
            device,
            function,
        }
    }

    /// 由客户内核传入的无符号整数构造地址，超出范围时返回 `None`
    pub fn from_raw(bus: u32, device: u32, function: u32) -> Option<Self> {
        Some(Self {
            bus: u8::try_from(bus).ok()?,
            device: u8::try_from(device).ok()?,
            function: u8::try_from(function).ok()?,
        })
    }

    /// 总线号与功能号是否都为 0
    pub fn is_bus0_fun0(&self) -> bool {
        self.bus == 0 && self.function == 0
    }
}

impl fmt::Display for PciAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02x}:{:02x}.{}", self.bus, self.device, self.function)
    }
}
