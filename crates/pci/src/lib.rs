//! PCI 设备注册表与配置空间访问
//!
//! 此 crate 提供：
//!
//! - [`PciAddress`] - (bus, device, function) 三元组
//! - [`DeviceInfo`] / [`Device`] - 主机枚举出的设备及其内存/IO 区域
//! - [`PciHost`] trait - 主机侧协作者（枚举、配置空间读写、MMIO 映射）
//! - [`DeviceRegistry`] - 一次性初始化的设备表，按地址或区域基址查找
//! - [`ConfigSpace`] - 32 位配置寄存器读写
//! - [`regs`] - 配置空间寄存器偏移与命令寄存器位
//!
//! # 架构解耦
//!
//! 平台相关的访问方式（sysfs 文件、I/O 端口、Mach 设备服务）全部通过
//! [`PciHost`] 注入，本 crate 只负责索引、簿记与错误语义。

mod address;
mod config;
mod device;
mod error;
mod host;
mod registry;

pub mod regs;

pub use address::PciAddress;
pub use config::{CONFIG_READ_FAILED, ConfigAccess, ConfigSpace};
pub use device::{Device, DeviceInfo, MmioWindow, RegionInfo, RegionKind};
pub use error::PciError;
pub use host::{HostCaps, PciHost};
pub use registry::DeviceRegistry;
