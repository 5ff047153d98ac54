//! pcibridge - 用户态 PCI 超级调用桥
//!
//! 让运行在用户进程中的客户内核（rump kernel）驱动真实的 PCI 设备：
//! 配置空间读写、MMIO 映射、中断投递和 DMA 内存。
//!
//! # 组成
//!
//! - [`PciBridge`]：面向客户内核的完整能力接口
//! - [`backend`]：平台后端（sysfs/uio、0xCF8 端口扫描、Mach 设备服务）
//! - [`BridgeConfig`]：路径与容量配置，可由环境变量覆盖
//! - [`BridgeError`]：统一错误类型及其 errno 映射
//!
//! 启用 `rumpuser` feature 时导出 `rumpcomp_pci_*` C 接口。

pub mod backend;
mod bridge;
mod config;
mod error;
#[cfg(feature = "rumpuser")]
pub mod ffi;

pub use bridge::PciBridge;
pub use config::BridgeConfig;
pub use error::BridgeError;

pub use dma::{DmaRegion, DmaSegment, Paddr, Vaddr};
pub use irq::{IrqHandle, SchedOps, SchedRegion};
pub use pci::{CONFIG_READ_FAILED, MmioWindow, PciAddress};
