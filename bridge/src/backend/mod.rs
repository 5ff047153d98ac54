//! 平台后端
//!
//! 每个后端把某个平台的设备枚举、配置空间、中断通知和 DMA 内存机制
//! 组装成各子系统需要的协作者：
//!
//! | 后端 | 配置空间 | MMIO | 中断 | DMA 翻译 |
//! |------|----------|------|------|----------|
//! | [`uio`] | sysfs `config` | sysfs `resourceN` | `/dev/uioN` 阻塞读 | pagemap |
//! | `conf1` | 0xCF8/0xCFC 端口 | `/dev/mem` | 按槽位匹配的 uio 节点 | pagemap |
//! | [`mach`] | pciaccess | 不支持 | 设备中断消息 | 分配时登记 |
//!
//! 编译期按 feature 选择，`conf1` 优先于 `uio`；Mach 后端需要调用方提供
//! [`mach::MachHost`] 实现，不参与自动选择。

use std::sync::Arc;

use dma::DmaAllocator;
use irq::IrqSource;
use pci::{DeviceRegistry, PciHost};

use crate::{BridgeConfig, BridgeError};

#[cfg(all(
    feature = "backend-conf1",
    target_os = "linux",
    any(target_arch = "x86", target_arch = "x86_64")
))]
pub mod conf1;
pub mod mach;
pub mod uio;

mod mem;

/// 平台后端
pub trait Backend: Send + Sync {
    /// 后端名
    fn name(&self) -> &'static str;

    /// 获取原始 I/O 访问特权
    fn iospace_init(&self) -> Result<(), BridgeError>;

    /// 设备枚举与配置空间访问
    fn pci_host(&self) -> Arc<dyn PciHost>;

    /// 中断通知源；需要按设备查找主机句柄的后端使用注册表
    fn irq_source(&self, registry: Arc<DeviceRegistry>) -> Arc<dyn IrqSource>;

    /// DMA 分配器（平台内存 + 翻译策略）
    fn dma_allocator(&self) -> DmaAllocator;
}

/// 按编译期 feature 选择后端
#[allow(unreachable_code)]
pub fn select(config: &BridgeConfig) -> Result<Box<dyn Backend>, BridgeError> {
    #[cfg(all(
        feature = "backend-conf1",
        target_os = "linux",
        any(target_arch = "x86", target_arch = "x86_64")
    ))]
    return Ok(Box::new(conf1::Conf1Backend::new(config.clone())));

    #[cfg(feature = "backend-uio")]
    return Ok(Box::new(uio::UioBackend::new(config.clone())));

    let _ = config;
    Err(BridgeError::Unsupported("PCI backend"))
}

/// 平台页大小
pub fn page_size() -> usize {
    // SAFETY: sysconf 无副作用
    let size = unsafe { libc::sysconf(libc::_SC_PAGESIZE) };
    if size <= 0 { 4096 } else { size as usize }
}

/// 提升 I/O 特权级（x86 Linux）
#[cfg(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
))]
pub(crate) fn iopl(level: i32) -> Result<(), BridgeError> {
    // SAFETY: iopl 只修改本进程的 I/O 特权级
    if unsafe { libc::iopl(level) } == -1 {
        return Err(BridgeError::Privilege(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// 提升 I/O 特权级（其它平台不支持）
#[cfg(not(all(
    target_os = "linux",
    target_env = "gnu",
    any(target_arch = "x86", target_arch = "x86_64")
)))]
pub(crate) fn iopl(_level: i32) -> Result<(), BridgeError> {
    Err(BridgeError::Unsupported("I/O privilege level"))
}
