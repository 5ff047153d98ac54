//! 面向客户内核的能力接口

use std::sync::Arc;

use dma::{DmaAllocator, DmaRegion, DmaSegment, Paddr, Vaddr};
use irq::{IrqBridge, IrqHandle, IrqHandler, SchedOps};
use pci::{ConfigAccess, ConfigSpace, DeviceRegistry, MmioWindow, PciAddress};

use crate::backend::{self, Backend};
use crate::{BridgeConfig, BridgeError};

/// PCI 超级调用桥
///
/// 设备表在第一次使用时建立；建立失败（特权不足、设备表溢出）是致命的。
pub struct PciBridge {
    backend: Box<dyn Backend>,
    registry: Arc<DeviceRegistry>,
    config: Arc<ConfigSpace>,
    irq: IrqBridge,
    dma: DmaAllocator,
}

impl PciBridge {
    /// 用给定后端创建桥接，不做任何硬件访问
    pub fn new(backend: Box<dyn Backend>, sched: Arc<dyn SchedOps>) -> Self {
        let registry = Arc::new(DeviceRegistry::new(backend.pci_host()));
        let config = Arc::new(ConfigSpace::new(registry.clone()));
        let irq = IrqBridge::new(sched, backend.irq_source(registry.clone()), config.clone());
        let dma = backend.dma_allocator();
        log::info!("pcibridge: using {} backend", backend.name());
        Self {
            backend,
            registry,
            config,
            irq,
            dma,
        }
    }

    /// 按配置选择编译期启用的后端
    pub fn from_config(
        config: &BridgeConfig,
        sched: Arc<dyn SchedOps>,
    ) -> Result<Self, BridgeError> {
        Ok(Self::new(backend::select(config)?, sched))
    }

    /// 后端名
    pub fn backend_name(&self) -> &'static str {
        self.backend.name()
    }

    /// 获取原始 I/O 访问特权
    pub fn iospace_init(&self) -> Result<(), BridgeError> {
        self.backend.iospace_init().inspect_err(|e| {
            log::error!("pcibridge: iospace init failed: {}", e);
        })
    }

    /// 建立设备表，失败时返回错误而不终止进程
    pub fn try_init(&self) -> Result<(), BridgeError> {
        Ok(self.registry.init()?)
    }

    /// 设备表（必要时建立）
    ///
    /// 建立失败时记录日志并终止进程。
    pub fn registry(&self) -> &DeviceRegistry {
        if let Err(e) = self.registry.init() {
            log::error!("pcibridge: fatal: device registry bootstrap failed: {}", e);
            eprintln!("pcibridge: fatal: device registry bootstrap failed: {}", e);
            std::process::abort();
        }
        &self.registry
    }

    /// 读 32 位配置寄存器
    ///
    /// 失败时 C 接口向客户内核报告 [`CONFIG_READ_FAILED`](pci::CONFIG_READ_FAILED)。
    pub fn confread(&self, addr: PciAddress, reg: u16) -> Result<u32, BridgeError> {
        self.registry();
        Ok(self.config.read32(addr, reg)?)
    }

    /// 写 32 位配置寄存器
    pub fn confwrite(&self, addr: PciAddress, reg: u16, value: u32) -> Result<(), BridgeError> {
        self.registry();
        Ok(self.config.write32(addr, reg, value)?)
    }

    /// 把设备区域基址映射为本进程的 MMIO 窗口
    pub fn map(&self, base: u64, len: usize) -> Result<MmioWindow, BridgeError> {
        Ok(self.registry().map(base, len)?)
    }

    /// 以 `cookie` 登记设备的中断线
    pub fn irq_map(&self, addr: PciAddress, line: u32, cookie: u32) -> Result<(), BridgeError> {
        Ok(self.irq.map(addr, line, cookie)?)
    }

    /// 挂接处理函数并启动中断线程，中断线使能后才返回
    pub fn irq_establish<H: IrqHandler>(
        &self,
        cookie: u32,
        handler: H,
    ) -> Result<IrqHandle, BridgeError> {
        self.registry();
        Ok(self.irq.establish(cookie, handler)?)
    }

    /// 分配 DMA 内存
    pub fn dma_alloc(&self, size: usize, align: usize) -> Result<DmaRegion, BridgeError> {
        Ok(self.dma.alloc(size, align)?)
    }

    /// 释放 DMA 内存
    pub fn dma_free(&self, vaddr: Vaddr, size: usize) -> Result<(), BridgeError> {
        Ok(self.dma.free(vaddr, size)?)
    }

    /// 把单段 DMA 缓冲区映射到虚拟地址空间
    pub fn dma_map_segments(
        &self,
        segments: &[DmaSegment],
        total_len: usize,
    ) -> Result<Vaddr, BridgeError> {
        Ok(self.dma.map_segments(segments, total_len)?)
    }

    /// 虚拟地址到物理地址，无法翻译时为 0
    pub fn virt_to_phys(&self, vaddr: Vaddr) -> Paddr {
        self.dma.virt_to_phys(vaddr)
    }
}
