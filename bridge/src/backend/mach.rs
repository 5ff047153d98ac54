//! Mach 设备服务后端（GNU/Hurd）
//!
//! 内核原语（特权端口、pciaccess、设备中断注册、连续物理内存分配）由
//! [`MachHost`] 提供，本模块只负责把它们组装成各子系统的协作者。
//!
//! - 设备按 pciaccess 枚举顺序以 `(0, i, 0)` 呈现，只支持 bus 0 / function 0
//! - 不支持 MMIO 映射
//! - 中断线程：分配接收端口 → 提升优先级 → 注册中断线 → 使能；
//!   每条通知处理完成后重新使能
//! - DMA：`vm_allocate_contiguous` 直接给出物理地址，登记在 [`TrackedTable`] 中

use std::io;
use std::sync::Arc;

use dma::{Allocation, DmaAllocator, DmaError, DmaPlatform, Paddr, TrackedTable, Vaddr};
use irq::{IrqError, IrqEvent, IrqLine, IrqSource, IrqTarget};
use pci::{DeviceInfo, DeviceRegistry, HostCaps, PciAddress, PciError, PciHost, RegionInfo};

use super::Backend;
use crate::{BridgeConfig, BridgeError};

/// 内核调用返回码
pub type KernReturn = i32;

/// 端口名
pub type MachPort = u32;

const MACH_NOTIFY_FIRST: i32 = 0o100;

/// 中断通知消息 id
pub const MACH_INTR_NOTIFY: i32 = MACH_NOTIFY_FIRST + 0o110;

/// 注册中断线时的投递标志
pub const INTR_DELIVERY_FLAGS: u32 = 0x0400_0000;

/// 收到的消息
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MachMessage {
    /// 消息 id
    pub id: i32,
    /// 中断通知携带的中断线（其它消息无意义）
    pub line: u32,
}

/// pciaccess 报告的设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MachPciDevice {
    /// Vendor ID
    pub vendor_id: u16,
    /// Device ID
    pub device_id: u16,
    /// class code << 8 | revision
    pub class_revision: u32,
    /// 区域表
    pub regions: Vec<RegionInfo>,
}

/// Mach 内核原语
///
/// 所有方法都可能被多个线程并发调用；`receive` 只会被拥有该端口的中断线程调用。
pub trait MachHost: Send + Sync + 'static {
    /// 获取特权主机端口与设备端口
    fn get_privileged_ports(&self) -> Result<(), KernReturn>;

    /// 请求端口区间访问权限
    fn ioperm(&self, from: u32, num: u32) -> io::Result<()>;

    /// 枚举设备（pciaccess）
    fn devices(&self) -> Result<Vec<MachPciDevice>, KernReturn>;

    /// 读第 `index` 个设备的配置寄存器
    fn cfg_read_u32(&self, index: usize, reg: u16) -> Result<u32, KernReturn>;

    /// 写第 `index` 个设备的配置寄存器
    fn cfg_write_u32(&self, index: usize, reg: u16, value: u32) -> Result<(), KernReturn>;

    /// 分配接收端口
    fn port_allocate_receive(&self) -> Result<MachPort, KernReturn>;

    /// 设置当前线程优先级
    fn thread_priority(&self, priority: i32) -> Result<(), KernReturn>;

    /// 把中断线的通知注册到端口
    fn intr_register(&self, line: u32, flags: u32, port: MachPort) -> Result<(), KernReturn>;

    /// 使能中断线
    fn intr_enable(&self, line: u32) -> Result<(), KernReturn>;

    /// 阻塞接收端口上的下一条消息
    fn receive(&self, port: MachPort) -> Result<MachMessage, KernReturn>;

    /// 分配物理连续内存，返回 `(va, pa)`
    fn vm_allocate_contiguous(&self, size: usize) -> Result<(usize, usize), KernReturn>;

    /// 释放内存
    fn vm_deallocate(&self, va: usize, size: usize) -> Result<(), KernReturn>;

    /// 页大小
    fn page_size(&self) -> usize;
}

fn kern_io(call: &str, code: KernReturn) -> io::Error {
    io::Error::other(format!("{call} failed with {code:#x}"))
}

fn kernel(call: &'static str) -> impl FnOnce(KernReturn) -> IrqError {
    move |code| IrqError::Kernel { call, code }
}

/// Mach 设备枚举与配置空间
pub struct MachPciHost<H> {
    host: Arc<H>,
    max_devices: usize,
}

impl<H: MachHost> PciHost for MachPciHost<H> {
    fn caps(&self) -> HostCaps {
        HostCaps {
            bus0_fun0_only: true,
            max_devices: self.max_devices,
        }
    }

    fn acquire_privilege(&self) -> Result<(), PciError> {
        self.host
            .get_privileged_ports()
            .map_err(|code| PciError::Privilege(kern_io("get_privileged_ports", code)))
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, PciError> {
        let devices = self
            .host
            .devices()
            .map_err(|code| kern_io("pci_system_init", code))?;
        Ok(devices
            .into_iter()
            .enumerate()
            .filter_map(|(index, dev)| {
                let Some(device) = u8::try_from(index).ok() else {
                    log::warn!("mach: device #{} cannot be addressed, skipped", index);
                    return None;
                };
                Some(DeviceInfo {
                    addr: PciAddress::new(0, device, 0),
                    handle: index,
                    vendor_id: dev.vendor_id,
                    device_id: dev.device_id,
                    class_revision: dev.class_revision,
                    regions: dev.regions,
                })
            })
            .collect())
    }

    fn read_config(&self, device: &DeviceInfo, reg: u16) -> Result<u32, PciError> {
        self.host
            .cfg_read_u32(device.handle, reg)
            .map_err(|code| kern_io("pci_device_cfg_read_u32", code).into())
    }

    fn write_config(&self, device: &DeviceInfo, reg: u16, value: u32) -> Result<(), PciError> {
        self.host
            .cfg_write_u32(device.handle, reg, value)
            .map_err(|code| kern_io("pci_device_cfg_write_u32", code).into())
    }
}

/// 设备中断消息的通知源
pub struct MachIrqSource<H> {
    host: Arc<H>,
    priority: i32,
}

impl<H: MachHost> IrqSource for MachIrqSource<H> {
    fn open(&self, target: &IrqTarget) -> Result<Box<dyn IrqLine>, IrqError> {
        let port = self
            .host
            .port_allocate_receive()
            .map_err(kernel("mach_port_allocate"))?;
        self.host
            .thread_priority(self.priority)
            .map_err(kernel("thread_priority"))?;
        self.host
            .intr_register(target.line, INTR_DELIVERY_FLAGS, port)
            .map_err(kernel("device_intr_register"))?;
        self.host
            .intr_enable(target.line)
            .map_err(kernel("device_intr_enable"))?;
        Ok(Box::new(MachLine {
            host: self.host.clone(),
            port,
            line: target.line,
        }))
    }
}

struct MachLine<H> {
    host: Arc<H>,
    port: MachPort,
    line: u32,
}

impl<H: MachHost> IrqLine for MachLine<H> {
    fn wait(&mut self) -> Result<IrqEvent, IrqError> {
        let msg = self
            .host
            .receive(self.port)
            .map_err(kernel("mach_msg"))?;
        if msg.id != MACH_INTR_NOTIFY {
            return Ok(IrqEvent::Unrelated(msg.id));
        }
        Ok(IrqEvent::Interrupt { line: msg.line })
    }

    fn unmask(&mut self) -> Result<(), IrqError> {
        self.host
            .intr_enable(self.line)
            .map_err(kernel("device_intr_enable"))
    }
}

/// 连续物理内存
pub struct MachDma<H> {
    host: Arc<H>,
}

impl<H: MachHost> DmaPlatform for MachDma<H> {
    fn page_size(&self) -> usize {
        self.host.page_size()
    }

    fn alloc_contiguous(&self, size: usize, _align: usize) -> Result<Allocation, DmaError> {
        let (va, pa) = self
            .host
            .vm_allocate_contiguous(size)
            .map_err(|code| kern_io("vm_allocate_contiguous", code))?;
        Ok(Allocation {
            vaddr: Vaddr::from_usize(va),
            paddr: Some(Paddr::from_usize(pa)),
        })
    }

    fn release(&self, vaddr: Vaddr, size: usize) -> Result<(), DmaError> {
        self.host
            .vm_deallocate(vaddr.as_usize(), size)
            .map_err(|code| kern_io("vm_deallocate", code).into())
    }
}

/// Mach 后端
pub struct MachBackend<H> {
    host: Arc<H>,
    config: BridgeConfig,
}

impl<H: MachHost> MachBackend<H> {
    /// 用给定内核原语创建后端
    pub fn new(host: H, config: BridgeConfig) -> Self {
        Self {
            host: Arc::new(host),
            config,
        }
    }

    /// 内核原语
    pub fn host(&self) -> &Arc<H> {
        &self.host
    }
}

impl<H: MachHost> Backend for MachBackend<H> {
    fn name(&self) -> &'static str {
        "mach"
    }

    fn iospace_init(&self) -> Result<(), BridgeError> {
        self.host.ioperm(0, 0x10000).map_err(BridgeError::Privilege)
    }

    fn pci_host(&self) -> Arc<dyn PciHost> {
        Arc::new(MachPciHost {
            host: self.host.clone(),
            max_devices: self.config.max_devices,
        })
    }

    fn irq_source(&self, _registry: Arc<DeviceRegistry>) -> Arc<dyn IrqSource> {
        Arc::new(MachIrqSource {
            host: self.host.clone(),
            priority: self.config.irq_priority,
        })
    }

    fn dma_allocator(&self) -> DmaAllocator {
        DmaAllocator::new(
            Box::new(MachDma {
                host: self.host.clone(),
            }),
            Box::new(TrackedTable::new()),
        )
    }
}
