//! 0xCF8/0xCFC 配置机制 #1 后端（x86 Linux）
//!
//! 不依赖 sysfs 的设备表：直接通过 I/O 端口扫描 bus 0。
//!
//! ```text
//! CONFIG_ADDRESS (0xCF8) = 1 << 31 | bus << 16 | dev << 11 | fun << 8 | (reg & 0xFC)
//! CONFIG_DATA    (0xCFC) = 32 位寄存器值
//! ```
//!
//! BAR 大小按写全 1 再读回的方式探测；MMIO 经 `/dev/mem` 映射；
//! 中断复用绑定到同一槽位的 uio 节点；DMA 与 uio 后端相同。

use std::arch::asm;
use std::fs::OpenOptions;
use std::os::unix::fs::OpenOptionsExt;
use std::path::PathBuf;
use std::sync::Arc;

use dma::DmaAllocator;
use irq::{IrqError, IrqLine, IrqSource, IrqTarget};
use pci::regs::{self, Command, bar};
use pci::{
    DeviceInfo, DeviceRegistry, HostCaps, MmioWindow, PciAddress, PciError, PciHost, RegionInfo,
    RegionKind,
};
use sync::SpinLock;

use super::mem::{map_shared, pagemap_allocator};
use super::uio::{UioLine, uio_node_for_slot};
use super::{Backend, page_size};
use crate::{BridgeConfig, BridgeError};

/// CONFIG_ADDRESS 端口
pub const CONFIG_ADDRESS: u16 = 0xCF8;
/// CONFIG_DATA 端口
pub const CONFIG_DATA: u16 = 0xCFC;
const ENABLE: u32 = 1 << 31;
const DEVICES_PER_BUS: u8 = 32;
const FUNCTIONS_PER_DEVICE: u8 = 8;

/// 计算 CONFIG_ADDRESS 的值
pub const fn config_address(addr: PciAddress, reg: u16) -> u32 {
    ENABLE
        | (addr.bus as u32) << 16
        | ((addr.device & 0x1F) as u32) << 11
        | ((addr.function & 0x07) as u32) << 8
        | (reg as u32 & 0xFC)
}

/// # Safety
/// 调用方必须已获得该端口的访问权限。
unsafe fn outl(port: u16, value: u32) {
    // SAFETY: 由调用方保证端口权限
    unsafe {
        asm!(
            "out dx, eax",
            in("dx") port,
            in("eax") value,
            options(nomem, nostack, preserves_flags)
        );
    }
}

/// # Safety
/// 调用方必须已获得该端口的访问权限。
unsafe fn inl(port: u16) -> u32 {
    let value: u32;
    // SAFETY: 由调用方保证端口权限
    unsafe {
        asm!(
            "in eax, dx",
            out("eax") value,
            in("dx") port,
            options(nomem, nostack, preserves_flags)
        );
    }
    value
}

/// 由 BAR 原值与写全 1 后读回的掩码计算区域
///
/// 返回区域及该 BAR 占用的槽数（64 位内存 BAR 占两个）。
pub fn decode_bar(
    index: usize,
    low: u32,
    mask_low: u32,
    high: u32,
    mask_high: u32,
) -> (Option<RegionInfo>, usize) {
    if low & bar::IO != 0 {
        let size = (!(mask_low & bar::IO_ADDR_MASK) & 0xFFFF).wrapping_add(1);
        let region = (mask_low != 0 && size != 0).then_some(RegionInfo {
            index,
            base: u64::from(low & bar::IO_ADDR_MASK),
            size: u64::from(size),
            kind: RegionKind::Io,
        });
        return (region, 1);
    }

    let is_64 = low & bar::MEM_TYPE_MASK == bar::MEM_TYPE_64;
    let (base, mask) = if is_64 {
        (
            u64::from(high) << 32 | u64::from(low & bar::MEM_ADDR_MASK),
            u64::from(mask_high) << 32 | u64::from(mask_low & bar::MEM_ADDR_MASK),
        )
    } else {
        (
            u64::from(low & bar::MEM_ADDR_MASK),
            0xFFFF_FFFF_0000_0000 | u64::from(mask_low & bar::MEM_ADDR_MASK),
        )
    };
    let slots = if is_64 { 2 } else { 1 };
    if mask_low & bar::MEM_ADDR_MASK == 0 && (!is_64 || mask_high == 0) {
        return (None, slots);
    }
    let size = (!mask).wrapping_add(1);
    let region = (size != 0).then_some(RegionInfo {
        index,
        base,
        size,
        kind: RegionKind::Memory,
    });
    (region, slots)
}

/// 端口扫描的设备枚举与配置空间
pub struct Conf1Host {
    mem_path: PathBuf,
    max_devices: usize,
    // CONFIG_ADDRESS/CONFIG_DATA 两步访问必须成对
    port: SpinLock<()>,
}

impl Conf1Host {
    /// 创建主机访问接口
    pub fn new(mem_path: impl Into<PathBuf>, max_devices: usize) -> Self {
        Self {
            mem_path: mem_path.into(),
            max_devices,
            port: SpinLock::new(()),
        }
    }

    fn read(&self, addr: PciAddress, reg: u16) -> u32 {
        let _port = self.port.lock();
        // SAFETY: acquire_privilege 已请求 0xCF8..0xD00 的端口权限
        unsafe {
            outl(CONFIG_ADDRESS, config_address(addr, reg));
            inl(CONFIG_DATA)
        }
    }

    fn write(&self, addr: PciAddress, reg: u16, value: u32) {
        let _port = self.port.lock();
        // SAFETY: 同上
        unsafe {
            outl(CONFIG_ADDRESS, config_address(addr, reg));
            outl(CONFIG_DATA, value);
        }
    }

    fn size_bars(&self, addr: PciAddress) -> Vec<RegionInfo> {
        let command = self.read(addr, regs::COMMAND);
        // 探测期间关闭译码，避免写全 1 的 BAR 与其它设备冲突
        let decode = u32::from((Command::IO_SPACE | Command::MEMORY_SPACE).bits());
        self.write(addr, regs::COMMAND, command & !decode);

        let mut regions = Vec::new();
        let mut index = 0;
        while index < regs::BAR_COUNT {
            let reg = regs::BAR0 + 4 * index as u16;
            let low = self.read(addr, reg);
            self.write(addr, reg, u32::MAX);
            let mask_low = self.read(addr, reg);
            self.write(addr, reg, low);

            let (mut high, mut mask_high) = (0, 0);
            let is_64 = low & bar::IO == 0 && low & bar::MEM_TYPE_MASK == bar::MEM_TYPE_64;
            if is_64 && index + 1 < regs::BAR_COUNT {
                high = self.read(addr, reg + 4);
                self.write(addr, reg + 4, u32::MAX);
                mask_high = self.read(addr, reg + 4);
                self.write(addr, reg + 4, high);
            }

            let (region, slots) = decode_bar(index, low, mask_low, high, mask_high);
            regions.extend(region);
            index += slots;
        }

        self.write(addr, regs::COMMAND, command);
        regions
    }

    fn scan_slot(&self, addr: PciAddress, handle: usize) -> Option<DeviceInfo> {
        let id = self.read(addr, regs::VENDOR_ID);
        if id as u16 == regs::VENDOR_NONE {
            return None;
        }
        Some(DeviceInfo {
            addr,
            handle,
            vendor_id: id as u16,
            device_id: (id >> 16) as u16,
            class_revision: self.read(addr, regs::CLASS_REVISION),
            regions: self.size_bars(addr),
        })
    }
}

impl PciHost for Conf1Host {
    fn caps(&self) -> HostCaps {
        HostCaps {
            bus0_fun0_only: false,
            max_devices: self.max_devices,
        }
    }

    fn acquire_privilege(&self) -> Result<(), PciError> {
        ioperm(u64::from(CONFIG_ADDRESS), 8).map_err(|e| match e {
            BridgeError::Privilege(e) => PciError::Privilege(e),
            _ => PciError::Unsupported("I/O port permissions"),
        })
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, PciError> {
        let mut devices = Vec::new();
        for device in 0..DEVICES_PER_BUS {
            let addr = PciAddress::new(0, device, 0);
            let Some(info) = self.scan_slot(addr, devices.len()) else {
                continue;
            };
            let header = (self.read(addr, regs::HEADER_DWORD) >> 16) as u8;
            devices.push(info);
            if header & regs::HEADER_MULTI_FUNCTION != 0 {
                for function in 1..FUNCTIONS_PER_DEVICE {
                    let addr = PciAddress::new(0, device, function);
                    if let Some(info) = self.scan_slot(addr, devices.len()) {
                        devices.push(info);
                    }
                }
            }
        }
        Ok(devices)
    }

    fn read_config(&self, device: &DeviceInfo, reg: u16) -> Result<u32, PciError> {
        Ok(self.read(device.addr, reg))
    }

    fn write_config(&self, device: &DeviceInfo, reg: u16, value: u32) -> Result<(), PciError> {
        self.write(device.addr, reg, value);
        Ok(())
    }

    fn map_region(
        &self,
        device: &DeviceInfo,
        region: usize,
        len: usize,
    ) -> Result<MmioWindow, PciError> {
        let info = &device.regions[region];
        if info.kind != RegionKind::Memory {
            return Err(PciError::Unsupported("mapping an I/O port region"));
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(libc::O_SYNC)
            .open(&self.mem_path)?;
        Ok(map_shared(&file, len, info.base)?)
    }
}

/// 请求端口区间的访问权限
fn ioperm(from: u64, num: u64) -> Result<(), BridgeError> {
    // SAFETY: ioperm 只修改本进程的 I/O 位图
    let ret = unsafe { libc::ioperm(from as libc::c_ulong, num as libc::c_ulong, 1) };
    if ret == -1 {
        return Err(BridgeError::Privilege(std::io::Error::last_os_error()));
    }
    Ok(())
}

/// 按槽位查找 uio 节点的中断通知源
pub struct SlotIrqSource {
    uio_root: PathBuf,
    dev_root: PathBuf,
}

impl IrqSource for SlotIrqSource {
    fn open(&self, target: &IrqTarget) -> Result<Box<dyn IrqLine>, IrqError> {
        let node = uio_node_for_slot(&self.uio_root, target.addr)
            .ok_or(IrqError::Pci(PciError::NoDevice(target.addr)))?;
        let path = self.dev_root.join(format!("uio{}", node));
        Ok(Box::new(UioLine::open(&path, target.line)?))
    }
}

/// 端口扫描后端
pub struct Conf1Backend {
    config: BridgeConfig,
    page_size: usize,
}

impl Conf1Backend {
    /// 创建后端
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            page_size: page_size(),
        }
    }
}

impl Backend for Conf1Backend {
    fn name(&self) -> &'static str {
        "conf1"
    }

    fn iospace_init(&self) -> Result<(), BridgeError> {
        ioperm(u64::from(CONFIG_ADDRESS), 8)
    }

    fn pci_host(&self) -> Arc<dyn PciHost> {
        Arc::new(Conf1Host::new(&self.config.mem_path, self.config.max_devices))
    }

    fn irq_source(&self, _registry: Arc<DeviceRegistry>) -> Arc<dyn IrqSource> {
        Arc::new(SlotIrqSource {
            uio_root: self.config.uio_root.clone(),
            dev_root: self.config.dev_root.clone(),
        })
    }

    fn dma_allocator(&self) -> DmaAllocator {
        pagemap_allocator(self.page_size, &self.config.pagemap_path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_address_layout() {
        assert_eq!(config_address(PciAddress::new(0, 0, 0), 0), 0x8000_0000);
        assert_eq!(
            config_address(PciAddress::new(1, 3, 2), 0x3E),
            0x8000_0000 | 1 << 16 | 3 << 11 | 2 << 8 | 0x3C
        );
    }

    #[test]
    fn test_decode_32bit_memory_bar() {
        let (region, slots) = decode_bar(0, 0xfebc_0000, 0xfffe_0000, 0, 0);
        assert_eq!(slots, 1);
        let region = region.unwrap();
        assert_eq!((region.base, region.size), (0xfebc_0000, 0x2_0000));
        assert_eq!(region.kind, RegionKind::Memory);
    }

    #[test]
    fn test_decode_64bit_memory_bar() {
        let (region, slots) = decode_bar(2, 0xc000_000c, 0xffff_c00c, 0x1, 0xffff_ffff);
        assert_eq!(slots, 2);
        let region = region.unwrap();
        assert_eq!(region.base, 0x1_c000_0000);
        assert_eq!(region.size, 0x4000);
    }

    #[test]
    fn test_decode_io_bar() {
        let (region, slots) = decode_bar(4, 0xc001, 0xffff_ffe1, 0, 0);
        assert_eq!(slots, 1);
        let region = region.unwrap();
        assert_eq!((region.base, region.size), (0xc000, 0x20));
        assert_eq!(region.kind, RegionKind::Io);
    }

    #[test]
    fn test_decode_unimplemented_bar() {
        assert_eq!(decode_bar(1, 0, 0, 0, 0), (None, 1));
    }
}
