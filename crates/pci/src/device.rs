//! 设备与区域描述

use core::ptr::NonNull;

use once_cell::sync::OnceCell;

use crate::{PciAddress, PciError, PciHost};

/// 区域类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionKind {
    /// 内存映射 I/O
    Memory,
    /// 端口 I/O
    Io,
}

/// 主机报告的一个 BAR 区域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionInfo {
    /// BAR 序号（也是 sysfs `resourceN` 的 N）
    pub index: usize,
    /// 总线地址（物理基址）
    pub base: u64,
    /// 区域大小（字节）
    pub size: u64,
    /// 区域类型
    pub kind: RegionKind,
}

/// 主机枚举出的设备
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    /// 客户内核用来寻址该设备的 (bus, device, function)
    pub addr: PciAddress,
    /// 主机侧句柄（uio 序号、pciaccess 表下标等），对本 crate 不透明
    pub handle: usize,
    /// Vendor ID
    pub vendor_id: u16,
    /// Device ID
    pub device_id: u16,
    /// class code << 8 | revision
    pub class_revision: u32,
    /// 区域表
    pub regions: Vec<RegionInfo>,
}

/// 已映射到本进程的 MMIO 窗口
///
/// 映射在进程生命周期内有效，从不解除。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MmioWindow {
    ptr: NonNull<u8>,
    len: usize,
}

// SAFETY: 窗口指向进程共享映射，本身不携带线程局部状态；
// 对窗口内容的并发访问由客户内核驱动负责同步。
unsafe impl Send for MmioWindow {}
unsafe impl Sync for MmioWindow {}

impl MmioWindow {
    /// 由映射得到的指针构造窗口
    ///
    /// # Safety
    /// `ptr` 必须指向至少 `len` 字节、在进程生命周期内保持有效的映射。
    pub unsafe fn from_raw(ptr: NonNull<u8>, len: usize) -> Self {
        Self { ptr, len }
    }

    /// 窗口起始地址
    pub fn as_ptr(&self) -> *mut u8 {
        self.ptr.as_ptr()
    }

    /// 窗口长度
    pub fn len(&self) -> usize {
        self.len
    }

    /// 窗口是否为空
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }
}

/// 注册表中的设备
///
/// 在注册表初始化时创建，之后从不移除；每个区域的映射在第一次访问时建立并缓存。
#[derive(Debug)]
pub struct Device {
    index: usize,
    info: DeviceInfo,
    windows: Vec<OnceCell<MmioWindow>>,
}

impl Device {
    pub(crate) fn new(index: usize, info: DeviceInfo) -> Self {
        let windows = info.regions.iter().map(|_| OnceCell::new()).collect();
        Self {
            index,
            info,
            windows,
        }
    }

    /// 在注册表中的序号（初始化后稳定）
    pub fn index(&self) -> usize {
        self.index
    }

    /// 设备地址
    pub fn addr(&self) -> PciAddress {
        self.info.addr
    }

    /// 主机报告的原始信息
    pub fn info(&self) -> &DeviceInfo {
        &self.info
    }

    /// 区域表
    pub fn regions(&self) -> &[RegionInfo] {
        &self.info.regions
    }

    /// 已缓存的映射（未映射时为 `None`）
    pub fn window(&self, region: usize) -> Option<MmioWindow> {
        self.windows.get(region)?.get().copied()
    }

    /// 映射区域（整段映射并缓存），`len` 只用于检查
    pub(crate) fn map(
        &self,
        host: &dyn PciHost,
        region: usize,
        len: usize,
    ) -> Result<MmioWindow, PciError> {
        let info = &self.info.regions[region];
        if len as u64 > info.size {
            return Err(PciError::RegionTooSmall {
                len,
                size: info.size,
            });
        }
        self.windows[region]
            .get_or_try_init(|| {
                log::debug!(
                    "pci {}: mapping region {} ({:#x} bytes at {:#x})",
                    self.info.addr,
                    region,
                    info.size,
                    info.base
                );
                host.map_region(&self.info, region, info.size as usize)
            })
            .copied()
    }
}
