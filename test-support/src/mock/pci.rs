//! PCI 主机的 Mock 实现
//!
//! 每个设备一块 256 字节的内存配置空间，初始内容由设备描述生成。

use std::collections::HashMap;
use std::ptr::NonNull;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use pci::regs;
use pci::{
    DeviceInfo, HostCaps, MmioWindow, PciAddress, PciError, PciHost, RegionInfo, RegionKind,
};

const CONFIG_DWORDS: usize = 64;

/// Mock PCI 主机
pub struct MockPciHost {
    caps: HostCaps,
    devices: Vec<DeviceInfo>,
    config: Mutex<HashMap<usize, [u32; CONFIG_DWORDS]>>,
    deny_privilege: bool,
    /// `acquire_privilege` 调用次数
    pub privilege_calls: AtomicUsize,
    /// `enumerate` 调用次数
    pub enumerate_calls: AtomicUsize,
    /// 配置空间读次数
    pub reads: AtomicUsize,
    /// 配置空间写次数
    pub writes: AtomicUsize,
    /// 区域映射次数
    pub map_calls: AtomicUsize,
}

impl MockPciHost {
    /// 空主机：任意 bus/function，容量 32
    pub fn new() -> Self {
        Self {
            caps: HostCaps {
                bus0_fun0_only: false,
                max_devices: 32,
            },
            devices: Vec::new(),
            config: Mutex::new(HashMap::new()),
            deny_privilege: false,
            privilege_calls: AtomicUsize::new(0),
            enumerate_calls: AtomicUsize::new(0),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
            map_calls: AtomicUsize::new(0),
        }
    }

    /// 设置后端能力
    pub fn with_caps(mut self, caps: HostCaps) -> Self {
        self.caps = caps;
        self
    }

    /// 让特权获取失败
    pub fn deny_privilege(mut self) -> Self {
        self.deny_privilege = true;
        self
    }

    /// 添加设备，`regions` 为 `(base, size)` 的内存区域；句柄即添加顺序
    pub fn with_device(
        mut self,
        addr: PciAddress,
        vendor_id: u16,
        device_id: u16,
        regions: &[(u64, u64)],
    ) -> Self {
        let handle = self.devices.len();
        let regions: Vec<RegionInfo> = regions
            .iter()
            .enumerate()
            .map(|(index, &(base, size))| RegionInfo {
                index,
                base,
                size,
                kind: RegionKind::Memory,
            })
            .collect();

        let mut space = [0u32; CONFIG_DWORDS];
        space[0] = u32::from(device_id) << 16 | u32::from(vendor_id);
        space[usize::from(regs::COMMAND) / 4] =
            u32::from((regs::Command::MEMORY_SPACE | regs::Command::BUS_MASTER).bits());
        for region in &regions {
            space[usize::from(regs::BAR0) / 4 + region.index] = region.base as u32;
        }
        self.config.get_mut().unwrap().insert(handle, space);

        self.devices.push(DeviceInfo {
            addr,
            handle,
            vendor_id,
            device_id,
            class_revision: 0,
            regions,
        });
        self
    }

    /// 直接读取设备配置空间（不计数）
    pub fn config_dword(&self, handle: usize, reg: u16) -> u32 {
        self.config.lock().unwrap()[&handle][usize::from(reg) / 4]
    }

    /// 直接修改设备配置空间（不计数）
    pub fn set_config_dword(&self, handle: usize, reg: u16, value: u32) {
        self.config.lock().unwrap().get_mut(&handle).unwrap()[usize::from(reg) / 4] = value;
    }
}

impl Default for MockPciHost {
    fn default() -> Self {
        Self::new()
    }
}

impl PciHost for MockPciHost {
    fn caps(&self) -> HostCaps {
        self.caps
    }

    fn acquire_privilege(&self) -> Result<(), PciError> {
        self.privilege_calls.fetch_add(1, Ordering::SeqCst);
        if self.deny_privilege {
            return Err(PciError::Privilege(std::io::Error::from_raw_os_error(1)));
        }
        Ok(())
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, PciError> {
        self.enumerate_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.devices.clone())
    }

    fn read_config(&self, device: &DeviceInfo, reg: u16) -> Result<u32, PciError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.config_dword(device.handle, reg))
    }

    fn write_config(&self, device: &DeviceInfo, reg: u16, value: u32) -> Result<(), PciError> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.set_config_dword(device.handle, reg, value);
        Ok(())
    }

    fn map_region(
        &self,
        _device: &DeviceInfo,
        _region: usize,
        len: usize,
    ) -> Result<MmioWindow, PciError> {
        self.map_calls.fetch_add(1, Ordering::SeqCst);
        let buf: &'static mut [u8] = Box::leak(vec![0u8; len.max(1)].into_boxed_slice());
        let ptr = NonNull::new(buf.as_mut_ptr()).unwrap();
        // SAFETY: 泄漏的缓冲区在进程生命周期内有效
        Ok(unsafe { MmioWindow::from_raw(ptr, len) })
    }
}
