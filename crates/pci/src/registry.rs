//! 设备注册表
//!
//! 注册表在第一次使用时枚举主机设备，之后序号稳定、条目不再增删。
//! 唯一的可变簿记是"已探测的最高设备序号"，由一把自旋锁保护。

use std::sync::Arc;

use once_cell::sync::OnceCell;
use sync::SpinLock;

use crate::{Device, MmioWindow, PciAddress, PciError, PciHost};

/// PCI 设备注册表
pub struct DeviceRegistry {
    host: Arc<dyn PciHost>,
    devices: OnceCell<Vec<Arc<Device>>>,
    /// 客户内核已通过配置空间成功探测过的最高设备序号
    highest_probed: SpinLock<Option<usize>>,
}

impl DeviceRegistry {
    /// 创建注册表，不做任何硬件访问
    pub fn new(host: Arc<dyn PciHost>) -> Self {
        Self {
            host,
            devices: OnceCell::new(),
            highest_probed: SpinLock::new(None),
        }
    }

    /// 主机访问接口
    pub fn host(&self) -> &dyn PciHost {
        &*self.host
    }

    /// 初始化注册表（幂等）
    ///
    /// 第一次调用时获取特权并枚举设备；并发调用只会有一个执行枚举。
    /// 失败时不缓存结果，错误原样返回，是否致命由调用方决定。
    pub fn init(&self) -> Result<(), PciError> {
        self.devices().map(|_| ())
    }

    /// 是否已初始化
    pub fn is_initialized(&self) -> bool {
        self.devices.get().is_some()
    }

    /// 全部设备（必要时先初始化）
    pub fn devices(&self) -> Result<&[Arc<Device>], PciError> {
        self.devices
            .get_or_try_init(|| {
                self.host.acquire_privilege()?;
                let infos = self.host.enumerate()?;
                let max = self.host.caps().max_devices;
                if infos.len() > max {
                    return Err(PciError::TooManyDevices {
                        found: infos.len(),
                        max,
                    });
                }
                log::info!("pci: registry built with {} device(s)", infos.len());
                Ok(infos
                    .into_iter()
                    .enumerate()
                    .map(|(i, info)| {
                        log::debug!(
                            "pci: #{} {} {:04x}:{:04x}",
                            i,
                            info.addr,
                            info.vendor_id,
                            info.device_id
                        );
                        Arc::new(Device::new(i, info))
                    })
                    .collect())
            })
            .map(Vec::as_slice)
    }

    /// 按地址查找设备
    pub fn find(&self, addr: PciAddress) -> Result<Arc<Device>, PciError> {
        self.devices()?
            .iter()
            .find(|d| d.addr() == addr)
            .cloned()
            .ok_or(PciError::NoDevice(addr))
    }

    /// 按区域基址查找设备与区域序号
    ///
    /// 只在已探测过的设备（序号不超过 [`highest_probed`](Self::highest_probed)）中查找：
    /// 客户内核总是先读配置空间、再映射它在 BAR 中看到的地址。
    pub fn find_by_region_base(&self, base: u64) -> Result<(Arc<Device>, usize), PciError> {
        let Some(highest) = self.highest_probed() else {
            return Err(PciError::NoRegion(base));
        };
        self.devices()?
            .iter()
            .take(highest + 1)
            .find_map(|d| {
                d.regions()
                    .iter()
                    .position(|r| r.size != 0 && r.base == base)
                    .map(|idx| (d.clone(), idx))
            })
            .ok_or(PciError::NoRegion(base))
    }

    /// 把设备区域映射到本进程，结果按区域缓存
    pub fn map(&self, base: u64, len: usize) -> Result<MmioWindow, PciError> {
        let (device, region) = self.find_by_region_base(base)?;
        device.map(&*self.host, region, len)
    }

    /// 记录一次成功的配置空间探测
    pub fn note_probed(&self, index: usize) {
        let mut highest = self.highest_probed.lock();
        if highest.is_none_or(|h| index > h) {
            *highest = Some(index);
        }
    }

    /// 已探测的最高设备序号
    pub fn highest_probed(&self) -> Option<usize> {
        *self.highest_probed.lock()
    }
}
