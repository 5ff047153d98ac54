//! `rumpcomp_pci_*` C 接口
//!
//! 全局桥接在第一次调用时按环境变量配置建立。返回 `int` 的入口在成功时
//! 返回 0，失败时返回经 `rumpuser_component_errtrans` 转换的错误码。

use std::ffi::{c_int, c_uint, c_ulong, c_void};
use std::ptr;
use std::sync::Arc;

use lazy_static::lazy_static;

use crate::{
    BridgeConfig, BridgeError, CONFIG_READ_FAILED, DmaSegment, Paddr, PciAddress, PciBridge,
    SchedOps, SchedRegion, Vaddr,
};

unsafe extern "C" {
    fn rumpuser_component_kthread();
    fn rumpuser_component_schedule(cookie: *mut c_void);
    fn rumpuser_component_unschedule();
    fn rumpuser_component_errtrans(err: c_int) -> c_int;
}

/// 客户内核的调度交接
struct RumpSched;

impl SchedOps for RumpSched {
    fn kthread(&self) {
        // SAFETY: 客户内核提供的超级调用
        unsafe { rumpuser_component_kthread() }
    }

    fn schedule(&self) {
        // SAFETY: 同上
        unsafe { rumpuser_component_schedule(ptr::null_mut()) }
    }

    fn unschedule(&self) {
        // SAFETY: 同上
        unsafe { rumpuser_component_unschedule() }
    }
}

lazy_static! {
    static ref BRIDGE: Result<PciBridge, BridgeError> = {
        let config = BridgeConfig::from_env();
        klog::init(config.as_ref().map_or(klog::DEFAULT_LOG_LEVEL, |c| c.log_level));
        config.and_then(|config| PciBridge::from_config(&config, Arc::new(RumpSched)))
    };
}

fn bridge() -> Result<&'static PciBridge, BridgeError> {
    BRIDGE.as_ref().map_err(|e| {
        log::error!("pcibridge: not available: {}", e);
        BridgeError::Unsupported("PCI bridge")
    })
}

fn errno(e: &BridgeError) -> c_int {
    // SAFETY: 客户内核提供的超级调用
    unsafe { rumpuser_component_errtrans(e.to_errno()) }
}

fn status(result: Result<(), BridgeError>) -> c_int {
    match result {
        Ok(()) => 0,
        Err(e) => errno(&e),
    }
}

fn address(bus: c_uint, dev: c_uint, fun: c_uint) -> Result<PciAddress, BridgeError> {
    PciAddress::from_raw(bus, dev, fun)
        .ok_or(BridgeError::Pci(pci::PciError::Unsupported("address out of range")))
}

fn register(reg: c_int) -> Result<u16, BridgeError> {
    u16::try_from(reg).map_err(|_| BridgeError::Pci(pci::PciError::Misaligned(reg as u16)))
}

/// 获取原始 I/O 访问特权
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_iospace_init() -> c_int {
    status(bridge().and_then(PciBridge::iospace_init))
}

/// 把设备区域映射到本进程，失败时返回 NULL
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_map(addr: c_ulong, len: c_ulong) -> *mut c_void {
    match bridge().and_then(|b| b.map(addr as u64, len as usize)) {
        Ok(window) => window.as_ptr().cast(),
        Err(e) => {
            log::debug!("pcibridge: map {:#x}: {}", addr, e);
            ptr::null_mut()
        }
    }
}

/// 读配置寄存器，失败时 `*rv` 为 0xFFFFFFFF
///
/// # Safety
/// `rv` 必须指向可写的 `unsigned int`。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rumpcomp_pci_confread(
    bus: c_uint,
    dev: c_uint,
    fun: c_uint,
    reg: c_int,
    rv: *mut c_uint,
) -> c_int {
    let result = bridge().and_then(|b| b.confread(address(bus, dev, fun)?, register(reg)?));
    let (value, ret) = match result {
        Ok(value) => (value, 0),
        Err(e) => (CONFIG_READ_FAILED, errno(&e)),
    };
    // SAFETY: 由调用方保证
    unsafe { rv.write(value) };
    ret
}

/// 写配置寄存器
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_confwrite(
    bus: c_uint,
    dev: c_uint,
    fun: c_uint,
    reg: c_int,
    value: c_uint,
) -> c_int {
    status(bridge().and_then(|b| b.confwrite(address(bus, dev, fun)?, register(reg)?, value)))
}

/// 以 `cookie` 登记设备的中断线
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_irq_map(
    bus: c_uint,
    dev: c_uint,
    fun: c_uint,
    intrline: c_int,
    cookie: c_uint,
) -> c_int {
    status(bridge().and_then(|b| b.irq_map(address(bus, dev, fun)?, intrline as u32, cookie)))
}

/// 挂接处理函数并启动中断线程，失败时返回 NULL
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_irq_establish(
    cookie: c_uint,
    handler: extern "C" fn(*mut c_void) -> c_int,
    data: *mut c_void,
) -> *mut c_void {
    // 指针只在中断线程中交还给客户内核
    let data = data as usize;
    let result = bridge().and_then(|b| {
        b.irq_establish(cookie, move |_: &SchedRegion| {
            handler(data as *mut c_void);
        })
    });
    match result {
        Ok(handle) => Box::into_raw(Box::new(handle)).cast(),
        Err(e) => {
            log::warn!("pcibridge: irq_establish {:#x}: {}", cookie, e);
            ptr::null_mut()
        }
    }
}

/// 分配物理连续的 DMA 内存
///
/// # Safety
/// `pap` 与 `vap` 必须指向可写的 `unsigned long`。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rumpcomp_pci_dmalloc(
    size: usize,
    align: usize,
    pap: *mut c_ulong,
    vap: *mut c_ulong,
) -> c_int {
    match bridge().and_then(|b| b.dma_alloc(size, align)) {
        Ok(region) => {
            // SAFETY: 由调用方保证
            unsafe {
                pap.write(region.paddr.as_usize() as c_ulong);
                vap.write(region.vaddr.as_usize() as c_ulong);
            }
            0
        }
        Err(e) => errno(&e),
    }
}

/// 释放 DMA 内存
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_dmafree(vap: c_ulong, size: usize) {
    if let Err(e) = bridge().and_then(|b| b.dma_free(Vaddr::from_usize(vap as usize), size)) {
        log::warn!("pcibridge: dmafree {:#x}: {}", vap, e);
    }
}

/// 客户内核的 DMA 段描述
#[repr(C)]
#[derive(Debug, Clone, Copy)]
pub struct RumpcompPciDmaseg {
    /// 物理地址
    pub ds_pa: c_ulong,
    /// 长度
    pub ds_len: c_ulong,
    /// 分配时得到的虚拟地址
    pub ds_vacookie: c_ulong,
}

/// 把 DMA 段映射到虚拟地址空间，只支持单段
///
/// # Safety
/// `dss` 必须指向 `nseg` 个段描述，`vap` 必须可写。
#[unsafe(no_mangle)]
pub unsafe extern "C" fn rumpcomp_pci_dmamem_map(
    dss: *const RumpcompPciDmaseg,
    nseg: usize,
    totlen: usize,
    vap: *mut *mut c_void,
) -> c_int {
    let segments: Vec<DmaSegment> = if dss.is_null() || nseg == 0 {
        Vec::new()
    } else {
        // SAFETY: 由调用方保证
        unsafe { std::slice::from_raw_parts(dss, nseg) }
            .iter()
            .map(|seg| DmaSegment {
                paddr: Paddr::from_usize(seg.ds_pa as usize),
                len: seg.ds_len as usize,
                vaddr: Vaddr::from_usize(seg.ds_vacookie as usize),
            })
            .collect()
    };
    match bridge().and_then(|b| b.dma_map_segments(&segments, totlen)) {
        Ok(vaddr) => {
            // SAFETY: 由调用方保证
            unsafe { vap.write(vaddr.as_usize() as *mut c_void) };
            0
        }
        Err(e) => {
            log::warn!("pcibridge: dmamem_map: {}", e);
            errno(&e)
        }
    }
}

/// 虚拟地址到物理地址，无法翻译时为 0
#[unsafe(no_mangle)]
pub extern "C" fn rumpcomp_pci_virt_to_mach(virt: *mut c_void) -> c_ulong {
    bridge().map_or(0, |b| {
        b.virt_to_phys(Vaddr::from_usize(virt as usize)).as_usize() as c_ulong
    })
}
