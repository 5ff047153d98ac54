//! sysfs/uio 后端（Linux）
//!
//! 设备须预先绑定到 `uio_pci_generic`。第 N 个 uio 节点以 `(0, N, 0)` 呈现给
//! 客户内核：
//!
//! ```text
//! <uio_root>/uioN/device/config      配置空间（pread/pwrite）
//! <uio_root>/uioN/device/resource    区域表，每行 "start end flags"（十六进制）
//! <uio_root>/uioN/device/resourceK   第 K 个区域，mmap 得到 MMIO 窗口
//! <dev_root>/uioN                    每次中断可读出 4 字节计数
//! ```

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read};
use std::os::unix::fs::FileExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use bitflags::bitflags;
use dma::DmaAllocator;
use irq::{IrqError, IrqEvent, IrqLine, IrqSource, IrqTarget};
use pci::{
    DeviceInfo, DeviceRegistry, HostCaps, MmioWindow, PciAddress, PciError, PciHost, RegionInfo,
    RegionKind,
};

use super::mem::{map_shared, pagemap_allocator};
use super::{Backend, page_size};
use crate::{BridgeConfig, BridgeError};

bitflags! {
    /// `resource` 文件第三列中的资源标志（IORESOURCE_*）
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ResourceFlags: u64 {
        /// 端口 I/O
        const IO = 0x0000_0100;
        /// 内存
        const MEM = 0x0000_0200;
        /// 可预取
        const PREFETCH = 0x0000_2000;
        /// 64 位 BAR
        const MEM_64 = 0x0010_0000;
    }
}

fn parse_hex(field: &str) -> Option<u64> {
    let digits = field.strip_prefix("0x").unwrap_or(field);
    u64::from_str_radix(digits, 16).ok()
}

/// 解析 `resource` 文件，全零的行（未使用的 BAR）被跳过，区域序号保持行号
pub fn parse_resource(text: &str) -> Vec<RegionInfo> {
    text.lines()
        .enumerate()
        .filter_map(|(index, line)| {
            let mut fields = line.split_whitespace().map(parse_hex);
            let start = fields.next()??;
            let end = fields.next()??;
            let flags = ResourceFlags::from_bits_retain(fields.next().flatten().unwrap_or(0));
            if end == 0 || end < start {
                return None;
            }
            let kind = if flags.contains(ResourceFlags::IO) {
                RegionKind::Io
            } else {
                RegionKind::Memory
            };
            Some(RegionInfo {
                index,
                base: start,
                size: end - start + 1,
                kind,
            })
        })
        .collect()
}

/// 列出 `uio_root` 下的 uio 节点序号（升序）
pub(crate) fn uio_nodes(uio_root: &Path) -> io::Result<Vec<usize>> {
    let mut nodes: Vec<usize> = fs::read_dir(uio_root)?
        .filter_map(|entry| {
            let name = entry.ok()?.file_name();
            name.to_str()?.strip_prefix("uio")?.parse().ok()
        })
        .collect();
    nodes.sort_unstable();
    Ok(nodes)
}

fn device_dir(uio_root: &Path, node: usize) -> PathBuf {
    uio_root.join(format!("uio{}", node)).join("device")
}

/// 查找绑定到给定 PCI 槽位的 uio 节点
///
/// `uioN/device` 是指向 `.../0000:BB:DD.F` 的符号链接。
#[cfg_attr(not(feature = "backend-conf1"), allow(dead_code))]
pub(crate) fn uio_node_for_slot(uio_root: &Path, addr: PciAddress) -> Option<usize> {
    let slot = format!(
        "0000:{:02x}:{:02x}.{:x}",
        addr.bus, addr.device, addr.function
    );
    uio_nodes(uio_root).ok()?.into_iter().find(|&node| {
        fs::canonicalize(device_dir(uio_root, node))
            .ok()
            .and_then(|p| p.file_name().map(|n| n.to_string_lossy() == slot))
            .unwrap_or(false)
    })
}

/// uio 节点上的中断线
///
/// 每次中断读出一个 4 字节计数；中断线的重新使能由 INTx 屏蔽位恢复完成。
pub(crate) struct UioLine {
    file: File,
    line: u32,
}

impl UioLine {
    pub(crate) fn open(path: &Path, line: u32) -> Result<Self, IrqError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        log::debug!("uio: waiting for line {} on {}", line, path.display());
        Ok(Self { file, line })
    }
}

impl IrqLine for UioLine {
    fn wait(&mut self) -> Result<IrqEvent, IrqError> {
        let mut count = [0u8; 4];
        loop {
            return match self.file.read(&mut count) {
                Ok(4) => Ok(IrqEvent::Interrupt { line: self.line }),
                Ok(0) => Ok(IrqEvent::Closed),
                Ok(_) => {
                    log::warn!("uio: short read on line {}, not an interrupt", self.line);
                    Ok(IrqEvent::Unrelated(0))
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => Err(e.into()),
            };
        }
    }
}

/// uio 设备枚举与配置空间
pub struct UioHost {
    uio_root: PathBuf,
    max_devices: usize,
}

impl UioHost {
    /// 创建主机访问接口
    pub fn new(uio_root: impl Into<PathBuf>, max_devices: usize) -> Self {
        Self {
            uio_root: uio_root.into(),
            max_devices,
        }
    }

    fn config_path(&self, node: usize) -> PathBuf {
        device_dir(&self.uio_root, node).join("config")
    }

    fn read_dword(&self, node: usize, reg: u16) -> Result<u32, PciError> {
        let file = File::open(self.config_path(node))?;
        let mut buf = [0u8; 4];
        file.read_exact_at(&mut buf, u64::from(reg))?;
        Ok(u32::from_le_bytes(buf))
    }
}

impl PciHost for UioHost {
    fn caps(&self) -> HostCaps {
        HostCaps {
            bus0_fun0_only: true,
            max_devices: self.max_devices,
        }
    }

    fn enumerate(&self) -> Result<Vec<DeviceInfo>, PciError> {
        let nodes = match uio_nodes(&self.uio_root) {
            Ok(nodes) => nodes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::warn!("uio: {} does not exist", self.uio_root.display());
                Vec::new()
            }
            Err(e) => return Err(e.into()),
        };

        let mut devices = Vec::with_capacity(nodes.len());
        for node in nodes {
            let Some(addr) = PciAddress::from_raw(0, node as u32, 0) else {
                log::warn!("uio: node uio{} cannot be addressed, skipped", node);
                continue;
            };
            let id = self.read_dword(node, pci::regs::VENDOR_ID).unwrap_or_else(|e| {
                log::warn!("uio: reading id of uio{} failed: {}", node, e);
                u32::MAX
            });
            let class_revision = self
                .read_dword(node, pci::regs::CLASS_REVISION)
                .unwrap_or(0);
            let resource = device_dir(&self.uio_root, node).join("resource");
            let regions = fs::read_to_string(&resource)
                .map(|text| parse_resource(&text))
                .unwrap_or_default();
            devices.push(DeviceInfo {
                addr,
                handle: node,
                vendor_id: id as u16,
                device_id: (id >> 16) as u16,
                class_revision,
                regions,
            });
        }
        Ok(devices)
    }

    fn read_config(&self, device: &DeviceInfo, reg: u16) -> Result<u32, PciError> {
        self.read_dword(device.handle, reg)
    }

    fn write_config(&self, device: &DeviceInfo, reg: u16, value: u32) -> Result<(), PciError> {
        let file = OpenOptions::new()
            .write(true)
            .open(self.config_path(device.handle))?;
        file.write_all_at(&value.to_le_bytes(), u64::from(reg))?;
        Ok(())
    }

    fn map_region(
        &self,
        device: &DeviceInfo,
        region: usize,
        len: usize,
    ) -> Result<MmioWindow, PciError> {
        let index = device.regions[region].index;
        let path = device_dir(&self.uio_root, device.handle).join(format!("resource{}", index));
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        Ok(map_shared(&file, len, 0)?)
    }
}

/// uio 节点上的中断通知源
pub struct UioIrqSource {
    dev_root: PathBuf,
    registry: Arc<DeviceRegistry>,
}

impl IrqSource for UioIrqSource {
    fn open(&self, target: &IrqTarget) -> Result<Box<dyn IrqLine>, IrqError> {
        let device = self.registry.find(target.addr)?;
        let path = self.dev_root.join(format!("uio{}", device.info().handle));
        Ok(Box::new(UioLine::open(&path, target.line)?))
    }
}

/// sysfs/uio 后端
pub struct UioBackend {
    config: BridgeConfig,
    page_size: usize,
}

impl UioBackend {
    /// 创建后端
    pub fn new(config: BridgeConfig) -> Self {
        Self {
            config,
            page_size: page_size(),
        }
    }
}

impl Backend for UioBackend {
    fn name(&self) -> &'static str {
        "uio"
    }

    fn iospace_init(&self) -> Result<(), BridgeError> {
        super::iopl(3)
    }

    fn pci_host(&self) -> Arc<dyn PciHost> {
        Arc::new(UioHost::new(&self.config.uio_root, self.config.max_devices))
    }

    fn irq_source(&self, registry: Arc<DeviceRegistry>) -> Arc<dyn IrqSource> {
        Arc::new(UioIrqSource {
            dev_root: self.config.dev_root.clone(),
            registry,
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
    fn test_parse_resource_lines() {
        let text = "\
0x00000000febc0000 0x00000000febdffff 0x0000000000040200
0x0000000000000000 0x0000000000000000 0x0000000000000000
0x000000000000c000 0x000000000000c03f 0x0000000000040101
";
        let regions = parse_resource(text);
        assert_eq!(regions.len(), 2);
        assert_eq!(
            regions[0],
            RegionInfo {
                index: 0,
                base: 0xfebc_0000,
                size: 0x2_0000,
                kind: RegionKind::Memory,
            }
        );
        assert_eq!(regions[1].index, 2);
        assert_eq!(regions[1].size, 0x40);
        assert_eq!(regions[1].kind, RegionKind::Io);
    }

    #[test]
    fn test_parse_resource_tolerates_garbage() {
        assert!(parse_resource("not a resource\n\n").is_empty());
        let regions = parse_resource("1000 1fff\n");
        assert_eq!(regions[0].size, 0x1000);
    }
}
