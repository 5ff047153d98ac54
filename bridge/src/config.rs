//! 桥接配置

use std::path::PathBuf;

use log::LevelFilter;

use crate::BridgeError;

/// 桥接配置
///
/// 默认值对应真实系统路径；测试中把路径指向临时目录树。
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BridgeConfig {
    /// uio 设备类目录
    pub uio_root: PathBuf,
    /// `uioN` 字符设备所在目录
    pub dev_root: PathBuf,
    /// 页表元数据文件
    pub pagemap_path: PathBuf,
    /// 物理内存设备（端口扫描后端映射 BAR 用）
    pub mem_path: PathBuf,
    /// 设备表容量
    pub max_devices: usize,
    /// 中断线程优先级（Mach 后端）
    pub irq_priority: i32,
    /// 日志级别
    pub log_level: LevelFilter,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            uio_root: PathBuf::from("/sys/class/uio"),
            dev_root: PathBuf::from("/dev"),
            pagemap_path: PathBuf::from("/proc/self/pagemap"),
            mem_path: PathBuf::from("/dev/mem"),
            max_devices: 32,
            irq_priority: 2,
            log_level: klog::DEFAULT_LOG_LEVEL,
        }
    }
}

impl BridgeConfig {
    /// 默认值，按 `PCIBRIDGE_*` 环境变量覆盖
    pub fn from_env() -> Result<Self, BridgeError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// 默认值，按给定查找函数覆盖
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, BridgeError> {
        let mut config = Self::default();
        if let Some(v) = lookup("PCIBRIDGE_UIO_ROOT") {
            config.uio_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PCIBRIDGE_DEV_ROOT") {
            config.dev_root = PathBuf::from(v);
        }
        if let Some(v) = lookup("PCIBRIDGE_PAGEMAP") {
            config.pagemap_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PCIBRIDGE_MEM") {
            config.mem_path = PathBuf::from(v);
        }
        if let Some(v) = lookup("PCIBRIDGE_MAX_DEVICES") {
            config.max_devices = match v.trim().parse::<usize>() {
                Ok(n) if n > 0 => n,
                _ => return Err(invalid("PCIBRIDGE_MAX_DEVICES", v)),
            };
        }
        if let Some(v) = lookup("PCIBRIDGE_IRQ_PRIORITY") {
            config.irq_priority = v
                .trim()
                .parse()
                .map_err(|_| invalid("PCIBRIDGE_IRQ_PRIORITY", v.clone()))?;
        }
        if let Some(v) = lookup("PCIBRIDGE_LOG") {
            config.log_level =
                klog::parse_level(&v).ok_or_else(|| invalid("PCIBRIDGE_LOG", v.clone()))?;
        }
        Ok(config)
    }
}

fn invalid(key: &'static str, value: String) -> BridgeError {
    BridgeError::Config { key, value }
}
