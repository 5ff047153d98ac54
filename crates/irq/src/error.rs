//! 中断桥接错误类型

use std::io;

use pci::PciError;
use thiserror::Error;

/// 中断桥接错误
#[derive(Debug, Error)]
pub enum IrqError {
    /// cookie 未登记
    #[error("no interrupt mapped under cookie {0:#x}")]
    NotMapped(u32),
    /// cookie 已被占用
    #[error("cookie {0:#x} is already mapped")]
    CookieInUse(u32),
    /// cookie 已建立（或正在建立）
    #[error("interrupt for cookie {0:#x} is already established")]
    AlreadyEstablished(u32),
    /// 平台调用失败（返回码）
    #[error("{call} failed with {code:#x}")]
    Kernel {
        /// 平台调用名
        call: &'static str,
        /// 返回码
        code: i32,
    },
    /// 平台 I/O 失败
    #[error(transparent)]
    Platform(#[from] io::Error),
    /// 无法创建中断线程
    #[error("failed to spawn interrupt thread: {0}")]
    ThreadSpawn(#[source] io::Error),
    /// 中断线程在握手前退出
    #[error("interrupt thread for line {0} exited before arming the line")]
    ThreadExited(u32),
    /// 中断线不可用（设备不存在或后端不支持）
    #[error(transparent)]
    Pci(#[from] PciError),
}

impl IrqError {
    /// 是否为"不存在"类错误
    pub fn is_not_found(&self) -> bool {
        match self {
            IrqError::NotMapped(_) => true,
            IrqError::Pci(e) => e.is_not_found(),
            _ => false,
        }
    }
}
