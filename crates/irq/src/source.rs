//! 平台中断通知接口

use pci::PciAddress;

use crate::IrqError;

/// 一次登记的中断目标
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IrqTarget {
    /// 设备地址
    pub addr: PciAddress,
    /// 中断线
    pub line: u32,
    /// 客户内核选择的 cookie
    pub cookie: u32,
}

/// 一次等待的结果
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrqEvent {
    /// 中断线 `line` 上的中断
    Interrupt {
        /// 通知携带的中断线
        line: u32,
    },
    /// 与中断无关的消息，丢弃
    Unrelated(i32),
    /// 通知源已关闭，线程退出
    Closed,
}

/// 已使能的中断线
///
/// 由中断线程独占，只在该线程内使用。
pub trait IrqLine: Send {
    /// 阻塞等待下一次通知
    fn wait(&mut self) -> Result<IrqEvent, IrqError>;

    /// 处理完成后重新使能中断线
    fn unmask(&mut self) -> Result<(), IrqError> {
        Ok(())
    }
}

/// 平台中断通知源
pub trait IrqSource: Send + Sync {
    /// 在中断线程内打开并使能中断线
    ///
    /// 返回时中断线必须已经能够投递通知。
    fn open(&self, target: &IrqTarget) -> Result<Box<dyn IrqLine>, IrqError>;
}
