//! 中断桥接
//!
//! 把平台的中断通知转发给客户内核的处理函数。每条已建立的中断线拥有一个
//! 专用线程：
//!
//! ```text
//! kthread() → 打开并使能中断线 → 握手通知 establish 返回
//!     loop {
//!         恢复 INTx 屏蔽位 → 等待通知 → 校验中断线 → 恢复 INTx 屏蔽位
//!         → 进入调度区 → handler → 离开调度区 → 重新使能中断线
//!     }
//! ```
//!
//! # 状态
//!
//! 每个 cookie 的登记状态为 `Mapped → Establishing → Established`；建立失败时
//! 回退到 `Mapped`，不留下半截登记。中断线程因通知源关闭或等待失败退出时，
//! 登记同样回到 `Mapped`，客户内核可以重新建立。没有注销：登记本身在进程内一直存在。
//!
//! # 调度交接
//!
//! 处理函数只能在调度区内运行。[`SchedRegion`] 只能由本 crate 构造，
//! 处理函数签名要求它作为参数，因此"在调度区外调用处理函数"无法通过编译。

mod bridge;
mod error;
mod sched;
mod source;
mod worker;

pub use bridge::{IrqBridge, IrqHandle};
pub use error::IrqError;
pub use sched::{IrqHandler, SchedOps, SchedRegion};
pub use source::{IrqEvent, IrqLine, IrqSource, IrqTarget};
