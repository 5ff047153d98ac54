//! 中断线程主循环

use std::sync::Arc;

use pci::ConfigAccess;
use pci::regs::{COMMAND, Command};
use sync::SpinLock;

use crate::sched::Scheduled;
use crate::{IrqEvent, IrqHandler, IrqLine, IrqTarget, SchedOps};

/// 一条中断线的工作者，运行在专用线程中
pub(crate) struct IrqWorker {
    pub(crate) target: IrqTarget,
    pub(crate) line: Box<dyn IrqLine>,
    pub(crate) handler: Box<dyn IrqHandler>,
    pub(crate) sched: Arc<dyn SchedOps>,
    pub(crate) config: Arc<dyn ConfigAccess>,
    pub(crate) handoff: Arc<SpinLock<()>>,
}

impl IrqWorker {
    /// 运行直到通知源关闭或等待失败
    ///
    /// 阻塞等待期间 INTx 屏蔽位必须是清零的：每次等待前与每次处理前各恢复一次。
    pub(crate) fn run(mut self) {
        loop {
            self.restore_intx();
            match self.line.wait() {
                Ok(IrqEvent::Interrupt { line }) if line == self.target.line => {
                    self.restore_intx();
                    self.dispatch();
                    if let Err(e) = self.line.unmask() {
                        log::error!("irq {}: failed to re-enable line: {}", line, e);
                    }
                }
                Ok(IrqEvent::Interrupt { line }) => {
                    log::warn!(
                        "irq {}: got interrupt {}, {} is expected",
                        self.target.line,
                        line,
                        self.target.line
                    );
                }
                Ok(IrqEvent::Unrelated(id)) => {
                    log::debug!("irq {}: ignoring message {}", self.target.line, id);
                }
                Ok(IrqEvent::Closed) => {
                    log::info!("irq {}: notification source closed", self.target.line);
                    return;
                }
                Err(e) => {
                    log::error!("irq {}: wait failed: {}", self.target.line, e);
                    return;
                }
            }
        }
    }

    /// 子驱动屏蔽中断时可能置位 INTx disable，这里把它清掉
    fn restore_intx(&self) {
        let addr = self.target.addr;
        let value = match self.config.read32(addr, COMMAND) {
            Ok(value) => value,
            Err(e) => {
                log::warn!(
                    "irq {}: reading command register failed: {}",
                    self.target.line,
                    e
                );
                return;
            }
        };
        if Command::from_bits_retain(value as u16).contains(Command::INTX_DISABLE) {
            log::debug!(
                "irq {}: interrupt disabled on {}, re-enabling",
                self.target.line,
                addr
            );
            let value = value & !u32::from(Command::INTX_DISABLE.bits());
            if let Err(e) = self.config.write32(addr, COMMAND, value) {
                log::warn!(
                    "irq {}: writing command register failed: {}",
                    self.target.line,
                    e
                );
            }
        }
    }

    fn dispatch(&mut self) {
        let _handoff = (!self.sched.is_reentrant()).then(|| self.handoff.lock());
        let scheduled = Scheduled::enter(&*self.sched);
        self.handler.handle(scheduled.region());
    }
}
