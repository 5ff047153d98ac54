//! 中断登记与建立

use std::sync::mpsc;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use hashbrown::HashMap;
use pci::{ConfigAccess, PciAddress};
use sync::SpinLock;

use crate::worker::IrqWorker;
use crate::{IrqError, IrqHandler, IrqSource, IrqTarget, SchedOps};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum State {
    Mapped,
    Establishing,
    Established,
}

type Registrations = Arc<SpinLock<HashMap<u32, (IrqTarget, State)>>>;

fn set_state(registrations: &Registrations, cookie: u32, state: State) {
    if let Some((_, s)) = registrations.lock().get_mut(&cookie) {
        *s = state;
    }
}

/// 已建立的中断
///
/// 交给客户内核的不透明句柄。通知源关闭或等待失败时线程退出，
/// 登记回到 `Mapped`，之后可以重新建立。
#[derive(Debug)]
pub struct IrqHandle {
    target: IrqTarget,
    thread: JoinHandle<()>,
}

impl IrqHandle {
    /// 中断目标
    pub fn target(&self) -> &IrqTarget {
        &self.target
    }

    /// 中断线程是否已退出（通知源关闭或等待失败）
    pub fn is_finished(&self) -> bool {
        self.thread.is_finished()
    }

    /// 等待中断线程退出
    pub fn join(self) -> thread::Result<()> {
        self.thread.join()
    }
}

/// 中断桥接
pub struct IrqBridge {
    sched: Arc<dyn SchedOps>,
    source: Arc<dyn IrqSource>,
    config: Arc<dyn ConfigAccess>,
    registrations: Registrations,
    handoff: Arc<SpinLock<()>>,
}

impl IrqBridge {
    /// 创建中断桥接
    pub fn new(
        sched: Arc<dyn SchedOps>,
        source: Arc<dyn IrqSource>,
        config: Arc<dyn ConfigAccess>,
    ) -> Self {
        Self {
            sched,
            source,
            config,
            registrations: Arc::new(SpinLock::new(HashMap::new())),
            handoff: Arc::new(SpinLock::new(())),
        }
    }

    /// 以 `cookie` 登记设备的中断线
    pub fn map(&self, addr: PciAddress, line: u32, cookie: u32) -> Result<(), IrqError> {
        let mut registrations = self.registrations.lock();
        if registrations.contains_key(&cookie) {
            return Err(IrqError::CookieInUse(cookie));
        }
        let target = IrqTarget { addr, line, cookie };
        registrations.insert(cookie, (target, State::Mapped));
        log::debug!("irq: mapped {} line {} as cookie {:#x}", addr, line, cookie);
        Ok(())
    }

    /// 为已登记的 cookie 挂接处理函数并启动中断线程
    ///
    /// 中断线使能后才返回；失败时登记回退到 `Mapped`。
    pub fn establish<H: IrqHandler>(
        &self,
        cookie: u32,
        handler: H,
    ) -> Result<IrqHandle, IrqError> {
        let target = {
            let mut registrations = self.registrations.lock();
            let (target, state) = registrations
                .get_mut(&cookie)
                .ok_or(IrqError::NotMapped(cookie))?;
            if *state != State::Mapped {
                return Err(IrqError::AlreadyEstablished(cookie));
            }
            *state = State::Establishing;
            *target
        };

        match self.spawn(target, Box::new(handler)) {
            Ok(thread) => {
                log::info!("irq: established line {} for {}", target.line, target.addr);
                Ok(IrqHandle { target, thread })
            }
            Err(e) => {
                set_state(&self.registrations, cookie, State::Mapped);
                log::error!("irq: establishing line {} failed: {}", target.line, e);
                Err(e)
            }
        }
    }

    /// cookie 是否已建立
    pub fn is_established(&self, cookie: u32) -> bool {
        matches!(
            self.registrations.lock().get(&cookie),
            Some((_, State::Established))
        )
    }

    fn spawn(
        &self,
        target: IrqTarget,
        handler: Box<dyn IrqHandler>,
    ) -> Result<JoinHandle<()>, IrqError> {
        let (armed_tx, armed_rx) = mpsc::sync_channel(1);
        let sched = self.sched.clone();
        let source = self.source.clone();
        let config = self.config.clone();
        let handoff = self.handoff.clone();
        let registrations = self.registrations.clone();

        let thread = thread::Builder::new()
            .name(format!("irq-{}", target.line))
            .spawn(move || {
                sched.kthread();
                let line = match source.open(&target) {
                    Ok(line) => line,
                    Err(e) => {
                        let _ = armed_tx.send(Err(e));
                        return;
                    }
                };
                // 先于握手置为 Established，线程退出时的回退不会被覆盖
                set_state(&registrations, target.cookie, State::Established);
                if armed_tx.send(Ok(())).is_ok() {
                    IrqWorker {
                        target,
                        line,
                        handler,
                        sched,
                        config,
                        handoff,
                    }
                    .run();
                }
                set_state(&registrations, target.cookie, State::Mapped);
                log::info!(
                    "irq: line {} stopped, cookie {:#x} is mapped again",
                    target.line,
                    target.cookie
                );
            })
            .map_err(IrqError::ThreadSpawn)?;

        match armed_rx.recv() {
            Ok(Ok(())) => Ok(thread),
            Ok(Err(e)) => {
                let _ = thread.join();
                Err(e)
            }
            Err(_) => {
                let _ = thread.join();
                Err(IrqError::ThreadExited(target.line))
            }
        }
    }
}
