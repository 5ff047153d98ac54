//! 中断通知源的 Mock 实现
//!
//! 每条中断线一个通道，测试通过 [`IrqInjector`] 注入事件；注入端析构后
//! 中断线程收到 [`IrqEvent::Closed`] 并退出。

use std::collections::{HashMap, HashSet};
use std::io;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use irq::{IrqError, IrqEvent, IrqLine, IrqSource, IrqTarget};

#[derive(Default)]
struct SourceState {
    pending: HashMap<u32, Receiver<IrqEvent>>,
    failing: HashSet<u32>,
    armed: HashSet<u32>,
    unmasks: HashMap<u32, usize>,
    opened_on: HashMap<u32, String>,
}

/// Mock 中断通知源
#[derive(Default)]
pub struct MockIrqSource {
    state: Arc<Mutex<SourceState>>,
    arm_delay: Duration,
}

impl MockIrqSource {
    /// 创建通知源
    pub fn new() -> Self {
        Self::default()
    }

    /// 使能中断线前先睡眠，模拟慢速的平台注册
    pub fn with_arm_delay(mut self, delay: Duration) -> Self {
        self.arm_delay = delay;
        self
    }

    /// 让该中断线的使能失败
    pub fn fail_line(&self, line: u32) {
        self.state.lock().unwrap().failing.insert(line);
    }

    /// 允许该中断线重新使能
    pub fn heal_line(&self, line: u32) {
        self.state.lock().unwrap().failing.remove(&line);
    }

    /// 为中断线创建注入端，须在 establish 之前调用
    pub fn injector(&self, line: u32) -> IrqInjector {
        let (tx, rx) = mpsc::channel();
        self.state.lock().unwrap().pending.insert(line, rx);
        IrqInjector { tx }
    }

    /// 中断线是否已使能
    pub fn is_armed(&self, line: u32) -> bool {
        self.state.lock().unwrap().armed.contains(&line)
    }

    /// 中断线被重新使能的次数
    pub fn unmask_count(&self, line: u32) -> usize {
        self.state
            .lock()
            .unwrap()
            .unmasks
            .get(&line)
            .copied()
            .unwrap_or(0)
    }

    /// 打开中断线的线程名
    pub fn opened_on(&self, line: u32) -> Option<String> {
        self.state.lock().unwrap().opened_on.get(&line).cloned()
    }
}

impl IrqSource for MockIrqSource {
    fn open(&self, target: &IrqTarget) -> Result<Box<dyn IrqLine>, IrqError> {
        std::thread::sleep(self.arm_delay);
        let mut state = self.state.lock().unwrap();
        state.opened_on.insert(
            target.line,
            std::thread::current().name().unwrap_or("").to_string(),
        );
        if state.failing.contains(&target.line) {
            return Err(IrqError::Kernel {
                call: "intr_enable",
                code: 5,
            });
        }
        let rx = state.pending.remove(&target.line).ok_or_else(|| {
            IrqError::Platform(io::Error::new(io::ErrorKind::NotFound, "no injector"))
        })?;
        state.armed.insert(target.line);
        Ok(Box::new(MockLine {
            line: target.line,
            rx,
            state: self.state.clone(),
        }))
    }
}

struct MockLine {
    line: u32,
    rx: Receiver<IrqEvent>,
    state: Arc<Mutex<SourceState>>,
}

impl IrqLine for MockLine {
    fn wait(&mut self) -> Result<IrqEvent, IrqError> {
        Ok(self.rx.recv().unwrap_or(IrqEvent::Closed))
    }

    fn unmask(&mut self) -> Result<(), IrqError> {
        *self
            .state
            .lock()
            .unwrap()
            .unmasks
            .entry(self.line)
            .or_default() += 1;
        Ok(())
    }
}

/// 中断注入端
pub struct IrqInjector {
    tx: Sender<IrqEvent>,
}

impl IrqInjector {
    /// 注入一个事件
    pub fn send(&self, event: IrqEvent) {
        let _ = self.tx.send(event);
    }

    /// 在中断线 `line` 上触发一次中断
    pub fn raise(&self, line: u32) {
        self.send(IrqEvent::Interrupt { line });
    }
}
