//! Mock 实现

mod dma;
mod irq;
mod pci;
mod sched;

pub use dma::{MockDmaPlatform, MockPageMap};
pub use irq::{IrqInjector, MockIrqSource};
pub use pci::MockPciHost;
pub use sched::MockSched;
