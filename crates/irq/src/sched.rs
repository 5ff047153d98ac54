//! 客户内核调度交接

use core::marker::PhantomData;

/// 客户内核提供的调度交接操作
///
/// 对应 `rumpuser_component_kthread`/`schedule`/`unschedule`。
pub trait SchedOps: Send + Sync {
    /// 把当前线程登记为客户内核可见的内核线程，每个中断线程启动时调用一次
    fn kthread(&self);

    /// 进入调度区
    fn schedule(&self);

    /// 离开调度区
    fn unschedule(&self);

    /// 客户内核是否允许多个线程同时处于调度区
    fn is_reentrant(&self) -> bool {
        false
    }
}

/// 处于调度区内的凭证
///
/// 只能由本 crate 在进入调度区后构造，处理函数以它为参数。
pub struct SchedRegion {
    // 不可跨线程传递：调度区属于进入它的线程
    _not_send: PhantomData<*const ()>,
}

/// 进入调度区，析构时离开；处理函数异常展开时同样会离开
pub(crate) struct Scheduled<'a> {
    ops: &'a dyn SchedOps,
    region: SchedRegion,
}

impl<'a> Scheduled<'a> {
    pub(crate) fn enter(ops: &'a dyn SchedOps) -> Self {
        ops.schedule();
        Self {
            ops,
            region: SchedRegion {
                _not_send: PhantomData,
            },
        }
    }

    pub(crate) fn region(&self) -> &SchedRegion {
        &self.region
    }
}

impl Drop for Scheduled<'_> {
    fn drop(&mut self) {
        self.ops.unschedule();
    }
}

/// 中断处理函数
///
/// 闭包自动实现此 trait；C 接口把 `(handler, data)` 包装成闭包。
pub trait IrqHandler: Send + 'static {
    /// 在调度区内处理一次中断
    fn handle(&mut self, region: &SchedRegion);
}

impl<F> IrqHandler for F
where
    F: FnMut(&SchedRegion) + Send + 'static,
{
    fn handle(&mut self, region: &SchedRegion) {
        self(region)
    }
}
