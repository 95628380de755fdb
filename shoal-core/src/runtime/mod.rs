//! 分片运行时：任务、定时器、抢占信号与驱动回路。
//!
//! 模块结构：
//! - `task`：就绪队列的最小执行单元契约；
//! - `flags`：仅有的两个跨线程信号位（抢占、停机）；
//! - `timer`：注入式时间源与分片本地定时器轮；
//! - `executor`：分片状态、按组就绪队列与亏空轮转选组；
//! - `shard`：对外的分片句柄与线程上下文入口；
//! - `sleep`：普通睡眠、可中止睡眠与停机等待。
//!
//! 本模块同时提供一组"当前分片"自由函数（`schedule`、`need_preempt`、
//! `later` 等）。它们经由线程局部槽位找到绑定的分片；不在分片上调用时，
//! 查询类函数返回中性值，动作类函数按框架缺陷上报。

mod executor;
mod flags;
mod shard;
mod sleep;
mod task;
mod timer;

pub use flags::{PreemptFlag, StopFlag};
pub use shard::{Shard, StopHandle};
pub use sleep::{sleep, sleep_abortable, sleep_abortable_until_stop, wait_for_stop};
pub use task::{make_task, LambdaTask, Task};
pub use timer::{ManualTimeSource, SystemTimeSource, TimeSource, TimerHandle};

pub(crate) use executor::try_current;

use crate::future::{Future, Promise};
use crate::observability;
use crate::sched::SchedulingGroup;
use std::time::{Duration, Instant};

/// 查询当前分片是否请求协作式让出。
///
/// 循环组合子在每个就绪步骤之间调用；未绑定分片时恒为 `false`。
pub fn need_preempt() -> bool {
    match executor::try_current() {
        Some(state) => state.need_preempt(),
        None => false,
    }
}

/// 把任务投递到当前分片的就绪队列。
///
/// # 契约说明（What）
/// - 入队 O(1)，构造完成后不再失败；
/// - 未绑定分片属于框架缺陷：调试构建中止，发布构建记录后内联运行以免丢失工作。
pub fn schedule(task: Box<dyn Task>) {
    match executor::try_current() {
        Some(state) => state.enqueue(task),
        None => {
            observability::report_defect(
                "shoal::runtime",
                "schedule called with no shard bound to this thread",
            );
            task.run_and_dispose();
        }
    }
}

/// 当前分片编号；未绑定分片时为 `None`。
pub fn current_shard_id() -> Option<u32> {
    executor::try_current().map(|state| state.id())
}

/// 当前是否处于线程上下文（同步 `get`/`wait` 合法的作用域）。
pub fn in_thread_context() -> bool {
    executor::try_current()
        .map(|state| state.in_thread_context())
        .unwrap_or(false)
}

/// 让出一轮：返回由新调度任务决议的 future。
///
/// 续延落在当前调度组，因此 `later().then(...)` 既是协作式让步，
/// 也是把后续工作排到本组队尾的标准写法。
pub fn later() -> Future<()> {
    let mut promise = Promise::new();
    let fut = promise.get_future();
    schedule(task::make_task(current_group(), move || {
        promise.set_value(());
    }));
    fut
}

/// 在 `after` 之后触发一次性回调；未绑定分片时返回 `None` 并上报缺陷。
pub fn arm_timer(after: Duration, callback: impl FnOnce() + 'static) -> Option<TimerHandle> {
    let state = executor::try_current()?;
    let deadline = state.now() + after;
    Some(state.arm_timer(deadline, Box::new(callback)))
}

/// 在绝对时刻触发一次性回调。
pub fn arm_timer_at(deadline: Instant, callback: impl FnOnce() + 'static) -> Option<TimerHandle> {
    let state = executor::try_current()?;
    Some(state.arm_timer(deadline, Box::new(callback)))
}

/// 取消定时器；仅当它尚未触发时返回 `true`。
pub fn cancel_timer(handle: &TimerHandle) -> bool {
    match executor::try_current() {
        Some(state) => state.cancel_timer(handle),
        None => false,
    }
}

/// 请求本分片停机（线程本地入口；跨线程请使用 [`StopHandle`]）。
pub fn request_stop() {
    match executor::try_current() {
        Some(state) => state.request_stop(),
        None => observability::report_defect(
            "shoal::runtime",
            "request_stop called with no shard bound to this thread",
        ),
    }
}

/// 当前调度组：续延附着时捕获的隐式上下文。
pub(crate) fn current_group() -> SchedulingGroup {
    executor::try_current()
        .map(|state| state.current_group())
        .unwrap_or_else(SchedulingGroup::main)
}

/// 替换当前调度组，返回旧值。
pub(crate) fn set_current_group(group: SchedulingGroup) -> SchedulingGroup {
    match executor::try_current() {
        Some(state) => state.set_current_group(group),
        None => SchedulingGroup::main(),
    }
}

/// 在线程上下文内推进分片直到谓词成立。
pub(crate) fn pump_until(ready: &dyn Fn() -> bool) {
    let Some(state) = executor::try_current() else {
        observability::report_defect(
            "shoal::runtime",
            "synchronous wait with no shard bound to this thread",
        );
        return;
    };
    if !state.in_thread_context() {
        observability::report_defect(
            "shoal::runtime",
            "synchronous wait outside a thread-context",
        );
    }
    state.pump_until(ready);
}
