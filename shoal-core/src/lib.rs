#![doc = "shoal-core: 线程每核（thread-per-core）运行时的协作式执行内核。"]
#![doc = ""]
#![doc = "== 内核边界 =="]
#![doc = "本 Crate 只承载延迟计算原语及其驱动回路：future/promise 对、续延链、按调度组划分的就绪队列，"]
#![doc = "以及把它们组合成完整程序的组合子（顺序循环、有界并发循环、资源作用域、延迟析构、作用域互斥、"]
#![doc = "可中止睡眠、可关闭计数闸门）。文件/目录助手、跨分片消息等更高层设施都是本内核的客户端，不在此处。"]
#![doc = ""]
#![doc = "== 并发模型 =="]
#![doc = "每个分片（shard）由一个 OS 线程驱动一个执行器；同一分片的任务串行运行、运行期间不被抢占，"]
#![doc = "因此分片内状态一律使用 `Rc`/`Cell`/`RefCell`，热路径零锁。跨线程仅保留两类信号位"]
#![doc = "（抢占请求与停机请求）以及冷路径上的调度组注册表。"]

pub mod combinator;
pub mod config;
pub mod error;
pub mod future;
pub mod observability;
pub mod runtime;
pub mod sched;
pub mod sync;

pub use combinator::{
    defer, deferred_close, deferred_stop, do_for_each, do_until, do_with, keep_doing,
    max_concurrent_for_each, parallel_for_each, repeat, repeat_until_value, with_file, with_gate,
    with_lock, Closeable, DeferredAction, DeferredClose, DeferredStop, StopIteration, Stoppable,
};
pub use config::{ShardConfig, ShardConfigBuilder};
pub use error::{codes, ErrorCause, ShoalError};
pub use future::{Future, Promise};
pub use observability::{
    FailureHooks, LogRecord, LogSeverity, Logger, StderrLogger,
};
pub use runtime::{
    current_shard_id, in_thread_context, later, make_task, need_preempt, schedule, sleep,
    sleep_abortable, sleep_abortable_until_stop, wait_for_stop, LambdaTask, ManualTimeSource,
    PreemptFlag, Shard, StopFlag, StopHandle, SystemTimeSource, Task, TimeSource, TimerHandle,
};
pub use sched::{
    create_scheduling_group, create_scheduling_group_key, create_scheduling_group_key_default,
    current_scheduling_group, destroy_scheduling_group, map_reduce_specific, with_scheduling_group,
    with_specific, SchedulingGroup, SchedulingGroupKey, MAX_SCHEDULING_GROUPS,
};
pub use sync::{
    with_semaphore, AbortSource, AbortSubscription, Gate, Lockable, ReadLock, RwLock, Semaphore,
    SharedMutex, WriteLock,
};

use core::fmt;

/// 本 Crate 所有错误类型必须实现的对象安全基础 Trait。
///
/// # 设计背景（Why）
/// - 失败通道需要在日志钩子、错误链与用户错误之间传递一个最小公共接口；
///   直接绑定 `std::error::Error` 会把约束扩散到所有宿主类型，这里保留自有抽象以便演进。
///
/// # 契约说明（What）
/// - 实现者须提供 `Debug` 与 `Display`，供日志与可观测性采集；
/// - `source` 递归返回上游错误，语义与 `std::error::Error::source` 一致；
/// - `source` 返回引用的生命周期受限于 `self`，防止悬垂。
pub trait Error: fmt::Debug + fmt::Display {
    /// 返回当前错误的上游来源。
    fn source(&self) -> Option<&(dyn Error + 'static)>;
}

impl<E> Error for Box<E>
where
    E: Error + ?Sized,
{
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        (**self).source()
    }
}
