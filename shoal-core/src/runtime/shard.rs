use super::executor::{self, ShardState};
use super::flags::{PreemptFlag, StopFlag};
use super::timer::{SystemTimeSource, TimeSource};
use crate::config::ShardConfig;
use crate::error::ShoalError;
use crate::future::Future;
use crate::observability;
use std::rc::Rc;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_SHARD_ID: AtomicU32 = AtomicU32::new(0);

/// 一个分片：一条 OS 线程、一个执行器、一套按调度组划分的就绪队列。
///
/// # 设计背景（Why）
/// - 分片状态只在创建它的线程上被触碰，内部全是 `Rc` 与 `Cell`；
///   句柄本身既不 `Send` 也不 `Sync`，越界共享在编译期即被拒绝。
/// - 跨线程只暴露 [`StopHandle`]：原子停机位加抢占位，其余一概不可见。
///
/// # 契约说明（What）
/// - [`Shard::run`] 把分片绑定到当前线程并进入线程上下文；绑定期间
///   `Future::get`/`Future::wait` 合法，闭包返回后解绑；
/// - 同一线程同时只能绑定一个分片，嵌套绑定按缺陷处理。
pub struct Shard {
    state: Rc<ShardState>,
}

impl Shard {
    /// 以真实时钟创建分片。
    pub fn new(config: ShardConfig) -> Self {
        Self::with_time_source(config, Rc::new(SystemTimeSource))
    }

    /// 以注入的时间源创建分片，测试用虚拟时钟即可获得确定性的定时行为。
    pub fn with_time_source(config: ShardConfig, time: Rc<dyn TimeSource>) -> Self {
        let id = NEXT_SHARD_ID.fetch_add(1, Ordering::Relaxed);
        Self {
            state: Rc::new(ShardState::new(id, config, time)),
        }
    }

    /// 分片编号，进程内单调分配。
    pub fn id(&self) -> u32 {
        self.state.id()
    }

    /// 取得可跨线程使用的停机句柄。
    pub fn stop_handle(&self) -> StopHandle {
        StopHandle {
            stop: self.state.stop_flag(),
            preempt: self.state.preempt_flag(),
        }
    }

    /// 绑定分片并在其线程上下文内运行闭包。
    ///
    /// 闭包体就是"线程上下文"：在这里对未决议 future 调用 `get` 会驱动
    /// 执行器推进直到决议；执行器运行任务期间上下文标记被摘除，任务内
    /// 的同步等待仍按缺陷处理。
    pub fn run<R>(&self, body: impl FnOnce() -> R) -> R {
        let guard = executor::bind(Rc::clone(&self.state));
        if guard.is_none() {
            observability::report_defect(
                "shoal::shard",
                "a shard is already bound to this thread",
            );
        }
        let was_thread_context = self.state.set_in_thread_context(true);
        let result = body();
        self.state.set_in_thread_context(was_thread_context);
        drop(guard);
        result
    }

    /// 便捷入口：在线程上下文内构造 future 并同步取值。
    pub fn run_until<T, R>(&self, body: R) -> Result<T, ShoalError>
    where
        T: 'static,
        R: FnOnce() -> Future<T>,
    {
        self.run(|| body().get())
    }
}

/// 跨线程停机句柄。
///
/// `request_stop` 置位停机与抢占两个原子位：正在内联推进的循环在下一次
/// `need_preempt` 检查时让出，分片回路在下一次泵循环触发停机订阅者。
#[derive(Clone, Debug)]
pub struct StopHandle {
    stop: StopFlag,
    preempt: PreemptFlag,
}

impl StopHandle {
    /// 请求停机；首次触发返回 `true`。
    pub fn request_stop(&self) -> bool {
        let first = self.stop.request();
        self.preempt.set();
        first
    }

    /// 查询是否已请求停机。
    pub fn is_stop_requested(&self) -> bool {
        self.stop.is_requested()
    }
}
