use super::logging::{self, LogSeverity};
use crate::error::ShoalError;
use arc_swap::ArcSwapOption;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

/// 失败上报钩子集合。
///
/// # 设计背景（Why）
/// - 内核承诺两类"必须有人看到"的事件：携带失败结果却未被消费就析构的 future，
///   以及未决议即被销毁的 promise。宿主（或测试）通过本结构订阅这两类事件与框架缺陷。
///
/// # 契约说明（What）
/// - 钩子在事件发生的分片线程上同步调用，回调必须短小且不得重入执行器；
/// - 未安装钩子时事件仍进入进程级计数器，不会丢失。
#[derive(Default)]
pub struct FailureHooks {
    unhandled_failure: Option<Box<dyn Fn(&ShoalError) + Send + Sync>>,
    broken_promise: Option<Box<dyn Fn(&'static str) + Send + Sync>>,
    defect: Option<Box<dyn Fn(&'static str, &str) + Send + Sync>>,
}

impl FailureHooks {
    /// 创建空钩子集合。
    pub fn new() -> Self {
        Self::default()
    }

    /// 订阅"失败 future 未被消费"事件。
    pub fn on_unhandled_failure(
        mut self,
        callback: impl Fn(&ShoalError) + Send + Sync + 'static,
    ) -> Self {
        self.unhandled_failure = Some(Box::new(callback));
        self
    }

    /// 订阅"promise 未决议即销毁"事件，参数为产生处的上下文名。
    pub fn on_broken_promise(
        mut self,
        callback: impl Fn(&'static str) + Send + Sync + 'static,
    ) -> Self {
        self.broken_promise = Some(Box::new(callback));
        self
    }

    /// 订阅框架缺陷事件，参数为上下文名与缺陷描述。
    pub fn on_defect(
        mut self,
        callback: impl Fn(&'static str, &str) + Send + Sync + 'static,
    ) -> Self {
        self.defect = Some(Box::new(callback));
        self
    }
}

static HOOKS: ArcSwapOption<FailureHooks> = ArcSwapOption::const_empty();

static UNHANDLED_FAILURES: AtomicU64 = AtomicU64::new(0);
static BROKEN_PROMISES: AtomicU64 = AtomicU64::new(0);
static DEFECTS: AtomicU64 = AtomicU64::new(0);

/// 安装失败钩子，替换旧集合。
pub fn install_failure_hooks(hooks: FailureHooks) {
    HOOKS.store(Some(Arc::new(hooks)));
}

/// 卸载失败钩子。
pub fn reset_failure_hooks() {
    HOOKS.store(None);
}

/// 进程累计的"失败 future 未被消费"次数。
pub fn unhandled_failure_count() -> u64 {
    UNHANDLED_FAILURES.load(Ordering::Relaxed)
}

/// 进程累计的 promise 断裂次数。
pub fn broken_promise_count() -> u64 {
    BROKEN_PROMISES.load(Ordering::Relaxed)
}

/// 进程累计的框架缺陷次数。
pub fn defect_count() -> u64 {
    DEFECTS.load(Ordering::Relaxed)
}

/// 顶层被丢弃的失败 future：计数、回调、记日志。
pub(crate) fn report_unhandled_failure(error: &ShoalError) {
    UNHANDLED_FAILURES.fetch_add(1, Ordering::Relaxed);
    if let Some(hooks) = &*HOOKS.load() {
        if let Some(callback) = &hooks.unhandled_failure {
            callback(error);
        }
    }
    logging::emit(
        LogSeverity::Warn,
        "shoal::future",
        "failed future discarded without a consumer",
        Some(error),
    );
}

/// promise 未决议即销毁：计数、回调、记日志。
pub(crate) fn report_broken_promise(origin: &'static str) {
    BROKEN_PROMISES.fetch_add(1, Ordering::Relaxed);
    if let Some(hooks) = &*HOOKS.load() {
        if let Some(callback) = &hooks.broken_promise {
            callback(origin);
        }
    }
    logging::emit(
        LogSeverity::Warn,
        "shoal::future",
        origin,
        None,
    );
}

/// 框架缺陷：调试构建立刻中止，发布构建记录后继续。
///
/// # 契约说明（What）
/// - 仅用于"调用方违反了编程契约"的场景（在线程上下文之外阻塞取值、
///   不配对的 `leave`、重复关闭闸门等）；运行期的正常错误走 [`ShoalError`]。
pub(crate) fn report_defect(context: &'static str, message: &str) {
    DEFECTS.fetch_add(1, Ordering::Relaxed);
    if let Some(hooks) = &*HOOKS.load() {
        if let Some(callback) = &hooks.defect {
            callback(context, message);
        }
    }
    logging::emit(LogSeverity::Error, context, message, None);
    #[cfg(debug_assertions)]
    panic!("framework defect in {context}: {message}");
}

/// 析构路径上的缺陷：永远只记录，绝不在 `Drop` 中 panic。
pub(crate) fn report_drop_defect(context: &'static str, message: &str) {
    DEFECTS.fetch_add(1, Ordering::Relaxed);
    if let Some(hooks) = &*HOOKS.load() {
        if let Some(callback) = &hooks.defect {
            callback(context, message);
        }
    }
    logging::emit(LogSeverity::Error, context, message, None);
}

/// 被压制的次要失败（例如主错误已占据失败通道时的关闭错误）：仅记日志。
pub(crate) fn report_suppressed_failure(context: &'static str, error: &ShoalError) {
    logging::emit(
        LogSeverity::Warn,
        context,
        "secondary failure suppressed",
        Some(error),
    );
}
