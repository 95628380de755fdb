use crate::Error;
use core::fmt;

/// `ShoalError` 是内核统一的错误域。
///
/// # 设计背景（Why）
/// - future 的失败通道需要一个不透明但机器可读的载体：稳定错误码用于分流与断言，
///   消息面向人类调试，可选的底层原因串成错误链。
/// - 同步原语错误（闸门关闭、睡眠中止、信号量超时/损坏、promise 断裂）与用户错误共用
///   同一载体，组合子对用户错误保持透明传递。
///
/// # 契约说明（What）
/// - **前置条件**：`code` 必须取自 [`codes`] 模块，或遵守 `namespace.reason` 命名约定；
/// - **后置条件**：所有构造方法产出拥有所有权的实例，可随续延帧一起搬移。
///
/// # 设计取舍与风险（Trade-offs）
/// - 消息采用 `String`，用少量拷贝换取日志与跨模块传递的灵活性；
/// - 错误不实现 `Clone`：失败只被一个消费者观察，复制语义会模糊"单次消费"契约。
#[derive(Debug)]
pub struct ShoalError {
    code: &'static str,
    message: String,
    cause: Option<ErrorCause>,
}

/// `ErrorCause` 封装底层原因，保持 `Send + Sync` 以便被日志后端跨线程消费。
pub type ErrorCause = Box<dyn Error + Send + Sync + 'static>;

impl ShoalError {
    /// 使用稳定错误码与消息创建错误。
    pub fn new(code: &'static str, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            cause: None,
        }
    }

    /// 获取稳定错误码。
    pub fn code(&self) -> &'static str {
        self.code
    }

    /// 获取人类可读的错误描述。
    pub fn message(&self) -> &str {
        &self.message
    }

    /// 附带一个底层原因，形成错误链。
    pub fn with_cause(mut self, cause: impl Error + Send + Sync + 'static) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// 获取可选的底层原因。
    pub fn cause(&self) -> Option<&ErrorCause> {
        self.cause.as_ref()
    }

    /// 判断错误码是否与给定常量一致。
    pub fn is(&self, code: &str) -> bool {
        self.code == code
    }

    /// promise 在未决议时被销毁。
    pub fn broken_promise(origin: &'static str) -> Self {
        Self::new(
            codes::FUTURE_BROKEN_PROMISE,
            format!("promise dropped before resolution ({origin})"),
        )
    }

    /// 闸门已关闭，`enter` 被拒绝。
    pub fn gate_closed() -> Self {
        Self::new(codes::GATE_CLOSED, "gate closed")
    }

    /// 可中止睡眠被提前打断。
    pub fn sleep_aborted() -> Self {
        Self::new(codes::SLEEP_ABORTED, "sleep aborted")
    }

    /// 信号量等待超时。
    pub fn semaphore_timed_out() -> Self {
        Self::new(codes::SEMAPHORE_TIMED_OUT, "semaphore timed out")
    }

    /// 信号量被显式打破，所有等待者失败。
    pub fn semaphore_broken(reason: &str) -> Self {
        Self::new(
            codes::SEMAPHORE_BROKEN,
            format!("semaphore broken: {reason}"),
        )
    }
}

impl fmt::Display for ShoalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl Error for ShoalError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        self.cause
            .as_ref()
            .map(|boxed| boxed.as_ref() as &(dyn Error + 'static))
    }
}

/// 内核内置的稳定错误码集合。
///
/// 同步原语与框架缺陷各占一个命名空间；用户错误不落在这里，由调用方自带错误码。
pub mod codes {
    /// promise 在决议前被销毁。
    pub const FUTURE_BROKEN_PROMISE: &str = "future.broken_promise";
    /// future 处于非法消费状态（重复取用、未就绪取值等框架缺陷的兜底码）。
    pub const FUTURE_INVALID_STATE: &str = "future.invalid_state";
    /// 闸门已关闭。
    pub const GATE_CLOSED: &str = "gate.closed";
    /// 睡眠被中止信号或停机打断。
    pub const SLEEP_ABORTED: &str = "sleep.aborted";
    /// 信号量等待超时。
    pub const SEMAPHORE_TIMED_OUT: &str = "semaphore.timed_out";
    /// 信号量被打破。
    pub const SEMAPHORE_BROKEN: &str = "semaphore.broken";
    /// 调度组名非法（空名或保留名）。
    pub const SCHED_INVALID_NAME: &str = "sched.invalid_name";
    /// 调度组索引表已满。
    pub const SCHED_TABLE_FULL: &str = "sched.table_full";
    /// 执行器不可用（未绑定分片或正在停机）。
    pub const EXECUTOR_SHUTDOWN: &str = "executor.shutdown";
    /// 配置校验失败。
    pub const CONFIG_INVALID: &str = "config.invalid";
}
