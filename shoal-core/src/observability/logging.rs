use crate::Error;
use arc_swap::ArcSwapOption;
use std::borrow::Cow;
use std::sync::Arc;

/// 日志级别枚举，取 `tracing` 与 OpenTelemetry `SeverityNumber` 的交集。
///
/// # 契约说明（What）
/// - `Warn` 表示可恢复的异常路径（被丢弃的失败结果、被抑制的关闭错误）；
/// - `Error` 表示框架缺陷或必须引起运维注意的事件。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LogSeverity {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

/// 单条结构化日志记录。
///
/// # 契约说明（What）
/// - `message` 使用 `Cow<'a, str>`，既支持静态字符串也支持动态拼接；
/// - `target` 标记来源模块（如 `shoal::future`），便于过滤；
/// - `error` 以引用传递错误链，实现方需在 `log` 返回前完成消费。
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub message: Cow<'a, str>,
    pub severity: LogSeverity,
    pub target: Option<Cow<'a, str>>,
    pub error: Option<&'a dyn Error>,
}

/// 日志接口的核心契约。
///
/// # 设计背景（Why）
/// - 统一内核对宿主日志实现的依赖：对接 `tracing`、syslog 或测试内存缓冲都只需实现一个方法。
///
/// # 契约说明（What）
/// - **前置条件**：实现必须 `Send + Sync`，内核可能从任意分片线程调用；
/// - **后置条件**：`log` 应尽量非阻塞，热路径上的记录不允许反向阻塞执行器。
pub trait Logger: Send + Sync + 'static {
    /// 提交结构化日志。
    fn log(&self, record: &LogRecord<'_>);
}

/// 直接写到标准错误的最小实现，供宿主缺省接入与示例使用。
#[derive(Clone, Copy, Debug, Default)]
pub struct StderrLogger;

impl Logger for StderrLogger {
    fn log(&self, record: &LogRecord<'_>) {
        let target = record.target.as_deref().unwrap_or("shoal");
        match record.error {
            Some(err) => eprintln!("[{:?}] {}: {} ({})", record.severity, target, record.message, err),
            None => eprintln!("[{:?}] {}: {}", record.severity, target, record.message),
        }
    }
}

struct InstalledLogger {
    inner: Box<dyn Logger>,
}

static LOGGER: ArcSwapOption<InstalledLogger> = ArcSwapOption::const_empty();

/// 安装进程级日志后端，替换旧后端。
pub fn install_logger(logger: impl Logger) {
    LOGGER.store(Some(Arc::new(InstalledLogger {
        inner: Box::new(logger),
    })));
}

/// 卸载日志后端，此后的记录只进入计数器。
pub fn reset_logger() {
    LOGGER.store(None);
}

pub(crate) fn emit(
    severity: LogSeverity,
    target: &'static str,
    message: &str,
    error: Option<&dyn Error>,
) {
    if let Some(installed) = &*LOGGER.load() {
        installed.inner.log(&LogRecord {
            message: Cow::Borrowed(message),
            severity,
            target: Some(Cow::Borrowed(target)),
            error,
        });
    }
}
