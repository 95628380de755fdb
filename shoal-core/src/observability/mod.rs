//! 可观测性出口：结构化日志契约与失败上报钩子。
//!
//! 内核自身不落盘、不打印；所有"值得被人看到"的事件（未消费的失败 future、
//! 断裂的 promise、框架缺陷）都经由本模块计数，并转发给宿主安装的
//! [`Logger`] 与 [`FailureHooks`]。两个全局槽位都放在 `arc-swap` 里，
//! 读路径无锁，测试可以随时替换观察者。

mod hooks;
mod logging;

pub use hooks::{
    broken_promise_count, defect_count, install_failure_hooks, reset_failure_hooks,
    unhandled_failure_count, FailureHooks,
};
pub use logging::{install_logger, reset_logger, LogRecord, LogSeverity, Logger, StderrLogger};

pub(crate) use hooks::{
    report_broken_promise, report_defect, report_drop_defect, report_suppressed_failure,
    report_unhandled_failure,
};
