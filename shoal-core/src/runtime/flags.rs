//
// 启用 `--cfg loom` 时切换到 loom 的原子类型，让模型检查器穷举跨线程交错；
// `Arc` 保持标准实现以维持克隆语义与 API 形状不变。
#[cfg(not(loom))]
use std::sync::atomic::{AtomicBool, Ordering};
#[cfg(loom)]
use loom::sync::atomic::{AtomicBool, Ordering};

use std::sync::Arc;

/// 抢占请求位，分片内协作式让出的唯一跨线程信号。
///
/// # 设计背景（Why）
/// - 循环组合子在就绪步骤之间查询该位：I/O 完成、定时器到期、配额耗尽或外部停机
///   都可以从任意线程置位，请求正在内联推进的链条尽快让出；
/// - 读是一次原子加载，满足"廉价读取"契约，可以出现在最热的循环里。
///
/// # 契约说明（What）
/// - `set` 采用释放语义，`is_set` 采用获取语义：置位之前发生的写入对观察到
///   置位的分片线程可见；
/// - 执行器在每个调度批次开始时 `clear`，批内任务看到的是本批次的新鲜状态。
#[derive(Clone, Debug)]
pub struct PreemptFlag {
    inner: Arc<AtomicBool>,
}

impl PreemptFlag {
    /// 创建未置位的抢占位。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 请求协作式让出。
    pub fn set(&self) {
        self.inner.store(true, Ordering::Release);
    }

    /// 清除请求，仅由执行器在批次边界调用。
    pub fn clear(&self) {
        self.inner.store(false, Ordering::Release);
    }

    /// 查询是否有让出请求。
    pub fn is_set(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

impl Default for PreemptFlag {
    fn default() -> Self {
        Self::new()
    }
}

/// 停机请求位，一次性触发。
///
/// # 契约说明（What）
/// - `request` 首次成功翻转返回 `true`，重复调用返回 `false`，调用方据此避免
///   重复执行停机兜底；
/// - 置位本身只是信号，订阅者回调由分片回路在下一次泵循环中统一触发。
#[derive(Clone, Debug)]
pub struct StopFlag {
    inner: Arc<AtomicBool>,
}

impl StopFlag {
    /// 创建未触发的停机位。
    pub fn new() -> Self {
        Self {
            inner: Arc::new(AtomicBool::new(false)),
        }
    }

    /// 请求停机；首次触发返回 `true`。
    pub fn request(&self) -> bool {
        self.inner
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    /// 查询是否已请求停机。
    pub fn is_requested(&self) -> bool {
        self.inner.load(Ordering::Acquire)
    }
}

impl Default for StopFlag {
    fn default() -> Self {
        Self::new()
    }
}
