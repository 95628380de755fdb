use crate::error::{codes, ShoalError};
use crate::sched::MAX_SCHEDULING_GROUPS;
use core::time::Duration;

/// 分片执行器的静态配置。
///
/// # 设计背景（Why）
/// - 任务配额与配额时长共同决定协作式让出的粒度：配额内的就绪任务连续运行，
///   超出配额或超过时长后 `need_preempt()` 翻转，循环组合子据此重新入队；
/// - 配置在分片构造时固定，运行期不热更新，避免热路径上的读同步。
///
/// # 契约说明（What）
/// - `task_quota`：单个调度批次最多连续运行的任务数，≥ 1；
/// - `task_quota_duration`：单个批次的时间预算，> 0；
/// - `group_table_capacity`：本分片可实例化的调度组槽位数，1..=16。
#[derive(Clone, Debug, PartialEq, Eq)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ShardConfig {
    task_quota: u32,
    task_quota_duration: Duration,
    group_table_capacity: usize,
}

impl ShardConfig {
    /// 创建配置构建器。
    pub fn builder() -> ShardConfigBuilder {
        ShardConfigBuilder::default()
    }

    /// 单批次任务配额。
    pub fn task_quota(&self) -> u32 {
        self.task_quota
    }

    /// 单批次时间预算。
    pub fn task_quota_duration(&self) -> Duration {
        self.task_quota_duration
    }

    /// 调度组槽位数。
    pub fn group_table_capacity(&self) -> usize {
        self.group_table_capacity
    }
}

impl Default for ShardConfig {
    fn default() -> Self {
        Self {
            task_quota: 64,
            task_quota_duration: Duration::from_micros(500),
            group_table_capacity: MAX_SCHEDULING_GROUPS,
        }
    }
}

/// `ShardConfig` 构建器，构建时完成参数校验。
#[derive(Clone, Debug)]
pub struct ShardConfigBuilder {
    task_quota: u32,
    task_quota_duration: Duration,
    group_table_capacity: usize,
}

impl Default for ShardConfigBuilder {
    fn default() -> Self {
        let defaults = ShardConfig::default();
        Self {
            task_quota: defaults.task_quota,
            task_quota_duration: defaults.task_quota_duration,
            group_table_capacity: defaults.group_table_capacity,
        }
    }
}

impl ShardConfigBuilder {
    /// 设置单批次任务配额。
    pub fn task_quota(mut self, quota: u32) -> Self {
        self.task_quota = quota;
        self
    }

    /// 设置单批次时间预算。
    pub fn task_quota_duration(mut self, duration: Duration) -> Self {
        self.task_quota_duration = duration;
        self
    }

    /// 设置调度组槽位数。
    pub fn group_table_capacity(mut self, capacity: usize) -> Self {
        self.group_table_capacity = capacity;
        self
    }

    /// 校验并产出配置。
    pub fn build(self) -> Result<ShardConfig, ShoalError> {
        if self.task_quota == 0 {
            return Err(ShoalError::new(
                codes::CONFIG_INVALID,
                "task_quota must be at least 1",
            ));
        }
        if self.task_quota_duration.is_zero() {
            return Err(ShoalError::new(
                codes::CONFIG_INVALID,
                "task_quota_duration must be positive",
            ));
        }
        if self.group_table_capacity == 0 || self.group_table_capacity > MAX_SCHEDULING_GROUPS {
            return Err(ShoalError::new(
                codes::CONFIG_INVALID,
                format!(
                    "group_table_capacity must be within 1..={MAX_SCHEDULING_GROUPS}"
                ),
            ));
        }
        Ok(ShardConfig {
            task_quota: self.task_quota,
            task_quota_duration: self.task_quota_duration,
            group_table_capacity: self.group_table_capacity,
        })
    }
}
