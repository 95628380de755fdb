//! 契约测试的公共支撑：虚拟时钟分片与断言宏。

pub(crate) mod macros;

use shoal_core::{ManualTimeSource, Shard, ShardConfig, TimeSource};
use std::rc::Rc;

/// 注入虚拟时钟的单分片测试环境。
///
/// # 契约说明（What）
/// - `shard` 以缺省配置构造，时间源为 `clock`；
/// - 分片空转时会把 `clock` 推进到下一个到期定时器，测试里的 `sleep`
///   既不真实等待，也不会飘移；
/// - 测试可随时读取 `clock.elapsed()` 断言虚拟时间的推进量。
pub(crate) struct ManualShard {
    pub(crate) shard: Shard,
    pub(crate) clock: Rc<ManualTimeSource>,
}

/// 构造一个虚拟时钟分片。
pub(crate) fn manual_shard() -> ManualShard {
    let clock = Rc::new(ManualTimeSource::new());
    let time_source: Rc<dyn TimeSource> = Rc::clone(&clock) as Rc<dyn TimeSource>;
    let shard = Shard::with_time_source(ShardConfig::default(), time_source);
    ManualShard { shard, clock }
}
