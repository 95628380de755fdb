//! shoal-core 执行内核的契约测试入口。
//!
//! # 教案式综述
//! - **意图 (Why)**：内核的价值在于可验证的调度与同步契约——单次消费、组内 FIFO、
//!   闸门排空、互斥活性、中止幂等、协作式让出。这里把每条契约固化为可重放的场景。
//! - **执行方式 (How)**：所有场景跑在注入虚拟时钟的单分片上（`support::manual_shard`）；
//!   分片在空转时把时间推进到下一个到期定时器，因此毫秒级的时序场景零等待、完全确定。
//! - **契约约束 (What)**：每个子模块对应一个原语或组合子族；断言一律落在稳定错误码
//!   与可数的副作用上，不依赖真实时间。

mod support;

mod abort_sleep;
mod concurrency;
mod gate_contract;
mod loops_contract;
mod mutex_contract;
mod scope_contract;
