//! 无界与有界并发组合子的契约场景。

use crate::support;
use shoal_core::{max_concurrent_for_each, parallel_for_each, sleep};
use std::cell::{Cell, RefCell};
use std::rc::Rc;
use std::time::Duration;

/// 有界并发场景：十个元素、三个单位，任一时刻至多三个动作在途。
///
/// # 教案级说明
/// - **Why**：`max_concurrent_for_each` 是内核的首要背压出口，并发上限
///   一旦失守，下游资源（文件描述符、内存配额）就会被冲垮；
/// - **How**：动作进入时递增在途计数并记录峰值，虚拟睡眠 10ms 后递减；
///   十个元素分四波完成，虚拟墙钟时间必然不少于 ⌈10/3⌉·10ms；
/// - **What**：峰值恰为 3，总虚拟耗时 ≥ 40ms，future 成功决议。
#[test]
fn bounded_concurrency_respects_the_limit() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let in_flight = Rc::new(Cell::new(0u32));
        let peak = Rc::new(Cell::new(0u32));
        let fut = {
            let in_flight = Rc::clone(&in_flight);
            let peak = Rc::clone(&peak);
            max_concurrent_for_each(0..10, 3, move |_| {
                in_flight.set(in_flight.get() + 1);
                if in_flight.get() > peak.get() {
                    peak.set(in_flight.get());
                }
                let in_flight = Rc::clone(&in_flight);
                sleep(Duration::from_millis(10))
                    .map(move |()| in_flight.set(in_flight.get() - 1))
            })
        };
        fut.get().expect("有界并发成功完成");
        assert_eq!(peak.get(), 3, "并发峰值必须等于单位数");
        assert_eq!(in_flight.get(), 0);
    });
    assert!(
        harness.clock.elapsed() >= Duration::from_millis(40),
        "十个元素按三路并发至少需要四波"
    );
}

/// 验证：`max_concurrent = 1` 退化为与 `do_for_each` 等价的顺序扫描。
#[test]
fn single_unit_degrades_to_sequential() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let order = Rc::new(RefCell::new(Vec::new()));
        let active = Rc::new(Cell::new(false));
        let fut = {
            let order = Rc::clone(&order);
            let active = Rc::clone(&active);
            max_concurrent_for_each(0..4, 1, move |index| {
                assert!(!active.get(), "单单位下不允许重叠");
                active.set(true);
                order.borrow_mut().push(index);
                let active = Rc::clone(&active);
                sleep(Duration::from_millis(1)).map(move |()| active.set(false))
            })
        };
        fut.get().expect("顺序退化场景成功");
        assert_eq!(*order.borrow(), vec![0, 1, 2, 3], "保持范围顺序");
    });
}

/// 验证：失败不取消在途动作，全部静默后浮出首个失败。
#[test]
fn failures_do_not_cancel_inflight_work() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let completed = Rc::new(Cell::new(0u32));
        let fut = {
            let completed = Rc::clone(&completed);
            max_concurrent_for_each(0..6, 2, move |index| {
                let completed = Rc::clone(&completed);
                sleep(Duration::from_millis(5)).then(move |()| {
                    completed.set(completed.get() + 1);
                    if index == 1 {
                        shoal_core::Future::err(shoal_core::ShoalError::gate_closed())
                    } else {
                        shoal_core::Future::ready(())
                    }
                })
            })
        };
        let error = fut.get().expect_err("首个失败在静默后浮出");
        assert!(error.is(shoal_core::codes::GATE_CLOSED));
        assert_eq!(completed.get(), 6, "失败不得取消在途与后续动作");
    });
}

/// 验证：信号量限时等待按稳定码超时，按时放行则取消定时器。
#[test]
fn semaphore_wait_timeout_follows_the_contract() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let semaphore = shoal_core::Semaphore::new(0);
        let error = semaphore
            .wait_timeout(1, Duration::from_millis(5))
            .get()
            .expect_err("无人归还单位时必须超时");
        assert!(error.is(shoal_core::codes::SEMAPHORE_TIMED_OUT));
        assert_eq!(semaphore.waiter_count(), 0, "超时者必须离队");

        let granted = semaphore.wait_timeout(1, Duration::from_millis(50));
        semaphore.signal(1);
        granted.get().expect("按时归还则正常放行");
    });
    assert!(harness.clock.elapsed() >= Duration::from_millis(5));
    assert!(harness.clock.elapsed() < Duration::from_millis(50));
}

/// 验证：`parallel_for_each` 等待所有悬起分支后才决议。
#[test]
fn parallel_for_each_joins_all_branches() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let done = Rc::new(Cell::new(0u32));
        let fut = {
            let done = Rc::clone(&done);
            parallel_for_each(1..=4u64, move |factor| {
                let done = Rc::clone(&done);
                sleep(Duration::from_millis(factor * 2))
                    .map(move |()| done.set(done.get() + 1))
            })
        };
        fut.get().expect("汇合成功");
        assert_eq!(done.get(), 4, "全部分支完成后才决议");
    });
    assert!(harness.clock.elapsed() >= Duration::from_millis(8));
}
