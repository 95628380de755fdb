//! 中止源与可中止睡眠的传播契约。

use crate::support;
use shoal_core::{
    codes, sleep, sleep_abortable, sleep_abortable_until_stop, wait_for_stop, AbortSource,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// 可中止睡眠场景：挂 1s 睡眠，t=100ms 触发中止。
///
/// # 教案级说明
/// - **Why**：超时与取消都建立在"中止在下一个悬起点生效"之上；若睡眠
///   拖到定时器到期才失败，取消就失去了意义；
/// - **How**：另一条 100ms 睡眠链触发 `request_abort`，虚拟时钟记录
///   失败发生的时刻；
/// - **What**：future 以 `sleep.aborted` 失败，虚拟耗时 ≈100ms、远小于 1s。
#[test]
fn abort_interrupts_the_sleep_promptly() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let source = AbortSource::new();
        let sleeper = sleep_abortable(Duration::from_secs(1), &source);
        {
            let source = source.clone();
            sleep(Duration::from_millis(100))
                .map(move |()| source.request_abort())
                .ignore();
        }
        let error = sleeper.get().expect_err("中止必须使睡眠失败");
        assert!(error.is(codes::SLEEP_ABORTED));
    });
    let elapsed = harness.clock.elapsed();
    assert!(elapsed >= Duration::from_millis(100));
    assert!(
        elapsed < Duration::from_secs(1),
        "失败必须发生在中止时刻而非定时器到期时刻"
    );
}

/// 验证：已中止的源使睡眠立即失败；定时器先到则中止是无操作。
#[test]
fn pre_aborted_source_and_late_abort() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let source = AbortSource::new();
        source.request_abort();
        let sleeper = sleep_abortable(Duration::from_millis(5), &source);
        assert!(sleeper.available(), "已中止的源必须立即失败");
        let error = sleeper.get().expect_err("立即失败");
        assert!(error.is(codes::SLEEP_ABORTED));

        let source = AbortSource::new();
        let sleeper = sleep_abortable(Duration::from_millis(5), &source);
        sleeper.get().expect("定时器正常到期");
        source.request_abort();
    });
}

/// 验证：中止幂等——重复触发下每个订阅回调至多一次。
#[test]
fn repeated_abort_fires_subscribers_once() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let source = AbortSource::new();
        let fired = Rc::new(Cell::new(0u32));
        let subscription = {
            let fired = Rc::clone(&fired);
            source.subscribe(move || fired.set(fired.get() + 1))
        };
        assert!(subscription.is_some());
        source.request_abort();
        source.request_abort();
        source.request_abort();
        assert_eq!(fired.get(), 1, "订阅回调至多触发一次");
        drop(subscription);
    });
}

/// 验证：无源变体挂接引擎停机；停机前睡满即成功，停机则失败。
#[test]
fn stop_driven_sleep_follows_engine_shutdown() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let normal = sleep_abortable_until_stop(Duration::from_millis(5));
        normal.get().expect("停机前睡满即成功");

        let pending_stop = wait_for_stop();
        assert!(!pending_stop.available());

        let sleeper = sleep_abortable_until_stop(Duration::from_secs(1));
        let handle = harness.shard.stop_handle();
        sleep(Duration::from_millis(10))
            .map(move |()| {
                handle.request_stop();
            })
            .ignore();
        let error = sleeper.get().expect_err("停机打断睡眠");
        assert!(error.is(codes::SLEEP_ABORTED));
        pending_stop.get().expect("停机事件已发生");
        wait_for_stop().get().expect("停机后的等待立即就绪");
    });
    assert!(harness.clock.elapsed() < Duration::from_secs(1));
}
