//! 闸门的排空与拒绝契约。

use crate::support::{self, macros::assert_error_code};
use shoal_core::{codes, sleep, with_gate, Future, Gate, ShoalError};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// 迟到者场景：三个在途操作分别在 5/10/15ms 后离开，t=2ms 时关闭。
///
/// # 教案级说明
/// - **Why**：`close()` 的决议时刻定义了"安全拆除资源"的时间点，必须恰好
///   等到最后一个 `leave`；
/// - **How**：三条睡眠链各自持有闸门句柄并在到期时 `leave`；主线在 2ms 处
///   关闭并立刻验证新 `enter` 被拒绝；
/// - **What**：`close()` 在虚拟时刻 ≥15ms 决议，三个操作全部完成，计数归零。
#[test]
fn close_waits_for_every_straggler() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let gate = Gate::new();
        for delay in [5u64, 10, 15] {
            gate.enter().expect("开启状态下可进入");
            let gate = gate.clone();
            sleep(Duration::from_millis(delay))
                .map(move |()| gate.leave())
                .ignore();
        }
        sleep(Duration::from_millis(2)).get().expect("推进到 t=2ms");
        let closed = gate.close();
        assert_error_code!(gate.enter(), codes::GATE_CLOSED);
        closed.get().expect("最后一个迟到者离开后闸门排空");
        assert_eq!(gate.count(), 0);
        assert!(!harness.clock.elapsed().is_zero());
    });
    assert!(
        harness.clock.elapsed() >= Duration::from_millis(15),
        "close() 不得早于最后一次 leave 决议"
    );
}

/// 验证：`with_gate` 在成功与失败两条路径上都恰好 `leave` 一次。
#[test]
fn with_gate_leaves_on_both_paths() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let gate = Gate::new();
        with_gate(&gate, || Future::ready(1))
            .get()
            .expect("成功路径");
        assert_eq!(gate.count(), 0);

        let error = with_gate(&gate, || {
            Future::<()>::err(ShoalError::sleep_aborted())
        })
        .get()
        .expect_err("失败路径原样浮出");
        assert!(error.is(codes::SLEEP_ABORTED));
        assert_eq!(gate.count(), 0, "失败路径同样必须 leave");

        let closed = gate.close();
        assert!(closed.available(), "计数为零时关闭立即完成");
        closed.get().expect("关闭成功");
        assert_error_code!(
            with_gate(&gate, || Future::ready(())).get(),
            codes::GATE_CLOSED
        );
    });
}

/// 验证排空计数律：进入 N 次、离开 M 次（M<N）时 close 悬置，补足后决议。
#[test]
fn drain_requires_exactly_matched_leaves() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let gate = Gate::new();
        for _ in 0..3 {
            gate.enter().expect("可进入");
        }
        gate.leave();
        let closed = gate.close();
        assert!(!closed.available(), "仍有两个在途操作");
        gate.leave();
        assert!(!closed.available(), "仍有一个在途操作");
        let done = Rc::new(Cell::new(false));
        {
            let done = Rc::clone(&done);
            let gate = gate.clone();
            sleep(Duration::from_millis(1))
                .map(move |()| {
                    gate.leave();
                    done.set(true);
                })
                .ignore();
        }
        closed.get().expect("第三次 leave 触发排空");
        assert!(done.get());
    });
}
