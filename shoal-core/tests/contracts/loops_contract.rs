//! 顺序循环组合子的契约场景。

use crate::support;
use shoal_core::{do_for_each, do_until, keep_doing, later, repeat, StopIteration};
use shoal_core::{codes, Future, ShoalError};
use std::cell::Cell;
use std::rc::Rc;

/// 顺序计数场景：五个元素逐个累加，前一迭代决议前不得开始下一迭代。
///
/// # 教案级说明
/// - **Why**：`do_for_each` 的全部价值在于"顺序"二字——一旦迭代重叠，
///   借用稳定存储的调用方就会观察到交错写入；
/// - **How**：动作先置"在途"标记，经 `later()` 悬起一轮后才累加并清标记；
///   下一迭代开始时断言标记已清；
/// - **What**：总和为 10，恰好五次调用。
#[test]
fn sequential_counting_is_strictly_ordered() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let sum = Rc::new(Cell::new(0));
        let in_flight = Rc::new(Cell::new(false));
        let invocations = Rc::new(Cell::new(0));
        let fut = {
            let sum = Rc::clone(&sum);
            let in_flight = Rc::clone(&in_flight);
            let invocations = Rc::clone(&invocations);
            do_for_each(vec![0u64, 1, 2, 3, 4], move |value| {
                assert!(!in_flight.get(), "前一迭代决议前不得开始下一迭代");
                in_flight.set(true);
                invocations.set(invocations.get() + 1);
                let sum = Rc::clone(&sum);
                let in_flight = Rc::clone(&in_flight);
                later().map(move |()| {
                    sum.set(sum.get() + value);
                    in_flight.set(false);
                })
            })
        };
        fut.get().expect("顺序循环成功");
        assert_eq!(sum.get(), 10);
        assert_eq!(invocations.get(), 5);
    });
}

/// 验证：`do_until` 的停止谓词先于动作评估，停止后动作不再被调用。
#[test]
fn do_until_checks_the_predicate_first() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let rounds = Rc::new(Cell::new(0u32));
        let fut = {
            let stop_rounds = Rc::clone(&rounds);
            let act_rounds = Rc::clone(&rounds);
            do_until(
                move || stop_rounds.get() >= 3,
                move || {
                    act_rounds.set(act_rounds.get() + 1);
                    later()
                },
            )
        };
        fut.get().expect("循环按谓词停止");
        assert_eq!(rounds.get(), 3);
    });
}

/// 验证：`keep_doing` 只能以失败终止，失败原样浮出。
#[test]
fn keep_doing_ends_only_on_failure() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let rounds = Rc::new(Cell::new(0u32));
        let fut = {
            let rounds = Rc::clone(&rounds);
            keep_doing(move || {
                rounds.set(rounds.get() + 1);
                if rounds.get() == 4 {
                    Future::err(ShoalError::gate_closed())
                } else {
                    later()
                }
            })
        };
        let error = fut.get().expect_err("只有失败能结束 keep_doing");
        assert!(error.is(codes::GATE_CLOSED));
        assert_eq!(rounds.get(), 4);
    });
}

/// 验证：悬起一轮后的 `repeat` 仍按 `StopIteration` 收敛。
#[test]
fn repeat_converges_across_suspension() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let rounds = Rc::new(Cell::new(0u32));
        let fut = {
            let rounds = Rc::clone(&rounds);
            repeat(move || {
                rounds.set(rounds.get() + 1);
                let stop = rounds.get() >= 5;
                later().map(move |()| {
                    if stop {
                        StopIteration::Yes
                    } else {
                        StopIteration::No
                    }
                })
            })
        };
        fut.get().expect("循环收敛");
        assert_eq!(rounds.get(), 5);
    });
}
