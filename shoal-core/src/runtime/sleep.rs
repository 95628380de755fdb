use super::executor;
use super::timer::TimerHandle;
use crate::error::{codes, ShoalError};
use crate::future::{Future, Promise};
use crate::observability;
use crate::sync::{AbortSource, AbortSubscription};
use std::cell::RefCell;
use std::rc::Rc;
use std::time::Duration;

/// 睡到定时器到期。
///
/// 零时长的睡眠在下一次定时器轮询时决议，不会同步就绪。
pub fn sleep(duration: Duration) -> Future<()> {
    let Some(shard) = executor::try_current() else {
        return no_shard("sleep");
    };
    let mut promise = Promise::new();
    let fut = promise.get_future();
    let deadline = shard.now() + duration;
    shard.arm_timer(deadline, Box::new(move || promise.set_value(())));
    fut
}

struct SleeperState {
    promise: Option<Promise<()>>,
    timer: Option<TimerHandle>,
    subscription: Option<AbortSubscription>,
}

/// 可被中止源打断的睡眠。
///
/// # 契约说明（What）
/// - 先订阅、后挂定时器：若源已中止，future 立即以 `sleep.aborted` 失败，
///   定时器根本不会被挂上；
/// - 中止回调只在成功取消定时器时才令 future 失败——定时器已触发的中止
///   是一次无操作；
/// - 定时器触发路径顺带释放订阅，睡眠结束后源上不留残余回调。
pub fn sleep_abortable(duration: Duration, source: &AbortSource) -> Future<()> {
    let Some(shard) = executor::try_current() else {
        return no_shard("sleep_abortable");
    };
    let mut promise = Promise::new();
    let fut = promise.get_future();
    let state = Rc::new(RefCell::new(SleeperState {
        promise: Some(promise),
        timer: None,
        subscription: None,
    }));

    let on_abort = {
        let state = Rc::clone(&state);
        move || {
            let timer = state.borrow_mut().timer.take();
            let cancelled = match &timer {
                Some(handle) => super::cancel_timer(handle),
                None => false,
            };
            if cancelled {
                let promise = state.borrow_mut().promise.take();
                if let Some(promise) = promise {
                    promise.set_error(ShoalError::sleep_aborted());
                }
            }
        }
    };

    match source.subscribe(on_abort) {
        None => {
            let promise = state.borrow_mut().promise.take();
            if let Some(promise) = promise {
                promise.set_error(ShoalError::sleep_aborted());
            }
            fut
        }
        Some(subscription) => {
            let timer = {
                let state = Rc::clone(&state);
                shard.arm_timer(
                    shard.now() + duration,
                    Box::new(move || {
                        let (promise, subscription) = {
                            let mut sleeper = state.borrow_mut();
                            (sleeper.promise.take(), sleeper.subscription.take())
                        };
                        drop(subscription);
                        if let Some(promise) = promise {
                            promise.set_value(());
                        }
                    }),
                )
            };
            let mut sleeper = state.borrow_mut();
            sleeper.timer = Some(timer);
            sleeper.subscription = Some(subscription);
            drop(sleeper);
            fut
        }
    }
}

struct StopSleeperState {
    promise: Option<Promise<()>>,
    timer: Option<TimerHandle>,
    stop_sub: Option<u64>,
}

/// 无中止源的变体：引擎停机即中止。
///
/// 停机发生（或已经发生）时 future 以 `sleep.aborted` 失败；
/// 否则与 [`sleep`] 一样在到期时决议。
pub fn sleep_abortable_until_stop(duration: Duration) -> Future<()> {
    let Some(shard) = executor::try_current() else {
        return no_shard("sleep_abortable_until_stop");
    };
    if shard.stop_fired() {
        return Future::err(ShoalError::sleep_aborted());
    }
    let mut promise = Promise::new();
    let fut = promise.get_future();
    let state = Rc::new(RefCell::new(StopSleeperState {
        promise: Some(promise),
        timer: None,
        stop_sub: None,
    }));

    let on_stop = {
        let state = Rc::clone(&state);
        move || {
            let timer = state.borrow_mut().timer.take();
            let cancelled = match &timer {
                Some(handle) => super::cancel_timer(handle),
                None => false,
            };
            if cancelled {
                let promise = state.borrow_mut().promise.take();
                if let Some(promise) = promise {
                    promise.set_error(ShoalError::sleep_aborted());
                }
            }
        }
    };
    let stop_sub = shard.subscribe_stop(Box::new(on_stop));

    let timer = {
        let state = Rc::clone(&state);
        shard.arm_timer(
            shard.now() + duration,
            Box::new(move || {
                let (promise, stop_sub) = {
                    let mut sleeper = state.borrow_mut();
                    (sleeper.promise.take(), sleeper.stop_sub.take())
                };
                if let Some(id) = stop_sub {
                    if let Some(shard) = executor::try_current() {
                        shard.unsubscribe_stop(id);
                    }
                }
                if let Some(promise) = promise {
                    promise.set_value(());
                }
            }),
        )
    };
    let mut sleeper = state.borrow_mut();
    sleeper.timer = Some(timer);
    sleeper.stop_sub = stop_sub;
    drop(sleeper);
    fut
}

/// 引擎停机时决议的 future；停机已发生时立即就绪。
pub fn wait_for_stop() -> Future<()> {
    let Some(shard) = executor::try_current() else {
        return no_shard("wait_for_stop");
    };
    if shard.stop_fired() {
        return Future::ready(());
    }
    let mut promise = Promise::new();
    let fut = promise.get_future();
    let _ = shard.subscribe_stop(Box::new(move || promise.set_value(())));
    fut
}

fn no_shard(operation: &'static str) -> Future<()> {
    observability::report_defect("shoal::runtime", "timer facility used with no shard bound");
    Future::err(ShoalError::new(
        codes::EXECUTOR_SHUTDOWN,
        format!("{operation}: no shard bound to this thread"),
    ))
}
