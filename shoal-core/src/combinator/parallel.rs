use super::loops::do_until;
use crate::error::ShoalError;
use crate::future::{Future, Promise};
use crate::observability;
use crate::sync::Semaphore;
use std::cell::{Cell, RefCell};
use std::rc::Rc;

struct JoinState {
    remaining: Cell<usize>,
    error: RefCell<Option<ShoalError>>,
    waiter: RefCell<Option<Promise<()>>>,
}

/// 对范围内的每个元素立即发起 `action`，全部完成后决议。
///
/// # 契约说明（What）
/// - 没有并发上限：范围必须小，或元素引用稳定存储；
/// - 同步完成的调用不产生任何簿记；只有真正悬起的调用进入汇合计数；
/// - 一个或多个失败时，结果携带"调度器最先观察到"的那一个：
///   发起扫描中的就绪失败优先（按发起顺序），其次是最早完成的悬起失败；
///   其余失败被丢弃。
pub fn parallel_for_each<I, A>(range: I, mut action: A) -> Future<()>
where
    I: IntoIterator,
    A: FnMut(I::Item) -> Future<()>,
{
    let mut first_error: Option<ShoalError> = None;
    let mut join: Option<Rc<JoinState>> = None;
    for item in range {
        let fut = action(item);
        if fut.available() {
            if let Err(error) = fut.take_ready() {
                if first_error.is_none() {
                    first_error = Some(error);
                }
            }
            continue;
        }
        let state = join
            .get_or_insert_with(|| {
                Rc::new(JoinState {
                    remaining: Cell::new(0),
                    error: RefCell::new(None),
                    waiter: RefCell::new(None),
                })
            })
            .clone();
        state.remaining.set(state.remaining.get() + 1);
        fut.then_wrapped(move |result| {
            if let Err(error) = result {
                let mut slot = state.error.borrow_mut();
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
            let left = state.remaining.get() - 1;
            state.remaining.set(left);
            if left == 0 {
                let waiter = state.waiter.borrow_mut().take();
                if let Some(promise) = waiter {
                    let error = state.error.borrow_mut().take();
                    match error {
                        Some(error) => promise.set_error(error),
                        None => promise.set_value(()),
                    }
                }
            }
            Future::ready(())
        })
        .ignore();
    }
    match join {
        None => match first_error {
            Some(error) => Future::err(error),
            None => Future::ready(()),
        },
        Some(state) => {
            if let Some(error) = first_error {
                let mut slot = state.error.borrow_mut();
                if slot.is_none() {
                    *slot = Some(error);
                }
            }
            let mut promise = Promise::new();
            let fut = promise.get_future();
            *state.waiter.borrow_mut() = Some(promise);
            fut
        }
    }
}

struct BoundedState<It, A> {
    iter: It,
    action: A,
    semaphore: Semaphore,
    error: Option<ShoalError>,
    exhausted: bool,
}

/// 有界并发版本：同一时刻至多 `max_concurrent` 个 `action` 在途。
///
/// # 逻辑解析（How）
/// - 驱动循环每轮先向信号量请求一个单位，拿到后把 `action` 放到后台运行，
///   完成（无论成败）时归还单位；
/// - 范围耗尽后一次性索回全部 `max_concurrent` 个单位，等价于等待所有
///   后台调用静默；
/// - 失败不取消在途调用：首个被观察到的失败在全部静默后浮出。
pub fn max_concurrent_for_each<I, A>(
    range: I,
    max_concurrent: usize,
    action: A,
) -> Future<()>
where
    I: IntoIterator,
    I::IntoIter: 'static,
    I::Item: 'static,
    A: FnMut(I::Item) -> Future<()> + 'static,
{
    if max_concurrent == 0 {
        observability::report_defect(
            "shoal::combinator",
            "max_concurrent_for_each requires at least one unit",
        );
        return Future::err(ShoalError::new(
            crate::error::codes::FUTURE_INVALID_STATE,
            "max_concurrent must be positive",
        ));
    }
    let state = Rc::new(RefCell::new(BoundedState {
        iter: range.into_iter(),
        action,
        semaphore: Semaphore::new(max_concurrent),
        error: None,
        exhausted: false,
    }));

    let stop = {
        let state = Rc::clone(&state);
        move || state.borrow().exhausted
    };
    let step = {
        let state = Rc::clone(&state);
        move || {
            let semaphore = state.borrow().semaphore.clone();
            let state = Rc::clone(&state);
            semaphore.wait(1).then(move |()| {
                let launched = {
                    let mut bounded = state.borrow_mut();
                    match bounded.iter.next() {
                        Some(item) => Some((bounded.action)(item)),
                        None => {
                            bounded.exhausted = true;
                            None
                        }
                    }
                };
                match launched {
                    Some(fut) => {
                        let state = Rc::clone(&state);
                        fut.then_wrapped(move |result| {
                            let semaphore = {
                                let mut bounded = state.borrow_mut();
                                if let Err(error) = result {
                                    if bounded.error.is_none() {
                                        bounded.error = Some(error);
                                    }
                                }
                                bounded.semaphore.clone()
                            };
                            semaphore.signal(1);
                            Future::ready(())
                        })
                        .ignore();
                    }
                    None => {
                        // 取到的单位属于"探测到范围已尽"的一轮，原样归还。
                        state.borrow().semaphore.clone().signal(1);
                    }
                }
                Future::ready(())
            })
        }
    };

    let quiesce_state = Rc::clone(&state);
    let surface_state = Rc::clone(&state);
    do_until(stop, step)
        .then(move |()| {
            let semaphore = quiesce_state.borrow().semaphore.clone();
            semaphore.wait(max_concurrent)
        })
        .then_wrapped(move |result| {
            if let Err(error) = result {
                return Future::err(error);
            }
            let error = surface_state.borrow_mut().error.take();
            match error {
                Some(error) => Future::err(error),
                None => Future::ready(()),
            }
        })
}
