//! 延迟计算原语：future/promise 对与续延链。
//!
//! # 表示（How）
//! - 就绪 future 以内联变体承载结果，零堆分配；
//! - 未决 future 与它的 promise 共享一个 `Rc` 槽位，槽内状态机为
//!   `Pending`（尚无续延）→ `Waited`（已挂续延）→ 决议后 `Gone`，
//!   或 `Ready`（先决议、后消费）；future 先行析构则进入 `Abandoned`，
//!   此后的决议是一次丢弃（失败会被记录）。
//!
//! # 消费纪律（What）
//! - future 恰好被消费一次。链式方法按值收下 `self`，重复消费在编译期
//!   即不可表达；仅剩的动态缺陷（重复 `get_future`、未就绪取值）统一
//!   走缺陷上报；
//! - 携带失败却未被消费就析构的 future 通过
//!   [`observability`](crate::observability) 上报，不会使进程崩溃；
//! - promise 未决议即析构会以 `future.broken_promise` 决议其 future 并上报。

use crate::error::{codes, ShoalError};
use crate::observability;
use crate::runtime::{self, make_task};
use crate::sched::SchedulingGroup;
use std::cell::{Cell, RefCell};
use std::mem;
use std::rc::Rc;

/// 挂在未决 future 上的续延：闭包加上附着时捕获的调度组。
pub(crate) struct Continuation<T: 'static> {
    group: SchedulingGroup,
    run: Box<dyn FnOnce(Result<T, ShoalError>)>,
}

enum SlotState<T: 'static> {
    Pending,
    Waited(Continuation<T>),
    Ready(Result<T, ShoalError>),
    Gone,
    Abandoned,
}

struct Slot<T: 'static> {
    state: RefCell<SlotState<T>>,
    future_taken: Cell<bool>,
}

enum Repr<T: 'static> {
    Immediate(Result<T, ShoalError>),
    Shared(Rc<Slot<T>>),
}

/// 一个尚未就绪或已就绪的结果句柄。
///
/// 不可复制、可移动；通过 `then`/`map`/`then_wrapped`/`finally`/
/// `handle_error` 之一附着续延，或 `forward_to` 转交，或在线程上下文内
/// `get`，或直接析构——每个 future 恰好走其中一条路。
#[must_use = "被无声丢弃的 future 不会取消其工作；请消费它或显式调用 ignore()"]
pub struct Future<T: 'static> {
    repr: Option<Repr<T>>,
}

/// future 的写端。
///
/// `get_future` 至多一次；`set_value` 与 `set_error` 合计恰好一次。
/// 未决议即析构的 promise 把 `future.broken_promise` 写入失败通道。
pub struct Promise<T: 'static> {
    slot: Option<Rc<Slot<T>>>,
}

impl<T: 'static> Promise<T> {
    /// 创建未决议的 promise。
    pub fn new() -> Self {
        Self {
            slot: Some(Rc::new(Slot {
                state: RefCell::new(SlotState::Pending),
                future_taken: Cell::new(false),
            })),
        }
    }

    /// 取出与本 promise 配对的 future；至多调用一次。
    pub fn get_future(&mut self) -> Future<T> {
        match &self.slot {
            Some(slot) if !slot.future_taken.get() => {
                slot.future_taken.set(true);
                Future {
                    repr: Some(Repr::Shared(Rc::clone(slot))),
                }
            }
            _ => {
                observability::report_defect(
                    "shoal::future",
                    "get_future called twice or after resolution",
                );
                Future::err(ShoalError::new(
                    codes::FUTURE_INVALID_STATE,
                    "future already taken from this promise",
                ))
            }
        }
    }

    /// 以成功值决议。
    pub fn set_value(mut self, value: T) {
        self.complete(Ok(value));
    }

    /// 以失败决议。
    pub fn set_error(mut self, error: ShoalError) {
        self.complete(Err(error));
    }

    /// 以任意结果决议。
    pub fn resolve(mut self, result: Result<T, ShoalError>) {
        self.complete(result);
    }

    fn complete(&mut self, result: Result<T, ShoalError>) {
        let Some(slot) = self.slot.take() else {
            observability::report_defect("shoal::future", "promise resolved twice");
            return;
        };
        deliver(&slot, result);
    }
}

impl<T: 'static> Default for Promise<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: 'static> Drop for Promise<T> {
    fn drop(&mut self) {
        let Some(slot) = self.slot.take() else {
            return;
        };
        let pending = {
            let state = slot.state.borrow();
            matches!(*state, SlotState::Pending | SlotState::Waited(_))
        };
        if !pending {
            // future 已先行放弃：双方都离场，无人观察，保持沉默。
            return;
        }
        if slot.future_taken.get() {
            observability::report_broken_promise("promise dropped before resolution");
            deliver(&slot, Err(ShoalError::broken_promise("promise drop")));
        }
    }
}

/// 把结果写入共享槽：无续延则存为 `Ready`，有续延则调度之，
/// future 已析构则丢弃（失败上报）。
fn deliver<T: 'static>(slot: &Rc<Slot<T>>, result: Result<T, ShoalError>) {
    let previous = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
    match previous {
        SlotState::Pending => {
            *slot.state.borrow_mut() = SlotState::Ready(result);
        }
        SlotState::Waited(continuation) => {
            let Continuation { group, run } = continuation;
            runtime::schedule(make_task(group, move || run(result)));
        }
        SlotState::Abandoned => {
            if let Err(error) = result {
                observability::report_unhandled_failure(&error);
            }
        }
        SlotState::Ready(_) | SlotState::Gone => {
            observability::report_defect("shoal::future", "slot resolved twice");
        }
    }
}

impl<T: 'static> Future<T> {
    /// 就绪的成功 future，无堆分配。
    pub fn ready(value: T) -> Self {
        Self {
            repr: Some(Repr::Immediate(Ok(value))),
        }
    }

    /// 就绪的失败 future。
    pub fn err(error: ShoalError) -> Self {
        Self {
            repr: Some(Repr::Immediate(Err(error))),
        }
    }

    /// 从结果构造就绪 future。
    pub fn from_result(result: Result<T, ShoalError>) -> Self {
        Self {
            repr: Some(Repr::Immediate(result)),
        }
    }

    /// 是否已就绪（成功或失败）。不消费。
    pub fn available(&self) -> bool {
        match self.repr.as_ref() {
            Some(Repr::Immediate(_)) => true,
            Some(Repr::Shared(slot)) => {
                matches!(*slot.state.borrow(), SlotState::Ready(_))
            }
            None => false,
        }
    }

    /// 是否已就绪且为失败。不消费。
    pub fn failed(&self) -> bool {
        match self.repr.as_ref() {
            Some(Repr::Immediate(result)) => result.is_err(),
            Some(Repr::Shared(slot)) => {
                matches!(*slot.state.borrow(), SlotState::Ready(Err(_)))
            }
            None => false,
        }
    }

    /// 取出已就绪的结果；对未就绪 future 调用属于框架缺陷。
    pub(crate) fn take_ready(mut self) -> Result<T, ShoalError> {
        match self.repr.take() {
            Some(Repr::Immediate(result)) => result,
            Some(Repr::Shared(slot)) => {
                let state = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
                match state {
                    SlotState::Ready(result) => result,
                    other => {
                        *slot.state.borrow_mut() = other;
                        observability::report_defect(
                            "shoal::future",
                            "take_ready on an unresolved future",
                        );
                        Err(ShoalError::new(
                            codes::FUTURE_INVALID_STATE,
                            "future not ready",
                        ))
                    }
                }
            }
            None => {
                observability::report_defect("shoal::future", "future consumed twice");
                Err(ShoalError::new(
                    codes::FUTURE_INVALID_STATE,
                    "future already consumed",
                ))
            }
        }
    }

    /// 续延原语：无论成败，把完整结果交给 `func`，返回其产出的 future。
    ///
    /// 就绪且未被请求让出时内联执行（快速路径，零分配）；否则装箱为续延帧，
    /// 捕获当前调度组，待决议（或让出点）后由执行器调度。
    pub fn then_wrapped<U, F>(mut self, func: F) -> Future<U>
    where
        U: 'static,
        F: FnOnce(Result<T, ShoalError>) -> Future<U> + 'static,
    {
        let repr = match self.repr.take() {
            Some(repr) => repr,
            None => {
                observability::report_defect("shoal::future", "future consumed twice");
                return Future::err(ShoalError::new(
                    codes::FUTURE_INVALID_STATE,
                    "future already consumed",
                ));
            }
        };
        match repr {
            Repr::Immediate(result) => chain_ready(result, func),
            Repr::Shared(slot) => {
                let state = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
                match state {
                    SlotState::Ready(result) => chain_ready(result, func),
                    SlotState::Pending => {
                        let mut promise = Promise::new();
                        let fut = promise.get_future();
                        let continuation = Continuation {
                            group: runtime::current_group(),
                            run: Box::new(move |result| {
                                func(result).forward_to(promise);
                            }),
                        };
                        *slot.state.borrow_mut() = SlotState::Waited(continuation);
                        fut
                    }
                    other => {
                        *slot.state.borrow_mut() = other;
                        observability::report_defect(
                            "shoal::future",
                            "continuation attached to a consumed future",
                        );
                        Future::err(ShoalError::new(
                            codes::FUTURE_INVALID_STATE,
                            "future already consumed",
                        ))
                    }
                }
            }
        }
    }

    /// 成功时把值交给返回 future 的 `func`；失败原样穿透，`func` 不被调用。
    pub fn then<U, F>(self, func: F) -> Future<U>
    where
        U: 'static,
        F: FnOnce(T) -> Future<U> + 'static,
    {
        self.then_wrapped(|result| match result {
            Ok(value) => func(value),
            Err(error) => Future::err(error),
        })
    }

    /// 成功时对值做同步变换；失败原样穿透。
    pub fn map<U, F>(self, func: F) -> Future<U>
    where
        U: 'static,
        F: FnOnce(T) -> U + 'static,
    {
        self.then_wrapped(|result| Future::from_result(result.map(func)))
    }

    /// 仅在失败时调用 `func`，可以恢复为成功值。
    pub fn handle_error<F>(self, func: F) -> Future<T>
    where
        F: FnOnce(ShoalError) -> Future<T> + 'static,
    {
        self.then_wrapped(|result| match result {
            Ok(value) => Future::ready(value),
            Err(error) => func(error),
        })
    }

    /// 无论成败都执行 `func`，并原样转发结果。
    pub fn finally<F>(self, func: F) -> Future<T>
    where
        F: FnOnce() + 'static,
    {
        self.then_wrapped(|result| {
            func();
            Future::from_result(result)
        })
    }

    /// 把最终结果转交给另一只 promise；本 future 被消费。
    pub fn forward_to(mut self, promise: Promise<T>) {
        let repr = match self.repr.take() {
            Some(repr) => repr,
            None => {
                observability::report_defect("shoal::future", "future consumed twice");
                promise.set_error(ShoalError::new(
                    codes::FUTURE_INVALID_STATE,
                    "future already consumed",
                ));
                return;
            }
        };
        match repr {
            Repr::Immediate(result) => promise.resolve(result),
            Repr::Shared(slot) => {
                let state = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
                match state {
                    SlotState::Ready(result) => promise.resolve(result),
                    SlotState::Pending => {
                        let continuation = Continuation {
                            group: runtime::current_group(),
                            run: Box::new(move |result| promise.resolve(result)),
                        };
                        *slot.state.borrow_mut() = SlotState::Waited(continuation);
                    }
                    other => {
                        *slot.state.borrow_mut() = other;
                        observability::report_defect(
                            "shoal::future",
                            "forward_to on a consumed future",
                        );
                        promise.set_error(ShoalError::new(
                            codes::FUTURE_INVALID_STATE,
                            "future already consumed",
                        ));
                    }
                }
            }
        }
    }

    /// 消费并丢弃；就绪的失败也静默吞下（调用方声明自己不关心结果）。
    pub fn ignore(mut self) {
        match self.repr.take() {
            Some(Repr::Immediate(_)) | None => {}
            Some(Repr::Shared(slot)) => {
                let state = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
                match state {
                    SlotState::Ready(_) | SlotState::Gone => {}
                    SlotState::Pending => {
                        *slot.state.borrow_mut() = SlotState::Abandoned;
                    }
                    other => {
                        *slot.state.borrow_mut() = other;
                    }
                }
            }
        }
    }

    /// 在线程上下文内同步取值：驱动分片直到决议。
    ///
    /// 在就绪 future 上调用不需要线程上下文；对未就绪 future 在线程上下文
    /// 之外调用属于框架缺陷。
    pub fn get(mut self) -> Result<T, ShoalError> {
        if !self.available() {
            match self.repr.as_ref() {
                Some(Repr::Shared(slot)) => {
                    let slot = Rc::clone(slot);
                    runtime::pump_until(&move || {
                        matches!(*slot.state.borrow(), SlotState::Ready(_))
                    });
                }
                _ => {
                    observability::report_defect("shoal::future", "get on a consumed future");
                }
            }
        }
        self.take_ready()
    }

    /// 在线程上下文内等待就绪但不消费。
    pub fn wait(&self) {
        if self.available() {
            return;
        }
        if let Some(Repr::Shared(slot)) = self.repr.as_ref() {
            let slot = Rc::clone(slot);
            runtime::pump_until(&move || matches!(*slot.state.borrow(), SlotState::Ready(_)));
        }
    }
}

/// 已就绪结果的续延路径：未请求让出则内联，否则调度一个续延任务。
fn chain_ready<T, U, F>(result: Result<T, ShoalError>, func: F) -> Future<U>
where
    T: 'static,
    U: 'static,
    F: FnOnce(Result<T, ShoalError>) -> Future<U> + 'static,
{
    if !runtime::need_preempt() {
        return func(result);
    }
    let mut promise = Promise::new();
    let fut = promise.get_future();
    runtime::schedule(make_task(runtime::current_group(), move || {
        func(result).forward_to(promise);
    }));
    fut
}

impl<T: 'static> Drop for Future<T> {
    fn drop(&mut self) {
        match self.repr.take() {
            None | Some(Repr::Immediate(Ok(_))) => {}
            Some(Repr::Immediate(Err(error))) => {
                observability::report_unhandled_failure(&error);
            }
            Some(Repr::Shared(slot)) => {
                let state = mem::replace(&mut *slot.state.borrow_mut(), SlotState::Gone);
                match state {
                    SlotState::Ready(Err(error)) => {
                        observability::report_unhandled_failure(&error);
                    }
                    SlotState::Ready(Ok(_)) | SlotState::Gone => {}
                    SlotState::Pending => {
                        *slot.state.borrow_mut() = SlotState::Abandoned;
                    }
                    other => {
                        *slot.state.borrow_mut() = other;
                    }
                }
            }
        }
    }
}
