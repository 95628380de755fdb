use crate::error::ShoalError;
use crate::future::{Future, Promise};
use crate::observability;
use crate::runtime::{self, TimerHandle};
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::{Rc, Weak};
use std::time::Duration;

struct Waiter {
    id: u64,
    units: usize,
    promise: Promise<()>,
    timer: Option<TimerHandle>,
}

struct SemaphoreInner {
    available: usize,
    broken_reason: Option<String>,
    next_id: u64,
    waiters: VecDeque<Waiter>,
}

/// 计数信号量：内核的首要背压原语。
///
/// # 契约说明（What）
/// - 等待者严格 FIFO：队列非空时即使单位充足，新的 `wait` 也排队，
///   防止小额请求越过大额请求造成饥饿；
/// - `wait_timeout` 到期以 `semaphore.timed_out` 失败并离队；
/// - `broken` 使所有在队与后续的等待以 `semaphore.broken` 失败；
/// - `signal` 在归还单位后按队首顺序批量放行。
#[derive(Clone)]
pub struct Semaphore {
    inner: Rc<RefCell<SemaphoreInner>>,
}

impl Semaphore {
    /// 以初始单位数创建信号量。
    pub fn new(units: usize) -> Self {
        Self {
            inner: Rc::new(RefCell::new(SemaphoreInner {
                available: units,
                broken_reason: None,
                next_id: 0,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// 当前可用单位数。
    pub fn available_units(&self) -> usize {
        self.inner.borrow().available
    }

    /// 当前排队的等待者数。
    pub fn waiter_count(&self) -> usize {
        self.inner.borrow().waiters.len()
    }

    /// 非阻塞获取；仅在队列为空且单位充足时成功。
    pub fn try_wait(&self, units: usize) -> bool {
        let mut inner = self.inner.borrow_mut();
        if inner.broken_reason.is_some() {
            return false;
        }
        if inner.waiters.is_empty() && inner.available >= units {
            inner.available -= units;
            true
        } else {
            false
        }
    }

    /// 获取 `units` 个单位；不足则排队。
    pub fn wait(&self, units: usize) -> Future<()> {
        self.wait_inner(units, None)
    }

    /// 限时获取；`timeout` 内未获得则以 `semaphore.timed_out` 失败。
    pub fn wait_timeout(&self, units: usize, timeout: Duration) -> Future<()> {
        self.wait_inner(units, Some(timeout))
    }

    fn wait_inner(&self, units: usize, timeout: Option<Duration>) -> Future<()> {
        let mut inner = self.inner.borrow_mut();
        if let Some(reason) = &inner.broken_reason {
            let reason = reason.clone();
            drop(inner);
            return Future::err(ShoalError::semaphore_broken(&reason));
        }
        if inner.waiters.is_empty() && inner.available >= units {
            inner.available -= units;
            return Future::ready(());
        }
        let id = inner.next_id;
        inner.next_id += 1;
        let mut promise = Promise::new();
        let fut = promise.get_future();
        let timer = timeout.and_then(|timeout| {
            let weak = Rc::downgrade(&self.inner);
            runtime::arm_timer(timeout, move || Semaphore::expire_waiter(&weak, id))
        });
        inner.waiters.push_back(Waiter {
            id,
            units,
            promise,
            timer,
        });
        drop(inner);
        fut
    }

    fn expire_waiter(inner: &Weak<RefCell<SemaphoreInner>>, id: u64) {
        let Some(inner) = inner.upgrade() else {
            return;
        };
        let expired = {
            let mut inner = inner.borrow_mut();
            let position = inner.waiters.iter().position(|waiter| waiter.id == id);
            position.and_then(|index| inner.waiters.remove(index))
        };
        if let Some(waiter) = expired {
            waiter.promise.set_error(ShoalError::semaphore_timed_out());
        }
    }

    /// 归还 `units` 个单位并按 FIFO 放行排队者。
    pub fn signal(&self, units: usize) {
        let granted = {
            let mut inner = self.inner.borrow_mut();
            inner.available += units;
            let mut granted = Vec::new();
            while let Some(front) = inner.waiters.front() {
                if front.units > inner.available {
                    break;
                }
                let needed = front.units;
                inner.available -= needed;
                match inner.waiters.pop_front() {
                    Some(waiter) => granted.push(waiter),
                    None => break,
                }
            }
            granted
        };
        for waiter in granted {
            if let Some(timer) = &waiter.timer {
                runtime::cancel_timer(timer);
            }
            waiter.promise.set_value(());
        }
    }

    /// 打破信号量：在队与后续等待全部以 `semaphore.broken` 失败。
    pub fn broken(&self, reason: &str) {
        let drained = {
            let mut inner = self.inner.borrow_mut();
            if inner.broken_reason.is_some() {
                observability::report_defect("shoal::semaphore", "semaphore broken twice");
            }
            inner.broken_reason = Some(reason.to_string());
            std::mem::take(&mut inner.waiters)
        };
        for waiter in drained {
            if let Some(timer) = &waiter.timer {
                runtime::cancel_timer(timer);
            }
            waiter.promise.set_error(ShoalError::semaphore_broken(reason));
        }
    }
}

/// 持有 `units` 个单位执行 `body`：无论成败，单位都恰好归还一次。
///
/// 获取失败（超时之外的损坏等）时 `body` 不被调用、单位不被归还。
pub fn with_semaphore<R, F>(semaphore: &Semaphore, units: usize, body: F) -> Future<R>
where
    R: 'static,
    F: FnOnce() -> Future<R> + 'static,
{
    let holder = semaphore.clone();
    semaphore.wait(units).then(move |()| {
        body().then_wrapped(move |result| {
            holder.signal(units);
            Future::from_result(result)
        })
    })
}
