use crate::error::{codes, ShoalError};
use crate::future::{Future, Promise};
use crate::observability;
use std::cell::RefCell;
use std::rc::Rc;

struct GateInner {
    count: u64,
    closed: bool,
    waiter: Option<Promise<()>>,
}

/// 可关闭的在途操作计数闸门。
///
/// # 契约说明（What）
/// - `enter` 与 `leave` 严格 1:1 配对；
/// - `close` 之后的 `enter` 以 `gate.closed` 失败；
/// - `close` 返回的 future 在计数归零的那一刻（或关闭时已为零则立即）决议；
/// - 计数未归零就丢弃最后一个句柄是编程缺陷：记录与计数，绝不在析构中 panic。
///
/// 句柄克隆即共享同一计数，方便续延各自持有。
#[derive(Clone)]
pub struct Gate {
    inner: Rc<RefCell<GateInner>>,
}

impl Gate {
    /// 创建开启状态、计数为零的闸门。
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(GateInner {
                count: 0,
                closed: false,
                waiter: None,
            })),
        }
    }

    /// 登记一次在途操作。
    pub fn enter(&self) -> Result<(), ShoalError> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            return Err(ShoalError::gate_closed());
        }
        inner.count += 1;
        Ok(())
    }

    /// 注销一次在途操作；若关闭方正等待排空，计数归零时唤醒它。
    pub fn leave(&self) {
        let waiter = {
            let mut inner = self.inner.borrow_mut();
            if inner.count == 0 {
                drop(inner);
                observability::report_defect("shoal::gate", "leave without a matching enter");
                return;
            }
            inner.count -= 1;
            if inner.count == 0 && inner.closed {
                inner.waiter.take()
            } else {
                None
            }
        };
        if let Some(promise) = waiter {
            promise.set_value(());
        }
    }

    /// 关闭闸门；返回的 future 在所有在途操作 `leave` 完毕后决议。
    ///
    /// 只允许关闭一次；重复关闭按缺陷上报并返回失败 future。
    pub fn close(&self) -> Future<()> {
        let mut inner = self.inner.borrow_mut();
        if inner.closed {
            drop(inner);
            observability::report_defect("shoal::gate", "gate closed twice");
            return Future::err(ShoalError::new(codes::GATE_CLOSED, "gate already closed"));
        }
        inner.closed = true;
        if inner.count == 0 {
            return Future::ready(());
        }
        let mut promise = Promise::new();
        let fut = promise.get_future();
        inner.waiter = Some(promise);
        fut
    }

    /// 是否已关闭。
    pub fn is_closed(&self) -> bool {
        self.inner.borrow().closed
    }

    /// 当前在途操作数。
    pub fn count(&self) -> u64 {
        self.inner.borrow().count
    }
}

impl Default for Gate {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for GateInner {
    fn drop(&mut self) {
        if self.count != 0 {
            observability::report_drop_defect(
                "shoal::gate",
                "gate dropped while operations are still inside",
            );
        }
    }
}
