use crate::future::Future;
use crate::observability;
use crate::runtime;
use crate::sync::{Gate, Lockable};
use std::cell::RefCell;
use std::ops::{Deref, DerefMut};
use std::rc::Rc;

/// 把值固定在堆上，直到 `body` 返回的 future 完全决议后才析构。
///
/// # 契约说明（What）
/// - `body` 拿到的是共享持有器：续延各自克隆一份 `Rc`，借用在每个
///   同步片段内完成；
/// - 持有器的析构严格发生在返回 future 决议之后——这是跨悬起点保持
///   "栈式"存储存活的标准写法；
/// - 返回值不得引用持有器内部（`'static` 约束在编译期保证这一点）。
pub fn do_with<S, R, F>(state: S, body: F) -> Future<R>
where
    S: 'static,
    R: 'static,
    F: FnOnce(Rc<RefCell<S>>) -> Future<R>,
{
    let holder = Rc::new(RefCell::new(state));
    let fut = body(Rc::clone(&holder));
    fut.then_wrapped(move |result| {
        drop(holder);
        Future::from_result(result)
    })
}

/// 持锁执行 `body`：获取成功后无论 `body` 成败都恰好释放一次。
///
/// 获取失败时 `body` 不被调用、锁也不被释放，结果携带获取错误。
pub fn with_lock<L, R, F>(lock: L, body: F) -> Future<R>
where
    L: Lockable + Clone + 'static,
    R: 'static,
    F: FnOnce() -> Future<R> + 'static,
{
    lock.lock().then(move |()| {
        let release = lock.clone();
        body().then_wrapped(move |result| {
            release.unlock();
            Future::from_result(result)
        })
    })
}

/// 在闸门的保护下执行 `body`：进入失败立即返回 `gate.closed`，
/// 进入成功则在 `body` 的 future 决议时（无论成败）恰好 `leave` 一次。
pub fn with_gate<R, F>(gate: &Gate, body: F) -> Future<R>
where
    R: 'static,
    F: FnOnce() -> Future<R> + 'static,
{
    if let Err(error) = gate.enter() {
        return Future::err(error);
    }
    let holder = gate.clone();
    body().then_wrapped(move |result| {
        holder.leave();
        Future::from_result(result)
    })
}

/// 暴露异步关闭的资源（文件句柄的最小契约）。
pub trait Closeable: 'static {
    /// 释放资源；返回的 future 决议后资源不可再用。
    fn close(&mut self) -> Future<()>;
}

/// 暴露异步停机的服务对象。
pub trait Stoppable: 'static {
    /// 停止服务；返回的 future 决议后对象进入终态。
    fn stop(&mut self) -> Future<()>;
}

/// 等待打开器，把资源交给 `body`，并保证所有退出路径上都关闭它。
///
/// # 错误偏好（What）
/// - `body` 失败时以 `body` 的错误为准，关闭错误记入日志后丢弃；
/// - 仅关闭失败时，关闭错误浮出。
pub fn with_file<T, R, F>(open: Future<T>, body: F) -> Future<R>
where
    T: Closeable,
    R: 'static,
    F: FnOnce(&Rc<RefCell<T>>) -> Future<R> + 'static,
{
    open.then(move |resource| {
        let holder = Rc::new(RefCell::new(resource));
        let fut = body(&holder);
        fut.then_wrapped(move |result| {
            let close_fut = holder.borrow_mut().close();
            close_fut.then_wrapped(move |close_result| {
                drop(holder);
                match (result, close_result) {
                    (Ok(value), Ok(())) => Future::ready(value),
                    (Ok(_), Err(close_error)) => Future::err(close_error),
                    (Err(error), Ok(())) => Future::err(error),
                    (Err(error), Err(close_error)) => {
                        observability::report_suppressed_failure(
                            "shoal::with_file",
                            &close_error,
                        );
                        Future::err(error)
                    }
                }
            })
        })
    })
}

/// 作用域结束时运行捕获的动作，除非被显式取消。
///
/// 动作在析构中运行，因此必须是异常安全的同步代码；
/// 异步释放请使用 [`deferred_close`] / [`deferred_stop`]。
pub struct DeferredAction<F: FnOnce()> {
    action: Option<F>,
}

impl<F: FnOnce()> DeferredAction<F> {
    /// 取消延迟动作。
    pub fn cancel(&mut self) {
        self.action = None;
    }
}

impl<F: FnOnce()> Drop for DeferredAction<F> {
    fn drop(&mut self) {
        if let Some(action) = self.action.take() {
            action();
        }
    }
}

/// 捕获一个无参、只移动的动作，作用域结束时运行。
pub fn defer<F: FnOnce()>(action: F) -> DeferredAction<F> {
    DeferredAction {
        action: Some(action),
    }
}

/// 驱动一只释放 future 到完成：线程上下文内同步驱动；
/// 之外仅接受已就绪的结果，悬起的释放按析构缺陷记录并放弃。
fn drive_release(fut: Future<()>, context: &'static str) {
    if runtime::in_thread_context() {
        if let Err(error) = fut.get() {
            observability::report_suppressed_failure(context, &error);
        }
        return;
    }
    if fut.available() {
        if let Err(error) = fut.take_ready() {
            observability::report_suppressed_failure(context, &error);
        }
        return;
    }
    observability::report_drop_defect(
        context,
        "asynchronous release outside a thread-context; abandoning the pending close",
    );
    fut.ignore();
}

/// 作用域化的自动关闭器：持有对象、`Deref` 直通，析构时驱动 `close()`。
///
/// 同步驱动异步关闭只允许发生在线程上下文内；之外的悬起释放会被
/// 记录为析构缺陷并放弃。
pub struct DeferredClose<T: Closeable> {
    object: T,
    released: bool,
}

/// 把对象交给自动关闭器。
pub fn deferred_close<T: Closeable>(object: T) -> DeferredClose<T> {
    DeferredClose {
        object,
        released: false,
    }
}

impl<T: Closeable> DeferredClose<T> {
    /// 立即关闭一次；之后析构不再重复关闭。
    pub fn close_now(&mut self) {
        if self.released {
            observability::report_defect("shoal::deferred_close", "resource closed twice");
            return;
        }
        self.released = true;
        let fut = self.object.close();
        drive_release(fut, "shoal::deferred_close");
    }
}

impl<T: Closeable> Deref for DeferredClose<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Closeable> DerefMut for DeferredClose<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

impl<T: Closeable> Drop for DeferredClose<T> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let fut = self.object.close();
            drive_release(fut, "shoal::deferred_close");
        }
    }
}

/// 作用域化的自动停机器，语义与 [`DeferredClose`] 一致。
pub struct DeferredStop<T: Stoppable> {
    object: T,
    released: bool,
}

/// 把服务对象交给自动停机器。
pub fn deferred_stop<T: Stoppable>(object: T) -> DeferredStop<T> {
    DeferredStop {
        object,
        released: false,
    }
}

impl<T: Stoppable> DeferredStop<T> {
    /// 立即停机一次；之后析构不再重复停机。
    pub fn stop_now(&mut self) {
        if self.released {
            observability::report_defect("shoal::deferred_stop", "service stopped twice");
            return;
        }
        self.released = true;
        let fut = self.object.stop();
        drive_release(fut, "shoal::deferred_stop");
    }
}

impl<T: Stoppable> Deref for DeferredStop<T> {
    type Target = T;

    fn deref(&self) -> &T {
        &self.object
    }
}

impl<T: Stoppable> DerefMut for DeferredStop<T> {
    fn deref_mut(&mut self) -> &mut T {
        &mut self.object
    }
}

impl<T: Stoppable> Drop for DeferredStop<T> {
    fn drop(&mut self) {
        if !self.released {
            self.released = true;
            let fut = self.object.stop();
            drive_release(fut, "shoal::deferred_stop");
        }
    }
}
