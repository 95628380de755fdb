use crate::future::{Future, Promise};
use crate::observability;
use std::cell::RefCell;
use std::collections::VecDeque;
use std::rc::Rc;

struct MutexWaiter {
    promise: Promise<()>,
    for_write: bool,
}

struct MutexInner {
    readers: u64,
    writer: bool,
    waiters: VecDeque<MutexWaiter>,
}

/// 共享/独占互斥：promise 等待队列上的读写锁核心。
///
/// # 唤醒策略（What）
/// - 队列严格 FIFO 入队；释放时检查队首：
///   - 队首是写者：仅当读者已清零时放行，否则原地等待——写者等待时间有界；
///   - 队首是读者：连续放行到下一个写者为止的整段读者前缀——读者成批唤醒。
/// - 不变量：`writer == true` 时 `readers == 0`。
///
/// 句柄克隆即共享；[`Lockable`] 实现取独占语义，供
/// [`with_lock`](crate::combinator::with_lock) 等作用域组合子使用。
#[derive(Clone)]
pub struct SharedMutex {
    inner: Rc<RefCell<MutexInner>>,
}

impl SharedMutex {
    /// 创建空闲的互斥。
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(MutexInner {
                readers: 0,
                writer: false,
                waiters: VecDeque::new(),
            })),
        }
    }

    /// 共享获取；有写者持有或任何人排队时入队。
    pub fn lock_shared(&self) -> Future<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.writer && inner.waiters.is_empty() {
            inner.readers += 1;
            return Future::ready(());
        }
        let mut promise = Promise::new();
        let fut = promise.get_future();
        inner.waiters.push_back(MutexWaiter {
            promise,
            for_write: false,
        });
        fut
    }

    /// 非阻塞共享获取。
    pub fn try_lock_shared(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.writer && inner.waiters.is_empty() {
            inner.readers += 1;
            true
        } else {
            false
        }
    }

    /// 释放共享持有。
    pub fn unlock_shared(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if inner.readers == 0 {
                drop(inner);
                observability::report_defect(
                    "shoal::shared_mutex",
                    "unlock_shared without a shared holder",
                );
                return;
            }
            inner.readers -= 1;
        }
        self.wake();
    }

    /// 独占获取；有任何持有者或排队者时入队。
    pub fn lock_exclusive(&self) -> Future<()> {
        let mut inner = self.inner.borrow_mut();
        if !inner.writer && inner.readers == 0 && inner.waiters.is_empty() {
            inner.writer = true;
            return Future::ready(());
        }
        let mut promise = Promise::new();
        let fut = promise.get_future();
        inner.waiters.push_back(MutexWaiter {
            promise,
            for_write: true,
        });
        fut
    }

    /// 非阻塞独占获取。
    pub fn try_lock_exclusive(&self) -> bool {
        let mut inner = self.inner.borrow_mut();
        if !inner.writer && inner.readers == 0 && inner.waiters.is_empty() {
            inner.writer = true;
            true
        } else {
            false
        }
    }

    /// 释放独占持有。
    pub fn unlock_exclusive(&self) {
        {
            let mut inner = self.inner.borrow_mut();
            if !inner.writer {
                drop(inner);
                observability::report_defect(
                    "shoal::shared_mutex",
                    "unlock_exclusive without the exclusive holder",
                );
                return;
            }
            inner.writer = false;
        }
        self.wake();
    }

    /// 按策略放行队首；promise 决议放在借用之外，续延经就绪队列运行。
    fn wake(&self) {
        let granted = {
            let mut inner = self.inner.borrow_mut();
            let mut granted = Vec::new();
            loop {
                let Some(front) = inner.waiters.front() else {
                    break;
                };
                if front.for_write {
                    if inner.readers == 0 && !inner.writer && granted.is_empty() {
                        inner.writer = true;
                        if let Some(waiter) = inner.waiters.pop_front() {
                            granted.push(waiter.promise);
                        }
                    }
                    break;
                }
                if inner.writer {
                    break;
                }
                inner.readers += 1;
                match inner.waiters.pop_front() {
                    Some(waiter) => granted.push(waiter.promise),
                    None => break,
                }
            }
            granted
        };
        for promise in granted {
            promise.set_value(());
        }
    }
}

impl Default for SharedMutex {
    fn default() -> Self {
        Self::new()
    }
}

/// 供作用域组合子使用的最小锁契约。
///
/// `lock` 返回获取完成的 future，`unlock` 同步释放；实现者须保证二者
/// 在同一把锁实例上配对调用。
pub trait Lockable {
    /// 异步获取。
    fn lock(&self) -> Future<()>;

    /// 非阻塞获取。
    fn try_lock(&self) -> bool;

    /// 同步释放。
    fn unlock(&self);
}

impl Lockable for SharedMutex {
    fn lock(&self) -> Future<()> {
        self.lock_exclusive()
    }

    fn try_lock(&self) -> bool {
        self.try_lock_exclusive()
    }

    fn unlock(&self) {
        self.unlock_exclusive();
    }
}

/// 读写锁：同一把 [`SharedMutex`] 的两个视图。
#[derive(Clone, Default)]
pub struct RwLock {
    mutex: SharedMutex,
}

impl RwLock {
    /// 创建空闲的读写锁。
    pub fn new() -> Self {
        Self::default()
    }

    /// 读视图：`lock`/`unlock` 映射到共享获取。
    pub fn for_read(&self) -> ReadLock {
        ReadLock {
            mutex: self.mutex.clone(),
        }
    }

    /// 写视图：`lock`/`unlock` 映射到独占获取。
    pub fn for_write(&self) -> WriteLock {
        WriteLock {
            mutex: self.mutex.clone(),
        }
    }
}

/// [`RwLock`] 的共享视图。
#[derive(Clone)]
pub struct ReadLock {
    mutex: SharedMutex,
}

impl Lockable for ReadLock {
    fn lock(&self) -> Future<()> {
        self.mutex.lock_shared()
    }

    fn try_lock(&self) -> bool {
        self.mutex.try_lock_shared()
    }

    fn unlock(&self) {
        self.mutex.unlock_shared();
    }
}

/// [`RwLock`] 的独占视图。
#[derive(Clone)]
pub struct WriteLock {
    mutex: SharedMutex,
}

impl Lockable for WriteLock {
    fn lock(&self) -> Future<()> {
        self.mutex.lock_exclusive()
    }

    fn try_lock(&self) -> bool {
        self.mutex.try_lock_exclusive()
    }

    fn unlock(&self) {
        self.mutex.unlock_exclusive();
    }
}
