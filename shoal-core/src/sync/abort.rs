use std::cell::RefCell;
use std::rc::{Rc, Weak};

struct AbortInner {
    aborted: bool,
    next_id: u64,
    subscriptions: Vec<(u64, Box<dyn FnOnce()>)>,
}

/// 一次性取消信号源。
///
/// # 契约说明（What）
/// - `request_abort` 幂等：首次触发按注册顺序逐一调用订阅回调，
///   之后的调用是无操作，任何回调至多被调用一次；
/// - 对已中止的源 `subscribe` 返回 `None`，调用方应立即执行自己的中止路径；
/// - 取消传播是显式的：信号只送达订阅者，谁都不会被隐式打断。
///
/// 句柄克隆即共享同一信号位。
#[derive(Clone)]
pub struct AbortSource {
    inner: Rc<RefCell<AbortInner>>,
}

impl AbortSource {
    /// 创建未触发的中止源。
    pub fn new() -> Self {
        Self {
            inner: Rc::new(RefCell::new(AbortInner {
                aborted: false,
                next_id: 0,
                subscriptions: Vec::new(),
            })),
        }
    }

    /// 是否已触发。
    pub fn aborted(&self) -> bool {
        self.inner.borrow().aborted
    }

    /// 订阅中止事件；返回的句柄析构即退订。
    ///
    /// 已中止的源不接受订阅，返回 `None`。
    pub fn subscribe(&self, callback: impl FnOnce() + 'static) -> Option<AbortSubscription> {
        let mut inner = self.inner.borrow_mut();
        if inner.aborted {
            return None;
        }
        let id = inner.next_id;
        inner.next_id += 1;
        inner.subscriptions.push((id, Box::new(callback)));
        Some(AbortSubscription {
            source: Rc::downgrade(&self.inner),
            id,
        })
    }

    /// 触发中止；回调在借用之外按注册顺序运行，回调内允许再次触碰本源。
    pub fn request_abort(&self) {
        let drained = {
            let mut inner = self.inner.borrow_mut();
            if inner.aborted {
                return;
            }
            inner.aborted = true;
            std::mem::take(&mut inner.subscriptions)
        };
        for (_, callback) in drained {
            callback();
        }
    }
}

impl Default for AbortSource {
    fn default() -> Self {
        Self::new()
    }
}

/// 订阅的 RAII 句柄：析构即退订，源触发后退订为无操作。
pub struct AbortSubscription {
    source: Weak<RefCell<AbortInner>>,
    id: u64,
}

impl Drop for AbortSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.source.upgrade() {
            inner
                .borrow_mut()
                .subscriptions
                .retain(|(id, _)| *id != self.id);
        }
    }
}
