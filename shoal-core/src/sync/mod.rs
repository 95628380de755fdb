//! 分片内同步原语：闸门、计数信号量、共享互斥与一次性中止源。
//!
//! 所有原语都是分片本地的（`Rc` 句柄语义，克隆即共享），等待者一律以
//! promise 排队，唤醒就是决议 promise——续延经由就绪队列按序运行，
//! 原语自身不含任何锁。

mod abort;
mod gate;
mod semaphore;
mod shared_mutex;

pub use abort::{AbortSource, AbortSubscription};
pub use gate::Gate;
pub use semaphore::{with_semaphore, Semaphore};
pub use shared_mutex::{Lockable, ReadLock, RwLock, SharedMutex, WriteLock};
