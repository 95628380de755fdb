//! 组合子库：把 future 组合成循环、受限并发与作用域化的资源使用。
//!
//! 所有循环遵守同一条协作纪律：就绪的迭代在本栈内联推进，直到
//! `need_preempt()` 请求让出，随后循环把自己重新排入就绪队列——
//! 长链不会垄断分片，也不会递归压栈。

mod loops;
mod parallel;
mod scope;

pub use loops::{do_for_each, do_until, keep_doing, repeat, repeat_until_value, StopIteration};
pub use parallel::{max_concurrent_for_each, parallel_for_each};
pub use scope::{
    defer, deferred_close, deferred_stop, do_with, with_file, with_gate, with_lock, Closeable,
    DeferredAction, DeferredClose, DeferredStop, Stoppable,
};
