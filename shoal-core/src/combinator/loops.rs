use crate::future::{Future, Promise};
use crate::runtime;

/// 循环动作的停止指令。
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StopIteration {
    /// 结束循环。
    Yes,
    /// 继续下一轮。
    No,
}

/// 反复调用 `action`，直到它产出 [`StopIteration::Yes`] 或失败。
///
/// 就绪的迭代内联推进；一旦迭代悬起、失败或分片请求让出，循环转入
/// 续延帧，由执行器在决议（或让出点）后继续驱动。
pub fn repeat<A>(mut action: A) -> Future<()>
where
    A: FnMut() -> Future<StopIteration> + 'static,
{
    loop {
        let fut = action();
        if fut.available() && !runtime::need_preempt() {
            match fut.take_ready() {
                Ok(StopIteration::Yes) => return Future::ready(()),
                Ok(StopIteration::No) => continue,
                Err(error) => return Future::err(error),
            }
        }
        let mut promise = Promise::new();
        let ret = promise.get_future();
        chain_repeat(fut, action, promise);
        return ret;
    }
}

fn chain_repeat<A>(fut: Future<StopIteration>, mut action: A, promise: Promise<()>)
where
    A: FnMut() -> Future<StopIteration> + 'static,
{
    fut.then_wrapped(move |result| {
        match result {
            Ok(StopIteration::Yes) => promise.set_value(()),
            Err(error) => promise.set_error(error),
            Ok(StopIteration::No) => loop {
                let fut = action();
                if fut.available() && !runtime::need_preempt() {
                    match fut.take_ready() {
                        Ok(StopIteration::Yes) => {
                            promise.set_value(());
                            break;
                        }
                        Ok(StopIteration::No) => continue,
                        Err(error) => {
                            promise.set_error(error);
                            break;
                        }
                    }
                }
                chain_repeat(fut, action, promise);
                break;
            },
        }
        Future::ready(())
    })
    .ignore();
}

/// 每轮先评估 `stop`；为假则执行 `action` 并等待其完成。
///
/// `action` 的失败短路整个循环。
pub fn do_until<C, A>(mut stop: C, mut action: A) -> Future<()>
where
    C: FnMut() -> bool + 'static,
    A: FnMut() -> Future<()> + 'static,
{
    loop {
        if stop() {
            return Future::ready(());
        }
        let fut = action();
        if fut.available() && !runtime::need_preempt() {
            match fut.take_ready() {
                Ok(()) => continue,
                Err(error) => return Future::err(error),
            }
        }
        let mut promise = Promise::new();
        let ret = promise.get_future();
        chain_do_until(fut, stop, action, promise);
        return ret;
    }
}

fn chain_do_until<C, A>(fut: Future<()>, mut stop: C, mut action: A, promise: Promise<()>)
where
    C: FnMut() -> bool + 'static,
    A: FnMut() -> Future<()> + 'static,
{
    fut.then_wrapped(move |result| {
        if let Err(error) = result {
            promise.set_error(error);
            return Future::ready(());
        }
        loop {
            if stop() {
                promise.set_value(());
                break;
            }
            let fut = action();
            if fut.available() && !runtime::need_preempt() {
                match fut.take_ready() {
                    Ok(()) => continue,
                    Err(error) => {
                        promise.set_error(error);
                        break;
                    }
                }
            }
            chain_do_until(fut, stop, action, promise);
            break;
        }
        Future::ready(())
    })
    .ignore();
}

/// 反复调用 `action`，直到它产出 `Some(value)`，以 `value` 决议。
pub fn repeat_until_value<T, A>(mut action: A) -> Future<T>
where
    T: 'static,
    A: FnMut() -> Future<Option<T>> + 'static,
{
    loop {
        let fut = action();
        if fut.available() && !runtime::need_preempt() {
            match fut.take_ready() {
                Ok(Some(value)) => return Future::ready(value),
                Ok(None) => continue,
                Err(error) => return Future::err(error),
            }
        }
        let mut promise = Promise::new();
        let ret = promise.get_future();
        chain_repeat_until_value(fut, action, promise);
        return ret;
    }
}

fn chain_repeat_until_value<T, A>(fut: Future<Option<T>>, mut action: A, promise: Promise<T>)
where
    T: 'static,
    A: FnMut() -> Future<Option<T>> + 'static,
{
    fut.then_wrapped(move |result| {
        match result {
            Ok(Some(value)) => promise.set_value(value),
            Err(error) => promise.set_error(error),
            Ok(None) => loop {
                let fut = action();
                if fut.available() && !runtime::need_preempt() {
                    match fut.take_ready() {
                        Ok(Some(value)) => {
                            promise.set_value(value);
                            break;
                        }
                        Ok(None) => continue,
                        Err(error) => {
                            promise.set_error(error);
                            break;
                        }
                    }
                }
                chain_repeat_until_value(fut, action, promise);
                break;
            },
        }
        Future::ready(())
    })
    .ignore();
}

/// 无限重复 `action`，直到它失败。
pub fn keep_doing<A>(mut action: A) -> Future<()>
where
    A: FnMut() -> Future<()> + 'static,
{
    repeat(move || action().map(|()| StopIteration::No))
}

/// 对范围内的每个元素顺序执行 `action`：前一个决议后才开始下一个。
///
/// 首个失败短路；空范围立即就绪。
pub fn do_for_each<I, A>(range: I, mut action: A) -> Future<()>
where
    I: IntoIterator,
    I::IntoIter: 'static,
    I::Item: 'static,
    A: FnMut(I::Item) -> Future<()> + 'static,
{
    let mut iter = range.into_iter();
    loop {
        let Some(item) = iter.next() else {
            return Future::ready(());
        };
        let fut = action(item);
        if fut.available() && !runtime::need_preempt() {
            match fut.take_ready() {
                Ok(()) => continue,
                Err(error) => return Future::err(error),
            }
        }
        let mut promise = Promise::new();
        let ret = promise.get_future();
        chain_do_for_each(fut, iter, action, promise);
        return ret;
    }
}

fn chain_do_for_each<It, A>(fut: Future<()>, mut iter: It, mut action: A, promise: Promise<()>)
where
    It: Iterator + 'static,
    It::Item: 'static,
    A: FnMut(It::Item) -> Future<()> + 'static,
{
    fut.then_wrapped(move |result| {
        if let Err(error) = result {
            promise.set_error(error);
            return Future::ready(());
        }
        loop {
            let Some(item) = iter.next() else {
                promise.set_value(());
                break;
            };
            let fut = action(item);
            if fut.available() && !runtime::need_preempt() {
                match fut.take_ready() {
                    Ok(()) => continue,
                    Err(error) => {
                        promise.set_error(error);
                        break;
                    }
                }
            }
            chain_do_for_each(fut, iter, action, promise);
            break;
        }
        Future::ready(())
    })
    .ignore();
}
