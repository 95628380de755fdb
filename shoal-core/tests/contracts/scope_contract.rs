//! 作用域组合子与延迟释放的契约场景。

use crate::support;
use shoal_core::{
    codes, deferred_close, do_with, later, sleep, with_file, Closeable, Future, ShoalError,
};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

struct FakeFile {
    closed: Rc<Cell<bool>>,
    fail_close: bool,
}

impl Closeable for FakeFile {
    fn close(&mut self) -> Future<()> {
        self.closed.set(true);
        if self.fail_close {
            Future::err(ShoalError::new(codes::EXECUTOR_SHUTDOWN, "close failed"))
        } else {
            Future::ready(())
        }
    }
}

/// 验证：`do_with` 的持有值跨悬起点存活，决议之后才析构。
#[test]
fn held_state_survives_suspension() {
    struct Tracked {
        dropped: Rc<Cell<bool>>,
        value: u32,
    }
    impl Drop for Tracked {
        fn drop(&mut self) {
            self.dropped.set(true);
        }
    }

    let harness = support::manual_shard();
    harness.shard.run(|| {
        let dropped = Rc::new(Cell::new(false));
        let fut = do_with(
            Tracked {
                dropped: Rc::clone(&dropped),
                value: 5,
            },
            {
                let dropped = Rc::clone(&dropped);
                move |holder| {
                    let inner_holder = Rc::clone(&holder);
                    sleep(Duration::from_millis(3)).map(move |()| {
                        let mut tracked = inner_holder.borrow_mut();
                        assert!(!dropped.get(), "悬起归来持有值仍然存活");
                        tracked.value += 1;
                        tracked.value
                    })
                }
            },
        );
        assert_eq!(fut.get().expect("作用域体成功"), 6);
        assert!(dropped.get(), "future 决议之后持有值必须析构");
    });
}

/// 验证 `with_file` 的关闭契约：两条路径都关闭，错误偏好正确。
#[test]
fn with_file_closes_on_every_path() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        // 成功路径：body 的值浮出，文件关闭。
        let closed = Rc::new(Cell::new(false));
        let value = with_file(
            Future::ready(FakeFile {
                closed: Rc::clone(&closed),
                fail_close: false,
            }),
            |file| {
                assert!(!file.borrow().closed.get(), "body 运行期间文件保持打开");
                Future::ready(17)
            },
        )
        .get()
        .expect("成功路径");
        assert_eq!(value, 17);
        assert!(closed.get(), "成功路径必须关闭");

        // body 失败：body 错误优先，关闭错误仅记录。
        let closed = Rc::new(Cell::new(false));
        let error = with_file(
            Future::ready(FakeFile {
                closed: Rc::clone(&closed),
                fail_close: true,
            }),
            |_| Future::<u32>::err(ShoalError::gate_closed()),
        )
        .get()
        .expect_err("body 失败浮出");
        assert!(error.is(codes::GATE_CLOSED), "body 错误优先于关闭错误");
        assert!(closed.get(), "失败路径同样必须关闭");

        // 仅关闭失败：关闭错误浮出。
        let closed = Rc::new(Cell::new(false));
        let error = with_file(
            Future::ready(FakeFile {
                closed: Rc::clone(&closed),
                fail_close: true,
            }),
            |_| Future::ready(1),
        )
        .get()
        .expect_err("关闭失败浮出");
        assert!(error.is(codes::EXECUTOR_SHUTDOWN));
    });
}

/// 验证：打开器失败时 body 不被调用。
#[test]
fn failed_opener_skips_the_body() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let touched = Rc::new(Cell::new(false));
        let error = {
            let touched = Rc::clone(&touched);
            with_file(
                Future::<FakeFile>::err(ShoalError::gate_closed()),
                move |_| {
                    touched.set(true);
                    Future::ready(())
                },
            )
        }
        .get()
        .expect_err("打开失败浮出");
        assert!(error.is(codes::GATE_CLOSED));
        assert!(!touched.get(), "打开失败时不得调用 body");
    });
}

/// 验证：线程上下文内的 `deferred_close` 在析构点同步驱动异步关闭。
#[test]
fn deferred_close_drives_async_release() {
    struct SlowFile {
        closed: Rc<Cell<bool>>,
    }
    impl Closeable for SlowFile {
        fn close(&mut self) -> Future<()> {
            let closed = Rc::clone(&self.closed);
            later().map(move |()| closed.set(true))
        }
    }

    let harness = support::manual_shard();
    harness.shard.run(|| {
        let closed = Rc::new(Cell::new(false));
        {
            let guard = deferred_close(SlowFile {
                closed: Rc::clone(&closed),
            });
            assert!(!guard.closed.get(), "作用域内资源保持存活");
        }
        assert!(closed.get(), "离开作用域时异步关闭被驱动到完成");

        let closed = Rc::new(Cell::new(false));
        {
            let mut guard = deferred_close(SlowFile {
                closed: Rc::clone(&closed),
            });
            guard.close_now();
            assert!(closed.get(), "close_now 立即驱动关闭");
        }
    });
}
