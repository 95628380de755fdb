//! 共享互斥与读写锁的排他、公平与释放契约。

use crate::support;
use shoal_core::{parallel_for_each, sleep, with_lock, Future, Lockable, RwLock, SharedMutex};
use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

/// 争用场景：十条纤程各自独占地把计数 0→1→0，期间断言不被打扰。
///
/// # 教案级说明
/// - **Why**：排他性是互斥的全部意义；计数在持锁期间必须恒为 1，
///   任何交错都意味着两个持有者同时在临界区里；
/// - **How**：每条纤程在临界区内悬起 1ms（虚拟时间），给潜在的交错
///   以充分的暴露机会；
/// - **What**：全部断言通过，最终计数归零。
#[test]
fn exclusive_lock_serializes_contenders() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let mutex = SharedMutex::new();
        let counter = Rc::new(Cell::new(0u32));
        let fut = parallel_for_each(0..10, |_| {
            let counter = Rc::clone(&counter);
            with_lock(mutex.clone(), move || {
                counter.set(counter.get() + 1);
                assert_eq!(counter.get(), 1, "临界区内计数必须为 1");
                let counter = Rc::clone(&counter);
                sleep(Duration::from_millis(1)).map(move |()| {
                    assert_eq!(counter.get(), 1, "悬起归来仍独占");
                    counter.set(counter.get() - 1);
                })
            })
        });
        fut.get().expect("十条纤程全部完成");
        assert_eq!(counter.get(), 0);
        assert!(mutex.try_lock_exclusive(), "尾声锁必须空闲");
        mutex.unlock_exclusive();
    });
}

/// 验证：`with_lock` 在内层失败时同样释放锁。
#[test]
fn with_lock_releases_on_failure() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let mutex = SharedMutex::new();
        let error = with_lock(mutex.clone(), || {
            Future::<()>::err(shoal_core::ShoalError::gate_closed())
        })
        .get()
        .expect_err("内层失败浮出");
        assert!(error.is(shoal_core::codes::GATE_CLOSED));
        assert!(mutex.try_lock(), "失败路径之后锁必须已释放");
        mutex.unlock();
    });
}

/// 验证读写锁视图：读者并行推进，写者在读者间独占一段区间。
#[test]
fn rwlock_views_interleave_correctly() {
    let harness = support::manual_shard();
    harness.shard.run(|| {
        let lock = RwLock::new();
        let readers_inside = Rc::new(Cell::new(0u32));
        let writer_inside = Rc::new(Cell::new(false));

        let read_branch = {
            let readers_inside = Rc::clone(&readers_inside);
            let writer_inside = Rc::clone(&writer_inside);
            let view = lock.for_read();
            move |_: u32| {
                let readers_inside = Rc::clone(&readers_inside);
                let writer_inside = Rc::clone(&writer_inside);
                with_lock(view.clone(), move || {
                    assert!(!writer_inside.get(), "读者持锁时不得有写者");
                    readers_inside.set(readers_inside.get() + 1);
                    let readers_inside = Rc::clone(&readers_inside);
                    sleep(Duration::from_millis(2))
                        .map(move |()| readers_inside.set(readers_inside.get() - 1))
                })
            }
        };

        let write_view = lock.for_write();
        let writer = {
            let readers_inside = Rc::clone(&readers_inside);
            let writer_inside = Rc::clone(&writer_inside);
            with_lock(write_view, move || {
                assert_eq!(readers_inside.get(), 0, "写者持锁时读者必须清零");
                writer_inside.set(true);
                let writer_inside = Rc::clone(&writer_inside);
                sleep(Duration::from_millis(2)).map(move |()| writer_inside.set(false))
            })
        };

        let readers = parallel_for_each(0..3u32, read_branch);
        readers.get().expect("读者分支完成");
        writer.get().expect("写者分支完成");
        assert_eq!(readers_inside.get(), 0);
        assert!(!writer_inside.get());
    });
}
