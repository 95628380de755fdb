//! 调度组：按共享额划分 CPU 的任务标签，以及按组的惰性"专属"存储。
//!
//! 组的名字与共享额登记在进程级注册表（所有分片共享同一索引空间，冷路径，
//! `parking_lot` 锁）；每个分片只在首次向某组投递任务时才实例化本地队列。
//! 专属存储按 `(组, 键)` 惰性构造，键携带类型化构造器，取值是类型安全的。

use crate::combinator::do_until;
use crate::error::{codes, ShoalError};
use crate::future::Future;
use crate::observability;
use crate::runtime::{self, later};
use parking_lot::Mutex;
use std::any::Any;
use std::marker::PhantomData;

/// 调度组索引表的固定容量。
pub const MAX_SCHEDULING_GROUPS: usize = 16;

/// 一个调度组的轻量句柄：分片本地索引加拷贝语义。
///
/// 组 0 是预登记的 `main` 组（共享额 100），未显式指定组的任务都落在这里。
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SchedulingGroup {
    index: u8,
}

impl SchedulingGroup {
    /// 缺省的 `main` 组。
    pub fn main() -> Self {
        ensure_main_registered();
        Self { index: 0 }
    }

    pub(crate) fn from_index(index: usize) -> Self {
        Self {
            index: index as u8,
        }
    }

    /// 分片本地索引。
    pub fn index(&self) -> usize {
        usize::from(self.index)
    }

    /// 注册表中的组名；组已销毁时为 `None`。
    pub fn name(&self) -> Option<String> {
        let registry = REGISTRY.lock();
        registry
            .slots
            .get(self.index())
            .and_then(|slot| slot.as_ref())
            .map(|record| record.name.clone())
    }

    /// 注册表中的共享额；组已销毁时为 `None`。
    pub fn shares(&self) -> Option<u32> {
        registered_shares(self.index())
    }
}

struct GroupRecord {
    name: String,
    shares: u32,
}

struct Registry {
    slots: Vec<Option<GroupRecord>>,
}

static REGISTRY: Mutex<Registry> = Mutex::new(Registry { slots: Vec::new() });

fn ensure_main_registered() {
    let mut registry = REGISTRY.lock();
    if registry.slots.is_empty() {
        registry.slots.resize_with(MAX_SCHEDULING_GROUPS, || None);
        registry.slots[0] = Some(GroupRecord {
            name: "main".to_string(),
            shares: 100,
        });
    }
}

pub(crate) fn registered_shares(index: usize) -> Option<u32> {
    ensure_main_registered();
    let registry = REGISTRY.lock();
    registry
        .slots
        .get(index)
        .and_then(|slot| slot.as_ref())
        .map(|record| record.shares)
}

/// 登记一个新调度组。
///
/// # 契约说明（What）
/// - `name` 非空；空名以 `sched.invalid_name` 失败；
/// - 索引表共 [`MAX_SCHEDULING_GROUPS`] 个槽位，占满以 `sched.table_full` 失败；
/// - 登记是进程级的：返回的句柄在任何分片上都指向同一索引，
///   分片本地队列在首次投递时按登记的共享额实例化。
pub fn create_scheduling_group(name: &str, shares: u32) -> Future<SchedulingGroup> {
    if name.is_empty() {
        return Future::err(ShoalError::new(
            codes::SCHED_INVALID_NAME,
            "scheduling group name must not be empty",
        ));
    }
    ensure_main_registered();
    let mut registry = REGISTRY.lock();
    let free = registry.slots.iter().position(Option::is_none);
    match free {
        Some(index) => {
            registry.slots[index] = Some(GroupRecord {
                name: name.to_string(),
                shares: shares.max(1),
            });
            Future::ready(SchedulingGroup::from_index(index))
        }
        None => Future::err(ShoalError::new(
            codes::SCHED_TABLE_FULL,
            format!("all {MAX_SCHEDULING_GROUPS} scheduling group slots are in use"),
        )),
    }
}

/// 注销调度组：先协作式等待本分片队列排空，再释放本地槽与注册表槽。
///
/// # 契约说明（What）
/// - `main` 组不可销毁；
/// - 返回的 future 决议后，该索引可被后续 `create_scheduling_group` 复用；
/// - 仍指向该组的旧句柄失效，继续用它投递任务属于框架缺陷。
pub fn destroy_scheduling_group(group: SchedulingGroup) -> Future<()> {
    if group.index() == 0 {
        return Future::err(ShoalError::new(
            codes::SCHED_INVALID_NAME,
            "the main scheduling group cannot be destroyed",
        ));
    }
    do_until(
        move || {
            runtime::try_current()
                .map(|state| state.runnable_in_group(group) == 0)
                .unwrap_or(true)
        },
        || later(),
    )
    .map(move |()| {
        if let Some(state) = runtime::try_current() {
            state.clear_group(group);
        }
        let mut registry = REGISTRY.lock();
        if let Some(slot) = registry.slots.get_mut(group.index()) {
            *slot = None;
        }
    })
}

/// 当前调度组：续延附着时捕获的隐式上下文。
pub fn current_scheduling_group() -> SchedulingGroup {
    runtime::current_group()
}

/// 让 `func` 的同步前缀与其 future 链上附着的所有续延都落在 `group`。
///
/// 执行器在运行任务时把"当前组"切到任务自身的组，因此标签随续延链
/// 传递，直到被更内层的 `with_scheduling_group` 覆盖。
pub fn with_scheduling_group<R, F>(group: SchedulingGroup, func: F) -> Future<R>
where
    R: 'static,
    F: FnOnce() -> Future<R>,
{
    let previous = runtime::set_current_group(group);
    let fut = func();
    runtime::set_current_group(previous);
    fut
}

struct KeyRecord {
    constructor: Box<dyn Fn() -> Box<dyn Any> + Send + Sync>,
}

static KEYS: Mutex<Vec<KeyRecord>> = Mutex::new(Vec::new());

/// 按组专属存储的类型化键。
///
/// 键是进程级的：同一个键在每个组（每个分片）各对应一个惰性构造的 `T`。
pub struct SchedulingGroupKey<T: 'static> {
    index: usize,
    _marker: PhantomData<fn() -> T>,
}

impl<T: 'static> Clone for SchedulingGroupKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T: 'static> Copy for SchedulingGroupKey<T> {}

/// 以显式构造器分配专属键。
pub fn create_scheduling_group_key<T, F>(constructor: F) -> SchedulingGroupKey<T>
where
    T: 'static,
    F: Fn() -> T + Send + Sync + 'static,
{
    let mut keys = KEYS.lock();
    let index = keys.len();
    keys.push(KeyRecord {
        constructor: Box::new(move || Box::new(constructor())),
    });
    SchedulingGroupKey {
        index,
        _marker: PhantomData,
    }
}

/// 以 `Default` 构造器分配专属键。
pub fn create_scheduling_group_key_default<T>() -> SchedulingGroupKey<T>
where
    T: Default + 'static,
{
    create_scheduling_group_key(T::default)
}

/// 访问 `group` 在当前分片上与 `key` 对应的专属值，必要时惰性构造。
pub fn with_specific<T, R, F>(group: SchedulingGroup, key: SchedulingGroupKey<T>, reader: F) -> R
where
    T: 'static,
    F: FnOnce(&mut T) -> R,
{
    let Some(state) = runtime::try_current() else {
        observability::report_defect(
            "shoal::sched",
            "scheduling-group specific storage used with no shard bound",
        );
        let keys = KEYS.lock();
        let mut fresh = (keys[key.index].constructor)();
        drop(keys);
        return read_typed(&mut fresh, reader);
    };
    let constructor = |index: usize| -> Box<dyn Any> {
        let keys = KEYS.lock();
        (keys[index].constructor)()
    };
    let mut reader = Some(reader);
    state.with_group_specific(
        group,
        key.index,
        &|| constructor(key.index),
        &mut |value| {
            let reader = match reader.take() {
                Some(reader) => reader,
                None => unreachable!("specific reader invoked twice"),
            };
            read_typed(value, reader)
        },
    )
}

fn read_typed<T: 'static, R>(value: &mut Box<dyn Any>, reader: impl FnOnce(&mut T) -> R) -> R {
    match value.downcast_mut::<T>() {
        Some(typed) => reader(typed),
        None => unreachable!("scheduling-group key bound to a different type"),
    }
}

/// 把 `key` 在本分片所有已实例化组上的专属值折叠为一个结果。
///
/// 折叠只覆盖当前分片；跨分片聚合属于消息服务的职责，不在本内核内。
pub fn map_reduce_specific<T, M, R, FM, FR>(
    key: SchedulingGroupKey<T>,
    map: FM,
    initial: R,
    reduce: FR,
) -> Future<R>
where
    T: 'static,
    R: 'static,
    FM: Fn(&T) -> M,
    FR: Fn(R, M) -> R,
{
    let Some(state) = runtime::try_current() else {
        return Future::ready(initial);
    };
    let folded = state.fold_specific(key.index, initial, &mut |acc, value| {
        match value.downcast_ref::<T>() {
            Some(typed) => reduce(acc, map(typed)),
            None => unreachable!("scheduling-group key bound to a different type"),
        }
    });
    Future::ready(folded)
}
