use std::cell::Cell;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::thread;
use std::time::{Duration, Instant};

/// 可注入的单调时间源。
///
/// # 设计背景（Why）
/// - 定时器、配额时长与公平性计费都依赖时间；直接读系统时钟会让测试不可复现。
///   通过 trait 注入，生产环境用真实时钟，测试用可推进的虚拟时钟。
///
/// # 契约说明（What）
/// - `now` 必须单调递增；
/// - `idle_until` 在分片无就绪任务而有已挂定时器时被调用：真实时钟实现应阻塞
///   到目标时刻，虚拟时钟实现应把读数直接推进到目标时刻。返回 `false` 表示
///   时间源无法前进（分片将按缺陷处理）。
pub trait TimeSource {
    /// 返回当前单调时间点。
    fn now(&self) -> Instant;

    /// 空转直到给定时刻。
    fn idle_until(&self, deadline: Instant) -> bool;
}

/// 基于 `std::time::Instant` 的真实时间源。
#[derive(Clone, Copy, Debug, Default)]
pub struct SystemTimeSource;

impl TimeSource for SystemTimeSource {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn idle_until(&self, deadline: Instant) -> bool {
        let now = Instant::now();
        if deadline > now {
            thread::sleep(deadline - now);
        }
        true
    }
}

/// 虚拟时钟：以"起点 + 偏移量"表示当前时刻，测试显式或隐式推进。
///
/// # 契约说明（What）
/// - `advance` 单调增加偏移量，多次调用可累积；
/// - `idle_until` 把偏移量直接推进到目标时刻，使睡眠类测试零等待且完全确定；
/// - 所有从同一实例读出的时间点可安全比较与相减。
#[derive(Debug)]
pub struct ManualTimeSource {
    origin: Instant,
    offset: Cell<Duration>,
}

impl ManualTimeSource {
    /// 以当前系统时刻为起点创建虚拟时钟。
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
            offset: Cell::new(Duration::ZERO),
        }
    }

    /// 手动推进虚拟时间。
    pub fn advance(&self, delta: Duration) {
        self.offset.set(self.offset.get().saturating_add(delta));
    }

    /// 自起点以来的虚拟偏移量。
    pub fn elapsed(&self) -> Duration {
        self.offset.get()
    }
}

impl Default for ManualTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Instant {
        self.origin + self.offset.get()
    }

    fn idle_until(&self, deadline: Instant) -> bool {
        if deadline > self.now() {
            self.offset.set(deadline - self.origin);
        }
        true
    }
}

/// 一次性定时器的取消句柄。
///
/// 句柄被丢弃不影响定时器触发；取消必须显式调用
/// [`cancel_timer`](crate::runtime::cancel_timer)。
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TimerHandle {
    id: u64,
}

struct HeapEntry {
    deadline: Instant,
    id: u64,
}

impl PartialEq for HeapEntry {
    fn eq(&self, other: &Self) -> bool {
        self.deadline == other.deadline && self.id == other.id
    }
}

impl Eq for HeapEntry {}

impl PartialOrd for HeapEntry {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for HeapEntry {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.deadline
            .cmp(&other.deadline)
            .then(self.id.cmp(&other.id))
    }
}

/// 分片本地的定时器轮：二叉堆按到期时刻排序，取消采用惰性删除。
///
/// 同一到期时刻的多个定时器按挂载顺序触发（堆序的第二键是单调 id）。
pub(crate) struct TimerWheel {
    heap: BinaryHeap<Reverse<HeapEntry>>,
    callbacks: HashMap<u64, Box<dyn FnOnce()>>,
    next_id: u64,
}

impl TimerWheel {
    pub(crate) fn new() -> Self {
        Self {
            heap: BinaryHeap::new(),
            callbacks: HashMap::new(),
            next_id: 0,
        }
    }

    /// 挂载到期回调，返回取消句柄。
    pub(crate) fn arm(&mut self, deadline: Instant, callback: Box<dyn FnOnce()>) -> TimerHandle {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse(HeapEntry { deadline, id }));
        self.callbacks.insert(id, callback);
        TimerHandle { id }
    }

    /// 取消定时器；仅当它尚未触发时返回 `true`。
    pub(crate) fn cancel(&mut self, handle: &TimerHandle) -> bool {
        self.callbacks.remove(&handle.id).is_some()
    }

    /// 弹出一个已到期的回调；跳过被惰性取消的堆项。
    pub(crate) fn pop_due(&mut self, now: Instant) -> Option<Box<dyn FnOnce()>> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if entry.deadline > now {
                return None;
            }
            let Reverse(entry) = match self.heap.pop() {
                Some(popped) => popped,
                None => return None,
            };
            if let Some(callback) = self.callbacks.remove(&entry.id) {
                return Some(callback);
            }
        }
        None
    }

    /// 最近的有效到期时刻。
    pub(crate) fn next_deadline(&mut self) -> Option<Instant> {
        while let Some(Reverse(entry)) = self.heap.peek() {
            if self.callbacks.contains_key(&entry.id) {
                return Some(entry.deadline);
            }
            self.heap.pop();
        }
        None
    }

    /// 是否还有未触发的定时器。
    pub(crate) fn is_idle(&self) -> bool {
        self.callbacks.is_empty()
    }
}
