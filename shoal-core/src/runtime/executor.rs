use super::flags::{PreemptFlag, StopFlag};
use super::task::Task;
use super::timer::{TimeSource, TimerHandle, TimerWheel};
use crate::config::ShardConfig;
use crate::observability;
use crate::sched::{self, SchedulingGroup};
use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::rc::Rc;
use std::time::Instant;

/// 计费刻度：共享额为 100 的参考组每纳秒成本记 100 个单位，
/// 共享额翻倍的组同等开销只记一半，长期 CPU 占比即与共享额成正比。
const BILLING_SCALE: u128 = 100;

/// 虚拟时钟下单个任务的名义成本。真实时钟的 `elapsed` 为零时退回此值，
/// 保证公平性计费在确定性测试里同样成立。
const NOMINAL_TASK_COST_NS: u128 = 1_000;

struct GroupQueue {
    queue: VecDeque<Box<dyn Task>>,
    shares: u32,
    vruntime: u128,
}

/// 分片的全部可变状态。一个 OS 线程独占一个实例，所有字段用内部可变性
/// 表达，方法一律 `&self`，杜绝热路径锁。
pub(crate) struct ShardState {
    id: u32,
    config: ShardConfig,
    time: Rc<dyn TimeSource>,
    groups: RefCell<Vec<Option<GroupQueue>>>,
    runnable: Cell<usize>,
    preempt: PreemptFlag,
    stop: StopFlag,
    stop_fired: Cell<bool>,
    stop_subs: RefCell<Vec<(u64, Box<dyn FnOnce()>)>>,
    next_stop_sub: Cell<u64>,
    timers: RefCell<TimerWheel>,
    batch_deadline: Cell<Option<Instant>>,
    current_group: Cell<SchedulingGroup>,
    in_thread_context: Cell<bool>,
    specifics: RefCell<Vec<Vec<Option<Box<dyn Any>>>>>,
}

impl ShardState {
    pub(crate) fn new(id: u32, config: ShardConfig, time: Rc<dyn TimeSource>) -> Self {
        let capacity = config.group_table_capacity();
        let mut groups = Vec::with_capacity(capacity);
        let mut specifics = Vec::with_capacity(capacity);
        groups.resize_with(capacity, || None);
        specifics.resize_with(capacity, Vec::new);
        Self {
            id,
            config,
            time,
            groups: RefCell::new(groups),
            runnable: Cell::new(0),
            preempt: PreemptFlag::new(),
            stop: StopFlag::new(),
            stop_fired: Cell::new(false),
            stop_subs: RefCell::new(Vec::new()),
            next_stop_sub: Cell::new(0),
            timers: RefCell::new(TimerWheel::new()),
            batch_deadline: Cell::new(None),
            current_group: Cell::new(SchedulingGroup::main()),
            in_thread_context: Cell::new(false),
            specifics: RefCell::new(specifics),
        }
    }

    pub(crate) fn id(&self) -> u32 {
        self.id
    }

    pub(crate) fn preempt_flag(&self) -> PreemptFlag {
        self.preempt.clone()
    }

    pub(crate) fn stop_flag(&self) -> StopFlag {
        self.stop.clone()
    }

    pub(crate) fn now(&self) -> Instant {
        self.time.now()
    }

    pub(crate) fn current_group(&self) -> SchedulingGroup {
        self.current_group.get()
    }

    pub(crate) fn set_current_group(&self, group: SchedulingGroup) -> SchedulingGroup {
        self.current_group.replace(group)
    }

    pub(crate) fn in_thread_context(&self) -> bool {
        self.in_thread_context.get()
    }

    pub(crate) fn set_in_thread_context(&self, value: bool) -> bool {
        self.in_thread_context.replace(value)
    }

    /// 抢占检查：跨线程请求位，或批次时间预算耗尽。
    pub(crate) fn need_preempt(&self) -> bool {
        if self.preempt.is_set() {
            return true;
        }
        match self.batch_deadline.get() {
            Some(deadline) => self.time.now() >= deadline,
            None => false,
        }
    }

    /// 把任务按其调度组入队，O(1)，绝不失败。
    pub(crate) fn enqueue(&self, task: Box<dyn Task>) {
        let index = task.group().index();
        if index >= self.groups.borrow().len() {
            observability::report_defect(
                "shoal::executor",
                "task scheduled into a group beyond this shard's table",
            );
            return;
        }
        if self.groups.borrow()[index].is_none() {
            let shares = match sched::registered_shares(index) {
                Some(shares) => shares.max(1),
                None => {
                    observability::report_defect(
                        "shoal::executor",
                        "task scheduled into an unregistered scheduling group",
                    );
                    100
                }
            };
            let mut groups = self.groups.borrow_mut();
            if groups[index].is_none() {
                // 新组从现存组的最小虚拟时间起步，避免长期欠账的新组垄断分片。
                let floor = groups
                    .iter()
                    .flatten()
                    .map(|group| group.vruntime)
                    .min()
                    .unwrap_or(0);
                groups[index] = Some(GroupQueue {
                    queue: VecDeque::new(),
                    shares,
                    vruntime: floor,
                });
            }
        }
        let mut groups = self.groups.borrow_mut();
        if let Some(group) = groups[index].as_mut() {
            group.queue.push_back(task);
            self.runnable.set(self.runnable.get() + 1);
        }
    }

    pub(crate) fn runnable_in_group(&self, group: SchedulingGroup) -> usize {
        self.groups
            .borrow()
            .get(group.index())
            .and_then(|slot| slot.as_ref())
            .map(|queue| queue.queue.len())
            .unwrap_or(0)
    }

    /// 调度组销毁时回收本分片的队列槽与按组存储。
    pub(crate) fn clear_group(&self, group: SchedulingGroup) {
        let index = group.index();
        let leftover = {
            let mut groups = self.groups.borrow_mut();
            match groups.get_mut(index).and_then(Option::take) {
                Some(queue) => queue.queue.len(),
                None => 0,
            }
        };
        if leftover > 0 {
            self.runnable.set(self.runnable.get() - leftover);
            observability::report_drop_defect(
                "shoal::sched",
                "scheduling group destroyed with tasks still queued",
            );
        }
        let mut specifics = self.specifics.borrow_mut();
        if let Some(row) = specifics.get_mut(index) {
            row.clear();
        }
    }

    /// 访问（必要时惰性构造）当前分片上某组的按组存储。
    pub(crate) fn with_group_specific<R>(
        &self,
        group: SchedulingGroup,
        key_index: usize,
        constructor: &dyn Fn() -> Box<dyn Any>,
        reader: &mut dyn FnMut(&mut Box<dyn Any>) -> R,
    ) -> R {
        let mut specifics = self.specifics.borrow_mut();
        let row = &mut specifics[group.index()];
        if row.len() <= key_index {
            row.resize_with(key_index + 1, || None);
        }
        if row[key_index].is_none() {
            row[key_index] = Some(constructor());
        }
        match row[key_index].as_mut() {
            Some(value) => reader(value),
            None => unreachable!("specific value constructed above"),
        }
    }

    /// 枚举某个键在本分片上已实例化的全部按组值。
    pub(crate) fn fold_specific<R>(
        &self,
        key_index: usize,
        initial: R,
        fold: &mut dyn FnMut(R, &mut Box<dyn Any>) -> R,
    ) -> R {
        let mut specifics = self.specifics.borrow_mut();
        let mut acc = initial;
        for row in specifics.iter_mut() {
            if let Some(Some(value)) = row.get_mut(key_index).map(Option::as_mut) {
                acc = fold(acc, value);
            }
        }
        acc
    }

    pub(crate) fn arm_timer(&self, deadline: Instant, callback: Box<dyn FnOnce()>) -> TimerHandle {
        self.timers.borrow_mut().arm(deadline, callback)
    }

    pub(crate) fn cancel_timer(&self, handle: &TimerHandle) -> bool {
        self.timers.borrow_mut().cancel(handle)
    }

    /// 订阅停机事件；已停机时返回 `None`，调用方应立即执行兜底。
    pub(crate) fn subscribe_stop(&self, callback: Box<dyn FnOnce()>) -> Option<u64> {
        if self.stop_fired.get() {
            return None;
        }
        let id = self.next_stop_sub.get();
        self.next_stop_sub.set(id + 1);
        self.stop_subs.borrow_mut().push((id, callback));
        Some(id)
    }

    pub(crate) fn stop_fired(&self) -> bool {
        self.stop_fired.get()
    }

    pub(crate) fn unsubscribe_stop(&self, id: u64) {
        self.stop_subs.borrow_mut().retain(|(sub, _)| *sub != id);
    }

    pub(crate) fn request_stop(&self) {
        self.stop.request();
        self.preempt.set();
    }

    fn fire_stop_if_requested(&self) -> bool {
        if !self.stop.is_requested() || self.stop_fired.get() {
            return false;
        }
        self.stop_fired.set(true);
        let subs = std::mem::take(&mut *self.stop_subs.borrow_mut());
        let fired = !subs.is_empty();
        for (_, callback) in subs {
            callback();
        }
        fired
    }

    fn poll_timers(&self) -> bool {
        let mut fired = false;
        loop {
            let now = self.time.now();
            let callback = self.timers.borrow_mut().pop_due(now);
            match callback {
                Some(callback) => {
                    callback();
                    fired = true;
                }
                None => break,
            }
        }
        fired
    }

    /// 选出虚拟时间最小的非空组；并列时取低位索引，保持跨组 FIFO 的确定性。
    fn select_group(&self) -> Option<usize> {
        let groups = self.groups.borrow();
        let mut best: Option<(usize, u128)> = None;
        for (index, slot) in groups.iter().enumerate() {
            if let Some(group) = slot {
                if group.queue.is_empty() {
                    continue;
                }
                match best {
                    Some((_, vruntime)) if vruntime <= group.vruntime => {}
                    _ => best = Some((index, group.vruntime)),
                }
            }
        }
        best.map(|(index, _)| index)
    }

    /// 从选中组连续运行至多一个配额的任务，按组计费。
    fn run_batch(&self) -> bool {
        let Some(index) = self.select_group() else {
            return false;
        };
        let started = self.time.now();
        self.preempt.clear();
        self.batch_deadline
            .set(Some(started + self.config.task_quota_duration()));
        let was_thread_context = self.in_thread_context.replace(false);

        let mut ran: u32 = 0;
        while ran < self.config.task_quota() {
            let task = {
                let mut groups = self.groups.borrow_mut();
                groups[index].as_mut().and_then(|group| group.queue.pop_front())
            };
            let Some(task) = task else { break };
            self.runnable.set(self.runnable.get() - 1);
            let previous_group = self.current_group.replace(task.group());
            task.run_and_dispose();
            self.current_group.set(previous_group);
            ran += 1;
            if self.preempt.is_set() {
                break;
            }
        }

        self.in_thread_context.set(was_thread_context);
        self.batch_deadline.set(None);

        let elapsed = self.time.now().saturating_duration_since(started);
        let cost = elapsed
            .as_nanos()
            .max(u128::from(ran) * NOMINAL_TASK_COST_NS);
        let mut groups = self.groups.borrow_mut();
        if let Some(group) = groups[index].as_mut() {
            group.vruntime += cost * BILLING_SCALE / u128::from(group.shares);
        }
        ran > 0
    }

    /// 单步推进：停机订阅、到期定时器、一批就绪任务。返回是否有任何进展。
    pub(crate) fn pump_once(&self) -> bool {
        let mut progressed = self.fire_stop_if_requested();
        progressed |= self.poll_timers();
        progressed |= self.run_batch();
        progressed
    }

    /// 推进分片直到谓词成立。空转时把时间推进到下一个到期定时器；
    /// 既无任务又无定时器则是必然死锁，按缺陷上报。
    pub(crate) fn pump_until(&self, ready: &dyn Fn() -> bool) {
        loop {
            if ready() {
                return;
            }
            if self.pump_once() {
                continue;
            }
            let next_deadline = self.timers.borrow_mut().next_deadline();
            match next_deadline {
                Some(deadline) => {
                    if !self.time.idle_until(deadline) {
                        observability::report_defect(
                            "shoal::executor",
                            "time source refused to advance while timers are armed",
                        );
                        return;
                    }
                }
                None => {
                    observability::report_defect(
                        "shoal::executor",
                        "synchronous wait would block forever: no runnable tasks and no armed timers",
                    );
                    return;
                }
            }
        }
    }
}

impl Drop for ShardState {
    fn drop(&mut self) {
        if self.runnable.get() > 0 {
            observability::report_drop_defect(
                "shoal::executor",
                "shard dropped with tasks still queued; they are discarded unrun",
            );
        }
        if !self.timers.borrow_mut().is_idle() {
            observability::report_drop_defect(
                "shoal::executor",
                "shard dropped with timers still armed",
            );
        }
    }
}

thread_local! {
    static CURRENT: RefCell<Option<Rc<ShardState>>> = const { RefCell::new(None) };
}

/// 读取当前线程绑定的分片（若有）。
pub(crate) fn try_current() -> Option<Rc<ShardState>> {
    CURRENT.with(|slot| slot.borrow().clone())
}

/// 把分片绑定到当前线程；守卫析构时解绑，panic 路径同样恢复。
pub(crate) struct BindGuard {
    _private: (),
}

pub(crate) fn bind(state: Rc<ShardState>) -> Option<BindGuard> {
    CURRENT.with(|slot| {
        let mut slot = slot.borrow_mut();
        if slot.is_some() {
            return None;
        }
        *slot = Some(state);
        Some(BindGuard { _private: () })
    })
}

impl Drop for BindGuard {
    fn drop(&mut self) {
        CURRENT.with(|slot| {
            slot.borrow_mut().take();
        });
    }
}
