use crate::sched::SchedulingGroup;

/// 就绪队列中的最小执行单元。
///
/// # 设计背景（Why）
/// - 续延帧、循环状态机、用户投递的闭包统一收敛为一个堆上对象，执行器只认
///   "运行并自毁"一个入口；
/// - 任务在任一时刻恰好被一处持有（就绪队列、等待决议的 future、调度瞬间的栈帧），
///   所有权转移而非复制，`Box<Self>` 入参把"运行即释放"写进签名。
///
/// # 契约说明（What）
/// - `run_and_dispose` 不得向外抛出：任务内部的失败通过 future 的失败通道传递；
/// - `group` 返回任务所属调度组，执行器据此入队与计费。
pub trait Task {
    /// 运行任务并释放自身。
    fn run_and_dispose(self: Box<Self>);

    /// 任务所属的调度组。
    fn group(&self) -> SchedulingGroup;
}

/// 包装闭包的任务适配器。
pub struct LambdaTask<F: FnOnce()> {
    group: SchedulingGroup,
    func: F,
}

impl<F: FnOnce()> Task for LambdaTask<F> {
    fn run_and_dispose(self: Box<Self>) {
        (self.func)();
    }

    fn group(&self) -> SchedulingGroup {
        self.group
    }
}

/// 以指定调度组包装闭包为任务。
pub fn make_task<F>(group: SchedulingGroup, func: F) -> Box<dyn Task>
where
    F: FnOnce() + 'static,
{
    Box::new(LambdaTask { group, func })
}
