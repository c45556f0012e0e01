use super::{BoxedTask, Outcome, Scheduler, Task, TaskContext};
use anyhow::Result;
use futures::future::BoxFuture;
use std::collections::VecDeque;
use std::future::Future;

/// A task backed by an async closure.
pub struct FnTask<F> {
    name: String,
    scheduler: Scheduler,
    hidden: bool,
    body: F,
}

impl<F, Fut> FnTask<F>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    pub fn new(name: impl Into<String>, body: F) -> Self {
        Self {
            name: name.into(),
            scheduler: Scheduler::Default,
            hidden: false,
            body,
        }
    }

    pub fn on(mut self, scheduler: Scheduler) -> Self {
        self.scheduler = scheduler;
        self
    }

    pub fn hide(mut self) -> Self {
        self.hidden = true;
        self
    }
}

impl<F, Fut> Task for FnTask<F>
where
    F: FnOnce(TaskContext) -> Fut + Send + 'static,
    Fut: Future<Output = Result<Outcome>> + Send + 'static,
{
    fn name(&self) -> String {
        self.name.clone()
    }

    fn scheduler(&self) -> Scheduler {
        self.scheduler
    }

    fn hidden(&self) -> bool {
        self.hidden
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin((self.body)(ctx))
    }
}

/// Runs all of its tasks concurrently. Fails if any of them fails.
pub struct Parallel {
    tasks: Vec<BoxedTask>,
}

impl Parallel {
    pub fn new(tasks: Vec<BoxedTask>) -> Self {
        Self { tasks }
    }
}

impl Task for Parallel {
    fn name(&self) -> String {
        "Parallel".to_string()
    }

    fn hidden(&self) -> bool {
        true
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::Immediate
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        std::mem::take(&mut self.tasks)
    }

    fn execute(self: Box<Self>, _ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async { Ok(Outcome::done()) })
    }
}

/// Runs its tasks one after another, stopping at the first failure.
///
/// The head runs as this task's dependent; the remainder is handed back as a
/// follow-up sequence once the head has succeeded.
pub struct Sequence {
    name: String,
    tasks: VecDeque<BoxedTask>,
}

impl Sequence {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tasks: VecDeque::new(),
        }
    }

    pub fn push(mut self, task: impl Task + 'static) -> Self {
        self.tasks.push_back(Box::new(task));
        self
    }

    pub fn push_boxed(mut self, task: BoxedTask) -> Self {
        self.tasks.push_back(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl Task for Sequence {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn hidden(&self) -> bool {
        true
    }

    fn scheduler(&self) -> Scheduler {
        Scheduler::Immediate
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.tasks.pop_front().into_iter().collect()
    }

    fn execute(self: Box<Self>, _ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            let rest = *self;
            if rest.tasks.is_empty() {
                Ok(Outcome::done())
            } else {
                Ok(Outcome::done().then(rest))
            }
        })
    }
}

/// Runs a callback on a given scheduler once the upstream task succeeded.
pub struct Subscribe<F> {
    upstream: Option<BoxedTask>,
    scheduler: Scheduler,
    callback: F,
}

impl<F> Subscribe<F>
where
    F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
{
    pub fn new(upstream: BoxedTask, scheduler: Scheduler, callback: F) -> Self {
        Self {
            upstream: Some(upstream),
            scheduler,
            callback,
        }
    }
}

impl<F> Task for Subscribe<F>
where
    F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
{
    fn name(&self) -> String {
        "Subscribe".to_string()
    }

    fn hidden(&self) -> bool {
        true
    }

    fn scheduler(&self) -> Scheduler {
        self.scheduler
    }

    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        self.upstream.take().into_iter().collect()
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        Box::pin(async move {
            (self.callback)(&ctx)?;
            Ok(Outcome::done())
        })
    }
}
