//! Task graph: units of work with pre-tasks (dependents), post-tasks
//! (dependencies), scheduler affinity and progress reporting.
//!
//! A task runs its dependents first, then its own `execute`, then the
//! dependencies returned in its [`Outcome`]. Dependencies are discovered while
//! executing, so a task can decide at runtime how much follow-up work exists
//! (one download per asset object, one per library, ...).

pub mod combinators;
pub mod context;
pub mod download;
pub mod executor;
pub mod scheduler;

use anyhow::Result;
use futures::future::BoxFuture;
use std::any::Any;
use std::borrow::Cow;
use std::marker::PhantomData;
use std::sync::Arc;

pub use combinators::{FnTask, Parallel, Sequence, Subscribe};
pub use context::{CancelToken, RunResults, TaskContext};
pub use download::{DownloadFailure, FailedHook, FileDownloadTask, GetTask};
pub use executor::{ExecutorHandle, TaskExecutor};
pub use scheduler::{ScheduledHandle, Scheduler, Schedulers, UiDispatcher};

pub type BoxedTask = Box<dyn Task>;

/// A unit of work in a task graph.
///
/// Tasks are disposable: `execute` consumes the task, so a task can never be
/// run twice.
pub trait Task: Send {
    /// Human readable title, used for logging and progress events.
    fn name(&self) -> String;

    /// Where `execute` runs.
    fn scheduler(&self) -> Scheduler {
        Scheduler::Default
    }

    /// Hidden tasks produce no log lines and no listener events.
    fn hidden(&self) -> bool {
        false
    }

    /// Whether a failed dependent prevents this task from executing.
    fn relies_on_dependents(&self) -> bool {
        true
    }

    /// Whether a failed dependency marks this task as failed.
    fn relies_on_dependencies(&self) -> bool {
        true
    }

    /// Tasks that must complete before `execute`. Called exactly once, right
    /// before the dependents are scheduled.
    fn dependents(&mut self, _ctx: &TaskContext) -> Vec<BoxedTask> {
        Vec::new()
    }

    /// Perform the work. The returned outcome may publish a value into the
    /// run-scoped result map and may carry follow-up tasks.
    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>>;
}

impl Task for BoxedTask {
    fn name(&self) -> String {
        (**self).name()
    }

    fn scheduler(&self) -> Scheduler {
        (**self).scheduler()
    }

    fn hidden(&self) -> bool {
        (**self).hidden()
    }

    fn relies_on_dependents(&self) -> bool {
        (**self).relies_on_dependents()
    }

    fn relies_on_dependencies(&self) -> bool {
        (**self).relies_on_dependencies()
    }

    fn dependents(&mut self, ctx: &TaskContext) -> Vec<BoxedTask> {
        (**self).dependents(ctx)
    }

    fn execute(self: Box<Self>, ctx: TaskContext) -> BoxFuture<'static, Result<Outcome>> {
        (*self).execute(ctx)
    }
}

/// Typed identifier of a value published into the run-scoped result map.
///
/// A task that produces a value publishes it with [`Outcome::publish`]; any
/// task scheduled afterwards in the same run reads it back through
/// [`TaskContext::get`].
pub struct ResultKey<V> {
    id: Cow<'static, str>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> ResultKey<V> {
    pub const fn new(id: &'static str) -> Self {
        Self {
            id: Cow::Borrowed(id),
            _marker: PhantomData,
        }
    }

    pub fn named(id: impl Into<String>) -> Self {
        Self {
            id: Cow::Owned(id.into()),
            _marker: PhantomData,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }
}

impl<V> Clone for ResultKey<V> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for ResultKey<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ResultKey({})", self.id)
    }
}

pub(crate) type SharedValue = Arc<dyn Any + Send + Sync>;

/// What a task hands back to the executor after `execute`.
#[derive(Default)]
pub struct Outcome {
    pub(crate) published: Option<(String, SharedValue)>,
    pub(crate) dependencies: Vec<BoxedTask>,
}

impl Outcome {
    pub fn done() -> Self {
        Self::default()
    }

    /// Publish `value` under `key` once `execute` has returned successfully.
    pub fn publish<V: Any + Send + Sync>(key: &ResultKey<V>, value: V) -> Self {
        Self {
            published: Some((key.id().to_string(), Arc::new(value))),
            dependencies: Vec::new(),
        }
    }

    /// Queue a follow-up task, run after this one as its dependency.
    pub fn then(mut self, task: impl Task + 'static) -> Self {
        self.dependencies.push(Box::new(task));
        self
    }

    pub fn then_all<I>(mut self, tasks: I) -> Self
    where
        I: IntoIterator<Item = BoxedTask>,
    {
        self.dependencies.extend(tasks);
        self
    }

    pub fn dependency_count(&self) -> usize {
        self.dependencies.len()
    }
}

/// Callback registration for task lifecycle and progress events.
///
/// Implementations forward updates to whatever presents progress (a UI, a
/// log, a test recorder). All methods default to doing nothing.
pub trait TaskListener: Send + Sync {
    fn on_start(&self, _task: &str) {}
    fn on_progress(&self, _task: &str, _progress: f64) {}
    fn on_message(&self, _task: &str, _message: &str) {}
    fn on_finished(&self, _task: &str) {}
    fn on_failed(&self, _task: &str, _error: &anyhow::Error) {}
    fn on_stop(&self, _success: bool) {}
}

/// A listener that does nothing.
/// Useful for background verification or tests.
pub struct SilentListener;

impl TaskListener for SilentListener {}

/// Convenience combinators available on every task.
pub trait TaskExt: Task + Sized + 'static {
    fn boxed(self) -> BoxedTask {
        Box::new(self)
    }

    /// Run `next` strictly after this task succeeds.
    fn then(self, next: impl Task + 'static) -> Sequence {
        Sequence::new("Sequence")
            .push(self)
            .push(next)
    }

    /// Run `f` on `scheduler` after this task succeeds.
    fn subscribe<F>(self, scheduler: Scheduler, f: F) -> Subscribe<F>
    where
        F: FnOnce(&TaskContext) -> Result<()> + Send + 'static,
    {
        Subscribe::new(self.boxed(), scheduler, f)
    }

    fn executor(self) -> TaskExecutor {
        TaskExecutor::new(self)
    }
}

impl<T: Task + Sized + 'static> TaskExt for T {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_key_ids() {
        const VERSION: ResultKey<String> = ResultKey::new("version");
        let dynamic: ResultKey<String> = ResultKey::named(format!("version:{}", "forge"));
        assert_eq!(VERSION.id(), "version");
        assert_eq!(dynamic.clone().id(), "version:forge");
    }

    #[test]
    fn outcome_collects_follow_up_tasks() {
        let key: ResultKey<u32> = ResultKey::new("answer");
        let outcome = Outcome::publish(&key, 42u32)
            .then(FnTask::new("a", |_| async { Ok(Outcome::done()) }))
            .then_all(vec![FnTask::new("b", |_| async { Ok(Outcome::done()) }).boxed()]);

        assert_eq!(outcome.dependency_count(), 2);
        let (id, value) = outcome.published.expect("published value");
        assert_eq!(id, "answer");
        assert_eq!(value.downcast_ref::<u32>(), Some(&42));
    }
}
