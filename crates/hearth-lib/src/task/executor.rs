use super::context::Listeners;
use super::{BoxedTask, CancelToken, Outcome, RunResults, Schedulers, Task, TaskContext, TaskListener};
use crate::error::is_cancellation;
use futures::future::{join_all, BoxFuture};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

pub const DEFAULT_PROGRESS_INTERVAL: Duration = Duration::from_secs(1);

type LastError = Arc<Mutex<Option<Arc<anyhow::Error>>>>;

/// Runs a task graph to completion.
///
/// An executor is single-use: the root task is consumed by the first run.
pub struct TaskExecutor {
    root: Option<BoxedTask>,
    schedulers: Schedulers,
    listeners: Vec<Arc<dyn TaskListener>>,
    cancel: CancelToken,
    results: RunResults,
    last_error: LastError,
    progress_interval: Duration,
}

impl TaskExecutor {
    pub fn new(root: impl Task + 'static) -> Self {
        Self::from_boxed(Box::new(root))
    }

    pub fn from_boxed(root: BoxedTask) -> Self {
        Self {
            root: Some(root),
            schedulers: Schedulers::default(),
            listeners: Vec::new(),
            cancel: CancelToken::new(),
            results: RunResults::default(),
            last_error: Arc::new(Mutex::new(None)),
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
        }
    }

    pub fn with_schedulers(mut self, schedulers: Schedulers) -> Self {
        self.schedulers = schedulers;
        self
    }

    pub fn with_listener(mut self, listener: Arc<dyn TaskListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    pub fn with_progress_interval(mut self, interval: Duration) -> Self {
        self.progress_interval = interval;
        self
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Values published by the tasks of this run.
    pub fn results(&self) -> RunResults {
        self.results.clone()
    }

    /// The most recent failure recorded during the run, if any.
    pub fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Execute the whole graph. Returns true on success. Cancellation and
    /// failure both return false; only failures set [`last_error`](Self::last_error).
    pub async fn run(&mut self) -> bool {
        let Some(root) = self.root.take() else {
            log::warn!("Task executor already ran, ignoring second run");
            return false;
        };
        let state = RunState {
            root_context: TaskContext::new(
                self.cancel.clone(),
                self.results.clone(),
                Listeners::new(self.listeners.clone()),
                self.schedulers.clone(),
                self.progress_interval,
            ),
            last_error: self.last_error.clone(),
        };

        let success = state
            .execute_task(root, None)
            .await;
        if self.cancel.is_cancelled() {
            log::info!("Task run cancelled");
        }
        for listener in &self.listeners {
            listener.on_stop(success);
        }
        success
    }

    /// Spawn the run on the current tokio runtime.
    pub fn start(mut self) -> ExecutorHandle {
        let cancel = self.cancel.clone();
        let results = self.results.clone();
        let last_error = self.last_error.clone();
        let join = tokio::spawn(async move { self.run().await });
        ExecutorHandle {
            cancel,
            results,
            last_error,
            join,
        }
    }

    /// Blocking run on a private runtime, for tests and synchronous callers.
    /// Must not be called from inside a tokio runtime.
    pub fn test(mut self) -> bool {
        let runtime = match tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .build()
        {
            Ok(runtime) => runtime,
            Err(e) => {
                log::error!("Failed to build runtime for task run: {}", e);
                return false;
            }
        };
        runtime.block_on(self.run())
    }
}

/// Handle of a run started with [`TaskExecutor::start`].
pub struct ExecutorHandle {
    cancel: CancelToken,
    results: RunResults,
    last_error: LastError,
    join: JoinHandle<bool>,
}

impl ExecutorHandle {
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    pub fn results(&self) -> RunResults {
        self.results.clone()
    }

    pub fn last_error(&self) -> Option<Arc<anyhow::Error>> {
        self.last_error.lock().ok().and_then(|e| e.clone())
    }

    /// Wait for the run to finish.
    pub async fn join(self) -> bool {
        match self.join.await {
            Ok(success) => success,
            Err(e) => {
                log::error!("Task run panicked: {}", e);
                false
            }
        }
    }
}

#[derive(Clone)]
struct RunState {
    root_context: TaskContext,
    last_error: LastError,
}

/// Shared by siblings scheduled together when their parent relies on all of
/// them: once raised, siblings that have not started yet are skipped.
type AbortFlag = Option<Arc<AtomicBool>>;

fn raise(flag: &AbortFlag) {
    if let Some(flag) = flag {
        flag.store(true, Ordering::SeqCst);
    }
}

fn raised(flag: &AbortFlag) -> bool {
    flag.as_ref().is_some_and(|f| f.load(Ordering::SeqCst))
}

impl RunState {
    fn execute_tasks(
        &self,
        tasks: Vec<BoxedTask>,
        abort_on_failure: bool,
    ) -> BoxFuture<'static, bool> {
        let state = self.clone();
        Box::pin(async move {
            if tasks.is_empty() {
                return true;
            }
            if state.root_context.is_cancelled() {
                return false;
            }
            let abort: AbortFlag = abort_on_failure.then(|| Arc::new(AtomicBool::new(false)));
            let runs = tasks
                .into_iter()
                .map(|task| state.execute_task(task, abort.clone()));
            join_all(runs).await.into_iter().all(|ok| ok)
        })
    }

    fn execute_task(&self, mut task: BoxedTask, abort: AbortFlag) -> BoxFuture<'static, bool> {
        let state = self.clone();
        Box::pin(async move {
            if state.root_context.is_cancelled() || raised(&abort) {
                return false;
            }
            let name = task.name();
            let hidden = task.hidden();
            let scheduler = task.scheduler();
            let relies_on_dependents = task.relies_on_dependents();
            let relies_on_dependencies = task.relies_on_dependencies();
            let ctx = state.root_context.child(&name, hidden);

            let dependents = task.dependents(&ctx);
            let dependents_ok = state.execute_tasks(dependents, relies_on_dependents).await;
            if !dependents_ok && relies_on_dependents {
                if !hidden {
                    log::debug!("Skipping task {} because a dependent failed", name);
                }
                raise(&abort);
                return false;
            }
            if ctx.is_cancelled() || raised(&abort) {
                return false;
            }

            if !hidden {
                log::debug!("Executing task: {}", name);
                ctx.listeners().each(|l| l.on_start(&name));
            }

            let work_ctx = ctx.clone();
            let work_abort = abort.clone();
            let handle = ctx.schedulers().schedule(scheduler, async move {
                // Siblings may have failed while we waited for a worker.
                if raised(&work_abort) {
                    return Ok::<Option<Outcome>, anyhow::Error>(None);
                }
                work_ctx.check_cancelled()?;
                let result = task.execute(work_ctx).await;
                if result.is_err() {
                    raise(&work_abort);
                }
                result.map(Some)
            });

            let outcome = match handle.await.and_then(|result| result) {
                Ok(Some(outcome)) => outcome,
                Ok(None) => {
                    if !hidden {
                        log::debug!("Task {} skipped after a sibling failed", name);
                    }
                    return false;
                }
                Err(e) if is_cancellation(&e) => {
                    if !hidden {
                        log::debug!("Task {} cancelled", name);
                    }
                    return false;
                }
                Err(e) => {
                    if !hidden {
                        log::warn!("Task {} failed: {:#}", name, e);
                        ctx.listeners().each(|l| l.on_failed(&name, &e));
                    }
                    raise(&abort);
                    if let Ok(mut last) = state.last_error.lock() {
                        *last = Some(Arc::new(e));
                    }
                    return false;
                }
            };

            let Outcome {
                published,
                dependencies,
            } = outcome;
            if let Some((id, value)) = published {
                ctx.results().insert(id, value);
            }

            let dependencies_ok = state
                .execute_tasks(dependencies, relies_on_dependencies)
                .await;
            if !dependencies_ok && relies_on_dependencies {
                if !hidden {
                    log::debug!("Task {} failed because a dependency failed", name);
                }
                raise(&abort);
                return false;
            }

            if !hidden {
                log::debug!("Task finished: {}", name);
                ctx.listeners().each(|l| l.on_finished(&name));
            }
            true
        })
    }
}
