use super::{BoxedTask, Outcome, ResultKey, Schedulers, SharedValue, TaskListener};
use crate::error::{is_cancellation, Cancelled};
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::any::Any;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::watch;

/// Cooperative cancellation token shared by every task of a run.
#[derive(Clone)]
pub struct CancelToken {
    tx: Arc<watch::Sender<bool>>,
    rx: watch::Receiver<bool>,
}

impl Default for CancelToken {
    fn default() -> Self {
        Self::new()
    }
}

impl CancelToken {
    pub fn new() -> Self {
        let (tx, rx) = watch::channel(false);
        Self {
            tx: Arc::new(tx),
            rx,
        }
    }

    pub fn cancel(&self) {
        self.tx.send_replace(true);
    }

    pub fn is_cancelled(&self) -> bool {
        *self.rx.borrow()
    }

    /// Resolves once the token is cancelled.
    pub async fn cancelled(&self) {
        let mut rx = self.rx.clone();
        loop {
            if *rx.borrow_and_update() {
                return;
            }
            if rx.changed().await.is_err() {
                // Sender gone without cancelling: nothing will ever cancel us.
                std::future::pending::<()>().await;
            }
        }
    }
}

/// Run-scoped map of values published by tasks.
#[derive(Clone, Default)]
pub struct RunResults {
    values: Arc<RwLock<HashMap<String, SharedValue>>>,
}

impl RunResults {
    pub fn get<V: Any + Send + Sync>(&self, key: &ResultKey<V>) -> Option<Arc<V>> {
        let values = self.values.read().ok()?;
        let value = values.get(key.id())?.clone();
        value.downcast::<V>().ok()
    }

    pub fn contains<V>(&self, key: &ResultKey<V>) -> bool {
        self.values
            .read()
            .map(|values| values.contains_key(key.id()))
            .unwrap_or(false)
    }

    pub(crate) fn insert(&self, id: String, value: SharedValue) {
        let Ok(mut values) = self.values.write() else {
            log::error!("Result map poisoned, dropping value for {}", id);
            return;
        };
        if values.contains_key(&id) {
            log::warn!("Result {} already published in this run, keeping the first value", id);
            return;
        }
        values.insert(id, value);
    }
}

#[derive(Clone, Default)]
pub(crate) struct Listeners(Arc<Vec<Arc<dyn TaskListener>>>);

impl Listeners {
    pub(crate) fn new(listeners: Vec<Arc<dyn TaskListener>>) -> Self {
        Self(Arc::new(listeners))
    }

    pub(crate) fn each(&self, f: impl Fn(&dyn TaskListener)) {
        for listener in self.0.iter() {
            f(listener.as_ref());
        }
    }
}

/// Handle passed to every task: cancellation, shared results, progress.
#[derive(Clone)]
pub struct TaskContext {
    name: Arc<str>,
    hidden: bool,
    cancel: CancelToken,
    results: RunResults,
    listeners: Listeners,
    schedulers: Schedulers,
    progress_interval: Duration,
    last_progress: Arc<Mutex<Option<Instant>>>,
}

impl TaskContext {
    pub(crate) fn new(
        cancel: CancelToken,
        results: RunResults,
        listeners: Listeners,
        schedulers: Schedulers,
        progress_interval: Duration,
    ) -> Self {
        Self {
            name: Arc::from(""),
            hidden: true,
            cancel,
            results,
            listeners,
            schedulers,
            progress_interval,
            last_progress: Arc::new(Mutex::new(None)),
        }
    }

    /// Context of a task started from this one.
    pub(crate) fn child(&self, name: &str, hidden: bool) -> Self {
        Self {
            name: Arc::from(name),
            hidden,
            cancel: self.cancel.clone(),
            results: self.results.clone(),
            listeners: self.listeners.clone(),
            schedulers: self.schedulers.clone(),
            progress_interval: self.progress_interval,
            last_progress: Arc::new(Mutex::new(None)),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Fails with [`Cancelled`] once the run has been cancelled.
    pub fn check_cancelled(&self) -> Result<(), Cancelled> {
        if self.cancel.is_cancelled() {
            Err(Cancelled)
        } else {
            Ok(())
        }
    }

    pub fn schedulers(&self) -> &Schedulers {
        &self.schedulers
    }

    pub fn progress_interval(&self) -> Duration {
        self.progress_interval
    }

    pub fn results(&self) -> &RunResults {
        &self.results
    }

    pub fn get<V: Any + Send + Sync>(&self, key: &ResultKey<V>) -> Option<Arc<V>> {
        self.results.get(key)
    }

    /// Like [`get`](Self::get), but a missing value is an error.
    pub fn require<V: Any + Send + Sync>(&self, key: &ResultKey<V>) -> Result<Arc<V>> {
        self.results
            .get(key)
            .ok_or_else(|| anyhow!("Result {} has not been published in this run", key.id()))
    }

    /// Report progress in `[0, 1]`. Updates closer together than the progress
    /// interval are dropped, except the first and the final one.
    pub fn set_progress(&self, progress: f64) {
        if self.hidden {
            return;
        }
        let progress = progress.clamp(0.0, 1.0);
        if !self.should_emit(progress >= 1.0) {
            return;
        }
        let name = self.name.clone();
        self.listeners
            .each(|listener| listener.on_progress(&name, progress));
    }

    pub fn set_message(&self, message: &str) {
        if self.hidden {
            return;
        }
        let name = self.name.clone();
        self.listeners
            .each(|listener| listener.on_message(&name, message));
    }

    fn should_emit(&self, force: bool) -> bool {
        let Ok(mut last) = self.last_progress.lock() else {
            return true;
        };
        let now = Instant::now();
        let due = match *last {
            None => true,
            Some(previous) => force || now.duration_since(previous) >= self.progress_interval,
        };
        if due {
            *last = Some(now);
        }
        due
    }

    /// Run `task` and its whole graph inline, on the calling task, stopping at
    /// the first failure. Scheduler hints and `relies_on_*` flags are ignored.
    /// Listeners see the same start, finish and failure events as for tasks
    /// the executor runs.
    pub fn run(&self, mut task: BoxedTask) -> BoxFuture<'static, Result<()>> {
        let parent = self.clone();
        Box::pin(async move {
            let name = task.name();
            let ctx = parent.child(&name, task.hidden());
            for dependent in task.dependents(&ctx) {
                ctx.run(dependent).await?;
            }
            ctx.check_cancelled()?;

            let visible = !ctx.hidden;
            if visible {
                log::debug!("Executing nested task: {}", name);
                ctx.listeners.each(|l| l.on_start(&name));
            }
            let outcome = match task.execute(ctx.clone()).await {
                Ok(outcome) => outcome,
                Err(e) => {
                    if visible && !is_cancellation(&e) {
                        ctx.listeners.each(|l| l.on_failed(&name, &e));
                    }
                    return Err(e);
                }
            };

            let Outcome {
                published,
                dependencies,
            } = outcome;
            if let Some((id, value)) = published {
                ctx.results.insert(id, value);
            }
            for dependency in dependencies {
                ctx.run(dependency).await?;
            }
            if visible {
                ctx.listeners.each(|l| l.on_finished(&name));
            }
            Ok(())
        })
    }

    pub(crate) fn listeners(&self) -> &Listeners {
        &self.listeners
    }

    pub(crate) fn is_hidden(&self) -> bool {
        self.hidden
    }
}
