use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use tokio::sync::{oneshot, Semaphore};

/// Default width of the I/O pool, matching the download concurrency used by
/// the installers.
pub const DEFAULT_IO_CONCURRENCY: usize = 8;

/// Execution venue for a task body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Scheduler {
    /// General purpose worker threads.
    #[default]
    Default,
    /// Bounded pool for network and disk work.
    Io,
    /// A single permit; computations never overlap.
    Computation,
    /// Runs on whatever task awaits it, without being spawned.
    Immediate,
    /// Posted to the embedding application's UI thread.
    Ui,
}

impl Scheduler {
    pub fn as_str(&self) -> &'static str {
        match self {
            Scheduler::Default => "default",
            Scheduler::Io => "io",
            Scheduler::Computation => "computation",
            Scheduler::Immediate => "immediate",
            Scheduler::Ui => "ui",
        }
    }
}

impl std::fmt::Display for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Hook used by embedding applications to run work on their UI thread.
pub trait UiDispatcher: Send + Sync {
    /// Queue `job` for execution on the UI thread.
    fn post(&self, job: Box<dyn FnOnce() + Send>);

    /// True when called from the UI thread itself.
    fn is_ui_thread(&self) -> bool;
}

/// The set of execution venues used by one executor.
#[derive(Clone)]
pub struct Schedulers {
    io: Arc<Semaphore>,
    computation: Arc<Semaphore>,
    ui: Option<Arc<dyn UiDispatcher>>,
}

impl Default for Schedulers {
    fn default() -> Self {
        Self::new(DEFAULT_IO_CONCURRENCY)
    }
}

impl Schedulers {
    pub fn new(io_concurrency: usize) -> Self {
        Self {
            io: Arc::new(Semaphore::new(io_concurrency.max(1))),
            computation: Arc::new(Semaphore::new(1)),
            ui: None,
        }
    }

    pub fn with_ui(mut self, dispatcher: Arc<dyn UiDispatcher>) -> Self {
        self.ui = Some(dispatcher);
        self
    }

    /// Run `work` on the venue selected by `scheduler`.
    ///
    /// The returned handle resolves to the output of `work`, or to an error if
    /// the worker panicked or the venue dropped the job.
    pub fn schedule<F, T>(&self, scheduler: Scheduler, work: F) -> ScheduledHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let inner: BoxFuture<'static, Result<T>> = match scheduler {
            Scheduler::Default => spawn_worker(work),
            Scheduler::Io => spawn_limited(self.io.clone(), work),
            Scheduler::Computation => spawn_limited(self.computation.clone(), work),
            Scheduler::Immediate => Box::pin(async move { Ok(work.await) }),
            Scheduler::Ui => match &self.ui {
                Some(ui) if ui.is_ui_thread() => Box::pin(async move { Ok(work.await) }),
                Some(ui) => post_to_ui(ui.as_ref(), work),
                None => {
                    log::debug!("No UI dispatcher installed, running UI work immediately");
                    Box::pin(async move { Ok(work.await) })
                }
            },
        };
        ScheduledHandle { inner }
    }
}

fn spawn_worker<F, T>(work: F) -> BoxFuture<'static, Result<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(work);
    Box::pin(async move { handle.await.map_err(|e| anyhow!("Worker failed: {}", e)) })
}

fn spawn_limited<F, T>(permits: Arc<Semaphore>, work: F) -> BoxFuture<'static, Result<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let handle = tokio::spawn(async move {
        let _permit = permits
            .acquire_owned()
            .await
            .map_err(|_| anyhow!("Scheduler closed"))?;
        Ok::<T, anyhow::Error>(work.await)
    });
    Box::pin(async move {
        handle
            .await
            .map_err(|e| anyhow!("Worker failed: {}", e))?
    })
}

fn post_to_ui<F, T>(ui: &dyn UiDispatcher, work: F) -> BoxFuture<'static, Result<T>>
where
    F: Future<Output = T> + Send + 'static,
    T: Send + 'static,
{
    let (tx, rx) = oneshot::channel();
    ui.post(Box::new(move || {
        let output = futures::executor::block_on(work);
        let _ = tx.send(output);
    }));
    Box::pin(async move { rx.await.map_err(|_| anyhow!("UI dispatcher dropped the job")) })
}

/// Completion handle of scheduled work.
pub struct ScheduledHandle<T> {
    inner: BoxFuture<'static, Result<T>>,
}

impl<T> Future for ScheduledHandle<T> {
    type Output = Result<T>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        self.inner.as_mut().poll(cx)
    }
}
