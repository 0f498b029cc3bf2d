//! Executors that run completion callbacks.

use std::io;
use std::sync::{Arc, OnceLock};

use parking_lot::Mutex;
use tokio::runtime::{Builder, Handle, Runtime};
use tracing::{error, warn};

/// Unit of work handed to an [`Executor`].
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Runs completion tasks.
pub trait Executor: Send + Sync {
    /// Schedules `task`. Implementations may run it before returning.
    fn execute(&self, task: Task);
}

/// Runs tasks on the thread that completes the request.
#[derive(Clone, Copy, Debug, Default)]
pub struct InlineExecutor;

impl Executor for InlineExecutor {
    fn execute(&self, task: Task) {
        task();
    }
}

/// Runs tasks on a tokio runtime's blocking pool, so callbacks may block.
#[derive(Clone, Debug)]
pub struct TokioExecutor {
    handle: Handle,
}

impl TokioExecutor {
    /// Wraps a runtime handle.
    pub fn new(handle: Handle) -> Self {
        Self { handle }
    }

    /// Uses the runtime of the calling task, if any.
    pub fn current() -> Option<Self> {
        Handle::try_current().ok().map(Self::new)
    }
}

impl Executor for TokioExecutor {
    fn execute(&self, task: Task) {
        // a runtime that is shutting down drops blocking tasks without running them
        let task = RunOnDrop(Some(task));
        drop(self.handle.spawn_blocking(move || task.run()));
    }
}

/// Spawns one OS thread per task.
///
/// When no thread can be spawned the task runs on the calling thread.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadExecutor;

impl Executor for ThreadExecutor {
    fn execute(&self, task: Task) {
        spawn_or_inline(task, spawn_callback_thread);
    }
}

fn spawn_callback_thread(task: Task) -> io::Result<()> {
    std::thread::Builder::new()
        .name("corvid-callback".into())
        .spawn(task)
        .map(drop)
}

/// Hands `task` to `spawn`, running it here if spawning fails.
fn spawn_or_inline<S>(task: Task, spawn: S)
where
    S: FnOnce(Task) -> io::Result<()>,
{
    let pending = Arc::new(Mutex::new(Some(task)));
    let handed = Arc::clone(&pending);
    let spawned = spawn(Box::new(move || {
        let task = handed.lock().take();
        if let Some(task) = task {
            task();
        }
    }));
    if let Err(err) = spawned {
        error!(error = %err, "failed to spawn callback thread, running inline");
        let task = pending.lock().take();
        if let Some(task) = task {
            task();
        }
    }
}

/// Task wrapper that still runs its task if it is dropped unrun.
struct RunOnDrop(Option<Task>);

impl RunOnDrop {
    fn run(mut self) {
        if let Some(task) = self.0.take() {
            task();
        }
    }
}

impl Drop for RunOnDrop {
    fn drop(&mut self) {
        if let Some(task) = self.0.take() {
            // may be inside the runtime's own locks, so leave this thread
            warn!("runtime dropped a completion task, handing it to a fresh thread");
            spawn_or_inline(task, spawn_callback_thread);
        }
    }
}

static SHARED_RUNTIME: OnceLock<Option<Runtime>> = OnceLock::new();

/// Process-wide general-purpose executor for completions.
///
/// Backed by a lazily built multi-threaded tokio runtime; if the runtime cannot be
/// built, tasks fall back to a [`ThreadExecutor`].
pub fn shared_pool() -> Arc<dyn Executor> {
    let runtime = SHARED_RUNTIME.get_or_init(|| {
        Builder::new_multi_thread()
            .worker_threads(2)
            .thread_name("corvid-completion")
            .build()
            .map_err(|err| error!(error = %err, "failed to build shared completion runtime"))
            .ok()
    });
    match runtime {
        Some(runtime) => Arc::new(TokioExecutor::new(runtime.handle().clone())),
        None => Arc::new(ThreadExecutor),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::mpsc;
    use std::time::Duration;

    #[test]
    fn inline_runs_before_returning() {
        let (tx, rx) = mpsc::channel();
        InlineExecutor.execute(Box::new(move || tx.send(1).unwrap()));
        assert_eq!(rx.try_recv().unwrap(), 1);
    }

    #[test]
    fn shared_pool_runs_off_the_caller_thread() {
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        shared_pool().execute(Box::new(move || {
            tx.send(std::thread::current().id()).unwrap();
        }));
        let worker = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_ne!(worker, caller);
    }

    #[test]
    fn failed_spawn_runs_task_on_caller() {
        let caller = std::thread::current().id();
        let (tx, rx) = mpsc::channel();
        spawn_or_inline(
            Box::new(move || tx.send(std::thread::current().id()).unwrap()),
            |task| {
                drop(task);
                Err(io::Error::new(io::ErrorKind::WouldBlock, "thread limit reached"))
            },
        );
        assert_eq!(rx.try_recv().unwrap(), caller);
    }

    #[test]
    fn dropped_task_still_runs() {
        let (tx, rx) = mpsc::channel();
        drop(RunOnDrop(Some(Box::new(move || tx.send(7).unwrap()))));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), 7);
    }

    #[test]
    fn tokio_executor_outlives_its_runtime() {
        let runtime = Builder::new_current_thread().build().unwrap();
        let executor = TokioExecutor::new(runtime.handle().clone());
        drop(runtime);

        let (tx, rx) = mpsc::channel();
        executor.execute(Box::new(move || tx.send("ran").unwrap()));
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)).unwrap(), "ran");
    }

    #[test]
    fn thread_executor_names_its_threads() {
        let (tx, rx) = mpsc::channel();
        ThreadExecutor.execute(Box::new(move || {
            tx.send(std::thread::current().name().map(str::to_owned)).unwrap();
        }));
        let name = rx.recv_timeout(Duration::from_secs(5)).unwrap();
        assert_eq!(name.as_deref(), Some("corvid-callback"));
    }
}
