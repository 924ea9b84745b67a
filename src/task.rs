//! Bounded task execution.
//!
//! A [`BoundedTaskRunner`] runs one unit of work on its own worker and waits at
//! most a fixed wall-clock time for it. Each unit of work receives a fresh
//! [`CancellationToken`]; on timeout the token is cancelled and the caller moves
//! on. Cancellation is advisory only: work that never checks its token keeps
//! running in the background until it finishes on its own.

use crate::config::DEFAULT_TASK_TIMEOUT;
use crate::error::TaskError;
use crate::report::{default_sink, FailureSink};

use log::debug;
use parking_lot::Mutex;
use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Runs units of work under a timeout, one at a time.
pub struct BoundedTaskRunner {
    timeout: Duration,
    active: Mutex<Option<CancellationToken>>,
    sink: Arc<dyn FailureSink>,
}

/// Clears the active token when a run ends, however it ends.
struct ActiveGuard<'a>(&'a Mutex<Option<CancellationToken>>);

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.lock().take();
    }
}

impl BoundedTaskRunner {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            active: Mutex::new(None),
            sink: default_sink(),
        }
    }

    /// Report failures to `sink` instead of the log.
    pub fn with_sink(mut self, sink: Arc<dyn FailureSink>) -> Self {
        self.sink = sink;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Whether a unit of work is currently being waited on.
    pub fn is_busy(&self) -> bool {
        self.active.lock().is_some()
    }

    /// Ask the in-flight unit of work, if any, to stop.
    pub fn cancel_current(&self) {
        if let Some(token) = self.active.lock().as_ref() {
            token.cancel();
        }
    }

    /// Run an async unit of work and wait up to the timeout for its result.
    pub async fn run<F, Fut, T, E>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let (token, _guard) = self.arm();
        let handle = tokio::spawn(work(token.clone()));
        self.wait(handle, token).await
    }

    /// Run a blocking unit of work on the blocking thread pool and wait up to
    /// the timeout for its result.
    pub async fn run_blocking<F, T, E>(&self, work: F) -> Result<T, TaskError>
    where
        F: FnOnce(CancellationToken) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        let (token, _guard) = self.arm();
        let worker_token = token.clone();
        let handle = tokio::task::spawn_blocking(move || work(worker_token));
        self.wait(handle, token).await
    }

    /// Like [`run`](Self::run), but every failure is reported and collapsed to `None`.
    pub async fn run_with_timeout<F, Fut, T, E>(&self, work: F) -> Option<T>
    where
        F: FnOnce(CancellationToken) -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.settle(self.run(work).await)
    }

    /// Like [`run_blocking`](Self::run_blocking), but every failure is reported
    /// and collapsed to `None`.
    pub async fn run_blocking_with_timeout<F, T, E>(&self, work: F) -> Option<T>
    where
        F: FnOnce(CancellationToken) -> Result<T, E> + Send + 'static,
        T: Send + 'static,
        E: Display + Send + 'static,
    {
        self.settle(self.run_blocking(work).await)
    }

    fn arm(&self) -> (CancellationToken, ActiveGuard<'_>) {
        let token = CancellationToken::new();
        *self.active.lock() = Some(token.clone());
        (token, ActiveGuard(&self.active))
    }

    async fn wait<T, E>(&self, handle: JoinHandle<Result<T, E>>, token: CancellationToken) -> Result<T, TaskError>
    where
        E: Display,
    {
        // On timeout the handle is dropped, which detaches the worker rather than aborting it.
        match tokio::time::timeout(self.timeout, handle).await {
            Ok(Ok(Ok(value))) => Ok(value),
            Ok(Ok(Err(e))) => Err(TaskError::Failed(e.to_string())),
            Ok(Err(join_err)) => Err(TaskError::Panicked(join_err.to_string())),
            Err(_) => {
                token.cancel();
                debug!("Cancelled worker after {:?}", self.timeout);
                Err(TaskError::TimedOut(self.timeout))
            }
        }
    }

    fn settle<T>(&self, outcome: Result<T, TaskError>) -> Option<T> {
        match outcome {
            Ok(value) => Some(value),
            Err(e) => {
                self.sink.report(&e.to_string());
                None
            }
        }
    }
}

impl Default for BoundedTaskRunner {
    fn default() -> Self {
        Self::new(DEFAULT_TASK_TIMEOUT)
    }
}
