//! Per-invocation worker threads
//!
//! Every execution session runs its engine on a dedicated, named OS thread.
//! The host sends one [`WorkerRequest`] and waits for one [`WorkerMessage`]
//! on a one-shot channel, racing it against the wall clock cap.
//!
//! Termination is cooperative-forced: the worker owns a
//! [`CancellationToken`] and every engine polls it (the QuickJS interrupt
//! handler, the wasmtime epoch callback), so cancelling the token aborts the
//! engine even inside an infinite loop.

use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use thiserror::Error;
use tokio::sync::oneshot;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

use crate::types::ExecutionResult;

pub use protocol::{WorkerMessage, WorkerRequest};

mod protocol;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}

/// How a worker run ended
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerOutcome {
    /// The worker replied with a message
    Completed(WorkerMessage),

    /// The engine itself failed (a panic on the worker thread, or the
    /// thread exited without replying)
    Crashed(String),

    /// No reply arrived within the cap
    TimedOut,
}

impl WorkerOutcome {
    /// Map the outcome to a final result
    ///
    /// `elapsed` is the host-measured time used for completed runs; a
    /// timed-out run reports `cap` instead.
    pub fn into_execution_result(
        self,
        free_form: bool,
        elapsed: Duration,
        cap: Duration,
    ) -> ExecutionResult {
        match self {
            WorkerOutcome::Completed(WorkerMessage::Success { logs, .. }) if free_form => {
                ExecutionResult::free_form(logs, elapsed)
            }
            WorkerOutcome::Completed(WorkerMessage::Success { results, logs }) => {
                ExecutionResult::graded(results, logs, elapsed)
            }
            WorkerOutcome::Completed(WorkerMessage::Error { error, logs }) => {
                let output = if logs.is_empty() {
                    error
                } else {
                    format!("{logs}\n{error}")
                };
                ExecutionResult::runtime_error(output, elapsed)
            }
            WorkerOutcome::TimedOut => ExecutionResult::time_limit_exceeded(cap),
            WorkerOutcome::Crashed(message) => {
                ExecutionResult::runtime_error(format!("Worker error: {message}"), elapsed)
            }
        }
    }
}

type Reply = Result<WorkerMessage, String>;

/// Handle to a running worker thread
///
/// Dropping the handle terminates the worker.
#[derive(Debug)]
pub struct Worker {
    name: String,
    cancel: CancellationToken,
    reply: oneshot::Receiver<Reply>,
    terminated: AtomicBool,
}

impl Worker {
    /// Spawn a worker thread running `job` against `request`
    ///
    /// `job` receives the cancellation token it must poll. A panic inside
    /// `job` is caught and reported as [`WorkerOutcome::Crashed`].
    pub fn spawn<F>(
        name: impl Into<String>,
        request: WorkerRequest,
        job: F,
    ) -> Result<Self, WorkerError>
    where
        F: FnOnce(WorkerRequest, CancellationToken) -> WorkerMessage + Send + 'static,
    {
        let name = name.into();
        let cancel = CancellationToken::new();
        let (tx, rx) = oneshot::channel();

        let token = cancel.clone();
        thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                let reply = panic::catch_unwind(AssertUnwindSafe(|| job(request, token)))
                    .map_err(|payload| panic_message(payload.as_ref()));
                // The receiver is gone if the host already gave up on us
                let _ = tx.send(reply);
            })
            .map_err(WorkerError::Spawn)?;

        debug!(worker = %name, "worker spawned");

        Ok(Self {
            name,
            cancel,
            reply: rx,
            terminated: AtomicBool::new(false),
        })
    }

    /// A token that is cancelled when the worker is terminated
    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Whether the worker has been terminated
    pub fn is_terminated(&self) -> bool {
        self.terminated.load(Ordering::SeqCst)
    }

    /// Terminate the worker
    ///
    /// Returns `true` only for the call that actually terminated it; later
    /// calls are no-ops.
    pub fn terminate(&self) -> bool {
        if self.terminated.swap(true, Ordering::SeqCst) {
            return false;
        }
        self.cancel.cancel();
        debug!(worker = %self.name, "worker terminated");
        true
    }

    /// Wait for the reply, racing it against `timeout`
    ///
    /// The worker is terminated whichever way the race ends.
    #[instrument(skip(self), fields(worker = %self.name))]
    pub async fn run(mut self, timeout: Duration) -> WorkerOutcome {
        let started = Instant::now();
        let outcome = match tokio::time::timeout(timeout, &mut self.reply).await {
            Ok(Ok(Ok(message))) => WorkerOutcome::Completed(message),
            Ok(Ok(Err(panic))) => {
                warn!(%panic, "worker crashed");
                WorkerOutcome::Crashed(panic)
            }
            Ok(Err(_)) => WorkerOutcome::Crashed("worker exited without replying".to_string()),
            Err(_) => {
                warn!(?timeout, "worker timed out");
                WorkerOutcome::TimedOut
            }
        };
        self.terminate();

        debug!(elapsed = ?started.elapsed(), "worker finished");
        outcome
    }
}

impl Drop for Worker {
    fn drop(&mut self) {
        self.terminate();
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "worker panicked".to_string()
    }
}
