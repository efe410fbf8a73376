//! A strict one-at-a-time task queue.
//!
//! Each queue instance guards one backing resource that must never see
//! overlapping invocations: the package-manager binary takes filesystem locks
//! and can corrupt an environment when run twice against the same prefix, and
//! the registry/download clients are serialized the same way. Submission is
//! non-blocking and returns a [`TaskHandle`]; the job itself runs on a
//! background processor task that drives exactly one job at a time in FIFO
//! order.

use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use futures::FutureExt;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;

mod processor;

use processor::TaskQueueProcessor;

/// A handle to a serialized task queue. Cloning is cheap; all clones feed the
/// same processor. The processor shuts down once every handle is dropped.
#[derive(Clone)]
pub struct TaskQueue {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<QueuedTask>,
    /// Token shared by every job of the current "generation"; replaced
    /// wholesale by [`TaskQueue::terminate_all`].
    generation: Arc<Mutex<CancellationToken>>,
}

/// The completion side of a submitted job.
pub struct TaskHandle<T> {
    rx: oneshot::Receiver<Result<T, TaskError>>,
}

/// How a job can fail to deliver a value. Domain failures are not represented
/// here: a fallible job returns `Result` as its output type, so its errors are
/// handed back as values inside `Ok`.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TaskError {
    /// The job was abandoned, either by [`TaskQueue::terminate_all`] or
    /// because the queue shut down before the job ran.
    #[error("the task was cancelled")]
    Cancelled,

    /// The job panicked; the panic was captured on the processor and never
    /// unwinds into the caller.
    #[error("the task panicked: {0}")]
    Panicked(String),
}

/// A type-erased job plus its delivery logic, ready to be driven by the
/// processor.
struct QueuedTask {
    run: BoxFuture<'static, ()>,
}

impl TaskQueue {
    /// Create a queue and spawn its background processor. `name` only labels
    /// log output.
    pub fn new(name: impl Into<String>) -> Self {
        let name: Arc<str> = name.into().into();
        let sender = TaskQueueProcessor::spawn(name.clone());
        Self {
            name,
            sender,
            generation: Arc::new(Mutex::new(CancellationToken::new())),
        }
    }

    /// The label this queue logs under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queue a job for execution. Returns immediately; the job starts once
    /// every previously submitted job has finished.
    pub fn submit<T, F>(&self, job: F) -> TaskHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();
        let cancelled = self.generation.lock().clone();

        let run = async move {
            tokio::select! {
                _ = cancelled.cancelled() => {
                    let _ = tx.send(Err(TaskError::Cancelled));
                }
                outcome = AssertUnwindSafe(job).catch_unwind() => {
                    let _ = match outcome {
                        Ok(value) => tx.send(Ok(value)),
                        Err(panic) => tx.send(Err(TaskError::Panicked(panic_message(&panic)))),
                    };
                }
            }
        }
        .boxed();

        if self.sender.send(QueuedTask { run }).is_err() {
            // The processor is gone; dropping `tx` above already resolved the
            // handle as cancelled.
            tracing::debug!(queue = %self.name, "submission to a stopped task queue");
        }
        TaskHandle { rx }
    }

    /// Abandon everything currently in flight for this resource: the running
    /// job is cancelled at its next suspension point and the backlog resolves
    /// as [`TaskError::Cancelled`]. Jobs submitted afterwards run normally.
    pub fn terminate_all(&self) {
        let fresh = CancellationToken::new();
        let stale = std::mem::replace(&mut *self.generation.lock(), fresh);
        tracing::debug!(queue = %self.name, "terminating all queued work");
        stale.cancel();
    }
}

impl<T> TaskHandle<T> {
    /// Wait for the job to finish and return its output, or how it was lost.
    pub async fn finished(self) -> Result<T, TaskError> {
        self.rx.await.unwrap_or(Err(TaskError::Cancelled))
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "opaque panic payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use super::*;

    #[tokio::test]
    async fn at_most_one_job_runs_at_a_time() {
        let queue = TaskQueue::new("test");
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let running = running.clone();
                let peak = peak.clone();
                queue.submit(async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(5)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                })
            })
            .collect();

        for handle in handles {
            handle.finished().await.unwrap();
        }
        assert_eq!(peak.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn jobs_complete_in_submission_order() {
        let queue = TaskQueue::new("test");
        let order = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..5)
            .map(|index| {
                let order = order.clone();
                queue.submit(async move {
                    tokio::time::sleep(Duration::from_millis(2)).await;
                    order.lock().push(index);
                })
            })
            .collect();

        for handle in handles {
            handle.finished().await.unwrap();
        }
        assert_eq!(*order.lock(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn domain_errors_come_back_as_values() {
        let queue = TaskQueue::new("test");
        let handle = queue.submit(async { Err::<(), _>("no such channel") });
        assert_eq!(handle.finished().await, Ok(Err("no such channel")));
    }

    #[tokio::test]
    async fn panics_are_captured_not_propagated() {
        let queue = TaskQueue::new("test");
        let panicking = queue.submit(async { panic!("boom") });
        match panicking.finished().await {
            Err(TaskError::Panicked(message)) => assert!(message.contains("boom")),
            other => panic!("expected captured panic, got {other:?}"),
        }

        // The processor survives and keeps serving.
        let after = queue.submit(async { 7 });
        assert_eq!(after.finished().await, Ok(7));
    }

    #[tokio::test]
    async fn terminate_all_abandons_backlog_but_not_the_queue() {
        let queue = TaskQueue::new("test");

        let slow = queue.submit(async {
            tokio::time::sleep(Duration::from_secs(30)).await;
        });
        let queued = queue.submit(async { 1 });

        // Give the processor a chance to start the slow job.
        tokio::time::sleep(Duration::from_millis(10)).await;
        queue.terminate_all();

        assert_eq!(slow.finished().await, Err(TaskError::Cancelled));
        assert_eq!(queued.finished().await, Err(TaskError::Cancelled));

        let fresh = queue.submit(async { 2 });
        assert_eq!(fresh.finished().await, Ok(2));
    }
}
