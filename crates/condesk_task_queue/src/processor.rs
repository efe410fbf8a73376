use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use futures::future::BoxFuture;
use slotmap::SlotMap;
use tokio::sync::mpsc;
use tokio::time::Interval;

use crate::QueuedTask;

slotmap::new_key_type! {
    /// Identifies one admitted job in the processor's bookkeeping.
    struct JobId;
}

/// How often finished jobs are swept out of the bookkeeping.
const REAP_INTERVAL: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum JobPhase {
    Queued,
    Running,
    Finished,
}

/// Runs the task queue background loop: admits submissions, drives exactly
/// one job at a time in FIFO order, and periodically reaps finished-job
/// records. The reaper idles whenever there is nothing left to reap and is
/// re-armed by the next submission.
pub(crate) struct TaskQueueProcessor {
    name: Arc<str>,
    receiver: mpsc::UnboundedReceiver<QueuedTask>,
    backlog: VecDeque<(JobId, BoxFuture<'static, ()>)>,
    running: Option<(JobId, BoxFuture<'static, ()>)>,
    records: SlotMap<JobId, JobPhase>,
    reaper: Option<Interval>,
}

/// The event a single loop iteration acted on.
enum Step {
    Admitted(Option<QueuedTask>),
    JobFinished,
    Reap,
}

impl TaskQueueProcessor {
    /// Spawn the background task and return the submission channel. The task
    /// stops once every sender is dropped and the backlog has drained.
    pub(crate) fn spawn(name: Arc<str>) -> mpsc::UnboundedSender<QueuedTask> {
        let (tx, rx) = mpsc::unbounded_channel();
        let processor = Self {
            name,
            receiver: rx,
            backlog: VecDeque::new(),
            running: None,
            records: SlotMap::with_key(),
            reaper: None,
        };
        tokio::spawn(processor.run());
        tx
    }

    async fn run(mut self) {
        tracing::debug!(queue = %self.name, "task queue processor started");
        let mut closed = false;
        loop {
            if self.running.is_none() {
                if let Some((id, job)) = self.backlog.pop_front() {
                    self.records[id] = JobPhase::Running;
                    self.running = Some((id, job));
                }
            }
            if closed && self.running.is_none() && self.backlog.is_empty() {
                break;
            }

            let step = {
                let Self {
                    receiver,
                    running,
                    reaper,
                    ..
                } = &mut self;
                tokio::select! {
                    message = receiver.recv(), if !closed => Step::Admitted(message),
                    _ = drive_current(running) => Step::JobFinished,
                    _ = next_tick(reaper) => Step::Reap,
                }
            };

            match step {
                Step::Admitted(Some(task)) => self.admit(task),
                Step::Admitted(None) => closed = true,
                Step::JobFinished => {
                    let (id, _) = self.running.take().expect("a job was running");
                    self.records[id] = JobPhase::Finished;
                }
                Step::Reap => self.reap(),
            }
        }
        tracing::debug!(queue = %self.name, "task queue processor stopped");
    }

    fn admit(&mut self, task: QueuedTask) {
        let id = self.records.insert(JobPhase::Queued);
        self.backlog.push_back((id, task.run));
        if self.reaper.is_none() {
            self.reaper = Some(tokio::time::interval(REAP_INTERVAL));
        }
    }

    /// Drop records of finished jobs; disarm the reaper once nothing is left.
    fn reap(&mut self) {
        self.records.retain(|_, phase| *phase != JobPhase::Finished);
        if self.records.is_empty() {
            self.reaper = None;
        }
    }
}

/// Poll the running job to completion; pend forever while the queue is idle
/// so the select arm simply never fires.
async fn drive_current(running: &mut Option<(JobId, BoxFuture<'static, ()>)>) {
    match running {
        Some((_, job)) => job.as_mut().await,
        None => futures::future::pending().await,
    }
}

/// Wait for the next reaper tick; pend forever while the reaper is disarmed.
async fn next_tick(reaper: &mut Option<Interval>) {
    match reaper {
        Some(interval) => {
            interval.tick().await;
        }
        None => futures::future::pending().await,
    }
}
