//! Bounded in-process worker pool.
//!
//! Jobs are sent over a bounded channel to a fixed number of worker tasks.
//! While a job waits in the channel its idempotency key is held in a pending
//! set, so a burst of events for the same target queues it only once. The key
//! is released when a worker picks the job up, so a later event for the same
//! target queues it again. On cancellation the workers finish the job they
//! are running and discard whatever is still queued.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use amur_common::{ConversionJob, JobKey};
use dashmap::DashSet;
use tokio::sync::{mpsc, Mutex, Notify};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::runner::ConversionRunner;
use crate::config::OverflowPolicy;
use crate::error::{Error, Result};

/// What happened to a submitted job.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Submission {
    /// Accepted into the queue.
    Queued,
    /// An identical job is already waiting.
    Duplicate,
    /// The queue was full and the overflow policy is `drop`.
    Dropped,
}

/// Counts jobs that are queued or running, and wakes idle waiters.
#[derive(Debug, Default)]
struct InFlight {
    count: AtomicUsize,
    idle: Notify,
}

impl InFlight {
    fn begin(&self) {
        self.count.fetch_add(1, Ordering::SeqCst);
    }

    fn end(&self) {
        if self.count.fetch_sub(1, Ordering::SeqCst) == 1 {
            self.idle.notify_waiters();
        }
    }
}

/// Handle to a running pool of conversion workers.
pub struct WorkerPool {
    sender: mpsc::Sender<ConversionJob>,
    pending: Arc<DashSet<JobKey>>,
    in_flight: Arc<InFlight>,
    overflow: OverflowPolicy,
    workers: Vec<JoinHandle<()>>,
    // Keeps the channel open after workers stop on cancellation.
    receiver: Arc<Mutex<mpsc::Receiver<ConversionJob>>>,
    cancel: CancellationToken,
}

impl WorkerPool {
    /// Spawn `workers` tasks consuming a queue of `capacity` jobs.
    ///
    /// Workers exit when `cancel` fires or every sender is gone.
    pub fn start(
        runner: Arc<ConversionRunner>,
        workers: usize,
        capacity: usize,
        overflow: OverflowPolicy,
        cancel: CancellationToken,
    ) -> Self {
        let (sender, receiver) = mpsc::channel(capacity.max(1));
        let receiver = Arc::new(Mutex::new(receiver));
        let pending = Arc::new(DashSet::new());
        let in_flight = Arc::new(InFlight::default());

        let workers = (0..workers.max(1))
            .map(|id| {
                tokio::spawn(worker_loop(
                    id,
                    receiver.clone(),
                    runner.clone(),
                    pending.clone(),
                    in_flight.clone(),
                    cancel.clone(),
                ))
            })
            .collect();

        tracing::info!(capacity, ?overflow, "Worker pool started");

        Self {
            sender,
            pending,
            in_flight,
            overflow,
            workers,
            receiver,
            cancel,
        }
    }

    /// Queue a job, honoring deduplication and the overflow policy.
    pub async fn submit(&self, job: ConversionJob) -> Result<Submission> {
        let key = job.key();
        if !self.pending.insert(key.clone()) {
            tracing::trace!(job = %job, "Job already queued");
            return Ok(Submission::Duplicate);
        }

        self.in_flight.begin();
        let result = match self.overflow {
            OverflowPolicy::Block => self
                .sender
                .send(job)
                .await
                .map(|_| Submission::Queued)
                .map_err(|_| Error::PoolClosed),
            OverflowPolicy::Drop => match self.sender.try_send(job) {
                Ok(()) => Ok(Submission::Queued),
                Err(mpsc::error::TrySendError::Full(job)) => {
                    tracing::warn!(job = %job, "Worker queue full, dropping job");
                    Ok(Submission::Dropped)
                }
                Err(mpsc::error::TrySendError::Closed(_)) => Err(Error::PoolClosed),
            },
        };

        if !matches!(result, Ok(Submission::Queued)) {
            self.pending.remove(&key);
            self.in_flight.end();
        }
        result
    }

    /// Jobs queued but not yet picked up.
    pub fn queued(&self) -> usize {
        self.pending.len()
    }

    /// Jobs queued or running.
    pub fn in_flight(&self) -> usize {
        self.in_flight.count.load(Ordering::SeqCst)
    }

    /// Wait until every accepted job has finished, or the pool is cancelled.
    pub async fn wait_idle(&self) {
        loop {
            let notified = self.in_flight.idle.notified();
            if self.in_flight() == 0 {
                return;
            }
            tokio::select! {
                _ = notified => {}
                _ = self.cancel.cancelled() => return,
            }
        }
    }

    /// Close the queue and wait for workers to drain it.
    pub async fn shutdown(self) {
        drop(self.sender);
        drop(self.receiver);
        for handle in self.workers {
            let _ = handle.await;
        }
        tracing::info!("Worker pool stopped");
    }
}

async fn worker_loop(
    id: usize,
    receiver: Arc<Mutex<mpsc::Receiver<ConversionJob>>>,
    runner: Arc<ConversionRunner>,
    pending: Arc<DashSet<JobKey>>,
    in_flight: Arc<InFlight>,
    cancel: CancellationToken,
) {
    tracing::debug!(worker = id, "Worker started");

    loop {
        let job = {
            let mut rx = receiver.lock().await;
            tokio::select! {
                biased;
                _ = cancel.cancelled() => None,
                job = rx.recv() => job,
            }
        };

        let Some(job) = job else { break };
        pending.remove(&job.key());

        tracing::debug!(worker = id, job = %job, "Running job");
        runner.run_logged(&job).await;
        in_flight.end();
    }

    if cancel.is_cancelled() {
        let discarded = discard_queued(&receiver, &pending, &in_flight).await;
        if discarded > 0 {
            tracing::info!(worker = id, discarded, "Discarded queued jobs on shutdown");
        }
    }

    tracing::debug!(worker = id, "Worker stopped");
}

/// Empty the channel, releasing each job's key and in-flight slot.
async fn discard_queued(
    receiver: &Mutex<mpsc::Receiver<ConversionJob>>,
    pending: &DashSet<JobKey>,
    in_flight: &InFlight,
) -> usize {
    let mut rx = receiver.lock().await;
    let mut discarded = 0;
    while let Ok(job) = rx.try_recv() {
        pending.remove(&job.key());
        in_flight.end();
        discarded += 1;
    }
    discarded
}

#[cfg(test)]
mod tests {
    use super::*;
    use amur_av::ToolRegistry;
    use std::time::Duration;

    fn runner() -> Arc<ConversionRunner> {
        Arc::new(ConversionRunner::new(ToolRegistry::default(), 6))
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_cancel_discards_queued_jobs() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let cwebp = dir.path().join("cwebp");
        std::fs::write(&cwebp, "#!/bin/sh\nsleep 0.5\ncp \"$1\" \"$3\"\n").unwrap();
        std::fs::set_permissions(&cwebp, std::fs::Permissions::from_mode(0o755)).unwrap();
        let tools = ToolRegistry::default().with_tool("cwebp", cwebp.clone());
        let runner = Arc::new(ConversionRunner::new(tools, 6));

        let cancel = CancellationToken::new();
        let pool = WorkerPool::start(runner, 1, 8, OverflowPolicy::Block, cancel.clone());
        let sources: Vec<_> = ["a.jpg", "b.jpg", "c.jpg"]
            .iter()
            .map(|name| dir.path().join(name))
            .collect();
        for source in &sources {
            std::fs::write(source, b"jpeg").unwrap();
            pool.submit(ConversionJob::optimize(source)).await.unwrap();
        }
        // Let the worker pick up the first job.
        tokio::time::sleep(Duration::from_millis(100)).await;
        cancel.cancel();

        tokio::time::timeout(Duration::from_secs(1), pool.wait_idle())
            .await
            .unwrap();
        tokio::time::timeout(Duration::from_secs(5), async {
            while pool.in_flight() > 0 {
                tokio::time::sleep(Duration::from_millis(20)).await;
            }
        })
        .await
        .unwrap();
        assert_eq!(pool.queued(), 0);

        // The running job completed; the queued ones never started.
        assert!(dir.path().join("a.webp").exists());
        assert!(!dir.path().join("b.webp").exists());
        assert!(!dir.path().join("c.webp").exists());
        pool.shutdown().await;
    }

    #[tokio::test]
    async fn test_wait_idle_returns_once_cancelled() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::start(runner(), 1, 8, OverflowPolicy::Block, cancel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        pool.submit(ConversionJob::optimize("/i/a.jpg")).await.unwrap();
        assert_eq!(pool.in_flight(), 1);
        tokio::time::timeout(Duration::from_secs(1), pool.wait_idle())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_duplicate_jobs_collapse_while_queued() {
        let cancel = CancellationToken::new();
        // No workers are able to run: the only worker is cancelled first.
        cancel.cancel();
        let pool = WorkerPool::start(runner(), 1, 8, OverflowPolicy::Block, cancel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let job = ConversionJob::optimize("/i/a.jpg");
        assert_eq!(pool.submit(job.clone()).await.unwrap(), Submission::Queued);
        assert_eq!(pool.submit(job.clone()).await.unwrap(), Submission::Duplicate);
        assert_eq!(
            pool.submit(ConversionJob::thumbnail("/i/a.jpg")).await.unwrap(),
            Submission::Queued
        );
        assert_eq!(pool.queued(), 2);
    }

    #[tokio::test]
    async fn test_drop_policy_when_full() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pool = WorkerPool::start(runner(), 1, 1, OverflowPolicy::Drop, cancel);
        tokio::time::sleep(Duration::from_millis(20)).await;

        let first = pool.submit(ConversionJob::optimize("/i/a.jpg")).await;
        assert_eq!(first.unwrap(), Submission::Queued);
        let second = pool.submit(ConversionJob::optimize("/i/b.jpg")).await;
        assert_eq!(second.unwrap(), Submission::Dropped);
        // A dropped job does not hold its key.
        assert_eq!(pool.queued(), 1);
        assert_eq!(pool.in_flight(), 1);
    }

    #[tokio::test]
    async fn test_key_released_on_pickup() {
        let pool = WorkerPool::start(
            runner(),
            2,
            8,
            OverflowPolicy::Block,
            CancellationToken::new(),
        );
        let job = ConversionJob::optimize("/i/cat.webp");
        assert_eq!(pool.submit(job.clone()).await.unwrap(), Submission::Queued);
        tokio::time::timeout(Duration::from_secs(5), pool.wait_idle())
            .await
            .unwrap();
        assert_eq!(pool.queued(), 0);
        assert_eq!(pool.submit(job).await.unwrap(), Submission::Queued);
        pool.shutdown().await;
    }
}
