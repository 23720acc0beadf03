//! Distributed job queue on Redis lists.
//!
//! Producers `LPUSH` a JSON [`QueuedJob`] envelope onto a list; consumers
//! `BRPOP` from the other end. Delivery is at-least-once: a worker that dies
//! mid-job loses it, and the reconciliation sweep repairs image artifacts.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use amur_common::{ConversionJob, JobId, JobKind, Resolution};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tokio_util::sync::CancellationToken;

use super::runner::ConversionRunner;
use crate::error::Result;

/// How long a single `BRPOP` blocks before re-checking for shutdown.
const POLL_TIMEOUT: Duration = Duration::from_millis(250);

/// Back-off after a failed dequeue.
const RETRY_DELAY: Duration = Duration::from_secs(2);

/// Producer side of a job queue.
#[async_trait]
pub trait JobQueue: Send + Sync {
    /// Push a job and return the identifier assigned to it.
    async fn enqueue(&self, job: &ConversionJob) -> Result<JobId>;
}

/// Payload of a queued job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobPayload {
    pub source_path: PathBuf,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scale: Option<Resolution>,
}

/// Wire envelope pushed onto the queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedJob {
    pub id: JobId,

    #[serde(rename = "type")]
    pub kind: JobKind,

    pub payload: JobPayload,

    pub enqueued_at: DateTime<Utc>,
}

impl QueuedJob {
    pub fn new(job: &ConversionJob) -> Self {
        Self {
            id: JobId::new(),
            kind: job.kind,
            payload: JobPayload {
                source_path: job.target_path.clone(),
                scale: job.scale,
            },
            enqueued_at: Utc::now(),
        }
    }

    pub fn to_job(&self) -> ConversionJob {
        ConversionJob {
            kind: self.kind,
            target_path: self.payload.source_path.clone(),
            scale: self.payload.scale,
        }
    }
}

/// Redis-backed [`JobQueue`].
///
/// The connection is established on first use and re-established by the
/// connection manager afterwards, so an unreachable server fails individual
/// enqueues instead of startup.
#[derive(Clone)]
pub struct RedisQueue {
    client: redis::Client,
    conn: Arc<OnceCell<ConnectionManager>>,
    key: String,
}

impl fmt::Debug for RedisQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisQueue")
            .field("connected", &self.conn.initialized())
            .field("key", &self.key)
            .finish()
    }
}

impl RedisQueue {
    /// Use the list at `key` on the server at `redis_url`.
    ///
    /// Only the URL is checked here; no connection is made yet.
    pub fn open(redis_url: &str, key: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(redis_url)?;
        Ok(Self {
            client,
            conn: Arc::new(OnceCell::new()),
            key: key.into(),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager> {
        let conn = self
            .conn
            .get_or_try_init(|| async {
                tracing::info!(key = %self.key, "Connecting to job queue");
                ConnectionManager::new(self.client.clone()).await
            })
            .await?;
        Ok(conn.clone())
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    /// Pop the oldest job, waiting up to `timeout`.
    ///
    /// Envelopes that fail to parse are logged and discarded.
    pub async fn dequeue(&self, timeout: Duration) -> Result<Option<QueuedJob>> {
        let mut conn = self.connection().await?;
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(&self.key)
            .arg(timeout.as_secs_f64())
            .query_async(&mut conn)
            .await?;

        let Some((_, raw)) = popped else {
            return Ok(None);
        };

        match serde_json::from_str::<QueuedJob>(&raw) {
            Ok(job) => Ok(Some(job)),
            Err(e) => {
                tracing::warn!(error = %e, payload = %raw, "Discarding malformed queued job");
                Ok(None)
            }
        }
    }
}

#[async_trait]
impl JobQueue for RedisQueue {
    async fn enqueue(&self, job: &ConversionJob) -> Result<JobId> {
        let envelope = QueuedJob::new(job);
        let json = serde_json::to_string(&envelope)?;

        let mut conn = self.connection().await?;
        conn.lpush::<_, _, ()>(&self.key, json).await?;

        Ok(envelope.id)
    }
}

/// Consumes the distributed queue and runs each job locally.
pub struct QueueWorker {
    queue: RedisQueue,
    runner: Arc<ConversionRunner>,
}

impl QueueWorker {
    pub fn new(queue: RedisQueue, runner: Arc<ConversionRunner>) -> Self {
        Self { queue, runner }
    }

    /// Process jobs one at a time until `cancel` fires.
    pub async fn run(self, cancel: CancellationToken) {
        tracing::info!(key = %self.queue.key(), "Queue worker started");

        while !cancel.is_cancelled() {
            let popped = tokio::select! {
                _ = cancel.cancelled() => break,
                popped = self.queue.dequeue(POLL_TIMEOUT) => popped,
            };

            match popped {
                Ok(Some(envelope)) => {
                    let job = envelope.to_job();
                    tracing::debug!(id = %envelope.id, job = %job, "Dequeued job");
                    self.runner.run_logged(&job).await;
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::warn!(error = %e, "Failed to dequeue job, retrying");
                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(RETRY_DELAY) => {}
                    }
                }
            }
        }

        tracing::info!("Queue worker stopped");
    }
}
