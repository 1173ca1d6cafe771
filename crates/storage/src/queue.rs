//! Background IPNS publishing of the MFS root.
//!
//! Publishing a name takes anywhere from seconds to minutes, so ingestion
//! only submits a [`PublishJob`] and returns. A fixed pool of workers drains
//! the queue; each job reads the root hash when it runs, never when it was
//! submitted.
//!
//! While a job is queued and not yet picked up, further submissions are
//! folded into it: that job will read the root after their namespace writes
//! anyway. With more than one worker, publishes may still complete out of
//! submission order and an older root can briefly win. The next ingestion's
//! publish corrects it.

use chrono::{DateTime, Utc};
use metrics::counter;
use serde::Serialize;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, PoisonError};
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::paths::DEFAULT_ROOT;
use crate::store::{ContentStore, PublishOptions, PublishedName, StoreResult};

/// Configuration for the publish worker pool.
#[derive(Debug, Clone)]
pub struct PublishQueueConfig {
    /// Number of concurrent workers
    pub concurrency: usize,
    /// Deadline for one stat + publish
    pub job_timeout: Duration,
    /// MFS folder whose hash is published
    pub root: String,
    /// Name publish options
    pub publish: PublishOptions,
}

impl Default for PublishQueueConfig {
    fn default() -> Self {
        Self {
            concurrency: 3,
            job_timeout: Duration::from_secs(300),
            root: DEFAULT_ROOT.to_string(),
            publish: PublishOptions::default(),
        }
    }
}

/// A request to republish the current root.
#[derive(Debug, Clone, Serialize)]
pub struct PublishJob {
    pub id: Uuid,
    /// Why the job was submitted (ingested hash, manual request, ...).
    pub reason: String,
    pub enqueued_at: DateTime<Utc>,
}

impl PublishJob {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            reason: reason.into(),
            enqueued_at: Utc::now(),
        }
    }
}

/// What happened to a submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SubmitOutcome {
    /// A new job was queued.
    Queued,
    /// A job that has not started yet will cover this submission.
    Coalesced,
    /// The queue is shut down; nothing will be published.
    Closed,
}

/// The most recent successful publish.
#[derive(Debug, Clone, Serialize)]
pub struct PublishRecord {
    pub job_id: Uuid,
    pub root_hash: String,
    pub name: String,
    pub value: String,
    pub published_at: DateTime<Utc>,
    pub duration_ms: u64,
}

/// Snapshot of queue activity.
#[derive(Debug, Clone, Serialize)]
pub struct QueueStats {
    pub concurrency: usize,
    pub submitted: u64,
    pub coalesced: u64,
    pub completed: u64,
    pub failed: u64,
    pub timed_out: u64,
    pub in_flight: u64,
    pub last_published: Option<PublishRecord>,
}

/// State shared with the workers.
#[derive(Default)]
struct QueueState {
    /// A job sits in the channel and no worker has taken it yet.
    pending: AtomicBool,
    submitted: AtomicU64,
    coalesced: AtomicU64,
    completed: AtomicU64,
    failed: AtomicU64,
    timed_out: AtomicU64,
    in_flight: AtomicU64,
    last_published: std::sync::Mutex<Option<PublishRecord>>,
}

struct Inner {
    sender: std::sync::Mutex<Option<mpsc::Sender<PublishJob>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    state: Arc<QueueState>,
    concurrency: usize,
}

/// Handle to the publish worker pool. Clones share the same pool.
#[derive(Clone)]
pub struct PublishQueue {
    inner: Arc<Inner>,
}

impl PublishQueue {
    /// Spawn the workers. Must be called from within a tokio runtime.
    pub fn start(store: Arc<dyn ContentStore>, config: PublishQueueConfig) -> Self {
        let concurrency = config.concurrency.max(1);
        let (sender, receiver) = mpsc::channel(concurrency);
        let receiver = Arc::new(Mutex::new(receiver));
        let state = Arc::new(QueueState::default());
        let config = Arc::new(config);

        let workers = (0..concurrency)
            .map(|worker| {
                tokio::spawn(run_worker(
                    worker,
                    receiver.clone(),
                    store.clone(),
                    config.clone(),
                    state.clone(),
                ))
            })
            .collect();

        info!(
            concurrency,
            root = %config.root,
            job_timeout_secs = config.job_timeout.as_secs(),
            "Publish queue started"
        );

        Self {
            inner: Arc::new(Inner {
                sender: std::sync::Mutex::new(Some(sender)),
                workers: Mutex::new(workers),
                state,
                concurrency,
            }),
        }
    }

    /// Submit a job. Never blocks and never reports publish failures.
    pub fn submit(&self, job: PublishJob) -> SubmitOutcome {
        let state = &self.inner.state;

        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(sender) = sender else {
            warn!(job_id = %job.id, reason = %job.reason, "Publish queue is closed, dropping job");
            return SubmitOutcome::Closed;
        };

        if state.pending.swap(true, Ordering::SeqCst) {
            state.coalesced.fetch_add(1, Ordering::Relaxed);
            counter!("publish_jobs_total", "outcome" => "coalesced").increment(1);
            debug!(reason = %job.reason, "Publish already pending, coalesced");
            return SubmitOutcome::Coalesced;
        }

        match sender.try_send(job) {
            Ok(()) => {
                state.submitted.fetch_add(1, Ordering::Relaxed);
                counter!("publish_jobs_total", "outcome" => "queued").increment(1);
                SubmitOutcome::Queued
            }
            Err(mpsc::error::TrySendError::Full(job)) => {
                // Jobs are waiting already; they will cover this one.
                state.coalesced.fetch_add(1, Ordering::Relaxed);
                debug!(reason = %job.reason, "Publish queue full, coalesced");
                SubmitOutcome::Coalesced
            }
            Err(mpsc::error::TrySendError::Closed(job)) => {
                state.pending.store(false, Ordering::SeqCst);
                warn!(job_id = %job.id, "Publish queue is closed, dropping job");
                SubmitOutcome::Closed
            }
        }
    }

    /// Snapshot of the counters.
    pub fn stats(&self) -> QueueStats {
        let state = &self.inner.state;
        QueueStats {
            concurrency: self.inner.concurrency,
            submitted: state.submitted.load(Ordering::Relaxed),
            coalesced: state.coalesced.load(Ordering::Relaxed),
            completed: state.completed.load(Ordering::Relaxed),
            failed: state.failed.load(Ordering::Relaxed),
            timed_out: state.timed_out.load(Ordering::Relaxed),
            in_flight: state.in_flight.load(Ordering::Relaxed),
            last_published: state
                .last_published
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone(),
        }
    }

    /// Stop accepting jobs, finish the queued ones and wait for the workers.
    pub async fn shutdown(&self) {
        let sender = self
            .inner
            .sender
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        drop(sender);

        let workers = std::mem::take(&mut *self.inner.workers.lock().await);
        for result in futures::future::join_all(workers).await {
            if let Err(e) = result {
                error!(error = %e, "Publish worker panicked");
            }
        }

        info!("Publish queue drained");
    }
}

async fn run_worker(
    worker: usize,
    receiver: Arc<Mutex<mpsc::Receiver<PublishJob>>>,
    store: Arc<dyn ContentStore>,
    config: Arc<PublishQueueConfig>,
    state: Arc<QueueState>,
) {
    loop {
        let job = receiver.lock().await.recv().await;
        let Some(job) = job else {
            break;
        };

        // Cleared before reading the root so that any submission coalesced
        // up to here is covered by this job.
        state.pending.store(false, Ordering::SeqCst);
        state.in_flight.fetch_add(1, Ordering::Relaxed);

        info!(worker, job_id = %job.id, reason = %job.reason, "Publishing root folder hash");
        let started = Instant::now();

        match tokio::time::timeout(config.job_timeout, publish_root(store.as_ref(), &config)).await {
            Ok(Ok((root_hash, published))) => {
                let duration_ms = started.elapsed().as_millis() as u64;
                info!(
                    worker,
                    job_id = %job.id,
                    root_hash = %root_hash,
                    name = %published.name,
                    duration_ms,
                    "IPNS update success"
                );
                state.completed.fetch_add(1, Ordering::Relaxed);
                counter!("publish_jobs_total", "outcome" => "published").increment(1);
                *state
                    .last_published
                    .lock()
                    .unwrap_or_else(PoisonError::into_inner) = Some(PublishRecord {
                    job_id: job.id,
                    root_hash,
                    name: published.name,
                    value: published.value,
                    published_at: Utc::now(),
                    duration_ms,
                });
            }
            Ok(Err(e)) => {
                error!(worker, job_id = %job.id, error = %e, "IPNS update failed");
                state.failed.fetch_add(1, Ordering::Relaxed);
                counter!("publish_jobs_total", "outcome" => "failed").increment(1);
            }
            Err(_) => {
                error!(
                    worker,
                    job_id = %job.id,
                    timeout_secs = config.job_timeout.as_secs(),
                    "IPNS update timed out"
                );
                state.timed_out.fetch_add(1, Ordering::Relaxed);
                counter!("publish_jobs_total", "outcome" => "timed_out").increment(1);
            }
        }

        state.in_flight.fetch_sub(1, Ordering::Relaxed);
    }

    debug!(worker, "Publish worker stopped");
}

async fn publish_root(
    store: &dyn ContentStore,
    config: &PublishQueueConfig,
) -> StoreResult<(String, PublishedName)> {
    let root_hash = store.stat(&config.root).await?;
    let published = store.publish(&root_hash, &config.publish).await?;
    Ok((root_hash, published))
}
