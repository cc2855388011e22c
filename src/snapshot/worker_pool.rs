//! Fixed-size pool of backup workers fed by a bounded queue.
//!
//! `workers` long-lived threads drain a queue of capacity `queue_capacity`.
//! Submitting to a full queue blocks the caller, or with [`WorkerPool::submit_before`]
//! waits until a deadline and hands the job back as not queued. Each queued job
//! signals its completion channel exactly once, whatever happened inside it.
//!
//! The pool never grows or shrinks. Throughput is capped at `workers`
//! concurrent gateway listings for the lifetime of the pool. Dropping the pool
//! closes the queue and the workers exit once it is drained.

use crate::snapshot::artifact_store::BackupId;
use crate::snapshot::cancel::CancellationToken;
use crate::snapshot::fetch::{Fetcher, JobReport};
use crate::snapshot::kind::ResourceKind;
use crate::snapshot::result_error::error::Error;
use crate::snapshot::result_error::result::Result;
use bon::Builder;
use getset::CopyGetters;
use rayon::{ThreadPool, ThreadPoolBuilder};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::{self, AssertUnwindSafe};
use std::sync::mpsc::{Receiver, SendError, Sender, SyncSender, TrySendError, sync_channel};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};
use validator::Validate;

static SUBMIT_POLL_INTERVAL: Duration = Duration::from_millis(5);

#[derive(Clone, Debug, Serialize, Deserialize, Validate, Builder, CopyGetters, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
#[getset(get_copy = "pub")]
pub struct WorkerPoolConfig {
    #[validate(range(min = 1))]
    #[serde(default = "default_workers")]
    #[builder(default = default_workers())]
    workers: usize,
    #[validate(range(min = 1))]
    #[serde(default = "default_queue_capacity")]
    #[builder(default = default_queue_capacity())]
    queue_capacity: usize,
}

fn default_workers() -> usize {
    10
}

fn default_queue_capacity() -> usize {
    100
}

impl Default for WorkerPoolConfig {
    fn default() -> Self {
        Self::builder().build()
    }
}

/// One kind of one backup, fetched end to end by a single worker.
#[derive(Debug)]
pub struct BackupJob {
    pub kind: ResourceKind,
    pub backup_id: BackupId,
    pub namespace: String,
    pub cancel: CancellationToken,
    done: Sender<JobReport>,
}

impl BackupJob {
    pub fn new<S: Into<String>>(
        kind: ResourceKind,
        backup_id: BackupId,
        namespace: S,
        cancel: CancellationToken,
        done: Sender<JobReport>,
    ) -> Self {
        Self {
            kind,
            backup_id,
            namespace: namespace.into(),
            cancel,
            done,
        }
    }
}

pub struct WorkerPool {
    job_tx: SyncSender<BackupJob>,
    // held so the worker threads live as long as the pool
    _threads: ThreadPool,
}

impl WorkerPool {
    pub fn start(config: &WorkerPoolConfig, fetcher: Fetcher) -> Result<Self> {
        config.validate()?;

        let (job_tx, job_rx) = sync_channel::<BackupJob>(config.queue_capacity());
        let job_rx = Arc::new(Mutex::new(job_rx));
        let fetcher = Arc::new(fetcher);
        let threads = ThreadPoolBuilder::new()
            .num_threads(config.workers())
            .thread_name(|i| format!("backup-worker-{i}"))
            .build()?;
        threads.spawn_broadcast(move |ctx| worker_loop(ctx.index(), &job_rx, &fetcher));

        info!(
            workers = config.workers(),
            queue_capacity = config.queue_capacity(),
            "Started backup worker pool"
        );
        Ok(Self {
            job_tx,
            _threads: threads,
        })
    }

    /// Queues a job, blocking while the queue is full.
    pub fn submit(&self, job: BackupJob) -> Result<()> {
        self.job_tx.send(job).map_err(Error::from)
    }

    /// Queues a job unless the queue stays full until `deadline`. Returns
    /// `false` in that case, and the job is dropped without running.
    pub fn submit_before(&self, job: BackupJob, deadline: Instant) -> Result<bool> {
        let mut job = job;
        loop {
            match self.job_tx.try_send(job) {
                Ok(()) => return Ok(true),
                Err(TrySendError::Disconnected(job)) => return Err(Error::from(SendError(job))),
                Err(TrySendError::Full(back)) => {
                    let left = deadline.saturating_duration_since(Instant::now());
                    if left.is_zero() {
                        debug!(
                            kind = %back.kind,
                            backup_id = %back.backup_id,
                            "Queue still full at deadline"
                        );
                        return Ok(false);
                    }
                    job = back;
                    std::thread::sleep(left.min(SUBMIT_POLL_INTERVAL));
                }
            }
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "unknown panic".to_string())
}

fn worker_loop(worker: usize, jobs: &Mutex<Receiver<BackupJob>>, fetcher: &Fetcher) {
    debug!(worker, "Backup worker started");
    loop {
        let next = match jobs.lock() {
            Ok(rx) => rx.recv(),
            Err(_) => break,
        };
        let Ok(job) = next else {
            break;
        };

        let kind = job.kind;
        let report = panic::catch_unwind(AssertUnwindSafe(|| fetcher.fetch_and_store(&job)))
            .unwrap_or_else(|payload| {
                JobReport::failed(kind, Error::WorkerPanic(panic_message(payload.as_ref())))
            });

        for failure in &report.failures {
            warn!(
                worker,
                kind = %kind,
                backup_id = %job.backup_id,
                name = ?failure.name,
                "Backup job error: {}",
                failure.error
            );
        }
        info!(
            worker,
            kind = %kind,
            backup_id = %job.backup_id,
            stored = report.stored.len(),
            failed = report.failures.len(),
            "Backup job finished"
        );

        if job.done.send(report).is_err() {
            debug!(worker, kind = %kind, "Nobody is waiting for this job anymore");
        }
    }
    debug!(worker, "Backup worker stopped");
}
