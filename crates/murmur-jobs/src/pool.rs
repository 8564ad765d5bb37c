use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use murmur_removal::RemovalError;

use crate::queue::{FailureOutcome, JobQueue, QueueSettings, QueuedJob};
use crate::worker::RemovalWorker;

/// Idle workers poll at least this often, even without a wakeup.
const IDLE_TICK: Duration = Duration::from_secs(2);

/// Runs removal jobs from the queue on a fixed number of tasks.
#[derive(Clone)]
pub struct WorkerPool {
    inner: Arc<PoolInner>,
}

struct PoolInner {
    queue: JobQueue,
    worker: RemovalWorker,
    settings: QueueSettings,
}

impl WorkerPool {
    pub fn new(queue: JobQueue, worker: RemovalWorker, settings: QueueSettings) -> Self {
        Self {
            inner: Arc::new(PoolInner {
                queue,
                worker,
                settings,
            }),
        }
    }

    pub fn spawn(&self, workers: usize, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        info!("Starting {} removal workers", workers.max(1));
        (0..workers.max(1))
            .map(|idx| {
                let pool = self.clone();
                let shutdown = shutdown.clone();
                tokio::spawn(async move { pool.run_loop(idx, shutdown).await })
            })
            .collect()
    }

    async fn run_loop(&self, idx: usize, mut shutdown: watch::Receiver<bool>) {
        loop {
            if *shutdown.borrow() {
                break;
            }

            let idle = match self.run_once().await {
                Ok(ran) => ran == 0,
                Err(e) => {
                    warn!("Removal worker {} queue error: {:#}", idx, e);
                    true
                }
            };

            if idle {
                tokio::select! {
                    _ = self.inner.queue.notified() => {}
                    _ = tokio::time::sleep(IDLE_TICK) => {}
                    _ = shutdown.changed() => {}
                }
            }
        }

        info!("Removal worker {} shut down", idx);
    }

    /// Claim one batch of due jobs and run them. Returns how many ran.
    pub async fn run_once(&self) -> Result<usize> {
        let settings = &self.inner.settings;
        let jobs = self.inner.queue.claim(settings.batch_size, settings.lease).await?;
        let count = jobs.len();

        for job in jobs {
            self.process(job).await?;
        }

        Ok(count)
    }

    async fn process(&self, job: QueuedJob) -> Result<()> {
        let queue = &self.inner.queue;
        let result = self
            .inner
            .worker
            .perform(job.job.status_id, &job.job.options)
            .await;

        match result {
            Ok(()) => queue.complete(job.id).await,
            Err(RemovalError::InvalidOptions(reason)) => {
                // Retrying cannot fix a malformed job
                error!("Removal job {} rejected: {}", job.id, reason);
                queue.mark_dead(job.id, &reason).await
            }
            Err(e) => {
                let message = e.to_string();
                match queue.fail(&job, &message, &self.inner.settings).await? {
                    FailureOutcome::Retrying(delay) => {
                        warn!(
                            "Removal job {} (status {}) attempt {} failed, retrying in {:?}: {}",
                            job.id, job.job.status_id, job.attempt, delay, message
                        );
                    }
                    FailureOutcome::Dead => {
                        error!(
                            "Removal job {} (status {}) gave up after {} attempts: {}",
                            job.id, job.job.status_id, job.attempt, message
                        );
                    }
                }
                Ok(())
            }
        }
    }
}
