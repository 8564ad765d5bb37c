use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use rand::Rng;
use rusqlite::{Connection, params};
use serde::{Deserialize, Serialize};
use tokio::sync::Notify;
use tracing::{debug, info};
use uuid::Uuid;

use murmur_types::models::StatusId;

const STATE_PENDING: i64 = 0;
const STATE_RUNNING: i64 = 1;
const STATE_DEAD: i64 = 2;

#[derive(Clone, Copy, Debug)]
pub struct QueueSettings {
    pub max_attempts: u32,
    pub base_backoff_secs: u64,
    pub max_backoff_secs: u64,
    /// How long a claimed job stays invisible to other workers. A worker
    /// that dies mid-job loses its lease and the job is delivered again.
    pub lease: Duration,
    pub batch_size: u32,
}

impl Default for QueueSettings {
    fn default() -> Self {
        Self {
            max_attempts: 10,
            base_backoff_secs: 5,
            max_backoff_secs: 3600,
            lease: Duration::from_secs(300),
            batch_size: 20,
        }
    }
}

/// Job payload: a status to remove and the options mapping forwarded to
/// the removal path untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemovalJob {
    pub status_id: StatusId,
    #[serde(default)]
    pub options: serde_json::Value,
}

#[derive(Debug, Clone)]
pub struct QueuedJob {
    pub id: Uuid,
    /// 1 on first delivery.
    pub attempt: u32,
    pub job: RemovalJob,
}

#[derive(Debug, Clone, Serialize)]
pub struct DeadJob {
    pub id: Uuid,
    pub status_id: StatusId,
    pub attempt: u32,
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureOutcome {
    Retrying(Duration),
    Dead,
}

/// Durable removal queue with at-least-once delivery.
#[derive(Clone)]
pub struct JobQueue {
    inner: Arc<QueueInner>,
}

struct QueueInner {
    conn: Mutex<Connection>,
    notify: Notify,
}

impl JobQueue {
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path).with_context(|| format!("open queue db: {}", path.display()))?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        let queue = Self::init(conn)?;
        info!("Job queue opened at {}", path.display());
        Ok(queue)
    }

    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?)
    }

    fn init(conn: Connection) -> Result<Self> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS removal_jobs (
              id TEXT PRIMARY KEY,
              status_id INTEGER NOT NULL,
              options TEXT NOT NULL,
              attempt INTEGER NOT NULL DEFAULT 0,
              state INTEGER NOT NULL DEFAULT 0,
              created_at_ms INTEGER NOT NULL,
              next_attempt_at_ms INTEGER NOT NULL,
              locked_until_ms INTEGER NULL,
              last_error TEXT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_removal_jobs_due ON removal_jobs(state, next_attempt_at_ms);
            "#,
        )?;
        Ok(Self {
            inner: Arc::new(QueueInner {
                conn: Mutex::new(conn),
                notify: Notify::new(),
            }),
        })
    }

    async fn blocking<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let inner = self.inner.clone();
        tokio::task::spawn_blocking(move || {
            let mut conn = inner
                .conn
                .lock()
                .map_err(|e| anyhow::anyhow!("Queue lock poisoned: {}", e))?;
            f(&mut conn)
        })
        .await?
    }

    pub async fn enqueue(&self, job: RemovalJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        let options = serde_json::to_string(&job.options)?;
        let now = now_ms();
        self.blocking(move |conn| {
            conn.execute(
                r#"
                INSERT INTO removal_jobs (id, status_id, options, created_at_ms, next_attempt_at_ms)
                VALUES (?1, ?2, ?3, ?4, ?4)
                "#,
                params![id.to_string(), job.status_id.0, options, now],
            )?;
            Ok(())
        })
        .await?;

        debug!("Enqueued removal of status {} as job {}", job.status_id, id);
        self.inner.notify.notify_one();
        Ok(id)
    }

    /// Wait until something is enqueued.
    pub async fn notified(&self) {
        self.inner.notify.notified().await
    }

    /// Claim up to `limit` due jobs: pending jobs whose backoff has passed
    /// and running jobs whose lease has expired. Claiming bumps the attempt
    /// counter and takes a fresh lease.
    pub async fn claim(&self, limit: u32, lease: Duration) -> Result<Vec<QueuedJob>> {
        let now = now_ms();
        let locked_until = now.saturating_add(lease.as_millis() as i64);
        self.blocking(move |conn| {
            let tx = conn.transaction()?;
            let rows = {
                let mut stmt = tx.prepare(
                    r#"
                    SELECT id, status_id, options, attempt
                    FROM removal_jobs
                    WHERE (state = ?1 AND next_attempt_at_ms <= ?3)
                       OR (state = ?2 AND locked_until_ms <= ?3)
                    ORDER BY next_attempt_at_ms ASC
                    LIMIT ?4
                    "#,
                )?;
                stmt.query_map(params![STATE_PENDING, STATE_RUNNING, now, limit], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?
            };

            let mut jobs = Vec::with_capacity(rows.len());
            for (id, status_id, options, attempt) in rows {
                tx.execute(
                    "UPDATE removal_jobs SET state = ?2, attempt = attempt + 1, locked_until_ms = ?3 WHERE id = ?1",
                    params![id, STATE_RUNNING, locked_until],
                )?;
                jobs.push(QueuedJob {
                    id: id.parse().with_context(|| format!("corrupt job id '{}'", id))?,
                    attempt: attempt + 1,
                    job: RemovalJob {
                        status_id: StatusId(status_id),
                        options: serde_json::from_str(&options)
                            .with_context(|| format!("corrupt options on job {}", id))?,
                    },
                });
            }
            tx.commit()?;
            Ok(jobs)
        })
        .await
    }

    /// Job finished (including the "already gone" case): forget it.
    pub async fn complete(&self, id: Uuid) -> Result<()> {
        self.blocking(move |conn| {
            conn.execute("DELETE FROM removal_jobs WHERE id = ?1", [id.to_string()])?;
            Ok(())
        })
        .await
    }

    /// Record a failed attempt: reschedule with backoff, or move the job to
    /// the dead set once `max_attempts` is reached.
    pub async fn fail(&self, job: &QueuedJob, error: &str, settings: &QueueSettings) -> Result<FailureOutcome> {
        if job.attempt >= settings.max_attempts {
            self.mark_dead(job.id, error).await?;
            return Ok(FailureOutcome::Dead);
        }

        let delay = next_backoff(job.attempt, settings.base_backoff_secs, settings.max_backoff_secs);
        let next = now_ms().saturating_add(delay.as_millis() as i64);
        let id = job.id.to_string();
        let error = error.to_string();
        self.blocking(move |conn| {
            conn.execute(
                r#"
                UPDATE removal_jobs
                SET state = ?2, next_attempt_at_ms = ?3, locked_until_ms = NULL, last_error = ?4
                WHERE id = ?1
                "#,
                params![id, STATE_PENDING, next, error],
            )?;
            Ok(())
        })
        .await?;
        Ok(FailureOutcome::Retrying(delay))
    }

    pub async fn mark_dead(&self, id: Uuid, error: &str) -> Result<()> {
        let error = error.to_string();
        self.blocking(move |conn| {
            conn.execute(
                "UPDATE removal_jobs SET state = ?2, locked_until_ms = NULL, last_error = ?3 WHERE id = ?1",
                params![id.to_string(), STATE_DEAD, error],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn dead_jobs(&self) -> Result<Vec<DeadJob>> {
        self.blocking(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, status_id, attempt, last_error FROM removal_jobs WHERE state = ?1 ORDER BY created_at_ms",
            )?;
            let rows = stmt
                .query_map([STATE_DEAD], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, i64>(1)?,
                        row.get::<_, u32>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            rows.into_iter()
                .map(|(id, status_id, attempt, last_error)| {
                    Ok(DeadJob {
                        id: id.parse().with_context(|| format!("corrupt job id '{}'", id))?,
                        status_id: StatusId(status_id),
                        attempt,
                        last_error,
                    })
                })
                .collect()
        })
        .await
    }

    /// Put a dead job back in line with a fresh attempt budget.
    pub async fn retry_dead(&self, id: Uuid) -> Result<bool> {
        let now = now_ms();
        let changed = self
            .blocking(move |conn| {
                Ok(conn.execute(
                    r#"
                    UPDATE removal_jobs SET state = ?2, attempt = 0, next_attempt_at_ms = ?3
                    WHERE id = ?1 AND state = ?4
                    "#,
                    params![id.to_string(), STATE_PENDING, now, STATE_DEAD],
                )?)
            })
            .await?;

        if changed > 0 {
            self.inner.notify.notify_one();
        }
        Ok(changed > 0)
    }

    /// Jobs not yet dead, running ones included.
    pub async fn pending_count(&self) -> Result<u64> {
        self.blocking(|conn| {
            Ok(conn.query_row(
                "SELECT COUNT(*) FROM removal_jobs WHERE state != ?1",
                [STATE_DEAD],
                |r| r.get(0),
            )?)
        })
        .await
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

fn next_backoff(attempt: u32, base_secs: u64, max_secs: u64) -> Duration {
    let pow = attempt.saturating_sub(1).min(20);
    let secs = base_secs.saturating_mul(1u64 << pow).min(max_secs);
    let jitter_ms = rand::rng().random_range(0..1000u64);
    Duration::from_secs(secs) + Duration::from_millis(jitter_ms)
}
