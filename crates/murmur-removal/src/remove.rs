use murmur_streaming::PublishBatch;
use murmur_types::api::RemoveOptions;
use murmur_types::models::{Status, Visibility};
use murmur_types::timeline;

use crate::aggregate::Entry;
use crate::batched::{BatchedRemoveStatusService, RemovalPath, RemovalReport};
use crate::error::RemovalError;

/// Full removal of a single status: the batch path for one status and its
/// reblogs, without the mass-destruction hint so author and reblog
/// counters are maintained, plus the per-account stream updates. Every
/// publish for one status still goes out as a single batch.
#[derive(Clone)]
pub struct RemoveStatusService {
    batch: BatchedRemoveStatusService,
}

impl RemoveStatusService {
    pub fn new(batch: BatchedRemoveStatusService) -> Self {
        Self { batch }
    }

    pub fn batch(&self) -> &BatchedRemoveStatusService {
        &self.batch
    }

    /// Fails with `NotFound` when nothing was left to destroy.
    pub async fn call(&self, status: &Status, options: RemoveOptions) -> Result<RemovalReport, RemovalError> {
        let report = self.batch.execute(&[status.id], RemovalPath::Single, options).await?;

        if report.destroyed.is_empty() {
            return Err(RemovalError::NotFound(status.id));
        }

        Ok(report)
    }
}

/// Deletes for the author's own stream and, for direct messages, the
/// direct streams of the author and every local recipient.
pub(crate) fn push_account_streams(batch: &mut PublishBatch, entry: &Entry) {
    let author = &entry.status.account;

    if author.is_local() {
        batch.publish(timeline::user(author.id), entry.payload.as_str());
    }

    if entry.status.visibility == Visibility::Direct {
        if author.is_local() {
            batch.publish(timeline::direct(author.id), entry.payload.as_str());
        }
        for mentioned in entry.mentions.iter().filter(|a| a.is_local()) {
            batch.publish(timeline::direct(mentioned.id), entry.payload.as_str());
        }
    }
}
