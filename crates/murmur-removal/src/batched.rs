use std::sync::Arc;

use tracing::{debug, info, warn};

use murmur_db::Database;
use murmur_streaming::{PublishBatch, Publisher};
use murmur_types::api::RemoveOptions;
use murmur_types::models::StatusId;
use murmur_types::timeline;

use crate::aggregate::{Entry, WorkingSet};
use crate::blocking;
use crate::error::RemovalError;
use crate::federation::{FederationHook, RemovedStatus};
use crate::remove::push_account_streams;

/// Which removal path is running. The single-status path keeps per-row
/// counters and also retracts the status from account streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum RemovalPath {
    Batch,
    Single,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemovalReport {
    /// Statuses this call destroyed, reblogs included.
    pub destroyed: Vec<StatusId>,
    /// Channel publishes the transport accepted.
    pub published: usize,
}

/// Removes statuses and their reblogs in one pass, then retracts them from
/// public streaming timelines.
///
/// The protocol has three phases over a [`WorkingSet`]:
/// 1. read: resolve statuses and reblogs, capture mentions, tags and the
///    serialized delete event while the rows still exist;
/// 2. destroy: one store transaction with the mass-destruction hint set;
/// 3. fan out: per status, one pipelined batch to every public channel it
///    belongs to.
///
/// Nothing is published before every row in the batch is gone.
#[derive(Clone)]
pub struct BatchedRemoveStatusService {
    db: Arc<Database>,
    publisher: Arc<dyn Publisher>,
    federation: Arc<dyn FederationHook>,
}

impl BatchedRemoveStatusService {
    pub fn new(
        db: Arc<Database>,
        publisher: Arc<dyn Publisher>,
        federation: Arc<dyn FederationHook>,
    ) -> Self {
        Self {
            db,
            publisher,
            federation,
        }
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub async fn call(&self, ids: &[StatusId], options: RemoveOptions) -> Result<RemovalReport, RemovalError> {
        self.execute(ids, RemovalPath::Batch, options).await
    }

    /// Shared by the batch and single-status paths.
    pub(crate) async fn execute(
        &self,
        ids: &[StatusId],
        path: RemovalPath,
        options: RemoveOptions,
    ) -> Result<RemovalReport, RemovalError> {
        let requested = ids.to_vec();
        let mut working_set = blocking(&self.db, move |db| WorkingSet::load(db, &requested)).await?;

        if working_set.is_empty() {
            debug!("Nothing to remove for {} requested statuses", ids.len());
            return Ok(RemovalReport::default());
        }

        if path == RemovalPath::Batch {
            working_set.mark_for_mass_destruction();
        }

        let statuses = working_set.statuses();
        let destroyed = blocking(&self.db, move |db| db.destroy_statuses(&statuses)).await?;
        if destroyed.len() < working_set.len() {
            debug!(
                "{} of {} statuses were already gone before destroy",
                working_set.len() - destroyed.len(),
                working_set.len()
            );
        }
        working_set.retain_destroyed(&destroyed);

        let mut report = RemovalReport {
            destroyed,
            published: 0,
        };

        if options.skip_side_effects {
            info!("Removed {} statuses without side effects", report.destroyed.len());
            return Ok(report);
        }

        // Cannot be batched across statuses
        for entry in working_set.iter() {
            let mut batch = public_timelines_batch(entry);
            if path == RemovalPath::Single {
                push_account_streams(&mut batch, entry);
            }
            report.published += self.publish(entry.status.id, batch).await;
        }

        for entry in working_set.iter().filter(|e| e.status.local) {
            self.notify_federation(entry).await;
        }

        info!(
            "Removed {} statuses, {} channel publishes",
            report.destroyed.len(),
            report.published
        );
        Ok(report)
    }

    /// Send one status's batch. Transport failures are logged and counted
    /// as zero publishes; the removal itself already succeeded.
    async fn publish(&self, id: StatusId, batch: PublishBatch) -> usize {
        if batch.is_empty() {
            return 0;
        }

        let count = batch.len();
        match self.publisher.publish_batch(batch).await {
            Ok(()) => count,
            Err(e) => {
                warn!("Failed to publish delete of status {} to {} channels: {:#}", id, count, e);
                0
            }
        }
    }

    async fn notify_federation(&self, entry: &Entry) {
        let removed = RemovedStatus {
            id: entry.status.id,
            account: entry.status.account.clone(),
            visibility: entry.status.visibility,
            reblog_of_id: entry.status.reblog_of_id,
            mentions: entry.mentions.clone(),
        };

        if let Err(e) = self.federation.status_removed(&removed).await {
            warn!("Federation hook failed for status {}: {:#}", entry.status.id, e);
        }
    }
}

/// Deletes for every public timeline the status is on. Empty for
/// statuses that never left their author's followers.
fn public_timelines_batch(entry: &Entry) -> PublishBatch {
    let mut batch = PublishBatch::new();
    for channel in timeline::public_channels(&entry.status, &entry.tags) {
        batch.publish(channel, entry.payload.as_str());
    }
    batch
}
