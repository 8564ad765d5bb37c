use tracing::debug;

use murmur_removal::{RemovalError, RemoveStatusService};
use murmur_types::api::RemoveOptions;
use murmur_types::models::StatusId;

/// Deferred removal of a single status.
///
/// Jobs may run more than once, so a status that is already gone is a
/// success: a concurrent delete or an earlier delivery of this same job
/// got there first.
#[derive(Clone)]
pub struct RemovalWorker {
    remove: RemoveStatusService,
}

impl RemovalWorker {
    pub fn new(remove: RemoveStatusService) -> Self {
        Self { remove }
    }

    pub async fn perform(&self, status_id: StatusId, options: &serde_json::Value) -> Result<(), RemovalError> {
        let options = RemoveOptions::from_value(options).map_err(RemovalError::InvalidOptions)?;

        let db = self.remove.batch().db().clone();
        let status = tokio::task::spawn_blocking(move || db.find_status(status_id))
            .await
            .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

        let Some(status) = status else {
            debug!("Status {} already removed, nothing to do", status_id);
            return Ok(());
        };

        match self.remove.call(&status, options).await {
            Ok(report) => {
                debug!(
                    "Removed status {} ({} records, {} publishes)",
                    status_id,
                    report.destroyed.len(),
                    report.published
                );
                Ok(())
            }
            Err(RemovalError::NotFound(_)) => {
                debug!("Status {} removed concurrently, nothing to do", status_id);
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}
