pub mod aggregate;
pub mod batched;
pub mod error;
pub mod federation;
pub mod remove;

use std::sync::Arc;

use murmur_db::Database;

pub use batched::{BatchedRemoveStatusService, RemovalReport};
pub use error::RemovalError;
pub use federation::{FederationHook, LoggingFederation, NoopFederation, RemovedStatus};
pub use remove::RemoveStatusService;

/// Run a blocking store call off the async runtime.
pub(crate) async fn blocking<F, T>(db: &Arc<Database>, f: F) -> Result<T, RemovalError>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let db = db.clone();
    tokio::task::spawn_blocking(move || f(&db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
        .map_err(RemovalError::Persistence)
}
