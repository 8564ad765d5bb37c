use murmur_types::models::StatusId;

#[derive(Debug, thiserror::Error)]
pub enum RemovalError {
    /// The status no longer exists. Expected under redelivery and
    /// concurrent deletes.
    #[error("status {0} not found")]
    NotFound(StatusId),

    #[error("invalid removal options: {0}")]
    InvalidOptions(String),

    /// Lookup or destroy failed for a reason other than absence.
    #[error("persistence failure: {0:#}")]
    Persistence(#[from] anyhow::Error),
}

impl RemovalError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}
