use std::collections::BTreeSet;

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

use murmur_types::models::{Account, StatusId, Visibility};

/// What outbound federation needs to know about a destroyed local status.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemovedStatus {
    pub id: StatusId,
    pub account: Account,
    pub visibility: Visibility,
    pub reblog_of_id: Option<StatusId>,
    pub mentions: Vec<Account>,
}

impl RemovedStatus {
    /// Remote domains that must hear about the delete because an account
    /// there was mentioned. Each domain appears once.
    pub fn mentioned_domains(&self) -> Vec<String> {
        self.mentions
            .iter()
            .filter_map(|a| a.domain.clone())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }
}

/// Side-effect hook into outbound federation delivery.
///
/// Called once per destroyed local status. Implementations should only
/// enqueue work; a returned error is logged and does not fail the removal.
#[async_trait]
pub trait FederationHook: Send + Sync {
    async fn status_removed(&self, status: &RemovedStatus) -> Result<()>;
}

pub struct NoopFederation;

#[async_trait]
impl FederationHook for NoopFederation {
    async fn status_removed(&self, _status: &RemovedStatus) -> Result<()> {
        Ok(())
    }
}

/// Stand-in for a delivery queue: logs one delete per mentioned remote
/// domain.
pub struct LoggingFederation;

#[async_trait]
impl FederationHook for LoggingFederation {
    async fn status_removed(&self, status: &RemovedStatus) -> Result<()> {
        for domain in status.mentioned_domains() {
            info!("Delete of status {} by {} addressed to {}", status.id, status.account.acct(), domain);
        }
        Ok(())
    }
}
