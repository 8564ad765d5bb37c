use std::sync::Mutex;

use anyhow::{Result, bail};
use async_trait::async_trait;

use crate::publisher::{PublishBatch, Publisher};

/// Records every batch it is handed.
#[derive(Default)]
pub struct RecordingPublisher {
    batches: Mutex<Vec<PublishBatch>>,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn batches(&self) -> Vec<PublishBatch> {
        self.batches.lock().expect("recorder lock poisoned").clone()
    }

    /// All (channel, payload) pairs in publish order.
    pub fn messages(&self) -> Vec<(String, String)> {
        self.batches().into_iter().flat_map(PublishBatch::into_messages).collect()
    }

    pub fn channels(&self) -> Vec<String> {
        self.messages().into_iter().map(|(channel, _)| channel).collect()
    }

    pub fn publish_count(&self) -> usize {
        self.messages().len()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish_batch(&self, batch: PublishBatch) -> Result<()> {
        self.batches.lock().expect("recorder lock poisoned").push(batch);
        Ok(())
    }
}

/// A transport that is always down.
#[derive(Default)]
pub struct FailingPublisher;

#[async_trait]
impl Publisher for FailingPublisher {
    async fn publish_batch(&self, _batch: PublishBatch) -> Result<()> {
        bail!("transport unavailable")
    }
}
