use anyhow::Result;
use async_trait::async_trait;

/// A group of publishes sent to the transport in one round trip.
///
/// Grouping is only a transport optimisation: every entry is still
/// delivered on its own to whoever subscribes to that channel when it
/// is published.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishBatch {
    messages: Vec<(String, String)>,
}

impl PublishBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&mut self, channel: impl Into<String>, payload: impl Into<String>) -> &mut Self {
        self.messages.push((channel.into(), payload.into()));
        self
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.messages.iter().map(|(c, p)| (c.as_str(), p.as_str()))
    }

    pub fn into_messages(self) -> Vec<(String, String)> {
        self.messages
    }
}

/// Fire-and-forget channel transport.
///
/// Delivery is best effort: there is no persistence and no
/// acknowledgement. An `Err` means the transport itself failed; callers
/// decide whether that matters.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish_batch(&self, batch: PublishBatch) -> Result<()>;

    async fn publish(&self, channel: &str, payload: &str) -> Result<()> {
        let mut batch = PublishBatch::new();
        batch.publish(channel, payload);
        self.publish_batch(batch).await
    }
}
