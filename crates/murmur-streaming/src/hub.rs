use std::collections::HashMap;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::{RwLock, broadcast};
use tracing::trace;

use crate::publisher::{PublishBatch, Publisher};

/// Per-channel buffer; slow subscribers past this start lagging.
const CHANNEL_CAPACITY: usize = 256;

/// In-process pub/sub: one broadcast sender per channel name.
#[derive(Clone, Default)]
pub struct Hub {
    inner: Arc<HubInner>,
}

#[derive(Default)]
struct HubInner {
    /// channel name -> sender. Entries are created on first subscribe and
    /// dropped once the last receiver goes away.
    channels: RwLock<HashMap<String, broadcast::Sender<String>>>,
}

impl Hub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a channel. Only payloads published after this call
    /// are received.
    pub async fn subscribe(&self, channel: &str) -> broadcast::Receiver<String> {
        let mut channels = self.inner.channels.write().await;
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Number of live receivers on a channel.
    pub async fn subscriber_count(&self, channel: &str) -> usize {
        self.inner
            .channels
            .read()
            .await
            .get(channel)
            .map_or(0, |tx| tx.receiver_count())
    }

    /// Deliver to current subscribers of each channel. Returns how many
    /// receivers got a copy in total.
    async fn deliver(&self, batch: PublishBatch) -> usize {
        let mut delivered = 0;
        let mut abandoned = Vec::new();
        {
            let channels = self.inner.channels.read().await;
            for (channel, payload) in batch.into_messages() {
                let Some(tx) = channels.get(&channel) else {
                    continue;
                };
                match tx.send(payload) {
                    Ok(n) => delivered += n,
                    Err(_) => abandoned.push(channel),
                }
            }
        }

        if !abandoned.is_empty() {
            let mut channels = self.inner.channels.write().await;
            for channel in abandoned {
                if channels.get(&channel).is_some_and(|tx| tx.receiver_count() == 0) {
                    channels.remove(&channel);
                    trace!("Dropped idle channel {}", channel);
                }
            }
        }

        delivered
    }
}

#[async_trait]
impl Publisher for Hub {
    async fn publish_batch(&self, batch: PublishBatch) -> Result<()> {
        let count = batch.len();
        let delivered = self.deliver(batch).await;
        trace!("Published {} messages to {} local subscribers", count, delivered);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_subscribers_only_see_their_channel() {
        let hub = Hub::new();
        let mut local = hub.subscribe("timeline:public:local").await;
        let mut tag = hub.subscribe("timeline:hashtag:rust").await;

        let mut batch = PublishBatch::new();
        batch.publish("timeline:public:local", "one");
        batch.publish("timeline:hashtag:rust", "two");
        batch.publish("timeline:hashtag:nobody", "three");
        hub.publish_batch(batch).await.unwrap();

        assert_eq!(local.recv().await.unwrap(), "one");
        assert_eq!(tag.recv().await.unwrap(), "two");
        assert!(local.try_recv().is_err());
    }

    #[tokio::test]
    async fn test_idle_channels_are_dropped() {
        let hub = Hub::new();
        let rx = hub.subscribe("timeline:1").await;
        assert_eq!(hub.subscriber_count("timeline:1").await, 1);
        drop(rx);

        hub.publish("timeline:1", "x").await.unwrap();
        assert_eq!(hub.subscriber_count("timeline:1").await, 0);
        assert!(hub.inner.channels.read().await.is_empty());
    }

    #[tokio::test]
    async fn test_publish_without_subscribers_is_ok() {
        let hub = Hub::new();
        assert!(hub.publish("timeline:public:local", "x").await.is_ok());
    }
}
