use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use redis::aio::ConnectionManager;
use tracing::{info, warn};

use crate::hub::Hub;
use crate::publisher::{PublishBatch, Publisher};

/// Publishes over Redis PUBLISH so that streaming servers in other
/// processes can relay events. Each batch is sent as one pipeline.
#[derive(Clone)]
pub struct RedisPublisher {
    conn: ConnectionManager,
    prefix: String,
}

impl RedisPublisher {
    pub async fn connect(url: &str, prefix: impl Into<String>) -> Result<Self> {
        let client = redis::Client::open(url).context("invalid redis url")?;
        let conn = ConnectionManager::new(client).await.context("redis connect failed")?;

        info!("Redis publisher connected");
        Ok(Self {
            conn,
            prefix: prefix.into(),
        })
    }

    fn channel_key(&self, channel: &str) -> String {
        format!("{}{}", self.prefix, channel)
    }
}

#[async_trait]
impl Publisher for RedisPublisher {
    async fn publish_batch(&self, batch: PublishBatch) -> Result<()> {
        if batch.is_empty() {
            return Ok(());
        }

        let mut pipe = redis::pipe();
        for (channel, payload) in batch.iter() {
            pipe.cmd("PUBLISH").arg(self.channel_key(channel)).arg(payload).ignore();
        }

        let mut conn = self.conn.clone();
        pipe.query_async::<()>(&mut conn)
            .await
            .with_context(|| format!("redis pipeline of {} publishes failed", batch.len()))?;
        Ok(())
    }
}

/// Forward every Redis message on `<prefix>timeline:*` into the local hub,
/// so WebSocket subscribers on this process see publishes from any
/// process. Returns when the subscription stream ends.
pub async fn relay_to_hub(url: &str, prefix: &str, hub: Hub) -> Result<()> {
    let client = redis::Client::open(url).context("invalid redis url")?;
    let mut pubsub = client.get_async_pubsub().await.context("redis pubsub connect failed")?;
    let pattern = format!("{}timeline:*", prefix);
    pubsub.psubscribe(&pattern).await?;

    info!("Relaying {} from redis into local hub", pattern);

    let mut messages = pubsub.on_message();
    while let Some(msg) = messages.next().await {
        let channel = msg.get_channel_name();
        let Some(channel) = channel.strip_prefix(prefix) else {
            continue;
        };
        let payload: String = match msg.get_payload() {
            Ok(payload) => payload,
            Err(e) => {
                warn!("Dropping non-text payload on {}: {}", channel, e);
                continue;
            }
        };
        hub.publish(channel, &payload).await?;
    }

    warn!("Redis relay stream ended");
    Ok(())
}
