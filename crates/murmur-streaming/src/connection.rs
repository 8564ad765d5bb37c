use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, info, warn};

use crate::hub::Hub;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Relay every payload published on `channel` to a WebSocket client
/// until either side goes away.
pub async fn handle_subscription(socket: WebSocket, hub: Hub, channel: String) {
    let (mut sender, mut receiver) = socket.split();
    let mut channel_rx = hub.subscribe(&channel).await;

    info!("Streaming client subscribed to {}", channel);

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    let send_channel = channel.clone();
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                result = channel_rx.recv() => {
                    let payload = match result {
                        Ok(payload) => payload,
                        Err(RecvError::Lagged(n)) => {
                            warn!("Subscriber on {} lagged by {} messages", send_channel, n);
                            continue;
                        }
                        Err(RecvError::Closed) => break,
                    };

                    if sender.send(Message::Text(payload.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(vec![].into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Subscribers are read-only; only control frames matter here
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Pong(_) => pong_flag_recv.store(true, Ordering::Release),
                Message::Close(_) => break,
                other => debug!("Ignoring client frame: {:?}", other),
            }
        }
    });

    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    info!("Streaming client left {}", channel);
}

/// Public channels an unauthenticated client may subscribe to. Per-account
/// streams need authorization, which lives in front of this server.
pub fn is_streamable_channel(channel: &str) -> bool {
    (channel.starts_with("timeline:public:") || channel.starts_with("timeline:hashtag:"))
        && channel.len() <= 256
        && !channel.chars().any(char::is_whitespace)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_streamable_channels() {
        assert!(is_streamable_channel("timeline:public:local"));
        assert!(is_streamable_channel("timeline:hashtag:rust:local"));
        assert!(!is_streamable_channel("timeline:42"));
        assert!(!is_streamable_channel("jobs:removal"));
        assert!(!is_streamable_channel("timeline:hashtag:two words"));
    }
}
