//! In-process pub/sub broker: one `tokio::sync::broadcast` channel per
//! `integration:<service>` topic, grounded on `chronx-p2p::network::P2pNetwork`'s
//! handle-with-channels shape but with the libp2p gossipsub transport
//! replaced by an in-memory broadcaster (spec §4.3 calls for a shared
//! in-memory broker, not a network protocol).

use std::collections::HashMap;
use std::sync::RwLock;

use tokio::sync::broadcast;
use tracing::{debug, warn};

use crate::config::EventBusConfig;
use crate::message::EventEnvelope;

/// Shared in-memory broker. Cheap to clone — internally an `Arc`-free
/// `RwLock<HashMap>` of broadcast senders, one per channel name.
pub struct EventBus {
    config: EventBusConfig,
    channels: RwLock<HashMap<String, broadcast::Sender<EventEnvelope>>>,
}

impl EventBus {
    pub fn new(config: EventBusConfig) -> Self {
        Self {
            config,
            channels: RwLock::new(HashMap::new()),
        }
    }

    fn sender(&self, channel: &str) -> broadcast::Sender<EventEnvelope> {
        if let Some(tx) = self.channels.read().unwrap().get(channel) {
            return tx.clone();
        }
        let mut channels = self.channels.write().unwrap();
        channels
            .entry(channel.to_string())
            .or_insert_with(|| broadcast::channel(self.config.channel_capacity).0)
            .clone()
    }

    /// Publish `envelope` to `channel`. At-most-once delivery: subscribers
    /// that join after this call never see it, and a subscriber lagging
    /// more than `channel_capacity` events behind silently drops the
    /// oldest ones (`RecvError::Lagged`, surfaced to the caller of `recv`).
    pub fn publish(&self, channel: &str, envelope: EventEnvelope) {
        let tx = self.sender(channel);
        // No receivers yet is not an error: events are fire-and-forget.
        let _ = tx.send(envelope);
    }

    pub fn subscribe(&self, channel: &str) -> broadcast::Receiver<EventEnvelope> {
        self.sender(channel).subscribe()
    }

    /// Spawn a task that drives `handler` for every event received on
    /// `channel`. A handler panic is caught so it cannot bring down the
    /// subscriber task or affect any other subscriber/the publisher.
    pub fn subscribe_with_handler<F>(&self, channel: &str, mut handler: F)
    where
        F: FnMut(EventEnvelope) + Send + 'static,
    {
        let mut rx = self.subscribe(channel);
        let channel = channel.to_string();
        tokio::spawn(async move {
            loop {
                match rx.recv().await {
                    Ok(envelope) => {
                        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                            handler(envelope)
                        }));
                        if result.is_err() {
                            warn!(channel = %channel, "event handler panicked");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        debug!(channel = %channel, skipped, "subscriber lagged, dropping oldest events");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(EventBusConfig::default())
    }
}
