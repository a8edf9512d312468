// src/core/pubsub.rs

//! The in-process pub/sub bus used to wake blocked `XREAD` readers.
//!
//! Scope is intentionally narrow (spec §4.5): there is exactly one well-known
//! topic, `"xread"`, carrying `"<streamKey>_<id>"` messages whenever an
//! `XADD` succeeds. There is no wildcard matching and no wire-level
//! PUBLISH/SUBSCRIBE surface (that is Redis's own pub/sub, out of scope here).
//!
//! `tokio::sync::broadcast` gives exactly the delivery semantics §4.5 asks
//! for for free: `Sender::send` never blocks the publisher, and a subscriber
//! that falls behind simply loses the oldest buffered messages (observed as
//! `RecvError::Lagged`) rather than stalling `XADD`.

use dashmap::DashMap;
use tokio::sync::broadcast::{self, Receiver, Sender};

const TOPIC_CHANNEL_CAPACITY: usize = 256;

pub const XREAD_TOPIC: &str = "xread";

#[derive(Debug, Clone)]
pub struct PubSubMessage {
    pub topic: String,
    pub message: String,
}

#[derive(Debug, Default)]
pub struct PubSubBus {
    topics: DashMap<String, Sender<PubSubMessage>>,
}

impl PubSubBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes to a topic, returning a receiver for every future message
    /// published to it. The topic is created lazily on first subscribe.
    pub fn subscribe(&self, topic: &str) -> Receiver<PubSubMessage> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CHANNEL_CAPACITY).0)
            .subscribe()
    }

    /// Publishes a message to every current subscriber of `topic`. A no-op if
    /// nobody is subscribed (the sender still exists as long as any receiver
    /// does, by `broadcast`'s own bookkeeping).
    pub fn publish(&self, topic: &str, message: String) {
        if let Some(sender) = self.topics.get(topic) {
            let _ = sender.send(PubSubMessage {
                topic: topic.to_string(),
                message,
            });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn publish_wakes_subscriber() {
        let bus = PubSubBus::new();
        let mut rx = bus.subscribe(XREAD_TOPIC);
        bus.publish(XREAD_TOPIC, "mystream_1-0".to_string());
        let msg = rx.recv().await.unwrap();
        assert_eq!(msg.message, "mystream_1-0");
    }

    #[tokio::test]
    async fn publish_with_no_subscribers_is_a_noop() {
        let bus = PubSubBus::new();
        bus.publish(XREAD_TOPIC, "nobody_listening".to_string());
    }
}
