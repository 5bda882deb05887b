//! Named outbound topics
//!
//! Producers publish field updates by topic name ("chassis", …); every
//! [`Sender`](crate::Sender) subscribed to that topic writes them out.

use std::collections::HashMap;

use parking_lot::RwLock;
use testbed_core::FieldUpdate;
use tokio::sync::broadcast;

const TOPIC_CAPACITY: usize = 64;

#[derive(Debug, Default)]
pub struct TopicHub {
    topics: RwLock<HashMap<String, broadcast::Sender<Vec<FieldUpdate>>>>,
}

impl TopicHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to a topic, creating it if needed
    pub fn subscribe(&self, topic: &str) -> broadcast::Receiver<Vec<FieldUpdate>> {
        if let Some(tx) = self.topics.read().get(topic) {
            return tx.subscribe();
        }
        self.topics
            .write()
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(TOPIC_CAPACITY).0)
            .subscribe()
    }

    /// Publish one update set; returns how many subscribers received it
    pub fn publish(&self, topic: &str, updates: Vec<FieldUpdate>) -> usize {
        let topics = self.topics.read();
        match topics.get(topic) {
            Some(tx) => tx.send(updates).unwrap_or(0),
            None => 0,
        }
    }

    pub fn subscriber_count(&self, topic: &str) -> usize {
        self.topics
            .read()
            .get(topic)
            .map(|tx| tx.receiver_count())
            .unwrap_or(0)
    }
}
