//! Update notifications. Subscribers learn that a key changed, never the data.

use std::collections::HashMap;
use std::fmt::Debug;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::consent::Operation;
use crate::error::Error;
use crate::key::DDHKey;
use crate::principal::Principal;
use crate::transaction::TrxId;

pub const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UpdateEvent {
    pub topic: String,
    pub key: DDHKey,
    pub op: Operation,
    pub principal: Principal,
    pub trx: TrxId,
    pub time: DateTime<Utc>,
}

/// `<fork>:<path>` of the key, ignoring variant and version
pub fn topic_for(key: &DDHKey) -> String {
    format!("{}:{}", key.fork(), key.without_facets().ensure_rooted())
}

#[async_trait]
pub trait PubSub: Send + Sync + Debug + 'static {
    /// Returns the number of subscribers reached
    async fn publish(&self, event: UpdateEvent) -> Result<usize, Error>;

    async fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<UpdateEvent>, Error>;
}

#[derive(Debug)]
pub struct MemoryPubSub {
    capacity: usize,
    topics: Mutex<HashMap<String, broadcast::Sender<UpdateEvent>>>,
}

impl Default for MemoryPubSub {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl MemoryPubSub {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            topics: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl PubSub for MemoryPubSub {
    async fn publish(&self, event: UpdateEvent) -> Result<usize, Error> {
        let sender = self.topics.lock().get(&event.topic).cloned();
        let reached = match sender {
            // no receivers left is not an error
            Some(sender) => sender.send(event).unwrap_or(0),
            None => 0,
        };
        Ok(reached)
    }

    async fn subscribe(&self, topic: &str) -> Result<broadcast::Receiver<UpdateEvent>, Error> {
        let mut topics = self.topics.lock();
        let sender = topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(self.capacity).0);
        Ok(sender.subscribe())
    }
}
