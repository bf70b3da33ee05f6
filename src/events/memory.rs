//! In-process broker for tests and the demo binary.
//!
//! Append-only per-topic logs, one partition per topic, per-group committed
//! offsets. Uncommitted deliveries come back on the next poll, which is
//! exactly the redelivery behavior the fee consumer's dedupe table exists
//! for.

use super::{BrokerError, Delivery, EventPublisher, EventSource};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Clone)]
struct StoredMessage {
    key: Option<String>,
    payload: String,
}

#[derive(Default)]
pub struct MemoryBroker {
    logs: Mutex<HashMap<String, Vec<StoredMessage>>>,
    /// (group, topic) -> offset of the next delivery for that group.
    positions: Mutex<HashMap<(String, String), i64>>,
    fail_publish: AtomicBool,
}

impl MemoryBroker {
    pub fn new() -> Self {
        Self::default()
    }

    /// One consumer group's cursor over one topic. Separate groups each see
    /// the whole log; one group sees each message until it commits it.
    pub fn subscribe(self: &Arc<Self>, group: &str, topic: &str) -> MemorySubscription {
        MemorySubscription {
            broker: Arc::clone(self),
            group: group.to_string(),
            topic: topic.to_string(),
        }
    }

    /// Make subsequent publishes fail, for publisher-fault tests.
    pub fn set_fail_publish(&self, fail: bool) {
        self.fail_publish.store(fail, Ordering::SeqCst);
    }

    /// All payloads published to `topic`, in publish order.
    pub fn payloads(&self, topic: &str) -> Vec<String> {
        self.logs
            .lock()
            .unwrap()
            .get(topic)
            .map(|log| log.iter().map(|m| m.payload.clone()).collect())
            .unwrap_or_default()
    }

    pub fn message_count(&self, topic: &str) -> usize {
        self.logs.lock().unwrap().get(topic).map_or(0, |log| log.len())
    }
}

#[async_trait]
impl EventPublisher for MemoryBroker {
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError> {
        if self.fail_publish.load(Ordering::SeqCst) {
            return Err(BrokerError::Publish {
                topic: topic.to_string(),
                reason: "publishing disabled".to_string(),
            });
        }

        let mut logs = self.logs.lock().unwrap();
        logs.entry(topic.to_string()).or_default().push(StoredMessage {
            key: Some(key.to_string()),
            payload: payload.to_string(),
        });
        Ok(())
    }
}

pub struct MemorySubscription {
    broker: Arc<MemoryBroker>,
    group: String,
    topic: String,
}

#[async_trait]
impl EventSource for MemorySubscription {
    async fn poll(&self) -> Result<Option<Delivery>, BrokerError> {
        let position = {
            let positions = self.broker.positions.lock().unwrap();
            positions
                .get(&(self.group.clone(), self.topic.clone()))
                .copied()
                .unwrap_or(0)
        };

        let logs = self.broker.logs.lock().unwrap();
        let Some(message) = logs.get(&self.topic).and_then(|log| log.get(position as usize))
        else {
            return Ok(None);
        };

        Ok(Some(Delivery {
            topic: self.topic.clone(),
            partition: 0,
            offset: position,
            key: message.key.clone(),
            payload: message.payload.clone(),
        }))
    }

    async fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError> {
        let mut positions = self.broker.positions.lock().unwrap();
        let next = positions
            .entry((self.group.clone(), self.topic.clone()))
            .or_insert(0);
        // Commits never move the cursor backwards.
        if delivery.offset + 1 > *next {
            *next = delivery.offset + 1;
        }
        Ok(())
    }
}
