//! In-memory Idempotency Store
//!
//! Backs tests and the demo wiring. Claim atomicity comes from the DashMap
//! entry API, which holds the shard lock across the vacancy check and insert.

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::time::Duration;

use super::{BeginOutcome, IdempotencyError, IdempotencyRecord, IdempotencyStore};

#[derive(Default)]
pub struct MemoryIdempotencyStore {
    records: DashMap<String, IdempotencyRecord>,
}

impl MemoryIdempotencyStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl IdempotencyStore for MemoryIdempotencyStore {
    async fn begin(
        &self,
        key: &str,
        request_snapshot: Option<serde_json::Value>,
    ) -> Result<BeginOutcome, IdempotencyError> {
        if key.trim().is_empty() {
            return Err(IdempotencyError::EmptyKey);
        }

        match self.records.entry(key.to_string()) {
            Entry::Occupied(entry) => Ok(BeginOutcome::Replayed(entry.get().clone())),
            Entry::Vacant(entry) => {
                entry.insert(IdempotencyRecord {
                    key: key.to_string(),
                    request_snapshot,
                    result_snapshot: None,
                    created_at: Utc::now(),
                    completed_at: None,
                });
                Ok(BeginOutcome::Begun)
            }
        }
    }

    async fn complete(
        &self,
        key: &str,
        result: serde_json::Value,
    ) -> Result<bool, IdempotencyError> {
        match self.records.get_mut(key) {
            Some(mut record) if record.is_pending() => {
                record.result_snapshot = Some(result);
                record.completed_at = Some(Utc::now());
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn fetch(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError> {
        Ok(self.records.get(key).map(|record| record.clone()))
    }

    async fn exists(&self, key: &str) -> Result<bool, IdempotencyError> {
        Ok(self.records.contains_key(key))
    }

    async fn find_stale_pending(
        &self,
        threshold: Duration,
    ) -> Result<Vec<IdempotencyRecord>, IdempotencyError> {
        let cutoff = Utc::now() - chrono::Duration::seconds(threshold.as_secs() as i64);

        let mut stale: Vec<IdempotencyRecord> = self
            .records
            .iter()
            .filter(|record| record.is_pending() && record.created_at < cutoff)
            .map(|record| record.clone())
            .collect();
        stale.sort_by_key(|record| record.created_at);

        Ok(stale)
    }
}
