//! Idempotency Ledger
//!
//! Durable request-key bookkeeping. An operation claims its key before doing
//! any work and records its outcome when done; retries of the same key see
//! the first outcome instead of running the operation again.

pub mod memory;
pub mod pg;

pub use memory::MemoryIdempotencyStore;
pub use pg::PgIdempotencyStore;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// One ledger entry: a request key plus snapshots of the request that claimed
/// it and the outcome of the operation it guarded.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdempotencyRecord {
    pub key: String,
    /// JSON snapshot of the claiming request, kept for reconciliation.
    pub request_snapshot: Option<serde_json::Value>,
    /// JSON snapshot of the first outcome. `None` while the guarded
    /// operation is still in flight.
    pub result_snapshot: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl IdempotencyRecord {
    /// Claimed but not yet completed.
    pub fn is_pending(&self) -> bool {
        self.result_snapshot.is_none()
    }
}

/// Outcome of [`IdempotencyStore::begin`].
#[derive(Debug, Clone)]
pub enum BeginOutcome {
    /// The key was free and is now claimed by this caller, which must run
    /// the operation and `complete` the record.
    Begun,
    /// The key was already claimed. The existing record is returned as-is
    /// and may still be pending.
    Replayed(IdempotencyRecord),
}

impl BeginOutcome {
    pub fn is_begun(&self) -> bool {
        matches!(self, BeginOutcome::Begun)
    }
}

/// Idempotency ledger error types
#[derive(Error, Debug)]
pub enum IdempotencyError {
    #[error("Request key cannot be empty")]
    EmptyKey,

    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for IdempotencyError {
    fn from(e: sqlx::Error) -> Self {
        IdempotencyError::Storage(e.to_string())
    }
}

/// Request-key ledger shared by every operation that must not run twice.
///
/// `begin` is the only claim path and must be atomic: under concurrent calls
/// with the same key exactly one caller sees [`BeginOutcome::Begun`].
#[async_trait]
pub trait IdempotencyStore: Send + Sync {
    /// Claim `key`, or return the record of whoever claimed it first.
    ///
    /// Rejects empty and whitespace-only keys. The request snapshot is stored
    /// with the claim and never updated afterwards.
    async fn begin(
        &self,
        key: &str,
        request_snapshot: Option<serde_json::Value>,
    ) -> Result<BeginOutcome, IdempotencyError>;

    /// Store the outcome for a pending key.
    ///
    /// Returns true if this call recorded the result, false when the key is
    /// unknown or already completed (the first result is kept).
    async fn complete(
        &self,
        key: &str,
        result: serde_json::Value,
    ) -> Result<bool, IdempotencyError>;

    /// Fetch the record for a key.
    async fn fetch(&self, key: &str) -> Result<Option<IdempotencyRecord>, IdempotencyError>;

    /// Whether any record (pending or terminal) exists for a key.
    async fn exists(&self, key: &str) -> Result<bool, IdempotencyError>;

    /// Pending records older than `threshold`. A record stuck here means the
    /// claiming writer died between begin and complete.
    async fn find_stale_pending(
        &self,
        threshold: Duration,
    ) -> Result<Vec<IdempotencyRecord>, IdempotencyError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_pending_until_snapshot_set() {
        let mut record = IdempotencyRecord {
            key: "transfer:abc".to_string(),
            request_snapshot: None,
            result_snapshot: None,
            created_at: Utc::now(),
            completed_at: None,
        };
        assert!(record.is_pending());

        record.result_snapshot = Some(serde_json::json!({"status": "CONCLUDED"}));
        assert!(!record.is_pending());
    }
}
