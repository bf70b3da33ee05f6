//! Fee processing records.
//!
//! One row per delivery, keyed `(transfer_id, topic, offset)`. This is the
//! dedupe table that makes at-least-once delivery safe: a `Success` row
//! means the fee for that delivery already landed and a redelivery must not
//! charge again. `Failure` rows are history only; redeliveries overwrite
//! them on the next attempt.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::fmt;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FeeProcessingStatus {
    Success,
    Failure,
}

impl FeeProcessingStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeeProcessingStatus::Success => "SUCCESS",
            FeeProcessingStatus::Failure => "FAILURE",
        }
    }

    pub fn from_code(code: &str) -> Option<Self> {
        match code {
            "SUCCESS" => Some(FeeProcessingStatus::Success),
            "FAILURE" => Some(FeeProcessingStatus::Failure),
            _ => None,
        }
    }
}

impl fmt::Display for FeeProcessingStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of processing one delivery of one transfer event.
#[derive(Debug, Clone, PartialEq)]
pub struct FeeProcessingRecord {
    pub transfer_id: i64,
    pub topic: String,
    pub offset: i64,
    /// Account the fee was (or would have been) debited from.
    pub account_id: i64,
    pub fee_amount: Decimal,
    pub status: FeeProcessingStatus,
    pub message: String,
    pub processed_at: DateTime<Utc>,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeeStoreError {
    #[error("Storage error: {0}")]
    Storage(String),
}

impl From<sqlx::Error> for FeeStoreError {
    fn from(err: sqlx::Error) -> Self {
        FeeStoreError::Storage(err.to_string())
    }
}

#[async_trait]
pub trait FeeStore: Send + Sync {
    async fn find(
        &self,
        transfer_id: i64,
        topic: &str,
        offset: i64,
    ) -> Result<Option<FeeProcessingRecord>, FeeStoreError>;

    /// Insert the record, overwriting a previous attempt for the same
    /// delivery.
    async fn upsert(&self, record: &FeeProcessingRecord) -> Result<(), FeeStoreError>;

    /// Records with `processed_at` in `[from, to)`, oldest first.
    async fn processed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FeeProcessingRecord>, FeeStoreError>;
}

/// In-memory [`FeeStore`] for tests and the demo binary.
#[derive(Default)]
pub struct MemoryFeeStore {
    records: DashMap<(i64, String, i64), FeeProcessingRecord>,
}

impl MemoryFeeStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl FeeStore for MemoryFeeStore {
    async fn find(
        &self,
        transfer_id: i64,
        topic: &str,
        offset: i64,
    ) -> Result<Option<FeeProcessingRecord>, FeeStoreError> {
        Ok(self
            .records
            .get(&(transfer_id, topic.to_string(), offset))
            .map(|r| r.clone()))
    }

    async fn upsert(&self, record: &FeeProcessingRecord) -> Result<(), FeeStoreError> {
        self.records.insert(
            (record.transfer_id, record.topic.clone(), record.offset),
            record.clone(),
        );
        Ok(())
    }

    async fn processed_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> Result<Vec<FeeProcessingRecord>, FeeStoreError> {
        let mut records: Vec<FeeProcessingRecord> = self
            .records
            .iter()
            .filter(|r| r.processed_at >= from && r.processed_at < to)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.processed_at);
        Ok(records)
    }
}
