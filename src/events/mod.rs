//! Broker seam and event payloads.
//!
//! The transfer saga publishes [`TransferCompleted`]; the fee consumer reads
//! it off the transfer-completed topic and publishes [`FeeApplied`] once the
//! fee lands. The broker itself is an external collaborator behind
//! [`EventPublisher`] / [`EventSource`]; [`MemoryBroker`] is the in-process
//! implementation used by tests and the demo binary.

pub mod memory;

pub use memory::{MemoryBroker, MemorySubscription};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Published when a transfer concludes.
///
/// Wire names are PascalCase; the fee consumer and downstream services
/// already decode this shape, so the casing is part of the contract.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct TransferCompleted {
    pub transfer_id: i64,
    pub source_account_id: i64,
    pub dest_account_id: i64,
    pub amount: Decimal,
    /// Zero at publish time; the fee consumer assesses the actual fee.
    pub fee_applied: Decimal,
    pub occurred_at: DateTime<Utc>,
    /// The request key the transfer was submitted under.
    pub request_key: String,
}

/// Published by the fee consumer after the fee debit lands. camelCase on the
/// wire, unlike [`TransferCompleted`]; the two topics predate each other and
/// kept their own conventions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct FeeApplied {
    pub fee_id: String,
    pub transfer_id: i64,
    /// Account the fee was debited from (the transfer's source).
    pub account_id: i64,
    pub transfer_amount: Decimal,
    pub fee_amount: Decimal,
    pub transferred_at: DateTime<Utc>,
    pub processed_at: DateTime<Utc>,
    pub request_key: String,
}

/// One message pulled off a topic.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: String,
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum BrokerError {
    #[error("Publish to {topic} failed: {reason}")]
    Publish { topic: String, reason: String },
    #[error("Broker unavailable: {0}")]
    Unavailable(String),
}

/// Producer side of the broker.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publish `payload` under `key`. The key routes related events to one
    /// partition so consumers see them in publish order.
    async fn publish(
        &self,
        topic: &str,
        key: &str,
        payload: &serde_json::Value,
    ) -> Result<(), BrokerError>;
}

/// Consumer side: one group's cursor over one topic.
///
/// `poll` returns the same delivery until it is committed; `commit`
/// acknowledges everything up to and including that delivery. Crashing
/// between the two redelivers (at-least-once).
#[async_trait]
pub trait EventSource: Send + Sync {
    async fn poll(&self) -> Result<Option<Delivery>, BrokerError>;
    async fn commit(&self, delivery: &Delivery) -> Result<(), BrokerError>;
}
