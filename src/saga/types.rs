//! Transfer data types.

use super::status::{FailureKind, TransferStatus};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// What a caller submits. `request_key` is the caller-chosen idempotency
/// key; resubmitting with the same key replays the recorded verdict instead
/// of moving money again.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    pub request_key: String,
    pub source_account_id: i64,
    pub dest_account_id: i64,
    pub amount: Decimal,
}

/// Insert shape for a transfer row; the store assigns the id.
#[derive(Debug, Clone)]
pub struct NewTransfer {
    pub source_account_id: i64,
    pub dest_account_id: i64,
    pub amount: Decimal,
    pub request_key: String,
}

/// One persisted transfer.
#[derive(Debug, Clone, PartialEq)]
pub struct TransferRecord {
    pub id: i64,
    pub source_account_id: i64,
    pub dest_account_id: i64,
    pub amount: Decimal,
    /// Set by the fee consumer once the fee debit lands.
    pub fee_applied: Option<Decimal>,
    pub request_key: String,
    pub status: TransferStatus,
    pub failure_kind: Option<FailureKind>,
    pub failure_message: Option<String>,
    /// Only meaningful on failed transfers: the compensating credit has
    /// been confirmed back onto the source account.
    pub reversed: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// What a successful `execute` returns, and exactly what a replay of the
/// same request key returns later. Account and transfer ids go out in their
/// opaque token form.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransferReceipt {
    pub transfer_id: String,
    pub source_account_id: String,
    pub dest_account_id: String,
    pub amount: Decimal,
    /// `None` until the fee consumer has run; replayed receipts keep the
    /// value recorded at conclusion time.
    pub fee_applied: Option<Decimal>,
    pub status: String,
    pub occurred_at: DateTime<Utc>,
}
