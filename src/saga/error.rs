//! Saga error taxonomy.
//!
//! Every variant carries a machine-readable `code()`. Codes end up in the
//! idempotency ledger's verdict snapshots, so a replayed request surfaces
//! the identical code the first submission did.

use super::status::FailureKind;
use crate::idempotency::IdempotencyError;
use crate::movement::MovementError;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum SagaError {
    /// Rejected before any transfer row existed or any remote call ran.
    #[error("{0}")]
    Validation(String),

    /// The account service rejected the debit; nothing moved.
    #[error("Transfer rejected: {0}")]
    Rejected(MovementError),

    /// The saga ran and gave up; the transfer row is Failed and
    /// [`FailureKind`] says what happened to the money.
    #[error("Transfer {transfer_id} failed ({kind}): {message}")]
    Failed {
        transfer_id: i64,
        kind: FailureKind,
        message: String,
    },

    /// Replay of a key whose first submission has not recorded a verdict
    /// yet. The caller retries later; money never moves twice.
    #[error("A submission with this request key is still being processed")]
    ReplayPending,

    /// Replay of a key whose first submission failed. Carries the recorded
    /// verdict unchanged.
    #[error("{message}")]
    ReplayedFailure { code: String, message: String },

    #[error("Transfer {0} not found")]
    TransferNotFound(i64),

    #[error("Store error: {0}")]
    Store(String),

    #[error("Publish error: {0}")]
    Publish(String),
}

impl SagaError {
    pub fn code(&self) -> &str {
        match self {
            SagaError::Validation(_) => "VALIDATION_ERROR",
            SagaError::Rejected(err) => err.code(),
            SagaError::Failed { kind, .. } => kind.code(),
            SagaError::ReplayPending => "REPLAY_PENDING",
            SagaError::ReplayedFailure { code, .. } => code,
            SagaError::TransferNotFound(_) => "TRANSFER_NOT_FOUND",
            SagaError::Store(_) => "STORE_ERROR",
            SagaError::Publish(_) => "PUBLISH_ERROR",
        }
    }
}

impl From<sqlx::Error> for SagaError {
    fn from(err: sqlx::Error) -> Self {
        SagaError::Store(err.to_string())
    }
}

impl From<IdempotencyError> for SagaError {
    fn from(err: IdempotencyError) -> Self {
        match err {
            IdempotencyError::EmptyKey => {
                SagaError::Validation("Request key cannot be empty".to_string())
            }
            other => SagaError::Store(other.to_string()),
        }
    }
}
