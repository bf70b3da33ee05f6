//! Account movement client seam.
//!
//! A movement is a single credit or debit applied to one account on the
//! remote account service. The transfer saga and the fee consumer both go
//! through [`MovementClient`]; production wiring uses [`HttpMovementClient`],
//! tests and the demo binary use [`MemoryLedger`].
//!
//! Every movement carries a caller-chosen `request_key` so the account
//! service can deduplicate replays. Retrying the same logical movement MUST
//! reuse the key; a new key means a new movement.

pub mod http;
pub mod memory;

// Re-export implementations for convenient access
pub use http::HttpMovementClient;
pub use memory::MemoryLedger;

use async_trait::async_trait;
use rust_decimal::Decimal;
use thiserror::Error;

/// Which side of the account the movement lands on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Direction {
    Credit,
    Debit,
}

impl Direction {
    /// Single-letter form used on the account service wire.
    pub fn wire_letter(&self) -> &'static str {
        match self {
            Direction::Credit => "C",
            Direction::Debit => "D",
        }
    }

    pub fn from_wire_letter(letter: &str) -> Option<Self> {
        match letter {
            "C" => Some(Direction::Credit),
            "D" => Some(Direction::Debit),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Direction::Credit => "CREDIT",
            Direction::Debit => "DEBIT",
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One movement to apply on the account service.
#[derive(Debug, Clone, PartialEq)]
pub struct MovementRequest {
    pub account_id: i64,
    pub direction: Direction,
    pub amount: Decimal,
    pub description: String,
    /// Idempotency key for this movement on the account service side.
    pub request_key: String,
}

/// Why a movement did not go through.
///
/// The taxonomy splits into domain rejections (the account service said no,
/// nothing moved) and transient faults (the call itself failed, outcome
/// unknown). The saga compensates only for the latter on the debit leg.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum MovementError {
    #[error("Account not found")]
    AccountNotFound,
    #[error("Account is inactive")]
    InactiveAccount,
    #[error("Insufficient balance")]
    InsufficientBalance,
    #[error("Invalid movement value")]
    InvalidValue,
    /// Machine-readable rejection this client has no dedicated variant for.
    #[error("Movement rejected: {message}")]
    Rejected { code: String, message: String },
    #[error("Remote call failed: {0}")]
    Remote(String),
    #[error("Remote call timed out")]
    Timeout,
}

impl MovementError {
    /// Machine-readable error code, aligned with the account service's own
    /// rejection codes so verdicts survive a round-trip through the ledger.
    pub fn code(&self) -> &str {
        match self {
            MovementError::AccountNotFound => "INVALID_ACCOUNT",
            MovementError::InactiveAccount => "INACTIVE_ACCOUNT",
            MovementError::InsufficientBalance => "INSUFFICIENT_BALANCE",
            MovementError::InvalidValue => "INVALID_VALUE",
            MovementError::Rejected { code, .. } => code,
            MovementError::Remote(_) => "REMOTE_ERROR",
            MovementError::Timeout => "TIMEOUT",
        }
    }

    /// Map a rejection code from the account service back into the taxonomy.
    /// Codes without a dedicated variant stay as [`MovementError::Rejected`].
    pub fn from_remote(code: &str, message: &str) -> Self {
        match code {
            "INVALID_ACCOUNT" => MovementError::AccountNotFound,
            "INACTIVE_ACCOUNT" => MovementError::InactiveAccount,
            "INSUFFICIENT_BALANCE" => MovementError::InsufficientBalance,
            "INVALID_VALUE" => MovementError::InvalidValue,
            _ => MovementError::Rejected {
                code: code.to_string(),
                message: message.to_string(),
            },
        }
    }

    /// Transport-level failure: the outcome on the remote side is unknown
    /// and the movement may or may not have been applied.
    pub fn is_transient(&self) -> bool {
        matches!(self, MovementError::Remote(_) | MovementError::Timeout)
    }

    /// The account service decided against the movement. Nothing moved, and
    /// replaying the identical request cannot succeed.
    pub fn is_domain_rejection(&self) -> bool {
        !self.is_transient()
    }
}

/// Applies movements against the account service.
///
/// Implementations MUST be idempotent per `request_key`: applying the same
/// key twice has the same effect as applying it once.
#[async_trait]
pub trait MovementClient: Send + Sync {
    async fn apply(&self, request: &MovementRequest) -> Result<(), MovementError>;
}
