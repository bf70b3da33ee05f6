//! LedgerLink - Money Movement Coordination
//!
//! Transfer orchestration over a remote account ledger, built around an
//! idempotency ledger so a retried request never moves money twice.
//!
//! # Modules
//!
//! - [`config`] - YAML configuration loading
//! - [`logging`] - Structured logging setup (tracing + daily file rotation)
//! - [`token`] - Reversible opaque id tokens (AES + HMAC)
//! - [`retry`] - Bounded retry with exponential backoff
//! - [`idempotency`] - Request-key ledger (begin/complete bracket)
//! - [`movement`] - Account movement client (credit/debit seam)
//! - [`events`] - Broker seam and event payloads
//! - [`saga`] - Transfer saga: debit, credit, compensate on failure
//! - [`fee`] - Fee assessment consumer over the transfer-completed topic

// Configuration and observability
pub mod config;
pub mod logging;

// Shared building blocks
pub mod idempotency;
pub mod retry;
pub mod token;

// Money movement
pub mod events;
pub mod fee;
pub mod movement;
pub mod saga;

// Convenient re-exports at crate root
pub use config::AppConfig;
pub use events::{
    BrokerError, Delivery, EventPublisher, EventSource, FeeApplied, MemoryBroker,
    TransferCompleted,
};
pub use fee::{
    FeeConsumer, FeePolicy, FeeProcessingRecord, FeeProcessingStatus, FeeStore, MemoryFeeStore,
    PgFeeStore,
};
pub use idempotency::{
    BeginOutcome, IdempotencyError, IdempotencyRecord, IdempotencyStore, MemoryIdempotencyStore,
    PgIdempotencyStore,
};
pub use movement::{
    Direction, HttpMovementClient, MemoryLedger, MovementClient, MovementError, MovementRequest,
};
pub use retry::{RetryPolicy, with_backoff};
pub use saga::{
    FailureKind, MemoryTransferStore, NewTransfer, PgTransferStore, SagaError,
    TransferOrchestrator, TransferReceipt, TransferRecord, TransferRequest, TransferStatus,
    TransferStore,
};
pub use token::{IdCodec, TokenError};
