//! Transfer Saga
//!
//! Moves money between two accounts on the remote account service as a
//! debit-then-credit saga, bracketed by the idempotency ledger.
//!
//! # Flow
//!
//! ```text
//! begin(key) → validate → row PROCESSING → debit source → credit dest → CONCLUDED
//!                  ↓                            ↓              ↓
//!               rejected                   compensate      compensate
//!                  ↓                            ↓              ↓
//!                FAILED ←──────────────────────┴──────────────┘
//! ```
//!
//! # Safety Invariants
//!
//! 1. **Claim-Before-Work**: the request key is claimed before validation or
//!    any remote call; replays of the key return the recorded verdict.
//! 2. **Compensate-On-Unknown**: once the debit may have landed, every later
//!    failure issues a compensating credit back onto the source.
//! 3. **Verdict-Always-Recorded**: success and rejection both complete the
//!    ledger record; only a crash leaves a key pending.
//! 4. **CAS Transitions**: terminal row states are never overwritten.

pub mod error;
pub mod orchestrator;
pub mod pg;
pub mod status;
pub mod store;
pub mod types;

#[cfg(test)]
mod integration_tests;

// Re-exports for convenience
pub use error::SagaError;
pub use orchestrator::TransferOrchestrator;
pub use pg::PgTransferStore;
pub use status::{FailureKind, TransferStatus};
pub use store::{MemoryTransferStore, TransferStore};
pub use types::{NewTransfer, TransferReceipt, TransferRecord, TransferRequest};
