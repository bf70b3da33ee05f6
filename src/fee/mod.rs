//! Fee assessment over the transfer-completed topic.
//!
//! ```text
//!   transfer-completed ──poll──> FeeConsumer
//!                                   │ dedupe on (transfer_id, topic, offset)
//!                                   │ assess via FeePolicy
//!                                   │ debit source account (with retries)
//!                                   ├──> fee store (SUCCESS / FAILURE row)
//!                                   └──> fee-applied topic
//! ```
//!
//! Offsets are committed only for handled deliveries, so a crash mid-flight
//! redelivers and the fee store's `SUCCESS` row is what keeps the account
//! from being charged twice for the same delivery.

pub mod consumer;
pub mod pg;
pub mod policy;
pub mod store;

pub use consumer::{ConsumerConfig, FeeConsumer};
pub use pg::PgFeeStore;
pub use policy::FeePolicy;
pub use store::{
    FeeProcessingRecord, FeeProcessingStatus, FeeStore, FeeStoreError, MemoryFeeStore,
};
