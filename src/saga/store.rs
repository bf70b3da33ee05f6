//! Transfer persistence seam.
//!
//! Status transitions are compare-and-swap style: they only apply from the
//! expected prior state and report whether they did. Duplicate or stale
//! writers lose the race and see `false` instead of clobbering a terminal
//! row.

use super::error::SagaError;
use super::status::{FailureKind, TransferStatus};
use super::types::{NewTransfer, TransferRecord};
use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicI64, Ordering};

#[async_trait]
pub trait TransferStore: Send + Sync {
    /// Persist a new transfer in `Processing` and assign its id.
    async fn create(&self, new: NewTransfer) -> Result<TransferRecord, SagaError>;

    async fn get(&self, id: i64) -> Result<Option<TransferRecord>, SagaError>;

    /// `Processing` -> `Concluded`. Returns whether the transition applied.
    async fn conclude(&self, id: i64) -> Result<bool, SagaError>;

    /// `Processing` -> `Failed` with the failure recorded.
    async fn fail(&self, id: i64, kind: FailureKind, message: &str) -> Result<bool, SagaError>;

    /// Record the assessed fee on a `Concluded` transfer.
    async fn set_fee_applied(&self, id: i64, fee: Decimal) -> Result<bool, SagaError>;

    /// Set the reversed marker on a `Failed`, not-yet-reversed transfer.
    async fn mark_reversed(&self, id: i64) -> Result<bool, SagaError>;

    /// Every transfer touching the account, either direction, oldest first.
    async fn for_account(&self, account_id: i64) -> Result<Vec<TransferRecord>, SagaError>;
}

/// In-memory [`TransferStore`] for tests and the demo binary.
pub struct MemoryTransferStore {
    transfers: DashMap<i64, TransferRecord>,
    next_id: AtomicI64,
}

impl MemoryTransferStore {
    pub fn new() -> Self {
        Self {
            transfers: DashMap::new(),
            next_id: AtomicI64::new(1),
        }
    }
}

impl Default for MemoryTransferStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TransferStore for MemoryTransferStore {
    async fn create(&self, new: NewTransfer) -> Result<TransferRecord, SagaError> {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let now = Utc::now();
        let record = TransferRecord {
            id,
            source_account_id: new.source_account_id,
            dest_account_id: new.dest_account_id,
            amount: new.amount,
            fee_applied: None,
            request_key: new.request_key,
            status: TransferStatus::Processing,
            failure_kind: None,
            failure_message: None,
            reversed: false,
            created_at: now,
            updated_at: now,
        };
        self.transfers.insert(id, record.clone());
        Ok(record)
    }

    async fn get(&self, id: i64) -> Result<Option<TransferRecord>, SagaError> {
        Ok(self.transfers.get(&id).map(|r| r.clone()))
    }

    async fn conclude(&self, id: i64) -> Result<bool, SagaError> {
        let Some(mut record) = self.transfers.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != TransferStatus::Processing {
            return Ok(false);
        }
        record.status = TransferStatus::Concluded;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn fail(&self, id: i64, kind: FailureKind, message: &str) -> Result<bool, SagaError> {
        let Some(mut record) = self.transfers.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != TransferStatus::Processing {
            return Ok(false);
        }
        record.status = TransferStatus::Failed;
        record.failure_kind = Some(kind);
        record.failure_message = Some(message.to_string());
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn set_fee_applied(&self, id: i64, fee: Decimal) -> Result<bool, SagaError> {
        let Some(mut record) = self.transfers.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != TransferStatus::Concluded {
            return Ok(false);
        }
        record.fee_applied = Some(fee);
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn mark_reversed(&self, id: i64) -> Result<bool, SagaError> {
        let Some(mut record) = self.transfers.get_mut(&id) else {
            return Ok(false);
        };
        if record.status != TransferStatus::Failed || record.reversed {
            return Ok(false);
        }
        record.reversed = true;
        record.updated_at = Utc::now();
        Ok(true)
    }

    async fn for_account(&self, account_id: i64) -> Result<Vec<TransferRecord>, SagaError> {
        let mut records: Vec<TransferRecord> = self
            .transfers
            .iter()
            .filter(|r| r.source_account_id == account_id || r.dest_account_id == account_id)
            .map(|r| r.clone())
            .collect();
        records.sort_by_key(|r| r.id);
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn new_transfer(source: i64, dest: i64) -> NewTransfer {
        NewTransfer {
            source_account_id: source,
            dest_account_id: dest,
            amount: Decimal::new(10000, 2),
            request_key: "key".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_assigns_increasing_ids() {
        let store = MemoryTransferStore::new();
        let first = store.create(new_transfer(1, 2)).await.unwrap();
        let second = store.create(new_transfer(1, 2)).await.unwrap();

        assert_eq!(first.id, 1);
        assert_eq!(second.id, 2);
        assert_eq!(first.status, TransferStatus::Processing);
        assert!(first.fee_applied.is_none());
        assert!(!first.reversed);
    }

    #[tokio::test]
    async fn test_conclude_applies_once() {
        let store = MemoryTransferStore::new();
        let record = store.create(new_transfer(1, 2)).await.unwrap();

        assert!(store.conclude(record.id).await.unwrap());
        // Second transition loses the CAS.
        assert!(!store.conclude(record.id).await.unwrap());
        // And a late fail cannot clobber the terminal state.
        assert!(
            !store
                .fail(record.id, FailureKind::CreditFailed, "late")
                .await
                .unwrap()
        );

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Concluded);
        assert!(stored.failure_kind.is_none());
    }

    #[tokio::test]
    async fn test_fail_records_kind_and_message() {
        let store = MemoryTransferStore::new();
        let record = store.create(new_transfer(1, 2)).await.unwrap();

        assert!(
            store
                .fail(record.id, FailureKind::CreditFailed, "credit leg failed")
                .await
                .unwrap()
        );

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.status, TransferStatus::Failed);
        assert_eq!(stored.failure_kind, Some(FailureKind::CreditFailed));
        assert_eq!(stored.failure_message.as_deref(), Some("credit leg failed"));
    }

    #[tokio::test]
    async fn test_mark_reversed_only_on_failed() {
        let store = MemoryTransferStore::new();
        let record = store.create(new_transfer(1, 2)).await.unwrap();

        // Still processing: not reversible.
        assert!(!store.mark_reversed(record.id).await.unwrap());

        store
            .fail(record.id, FailureKind::CreditFailed, "boom")
            .await
            .unwrap();
        assert!(store.mark_reversed(record.id).await.unwrap());
        // Already reversed.
        assert!(!store.mark_reversed(record.id).await.unwrap());

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert!(stored.reversed);
    }

    #[tokio::test]
    async fn test_fee_only_lands_on_concluded() {
        let store = MemoryTransferStore::new();
        let record = store.create(new_transfer(1, 2)).await.unwrap();
        let fee = Decimal::new(200, 2);

        assert!(!store.set_fee_applied(record.id, fee).await.unwrap());

        store.conclude(record.id).await.unwrap();
        assert!(store.set_fee_applied(record.id, fee).await.unwrap());

        let stored = store.get(record.id).await.unwrap().unwrap();
        assert_eq!(stored.fee_applied, Some(fee));
    }

    #[tokio::test]
    async fn test_for_account_covers_both_directions() {
        let store = MemoryTransferStore::new();
        let outgoing = store.create(new_transfer(1, 2)).await.unwrap();
        let incoming = store.create(new_transfer(3, 1)).await.unwrap();
        store.create(new_transfer(2, 3)).await.unwrap();

        let history = store.for_account(1).await.unwrap();
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].id, outgoing.id);
        assert_eq!(history[1].id, incoming.id);

        assert!(store.for_account(99).await.unwrap().is_empty());
        assert!(store.get(999).await.unwrap().is_none());
    }
}
