//! Transfer saga orchestration.
//!
//! `execute` brackets the whole saga with the idempotency ledger: the key is
//! claimed before any validation or remote call, and the final verdict,
//! receipt or rejection, is always recorded under it. A replay of the key
//! therefore returns the identical answer without moving money twice.
//!
//! The money path is debit source, credit dest. Once the debit may have
//! landed, every subsequent failure triggers a best-effort compensating
//! credit back onto the source; whether that compensation worked is the
//! difference between `CreditFailed`/`DebitFailed` (net zero) and
//! `CompensationFailed` (funds stuck, reconciliation required).

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde_json::json;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::TransferConfig;
use crate::events::{EventPublisher, TransferCompleted};
use crate::idempotency::{BeginOutcome, IdempotencyRecord, IdempotencyStore};
use crate::movement::{Direction, MovementClient, MovementError, MovementRequest};
use crate::token::IdCodec;

use super::error::SagaError;
use super::status::{FailureKind, TransferStatus};
use super::store::TransferStore;
use super::types::{NewTransfer, TransferReceipt, TransferRecord, TransferRequest};

pub struct TransferOrchestrator {
    ledger: Arc<dyn IdempotencyStore>,
    transfers: Arc<dyn TransferStore>,
    movements: Arc<dyn MovementClient>,
    publisher: Arc<dyn EventPublisher>,
    codec: IdCodec,
    config: TransferConfig,
    completed_topic: String,
}

impl TransferOrchestrator {
    pub fn new(
        ledger: Arc<dyn IdempotencyStore>,
        transfers: Arc<dyn TransferStore>,
        movements: Arc<dyn MovementClient>,
        publisher: Arc<dyn EventPublisher>,
        codec: IdCodec,
        config: TransferConfig,
        completed_topic: impl Into<String>,
    ) -> Self {
        Self {
            ledger,
            transfers,
            movements,
            publisher,
            codec,
            config,
            completed_topic: completed_topic.into(),
        }
    }

    /// Run one transfer under its request key.
    pub async fn execute(&self, request: TransferRequest) -> Result<TransferReceipt, SagaError> {
        let request_snapshot = serde_json::to_value(&request).ok();
        match self.ledger.begin(&request.request_key, request_snapshot).await? {
            BeginOutcome::Begun => {}
            BeginOutcome::Replayed(record) => {
                info!(request_key = %request.request_key, "Replaying recorded verdict");
                return self.replay(&record);
            }
        }

        match self.run_saga(&request).await {
            Ok(receipt) => {
                let snapshot = serde_json::to_value(&receipt)
                    .map_err(|e| SagaError::Store(format!("receipt not serializable: {}", e)))?;
                self.ledger.complete(&request.request_key, snapshot).await?;
                Ok(receipt)
            }
            Err(err) => {
                // The rejection is a verdict too; replays must see it.
                let snapshot = rejection_snapshot(&err);
                if let Err(store_err) =
                    self.ledger.complete(&request.request_key, snapshot).await
                {
                    error!(
                        request_key = %request.request_key,
                        error = %store_err,
                        "Failed to record rejection; key will surface as stale pending"
                    );
                }
                Err(err)
            }
        }
    }

    /// Reconstruct the verdict recorded for an already-seen request key.
    fn replay(&self, record: &IdempotencyRecord) -> Result<TransferReceipt, SagaError> {
        let Some(result) = &record.result_snapshot else {
            warn!(request_key = %record.key, "Replay of a still-pending request key");
            return Err(SagaError::ReplayPending);
        };

        if let Some(code) = result.get("errorCode").and_then(|v| v.as_str()) {
            let message = result
                .get("error")
                .and_then(|v| v.as_str())
                .unwrap_or("previous submission failed")
                .to_string();
            return Err(SagaError::ReplayedFailure {
                code: code.to_string(),
                message,
            });
        }

        serde_json::from_value::<TransferReceipt>(result.clone()).map_err(|e| {
            SagaError::Store(format!(
                "recorded result for key {} is unreadable: {}",
                record.key, e
            ))
        })
    }

    async fn run_saga(&self, request: &TransferRequest) -> Result<TransferReceipt, SagaError> {
        self.validate(request)?;

        let record = self
            .transfers
            .create(NewTransfer {
                source_account_id: request.source_account_id,
                dest_account_id: request.dest_account_id,
                amount: request.amount,
                request_key: request.request_key.clone(),
            })
            .await?;
        info!(
            transfer_id = record.id,
            source_account_id = request.source_account_id,
            dest_account_id = request.dest_account_id,
            amount = %request.amount,
            "Transfer accepted"
        );

        let debit = MovementRequest {
            account_id: request.source_account_id,
            direction: Direction::Debit,
            amount: request.amount,
            description: format!("Transfer to account {}", request.dest_account_id),
            request_key: format!("{}:debit", request.request_key),
        };
        if let Err(err) = self.apply_with_deadline(&debit).await {
            return Err(self.handle_debit_failure(record.id, request, err).await);
        }

        let credit = MovementRequest {
            account_id: request.dest_account_id,
            direction: Direction::Credit,
            amount: request.amount,
            description: format!("Transfer received from account {}", request.source_account_id),
            request_key: format!("{}:credit", request.request_key),
        };
        if let Err(err) = self.apply_with_deadline(&credit).await {
            return Err(self.handle_credit_failure(record.id, request, err).await);
        }

        if !self.transfers.conclude(record.id).await? {
            // Both legs landed; an unconcludable row is a store-level bug.
            return Err(SagaError::Store(format!(
                "transfer {} could not transition to CONCLUDED",
                record.id
            )));
        }
        let occurred_at = Utc::now();
        info!(transfer_id = record.id, "Transfer concluded");

        self.publish_completed(&record, occurred_at).await;
        Ok(self.receipt(&record, occurred_at))
    }

    fn validate(&self, request: &TransferRequest) -> Result<(), SagaError> {
        if request.source_account_id <= 0 || request.dest_account_id <= 0 {
            return Err(SagaError::Validation(
                "Account ids must be positive".to_string(),
            ));
        }
        if request.source_account_id == request.dest_account_id {
            return Err(SagaError::Validation(
                "Source and destination accounts cannot be the same".to_string(),
            ));
        }
        if request.amount <= Decimal::ZERO {
            return Err(SagaError::Validation(
                "Amount must be positive".to_string(),
            ));
        }
        if request.amount > self.config.max_amount {
            return Err(SagaError::Validation(format!(
                "Amount exceeds the {} per-transfer limit",
                self.config.max_amount
            )));
        }
        Ok(())
    }

    async fn apply_with_deadline(
        &self,
        request: &MovementRequest,
    ) -> Result<(), MovementError> {
        let deadline = Duration::from_millis(self.config.call_timeout_ms);
        match tokio::time::timeout(deadline, self.movements.apply(request)).await {
            Ok(result) => result,
            Err(_) => Err(MovementError::Timeout),
        }
    }

    async fn handle_debit_failure(
        &self,
        transfer_id: i64,
        request: &TransferRequest,
        err: MovementError,
    ) -> SagaError {
        if err.is_domain_rejection() {
            warn!(
                transfer_id,
                code = err.code(),
                "Debit rejected, no funds moved"
            );
            self.fail_transfer(transfer_id, FailureKind::DebitRejected, &err.to_string())
                .await;
            return SagaError::Rejected(err);
        }

        // Outcome unknown: the debit may have landed, so push the money back.
        error!(
            transfer_id,
            error = %err,
            "Debit outcome unknown, issuing compensating credit"
        );
        let (kind, message) = match self.compensate(transfer_id, request).await {
            Ok(()) => (FailureKind::DebitFailed, err.to_string()),
            Err(comp_err) => (
                FailureKind::CompensationFailed,
                format!("debit failed: {}; compensation failed: {}", err, comp_err),
            ),
        };
        self.fail_transfer(transfer_id, kind, &message).await;
        SagaError::Failed {
            transfer_id,
            kind,
            message,
        }
    }

    async fn handle_credit_failure(
        &self,
        transfer_id: i64,
        request: &TransferRequest,
        err: MovementError,
    ) -> SagaError {
        warn!(
            transfer_id,
            code = err.code(),
            "Credit failed after a confirmed debit, issuing compensating credit"
        );
        let (kind, message) = match self.compensate(transfer_id, request).await {
            Ok(()) => (FailureKind::CreditFailed, err.to_string()),
            Err(comp_err) => (
                FailureKind::CompensationFailed,
                format!("credit failed: {}; compensation failed: {}", err, comp_err),
            ),
        };
        self.fail_transfer(transfer_id, kind, &message).await;
        SagaError::Failed {
            transfer_id,
            kind,
            message,
        }
    }

    /// Credit the debited amount back onto the source account under a fresh
    /// key. Failure here means the money is stuck on the wrong side.
    async fn compensate(
        &self,
        transfer_id: i64,
        request: &TransferRequest,
    ) -> Result<(), MovementError> {
        let compensation = MovementRequest {
            account_id: request.source_account_id,
            direction: Direction::Credit,
            amount: request.amount,
            description: format!("Reversal of transfer {}", transfer_id),
            request_key: format!("reversal:{}", Uuid::new_v4()),
        };
        match self.apply_with_deadline(&compensation).await {
            Ok(()) => {
                info!(
                    transfer_id,
                    account_id = request.source_account_id,
                    amount = %request.amount,
                    "Compensating credit applied"
                );
                Ok(())
            }
            Err(err) => {
                error!(
                    alert = true,
                    transfer_id,
                    account_id = request.source_account_id,
                    amount = %request.amount,
                    error = %err,
                    "Compensating credit failed; funds stuck pending manual reconciliation"
                );
                Err(err)
            }
        }
    }

    async fn fail_transfer(&self, transfer_id: i64, kind: FailureKind, message: &str) {
        match self.transfers.fail(transfer_id, kind, message).await {
            Ok(true) => {}
            Ok(false) => warn!(
                transfer_id,
                "Transfer row was not PROCESSING while recording the failure"
            ),
            Err(err) => error!(
                transfer_id,
                error = %err,
                "Could not record transfer failure"
            ),
        }
    }

    /// Best-effort: the transfer is concluded whether or not the event goes
    /// out. An unpublished event means the fee is never assessed until
    /// reconciliation, which beats failing a transfer that already moved
    /// money.
    async fn publish_completed(&self, record: &TransferRecord, occurred_at: DateTime<Utc>) {
        let event = TransferCompleted {
            transfer_id: record.id,
            source_account_id: record.source_account_id,
            dest_account_id: record.dest_account_id,
            amount: record.amount,
            fee_applied: Decimal::ZERO,
            occurred_at,
            request_key: record.request_key.clone(),
        };
        let payload = match serde_json::to_value(&event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(transfer_id = record.id, error = %err, "Event not serializable");
                return;
            }
        };
        if let Err(err) = self
            .publisher
            .publish(&self.completed_topic, &record.id.to_string(), &payload)
            .await
        {
            error!(
                transfer_id = record.id,
                topic = %self.completed_topic,
                error = %err,
                "TransferCompleted not published; fee assessment will miss this transfer"
            );
        }
    }

    fn receipt(&self, record: &TransferRecord, occurred_at: DateTime<Utc>) -> TransferReceipt {
        TransferReceipt {
            transfer_id: self.codec.encode(record.id),
            source_account_id: self.codec.encode(record.source_account_id),
            dest_account_id: self.codec.encode(record.dest_account_id),
            amount: record.amount,
            fee_applied: None,
            status: TransferStatus::Concluded.as_str().to_string(),
            occurred_at,
        }
    }

    pub async fn transfer(&self, transfer_id: i64) -> Result<Option<TransferRecord>, SagaError> {
        self.transfers.get(transfer_id).await
    }

    /// Every transfer touching the account, either direction.
    pub async fn transfers_for_account(
        &self,
        account_id: i64,
    ) -> Result<Vec<TransferRecord>, SagaError> {
        self.transfers.for_account(account_id).await
    }

    /// Record that the compensating credit of a failed transfer has been
    /// confirmed. Valid only on failed transfers; repeating it is a no-op.
    pub async fn mark_reversed(&self, transfer_id: i64) -> Result<(), SagaError> {
        let record = self
            .transfers
            .get(transfer_id)
            .await?
            .ok_or(SagaError::TransferNotFound(transfer_id))?;

        if record.status != TransferStatus::Failed {
            return Err(SagaError::Validation(format!(
                "Only failed transfers can be marked reversed (status: {})",
                record.status
            )));
        }

        if self.transfers.mark_reversed(transfer_id).await? {
            info!(transfer_id, "Transfer marked reversed");
        }
        Ok(())
    }
}

/// Ledger snapshot for a rejected execution. The `errorCode` field is what
/// `replay` discriminates on; receipts never carry one.
fn rejection_snapshot(err: &SagaError) -> serde_json::Value {
    json!({
        "status": TransferStatus::Failed.as_str(),
        "errorCode": err.code(),
        "error": err.to_string(),
        "processedAt": Utc::now(),
    })
}
