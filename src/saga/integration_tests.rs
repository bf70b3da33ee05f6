//! Integration Tests for the Transfer Saga
//!
//! These tests drive the orchestrator end to end against the in-memory
//! idempotency ledger, transfer store, account ledger and broker. No
//! database or broker process is needed.

#[cfg(test)]
mod integration_tests {
    use std::sync::Arc;
    use std::time::Duration;

    use rust_decimal::Decimal;

    use crate::config::TransferConfig;
    use crate::events::{MemoryBroker, TransferCompleted};
    use crate::idempotency::{IdempotencyStore, MemoryIdempotencyStore};
    use crate::movement::{MemoryLedger, MovementError};
    use crate::saga::error::SagaError;
    use crate::saga::orchestrator::TransferOrchestrator;
    use crate::saga::status::{FailureKind, TransferStatus};
    use crate::saga::store::{MemoryTransferStore, TransferStore};
    use crate::saga::types::TransferRequest;
    use crate::token::IdCodec;

    /// Orchestrator wired to in-memory collaborators, with handles kept for
    /// assertions. Account 1 starts with 500.00, account 2 with zero.
    struct TestHarness {
        orchestrator: TransferOrchestrator,
        accounts: Arc<MemoryLedger>,
        transfers: Arc<MemoryTransferStore>,
        ledger: Arc<MemoryIdempotencyStore>,
        broker: Arc<MemoryBroker>,
        codec: IdCodec,
    }

    impl TestHarness {
        fn new() -> Self {
            Self::with_config(TransferConfig::default())
        }

        fn with_config(config: TransferConfig) -> Self {
            let ledger = Arc::new(MemoryIdempotencyStore::new());
            let transfers = Arc::new(MemoryTransferStore::new());
            let accounts = Arc::new(MemoryLedger::new());
            let broker = Arc::new(MemoryBroker::new());
            let codec = IdCodec::new("integration-secret").unwrap();

            accounts.open_account(1, Decimal::new(50000, 2));
            accounts.open_account(2, Decimal::ZERO);

            let orchestrator = TransferOrchestrator::new(
                ledger.clone(),
                transfers.clone(),
                accounts.clone(),
                broker.clone(),
                codec.clone(),
                config,
                "transfer-completed",
            );

            Self {
                orchestrator,
                accounts,
                transfers,
                ledger,
                broker,
                codec,
            }
        }

        fn request(&self, key: &str, amount: Decimal) -> TransferRequest {
            TransferRequest {
                request_key: key.to_string(),
                source_account_id: 1,
                dest_account_id: 2,
                amount,
            }
        }
    }

    // ========================================================================
    // Happy Path
    // ========================================================================

    /// 100.00 from account 1 to account 2: balances move zero-sum, the row
    /// concludes, the event goes out, and the receipt carries opaque ids.
    #[tokio::test]
    async fn test_transfer_happy_path_is_zero_sum() {
        let h = TestHarness::new();

        let receipt = h
            .orchestrator
            .execute(h.request("req-1", Decimal::new(10000, 2)))
            .await
            .unwrap();

        assert_eq!(receipt.status, "CONCLUDED");
        assert_eq!(receipt.amount, Decimal::new(10000, 2));
        assert!(receipt.fee_applied.is_none());

        // Receipt ids are opaque tokens that decode back to the real ids.
        let transfer_id = h.codec.decode(&receipt.transfer_id).unwrap();
        assert_eq!(h.codec.decode(&receipt.source_account_id).unwrap(), 1);
        assert_eq!(h.codec.decode(&receipt.dest_account_id).unwrap(), 2);

        assert_eq!(h.accounts.balance(1), Some(Decimal::new(40000, 2)));
        assert_eq!(h.accounts.balance(2), Some(Decimal::new(10000, 2)));

        let record = h.transfers.get(transfer_id).await.unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Concluded);
        assert_eq!(record.request_key, "req-1");

        let payloads = h.broker.payloads("transfer-completed");
        assert_eq!(payloads.len(), 1);
        let event: TransferCompleted = serde_json::from_str(&payloads[0]).unwrap();
        assert_eq!(event.transfer_id, transfer_id);
        assert_eq!(event.amount, Decimal::new(10000, 2));
        assert_eq!(event.request_key, "req-1");
    }

    // ========================================================================
    // Idempotency
    // ========================================================================

    /// Resubmitting the same request key replays the recorded receipt; money
    /// moves exactly once and only one event is published.
    #[tokio::test]
    async fn test_replay_returns_identical_receipt_without_remote_calls() {
        let h = TestHarness::new();
        let request = h.request("req-replay", Decimal::new(10000, 2));

        let first = h.orchestrator.execute(request.clone()).await.unwrap();
        let second = h.orchestrator.execute(request).await.unwrap();

        assert_eq!(first, second);
        assert_eq!(h.accounts.debit_count(), 1);
        assert_eq!(h.accounts.credit_count(), 1);
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(40000, 2)));
        assert_eq!(h.broker.message_count("transfer-completed"), 1);
    }

    /// A rejected submission is a verdict too: the replay sees the identical
    /// code instead of re-running validation.
    #[tokio::test]
    async fn test_validation_rejections_replay_the_same_code() {
        let h = TestHarness::new();
        let mut request = h.request("req-bad", Decimal::new(10000, 2));
        request.dest_account_id = 1; // same as source

        let err = h.orchestrator.execute(request.clone()).await.unwrap_err();
        assert!(matches!(err, SagaError::Validation(_)));

        match h.orchestrator.execute(request).await.unwrap_err() {
            SagaError::ReplayedFailure { code, .. } => assert_eq!(code, "VALIDATION_ERROR"),
            other => panic!("expected replayed failure, got {:?}", other),
        }

        // Validation ran before any remote call or transfer row.
        assert_eq!(h.accounts.debit_count(), 0);
        assert_eq!(h.accounts.credit_count(), 0);
        assert!(h.transfers.for_account(1).await.unwrap().is_empty());
    }

    /// A key claimed by a writer that never finished replays as pending; the
    /// saga must not run again underneath it.
    #[tokio::test]
    async fn test_replay_of_pending_key_does_not_run_the_saga() {
        let h = TestHarness::new();
        h.ledger.begin("req-crashed", None).await.unwrap();

        let err = h
            .orchestrator
            .execute(h.request("req-crashed", Decimal::new(10000, 2)))
            .await
            .unwrap_err();

        assert!(matches!(err, SagaError::ReplayPending));
        assert_eq!(h.accounts.debit_count(), 0);
    }

    #[tokio::test]
    async fn test_empty_request_key_is_rejected() {
        let h = TestHarness::new();
        let err = h
            .orchestrator
            .execute(h.request("", Decimal::ONE))
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    // ========================================================================
    // Validation
    // ========================================================================

    #[tokio::test]
    async fn test_amount_above_limit_is_rejected_before_any_call() {
        let h = TestHarness::new();
        let err = h
            .orchestrator
            .execute(h.request("req-limit", Decimal::new(1_000_001, 0)))
            .await
            .unwrap_err();

        assert_eq!(err.code(), "VALIDATION_ERROR");
        assert_eq!(h.accounts.debit_count(), 0);
        assert!(h.transfers.for_account(1).await.unwrap().is_empty());
    }

    // ========================================================================
    // Failure & Compensation
    // ========================================================================

    /// A domain rejection on the debit means nothing moved: the row fails as
    /// DEBIT_REJECTED and no compensating credit is issued.
    #[tokio::test]
    async fn test_debit_rejection_fails_without_compensation() {
        let h = TestHarness::new();

        // More than the 500.00 balance, still under the transfer limit.
        let err = h
            .orchestrator
            .execute(h.request("req-poor", Decimal::new(90000, 2)))
            .await
            .unwrap_err();

        match &err {
            SagaError::Rejected(movement) => {
                assert_eq!(movement.code(), "INSUFFICIENT_BALANCE")
            }
            other => panic!("expected rejection, got {:?}", other),
        }

        assert_eq!(h.accounts.credit_count(), 0);
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(50000, 2)));

        let record = &h.transfers.for_account(1).await.unwrap()[0];
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::DebitRejected));
        assert_eq!(h.broker.message_count("transfer-completed"), 0);
    }

    /// Credit fails after a confirmed debit: the compensating credit puts
    /// the money back and the row fails as CREDIT_FAILED, net zero.
    #[tokio::test]
    async fn test_credit_failure_compensates_back_to_source() {
        let h = TestHarness::new();
        h.accounts
            .fail_credits_to(2, MovementError::Remote("account service down".to_string()));

        let err = h
            .orchestrator
            .execute(h.request("req-comp", Decimal::new(10000, 2)))
            .await
            .unwrap_err();

        match err {
            SagaError::Failed { kind, .. } => assert_eq!(kind, FailureKind::CreditFailed),
            other => panic!("expected failed saga, got {:?}", other),
        }

        // One debit, then the failed credit plus the compensation.
        assert_eq!(h.accounts.debit_count(), 1);
        assert_eq!(h.accounts.credit_count(), 2);
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(50000, 2)));
        assert_eq!(h.accounts.balance(2), Some(Decimal::ZERO));

        let record = &h.transfers.for_account(1).await.unwrap()[0];
        assert_eq!(record.status, TransferStatus::Failed);
        assert_eq!(record.failure_kind, Some(FailureKind::CreditFailed));
        assert_eq!(h.broker.message_count("transfer-completed"), 0);
    }

    /// Credit AND compensation both fail: the saga records
    /// COMPENSATION_FAILED, the reconciliation-required kind, and the money
    /// stays on the wrong side.
    #[tokio::test]
    async fn test_compensation_failure_is_flagged_for_reconciliation() {
        let h = TestHarness::new();
        h.accounts
            .fail_credits_to(2, MovementError::Remote("down".to_string()));
        h.accounts
            .fail_credits_to(1, MovementError::Remote("still down".to_string()));

        let err = h
            .orchestrator
            .execute(h.request("req-stuck", Decimal::new(10000, 2)))
            .await
            .unwrap_err();

        match err {
            SagaError::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::CompensationFailed);
                assert!(message.contains("compensation failed"));
                assert!(kind.needs_reconciliation());
            }
            other => panic!("expected failed saga, got {:?}", other),
        }

        // Debited and never restored.
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(40000, 2)));
        assert_eq!(h.accounts.balance(2), Some(Decimal::ZERO));

        let record = &h.transfers.for_account(1).await.unwrap()[0];
        assert_eq!(record.failure_kind, Some(FailureKind::CompensationFailed));
    }

    /// Transport failure on the debit leaves the outcome unknown; the saga
    /// assumes the worst and pushes the amount back. When the debit in fact
    /// never landed (as simulated here) that push-back overshoots; that is
    /// the accepted price of compensating without a remote outcome query.
    #[tokio::test]
    async fn test_debit_transport_failure_is_compensated() {
        let h = TestHarness::new();
        h.accounts.fail_next(1, MovementError::Timeout);

        let err = h
            .orchestrator
            .execute(h.request("req-unknown", Decimal::new(10000, 2)))
            .await
            .unwrap_err();

        match err {
            SagaError::Failed { kind, .. } => assert_eq!(kind, FailureKind::DebitFailed),
            other => panic!("expected failed saga, got {:?}", other),
        }

        assert_eq!(h.accounts.debit_count(), 1);
        assert_eq!(h.accounts.credit_count(), 1);
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(60000, 2)));
        assert_eq!(h.accounts.balance(2), Some(Decimal::ZERO));
    }

    /// A wedged account service trips the per-call deadline on the debit and
    /// on the compensation attempt; nothing lands and the saga reports the
    /// stuck-funds kind.
    #[tokio::test]
    async fn test_wedged_account_service_hits_the_deadline() {
        let h = TestHarness::with_config(TransferConfig {
            max_amount: Decimal::new(1_000_000, 0),
            call_timeout_ms: 30,
        });
        h.accounts.set_delay(Some(Duration::from_millis(150)));

        let err = h
            .orchestrator
            .execute(h.request("req-wedged", Decimal::new(10000, 2)))
            .await
            .unwrap_err();

        match err {
            SagaError::Failed { kind, message, .. } => {
                assert_eq!(kind, FailureKind::CompensationFailed);
                assert!(message.contains("timed out"));
            }
            other => panic!("expected failed saga, got {:?}", other),
        }

        // Calls were cancelled mid-flight; balances never changed.
        assert_eq!(h.accounts.balance(1), Some(Decimal::new(50000, 2)));
        assert_eq!(h.accounts.balance(2), Some(Decimal::ZERO));
    }

    // ========================================================================
    // Publishing
    // ========================================================================

    /// The event is best-effort: a broker outage must not fail a transfer
    /// that already moved money.
    #[tokio::test]
    async fn test_publish_failure_does_not_fail_the_transfer() {
        let h = TestHarness::new();
        h.broker.set_fail_publish(true);

        let receipt = h
            .orchestrator
            .execute(h.request("req-pub", Decimal::new(10000, 2)))
            .await
            .unwrap();

        assert_eq!(receipt.status, "CONCLUDED");
        assert_eq!(h.accounts.balance(2), Some(Decimal::new(10000, 2)));
        assert_eq!(h.broker.message_count("transfer-completed"), 0);

        let transfer_id = h.codec.decode(&receipt.transfer_id).unwrap();
        let record = h.transfers.get(transfer_id).await.unwrap().unwrap();
        assert_eq!(record.status, TransferStatus::Concluded);
    }

    // ========================================================================
    // Reversal marker & history
    // ========================================================================

    #[tokio::test]
    async fn test_mark_reversed_only_after_failure() {
        let h = TestHarness::new();

        // Concluded transfers cannot be marked reversed.
        let receipt = h
            .orchestrator
            .execute(h.request("req-ok", Decimal::new(5000, 2)))
            .await
            .unwrap();
        let concluded_id = h.codec.decode(&receipt.transfer_id).unwrap();
        let err = h.orchestrator.mark_reversed(concluded_id).await.unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");

        // A compensated failure can, and repeating it is a no-op.
        h.accounts
            .fail_credits_to(2, MovementError::Remote("down".to_string()));
        let err = h
            .orchestrator
            .execute(h.request("req-fail", Decimal::new(5000, 2)))
            .await
            .unwrap_err();
        let SagaError::Failed { transfer_id, .. } = err else {
            panic!("expected failed saga");
        };

        h.orchestrator.mark_reversed(transfer_id).await.unwrap();
        h.orchestrator.mark_reversed(transfer_id).await.unwrap();

        let record = h.transfers.get(transfer_id).await.unwrap().unwrap();
        assert!(record.reversed);

        let err = h.orchestrator.mark_reversed(999_999).await.unwrap_err();
        assert!(matches!(err, SagaError::TransferNotFound(999_999)));
    }

    #[tokio::test]
    async fn test_account_history_covers_both_sides() {
        let h = TestHarness::new();
        h.orchestrator
            .execute(h.request("h1", Decimal::new(1000, 2)))
            .await
            .unwrap();
        h.orchestrator
            .execute(h.request("h2", Decimal::new(2000, 2)))
            .await
            .unwrap();

        let source_history = h.orchestrator.transfers_for_account(1).await.unwrap();
        let dest_history = h.orchestrator.transfers_for_account(2).await.unwrap();
        assert_eq!(source_history.len(), 2);
        assert_eq!(dest_history.len(), 2);
        assert!(
            source_history
                .iter()
                .all(|r| r.status == TransferStatus::Concluded)
        );

        let fetched = h.orchestrator.transfer(source_history[0].id).await.unwrap();
        assert_eq!(fetched.unwrap().id, source_history[0].id);
    }
}
