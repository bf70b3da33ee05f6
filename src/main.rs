//! LedgerLink - Money Movement Coordination
//!
//! Demo entry point. Architecture:
//!
//! ```text
//! ┌─────────┐    ┌─────────────┐    ┌────────────────┐
//! │ Request │───▶│ Idempotency │───▶│ Transfer saga  │───▶ account ledger
//! │  (key)  │    │   ledger    │    │ debit ▸ credit │
//! └─────────┘    └─────────────┘    └───────┬────────┘
//!                                           │ TransferCompleted
//!                                           ▼
//!                                   ┌──────────────┐
//!                                   │ Fee consumer │───▶ fee debit + FeeApplied
//!                                   └──────────────┘
//! ```
//!
//! Everything here runs against the in-memory collaborators. A deployment
//! swaps in `PgIdempotencyStore`, `PgTransferStore`, `PgFeeStore`,
//! `HttpMovementClient` and a real broker behind the same seams.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;

use ledgerlink::config::AppConfig;
use ledgerlink::events::MemoryBroker;
use ledgerlink::fee::{FeeConsumer, FeePolicy, MemoryFeeStore};
use ledgerlink::idempotency::{IdempotencyStore, MemoryIdempotencyStore};
use ledgerlink::movement::{MemoryLedger, MovementError};
use ledgerlink::retry::RetryPolicy;
use ledgerlink::saga::{MemoryTransferStore, SagaError, TransferOrchestrator, TransferRequest};
use ledgerlink::token::IdCodec;

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let app_config = AppConfig::load_or_default(&env);
    let _log_guard = ledgerlink::logging::init_logging(&app_config);

    tracing::info!("Starting LedgerLink in {} mode", env);
    println!("=== LedgerLink: Transfer Saga Demo ===\n");

    // ============================================================
    // WIRING
    // ============================================================

    println!("[1] Wiring in-memory stack...");

    let ledger = Arc::new(MemoryIdempotencyStore::new());
    let transfers = Arc::new(MemoryTransferStore::new());
    let accounts = Arc::new(MemoryLedger::new());
    let fees = Arc::new(MemoryFeeStore::new());
    let broker = Arc::new(MemoryBroker::new());

    accounts.open_account(1, Decimal::new(50000, 2)); // 500.00
    accounts.open_account(2, Decimal::ZERO);

    let codec = IdCodec::new(&app_config.codec.secret)?;
    let orchestrator = TransferOrchestrator::new(
        ledger.clone(),
        transfers.clone(),
        accounts.clone(),
        broker.clone(),
        codec.clone(),
        app_config.transfer.clone(),
        app_config.broker.transfer_completed_topic.clone(),
    );

    let consumer = FeeConsumer::new(
        fees.clone(),
        transfers.clone(),
        accounts.clone(),
        broker.clone(),
        FeePolicy::from_config(&app_config.fee),
        RetryPolicy::new(
            app_config.fee.max_attempts,
            Duration::from_millis(app_config.fee.base_backoff_ms),
        ),
        app_config.broker.fee_applied_topic.clone(),
    );
    let source = broker.subscribe(
        &app_config.broker.consumer_group,
        &app_config.broker.transfer_completed_topic,
    );

    println!("✅ Accounts opened: #1 = 500.00, #2 = 0.00\n");

    // ============================================================
    // HAPPY PATH + REPLAY
    // ============================================================

    println!("[2] Transferring 100.50 from account 1 to account 2...");

    let request = TransferRequest {
        request_key: "demo-transfer-1".to_string(),
        source_account_id: 1,
        dest_account_id: 2,
        amount: Decimal::new(10050, 2),
    };
    let receipt = orchestrator.execute(request.clone()).await?;
    println!(
        "    Receipt: id={} status={}",
        receipt.transfer_id, receipt.status
    );
    println!(
        "    Token decodes back to internal id {}",
        codec.decode(&receipt.transfer_id)?
    );

    let replayed = orchestrator.execute(request).await?;
    println!(
        "    Replay under the same key returns the recorded receipt: id={}\n",
        replayed.transfer_id
    );

    // ============================================================
    // FEE ASSESSMENT
    // ============================================================

    println!("[3] Draining the fee consumer...");

    let handled = consumer.drain(&source).await?;
    println!(
        "    Handled {} delivery(ies); {} FeeApplied event(s) published",
        handled,
        broker.message_count(&app_config.broker.fee_applied_topic)
    );
    println!(
        "    Balances: #1 = {}  #2 = {}\n",
        accounts.balance(1).unwrap_or_default(),
        accounts.balance(2).unwrap_or_default()
    );

    // ============================================================
    // REJECTION + RECORDED VERDICT
    // ============================================================

    println!("[4] Attempting a transfer beyond the source balance...");

    let doomed = TransferRequest {
        request_key: "demo-transfer-2".to_string(),
        source_account_id: 1,
        dest_account_id: 2,
        amount: Decimal::new(999_900, 2),
    };
    match orchestrator.execute(doomed.clone()).await {
        Ok(_) => println!("    Unexpected success"),
        Err(err) => println!("    Rejected: {} ({})", err, err.code()),
    }
    match orchestrator.execute(doomed).await {
        Ok(_) => println!("    Unexpected success"),
        Err(err) => println!("    Replay serves the recorded verdict: {}\n", err.code()),
    }

    // ============================================================
    // COMPENSATION + MANUAL REVERSAL
    // ============================================================

    println!("[5] Forcing a credit failure to show compensation...");

    accounts.fail_credits_to(2, MovementError::Remote("credit service down".to_string()));
    let unlucky = TransferRequest {
        request_key: "demo-transfer-3".to_string(),
        source_account_id: 1,
        dest_account_id: 2,
        amount: Decimal::new(5000, 2),
    };
    match orchestrator.execute(unlucky).await {
        Err(SagaError::Failed {
            transfer_id, kind, ..
        }) => {
            println!("    Transfer {} failed with {}", transfer_id, kind);
            println!(
                "    Source balance after compensation: {}",
                accounts.balance(1).unwrap_or_default()
            );
            orchestrator.mark_reversed(transfer_id).await?;
            println!("    Reversal confirmed by operations: marked reversed");
        }
        other => println!("    Unexpected outcome: {:?}", other.map(|r| r.status)),
    }
    accounts.clear_credit_failure(2);

    // ============================================================
    // LEDGER HEALTH
    // ============================================================

    let stale = ledger
        .find_stale_pending(Duration::from_secs(app_config.idempotency.stale_after_secs))
        .await?;
    println!("\n[6] Stale pending idempotency records: {}", stale.len());

    println!(
        "Final balances: #1 = {}  #2 = {}",
        accounts.balance(1).unwrap_or_default(),
        accounts.balance(2).unwrap_or_default()
    );
    println!("\n=== Done ===");

    Ok(())
}
