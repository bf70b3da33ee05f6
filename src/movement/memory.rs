//! In-process account ledger implementing [`MovementClient`].
//!
//! Used by tests and the demo binary in place of the real account service.
//! Keeps balances, honors the request-key idempotency contract, and exposes
//! knobs to inject failures and latency for saga and fee-consumer tests.

use super::{Direction, MovementClient, MovementError, MovementRequest};
use async_trait::async_trait;
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

#[derive(Debug, Clone)]
struct Account {
    balance: Decimal,
    active: bool,
}

#[derive(Default)]
pub struct MemoryLedger {
    accounts: DashMap<i64, Account>,
    /// Request keys already applied; replays return success without moving
    /// money again. Only successful movements are recorded.
    applied: DashMap<String, ()>,
    /// Errors injected into upcoming calls, front first.
    scripted_failures: Mutex<VecDeque<MovementError>>,
    /// Accounts whose credits always fail. Debits are unaffected.
    credit_failures: DashMap<i64, MovementError>,
    /// Artificial latency per call, for deadline tests.
    delay: Mutex<Option<Duration>>,
    debit_count: AtomicUsize,
    credit_count: AtomicUsize,
}

impl MemoryLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_account(&self, account_id: i64, opening_balance: Decimal) {
        self.accounts.insert(
            account_id,
            Account {
                balance: opening_balance,
                active: true,
            },
        );
    }

    pub fn deactivate(&self, account_id: i64) {
        if let Some(mut account) = self.accounts.get_mut(&account_id) {
            account.active = false;
        }
    }

    pub fn balance(&self, account_id: i64) -> Option<Decimal> {
        self.accounts.get(&account_id).map(|a| a.balance)
    }

    /// Fail the next `failures` calls with clones of `error`, regardless of
    /// account or direction.
    pub fn fail_next(&self, failures: usize, error: MovementError) {
        let mut scripted = self.scripted_failures.lock().unwrap();
        for _ in 0..failures {
            scripted.push_back(error.clone());
        }
    }

    pub fn fail_credits_to(&self, account_id: i64, error: MovementError) {
        self.credit_failures.insert(account_id, error);
    }

    pub fn clear_credit_failure(&self, account_id: i64) {
        self.credit_failures.remove(&account_id);
    }

    pub fn set_delay(&self, delay: Option<Duration>) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Debit attempts seen, including failed ones.
    pub fn debit_count(&self) -> usize {
        self.debit_count.load(Ordering::SeqCst)
    }

    /// Credit attempts seen, including failed ones.
    pub fn credit_count(&self) -> usize {
        self.credit_count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MovementClient for MemoryLedger {
    async fn apply(&self, request: &MovementRequest) -> Result<(), MovementError> {
        match request.direction {
            Direction::Debit => self.debit_count.fetch_add(1, Ordering::SeqCst),
            Direction::Credit => self.credit_count.fetch_add(1, Ordering::SeqCst),
        };

        let delay = *self.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(error) = self.scripted_failures.lock().unwrap().pop_front() {
            return Err(error);
        }

        // Replay of an already-applied key: success, nothing moves twice.
        if self.applied.contains_key(&request.request_key) {
            return Ok(());
        }

        if request.amount <= Decimal::ZERO {
            return Err(MovementError::InvalidValue);
        }

        if request.direction == Direction::Credit
            && let Some(error) = self.credit_failures.get(&request.account_id)
        {
            return Err(error.value().clone());
        }

        let mut account = self
            .accounts
            .get_mut(&request.account_id)
            .ok_or(MovementError::AccountNotFound)?;
        if !account.active {
            return Err(MovementError::InactiveAccount);
        }

        match request.direction {
            Direction::Debit => {
                if account.balance < request.amount {
                    return Err(MovementError::InsufficientBalance);
                }
                account.balance -= request.amount;
            }
            Direction::Credit => {
                account.balance += request.amount;
            }
        }
        drop(account);

        self.applied.insert(request.request_key.clone(), ());
        Ok(())
    }
}
