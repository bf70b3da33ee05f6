//! Fee Assessment Consumer
//!
//! Consumes `TransferCompleted` deliveries, debits the fee from the source
//! account and records the outcome. Delivery is at-least-once: the offset
//! is only committed for handled deliveries, and the
//! `(transfer_id, topic, offset)` record in the fee store is what keeps a
//! redelivery from charging twice.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::events::{BrokerError, Delivery, EventPublisher, EventSource, FeeApplied, TransferCompleted};
use crate::movement::{Direction, MovementClient, MovementRequest};
use crate::retry::{RetryPolicy, with_backoff};
use crate::saga::TransferStore;

use super::policy::FeePolicy;
use super::store::{FeeProcessingRecord, FeeProcessingStatus, FeeStore, FeeStoreError};

/// Loop pacing for [`FeeConsumer::run`].
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Pause when the topic has nothing new.
    pub idle_poll_delay: Duration,
    /// Pause before re-polling an unacknowledged delivery.
    pub redelivery_delay: Duration,
    /// Pause after a broker error.
    pub error_backoff: Duration,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            idle_poll_delay: Duration::from_millis(200),
            redelivery_delay: Duration::from_secs(1),
            error_backoff: Duration::from_secs(5),
        }
    }
}

pub struct FeeConsumer {
    fees: Arc<dyn FeeStore>,
    transfers: Arc<dyn TransferStore>,
    movements: Arc<dyn MovementClient>,
    publisher: Arc<dyn EventPublisher>,
    policy: FeePolicy,
    retry: RetryPolicy,
    fee_topic: String,
    config: ConsumerConfig,
}

impl FeeConsumer {
    pub fn new(
        fees: Arc<dyn FeeStore>,
        transfers: Arc<dyn TransferStore>,
        movements: Arc<dyn MovementClient>,
        publisher: Arc<dyn EventPublisher>,
        policy: FeePolicy,
        retry: RetryPolicy,
        fee_topic: impl Into<String>,
    ) -> Self {
        Self {
            fees,
            transfers,
            movements,
            publisher,
            policy,
            retry,
            fee_topic: fee_topic.into(),
            config: ConsumerConfig::default(),
        }
    }

    pub fn with_config(mut self, config: ConsumerConfig) -> Self {
        self.config = config;
        self
    }

    /// Consume forever. Handled deliveries are committed; unhandled ones are
    /// re-polled after a pause so the partition does not spin hot.
    pub async fn run(&self, source: &dyn EventSource) -> ! {
        info!(fee_topic = %self.fee_topic, "Starting fee consumer");

        loop {
            match source.poll().await {
                Ok(Some(delivery)) => {
                    if self.process(&delivery).await {
                        if let Err(err) = source.commit(&delivery).await {
                            // Redelivery of a handled message is safe; the
                            // dedupe record absorbs it.
                            error!(
                                offset = delivery.offset,
                                error = %err,
                                "Offset commit failed"
                            );
                        }
                    } else {
                        warn!(
                            offset = delivery.offset,
                            "Delivery unacknowledged, will be redelivered"
                        );
                        tokio::time::sleep(self.config.redelivery_delay).await;
                    }
                }
                Ok(None) => tokio::time::sleep(self.config.idle_poll_delay).await,
                Err(err) => {
                    error!(error = %err, "Broker poll failed");
                    tokio::time::sleep(self.config.error_backoff).await;
                }
            }
        }
    }

    /// Process everything currently on the topic, committing handled
    /// deliveries. Stops at the first unhandled delivery (it would only be
    /// re-polled). Returns how many were handled.
    pub async fn drain(&self, source: &dyn EventSource) -> Result<usize, BrokerError> {
        let mut handled = 0;
        while let Some(delivery) = source.poll().await? {
            if !self.process(&delivery).await {
                break;
            }
            source.commit(&delivery).await?;
            handled += 1;
        }
        Ok(handled)
    }

    /// Handle one delivery. `true` means the offset can be committed.
    pub async fn process(&self, delivery: &Delivery) -> bool {
        let event: TransferCompleted = match serde_json::from_str(&delivery.payload) {
            Ok(event) => event,
            Err(err) => {
                // Poison message: redelivering it forever would wedge the
                // partition, so it is skipped as handled.
                error!(
                    topic = %delivery.topic,
                    offset = delivery.offset,
                    error = %err,
                    "Undecodable payload, skipping delivery"
                );
                return true;
            }
        };

        match self.assess(&event, delivery).await {
            Ok(handled) => handled,
            Err(err) => {
                error!(
                    transfer_id = event.transfer_id,
                    error = %err,
                    "Fee store error, leaving delivery unacknowledged"
                );
                false
            }
        }
    }

    async fn assess(
        &self,
        event: &TransferCompleted,
        delivery: &Delivery,
    ) -> Result<bool, FeeStoreError> {
        // A Success row means this exact delivery already charged the fee.
        // A Failure row does not short-circuit: this redelivery is the retry.
        if let Some(existing) = self
            .fees
            .find(event.transfer_id, &delivery.topic, delivery.offset)
            .await?
            && existing.status == FeeProcessingStatus::Success
        {
            info!(
                transfer_id = event.transfer_id,
                offset = delivery.offset,
                "Delivery already processed, skipping"
            );
            return Ok(true);
        }

        let fee = self.policy.assess(event.amount);
        info!(
            transfer_id = event.transfer_id,
            account_id = event.source_account_id,
            fee = %fee,
            "Assessing transfer fee"
        );

        // One key for the whole retry loop below; a later redelivery mints a
        // fresh nonce and the account service sees a new movement.
        let movement = MovementRequest {
            account_id: event.source_account_id,
            direction: Direction::Debit,
            amount: fee,
            description: format!("Fee for transfer {}", event.transfer_id),
            request_key: format!("fee:{}:{}", event.transfer_id, Uuid::new_v4().simple()),
        };

        let applied = with_backoff(&self.retry, |attempt| {
            let movement = &movement;
            async move {
                match self.movements.apply(movement).await {
                    Ok(()) => Ok(()),
                    Err(err) => {
                        warn!(
                            transfer_id = event.transfer_id,
                            attempt,
                            error = %err,
                            "Fee application attempt failed"
                        );
                        Err(err)
                    }
                }
            }
        })
        .await;

        let processed_at = Utc::now();
        match applied {
            Ok(()) => {
                self.fees
                    .upsert(&FeeProcessingRecord {
                        transfer_id: event.transfer_id,
                        topic: delivery.topic.clone(),
                        offset: delivery.offset,
                        account_id: event.source_account_id,
                        fee_amount: fee,
                        status: FeeProcessingStatus::Success,
                        message: String::new(),
                        processed_at,
                    })
                    .await?;

                self.record_fee_on_transfer(event.transfer_id, fee).await;
                self.publish_fee_applied(event, fee, processed_at).await;

                info!(transfer_id = event.transfer_id, fee = %fee, "Fee applied");
                Ok(true)
            }
            Err(err) => {
                self.fees
                    .upsert(&FeeProcessingRecord {
                        transfer_id: event.transfer_id,
                        topic: delivery.topic.clone(),
                        offset: delivery.offset,
                        account_id: event.source_account_id,
                        fee_amount: fee,
                        status: FeeProcessingStatus::Failure,
                        message: err.to_string(),
                        processed_at,
                    })
                    .await?;

                warn!(
                    transfer_id = event.transfer_id,
                    error = %err,
                    "Fee application exhausted retries, delivery left unacknowledged"
                );
                Ok(false)
            }
        }
    }

    /// Best-effort bookkeeping: the fee already landed remotely and is
    /// recorded in the fee store, so a miss here must not force a
    /// redelivery.
    async fn record_fee_on_transfer(&self, transfer_id: i64, fee: Decimal) {
        match self.transfers.set_fee_applied(transfer_id, fee).await {
            Ok(true) => {}
            Ok(false) => warn!(
                transfer_id,
                "No concluded transfer row to record the fee on"
            ),
            Err(err) => error!(
                transfer_id,
                error = %err,
                "Could not record the fee on the transfer row"
            ),
        }
    }

    async fn publish_fee_applied(
        &self,
        event: &TransferCompleted,
        fee: Decimal,
        processed_at: DateTime<Utc>,
    ) {
        let fee_event = FeeApplied {
            fee_id: Uuid::new_v4().to_string(),
            transfer_id: event.transfer_id,
            account_id: event.source_account_id,
            transfer_amount: event.amount,
            fee_amount: fee,
            transferred_at: event.occurred_at,
            processed_at,
            request_key: event.request_key.clone(),
        };
        let payload = match serde_json::to_value(&fee_event) {
            Ok(payload) => payload,
            Err(err) => {
                error!(transfer_id = event.transfer_id, error = %err, "Event not serializable");
                return;
            }
        };
        if let Err(err) = self
            .publisher
            .publish(&self.fee_topic, &event.transfer_id.to_string(), &payload)
            .await
        {
            error!(
                transfer_id = event.transfer_id,
                topic = %self.fee_topic,
                error = %err,
                "FeeApplied not published"
            );
        }
    }
}
