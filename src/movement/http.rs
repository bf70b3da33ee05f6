//! HTTP implementation of [`MovementClient`].
//!
//! Talks to the account service's `POST /api/movements` endpoint. Rejections
//! come back as a JSON body with a machine-readable `code`; transport
//! failures map to the transient side of [`MovementError`].

use super::{MovementClient, MovementError, MovementRequest};
use async_trait::async_trait;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

pub struct HttpMovementClient {
    client: reqwest::Client,
    movements_url: String,
}

/// Wire body for `POST /api/movements`.
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MovementBody<'a> {
    request_key: &'a str,
    account_id: i64,
    amount: Decimal,
    /// "C" credit, "D" debit.
    movement_type: &'static str,
    description: &'a str,
}

/// Error body the account service returns on rejections.
#[derive(Deserialize)]
struct RemoteErrorBody {
    code: Option<String>,
    message: Option<String>,
}

impl HttpMovementClient {
    /// `base_url` is the account service root, e.g. `http://accounts:8080`.
    /// `timeout` bounds each request on the transport level; callers that
    /// need a tighter saga deadline wrap [`MovementClient::apply`] themselves.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self, MovementError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| MovementError::Remote(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            movements_url: format!("{}/api/movements", base_url.trim_end_matches('/')),
        })
    }
}

#[async_trait]
impl MovementClient for HttpMovementClient {
    async fn apply(&self, request: &MovementRequest) -> Result<(), MovementError> {
        let body = MovementBody {
            request_key: &request.request_key,
            account_id: request.account_id,
            amount: request.amount,
            movement_type: request.direction.wire_letter(),
            description: &request.description,
        };

        let response = self
            .client
            .post(&self.movements_url)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    MovementError::Timeout
                } else {
                    MovementError::Remote(format!("HTTP request failed: {}", e))
                }
            })?;

        let status = response.status();
        if status.is_success() {
            debug!(
                account_id = request.account_id,
                direction = %request.direction,
                request_key = %request.request_key,
                "Movement applied"
            );
            return Ok(());
        }

        let text = response.text().await.unwrap_or_default();
        if let Ok(remote) = serde_json::from_str::<RemoteErrorBody>(&text)
            && let Some(code) = remote.code
        {
            let message = remote.message.unwrap_or_else(|| "movement rejected".to_string());
            return Err(MovementError::from_remote(&code, &message));
        }

        // No machine-readable code: a 5xx is a fault on their side (outcome
        // unknown), anything else is a rejection we cannot classify further.
        if status.is_server_error() {
            Err(MovementError::Remote(format!("HTTP {}: {}", status, text)))
        } else {
            Err(MovementError::Rejected {
                code: format!("HTTP_{}", status.as_u16()),
                message: text,
            })
        }
    }
}
