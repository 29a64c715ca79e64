//! HTTP implementation of the GatewayClient port.
//!
//! Re-posts a notification's parameter string to the gateway's
//! validation endpoint and insists on the literal `VALID` answer.

use std::time::Duration;

use async_trait::async_trait;

use crate::ports::{GatewayClient, GatewayError};

const MAX_ATTEMPTS: u32 = 3;
const INITIAL_BACKOFF: Duration = Duration::from_millis(500);
const MAX_BACKOFF: Duration = Duration::from_secs(2);

/// Gateway validation client over HTTPS.
pub struct HttpGatewayClient {
    http_client: reqwest::Client,
    validate_url: String,
}

impl HttpGatewayClient {
    /// Creates a client for the given validation endpoint.
    ///
    /// `timeout` bounds each individual attempt, not the whole retry
    /// sequence.
    pub fn new(validate_url: String, timeout: Duration) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| GatewayError::Unreachable(format!("client construction: {}", e)))?;
        Ok(Self {
            http_client,
            validate_url,
        })
    }
}

#[async_trait]
impl GatewayClient for HttpGatewayClient {
    async fn confirm(&self, canonical_payload: &str) -> Result<(), GatewayError> {
        let mut backoff = INITIAL_BACKOFF;
        let mut last_error = String::new();

        for attempt in 1..=MAX_ATTEMPTS {
            let response = self
                .http_client
                .post(&self.validate_url)
                .header("Content-Type", "application/x-www-form-urlencoded")
                .body(canonical_payload.to_string())
                .send()
                .await;

            match response {
                Ok(response) if response.status().is_success() => {
                    let body = response
                        .text()
                        .await
                        .map_err(|e| GatewayError::Unreachable(e.to_string()))?;
                    // The endpoint answers with a bare token, either
                    // VALID or INVALID
                    return if body.trim() == "VALID" {
                        Ok(())
                    } else {
                        Err(GatewayError::Rejected(body.trim().to_string()))
                    };
                }
                Ok(response) => {
                    last_error = format!("HTTP {}", response.status());
                    tracing::warn!(
                        attempt,
                        status = %response.status(),
                        "gateway validation returned non-success"
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt, error = %e, "gateway validation attempt failed");
                }
            }

            if attempt < MAX_ATTEMPTS {
                tokio::time::sleep(backoff).await;
                backoff = (backoff * 2).min(MAX_BACKOFF);
            }
        }

        Err(GatewayError::Unreachable(format!(
            "{} attempts exhausted: {}",
            MAX_ATTEMPTS, last_error
        )))
    }
}
