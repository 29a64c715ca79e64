//! Gateway client port - round-trip notification confirmation.

use async_trait::async_trait;
use thiserror::Error;

/// Errors from the gateway validation round trip.
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Gateway answered, but did not confirm the payload as valid.
    #[error("Gateway rejected payload: {0}")]
    Rejected(String),

    /// Could not get an answer within the retry budget.
    #[error("Gateway unreachable: {0}")]
    Unreachable(String),
}

/// Re-submits a notification's canonical payload to the gateway's own
/// validation endpoint.
///
/// Defense in depth: a local signature check cannot detect a
/// compromised passphrase, the gateway asking "did you really send
/// this?" can. Implementations own the retry/backoff/timeout policy.
#[async_trait]
pub trait GatewayClient: Send + Sync {
    /// Confirms the canonical payload with the gateway. `Ok(())` only
    /// for an explicit VALID answer.
    async fn confirm(&self, canonical_payload: &str) -> Result<(), GatewayError>;
}
