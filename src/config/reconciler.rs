//! Reservation reconciler configuration

use secrecy::SecretString;
use serde::Deserialize;

use super::error::ValidationError;

/// Reservation expiry reconciler configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ReconcilerConfig {
    /// Shared secret required to trigger a reconcile run over HTTP;
    /// unset means the endpoint is open (logged loudly at startup)
    #[serde(default)]
    pub trigger_secret: Option<SecretString>,

    /// How many expired reservations a single run may process
    #[serde(default = "default_batch_limit")]
    pub batch_limit: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            trigger_secret: None,
            batch_limit: default_batch_limit(),
        }
    }
}

impl ReconcilerConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.batch_limit == 0 {
            return Err(ValidationError::InvalidBatchLimit);
        }
        Ok(())
    }
}

fn default_batch_limit() -> u32 {
    500
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReconcilerConfig::default().validate().is_ok());
    }

    #[test]
    fn zero_batch_limit_fails() {
        let config = ReconcilerConfig {
            batch_limit: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
