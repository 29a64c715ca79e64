//! Payment gateway configuration

use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use std::time::Duration;

use crate::domain::foundation::Money;
use crate::domain::gateway::AllowRule;

use super::error::ValidationError;

/// Payment gateway configuration
#[derive(Debug, Clone, Deserialize)]
pub struct GatewayConfig {
    /// Merchant account identifier at the gateway
    pub merchant_id: String,

    /// Merchant key used in the redirect parameter set
    pub merchant_key: SecretString,

    /// Optional shared passphrase appended to signed parameter strings
    #[serde(default)]
    pub passphrase: Option<SecretString>,

    /// Gateway checkout URL the shopper is redirected to
    #[serde(default = "default_process_url")]
    pub process_url: String,

    /// Gateway endpoint for round-trip notification validation
    #[serde(default = "default_validate_url")]
    pub validate_url: String,

    /// Whether to perform the round-trip validation at all
    #[serde(default = "default_true")]
    pub confirm_with_gateway: bool,

    /// Per-attempt timeout for the round trip, in seconds
    #[serde(default = "default_confirm_timeout")]
    pub confirm_timeout_secs: u64,

    /// Public base URL of this deployment, used to build the return,
    /// cancel, and notify URLs handed to the gateway
    #[serde(default = "default_site_base_url")]
    pub site_base_url: String,

    /// Notification source allowlist entries ("1.2.3.4" or "1.2.3.0/28");
    /// empty means the gateway's published ranges
    #[serde(default)]
    pub allowlist: Vec<String>,

    /// Local-testing escape hatch: accept notifications from any source
    #[serde(default)]
    pub skip_source_check: bool,

    /// Smallest accepted deposit, decimal string
    #[serde(default = "default_deposit_min")]
    pub deposit_min: String,

    /// Largest accepted deposit, decimal string
    #[serde(default = "default_deposit_max")]
    pub deposit_max: String,

    /// Smallest accepted withdrawal, decimal string
    #[serde(default = "default_withdrawal_min")]
    pub withdrawal_min: String,

    /// Largest accepted withdrawal, decimal string
    #[serde(default = "default_withdrawal_max")]
    pub withdrawal_max: String,
}

impl GatewayConfig {
    /// Parsed allowlist rules; empty input falls back to the gateway's
    /// published ranges at the call site.
    pub fn allow_rules(&self) -> Result<Vec<AllowRule>, ValidationError> {
        self.allowlist
            .iter()
            .map(|s| {
                s.parse::<AllowRule>()
                    .map_err(|_| ValidationError::InvalidAllowlistEntry(s.clone()))
            })
            .collect()
    }

    pub fn deposit_bounds(&self) -> Result<(Money, Money), ValidationError> {
        Ok((
            parse_amount(&self.deposit_min)?,
            parse_amount(&self.deposit_max)?,
        ))
    }

    pub fn withdrawal_bounds(&self) -> Result<(Money, Money), ValidationError> {
        Ok((
            parse_amount(&self.withdrawal_min)?,
            parse_amount(&self.withdrawal_max)?,
        ))
    }

    pub fn confirm_timeout(&self) -> Duration {
        Duration::from_secs(self.confirm_timeout_secs)
    }

    /// Validate gateway configuration
    pub fn validate(&self, is_production: bool) -> Result<(), ValidationError> {
        if self.merchant_id.is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_MERCHANT_ID"));
        }
        if self.merchant_key.expose_secret().is_empty() {
            return Err(ValidationError::MissingRequired("GATEWAY_MERCHANT_KEY"));
        }
        if !self.process_url.starts_with("https://") {
            return Err(ValidationError::GatewayUrlMustBeHttps);
        }
        if !self.validate_url.starts_with("https://") {
            return Err(ValidationError::GatewayUrlMustBeHttps);
        }
        if is_production && self.skip_source_check {
            return Err(ValidationError::SourceCheckDisabledInProduction);
        }

        self.allow_rules()?;

        let (dep_min, dep_max) = self.deposit_bounds()?;
        if dep_min > dep_max {
            return Err(ValidationError::InvalidDepositBounds);
        }
        let (wd_min, wd_max) = self.withdrawal_bounds()?;
        if wd_min > wd_max {
            return Err(ValidationError::InvalidWithdrawalBounds);
        }
        Ok(())
    }
}

fn parse_amount(s: &str) -> Result<Money, ValidationError> {
    Money::parse(s).map_err(|_| ValidationError::InvalidAmount(s.to_string()))
}

fn default_process_url() -> String {
    "https://www.payfast.co.za/eng/process".to_string()
}

fn default_validate_url() -> String {
    "https://www.payfast.co.za/eng/query/validate".to_string()
}

fn default_site_base_url() -> String {
    "http://localhost:8080".to_string()
}

fn default_true() -> bool {
    true
}

fn default_confirm_timeout() -> u64 {
    10
}

fn default_deposit_min() -> String {
    "5.00".to_string()
}

fn default_deposit_max() -> String {
    "100000.00".to_string()
}

fn default_withdrawal_min() -> String {
    "50.00".to_string()
}

fn default_withdrawal_max() -> String {
    "500000.00".to_string()
}
