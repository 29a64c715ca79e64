//! Configuration error types

use thiserror::Error;

/// Errors that can occur during configuration loading
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Configuration loading failed: {0}")]
    LoadError(#[from] config::ConfigError),

    #[error("Validation failed: {0}")]
    ValidationFailed(#[from] ValidationError),
}

/// Errors that can occur during configuration validation
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required configuration missing: {0}")]
    MissingRequired(&'static str),

    #[error("Invalid port number")]
    InvalidPort,

    #[error("Invalid request timeout")]
    InvalidTimeout,

    #[error("Invalid database URL format")]
    InvalidDatabaseUrl,

    #[error("Pool min_connections exceeds max_connections")]
    InvalidPoolSize,

    #[error("Pool size exceeds maximum allowed (100)")]
    PoolSizeTooLarge,

    #[error("Gateway process URL must use HTTPS")]
    GatewayUrlMustBeHttps,

    #[error("Invalid allowlist entry: {0}")]
    InvalidAllowlistEntry(String),

    #[error("Deposit minimum exceeds deposit maximum")]
    InvalidDepositBounds,

    #[error("Withdrawal minimum exceeds withdrawal maximum")]
    InvalidWithdrawalBounds,

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Source IP check may not be disabled in production")]
    SourceCheckDisabledInProduction,

    #[error("Reconciler batch limit must be at least 1")]
    InvalidBatchLimit,
}
