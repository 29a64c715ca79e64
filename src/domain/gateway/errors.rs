//! Webhook error types for gateway notification handling.
//!
//! Defines all error conditions that can occur while processing an
//! inbound payment notification, with HTTP status code mapping and
//! retryability semantics for the gateway's at-least-once redelivery.

use axum::http::StatusCode;
use thiserror::Error;

/// Errors that occur during webhook processing.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Caller's network address is not on the gateway allowlist.
    #[error("Source address rejected")]
    SourceRejected,

    /// Caller's network address could not be determined at all.
    #[error("Source address unknown")]
    SourceUnknown,

    /// Parameter-string signature verification failed.
    #[error("Invalid signature")]
    InvalidSignature,

    /// Gateway round-trip validation did not confirm the payload.
    #[error("Gateway did not confirm notification: {0}")]
    GatewayRejected(String),

    /// Gateway round-trip validation could not be completed.
    #[error("Gateway unreachable: {0}")]
    GatewayUnreachable(String),

    /// Merchant identifier does not match our configuration.
    #[error("Merchant id mismatch")]
    MerchantMismatch,

    /// Notification amount does not match the stored transaction amount.
    #[error("Amount mismatch: notified {notified} cents, expected {expected} cents")]
    AmountMismatch { notified: i64, expected: i64 },

    /// Failed to parse the notification body.
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Required field missing from the notification.
    #[error("Missing field: {0}")]
    MissingField(&'static str),

    /// Referenced ledger transaction could not be found.
    #[error("Transaction not found")]
    TransactionNotFound,

    /// Database operation failed.
    #[error("Database error: {0}")]
    Database(String),
}

impl WebhookError {
    /// Returns true if the gateway should retry delivering this notification.
    ///
    /// Retryable errors indicate temporary failures that may succeed on a
    /// later delivery; the referenced transaction stays `pending` so the
    /// retry can still apply it.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            WebhookError::Database(_) | WebhookError::GatewayUnreachable(_)
        )
    }

    /// Maps the error to an appropriate HTTP status code.
    ///
    /// The gateway only inspects the status class: 2xx acknowledges the
    /// notification, anything else schedules a redelivery.
    pub fn status_code(&self) -> StatusCode {
        match self {
            // Trust boundary failures - hard rejection
            WebhookError::SourceRejected
            | WebhookError::SourceUnknown
            | WebhookError::InvalidSignature
            | WebhookError::GatewayRejected(_) => StatusCode::FORBIDDEN,

            // Malformed or inconsistent payload
            WebhookError::MerchantMismatch
            | WebhookError::AmountMismatch { .. }
            | WebhookError::ParseError(_)
            | WebhookError::MissingField(_) => StatusCode::BAD_REQUEST,

            // Transaction id references nothing we know
            WebhookError::TransactionNotFound => StatusCode::NOT_FOUND,

            // Temporary failures - gateway will redeliver
            WebhookError::Database(_) | WebhookError::GatewayUnreachable(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Stable machine-readable code for the JSON error body.
    pub fn error_code(&self) -> &'static str {
        match self {
            WebhookError::SourceRejected => "SOURCE_REJECTED",
            WebhookError::SourceUnknown => "SOURCE_UNKNOWN",
            WebhookError::InvalidSignature => "INVALID_SIGNATURE",
            WebhookError::GatewayRejected(_) => "GATEWAY_REJECTED",
            WebhookError::GatewayUnreachable(_) => "GATEWAY_UNREACHABLE",
            WebhookError::MerchantMismatch => "MERCHANT_MISMATCH",
            WebhookError::AmountMismatch { .. } => "AMOUNT_MISMATCH",
            WebhookError::ParseError(_) => "PARSE_ERROR",
            WebhookError::MissingField(_) => "MISSING_FIELD",
            WebhookError::TransactionNotFound => "TRANSACTION_NOT_FOUND",
            WebhookError::Database(_) => "DATABASE_ERROR",
        }
    }
}

impl From<crate::domain::foundation::DomainError> for WebhookError {
    fn from(err: crate::domain::foundation::DomainError) -> Self {
        WebhookError::Database(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn source_rejection_returns_forbidden() {
        assert_eq!(
            WebhookError::SourceRejected.status_code(),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            WebhookError::SourceUnknown.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn invalid_signature_returns_forbidden() {
        assert_eq!(
            WebhookError::InvalidSignature.status_code(),
            StatusCode::FORBIDDEN
        );
    }

    #[test]
    fn payload_problems_return_bad_request() {
        assert_eq!(
            WebhookError::MerchantMismatch.status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::MissingField("amount_gross").status_code(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            WebhookError::AmountMismatch {
                notified: 100,
                expected: 200
            }
            .status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn unknown_transaction_returns_not_found() {
        assert_eq!(
            WebhookError::TransactionNotFound.status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn temporary_failures_return_internal_error_and_are_retryable() {
        let db = WebhookError::Database("lost connection".to_string());
        let gw = WebhookError::GatewayUnreachable("timed out".to_string());
        assert_eq!(db.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(gw.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(db.is_retryable());
        assert!(gw.is_retryable());
    }

    #[test]
    fn trust_failures_are_not_retryable() {
        assert!(!WebhookError::InvalidSignature.is_retryable());
        assert!(!WebhookError::SourceRejected.is_retryable());
        assert!(!WebhookError::MerchantMismatch.is_retryable());
    }

    #[test]
    fn gateway_rejection_is_forbidden_but_not_retryable() {
        let err = WebhookError::GatewayRejected("INVALID".to_string());
        assert_eq!(err.status_code(), StatusCode::FORBIDDEN);
        assert!(!err.is_retryable());
    }

    #[test]
    fn error_codes_are_stable() {
        assert_eq!(WebhookError::InvalidSignature.error_code(), "INVALID_SIGNATURE");
        assert_eq!(
            WebhookError::TransactionNotFound.error_code(),
            "TRANSACTION_NOT_FOUND"
        );
    }

    #[test]
    fn amount_mismatch_displays_both_sides() {
        let err = WebhookError::AmountMismatch {
            notified: 20000,
            expected: 19999,
        };
        assert_eq!(
            err.to_string(),
            "Amount mismatch: notified 20000 cents, expected 19999 cents"
        );
    }
}
