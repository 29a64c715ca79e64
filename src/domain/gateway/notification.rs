//! Typed payment notification.
//!
//! The gateway posts a form-encoded body; this module lifts the ordered
//! field sequence into a structure the rest of the pipeline can reason
//! about, while keeping the raw fields around for signature work.

use std::str::FromStr;

use crate::domain::foundation::{Money, TransactionId, UserId};
use crate::domain::wallet::TransactionType;

use super::errors::WebhookError;
use super::signature::{OrderedFields, SIGNATURE_FIELD};

/// Payment outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationStatus {
    /// Funds captured; the movement should be applied.
    Complete,
    /// Payment failed at the gateway.
    Failed,
    /// Shopper abandoned or cancelled the payment.
    Cancelled,
    /// Gateway still processing; nothing to apply yet.
    Pending,
}

impl FromStr for NotificationStatus {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "COMPLETE" => Ok(NotificationStatus::Complete),
            "FAILED" => Ok(NotificationStatus::Failed),
            "CANCELLED" => Ok(NotificationStatus::Cancelled),
            "PENDING" => Ok(NotificationStatus::Pending),
            other => Err(WebhookError::ParseError(format!(
                "unknown payment status: {}",
                other
            ))),
        }
    }
}

/// Which kind of ledger movement the notification settles.
///
/// Carried in the third opaque custom field so one webhook endpoint can
/// serve every money flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionKind {
    Deposit,
    Withdrawal,
}

impl FromStr for TransactionKind {
    type Err = WebhookError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            other => Err(WebhookError::ParseError(format!(
                "unknown transaction kind: {}",
                other
            ))),
        }
    }
}

impl From<TransactionKind> for TransactionType {
    fn from(kind: TransactionKind) -> Self {
        match kind {
            TransactionKind::Deposit => TransactionType::Deposit,
            TransactionKind::Withdrawal => TransactionType::Withdrawal,
        }
    }
}

/// A fully parsed gateway notification.
#[derive(Debug, Clone)]
pub struct PaymentNotification {
    /// Raw ordered fields as received, for signature verification and
    /// round-trip confirmation.
    pub fields: OrderedFields,
    /// Merchant account the notification claims to be for.
    pub merchant_id: String,
    /// Gross amount reported by the gateway.
    pub amount_gross: Money,
    /// Reported payment outcome.
    pub status: NotificationStatus,
    /// Gateway-side payment id (external reference / idempotency key).
    pub gateway_reference: String,
    /// Signature supplied in the body.
    pub signature: String,
    /// Acting user (custom field 1).
    pub user_id: UserId,
    /// Ledger transaction this settles (custom field 2).
    pub transaction_id: TransactionId,
    /// Movement discriminator (custom field 3).
    pub kind: TransactionKind,
}

impl PaymentNotification {
    /// Parses the ordered field sequence into a typed notification.
    ///
    /// Field names follow the gateway's wire format; the three custom
    /// fields are ours and carry the ledger linkage.
    pub fn parse(fields: OrderedFields) -> Result<Self, WebhookError> {
        let merchant_id = require(&fields, "merchant_id")?.to_string();
        let amount_raw = require(&fields, "amount_gross")?;
        let amount_gross = Money::parse(amount_raw)
            .map_err(|e| WebhookError::ParseError(format!("amount_gross: {}", e)))?;
        let status: NotificationStatus = require(&fields, "payment_status")?.parse()?;
        let gateway_reference = require(&fields, "pf_payment_id")?.to_string();
        let signature = require(&fields, SIGNATURE_FIELD)?.to_string();

        let user_id = require(&fields, "custom_str1")?
            .parse::<UserId>()
            .map_err(|_| WebhookError::ParseError("custom_str1 is not a user id".to_string()))?;
        let transaction_id = require(&fields, "custom_str2")?
            .parse::<TransactionId>()
            .map_err(|_| {
                WebhookError::ParseError("custom_str2 is not a transaction id".to_string())
            })?;
        let kind: TransactionKind = require(&fields, "custom_str3")?.parse()?;

        Ok(Self {
            fields,
            merchant_id,
            amount_gross,
            status,
            gateway_reference,
            signature,
            user_id,
            transaction_id,
            kind,
        })
    }
}

fn require<'a>(fields: &'a OrderedFields, name: &'static str) -> Result<&'a str, WebhookError> {
    match fields.get(name) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(WebhookError::MissingField(name)),
    }
}
