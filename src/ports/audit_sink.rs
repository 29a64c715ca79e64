//! Audit sink port - append-only security and money event trail.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::{DomainError, Money};

/// What happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuditKind {
    /// Webhook caller failed source IP authentication.
    SourceRejected,
    /// Notification signature did not verify.
    SignatureRejected,
    /// Notification claimed a different merchant account.
    MerchantMismatch,
    /// Notification amount disagreed with the stored transaction.
    AmountMismatch,
    /// A deposit was credited.
    DepositCompleted,
    /// A transaction reached `failed` or `cancelled`.
    TransactionClosed,
    /// A withdrawal reservation was made.
    WithdrawalRequested,
    /// A reserved withdrawal was settled.
    WithdrawalSettled,
    /// An expired order's stock was released.
    ReservationReleased,
}

impl AuditKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditKind::SourceRejected => "source_rejected",
            AuditKind::SignatureRejected => "signature_rejected",
            AuditKind::MerchantMismatch => "merchant_mismatch",
            AuditKind::AmountMismatch => "amount_mismatch",
            AuditKind::DepositCompleted => "deposit_completed",
            AuditKind::TransactionClosed => "transaction_closed",
            AuditKind::WithdrawalRequested => "withdrawal_requested",
            AuditKind::WithdrawalSettled => "withdrawal_settled",
            AuditKind::ReservationReleased => "reservation_released",
        }
    }
}

/// One append-only audit record.
#[derive(Debug, Clone)]
pub struct AuditEntry {
    pub kind: AuditKind,
    /// Who acted: a user id, "gateway", or "scheduler".
    pub actor: String,
    /// Transaction or order the entry describes, when known.
    pub reference: Option<String>,
    pub amount: Option<Money>,
    pub detail: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEntry {
    pub fn new(kind: AuditKind, actor: impl Into<String>, detail: impl Into<String>) -> Self {
        Self {
            kind,
            actor: actor.into(),
            reference: None,
            amount: None,
            detail: detail.into(),
            recorded_at: Utc::now(),
        }
    }

    pub fn with_reference(mut self, reference: impl Into<String>) -> Self {
        self.reference = Some(reference.into());
        self
    }

    pub fn with_amount(mut self, amount: Money) -> Self {
        self.amount = Some(amount);
        self
    }
}

/// Append-only audit trail.
///
/// Writes are best-effort with respect to the operation they describe:
/// callers log a failed write and carry on, they never roll back a
/// financial mutation because its audit entry failed.
#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError>;
}

/// Records an entry, demoting failure to a log line.
pub(crate) async fn record_best_effort(sink: &dyn AuditSink, entry: AuditEntry) {
    let kind = entry.kind;
    if let Err(err) = sink.record(entry).await {
        tracing::error!(kind = kind.as_str(), error = %err, "audit write failed");
    }
}
