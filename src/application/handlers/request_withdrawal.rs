//! RequestWithdrawalHandler - Command handler for reserving a withdrawal.
//!
//! Bounds checks happen here; the balance check happens inside the
//! ledger store under the wallet row lock, so two racing requests
//! cannot both pass against the same funds.

use std::sync::Arc;

use chrono::Utc;

use crate::domain::foundation::{Money, UserId};
use crate::domain::wallet::{LedgerAuthority, WalletError};
use crate::ports::{
    record_best_effort, AuditEntry, AuditKind, AuditSink, LedgerStore, WithdrawalReceipt,
};

/// Command to request a withdrawal.
#[derive(Debug, Clone)]
pub struct RequestWithdrawalCommand {
    pub user_id: UserId,
    pub amount: Money,
}

/// Handler for withdrawal requests.
pub struct RequestWithdrawalHandler {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
    minimum: Money,
    maximum: Money,
}

impl RequestWithdrawalHandler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        audit: Arc<dyn AuditSink>,
        minimum: Money,
        maximum: Money,
    ) -> Self {
        Self {
            ledger,
            audit,
            minimum,
            maximum,
        }
    }

    pub async fn handle(
        &self,
        cmd: RequestWithdrawalCommand,
    ) -> Result<WithdrawalReceipt, WalletError> {
        if cmd.amount < self.minimum {
            return Err(WalletError::BelowMinimum {
                minimum: self.minimum,
            });
        }
        if cmd.amount > self.maximum {
            return Err(WalletError::AboveMaximum {
                maximum: self.maximum,
            });
        }

        let authority = LedgerAuthority::grant();
        let receipt = self
            .ledger
            .request_withdrawal(&authority, cmd.user_id, cmd.amount, Utc::now())
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            transaction_id = %receipt.transaction.id,
            amount = %cmd.amount,
            available = %receipt.available,
            "withdrawal reserved"
        );
        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditKind::WithdrawalRequested,
                cmd.user_id.to_string(),
                format!("available after reserve {}", receipt.available),
            )
            .with_reference(receipt.transaction.id.to_string())
            .with_amount(cmd.amount),
        )
        .await;

        Ok(receipt)
    }
}
