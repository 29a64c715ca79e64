//! SettleWithdrawalHandler - Command handler for confirming a payout.
//!
//! Back-office confirmation that a reserved withdrawal was actually
//! paid out. Kept separate from the notification pipeline because
//! payouts can also be confirmed by an operator rather than a gateway
//! callback.

use std::sync::Arc;

use crate::domain::foundation::TransactionId;
use crate::domain::wallet::{LedgerAuthority, TransactionStatus, WalletError};
use crate::ports::{
    record_best_effort, AuditEntry, AuditKind, AuditSink, LedgerStore, WithdrawalReceipt,
};

/// Command to settle a reserved withdrawal.
#[derive(Debug, Clone)]
pub struct SettleWithdrawalCommand {
    pub transaction_id: TransactionId,
    /// Payout reference from the bank or gateway, when known.
    pub external_reference: Option<String>,
}

/// Result of a settlement attempt.
#[derive(Debug, Clone)]
pub enum SettleWithdrawalResult {
    /// Funds left the pending bucket for good.
    Settled(WithdrawalReceipt),
    /// Already settled or closed earlier; nothing changed.
    Replayed { status: TransactionStatus },
}

/// Handler for withdrawal settlement.
pub struct SettleWithdrawalHandler {
    ledger: Arc<dyn LedgerStore>,
    audit: Arc<dyn AuditSink>,
}

impl SettleWithdrawalHandler {
    pub fn new(ledger: Arc<dyn LedgerStore>, audit: Arc<dyn AuditSink>) -> Self {
        Self { ledger, audit }
    }

    pub async fn handle(
        &self,
        cmd: SettleWithdrawalCommand,
    ) -> Result<SettleWithdrawalResult, WalletError> {
        let authority = LedgerAuthority::grant();
        let receipt = match self
            .ledger
            .settle_withdrawal(
                &authority,
                cmd.transaction_id,
                cmd.external_reference.as_deref(),
            )
            .await
        {
            Ok(receipt) => receipt,
            Err(WalletError::AlreadyTerminal { status }) => {
                tracing::info!(
                    transaction_id = %cmd.transaction_id,
                    status = %status,
                    "settlement replay, no-op"
                );
                return Ok(SettleWithdrawalResult::Replayed { status });
            }
            Err(err) => return Err(err),
        };

        record_best_effort(
            self.audit.as_ref(),
            AuditEntry::new(
                AuditKind::WithdrawalSettled,
                "operator",
                cmd.external_reference
                    .as_deref()
                    .map(|r| format!("payout ref {}", r))
                    .unwrap_or_else(|| "payout confirmed".to_string()),
            )
            .with_reference(cmd.transaction_id.to_string())
            .with_amount(receipt.transaction.amount),
        )
        .await;

        Ok(SettleWithdrawalResult::Settled(receipt))
    }
}
