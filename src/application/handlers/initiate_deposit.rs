//! InitiateDepositHandler - Command handler for starting a wallet deposit.
//!
//! Creates the pending ledger transaction and builds the signed,
//! ordered parameter set the shopper is redirected to the gateway
//! with. The transaction id travels in an opaque custom field so the
//! later notification can find its way back.

use std::sync::Arc;

use secrecy::{ExposeSecret, SecretString};

use crate::domain::foundation::{Money, UserId};
use crate::domain::gateway::{OrderedFields, SignatureVerifier, SIGNATURE_FIELD};
use crate::domain::wallet::{TransactionType, WalletError, WalletTransaction};
use crate::ports::LedgerStore;

/// Command to initiate a deposit.
#[derive(Debug, Clone)]
pub struct InitiateDepositCommand {
    pub user_id: UserId,
    pub amount: Money,
}

/// A deposit ready to hand to the gateway.
#[derive(Debug, Clone)]
pub struct DepositInitiation {
    /// The pending ledger transaction.
    pub transaction: WalletTransaction,
    /// Gateway checkout URL.
    pub redirect_url: String,
    /// Signed parameter set, in the order the gateway expects.
    pub params: OrderedFields,
}

/// URLs the gateway sends the shopper (and its notification) back to.
#[derive(Debug, Clone)]
pub struct ReturnUrls {
    pub return_url: String,
    pub cancel_url: String,
    pub notify_url: String,
}

impl ReturnUrls {
    /// Standard paths under the deployment's public base URL.
    pub fn from_base(base: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            return_url: format!("{}/wallet/deposit/return", base),
            cancel_url: format!("{}/wallet/deposit/cancel", base),
            notify_url: format!("{}/webhooks/gateway", base),
        }
    }
}

/// Handler for initiating deposits.
pub struct InitiateDepositHandler {
    ledger: Arc<dyn LedgerStore>,
    verifier: SignatureVerifier,
    merchant_id: String,
    merchant_key: SecretString,
    process_url: String,
    urls: ReturnUrls,
    minimum: Money,
    maximum: Money,
}

impl InitiateDepositHandler {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        verifier: SignatureVerifier,
        merchant_id: String,
        merchant_key: SecretString,
        process_url: String,
        urls: ReturnUrls,
        minimum: Money,
        maximum: Money,
    ) -> Self {
        Self {
            ledger,
            verifier,
            merchant_id,
            merchant_key,
            process_url,
            urls,
            minimum,
            maximum,
        }
    }

    pub async fn handle(
        &self,
        cmd: InitiateDepositCommand,
    ) -> Result<DepositInitiation, WalletError> {
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

        let transaction = self
            .ledger
            .create_pending(cmd.user_id, TransactionType::Deposit, cmd.amount)
            .await?;

        tracing::info!(
            user_id = %cmd.user_id,
            transaction_id = %transaction.id,
            amount = %cmd.amount,
            "deposit initiated"
        );

        let params = self.redirect_params(&transaction);
        Ok(DepositInitiation {
            transaction,
            redirect_url: self.process_url.clone(),
            params,
        })
    }

    /// Builds the gateway parameter set, signature last.
    ///
    /// Field order matters: the gateway recomputes the signature over
    /// the fields exactly as they arrive.
    fn redirect_params(&self, transaction: &WalletTransaction) -> OrderedFields {
        let mut fields = OrderedFields::new();
        fields.push("merchant_id", self.merchant_id.clone());
        fields.push("merchant_key", self.merchant_key.expose_secret());
        fields.push("return_url", self.urls.return_url.clone());
        fields.push("cancel_url", self.urls.cancel_url.clone());
        fields.push("notify_url", self.urls.notify_url.clone());
        fields.push("m_payment_id", transaction.id.to_string());
        fields.push("amount", transaction.amount.to_string());
        fields.push("item_name", "Wallet deposit");
        fields.push("custom_str1", transaction.user_id.to_string());
        fields.push("custom_str2", transaction.id.to_string());
        fields.push("custom_str3", "deposit");

        let signature = self.verifier.sign(&fields);
        fields.push(SIGNATURE_FIELD, signature);
        fields
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::Mutex;

    use crate::domain::foundation::{DomainError, TransactionId};
    use crate::domain::wallet::{LedgerAuthority, TransactionStatus, WalletBalance};
    use crate::ports::{DepositOutcome, WithdrawalReceipt};

    struct MockLedgerStore {
        created: Mutex<Vec<WalletTransaction>>,
    }

    impl MockLedgerStore {
        fn new() -> Self {
            Self {
                created: Mutex::new(Vec::new()),
            }
        }

        fn created_count(&self) -> usize {
            self.created.lock().unwrap().len()
        }
    }

    #[async_trait]
    impl LedgerStore for MockLedgerStore {
        async fn create_pending(
            &self,
            user_id: UserId,
            tx_type: TransactionType,
            amount: Money,
        ) -> Result<WalletTransaction, DomainError> {
            let tx = WalletTransaction::pending(user_id, tx_type, amount, Utc::now());
            self.created.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn find_transaction(
            &self,
            _id: TransactionId,
        ) -> Result<Option<WalletTransaction>, DomainError> {
            Ok(None)
        }

        async fn load_balance(
            &self,
            _user_id: UserId,
        ) -> Result<Option<WalletBalance>, DomainError> {
            Ok(None)
        }

        async fn complete_deposit(
            &self,
            _authority: &LedgerAuthority,
            _tx_id: TransactionId,
            _amount: Money,
            _external_reference: &str,
        ) -> Result<DepositOutcome, WalletError> {
            unimplemented!()
        }

        async fn mark_terminal(
            &self,
            _authority: &LedgerAuthority,
            _tx_id: TransactionId,
            _status: TransactionStatus,
            _external_reference: &str,
        ) -> Result<DepositOutcome, WalletError> {
            unimplemented!()
        }

        async fn request_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            _user_id: UserId,
            _amount: Money,
            _requested_at: DateTime<Utc>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            unimplemented!()
        }

        async fn settle_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            _tx_id: TransactionId,
            _external_reference: Option<&str>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            unimplemented!()
        }

        async fn release_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            _tx_id: TransactionId,
            _status: TransactionStatus,
            _external_reference: Option<&str>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            unimplemented!()
        }
    }

    fn handler(ledger: Arc<MockLedgerStore>) -> InitiateDepositHandler {
        InitiateDepositHandler::new(
            ledger,
            SignatureVerifier::new(None),
            "10000100".to_string(),
            SecretString::new("46f0cd694581a".to_string()),
            "https://www.payfast.co.za/eng/process".to_string(),
            ReturnUrls::from_base("https://tradepost.example/"),
            Money::from_cents(500).unwrap(),
            Money::from_cents(10_000_000).unwrap(),
        )
    }

    #[tokio::test]
    async fn creates_pending_transaction_and_signed_params() {
        let ledger = Arc::new(MockLedgerStore::new());
        let handler = handler(ledger.clone());

        let result = handler
            .handle(InitiateDepositCommand {
                user_id: UserId::new(),
                amount: Money::parse("200.00").unwrap(),
            })
            .await
            .unwrap();

        assert_eq!(ledger.created_count(), 1);
        assert_eq!(result.transaction.status, TransactionStatus::Pending);
        assert_eq!(result.params.get("merchant_id"), Some("10000100"));
        assert_eq!(result.params.get("amount"), Some("200.00"));
        assert_eq!(result.params.get("custom_str3"), Some("deposit"));
        assert_eq!(
            result.params.get("notify_url"),
            Some("https://tradepost.example/webhooks/gateway")
        );
        // Signature is last and verifies over the preceding fields
        let signature = result.params.get(SIGNATURE_FIELD).unwrap().to_string();
        assert!(SignatureVerifier::new(None)
            .verify(&result.params, &signature)
            .is_ok());
    }

    #[tokio::test]
    async fn rejects_amount_below_minimum() {
        let ledger = Arc::new(MockLedgerStore::new());
        let handler = handler(ledger.clone());

        let err = handler
            .handle(InitiateDepositCommand {
                user_id: UserId::new(),
                amount: Money::parse("4.99").unwrap(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::BelowMinimum { .. }));
        assert_eq!(ledger.created_count(), 0);
    }

    #[tokio::test]
    async fn rejects_amount_above_maximum() {
        let ledger = Arc::new(MockLedgerStore::new());
        let handler = handler(ledger.clone());

        let err = handler
            .handle(InitiateDepositCommand {
                user_id: UserId::new(),
                amount: Money::parse("100000.01").unwrap(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WalletError::AboveMaximum { .. }));
        assert_eq!(ledger.created_count(), 0);
    }

    #[tokio::test]
    async fn minimum_amount_is_accepted() {
        let ledger = Arc::new(MockLedgerStore::new());
        let handler = handler(ledger);

        let result = handler
            .handle(InitiateDepositCommand {
                user_id: UserId::new(),
                amount: Money::parse("5.00").unwrap(),
            })
            .await;

        assert!(result.is_ok());
    }
}
