//! ProcessNotificationHandler - Command handler for inbound gateway
//! payment notifications.
//!
//! Runs the full trust pipeline before any money moves: source address
//! authentication, payload parsing, merchant check, signature
//! verification, optional gateway round-trip confirmation, then the
//! integrity checks against the stored transaction. Only after every
//! gate passes does the ledger mutate, and it does so idempotently.

use std::net::IpAddr;
use std::sync::Arc;

use crate::domain::foundation::Money;
use crate::domain::gateway::{
    encode_value, NotificationStatus, OrderedFields, PaymentNotification, SignatureVerifier,
    SourceAuthenticator, TransactionKind, WebhookError, SIGNATURE_FIELD,
};
use crate::domain::wallet::{LedgerAuthority, TransactionStatus, WalletError};
use crate::ports::{
    record_best_effort, AuditEntry, AuditKind, AuditSink, DepositOutcome, GatewayClient,
    GatewayError, LedgerStore,
};

/// Command to process one raw notification delivery.
#[derive(Debug, Clone)]
pub struct ProcessNotificationCommand {
    /// Raw form-encoded request body, byte order preserved.
    pub body: Vec<u8>,
    /// Caller address as resolved from connection info and proxy headers.
    pub client_ip: Option<IpAddr>,
}

/// Result of processing a notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProcessNotificationResult {
    /// Deposit credited; the new available balance.
    DepositApplied { balance_after: Money },
    /// Reserved withdrawal paid out by the gateway.
    WithdrawalSettled { available: Money },
    /// Failed or cancelled withdrawal returned to the available bucket.
    WithdrawalReleased { available: Money },
    /// Pending deposit closed as failed or cancelled, no balance change.
    TransactionClosed { status: TransactionStatus },
    /// Redelivery of an already-settled notification; nothing changed.
    Replayed { status: TransactionStatus },
    /// Gateway still processing; acknowledged without action.
    Acknowledged,
}

/// Handler for gateway payment notifications.
pub struct ProcessNotificationHandler {
    ledger: Arc<dyn LedgerStore>,
    gateway: Arc<dyn GatewayClient>,
    audit: Arc<dyn AuditSink>,
    source: SourceAuthenticator,
    verifier: SignatureVerifier,
    merchant_id: String,
    confirm_with_gateway: bool,
}

impl ProcessNotificationHandler {
    pub fn new(
        ledger: Arc<dyn LedgerStore>,
        gateway: Arc<dyn GatewayClient>,
        audit: Arc<dyn AuditSink>,
        source: SourceAuthenticator,
        verifier: SignatureVerifier,
        merchant_id: String,
        confirm_with_gateway: bool,
    ) -> Self {
        Self {
            ledger,
            gateway,
            audit,
            source,
            verifier,
            merchant_id,
            confirm_with_gateway,
        }
    }

    pub async fn handle(
        &self,
        cmd: ProcessNotificationCommand,
    ) -> Result<ProcessNotificationResult, WebhookError> {
        // 1. Source authentication. Denied callers never reach parsing.
        let client_ip = match self.source.authorize(cmd.client_ip) {
            Ok(ip) => ip,
            Err(err) => {
                let detail = match cmd.client_ip {
                    Some(ip) => format!("rejected source {}", ip),
                    None => "source address could not be determined".to_string(),
                };
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::new(AuditKind::SourceRejected, "gateway", detail),
                )
                .await;
                return Err(err);
            }
        };

        // 2. Parse the ordered field sequence and lift it into a typed
        //    notification.
        let fields = OrderedFields::from_form_bytes(&cmd.body)?;
        let notification = PaymentNotification::parse(fields)?;

        // 3. The notification must be addressed to our merchant account.
        if notification.merchant_id != self.merchant_id {
            record_best_effort(
                self.audit.as_ref(),
                AuditEntry::new(
                    AuditKind::MerchantMismatch,
                    "gateway",
                    format!(
                        "merchant {} from {}",
                        notification.merchant_id, client_ip
                    ),
                )
                .with_reference(notification.gateway_reference.clone()),
            )
            .await;
            return Err(WebhookError::MerchantMismatch);
        }

        // 4. Signature over the ordered fields, constant-time compare.
        if let Err(err) = self
            .verifier
            .verify(&notification.fields, &notification.signature)
        {
            record_best_effort(
                self.audit.as_ref(),
                AuditEntry::new(
                    AuditKind::SignatureRejected,
                    "gateway",
                    format!("signature mismatch from {}", client_ip),
                )
                .with_reference(notification.gateway_reference.clone()),
            )
            .await;
            return Err(err);
        }

        // 5. Ask the gateway itself whether it sent this. Catches a
        //    compromised passphrase that a local check cannot.
        if self.confirm_with_gateway {
            let payload = confirmation_payload(&notification.fields);
            match self.gateway.confirm(&payload).await {
                Ok(()) => {}
                Err(GatewayError::Rejected(msg)) => {
                    record_best_effort(
                        self.audit.as_ref(),
                        AuditEntry::new(
                            AuditKind::SignatureRejected,
                            "gateway",
                            format!("round-trip rejected: {}", msg),
                        )
                        .with_reference(notification.gateway_reference.clone()),
                    )
                    .await;
                    return Err(WebhookError::GatewayRejected(msg));
                }
                Err(GatewayError::Unreachable(msg)) => {
                    return Err(WebhookError::GatewayUnreachable(msg))
                }
            }
        }

        // 6. The referenced transaction must exist and belong to the user
        //    named in the notification.
        let transaction = self
            .ledger
            .find_transaction(notification.transaction_id)
            .await?
            .ok_or(WebhookError::TransactionNotFound)?;
        if transaction.user_id != notification.user_id {
            return Err(WebhookError::TransactionNotFound);
        }

        // 7. Exact integer comparison of minor units. Never floats.
        if notification.amount_gross.cents() != transaction.amount.cents() {
            record_best_effort(
                self.audit.as_ref(),
                AuditEntry::new(
                    AuditKind::AmountMismatch,
                    "gateway",
                    format!(
                        "notified {} cents, stored {} cents",
                        notification.amount_gross.cents(),
                        transaction.amount.cents()
                    ),
                )
                .with_reference(notification.transaction_id.to_string())
                .with_amount(notification.amount_gross),
            )
            .await;
            return Err(WebhookError::AmountMismatch {
                notified: notification.amount_gross.cents(),
                expected: transaction.amount.cents(),
            });
        }

        // 8. Apply the outcome. Every mutation below is atomic and
        //    idempotent inside the ledger store.
        let authority = LedgerAuthority::grant();
        match notification.kind {
            TransactionKind::Deposit => {
                self.apply_deposit(&authority, &notification).await
            }
            TransactionKind::Withdrawal => {
                self.apply_withdrawal(&authority, &notification).await
            }
        }
    }

    async fn apply_deposit(
        &self,
        authority: &LedgerAuthority,
        notification: &PaymentNotification,
    ) -> Result<ProcessNotificationResult, WebhookError> {
        match notification.status {
            NotificationStatus::Complete => {
                let outcome = self
                    .ledger
                    .complete_deposit(
                        authority,
                        notification.transaction_id,
                        notification.amount_gross,
                        &notification.gateway_reference,
                    )
                    .await
                    .map_err(ledger_error)?;
                match outcome {
                    DepositOutcome::Applied { balance_after } => {
                        record_best_effort(
                            self.audit.as_ref(),
                            AuditEntry::new(
                                AuditKind::DepositCompleted,
                                notification.user_id.to_string(),
                                format!("gateway ref {}", notification.gateway_reference),
                            )
                            .with_reference(notification.transaction_id.to_string())
                            .with_amount(notification.amount_gross),
                        )
                        .await;
                        Ok(ProcessNotificationResult::DepositApplied { balance_after })
                    }
                    DepositOutcome::AlreadyTerminal { status } => {
                        tracing::info!(
                            transaction_id = %notification.transaction_id,
                            status = %status,
                            "replayed notification, no-op"
                        );
                        Ok(ProcessNotificationResult::Replayed { status })
                    }
                }
            }
            NotificationStatus::Failed | NotificationStatus::Cancelled => {
                let status = close_status(notification.status);
                let outcome = self
                    .ledger
                    .mark_terminal(
                        authority,
                        notification.transaction_id,
                        status,
                        &notification.gateway_reference,
                    )
                    .await
                    .map_err(ledger_error)?;
                match outcome {
                    DepositOutcome::Applied { .. } => {
                        record_best_effort(
                            self.audit.as_ref(),
                            AuditEntry::new(
                                AuditKind::TransactionClosed,
                                notification.user_id.to_string(),
                                format!("closed as {}", status),
                            )
                            .with_reference(notification.transaction_id.to_string()),
                        )
                        .await;
                        Ok(ProcessNotificationResult::TransactionClosed { status })
                    }
                    DepositOutcome::AlreadyTerminal { status } => {
                        Ok(ProcessNotificationResult::Replayed { status })
                    }
                }
            }
            NotificationStatus::Pending => Ok(ProcessNotificationResult::Acknowledged),
        }
    }

    async fn apply_withdrawal(
        &self,
        authority: &LedgerAuthority,
        notification: &PaymentNotification,
    ) -> Result<ProcessNotificationResult, WebhookError> {
        match notification.status {
            NotificationStatus::Complete => {
                let receipt = match self
                    .ledger
                    .settle_withdrawal(
                        authority,
                        notification.transaction_id,
                        Some(&notification.gateway_reference),
                    )
                    .await
                {
                    Ok(receipt) => receipt,
                    Err(WalletError::AlreadyTerminal { status }) => {
                        return Ok(ProcessNotificationResult::Replayed { status })
                    }
                    Err(err) => return Err(ledger_error(err)),
                };
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::new(
                        AuditKind::WithdrawalSettled,
                        notification.user_id.to_string(),
                        format!("gateway ref {}", notification.gateway_reference),
                    )
                    .with_reference(notification.transaction_id.to_string())
                    .with_amount(notification.amount_gross),
                )
                .await;
                Ok(ProcessNotificationResult::WithdrawalSettled {
                    available: receipt.available,
                })
            }
            NotificationStatus::Failed | NotificationStatus::Cancelled => {
                let status = close_status(notification.status);
                let receipt = match self
                    .ledger
                    .release_withdrawal(
                        authority,
                        notification.transaction_id,
                        status,
                        Some(&notification.gateway_reference),
                    )
                    .await
                {
                    Ok(receipt) => receipt,
                    Err(WalletError::AlreadyTerminal { status }) => {
                        return Ok(ProcessNotificationResult::Replayed { status })
                    }
                    Err(err) => return Err(ledger_error(err)),
                };
                record_best_effort(
                    self.audit.as_ref(),
                    AuditEntry::new(
                        AuditKind::TransactionClosed,
                        notification.user_id.to_string(),
                        format!("withdrawal released as {}", status),
                    )
                    .with_reference(notification.transaction_id.to_string())
                    .with_amount(notification.amount_gross),
                )
                .await;
                Ok(ProcessNotificationResult::WithdrawalReleased {
                    available: receipt.available,
                })
            }
            NotificationStatus::Pending => Ok(ProcessNotificationResult::Acknowledged),
        }
    }
}

/// Everything except the signature field, encoded the gateway's way.
/// This is the exact parameter string the validation endpoint expects.
fn confirmation_payload(fields: &OrderedFields) -> String {
    fields
        .iter()
        .filter(|(k, v)| *k != SIGNATURE_FIELD && !v.is_empty())
        .map(|(k, v)| format!("{}={}", k, encode_value(v)))
        .collect::<Vec<_>>()
        .join("&")
}

fn close_status(status: NotificationStatus) -> TransactionStatus {
    match status {
        NotificationStatus::Cancelled => TransactionStatus::Cancelled,
        _ => TransactionStatus::Failed,
    }
}

fn ledger_error(err: WalletError) -> WebhookError {
    match err {
        WalletError::TransactionNotFound => WebhookError::TransactionNotFound,
        WalletError::Storage(msg) => WebhookError::Database(msg),
        other => WebhookError::Database(other.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use chrono::{DateTime, Utc};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    use crate::domain::foundation::{DomainError, TransactionId, UserId};
    use crate::domain::gateway::AllowRule;
    use crate::domain::wallet::{TransactionType, WalletBalance, WalletTransaction};
    use crate::ports::WithdrawalReceipt;

    // ════════════════════════════════════════════════════════════════════════════
    // Mock Implementations
    // ════════════════════════════════════════════════════════════════════════════

    struct MockLedgerStore {
        transactions: Mutex<Vec<WalletTransaction>>,
        mutations: AtomicUsize,
    }

    impl MockLedgerStore {
        fn with_transaction(tx: WalletTransaction) -> Self {
            Self {
                transactions: Mutex::new(vec![tx]),
                mutations: AtomicUsize::new(0),
            }
        }

        fn empty() -> Self {
            Self {
                transactions: Mutex::new(Vec::new()),
                mutations: AtomicUsize::new(0),
            }
        }

        fn mutation_count(&self) -> usize {
            self.mutations.load(Ordering::SeqCst)
        }

        fn status_of(&self, id: TransactionId) -> Option<TransactionStatus> {
            self.transactions
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .map(|t| t.status)
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
            self.transactions.lock().unwrap().push(tx.clone());
            Ok(tx)
        }

        async fn find_transaction(
            &self,
            id: TransactionId,
        ) -> Result<Option<WalletTransaction>, DomainError> {
            Ok(self
                .transactions
                .lock()
                .unwrap()
                .iter()
                .find(|t| t.id == id)
                .cloned())
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
            tx_id: TransactionId,
            amount: Money,
            external_reference: &str,
        ) -> Result<DepositOutcome, WalletError> {
            let mut txs = self.transactions.lock().unwrap();
            let tx = txs
                .iter_mut()
                .find(|t| t.id == tx_id)
                .ok_or(WalletError::TransactionNotFound)?;
            if tx.tx_type != TransactionType::Deposit {
                return Err(WalletError::TransactionNotFound);
            }
            if tx.status.is_terminal() {
                return Ok(DepositOutcome::AlreadyTerminal { status: tx.status });
            }
            tx.transition_to(TransactionStatus::Completed, Utc::now())?;
            tx.external_reference = Some(external_reference.to_string());
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(DepositOutcome::Applied {
                balance_after: amount,
            })
        }

        async fn mark_terminal(
            &self,
            _authority: &LedgerAuthority,
            tx_id: TransactionId,
            status: TransactionStatus,
            _external_reference: &str,
        ) -> Result<DepositOutcome, WalletError> {
            let mut txs = self.transactions.lock().unwrap();
            let tx = txs
                .iter_mut()
                .find(|t| t.id == tx_id)
                .ok_or(WalletError::TransactionNotFound)?;
            if tx.tx_type != TransactionType::Deposit {
                return Err(WalletError::TransactionNotFound);
            }
            if tx.status.is_terminal() {
                return Ok(DepositOutcome::AlreadyTerminal { status: tx.status });
            }
            tx.transition_to(status, Utc::now())?;
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(DepositOutcome::Applied {
                balance_after: Money::ZERO,
            })
        }

        async fn request_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            _user_id: UserId,
            _amount: Money,
            _requested_at: DateTime<Utc>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            unimplemented!("not exercised by notification tests")
        }

        async fn settle_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            tx_id: TransactionId,
            _external_reference: Option<&str>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            let mut txs = self.transactions.lock().unwrap();
            let tx = txs
                .iter_mut()
                .find(|t| t.id == tx_id)
                .ok_or(WalletError::TransactionNotFound)?;
            if tx.tx_type != TransactionType::Withdrawal {
                return Err(WalletError::TransactionNotFound);
            }
            if tx.status.is_terminal() {
                return Err(WalletError::AlreadyTerminal { status: tx.status });
            }
            tx.transition_to(TransactionStatus::Completed, Utc::now())?;
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(WithdrawalReceipt {
                transaction: tx.clone(),
                available: Money::ZERO,
                pending_withdrawal: Money::ZERO,
            })
        }

        async fn release_withdrawal(
            &self,
            _authority: &LedgerAuthority,
            tx_id: TransactionId,
            status: TransactionStatus,
            _external_reference: Option<&str>,
        ) -> Result<WithdrawalReceipt, WalletError> {
            let mut txs = self.transactions.lock().unwrap();
            let tx = txs
                .iter_mut()
                .find(|t| t.id == tx_id)
                .ok_or(WalletError::TransactionNotFound)?;
            if tx.tx_type != TransactionType::Withdrawal {
                return Err(WalletError::TransactionNotFound);
            }
            if tx.status.is_terminal() {
                return Err(WalletError::AlreadyTerminal { status: tx.status });
            }
            tx.transition_to(status, Utc::now())?;
            self.mutations.fetch_add(1, Ordering::SeqCst);
            Ok(WithdrawalReceipt {
                transaction: tx.clone(),
                available: tx.amount,
                pending_withdrawal: Money::ZERO,
            })
        }
    }

    struct MockGatewayClient {
        response: Result<(), GatewayError>,
    }

    impl MockGatewayClient {
        fn confirming() -> Self {
            Self { response: Ok(()) }
        }

        fn rejecting() -> Self {
            Self {
                response: Err(GatewayError::Rejected("INVALID".to_string())),
            }
        }
    }

    #[async_trait]
    impl GatewayClient for MockGatewayClient {
        async fn confirm(&self, _canonical_payload: &str) -> Result<(), GatewayError> {
            self.response.clone()
        }
    }

    struct MockAuditSink {
        entries: Mutex<Vec<AuditEntry>>,
    }

    impl MockAuditSink {
        fn new() -> Self {
            Self {
                entries: Mutex::new(Vec::new()),
            }
        }

        fn kinds(&self) -> Vec<AuditKind> {
            self.entries.lock().unwrap().iter().map(|e| e.kind).collect()
        }
    }

    #[async_trait]
    impl AuditSink for MockAuditSink {
        async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
            self.entries.lock().unwrap().push(entry);
            Ok(())
        }
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Test Fixtures
    // ════════════════════════════════════════════════════════════════════════════

    const MERCHANT_ID: &str = "10000100";
    const ALLOWED_IP: &str = "197.97.145.145";

    fn allowed_ip() -> Option<IpAddr> {
        Some(ALLOWED_IP.parse().unwrap())
    }

    fn verifier() -> SignatureVerifier {
        SignatureVerifier::new(None)
    }

    fn authenticator() -> SourceAuthenticator {
        SourceAuthenticator::new(
            vec!["197.97.145.144/28".parse::<AllowRule>().unwrap()],
            false,
        )
    }

    fn pending_tx(amount_cents: i64, kind: TransactionType) -> WalletTransaction {
        WalletTransaction::pending(
            UserId::new(),
            kind,
            Money::from_cents(amount_cents).unwrap(),
            Utc::now(),
        )
    }

    /// Form body for a notification about `tx`, signed correctly.
    fn signed_body(tx: &WalletTransaction, status: &str, kind: &str, amount: &str) -> Vec<u8> {
        let mut fields = OrderedFields::new();
        fields.push("merchant_id", MERCHANT_ID);
        fields.push("amount_gross", amount);
        fields.push("payment_status", status);
        fields.push("pf_payment_id", "1089250");
        fields.push("custom_str1", tx.user_id.to_string());
        fields.push("custom_str2", tx.id.to_string());
        fields.push("custom_str3", kind);
        let signature = verifier().sign(&fields);
        fields.push("signature", &signature);

        fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode_value(v)))
            .collect::<Vec<_>>()
            .join("&")
            .into_bytes()
    }

    fn handler(
        ledger: Arc<MockLedgerStore>,
        gateway: MockGatewayClient,
        audit: Arc<MockAuditSink>,
    ) -> ProcessNotificationHandler {
        ProcessNotificationHandler::new(
            ledger,
            Arc::new(gateway),
            audit,
            authenticator(),
            verifier(),
            MERCHANT_ID.to_string(),
            true,
        )
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Deposit Flow
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn complete_deposit_credits_and_audits() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert!(matches!(
            result,
            ProcessNotificationResult::DepositApplied { .. }
        ));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Completed));
        assert_eq!(audit.kinds(), vec![AuditKind::DepositCompleted]);
    }

    #[tokio::test]
    async fn replayed_notification_is_noop_success() {
        let mut tx = pending_tx(20000, TransactionType::Deposit);
        tx.transition_to(TransactionStatus::Completed, Utc::now())
            .unwrap();
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert_eq!(
            result,
            ProcessNotificationResult::Replayed {
                status: TransactionStatus::Completed
            }
        );
        assert_eq!(ledger.mutation_count(), 0);
        assert!(audit.kinds().is_empty());
    }

    #[tokio::test]
    async fn failed_deposit_closes_without_balance_change() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "FAILED", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert_eq!(
            result,
            ProcessNotificationResult::TransactionClosed {
                status: TransactionStatus::Failed
            }
        );
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Failed));
        assert_eq!(audit.kinds(), vec![AuditKind::TransactionClosed]);
    }

    #[tokio::test]
    async fn pending_status_is_acknowledged_without_mutation() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "PENDING", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit);

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert_eq!(result, ProcessNotificationResult::Acknowledged);
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Pending));
        assert_eq!(ledger.mutation_count(), 0);
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Withdrawal Flow
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn complete_withdrawal_settles() {
        let tx = pending_tx(30000, TransactionType::Withdrawal);
        let body = signed_body(&tx, "COMPLETE", "withdrawal", "300.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert!(matches!(
            result,
            ProcessNotificationResult::WithdrawalSettled { .. }
        ));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Completed));
        assert_eq!(audit.kinds(), vec![AuditKind::WithdrawalSettled]);
    }

    #[tokio::test]
    async fn cancelled_withdrawal_releases_funds() {
        let tx = pending_tx(30000, TransactionType::Withdrawal);
        let body = signed_body(&tx, "CANCELLED", "withdrawal", "300.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let result = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap();

        assert!(matches!(
            result,
            ProcessNotificationResult::WithdrawalReleased { .. }
        ));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Cancelled));
    }

    // ════════════════════════════════════════════════════════════════════════════
    // Trust Pipeline Rejections
    // ════════════════════════════════════════════════════════════════════════════

    #[tokio::test]
    async fn unlisted_source_is_rejected_before_parsing() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: Some("203.0.113.5".parse().unwrap()),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::SourceRejected));
        assert_eq!(ledger.mutation_count(), 0);
        assert_eq!(audit.kinds(), vec![AuditKind::SourceRejected]);
    }

    #[tokio::test]
    async fn missing_source_address_is_rejected() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger, MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: None,
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::SourceUnknown));
    }

    #[tokio::test]
    async fn tampered_amount_fails_signature_check() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let mut body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        // Attacker inflates the amount after signing
        let tampered = String::from_utf8(body.clone())
            .unwrap()
            .replace("amount_gross=200.00", "amount_gross=900.00");
        body = tampered.into_bytes();
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::InvalidSignature));
        assert_eq!(ledger.mutation_count(), 0);
        assert_eq!(audit.kinds(), vec![AuditKind::SignatureRejected]);
    }

    #[tokio::test]
    async fn foreign_merchant_id_is_rejected() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let mut fields = OrderedFields::new();
        fields.push("merchant_id", "99999999");
        fields.push("amount_gross", "200.00");
        fields.push("payment_status", "COMPLETE");
        fields.push("pf_payment_id", "1089250");
        fields.push("custom_str1", tx.user_id.to_string());
        fields.push("custom_str2", tx.id.to_string());
        fields.push("custom_str3", "deposit");
        let signature = verifier().sign(&fields);
        fields.push("signature", &signature);
        let body = fields
            .iter()
            .map(|(k, v)| format!("{}={}", k, encode_value(v)))
            .collect::<Vec<_>>()
            .join("&")
            .into_bytes();

        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::MerchantMismatch));
        assert_eq!(ledger.mutation_count(), 0);
        assert_eq!(audit.kinds(), vec![AuditKind::MerchantMismatch]);
    }

    #[tokio::test]
    async fn gateway_round_trip_rejection_blocks_mutation() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::rejecting(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::GatewayRejected(_)));
        assert_eq!(ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn amount_disagreement_with_stored_transaction_is_rejected() {
        // Signed correctly, but the stored transaction says 199.99
        let tx = pending_tx(19999, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit.clone());

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            WebhookError::AmountMismatch {
                notified: 20000,
                expected: 19999
            }
        ));
        assert_eq!(ledger.mutation_count(), 0);
        assert_eq!(audit.kinds(), vec![AuditKind::AmountMismatch]);
    }

    #[tokio::test]
    async fn unknown_transaction_id_is_not_found() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::empty());
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger, MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound));
    }

    #[tokio::test]
    async fn deposit_kind_aimed_at_withdrawal_transaction_is_not_found() {
        // A correctly signed body may still lie about the kind. The
        // referenced transaction is a reserved withdrawal; crediting it
        // as a deposit would mint money on top of the reservation.
        let tx = pending_tx(30000, TransactionType::Withdrawal);
        let body = signed_body(&tx, "COMPLETE", "deposit", "300.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Pending));
        assert_eq!(ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn failed_deposit_kind_cannot_close_withdrawal_transaction() {
        let tx = pending_tx(30000, TransactionType::Withdrawal);
        let body = signed_body(&tx, "FAILED", "deposit", "300.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Pending));
        assert_eq!(ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn withdrawal_kind_aimed_at_deposit_transaction_is_not_found() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        let body = signed_body(&tx, "COMPLETE", "withdrawal", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx.clone()));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound));
        assert_eq!(ledger.status_of(tx.id), Some(TransactionStatus::Pending));
        assert_eq!(ledger.mutation_count(), 0);
    }

    #[tokio::test]
    async fn user_mismatch_reads_as_not_found() {
        let tx = pending_tx(20000, TransactionType::Deposit);
        // Body names a different user than the stored transaction
        let mut foreign = tx.clone();
        foreign.user_id = UserId::new();
        let body = signed_body(&foreign, "COMPLETE", "deposit", "200.00");
        let ledger = Arc::new(MockLedgerStore::with_transaction(tx));
        let audit = Arc::new(MockAuditSink::new());
        let handler = handler(ledger.clone(), MockGatewayClient::confirming(), audit);

        let err = handler
            .handle(ProcessNotificationCommand {
                body,
                client_ip: allowed_ip(),
            })
            .await
            .unwrap_err();

        assert!(matches!(err, WebhookError::TransactionNotFound));
        assert_eq!(ledger.mutation_count(), 0);
    }
}
