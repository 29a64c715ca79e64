//! PostgreSQL implementation of LedgerStore.
//!
//! Every privileged mutation runs inside one database transaction with
//! `SELECT ... FOR UPDATE` on the rows it touches, so the check and the
//! write are a single atomic unit. Lock order is transaction row first,
//! then wallet row.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Postgres, Transaction};
use uuid::Uuid;

use crate::domain::foundation::{DomainError, ErrorCode, Money, TransactionId, UserId};
use crate::domain::wallet::{
    LedgerAuthority, TransactionStatus, TransactionType, WalletBalance, WalletError,
    WalletTransaction,
};
use crate::ports::{DepositOutcome, LedgerStore, WithdrawalReceipt};

/// PostgreSQL implementation of the LedgerStore port.
pub struct PostgresLedgerStore {
    pool: PgPool,
}

impl PostgresLedgerStore {
    /// Creates a new PostgresLedgerStore with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Locks and loads the wallet row for `user_id` within `db`.
    async fn lock_wallet(
        &self,
        db: &mut Transaction<'_, Postgres>,
        user_id: UserId,
    ) -> Result<Option<WalletBalance>, WalletError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT user_id, available, locked, pending_withdrawal,
                   total_deposited, total_withdrawn, updated_at
            FROM wallets
            WHERE user_id = $1
            FOR UPDATE
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&mut **db)
        .await
        .map_err(storage)?;

        row.map(WalletBalance::try_from).transpose().map_err(Into::into)
    }

    /// Locks and loads a transaction row within `db`.
    async fn lock_transaction(
        &self,
        db: &mut Transaction<'_, Postgres>,
        tx_id: TransactionId,
    ) -> Result<WalletTransaction, WalletError> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, tx_type, amount, status, external_reference,
                   balance_after, created_at, updated_at
            FROM wallet_transactions
            WHERE id = $1
            FOR UPDATE
            "#,
        )
        .bind(tx_id.as_uuid())
        .fetch_optional(&mut **db)
        .await
        .map_err(storage)?;

        let row = row.ok_or(WalletError::TransactionNotFound)?;
        WalletTransaction::try_from(row).map_err(Into::into)
    }

    async fn persist_wallet(
        &self,
        db: &mut Transaction<'_, Postgres>,
        balance: &WalletBalance,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallets SET
                available = $2,
                locked = $3,
                pending_withdrawal = $4,
                total_deposited = $5,
                total_withdrawn = $6,
                updated_at = $7
            WHERE user_id = $1
            "#,
        )
        .bind(balance.user_id.as_uuid())
        .bind(balance.available.cents())
        .bind(balance.locked.cents())
        .bind(balance.pending_withdrawal.cents())
        .bind(balance.total_deposited.cents())
        .bind(balance.total_withdrawn.cents())
        .bind(balance.updated_at)
        .execute(&mut **db)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn persist_transaction(
        &self,
        db: &mut Transaction<'_, Postgres>,
        transaction: &WalletTransaction,
    ) -> Result<(), WalletError> {
        sqlx::query(
            r#"
            UPDATE wallet_transactions SET
                status = $2,
                external_reference = $3,
                balance_after = $4,
                updated_at = $5
            WHERE id = $1
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(transaction.status.as_str())
        .bind(&transaction.external_reference)
        .bind(transaction.balance_after.map(|m| m.cents()))
        .bind(transaction.updated_at)
        .execute(&mut **db)
        .await
        .map_err(storage)?;
        Ok(())
    }
}

/// Database row representation of a wallet.
#[derive(Debug, sqlx::FromRow)]
struct WalletRow {
    user_id: Uuid,
    available: i64,
    locked: i64,
    pending_withdrawal: i64,
    total_deposited: i64,
    total_withdrawn: i64,
    updated_at: DateTime<Utc>,
}

impl TryFrom<WalletRow> for WalletBalance {
    type Error = DomainError;

    fn try_from(row: WalletRow) -> Result<Self, Self::Error> {
        Ok(WalletBalance {
            user_id: UserId::from_uuid(row.user_id),
            available: cents(row.available)?,
            locked: cents(row.locked)?,
            pending_withdrawal: cents(row.pending_withdrawal)?,
            total_deposited: cents(row.total_deposited)?,
            total_withdrawn: cents(row.total_withdrawn)?,
            updated_at: row.updated_at,
        })
    }
}

/// Database row representation of a wallet transaction.
#[derive(Debug, sqlx::FromRow)]
struct TransactionRow {
    id: Uuid,
    user_id: Uuid,
    tx_type: String,
    amount: i64,
    status: String,
    external_reference: Option<String>,
    balance_after: Option<i64>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<TransactionRow> for WalletTransaction {
    type Error = DomainError;

    fn try_from(row: TransactionRow) -> Result<Self, Self::Error> {
        Ok(WalletTransaction {
            id: TransactionId::from_uuid(row.id),
            user_id: UserId::from_uuid(row.user_id),
            tx_type: parse_type(&row.tx_type)?,
            amount: cents(row.amount)?,
            status: parse_status(&row.status)?,
            external_reference: row.external_reference,
            balance_after: row.balance_after.map(cents).transpose()?,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn cents(value: i64) -> Result<Money, DomainError> {
    Money::from_cents(value).map_err(|e| {
        DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid stored amount {}: {}", value, e),
        )
    })
}

fn parse_type(s: &str) -> Result<TransactionType, DomainError> {
    match s {
        "deposit" => Ok(TransactionType::Deposit),
        "withdrawal" => Ok(TransactionType::Withdrawal),
        "escrow_hold" => Ok(TransactionType::EscrowHold),
        "escrow_release" => Ok(TransactionType::EscrowRelease),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid transaction type value: {}", s),
        )),
    }
}

fn parse_status(s: &str) -> Result<TransactionStatus, DomainError> {
    match s {
        "pending" => Ok(TransactionStatus::Pending),
        "completed" => Ok(TransactionStatus::Completed),
        "failed" => Ok(TransactionStatus::Failed),
        "cancelled" => Ok(TransactionStatus::Cancelled),
        _ => Err(DomainError::new(
            ErrorCode::DatabaseError,
            format!("Invalid transaction status value: {}", s),
        )),
    }
}

fn storage(e: sqlx::Error) -> WalletError {
    WalletError::Storage(e.to_string())
}

fn db_error(e: sqlx::Error) -> DomainError {
    DomainError::database(e.to_string())
}

#[async_trait]
impl LedgerStore for PostgresLedgerStore {
    async fn create_pending(
        &self,
        user_id: UserId,
        tx_type: TransactionType,
        amount: Money,
    ) -> Result<WalletTransaction, DomainError> {
        let now = Utc::now();
        let transaction = WalletTransaction::pending(user_id, tx_type, amount, now);

        let mut db = self.pool.begin().await.map_err(db_error)?;

        // Lazy wallet creation on first money movement
        sqlx::query(
            r#"
            INSERT INTO wallets (user_id, available, locked, pending_withdrawal,
                                 total_deposited, total_withdrawn, updated_at)
            VALUES ($1, 0, 0, 0, 0, 0, $2)
            ON CONFLICT (user_id) DO NOTHING
            "#,
        )
        .bind(user_id.as_uuid())
        .bind(now)
        .execute(&mut *db)
        .await
        .map_err(db_error)?;

        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, user_id, tx_type, amount, status, external_reference,
                balance_after, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6, $6)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(tx_type.as_str())
        .bind(amount.cents())
        .bind(transaction.status.as_str())
        .bind(now)
        .execute(&mut *db)
        .await
        .map_err(db_error)?;

        db.commit().await.map_err(db_error)?;
        Ok(transaction)
    }

    async fn find_transaction(
        &self,
        id: TransactionId,
    ) -> Result<Option<WalletTransaction>, DomainError> {
        let row: Option<TransactionRow> = sqlx::query_as(
            r#"
            SELECT id, user_id, tx_type, amount, status, external_reference,
                   balance_after, created_at, updated_at
            FROM wallet_transactions
            WHERE id = $1
            "#,
        )
        .bind(id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(WalletTransaction::try_from).transpose()
    }

    async fn load_balance(&self, user_id: UserId) -> Result<Option<WalletBalance>, DomainError> {
        let row: Option<WalletRow> = sqlx::query_as(
            r#"
            SELECT user_id, available, locked, pending_withdrawal,
                   total_deposited, total_withdrawn, updated_at
            FROM wallets
            WHERE user_id = $1
            "#,
        )
        .bind(user_id.as_uuid())
        .fetch_optional(&self.pool)
        .await
        .map_err(db_error)?;

        row.map(WalletBalance::try_from).transpose()
    }

    async fn complete_deposit(
        &self,
        _authority: &LedgerAuthority,
        tx_id: TransactionId,
        amount: Money,
        external_reference: &str,
    ) -> Result<DepositOutcome, WalletError> {
        let mut db = self.pool.begin().await.map_err(storage)?;

        let mut transaction = self.lock_transaction(&mut db, tx_id).await?;
        if transaction.tx_type != TransactionType::Deposit {
            return Err(WalletError::TransactionNotFound);
        }
        if transaction.status.is_terminal() {
            // Replay: drop the transaction, nothing was written
            return Ok(DepositOutcome::AlreadyTerminal {
                status: transaction.status,
            });
        }

        let now = Utc::now();
        let mut balance = self
            .lock_wallet(&mut db, transaction.user_id)
            .await?
            .ok_or_else(|| WalletError::Storage("wallet row missing".to_string()))?;

        balance.apply_deposit(amount, now)?;
        transaction.transition_to(TransactionStatus::Completed, now)?;
        transaction.external_reference = Some(external_reference.to_string());
        transaction.balance_after = Some(balance.available);

        self.persist_wallet(&mut db, &balance).await?;
        self.persist_transaction(&mut db, &transaction).await?;
        db.commit().await.map_err(storage)?;

        Ok(DepositOutcome::Applied {
            balance_after: balance.available,
        })
    }

    async fn mark_terminal(
        &self,
        _authority: &LedgerAuthority,
        tx_id: TransactionId,
        status: TransactionStatus,
        external_reference: &str,
    ) -> Result<DepositOutcome, WalletError> {
        let mut db = self.pool.begin().await.map_err(storage)?;

        let mut transaction = self.lock_transaction(&mut db, tx_id).await?;
        if transaction.tx_type != TransactionType::Deposit {
            return Err(WalletError::TransactionNotFound);
        }
        if transaction.status.is_terminal() {
            return Ok(DepositOutcome::AlreadyTerminal {
                status: transaction.status,
            });
        }

        let now = Utc::now();
        transaction.transition_to(status, now)?;
        transaction.external_reference = Some(external_reference.to_string());

        self.persist_transaction(&mut db, &transaction).await?;
        db.commit().await.map_err(storage)?;

        // No balance mutation: the funds never arrived
        Ok(DepositOutcome::Applied {
            balance_after: Money::ZERO,
        })
    }

    async fn request_withdrawal(
        &self,
        _authority: &LedgerAuthority,
        user_id: UserId,
        amount: Money,
        requested_at: DateTime<Utc>,
    ) -> Result<WithdrawalReceipt, WalletError> {
        let mut db = self.pool.begin().await.map_err(storage)?;

        // No wallet means no deposits ever, so nothing is available
        let mut balance = self
            .lock_wallet(&mut db, user_id)
            .await?
            .ok_or(WalletError::InsufficientFunds {
                available: Money::ZERO,
            })?;

        balance.reserve_withdrawal(amount, requested_at)?;

        let transaction =
            WalletTransaction::pending(user_id, TransactionType::Withdrawal, amount, requested_at);
        sqlx::query(
            r#"
            INSERT INTO wallet_transactions (
                id, user_id, tx_type, amount, status, external_reference,
                balance_after, created_at, updated_at
            ) VALUES ($1, $2, $3, $4, $5, NULL, NULL, $6, $6)
            "#,
        )
        .bind(transaction.id.as_uuid())
        .bind(user_id.as_uuid())
        .bind(transaction.tx_type.as_str())
        .bind(amount.cents())
        .bind(transaction.status.as_str())
        .bind(requested_at)
        .execute(&mut *db)
        .await
        .map_err(storage)?;

        self.persist_wallet(&mut db, &balance).await?;
        db.commit().await.map_err(storage)?;

        Ok(WithdrawalReceipt {
            transaction,
            available: balance.available,
            pending_withdrawal: balance.pending_withdrawal,
        })
    }

    async fn settle_withdrawal(
        &self,
        _authority: &LedgerAuthority,
        tx_id: TransactionId,
        external_reference: Option<&str>,
    ) -> Result<WithdrawalReceipt, WalletError> {
        let mut db = self.pool.begin().await.map_err(storage)?;

        let mut transaction = self.lock_transaction(&mut db, tx_id).await?;
        if transaction.tx_type != TransactionType::Withdrawal {
            return Err(WalletError::TransactionNotFound);
        }
        if transaction.status.is_terminal() {
            return Err(WalletError::AlreadyTerminal {
                status: transaction.status,
            });
        }

        let now = Utc::now();
        let mut balance = self
            .lock_wallet(&mut db, transaction.user_id)
            .await?
            .ok_or_else(|| WalletError::Storage("wallet row missing".to_string()))?;

        balance.settle_withdrawal(transaction.amount, now)?;
        transaction.transition_to(TransactionStatus::Completed, now)?;
        if let Some(reference) = external_reference {
            transaction.external_reference = Some(reference.to_string());
        }
        transaction.balance_after = Some(balance.available);

        self.persist_wallet(&mut db, &balance).await?;
        self.persist_transaction(&mut db, &transaction).await?;
        db.commit().await.map_err(storage)?;

        Ok(WithdrawalReceipt {
            transaction,
            available: balance.available,
            pending_withdrawal: balance.pending_withdrawal,
        })
    }

    async fn release_withdrawal(
        &self,
        _authority: &LedgerAuthority,
        tx_id: TransactionId,
        status: TransactionStatus,
        external_reference: Option<&str>,
    ) -> Result<WithdrawalReceipt, WalletError> {
        let mut db = self.pool.begin().await.map_err(storage)?;

        let mut transaction = self.lock_transaction(&mut db, tx_id).await?;
        if transaction.tx_type != TransactionType::Withdrawal {
            return Err(WalletError::TransactionNotFound);
        }
        if transaction.status.is_terminal() {
            return Err(WalletError::AlreadyTerminal {
                status: transaction.status,
            });
        }

        let now = Utc::now();
        let mut balance = self
            .lock_wallet(&mut db, transaction.user_id)
            .await?
            .ok_or_else(|| WalletError::Storage("wallet row missing".to_string()))?;

        balance.release_withdrawal(transaction.amount, now)?;
        transaction.transition_to(status, now)?;
        if let Some(reference) = external_reference {
            transaction.external_reference = Some(reference.to_string());
        }

        self.persist_wallet(&mut db, &balance).await?;
        self.persist_transaction(&mut db, &transaction).await?;
        db.commit().await.map_err(storage)?;

        Ok(WithdrawalReceipt {
            transaction,
            available: balance.available,
            pending_withdrawal: balance.pending_withdrawal,
        })
    }
}
