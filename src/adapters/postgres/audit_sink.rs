//! PostgreSQL implementation of AuditSink.
//!
//! Strictly append-only: the adapter only ever issues INSERTs against
//! the audit table. No update or delete path exists in code, and the
//! migration revokes them at the database level too.

use async_trait::async_trait;
use sqlx::PgPool;

use crate::domain::foundation::DomainError;
use crate::ports::{AuditEntry, AuditSink};

/// PostgreSQL implementation of the AuditSink port.
pub struct PostgresAuditSink {
    pool: PgPool,
}

impl PostgresAuditSink {
    /// Creates a new PostgresAuditSink with the given connection pool.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PostgresAuditSink {
    async fn record(&self, entry: AuditEntry) -> Result<(), DomainError> {
        sqlx::query(
            r#"
            INSERT INTO audit_log (kind, actor, reference, amount, detail, recorded_at)
            VALUES ($1, $2, $3, $4, $5, $6)
            "#,
        )
        .bind(entry.kind.as_str())
        .bind(&entry.actor)
        .bind(&entry.reference)
        .bind(entry.amount.map(|m| m.cents()))
        .bind(&entry.detail)
        .bind(entry.recorded_at)
        .execute(&self.pool)
        .await
        .map_err(|e| DomainError::database(format!("Failed to append audit entry: {}", e)))?;

        Ok(())
    }
}
