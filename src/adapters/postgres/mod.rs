//! PostgreSQL adapters - Database implementations for storage ports.
//!
//! - `PostgresLedgerStore` - Wallets and the transaction state machine,
//!   with row-locked atomic mutations
//! - `PostgresReservationStore` - Expired stock holds, `SKIP LOCKED` scan
//! - `PostgresAuditSink` - Append-only audit trail

mod audit_sink;
mod ledger_store;
mod reservation_store;

pub use audit_sink::PostgresAuditSink;
pub use ledger_store::PostgresLedgerStore;
pub use reservation_store::PostgresReservationStore;
