//! Ports - Interfaces for external dependencies.
//!
//! Following hexagonal architecture, ports define the contracts between
//! the domain and the outside world. Adapters implement these ports.
//!
//! ## Money Movement Ports
//!
//! - `LedgerStore` - Wallets and the transaction state machine,
//!   including the privileged atomic balance mutations
//! - `AuditSink` - Append-only security and money event trail
//!
//! ## Gateway Ports
//!
//! - `GatewayClient` - Round-trip confirmation of a notification with
//!   the payment gateway itself
//!
//! ## Reconciliation Ports
//!
//! - `ReservationStore` - Expired stock holds on unpaid orders

mod audit_sink;
mod gateway_client;
mod ledger_store;
mod reservation_store;

pub use audit_sink::{AuditEntry, AuditKind, AuditSink};
pub(crate) use audit_sink::record_best_effort;
pub use gateway_client::{GatewayClient, GatewayError};
pub use ledger_store::{DepositOutcome, LedgerStore, WithdrawalReceipt};
pub use reservation_store::{ExpireOutcome, ReservationStore};
