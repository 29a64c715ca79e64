//! Wallet domain - ledger state machine and balance engine.
//!
//! A wallet holds three buckets per user (`available`, `locked`,
//! `pending_withdrawal`) plus lifetime totals, and every money movement
//! is recorded as a `WalletTransaction` that transitions exactly once
//! from `pending` to a terminal state.

mod authority;
mod balance;
mod errors;
mod transaction;

pub use authority::LedgerAuthority;
pub use balance::WalletBalance;
pub use errors::WalletError;
pub use transaction::{TransactionStatus, TransactionType, WalletTransaction};
