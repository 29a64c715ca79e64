//! Foundation - Shared value objects and error types.
//!
//! Building blocks used across every domain module: strongly-typed
//! identifiers, fixed-point money, and the infrastructure error type.

mod errors;
mod ids;
mod money;

pub use errors::{DomainError, ErrorCode};
pub use ids::{OrderId, TransactionId, UserId};
pub use money::{Money, MoneyError};
