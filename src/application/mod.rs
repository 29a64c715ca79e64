//! Application layer - Commands and Handlers.
//!
//! Orchestrates domain operations and coordinates between ports. Each
//! handler owns one money-moving or reconciling use case end to end.

pub mod handlers;

pub use handlers::{
    DepositInitiation, ExpireReservationsHandler, InitiateDepositCommand, InitiateDepositHandler,
    ProcessNotificationCommand, ProcessNotificationHandler, ProcessNotificationResult,
    ReconcileSummary, RequestWithdrawalCommand, RequestWithdrawalHandler, ReturnUrls,
    SettleWithdrawalCommand, SettleWithdrawalHandler, SettleWithdrawalResult,
};
