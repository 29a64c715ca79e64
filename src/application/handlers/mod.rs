//! Application handlers.
//!
//! Command handlers that orchestrate domain operations across ports.

pub mod expire_reservations;
pub mod initiate_deposit;
pub mod process_notification;
pub mod request_withdrawal;
pub mod settle_withdrawal;

pub use expire_reservations::{ExpireReservationsHandler, ReconcileSummary};
pub use initiate_deposit::{
    DepositInitiation, InitiateDepositCommand, InitiateDepositHandler, ReturnUrls,
};
pub use process_notification::{
    ProcessNotificationCommand, ProcessNotificationHandler, ProcessNotificationResult,
};
pub use request_withdrawal::{RequestWithdrawalCommand, RequestWithdrawalHandler};
pub use settle_withdrawal::{
    SettleWithdrawalCommand, SettleWithdrawalHandler, SettleWithdrawalResult,
};
