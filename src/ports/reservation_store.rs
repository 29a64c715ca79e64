//! Reservation store port - expired stock holds on unpaid orders.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::domain::foundation::{DomainError, OrderId};

/// Result of attempting to expire one order's reservation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExpireOutcome {
    /// Stock released back to inventory and the order marked expired.
    Released { quantity_released: i64 },
    /// Someone else already handled this order (a concurrent reconciler
    /// run, or the buyer paid in the meantime). Nothing changed.
    AlreadyHandled,
}

/// Persistence port for order stock reservations.
///
/// `expire_order` must run under a row lock on the order so a
/// concurrent reconciler run or an in-flight checkout completion on
/// the same order serializes against it; the candidate scan may use
/// `SKIP LOCKED` semantics to step around rows another run holds.
#[async_trait]
pub trait ReservationStore: Send + Sync {
    /// Lists orders whose reservation expired before `now` and whose
    /// payment is still unresolved, up to `limit`.
    async fn list_expired(
        &self,
        now: DateTime<Utc>,
        limit: u32,
    ) -> Result<Vec<OrderId>, DomainError>;

    /// Releases one expired order's held stock back to inventory and
    /// marks the order expired, atomically. Idempotent: an order that is
    /// no longer an expiry candidate yields `AlreadyHandled`.
    async fn expire_order(
        &self,
        order_id: OrderId,
        now: DateTime<Utc>,
    ) -> Result<ExpireOutcome, DomainError>;
}
