//! ExpireReservationsHandler - Reconciler for lapsed stock holds.
//!
//! Orders reserve stock when checkout begins; a buyer who never pays
//! would strand that stock forever. Each run scans for holds past
//! their expiry and releases them one order at a time, so a failure on
//! one order never blocks the rest of the batch.

use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, Utc};

use crate::domain::foundation::OrderId;
use crate::ports::{
    record_best_effort, AuditEntry, AuditKind, AuditSink, ExpireOutcome, ReservationStore,
};

/// What one reconciler run did.
#[derive(Debug, Clone, Default)]
pub struct ReconcileSummary {
    /// Candidates examined.
    pub processed: usize,
    /// Orders whose stock went back to inventory.
    pub released: usize,
    /// Candidates another run or a paying buyer got to first.
    pub already_handled: usize,
    /// Orders that errored; they stay candidates for the next run.
    pub failed: Vec<OrderId>,
    /// Wall-clock duration of the run in milliseconds.
    pub duration_ms: u128,
}

/// Handler that expires lapsed reservations in batches.
pub struct ExpireReservationsHandler {
    reservations: Arc<dyn ReservationStore>,
    audit: Arc<dyn AuditSink>,
    batch_limit: u32,
}

impl ExpireReservationsHandler {
    pub fn new(
        reservations: Arc<dyn ReservationStore>,
        audit: Arc<dyn AuditSink>,
        batch_limit: u32,
    ) -> Self {
        Self {
            reservations,
            audit,
            batch_limit,
        }
    }

    /// Runs one reconcile pass as of `now`.
    ///
    /// Never aborts mid-batch: per-order failures are collected and the
    /// run reports them in the summary. Re-running against the same
    /// candidates is harmless, the store answers `AlreadyHandled`.
    pub async fn handle(&self, now: DateTime<Utc>) -> ReconcileSummary {
        let started = Instant::now();
        let mut summary = ReconcileSummary::default();

        let candidates = match self.reservations.list_expired(now, self.batch_limit).await {
            Ok(candidates) => candidates,
            Err(err) => {
                tracing::error!(error = %err, "expired reservation scan failed");
                summary.duration_ms = started.elapsed().as_millis();
                return summary;
            }
        };

        for order_id in candidates {
            summary.processed += 1;
            match self.reservations.expire_order(order_id, now).await {
                Ok(ExpireOutcome::Released { quantity_released }) => {
                    summary.released += 1;
                    tracing::info!(
                        order_id = %order_id,
                        quantity_released,
                        "expired reservation released"
                    );
                    record_best_effort(
                        self.audit.as_ref(),
                        AuditEntry::new(
                            AuditKind::ReservationReleased,
                            "scheduler",
                            format!("released {} units", quantity_released),
                        )
                        .with_reference(order_id.to_string()),
                    )
                    .await;
                }
                Ok(ExpireOutcome::AlreadyHandled) => {
                    summary.already_handled += 1;
                }
                Err(err) => {
                    tracing::warn!(order_id = %order_id, error = %err, "expiry failed");
                    summary.failed.push(order_id);
                }
            }
        }

        summary.duration_ms = started.elapsed().as_millis();
        tracing::info!(
            processed = summary.processed,
            released = summary.released,
            already_handled = summary.already_handled,
            failed = summary.failed.len(),
            duration_ms = summary.duration_ms,
            "reconcile run complete"
        );
        summary
    }
}
