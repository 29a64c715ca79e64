//! Tradepost - Marketplace backend.
//!
//! This crate implements the payment and wallet integrity engine behind the
//! marketplace: gateway webhook verification, exactly-once money movement,
//! and stock reservation reconciliation.

pub mod adapters;
pub mod application;
pub mod config;
pub mod domain;
pub mod ports;
