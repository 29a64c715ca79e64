//! Three-bucket wallet balance.
//!
//! `available` is spendable now, `locked` is escrowed against open
//! orders, `pending_withdrawal` is reserved for payout awaiting
//! settlement. Lifetime totals track everything that ever entered or
//! left. Mutations are pure and checked; persistence wraps them in a
//! row-locked transaction.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::foundation::{Money, UserId};

use super::errors::WalletError;

/// Balance state for one user's wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WalletBalance {
    pub user_id: UserId,
    pub available: Money,
    pub locked: Money,
    pub pending_withdrawal: Money,
    pub total_deposited: Money,
    pub total_withdrawn: Money,
    pub updated_at: DateTime<Utc>,
}

impl WalletBalance {
    /// A brand-new empty wallet, created lazily on first use.
    pub fn empty(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            available: Money::ZERO,
            locked: Money::ZERO,
            pending_withdrawal: Money::ZERO,
            total_deposited: Money::ZERO,
            total_withdrawn: Money::ZERO,
            updated_at: now,
        }
    }

    /// Credits a completed deposit:
    /// `available += amount; total_deposited += amount`.
    pub fn apply_deposit(&mut self, amount: Money, now: DateTime<Utc>) -> Result<(), WalletError> {
        let available = self.available.checked_add(amount)?;
        let total_deposited = self.total_deposited.checked_add(amount)?;
        self.available = available;
        self.total_deposited = total_deposited;
        self.updated_at = now;
        Ok(())
    }

    /// Reserves a withdrawal:
    /// `available -= amount; pending_withdrawal += amount`.
    ///
    /// The balance check and the move are one operation here; the store
    /// must call this under wallet row exclusivity so two racing
    /// requests cannot both observe the pre-move `available`.
    pub fn reserve_withdrawal(
        &mut self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if amount > self.available {
            return Err(WalletError::InsufficientFunds {
                available: self.available,
            });
        }
        let available = self.available.checked_sub(amount)?;
        let pending = self.pending_withdrawal.checked_add(amount)?;
        self.available = available;
        self.pending_withdrawal = pending;
        self.updated_at = now;
        Ok(())
    }

    /// Settles a previously reserved withdrawal:
    /// `pending_withdrawal -= amount; total_withdrawn += amount`.
    pub fn settle_withdrawal(
        &mut self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if amount > self.pending_withdrawal {
            return Err(WalletError::InsufficientFunds {
                available: self.pending_withdrawal,
            });
        }
        let pending = self.pending_withdrawal.checked_sub(amount)?;
        let withdrawn = self.total_withdrawn.checked_add(amount)?;
        self.pending_withdrawal = pending;
        self.total_withdrawn = withdrawn;
        self.updated_at = now;
        Ok(())
    }

    /// Returns a previously reserved withdrawal to the available bucket,
    /// for a payout the bank bounced.
    pub fn release_withdrawal(
        &mut self,
        amount: Money,
        now: DateTime<Utc>,
    ) -> Result<(), WalletError> {
        if amount > self.pending_withdrawal {
            return Err(WalletError::InsufficientFunds {
                available: self.pending_withdrawal,
            });
        }
        let pending = self.pending_withdrawal.checked_sub(amount)?;
        let available = self.available.checked_add(amount)?;
        self.pending_withdrawal = pending;
        self.available = available;
        self.updated_at = now;
        Ok(())
    }

    /// Sum of the three live buckets.
    pub fn held_total(&self) -> Result<Money, WalletError> {
        Ok(self
            .available
            .checked_add(self.locked)?
            .checked_add(self.pending_withdrawal)?)
    }
}
