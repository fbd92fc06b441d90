//! Daily and monthly spent-counter rollover
//!
//! Counters are reset lazily: every operation that validates spending first
//! calls [`reset_if_needed`] with the current instant. Boundaries are UTC
//! calendar days and months, so a gap of several days or months is caught up
//! by a single reset.

use crate::types::Wallet;
use chrono::{DateTime, Datelike, Utc};
use rust_decimal::Decimal;

/// Which counters a reset touched
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ResetOutcome {
    pub daily_reset: bool,
    pub monthly_reset: bool,
}

impl ResetOutcome {
    pub fn changed(&self) -> bool {
        self.daily_reset || self.monthly_reset
    }
}

/// Zero the counters whose period ended since the last reset
///
/// `last_reset_date` moves to `now` only when a counter was reset. The caller
/// persists the wallet when [`ResetOutcome::changed`] is true, even if the
/// operation that triggered the check is then rejected.
pub fn reset_if_needed(wallet: &mut Wallet, now: DateTime<Utc>) -> ResetOutcome {
    let last = wallet.last_reset_date;
    let mut outcome = ResetOutcome::default();

    if now.date_naive() != last.date_naive() && now > last {
        wallet.daily_spent = Decimal::ZERO;
        outcome.daily_reset = true;
    }

    if (now.year(), now.month()) != (last.year(), last.month()) && now > last {
        wallet.monthly_spent = Decimal::ZERO;
        outcome.monthly_reset = true;
    }

    if outcome.changed() {
        wallet.last_reset_date = now;
    }
    outcome
}
