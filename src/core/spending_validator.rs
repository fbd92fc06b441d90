//! Spending precondition checks
//!
//! [`validate`] is a pure function over a wallet snapshot: it never mutates
//! and never fails fast. Every violated rule is collected so callers can show
//! the full picture, and [`SpendingCheck::into_result`] turns the outcome into
//! the error an operation reports.

use crate::types::{LedgerError, SpendingCheck, Violation, Wallet};
use rust_decimal::Decimal;

/// Check whether `amount` may be debited from `wallet`
///
/// The wallet must already have had its counters rolled over for the
/// current instant (see `limit_reset::reset_if_needed`).
pub fn validate(wallet: &Wallet, amount: Decimal) -> SpendingCheck {
    let mut violations = Vec::new();

    if !wallet.is_active {
        violations.push(Violation::WalletInactive);
    }

    if wallet.is_blocked {
        violations.push(Violation::WalletBlocked {
            reason: wallet.blocked_reason.clone(),
        });
    }

    if wallet.balance < amount {
        violations.push(Violation::InsufficientBalance {
            balance: wallet.balance,
            requested: amount,
            shortfall: amount - wallet.balance,
        });
    }

    let daily_remaining = wallet.daily_remaining();
    if amount > daily_remaining {
        violations.push(Violation::DailyLimitExceeded {
            limit: wallet.daily_limit,
            spent: wallet.daily_spent,
            remaining: daily_remaining,
        });
    }

    let monthly_remaining = wallet.monthly_remaining();
    if amount > monthly_remaining {
        violations.push(Violation::MonthlyLimitExceeded {
            limit: wallet.monthly_limit,
            spent: wallet.monthly_spent,
            remaining: monthly_remaining,
        });
    }

    SpendingCheck {
        is_valid: violations.is_empty(),
        violations,
        max_spendable_amount: max_spendable(wallet),
    }
}

/// `min(balance, daily headroom, monthly headroom)`, never negative
///
/// Wallet status is not part of the figure; an inactive or blocked wallet
/// reports its state through the violations instead.
pub fn max_spendable(wallet: &Wallet) -> Decimal {
    wallet
        .balance
        .min(wallet.daily_remaining())
        .min(wallet.monthly_remaining())
        .max(Decimal::ZERO)
}

impl SpendingCheck {
    /// `Ok` when valid; otherwise the dedicated error for a single violation
    /// or `SpendingRejected` carrying all of them
    pub fn into_result(self, owner_id: &str, requested: Decimal) -> Result<(), LedgerError> {
        let mut violations = self.violations;
        match violations.len() {
            0 => Ok(()),
            1 => match violations.pop() {
                Some(violation) => Err(LedgerError::from_violation(owner_id, requested, violation)),
                None => Ok(()),
            },
            _ => Err(LedgerError::SpendingRejected {
                owner_id: owner_id.to_string(),
                violations,
            }),
        }
    }
}
