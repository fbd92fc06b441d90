//! Spending check outcome types
//!
//! Produced by `core::spending_validator::validate` and carried inside
//! `LedgerError::SpendingRejected` when more than one rule is violated.

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which spending period a limit applies to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LimitPeriod {
    Daily,
    Monthly,
}

impl fmt::Display for LimitPeriod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LimitPeriod::Daily => write!(f, "daily"),
            LimitPeriod::Monthly => write!(f, "monthly"),
        }
    }
}

/// A single failed spending precondition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "code", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Violation {
    WalletInactive,

    WalletBlocked {
        reason: Option<String>,
    },

    InsufficientBalance {
        balance: Decimal,
        requested: Decimal,
        shortfall: Decimal,
    },

    DailyLimitExceeded {
        limit: Decimal,
        spent: Decimal,
        remaining: Decimal,
    },

    MonthlyLimitExceeded {
        limit: Decimal,
        spent: Decimal,
        remaining: Decimal,
    },
}

impl Violation {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            Violation::WalletInactive => "WALLET_INACTIVE",
            Violation::WalletBlocked { .. } => "WALLET_BLOCKED",
            Violation::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            Violation::DailyLimitExceeded { .. } => "DAILY_LIMIT_EXCEEDED",
            Violation::MonthlyLimitExceeded { .. } => "MONTHLY_LIMIT_EXCEEDED",
        }
    }
}

impl fmt::Display for Violation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Violation::WalletInactive => write!(f, "wallet is inactive"),
            Violation::WalletBlocked { reason } => match reason {
                Some(reason) => write!(f, "wallet is blocked: {}", reason),
                None => write!(f, "wallet is blocked"),
            },
            Violation::InsufficientBalance {
                balance,
                requested,
                shortfall,
            } => write!(
                f,
                "insufficient balance: balance {}, requested {}, short by {}",
                balance, requested, shortfall
            ),
            Violation::DailyLimitExceeded {
                limit, remaining, ..
            } => write!(f, "daily limit {} exceeded, {} remaining", limit, remaining),
            Violation::MonthlyLimitExceeded {
                limit, remaining, ..
            } => write!(f, "monthly limit {} exceeded, {} remaining", limit, remaining),
        }
    }
}

/// Result of checking a prospective debit against a wallet snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingCheck {
    pub is_valid: bool,
    pub violations: Vec<Violation>,
    /// Largest amount balance and both limits allow, ignoring wallet status
    pub max_spendable_amount: Decimal,
}
