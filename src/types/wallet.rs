//! Wallet-related types for the wallet ledger
//!
//! This module defines the Wallet structure holding a single owner's
//! stored-value balance together with its spending limits and status flags.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Owner identifier (the user a wallet belongs to)
pub type OwnerId = String;

/// Wallet identifier
///
/// Also used to order wallet locks when an operation touches two wallets.
pub type WalletId = Uuid;

/// Daily and monthly spending caps
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SpendingLimits {
    /// Maximum cumulative debits per calendar day
    pub daily: Decimal,
    /// Maximum cumulative debits per calendar month
    pub monthly: Decimal,
}

/// Per-owner stored-value account
///
/// Exactly one wallet exists per owner. Wallets are never deleted; they are
/// soft-blocked or deactivated instead.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: WalletId,

    /// The owner this wallet belongs to (unique across the store)
    pub owner_id: OwnerId,

    /// Current balance, never negative, two decimal places
    pub balance: Decimal,

    /// ISO currency code
    pub currency: String,

    pub is_active: bool,
    pub is_blocked: bool,
    pub blocked_reason: Option<String>,
    pub blocked_at: Option<DateTime<Utc>>,
    pub blocked_by: Option<String>,

    pub daily_limit: Decimal,
    pub monthly_limit: Decimal,

    /// Debits since the last daily reset
    pub daily_spent: Decimal,

    /// Debits since the last monthly reset
    pub monthly_spent: Decimal,

    /// Instant of the last limit rollover check that changed a counter
    pub last_reset_date: DateTime<Utc>,

    /// Incremented on every committed change; used for compare-and-set
    pub version: u64,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Wallet {
    /// Create an empty, active wallet with the given limits
    pub fn new(
        owner_id: impl Into<OwnerId>,
        currency: impl Into<String>,
        limits: SpendingLimits,
        now: DateTime<Utc>,
    ) -> Self {
        Wallet {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            balance: Decimal::ZERO,
            currency: currency.into(),
            is_active: true,
            is_blocked: false,
            blocked_reason: None,
            blocked_at: None,
            blocked_by: None,
            daily_limit: limits.daily,
            monthly_limit: limits.monthly,
            daily_spent: Decimal::ZERO,
            monthly_spent: Decimal::ZERO,
            last_reset_date: now,
            version: 0,
            created_at: now,
            updated_at: now,
        }
    }

    /// Current spending limits
    pub fn limits(&self) -> SpendingLimits {
        SpendingLimits {
            daily: self.daily_limit,
            monthly: self.monthly_limit,
        }
    }

    /// Remaining daily headroom, floored at zero
    pub fn daily_remaining(&self) -> Decimal {
        (self.daily_limit - self.daily_spent).max(Decimal::ZERO)
    }

    /// Remaining monthly headroom, floored at zero
    pub fn monthly_remaining(&self) -> Decimal {
        (self.monthly_limit - self.monthly_spent).max(Decimal::ZERO)
    }

    /// Whether the wallet may send or receive transfers
    pub fn is_usable(&self) -> bool {
        self.is_active && !self.is_blocked
    }
}
