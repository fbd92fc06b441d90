//! Ledger configuration
//!
//! `LedgerConfig` collects the platform defaults and server-side bounds the
//! engine enforces. Values come from `Default`, optionally overridden by
//! `WALLET_*` environment variables and then by command-line flags.
//! [`LedgerConfig::normalized`] replaces invalid values with defaults and
//! logs a warning for each one.

use crate::types::SpendingLimits;
use rust_decimal::Decimal;
use std::str::FromStr;
use std::time::Duration;
use tracing::warn;

/// Request-count cap per (owner, operation) and window
#[derive(Clone, Debug, PartialEq)]
pub struct RateLimitConfig {
    pub enabled: bool,
    /// Maximum operations allowed inside one window
    pub max_requests: u64,
    pub window: Duration,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_requests: 120,
            window: Duration::from_secs(60),
        }
    }
}

/// Engine configuration
#[derive(Clone, Debug, PartialEq)]
pub struct LedgerConfig {
    /// Currency assigned to lazily created wallets
    pub default_currency: String,

    /// Limits assigned to lazily created wallets
    pub default_limits: SpendingLimits,

    /// Highest daily limit an administrator may set
    pub max_daily_limit: Decimal,

    /// Highest monthly limit an administrator may set
    pub max_monthly_limit: Decimal,

    /// Days after creation during which a debit may be refunded
    pub refund_window_days: i64,

    /// Attempts at generating a reference not already in the ledger
    pub max_reference_attempts: u32,

    /// Retries of an operation after a concurrency conflict
    pub max_conflict_retries: u32,

    /// How long an operation waits for a wallet lock before giving up
    pub lock_timeout: Duration,

    pub rate_limit: RateLimitConfig,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            default_currency: "USD".to_string(),
            default_limits: SpendingLimits {
                daily: Decimal::new(10_000_00, 2),
                monthly: Decimal::new(100_000_00, 2),
            },
            max_daily_limit: Decimal::new(100_000_00, 2),
            max_monthly_limit: Decimal::new(1_000_000_00, 2),
            refund_window_days: 30,
            max_reference_attempts: 5,
            max_conflict_retries: 3,
            lock_timeout: Duration::from_secs(2),
            rate_limit: RateLimitConfig::default(),
        }
    }
}

fn env_value<T: FromStr>(name: &str) -> Option<T> {
    parse_env_value(name, std::env::var(name).ok())
}

/// Parse a variable's raw value; a set but unparsable value is logged and dropped
fn parse_env_value<T: FromStr>(name: &str, raw: Option<String>) -> Option<T> {
    let raw = raw?;
    match raw.trim().parse() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!(variable = name, value = %raw, "Unparsable environment value, using default");
            None
        }
    }
}

impl LedgerConfig {
    /// Defaults overridden by any parsable `WALLET_*` environment variables
    ///
    /// A variable that is set but does not parse is ignored with a warning.
    ///
    /// Recognized variables: `WALLET_DEFAULT_CURRENCY`, `WALLET_DAILY_LIMIT`,
    /// `WALLET_MONTHLY_LIMIT`, `WALLET_MAX_DAILY_LIMIT`,
    /// `WALLET_MAX_MONTHLY_LIMIT`, `WALLET_REFUND_WINDOW_DAYS`,
    /// `WALLET_CONFLICT_RETRIES`, `WALLET_LOCK_TIMEOUT_MS`,
    /// `WALLET_RATE_LIMIT_MAX`, `WALLET_RATE_LIMIT_WINDOW_SECS`.
    pub fn from_env() -> Self {
        let default = Self::default();

        Self {
            default_currency: std::env::var("WALLET_DEFAULT_CURRENCY")
                .ok()
                .map(|c| c.trim().to_uppercase())
                .filter(|c| !c.is_empty())
                .unwrap_or(default.default_currency),
            default_limits: SpendingLimits {
                daily: env_value("WALLET_DAILY_LIMIT").unwrap_or(default.default_limits.daily),
                monthly: env_value("WALLET_MONTHLY_LIMIT")
                    .unwrap_or(default.default_limits.monthly),
            },
            max_daily_limit: env_value("WALLET_MAX_DAILY_LIMIT").unwrap_or(default.max_daily_limit),
            max_monthly_limit: env_value("WALLET_MAX_MONTHLY_LIMIT")
                .unwrap_or(default.max_monthly_limit),
            refund_window_days: env_value("WALLET_REFUND_WINDOW_DAYS")
                .unwrap_or(default.refund_window_days),
            max_reference_attempts: default.max_reference_attempts,
            max_conflict_retries: env_value("WALLET_CONFLICT_RETRIES")
                .unwrap_or(default.max_conflict_retries),
            lock_timeout: env_value("WALLET_LOCK_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(default.lock_timeout),
            rate_limit: RateLimitConfig {
                enabled: default.rate_limit.enabled,
                max_requests: env_value("WALLET_RATE_LIMIT_MAX")
                    .unwrap_or(default.rate_limit.max_requests),
                window: env_value("WALLET_RATE_LIMIT_WINDOW_SECS")
                    .map(Duration::from_secs)
                    .unwrap_or(default.rate_limit.window),
            },
        }
        .normalized()
    }

    /// Replace invalid values with defaults
    pub fn normalized(mut self) -> Self {
        let default = Self::default();

        if self.max_daily_limit <= Decimal::ZERO || self.max_monthly_limit < self.max_daily_limit {
            warn!(
                max_daily = %self.max_daily_limit,
                max_monthly = %self.max_monthly_limit,
                "Invalid limit ceilings, using defaults"
            );
            self.max_daily_limit = default.max_daily_limit;
            self.max_monthly_limit = default.max_monthly_limit;
        }

        let limits = self.default_limits;
        if limits.daily <= Decimal::ZERO
            || limits.monthly < limits.daily
            || limits.daily > self.max_daily_limit
            || limits.monthly > self.max_monthly_limit
        {
            warn!(
                daily = %limits.daily,
                monthly = %limits.monthly,
                "Invalid default limits, using defaults"
            );
            self.default_limits = default.default_limits;
        }

        if self.refund_window_days <= 0 {
            warn!(
                days = self.refund_window_days,
                "Invalid refund window, using default ({})", default.refund_window_days
            );
            self.refund_window_days = default.refund_window_days;
        }

        if self.max_reference_attempts == 0 {
            warn!("Invalid max_reference_attempts (0), using default");
            self.max_reference_attempts = default.max_reference_attempts;
        }

        if self.lock_timeout.is_zero() {
            warn!("Invalid lock timeout (0), using default");
            self.lock_timeout = default.lock_timeout;
        }

        if self.rate_limit.max_requests == 0 || self.rate_limit.window.is_zero() {
            warn!("Invalid rate limit settings, using defaults");
            self.rate_limit.max_requests = default.rate_limit.max_requests;
            self.rate_limit.window = default.rate_limit.window;
        }

        self
    }
}
