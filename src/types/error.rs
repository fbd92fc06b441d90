//! Error types for the wallet ledger
//!
//! Every failure an operation can surface is a variant of [`LedgerError`].
//! Variants carry structured context (balances, limits, shortfalls) so callers
//! can react programmatically, and [`LedgerError::code`] gives a stable code.
//!
//! # Error Categories
//!
//! - **Validation**: malformed input, non-positive amounts, bad references
//! - **Wallet state**: inactive or blocked wallets
//! - **Spending**: insufficient balance, daily/monthly limits
//! - **Refunds**: window expired, fully refunded, wrong type, over-refund
//! - **Storage**: duplicates, missing records, concurrency conflicts
//! - **I/O**: file, CSV and serialization failures of the boundary layers

use super::spending::{LimitPeriod, Violation};
use rust_decimal::Decimal;
use thiserror::Error;

/// Kind of record a lookup failed to find
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityKind {
    Wallet,
    Transaction,
    Recipient,
}

impl std::fmt::Display for EntityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EntityKind::Wallet => write!(f, "Wallet"),
            EntityKind::Transaction => write!(f, "Transaction"),
            EntityKind::Recipient => write!(f, "Recipient wallet"),
        }
    }
}

/// Why a refund was refused
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RefundIneligibility {
    #[error("only debits can be refunded")]
    NotDebit,

    #[error("{category} debits cannot be refunded, only service payments")]
    NotRefundableKind { category: String },

    #[error("transaction status is {status}, expected completed")]
    NotCompleted { status: String },

    #[error("transaction is already fully refunded")]
    FullyRefunded,

    #[error("refund window of {window_days} days has expired")]
    WindowExpired { window_days: i64 },

    #[error("requested {requested} exceeds refundable amount {refundable}")]
    ExceedsRefundable {
        requested: Decimal,
        refundable: Decimal,
    },
}

/// Main error type for the wallet ledger
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// Malformed request rejected at the boundary
    #[error("Invalid {field}: {message}")]
    Validation { field: String, message: String },

    #[error("Wallet of {owner_id} is inactive")]
    WalletInactive { owner_id: String },

    #[error("Wallet of {owner_id} is blocked{}", reason.as_ref().map(|r| format!(": {}", r)).unwrap_or_default())]
    WalletBlocked {
        owner_id: String,
        reason: Option<String>,
    },

    #[error("{period} limit exceeded for {owner_id}: limit {limit}, spent {spent}, requested {requested}, remaining {remaining}")]
    LimitExceeded {
        owner_id: String,
        period: LimitPeriod,
        limit: Decimal,
        spent: Decimal,
        requested: Decimal,
        remaining: Decimal,
    },

    #[error("Insufficient balance for {owner_id}: balance {balance}, requested {requested}, shortfall {shortfall}")]
    InsufficientBalance {
        owner_id: String,
        balance: Decimal,
        requested: Decimal,
        shortfall: Decimal,
    },

    /// More than one spending rule failed at once
    #[error("Spending rejected for {owner_id}: {}", violations.iter().map(|v| v.code()).collect::<Vec<_>>().join(", "))]
    SpendingRejected {
        owner_id: String,
        violations: Vec<Violation>,
    },

    /// Reference generator kept colliding with existing references
    #[error("Duplicate reference {reference}")]
    DuplicateReference { reference: String },

    #[error("Wallet already exists for {owner_id}")]
    DuplicateWallet { owner_id: String },

    #[error("External payment {external_payment_id} is already recorded")]
    DuplicateExternalPayment { external_payment_id: String },

    #[error("Invalid reference format '{reference}': {reason}")]
    InvalidReferenceFormat { reference: String, reason: String },

    #[error("Transaction {reference} cannot be refunded: {reason}")]
    RefundIneligible {
        reference: String,
        reason: RefundIneligibility,
    },

    #[error("{entity} {id} not found")]
    NotFound { entity: EntityKind, id: String },

    /// A concurrent write won; the operation left no state behind
    #[error("Concurrent update conflict on wallet of {owner_id} after {attempts} attempt(s)")]
    ConcurrencyConflict { owner_id: String, attempts: u32 },

    #[error("Rate limit exceeded for {operation} by {owner_id}, retry after {retry_after_secs}s")]
    RateLimited {
        owner_id: String,
        operation: String,
        retry_after_secs: i64,
    },

    #[error("Arithmetic overflow in {operation} for {owner_id}")]
    ArithmeticOverflow { operation: String, owner_id: String },

    #[error("I/O error: {message}")]
    Io { message: String },

    #[error("CSV parse error{}: {message}", line.map(|l| format!(" at line {}", l)).unwrap_or_default())]
    Parse { line: Option<u64>, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },
}

impl From<std::io::Error> for LedgerError {
    fn from(error: std::io::Error) -> Self {
        LedgerError::Io {
            message: error.to_string(),
        }
    }
}

impl From<csv::Error> for LedgerError {
    fn from(error: csv::Error) -> Self {
        let line = error.position().map(|pos| pos.line());

        LedgerError::Parse {
            line,
            message: error.to_string(),
        }
    }
}

impl From<serde_json::Error> for LedgerError {
    fn from(error: serde_json::Error) -> Self {
        LedgerError::Serialization {
            message: error.to_string(),
        }
    }
}

impl LedgerError {
    /// Stable machine-readable code
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::Validation { .. } => "VALIDATION_ERROR",
            LedgerError::WalletInactive { .. } => "WALLET_INACTIVE",
            LedgerError::WalletBlocked { .. } => "WALLET_BLOCKED",
            LedgerError::LimitExceeded {
                period: LimitPeriod::Daily,
                ..
            } => "DAILY_LIMIT_EXCEEDED",
            LedgerError::LimitExceeded {
                period: LimitPeriod::Monthly,
                ..
            } => "MONTHLY_LIMIT_EXCEEDED",
            LedgerError::InsufficientBalance { .. } => "INSUFFICIENT_BALANCE",
            LedgerError::SpendingRejected { .. } => "SPENDING_REJECTED",
            LedgerError::DuplicateReference { .. } => "DUPLICATE_REFERENCE",
            LedgerError::DuplicateWallet { .. } => "DUPLICATE_WALLET",
            LedgerError::DuplicateExternalPayment { .. } => "DUPLICATE_EXTERNAL_PAYMENT",
            LedgerError::InvalidReferenceFormat { .. } => "INVALID_REFERENCE_FORMAT",
            LedgerError::RefundIneligible { .. } => "REFUND_INELIGIBLE",
            LedgerError::NotFound { .. } => "NOT_FOUND",
            LedgerError::ConcurrencyConflict { .. } => "CONCURRENCY_CONFLICT",
            LedgerError::RateLimited { .. } => "RATE_LIMITED",
            LedgerError::ArithmeticOverflow { .. } => "ARITHMETIC_OVERFLOW",
            LedgerError::Io { .. } => "IO_ERROR",
            LedgerError::Parse { .. } => "PARSE_ERROR",
            LedgerError::Serialization { .. } => "SERIALIZATION_ERROR",
        }
    }

    /// Whether retrying the same request later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            LedgerError::ConcurrencyConflict { .. }
                | LedgerError::RateLimited { .. }
                | LedgerError::DuplicateReference { .. }
        )
    }

    /// Create a Validation error
    pub fn validation(field: &str, message: impl Into<String>) -> Self {
        LedgerError::Validation {
            field: field.to_string(),
            message: message.into(),
        }
    }

    /// Create an InsufficientBalance error
    pub fn insufficient_balance(owner_id: &str, balance: Decimal, requested: Decimal) -> Self {
        LedgerError::InsufficientBalance {
            owner_id: owner_id.to_string(),
            balance,
            requested,
            shortfall: requested - balance,
        }
    }

    /// Create a NotFound error
    pub fn not_found(entity: EntityKind, id: &str) -> Self {
        LedgerError::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create a RefundIneligible error
    pub fn refund_ineligible(reference: &str, reason: RefundIneligibility) -> Self {
        LedgerError::RefundIneligible {
            reference: reference.to_string(),
            reason,
        }
    }

    /// Create an InvalidReferenceFormat error
    pub fn invalid_reference(reference: &str, reason: &str) -> Self {
        LedgerError::InvalidReferenceFormat {
            reference: reference.to_string(),
            reason: reason.to_string(),
        }
    }

    /// Create a ConcurrencyConflict error
    pub fn concurrency_conflict(owner_id: &str, attempts: u32) -> Self {
        LedgerError::ConcurrencyConflict {
            owner_id: owner_id.to_string(),
            attempts,
        }
    }

    /// Create an ArithmeticOverflow error
    pub fn arithmetic_overflow(operation: &str, owner_id: &str) -> Self {
        LedgerError::ArithmeticOverflow {
            operation: operation.to_string(),
            owner_id: owner_id.to_string(),
        }
    }

    /// Convert a single spending violation into its dedicated error
    pub fn from_violation(owner_id: &str, requested: Decimal, violation: Violation) -> Self {
        let owner_id = owner_id.to_string();
        match violation {
            Violation::WalletInactive => LedgerError::WalletInactive { owner_id },
            Violation::WalletBlocked { reason } => LedgerError::WalletBlocked { owner_id, reason },
            Violation::InsufficientBalance {
                balance,
                requested,
                shortfall,
            } => LedgerError::InsufficientBalance {
                owner_id,
                balance,
                requested,
                shortfall,
            },
            Violation::DailyLimitExceeded {
                limit,
                spent,
                remaining,
            } => LedgerError::LimitExceeded {
                owner_id,
                period: LimitPeriod::Daily,
                limit,
                spent,
                requested,
                remaining,
            },
            Violation::MonthlyLimitExceeded {
                limit,
                spent,
                remaining,
            } => LedgerError::LimitExceeded {
                owner_id,
                period: LimitPeriod::Monthly,
                limit,
                spent,
                requested,
                remaining,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::validation(
        LedgerError::validation("amount", "must be positive"),
        "Invalid amount: must be positive"
    )]
    #[case::blocked_with_reason(
        LedgerError::WalletBlocked { owner_id: "u1".to_string(), reason: Some("fraud review".to_string()) },
        "Wallet of u1 is blocked: fraud review"
    )]
    #[case::blocked_without_reason(
        LedgerError::WalletBlocked { owner_id: "u1".to_string(), reason: None },
        "Wallet of u1 is blocked"
    )]
    #[case::insufficient_balance(
        LedgerError::insufficient_balance("u1", Decimal::new(5000, 2), Decimal::new(7500, 2)),
        "Insufficient balance for u1: balance 50.00, requested 75.00, shortfall 25.00"
    )]
    #[case::not_found(
        LedgerError::not_found(EntityKind::Recipient, "u9"),
        "Recipient wallet u9 not found"
    )]
    #[case::parse_with_line(
        LedgerError::Parse { line: Some(3), message: "bad row".to_string() },
        "CSV parse error at line 3: bad row"
    )]
    #[case::refund_window(
        LedgerError::refund_ineligible("SRV123456AAAAAAAA", RefundIneligibility::WindowExpired { window_days: 30 }),
        "Transaction SRV123456AAAAAAAA cannot be refunded: refund window of 30 days has expired"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::daily(
        Violation::DailyLimitExceeded { limit: Decimal::from(500), spent: Decimal::from(300), remaining: Decimal::from(200) },
        "DAILY_LIMIT_EXCEEDED"
    )]
    #[case::monthly(
        Violation::MonthlyLimitExceeded { limit: Decimal::from(500), spent: Decimal::from(300), remaining: Decimal::from(200) },
        "MONTHLY_LIMIT_EXCEEDED"
    )]
    #[case::balance(
        Violation::InsufficientBalance { balance: Decimal::ONE, requested: Decimal::TWO, shortfall: Decimal::ONE },
        "INSUFFICIENT_BALANCE"
    )]
    #[case::inactive(Violation::WalletInactive, "WALLET_INACTIVE")]
    fn test_violation_maps_to_matching_code(#[case] violation: Violation, #[case] code: &str) {
        let error = LedgerError::from_violation("u1", Decimal::from(300), violation);
        assert_eq!(error.code(), code);
    }

    #[test]
    fn test_transient_errors() {
        assert!(LedgerError::concurrency_conflict("u1", 3).is_transient());
        assert!(!LedgerError::validation("amount", "bad").is_transient());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_error =
            std::io::Error::new(std::io::ErrorKind::PermissionDenied, "Permission denied");
        let error: LedgerError = io_error.into();
        assert!(matches!(error, LedgerError::Io { .. }));
        assert_eq!(error.to_string(), "I/O error: Permission denied");
    }
}
