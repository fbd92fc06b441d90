//! Transaction-related types for the wallet ledger
//!
//! A `Transaction` is one committed ledger event. The fields shared by every
//! event live on the struct; what differs per kind of event (top-up, service
//! payment, transfer leg, refund) lives in the [`EntryDetails`] sum type.

use super::wallet::{OwnerId, WalletId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Transaction identifier
pub type TransactionId = Uuid;

/// Human-readable, prefix-coded ledger identifier (see `core::reference`)
pub type Reference = String;

/// Direction of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryType {
    /// Increases the wallet balance
    Credit,
    /// Decreases the wallet balance
    Debit,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EntryType::Credit => write!(f, "credit"),
            EntryType::Debit => write!(f, "debit"),
        }
    }
}

impl FromStr for EntryType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "credit" => Ok(EntryType::Credit),
            "debit" => Ok(EntryType::Debit),
            other => Err(format!("unknown entry type '{}'", other)),
        }
    }
}

/// Lifecycle status of a ledger entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    Pending,
    Completed,
    Failed,
    Cancelled,
    /// A completed debit whose full amount has been refunded
    Refunded,
}

impl TransactionStatus {
    /// Whether the entry moved money and counts in a ledger replay
    pub fn is_settled(&self) -> bool {
        matches!(self, TransactionStatus::Completed | TransactionStatus::Refunded)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Cancelled => "cancelled",
            TransactionStatus::Refunded => "refunded",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for TransactionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "pending" => Ok(TransactionStatus::Pending),
            "completed" => Ok(TransactionStatus::Completed),
            "failed" => Ok(TransactionStatus::Failed),
            "cancelled" => Ok(TransactionStatus::Cancelled),
            "refunded" => Ok(TransactionStatus::Refunded),
            other => Err(format!("unknown transaction status '{}'", other)),
        }
    }
}

/// Reporting category, derived from [`EntryDetails`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Category {
    TopUp,
    ServicePayment,
    Transfer,
    Refund,
    Adjustment,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Category::TopUp => "top_up",
            Category::ServicePayment => "service_payment",
            Category::Transfer => "transfer",
            Category::Refund => "refund",
            Category::Adjustment => "adjustment",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "top_up" | "topup" => Ok(Category::TopUp),
            "service_payment" | "service" => Ok(Category::ServicePayment),
            "transfer" => Ok(Category::Transfer),
            "refund" => Ok(Category::Refund),
            "adjustment" => Ok(Category::Adjustment),
            other => Err(format!("unknown category '{}'", other)),
        }
    }
}

/// How money entered the wallet on a top-up
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Card,
    Upi,
    NetBanking,
    BankTransfer,
    Wallet,
    /// Manual credit by an operator
    Admin,
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PaymentMethod::Card => "card",
            PaymentMethod::Upi => "upi",
            PaymentMethod::NetBanking => "net_banking",
            PaymentMethod::BankTransfer => "bank_transfer",
            PaymentMethod::Wallet => "wallet",
            PaymentMethod::Admin => "admin",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for PaymentMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "card" => Ok(PaymentMethod::Card),
            "upi" => Ok(PaymentMethod::Upi),
            "net_banking" | "netbanking" => Ok(PaymentMethod::NetBanking),
            "bank_transfer" => Ok(PaymentMethod::BankTransfer),
            "wallet" => Ok(PaymentMethod::Wallet),
            "admin" => Ok(PaymentMethod::Admin),
            other => Err(format!("unknown payment method '{}'", other)),
        }
    }
}

/// Link from a debit to the service it paid for
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceLink {
    pub service_id: String,
    pub service_type: Option<String>,
    pub provider_id: Option<String>,
}

/// Kind-specific data of a ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EntryDetails {
    /// Money added from outside the platform
    TopUp {
        payment_method: PaymentMethod,
        gateway: Option<String>,
        /// Gateway-side payment id; unique across the ledger when present
        external_payment_id: Option<String>,
    },

    /// Spending on a platform service (bookings, calls, ...)
    ServicePayment { service: Option<ServiceLink> },

    /// Sender leg of a wallet-to-wallet transfer
    TransferOut {
        recipient_owner_id: OwnerId,
        counterpart_reference: Reference,
    },

    /// Recipient leg of a wallet-to-wallet transfer
    TransferIn {
        sender_owner_id: OwnerId,
        counterpart_reference: Reference,
    },

    /// Compensating credit for a refunded debit
    Refund {
        original_reference: Reference,
        refund_id: Uuid,
    },

    /// Operator correction of a balance, in either direction
    Adjustment {
        direction: EntryType,
        actor: String,
        reason: String,
    },
}

impl EntryDetails {
    /// Direction implied by this kind of entry
    pub fn entry_type(&self) -> EntryType {
        match self {
            EntryDetails::TopUp { .. }
            | EntryDetails::TransferIn { .. }
            | EntryDetails::Refund { .. } => EntryType::Credit,
            EntryDetails::ServicePayment { .. } | EntryDetails::TransferOut { .. } => {
                EntryType::Debit
            }
            EntryDetails::Adjustment { direction, .. } => *direction,
        }
    }

    pub fn category(&self) -> Category {
        match self {
            EntryDetails::TopUp { .. } => Category::TopUp,
            EntryDetails::ServicePayment { .. } => Category::ServicePayment,
            EntryDetails::TransferOut { .. } | EntryDetails::TransferIn { .. } => {
                Category::Transfer
            }
            EntryDetails::Refund { .. } => Category::Refund,
            EntryDetails::Adjustment { .. } => Category::Adjustment,
        }
    }

    pub fn external_payment_id(&self) -> Option<&str> {
        match self {
            EntryDetails::TopUp {
                external_payment_id,
                ..
            } => external_payment_id.as_deref(),
            _ => None,
        }
    }

    pub fn service(&self) -> Option<&ServiceLink> {
        match self {
            EntryDetails::ServicePayment { service } => service.as_ref(),
            _ => None,
        }
    }
}

/// Refund applied to a debit
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundRecord {
    pub refund_id: Uuid,
    pub amount: Decimal,
    pub reason: String,
    pub processed_at: DateTime<Utc>,
    /// Reference of the compensating credit written for this refund
    pub compensating_reference: Reference,
}

/// Caller context captured for audit
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestContext {
    pub ip: Option<String>,
    pub user_agent: Option<String>,
}

/// A committed ledger entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: TransactionId,
    pub owner_id: OwnerId,
    pub wallet_id: WalletId,

    #[serde(rename = "type")]
    pub entry_type: EntryType,

    /// Always positive, two decimal places
    pub amount: Decimal,
    pub description: String,
    pub status: TransactionStatus,

    /// Unique across the ledger
    pub reference: Reference,

    pub details: EntryDetails,

    /// Balance immediately before this entry was applied
    pub balance_before: Decimal,
    /// Balance immediately after this entry was applied
    pub balance_after: Decimal,

    /// Sum of refunds applied so far (debits only), never above `amount`
    pub refunded_amount: Decimal,
    pub refunds: Vec<RefundRecord>,

    pub metadata: serde_json::Value,

    #[serde(flatten)]
    pub context: RequestContext,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Inputs for building a completed ledger entry
#[derive(Debug, Clone)]
pub struct NewEntry {
    pub owner_id: OwnerId,
    pub wallet_id: WalletId,
    pub amount: Decimal,
    pub description: String,
    pub reference: Reference,
    pub details: EntryDetails,
    pub balance_before: Decimal,
    pub metadata: serde_json::Value,
    pub context: RequestContext,
}

impl Transaction {
    /// Build a completed entry, deriving type and post-balance from the details
    pub fn completed(entry: NewEntry, now: DateTime<Utc>) -> Self {
        let entry_type = entry.details.entry_type();
        let balance_after = match entry_type {
            EntryType::Credit => entry.balance_before + entry.amount,
            EntryType::Debit => entry.balance_before - entry.amount,
        };

        Transaction {
            id: Uuid::new_v4(),
            owner_id: entry.owner_id,
            wallet_id: entry.wallet_id,
            entry_type,
            amount: entry.amount,
            description: entry.description,
            status: TransactionStatus::Completed,
            reference: entry.reference,
            details: entry.details,
            balance_before: entry.balance_before,
            balance_after,
            refunded_amount: Decimal::ZERO,
            refunds: Vec::new(),
            metadata: entry.metadata,
            context: entry.context,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn category(&self) -> Category {
        self.details.category()
    }

    /// Amount still available for refunds
    pub fn refundable_amount(&self) -> Decimal {
        (self.amount - self.refunded_amount).max(Decimal::ZERO)
    }

    /// Signed effect on the wallet balance
    pub fn signed_amount(&self) -> Decimal {
        match self.entry_type {
            EntryType::Credit => self.amount,
            EntryType::Debit => -self.amount,
        }
    }

    /// Whether `balance_after` follows from `balance_before` and the amount
    pub fn is_balanced(&self) -> bool {
        self.balance_after == self.balance_before + self.signed_amount()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(details: EntryDetails) -> NewEntry {
        NewEntry {
            owner_id: "user-1".to_string(),
            wallet_id: Uuid::new_v4(),
            amount: Decimal::new(2550, 2),
            description: "test".to_string(),
            reference: "TXN123456ABCDEF01".to_string(),
            details,
            balance_before: Decimal::new(10000, 2),
            metadata: serde_json::Value::Null,
            context: RequestContext::default(),
        }
    }

    #[test]
    fn test_completed_credit_adds_amount() {
        let tx = Transaction::completed(
            entry(EntryDetails::TopUp {
                payment_method: PaymentMethod::Card,
                gateway: None,
                external_payment_id: None,
            }),
            Utc::now(),
        );

        assert_eq!(tx.entry_type, EntryType::Credit);
        assert_eq!(tx.balance_after, Decimal::new(12550, 2));
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert!(tx.is_balanced());
    }

    #[test]
    fn test_completed_debit_subtracts_amount() {
        let tx = Transaction::completed(
            entry(EntryDetails::ServicePayment { service: None }),
            Utc::now(),
        );

        assert_eq!(tx.entry_type, EntryType::Debit);
        assert_eq!(tx.balance_after, Decimal::new(7450, 2));
        assert_eq!(tx.refundable_amount(), Decimal::new(2550, 2));
        assert!(tx.is_balanced());
    }

    #[rstest]
    #[case::top_up(EntryDetails::TopUp { payment_method: PaymentMethod::Upi, gateway: None, external_payment_id: None }, Category::TopUp, EntryType::Credit)]
    #[case::service(EntryDetails::ServicePayment { service: None }, Category::ServicePayment, EntryType::Debit)]
    #[case::transfer_out(EntryDetails::TransferOut { recipient_owner_id: "b".into(), counterpart_reference: "TXN1".into() }, Category::Transfer, EntryType::Debit)]
    #[case::transfer_in(EntryDetails::TransferIn { sender_owner_id: "a".into(), counterpart_reference: "SRV1".into() }, Category::Transfer, EntryType::Credit)]
    #[case::refund(EntryDetails::Refund { original_reference: "SRV1".into(), refund_id: Uuid::nil() }, Category::Refund, EntryType::Credit)]
    #[case::adjustment_down(EntryDetails::Adjustment { direction: EntryType::Debit, actor: "ops".into(), reason: "duplicate top-up".into() }, Category::Adjustment, EntryType::Debit)]
    fn test_details_classification(
        #[case] details: EntryDetails,
        #[case] category: Category,
        #[case] entry_type: EntryType,
    ) {
        assert_eq!(details.category(), category);
        assert_eq!(details.entry_type(), entry_type);
    }

    #[rstest]
    #[case("card", PaymentMethod::Card)]
    #[case("UPI", PaymentMethod::Upi)]
    #[case("netbanking", PaymentMethod::NetBanking)]
    #[case(" admin ", PaymentMethod::Admin)]
    fn test_payment_method_parsing(#[case] input: &str, #[case] expected: PaymentMethod) {
        assert_eq!(input.parse::<PaymentMethod>().unwrap(), expected);
    }

    #[test]
    fn test_transaction_serializes_type_field() {
        let tx = Transaction::completed(
            entry(EntryDetails::ServicePayment { service: None }),
            Utc::now(),
        );
        let json = serde_json::to_value(&tx).unwrap();

        assert_eq!(json["type"], "debit");
        assert_eq!(json["details"]["kind"], "service_payment");
        assert_eq!(json["status"], "completed");
    }
}
