//! Types module
//!
//! Contains core data structures used throughout the ledger.
//! This module organizes types into logical submodules:
//! - `wallet`: Wallet records and spending limits
//! - `transaction`: Ledger entries, their details and identifiers
//! - `spending`: Outcome of spending precondition checks
//! - `request`: Tagged operation requests and receipts
//! - `error`: Error types for the ledger

pub mod error;
pub mod request;
pub mod spending;
pub mod transaction;
pub mod wallet;

pub use error::{EntityKind, LedgerError, RefundIneligibility};
pub use request::{
    CreditRequest, DebitRequest, LedgerRequest, Operation, OperationReceipt, RefundRequest,
    TransferReceipt, TransferRequest,
};
pub use spending::{LimitPeriod, SpendingCheck, Violation};
pub use transaction::{
    Category, EntryDetails, EntryType, NewEntry, PaymentMethod, Reference, RefundRecord,
    RequestContext, ServiceLink, Transaction, TransactionId, TransactionStatus,
};
pub use wallet::{OwnerId, SpendingLimits, Wallet, WalletId};
