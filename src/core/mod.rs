//! Core business logic module
//!
//! This module contains the ledger components, leaves first:
//! - `clock` - Time source, swappable for tests
//! - `reference` - Prefix-coded reference generation and parsing
//! - `wallet_store` - Per-owner wallets behind per-wallet locks
//! - `limit_reset` - Daily/monthly spent counter rollover
//! - `spending_validator` - Pure spending precondition checks
//! - `ledger` - Append-mostly transaction ledger and refund eligibility
//! - `rate_limit` - Per-owner operation rate limiting
//! - `query` - Listing, search and statistics over ledger entries
//! - `engine` - Credit, debit, transfer and refund orchestration
//! - `traits` - Interfaces offered to payment gateways and services

pub mod clock;
pub mod engine;
pub mod ledger;
pub mod limit_reset;
pub mod query;
pub mod rate_limit;
pub mod reference;
pub mod spending_validator;
pub mod traits;
pub mod wallet_store;

pub use clock::{Clock, ManualClock, SystemClock};
pub use engine::{LedgerEngine, LedgerReceipt, Reconciliation};
pub use ledger::TransactionLedger;
pub use query::{Page, PageRequest, PeriodStatistics, ReportResult, StatsPeriod, TransactionFilter};
pub use rate_limit::{CounterStore, InMemoryCounterStore, RateLimiter};
pub use reference::{generate_reference, parse_reference, ReferenceGenerator, ReferenceKind};
pub use traits::{PaymentEvent, PaymentEventSink, ServiceBilling};
pub use wallet_store::WalletStore;
