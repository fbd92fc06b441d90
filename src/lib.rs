//! Wallet Ledger Library
//! # Overview
//!
//! This library provides a per-owner stored-value wallet with an
//! append-only transaction ledger, daily and monthly spending limits, refunds
//! of earlier debits, and a command-line replay of operation files.
//!
//! # Architecture
//!
//! The system is organized into several key components:
//!
//! - [`types`] - Core data types (Wallet, Transaction, requests, errors)
//! - [`config`] - Platform defaults and server-side bounds
//! - [`core`] - Business logic components:
//!   - [`core::engine`] - Operation orchestration under per-wallet locks
//!   - [`core::wallet_store`] - Wallet state and versioned commits
//!   - [`core::ledger`] - Transaction history, indexes and refund bookkeeping
//!   - [`core::spending_validator`] - Spending precondition checks
//! - [`io`] - Operation-file parsing, wallet reports and ledger export
//! - [`replay`] - Command-line replay pipeline
//! - [`cli`] - CLI arguments parsing
//!
//! # Operations
//!
//! - **Credit**: Top up a wallet; idempotent per external payment id
//! - **Debit**: Pay for a service, subject to balance and spending limits
//! - **Transfer**: Move money between two wallets as a pair of entries
//! - **Refund**: Return part or all of a debit within the refund window
//!
//! # Wallet State
//!
//! Each wallet maintains:
//! - `balance`: Never negative, equal to the replay of its ledger entries
//! - `daily_spent` / `monthly_spent`: Debits since the last calendar rollover
//! - `is_active` / `is_blocked`: Administrative switches that stop spending

// Module declarations
pub mod cli;
pub mod config;
pub mod core;
pub mod io;
pub mod logging;
pub mod replay;
pub mod types;

pub use config::{LedgerConfig, RateLimitConfig};
pub use core::{LedgerEngine, LedgerReceipt, Reconciliation, TransactionLedger, WalletStore};
pub use io::{write_transactions, write_wallets, ExportFormat};
pub use types::{
    LedgerError, LedgerRequest, OperationReceipt, OwnerId, Reference, SpendingLimits, Transaction,
    TransactionId, TransferReceipt, Wallet,
};
