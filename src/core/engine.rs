//! Ledger engine
//!
//! `LedgerEngine` orchestrates every balance-changing operation by
//! coordinating the wallet store, the limit reset, the spending validator and
//! the transaction ledger.
//!
//! # Operation flow
//!
//! 1. The request is validated once at the boundary.
//! 2. The per-owner rate limit is charged.
//! 3. The affected wallet(s) are locked, spent counters are rolled over and
//!    spending preconditions are checked on a staged copy.
//! 4. Ledger rows are appended as one unit; only then are the staged wallets
//!    published, after a version check.
//!
//! Any failure before step 4 completes leaves no trace, except a counter
//! rollover which is persisted even when the operation is then rejected.
//!
//! # Concurrency
//!
//! A lock timeout or a version mismatch is a `ConcurrencyConflict`. The whole
//! operation is retried up to `max_conflict_retries` times before the conflict
//! is surfaced with the number of attempts made.

use crate::config::LedgerConfig;
use crate::core::clock::{Clock, SystemClock};
use crate::core::ledger::{refundable_amount, TransactionLedger};
use crate::core::limit_reset::{reset_if_needed, ResetOutcome};
use crate::core::query::{
    self, Page, PageRequest, PeriodStatistics, ReportResult, StatsPeriod, TransactionFilter,
};
use crate::core::rate_limit::RateLimiter;
use crate::core::reference::{ReferenceGenerator, ReferenceKind};
use crate::core::spending_validator;
use crate::core::wallet_store::{WalletGuard, WalletStore};
use crate::types::request::validate_amount;
use crate::types::{
    CreditRequest, DebitRequest, EntityKind, EntryDetails, EntryType, LedgerError, LedgerRequest,
    NewEntry, Operation, OperationReceipt, OwnerId, RefundIneligibility, RefundRecord,
    RefundRequest, RequestContext, SpendingCheck, SpendingLimits, Transaction, TransferReceipt,
    TransferRequest, Wallet,
};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Outcome of [`LedgerEngine::execute`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LedgerReceipt {
    Single(OperationReceipt),
    Transfer(TransferReceipt),
}

impl LedgerReceipt {
    /// The receipt of the row written on the caller's own wallet
    ///
    /// For a transfer this is the sender's debit leg.
    pub fn primary(&self) -> &OperationReceipt {
        match self {
            LedgerReceipt::Single(receipt) => receipt,
            LedgerReceipt::Transfer(receipt) => &receipt.sender,
        }
    }
}

/// Stored balance compared against the ledger replay
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reconciliation {
    pub owner_id: OwnerId,
    pub stored: Decimal,
    pub replayed: Decimal,
    pub consistent: bool,
}

fn receipt(tx: &Transaction, replayed: bool) -> OperationReceipt {
    OperationReceipt {
        transaction_id: tx.id,
        reference: tx.reference.clone(),
        new_balance: tx.balance_after,
        replayed,
    }
}

/// Wallet ledger and spending-limit engine
///
/// All methods take `&self`; share the engine across tasks with an `Arc`.
#[derive(Debug)]
pub struct LedgerEngine {
    config: LedgerConfig,
    wallet_store: WalletStore,
    ledger: TransactionLedger,
    references: ReferenceGenerator,
    rate_limiter: RateLimiter,
    clock: Arc<dyn Clock>,
}

impl LedgerEngine {
    /// Create an engine reading wall-clock time
    pub fn new(config: LedgerConfig) -> Self {
        Self::with_clock(config, Arc::new(SystemClock))
    }

    /// Create an engine reading time from `clock`
    ///
    /// The configuration is normalized first.
    pub fn with_clock(config: LedgerConfig, clock: Arc<dyn Clock>) -> Self {
        let config = config.normalized();
        LedgerEngine {
            wallet_store: WalletStore::from_config(&config),
            ledger: TransactionLedger::new(),
            references: ReferenceGenerator::new(config.max_reference_attempts),
            rate_limiter: RateLimiter::new(config.rate_limit.clone()),
            clock,
            config,
        }
    }

    /// Replace the rate limiter, e.g. with one over a shared counter store
    pub fn with_rate_limiter(mut self, rate_limiter: RateLimiter) -> Self {
        self.rate_limiter = rate_limiter;
        self
    }

    pub fn config(&self) -> &LedgerConfig {
        &self.config
    }

    pub fn ledger(&self) -> &TransactionLedger {
        &self.ledger
    }

    /// Run any ledger operation
    ///
    /// # Errors
    ///
    /// Whatever the dispatched operation returns.
    pub async fn execute(&self, request: LedgerRequest) -> Result<LedgerReceipt, LedgerError> {
        match request {
            LedgerRequest::Credit(req) => self.credit(req).await.map(LedgerReceipt::Single),
            LedgerRequest::Debit(req) => self.debit(req).await.map(LedgerReceipt::Single),
            LedgerRequest::Transfer(req) => self.transfer(req).await.map(LedgerReceipt::Transfer),
            LedgerRequest::Refund(req) => self.refund(req).await.map(LedgerReceipt::Single),
        }
    }

    /// Add money to the owner's wallet, creating the wallet on first use
    ///
    /// No spending checks apply. A credit carrying an external payment id
    /// that is already recorded returns the earlier receipt with
    /// `replayed = true` and writes nothing.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed request
    /// - `RateLimited` when the owner's credit budget is spent
    /// - `ConcurrencyConflict` when retries are exhausted
    pub async fn credit(&self, request: CreditRequest) -> Result<OperationReceipt, LedgerError> {
        request.validate()?;
        if let Some(prior) = self.replayed_credit(&request) {
            return Ok(prior);
        }
        self.rate_limiter
            .check(&request.owner_id, Operation::Credit, self.clock.now())?;

        self.with_retries(&request.owner_id, Operation::Credit, || {
            self.try_credit(&request)
        })
        .await
    }

    fn replayed_credit(&self, request: &CreditRequest) -> Option<OperationReceipt> {
        let external_id = request.external_payment_id.as_deref()?;
        let prior = self.ledger.find_by_external_payment_id(external_id)?;
        info!(
            owner_id = %request.owner_id,
            external_payment_id = external_id,
            reference = %prior.reference,
            "Credit already recorded, returning prior result"
        );
        Some(receipt(&prior, true))
    }

    async fn try_credit(&self, request: &CreditRequest) -> Result<OperationReceipt, LedgerError> {
        let now = self.clock.now();
        let handle = self.wallet_store.get_or_create(&request.owner_id, now)?;
        let mut guard = self.wallet_store.lock(&handle).await?;

        // A concurrent replay of the same payment may have won the lock
        if let Some(prior) = self.replayed_credit(request) {
            return Ok(prior);
        }

        let mut staged = guard.clone();
        let kind = if request.external_payment_id.is_some() {
            ReferenceKind::Payment
        } else {
            ReferenceKind::Credit
        };
        let tx = Transaction::completed(
            NewEntry {
                owner_id: staged.owner_id.clone(),
                wallet_id: staged.id,
                amount: request.amount,
                description: request.description.clone(),
                reference: self.next_reference(kind, None)?,
                details: EntryDetails::TopUp {
                    payment_method: request.payment_method,
                    gateway: request.gateway.clone(),
                    external_payment_id: request.external_payment_id.clone(),
                },
                balance_before: staged.balance,
                metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
                context: request.context.clone(),
            },
            now,
        );
        staged.balance = staged
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("credit", &request.owner_id))?;

        WalletStore::ensure_current(&guard, &staged)?;
        let result = receipt(&tx, false);
        if let Err(err) = self.ledger.append(tx) {
            return match (&err, self.replayed_credit(request)) {
                (LedgerError::DuplicateExternalPayment { .. }, Some(prior)) => Ok(prior),
                _ => Err(err),
            };
        }
        WalletStore::commit(&mut guard, staged, now);

        info!(
            owner_id = %request.owner_id,
            reference = %result.reference,
            amount = %request.amount,
            balance = %result.new_balance,
            "Credit committed"
        );
        Ok(result)
    }

    /// Spend money from the owner's wallet
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed request
    /// - The dedicated error of a single failed spending rule, or
    ///   `SpendingRejected` listing all of them
    /// - `RateLimited`, `ConcurrencyConflict`
    pub async fn debit(&self, request: DebitRequest) -> Result<OperationReceipt, LedgerError> {
        request.validate()?;
        self.rate_limiter
            .check(&request.owner_id, Operation::Debit, self.clock.now())?;

        self.with_retries(&request.owner_id, Operation::Debit, || {
            self.try_debit(&request)
        })
        .await
    }

    async fn try_debit(&self, request: &DebitRequest) -> Result<OperationReceipt, LedgerError> {
        let now = self.clock.now();
        let handle = self.wallet_store.get_or_create(&request.owner_id, now)?;
        let mut guard = self.wallet_store.lock(&handle).await?;

        let mut staged = guard.clone();
        let reset = reset_if_needed(&mut staged, now);
        let check = spending_validator::validate(&staged, request.amount);
        if let Err(err) = check.into_result(&request.owner_id, request.amount) {
            Self::persist_reset(&mut guard, &staged, reset, now);
            warn!(
                owner_id = %request.owner_id,
                amount = %request.amount,
                code = err.code(),
                "Debit rejected: {}", err
            );
            return Err(err);
        }

        let tx = Transaction::completed(
            NewEntry {
                owner_id: staged.owner_id.clone(),
                wallet_id: staged.id,
                amount: request.amount,
                description: request.description.clone(),
                reference: self.next_reference(ReferenceKind::Debit, None)?,
                details: EntryDetails::ServicePayment {
                    service: request.service.clone(),
                },
                balance_before: staged.balance,
                metadata: request.metadata.clone().unwrap_or_else(|| json!({})),
                context: request.context.clone(),
            },
            now,
        );
        Self::apply_spend(&mut staged, request.amount, "debit")?;

        WalletStore::ensure_current(&guard, &staged)?;
        let result = receipt(&tx, false);
        self.ledger.append(tx)?;
        WalletStore::commit(&mut guard, staged, now);

        info!(
            owner_id = %request.owner_id,
            reference = %result.reference,
            amount = %request.amount,
            balance = %result.new_balance,
            "Debit committed"
        );
        Ok(result)
    }

    /// Move money from the sender's wallet to an existing recipient wallet
    ///
    /// Only the sender's spending rules are checked. Both ledger legs and
    /// both wallet updates are committed together or not at all.
    ///
    /// # Errors
    ///
    /// - `Validation` for a malformed request or a self-transfer
    /// - `NotFound` (recipient) when the recipient has no wallet
    /// - `WalletInactive` / `WalletBlocked` naming the recipient
    /// - Sender spending errors as for [`debit`](Self::debit)
    pub async fn transfer(&self, request: TransferRequest) -> Result<TransferReceipt, LedgerError> {
        request.validate()?;
        self.rate_limiter
            .check(&request.sender_owner_id, Operation::Transfer, self.clock.now())?;

        self.with_retries(&request.sender_owner_id, Operation::Transfer, || {
            self.try_transfer(&request)
        })
        .await
    }

    async fn try_transfer(
        &self,
        request: &TransferRequest,
    ) -> Result<TransferReceipt, LedgerError> {
        let now = self.clock.now();
        let sender = self
            .wallet_store
            .get_or_create(&request.sender_owner_id, now)?;
        let recipient = self
            .wallet_store
            .require(&request.recipient_owner_id, EntityKind::Recipient)?;
        let (mut sender_guard, mut recipient_guard) =
            self.wallet_store.lock_pair(&sender, &recipient).await?;

        let mut staged_sender = sender_guard.clone();
        let reset = reset_if_needed(&mut staged_sender, now);
        let checked = Self::check_recipient(&recipient_guard).and_then(|()| {
            spending_validator::validate(&staged_sender, request.amount)
                .into_result(&request.sender_owner_id, request.amount)
        });
        if let Err(err) = checked {
            Self::persist_reset(&mut sender_guard, &staged_sender, reset, now);
            warn!(
                sender = %request.sender_owner_id,
                recipient = %request.recipient_owner_id,
                amount = %request.amount,
                code = err.code(),
                "Transfer rejected: {}", err
            );
            return Err(err);
        }

        let mut staged_recipient = recipient_guard.clone();
        let debit_reference = self.next_reference(ReferenceKind::Debit, None)?;
        let credit_reference = self.next_reference(ReferenceKind::Credit, Some(&debit_reference))?;
        let description = if request.description.trim().is_empty() {
            format!("Transfer to {}", request.recipient_owner_id)
        } else {
            request.description.clone()
        };

        let debit = Transaction::completed(
            NewEntry {
                owner_id: staged_sender.owner_id.clone(),
                wallet_id: staged_sender.id,
                amount: request.amount,
                description: description.clone(),
                reference: debit_reference.clone(),
                details: EntryDetails::TransferOut {
                    recipient_owner_id: request.recipient_owner_id.clone(),
                    counterpart_reference: credit_reference.clone(),
                },
                balance_before: staged_sender.balance,
                metadata: json!({
                    "counterpartReference": credit_reference,
                    "recipientOwnerId": request.recipient_owner_id,
                }),
                context: request.context.clone(),
            },
            now,
        );
        let credit = Transaction::completed(
            NewEntry {
                owner_id: staged_recipient.owner_id.clone(),
                wallet_id: staged_recipient.id,
                amount: request.amount,
                description,
                reference: credit_reference,
                details: EntryDetails::TransferIn {
                    sender_owner_id: request.sender_owner_id.clone(),
                    counterpart_reference: debit_reference.clone(),
                },
                balance_before: staged_recipient.balance,
                metadata: json!({
                    "counterpartReference": debit_reference,
                    "senderOwnerId": request.sender_owner_id,
                }),
                context: request.context.clone(),
            },
            now,
        );

        Self::apply_spend(&mut staged_sender, request.amount, "transfer")?;
        staged_recipient.balance = staged_recipient
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| {
                LedgerError::arithmetic_overflow("transfer", &request.recipient_owner_id)
            })?;

        WalletStore::ensure_current(&sender_guard, &staged_sender)?;
        WalletStore::ensure_current(&recipient_guard, &staged_recipient)?;
        let result = TransferReceipt {
            sender: receipt(&debit, false),
            recipient: receipt(&credit, false),
        };
        self.ledger.append_all(vec![debit, credit])?;
        WalletStore::commit(&mut sender_guard, staged_sender, now);
        WalletStore::commit(&mut recipient_guard, staged_recipient, now);

        info!(
            sender = %request.sender_owner_id,
            recipient = %request.recipient_owner_id,
            amount = %request.amount,
            debit_reference = %result.sender.reference,
            credit_reference = %result.recipient.reference,
            "Transfer committed"
        );
        Ok(result)
    }

    /// Return part or all of a completed service payment to its wallet
    ///
    /// Transfer legs and adjustments are not refundable.
    /// Writes a compensating credit (RFD reference) and records the refund
    /// on the original debit in the same unit. The original's balances are
    /// left untouched; its status becomes refunded once the full amount has
    /// been returned. Spent counters are not restored.
    ///
    /// # Errors
    ///
    /// - `InvalidReferenceFormat`, `Validation` for a malformed request
    /// - `NotFound` when no entry has the reference
    /// - `RefundIneligible` with the reason the refund is refused
    pub async fn refund(&self, request: RefundRequest) -> Result<OperationReceipt, LedgerError> {
        request.validate()?;
        let original = self.transaction(&request.reference)?;
        self.rate_limiter
            .check(&original.owner_id, Operation::Refund, self.clock.now())?;

        self.with_retries(&original.owner_id, Operation::Refund, || {
            self.try_refund(&request)
        })
        .await
    }

    async fn try_refund(&self, request: &RefundRequest) -> Result<OperationReceipt, LedgerError> {
        let now = self.clock.now();
        let owner_id = self.transaction(&request.reference)?.owner_id;
        let handle = self.wallet_store.require(&owner_id, EntityKind::Wallet)?;
        let mut guard = self.wallet_store.lock(&handle).await?;

        // Re-read under the wallet lock; refunds of this debit are serialized by it
        let original = self.transaction(&request.reference)?;
        let refundable = refundable_amount(&original, now, self.config.refund_window_days)
            .map_err(|reason| LedgerError::refund_ineligible(&request.reference, reason))?;
        if request.amount > refundable {
            return Err(LedgerError::refund_ineligible(
                &request.reference,
                RefundIneligibility::ExceedsRefundable {
                    requested: request.amount,
                    refundable,
                },
            ));
        }

        let mut staged = guard.clone();
        let refund_id = Uuid::new_v4();
        let reference = self.next_reference(ReferenceKind::Refund, None)?;
        let credit = Transaction::completed(
            NewEntry {
                owner_id: staged.owner_id.clone(),
                wallet_id: staged.id,
                amount: request.amount,
                description: format!("Refund of {}", request.reference),
                reference: reference.clone(),
                details: EntryDetails::Refund {
                    original_reference: request.reference.clone(),
                    refund_id,
                },
                balance_before: staged.balance,
                metadata: json!({
                    "originalReference": request.reference,
                    "reason": request.reason,
                }),
                context: original.context.clone(),
            },
            now,
        );
        staged.balance = staged
            .balance
            .checked_add(request.amount)
            .ok_or_else(|| LedgerError::arithmetic_overflow("refund", &owner_id))?;

        let record = RefundRecord {
            refund_id,
            amount: request.amount,
            reason: request.reason.clone(),
            processed_at: now,
            compensating_reference: reference,
        };

        WalletStore::ensure_current(&guard, &staged)?;
        let result = receipt(&credit, false);
        let updated = self.ledger.record_refund(
            &request.reference,
            original.refunded_amount,
            record,
            credit,
            now,
        )?;
        WalletStore::commit(&mut guard, staged, now);

        info!(
            owner_id = %owner_id,
            original_reference = %request.reference,
            reference = %result.reference,
            amount = %request.amount,
            status = %updated.status,
            "Refund committed"
        );
        Ok(result)
    }

    /// Amount that may still be refunded on `reference`
    ///
    /// # Errors
    ///
    /// `NotFound`, or `RefundIneligible` with the reason no refund is possible.
    pub fn can_refund(&self, reference: &str) -> Result<Decimal, LedgerError> {
        let tx = self.transaction(reference)?;
        refundable_amount(&tx, self.clock.now(), self.config.refund_window_days)
            .map_err(|reason| LedgerError::refund_ineligible(reference, reason))
    }

    /// Soft-block a wallet; debits and incoming transfers are refused
    pub async fn block_wallet(
        &self,
        owner_id: &str,
        reason: &str,
        actor: &str,
    ) -> Result<Wallet, LedgerError> {
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "is required"));
        }
        let now = self.clock.now();
        let wallet = self
            .update_wallet(owner_id, |wallet| {
                wallet.is_blocked = true;
                wallet.blocked_reason = Some(reason.to_string());
                wallet.blocked_at = Some(now);
                wallet.blocked_by = Some(actor.to_string());
                Ok(())
            })
            .await?;
        warn!(owner_id, reason, actor, "Wallet blocked");
        Ok(wallet)
    }

    pub async fn unblock_wallet(&self, owner_id: &str, actor: &str) -> Result<Wallet, LedgerError> {
        let wallet = self
            .update_wallet(owner_id, |wallet| {
                wallet.is_blocked = false;
                wallet.blocked_reason = None;
                wallet.blocked_at = None;
                wallet.blocked_by = None;
                Ok(())
            })
            .await?;
        info!(owner_id, actor, "Wallet unblocked");
        Ok(wallet)
    }

    pub async fn deactivate_wallet(&self, owner_id: &str) -> Result<Wallet, LedgerError> {
        let wallet = self
            .update_wallet(owner_id, |wallet| {
                wallet.is_active = false;
                Ok(())
            })
            .await?;
        info!(owner_id, "Wallet deactivated");
        Ok(wallet)
    }

    pub async fn activate_wallet(&self, owner_id: &str) -> Result<Wallet, LedgerError> {
        let wallet = self
            .update_wallet(owner_id, |wallet| {
                wallet.is_active = true;
                Ok(())
            })
            .await?;
        info!(owner_id, "Wallet activated");
        Ok(wallet)
    }

    /// Change a wallet's spending limits
    ///
    /// # Errors
    ///
    /// `Validation` unless both limits are positive two-decimal amounts, the
    /// monthly limit is at least the daily limit and neither exceeds its
    /// configured ceiling.
    pub async fn update_limits(
        &self,
        owner_id: &str,
        limits: SpendingLimits,
    ) -> Result<Wallet, LedgerError> {
        self.validate_limits(limits)?;
        let wallet = self
            .update_wallet(owner_id, |wallet| {
                wallet.daily_limit = limits.daily;
                wallet.monthly_limit = limits.monthly;
                Ok(())
            })
            .await?;
        info!(owner_id, daily = %limits.daily, monthly = %limits.monthly, "Limits updated");
        Ok(wallet)
    }

    /// Correct a balance by an operator-approved amount
    ///
    /// Writes an adjustment row with a REF reference. Spending limits,
    /// counters and the wallet's status are not involved, but a downward
    /// adjustment never takes the balance below zero.
    ///
    /// # Errors
    ///
    /// - `Validation` for a bad amount or a blank reason
    /// - `NotFound` when the owner has no wallet
    /// - `InsufficientBalance` for a downward adjustment above the balance
    pub async fn adjust_balance(
        &self,
        owner_id: &str,
        direction: EntryType,
        amount: Decimal,
        reason: &str,
        actor: &str,
    ) -> Result<OperationReceipt, LedgerError> {
        validate_amount(amount)?;
        if reason.trim().is_empty() {
            return Err(LedgerError::validation("reason", "is required"));
        }

        let result = self
            .with_retries(owner_id, "adjustment", || {
                self.try_adjust(owner_id, direction, amount, reason, actor)
            })
            .await?;
        warn!(
            owner_id,
            %direction,
            %amount,
            reason,
            actor,
            reference = %result.reference,
            "Balance adjusted"
        );
        Ok(result)
    }

    async fn try_adjust(
        &self,
        owner_id: &str,
        direction: EntryType,
        amount: Decimal,
        reason: &str,
        actor: &str,
    ) -> Result<OperationReceipt, LedgerError> {
        let now = self.clock.now();
        let handle = self.wallet_store.require(owner_id, EntityKind::Wallet)?;
        let mut guard = self.wallet_store.lock(&handle).await?;
        let mut staged = guard.clone();

        let balance = match direction {
            EntryType::Credit => staged.balance.checked_add(amount),
            EntryType::Debit => staged.balance.checked_sub(amount),
        }
        .ok_or_else(|| LedgerError::arithmetic_overflow("adjustment", owner_id))?;
        if balance < Decimal::ZERO {
            return Err(LedgerError::insufficient_balance(owner_id, staged.balance, amount));
        }

        let tx = Transaction::completed(
            NewEntry {
                owner_id: staged.owner_id.clone(),
                wallet_id: staged.id,
                amount,
                description: format!("Balance adjustment: {}", reason),
                reference: self.next_reference(ReferenceKind::Other, None)?,
                details: EntryDetails::Adjustment {
                    direction,
                    actor: actor.to_string(),
                    reason: reason.to_string(),
                },
                balance_before: staged.balance,
                metadata: json!({}),
                context: RequestContext::default(),
            },
            now,
        );
        staged.balance = balance;

        WalletStore::ensure_current(&guard, &staged)?;
        let result = receipt(&tx, false);
        self.ledger.append(tx)?;
        WalletStore::commit(&mut guard, staged, now);
        Ok(result)
    }

    fn validate_limits(&self, limits: SpendingLimits) -> Result<(), LedgerError> {
        validate_amount(limits.daily).map_err(|_| {
            LedgerError::validation(
                "dailyLimit",
                "must be a positive amount with at most 2 decimals",
            )
        })?;
        validate_amount(limits.monthly).map_err(|_| {
            LedgerError::validation(
                "monthlyLimit",
                "must be a positive amount with at most 2 decimals",
            )
        })?;
        if limits.monthly < limits.daily {
            return Err(LedgerError::validation(
                "monthlyLimit",
                "must be greater than or equal to the daily limit",
            ));
        }
        if limits.daily > self.config.max_daily_limit {
            return Err(LedgerError::validation(
                "dailyLimit",
                format!("must not exceed {}", self.config.max_daily_limit),
            ));
        }
        if limits.monthly > self.config.max_monthly_limit {
            return Err(LedgerError::validation(
                "monthlyLimit",
                format!("must not exceed {}", self.config.max_monthly_limit),
            ));
        }
        Ok(())
    }

    async fn update_wallet<F>(&self, owner_id: &str, change: F) -> Result<Wallet, LedgerError>
    where
        F: Fn(&mut Wallet) -> Result<(), LedgerError>,
    {
        let change = &change;
        self.with_retries(owner_id, "admin update", || {
            self.try_update_wallet(owner_id, change)
        })
        .await
    }

    async fn try_update_wallet<F>(&self, owner_id: &str, change: &F) -> Result<Wallet, LedgerError>
    where
        F: Fn(&mut Wallet) -> Result<(), LedgerError>,
    {
        let handle = self.wallet_store.require(owner_id, EntityKind::Wallet)?;
        let mut guard = self.wallet_store.lock(&handle).await?;
        let mut staged = guard.clone();
        change(&mut staged)?;

        WalletStore::ensure_current(&guard, &staged)?;
        WalletStore::commit(&mut guard, staged, self.clock.now());
        Ok(guard.clone())
    }

    /// Current state of a wallet, with spent counters rolled over
    ///
    /// # Errors
    ///
    /// `NotFound` when the owner has no wallet.
    pub async fn wallet(&self, owner_id: &str) -> Result<Wallet, LedgerError> {
        let handle = self.wallet_store.require(owner_id, EntityKind::Wallet)?;
        let mut guard = self.wallet_store.lock(&handle).await?;
        let now = self.clock.now();

        let mut staged = guard.clone();
        let reset = reset_if_needed(&mut staged, now);
        Self::persist_reset(&mut guard, &staged, reset, now);
        Ok(guard.clone())
    }

    /// Return the owner's wallet, creating an empty one on first use
    pub async fn open_wallet(&self, owner_id: &str) -> Result<Wallet, LedgerError> {
        if owner_id.trim().is_empty() {
            return Err(LedgerError::validation("ownerId", "is required"));
        }
        self.wallet_store.get_or_create(owner_id, self.clock.now())?;
        self.wallet(owner_id).await
    }

    /// Every wallet, sorted by owner id
    pub async fn wallets(&self) -> Result<Vec<Wallet>, LedgerError> {
        self.wallet_store.all().await
    }

    /// Evaluate a prospective debit without writing anything but a rollover
    pub async fn spending_check(
        &self,
        owner_id: &str,
        amount: Decimal,
    ) -> Result<SpendingCheck, LedgerError> {
        validate_amount(amount)?;
        let wallet = self.wallet(owner_id).await?;
        Ok(spending_validator::validate(&wallet, amount))
    }

    /// Look up an entry by reference
    pub fn transaction(&self, reference: &str) -> Result<Transaction, LedgerError> {
        self.ledger
            .get(reference)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, reference))
    }

    /// One page of an owner's entries, newest first
    pub fn transactions(
        &self,
        owner_id: &str,
        filter: &TransactionFilter,
        page: PageRequest,
    ) -> Page<Transaction> {
        if !self.wallet_store.contains(owner_id) {
            let error = LedgerError::not_found(EntityKind::Wallet, owner_id);
            return Page::failed(page, error.to_string());
        }
        query::paginate(self.ledger.for_owner(owner_id), filter, page)
    }

    /// Settled totals of an owner grouped by period
    pub fn statistics(
        &self,
        owner_id: &str,
        period: StatsPeriod,
    ) -> ReportResult<Vec<PeriodStatistics>> {
        if !self.wallet_store.contains(owner_id) {
            let error = LedgerError::not_found(EntityKind::Wallet, owner_id);
            return ReportResult::failed(error.to_string());
        }
        ReportResult::ok(query::statistics(&self.ledger.for_owner(owner_id), period))
    }

    /// An owner's entries matching `keyword`, newest first
    pub fn search(&self, owner_id: &str, keyword: &str) -> ReportResult<Vec<Transaction>> {
        if !self.wallet_store.contains(owner_id) {
            let error = LedgerError::not_found(EntityKind::Wallet, owner_id);
            return ReportResult::failed(error.to_string());
        }
        ReportResult::ok(query::search(self.ledger.for_owner(owner_id), keyword))
    }

    /// Entries of one owner in commit order, or of everyone oldest first
    pub fn entries(&self, owner_id: Option<&str>) -> Vec<Transaction> {
        match owner_id {
            Some(owner_id) => self.ledger.for_owner(owner_id),
            None => self.ledger.all(),
        }
    }

    /// Compare a wallet's stored balance with the replay of its ledger
    pub async fn reconcile(&self, owner_id: &str) -> Result<Reconciliation, LedgerError> {
        let handle = self.wallet_store.require(owner_id, EntityKind::Wallet)?;
        let guard = self.wallet_store.lock(&handle).await?;
        let replayed = self.ledger.replay_balance(owner_id);

        let reconciliation = Reconciliation {
            owner_id: owner_id.to_string(),
            stored: guard.balance,
            replayed,
            consistent: guard.balance == replayed,
        };
        if !reconciliation.consistent {
            warn!(
                owner_id,
                stored = %reconciliation.stored,
                replayed = %reconciliation.replayed,
                "Wallet balance does not match ledger"
            );
        }
        Ok(reconciliation)
    }

    /// [`reconcile`](Self::reconcile) for every wallet
    pub async fn reconcile_all(&self) -> Result<Vec<Reconciliation>, LedgerError> {
        let mut results = Vec::new();
        for wallet in self.wallet_store.all().await? {
            results.push(self.reconcile(&wallet.owner_id).await?);
        }
        Ok(results)
    }

    fn next_reference(
        &self,
        kind: ReferenceKind,
        exclude: Option<&str>,
    ) -> Result<String, LedgerError> {
        self.references.generate_unique(kind, |candidate| {
            exclude == Some(candidate) || self.ledger.contains(candidate)
        })
    }

    fn check_recipient(wallet: &Wallet) -> Result<(), LedgerError> {
        if wallet.is_usable() {
            return Ok(());
        }
        if !wallet.is_active {
            return Err(LedgerError::WalletInactive {
                owner_id: wallet.owner_id.clone(),
            });
        }
        Err(LedgerError::WalletBlocked {
            owner_id: wallet.owner_id.clone(),
            reason: wallet.blocked_reason.clone(),
        })
    }

    /// Take `amount` off the balance and add it to both spent counters
    fn apply_spend(
        wallet: &mut Wallet,
        amount: Decimal,
        operation: &str,
    ) -> Result<(), LedgerError> {
        let overflow = || LedgerError::arithmetic_overflow(operation, &wallet.owner_id);
        let balance = wallet.balance.checked_sub(amount).ok_or_else(overflow)?;
        let daily_spent = wallet.daily_spent.checked_add(amount).ok_or_else(overflow)?;
        let monthly_spent = wallet.monthly_spent.checked_add(amount).ok_or_else(overflow)?;

        wallet.balance = balance;
        wallet.daily_spent = daily_spent;
        wallet.monthly_spent = monthly_spent;
        Ok(())
    }

    /// Publish a counter rollover on its own
    fn persist_reset(
        guard: &mut WalletGuard,
        staged: &Wallet,
        reset: ResetOutcome,
        now: DateTime<Utc>,
    ) {
        if reset.changed() && WalletStore::ensure_current(guard, staged).is_ok() {
            debug!(
                owner_id = %staged.owner_id,
                daily = reset.daily_reset,
                monthly = reset.monthly_reset,
                "Spent counters rolled over"
            );
            let mut rolled = (**guard).clone();
            rolled.daily_spent = staged.daily_spent;
            rolled.monthly_spent = staged.monthly_spent;
            rolled.last_reset_date = staged.last_reset_date;
            WalletStore::commit(guard, rolled, now);
        }
    }

    async fn with_retries<T, F, Fut>(
        &self,
        owner_id: &str,
        operation: impl std::fmt::Display,
        mut attempt: F,
    ) -> Result<T, LedgerError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, LedgerError>>,
    {
        let max_attempts = self.config.max_conflict_retries.saturating_add(1);
        let mut attempts = 1;
        loop {
            match attempt().await {
                Err(LedgerError::ConcurrencyConflict { .. }) if attempts < max_attempts => {
                    debug!(owner_id, %operation, attempts, "Concurrency conflict, retrying");
                    attempts += 1;
                    tokio::task::yield_now().await;
                }
                Err(LedgerError::ConcurrencyConflict { .. }) => {
                    warn!(owner_id, %operation, attempts, "Giving up after concurrency conflicts");
                    return Err(LedgerError::concurrency_conflict(owner_id, attempts));
                }
                other => return other,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::clock::ManualClock;
    use crate::types::{PaymentMethod, RequestContext, TransactionStatus};
    use chrono::TimeZone;
    use rstest::rstest;

    fn engine() -> LedgerEngine {
        let clock = ManualClock::new(Utc.with_ymd_and_hms(2024, 3, 15, 10, 0, 0).unwrap());
        LedgerEngine::with_clock(LedgerConfig::default(), Arc::new(clock))
    }

    fn credit(owner: &str, amount: i64, external: Option<&str>) -> CreditRequest {
        CreditRequest {
            owner_id: owner.to_string(),
            amount: Decimal::from(amount),
            payment_method: PaymentMethod::Card,
            external_payment_id: external.map(String::from),
            gateway: None,
            description: "top up".to_string(),
            metadata: None,
            context: RequestContext::default(),
        }
    }

    fn debit(owner: &str, amount: i64) -> DebitRequest {
        DebitRequest {
            owner_id: owner.to_string(),
            amount: Decimal::from(amount),
            description: "session".to_string(),
            service: None,
            metadata: None,
            context: RequestContext::default(),
        }
    }

    #[tokio::test]
    async fn test_credit_creates_wallet_and_row() {
        let engine = engine();
        let result = engine.credit(credit("alice", 250, None)).await.unwrap();

        assert_eq!(result.new_balance, Decimal::from(250));
        assert!(result.reference.starts_with("TXN"));
        assert!(!result.replayed);

        let wallet = engine.wallet("alice").await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(250));
        assert_eq!(wallet.version, 1);
    }

    #[tokio::test]
    async fn test_credit_with_external_id_uses_payment_prefix_and_replays() {
        let engine = engine();
        let first = engine
            .credit(credit("alice", 100, Some("pay_123")))
            .await
            .unwrap();
        let second = engine
            .credit(credit("alice", 100, Some("pay_123")))
            .await
            .unwrap();

        assert!(first.reference.starts_with("PAY"));
        assert_eq!(second.reference, first.reference);
        assert!(second.replayed);
        assert_eq!(engine.wallet("alice").await.unwrap().balance, Decimal::from(100));
        assert_eq!(engine.ledger().len(), 1);
    }

    #[tokio::test]
    async fn test_debit_updates_balance_and_counters() {
        let engine = engine();
        engine.credit(credit("alice", 1000, None)).await.unwrap();

        let result = engine.debit(debit("alice", 300)).await.unwrap();
        assert!(result.reference.starts_with("SRV"));

        let wallet = engine.wallet("alice").await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(700));
        assert_eq!(wallet.daily_spent, Decimal::from(300));
        assert_eq!(wallet.monthly_spent, Decimal::from(300));
    }

    #[tokio::test]
    async fn test_debit_on_blocked_wallet_reports_reason() {
        let engine = engine();
        engine.credit(credit("alice", 1000, None)).await.unwrap();
        engine
            .block_wallet("alice", "fraud review", "ops-1")
            .await
            .unwrap();

        let err = engine.debit(debit("alice", 10)).await.unwrap_err();
        assert_eq!(
            err,
            LedgerError::WalletBlocked {
                owner_id: "alice".to_string(),
                reason: Some("fraud review".to_string())
            }
        );

        let wallet = engine.unblock_wallet("alice", "ops-1").await.unwrap();
        assert!(!wallet.is_blocked);
        assert!(wallet.blocked_reason.is_none());
        assert!(engine.debit(debit("alice", 10)).await.is_ok());
    }

    #[tokio::test]
    async fn test_rejected_debit_with_several_violations() {
        let engine = engine();
        engine.credit(credit("alice", 50, None)).await.unwrap();
        engine.deactivate_wallet("alice").await.unwrap();

        let err = engine.debit(debit("alice", 100)).await.unwrap_err();
        match err {
            LedgerError::SpendingRejected { violations, .. } => {
                let codes: Vec<&str> = violations.iter().map(|v| v.code()).collect();
                assert_eq!(codes, vec!["WALLET_INACTIVE", "INSUFFICIENT_BALANCE"]);
            }
            other => panic!("unexpected error {:?}", other),
        }
        assert_eq!(engine.wallet("alice").await.unwrap().balance, Decimal::from(50));
    }

    #[rstest]
    #[case::zero_daily(0, 1000)]
    #[case::monthly_below_daily(500, 100)]
    #[case::daily_above_ceiling(200_000, 500_000)]
    #[case::monthly_above_ceiling(1000, 2_000_000)]
    #[tokio::test]
    async fn test_update_limits_rejects_out_of_bounds(#[case] daily: i64, #[case] monthly: i64) {
        let engine = engine();
        engine.open_wallet("alice").await.unwrap();

        let err = engine
            .update_limits(
                "alice",
                SpendingLimits {
                    daily: Decimal::from(daily),
                    monthly: Decimal::from(monthly),
                },
            )
            .await
            .unwrap_err();
        assert_eq!(err.code(), "VALIDATION_ERROR");
    }

    #[tokio::test]
    async fn test_update_limits_applies() {
        let engine = engine();
        engine.open_wallet("alice").await.unwrap();

        let wallet = engine
            .update_limits(
                "alice",
                SpendingLimits {
                    daily: Decimal::from(250),
                    monthly: Decimal::from(4000),
                },
            )
            .await
            .unwrap();

        assert_eq!(wallet.daily_limit, Decimal::from(250));
        assert_eq!(wallet.monthly_limit, Decimal::from(4000));
    }

    #[tokio::test]
    async fn test_refund_of_credit_is_ineligible() {
        let engine = engine();
        let top_up = engine.credit(credit("alice", 100, None)).await.unwrap();

        let err = engine
            .refund(RefundRequest {
                reference: top_up.reference.clone(),
                amount: Decimal::from(10),
                reason: "mistake".to_string(),
            })
            .await
            .unwrap_err();

        assert_eq!(
            err,
            LedgerError::refund_ineligible(&top_up.reference, RefundIneligibility::NotDebit)
        );
    }

    #[tokio::test]
    async fn test_partial_refunds_then_full() {
        let engine = engine();
        engine.credit(credit("alice", 500, None)).await.unwrap();
        let spent = engine.debit(debit("alice", 200)).await.unwrap();

        let first = engine
            .refund(RefundRequest {
                reference: spent.reference.clone(),
                amount: Decimal::from(50),
                reason: "partial".to_string(),
            })
            .await
            .unwrap();
        assert!(first.reference.starts_with("RFD"));
        assert_eq!(first.new_balance, Decimal::from(350));
        assert_eq!(engine.can_refund(&spent.reference).unwrap(), Decimal::from(150));

        engine
            .refund(RefundRequest {
                reference: spent.reference.clone(),
                amount: Decimal::from(150),
                reason: "rest".to_string(),
            })
            .await
            .unwrap();

        let original = engine.transaction(&spent.reference).unwrap();
        assert_eq!(original.status, TransactionStatus::Refunded);
        assert_eq!(original.refunded_amount, Decimal::from(200));
        assert_eq!(original.balance_after, Decimal::from(300));
        assert_eq!(engine.wallet("alice").await.unwrap().balance, Decimal::from(500));
        assert!(engine.can_refund(&spent.reference).is_err());
    }

    #[tokio::test]
    async fn test_reads_on_unknown_owner_degrade() {
        let engine = engine();

        let page = engine.transactions(
            "ghost",
            &TransactionFilter::default(),
            PageRequest::default(),
        );
        assert!(page.items.is_empty());
        assert!(page.error.is_some());

        let stats = engine.statistics("ghost", StatsPeriod::Day);
        assert!(stats.data.is_empty());
        assert!(stats.error.is_some());
    }

    #[tokio::test]
    async fn test_execute_dispatches_transfer() {
        let engine = engine();
        engine.credit(credit("alice", 100, None)).await.unwrap();
        engine.open_wallet("bob").await.unwrap();

        let outcome = engine
            .execute(LedgerRequest::Transfer(TransferRequest {
                sender_owner_id: "alice".to_string(),
                recipient_owner_id: "bob".to_string(),
                amount: Decimal::from(40),
                description: String::new(),
                context: RequestContext::default(),
            }))
            .await
            .unwrap();

        assert!(outcome.primary().reference.starts_with("SRV"));
        match outcome {
            LedgerReceipt::Transfer(receipt) => {
                assert_eq!(receipt.sender.new_balance, Decimal::from(60));
                assert_eq!(receipt.recipient.new_balance, Decimal::from(40));
            }
            other => panic!("unexpected receipt {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_adjustments_bypass_limits_but_not_zero_floor() {
        let engine = engine();
        engine.credit(credit("alice", 50, None)).await.unwrap();
        engine.block_wallet("alice", "audit", "ops-1").await.unwrap();

        let down = engine
            .adjust_balance(
                "alice",
                EntryType::Debit,
                Decimal::from(20),
                "duplicate top-up",
                "ops-1",
            )
            .await
            .unwrap();
        assert!(down.reference.starts_with("REF"));
        assert_eq!(down.new_balance, Decimal::from(30));

        let err = engine
            .adjust_balance("alice", EntryType::Debit, Decimal::from(31), "too much", "ops-1")
            .await
            .unwrap_err();
        assert_eq!(err.code(), "INSUFFICIENT_BALANCE");

        let wallet = engine.wallet("alice").await.unwrap();
        assert_eq!(wallet.balance, Decimal::from(30));
        assert_eq!(wallet.daily_spent, Decimal::ZERO);

        let row = engine.transaction(&down.reference).unwrap();
        assert_eq!(row.category(), crate::types::Category::Adjustment);
        assert!(engine.reconcile("alice").await.unwrap().consistent);
    }
}
