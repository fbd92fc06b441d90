//! Append-mostly transaction ledger
//!
//! The ledger is the audit trail of every committed balance change. Entries
//! are keyed by reference and indexed by owner (in commit order) and by
//! external payment id.
//!
//! # Design
//!
//! Reads go straight to the `DashMap`s. Writes go through a single write lock
//! so that a multi-row append (both legs of a transfer, a refund's
//! compensating credit together with the update of the original debit) checks
//! every uniqueness constraint before the first row becomes visible. A
//! rejected append leaves the ledger exactly as it was.
//!
//! The only in-place change ever made to a stored entry is recording a refund
//! on the original debit: `refunded_amount`, `refunds` and `status` move,
//! `balance_before`/`balance_after` never do.

use crate::types::{
    EntityKind, EntryDetails, EntryType, LedgerError, OwnerId, Reference, RefundIneligibility,
    RefundRecord, Transaction, TransactionId, TransactionStatus,
};
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

#[derive(Debug, Default)]
pub struct TransactionLedger {
    /// Every entry, keyed by its unique reference
    entries: DashMap<Reference, Transaction>,

    /// References per owner in commit order
    by_owner: DashMap<OwnerId, Vec<Reference>>,

    /// Gateway payment id to the reference of the credit that recorded it
    by_external_payment: DashMap<String, Reference>,

    by_id: DashMap<TransactionId, Reference>,

    /// Serializes writers; readers never take it
    write_lock: Mutex<()>,
}

impl TransactionLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append entries as one all-or-nothing unit
    ///
    /// # Errors
    ///
    /// - `DuplicateReference` if a reference is already stored or repeated
    ///   within `entries`
    /// - `DuplicateExternalPayment` if an external payment id is already
    ///   recorded
    ///
    /// Nothing is written when an error is returned.
    pub fn append_all(&self, entries: Vec<Transaction>) -> Result<(), LedgerError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.check_unique(&entries)?;
        for entry in entries {
            self.insert(entry);
        }
        Ok(())
    }

    /// Append a single entry
    pub fn append(&self, entry: Transaction) -> Result<(), LedgerError> {
        self.append_all(vec![entry])
    }

    /// Record a refund on `original_reference` and append its compensating
    /// credit in the same unit
    ///
    /// `expected_refunded` is the original's `refunded_amount` the caller
    /// checked eligibility against; a different stored value means another
    /// refund got there first.
    ///
    /// # Returns
    ///
    /// The updated original entry.
    pub fn record_refund(
        &self,
        original_reference: &str,
        expected_refunded: Decimal,
        record: RefundRecord,
        compensating: Transaction,
        now: DateTime<Utc>,
    ) -> Result<Transaction, LedgerError> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let mut original = self
            .get(original_reference)
            .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, original_reference))?;
        if original.refunded_amount != expected_refunded {
            return Err(LedgerError::concurrency_conflict(&original.owner_id, 1));
        }
        if original.refunded_amount + record.amount > original.amount {
            return Err(LedgerError::refund_ineligible(
                original_reference,
                RefundIneligibility::ExceedsRefundable {
                    requested: record.amount,
                    refundable: original.refundable_amount(),
                },
            ));
        }
        self.check_unique(std::slice::from_ref(&compensating))?;

        original.refunded_amount += record.amount;
        original.refunds.push(record);
        if original.refunded_amount == original.amount {
            original.status = TransactionStatus::Refunded;
        }
        original.updated_at = now;

        self.insert(compensating);
        self.entries
            .insert(original.reference.clone(), original.clone());
        Ok(original)
    }

    fn check_unique(&self, entries: &[Transaction]) -> Result<(), LedgerError> {
        let mut references = HashSet::new();
        let mut external_ids = HashSet::new();

        for entry in entries {
            if self.entries.contains_key(&entry.reference) || !references.insert(&entry.reference) {
                debug!(reference = %entry.reference, "Rejecting duplicate reference");
                return Err(LedgerError::DuplicateReference {
                    reference: entry.reference.clone(),
                });
            }
            if let Some(external_id) = entry.details.external_payment_id() {
                if self.by_external_payment.contains_key(external_id)
                    || !external_ids.insert(external_id)
                {
                    return Err(LedgerError::DuplicateExternalPayment {
                        external_payment_id: external_id.to_string(),
                    });
                }
            }
        }
        Ok(())
    }

    fn insert(&self, entry: Transaction) {
        if let Some(external_id) = entry.details.external_payment_id() {
            self.by_external_payment
                .insert(external_id.to_string(), entry.reference.clone());
        }
        self.by_id.insert(entry.id, entry.reference.clone());
        self.by_owner
            .entry(entry.owner_id.clone())
            .or_default()
            .push(entry.reference.clone());
        self.entries.insert(entry.reference.clone(), entry);
    }

    pub fn contains(&self, reference: &str) -> bool {
        self.entries.contains_key(reference)
    }

    pub fn get(&self, reference: &str) -> Option<Transaction> {
        self.entries.get(reference).map(|entry| entry.value().clone())
    }

    pub fn get_by_id(&self, id: TransactionId) -> Option<Transaction> {
        let reference = self.by_id.get(&id)?.value().clone();
        self.get(&reference)
    }

    pub fn find_by_external_payment_id(&self, external_payment_id: &str) -> Option<Transaction> {
        let reference = self
            .by_external_payment
            .get(external_payment_id)?
            .value()
            .clone();
        self.get(&reference)
    }

    /// Entries of one owner in commit order
    pub fn for_owner(&self, owner_id: &str) -> Vec<Transaction> {
        let references = match self.by_owner.get(owner_id) {
            Some(references) => references.value().clone(),
            None => return Vec::new(),
        };
        references
            .iter()
            .filter_map(|reference| self.get(reference))
            .collect()
    }

    /// Every entry, oldest first
    pub fn all(&self) -> Vec<Transaction> {
        let mut entries: Vec<Transaction> = self
            .entries
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        entries.sort_by(|a, b| {
            a.created_at
                .cmp(&b.created_at)
                .then_with(|| a.reference.cmp(&b.reference))
        });
        entries
    }

    /// Balance implied by an owner's settled entries
    pub fn replay_balance(&self, owner_id: &str) -> Decimal {
        self.for_owner(owner_id)
            .iter()
            .filter(|tx| tx.status.is_settled())
            .map(Transaction::signed_amount)
            .sum()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Amount still refundable on `tx` at `now`
///
/// # Errors
///
/// The first [`RefundIneligibility`] that applies: not a debit, a debit
/// other than a service payment, not completed, already fully refunded, or
/// outside the refund window.
pub fn refundable_amount(
    tx: &Transaction,
    now: DateTime<Utc>,
    window_days: i64,
) -> Result<Decimal, RefundIneligibility> {
    if tx.entry_type != EntryType::Debit {
        return Err(RefundIneligibility::NotDebit);
    }
    // Transfer legs and adjustments have no service charge to return
    if !matches!(tx.details, EntryDetails::ServicePayment { .. }) {
        return Err(RefundIneligibility::NotRefundableKind {
            category: tx.category().to_string(),
        });
    }

    match tx.status {
        TransactionStatus::Completed => {}
        TransactionStatus::Refunded => return Err(RefundIneligibility::FullyRefunded),
        other => {
            return Err(RefundIneligibility::NotCompleted {
                status: other.to_string(),
            })
        }
    }

    if tx.refunded_amount >= tx.amount {
        return Err(RefundIneligibility::FullyRefunded);
    }

    if now - tx.created_at > Duration::days(window_days) {
        return Err(RefundIneligibility::WindowExpired { window_days });
    }

    Ok(tx.refundable_amount())
}
