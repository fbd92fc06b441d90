//! Read-side views over ledger entries
//!
//! Filtering, pagination, keyword search and period statistics. These never
//! touch stored state; a bad request degrades to an empty result carrying an
//! error message instead of failing.

use crate::types::{Category, EntryType, Transaction, TransactionStatus};
use chrono::{DateTime, Datelike, Duration, NaiveDate, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

pub const DEFAULT_PAGE_SIZE: usize = 20;
pub const MAX_PAGE_SIZE: usize = 100;

/// Criteria for listing an owner's entries; unset fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFilter {
    pub entry_type: Option<EntryType>,
    pub status: Option<TransactionStatus>,
    pub category: Option<Category>,
    pub service_id: Option<String>,
    /// Inclusive lower bound on `created_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    pub to: Option<DateTime<Utc>>,
}

impl TransactionFilter {
    pub fn matches(&self, tx: &Transaction) -> bool {
        self.entry_type.map_or(true, |t| tx.entry_type == t)
            && self.status.map_or(true, |s| tx.status == s)
            && self.category.map_or(true, |c| tx.category() == c)
            && self.service_id.as_deref().map_or(true, |id| {
                tx.details
                    .service()
                    .is_some_and(|service| service.service_id == id)
            })
            && self.from.map_or(true, |from| tx.created_at >= from)
            && self.to.map_or(true, |to| tx.created_at <= to)
    }
}

/// 1-based page number and page size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRequest {
    pub page: usize,
    pub limit: usize,
}

impl Default for PageRequest {
    fn default() -> Self {
        Self {
            page: 1,
            limit: DEFAULT_PAGE_SIZE,
        }
    }
}

/// One page of results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Page<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub limit: usize,
    /// Matching items across all pages
    pub total: usize,
    pub total_pages: usize,
    /// Set when the request could not be served
    pub error: Option<String>,
}

impl<T> Page<T> {
    pub fn failed(request: PageRequest, error: impl Into<String>) -> Self {
        Self {
            items: Vec::new(),
            page: request.page,
            limit: request.limit,
            total: 0,
            total_pages: 0,
            error: Some(error.into()),
        }
    }
}

/// Report payload plus an error flag for degraded reads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportResult<T> {
    pub data: T,
    pub error: Option<String>,
}

impl<T: Default> ReportResult<T> {
    pub fn ok(data: T) -> Self {
        Self { data, error: None }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            data: T::default(),
            error: Some(error.into()),
        }
    }
}

fn newest_first(a: &Transaction, b: &Transaction) -> std::cmp::Ordering {
    b.created_at
        .cmp(&a.created_at)
        .then_with(|| b.reference.cmp(&a.reference))
}

/// Filter, sort newest first and cut one page
///
/// The page size is capped at [`MAX_PAGE_SIZE`]. Page 0, limit 0 or a date
/// range with `from` after `to` yields an empty page with an error.
pub fn paginate(
    entries: Vec<Transaction>,
    filter: &TransactionFilter,
    request: PageRequest,
) -> Page<Transaction> {
    if request.page == 0 {
        return Page::failed(request, "page must be at least 1");
    }
    if request.limit == 0 {
        return Page::failed(request, "limit must be at least 1");
    }
    if let (Some(from), Some(to)) = (filter.from, filter.to) {
        if from > to {
            return Page::failed(request, "date range start is after its end");
        }
    }

    let limit = request.limit.min(MAX_PAGE_SIZE);
    let mut matching: Vec<Transaction> = entries
        .into_iter()
        .filter(|tx| filter.matches(tx))
        .collect();
    matching.sort_by(newest_first);

    let total = matching.len();
    let items = matching
        .into_iter()
        .skip((request.page - 1).saturating_mul(limit))
        .take(limit)
        .collect();

    Page {
        items,
        page: request.page,
        limit,
        total,
        total_pages: total.div_ceil(limit),
        error: None,
    }
}

/// Entries whose description, reference or service id contains `keyword`,
/// ignoring case, newest first
pub fn search(entries: Vec<Transaction>, keyword: &str) -> Vec<Transaction> {
    let needle = keyword.trim().to_lowercase();
    if needle.is_empty() {
        return Vec::new();
    }

    let mut found: Vec<Transaction> = entries
        .into_iter()
        .filter(|tx| {
            tx.description.to_lowercase().contains(&needle)
                || tx.reference.to_lowercase().contains(&needle)
                || tx
                    .details
                    .service()
                    .is_some_and(|s| s.service_id.to_lowercase().contains(&needle))
        })
        .collect();
    found.sort_by(newest_first);
    found
}

/// Grouping period for statistics
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatsPeriod {
    Day,
    /// ISO weeks, starting Monday
    Week,
    Month,
}

impl StatsPeriod {
    /// First day of the period containing `date`
    pub fn start_of(&self, date: NaiveDate) -> NaiveDate {
        match self {
            StatsPeriod::Day => date,
            StatsPeriod::Week => {
                date - Duration::days(i64::from(date.weekday().num_days_from_monday()))
            }
            StatsPeriod::Month => date.with_day(1).unwrap_or(date),
        }
    }
}

/// Totals of settled entries within one period
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PeriodStatistics {
    pub period_start: NaiveDate,
    pub total_credits: Decimal,
    pub total_debits: Decimal,
    /// Credits minus debits
    pub net: Decimal,
    pub transaction_count: usize,
}

impl PeriodStatistics {
    fn empty(period_start: NaiveDate) -> Self {
        Self {
            period_start,
            total_credits: Decimal::ZERO,
            total_debits: Decimal::ZERO,
            net: Decimal::ZERO,
            transaction_count: 0,
        }
    }
}

/// Group settled entries by period, oldest period first
pub fn statistics(entries: &[Transaction], period: StatsPeriod) -> Vec<PeriodStatistics> {
    let mut buckets: BTreeMap<NaiveDate, PeriodStatistics> = BTreeMap::new();

    for tx in entries.iter().filter(|tx| tx.status.is_settled()) {
        let start = period.start_of(tx.created_at.date_naive());
        let bucket = buckets
            .entry(start)
            .or_insert_with(|| PeriodStatistics::empty(start));

        match tx.entry_type {
            EntryType::Credit => bucket.total_credits += tx.amount,
            EntryType::Debit => bucket.total_debits += tx.amount,
        }
        bucket.net += tx.signed_amount();
        bucket.transaction_count += 1;
    }

    buckets.into_values().collect()
}
