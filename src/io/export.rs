//! Ledger export
//!
//! Serializes ledger entries as CSV (one flat row per entry) or as JSON
//! (full entries including details, refunds and metadata).

use crate::types::{LedgerError, Transaction};
use serde::Serialize;
use std::io::Write;

/// Output format of reports and exports
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, clap::ValueEnum)]
pub enum ExportFormat {
    #[default]
    Csv,
    Json,
}

impl std::fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ExportFormat::Csv => write!(f, "csv"),
            ExportFormat::Json => write!(f, "json"),
        }
    }
}

#[derive(Serialize)]
struct TransactionRow<'a> {
    reference: &'a str,
    owner: &'a str,
    #[serde(rename = "type")]
    entry_type: String,
    category: String,
    amount: String,
    status: String,
    balance_before: String,
    balance_after: String,
    refunded_amount: String,
    service_id: &'a str,
    external_payment_id: &'a str,
    description: &'a str,
    created_at: String,
}

impl<'a> From<&'a Transaction> for TransactionRow<'a> {
    fn from(tx: &'a Transaction) -> Self {
        TransactionRow {
            reference: &tx.reference,
            owner: &tx.owner_id,
            entry_type: tx.entry_type.to_string(),
            category: tx.category().to_string(),
            amount: format!("{:.2}", tx.amount),
            status: tx.status.to_string(),
            balance_before: format!("{:.2}", tx.balance_before),
            balance_after: format!("{:.2}", tx.balance_after),
            refunded_amount: format!("{:.2}", tx.refunded_amount),
            service_id: tx
                .details
                .service()
                .map(|s| s.service_id.as_str())
                .unwrap_or_default(),
            external_payment_id: tx.details.external_payment_id().unwrap_or_default(),
            description: &tx.description,
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Write ledger entries in the given order
pub fn write_transactions(
    entries: &[Transaction],
    format: ExportFormat,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    match format {
        ExportFormat::Csv => {
            let mut writer = csv::Writer::from_writer(output);
            for tx in entries {
                writer.serialize(TransactionRow::from(tx))?;
            }
            writer.flush()?;
        }
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *output, entries)?;
            writeln!(output)?;
        }
    }
    Ok(())
}
