//! CSV format handling for replayed operations and wallet output
//!
//! This module centralizes the operation-file format:
//! - `CsvOperation` structure for deserialization
//! - Conversion from rows to replay steps
//! - Wallet report serialization (CSV and JSON)
//!
//! Input columns: `op,id,owner,counterparty,amount,target,external_id,method,
//! description,service_id,service_type,provider_id`. Trailing columns a row
//! does not need may be left empty or omitted.
//!
//! All functions are pure (no file handling) for easy testing.

use crate::io::export::ExportFormat;
use crate::types::{
    CreditRequest, DebitRequest, LedgerError, LedgerRequest, PaymentMethod, RequestContext,
    ServiceLink, TransferRequest, Wallet,
};
use rust_decimal::Decimal;
use serde::Deserialize;
use std::io::Write;
use std::str::FromStr;

/// One row of an operations file
#[derive(Debug, Deserialize, Clone, Default, PartialEq)]
pub struct CsvOperation {
    pub op: String,
    /// Row identifier, referenced by later refund rows
    pub id: String,
    pub owner: String,
    pub counterparty: Option<String>,
    pub amount: Option<String>,
    /// For refunds, the `id` of the row being refunded
    pub target: Option<String>,
    pub external_id: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    pub service_id: Option<String>,
    pub service_type: Option<String>,
    pub provider_id: Option<String>,
}

/// What a row asks the engine to do
#[derive(Debug, Clone, PartialEq)]
pub enum ReplayStep {
    /// A request that is complete as read
    Execute(LedgerRequest),
    /// A refund of the row with id `target`; its reference is only known
    /// once that row has run
    Refund {
        target: String,
        amount: Decimal,
        reason: String,
    },
    Block { owner_id: String, reason: String },
    Unblock { owner_id: String },
    /// Operator correction; a negative amount lowers the balance
    Adjust {
        owner_id: String,
        amount: Decimal,
        reason: String,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub struct ReplayRecord {
    pub id: String,
    pub step: ReplayStep,
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn required(value: Option<String>, column: &str, row: &CsvOperation) -> Result<String, String> {
    non_empty(value).ok_or_else(|| {
        format!(
            "{} operation {} requires a value in column '{}'",
            row.op, row.id, column
        )
    })
}

fn parse_amount(row: &CsvOperation) -> Result<Decimal, String> {
    let raw = required(row.amount.clone(), "amount", row)?;
    Decimal::from_str(&raw)
        .map_err(|_| format!("Invalid amount '{}' for operation {}", raw, row.id))
}

/// Convert a row into a replay step
///
/// Checks that the columns the operation needs are present and parsable.
/// Business validation (positive amounts, self-transfers, ...) is left to
/// the engine.
///
/// # Errors
///
/// A message naming the row id and the offending column.
pub fn convert_operation(row: CsvOperation) -> Result<ReplayRecord, String> {
    let id = row.id.trim().to_string();
    let owner_id = row.owner.trim().to_string();
    let description = non_empty(row.description.clone()).unwrap_or_default();

    let step = match row.op.trim().to_lowercase().as_str() {
        "credit" | "topup" => {
            let method = match non_empty(row.method.clone()) {
                Some(method) => PaymentMethod::from_str(&method)
                    .map_err(|e| format!("{} for operation {}", e, id))?,
                None => PaymentMethod::Card,
            };
            ReplayStep::Execute(LedgerRequest::Credit(CreditRequest {
                owner_id,
                amount: parse_amount(&row)?,
                payment_method: method,
                external_payment_id: non_empty(row.external_id.clone()),
                gateway: None,
                description,
                metadata: None,
                context: RequestContext::default(),
            }))
        }
        "debit" => {
            let service = non_empty(row.service_id.clone()).map(|service_id| ServiceLink {
                service_id,
                service_type: non_empty(row.service_type.clone()),
                provider_id: non_empty(row.provider_id.clone()),
            });
            ReplayStep::Execute(LedgerRequest::Debit(DebitRequest {
                owner_id,
                amount: parse_amount(&row)?,
                description,
                service,
                metadata: None,
                context: RequestContext::default(),
            }))
        }
        "transfer" => ReplayStep::Execute(LedgerRequest::Transfer(TransferRequest {
            sender_owner_id: owner_id,
            recipient_owner_id: required(row.counterparty.clone(), "counterparty", &row)?,
            amount: parse_amount(&row)?,
            description,
            context: RequestContext::default(),
        })),
        "refund" => ReplayStep::Refund {
            target: required(row.target.clone(), "target", &row)?,
            amount: parse_amount(&row)?,
            reason: if description.is_empty() {
                "refund".to_string()
            } else {
                description
            },
        },
        "block" => ReplayStep::Block {
            owner_id,
            reason: required(row.description.clone(), "description", &row)?,
        },
        "unblock" => ReplayStep::Unblock { owner_id },
        "adjust" => ReplayStep::Adjust {
            amount: parse_amount(&row)?,
            reason: required(row.description.clone(), "description", &row)?,
            owner_id,
        },
        _ => {
            return Err(format!(
                "Invalid operation type: '{}' for operation {}",
                row.op, id
            ))
        }
    };

    Ok(ReplayRecord { id, step })
}

/// Write wallet states in the requested format
///
/// Wallets are sorted by owner id for deterministic output.
pub fn write_wallets(
    wallets: &[Wallet],
    format: ExportFormat,
    output: &mut dyn Write,
) -> Result<(), LedgerError> {
    let mut sorted = wallets.to_vec();
    sorted.sort_by(|a, b| a.owner_id.cmp(&b.owner_id));

    match format {
        ExportFormat::Csv => write_wallets_csv(&sorted, output),
        ExportFormat::Json => {
            serde_json::to_writer_pretty(&mut *output, &sorted)?;
            writeln!(output)?;
            Ok(())
        }
    }
}

/// Write wallet states to CSV format
///
/// Columns: owner, balance, currency, daily_spent, monthly_spent,
/// daily_limit, monthly_limit, active, blocked. Amounts use two decimals.
pub fn write_wallets_csv(wallets: &[Wallet], output: &mut dyn Write) -> Result<(), LedgerError> {
    let mut writer = csv::Writer::from_writer(output);

    writer.write_record([
        "owner",
        "balance",
        "currency",
        "daily_spent",
        "monthly_spent",
        "daily_limit",
        "monthly_limit",
        "active",
        "blocked",
    ])?;

    for wallet in wallets {
        writer.write_record(&[
            wallet.owner_id.clone(),
            format!("{:.2}", wallet.balance),
            wallet.currency.clone(),
            format!("{:.2}", wallet.daily_spent),
            format!("{:.2}", wallet.monthly_spent),
            format!("{:.2}", wallet.daily_limit),
            format!("{:.2}", wallet.monthly_limit),
            wallet.is_active.to_string(),
            wallet.is_blocked.to_string(),
        ])?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::SpendingLimits;
    use chrono::{TimeZone, Utc};
    use rstest::rstest;

    fn row(op: &str, amount: Option<&str>) -> CsvOperation {
        CsvOperation {
            op: op.to_string(),
            id: "r1".to_string(),
            owner: "alice".to_string(),
            amount: amount.map(String::from),
            ..CsvOperation::default()
        }
    }

    #[test]
    fn test_credit_row_defaults_to_card() {
        let record = convert_operation(row("credit", Some("100.50"))).unwrap();

        match record.step {
            ReplayStep::Execute(LedgerRequest::Credit(req)) => {
                assert_eq!(req.amount, Decimal::new(10050, 2));
                assert_eq!(req.payment_method, PaymentMethod::Card);
                assert!(req.external_payment_id.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_debit_row_links_service() {
        let mut debit = row("debit", Some("25"));
        debit.service_id = Some("booking-1".to_string());
        debit.provider_id = Some("  ".to_string());

        match convert_operation(debit).unwrap().step {
            ReplayStep::Execute(LedgerRequest::Debit(req)) => {
                let service = req.service.unwrap();
                assert_eq!(service.service_id, "booking-1");
                assert!(service.provider_id.is_none());
            }
            other => panic!("unexpected step {:?}", other),
        }
    }

    #[test]
    fn test_refund_row_names_target() {
        let mut refund = row("refund", Some("10"));
        refund.target = Some("r0".to_string());

        assert_eq!(
            convert_operation(refund).unwrap().step,
            ReplayStep::Refund {
                target: "r0".to_string(),
                amount: Decimal::from(10),
                reason: "refund".to_string(),
            }
        );
    }

    #[rstest]
    #[case::invalid_type(row("withdraw", Some("1")), "Invalid operation type")]
    #[case::missing_amount(row("debit", None), "requires a value in column 'amount'")]
    #[case::invalid_amount(row("debit", Some("ten")), "Invalid amount")]
    #[case::transfer_without_counterparty(row("transfer", Some("5")), "'counterparty'")]
    #[case::refund_without_target(row("refund", Some("5")), "'target'")]
    #[case::block_without_reason(row("block", None), "'description'")]
    #[case::adjust_without_reason(row("adjust", Some("-5")), "'description'")]
    fn test_convert_operation_errors(#[case] input: CsvOperation, #[case] expected: &str) {
        let err = convert_operation(input).unwrap_err();
        assert!(err.contains(expected), "unexpected error: {}", err);
    }

    #[test]
    fn test_write_wallets_csv_sorted_two_decimals() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let limits = SpendingLimits {
            daily: Decimal::from(500),
            monthly: Decimal::from(5000),
        };
        let mut bob = Wallet::new("bob", "USD", limits, now);
        bob.balance = Decimal::new(12345, 2);
        let mut alice = Wallet::new("alice", "USD", limits, now);
        alice.is_blocked = true;

        let mut output = Vec::new();
        write_wallets(&[bob, alice], ExportFormat::Csv, &mut output).unwrap();

        assert_eq!(
            String::from_utf8(output).unwrap(),
            "owner,balance,currency,daily_spent,monthly_spent,daily_limit,monthly_limit,active,blocked\n\
             alice,0.00,USD,0.00,0.00,500.00,5000.00,true,true\n\
             bob,123.45,USD,0.00,0.00,500.00,5000.00,true,false\n"
        );
    }

    #[test]
    fn test_write_wallets_json() {
        let now = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let wallet = Wallet::new(
            "alice",
            "EUR",
            SpendingLimits {
                daily: Decimal::from(1),
                monthly: Decimal::from(2),
            },
            now,
        );

        let mut output = Vec::new();
        write_wallets(&[wallet], ExportFormat::Json, &mut output).unwrap();

        let parsed: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(parsed[0]["ownerId"], "alice");
        assert_eq!(parsed[0]["currency"], "EUR");
    }
}
