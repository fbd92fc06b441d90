//! Replay of an operations file through the engine
//!
//! Orchestrates the command-line pipeline:
//! 1. Stream rows with [`OperationReader`]
//! 2. Apply each row to a [`LedgerEngine`] in file order
//! 3. Reconcile every wallet against its ledger
//! 4. Write the wallet report, and optionally the full ledger
//!
//! Rows are applied one after another so that results are reproducible;
//! the tokio runtime only hosts the engine's async locking. A row that fails
//! to parse or is rejected by the engine is logged and skipped.

use crate::config::LedgerConfig;
use crate::core::LedgerEngine;
use crate::io::{
    write_transactions, write_wallets, ExportFormat, OperationReader, ReplayRecord, ReplayStep,
};
use crate::types::{EntityKind, EntryType, LedgerError, Reference, RefundRequest};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

const REPLAY_ACTOR: &str = "replay";

/// Output and runtime settings of a replay
#[derive(Debug, Clone)]
pub struct ReplayOptions {
    /// Format of the wallet report and ledger export
    pub format: ExportFormat,
    /// Where to export the ledger, if anywhere
    pub transactions: Option<PathBuf>,
    /// Worker threads of the runtime
    pub workers: usize,
}

impl Default for ReplayOptions {
    fn default() -> Self {
        Self {
            format: ExportFormat::Csv,
            transactions: None,
            workers: num_cpus::get(),
        }
    }
}

/// Counts reported at the end of a replay
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ReplaySummary {
    pub applied: usize,
    pub rejected: usize,
    pub malformed: usize,
    /// Wallets whose balance disagrees with their ledger
    pub inconsistent: usize,
}

/// Replay the operations file at `input` and write the wallet report
///
/// Rate limiting is switched off: a batch replay is not interactive traffic.
///
/// # Errors
///
/// Only fatal errors: the input cannot be opened, the runtime cannot start,
/// or an output cannot be written.
pub fn run(
    input: &Path,
    config: LedgerConfig,
    options: &ReplayOptions,
    output: &mut dyn Write,
) -> Result<ReplaySummary, LedgerError> {
    let reader = OperationReader::open(input)?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(options.workers.max(1))
        .enable_time()
        .build()
        .map_err(|e| LedgerError::Io {
            message: format!("Failed to create tokio runtime: {}", e),
        })?;

    let mut config = config;
    config.rate_limit.enabled = false;
    let engine = LedgerEngine::new(config);

    runtime.block_on(async {
        let mut summary = apply_all(&engine, reader).await;

        for reconciliation in engine.reconcile_all().await? {
            if !reconciliation.consistent {
                summary.inconsistent += 1;
            }
        }

        let wallets = engine.wallets().await?;
        write_wallets(&wallets, options.format, output)?;

        if let Some(path) = &options.transactions {
            export_ledger(&engine, path, options.format)?;
        }

        info!(
            applied = summary.applied,
            rejected = summary.rejected,
            malformed = summary.malformed,
            inconsistent = summary.inconsistent,
            wallets = wallets.len(),
            "Replay finished"
        );
        Ok::<_, LedgerError>(summary)
    })
}

/// Apply every row of `reader` to `engine` in order
pub async fn apply_all<R: Read>(
    engine: &LedgerEngine,
    reader: OperationReader<R>,
) -> ReplaySummary {
    let mut summary = ReplaySummary::default();
    let mut references: HashMap<String, Reference> = HashMap::new();

    for result in reader {
        let record = match result {
            Ok(record) => record,
            Err(e) => {
                warn!(error = %e, "Skipping malformed row");
                summary.malformed += 1;
                continue;
            }
        };

        let id = record.id.clone();
        match apply(engine, record, &references).await {
            Ok(reference) => {
                debug!(row = %id, ?reference, "Row applied");
                if let Some(reference) = reference {
                    references.insert(id, reference);
                }
                summary.applied += 1;
            }
            Err(e) => {
                warn!(row = %id, code = e.code(), error = %e, "Row rejected");
                summary.rejected += 1;
            }
        }
    }

    summary
}

/// Apply one row, returning the reference later refund rows may target
async fn apply(
    engine: &LedgerEngine,
    record: ReplayRecord,
    references: &HashMap<String, Reference>,
) -> Result<Option<Reference>, LedgerError> {
    match record.step {
        ReplayStep::Execute(request) => {
            let receipt = engine.execute(request).await?;
            Ok(Some(receipt.primary().reference.clone()))
        }
        ReplayStep::Refund {
            target,
            amount,
            reason,
        } => {
            let reference = references
                .get(&target)
                .ok_or_else(|| LedgerError::not_found(EntityKind::Transaction, &target))?;
            let receipt = engine
                .refund(RefundRequest {
                    reference: reference.clone(),
                    amount,
                    reason,
                })
                .await?;
            Ok(Some(receipt.reference))
        }
        ReplayStep::Block { owner_id, reason } => {
            engine.block_wallet(&owner_id, &reason, REPLAY_ACTOR).await?;
            Ok(None)
        }
        ReplayStep::Unblock { owner_id } => {
            engine.unblock_wallet(&owner_id, REPLAY_ACTOR).await?;
            Ok(None)
        }
        ReplayStep::Adjust {
            owner_id,
            amount,
            reason,
        } => {
            let direction = if amount.is_sign_negative() {
                EntryType::Debit
            } else {
                EntryType::Credit
            };
            let receipt = engine
                .adjust_balance(&owner_id, direction, amount.abs(), &reason, REPLAY_ACTOR)
                .await?;
            Ok(Some(receipt.reference))
        }
    }
}

fn export_ledger(
    engine: &LedgerEngine,
    path: &Path,
    format: ExportFormat,
) -> Result<(), LedgerError> {
    let file = File::create(path).map_err(|e| LedgerError::Io {
        message: format!("Failed to create file '{}': {}", path.display(), e),
    })?;
    let mut writer = BufWriter::new(file);
    let entries = engine.entries(None);

    write_transactions(&entries, format, &mut writer)?;
    writer.flush()?;
    info!(path = %path.display(), entries = entries.len(), "Ledger exported");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal::Decimal;
    use std::io::Write;
    use tempfile::NamedTempFile;

    const HEADER: &str = "op,id,owner,counterparty,amount,target,external_id,method,description,service_id,service_type,provider_id\n";

    fn create_temp_csv(content: &str) -> NamedTempFile {
        let mut file = NamedTempFile::new().expect("Failed to create temp file");
        file.write_all(content.as_bytes())
            .expect("Failed to write to temp file");
        file.flush().expect("Failed to flush temp file");
        file
    }

    fn options() -> ReplayOptions {
        ReplayOptions {
            workers: 2,
            ..ReplayOptions::default()
        }
    }

    #[tokio::test]
    async fn test_apply_all_resolves_refund_targets() {
        let engine = LedgerEngine::new(LedgerConfig::default());
        let content = format!(
            "{}credit,c1,alice,,100,,,,,,,\n\
             debit,d1,alice,,40,,,,consultation,,,\n\
             refund,r1,alice,,15,d1,,,partial,,,\n\
             refund,r2,alice,,5,missing,,,,,,\n",
            HEADER
        );

        let summary = apply_all(&engine, OperationReader::from_reader(content.as_bytes())).await;

        assert_eq!(summary.applied, 3);
        assert_eq!(summary.rejected, 1);
        assert_eq!(
            engine.wallet("alice").await.unwrap().balance,
            Decimal::from(75)
        );
    }

    #[tokio::test]
    async fn test_apply_all_counts_malformed_rows() {
        let engine = LedgerEngine::new(LedgerConfig::default());
        let content = format!(
            "{}credit,c1,alice,,abc,,,,,,,\n\
             explode,x1,alice,,1,,,,,,,\n\
             block,b1,alice,,,,,,fraud review,,,\n",
            HEADER
        );

        let summary = apply_all(&engine, OperationReader::from_reader(content.as_bytes())).await;

        assert_eq!(summary.malformed, 2);
        // block of an owner without a wallet
        assert_eq!(summary.rejected, 1);
        assert_eq!(summary.applied, 0);
    }

    #[test]
    fn test_run_writes_report_and_export() {
        let input = create_temp_csv(&format!(
            "{}credit,c1,alice,,100,,pay_1,upi,,,,\n\
             credit,c2,bob,,10,,,,,,,\n\
             transfer,t1,alice,bob,30,,,,gift,,,\n\
             credit,c3,alice,,100,,pay_1,upi,,,,\n",
            HEADER
        ));
        let export = NamedTempFile::new().unwrap();
        let options = ReplayOptions {
            transactions: Some(export.path().to_path_buf()),
            ..options()
        };

        let mut output = Vec::new();
        let summary = run(input.path(), LedgerConfig::default(), &options, &mut output).unwrap();

        assert_eq!(summary.applied, 4);
        assert_eq!(summary.inconsistent, 0);

        let report = String::from_utf8(output).unwrap();
        assert!(report.contains("alice,70.00,USD,30.00,30.00"));
        assert!(report.contains("bob,40.00,USD,0.00,0.00"));

        let exported = std::fs::read_to_string(export.path()).unwrap();
        // two credits, one replayed credit absent, two transfer legs
        assert_eq!(exported.lines().count(), 1 + 4);
    }

    #[test]
    fn test_run_fails_on_missing_input() {
        let mut output = Vec::new();
        let err = run(
            Path::new("does-not-exist.csv"),
            LedgerConfig::default(),
            &options(),
            &mut output,
        )
        .unwrap_err();

        assert_eq!(err.code(), "IO_ERROR");
        assert!(output.is_empty());
    }
}
