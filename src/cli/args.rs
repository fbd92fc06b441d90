use crate::config::LedgerConfig;
use crate::io::ExportFormat;
use crate::replay::ReplayOptions;
use clap::Parser;
use rust_decimal::Decimal;
use std::path::PathBuf;

/// Replay wallet operations and report the resulting wallet states
#[derive(Parser, Debug)]
#[command(name = "wallet-ledger")]
#[command(about = "Replay wallet operations through the ledger engine", long_about = None)]
pub struct CliArgs {
    /// Input CSV file path containing ledger operations
    #[arg(value_name = "INPUT", help = "Path to the input CSV file")]
    pub input_file: PathBuf,

    /// Format of the wallet report and ledger export
    #[arg(long = "format", value_name = "FORMAT", default_value = "csv")]
    pub format: ExportFormat,

    /// Export the full ledger to this file
    #[arg(long = "transactions", value_name = "PATH")]
    pub transactions: Option<PathBuf>,

    /// Daily limit of newly created wallets
    #[arg(long = "daily-limit", value_name = "AMOUNT")]
    pub daily_limit: Option<Decimal>,

    /// Monthly limit of newly created wallets
    #[arg(long = "monthly-limit", value_name = "AMOUNT")]
    pub monthly_limit: Option<Decimal>,

    /// Days after which a debit can no longer be refunded
    #[arg(long = "refund-window-days", value_name = "DAYS")]
    pub refund_window_days: Option<i64>,

    /// Worker threads of the runtime
    #[arg(
        long = "workers",
        value_name = "COUNT",
        help = "Number of runtime worker threads (default: CPU cores)"
    )]
    pub workers: Option<usize>,
}

impl CliArgs {
    /// Apply the command-line overrides on top of `base`
    ///
    /// The result is normalized, so invalid overrides fall back to defaults
    /// with a warning.
    pub fn to_config(&self, base: LedgerConfig) -> LedgerConfig {
        let mut config = base;
        if let Some(daily) = self.daily_limit {
            config.default_limits.daily = daily;
        }
        if let Some(monthly) = self.monthly_limit {
            config.default_limits.monthly = monthly;
        }
        if let Some(days) = self.refund_window_days {
            config.refund_window_days = days;
        }
        config.normalized()
    }

    /// Output and runtime settings, zero workers meaning the default
    pub fn to_replay_options(&self) -> ReplayOptions {
        let default = ReplayOptions::default();
        ReplayOptions {
            format: self.format,
            transactions: self.transactions.clone(),
            workers: self
                .workers
                .filter(|&workers| workers > 0)
                .unwrap_or(default.workers),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::default_format(&["program", "input.csv"], ExportFormat::Csv)]
    #[case::explicit_csv(&["program", "--format", "csv", "input.csv"], ExportFormat::Csv)]
    #[case::explicit_json(&["program", "--format", "json", "input.csv"], ExportFormat::Json)]
    fn test_format_parsing(#[case] args: &[&str], #[case] expected: ExportFormat) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        assert_eq!(parsed.format, expected);
    }

    #[rstest]
    #[case::no_overrides(&["program", "input.csv"], Decimal::new(10_000_00, 2), Decimal::new(100_000_00, 2), 30)]
    #[case::daily_only(&["program", "--daily-limit", "500", "input.csv"], Decimal::from(500), Decimal::new(100_000_00, 2), 30)]
    #[case::all_overrides(
        &["program", "--daily-limit", "500", "--monthly-limit", "2000.50", "--refund-window-days", "7", "input.csv"],
        Decimal::from(500),
        Decimal::new(200050, 2),
        7
    )]
    // monthly below daily is rejected as a pair
    #[case::inconsistent_limits(
        &["program", "--daily-limit", "500", "--monthly-limit", "100", "input.csv"],
        Decimal::new(10_000_00, 2),
        Decimal::new(100_000_00, 2),
        30
    )]
    #[case::zero_refund_window(&["program", "--refund-window-days", "0", "input.csv"], Decimal::new(10_000_00, 2), Decimal::new(100_000_00, 2), 30)]
    fn test_config_overrides(
        #[case] args: &[&str],
        #[case] daily: Decimal,
        #[case] monthly: Decimal,
        #[case] refund_window_days: i64,
    ) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let config = parsed.to_config(LedgerConfig::default());

        assert_eq!(config.default_limits.daily, daily);
        assert_eq!(config.default_limits.monthly, monthly);
        assert_eq!(config.refund_window_days, refund_window_days);
    }

    #[rstest]
    #[case::default_workers(&["program", "input.csv"], num_cpus::get())]
    #[case::custom_workers(&["program", "--workers", "3", "input.csv"], 3)]
    #[case::zero_workers(&["program", "--workers", "0", "input.csv"], num_cpus::get())]
    fn test_replay_options(#[case] args: &[&str], #[case] workers: usize) {
        let parsed = CliArgs::try_parse_from(args).unwrap();
        let options = parsed.to_replay_options();

        assert_eq!(options.workers, workers);
        assert!(options.transactions.is_none());
    }

    #[test]
    fn test_transactions_path() {
        let parsed =
            CliArgs::try_parse_from(["program", "--transactions", "ledger.csv", "input.csv"])
                .unwrap();
        assert_eq!(
            parsed.to_replay_options().transactions,
            Some(PathBuf::from("ledger.csv"))
        );
    }

    #[rstest]
    #[case::missing_input(&["program"])]
    #[case::invalid_format(&["program", "--format", "xml", "input.csv"])]
    #[case::invalid_limit(&["program", "--daily-limit", "lots", "input.csv"])]
    fn test_parsing_errors(#[case] args: &[&str]) {
        let result = CliArgs::try_parse_from(args);
        assert!(result.is_err());
    }
}
