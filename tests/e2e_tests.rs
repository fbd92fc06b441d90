//! End-to-end integration tests
//!
//! These tests validate the complete replay pipeline using predefined CSV
//! fixtures. Each test:
//! 1. Parses command-line arguments the way the binary does
//! 2. Replays tests/fixtures/{name}/input.csv through the engine
//! 3. Compares the wallet report with tests/fixtures/{name}/expected.csv
//!
//! Fixtures cover:
//! - Happy path credits, debits and transfers
//! - Daily spending limits
//! - Partial, exact and ineligible refunds
//! - Idempotent credits per external payment id, then an operator adjustment
//! - Blocked wallets on either side of a transfer
//! - Malformed and invalid rows

#[cfg(test)]
mod tests {
    use clap::Parser;
    use rstest::rstest;
    use std::fs;
    use std::io::Write;
    use std::path::Path;
    use tempfile::NamedTempFile;
    use wallet_ledger::cli::CliArgs;
    use wallet_ledger::config::LedgerConfig;
    use wallet_ledger::replay;

    /// Replay a fixture with extra command-line flags and compare the report
    fn run_test_fixture(fixture_name: &str, flags: &[&str]) {
        let fixture_dir = format!("tests/fixtures/{}", fixture_name);
        let input_path = format!("{}/input.csv", fixture_dir);
        let expected_path = format!("{}/expected.csv", fixture_dir);

        assert!(
            Path::new(&input_path).exists(),
            "Input file not found: {}",
            input_path
        );
        assert!(
            Path::new(&expected_path).exists(),
            "Expected file not found: {}",
            expected_path
        );

        let mut argv = vec!["wallet-ledger"];
        argv.extend_from_slice(flags);
        argv.push(&input_path);
        let args = CliArgs::try_parse_from(argv).expect("Invalid test arguments");

        let mut temp_output = NamedTempFile::new().expect("Failed to create temp file");
        replay::run(
            &args.input_file,
            args.to_config(LedgerConfig::default()),
            &args.to_replay_options(),
            &mut temp_output,
        )
        .unwrap_or_else(|e| panic!("Failed to replay operations: {}", e));
        temp_output.flush().expect("Failed to flush temp file");

        let actual_output = fs::read_to_string(temp_output.path())
            .unwrap_or_else(|e| panic!("Failed to read temp output file: {}", e));
        let expected_output = fs::read_to_string(&expected_path)
            .unwrap_or_else(|e| panic!("Failed to read expected file {}: {}", expected_path, e));

        assert_eq!(
            actual_output, expected_output,
            "\n\nOutput mismatch for fixture: {} (flags: {:?})\n\nActual output:\n{}\n\nExpected output:\n{}\n",
            fixture_name, flags, actual_output, expected_output
        );
    }

    #[rstest]
    #[case("happy_path", &[])]
    #[case("spending_limits", &["--daily-limit", "500"])]
    #[case("refunds", &[])]
    #[case("idempotent_credits", &[])]
    #[case("blocked_wallet", &[])]
    #[case("malformed_data", &[])]
    fn test_fixtures(
        #[case] fixture: &str,
        #[case] flags: &[&str],
        #[values("1", "4")] workers: &str,
    ) {
        let mut flags = flags.to_vec();
        flags.extend_from_slice(&["--workers", workers]);
        run_test_fixture(fixture, &flags);
    }

    #[test]
    fn test_json_report_and_ledger_export() {
        let export = NamedTempFile::new().expect("Failed to create temp file");
        let export_path = export.path().to_string_lossy().to_string();
        let args = CliArgs::try_parse_from([
            "wallet-ledger",
            "--format",
            "json",
            "--transactions",
            &export_path,
            "tests/fixtures/happy_path/input.csv",
        ])
        .unwrap();

        let mut output = Vec::new();
        let summary = replay::run(
            &args.input_file,
            args.to_config(LedgerConfig::default()),
            &args.to_replay_options(),
            &mut output,
        )
        .unwrap();
        assert_eq!(summary.applied, 4);

        let wallets: serde_json::Value = serde_json::from_slice(&output).unwrap();
        assert_eq!(wallets[0]["ownerId"], "alice");
        assert_eq!(wallets[1]["ownerId"], "bob");

        let ledger: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(export.path()).unwrap()).unwrap();
        let entries = ledger.as_array().unwrap();
        // two top-ups, one service payment, two transfer legs
        assert_eq!(entries.len(), 5);
        assert!(entries
            .iter()
            .all(|e| e["reference"].as_str().is_some_and(|r| r.len() == 17)));
    }
}
