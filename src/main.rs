//! Wallet ledger CLI
//!
//! Replays a CSV file of wallet operations through the ledger engine and
//! writes the final wallet states to stdout.
//!
//! # Usage
//!
//! ```bash
//! cargo run -- operations.csv > wallets.csv
//! cargo run -- --format json operations.csv > wallets.json
//! cargo run -- --transactions ledger.csv --daily-limit 500 operations.csv > wallets.csv
//! ```
//!
//! Logs go to stderr and are filtered with `RUST_LOG` (default `info`).
//!
//! # Exit Codes
//!
//! - 0: Success, including runs where individual rows were rejected
//! - 1: Fatal error (file not found, unwritable output, etc.)

use std::process;
use tracing::error;
use wallet_ledger::config::LedgerConfig;
use wallet_ledger::{cli, logging, replay};

fn main() {
    let args = cli::parse_args();
    logging::setup_logging();

    let config = args.to_config(LedgerConfig::from_env());
    let options = args.to_replay_options();

    let mut output = std::io::stdout().lock();
    if let Err(e) = replay::run(&args.input_file, config, &options, &mut output) {
        error!(code = e.code(), "{}", e);
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}
