//! I/O module
//!
//! Handles the CSV and JSON boundary of the command-line replay.
//!
//! # Components
//!
//! - `csv_format` - Operation rows, their conversion to replay steps, wallet reports
//! - `operation_reader` - Streaming iterator over an operations file
//! - `export` - Ledger export as CSV or JSON

pub mod csv_format;
pub mod export;
pub mod operation_reader;

pub use csv_format::{
    convert_operation, write_wallets, write_wallets_csv, CsvOperation, ReplayRecord, ReplayStep,
};
pub use export::{write_transactions, ExportFormat};
pub use operation_reader::OperationReader;
