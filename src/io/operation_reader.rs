//! Streaming reader over an operations file
//!
//! Yields one [`ReplayRecord`] per CSV row, delegating the row format to
//! the `csv_format` module. Rows are read one at a time; the file is never
//! loaded into memory as a whole.
//!
//! # Error Handling
//!
//! - Fatal errors (file not found, I/O errors) are returned from `open()`
//! - Malformed rows are yielded as `Err(LedgerError::Parse)` carrying the
//!   line number, and iteration continues with the next row
//!
//! ```no_run
//! use wallet_ledger::io::OperationReader;
//! use std::path::Path;
//!
//! let reader = OperationReader::open(Path::new("operations.csv")).unwrap();
//! for result in reader {
//!     match result {
//!         Ok(record) => println!("Replaying {}", record.id),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! ```

use crate::io::csv_format::{convert_operation, CsvOperation, ReplayRecord};
use crate::types::LedgerError;
use csv::{ReaderBuilder, Trim};
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Iterator over the rows of an operations file
#[derive(Debug)]
pub struct OperationReader<R> {
    reader: csv::Reader<R>,
    line_num: u64,
}

impl OperationReader<File> {
    /// Open an operations file
    ///
    /// The CSV reader trims whitespace from all fields, accepts rows with
    /// trailing columns omitted and uses an 8KB buffer.
    pub fn open(path: &Path) -> Result<Self, LedgerError> {
        let file = File::open(path).map_err(|e| LedgerError::Io {
            message: format!("Failed to open file '{}': {}", path.display(), e),
        })?;

        Ok(Self::from_reader(file))
    }
}

impl<R: Read> OperationReader<R> {
    pub fn from_reader(source: R) -> Self {
        let reader = ReaderBuilder::new()
            .trim(Trim::All)
            .flexible(true)
            .buffer_capacity(8 * 1024)
            .from_reader(source);

        Self {
            reader,
            line_num: 1,
        }
    }
}

impl<R: Read> Iterator for OperationReader<R> {
    type Item = Result<ReplayRecord, LedgerError>;

    fn next(&mut self) -> Option<Self::Item> {
        let mut deserializer = self.reader.deserialize::<CsvOperation>();
        let row = deserializer.next()?;
        self.line_num += 1;
        let line = self.line_num;

        Some(match row {
            Ok(operation) => convert_operation(operation).map_err(|message| LedgerError::Parse {
                line: Some(line),
                message,
            }),
            Err(e) => Err(LedgerError::Parse {
                line: Some(line),
                message: e.to_string(),
            }),
        })
    }
}
