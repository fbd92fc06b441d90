//! Ledger reference generation and parsing
//!
//! A reference is `<PREFIX><6 digits><8 hex>`: a three-letter prefix naming
//! the kind of entry, the last six digits of the epoch-millisecond timestamp,
//! and 32 random bits in uppercase hex, e.g. `SRV4821930F3A9C21B`.
//!
//! | kind    | prefix |
//! |---------|--------|
//! | credit  | TXN    |
//! | debit   | SRV    |
//! | payment | PAY    |
//! | refund  | RFD    |
//! | other   | REF    |
//!
//! Uniqueness is enforced by the ledger's reference index. The generator only
//! retries a bounded number of times when a candidate is already taken.

use crate::types::LedgerError;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::debug;

const PREFIX_LEN: usize = 3;
const TIMESTAMP_LEN: usize = 6;

/// Shortest string that can hold a prefix and a timestamp fragment
pub const MIN_REFERENCE_LEN: usize = PREFIX_LEN + TIMESTAMP_LEN;

/// Kind of ledger entry a reference identifies
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReferenceKind {
    Credit,
    Debit,
    Payment,
    Refund,
    Other,
}

impl ReferenceKind {
    pub fn prefix(&self) -> &'static str {
        match self {
            ReferenceKind::Credit => "TXN",
            ReferenceKind::Debit => "SRV",
            ReferenceKind::Payment => "PAY",
            ReferenceKind::Refund => "RFD",
            ReferenceKind::Other => "REF",
        }
    }

    pub fn from_prefix(prefix: &str) -> Option<Self> {
        match prefix {
            "TXN" => Some(ReferenceKind::Credit),
            "SRV" => Some(ReferenceKind::Debit),
            "PAY" => Some(ReferenceKind::Payment),
            "RFD" => Some(ReferenceKind::Refund),
            "REF" => Some(ReferenceKind::Other),
            _ => None,
        }
    }
}

impl fmt::Display for ReferenceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ReferenceKind::Credit => "credit",
            ReferenceKind::Debit => "debit",
            ReferenceKind::Payment => "payment",
            ReferenceKind::Refund => "refund",
            ReferenceKind::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Components of a parsed reference
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedReference {
    pub kind: ReferenceKind,
    /// Last six digits of the creation timestamp in milliseconds
    pub timestamp_fragment: String,
    /// Random suffix
    pub random_fragment: String,
}

/// Generate a fresh reference for the given kind
pub fn generate_reference(kind: ReferenceKind) -> String {
    let millis = Utc::now().timestamp_millis().rem_euclid(1_000_000);
    let random: u32 = rand::random();
    format!("{}{:06}{:08X}", kind.prefix(), millis, random)
}

/// Split a reference into its components
///
/// # Errors
///
/// `LedgerError::InvalidReferenceFormat` if the string is shorter than
/// nine characters or the prefix is not one of the known prefixes.
pub fn parse_reference(reference: &str) -> Result<ParsedReference, LedgerError> {
    if reference.len() < MIN_REFERENCE_LEN {
        return Err(LedgerError::invalid_reference(reference, "too short"));
    }

    let prefix = reference
        .get(..PREFIX_LEN)
        .ok_or_else(|| LedgerError::invalid_reference(reference, "unreadable prefix"))?;
    let kind = ReferenceKind::from_prefix(prefix)
        .ok_or_else(|| LedgerError::invalid_reference(reference, "unknown prefix"))?;

    let timestamp_fragment = reference
        .get(PREFIX_LEN..MIN_REFERENCE_LEN)
        .ok_or_else(|| LedgerError::invalid_reference(reference, "unreadable timestamp"))?;
    let random_fragment = reference
        .get(MIN_REFERENCE_LEN..)
        .ok_or_else(|| LedgerError::invalid_reference(reference, "unreadable suffix"))?;

    Ok(ParsedReference {
        kind,
        timestamp_fragment: timestamp_fragment.to_string(),
        random_fragment: random_fragment.to_string(),
    })
}

/// Bounded generate-check-retry loop over [`generate_reference`]
#[derive(Debug, Clone, Copy)]
pub struct ReferenceGenerator {
    max_attempts: u32,
}

impl ReferenceGenerator {
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
        }
    }

    /// Generate a reference for which `is_taken` returns false
    ///
    /// # Errors
    ///
    /// `LedgerError::DuplicateReference` with the last candidate if every
    /// attempt collided.
    pub fn generate_unique<F>(
        &self,
        kind: ReferenceKind,
        is_taken: F,
    ) -> Result<String, LedgerError>
    where
        F: Fn(&str) -> bool,
    {
        self.generate_unique_with(kind, generate_reference, is_taken)
    }

    /// Same as [`generate_unique`](Self::generate_unique) with a custom source
    pub fn generate_unique_with<G, F>(
        &self,
        kind: ReferenceKind,
        mut source: G,
        is_taken: F,
    ) -> Result<String, LedgerError>
    where
        G: FnMut(ReferenceKind) -> String,
        F: Fn(&str) -> bool,
    {
        let mut candidate = source(kind);
        for attempt in 1..=self.max_attempts {
            if !is_taken(&candidate) {
                return Ok(candidate);
            }
            debug!(attempt, reference = %candidate, "Reference collision, regenerating");
            if attempt < self.max_attempts {
                candidate = source(kind);
            }
        }
        Err(LedgerError::DuplicateReference {
            reference: candidate,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn is_well_formed(reference: &str, prefix: &str) -> bool {
        reference.len() == 17
            && reference.starts_with(prefix)
            && reference[3..9].chars().all(|c| c.is_ascii_digit())
            && reference[9..]
                .chars()
                .all(|c| c.is_ascii_digit() || ('A'..='F').contains(&c))
    }

    #[rstest]
    #[case(ReferenceKind::Credit, "TXN")]
    #[case(ReferenceKind::Debit, "SRV")]
    #[case(ReferenceKind::Payment, "PAY")]
    #[case(ReferenceKind::Refund, "RFD")]
    #[case(ReferenceKind::Other, "REF")]
    fn test_generate_reference_format(#[case] kind: ReferenceKind, #[case] prefix: &str) {
        let reference = generate_reference(kind);
        assert!(is_well_formed(&reference, prefix), "bad reference {}", reference);
    }

    #[rstest]
    #[case(ReferenceKind::Credit)]
    #[case(ReferenceKind::Debit)]
    #[case(ReferenceKind::Refund)]
    fn test_parse_generated_reference(#[case] kind: ReferenceKind) {
        let reference = generate_reference(kind);
        let parsed = parse_reference(&reference).unwrap();

        assert_eq!(parsed.kind, kind);
        assert_eq!(parsed.timestamp_fragment.len(), 6);
        assert_eq!(parsed.random_fragment.len(), 8);
    }

    #[rstest]
    #[case::too_short("SRV1234")]
    #[case::empty("")]
    #[case::unknown_prefix("ABC123456DEADBEEF")]
    #[case::lowercase_prefix("srv123456DEADBEEF")]
    fn test_parse_rejects_malformed(#[case] reference: &str) {
        let err = parse_reference(reference).unwrap_err();
        assert_eq!(err.code(), "INVALID_REFERENCE_FORMAT");
    }

    #[test]
    fn test_generator_retries_on_collision() {
        let generator = ReferenceGenerator::new(3);
        let mut candidates = vec!["SRV000001AAAAAAAA", "SRV000001AAAAAAAA", "SRV000002BBBBBBBB"]
            .into_iter()
            .map(String::from);

        let reference = generator
            .generate_unique_with(
                ReferenceKind::Debit,
                |_| candidates.next().unwrap(),
                |r| r == "SRV000001AAAAAAAA",
            )
            .unwrap();

        assert_eq!(reference, "SRV000002BBBBBBBB");
    }

    #[test]
    fn test_generator_gives_up_after_max_attempts() {
        let generator = ReferenceGenerator::new(2);
        let mut calls = 0;

        let err = generator
            .generate_unique_with(
                ReferenceKind::Debit,
                |_| {
                    calls += 1;
                    "SRV000001AAAAAAAA".to_string()
                },
                |_| true,
            )
            .unwrap_err();

        assert!(matches!(err, LedgerError::DuplicateReference { .. }));
        assert_eq!(calls, 2);
    }
}
