//! Hash Chain Primitives
//!
//! Each record stores the hash of its predecessor and its own hash over a
//! canonical `key:value|...` string, making edits to past records detectable.

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Previous-hash value for the first record of a chain.
pub const GENESIS_HASH: &str =
    "sha256:0000000000000000000000000000000000000000000000000000000000000000";

/// SHA256 of `bytes` rendered as `sha256:<hex>`.
pub fn sha256_prefixed(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("sha256:{}", hex::encode(hasher.finalize()))
}

/// Raw 32-byte digest behind a `sha256:<hex>` string.
pub fn digest_bytes(prefixed: &str) -> Option<[u8; 32]> {
    let hex_part = prefixed.strip_prefix("sha256:")?;
    let bytes = hex::decode(hex_part).ok()?;
    bytes.try_into().ok()
}

/// Build the canonical string hashed for a chain record.
pub fn canonical_string(fields: &[(&str, String)]) -> String {
    fields
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join("|")
}

/// Result of walking a chain from its first record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChainVerification {
    pub entries: usize,
    pub valid: bool,
    /// Zero-based index of the first record that fails verification.
    pub broken_at: Option<usize>,
    pub error_message: Option<String>,
}

impl ChainVerification {
    pub fn valid(entries: usize) -> Self {
        Self {
            entries,
            valid: true,
            broken_at: None,
            error_message: None,
        }
    }

    pub fn broken(entries: usize, index: usize, message: String) -> Self {
        Self {
            entries,
            valid: false,
            broken_at: Some(index),
            error_message: Some(message),
        }
    }
}

/// Anything that can sit in a hash chain.
pub trait ChainLink {
    fn previous_hash(&self) -> &str;
    fn record_hash(&self) -> &str;
    fn calculate_hash(&self) -> String;
}

/// Verify every record's own hash and its link to the predecessor.
pub fn verify_links<T: ChainLink>(records: &[T]) -> ChainVerification {
    let mut expected_previous = GENESIS_HASH.to_string();

    for (i, record) in records.iter().enumerate() {
        if record.previous_hash() != expected_previous {
            return ChainVerification::broken(
                records.len(),
                i,
                format!(
                    "Hash chain broken at entry {}: expected {}, got {}",
                    i,
                    expected_previous,
                    record.previous_hash()
                ),
            );
        }

        let calculated = record.calculate_hash();
        if calculated != record.record_hash() {
            return ChainVerification::broken(
                records.len(),
                i,
                format!("Invalid hash in entry {}", i),
            );
        }

        expected_previous = record.record_hash().to_string();
    }

    ChainVerification::valid(records.len())
}
