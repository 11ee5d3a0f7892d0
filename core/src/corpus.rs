//! Synthetic corpus: random fixed-length hex identifiers and the seed records
//! built around them.
//!
//! Values come from a CSPRNG seeded by the operating system, so keys are
//! spread uniformly over the index.

use crate::constants::{HASH_BYTES, HASH_HEX_LEN, SEED_STATUS};
use anyhow::Context;
use chrono::{DateTime, Utc};
use rand::rngs::{OsRng, StdRng};
use rand::{CryptoRng, RngCore, SeedableRng};
use serde_json::Value;

const HEX_DIGITS: &[u8; 16] = b"0123456789abcdef";

/// One row / document to be written by a seeding run.
///
/// The same hash is stored in every hash-bearing column (or in both the
/// keyword and the text field) so that each lookup strategy can find the
/// record by the identical value.
#[derive(Debug, Clone, PartialEq)]
pub struct SeedRecord {
    pub hash: String,
    pub created_at: DateTime<Utc>,
    pub status: i32,
    pub metadata: Value,
}

impl SeedRecord {
    pub fn new(hash: String, created_at: DateTime<Utc>) -> Self {
        Self {
            hash,
            created_at,
            status: SEED_STATUS,
            metadata: Value::Object(Default::default()),
        }
    }
}

/// Produces 64-character lowercase hex strings from 32 random bytes.
pub struct CorpusGenerator<R = StdRng> {
    rng: R,
}

impl CorpusGenerator<StdRng> {
    /// Seeds a generator from the OS entropy source.
    ///
    /// Failing here means the host has no usable secure random source, which
    /// callers treat as a fatal startup error.
    pub fn new() -> anyhow::Result<Self> {
        let rng = StdRng::from_rng(OsRng).context("Failed to seed from the OS entropy source")?;
        Ok(Self { rng })
    }
}

impl<R: RngCore + CryptoRng> CorpusGenerator<R> {
    pub fn with_rng(rng: R) -> Self {
        Self { rng }
    }

    pub fn generate(&mut self) -> String {
        let mut bytes = [0u8; HASH_BYTES];
        self.rng.fill_bytes(&mut bytes);
        encode_hex(&bytes)
    }

    /// Generates `size` fresh records stamped with the current time.
    pub fn generate_batch(&mut self, size: usize) -> Vec<SeedRecord> {
        (0..size)
            .map(|_| SeedRecord::new(self.generate(), Utc::now()))
            .collect()
    }
}

pub fn encode_hex(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(bytes.len() * 2);
    for &b in bytes {
        out.push(HEX_DIGITS[(b >> 4) as usize] as char);
        out.push(HEX_DIGITS[(b & 0x0f) as usize] as char);
    }
    out
}

/// True when `value` has the exact shape of a generated hash.
pub fn is_hash_hex(value: &str) -> bool {
    value.len() == HASH_HEX_LEN
        && value
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}
