//! Content fingerprints for memoization and provenance.
//!
//! - `Fingerprint`: a BLAKE3 digest rendered as 64 hex characters.
//! - `FingerprintBuilder`: incremental hashing of typed fields with length
//!   prefixes, so field boundaries cannot collide.
//! - Helpers for tables and speech records, which hash values bit-exactly
//!   (every NaN maps to one canonical pattern).

use crate::domain::{SentimentRecord, TimeSeriesTable};
use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Fingerprint(String);

impl Fingerprint {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        Self(blake3::hash(bytes).to_hex().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// First 12 hex characters, for log lines.
    pub fn short(&self) -> &str {
        &self.0[..12.min(self.0.len())]
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Default)]
pub struct FingerprintBuilder {
    hasher: blake3::Hasher,
}

impl FingerprintBuilder {
    pub fn new(domain: &str) -> Self {
        let mut b = Self::default();
        b.str(domain);
        b
    }

    pub fn str(&mut self, s: &str) -> &mut Self {
        self.hasher.update(&(s.len() as u64).to_le_bytes());
        self.hasher.update(s.as_bytes());
        self
    }

    pub fn u64(&mut self, v: u64) -> &mut Self {
        self.hasher.update(&v.to_le_bytes());
        self
    }

    pub fn f64(&mut self, v: f64) -> &mut Self {
        let bits = if v.is_nan() { f64::NAN.to_bits() } else { v.to_bits() };
        self.hasher.update(&bits.to_le_bytes());
        self
    }

    pub fn fingerprint(&mut self, fp: &Fingerprint) -> &mut Self {
        self.str(fp.as_str())
    }

    /// Hash any serializable value through its JSON form.
    pub fn json<T: Serialize>(&mut self, value: &T) -> Result<&mut Self, serde_json::Error> {
        let bytes = serde_json::to_vec(value)?;
        self.hasher.update(&(bytes.len() as u64).to_le_bytes());
        self.hasher.update(&bytes);
        Ok(self)
    }

    pub fn finish(&self) -> Fingerprint {
        Fingerprint(self.hasher.finalize().to_hex().to_string())
    }
}

/// Fingerprint of a table: dates, column names and exact values.
pub fn table_fingerprint(table: &TimeSeriesTable) -> Fingerprint {
    let mut b = FingerprintBuilder::new("table");
    b.u64(table.len() as u64);
    for d in table.dates() {
        b.str(&d.to_string());
    }
    for c in table.columns() {
        b.str(&c.name);
        for &v in &c.values {
            b.f64(v);
        }
    }
    b.finish()
}

/// Fingerprint of a speech dataset, order-sensitive.
pub fn records_fingerprint(records: &[SentimentRecord]) -> Fingerprint {
    let mut b = FingerprintBuilder::new("speeches");
    b.u64(records.len() as u64);
    for r in records {
        b.str(&r.date.to_string()).str(r.polarity.as_str()).str(&r.source);
    }
    b.finish()
}
