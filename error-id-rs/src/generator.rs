//! # Error ID Generation
//!
//! Produces short, support-friendly identifiers of the form
//! `PREFIX-YYYYMMDD-RANDOM`, e.g. `ERR-20261016-a3f91c`.
//!
//! The date segment makes IDs sortable by day and lets support staff narrow a
//! log search immediately. The random segment is drawn from the operating
//! system's CSPRNG; if that source is unavailable the generator falls back to
//! the nanosecond clock so generation never blocks or fails.

use std::time::{SystemTime, UNIX_EPOCH};

use chrono::Utc;
use rand::rngs::OsRng;
use rand::RngCore;

/// Prefix used by the default generator
pub const DEFAULT_PREFIX: &str = "ERR";

/// Number of random bytes in the default generator (hex-encoded to 6 chars)
pub const DEFAULT_RANDOM_BYTES: usize = 3;

const MIN_RANDOM_BYTES: usize = 3;
const MAX_RANDOM_BYTES: usize = 16;

/// Source of error identifiers.
///
/// Implementations must never fail and must be callable concurrently without
/// external locking.
pub trait IdGenerator: Send + Sync {
    /// Produces a new identifier
    fn generate(&self) -> String;
}

impl<F> IdGenerator for F
where
    F: Fn() -> String + Send + Sync,
{
    fn generate(&self) -> String {
        self()
    }
}

/// The stock `PREFIX-YYYYMMDD-HEX` generator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DefaultIdGenerator {
    prefix: String,
    random_bytes: usize,
}

impl Default for DefaultIdGenerator {
    fn default() -> Self {
        Self {
            prefix: DEFAULT_PREFIX.to_string(),
            random_bytes: DEFAULT_RANDOM_BYTES,
        }
    }
}

impl DefaultIdGenerator {
    /// Creates a generator with a custom prefix and random segment size.
    ///
    /// `random_bytes` is clamped to `3..=16`; the random segment is always
    /// `2 * random_bytes` lowercase hex characters.
    ///
    /// IDs always have exactly three dash-separated segments, so a prefix
    /// that is empty or contains `-` is replaced by [`DEFAULT_PREFIX`].
    pub fn new<S: Into<String>>(prefix: S, random_bytes: usize) -> Self {
        let prefix = prefix.into();
        let prefix = if is_valid_prefix(&prefix) {
            prefix
        } else {
            tracing::warn!(
                prefix = %prefix,
                fallback = DEFAULT_PREFIX,
                "Invalid error ID prefix, using default"
            );
            DEFAULT_PREFIX.to_string()
        };

        Self {
            prefix,
            random_bytes: random_bytes.clamp(MIN_RANDOM_BYTES, MAX_RANDOM_BYTES),
        }
    }

    /// The configured prefix
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// The configured number of random bytes
    pub fn random_bytes(&self) -> usize {
        self.random_bytes
    }

    fn random_segment(&self) -> String {
        let mut buf = vec![0u8; self.random_bytes];
        match OsRng.try_fill_bytes(&mut buf) {
            Ok(()) => encode_hex(&buf),
            Err(e) => {
                tracing::debug!(error = %e, "OS randomness unavailable, using clock fallback");
                self.clock_segment()
            }
        }
    }

    fn clock_segment(&self) -> String {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos())
            .unwrap_or_default();
        let bits = 8 * self.random_bytes as u32;
        let masked = if bits >= 128 { nanos } else { nanos & ((1u128 << bits) - 1) };
        format!("{:0width$x}", masked, width = 2 * self.random_bytes)
    }
}

impl IdGenerator for DefaultIdGenerator {
    fn generate(&self) -> String {
        let date = Utc::now().format("%Y%m%d");
        format!("{}-{}-{}", self.prefix, date, self.random_segment())
    }
}

/// Generates an ID with the default prefix and size
pub fn generate_error_id() -> String {
    DefaultIdGenerator::default().generate()
}

fn is_valid_prefix(prefix: &str) -> bool {
    !prefix.trim().is_empty() && !prefix.contains('-')
}

fn encode_hex(bytes: &[u8]) -> String {
    use std::fmt::Write;

    bytes.iter().fold(String::with_capacity(bytes.len() * 2), |mut out, b| {
        let _ = write!(out, "{:02x}", b);
        out
    })
}
