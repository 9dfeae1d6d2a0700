//! Change fingerprints for candidate images.
//!
//! A fingerprint is the cheap proxy the cache compares to decide whether a
//! file needs optimizing again. Two strategies exist:
//!
//! - **`mtime`** (default): the file's last modification time at whatever
//!   resolution the filesystem records. Reading it costs one `stat` call and
//!   never touches file contents. It is fooled by clock skew and by copies
//!   that preserve (or reset) modification times.
//! - **`sha256`**: SHA-256 of the file contents. Survives `git checkout` and
//!   `cp -p`, at the price of reading every candidate on every run.
//!
//! Fingerprints produced by different strategies never compare equal, so
//! switching strategy in the config re-optimizes each file exactly once.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

const NANOS_PER_SEC: u32 = 1_000_000_000;

/// How a file's fingerprint is computed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FingerprintStrategy {
    #[default]
    Mtime,
    Sha256,
}

/// Last observed state of a tracked file.
///
/// Serialized into the cache document as a small tagged object, e.g.
/// `{"kind": "mtime", "secs": 1700000000, "nanos": 120000000}`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum Fingerprint {
    /// Modification time as seconds (signed, so pre-epoch times survive)
    /// plus a non-negative nanosecond remainder.
    Mtime { secs: i64, nanos: u32 },
    /// Hex-encoded SHA-256 of the file contents.
    Sha256 { digest: String },
}

impl Fingerprint {
    /// Build an mtime fingerprint from a [`SystemTime`].
    ///
    /// Times before the epoch are floored so that `nanos` is always in
    /// `0..1_000_000_000`.
    pub fn from_system_time(time: SystemTime) -> Self {
        match time.duration_since(UNIX_EPOCH) {
            Ok(d) => Fingerprint::Mtime {
                secs: d.as_secs() as i64,
                nanos: d.subsec_nanos(),
            },
            Err(before) => {
                let d = before.duration();
                let mut secs = -(d.as_secs() as i64);
                let mut nanos = d.subsec_nanos();
                if nanos > 0 {
                    secs -= 1;
                    nanos = NANOS_PER_SEC - nanos;
                }
                Fingerprint::Mtime { secs, nanos }
            }
        }
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Fingerprint::Mtime { secs, nanos } => write!(f, "mtime {}.{:09}", secs, nanos),
            Fingerprint::Sha256 { digest } => write!(f, "sha256 {}", digest),
        }
    }
}

/// Read the current fingerprint of `path` using `strategy`.
pub fn compute(path: &Path, strategy: FingerprintStrategy) -> io::Result<Fingerprint> {
    match strategy {
        FingerprintStrategy::Mtime => {
            let modified = std::fs::metadata(path)?.modified()?;
            Ok(Fingerprint::from_system_time(modified))
        }
        FingerprintStrategy::Sha256 => Ok(Fingerprint::Sha256 {
            digest: hash_file(path)?,
        }),
    }
}

/// SHA-256 hash of a file's contents, returned as a hex string.
pub fn hash_file(path: &Path) -> io::Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(format!("{:x}", hasher.finalize()))
}
