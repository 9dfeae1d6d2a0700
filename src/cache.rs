//! Persisted modification-time cache for incremental optimization.
//!
//! Optimizing an image is expensive and idempotent in effect, so the
//! pipeline remembers which files it has already optimized and skips them
//! until they change. This module owns that memory.
//!
//! # Design
//!
//! The cache is a flat mapping from a **cache key** (the file's path
//! relative to the image root, `/`-separated) to the file's
//! [`Fingerprint`] as observed right after it was last optimized. A file
//! whose current fingerprint matches the stored one is skipped.
//!
//! Entries are never pruned. A key whose file has disappeared simply never
//! matches a candidate again; the cache answers "has this changed?", it is
//! not an index of what exists.
//!
//! ## Storage
//!
//! The document is pretty-printed JSON, entries sorted by key so diffs stay
//! readable when the file is committed next to the images:
//!
//! ```json
//! {
//!   "version": 1,
//!   "entries": {
//!     "icons/logo.png": { "kind": "mtime", "secs": 1700000000, "nanos": 0 }
//!   }
//! }
//! ```
//!
//! Saves rewrite the whole document through a temporary file in the same
//! directory followed by a rename, so a crash mid-save leaves the previous
//! document intact.
//!
//! ## Loading
//!
//! | Document state | Result |
//! |---|---|
//! | absent | empty store |
//! | present, other `version` | empty store (logged) |
//! | present, malformed | [`CacheError::Parse`] |
//!
//! ## Bypassing the cache
//!
//! Pass `--no-cache` to `optimize` to start from an empty store. Every file
//! is optimized again and the document is rewritten from scratch.

use crate::fingerprint::Fingerprint;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use thiserror::Error;

/// Default name of the cache document within the image root.
pub const DEFAULT_CACHE_FILENAME: &str = "image_optim_cache.json";

/// Version of the cache document format. Bump this to invalidate all
/// existing caches when the format or key computation changes.
const CACHE_VERSION: u32 = 1;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("Malformed cache document {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
    #[error("Failed to serialize cache: {0}")]
    Serialize(#[from] serde_json::Error),
}

impl CacheError {
    fn io(path: &Path, source: io::Error) -> Self {
        CacheError::Io {
            path: path.to_path_buf(),
            source,
        }
    }
}

/// In-memory mapping of cache key → last optimized fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheStore {
    version: u32,
    entries: BTreeMap<String, Fingerprint>,
}

/// Just enough of the document to decide whether the rest is ours to parse.
#[derive(Deserialize)]
struct VersionHeader {
    version: u32,
}

impl Default for CacheStore {
    fn default() -> Self {
        Self::empty()
    }
}

impl CacheStore {
    /// Create an empty store (used for `--no-cache` or first run).
    pub fn empty() -> Self {
        Self {
            version: CACHE_VERSION,
            entries: BTreeMap::new(),
        }
    }

    /// Fingerprint recorded for `key`, if any.
    pub fn get(&self, key: &str) -> Option<&Fingerprint> {
        self.entries.get(key)
    }

    /// Insert or overwrite the fingerprint for `key`.
    pub fn put(&mut self, key: impl Into<String>, fingerprint: Fingerprint) {
        self.entries.insert(key.into(), fingerprint);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Fingerprint)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Load the document at `path`.
    ///
    /// A missing document is not an error: it yields an empty store. A
    /// document written by another format version is discarded the same
    /// way. Anything else that fails to parse is reported.
    pub fn load(path: &Path) -> Result<Self, CacheError> {
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                log::debug!("no cache document at {}, starting empty", path.display());
                return Ok(Self::empty());
            }
            Err(e) => return Err(CacheError::io(path, e)),
        };

        let header: VersionHeader =
            serde_json::from_str(&content).map_err(|source| CacheError::Parse {
                path: path.to_path_buf(),
                source,
            })?;
        if header.version != CACHE_VERSION {
            log::warn!(
                "cache document {} has version {} (expected {}), ignoring it",
                path.display(),
                header.version,
                CACHE_VERSION
            );
            return Ok(Self::empty());
        }

        serde_json::from_str(&content).map_err(|source| CacheError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Write every entry to `path`, replacing whatever was there.
    ///
    /// Parent directories are created as needed. The document is written to
    /// a sibling temporary file and renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), CacheError> {
        let dir = match path.parent() {
            Some(p) if !p.as_os_str().is_empty() => p,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(dir).map_err(|e| CacheError::io(dir, e))?;

        let mut json = serde_json::to_string_pretty(self)?;
        json.push('\n');

        let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| CacheError::io(dir, e))?;
        tmp.write_all(json.as_bytes())
            .and_then(|_| tmp.as_file().sync_all())
            .map_err(|e| CacheError::io(tmp.path(), e))?;
        tmp.persist(path)
            .map_err(|e| CacheError::io(path, e.error))?;
        Ok(())
    }
}

/// Where a [`CacheStore`] is loaded from and saved to.
///
/// The scanner only talks to this trait, so it can run against an
/// in-memory store as easily as against a document on disk.
pub trait CacheStorage {
    fn load(&self) -> Result<CacheStore, CacheError>;

    fn save(&self, store: &CacheStore) -> Result<(), CacheError>;

    /// Filesystem location of the document, if there is one. The scanner
    /// never treats this path as a candidate image.
    fn location(&self) -> Option<&Path> {
        None
    }
}

/// Cache document stored as a JSON file.
#[derive(Debug, Clone)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Storage at the default document name inside `root`.
    pub fn in_root(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_CACHE_FILENAME))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl CacheStorage for FileStorage {
    fn load(&self) -> Result<CacheStore, CacheError> {
        CacheStore::load(&self.path)
    }

    fn save(&self, store: &CacheStore) -> Result<(), CacheError> {
        store.save(&self.path)
    }

    fn location(&self) -> Option<&Path> {
        Some(&self.path)
    }
}

/// Storage that keeps the last saved store in memory.
///
/// Counts saves so callers can observe checkpointing.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    saved: Mutex<Option<CacheStore>>,
    saves: AtomicUsize,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage that loads `store` until something else is saved.
    pub fn with_store(store: CacheStore) -> Self {
        Self {
            saved: Mutex::new(Some(store)),
            saves: AtomicUsize::new(0),
        }
    }

    /// Copy of the most recently saved (or seeded) store.
    pub fn snapshot(&self) -> Option<CacheStore> {
        self.saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Number of times [`CacheStorage::save`] has been called.
    pub fn save_count(&self) -> usize {
        self.saves.load(Ordering::SeqCst)
    }
}

impl CacheStorage for MemoryStorage {
    fn load(&self) -> Result<CacheStore, CacheError> {
        Ok(self.snapshot().unwrap_or_default())
    }

    fn save(&self, store: &CacheStore) -> Result<(), CacheError> {
        *self
            .saved
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(store.clone());
        self.saves.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
