//! Shared test utilities.
//!
//! Builds throwaway image roots with pinned modification times so change
//! detection is deterministic.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let tmp = setup_images(&[("a.png", 100), ("b.jpg", 200)]);
//! touch_at(tmp.path(), "a.png", b"edited", 300);
//! assert_eq!(store.get("a.png"), Some(&mtime(300)));
//! ```

use crate::fingerprint::Fingerprint;
use filetime::FileTime;
use std::path::Path;
use tempfile::TempDir;

// =========================================================================
// Fixture setup
// =========================================================================

/// Write `content` to `root/rel` (creating parents) and pin its mtime.
pub fn touch_at(root: &Path, rel: &str, content: &[u8], secs: i64) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    std::fs::write(&path, content).unwrap();
    filetime::set_file_mtime(&path, FileTime::from_unix_time(secs, 0)).unwrap();
}

/// Temp image root holding one small file per `(relative path, mtime)`.
///
/// File contents are the path itself, so every file differs.
pub fn setup_images(files: &[(&str, i64)]) -> TempDir {
    let tmp = TempDir::new().unwrap();
    for (rel, secs) in files {
        touch_at(tmp.path(), rel, rel.as_bytes(), *secs);
    }
    tmp
}

// =========================================================================
// Fingerprints
// =========================================================================

/// Whole-second mtime fingerprint, as pinned by [`touch_at`].
pub fn mtime(secs: i64) -> Fingerprint {
    Fingerprint::Mtime { secs, nanos: 0 }
}
