//! Candidate discovery under the image root.
//!
//! Walks the root recursively and yields every regular file whose extension
//! is in the configured set (case-insensitive). Symlinks are not followed.
//! Entries are visited in file-name order so progress output and dry-run
//! listings are stable between runs.
//!
//! The walk is lazy: [`candidates`] returns an iterator, and nothing about
//! the candidate set is persisted. Each run re-derives it from disk.
//!
//! ## Cache keys
//!
//! A candidate is identified in the cache by its path relative to the root,
//! joined with `/` regardless of platform:
//!
//! ```text
//! images/                  (root)
//! ├── logo.png             → "logo.png"
//! └── posts/2024/hero.JPG  → "posts/2024/hero.JPG"
//! ```
//!
//! Keys stay valid when the whole project directory moves.

use crate::optimizer::SCRATCH_PREFIX;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;
use walkdir::WalkDir;

#[derive(Error, Debug)]
pub enum ScanError {
    #[error("Image root not found: {0}")]
    RootNotFound(PathBuf),
    #[error("Failed to walk {path}: {source}")]
    Walk {
        path: PathBuf,
        #[source]
        source: walkdir::Error,
    },
    #[error("Path is not under the image root: {0}")]
    OutsideRoot(PathBuf),
}

/// An image file eligible for optimization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    /// Path on disk (root joined with the relative path).
    pub path: PathBuf,
    /// Cache key: root-relative, `/`-separated.
    pub key: String,
}

/// Build the cache key for `path` relative to `root`.
pub fn cache_key(root: &Path, path: &Path) -> Result<String, ScanError> {
    let rel = path
        .strip_prefix(root)
        .map_err(|_| ScanError::OutsideRoot(path.to_path_buf()))?;
    let parts: Vec<String> = rel
        .components()
        .filter_map(|c| match c {
            Component::Normal(part) => Some(part.to_string_lossy().into_owned()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return Err(ScanError::OutsideRoot(path.to_path_buf()));
    }
    Ok(parts.join("/"))
}

/// Whether `path` has one of `extensions`.
///
/// Configured extensions may be written with or without a leading dot.
pub fn has_image_extension(path: &Path, extensions: &[String]) -> bool {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return false;
    };
    extensions
        .iter()
        .any(|allowed| allowed.trim_start_matches('.').eq_ignore_ascii_case(ext))
}

/// Leftover scratch copy from an interrupted optimizer run.
fn is_scratch_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .is_some_and(|n| n.starts_with(SCRATCH_PREFIX))
}

/// Cache key `skip` would have under `root`, or `None` if it lies outside.
///
/// Both paths are resolved against the filesystem so `./images/c.png`,
/// `images/sub/../c.png` and paths through a symlinked root all match.
/// A file that does not exist yet is resolved through its parent.
fn skip_key(root: &Path, skip: &Path) -> Option<String> {
    let resolved = root.canonicalize().ok().and_then(|root| {
        let skip = match skip.canonicalize() {
            Ok(path) => path,
            Err(_) => {
                let parent = skip
                    .parent()
                    .filter(|p| !p.as_os_str().is_empty())
                    .unwrap_or_else(|| Path::new("."));
                parent.canonicalize().ok()?.join(skip.file_name()?)
            }
        };
        cache_key(&root, &skip).ok()
    });
    resolved.or_else(|| cache_key(root, skip).ok())
}

/// Lazily enumerate candidates under `root`.
///
/// `skip` names a file that must never be yielded, typically the cache
/// document itself. Errors reading individual directory entries are
/// yielded in place so the caller can decide whether they are fatal.
pub fn candidates<'a>(
    root: &'a Path,
    extensions: &'a [String],
    skip: Option<&'a Path>,
) -> Result<impl Iterator<Item = Result<Candidate, ScanError>> + 'a, ScanError> {
    if !root.is_dir() {
        return Err(ScanError::RootNotFound(root.to_path_buf()));
    }

    let skip = skip.and_then(|s| skip_key(root, s));
    let walker = WalkDir::new(root)
        .follow_links(false)
        .sort_by_file_name()
        .into_iter();

    Ok(walker.filter_map(move |entry| {
        let entry = match entry {
            Ok(e) => e,
            Err(source) => {
                let path = source
                    .path()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| root.to_path_buf());
                return Some(Err(ScanError::Walk { path, source }));
            }
        };
        if !entry.file_type().is_file() {
            return None;
        }
        let path = entry.path();
        if is_scratch_file(path) || !has_image_extension(path, extensions) {
            return None;
        }
        match cache_key(root, path) {
            Ok(key) if skip.as_deref() == Some(key.as_str()) => None,
            Ok(key) => Some(Ok(Candidate {
                path: path.to_path_buf(),
                key,
            })),
            Err(e) => Some(Err(e)),
        }
    }))
}
