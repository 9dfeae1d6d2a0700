//! Optimizer trait and shared types.
//!
//! The [`Optimizer`] trait is the single operation the incremental scanner
//! needs: shrink this file in place, report what happened. Two production
//! implementations exist:
//!
//! - [`RustOptimizer`](super::rust_backend::RustOptimizer): pure Rust, lossless
//!   PNG recompression through the `image` crate.
//! - [`ToolOptimizer`](super::tools::ToolOptimizer): a chain of external
//!   command-line optimizers found on `PATH`.

use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum OptimizeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to decode {path}: {reason}")]
    Decode { path: PathBuf, reason: String },
    #[error("Failed to encode {path}: {reason}")]
    Encode { path: PathBuf, reason: String },
    #[error("Unsupported image format: {0}")]
    Unsupported(PathBuf),
    #[error("No optimizer worker available for {0}")]
    NoWorker(PathBuf),
    #[error("{tool} failed ({status}): {stderr}")]
    ToolFailed {
        tool: String,
        status: String,
        stderr: String,
    },
}

/// Outcome of a successful optimization.
///
/// `bytes_after == bytes_before` means the optimizer found nothing to
/// gain and left the file untouched.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Optimization {
    pub bytes_before: u64,
    pub bytes_after: u64,
}

impl Optimization {
    pub fn unchanged(size: u64) -> Self {
        Self {
            bytes_before: size,
            bytes_after: size,
        }
    }

    pub fn saved(&self) -> u64 {
        self.bytes_before.saturating_sub(self.bytes_after)
    }
}

/// Something that can shrink an image file in place.
pub trait Optimizer {
    /// Short name used in logs.
    fn name(&self) -> &str;

    /// Optimize `path` in place.
    ///
    /// On error the file on disk must be left as it was.
    fn optimize(&self, path: &Path) -> Result<Optimization, OptimizeError>;
}

/// File-name prefix of scratch files written next to the image being
/// optimized. The scanner never treats these as candidates.
pub const SCRATCH_PREFIX: &str = ".optim-";

/// Replace `path` with `bytes` via a sibling temp file and rename.
///
/// The original file's permissions are carried over.
pub(crate) fn replace_file(path: &Path, bytes: &[u8]) -> Result<(), OptimizeError> {
    use std::io::Write;

    let dir = path.parent().unwrap_or_else(|| Path::new("."));
    let permissions = std::fs::metadata(path)?.permissions();
    let mut tmp = tempfile::Builder::new()
        .prefix(SCRATCH_PREFIX)
        .tempfile_in(dir)?;
    tmp.write_all(bytes)?;
    tmp.as_file().set_permissions(permissions)?;
    tmp.persist(path).map_err(|e| OptimizeError::Io(e.error))?;
    Ok(())
}
