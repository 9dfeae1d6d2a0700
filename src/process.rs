//! Incremental optimization.
//!
//! Walks the image root, compares each candidate's fingerprint with the
//! cache, optimizes only what is new or changed, and saves the cache.
//!
//! ## Per-file decision
//!
//! ```text
//! not in cache           → New        → optimize → Put(key, fingerprint)
//! in cache, different    → Changed    → optimize → Put(key, fingerprint)
//! in cache, same         → Unchanged  → skip
//! optimize fails         → Failed     → not cached, retried next run
//! ```
//!
//! The fingerprint stored after an optimization is read **after** the
//! optimizer rewrote the file. Recording the pre-optimization value would
//! make every rewritten file look changed on the next run.
//!
//! ## Failures and persistence
//!
//! A failing file never aborts the run by accident: it is reported as a
//! [`ProcessEvent::FileFailed`] and collected in [`RunReport::failures`].
//! [`ErrorPolicy`] decides whether to keep going. Either way the cache is
//! saved before returning, so successful optimizations are never redone.
//!
//! With `checkpoint_every = N`, the cache is also saved after every N
//! successful optimizations, bounding the work lost if the process dies.
//!
//! ## Progress
//!
//! The caller may pass an `mpsc` sender; events are sent as they happen
//! and formatted by [`crate::output`]. This module never prints.

use crate::cache::{CacheError, CacheStorage, CacheStore};
use crate::config::{ErrorPolicy, OptimConfig};
use crate::fingerprint::{self, Fingerprint, FingerprintStrategy};
use crate::optimizer::{Optimization, Optimizer};
use crate::scan::{self, Candidate, ScanError};
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::mpsc::Sender;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ProcessError {
    #[error("Cache error: {0}")]
    Cache(#[from] CacheError),
    #[error("Scan error: {0}")]
    Scan(#[from] ScanError),
    #[error("Run aborted at {key}: {reason}")]
    Aborted { key: String, reason: String },
}

/// Settings for one run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub extensions: Vec<String>,
    pub strategy: FingerprintStrategy,
    pub on_error: ErrorPolicy,
    pub checkpoint_every: usize,
    /// When false, start from an empty store instead of loading.
    pub use_cache: bool,
}

impl RunOptions {
    pub fn from_config(config: &OptimConfig) -> Self {
        Self {
            extensions: config.scan.extensions.clone(),
            strategy: config.cache.fingerprint,
            on_error: config.optimizer.on_error,
            checkpoint_every: config.cache.checkpoint_every,
            use_cache: true,
        }
    }
}

impl Default for RunOptions {
    fn default() -> Self {
        Self::from_config(&OptimConfig::default())
    }
}

/// How a candidate compares with the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileStatus {
    New,
    Changed,
    Unchanged,
}

impl FileStatus {
    pub fn needs_optimizing(self) -> bool {
        self != FileStatus::Unchanged
    }
}

/// Compare a current fingerprint with what the store remembers.
pub fn classify(store: &CacheStore, key: &str, current: &Fingerprint) -> FileStatus {
    match store.get(key) {
        None => FileStatus::New,
        Some(stored) if stored != current => FileStatus::Changed,
        Some(_) => FileStatus::Unchanged,
    }
}

/// Progress events emitted during a run.
#[derive(Debug, Clone)]
pub enum ProcessEvent {
    Started {
        root: PathBuf,
        tracked: usize,
    },
    FileOptimized {
        key: String,
        status: FileStatus,
        optimization: Optimization,
    },
    FileSkipped {
        key: String,
    },
    FileFailed {
        key: String,
        error: String,
    },
    CheckpointSaved {
        entries: usize,
    },
}

/// A file that could not be optimized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileFailure {
    pub key: String,
    pub error: String,
}

/// Per-status counts for a run.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct RunStats {
    pub new: u32,
    pub changed: u32,
    pub unchanged: u32,
    pub failed: u32,
    pub bytes_saved: u64,
}

impl RunStats {
    fn optimized(&mut self, status: FileStatus, optimization: &Optimization) {
        match status {
            FileStatus::New => self.new += 1,
            FileStatus::Changed => self.changed += 1,
            FileStatus::Unchanged => {}
        }
        self.bytes_saved += optimization.saved();
    }

    pub fn optimized_count(&self) -> u32 {
        self.new + self.changed
    }

    pub fn total(&self) -> u32 {
        self.new + self.changed + self.unchanged + self.failed
    }
}

impl fmt::Display for RunStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} optimized ({} new, {} changed), {} unchanged",
            self.optimized_count(),
            self.new,
            self.changed,
            self.unchanged
        )?;
        if self.failed > 0 {
            write!(f, ", {} failed", self.failed)?;
        }
        write!(f, " ({} total)", self.total())
    }
}

/// Result of a completed run.
#[derive(Debug, Default)]
pub struct RunReport {
    pub stats: RunStats,
    pub failures: Vec<FileFailure>,
}

impl RunReport {
    pub fn has_failures(&self) -> bool {
        !self.failures.is_empty()
    }
}

fn emit(events: Option<&Sender<ProcessEvent>>, event: ProcessEvent) {
    if let Some(tx) = events {
        // A dropped receiver only means nobody is listening
        let _ = tx.send(event);
    }
}

/// Load the cache, optimize what changed under `root`, save the cache.
pub fn run(
    root: &Path,
    storage: &dyn CacheStorage,
    optimizer: &dyn Optimizer,
    options: &RunOptions,
    events: Option<Sender<ProcessEvent>>,
) -> Result<RunReport, ProcessError> {
    let mut store = if options.use_cache {
        storage.load()?
    } else {
        log::debug!("cache disabled, starting from an empty store");
        CacheStore::empty()
    };
    process_candidates(root, &mut store, storage, optimizer, options, events.as_ref())
}

/// Optimize new and changed candidates against an already-loaded `store`.
///
/// `store` is updated in place and saved through `storage` at checkpoints
/// and before returning, including when the run is aborted.
pub fn process_candidates(
    root: &Path,
    store: &mut CacheStore,
    storage: &dyn CacheStorage,
    optimizer: &dyn Optimizer,
    options: &RunOptions,
    events: Option<&Sender<ProcessEvent>>,
) -> Result<RunReport, ProcessError> {
    let candidates = scan::candidates(root, &options.extensions, storage.location())?;
    process_stream(root, candidates, store, storage, optimizer, options, events)
}

/// The loop behind [`process_candidates`], over an already-started walk.
///
/// Walk errors in `candidates` become per-file failures under the
/// configured [`ErrorPolicy`].
fn process_stream(
    root: &Path,
    candidates: impl Iterator<Item = Result<Candidate, ScanError>>,
    store: &mut CacheStore,
    storage: &dyn CacheStorage,
    optimizer: &dyn Optimizer,
    options: &RunOptions,
    events: Option<&Sender<ProcessEvent>>,
) -> Result<RunReport, ProcessError> {
    emit(
        events,
        ProcessEvent::Started {
            root: root.to_path_buf(),
            tracked: store.len(),
        },
    );
    log::debug!("optimizing {} with the {} optimizer", root.display(), optimizer.name());

    let mut report = RunReport::default();
    let mut since_checkpoint = 0usize;

    for candidate in candidates {
        let outcome = candidate
            .map_err(|e| (walk_error_key(root, &e), e.to_string()))
            .and_then(|c| optimize_one(&c, store, optimizer, options.strategy));

        match outcome {
            Ok(Outcome::Skipped(key)) => {
                log::debug!("unchanged: {}", key);
                report.stats.unchanged += 1;
                emit(events, ProcessEvent::FileSkipped { key });
            }
            Ok(Outcome::Optimized {
                key,
                status,
                optimization,
            }) => {
                report.stats.optimized(status, &optimization);
                emit(
                    events,
                    ProcessEvent::FileOptimized {
                        key,
                        status,
                        optimization,
                    },
                );
                since_checkpoint += 1;
                if options.checkpoint_every > 0 && since_checkpoint >= options.checkpoint_every {
                    storage.save(store)?;
                    since_checkpoint = 0;
                    emit(
                        events,
                        ProcessEvent::CheckpointSaved {
                            entries: store.len(),
                        },
                    );
                }
            }
            Err((key, error)) => {
                log::debug!("failed to optimize {}: {}", key, error);
                report.stats.failed += 1;
                report.failures.push(FileFailure {
                    key: key.clone(),
                    error: error.clone(),
                });
                emit(
                    events,
                    ProcessEvent::FileFailed {
                        key: key.clone(),
                        error: error.clone(),
                    },
                );
                if options.on_error == ErrorPolicy::Abort {
                    storage.save(store)?;
                    return Err(ProcessError::Aborted { key, reason: error });
                }
            }
        }
    }

    storage.save(store)?;
    Ok(report)
}

enum Outcome {
    Skipped(String),
    Optimized {
        key: String,
        status: FileStatus,
        optimization: Optimization,
    },
}

/// Decide, optimize, and record a single candidate.
///
/// Errors come back as `(key, message)` so the caller can apply the
/// continuation policy uniformly.
fn optimize_one(
    candidate: &Candidate,
    store: &mut CacheStore,
    optimizer: &dyn Optimizer,
    strategy: FingerprintStrategy,
) -> Result<Outcome, (String, String)> {
    let fail = |e: String| (candidate.key.clone(), e);

    let current =
        fingerprint::compute(&candidate.path, strategy).map_err(|e| fail(e.to_string()))?;
    let status = classify(store, &candidate.key, &current);
    if !status.needs_optimizing() {
        return Ok(Outcome::Skipped(candidate.key.clone()));
    }

    let optimization = optimizer
        .optimize(&candidate.path)
        .map_err(|e| fail(e.to_string()))?;
    let after =
        fingerprint::compute(&candidate.path, strategy).map_err(|e| fail(e.to_string()))?;
    store.put(candidate.key.clone(), after);

    Ok(Outcome::Optimized {
        key: candidate.key.clone(),
        status,
        optimization,
    })
}

fn walk_error_key(root: &Path, error: &ScanError) -> String {
    match error {
        ScanError::Walk { path, .. } | ScanError::OutsideRoot(path) => {
            scan::cache_key(root, path).unwrap_or_else(|_| path.display().to_string())
        }
        ScanError::RootNotFound(path) => path.display().to_string(),
    }
}

/// A candidate and what a run would do with it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedFile {
    pub key: String,
    pub status: FileStatus,
}

/// Classify every candidate without optimizing anything or saving.
pub fn plan(
    root: &Path,
    store: &CacheStore,
    options: &RunOptions,
    skip: Option<&Path>,
) -> Result<Vec<PlannedFile>, ProcessError> {
    let candidates = scan::candidates(root, &options.extensions, skip)?;
    Ok(plan_stream(root, candidates, store, options))
}

/// Walk errors are logged and left out of the plan; a real run would
/// report them as failures.
fn plan_stream(
    root: &Path,
    candidates: impl Iterator<Item = Result<Candidate, ScanError>>,
    store: &CacheStore,
    options: &RunOptions,
) -> Vec<PlannedFile> {
    let mut planned = Vec::new();
    for candidate in candidates {
        let candidate = match candidate {
            Ok(c) => c,
            Err(e) => {
                log::warn!("cannot read {}: {}", walk_error_key(root, &e), e);
                continue;
            }
        };
        let status = match fingerprint::compute(&candidate.path, options.strategy) {
            Ok(current) => classify(store, &candidate.key, &current),
            Err(e) => {
                log::warn!("cannot fingerprint {}: {}", candidate.key, e);
                FileStatus::New
            }
        };
        planned.push(PlannedFile {
            key: candidate.key,
            status,
        });
    }
    planned
}
