//! # Image Optim Cache
//!
//! Incremental image optimization for static site builds. A build step that
//! losslessly recompresses every image is slow when the image tree is large
//! and mostly unchanged; this crate remembers a fingerprint of each file it
//! has already optimized and only touches what is new or changed.
//!
//! # Architecture
//!
//! ```text
//! images/  ──scan──▶  candidates  ──classify──▶  new / changed / unchanged
//!                                    ▲                │
//!                 image_optim_cache.json              ▼ optimize (new, changed)
//!                    (CacheStore)    ◀──put──  fingerprint after rewrite
//! ```
//!
//! One run: load the cache document, walk the root, fingerprint each
//! candidate, optimize the ones whose fingerprint differs from the stored
//! value, record the new fingerprint, save the document. A second run over
//! an untouched tree optimizes nothing.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`cache`] | The persistent path → fingerprint store, its JSON document, and storage backends |
//! | [`fingerprint`] | Change-detection values: modification time (default) or SHA-256 of contents |
//! | [`scan`] | Lazy, ordered walk of the image root; cache-key derivation |
//! | [`process`] | The incremental loop: classify, optimize, record, checkpoint, save |
//! | [`optimizer`] | The `Optimizer` trait plus the pure-Rust and external-tool backends |
//! | [`config`] | `optim.toml` loading, merging over stock defaults, validation |
//! | [`output`] | CLI output formatting for progress, summaries, and dry runs |
//! | [`logging`] | `log` + `env_logger` setup driven by `-v` / `-q` / `RUST_LOG` |
//!
//! # Design Decisions
//!
//! ## Fingerprint After Optimizing
//!
//! Optimizers rewrite files in place, which bumps their modification time.
//! The fingerprint stored for a file is therefore read after the optimizer
//! returns, so the rewrite itself is never mistaken for a user edit.
//!
//! ## Failures Are Not Cached
//!
//! A file that fails to optimize gets no cache entry and is retried on the
//! next run. The rest of the run carries on unless `on_error = "abort"`;
//! in both cases the cache is saved so finished work is kept.
//!
//! ## Stale Entries Are Kept
//!
//! Entries for files that disappeared are never pruned. They are a few bytes
//! each and cost nothing at lookup time.
//!
//! ## Atomic Saves
//!
//! The cache document is written to a temp file beside it and renamed into
//! place. An interrupted save leaves the previous document intact.

pub mod cache;
pub mod config;
pub mod fingerprint;
pub mod logging;
pub mod optimizer;
pub mod output;
pub mod process;
pub mod scan;

#[cfg(test)]
pub(crate) mod test_helpers;
