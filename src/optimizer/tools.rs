//! Optimizer that drives external command-line tools.
//!
//! Each supported format has a chain of **workers**, well-known optimizers
//! such as `optipng` or `jpegoptim`. For every file, each applicable worker
//! runs in turn against a scratch copy next to the original; a worker's
//! output is kept only if it is smaller than the best result so far. The
//! original is replaced once, at the end, if anything improved.
//!
//! Workers are resolved on `PATH` once, when the optimizer is built.
//! Missing tools are skipped with a warning; tools named in the `disabled`
//! list are never run. With `verbose` off, each tool is passed its quiet
//! flag.
//!
//! A worker that exits non-zero is logged and skipped; the chain carries on
//! from the best result so far. The file only fails when every applicable
//! worker failed.
//!
//! | Format | Workers (in order) |
//! |---|---|
//! | PNG | pngcrush, pngout, advpng, optipng, oxipng |
//! | JPEG | jpegoptim, jpegtran |
//! | GIF | gifsicle |
//! | SVG | svgo |

use super::backend::{OptimizeError, Optimization, Optimizer, SCRATCH_PREFIX};
use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::NamedTempFile;

/// Image formats the worker table knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ImageKind {
    Png,
    Jpeg,
    Gif,
    Svg,
}

impl ImageKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "png" => Some(ImageKind::Png),
            "jpg" | "jpeg" => Some(ImageKind::Jpeg),
            "gif" => Some(ImageKind::Gif),
            "svg" => Some(ImageKind::Svg),
            _ => None,
        }
    }
}

/// Builds a worker's argument list from `(input, output, verbose)`.
///
/// In-place tools ignore `input` and rewrite `output`, which already holds
/// a copy of the input when the worker starts.
type ArgsFn = fn(&Path, &Path, bool) -> Vec<OsString>;

/// One external optimizer.
#[derive(Debug, Clone, Copy)]
pub struct Worker {
    pub name: &'static str,
    pub kinds: &'static [ImageKind],
    args: ArgsFn,
}

fn quiet(verbose: bool, flag: &str) -> Option<OsString> {
    (!verbose).then(|| flag.into())
}

fn with_quiet(mut args: Vec<OsString>, verbose: bool, flag: &str) -> Vec<OsString> {
    if let Some(q) = quiet(verbose, flag) {
        args.insert(0, q);
    }
    args
}

fn pngcrush_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["-reduce".into(), "-ow".into(), out.into()], verbose, "-q")
}

fn pngout_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["-y".into(), out.into()], verbose, "-q")
}

fn advpng_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["-z".into(), "-4".into(), out.into()], verbose, "-q")
}

fn optipng_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["-o2".into(), out.into()], verbose, "-quiet")
}

fn oxipng_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["-o".into(), "2".into(), out.into()], verbose, "--quiet")
}

fn jpegoptim_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec!["--preserve".into(), out.into()], verbose, "--quiet")
}

// jpegtran has no quiet flag and cannot rewrite in place
fn jpegtran_args(input: &Path, out: &Path, _: bool) -> Vec<OsString> {
    vec![
        "-copy".into(),
        "all".into(),
        "-optimize".into(),
        "-outfile".into(),
        out.into(),
        input.into(),
    ]
}

fn gifsicle_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(
        vec!["-O2".into(), "--batch".into(), out.into()],
        verbose,
        "--no-warnings",
    )
}

fn svgo_args(_: &Path, out: &Path, verbose: bool) -> Vec<OsString> {
    with_quiet(vec![out.into(), "-o".into(), out.into()], verbose, "--quiet")
}

/// Every worker, in the order they run.
pub const WORKERS: &[Worker] = &[
    Worker { name: "pngcrush", kinds: &[ImageKind::Png], args: pngcrush_args },
    Worker { name: "pngout", kinds: &[ImageKind::Png], args: pngout_args },
    Worker { name: "advpng", kinds: &[ImageKind::Png], args: advpng_args },
    Worker { name: "optipng", kinds: &[ImageKind::Png], args: optipng_args },
    Worker { name: "oxipng", kinds: &[ImageKind::Png], args: oxipng_args },
    Worker { name: "jpegoptim", kinds: &[ImageKind::Jpeg], args: jpegoptim_args },
    Worker { name: "jpegtran", kinds: &[ImageKind::Jpeg], args: jpegtran_args },
    Worker { name: "gifsicle", kinds: &[ImageKind::Gif], args: gifsicle_args },
    Worker { name: "svgo", kinds: &[ImageKind::Svg], args: svgo_args },
];

/// Names of every known worker.
pub fn worker_names() -> impl Iterator<Item = &'static str> {
    WORKERS.iter().map(|w| w.name)
}

/// A worker paired with the executable that runs it.
#[derive(Debug, Clone)]
pub struct ResolvedWorker {
    pub worker: Worker,
    pub program: PathBuf,
}

/// Optimizer backed by external tools.
#[derive(Debug, Clone)]
pub struct ToolOptimizer {
    workers: Vec<ResolvedWorker>,
    verbose: bool,
}

impl ToolOptimizer {
    /// Resolve every worker not in `disabled` on `PATH`.
    pub fn new(disabled: &[String], verbose: bool) -> Self {
        let workers = WORKERS
            .iter()
            .filter(|w| !disabled.iter().any(|d| d == w.name))
            .filter_map(|w| match which::which(w.name) {
                Ok(program) => {
                    log::debug!("optimizer worker {} → {}", w.name, program.display());
                    Some(ResolvedWorker {
                        worker: *w,
                        program,
                    })
                }
                Err(_) => {
                    log::warn!("optimizer worker {} not found on PATH, skipping", w.name);
                    None
                }
            })
            .collect();
        Self::from_resolved(workers, verbose)
    }

    /// Build from an explicit worker list (no PATH lookup).
    pub fn from_resolved(workers: Vec<ResolvedWorker>, verbose: bool) -> Self {
        Self { workers, verbose }
    }

    /// Names of the workers that will run, in order.
    pub fn active_workers(&self) -> Vec<&'static str> {
        self.workers.iter().map(|w| w.worker.name).collect()
    }

    fn scratch_file(path: &Path) -> Result<NamedTempFile, OptimizeError> {
        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        let suffix = path
            .extension()
            .map(|e| format!(".{}", e.to_string_lossy()))
            .unwrap_or_default();
        Ok(tempfile::Builder::new()
            .prefix(SCRATCH_PREFIX)
            .suffix(&suffix)
            .tempfile_in(dir)?)
    }

    fn run_worker(
        &self,
        resolved: &ResolvedWorker,
        input: &Path,
        output: &Path,
    ) -> Result<(), OptimizeError> {
        let name = resolved.worker.name;
        let args = (resolved.worker.args)(input, output, self.verbose);
        let result = Command::new(&resolved.program)
            .args(&args)
            .output()
            .map_err(|e| OptimizeError::ToolFailed {
                tool: name.to_string(),
                status: "not started".to_string(),
                stderr: e.to_string(),
            })?;

        if self.verbose && !result.stdout.is_empty() {
            log::info!("{}: {}", name, String::from_utf8_lossy(&result.stdout).trim());
        }
        if !result.status.success() {
            return Err(OptimizeError::ToolFailed {
                tool: name.to_string(),
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(())
    }
}

impl Optimizer for ToolOptimizer {
    fn name(&self) -> &str {
        "tools"
    }

    fn optimize(&self, path: &Path) -> Result<Optimization, OptimizeError> {
        let kind =
            ImageKind::from_path(path).ok_or_else(|| OptimizeError::Unsupported(path.to_path_buf()))?;
        let applicable: Vec<&ResolvedWorker> = self
            .workers
            .iter()
            .filter(|w| w.worker.kinds.contains(&kind))
            .collect();
        if applicable.is_empty() {
            return Err(OptimizeError::NoWorker(path.to_path_buf()));
        }

        let before = std::fs::metadata(path)?.len();
        let attempted = applicable.len();
        let mut best: Option<(NamedTempFile, u64)> = None;
        let mut last_failure = None;
        let mut failures = 0;

        for resolved in applicable {
            let input = best
                .as_ref()
                .map(|(f, _)| f.path().to_path_buf())
                .unwrap_or_else(|| path.to_path_buf());
            let scratch = Self::scratch_file(path)?;
            std::fs::copy(&input, scratch.path())?;

            // A failing worker just didn't help; the rest of the chain still runs
            if let Err(e) = self.run_worker(resolved, &input, scratch.path()) {
                log::warn!("{}: {}", path.display(), e);
                failures += 1;
                last_failure = Some(e);
                continue;
            }

            let size = std::fs::metadata(scratch.path())?.len();
            let current = best.as_ref().map_or(before, |(_, s)| *s);
            if size > 0 && size < current {
                log::debug!(
                    "{} shrank {} from {} to {} bytes",
                    resolved.worker.name,
                    path.display(),
                    current,
                    size
                );
                best = Some((scratch, size));
            }
        }

        if failures == attempted {
            if let Some(e) = last_failure {
                return Err(e);
            }
        }

        match best {
            Some((file, size)) => {
                let permissions = std::fs::metadata(path)?.permissions();
                file.as_file().set_permissions(permissions)?;
                file.persist(path).map_err(|e| OptimizeError::Io(e.error))?;
                Ok(Optimization {
                    bytes_before: before,
                    bytes_after: size,
                })
            }
            None => Ok(Optimization::unchanged(before)),
        }
    }
}
