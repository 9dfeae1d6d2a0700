//! CLI output formatting.
//!
//! Output is **key-centric**: every line about a file leads with its cache
//! key (root-relative path), so the listing reads the same on every machine
//! and can be matched against the cache document directly.
//!
//! # Output Format
//!
//! ## Optimize
//!
//! ```text
//! ==> Optimizing images in images (12 tracked)
//! Optimized: logo.png (14.2 KiB → 9.8 KiB)
//! Optimized: posts/hero.jpg (unchanged size)
//! Failed: broken.png
//!     Failed to decode images/broken.png: ...
//! Checkpoint: 40 entries saved
//! Summary: 2 optimized (1 new, 1 changed), 10 unchanged, 1 failed (13 total)
//! Saved: 4.4 KiB
//! ```
//!
//! Unchanged files are silent at normal verbosity; `-v` logs them.
//!
//! ## Check
//!
//! ```text
//! new      banner.png
//! changed  logo.png
//!
//! 2 of 13 images would be optimized
//! ```
//!
//! # Architecture
//!
//! Each output has a `format_*` function (returns `Vec<String>`) for
//! testability and a `print_*` wrapper that writes to stdout. Format
//! functions are pure.

use crate::process::{FileStatus, PlannedFile, ProcessEvent, RunReport};
use bytesize::ByteSize;
use std::path::Path;

fn status_label(status: FileStatus) -> &'static str {
    match status {
        FileStatus::New => "new",
        FileStatus::Changed => "changed",
        FileStatus::Unchanged => "unchanged",
    }
}

// ============================================================================
// Optimize output
// ============================================================================

/// Format a single progress event as display lines.
///
/// Skips produce no lines.
pub fn format_process_event(event: &ProcessEvent) -> Vec<String> {
    match event {
        ProcessEvent::Started { root, tracked } => {
            vec![format!(
                "==> Optimizing images in {} ({} tracked)",
                root.display(),
                tracked
            )]
        }
        ProcessEvent::FileOptimized {
            key, optimization, ..
        } => {
            let sizes = if optimization.saved() == 0 {
                "unchanged size".to_string()
            } else {
                format!(
                    "{} → {}",
                    ByteSize::b(optimization.bytes_before),
                    ByteSize::b(optimization.bytes_after)
                )
            };
            vec![format!("Optimized: {} ({})", key, sizes)]
        }
        ProcessEvent::FileSkipped { .. } => Vec::new(),
        ProcessEvent::FileFailed { key, error } => {
            vec![format!("Failed: {}", key), format!("    {}", error)]
        }
        ProcessEvent::CheckpointSaved { entries } => {
            vec![format!("Checkpoint: {} entries saved", entries)]
        }
    }
}

/// Format the end-of-run summary.
pub fn format_run_summary(report: &RunReport) -> Vec<String> {
    let mut lines = vec![format!("Summary: {}", report.stats)];
    if report.stats.bytes_saved > 0 {
        lines.push(format!("Saved: {}", ByteSize::b(report.stats.bytes_saved)));
    }
    if report.has_failures() {
        lines.push(format!(
            "{} file(s) failed and will be retried next run:",
            report.failures.len()
        ));
        for failure in &report.failures {
            lines.push(format!("    {}", failure.key));
        }
    }
    lines
}

pub fn print_run_summary(report: &RunReport) {
    for line in format_run_summary(report) {
        println!("{}", line);
    }
}

// ============================================================================
// Check output
// ============================================================================

/// Format a dry-run plan: files that would be optimized, then a count.
pub fn format_plan(planned: &[PlannedFile], root: &Path) -> Vec<String> {
    let mut lines = vec![format!("==> Checking {}", root.display())];
    let pending: Vec<&PlannedFile> = planned
        .iter()
        .filter(|p| p.status.needs_optimizing())
        .collect();

    for file in &pending {
        lines.push(format!("{:<8} {}", status_label(file.status), file.key));
    }
    if !pending.is_empty() {
        lines.push(String::new());
    }
    lines.push(format!(
        "{} of {} images would be optimized",
        pending.len(),
        planned.len()
    ));
    lines
}

pub fn print_plan(planned: &[PlannedFile], root: &Path) {
    for line in format_plan(planned, root) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::optimizer::Optimization;
    use crate::process::{FileFailure, RunStats};
    use std::path::PathBuf;

    // =========================================================================
    // Process event formatting tests
    // =========================================================================

    #[test]
    fn format_started() {
        let event = ProcessEvent::Started {
            root: PathBuf::from("images"),
            tracked: 12,
        };
        assert_eq!(
            format_process_event(&event),
            vec!["==> Optimizing images in images (12 tracked)"]
        );
    }

    #[test]
    fn format_optimized_with_savings() {
        let event = ProcessEvent::FileOptimized {
            key: "posts/logo.png".to_string(),
            status: FileStatus::New,
            optimization: Optimization {
                bytes_before: 900,
                bytes_after: 600,
            },
        };
        assert_eq!(
            format_process_event(&event),
            vec!["Optimized: posts/logo.png (900 B → 600 B)"]
        );
    }

    #[test]
    fn format_optimized_without_savings() {
        let event = ProcessEvent::FileOptimized {
            key: "a.gif".to_string(),
            status: FileStatus::Changed,
            optimization: Optimization::unchanged(42),
        };
        assert_eq!(
            format_process_event(&event),
            vec!["Optimized: a.gif (unchanged size)"]
        );
    }

    #[test]
    fn format_skipped_is_silent() {
        let event = ProcessEvent::FileSkipped {
            key: "a.png".to_string(),
        };
        assert!(format_process_event(&event).is_empty());
    }

    #[test]
    fn format_failed_shows_error_indented() {
        let event = ProcessEvent::FileFailed {
            key: "broken.png".to_string(),
            error: "Failed to decode broken.png: bad header".to_string(),
        };
        assert_eq!(
            format_process_event(&event),
            vec![
                "Failed: broken.png",
                "    Failed to decode broken.png: bad header"
            ]
        );
    }

    #[test]
    fn format_checkpoint() {
        let event = ProcessEvent::CheckpointSaved { entries: 40 };
        assert_eq!(
            format_process_event(&event),
            vec!["Checkpoint: 40 entries saved"]
        );
    }

    // =========================================================================
    // Summary formatting tests
    // =========================================================================

    #[test]
    fn summary_clean_run() {
        let report = RunReport {
            stats: RunStats {
                unchanged: 3,
                ..Default::default()
            },
            failures: Vec::new(),
        };
        assert_eq!(
            format_run_summary(&report),
            vec!["Summary: 0 optimized (0 new, 0 changed), 3 unchanged (3 total)"]
        );
    }

    #[test]
    fn summary_lists_failures_and_savings() {
        let report = RunReport {
            stats: RunStats {
                new: 1,
                failed: 1,
                bytes_saved: 300,
                ..Default::default()
            },
            failures: vec![FileFailure {
                key: "bad.png".to_string(),
                error: "boom".to_string(),
            }],
        };
        let lines = format_run_summary(&report);
        assert_eq!(
            lines[0],
            "Summary: 1 optimized (1 new, 0 changed), 0 unchanged, 1 failed (2 total)"
        );
        assert_eq!(lines[1], "Saved: 300 B");
        assert_eq!(lines[2], "1 file(s) failed and will be retried next run:");
        assert_eq!(lines[3], "    bad.png");
    }

    // =========================================================================
    // Plan formatting tests
    // =========================================================================

    #[test]
    fn plan_lists_only_pending_files() {
        let planned = vec![
            PlannedFile {
                key: "a.png".into(),
                status: FileStatus::Unchanged,
            },
            PlannedFile {
                key: "b.png".into(),
                status: FileStatus::New,
            },
            PlannedFile {
                key: "c.png".into(),
                status: FileStatus::Changed,
            },
        ];
        let lines = format_plan(&planned, Path::new("images"));
        assert_eq!(
            lines,
            vec![
                "==> Checking images",
                "new      b.png",
                "changed  c.png",
                "",
                "2 of 3 images would be optimized",
            ]
        );
    }

    #[test]
    fn plan_nothing_to_do() {
        let planned = vec![PlannedFile {
            key: "a.png".into(),
            status: FileStatus::Unchanged,
        }];
        let lines = format_plan(&planned, Path::new("images"));
        assert_eq!(
            lines,
            vec!["==> Checking images", "0 of 1 images would be optimized"]
        );
    }
}
