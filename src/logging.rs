//! Diagnostic logging through the `log` facade with an `env_logger` backend.
//!
//! Progress lines (what got optimized) go to stdout via [`crate::output`].
//! Diagnostics go to stderr through `log`. The level is chosen by, in order:
//!
//! 1. `RUST_LOG`, when set
//! 2. `-q`: errors only
//! 3. `-v` count: `-v` debug (unchanged files, cache loads), `-vv` trace
//! 4. Default: warnings (missing tools, per-file failures)

use env_logger::Builder;
use log::LevelFilter;
use std::env;
use std::io::Write;

/// Install the global logger. Later calls are no-ops.
pub fn init_logging(verbose: u8, quiet: bool) {
    let mut builder = Builder::new();
    let from_env = env::var("RUST_LOG").is_ok();
    if from_env {
        builder.parse_default_env();
    } else {
        builder.filter_level(determine_level(verbose, quiet));
    }

    builder.format(move |buf, record| {
        let level = record.level();
        let style = buf.default_level_style(level);
        if verbose >= 1 {
            writeln!(
                buf,
                "{style}{:<5}{style:#} [{}] {}",
                level,
                record.module_path().unwrap_or("unknown"),
                record.args()
            )
        } else {
            writeln!(buf, "{style}{:<5}{style:#} {}", level, record.args())
        }
    });

    if builder.try_init().is_ok() {
        log::debug!(
            "logging initialized ({})",
            if from_env {
                "RUST_LOG".to_string()
            } else {
                format!("{:?}", determine_level(verbose, quiet))
            }
        );
    }
}

fn determine_level(verbose: u8, quiet: bool) -> LevelFilter {
    if quiet {
        return LevelFilter::Error;
    }
    match verbose {
        0 => LevelFilter::Warn,
        1 => LevelFilter::Debug,
        _ => LevelFilter::Trace,
    }
}
