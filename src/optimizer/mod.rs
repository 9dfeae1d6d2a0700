//! Image optimizers.
//!
//! | Backend | Formats | Needs |
//! |---|---|---|
//! | [`RustOptimizer`] | PNG (lossless), JPEG (lossy, opt-in) | nothing |
//! | [`ToolOptimizer`] | PNG, JPEG, GIF, SVG | tools on `PATH` |
//!
//! The scanner only sees the [`Optimizer`] trait; [`from_config`] picks the
//! implementation.

pub mod backend;
pub mod rust_backend;
pub mod tools;

pub use backend::{OptimizeError, Optimization, Optimizer, SCRATCH_PREFIX};
pub use rust_backend::RustOptimizer;
pub use tools::ToolOptimizer;

use crate::config::{BackendKind, OptimizerConfig};

/// Build the optimizer described by `config`.
pub fn from_config(config: &OptimizerConfig) -> Box<dyn Optimizer> {
    match config.backend {
        BackendKind::Rust if config.allow_lossy => {
            Box::new(RustOptimizer::lossy(config.jpeg_quality))
        }
        BackendKind::Rust => Box::new(RustOptimizer::new()),
        BackendKind::Tools => Box::new(ToolOptimizer::new(&config.disabled, config.verbose)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_builds_rust_backend() {
        let optimizer = from_config(&OptimizerConfig::default());
        assert_eq!(optimizer.name(), "rust");
    }

    #[test]
    fn tools_config_builds_tool_backend() {
        let config = OptimizerConfig {
            backend: BackendKind::Tools,
            ..Default::default()
        };
        assert_eq!(from_config(&config).name(), "tools");
    }
}
