//! CLI command handlers, one file per subcommand.

mod batch;
mod completions;
mod directive;
mod monitor;
mod probe;
mod reset;

pub use batch::run_batch;
pub use completions::run_completions;
pub use directive::run_directive;
pub use monitor::run_monitor;
pub use probe::run_probe;
pub use reset::run_reset;

use anyhow::{Context, Result};
use std::path::PathBuf;
use std::sync::Arc;
use steady_core::batch::{BatchRunner, BatchSettings};
use steady_core::config::StabilizerConfig;
use steady_core::engine;
use steady_core::mitigation::{Mitigator, SystemMitigation};

/// Shared pieces every transfer-touching command needs.
pub struct Runtime {
    pub mitigator: Mitigator,
    pub batch: BatchRunner,
}

impl Runtime {
    /// `download_dir` overrides the config; the current directory is the last resort.
    pub fn build(cfg: &StabilizerConfig, download_dir: Option<PathBuf>) -> Result<Self> {
        let download_dir = match download_dir.or_else(|| cfg.download_dir.clone()) {
            Some(dir) => dir,
            None => std::env::current_dir().context("current directory")?,
        };
        std::fs::create_dir_all(&download_dir)
            .with_context(|| format!("create download dir {}", download_dir.display()))?;

        let engine = engine::engine_from_config(cfg)?;
        let mitigator = Mitigator::new(
            Arc::new(SystemMitigation::new(&cfg.mitigation)),
            cfg.settle_delay(),
        );
        let batch = BatchRunner::new(
            engine,
            mitigator.clone(),
            BatchSettings::from_config(cfg, download_dir),
        );
        Ok(Self { mitigator, batch })
    }
}
