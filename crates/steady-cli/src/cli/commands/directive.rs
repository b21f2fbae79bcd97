//! `steady directive` – write the rate-limit directive for the configured target.

use anyhow::Result;
use steady_core::config::StabilizerConfig;
use steady_core::directive;

pub fn run_directive(cfg: &StabilizerConfig) -> Result<()> {
    let rate = cfg.target_bytes_per_sec();
    directive::write_directive(&cfg.directive_path, rate)?;
    println!("Wrote rate_limit={} to {}", rate, cfg.directive_path.display());
    Ok(())
}
