//! `steady probe` – diagnostic speed test.

use anyhow::Result;
use steady_core::config::StabilizerConfig;
use steady_core::probe;

pub async fn run_probe(cfg: &StabilizerConfig, url: Option<String>) -> Result<()> {
    let url = url.unwrap_or_else(|| cfg.probe_url.clone());
    println!("Probing {} ...", url);
    let result = probe::probe_async(&url, cfg.request_timeout()).await?;
    println!(
        "{} bytes in {:.2}s: {:.2} MiB/s (target {:.2} MiB/s)",
        result.bytes,
        result.elapsed.as_secs_f64(),
        result.mib_per_sec,
        cfg.target_speed_mib_s
    );
    Ok(())
}
