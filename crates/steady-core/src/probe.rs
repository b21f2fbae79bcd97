//! Diagnostic speed probe: one download of a reference file, discarded as it
//! arrives, timed end to end. Informational only; the monitor never reads it.

use anyhow::{Context, Result};
use std::time::{Duration, Instant};

const MIB: f64 = 1024.0 * 1024.0;

/// Outcome of one probe run.
#[derive(Debug, Clone)]
pub struct ProbeResult {
    pub url: String,
    pub bytes: u64,
    pub elapsed: Duration,
    pub mib_per_sec: f64,
}

/// Downloads `url` into a sink and returns the measured speed.
/// Runs on the current thread; call `probe_async` from async code.
pub fn run_probe(url: &str, timeout: Duration) -> Result<ProbeResult> {
    let mut easy = curl::easy::Easy::new();
    easy.url(url).context("invalid URL")?;
    easy.follow_location(true)?;
    easy.connect_timeout(timeout)?;
    easy.low_speed_limit(1)?;
    easy.low_speed_time(timeout)?;

    let mut bytes = 0u64;
    let start = Instant::now();
    {
        let mut transfer = easy.transfer();
        transfer.write_function(|data| {
            bytes += data.len() as u64;
            Ok(data.len())
        })?;
        transfer.perform().context("probe GET failed")?;
    }
    let elapsed = start.elapsed();

    let code = easy.response_code().context("no response code")?;
    if !(200..300).contains(&code) {
        anyhow::bail!("probe GET {} returned HTTP {}", url, code);
    }

    let secs = elapsed.as_secs_f64();
    let mib_per_sec = if secs > 0.0 { bytes as f64 / MIB / secs } else { 0.0 };
    Ok(ProbeResult {
        url: url.to_string(),
        bytes,
        elapsed,
        mib_per_sec,
    })
}

/// `run_probe` on the blocking pool.
pub async fn probe_async(url: &str, timeout: Duration) -> Result<ProbeResult> {
    let url = url.to_string();
    tokio::task::spawn_blocking(move || run_probe(&url, timeout))
        .await
        .context("probe task join")?
}
