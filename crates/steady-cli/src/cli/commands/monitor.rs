//! `steady monitor` – supervisory loop over the session snapshot.

use anyhow::Result;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use steady_core::config::{self, StabilizerConfig};
use steady_core::monitor::{MonitorLoop, MonitorSettings};
use steady_core::registry::FileSessionRegistry;
use tokio_util::sync::CancellationToken;

use super::Runtime;

pub async fn run_monitor(
    cfg: &StabilizerConfig,
    rt: &Runtime,
    sessions: Option<PathBuf>,
    max_run_secs: Option<u64>,
) -> Result<()> {
    let snapshot = match sessions.or_else(|| cfg.session_snapshot.clone()) {
        Some(p) => p,
        None => config::default_session_snapshot()?,
    };
    let mut settings = MonitorSettings::from_config(cfg);
    if let Some(secs) = max_run_secs {
        settings.max_run = Duration::from_secs(secs);
    }
    tracing::info!(snapshot = %snapshot.display(), "polling session snapshot");

    let monitor = MonitorLoop::new(
        settings,
        Arc::new(FileSessionRegistry::new(snapshot)),
        rt.mitigator.clone(),
        rt.batch.clone(),
    );

    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::info!("interrupt received, stopping after the current tick");
            on_signal.cancel();
        }
    });

    let report = monitor.run(cancel).await;
    println!(
        "Monitor stopped ({:?}): {} ticks, {} idle, {} registry errors, {} mitigations, {} sessions re-driven",
        report.stop,
        report.ticks,
        report.idle_ticks,
        report.registry_errors,
        report.mitigations,
        report.redriven
    );
    Ok(())
}
