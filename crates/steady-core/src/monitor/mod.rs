//! Throughput monitor: the supervisory loop.
//!
//! Every `interval` it reads the active sessions, computes the mean speed and,
//! when the mean is below `target * threshold`, stabilizes, re-drives the slow
//! sessions through the batch runner and writes the rate-limit directive.
//! Stops when the watchdog expires or the cancellation token fires. Nothing a
//! tick does can end the loop early.

mod sample;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::batch::{BatchItem, BatchRunner};
use crate::config::{RedriveScope, StabilizerConfig};
use crate::directive;
use crate::mitigation::Mitigator;
use crate::registry::{Session, SessionRegistry};

pub use sample::{low_speed_sessions, should_mitigate, ThroughputSample};

/// Policy values the loop needs.
#[derive(Debug, Clone)]
pub struct MonitorSettings {
    pub target_mib_s: f64,
    pub threshold: f64,
    pub interval: Duration,
    pub max_run: Duration,
    pub directive_path: PathBuf,
    pub directive_bytes_per_sec: u64,
    /// Which sessions a mitigation re-drives.
    pub redrive: RedriveScope,
}

impl MonitorSettings {
    pub fn from_config(cfg: &StabilizerConfig) -> Self {
        Self {
            target_mib_s: cfg.target_speed_mib_s,
            threshold: cfg.low_speed_threshold,
            interval: cfg.monitor_interval(),
            max_run: cfg.max_run(),
            directive_path: cfg.directive_path.clone(),
            directive_bytes_per_sec: cfg.target_bytes_per_sec(),
            redrive: cfg.redrive,
        }
    }

    fn threshold_mib_s(&self) -> f64 {
        self.target_mib_s * self.threshold
    }
}

/// Why the loop ended. Neither is an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopReason {
    WatchdogExpired,
    Cancelled,
}

/// Counters for one run of the loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MonitorReport {
    pub ticks: u64,
    pub idle_ticks: u64,
    pub registry_errors: u64,
    pub mitigations: u64,
    pub redriven: u64,
    pub stop: StopReason,
}

/// What a single tick decided.
#[derive(Debug, Clone, PartialEq)]
pub enum TickOutcome {
    RegistryUnavailable,
    NoSessions,
    Healthy(ThroughputSample),
    Mitigated {
        sample: ThroughputSample,
        redriven: usize,
    },
}

pub struct MonitorLoop {
    settings: MonitorSettings,
    registry: Arc<dyn SessionRegistry>,
    mitigator: Mitigator,
    batch: BatchRunner,
}

impl MonitorLoop {
    pub fn new(
        settings: MonitorSettings,
        registry: Arc<dyn SessionRegistry>,
        mitigator: Mitigator,
        batch: BatchRunner,
    ) -> Self {
        Self {
            settings,
            registry,
            mitigator,
            batch,
        }
    }

    /// Runs until the watchdog expires or `cancel` fires.
    ///
    /// Ticks are fixed-interval: a tick that overruns is followed immediately by
    /// the next one, without a burst of catch-up ticks. A tick in progress is
    /// allowed to finish its current work.
    pub async fn run(&self, cancel: CancellationToken) -> MonitorReport {
        let start = Instant::now();
        // A watchdog too far out to represent never fires.
        let deadline = start.checked_add(self.settings.max_run);
        tracing::info!(
            target_mib_s = self.settings.target_mib_s,
            threshold = self.settings.threshold,
            "throughput monitor started"
        );

        let mut interval = tokio::time::interval(self.settings.interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut report = MonitorReport {
            ticks: 0,
            idle_ticks: 0,
            registry_errors: 0,
            mitigations: 0,
            redriven: 0,
            stop: StopReason::WatchdogExpired,
        };

        loop {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    report.stop = StopReason::Cancelled;
                    break;
                }
                _ = watchdog(deadline) => {
                    report.stop = StopReason::WatchdogExpired;
                    break;
                }
                _ = interval.tick() => {}
            }
            if start.elapsed() > self.settings.max_run {
                report.stop = StopReason::WatchdogExpired;
                break;
            }

            report.ticks += 1;
            match self.tick().await {
                TickOutcome::RegistryUnavailable => report.registry_errors += 1,
                TickOutcome::NoSessions => report.idle_ticks += 1,
                TickOutcome::Healthy(_) => {}
                TickOutcome::Mitigated { redriven, .. } => {
                    report.mitigations += 1;
                    report.redriven += redriven as u64;
                }
            }
        }

        match report.stop {
            StopReason::WatchdogExpired => tracing::info!(
                elapsed = ?start.elapsed(),
                "watchdog reached, stopping monitor"
            ),
            StopReason::Cancelled => tracing::info!("monitor cancelled"),
        }
        report
    }

    /// One sample-decide-act cycle.
    pub async fn tick(&self) -> TickOutcome {
        let sessions = match self.registry.list_active_sessions().await {
            Ok(s) => s,
            Err(e) => {
                tracing::error!("monitor error: {}", e);
                return TickOutcome::RegistryUnavailable;
            }
        };

        let Some(sample) = ThroughputSample::from_sessions(&sessions) else {
            tracing::info!("no active download sessions");
            return TickOutcome::NoSessions;
        };
        tracing::info!(
            sessions = sample.session_count,
            "current avg speed: {:.2} MiB/s (target {:.2})",
            sample.mean_mib_s,
            self.settings.target_mib_s
        );

        if !should_mitigate(sample.mean_mib_s, self.settings.target_mib_s, self.settings.threshold) {
            return TickOutcome::Healthy(sample);
        }

        tracing::warn!(
            "low speed detected ({:.2} < {:.2} MiB/s), applying mitigation",
            sample.mean_mib_s,
            self.settings.threshold_mib_s()
        );
        self.mitigator.stabilize().await;

        let selected: Vec<&Session> = match self.settings.redrive {
            RedriveScope::All => sessions.iter().collect(),
            RedriveScope::Slow => low_speed_sessions(&sessions, self.settings.threshold_mib_s()),
        };
        let mut namer = self.batch.namer();
        for dest in selected.iter().filter_map(|s| s.destination.as_deref()) {
            namer.reserve(dest);
        }
        let items: Vec<BatchItem> = selected
            .into_iter()
            .enumerate()
            .map(|(i, s)| BatchItem {
                url: s.url.clone(),
                destination: match &s.destination {
                    Some(dest) => dest.clone(),
                    None => namer.next(&s.url, i + 1),
                },
            })
            .collect();
        let redriven = items.len();
        let outcomes = self.batch.run_items(items).await;
        let failed = outcomes.iter().filter(|o| !o.success).count();
        tracing::info!(redriven, failed, "re-drive finished");

        match directive::write_directive(
            &self.settings.directive_path,
            self.settings.directive_bytes_per_sec,
        ) {
            Ok(()) => tracing::info!(
                path = %self.settings.directive_path.display(),
                rate_limit = self.settings.directive_bytes_per_sec,
                "rate-limit directive written"
            ),
            Err(e) => tracing::warn!("rate-limit directive not written: {:#}", e),
        }

        TickOutcome::Mitigated { sample, redriven }
    }
}

async fn watchdog(deadline: Option<Instant>) {
    match deadline {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}
