//! Bounded batch runner: stabilize, transfer, retry once, pause, next URL.
//!
//! A counting gate caps live sessions at `max_parallel`, but items run in
//! order: each item's stabilize step must finish before its transfer starts,
//! so the batch itself never has more than one session live. Item failures
//! are recorded, never raised.

mod naming;

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Semaphore;

use crate::config::StabilizerConfig;
use crate::directive;
use crate::engine::{TransferEngine, TransferRequest};
use crate::mitigation::Mitigator;
use crate::reset::ResetScheduler;
use crate::session::{run_transfer, TransferOutcome};

pub use naming::{destination_for, DestinationNamer};

/// Transfer attempts per item: the first plus exactly one retry.
pub const MAX_ATTEMPTS: u32 = 2;

/// One URL and where it should land.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchItem {
    pub url: String,
    pub destination: PathBuf,
}

/// Timing and placement for a batch.
#[derive(Debug, Clone)]
pub struct BatchSettings {
    pub max_parallel: usize,
    pub retry_backoff: Duration,
    pub item_pause: Duration,
    pub reset_step_percent: f64,
    pub download_dir: PathBuf,
    /// Rate-limit directive consulted before every attempt.
    pub directive_path: Option<PathBuf>,
}

impl BatchSettings {
    pub fn from_config(cfg: &StabilizerConfig, download_dir: PathBuf) -> Self {
        Self {
            max_parallel: cfg.max_parallel,
            retry_backoff: cfg.retry_backoff(),
            item_pause: cfg.item_pause(),
            reset_step_percent: cfg.reset_step_percent,
            download_dir,
            directive_path: Some(cfg.directive_path.clone()),
        }
    }
}

#[derive(Clone)]
pub struct BatchRunner {
    engine: Arc<dyn TransferEngine>,
    mitigator: Mitigator,
    gate: Arc<Semaphore>,
    settings: BatchSettings,
}

impl BatchRunner {
    pub fn new(engine: Arc<dyn TransferEngine>, mitigator: Mitigator, settings: BatchSettings) -> Self {
        let permits = settings.max_parallel.max(1);
        Self {
            engine,
            mitigator,
            gate: Arc::new(Semaphore::new(permits)),
            settings,
        }
    }

    /// Namer for one batch's destinations inside the download dir.
    pub fn namer(&self) -> DestinationNamer {
        DestinationNamer::new(&self.settings.download_dir)
    }

    /// Items for `urls`, named from the URL inside the download dir. Names are
    /// unique within the batch.
    pub fn items_for(&self, urls: &[String]) -> Vec<BatchItem> {
        let mut namer = self.namer();
        urls.iter()
            .enumerate()
            .map(|(i, url)| BatchItem {
                url: url.clone(),
                destination: namer.next(url, i + 1),
            })
            .collect()
    }

    /// Runs `urls` in order; one outcome per URL.
    pub async fn run(&self, urls: &[String]) -> Vec<TransferOutcome> {
        self.run_items(self.items_for(urls)).await
    }

    /// Runs explicit items in order; one outcome per item.
    pub async fn run_items(&self, items: Vec<BatchItem>) -> Vec<TransferOutcome> {
        let total = items.len();
        let mut outcomes = Vec::with_capacity(total);
        for (idx, item) in items.into_iter().enumerate() {
            tracing::info!(url = %item.url, "starting download {}/{}", idx + 1, total);
            self.mitigator.stabilize().await;

            let outcome = self.run_item(item).await;
            if outcome.success {
                tracing::info!(
                    url = %outcome.url,
                    bytes = outcome.bytes,
                    attempts = outcome.attempts,
                    "downloaded {} @ {:.2} MiB/s",
                    outcome.destination.display(),
                    outcome.speed_mib_s()
                );
            } else {
                tracing::warn!(
                    url = %outcome.url,
                    attempts = outcome.attempts,
                    "download failed: {}",
                    outcome
                        .error
                        .as_ref()
                        .map(|e| e.to_string())
                        .unwrap_or_default()
                );
            }
            outcomes.push(outcome);

            tokio::time::sleep(self.settings.item_pause).await;
        }
        outcomes
    }

    async fn run_item(&self, item: BatchItem) -> TransferOutcome {
        // The semaphore is never closed, so acquire only fails if that changes.
        let _permit = self.gate.acquire().await.ok();

        let mut attempts = 0u32;
        loop {
            attempts += 1;
            let rate_limit = self
                .settings
                .directive_path
                .as_deref()
                .and_then(directive::read_directive);
            let request = TransferRequest::new(item.url.clone(), item.destination.clone(), rate_limit);
            let mut resets = ResetScheduler::new(self.mitigator.clone(), self.settings.reset_step_percent);
            let attempt = run_transfer(self.engine.as_ref(), request, &mut resets).await;

            match attempt.result {
                Ok(bytes) => {
                    return TransferOutcome {
                        url: item.url,
                        destination: item.destination,
                        success: true,
                        bytes,
                        elapsed: attempt.elapsed,
                        attempts,
                        error: None,
                    }
                }
                Err(e) if attempts < MAX_ATTEMPTS => {
                    tracing::warn!(url = %item.url, "attempt {} failed: {}; retrying after reset", attempts, e);
                    tokio::time::sleep(self.settings.retry_backoff).await;
                }
                Err(e) => {
                    return TransferOutcome {
                        url: item.url,
                        destination: item.destination,
                        success: false,
                        bytes: 0,
                        elapsed: attempt.elapsed,
                        attempts,
                        error: Some(e),
                    }
                }
            }
        }
    }
}
