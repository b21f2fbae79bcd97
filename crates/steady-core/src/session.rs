//! One transfer attempt: start the engine, feed progress to the reset
//! scheduler, collect the terminal outcome.

use std::path::PathBuf;
use std::time::Duration;
use tokio::time::Instant;

use crate::engine::{TransferEngine, TransferError, TransferRequest};
use crate::reset::ResetScheduler;

const MIB: f64 = 1024.0 * 1024.0;

/// Result of one batch item (after its retry, if any).
#[derive(Debug)]
pub struct TransferOutcome {
    pub url: String,
    pub destination: PathBuf,
    pub success: bool,
    pub bytes: u64,
    pub elapsed: Duration,
    /// Transfer attempts made for this item (1 or 2).
    pub attempts: u32,
    /// Failure of the last attempt, if it failed.
    pub error: Option<TransferError>,
}

impl TransferOutcome {
    /// Mean speed of the last attempt in MiB/s (0 if elapsed is 0).
    pub fn speed_mib_s(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes as f64 / MIB / secs
    }
}

/// What one attempt produced.
#[derive(Debug)]
pub struct AttemptResult {
    pub result: Result<u64, TransferError>,
    pub elapsed: Duration,
    pub last_progress: Option<f64>,
}

/// Runs one attempt to completion. Progress values go through `resets`
/// without waiting on any mitigation it spawns.
pub async fn run_transfer(
    engine: &dyn TransferEngine,
    request: TransferRequest,
    resets: &mut ResetScheduler,
) -> AttemptResult {
    let start = Instant::now();
    let url = request.url.clone();
    let mut handle = match engine.start(request) {
        Ok(h) => h,
        Err(e) => {
            return AttemptResult {
                result: Err(e),
                elapsed: start.elapsed(),
                last_progress: None,
            }
        }
    };

    let mut last_progress = None;
    while let Some(p) = handle.progress.recv().await {
        last_progress = Some(p);
        resets.observe(p);
    }

    let result = match handle.result.await {
        Ok(r) => r,
        Err(e) => Err(TransferError::Engine(format!("transfer task join: {}", e))),
    };
    let elapsed = start.elapsed();
    // A light reset spawned by this attempt must not outlive it.
    resets.settle().await;
    match &result {
        Ok(bytes) => tracing::debug!(%url, bytes, ?elapsed, "attempt finished"),
        Err(e) => tracing::debug!(%url, ?last_progress, "attempt failed: {}", e),
    }
    AttemptResult {
        result,
        elapsed,
        last_progress,
    }
}
