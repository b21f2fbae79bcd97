//! Mitigation primitives: terminate residual downloader processes, flush local
//! caches, flush the DNS cache.
//!
//! Each primitive can fail on its own; `Mitigator` runs them in a fixed order,
//! logs any failure with the primitive's name and keeps going.

mod system;

use async_trait::async_trait;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

pub use system::SystemMitigation;

/// The three primitives, in `stabilize()` order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    TerminateProcesses,
    FlushCaches,
    FlushDns,
}

impl fmt::Display for Primitive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Primitive::TerminateProcesses => "terminate-residual-processes",
            Primitive::FlushCaches => "flush-caches",
            Primitive::FlushDns => "flush-dns",
        };
        f.write_str(name)
    }
}

/// A single primitive failed.
#[derive(Debug, thiserror::Error)]
#[error("{primitive} failed: {reason}")]
pub struct MitigationError {
    pub primitive: Primitive,
    pub reason: String,
}

impl MitigationError {
    pub fn new(primitive: Primitive, reason: impl Into<String>) -> Self {
        Self {
            primitive,
            reason: reason.into(),
        }
    }
}

/// The OS-facing operations. Implementations must be idempotent: two overlapping
/// calls leave the resource in the same clean state as one.
#[async_trait]
pub trait MitigationBackend: Send + Sync {
    async fn terminate_residual_processes(&self) -> Result<(), MitigationError>;
    async fn flush_caches(&self) -> Result<(), MitigationError>;
    async fn flush_dns(&self) -> Result<(), MitigationError>;
}

/// Which primitives failed during one mitigation run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StabilizeReport {
    pub failed: Vec<Primitive>,
}

impl StabilizeReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Runs primitives best-effort. Cheap to clone; shared by the monitor, the
/// batch runner and every reset scheduler.
#[derive(Clone)]
pub struct Mitigator {
    backend: Arc<dyn MitigationBackend>,
    settle_delay: Duration,
}

impl Mitigator {
    pub fn new(backend: Arc<dyn MitigationBackend>, settle_delay: Duration) -> Self {
        Self {
            backend,
            settle_delay,
        }
    }

    /// Full reset: terminate → clear caches → flush DNS, then wait the settle delay.
    pub async fn stabilize(&self) -> StabilizeReport {
        tracing::info!("resetting transfer environment");
        let mut report = StabilizeReport::default();
        record(
            &mut report,
            Primitive::TerminateProcesses,
            self.backend.terminate_residual_processes().await,
        );
        record(
            &mut report,
            Primitive::FlushCaches,
            self.backend.flush_caches().await,
        );
        record(&mut report, Primitive::FlushDns, self.backend.flush_dns().await);
        tokio::time::sleep(self.settle_delay).await;
        if report.is_clean() {
            tracing::info!("stabilize complete");
        } else {
            tracing::warn!(failed = ?report.failed, "stabilize completed with failures");
        }
        report
    }

    /// Mid-transfer nudge: clear caches and flush DNS. Never terminates
    /// processes (the running transfer may be one of them) and does not settle.
    pub async fn light_reset(&self) -> StabilizeReport {
        let mut report = StabilizeReport::default();
        record(
            &mut report,
            Primitive::FlushCaches,
            self.backend.flush_caches().await,
        );
        record(&mut report, Primitive::FlushDns, self.backend.flush_dns().await);
        tracing::debug!(failed = ?report.failed, "light reset done");
        report
    }
}

fn record(report: &mut StabilizeReport, primitive: Primitive, result: Result<(), MitigationError>) {
    match result {
        Ok(()) => tracing::debug!(%primitive, "mitigation ok"),
        Err(e) => {
            tracing::warn!(%primitive, "mitigation failed: {}", e);
            report.failed.push(primitive);
        }
    }
}
