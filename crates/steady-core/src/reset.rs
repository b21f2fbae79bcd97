//! Mid-transfer resets driven by progress checkpoints.
//!
//! Every time progress advances by at least `step` percent past the last
//! checkpoint, the checkpoint moves to the observed value and a light
//! mitigation is spawned. At most one mitigation runs per session; a crossing
//! while one is still running is dropped, not queued.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::mitigation::Mitigator;

/// Whether a mitigation spawned by this scheduler is still running.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetState {
    Idle,
    Running,
}

/// What `observe` did with a progress value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResetTrigger {
    /// Below the next checkpoint.
    Skipped,
    /// Checkpoint advanced and a mitigation was spawned.
    Fired,
    /// Checkpoint advanced but a mitigation was already running.
    Dropped,
}

/// Per-session scheduler. Create one per transfer attempt.
pub struct ResetScheduler {
    mitigator: Mitigator,
    step: f64,
    checkpoint: f64,
    running: Arc<AtomicBool>,
    in_flight: Option<JoinHandle<()>>,
    fired: u32,
    dropped: u32,
}

impl ResetScheduler {
    pub fn new(mitigator: Mitigator, step_percent: f64) -> Self {
        Self {
            mitigator,
            step: step_percent,
            checkpoint: 0.0,
            running: Arc::new(AtomicBool::new(false)),
            in_flight: None,
            fired: 0,
            dropped: 0,
        }
    }

    /// Last percentage at which a reset was due (0 before the first).
    pub fn checkpoint(&self) -> f64 {
        self.checkpoint
    }

    pub fn state(&self) -> ResetState {
        if self.running.load(Ordering::Acquire) {
            ResetState::Running
        } else {
            ResetState::Idle
        }
    }

    /// Mitigations actually spawned.
    pub fn fired(&self) -> u32 {
        self.fired
    }

    /// Crossings dropped because a mitigation was still running.
    pub fn dropped(&self) -> u32 {
        self.dropped
    }

    /// Feed one progress value. Never waits on the mitigation.
    pub fn observe(&mut self, percent: f64) -> ResetTrigger {
        if !(percent - self.checkpoint >= self.step) {
            return ResetTrigger::Skipped;
        }
        self.checkpoint = percent;

        if self
            .running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.dropped += 1;
            tracing::debug!(checkpoint = percent, "reset still running, trigger dropped");
            return ResetTrigger::Dropped;
        }

        self.fired += 1;
        tracing::debug!(checkpoint = percent, "mid-transfer reset");
        let mitigator = self.mitigator.clone();
        let running = Arc::clone(&self.running);
        self.in_flight = Some(tokio::spawn(async move {
            let report = mitigator.light_reset().await;
            if !report.is_clean() {
                tracing::warn!(failed = ?report.failed, "mid-transfer reset had failures");
            }
            running.store(false, Ordering::Release);
        }));
        ResetTrigger::Fired
    }

    /// Wait for the in-flight mitigation, if any.
    pub async fn settle(&mut self) {
        if let Some(handle) = self.in_flight.take() {
            if let Err(e) = handle.await {
                tracing::warn!("mid-transfer reset task: {}", e);
                self.running.store(false, Ordering::Release);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mitigation::{MitigationBackend, MitigationError};
    use async_trait::async_trait;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;
    use tokio::sync::Notify;

    /// Counts light resets; optionally blocks each one until released.
    struct Gated {
        resets: AtomicUsize,
        gate: Option<Arc<Notify>>,
    }

    #[async_trait]
    impl MitigationBackend for Gated {
        async fn terminate_residual_processes(&self) -> Result<(), MitigationError> {
            Ok(())
        }
        async fn flush_caches(&self) -> Result<(), MitigationError> {
            self.resets.fetch_add(1, Ordering::SeqCst);
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            Ok(())
        }
        async fn flush_dns(&self) -> Result<(), MitigationError> {
            Ok(())
        }
    }

    fn scheduler(gate: Option<Arc<Notify>>, step: f64) -> (ResetScheduler, Arc<Gated>) {
        let backend = Arc::new(Gated {
            resets: AtomicUsize::new(0),
            gate,
        });
        let m = Mitigator::new(backend.clone(), Duration::ZERO);
        (ResetScheduler::new(m, step), backend)
    }

    #[tokio::test]
    async fn fires_on_each_step_crossing() {
        let (mut s, backend) = scheduler(None, 25.0);
        let mut checkpoints = Vec::new();
        for p in [10.0, 24.0, 26.0, 51.0, 80.0] {
            if s.observe(p) != ResetTrigger::Skipped {
                checkpoints.push(s.checkpoint());
            }
            s.settle().await;
        }
        assert_eq!(checkpoints, vec![26.0, 51.0, 80.0]);
        assert_eq!(s.fired(), 3);
        assert_eq!(backend.resets.load(Ordering::SeqCst), 3);
        assert_eq!(s.state(), ResetState::Idle);
    }

    #[tokio::test]
    async fn checkpoint_never_decreases() {
        let (mut s, _) = scheduler(None, 25.0);
        assert_eq!(s.observe(60.0), ResetTrigger::Fired);
        s.settle().await;
        assert_eq!(s.observe(30.0), ResetTrigger::Skipped);
        assert_eq!(s.checkpoint(), 60.0);
        assert_eq!(s.observe(84.9), ResetTrigger::Skipped);
        assert_eq!(s.observe(85.0), ResetTrigger::Fired);
        assert_eq!(s.checkpoint(), 85.0);
    }

    #[tokio::test]
    async fn crossing_while_busy_is_dropped_not_queued() {
        let gate = Arc::new(Notify::new());
        let (mut s, backend) = scheduler(Some(Arc::clone(&gate)), 25.0);

        assert_eq!(s.observe(30.0), ResetTrigger::Fired);
        // Let the spawned task reach the gate.
        while backend.resets.load(Ordering::SeqCst) == 0 {
            tokio::task::yield_now().await;
        }
        assert_eq!(s.state(), ResetState::Running);

        assert_eq!(s.observe(60.0), ResetTrigger::Dropped);
        assert_eq!(s.checkpoint(), 60.0);
        assert_eq!(s.dropped(), 1);

        gate.notify_one();
        s.settle().await;
        assert_eq!(s.state(), ResetState::Idle);
        assert_eq!(backend.resets.load(Ordering::SeqCst), 1);

        assert_eq!(s.observe(90.0), ResetTrigger::Fired);
        gate.notify_one();
        s.settle().await;
        assert_eq!(backend.resets.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn full_step_fires_only_at_completion() {
        let (mut s, _) = scheduler(None, 100.0);
        assert_eq!(s.observe(99.0), ResetTrigger::Skipped);
        assert_eq!(s.observe(100.0), ResetTrigger::Fired);
        s.settle().await;
    }
}
