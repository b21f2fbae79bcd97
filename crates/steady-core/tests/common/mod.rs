//! Shared test doubles: scripted engine, counting mitigation backend, scripted registry.
#![allow(dead_code)]

pub mod http_server;

use async_trait::async_trait;
use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use steady_core::batch::{BatchRunner, BatchSettings};
use steady_core::engine::{TransferEngine, TransferError, TransferHandle, TransferRequest};
use steady_core::mitigation::{MitigationBackend, MitigationError, Mitigator, Primitive};
use steady_core::registry::{RegistryError, Session, SessionRegistry};
use tokio::sync::mpsc;
use tokio::time::Instant;

pub const MIB: f64 = 1024.0 * 1024.0;

/// One scripted attempt: progress values, optional duration, terminal result.
pub struct Attempt {
    pub progress: Vec<f64>,
    pub duration: Duration,
    pub result: Result<u64, TransferError>,
}

impl Attempt {
    pub fn ok(bytes: u64) -> Self {
        Self {
            progress: vec![100.0],
            duration: Duration::ZERO,
            result: Ok(bytes),
        }
    }

    pub fn fail(err: TransferError) -> Self {
        Self {
            progress: Vec::new(),
            duration: Duration::ZERO,
            result: Err(err),
        }
    }

    pub fn with_progress(mut self, progress: &[f64]) -> Self {
        self.progress = progress.to_vec();
        self
    }

    pub fn taking(mut self, duration: Duration) -> Self {
        self.duration = duration;
        self
    }
}

/// Engine that plays back attempts in order (extra attempts succeed with 0 bytes).
/// Progress values are spaced 10ms apart so spawned resets get to run in between.
#[derive(Default)]
pub struct ScriptedEngine {
    script: Mutex<VecDeque<Attempt>>,
    pub requests: Mutex<Vec<TransferRequest>>,
}

impl ScriptedEngine {
    pub fn new(attempts: Vec<Attempt>) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(attempts.into()),
            requests: Mutex::new(Vec::new()),
        })
    }

    pub fn attempts(&self) -> usize {
        self.requests.lock().unwrap().len()
    }

    pub fn urls(&self) -> Vec<String> {
        self.requests
            .lock()
            .unwrap()
            .iter()
            .map(|r| r.url.clone())
            .collect()
    }
}

impl TransferEngine for ScriptedEngine {
    fn start(&self, request: TransferRequest) -> Result<TransferHandle, TransferError> {
        self.requests.lock().unwrap().push(request);
        let attempt = self
            .script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Attempt::ok(0));
        let (tx, rx) = mpsc::unbounded_channel();
        let result = tokio::spawn(async move {
            for p in attempt.progress {
                let _ = tx.send(p);
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
            tokio::time::sleep(attempt.duration).await;
            attempt.result
        });
        Ok(TransferHandle {
            progress: rx,
            result,
        })
    }
}

/// Counts calls per primitive; any primitive listed in `failing` errors.
#[derive(Default)]
pub struct CountingMitigation {
    pub terminate: AtomicUsize,
    pub caches: AtomicUsize,
    pub dns: AtomicUsize,
    pub failing: Vec<Primitive>,
}

impl CountingMitigation {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn hit(&self, counter: &AtomicUsize, p: Primitive) -> Result<(), MitigationError> {
        counter.fetch_add(1, Ordering::SeqCst);
        if self.failing.contains(&p) {
            Err(MitigationError::new(p, "scripted failure"))
        } else {
            Ok(())
        }
    }

    /// Full stabilize runs (the only caller of terminate).
    pub fn stabilizes(&self) -> usize {
        self.terminate.load(Ordering::SeqCst)
    }

    /// Light resets: cache flushes not accounted for by a full stabilize.
    pub fn light_resets(&self) -> usize {
        self.caches.load(Ordering::SeqCst) - self.stabilizes()
    }
}

#[async_trait]
impl MitigationBackend for CountingMitigation {
    async fn terminate_residual_processes(&self) -> Result<(), MitigationError> {
        self.hit(&self.terminate, Primitive::TerminateProcesses)
    }
    async fn flush_caches(&self) -> Result<(), MitigationError> {
        self.hit(&self.caches, Primitive::FlushCaches)
    }
    async fn flush_dns(&self) -> Result<(), MitigationError> {
        self.hit(&self.dns, Primitive::FlushDns)
    }
}

/// Registry behaviour per call.
pub enum Snapshot {
    Sessions(Vec<Session>),
    Unavailable,
}

/// Plays back snapshots in order, then repeats `fallback` forever.
pub struct ScriptedRegistry {
    script: Mutex<VecDeque<Snapshot>>,
    fallback: Snapshot,
    pub calls: Mutex<Vec<Instant>>,
}

impl ScriptedRegistry {
    pub fn new(script: Vec<Snapshot>, fallback: Snapshot) -> Arc<Self> {
        Arc::new(Self {
            script: Mutex::new(script.into()),
            fallback,
            calls: Mutex::new(Vec::new()),
        })
    }

    pub fn always(snapshot: Snapshot) -> Arc<Self> {
        Self::new(Vec::new(), snapshot)
    }

    pub fn call_times(&self) -> Vec<Instant> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SessionRegistry for ScriptedRegistry {
    async fn list_active_sessions(&self) -> Result<Vec<Session>, RegistryError> {
        self.calls.lock().unwrap().push(Instant::now());
        let next = self.script.lock().unwrap().pop_front();
        let snapshot = next.as_ref().unwrap_or(&self.fallback);
        match snapshot {
            Snapshot::Sessions(s) => Ok(s.clone()),
            Snapshot::Unavailable => Err(RegistryError::unavailable("scripted outage")),
        }
    }
}

pub fn session(url: &str, mib_s: f64) -> Session {
    Session {
        id: url.to_string(),
        url: url.to_string(),
        speed: mib_s * MIB,
        destination: None,
    }
}

/// Settings with the production timings (2s backoff, 1s pause) and step 25.
pub fn batch_settings(download_dir: PathBuf, directive_path: Option<PathBuf>) -> BatchSettings {
    BatchSettings {
        max_parallel: 5,
        retry_backoff: Duration::from_secs(2),
        item_pause: Duration::from_secs(1),
        reset_step_percent: 25.0,
        download_dir,
        directive_path,
    }
}

pub fn mitigator(backend: Arc<CountingMitigation>) -> Mitigator {
    Mitigator::new(backend, Duration::from_millis(1500))
}

pub fn batch_runner(
    engine: Arc<ScriptedEngine>,
    backend: Arc<CountingMitigation>,
    settings: BatchSettings,
) -> BatchRunner {
    BatchRunner::new(engine, mitigator(backend), settings)
}
