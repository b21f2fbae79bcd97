//! Transfer engines: the capability that moves bytes from a URL to a file.
//!
//! An engine starts one attempt and hands back a `TransferHandle`: a channel of
//! progress percentages (finite, non-decreasing) and the attempt's terminal
//! result. The default engine drives libcurl on a blocking thread; the command
//! engine runs an external downloader and parses `NN%` markers from its output.

mod command;
mod http;
mod progress;

use anyhow::Result;
use rand::seq::SliceRandom;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::config::{EngineBackend, StabilizerConfig};

pub use self::command::CommandEngine;
pub use self::http::{classify_curl_error, CurlEngine};
pub use self::progress::{parse_percent, ProgressTracker};

/// Client identities rotated per attempt.
pub const USER_AGENTS: [&str; 3] = [
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64)",
    "Mozilla/5.0 (X11; Linux x86_64)",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7)",
];

/// Picks a random user agent from `USER_AGENTS`.
pub fn pick_user_agent() -> &'static str {
    USER_AGENTS
        .choose(&mut rand::thread_rng())
        .copied()
        .unwrap_or(USER_AGENTS[0])
}

/// Why a transfer attempt failed.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    /// Connection refused/reset, DNS failure, TLS error and the like.
    #[error("network error: {0}")]
    Network(String),
    /// No connection within the connect timeout, or the stream went idle
    /// longer than the read-inactivity timeout.
    #[error("timed out")]
    Timeout,
    /// Server answered with a non-2xx status (or the external engine exited non-zero).
    #[error("non-success status {0}")]
    NonSuccessStatus(u32),
    /// Writing the destination failed.
    #[error("storage: {0}")]
    Storage(#[source] std::io::Error),
    /// The engine could not be started or its task died.
    #[error("engine: {0}")]
    Engine(String),
}

impl TransferError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, TransferError::Timeout)
    }
}

/// One attempt's inputs.
#[derive(Debug, Clone)]
pub struct TransferRequest {
    pub url: String,
    pub destination: PathBuf,
    /// Byte-rate ceiling for the engine, if a directive is in force.
    pub rate_limit: Option<u64>,
    pub user_agent: String,
}

impl TransferRequest {
    /// Request with a freshly picked user agent.
    pub fn new(url: impl Into<String>, destination: impl Into<PathBuf>, rate_limit: Option<u64>) -> Self {
        Self {
            url: url.into(),
            destination: destination.into(),
            rate_limit,
            user_agent: pick_user_agent().to_string(),
        }
    }
}

/// A running attempt. `progress` closes when the attempt ends; `result` yields
/// the number of bytes written on success.
pub struct TransferHandle {
    pub progress: mpsc::UnboundedReceiver<f64>,
    pub result: JoinHandle<Result<u64, TransferError>>,
}

/// Starts transfer attempts. Must be called from within a tokio runtime.
pub trait TransferEngine: Send + Sync {
    fn start(&self, request: TransferRequest) -> Result<TransferHandle, TransferError>;
}

/// Builds the engine selected in the config.
pub fn engine_from_config(cfg: &StabilizerConfig) -> Result<Arc<dyn TransferEngine>> {
    match cfg.engine.backend {
        EngineBackend::Curl => Ok(Arc::new(CurlEngine::new(cfg.request_timeout()))),
        EngineBackend::Command => {
            let program = cfg
                .engine
                .program
                .clone()
                .ok_or_else(|| anyhow::anyhow!("engine.backend = \"command\" needs engine.program"))?;
            Ok(Arc::new(CommandEngine::new(
                program,
                cfg.engine.args.clone(),
                cfg.request_timeout(),
            )))
        }
    }
}
