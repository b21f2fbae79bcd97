//! External downloader engine (yt-dlp, aria2c, ...): progress parsed from output lines.

use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::process::Command;
use tokio::sync::mpsc;

use super::progress::{parse_percent, ProgressTracker};
use super::{TransferEngine, TransferError, TransferHandle, TransferRequest};

/// Spawns `program` with an argument template per attempt.
///
/// Placeholders: `{url}`, `{dest}`, `{rate}` (bytes/sec, `0` when no directive
/// is in force) and `{user_agent}`. If the program prints nothing for longer
/// than the inactivity timeout it is killed and the attempt fails with `Timeout`.
#[derive(Debug, Clone)]
pub struct CommandEngine {
    program: String,
    args: Vec<String>,
    inactivity_timeout: Duration,
}

impl CommandEngine {
    pub fn new(program: impl Into<String>, args: Vec<String>, inactivity_timeout: Duration) -> Self {
        Self {
            program: program.into(),
            args,
            inactivity_timeout,
        }
    }

    fn render_args(&self, request: &TransferRequest) -> Vec<String> {
        let dest = request.destination.display().to_string();
        let rate = request.rate_limit.unwrap_or(0).to_string();
        self.args
            .iter()
            .map(|a| {
                a.replace("{url}", &request.url)
                    .replace("{dest}", &dest)
                    .replace("{rate}", &rate)
                    .replace("{user_agent}", &request.user_agent)
            })
            .collect()
    }
}

/// Forward every line of `stream` into `tx` until EOF.
fn forward_lines<R>(stream: R, tx: mpsc::UnboundedSender<String>)
where
    R: AsyncRead + Unpin + Send + 'static,
{
    tokio::spawn(async move {
        let mut lines = BufReader::new(stream).lines();
        while let Ok(Some(line)) = lines.next_line().await {
            if tx.send(line).is_err() {
                break;
            }
        }
    });
}

impl TransferEngine for CommandEngine {
    fn start(&self, request: TransferRequest) -> Result<TransferHandle, TransferError> {
        let args = self.render_args(&request);
        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| TransferError::Engine(format!("spawn {}: {}", self.program, e)))?;

        let (line_tx, mut line_rx) = mpsc::unbounded_channel();
        if let Some(stdout) = child.stdout.take() {
            forward_lines(stdout, line_tx.clone());
        }
        if let Some(stderr) = child.stderr.take() {
            forward_lines(stderr, line_tx.clone());
        }
        drop(line_tx);

        let (progress_tx, progress_rx) = mpsc::unbounded_channel();
        let inactivity = self.inactivity_timeout;
        let program = self.program.clone();
        let result = tokio::spawn(async move {
            let mut tracker = ProgressTracker::default();
            loop {
                match tokio::time::timeout(inactivity, line_rx.recv()).await {
                    Ok(Some(line)) => {
                        if let Some(p) = parse_percent(&line).and_then(|p| tracker.advance(p)) {
                            let _ = progress_tx.send(p);
                        }
                    }
                    Ok(None) => break,
                    Err(_) => {
                        tracing::warn!(%program, url = %request.url, "engine idle, killing");
                        let _ = child.kill().await;
                        return Err(TransferError::Timeout);
                    }
                }
            }

            // Output closed; the process still gets one inactivity window to exit.
            let status = match tokio::time::timeout(inactivity, child.wait()).await {
                Ok(waited) => {
                    waited.map_err(|e| TransferError::Engine(format!("wait {}: {}", program, e)))?
                }
                Err(_) => {
                    tracing::warn!(%program, url = %request.url, "engine closed its output but kept running, killing");
                    let _ = child.kill().await;
                    return Err(TransferError::Timeout);
                }
            };
            match status.code() {
                Some(0) => {}
                Some(code) => return Err(TransferError::NonSuccessStatus(code as u32)),
                None => return Err(TransferError::Engine(format!("{} killed by signal", program))),
            }

            if let Some(p) = tracker.advance(100.0) {
                let _ = progress_tx.send(p);
            }
            let bytes = tokio::fs::metadata(&request.destination)
                .await
                .map(|m| m.len())
                .unwrap_or(0);
            Ok::<u64, TransferError>(bytes)
        });

        Ok(TransferHandle {
            progress: progress_rx,
            result,
        })
    }
}
