//! libcurl transfer engine: one GET per attempt, streamed to the destination.
//!
//! Connections are never reused (fresh connect, forbid reuse) so every attempt
//! starts from a new TCP session.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::time::Duration;
use tokio::sync::mpsc;

use super::progress::ProgressTracker;
use super::{TransferEngine, TransferError, TransferHandle, TransferRequest};

/// Classify a curl error: timeouts apart, everything is a network failure.
pub fn classify_curl_error(e: &curl::Error) -> TransferError {
    if e.is_operation_timedout() {
        return TransferError::Timeout;
    }
    TransferError::Network(e.to_string())
}

fn curl_err(e: curl::Error) -> TransferError {
    classify_curl_error(&e)
}

/// Runs GETs through libcurl on tokio's blocking pool.
#[derive(Debug, Clone)]
pub struct CurlEngine {
    /// Both the connect timeout and the read-inactivity window.
    timeout: Duration,
}

impl CurlEngine {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

impl TransferEngine for CurlEngine {
    fn start(&self, request: TransferRequest) -> Result<TransferHandle, TransferError> {
        let (tx, rx) = mpsc::unbounded_channel();
        let timeout = self.timeout;
        let task = tokio::task::spawn_blocking(move || perform(&request, timeout, tx));
        let result = tokio::spawn(async move {
            task.await
                .map_err(|e| TransferError::Engine(format!("transfer task join: {}", e)))?
        });
        Ok(TransferHandle {
            progress: rx,
            result,
        })
    }
}

/// Blocking body of one attempt. Returns bytes written.
fn perform(
    request: &TransferRequest,
    timeout: Duration,
    progress_tx: mpsc::UnboundedSender<f64>,
) -> Result<u64, TransferError> {
    let file = File::create(&request.destination).map_err(TransferError::Storage)?;
    let mut writer = BufWriter::with_capacity(1024 * 1024, file);

    let mut easy = curl::easy::Easy::new();
    easy.url(&request.url).map_err(curl_err)?;
    easy.follow_location(true).map_err(curl_err)?;
    easy.max_redirections(10).map_err(curl_err)?;
    easy.useragent(&request.user_agent).map_err(curl_err)?;
    easy.fresh_connect(true).map_err(curl_err)?;
    easy.forbid_reuse(true).map_err(curl_err)?;
    easy.connect_timeout(timeout).map_err(curl_err)?;
    // Abort when fewer than 1 byte/s arrives for `timeout`: read inactivity.
    easy.low_speed_limit(1).map_err(curl_err)?;
    easy.low_speed_time(timeout).map_err(curl_err)?;
    if let Some(rate) = request.rate_limit {
        easy.max_recv_speed(rate).map_err(curl_err)?;
    }
    easy.progress(true).map_err(curl_err)?;

    let mut written = 0u64;
    let mut write_error: Option<std::io::Error> = None;
    let mut tracker = ProgressTracker::default();

    let performed = {
        let mut transfer = easy.transfer();
        transfer
            .write_function(|data| match writer.write_all(data) {
                Ok(()) => {
                    written += data.len() as u64;
                    Ok(data.len())
                }
                Err(e) => {
                    tracing::warn!("transfer write failed: {}", e);
                    write_error = Some(e);
                    Ok(0) // abort transfer
                }
            })
            .map_err(curl_err)?;
        transfer
            .progress_function(|dltotal, dlnow, _, _| {
                if dltotal > 0.0 {
                    if let Some(p) = tracker.advance(dlnow / dltotal * 100.0) {
                        let _ = progress_tx.send(p);
                    }
                }
                true
            })
            .map_err(curl_err)?;
        transfer.perform()
    };

    if let Some(e) = write_error {
        return Err(TransferError::Storage(e));
    }
    performed.map_err(curl_err)?;
    writer.flush().map_err(TransferError::Storage)?;

    let code = easy.response_code().map_err(curl_err)?;
    if !(200..300).contains(&code) {
        return Err(TransferError::NonSuccessStatus(code));
    }

    if let Some(p) = tracker.advance(100.0) {
        let _ = progress_tx.send(p);
    }
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn destination_in_missing_dir_is_storage_error() {
        let dir = tempfile::tempdir().unwrap();
        let request = TransferRequest::new(
            "http://127.0.0.1:9/never",
            dir.path().join("missing").join("out.bin"),
            None,
        );
        let (tx, _rx) = mpsc::unbounded_channel();
        let err = perform(&request, Duration::from_secs(1), tx).unwrap_err();
        assert!(matches!(err, TransferError::Storage(_)));
    }
}
