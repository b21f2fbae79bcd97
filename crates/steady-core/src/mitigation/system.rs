//! Mitigation primitives backed by system commands and the filesystem.

use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::PathBuf;
use std::process::Stdio;
use tokio::process::Command;

use super::{MitigationBackend, MitigationError, Primitive};
use crate::config::MitigationConfig;

/// Uses `pkill`, directory removal and the platform DNS flush command.
#[derive(Debug, Clone)]
pub struct SystemMitigation {
    residual_processes: Vec<String>,
    cache_dirs: Vec<PathBuf>,
}

impl SystemMitigation {
    pub fn new(cfg: &MitigationConfig) -> Self {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        Self {
            residual_processes: cfg.residual_processes.clone(),
            cache_dirs: cfg
                .cache_dirs
                .iter()
                .map(|d| expand_home(d, home.as_ref()))
                .collect(),
        }
    }

    pub fn cache_dirs(&self) -> &[PathBuf] {
        &self.cache_dirs
    }
}

/// Expand a leading `~/` against `home`. Without a home the path is kept as is.
fn expand_home(path: &str, home: Option<&PathBuf>) -> PathBuf {
    match (path.strip_prefix("~/"), home) {
        (Some(rest), Some(home)) => home.join(rest),
        _ => PathBuf::from(path),
    }
}

/// Runs a command quietly and returns its exit code (None when killed by a signal).
async fn run_quiet(program: &str, args: &[&str]) -> std::io::Result<Option<i32>> {
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .await?;
    Ok(status.code())
}

#[async_trait]
impl MitigationBackend for SystemMitigation {
    async fn terminate_residual_processes(&self) -> Result<(), MitigationError> {
        let mut failures = Vec::new();
        for name in &self.residual_processes {
            // pkill exits 1 when nothing matched, which is the clean state we want.
            match run_quiet("pkill", &["-f", name.as_str()]).await {
                Ok(Some(0)) | Ok(Some(1)) => {}
                Ok(code) => failures.push(format!("pkill -f {}: exit {:?}", name, code)),
                Err(e) => failures.push(format!("pkill -f {}: {}", name, e)),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MitigationError::new(
                Primitive::TerminateProcesses,
                failures.join("; "),
            ))
        }
    }

    async fn flush_caches(&self) -> Result<(), MitigationError> {
        let mut failures = Vec::new();
        for dir in &self.cache_dirs {
            match tokio::fs::remove_dir_all(dir).await {
                Ok(()) => tracing::debug!(path = %dir.display(), "cache removed"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => failures.push(format!("{}: {}", dir.display(), e)),
            }
        }
        if failures.is_empty() {
            Ok(())
        } else {
            Err(MitigationError::new(Primitive::FlushCaches, failures.join("; ")))
        }
    }

    async fn flush_dns(&self) -> Result<(), MitigationError> {
        let candidates: Vec<(&str, Vec<&str>)> = if cfg!(target_os = "windows") {
            vec![("ipconfig", vec!["/flushdns"])]
        } else if cfg!(target_os = "macos") {
            vec![("dscacheutil", vec!["-flushcache"])]
        } else {
            vec![
                ("resolvectl", vec!["flush-caches"]),
                ("systemd-resolve", vec!["--flush-caches"]),
            ]
        };

        let mut last_err = String::from("no DNS flush command available");
        for (program, args) in candidates {
            match run_quiet(program, &args).await {
                Ok(Some(0)) => {
                    tracing::debug!(program, "DNS cache flushed");
                    return Ok(());
                }
                Ok(code) => last_err = format!("{} exited with {:?}", program, code),
                Err(e) => last_err = format!("{}: {}", program, e),
            }
        }
        Err(MitigationError::new(Primitive::FlushDns, last_err))
    }
}
