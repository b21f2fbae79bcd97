//! File-backed registry and URL list.

use anyhow::Context;
use async_trait::async_trait;
use std::path::{Path, PathBuf};

use super::{RegistryError, Session, SessionRegistry, UrlProvider};

/// Reads a JSON array of sessions that the external engine rewrites as
/// transfers progress, e.g.
/// `[{"id": "a1", "url": "https://...", "speed": 1048576.0}]`.
#[derive(Debug, Clone)]
pub struct FileSessionRegistry {
    path: PathBuf,
}

impl FileSessionRegistry {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl SessionRegistry for FileSessionRegistry {
    async fn list_active_sessions(&self) -> Result<Vec<Session>, RegistryError> {
        let data = tokio::fs::read(&self.path)
            .await
            .map_err(|e| RegistryError::unavailable(format!("{}: {}", self.path.display(), e)))?;
        if data.iter().all(|b| b.is_ascii_whitespace()) {
            return Ok(Vec::new());
        }
        serde_json::from_slice(&data)
            .map_err(|e| RegistryError::unavailable(format!("{}: {}", self.path.display(), e)))
    }
}

/// One URL per line; blank lines and `#` comments are skipped.
#[derive(Debug, Clone)]
pub struct UrlListFile {
    path: PathBuf,
}

impl UrlListFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

fn parse_url_list(text: &str) -> Vec<String> {
    text.lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'))
        .map(str::to_string)
        .collect()
}

#[async_trait]
impl UrlProvider for UrlListFile {
    async fn fetch_urls(&self) -> anyhow::Result<Vec<String>> {
        let text = tokio::fs::read_to_string(&self.path)
            .await
            .with_context(|| format!("read URL list: {}", self.path.display()))?;
        Ok(parse_url_list(&text))
    }
}
