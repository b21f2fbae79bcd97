//! Typed providers the controller reads from: the active-session registry
//! (polled every monitor tick) and URL providers (feeding a batch).

mod file;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use file::{FileSessionRegistry, UrlListFile};

/// One active transfer as reported by the external registry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    #[serde(default)]
    pub id: String,
    pub url: String,
    /// Current measured speed in bytes per second.
    #[serde(default)]
    pub speed: f64,
    #[serde(default)]
    pub destination: Option<PathBuf>,
}

/// The registry could not produce a snapshot this tick.
#[derive(Debug, thiserror::Error)]
#[error("session registry unavailable: {0}")]
pub struct RegistryError(pub String);

impl RegistryError {
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self(reason.into())
    }
}

/// Source of the active-session snapshot. May return an empty list.
#[async_trait]
pub trait SessionRegistry: Send + Sync {
    async fn list_active_sessions(&self) -> Result<Vec<Session>, RegistryError>;
}

/// Source of an ordered URL list for a batch.
#[async_trait]
pub trait UrlProvider: Send + Sync {
    async fn fetch_urls(&self) -> anyhow::Result<Vec<String>>;
}

/// Fixed in-memory URL list.
#[derive(Debug, Clone, Default)]
pub struct StaticUrls(pub Vec<String>);

#[async_trait]
impl UrlProvider for StaticUrls {
    async fn fetch_urls(&self) -> anyhow::Result<Vec<String>> {
        Ok(self.0.clone())
    }
}
