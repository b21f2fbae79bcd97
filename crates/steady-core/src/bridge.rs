//! Entry points that pair a reset with a batch: `run_with_stabilizer` for a
//! known URL list, `connect_and_run` when the URLs come from a provider.

use crate::batch::BatchRunner;
use crate::mitigation::Mitigator;
use crate::registry::UrlProvider;
use crate::session::TransferOutcome;

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("no URL list provided and the provider returned none")]
    NoUrls,
    #[error("URL provider failed: {0:#}")]
    Provider(anyhow::Error),
}

/// Stabilize once, then run the batch.
pub async fn run_with_stabilizer(
    mitigator: &Mitigator,
    batch: &BatchRunner,
    urls: &[String],
) -> Vec<TransferOutcome> {
    mitigator.stabilize().await;
    let outcomes = batch.run(urls).await;
    let ok = outcomes.iter().filter(|o| o.success).count();
    tracing::info!(total = outcomes.len(), ok, "batch finished");
    outcomes
}

/// Use `urls` if non-empty, otherwise fetch them from `provider`; then
/// `run_with_stabilizer`.
pub async fn connect_and_run(
    provider: &dyn UrlProvider,
    urls: Vec<String>,
    mitigator: &Mitigator,
    batch: &BatchRunner,
) -> Result<Vec<TransferOutcome>, BridgeError> {
    let urls = if urls.is_empty() {
        provider.fetch_urls().await.map_err(BridgeError::Provider)?
    } else {
        urls
    };
    if urls.is_empty() {
        return Err(BridgeError::NoUrls);
    }
    tracing::info!(count = urls.len(), "URL list ready");
    Ok(run_with_stabilizer(mitigator, batch, &urls).await)
}
