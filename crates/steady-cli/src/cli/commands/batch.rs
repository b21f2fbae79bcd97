//! `steady batch [URLS]...` – reset, download, retry once, next.

use anyhow::Result;
use std::path::PathBuf;
use steady_core::bridge;
use steady_core::registry::{StaticUrls, UrlListFile, UrlProvider};

use super::Runtime;

pub async fn run_batch(rt: &Runtime, urls: Vec<String>, from_file: Option<PathBuf>) -> Result<()> {
    let provider: Box<dyn UrlProvider> = match from_file {
        Some(path) => Box::new(UrlListFile::new(path)),
        None => Box::new(StaticUrls::default()),
    };
    let outcomes = bridge::connect_and_run(provider.as_ref(), urls, &rt.mitigator, &rt.batch).await?;

    println!("{:<8} {:<9} {:>12} {:>8}  {}", "RESULT", "ATTEMPTS", "BYTES", "MiB/s", "URL");
    for o in &outcomes {
        println!(
            "{:<8} {:<9} {:>12} {:>8.2}  {}",
            if o.success { "ok" } else { "failed" },
            o.attempts,
            o.bytes,
            o.speed_mib_s(),
            o.url
        );
    }
    let failed = outcomes.iter().filter(|o| !o.success).count();
    if failed > 0 {
        anyhow::bail!("{} of {} downloads failed", failed, outcomes.len());
    }
    Ok(())
}
