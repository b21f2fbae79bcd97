//! `steady reset` – one full stabilize.

use anyhow::Result;

use super::Runtime;

pub async fn run_reset(rt: &Runtime) -> Result<()> {
    let report = rt.mitigator.stabilize().await;
    if report.is_clean() {
        println!("Reset complete.");
    } else {
        let failed: Vec<String> = report.failed.iter().map(|p| p.to_string()).collect();
        println!("Reset complete with failures: {}", failed.join(", "));
    }
    Ok(())
}
