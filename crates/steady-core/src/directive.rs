//! Rate-limit directive: a small JSON file, `{"rate_limit": <bytes per second>}`,
//! that the transfer engine picks up on its next invocation.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RateDirective {
    /// Byte-rate ceiling in bytes per second.
    pub rate_limit: u64,
}

/// Write the directive atomically (temp file in the same directory, then rename),
/// so a reader never sees a half-written file.
pub fn write_directive(path: &Path, bytes_per_sec: u64) -> Result<()> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create directive dir: {}", dir.display()))?;

    let body = serde_json::to_vec(&RateDirective {
        rate_limit: bytes_per_sec,
    })?;
    let mut tmp = tempfile::NamedTempFile::new_in(dir)
        .with_context(|| format!("create temp directive in {}", dir.display()))?;
    tmp.write_all(&body)?;
    tmp.flush()?;
    tmp.persist(path)
        .with_context(|| format!("persist directive: {}", path.display()))?;
    Ok(())
}

/// Read the directive if present. Missing or malformed files mean "no limit".
pub fn read_directive(path: &Path) -> Option<u64> {
    let data = std::fs::read(path).ok()?;
    match serde_json::from_slice::<RateDirective>(&data) {
        Ok(d) => Some(d.rate_limit),
        Err(e) => {
            tracing::warn!(path = %path.display(), "ignoring malformed rate directive: {}", e);
            None
        }
    }
}
