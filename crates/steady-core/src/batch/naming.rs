//! Destination file names for batch items.

use std::collections::HashSet;
use std::path::{Path, PathBuf};

/// Longest name most Linux filesystems accept (NAME_MAX).
const NAME_MAX: usize = 255;

/// Local file for the `index`-th (1-based) URL of a batch inside `dir`.
///
/// Uses the last URL path segment, made filesystem-safe; falls back to
/// `download_<index>.bin` when the URL has no usable segment.
pub fn destination_for(dir: &Path, url: &str, index: usize) -> PathBuf {
    let name = url_file_name(url)
        .map(|n| sanitize(&n))
        .filter(|n| !n.is_empty() && n != "." && n != "..")
        .unwrap_or_else(|| format!("download_{}.bin", index));
    dir.join(name)
}

/// Hands out destinations for one batch, never the same path twice.
///
/// A name already issued gets `_2`, `_3`, ... inserted before its extension,
/// so `watch?v=A` and `watch?v=B` land in `watch` and `watch_2`.
#[derive(Debug, Clone)]
pub struct DestinationNamer {
    dir: PathBuf,
    issued: HashSet<PathBuf>,
}

impl DestinationNamer {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            issued: HashSet::new(),
        }
    }

    /// Mark a path chosen elsewhere (e.g. a session's own destination) as taken.
    pub fn reserve(&mut self, path: &Path) {
        self.issued.insert(path.to_path_buf());
    }

    /// Destination for the `index`-th (1-based) URL, unique within this namer.
    pub fn next(&mut self, url: &str, index: usize) -> PathBuf {
        let base = destination_for(&self.dir, url, index);
        let mut candidate = base.clone();
        let mut n = 2usize;
        while self.issued.contains(&candidate) {
            candidate = with_suffix(&base, n);
            n += 1;
        }
        self.issued.insert(candidate.clone());
        candidate
    }
}

fn with_suffix(path: &Path, n: usize) -> PathBuf {
    let stem = path
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_default();
    let name = match path.extension() {
        Some(ext) => format!("{}_{}.{}", stem, n, ext.to_string_lossy()),
        None => format!("{}_{}", stem, n),
    };
    path.with_file_name(name)
}

fn url_file_name(url: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    let segment = parsed.path_segments()?.filter(|s| !s.is_empty()).last()?;
    Some(segment.to_string())
}

/// Replace separators, NUL and control characters with `_`, collapse runs,
/// trim dots/underscores/spaces at the ends, cap the length.
fn sanitize(name: &str) -> String {
    let mut out = String::with_capacity(name.len());
    for c in name.chars() {
        let bad = c == '/' || c == '\\' || c == '\0' || c.is_control() || c.is_whitespace();
        if bad {
            if !out.ends_with('_') {
                out.push('_');
            }
        } else {
            out.push(c);
        }
    }
    let trimmed = out.trim_matches(|c: char| c == '.' || c == '_' || c == ' ');
    let mut end = trimmed.len().min(NAME_MAX);
    while !trimmed.is_char_boundary(end) {
        end -= 1;
    }
    trimmed[..end].to_string()
}
