//! Progress percentages: parsing engine output and keeping the stream monotonic.

/// Extracts the last percentage marker from a line of downloader output.
///
/// Handles `[download]  42.3% of 10MiB` (yt-dlp) and
/// `[#2089b0 4.0MiB/33.2MiB(12%) CN:1]` (aria2c) style lines: the number is
/// the run of digits and dots immediately before a `%`.
pub fn parse_percent(line: &str) -> Option<f64> {
    let mut found = None;
    for (idx, _) in line.match_indices('%') {
        let head = &line[..idx];
        let start = head
            .rfind(|c: char| !(c.is_ascii_digit() || c == '.'))
            .map(|i| i + 1)
            .unwrap_or(0);
        let number = head[start..].trim_start_matches('.');
        if let Ok(v) = number.parse::<f64>() {
            if v.is_finite() {
                found = Some(v.clamp(0.0, 100.0));
            }
        }
    }
    found
}

/// Filters raw percentages into a non-decreasing stream, emitting only when
/// the value grows by at least `min_delta` (or reaches 100).
#[derive(Debug, Clone)]
pub struct ProgressTracker {
    last: Option<f64>,
    min_delta: f64,
}

impl Default for ProgressTracker {
    fn default() -> Self {
        Self::new(1.0)
    }
}

impl ProgressTracker {
    pub fn new(min_delta: f64) -> Self {
        Self {
            last: None,
            min_delta: min_delta.max(0.0),
        }
    }

    /// Returns the value to emit, if any.
    pub fn advance(&mut self, percent: f64) -> Option<f64> {
        if !percent.is_finite() {
            return None;
        }
        let p = percent.clamp(0.0, 100.0);
        match self.last {
            Some(last) if p <= last => None,
            Some(last) if p - last < self.min_delta && p < 100.0 => None,
            _ => {
                self.last = Some(p);
                Some(p)
            }
        }
    }

    pub fn last(&self) -> Option<f64> {
        self.last
    }
}
