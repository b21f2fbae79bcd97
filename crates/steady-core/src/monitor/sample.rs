//! Per-tick throughput sample and the threshold decision.

use std::time::SystemTime;

use crate::registry::Session;

const MIB: f64 = 1024.0 * 1024.0;

/// Aggregate of one registry snapshot. Not retained past the tick.
#[derive(Debug, Clone, PartialEq)]
pub struct ThroughputSample {
    pub taken_at: SystemTime,
    pub session_count: usize,
    /// Mean per-session speed in MiB/s.
    pub mean_mib_s: f64,
}

impl ThroughputSample {
    /// Sample of a non-empty snapshot; `None` when there are no sessions.
    pub fn from_sessions(sessions: &[Session]) -> Option<Self> {
        if sessions.is_empty() {
            return None;
        }
        let total: f64 = sessions.iter().map(speed_mib_s).sum();
        Some(Self {
            taken_at: SystemTime::now(),
            session_count: sessions.len(),
            mean_mib_s: total / sessions.len() as f64,
        })
    }
}

/// A session's speed in MiB/s; negative or NaN readings count as 0.
fn speed_mib_s(session: &Session) -> f64 {
    session.speed.max(0.0) / MIB
}

/// Mitigate iff the mean is strictly below `target * threshold`.
pub fn should_mitigate(mean_mib_s: f64, target_mib_s: f64, threshold: f64) -> bool {
    mean_mib_s < target_mib_s * threshold
}

/// Sessions whose own speed is below the threshold speed. Non-empty whenever
/// `should_mitigate` holds for the snapshot's mean.
pub fn low_speed_sessions(sessions: &[Session], threshold_mib_s: f64) -> Vec<&Session> {
    sessions
        .iter()
        .filter(|s| speed_mib_s(s) < threshold_mib_s)
        .collect()
}
