//! Environment overrides for the policy constants (`STEADY_*`).

use std::str::FromStr;

use super::{ConfigError, StabilizerConfig};

/// Apply `STEADY_*` variables from the process environment.
pub fn apply_env_overrides(cfg: &mut StabilizerConfig) -> Result<(), ConfigError> {
    apply_overrides_from(cfg, |name| std::env::var(name).ok())
}

/// Apply overrides using `lookup` to resolve variable names (unset = `None`).
pub fn apply_overrides_from<F>(cfg: &mut StabilizerConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(v) = parse_var(&lookup, "STEADY_TARGET_MIBS")? {
        cfg.target_speed_mib_s = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_THRESHOLD")? {
        cfg.low_speed_threshold = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_MONITOR_INTERVAL_SECS")? {
        cfg.monitor_interval_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_MAX_RUN_SECS")? {
        cfg.max_run_secs = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_RESET_STEP")? {
        cfg.reset_step_percent = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_MAX_PARALLEL")? {
        cfg.max_parallel = v;
    }
    if let Some(v) = parse_var(&lookup, "STEADY_TIMEOUT_SECS")? {
        cfg.request_timeout_secs = v;
    }
    Ok(())
}

fn parse_var<F, T>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    let Some(raw) = lookup(var) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| ConfigError::InvalidEnv { var, value: raw })
}
