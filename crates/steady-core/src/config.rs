mod env;

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

pub use env::{apply_env_overrides, apply_overrides_from};

/// Invalid policy values, rejected before any component is built.
#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("target speed must be positive, got {0}")]
    InvalidTarget(f64),
    #[error("low speed threshold must be in (0, 1], got {0}")]
    InvalidThreshold(f64),
    #[error("reset step must be in (0, 100], got {0}")]
    InvalidResetStep(f64),
    #[error("max parallel transfers must be at least 1")]
    InvalidMaxParallel,
    #[error("monitor interval must be at least 1 second")]
    InvalidInterval,
    #[error("{field} must be a finite number of seconds in [0, {max}], got {value}")]
    InvalidTiming {
        field: &'static str,
        value: f64,
        max: f64,
    },
    #[error("environment variable {var} has invalid value {value:?}")]
    InvalidEnv { var: &'static str, value: String },
}

/// Which engine performs the byte transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EngineBackend {
    /// libcurl in-process (default).
    #[default]
    Curl,
    /// External downloader program, progress parsed from its output.
    Command,
}

/// Which sessions a low-speed mitigation re-drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RedriveScope {
    /// Every session in the snapshot (default).
    #[default]
    All,
    /// Only sessions individually below the threshold speed.
    Slow,
}

/// Transfer engine section (optional in config.toml).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    #[serde(default)]
    pub backend: EngineBackend,
    /// Program for the command backend, e.g. "yt-dlp" or "aria2c".
    #[serde(default)]
    pub program: Option<String>,
    /// Argument template; `{url}`, `{dest}` and `{rate}` are substituted per attempt.
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            backend: EngineBackend::Curl,
            program: None,
            args: Vec::new(),
        }
    }
}

/// What the mitigation primitives act on.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MitigationConfig {
    /// Process names matched with `pkill -f`.
    pub residual_processes: Vec<String>,
    /// Cache directories removed by the cache flush; a leading `~/` expands to $HOME.
    pub cache_dirs: Vec<String>,
}

impl Default for MitigationConfig {
    fn default() -> Self {
        Self {
            residual_processes: vec!["yt-dlp".to_string(), "aria2c".to_string()],
            cache_dirs: vec![
                "/tmp/aria2c_cache".to_string(),
                "/tmp/yt_cache".to_string(),
                "~/.cache/yt-dlp".to_string(),
            ],
        }
    }
}

/// Policy constants loaded from `~/.config/steady/config.toml`.
///
/// Immutable once loaded; every component receives the values it needs at
/// construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StabilizerConfig {
    /// Desired mean throughput in MiB/s.
    pub target_speed_mib_s: f64,
    /// Fraction of the target below which mitigation fires, in (0, 1].
    pub low_speed_threshold: f64,
    /// Seconds between monitor ticks.
    pub monitor_interval_secs: u64,
    /// Watchdog: the monitor stops after this many seconds.
    pub max_run_secs: u64,
    /// Progress step (percent) between mid-transfer resets.
    pub reset_step_percent: f64,
    /// Ceiling on live transfer sessions.
    pub max_parallel: usize,
    /// Connect and read-inactivity timeout per request, in seconds.
    pub request_timeout_secs: u64,
    /// Wait before the single retry of a failed transfer.
    pub retry_backoff_secs: f64,
    /// Pause after each batch item.
    pub item_pause_secs: f64,
    /// Delay after a full stabilize so the network stack can settle.
    pub settle_delay_secs: f64,
    /// Reference download used by the diagnostic probe.
    pub probe_url: String,
    /// Where the rate-limit directive is written.
    pub directive_path: PathBuf,
    /// Session snapshot file read by the file-backed registry (None = state dir).
    #[serde(default)]
    pub session_snapshot: Option<PathBuf>,
    /// Directory for batch downloads (None = current directory).
    #[serde(default)]
    pub download_dir: Option<PathBuf>,
    /// Sessions re-driven when the mean drops below the threshold.
    #[serde(default)]
    pub redrive: RedriveScope,
    #[serde(default)]
    pub engine: EngineConfig,
    #[serde(default)]
    pub mitigation: MitigationConfig,
}

impl Default for StabilizerConfig {
    fn default() -> Self {
        Self {
            target_speed_mib_s: 20.0,
            low_speed_threshold: 0.7,
            monitor_interval_secs: 30,
            max_run_secs: 5 * 60 * 60,
            reset_step_percent: 25.0,
            max_parallel: 5,
            request_timeout_secs: 90,
            retry_backoff_secs: 2.0,
            item_pause_secs: 1.0,
            settle_delay_secs: 1.5,
            probe_url: "https://speed.hetzner.de/100MB.bin".to_string(),
            directive_path: PathBuf::from("temp_rate_patch.json"),
            session_snapshot: None,
            download_dir: None,
            engine: EngineConfig::default(),
            redrive: RedriveScope::All,
            mitigation: MitigationConfig::default(),
        }
    }
}

impl StabilizerConfig {
    /// Check the policy invariants.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.target_speed_mib_s > 0.0) {
            return Err(ConfigError::InvalidTarget(self.target_speed_mib_s));
        }
        if !(self.low_speed_threshold > 0.0 && self.low_speed_threshold <= 1.0) {
            return Err(ConfigError::InvalidThreshold(self.low_speed_threshold));
        }
        if !(self.reset_step_percent > 0.0 && self.reset_step_percent <= 100.0) {
            return Err(ConfigError::InvalidResetStep(self.reset_step_percent));
        }
        if self.max_parallel < 1 {
            return Err(ConfigError::InvalidMaxParallel);
        }
        if self.monitor_interval_secs == 0 {
            return Err(ConfigError::InvalidInterval);
        }
        check_timing("retry_backoff_secs", self.retry_backoff_secs, MAX_PAUSE_SECS)?;
        check_timing("item_pause_secs", self.item_pause_secs, MAX_PAUSE_SECS)?;
        check_timing("settle_delay_secs", self.settle_delay_secs, MAX_SETTLE_SECS)?;
        Ok(())
    }

    /// Mean speed (MiB/s) below which the monitor mitigates.
    pub fn threshold_speed_mib_s(&self) -> f64 {
        self.target_speed_mib_s * self.low_speed_threshold
    }

    /// Target speed as a byte rate, used for the rate-limit directive.
    pub fn target_bytes_per_sec(&self) -> u64 {
        (self.target_speed_mib_s * 1024.0 * 1024.0).round() as u64
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_secs(self.monitor_interval_secs)
    }

    pub fn max_run(&self) -> Duration {
        Duration::from_secs(self.max_run_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_backoff(&self) -> Duration {
        secs(self.retry_backoff_secs)
    }

    pub fn item_pause(&self) -> Duration {
        secs(self.item_pause_secs)
    }

    pub fn settle_delay(&self) -> Duration {
        secs(self.settle_delay_secs)
    }
}

/// Ceiling for the retry backoff and the per-item pause.
const MAX_PAUSE_SECS: f64 = 3600.0;
/// Ceiling for the post-stabilize settle delay; it is meant to be a short pause.
const MAX_SETTLE_SECS: f64 = 5.0;

fn check_timing(field: &'static str, value: f64, max: f64) -> Result<(), ConfigError> {
    if value.is_finite() && (0.0..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::InvalidTiming { field, value, max })
    }
}

/// Seconds to a Duration; values `validate()` would reject map to zero.
fn secs(value: f64) -> Duration {
    Duration::try_from_secs_f64(value).unwrap_or(Duration::ZERO)
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("steady")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Default session snapshot location: `~/.local/state/steady/sessions.json`.
pub fn default_session_snapshot() -> Result<PathBuf> {
    let dir = xdg::BaseDirectories::with_prefix("steady")?.get_state_home();
    Ok(dir.join("steady").join("sessions.json"))
}

/// Load configuration from disk, creating a default file if none exists.
/// Environment overrides are applied on top and the result is validated.
pub fn load_or_init() -> Result<StabilizerConfig> {
    let path = config_path()?;
    let mut cfg = if !path.exists() {
        let default_cfg = StabilizerConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        default_cfg
    } else {
        let data = fs::read_to_string(&path)?;
        toml::from_str(&data)?
    };

    apply_env_overrides(&mut cfg)?;
    cfg.validate()?;
    Ok(cfg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = StabilizerConfig::default();
        assert_eq!(cfg.target_speed_mib_s, 20.0);
        assert_eq!(cfg.low_speed_threshold, 0.7);
        assert_eq!(cfg.monitor_interval_secs, 30);
        assert_eq!(cfg.max_run_secs, 18_000);
        assert_eq!(cfg.max_parallel, 5);
        assert_eq!(cfg.request_timeout_secs, 90);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn threshold_speed_and_directive_rate() {
        let cfg = StabilizerConfig::default();
        assert!((cfg.threshold_speed_mib_s() - 14.0).abs() < 1e-9);
        assert_eq!(cfg.target_bytes_per_sec(), 20 * 1024 * 1024);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = StabilizerConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: StabilizerConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.target_speed_mib_s, cfg.target_speed_mib_s);
        assert_eq!(parsed.max_parallel, cfg.max_parallel);
        assert_eq!(parsed.directive_path, cfg.directive_path);
        assert_eq!(
            parsed.mitigation.residual_processes,
            cfg.mitigation.residual_processes
        );
    }

    #[test]
    fn config_toml_command_engine() {
        let toml = r#"
            target_speed_mib_s = 10.0
            low_speed_threshold = 0.5
            monitor_interval_secs = 15
            max_run_secs = 600
            reset_step_percent = 10.0
            max_parallel = 2
            request_timeout_secs = 30
            retry_backoff_secs = 2.0
            item_pause_secs = 1.0
            settle_delay_secs = 1.2
            probe_url = "http://127.0.0.1/probe.bin"
            directive_path = "/tmp/rate.json"

            [engine]
            backend = "command"
            program = "yt-dlp"
            args = ["-o", "{dest}", "--limit-rate", "{rate}", "{url}"]
        "#;
        let cfg: StabilizerConfig = toml::from_str(toml).unwrap();
        assert_eq!(cfg.engine.backend, EngineBackend::Command);
        assert_eq!(cfg.engine.program.as_deref(), Some("yt-dlp"));
        assert_eq!(cfg.engine.args.len(), 5);
        assert!(cfg.session_snapshot.is_none());
        assert_eq!(cfg.mitigation.cache_dirs.len(), 3);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn validate_rejects_out_of_range_policy() {
        let mut cfg = StabilizerConfig::default();
        cfg.low_speed_threshold = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidThreshold(0.0)));
        cfg.low_speed_threshold = 1.0;
        assert!(cfg.validate().is_ok());
        cfg.low_speed_threshold = 1.01;
        assert!(cfg.validate().is_err());

        let mut cfg = StabilizerConfig::default();
        cfg.reset_step_percent = 100.0;
        assert!(cfg.validate().is_ok());
        cfg.reset_step_percent = 0.0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidResetStep(0.0)));

        let mut cfg = StabilizerConfig::default();
        cfg.max_parallel = 0;
        assert_eq!(cfg.validate(), Err(ConfigError::InvalidMaxParallel));
    }

    #[test]
    fn validate_rejects_unrepresentable_timings() {
        let toml = r#"
            target_speed_mib_s = 20.0
            low_speed_threshold = 0.7
            monitor_interval_secs = 30
            max_run_secs = 18000
            reset_step_percent = 25.0
            max_parallel = 5
            request_timeout_secs = 90
            retry_backoff_secs = inf
            item_pause_secs = 1.0
            settle_delay_secs = 1.5
            probe_url = "http://127.0.0.1/probe.bin"
            directive_path = "rate.json"
        "#;
        let cfg: StabilizerConfig = toml::from_str(toml).unwrap();
        assert_eq!(
            cfg.validate(),
            Err(ConfigError::InvalidTiming {
                field: "retry_backoff_secs",
                value: f64::INFINITY,
                max: MAX_PAUSE_SECS,
            })
        );
        // Accessors never panic, even on a config that skipped validation.
        assert_eq!(cfg.retry_backoff(), Duration::ZERO);

        let mut cfg = StabilizerConfig::default();
        cfg.item_pause_secs = f64::NAN;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTiming { field: "item_pause_secs", .. })
        ));
        assert_eq!(cfg.item_pause(), Duration::ZERO);

        let mut cfg = StabilizerConfig::default();
        cfg.item_pause_secs = -1.0;
        assert!(cfg.validate().is_err());

        let mut cfg = StabilizerConfig::default();
        cfg.settle_delay_secs = 60.0;
        assert!(matches!(
            cfg.validate(),
            Err(ConfigError::InvalidTiming { field: "settle_delay_secs", .. })
        ));
        cfg.settle_delay_secs = 1.2;
        assert!(cfg.validate().is_ok());
        assert_eq!(cfg.settle_delay(), Duration::from_millis(1200));
    }

    #[test]
    fn redrive_scope_defaults_to_all_sessions() {
        assert_eq!(StabilizerConfig::default().redrive, RedriveScope::All);
        #[derive(Deserialize)]
        struct Section {
            redrive: RedriveScope,
        }
        let parsed: Section = toml::from_str(r#"redrive = "slow""#).unwrap();
        assert_eq!(parsed.redrive, RedriveScope::Slow);
    }
}
