use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

pub const SETTINGS_FILE: &str = "bench.yaml";
pub const SCRATCH_ENV: &str = "BENCH_SCRATCH_DIR";

pub const DEFAULT_RUNS: u32 = 3;
pub const DEFAULT_INTERVAL: f64 = 0.1;
/// Upper bound for a single step before it is killed and counted as failed.
pub const DEFAULT_STEP_TIMEOUT: Duration = Duration::from_secs(6 * 3600);

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid settings file {path}: {source}")]
    Parse {
        path: PathBuf,
        source: serde_yaml::Error,
    },
    #[error("number of runs must be at least 1")]
    ZeroRuns,
    #[error("sampling interval must be positive, got {0}")]
    NonPositiveInterval(f64),
    #[error("sampling interval must be finite, got {0}")]
    NonFiniteInterval(f64),
    #[error("number of runs must be odd (interval {0} rejected)")]
    EvenInterval(f64),
    #[error("step timeout must be at least one second")]
    ZeroStepTimeout,
}

/// Optional per-root overrides read from `bench.yaml`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SettingsFile {
    runs: Option<u32>,
    interval: Option<f64>,
    scratch_dir: Option<PathBuf>,
    docker_bin: Option<String>,
    skip_security_check: Option<bool>,
    /// Seconds.
    step_timeout: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    pub runs: u32,
    /// Seconds between polls of a running step.
    pub interval: f64,
    /// Transient location cleared before every run.
    pub scratch_dir: PathBuf,
    pub docker_bin: String,
    pub skip_security_check: bool,
    pub step_timeout: Duration,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            runs: DEFAULT_RUNS,
            interval: DEFAULT_INTERVAL,
            scratch_dir: std::env::temp_dir().join("bench-scratch"),
            docker_bin: "docker".to_string(),
            skip_security_check: false,
            step_timeout: DEFAULT_STEP_TIMEOUT,
        }
    }
}

impl Settings {
    /// Defaults, overlaid with `<root>/bench.yaml` when present, then with
    /// the scratch directory environment override.
    pub fn load(root: &Path) -> Result<Self, ConfigError> {
        let mut settings = Settings::default();
        let path = root.join(SETTINGS_FILE);
        if path.is_file() {
            let raw = fs::read_to_string(&path).map_err(|source| ConfigError::Io {
                path: path.clone(),
                source,
            })?;
            let file: SettingsFile = serde_yaml::from_str(&raw)
                .map_err(|source| ConfigError::Parse { path, source })?;
            settings.apply(file);
        }
        if let Some(dir) = std::env::var_os(SCRATCH_ENV) {
            settings.scratch_dir = PathBuf::from(dir);
        }
        Ok(settings)
    }

    fn apply(&mut self, file: SettingsFile) {
        if let Some(runs) = file.runs {
            self.runs = runs;
        }
        if let Some(interval) = file.interval {
            self.interval = interval;
        }
        if let Some(dir) = file.scratch_dir {
            self.scratch_dir = dir;
        }
        if let Some(bin) = file.docker_bin {
            self.docker_bin = bin;
        }
        if let Some(skip) = file.skip_security_check {
            self.skip_security_check = skip;
        }
        if let Some(secs) = file.step_timeout {
            self.step_timeout = Duration::from_secs(secs);
        }
    }

    /// Pre-scheduling guard. The parity check looks at the interval, not at
    /// the run count; an even whole-number interval is refused.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.runs == 0 {
            return Err(ConfigError::ZeroRuns);
        }
        if self.interval.is_nan() || self.interval <= 0.0 {
            return Err(ConfigError::NonPositiveInterval(self.interval));
        }
        if !self.interval.is_finite() {
            return Err(ConfigError::NonFiniteInterval(self.interval));
        }
        if self.interval % 2.0 == 0.0 {
            return Err(ConfigError::EvenInterval(self.interval));
        }
        if self.step_timeout.is_zero() {
            return Err(ConfigError::ZeroStepTimeout);
        }
        Ok(())
    }
}
