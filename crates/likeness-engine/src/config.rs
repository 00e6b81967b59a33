use likeness_core::DEFAULT_DISTANCE_THRESHOLD;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("invalid config file: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("distance threshold must be finite and non-negative, got {0}")]
    Threshold(f32),
    #[error("poll interval must be at least 1 ms")]
    PollInterval,
    #[error("detection confidence must be within [0, 1], got {0}")]
    Confidence(f32),
}

/// Engine configuration: defaults, then an optional TOML file, then
/// `LIKENESS_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Path of the enrollment store document.
    pub store_path: PathBuf,
    /// Maximum Euclidean distance for a known match.
    pub distance_threshold: f32,
    /// Recognition loop cadence in milliseconds.
    pub poll_interval_ms: u64,
    /// Observations reporting a lower detector confidence are ignored.
    pub min_detection_confidence: f32,
    /// Empty cycles to keep showing the last faces before reporting nobody.
    pub hold_cycles: u32,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            store_path: default_data_dir().join("faces.json"),
            distance_threshold: DEFAULT_DISTANCE_THRESHOLD,
            poll_interval_ms: 100,
            min_detection_confidence: 0.9,
            hold_cycles: 0,
        }
    }
}

impl Config {
    /// Load from `LIKENESS_CONFIG` (if set) and `LIKENESS_*` overrides.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = match std::env::var("LIKENESS_CONFIG") {
            Ok(path) => Self::from_file(Path::new(&path))?,
            Err(_) => Self::default(),
        };

        if let Ok(path) = std::env::var("LIKENESS_STORE_PATH") {
            config.store_path = PathBuf::from(path);
        }
        config.distance_threshold =
            env_or("LIKENESS_DISTANCE_THRESHOLD", config.distance_threshold);
        config.poll_interval_ms = env_or("LIKENESS_POLL_INTERVAL_MS", config.poll_interval_ms);
        config.min_detection_confidence = env_or(
            "LIKENESS_MIN_DETECTION_CONFIDENCE",
            config.min_detection_confidence,
        );
        config.hold_cycles = env_or("LIKENESS_HOLD_CYCLES", config.hold_cycles);

        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&text)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.distance_threshold.is_finite() || self.distance_threshold < 0.0 {
            return Err(ConfigError::Threshold(self.distance_threshold));
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::PollInterval);
        }
        if !(0.0..=1.0).contains(&self.min_detection_confidence) {
            return Err(ConfigError::Confidence(self.min_detection_confidence));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("likeness")
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
