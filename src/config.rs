// Application configuration
// TOML file with defaults for every setting, plus environment overrides

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::heart::{DurationBounds, FeatureConfig};

const ENV_MODEL_PATH: &str = "APNEASCOPE_MODEL";
const ENV_SAMPLES_DIR: &str = "APNEASCOPE_SAMPLES_DIR";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelSettings {
    #[serde(default = "default_model_path")]
    pub path: PathBuf,
}

impl Default for ModelSettings {
    fn default() -> Self {
        ModelSettings {
            path: default_model_path(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleSettings {
    #[serde(default = "default_samples_dir")]
    pub dir: PathBuf,
}

impl Default for SampleSettings {
    fn default() -> Self {
        SampleSettings {
            dir: default_samples_dir(),
        }
    }
}

fn default_model_path() -> PathBuf {
    PathBuf::from("resources/model_logreg.json")
}

fn default_samples_dir() -> PathBuf {
    PathBuf::from("resources/samples")
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub model: ModelSettings,

    #[serde(default)]
    pub samples: SampleSettings,

    #[serde(default)]
    pub duration: DurationBounds,

    #[serde(default)]
    pub features: FeatureConfig,
}

impl AppConfig {
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path.as_ref()).map_err(|source| ConfigError::Read {
            path: path.as_ref().to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    /// Read `apneascope.toml` from the working directory if present, otherwise defaults
    pub fn from_default_location() -> Result<Self, ConfigError> {
        let path = PathBuf::from("apneascope.toml");
        let mut config = if path.exists() {
            Self::from_file(&path)?
        } else {
            log::debug!("No apneascope.toml found, using defaults");
            Self::default()
        };
        config.apply_env_overrides();
        Ok(config)
    }

    pub fn apply_env_overrides(&mut self) {
        if let Some(path) = env_path(ENV_MODEL_PATH) {
            self.model.path = path;
        }
        if let Some(dir) = env_path(ENV_SAMPLES_DIR) {
            self.samples.dir = dir;
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        let DurationBounds {
            min_hours,
            max_hours,
        } = self.duration;
        // NaN fails every comparison, so finiteness is checked first
        if !min_hours.is_finite() || !max_hours.is_finite() || min_hours < 0.0 || min_hours > max_hours
        {
            return Err(ConfigError::Invalid(format!(
                "duration bounds {}..{} hours",
                min_hours, max_hours
            )));
        }

        let FeatureConfig {
            context_minutes,
            resample_hz,
        } = self.features;
        if !(resample_hz.is_finite() && resample_hz > 0.0)
            || !(context_minutes.is_finite() && context_minutes > 0.0)
        {
            return Err(ConfigError::Invalid(
                "feature resample rate and context must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_path(key: &str) -> Option<PathBuf> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
}
