use crate::core::usage::{DEFAULT_EXCLUDED_DIRS, DEFAULT_SOURCE_GLOBS};
use crate::core::verbosity::Verbosity;
use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {message}")]
    Invalid { message: String },
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum SearchBackend {
    /// Spawn the system `grep`
    Grep,
    /// Search in-process
    #[default]
    Builtin,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AnalysisConfig {
    pub min_size_kb: u64,
    pub threshold: f32,
    pub verbosity: Verbosity,
    pub hash_size: u32,
    pub source_globs: Vec<String>,
    pub excluded_dirs: Vec<String>,
    pub search_backend: SearchBackend,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            min_size_kb: 0,
            threshold: 0.15,
            verbosity: Verbosity::Normal,
            hash_size: 16,
            source_globs: DEFAULT_SOURCE_GLOBS.iter().map(|s| s.to_string()).collect(),
            excluded_dirs: DEFAULT_EXCLUDED_DIRS.iter().map(|s| s.to_string()).collect(),
            search_backend: SearchBackend::Builtin,
        }
    }
}

impl AnalysisConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        Self::load_layers([path])
    }

    /// `<config dir>/assetlens/config.json`
    pub fn default_path() -> Option<PathBuf> {
        dirs::config_dir().map(|dir| dir.join("assetlens").join("config.json"))
    }

    /// Layer the per-user file (if present) and then `explicit` over the
    /// built-in defaults. Later layers override individual keys.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        let user = Self::default_path().filter(|path| path.is_file());
        Self::load_layers(user.as_deref().into_iter().chain(explicit))
    }

    pub fn load_layers<'a>(
        layers: impl IntoIterator<Item = &'a Path>,
    ) -> Result<Self, ConfigError> {
        let mut merged = Map::new();
        for path in layers {
            merged.extend(read_layer(path)?);
        }
        serde_json::from_value(Value::Object(merged)).map_err(|source| ConfigError::Parse {
            path: "<merged>".to_string(),
            source,
        })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(ConfigError::Invalid {
                message: format!("threshold must be a non-negative number, got {}", self.threshold),
            });
        }
        if self.hash_size == 0 {
            return Err(ConfigError::Invalid {
                message: "hash_size must be at least 1".to_string(),
            });
        }
        Ok(())
    }
}

fn read_layer(path: &Path) -> Result<Map<String, Value>, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Io {
        path: path.to_string_lossy().to_string(),
        source,
    })?;
    let parse_error = |source: serde_json::Error| ConfigError::Parse {
        path: path.to_string_lossy().to_string(),
        source,
    };

    let layer = match serde_json::from_str(&content).map_err(parse_error)? {
        Value::Object(layer) => layer,
        _ => {
            return Err(ConfigError::Invalid {
                message: format!("{} must contain a JSON object", path.display()),
            });
        }
    };
    // Type errors are reported against the file that caused them.
    serde_json::from_value::<AnalysisConfig>(Value::Object(layer.clone())).map_err(parse_error)?;
    Ok(layer)
}
