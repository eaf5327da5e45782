//! Extractor configuration, persisted as TOML.

use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Limits applied by the bounded serializer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerializerConfig {
    /// Maximum recursion depth. Must be > 0.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,
    /// Arrays with fewer elements than this are emitted whole.
    #[serde(default = "default_small_array_limit")]
    pub small_array_limit: usize,
    /// Number of leading elements sampled from large arrays.
    #[serde(default = "default_sample_size")]
    pub sample_size: usize,
    /// Compute min/max/mean/std for large arrays.
    #[serde(default = "default_include_statistics")]
    pub include_statistics: bool,
    /// Arrays with more elements than this are described by metadata only.
    #[serde(default = "default_oversized_limit")]
    pub oversized_limit: usize,
}

fn default_max_depth() -> usize {
    8
}
fn default_small_array_limit() -> usize {
    100
}
fn default_sample_size() -> usize {
    10
}
fn default_include_statistics() -> bool {
    true
}
fn default_oversized_limit() -> usize {
    10_000_000
}

impl Default for SerializerConfig {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            small_array_limit: default_small_array_limit(),
            sample_size: default_sample_size(),
            include_statistics: default_include_statistics(),
            oversized_limit: default_oversized_limit(),
        }
    }
}

impl SerializerConfig {
    /// Reject limits that would make serialization meaningless.
    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_depth == 0 {
            return Err(ConfigError::Invalid {
                message: "max_depth must be > 0".into(),
            });
        }
        if self.sample_size == 0 {
            return Err(ConfigError::Invalid {
                message: "sample_size must be > 0".into(),
            });
        }
        Ok(())
    }
}

/// Where the extractor looks inside a source and how it serializes what it finds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExtractorConfig {
    /// Name of the top-level source variable holding the root record.
    #[serde(default = "default_root_variable")]
    pub root_variable: String,
    /// Field of the root record holding the time axis.
    #[serde(default = "default_time_field")]
    pub time_field: String,
    /// Field names walked from the root record to the leaf record set.
    #[serde(default = "default_navigation_path")]
    pub navigation_path: Vec<String>,
    #[serde(default)]
    pub serializer: SerializerConfig,
}

fn default_root_variable() -> String {
    "g_PerDepRunnable_m_depPort_out".into()
}
fn default_time_field() -> String {
    "time".into()
}
fn default_navigation_path() -> Vec<String> {
    vec!["m_listMemory".into(), "m_value".into(), "m_value".into()]
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            root_variable: default_root_variable(),
            time_field: default_time_field(),
            navigation_path: default_navigation_path(),
            serializer: SerializerConfig::default(),
        }
    }
}

impl ExtractorConfig {
    pub fn validate(&self) -> ConfigResult<()> {
        if self.root_variable.is_empty() {
            return Err(ConfigError::Invalid {
                message: "root_variable must not be empty".into(),
            });
        }
        self.serializer.validate()
    }

    /// Load from a TOML file.
    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            source: e,
        })?;
        let config: Self = toml::from_str(&content).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Save to a TOML file.
    pub fn save(&self, path: &Path) -> ConfigResult<()> {
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::Parse {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::Write {
                path: parent.display().to_string(),
                source: e,
            })?;
        }
        std::fs::write(path, content).map_err(|e| ConfigError::Write {
            path: path.display().to_string(),
            source: e,
        })
    }
}
