//! Settings for transfer and indexing runs.
//!
//! Settings are stored as TOML (`settings.toml` next to the binary by
//! default). They are loaded once at startup, validated, and treated as
//! read-only for the rest of the run.

use crate::error::ConfigError;
use crate::model::{DestinationSpec, IndexSpec};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default settings file name
pub const DEFAULT_SETTINGS_FILE: &str = "settings.toml";

/// Top-level settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Maximum total number of files across all destination directories
    pub limit: u64,

    /// Seconds to wait between capacity checks, consulted in order on
    /// consecutive exhaustion cycles. Once every entry has been used without
    /// an admission the run saves its queue and stops.
    pub sleep: Vec<f64>,

    /// Where the remaining transfer queue is saved
    pub checkpoint_path: PathBuf,

    /// Copy attempts per item before it is set aside as failed (default: 3)
    #[serde(default = "default_max_item_attempts")]
    pub max_item_attempts: u32,

    /// Log file location
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    /// Size of each log file in bytes (default: 25 MiB)
    #[serde(default = "default_log_rotation_bytes")]
    pub log_rotation_bytes: u64,

    /// Maximum number of log files kept (default: 100)
    #[serde(default = "default_log_rotation_limit")]
    pub log_rotation_limit: usize,

    /// Source patterns and their destinations
    #[serde(default)]
    pub data: Vec<DestinationSpec>,

    /// Indexing pool settings; required only for indexing runs
    #[serde(default)]
    pub index: Option<IndexSettings>,
}

/// Settings for the indexing worker pool
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexSettings {
    /// Number of concurrent workers
    pub threads: usize,

    /// Pause after each item, in milliseconds (default: 0)
    #[serde(default)]
    pub delay_ms: u64,

    /// Where undispatched items are saved on cancellation
    pub checkpoint_path: PathBuf,

    /// Indexing program
    pub program: String,

    /// Arguments per item; `{file}`, `{index}` and `{sourcetype}` are substituted
    pub args: Vec<String>,

    /// Arguments for the pre-flight handshake; skipped when absent
    #[serde(default)]
    pub auth_args: Option<Vec<String>>,

    /// Files to index
    #[serde(default)]
    pub data: Vec<IndexSpec>,
}

fn default_max_item_attempts() -> u32 {
    3
}

fn default_log_path() -> PathBuf {
    std::env::temp_dir().join("batchgate.log")
}

fn default_log_rotation_bytes() -> u64 {
    25 * 1024 * 1024
}

fn default_log_rotation_limit() -> usize {
    100
}

impl Settings {
    /// Load and validate settings from a TOML file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| {
            if e.kind() == io::ErrorKind::NotFound {
                ConfigError::Missing {
                    path: path.to_path_buf(),
                }
            } else {
                ConfigError::Unreadable {
                    path: path.to_path_buf(),
                    source: e,
                }
            }
        })?;
        Self::from_toml(&content, path)
    }

    /// Parse and validate settings from TOML text; `origin` is used in errors.
    pub fn from_toml(content: &str, origin: &Path) -> Result<Self, ConfigError> {
        let settings: Settings = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_path_buf(),
            source: e,
        })?;
        settings.validate()?;
        Ok(settings)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.sleep.is_empty() {
            return Err(ConfigError::Invalid {
                field: "sleep",
                reason: "at least one delay is required".to_string(),
            });
        }
        if let Some(bad) = self.sleep.iter().find(|s| !s.is_finite() || **s < 0.0) {
            return Err(ConfigError::Invalid {
                field: "sleep",
                reason: format!("delays must be non-negative seconds, got {}", bad),
            });
        }
        if self.max_item_attempts == 0 {
            return Err(ConfigError::Invalid {
                field: "max_item_attempts",
                reason: "must be at least 1".to_string(),
            });
        }
        if self.log_rotation_limit == 0 {
            return Err(ConfigError::Invalid {
                field: "log_rotation_limit",
                reason: "must be at least 1".to_string(),
            });
        }
        if let Some(index) = &self.index {
            if index.threads == 0 {
                return Err(ConfigError::Invalid {
                    field: "index.threads",
                    reason: "must be at least 1".to_string(),
                });
            }
            if index.program.trim().is_empty() {
                return Err(ConfigError::Invalid {
                    field: "index.program",
                    reason: "must not be empty".to_string(),
                });
            }
        }
        Ok(())
    }

    /// The backoff schedule as durations.
    pub fn sleep_schedule(&self) -> Vec<Duration> {
        self.sleep.iter().map(|s| Duration::from_secs_f64(*s)).collect()
    }

    /// Indexing settings, or an error naming the missing section.
    pub fn index_settings(&self) -> Result<&IndexSettings, ConfigError> {
        self.index.as_ref().ok_or_else(|| ConfigError::Invalid {
            field: "index",
            reason: "an [index] section is required for indexing runs".to_string(),
        })
    }
}

impl IndexSettings {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}
