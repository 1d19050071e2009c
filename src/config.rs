//! Runtime configuration.
//!
//! [`CoreConfig`] is a plain serde struct with defaults for every field, so a
//! host can supply a partial JSON document and keep the rest.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::error::ErrorKind;

/// Default bound on a single notification delivery attempt (5 seconds).
pub const DEFAULT_DELIVERY_TIMEOUT_MS: u64 = 5_000;

/// Default age after which positions are purged by the maintenance sweep.
pub const DEFAULT_LOCATION_RETENTION_HOURS: u32 = 24;

/// Message attached to emergency alerts when the caller supplies none.
pub const DEFAULT_EMERGENCY_MESSAGE: &str = "Emergency situation";

/// File name of the friend graph database inside the data directory.
pub const GRAPH_DB_FILE: &str = "graph.db";

/// File name of the position database inside the data directory.
pub const LOCATION_DB_FILE: &str = "locations.db";

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The document is not valid JSON for [`CoreConfig`].
    #[error("Failed to parse configuration: {0}")]
    Parse(#[from] serde_json::Error),

    /// The configuration file could not be read.
    #[error("Failed to read configuration file {path}: {source}")]
    Io {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        source: std::io::Error,
    },

    /// A field holds an unusable value.
    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

impl ConfigError {
    /// Returns the failure class of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        ErrorKind::Configuration
    }
}

/// Configuration for the SafeNet core.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    /// Directory holding the `SQLite` databases.
    pub data_dir: PathBuf,
    /// Upper bound for one delivery attempt to one recipient, in milliseconds.
    pub delivery_timeout_ms: u64,
    /// Positions not updated for this many hours are removed by
    /// [`crate::SafeNetCore::purge_expired_positions`].
    pub location_retention_hours: u32,
    /// Message used by emergency alerts without an explicit message.
    pub default_emergency_message: String,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("safenet-data"),
            delivery_timeout_ms: DEFAULT_DELIVERY_TIMEOUT_MS,
            location_retention_hours: DEFAULT_LOCATION_RETENTION_HOURS,
            default_emergency_message: DEFAULT_EMERGENCY_MESSAGE.to_string(),
        }
    }
}

impl CoreConfig {
    /// Creates a default configuration rooted at `data_dir`.
    #[must_use]
    pub fn with_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            ..Self::default()
        }
    }

    /// Parses and validates a JSON configuration document.
    ///
    /// Missing fields take their default values.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a value is invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON configuration file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or its content is invalid.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Serializes the configuration to pretty-printed JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> Result<String, ConfigError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Checks that every value is usable.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first offending field.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.delivery_timeout_ms == 0 {
            return Err(ConfigError::Invalid(
                "delivery_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.location_retention_hours == 0 {
            return Err(ConfigError::Invalid(
                "location_retention_hours must be greater than zero".to_string(),
            ));
        }
        if self.default_emergency_message.trim().is_empty() {
            return Err(ConfigError::Invalid(
                "default_emergency_message must not be blank".to_string(),
            ));
        }
        Ok(())
    }

    /// Bound on a single delivery attempt.
    #[must_use]
    pub const fn delivery_timeout(&self) -> Duration {
        Duration::from_millis(self.delivery_timeout_ms)
    }

    /// Retention window for stored positions.
    #[must_use]
    pub fn location_retention(&self) -> chrono::Duration {
        chrono::Duration::hours(i64::from(self.location_retention_hours))
    }

    /// Path of the friend graph database.
    #[must_use]
    pub fn graph_db_path(&self) -> PathBuf {
        self.data_dir.join(GRAPH_DB_FILE)
    }

    /// Path of the position database.
    #[must_use]
    pub fn location_db_path(&self) -> PathBuf {
        self.data_dir.join(LOCATION_DB_FILE)
    }
}
