//! Typed configuration from environment variables or a TOML file.
//!
//! Loads once at startup and fails fast on a zero admission cap, batch
//! size or journal capacity.

use std::path::Path;

use serde::Deserialize;

use crate::admission::DEFAULT_ADMISSION_CAP;
use crate::error::{Error, Result};
use crate::event::DEFAULT_JOURNAL_CAPACITY;
use crate::source::DEFAULT_BATCH_SIZE;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    /// Maximum working items per worker.
    pub admission_cap: usize,
    /// Records per read from the source.
    pub batch_size: usize,
    /// Field separator within an input line.
    pub field_delimiter: char,
    /// Number of recent coordinator events kept in memory.
    pub journal_capacity: usize,
    pub otel_endpoint: Option<String>,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            admission_cap: DEFAULT_ADMISSION_CAP,
            batch_size: DEFAULT_BATCH_SIZE,
            field_delimiter: ';',
            journal_capacity: DEFAULT_JOURNAL_CAPACITY,
            otel_endpoint: None,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables. Every variable is
    /// optional; unset ones keep their defaults.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let config = Self {
            admission_cap: parsed_var("FAIRQ_ADMISSION_CAP")?.unwrap_or(defaults.admission_cap),
            batch_size: parsed_var("FAIRQ_BATCH_SIZE")?.unwrap_or(defaults.batch_size),
            field_delimiter: parsed_var("FAIRQ_FIELD_DELIMITER")?
                .unwrap_or(defaults.field_delimiter),
            journal_capacity: parsed_var("FAIRQ_JOURNAL_CAPACITY")?
                .unwrap_or(defaults.journal_capacity),
            otel_endpoint: std::env::var("OTEL_ENDPOINT").ok(),
            log_level: std::env::var("LOG_LEVEL").unwrap_or(defaults.log_level),
        };
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from TOML. Missing keys keep their defaults.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(content).map_err(|e| Error::Config(format!("bad config: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    /// Read and parse a TOML config file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read config file {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    pub fn validate(&self) -> Result<()> {
        if self.admission_cap == 0 {
            return Err(Error::Config("admission_cap must be at least 1".to_string()));
        }
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be at least 1".to_string()));
        }
        if self.journal_capacity == 0 {
            return Err(Error::Config("journal_capacity must be at least 1".to_string()));
        }
        Ok(())
    }
}

fn parsed_var<T>(name: &str) -> Result<Option<T>>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map(Some)
            .map_err(|e| Error::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => Ok(None),
    }
}
