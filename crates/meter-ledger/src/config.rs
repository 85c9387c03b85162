//! Ledger configuration.
//!
//! Loaded from TOML, then overlaid with `METER_LEDGER_*` environment
//! variables. Every section has defaults, so an empty file is valid.
//!
//! ```toml
//! database_path = "/var/lib/meter-ledger/ledger.db"
//!
//! [policy]
//! min_duration_seconds = 10.0
//! min_bytes_total = 1024
//! credits_per_second = 0.1
//! credits_per_mib = 0.5
//! max_credits_per_session = 100.0
//!
//! [limits]
//! max_session_id_len = 128
//!
//! [logging]
//! level = "info"
//! format = "json"
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;

use meter_ledger_core::{CreditPolicy, InputLimits, PolicyConfig, PolicyError};

use crate::kernel::KernelConfig;
use crate::logging::LogFormat;

/// Prefix for environment overrides.
pub const ENV_PREFIX: &str = "METER_LEDGER_";

/// Errors loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid value for {key}: {value:?}")]
    InvalidValue { key: String, value: String },

    #[error("invalid policy: {0}")]
    Policy(#[from] PolicyError),
}

/// Top-level configuration.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// SQLite file. `None` means an in-memory database.
    pub database_path: Option<PathBuf>,
    pub policy: PolicyConfig,
    pub limits: InputLimits,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter when `RUST_LOG` is unset.
    pub level: String,
    /// `"pretty"` or `"json"`.
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn log_format(&self) -> LogFormat {
        LogFormat::from_str_lossy(&self.format)
    }
}

impl LedgerConfig {
    pub fn from_toml_str(s: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }

    /// Read a TOML file and apply environment overrides.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config: Self = toml::from_str(&content)?;
        config.merge_with_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `METER_LEDGER_*` variables from the process environment.
    pub fn merge_with_env(&mut self) -> Result<(), ConfigError> {
        self.merge_with_vars(std::env::vars())
    }

    /// Overlay variables from any source. Unknown keys are ignored.
    pub fn merge_with_vars<I, K, V>(&mut self, vars: I) -> Result<(), ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: Into<String>,
    {
        for (key, value) in vars {
            let Some(name) = key.as_ref().strip_prefix(ENV_PREFIX) else {
                continue;
            };
            let value = value.into();
            match name {
                "DATABASE_PATH" => {
                    self.database_path = if value.is_empty() {
                        None
                    } else {
                        Some(PathBuf::from(value))
                    };
                }
                "LOG_LEVEL" => self.logging.level = value,
                "LOG_FORMAT" => self.logging.format = value,
                "MAX_SESSION_ID_LEN" => {
                    self.limits.max_session_id_len = parse_value(name, &value)?;
                }
                "MIN_DURATION_SECONDS" => {
                    self.policy.min_duration_seconds = parse_value(name, &value)?;
                }
                "MIN_BYTES_TOTAL" => self.policy.min_bytes_total = parse_value(name, &value)?,
                "CREDITS_PER_SECOND" => {
                    self.policy.credits_per_second = parse_value(name, &value)?;
                }
                "CREDITS_PER_MIB" => self.policy.credits_per_mib = parse_value(name, &value)?,
                "MAX_CREDITS_PER_SESSION" => {
                    self.policy.max_credits_per_session = parse_value(name, &value)?;
                }
                _ => {}
            }
        }
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.initial_policy()?;
        if self.limits.max_session_id_len == 0 {
            return Err(ConfigError::InvalidValue {
                key: "limits.max_session_id_len".to_string(),
                value: "0".to_string(),
            });
        }
        Ok(())
    }

    /// The version-1 policy described by this configuration.
    pub fn initial_policy(&self) -> Result<CreditPolicy, ConfigError> {
        Ok(CreditPolicy::from_config(self.policy.clone(), 1)?)
    }

    pub fn kernel_config(&self) -> KernelConfig {
        KernelConfig {
            limits: self.limits,
            ..KernelConfig::default()
        }
    }
}

fn parse_value<T: std::str::FromStr>(name: &str, value: &str) -> Result<T, ConfigError> {
    value.parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{}{}", ENV_PREFIX, name),
        value: value.to_string(),
    })
}
