//! Configuration errors.

use std::path::PathBuf;

use thiserror::Error;

/// Everything that can go wrong while assembling a configuration.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    /// An explicitly requested configuration file is absent.
    #[error("{} doesn't exist", .path.display())]
    MissingFile { path: PathBuf },

    #[error("failed to read config file {}: {source}", .path.display())]
    ReadFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The file exists but is not a valid configuration document.
    #[error("failed to read config file {}:\n{source}", .path.display())]
    ParseFile {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("no configuration module named {name:?} is registered")]
    UnknownModule { name: String },

    #[error("unknown setting {name:?}")]
    UnknownSetting { name: String },

    #[error("invalid value for {name}: {value}: {reason}")]
    InvalidValue {
        name: String,
        value: String,
        reason: String,
    },

    /// The application hook refused to produce its values.
    #[error("application configuration hook failed: {0:#}")]
    AppHook(anyhow::Error),
}

impl ConfigurationError {
    pub fn invalid(name: &str, value: &toml::Value, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            name: name.to_string(),
            value: value.to_string(),
            reason: reason.into(),
        }
    }
}
