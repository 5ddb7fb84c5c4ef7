use std::path::PathBuf;

use thiserror::Error;

/// Failures while loading or reading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required file source does not exist.
    #[error("configuration file not found at {path}")]
    MissingFile { path: PathBuf },
    /// A file source exists but could not be read.
    #[error("failed to read configuration file {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    /// TOML that does not parse. `origin` is the file path or the label
    /// given with the text.
    #[error("failed to parse TOML configuration from {origin}: {source}")]
    Parse {
        origin: String,
        #[source]
        source: toml::de::Error,
    },
    /// A `.env` file that could not be read or parsed.
    #[error("failed to read env file {path}: {source}")]
    EnvFile {
        path: PathBuf,
        #[source]
        source: dotenvy::Error,
    },
    /// Returned by [`Configuration::get_required`](crate::Configuration::get_required).
    #[error("missing required configuration key `{key}`")]
    MissingKey { key: String },
    /// A value that does not parse into the requested type.
    #[error("invalid value `{value}` for configuration key `{key}`: {message}")]
    InvalidValue {
        key: String,
        value: String,
        message: String,
    },
}
