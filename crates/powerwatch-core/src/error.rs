//! Configuration errors.

use thiserror::Error;

pub type ConfigResult<T> = Result<T, ConfigError>;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid duration {0:?} (expected e.g. \"30s\", \"2m\", \"500ms\")")]
    Duration(String),

    #[error("invalid clock time {0:?} (expected HH:MM)")]
    Clock(String),

    #[error("`{0}` must be greater than zero")]
    ZeroDuration(&'static str),

    #[error("unsupported store address {0:?} (expected host:port or http://host:port)")]
    UnsupportedScheme(String),

    #[error("store backend {backend:?} requires `{field}`")]
    MissingField {
        backend: &'static str,
        field: &'static str,
    },
}
