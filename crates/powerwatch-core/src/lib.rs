//! powerwatch-core — shared types and configuration for powerwatch.
//!
//! Parses `powerwatch.toml` and defines the policy enums the engine and the
//! daemon agree on.

pub mod config;
pub mod error;
pub mod parse;
pub mod types;

pub use config::{
    ApiConfig, ClassifierConfig, EngineConfig, FeaturesConfig, PowerwatchConfig, StoreBackend,
    StoreConfig,
};
pub use error::{ConfigError, ConfigResult};
pub use parse::{parse_clock, parse_duration};
pub use types::*;
