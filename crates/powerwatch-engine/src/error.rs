//! Error types for the decision engine.

use powerwatch_state::StoreError;
use thiserror::Error;

/// Failures of a classifier call or model.
#[derive(Debug, Error)]
pub enum ClassifierError {
    #[error("inference failed: {0}")]
    Inference(String),

    #[error("classifier returned label {0}, expected 0 or 1")]
    MalformedOutput(u32),

    #[error("classifier expects {expected} features, got {got}")]
    WrongWidth { expected: usize, got: usize },

    #[error("invalid model: {0}")]
    Model(String),

    #[error("failed to read model {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Errors raised while evaluating an appliance or building the engine.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("store unavailable: {0}")]
    StoreUnavailable(#[from] StoreError),

    #[error("classifier error: {0}")]
    Classifier(#[from] ClassifierError),

    #[error("feature schema {schema} has {expected} fields but the classifier expects {model}")]
    SchemaMismatch {
        schema: &'static str,
        expected: usize,
        model: usize,
    },

    #[error("partial commit: {0}")]
    PartialCommit(String),

    #[error("{stage} timed out after {timeout_ms}ms")]
    Timeout { stage: &'static str, timeout_ms: u64 },

    #[error("appliance snapshot at {path:?} is not an object")]
    MalformedSnapshot { path: String },
}
