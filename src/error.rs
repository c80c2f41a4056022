use std::path::PathBuf;

use thiserror::Error;

use crate::model::ModelHead;

/// Errors raised while binding or resolving architectures.
#[derive(Debug, Error)]
pub enum RegistryError {
    /// Two modules claimed the same key with different types. This is a
    /// packaging bug and should abort initialization.
    #[error("'{key}' is already registered in the {namespace} namespace as {existing}; refusing to rebind it to {attempted}")]
    DuplicateRegistration {
        namespace: &'static str,
        key: String,
        existing: &'static str,
        attempted: &'static str,
    },

    #[error("architecture identifier must not be empty")]
    EmptyIdentifier,

    #[error("{config_type} declares model_type '{declared}' but was registered as '{requested}'")]
    ModelTypeMismatch {
        config_type: &'static str,
        declared: &'static str,
        requested: String,
    },

    #[error("{model_type} is a {actual} model and cannot be bound as a {expected} model")]
    HeadMismatch {
        model_type: &'static str,
        expected: ModelHead,
        actual: ModelHead,
    },

    #[error("unrecognized model_type '{0}'")]
    UnknownModelType(String),

    #[error("config JSON has no 'model_type' key")]
    MissingModelType,

    #[error("unrecognized configuration class {config_type} for a {head} auto model")]
    UnrecognizedConfig {
        head: ModelHead,
        config_type: &'static str,
    },

    #[error("expected a {expected} configuration, got model_type '{found}'")]
    ConfigTypeMismatch {
        expected: &'static str,
        found: String,
    },

    #[error("invalid {model_type} config: {reason}")]
    InvalidConfig {
        model_type: &'static str,
        reason: String,
    },

    #[error("config file not found at: {}", .0.display())]
    ConfigNotFound(PathBuf),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

impl RegistryError {
    pub(crate) fn invalid(model_type: &'static str, reason: impl Into<String>) -> Self {
        RegistryError::InvalidConfig {
            model_type,
            reason: reason.into(),
        }
    }
}
