use thiserror::Error;

/// Structural failures of the form engine.
///
/// Field-level validation problems are never reported through this type; they
/// live on the fields themselves as validity messages and presentation state.
#[derive(Error, Debug)]
pub enum FormError {
    #[error("malformed path `{path}`: {reason}")]
    MalformedPath { path: String, reason: &'static str },

    #[error("path `{path}` is deeper than {limit} segments")]
    PathTooDeep { path: String, limit: usize },

    #[error("corrupt payload for section `{prefix}`: {reason}")]
    CorruptPayload { prefix: String, reason: String },

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("json5 error: {0}")]
    Json5(#[from] json5::Error),
}

pub type Result<T, E = FormError> = std::result::Result<T, E>;
