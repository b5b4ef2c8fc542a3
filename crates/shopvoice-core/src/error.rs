//! Unified Error Model
//!
//! Transport and malformed-output failures of the generative backend are
//! recovered by the calling stage. Anything that reaches `PipelineError`
//! is an internal fault and is surfaced to the caller.
use thiserror::Error;

/// Failure of a generative backend call.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum GenerationError {
    #[error("TRANSPORT/{0}")]
    Transport(String),

    #[error("MALFORMED/{0}")]
    Malformed(String),

    #[error("EMPTY/model returned empty response")]
    Empty,
}

/// Failure that aborts a pipeline run.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("STAGE/{stage}: {message}")]
    Stage { stage: String, message: String },

    #[error("INTERNAL/{0}")]
    Internal(String),

    #[error("SERIALIZE/{0}")]
    Serialize(String),
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialize(err.to_string())
    }
}
