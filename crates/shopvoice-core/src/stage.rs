//! Stage Trait: the single contract every pipeline stage implements
use async_trait::async_trait;

use crate::context::ExecutionContext;
use crate::data_model::{LogEntry, RequestState};

/// A pipeline stage. It reads and extends the shared request state and
/// returns the log entry describing what it did; the runner appends it.
#[async_trait]
pub trait Stage: Send + Sync {
    /// Stage id, also used as the log entry's `node` (ex: "intent_classifier").
    fn id(&self) -> &'static str;

    /// Whether the stage output depends only on its input (no generative call).
    fn deterministic(&self) -> bool {
        false
    }

    async fn run(
        &self,
        state: &mut RequestState,
        ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError>;
}

#[derive(Debug, Clone)]
pub enum StageError {
    ValidationFailed(String),
    ExecutionFailed(String),
}

impl std::fmt::Display for StageError {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        match self {
            Self::ValidationFailed(msg) => write!(f, "STAGE/VALIDATION: {}", msg),
            Self::ExecutionFailed(msg) => write!(f, "STAGE/EXEC: {}", msg),
        }
    }
}

impl std::error::Error for StageError {}
