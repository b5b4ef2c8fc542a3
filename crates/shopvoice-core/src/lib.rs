//! ShopVoice Core: request state, stage contract and pipeline runner.
//!
//! A request flows through a strictly linear chain of stages that each read
//! and extend one `RequestState`:
//!
//! ```text
//! transcript → intent → plan → evidence → answer + citations → validated answer
//! ```

pub mod backend;
pub mod context;
pub mod data_model;
pub mod error;
pub mod runner;
pub mod stage;
pub mod testing;

pub use backend::{parse_structured, ChatMessage, GenerativeBackend, Role, ToolInvoker, ToolResponse};
pub use context::ExecutionContext;
pub use data_model::{
    CatalogItem, Citation, CitationSource, ComparisonStrategy, Constraints, Evidence,
    EvidenceItem, Intent, LogEntry, Plan, Ranking, RequestState, Source, Task, WebItem,
};
pub use error::{GenerationError, PipelineError};
pub use runner::{PipelineOutcome, PipelineRunner, StageProof};
pub use stage::{Stage, StageError};

/// Engine version reported by the API.
pub const SHOPVOICE_VERSION: &str = "1.0.0";
