//! ShopVoice Stages: the generative stages of the answer pipeline.
//!
//! Every stage has a primary path through the generative backend or the
//! retrieval tools and a deterministic fallback that produces output of the
//! same shape.
//!
//! # Pipeline Flow
//!
//! ```text
//! transcript → Intent → Plan → Retrieve → Synthesize → Validate → answer
//!                ↓        ↓        ↓           ↓            ↓
//!             flags    sources  evidence   citations     checks
//! ```

pub mod intent;
pub mod planner;
pub mod reconcile;
pub mod retriever;
pub mod similarity;
pub mod synthesizer;

pub use intent::IntentClassifier;
pub use planner::QueryPlanner;
pub use reconcile::{reconcile, PriceConflict, ReconciledEntry, SourceType};
pub use retriever::EvidenceRetriever;
pub use similarity::token_set_ratio;
pub use synthesizer::ResponseSynthesizer;

use std::sync::Arc;

use shopvoice_core::{GenerativeBackend, PipelineRunner, Stage, ToolInvoker};
use shopvoice_policy::SafetyPolicy;
use shopvoice_quality::{QualityValidator, ValidationProfile};

/// The five-stage pipeline with default policy and validation profile.
pub fn standard_pipeline(
    backend: Arc<dyn GenerativeBackend>,
    tools: Arc<dyn ToolInvoker>,
) -> PipelineRunner {
    pipeline_with(backend, tools, SafetyPolicy::default(), ValidationProfile::default())
}

pub fn pipeline_with(
    backend: Arc<dyn GenerativeBackend>,
    tools: Arc<dyn ToolInvoker>,
    policy: SafetyPolicy,
    profile: ValidationProfile,
) -> PipelineRunner {
    let stages: Vec<Box<dyn Stage>> = vec![
        Box::new(IntentClassifier::new(backend.clone()).with_policy(policy)),
        Box::new(QueryPlanner::new(backend.clone())),
        Box::new(EvidenceRetriever::new(tools)),
        Box::new(ResponseSynthesizer::new(backend)),
        Box::new(QualityValidator::new(profile)),
    ];
    PipelineRunner::new(stages)
}
