//! Pipeline Runner: sequences stages over one request state and collects proofs
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, error, info_span, Instrument};

use crate::context::ExecutionContext;
use crate::data_model::RequestState;
use crate::error::PipelineError;
use crate::stage::Stage;

/// Per-stage execution record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StageProof {
    pub id: String,
    pub in_hash: String,
    pub out_hash: String,
    pub deterministic: bool,
    pub latency_ms: u64,
}

/// Result of a completed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineOutcome {
    pub trace_id: String,
    pub pipeline_id: String,
    pub state: RequestState,
    pub stages: Vec<StageProof>,
}

pub struct PipelineRunner {
    stages: Vec<Box<dyn Stage>>,
    pipeline_id: String,
}

impl PipelineRunner {
    pub fn new(stages: Vec<Box<dyn Stage>>) -> Self {
        let pipeline_id = stages
            .iter()
            .map(|s| s.id())
            .collect::<Vec<_>>()
            .join("→");

        Self { stages, pipeline_id }
    }

    /// Run every stage in order on a fresh state built from `transcript`.
    pub async fn run(
        &self,
        transcript: &str,
        ctx: &ExecutionContext,
    ) -> Result<PipelineOutcome, PipelineError> {
        let span = info_span!("pipeline", trace_id = %ctx.trace_id, pipeline = %self.pipeline_id);
        async move {
            let mut state = RequestState::new(transcript);
            let stages = self.run_state(&mut state, ctx).await?;
            Ok(PipelineOutcome {
                trace_id: ctx.trace_id.clone(),
                pipeline_id: self.pipeline_id.clone(),
                state,
                stages,
            })
        }
        .instrument(span)
        .await
    }

    /// Run every stage in order over an existing state. Each stage contributes
    /// exactly one log entry; a stage error stops the run.
    pub async fn run_state(
        &self,
        state: &mut RequestState,
        ctx: &ExecutionContext,
    ) -> Result<Vec<StageProof>, PipelineError> {
        if self.stages.is_empty() {
            return Err(PipelineError::Internal("pipeline has no stages".to_string()));
        }
        let mut proofs = Vec::with_capacity(self.stages.len());

        for stage in &self.stages {
            let start = Instant::now();
            let in_hash = self.hash_state(state)?;

            let entry = stage.run(state, ctx).await.map_err(|e| {
                error!(stage = stage.id(), error = %e, "stage failed");
                PipelineError::Stage {
                    stage: stage.id().to_string(),
                    message: e.to_string(),
                }
            })?;
            state.log.push(entry);

            let out_hash = self.hash_state(state)?;
            let latency_ms = start.elapsed().as_millis() as u64;
            debug!(stage = stage.id(), latency_ms, "stage complete");

            proofs.push(StageProof {
                id: stage.id().to_string(),
                in_hash,
                out_hash,
                deterministic: stage.deterministic(),
                latency_ms,
            });
        }

        Ok(proofs)
    }

    fn hash_state(&self, state: &RequestState) -> Result<String, PipelineError> {
        let bytes = serde_json::to_vec(state)?;
        Ok(format!("blake3:{}", blake3::hash(&bytes)))
    }

    pub fn pipeline_id(&self) -> &str {
        &self.pipeline_id
    }

    pub fn len(&self) -> usize {
        self.stages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stages.is_empty()
    }
}
