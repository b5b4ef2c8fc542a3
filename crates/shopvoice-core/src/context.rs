//! Execution Context: per-request metadata shared by every stage
use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

#[derive(Debug, Clone)]
pub struct ExecutionContext {
    pub trace_id: String,
    pub started_at: DateTime<Utc>,
    pub metadata: HashMap<String, Value>,
}

impl ExecutionContext {
    pub fn new() -> Self {
        Self {
            trace_id: uuid::Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            metadata: HashMap::new(),
        }
    }

    /// Reuse a trace id supplied by the caller (e.g. an inbound request header).
    pub fn with_trace_id(trace_id: impl Into<String>) -> Self {
        Self {
            trace_id: trace_id.into(),
            ..Self::new()
        }
    }
}

impl Default for ExecutionContext {
    fn default() -> Self {
        Self::new()
    }
}
