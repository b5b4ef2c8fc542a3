//! Deterministic collaborator doubles for tests and local runs.
use async_trait::async_trait;
use serde_json::Value;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use crate::backend::{ChatMessage, GenerativeBackend, ToolInvoker, ToolResponse};
use crate::error::GenerationError;

/// Replays queued replies in order; once the queue is drained every call
/// fails with a transport error.
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, GenerationError>>>,
    calls: AtomicUsize,
}

impl ScriptedBackend {
    pub fn new<I>(replies: I) -> Self
    where
        I: IntoIterator<Item = Result<String, GenerationError>>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    /// A backend that is never reachable.
    pub fn unavailable() -> Self {
        Self::new(Vec::new())
    }

    /// Replies with the given texts, in order.
    pub fn replying<I, S>(texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(texts.into_iter().map(|t| Ok(t.into())))
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl GenerativeBackend for ScriptedBackend {
    async fn generate(
        &self,
        _messages: &[ChatMessage],
        _temperature: f32,
        _max_tokens: u32,
    ) -> Result<String, GenerationError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let next = match self.replies.lock() {
            Ok(mut queue) => queue.pop_front(),
            Err(_) => None,
        };
        next.unwrap_or_else(|| Err(GenerationError::Transport("backend unavailable".to_string())))
    }
}

/// Returns canned records per tool name. Tools without records answer with
/// an empty list; tools marked as failing answer with a transport failure.
#[derive(Default)]
pub struct StaticTools {
    records: HashMap<String, Vec<Value>>,
    failing: Vec<String>,
    calls: Mutex<Vec<(String, Value)>>,
}

impl StaticTools {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_records(mut self, tool: &str, records: Vec<Value>) -> Self {
        self.records.insert(tool.to_string(), records);
        self
    }

    pub fn failing(mut self, tool: &str) -> Self {
        self.failing.push(tool.to_string());
        self
    }

    /// Every `(tool, payload)` received so far, in call order.
    pub fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl ToolInvoker for StaticTools {
    async fn invoke(&self, tool: &str, payload: &Value) -> ToolResponse {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push((tool.to_string(), payload.clone()));
        }
        if self.failing.iter().any(|t| t == tool) {
            return ToolResponse::failed(format!("{tool}: connection refused"));
        }
        ToolResponse::ok(self.records.get(tool).cloned().unwrap_or_default())
    }
}
