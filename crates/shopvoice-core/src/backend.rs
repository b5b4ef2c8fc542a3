//! Collaborator contracts: the generative backend and the retrieval tool invoker.
//!
//! Both are shared process-wide behind `Arc<dyn …>` and must hold no
//! per-request mutable state.
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;

use crate::error::GenerationError;

/// Appended to the trailing user message of every structured request.
pub const JSON_ONLY_INSTRUCTION: &str = "\n\nIMPORTANT: You MUST respond with ONLY valid JSON. \
No explanations, no markdown, no code blocks. Just raw JSON starting with { and ending with }.";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: Role::System,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }
}

/// Produces free text or structured objects from a prompt.
#[async_trait]
pub trait GenerativeBackend: Send + Sync {
    /// Free-text generation.
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError>;

    /// Structured generation. Tolerates code fences and prose around the object.
    async fn generate_json(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value, GenerationError> {
        let mut request = messages.to_vec();
        if let Some(last) = request.last_mut() {
            if last.role == Role::User {
                last.content.push_str(JSON_ONLY_INSTRUCTION);
            }
        }
        let text = self.generate(&request, temperature, max_tokens).await?;
        parse_structured(&text)
    }
}

#[async_trait]
impl GenerativeBackend for Arc<dyn GenerativeBackend> {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        (**self).generate(messages, temperature, max_tokens).await
    }

    async fn generate_json(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<Value, GenerationError> {
        (**self).generate_json(messages, temperature, max_tokens).await
    }
}

/// Outcome of a tool call. Failures are carried as data, never raised.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ToolResponse {
    pub records: Vec<Value>,
    pub failure: Option<String>,
}

impl ToolResponse {
    pub fn ok(records: Vec<Value>) -> Self {
        Self {
            records,
            failure: None,
        }
    }

    pub fn failed(reason: impl Into<String>) -> Self {
        Self {
            records: Vec::new(),
            failure: Some(reason.into()),
        }
    }
}

/// Executes a named retrieval tool against a query payload.
#[async_trait]
pub trait ToolInvoker: Send + Sync {
    async fn invoke(&self, tool: &str, payload: &Value) -> ToolResponse;
}

/// Parse model output into a JSON object.
///
/// Strips a surrounding code fence, then tries a direct parse; failing that,
/// parses the first brace-balanced `{...}` span.
pub fn parse_structured(text: &str) -> Result<Value, GenerationError> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return Err(GenerationError::Empty);
    }

    let cleaned = strip_code_fence(trimmed);
    if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(cleaned) {
        return Ok(value);
    }

    match first_balanced_object(cleaned) {
        Some(span) => match serde_json::from_str::<Value>(span) {
            Ok(value @ Value::Object(_)) => Ok(value),
            Ok(_) => Err(GenerationError::Malformed(format!(
                "expected a JSON object: {}",
                preview(cleaned)
            ))),
            Err(e) => Err(GenerationError::Malformed(format!(
                "invalid JSON in response ({}): {}",
                e,
                preview(cleaned)
            ))),
        },
        None => Err(GenerationError::Malformed(format!(
            "no JSON found in response: {}",
            preview(cleaned)
        ))),
    }
}

fn strip_code_fence(text: &str) -> &str {
    if !text.starts_with("```") {
        return text;
    }
    // Drop the opening fence line (``` or ```json).
    let body = match text.find('\n') {
        Some(idx) => &text[idx + 1..],
        None => return text.trim_start_matches('`').trim(),
    };
    let body = body.trim_end();
    body.strip_suffix("```").unwrap_or(body).trim()
}

/// Locate the first `{...}` span whose braces balance, ignoring braces
/// inside string literals.
fn first_balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

fn preview(text: &str) -> String {
    text.chars().take(200).collect()
}
