//! Chat-completion backend over HTTP
//!
//! Two wire formats are supported: the OpenAI-compatible
//! `POST {base}/chat/completions` (OpenAI, Gemini's compatibility endpoint,
//! Ollama, vLLM, llama.cpp servers) and Anthropic's `POST {base}/v1/messages`.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::fmt;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use shopvoice_core::{ChatMessage, GenerationError, GenerativeBackend, Role};

use crate::error::ClientError;

const ANTHROPIC_VERSION: &str = "2023-06-01";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Provider {
    #[default]
    Google,
    OpenAi,
    Anthropic,
    Ollama,
    Local,
}

impl Provider {
    pub fn parse(label: &str) -> Result<Self, ClientError> {
        match label.trim().to_lowercase().as_str() {
            "google" | "gemini" => Ok(Provider::Google),
            "openai" => Ok(Provider::OpenAi),
            "anthropic" => Ok(Provider::Anthropic),
            "ollama" => Ok(Provider::Ollama),
            "local" => Ok(Provider::Local),
            other => Err(ClientError::Config(format!("unsupported provider: {}", other))),
        }
    }

    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Google => "https://generativelanguage.googleapis.com/v1beta/openai",
            Provider::OpenAi => "https://api.openai.com/v1",
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::Ollama => "http://localhost:11434/v1",
            Provider::Local => "http://localhost:8000/v1",
        }
    }

    fn speaks_anthropic(&self) -> bool {
        matches!(self, Provider::Anthropic)
    }
}

impl fmt::Display for Provider {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            Provider::Google => "google",
            Provider::OpenAi => "openai",
            Provider::Anthropic => "anthropic",
            Provider::Ollama => "ollama",
            Provider::Local => "local",
        };
        f.write_str(label)
    }
}

/// Backend configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LlmConfig {
    pub provider: Provider,
    /// Defaults to the provider's public endpoint.
    pub base_url: Option<String>,
    pub model: String,
    pub api_key: Option<String>,
    /// When set, replaces the temperature requested by each stage.
    pub temperature: Option<f32>,
    pub timeout_secs: u64,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: Provider::Google,
            base_url: None,
            model: "gemini-2.5-flash-lite".to_string(),
            api_key: None,
            temperature: None,
            timeout_secs: 60,
        }
    }
}

impl LlmConfig {
    pub fn base_url(&self) -> &str {
        self.base_url
            .as_deref()
            .unwrap_or_else(|| self.provider.default_base_url())
            .trim_end_matches('/')
    }

    pub fn endpoint(&self) -> String {
        if self.provider.speaks_anthropic() {
            format!("{}/v1/messages", self.base_url())
        } else {
            format!("{}/chat/completions", self.base_url())
        }
    }
}

/// Generative backend speaking HTTP. Holds one connection pool and no
/// per-request state, so a single instance serves concurrent requests.
pub struct HttpBackend {
    client: Client,
    config: LlmConfig,
    endpoint: String,
}

impl HttpBackend {
    pub fn new(config: LlmConfig) -> Result<Self, ClientError> {
        if config.provider.speaks_anthropic() && config.api_key.is_none() {
            return Err(ClientError::Config("anthropic provider requires an API key".to_string()));
        }
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        let endpoint = config.endpoint();
        Ok(Self {
            client,
            config,
            endpoint,
        })
    }

    pub fn config(&self) -> &LlmConfig {
        &self.config
    }

    fn request(&self, body: &Value) -> reqwest::RequestBuilder {
        let builder = self.client.post(&self.endpoint).json(body);
        match (&self.config.api_key, self.config.provider) {
            (Some(key), Provider::Anthropic) => builder
                .header("x-api-key", key)
                .header("anthropic-version", ANTHROPIC_VERSION),
            (Some(key), _) => builder.bearer_auth(key),
            (None, _) => builder,
        }
    }
}

#[async_trait]
impl GenerativeBackend for HttpBackend {
    async fn generate(
        &self,
        messages: &[ChatMessage],
        temperature: f32,
        max_tokens: u32,
    ) -> Result<String, GenerationError> {
        let temperature = self.config.temperature.unwrap_or(temperature);
        let body = if self.config.provider.speaks_anthropic() {
            anthropic_body(&self.config.model, messages, temperature, max_tokens)
        } else {
            chat_completions_body(&self.config.model, messages, temperature, max_tokens)
        };

        let start = Instant::now();
        let response = self.request(&body).send().await.map_err(|e| {
            warn!(provider = %self.config.provider, error = %e, "generation request failed");
            GenerationError::Transport(e.to_string())
        })?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            warn!(provider = %self.config.provider, %status, "generation request rejected");
            return Err(GenerationError::Transport(format!(
                "HTTP {}: {}",
                status,
                truncate(&text, 200)
            )));
        }

        let data: Value = response
            .json()
            .await
            .map_err(|e| GenerationError::Malformed(e.to_string()))?;
        debug!(
            provider = %self.config.provider,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "generation complete"
        );

        let text = if self.config.provider.speaks_anthropic() {
            anthropic_text(&data)
        } else {
            chat_completions_text(&data)
        };
        text.ok_or_else(|| GenerationError::Malformed("response carries no text".to_string()))
    }
}

fn role_name(role: Role) -> &'static str {
    match role {
        Role::System => "system",
        Role::User => "user",
        Role::Assistant => "assistant",
    }
}

pub fn chat_completions_body(
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Value {
    let messages: Vec<Value> = messages
        .iter()
        .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
        .collect();
    json!({
        "model": model,
        "messages": messages,
        "temperature": temperature,
        "max_tokens": max_tokens,
    })
}

/// Anthropic takes system text as a top-level field rather than a message.
pub fn anthropic_body(
    model: &str,
    messages: &[ChatMessage],
    temperature: f32,
    max_tokens: u32,
) -> Value {
    let system: Vec<&str> = messages
        .iter()
        .filter(|m| m.role == Role::System)
        .map(|m| m.content.as_str())
        .collect();
    let turns: Vec<Value> = messages
        .iter()
        .filter(|m| m.role != Role::System)
        .map(|m| json!({ "role": role_name(m.role), "content": m.content }))
        .collect();

    let mut body = json!({
        "model": model,
        "messages": turns,
        "temperature": temperature,
        "max_tokens": max_tokens,
    });
    if !system.is_empty() {
        body["system"] = json!(system.join("\n\n"));
    }
    body
}

pub fn chat_completions_text(data: &Value) -> Option<String> {
    data["choices"][0]["message"]["content"]
        .as_str()
        .map(str::to_string)
}

pub fn anthropic_text(data: &Value) -> Option<String> {
    let blocks = data["content"].as_array()?;
    let text: Vec<&str> = blocks
        .iter()
        .filter(|b| b["type"] == "text")
        .filter_map(|b| b["text"].as_str())
        .collect();
    if text.is_empty() {
        None
    } else {
        Some(text.concat())
    }
}

fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn messages() -> Vec<ChatMessage> {
        vec![ChatMessage::system("be brief"), ChatMessage::user("dish soap?")]
    }

    #[test]
    fn test_endpoints() {
        let config = LlmConfig::default();
        assert_eq!(
            config.endpoint(),
            "https://generativelanguage.googleapis.com/v1beta/openai/chat/completions"
        );

        let config = LlmConfig {
            provider: Provider::Ollama,
            base_url: Some("http://gpu-box:11434/v1/".to_string()),
            ..LlmConfig::default()
        };
        assert_eq!(config.endpoint(), "http://gpu-box:11434/v1/chat/completions");

        let config = LlmConfig {
            provider: Provider::Anthropic,
            ..LlmConfig::default()
        };
        assert_eq!(config.endpoint(), "https://api.anthropic.com/v1/messages");
    }

    #[test]
    fn test_chat_completions_body() {
        let body = chat_completions_body("llama3.2", &messages(), 0.2, 500);
        assert_eq!(body["messages"][0]["role"], "system");
        assert_eq!(body["messages"][1]["content"], "dish soap?");
        assert_eq!(body["max_tokens"], 500);
    }

    #[test]
    fn test_anthropic_body_lifts_system() {
        let body = anthropic_body("claude", &messages(), 0.4, 300);
        assert_eq!(body["system"], "be brief");
        assert_eq!(body["messages"].as_array().unwrap().len(), 1);
        assert_eq!(body["messages"][0]["role"], "user");
    }

    #[test]
    fn test_response_text_extraction() {
        let openai = json!({ "choices": [{ "message": { "content": "Try the lemon soap." } }] });
        assert_eq!(chat_completions_text(&openai).as_deref(), Some("Try the lemon soap."));
        assert_eq!(chat_completions_text(&json!({ "choices": [] })), None);

        let anthropic = json!({ "content": [{ "type": "text", "text": "Try " }, { "type": "text", "text": "it." }] });
        assert_eq!(anthropic_text(&anthropic).as_deref(), Some("Try it."));
    }

    #[test]
    fn test_provider_parsing() {
        assert_eq!(Provider::parse("Gemini").unwrap(), Provider::Google);
        assert_eq!(Provider::parse("ollama").unwrap(), Provider::Ollama);
        assert!(Provider::parse("carrier-pigeon").is_err());
    }

    #[test]
    fn test_anthropic_requires_key() {
        let config = LlmConfig {
            provider: Provider::Anthropic,
            ..LlmConfig::default()
        };
        assert!(matches!(HttpBackend::new(config), Err(ClientError::Config(_))));
    }

    #[tokio::test]
    async fn test_unreachable_backend_is_transport_error() {
        let backend = HttpBackend::new(LlmConfig {
            provider: Provider::Local,
            base_url: Some("http://127.0.0.1:1/v1".to_string()),
            timeout_secs: 2,
            ..LlmConfig::default()
        })
        .unwrap();
        let err = backend.generate(&messages(), 0.2, 10).await.unwrap_err();
        assert!(matches!(err, GenerationError::Transport(_)));
    }
}
