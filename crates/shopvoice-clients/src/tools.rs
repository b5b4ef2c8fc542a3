//! Retrieval tools over HTTP
//!
//! Each tool is a `POST {base_url}/{route}` taking the payload as JSON and
//! answering `{"results": [...]}`. Failures never escape: they come back as
//! an empty result list with the reason attached.

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::time::{Duration, Instant};
use tracing::{debug, warn};

use shopvoice_core::{ToolInvoker, ToolResponse};

use crate::error::ClientError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ToolsConfig {
    pub base_url: String,
    /// Tool name → route under `base_url`.
    pub routes: BTreeMap<String, String>,
    pub timeout_secs: u64,
}

impl Default for ToolsConfig {
    fn default() -> Self {
        let routes = [("catalog_search", "rag.search"), ("web_search", "web.search")]
            .into_iter()
            .map(|(tool, route)| (tool.to_string(), route.to_string()))
            .collect();
        Self {
            base_url: "http://127.0.0.1:8000".to_string(),
            routes,
            timeout_secs: 20,
        }
    }
}

impl ToolsConfig {
    pub fn url_for(&self, tool: &str) -> Option<String> {
        self.routes
            .get(tool)
            .map(|route| format!("{}/{}", self.base_url.trim_end_matches('/'), route))
    }
}

pub struct HttpToolInvoker {
    client: Client,
    config: ToolsConfig,
}

impl HttpToolInvoker {
    pub fn new(config: ToolsConfig) -> Result<Self, ClientError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| ClientError::Build(e.to_string()))?;
        Ok(Self { client, config })
    }

    pub fn config(&self) -> &ToolsConfig {
        &self.config
    }

    async fn call(&self, url: &str, payload: &Value) -> Result<Vec<Value>, String> {
        let response = self
            .client
            .post(url)
            .json(payload)
            .send()
            .await
            .map_err(|e| e.to_string())?;

        let status = response.status();
        if !status.is_success() {
            return Err(format!("HTTP {}", status));
        }
        let body: Value = response.json().await.map_err(|e| e.to_string())?;
        records_from_body(body)
    }
}

#[async_trait]
impl ToolInvoker for HttpToolInvoker {
    async fn invoke(&self, tool: &str, payload: &Value) -> ToolResponse {
        let Some(url) = self.config.url_for(tool) else {
            warn!(tool, "no route configured for tool");
            return ToolResponse::failed(format!("unknown tool: {}", tool));
        };

        let start = Instant::now();
        match self.call(&url, payload).await {
            Ok(records) => {
                debug!(
                    tool,
                    results = records.len(),
                    elapsed_ms = start.elapsed().as_millis() as u64,
                    "tool call succeeded"
                );
                ToolResponse::ok(records)
            }
            Err(reason) => {
                warn!(tool, url = %url, error = %reason, "tool call failed");
                ToolResponse::failed(reason)
            }
        }
    }
}

/// The `results` array of a tool response body.
pub fn records_from_body(body: Value) -> Result<Vec<Value>, String> {
    match body {
        Value::Object(mut map) => match map.remove("results") {
            Some(Value::Array(records)) => Ok(records),
            Some(_) => Err("`results` is not an array".to_string()),
            None => Err("response has no `results`".to_string()),
        },
        _ => Err("response is not a JSON object".to_string()),
    }
}
