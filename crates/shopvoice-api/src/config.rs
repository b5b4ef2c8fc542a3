//! Service configuration
//!
//! An optional YAML file named by `SHOPVOICE_CONFIG` is read first; the
//! environment variables listed in [`AppConfig::apply_overrides`] win over it.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::path::Path;

use shopvoice_clients::{LlmConfig, Provider, ToolsConfig};
use shopvoice_quality::ValidationProfile;

pub const CONFIG_ENV: &str = "SHOPVOICE_CONFIG";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            addr: "0.0.0.0:8787".to_string(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub tools: ToolsConfig,
    pub quality: ValidationProfile,
}

impl AppConfig {
    /// File (if any) then process environment.
    pub fn load() -> anyhow::Result<Self> {
        let mut config = match std::env::var(CONFIG_ENV) {
            Ok(path) => Self::from_file(&path)?,
            Err(_) => Self::default(),
        };
        config.apply_overrides(|key| std::env::var(key).ok())?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::from_yaml(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_yaml(yaml: &str) -> anyhow::Result<Self> {
        let config: Self = serde_yaml::from_str(yaml)?;
        config.quality.validate()?;
        Ok(config)
    }

    /// Apply `SHOPVOICE_ADDR`, `LLM_PROVIDER`, `LLM_BASE_URL`, `LLM_MODEL`,
    /// `LLM_API_KEY`, `LLM_TEMPERATURE`, `LLM_TIMEOUT_SECS`, `MCP_BASE` and
    /// `TOOL_TIMEOUT_SECS` from `lookup`.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(addr) = get("SHOPVOICE_ADDR") {
            self.server.addr = addr;
        }
        if let Some(provider) = get("LLM_PROVIDER") {
            self.llm.provider = Provider::parse(&provider)?;
        }
        if let Some(url) = get("LLM_BASE_URL") {
            self.llm.base_url = Some(url);
        }
        if let Some(model) = get("LLM_MODEL") {
            self.llm.model = model;
        }
        if let Some(key) = get("LLM_API_KEY") {
            self.llm.api_key = Some(key);
        }
        if let Some(temperature) = get("LLM_TEMPERATURE") {
            let value = temperature
                .trim()
                .parse::<f32>()
                .with_context(|| format!("LLM_TEMPERATURE={}", temperature))?;
            self.llm.temperature = Some(value);
        }
        if let Some(secs) = get("LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("LLM_TIMEOUT_SECS={}", secs))?;
        }
        if let Some(base) = get("MCP_BASE") {
            self.tools.base_url = base;
        }
        if let Some(secs) = get("TOOL_TIMEOUT_SECS") {
            self.tools.timeout_secs = secs
                .trim()
                .parse()
                .with_context(|| format!("TOOL_TIMEOUT_SECS={}", secs))?;
        }
        Ok(())
    }
}
