//! Binary entrypoint for the ShopVoice API server.
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use shopvoice_api::{run, AppConfig, AppState};
use shopvoice_clients::{HttpBackend, HttpToolInvoker};
use shopvoice_policy::SafetyPolicy;
use shopvoice_stages::pipeline_with;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    // SHOPVOICE_CONFIG names an optional YAML file; env vars override it.
    let config = AppConfig::load()?;
    tracing::info!(
        provider = %config.llm.provider,
        model = %config.llm.model,
        tools = %config.tools.base_url,
        "configuration loaded"
    );

    let backend = Arc::new(HttpBackend::new(config.llm.clone())?);
    let tools = Arc::new(HttpToolInvoker::new(config.tools.clone())?);
    let runner = pipeline_with(backend, tools, SafetyPolicy::default(), config.quality);

    run(&config.server.addr, AppState::new(runner)?).await
}
