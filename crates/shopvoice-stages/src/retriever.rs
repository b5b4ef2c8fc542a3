//! EvidenceRetriever: plan → evidence keyed by source
//!
//! Catalog and web searches are independent and write disjoint keys, so they
//! are dispatched concurrently. Tool failures degrade to empty results.

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Instant;
use tokio::task::JoinHandle;
use tracing::{debug, error, warn};

use shopvoice_core::{
    CatalogItem, Evidence, ExecutionContext, LogEntry, Plan, RequestState, Source, Stage,
    StageError, ToolInvoker, WebItem,
};

/// Upper bound on web results regardless of the plan's `top_k`.
pub const WEB_RESULT_LIMIT: u32 = 5;

/// Log record of one tool dispatch.
#[derive(Debug, Clone, Serialize)]
pub struct ToolCallRecord {
    pub tool: String,
    pub payload: Value,
    pub results_count: usize,
    pub dropped: usize,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

pub struct EvidenceRetriever {
    tools: Arc<dyn ToolInvoker>,
}

impl EvidenceRetriever {
    pub const ID: &'static str = "data_retriever";

    pub fn new(tools: Arc<dyn ToolInvoker>) -> Self {
        Self { tools }
    }

    /// Start one search on its own task. A panicking tool surfaces as a join
    /// error rather than unwinding through the stage.
    fn spawn_search<T>(
        &self,
        source: Source,
        payload: Value,
        keep: fn(&T) -> bool,
    ) -> JoinHandle<(Vec<T>, ToolCallRecord)>
    where
        T: DeserializeOwned + Send + 'static,
    {
        tokio::spawn(dispatch(self.tools.clone(), source, payload, keep))
    }
}

async fn dispatch<T>(
    tools: Arc<dyn ToolInvoker>,
    source: Source,
    payload: Value,
    keep: fn(&T) -> bool,
) -> (Vec<T>, ToolCallRecord)
where
    T: DeserializeOwned,
{
    let tool = source.tool_name();
    let start = Instant::now();
    let response = tools.invoke(tool, &payload).await;
    let duration_ms = start.elapsed().as_millis() as u64;

    if let Some(reason) = &response.failure {
        warn!(tool, error = %reason, "tool call failed, continuing with no results");
    }

    let received = response.records.len();
    let items: Vec<T> = response
        .records
        .into_iter()
        .filter_map(|record| serde_json::from_value::<T>(record).ok())
        .filter(|item| keep(item))
        .collect();
    debug!(tool, results = items.len(), duration_ms, "tool call complete");

    let record = ToolCallRecord {
        tool: tool.to_string(),
        payload,
        results_count: items.len(),
        dropped: received - items.len(),
        duration_ms,
        failure: response.failure,
    };
    (items, record)
}

async fn join_search<T>(
    source: Source,
    handle: Option<JoinHandle<(Vec<T>, ToolCallRecord)>>,
) -> Result<Option<(Vec<T>, ToolCallRecord)>, StageError> {
    match handle {
        None => Ok(None),
        Some(handle) => handle.await.map(Some).map_err(|e| {
            error!(tool = source.tool_name(), error = %e, "search task failed");
            StageError::ExecutionFailed(format!("{} task failed: {}", source.tool_name(), e))
        }),
    }
}

fn any_catalog(_: &CatalogItem) -> bool {
    true
}

fn has_url(item: &WebItem) -> bool {
    !item.url.is_empty()
}

#[async_trait]
impl Stage for EvidenceRetriever {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn run(
        &self,
        state: &mut RequestState,
        _ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError> {
        let plan = state
            .plan
            .clone()
            .ok_or_else(|| StageError::ValidationFailed("retrieval requires a plan".to_string()))?;
        let transcript = state.transcript.as_str();
        let mut entry = LogEntry::new(Self::ID);
        let mut evidence = Evidence::default();

        if plan.effective_query(transcript).trim().is_empty() {
            entry.insert("skipped", "empty_query");
            if plan.includes(Source::Catalog) {
                evidence.catalog = Some(Vec::new());
            }
            if plan.includes(Source::Web) {
                evidence.web = Some(Vec::new());
            }
            entry.insert("tool_calls", Vec::<ToolCallRecord>::new());
        } else {
            let catalog = plan.includes(Source::Catalog).then(|| {
                self.spawn_search(Source::Catalog, catalog_payload(&plan, transcript), any_catalog)
            });
            let web = plan
                .includes(Source::Web)
                .then(|| self.spawn_search(Source::Web, web_payload(&plan, transcript), has_url));
            let catalog = join_search(Source::Catalog, catalog).await?;
            let web = join_search(Source::Web, web).await?;

            let mut calls = Vec::new();
            if let Some((items, record)) = catalog {
                evidence.catalog = Some(items);
                calls.push(record);
            }
            if let Some((items, record)) = web {
                evidence.web = Some(items);
                calls.push(record);
            }
            entry.insert("tool_calls", &calls);
        }

        entry.insert("total_results", evidence.counts());
        state.evidence = evidence;
        Ok(entry)
    }
}

/// Catalog payload. `category` is dropped from the filters: the catalog
/// index cannot express it as a metadata filter.
pub fn catalog_payload(plan: &Plan, transcript: &str) -> Value {
    let mut filters = plan.filters.clone();
    filters.remove("category");
    json!({
        "query": plan.effective_query(transcript),
        "top_k": plan.top_k,
        "filters": filters,
    })
}

pub fn web_payload(plan: &Plan, transcript: &str) -> Value {
    json!({
        "query": plan.effective_query(transcript),
        "top_k": plan.top_k.min(WEB_RESULT_LIMIT),
    })
}
