//! QueryPlanner: intent → retrieval plan

use async_trait::async_trait;
use serde_json::{json, Map, Value};
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

use shopvoice_core::{
    ChatMessage, ComparisonStrategy, ExecutionContext, GenerationError, GenerativeBackend, Intent,
    LogEntry, Plan, Ranking, RequestState, Source, Stage, StageError,
};

const SYSTEM_PLANNER: &str = include_str!("../prompts/system_planner.md");
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 500;

pub const DEFAULT_TOP_K: u32 = 5;
pub const CLEANING_KEYWORDS: &[&str] = &["clean", "cleaner", "disinfect", "sanitize", "wash"];
pub const CLEANING_CATEGORY: &str = "Household Cleaning";
/// Fields requested by rule-based plans.
pub const DEFAULT_FIELDS: &[&str] = &["sku", "title", "price", "rating", "brand", "ingredients"];
/// Fields assumed when a generated plan omits them.
pub const GENERATED_DEFAULT_FIELDS: &[&str] = &["sku", "title", "price"];

pub struct QueryPlanner {
    backend: Arc<dyn GenerativeBackend>,
}

impl QueryPlanner {
    pub const ID: &'static str = "query_planner";

    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Primary path: structured generation over a summary of the intent.
    pub async fn generate_plan(&self, transcript: &str, intent: &Intent) -> Result<Plan, GenerationError> {
        let messages = [
            ChatMessage::system(SYSTEM_PLANNER),
            ChatMessage::user(planning_context(transcript, intent)),
        ];
        let value = self
            .backend
            .generate_json(&messages, TEMPERATURE, MAX_TOKENS)
            .await?;
        Ok(plan_from_generated(&value, transcript))
    }
}

#[async_trait]
impl Stage for QueryPlanner {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn run(
        &self,
        state: &mut RequestState,
        _ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError> {
        let intent = state.intent.clone().unwrap_or_default();
        let transcript = state.transcript.trim();
        let mut entry = LogEntry::new(Self::ID);

        let plan = if transcript.is_empty() {
            entry.insert("skipped_generation", "empty_transcript");
            fallback_plan(transcript, &intent)
        } else {
            match self.generate_plan(transcript, &intent).await {
                Ok(plan) => {
                    info!(sources = plan.sources.len(), "execution plan generated");
                    plan
                }
                Err(e) => {
                    warn!(error = %e, "plan generation failed, using rule-based fallback");
                    entry.insert("warning", "llm_fallback");
                    entry.insert("error", e.to_string());
                    fallback_plan(transcript, &intent)
                }
            }
        };

        entry.insert("plan", &plan);
        state.plan = Some(plan);
        Ok(entry)
    }
}

fn planning_context(transcript: &str, intent: &Intent) -> String {
    fn show<T: std::fmt::Display>(value: &Option<T>) -> String {
        value
            .as_ref()
            .map(|v| v.to_string())
            .unwrap_or_else(|| "none".to_string())
    }

    let c = &intent.constraints;
    let mut context = String::new();
    let _ = writeln!(context, "User query: {}", transcript);
    let _ = writeln!(context);
    let _ = writeln!(context, "Intent analysis:");
    let _ = writeln!(context, "- Task: {}", intent.task);
    let _ = writeln!(context, "- Budget: {}", show(&c.budget));
    let _ = writeln!(context, "- Material: {}", show(&c.material));
    let _ = writeln!(context, "- Brand: {}", show(&c.brand));
    let _ = writeln!(context, "- Category: {}", show(&c.category));
    let _ = writeln!(context, "- Needs live data: {}", intent.needs_live);
    let _ = writeln!(context);
    context.push_str("Design an execution plan as JSON.");
    context
}

/// Rule-based plan used when generation is unavailable.
pub fn fallback_plan(transcript: &str, intent: &Intent) -> Plan {
    let lowered = transcript.to_lowercase();
    let budget = intent.constraints.budget;
    let mut filters = Map::new();

    if CLEANING_KEYWORDS.iter().any(|k| lowered.contains(k)) {
        filters.insert("category".to_string(), json!(CLEANING_CATEGORY));
    }
    if let Some(budget) = budget {
        filters.insert("price".to_string(), json!({ "lte": budget }));
    }

    let mut sources = vec![Source::Catalog];
    if intent.needs_live {
        sources.push(Source::Web);
    }

    Plan {
        sources,
        filters,
        query_text: transcript.to_string(),
        fields: DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect(),
        ranking: if budget.is_some() {
            Ranking::PriceAsc
        } else {
            Ranking::Relevance
        },
        top_k: DEFAULT_TOP_K,
        comparison_strategy: if intent.needs_live {
            ComparisonStrategy::PriceCheck
        } else {
            ComparisonStrategy::None
        },
    }
}

/// Read a generated plan field by field, defaulting anything missing or invalid.
pub fn plan_from_generated(value: &Value, transcript: &str) -> Plan {
    let mut sources: Vec<Source> = Vec::new();
    let labels: Vec<&str> = match value.get("sources") {
        Some(Value::Array(items)) => items.iter().filter_map(Value::as_str).collect(),
        Some(Value::String(s)) => vec![s.as_str()],
        _ => Vec::new(),
    };
    for source in labels.into_iter().filter_map(Source::parse) {
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        sources.push(Source::Catalog);
    }

    let filters = value
        .get("filters")
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default();

    let query_text = value
        .get("query_text")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .unwrap_or(transcript)
        .to_string();

    let fields: Vec<String> = value
        .get("fields")
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .map(str::to_string)
                .collect()
        })
        .filter(|f: &Vec<String>| !f.is_empty())
        .unwrap_or_else(|| GENERATED_DEFAULT_FIELDS.iter().map(|f| f.to_string()).collect());

    let ranking = match value.get("ranking").and_then(Value::as_str) {
        Some("price_asc") => Ranking::PriceAsc,
        _ => Ranking::Relevance,
    };

    let top_k = value
        .get("top_k")
        .and_then(|v| v.as_u64().or_else(|| v.as_f64().map(|f| f as u64)))
        .filter(|k| *k > 0)
        .map(|k| k.min(u32::MAX as u64) as u32)
        .unwrap_or(DEFAULT_TOP_K);

    let comparison_strategy = match value.get("comparison_strategy").and_then(Value::as_str) {
        Some("price_check") => ComparisonStrategy::PriceCheck,
        _ => ComparisonStrategy::None,
    };

    Plan {
        sources,
        filters,
        query_text,
        fields,
        ranking,
        top_k,
        comparison_strategy,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::intent::fallback_intent;
    use shopvoice_core::testing::ScriptedBackend;

    #[test]
    fn test_fallback_plan_with_budget() {
        let transcript = "Find eco-friendly dish soap under $12";
        let plan = fallback_plan(transcript, &fallback_intent(transcript));

        assert_eq!(plan.filters["price"]["lte"], json!(12.0));
        assert_eq!(plan.sources, vec![Source::Catalog]);
        assert_eq!(plan.ranking, Ranking::PriceAsc);
        assert_eq!(plan.comparison_strategy, ComparisonStrategy::None);
        assert_eq!(plan.top_k, DEFAULT_TOP_K);
        assert!(!plan.filters.contains_key("category"));
    }

    #[test]
    fn test_fallback_plan_live_and_cleaning() {
        let transcript = "current price of a glass cleaner now";
        let plan = fallback_plan(transcript, &fallback_intent(transcript));

        assert_eq!(plan.sources, vec![Source::Catalog, Source::Web]);
        assert_eq!(plan.filters["category"], json!(CLEANING_CATEGORY));
        assert_eq!(plan.ranking, Ranking::Relevance);
        assert_eq!(plan.comparison_strategy, ComparisonStrategy::PriceCheck);
        assert_eq!(plan.fields.len(), DEFAULT_FIELDS.len());
    }

    #[test]
    fn test_generated_plan_defaults() {
        let plan = plan_from_generated(&json!({}), "dish soap");
        assert_eq!(plan.sources, vec![Source::Catalog]);
        assert!(plan.filters.is_empty());
        assert_eq!(plan.query_text, "dish soap");
        assert_eq!(plan.fields, vec!["sku", "title", "price"]);
        assert_eq!(plan.ranking, Ranking::Relevance);
        assert_eq!(plan.top_k, 5);
        assert_eq!(plan.comparison_strategy, ComparisonStrategy::None);
    }

    #[test]
    fn test_generated_plan_normalizes_sources() {
        let plan = plan_from_generated(
            &json!({
                "sources": ["rag.search", "web.search", "catalog", "maps"],
                "top_k": 0,
                "ranking": "price_asc",
                "query_text": "  "
            }),
            "kettle",
        );
        assert_eq!(plan.sources, vec![Source::Catalog, Source::Web]);
        assert_eq!(plan.top_k, DEFAULT_TOP_K);
        assert_eq!(plan.ranking, Ranking::PriceAsc);
        assert_eq!(plan.query_text, "kettle");
    }

    #[tokio::test]
    async fn test_stage_logs_plan_on_fallback() {
        let stage = QueryPlanner::new(Arc::new(ScriptedBackend::unavailable()));
        let mut state = RequestState::new("Find eco-friendly dish soap under $12");
        state.intent = Some(fallback_intent(&state.transcript));

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert_eq!(entry.get("warning"), Some(&json!("llm_fallback")));
        assert_eq!(entry.get("plan").unwrap()["ranking"], json!("price_asc"));
        assert_eq!(state.plan.unwrap().filters["price"]["lte"], json!(12.0));
    }

    #[tokio::test]
    async fn test_stage_uses_generated_plan() {
        let backend = Arc::new(ScriptedBackend::replying([
            "```json\n{\"sources\": [\"catalog\", \"web\"], \"query_text\": \"dish soap\", \"top_k\": 3}\n```",
        ]));
        let stage = QueryPlanner::new(backend.clone());
        let mut state = RequestState::new("cheapest dish soap right now");

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        let plan = state.plan.unwrap();
        assert_eq!(plan.sources, vec![Source::Catalog, Source::Web]);
        assert_eq!(plan.top_k, 3);
        assert!(entry.get("warning").is_none());
        assert_eq!(backend.calls(), 1);
    }
}
