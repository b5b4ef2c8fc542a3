//! IntentClassifier: transcript → intent + safety flags
//!
//! Primary path asks the generative backend for a structured intent; any
//! generation or parse failure switches to keyword rules. The unsafe-use
//! phrase scan runs on both paths so a listed phrase is never missed.

use async_trait::async_trait;
use lazy_static::lazy_static;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

use shopvoice_core::data_model::parse_price;
use shopvoice_core::{
    ChatMessage, Constraints, ExecutionContext, GenerationError, GenerativeBackend, Intent,
    LogEntry, RequestState, Stage, StageError, Task,
};
use shopvoice_policy::SafetyPolicy;

const SYSTEM_ROUTER: &str = include_str!("../prompts/system_router.md");
const TEMPERATURE: f32 = 0.2;
const MAX_TOKENS: u32 = 500;

/// Terms that signal the user wants live price, stock or time-sensitive data.
pub const LIVE_DATA_KEYWORDS: &[&str] = &[
    "current price",
    "price now",
    "how much",
    "cost today",
    "latest price",
    "price check",
    "in stock",
    "available",
    "can i buy",
    "out of stock",
    "inventory",
    "stock status",
    "now",
    "today",
    "right now",
    "currently",
    "at the moment",
    "this week",
    "best deal",
    "cheapest",
    "lowest price",
    "compare prices",
    "price comparison",
    "latest reviews",
    "recent ratings",
    "current rating",
    "new reviews",
];

lazy_static! {
    /// "under $12", "under 12.50"
    static ref BUDGET: Regex = Regex::new(r"(?i)under\s*\$?(\d+(?:\.\d{1,2})?)").unwrap();
}

pub struct IntentClassifier {
    backend: Arc<dyn GenerativeBackend>,
    policy: SafetyPolicy,
}

impl IntentClassifier {
    pub const ID: &'static str = "intent_classifier";

    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self {
            backend,
            policy: SafetyPolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: SafetyPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Primary path: structured generation. Returns the intent and the
    /// safety flags reported by the backend.
    pub async fn classify(&self, transcript: &str) -> Result<(Intent, Vec<String>), GenerationError> {
        let messages = [
            ChatMessage::system(SYSTEM_ROUTER),
            ChatMessage::user(format!(
                "User query: {}\n\nExtract the intent as JSON.",
                transcript
            )),
        ];
        let value = self
            .backend
            .generate_json(&messages, TEMPERATURE, MAX_TOKENS)
            .await?;
        Ok(intent_from_generated(&value))
    }
}

#[async_trait]
impl Stage for IntentClassifier {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn run(
        &self,
        state: &mut RequestState,
        _ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError> {
        let transcript = state.transcript.trim().to_string();
        let mut entry = LogEntry::new(Self::ID);

        if transcript.is_empty() {
            warn!("empty transcript, classifying as out_of_scope");
            let intent = Intent::out_of_scope();
            entry.insert("error", "empty_transcript");
            entry.insert("intent", &intent);
            entry.insert("safety_flags", Vec::<String>::new());
            state.intent = Some(intent);
            state.safety_flags.clear();
            return Ok(entry);
        }

        let scanned = self.policy.scan(&transcript);
        let scanned_flags: Vec<String> = scanned.iter().map(|m| m.phrase.clone()).collect();

        let (intent, flags) = match self.classify(&transcript).await {
            Ok((intent, generated_flags)) => {
                info!(task = %intent.task, "intent extracted via backend");
                let flags: Vec<String> = generated_flags.into_iter().chain(scanned_flags).collect();
                (intent, flags)
            }
            Err(e) => {
                warn!(error = %e, "intent generation failed, using fallback");
                entry.insert("warning", "llm_fallback");
                entry.insert("error", e.to_string());
                (fallback_intent(&transcript), scanned_flags)
            }
        };

        state.set_safety_flags(flags);
        let categories: BTreeSet<_> = scanned.iter().map(|m| m.category).collect();

        entry.insert("intent", &intent);
        entry.insert("safety_flags", &state.safety_flags);
        if !categories.is_empty() {
            entry.insert("safety_categories", &categories);
        }
        state.intent = Some(intent);
        Ok(entry)
    }
}

/// Rule-based intent used when generation is unavailable.
pub fn fallback_intent(transcript: &str) -> Intent {
    let lowered = transcript.to_lowercase();

    let budget = BUDGET
        .captures(transcript)
        .and_then(|c| c.get(1))
        .and_then(|m| m.as_str().parse::<f64>().ok());

    let material = lowered
        .contains("stainless")
        .then(|| "stainless steel".to_string());

    let category = lowered
        .contains("clean")
        .then(|| "cleaning supplies".to_string());

    let needs_live = LIVE_DATA_KEYWORDS.iter().any(|k| lowered.contains(k));

    Intent {
        task: Task::ProductRecommendation,
        constraints: Constraints {
            budget,
            material,
            brand: None,
            category,
            ..Constraints::default()
        },
        needs_live,
    }
}

/// Read a generated intent object field by field. Missing or ill-typed
/// fields fall back to their defaults instead of failing the whole object.
pub fn intent_from_generated(value: &Value) -> (Intent, Vec<String>) {
    let task = value
        .get("task")
        .and_then(Value::as_str)
        .map(Task::parse)
        .unwrap_or_default();

    let constraints = value
        .get("constraints")
        .and_then(Value::as_object)
        .map(|map| {
            let mut constraints = Constraints::default();
            for (key, v) in map {
                match key.as_str() {
                    "budget" => constraints.budget = parse_price(v),
                    "material" => constraints.material = non_empty_str(v),
                    "brand" => constraints.brand = non_empty_str(v),
                    "category" => constraints.category = non_empty_str(v),
                    _ if !v.is_null() => {
                        constraints.extra.insert(key.clone(), v.clone());
                    }
                    _ => {}
                }
            }
            constraints
        })
        .unwrap_or_default();

    let needs_live = match value.get("needs_live") {
        Some(Value::Bool(b)) => *b,
        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
        _ => false,
    };

    let safety_flags = match value.get("safety_flags") {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(non_empty_str)
            .collect(),
        Some(v @ Value::String(_)) => non_empty_str(v).into_iter().collect(),
        _ => Vec::new(),
    };

    (
        Intent {
            task,
            constraints,
            needs_live,
        },
        safety_flags,
    )
}

fn non_empty_str(value: &Value) -> Option<String> {
    value
        .as_str()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopvoice_core::testing::ScriptedBackend;

    fn classifier(backend: ScriptedBackend) -> IntentClassifier {
        IntentClassifier::new(Arc::new(backend))
    }

    #[test]
    fn test_fallback_budget_and_keywords() {
        let intent = fallback_intent("Stainless cleaner under $12.50 in stock now");
        assert_eq!(intent.task, Task::ProductRecommendation);
        assert_eq!(intent.constraints.budget, Some(12.5));
        assert_eq!(intent.constraints.material.as_deref(), Some("stainless steel"));
        assert_eq!(intent.constraints.category.as_deref(), Some("cleaning supplies"));
        assert!(intent.needs_live);
    }

    #[test]
    fn test_fallback_without_signals() {
        let intent = fallback_intent("a nice kettle");
        assert_eq!(intent.constraints.budget, None);
        assert_eq!(intent.constraints.material, None);
        assert!(!intent.needs_live);
    }

    #[test]
    fn test_generated_defaults_and_lenient_fields() {
        let (intent, flags) = intent_from_generated(&json!({
            "constraints": { "budget": "15", "brand": "", "color": "blue", "size": null },
            "needs_live": "true",
            "safety_flags": "ingestion"
        }));
        assert_eq!(intent.task, Task::ProductRecommendation);
        assert_eq!(intent.constraints.budget, Some(15.0));
        assert_eq!(intent.constraints.brand, None);
        assert_eq!(intent.constraints.extra.get("color"), Some(&json!("blue")));
        assert!(!intent.constraints.extra.contains_key("size"));
        assert!(intent.needs_live);
        assert_eq!(flags, vec!["ingestion"]);

        let (intent, flags) = intent_from_generated(&json!({ "task": 7 }));
        assert_eq!(intent, Intent::default());
        assert!(flags.is_empty());
    }

    #[tokio::test]
    async fn test_empty_transcript_is_out_of_scope() {
        let backend = Arc::new(ScriptedBackend::unavailable());
        let stage = IntentClassifier::new(backend.clone());
        let mut state = RequestState::new("   ");

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert_eq!(state.intent, Some(Intent::out_of_scope()));
        assert!(state.safety_flags.is_empty());
        assert_eq!(entry.get("error"), Some(&json!("empty_transcript")));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_primary_path_merges_scanned_flags() {
        let stage = classifier(ScriptedBackend::replying([
            r#"{"task": "product_recommendation", "constraints": {}, "needs_live": false, "safety_flags": ["misuse"]}"#,
        ]));
        let mut state = RequestState::new("which spray is best for huffing");

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert_eq!(state.safety_flags, vec!["misuse", "huffing"]);
        assert!(entry.get("warning").is_none());
        assert_eq!(entry.get("safety_categories"), Some(&json!(["misuse"])));
    }

    #[tokio::test]
    async fn test_fallback_records_warning() {
        let stage = classifier(ScriptedBackend::replying(["not json at all"]));
        let mut state = RequestState::new("current price of X now");

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert!(state.intent.as_ref().unwrap().needs_live);
        assert_eq!(entry.get("warning"), Some(&json!("llm_fallback")));
        assert!(entry
            .get("error")
            .and_then(Value::as_str)
            .unwrap()
            .starts_with("MALFORMED/"));
    }
}
