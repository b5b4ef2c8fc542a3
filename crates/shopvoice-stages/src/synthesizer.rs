//! ResponseSynthesizer: evidence → draft answer + citations

use async_trait::async_trait;
use std::fmt::Write;
use std::sync::Arc;
use tracing::{info, warn};

use shopvoice_core::{
    CatalogItem, ChatMessage, Citation, Evidence, ExecutionContext, GenerationError,
    GenerativeBackend, LogEntry, RequestState, Stage, StageError, WebItem,
};
use shopvoice_policy::NOT_FOUND_MESSAGE;

use crate::reconcile::{reconcile, ReconciledEntry};

const SYSTEM_ANSWERER: &str = include_str!("../prompts/system_answerer.md");
const TEMPERATURE: f32 = 0.4;
const MAX_TOKENS: u32 = 300;

pub const MAX_EVIDENCE_ITEMS: usize = 5;
pub const MAX_FALLBACK_ITEMS: usize = 3;
pub const TITLE_LIMIT: usize = 150;
pub const SNIPPET_LIMIT: usize = 300;
pub const INGREDIENTS_LIMIT: usize = 200;
pub const FALLBACK_TITLE_LIMIT: usize = 80;

pub struct ResponseSynthesizer {
    backend: Arc<dyn GenerativeBackend>,
}

impl ResponseSynthesizer {
    pub const ID: &'static str = "response_generator";

    pub fn new(backend: Arc<dyn GenerativeBackend>) -> Self {
        Self { backend }
    }

    /// Primary path: free-text generation over the evidence digest.
    pub async fn generate_answer(&self, transcript: &str, digest: &str) -> Result<String, GenerationError> {
        let prompt = format!(
            "User query: {}\n\n{}\n\nSynthesize a concise voice response (≤15 seconds / ~50 words) with proper citations.",
            transcript, digest
        );
        let messages = [ChatMessage::system(SYSTEM_ANSWERER), ChatMessage::user(prompt)];
        let text = self
            .backend
            .generate(&messages, TEMPERATURE, MAX_TOKENS)
            .await?;
        let text = text.trim();
        if text.is_empty() {
            return Err(GenerationError::Empty);
        }
        Ok(text.to_string())
    }
}

#[async_trait]
impl Stage for ResponseSynthesizer {
    fn id(&self) -> &'static str {
        Self::ID
    }

    async fn run(
        &self,
        state: &mut RequestState,
        _ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError> {
        let mut entry = LogEntry::new(Self::ID);
        let catalog = state.evidence.catalog_items();
        let web = state.evidence.web_items();

        if state.evidence.is_empty() {
            info!("no evidence retrieved, answering with not-found message");
            state.answer = Some(NOT_FOUND_MESSAGE.to_string());
            state.citations.clear();
            entry.insert("status", "no_results");
            return Ok(entry);
        }

        let reconciled = if !catalog.is_empty() && !web.is_empty() {
            let entries = reconcile(catalog, web);
            let matched = entries.iter().filter(|e| e.is_matched()).count();
            let conflicts: Vec<&ReconciledEntry> =
                entries.iter().filter(|e| e.conflict.is_some()).collect();
            entry.insert("matched_pairs", matched);
            entry.insert("price_conflicts", &conflicts);
            Some(entries)
        } else {
            None
        };

        let digest = evidence_digest(&state.evidence, reconciled.as_deref());
        let (answer, citations) = match self.generate_answer(&state.transcript, &digest).await {
            Ok(answer) => {
                let citations = compile_citations(&state.evidence);
                info!(citations = citations.len(), "response generated");
                (answer, citations)
            }
            Err(e) => {
                warn!(error = %e, "response generation failed, using template");
                entry.insert("warning", "llm_fallback");
                entry.insert("error", e.to_string());
                fallback_answer(&state.evidence)
            }
        };

        entry.insert("catalog_count", catalog.len());
        entry.insert("web_count", web.len());
        entry.insert("citations_count", citations.len());
        state.answer = Some(answer);
        state.citations = citations;
        Ok(entry)
    }
}

/// Prompt-ready summary of the evidence.
pub fn evidence_digest(evidence: &Evidence, reconciled: Option<&[ReconciledEntry]>) -> String {
    let mut out = String::from("## Evidence Retrieved:\n\n");

    let catalog = evidence.catalog_items();
    if !catalog.is_empty() {
        out.push_str("### Private Catalog - Top 5:\n");
        for (idx, item) in catalog.iter().take(MAX_EVIDENCE_ITEMS).enumerate() {
            let _ = writeln!(out, "{}. **{}**", idx + 1, title_or_unknown(&item.title));
            let _ = writeln!(out, "   - Doc ID: {}", item.id().unwrap_or("N/A"));
            let _ = writeln!(out, "   - Category: {}", item.category.as_deref().unwrap_or("N/A"));
            let _ = writeln!(out, "   - Brand: {}", item.brand.as_deref().unwrap_or("N/A"));
            let _ = writeln!(out, "   - Price: {}", price_or(item.price, "N/A"));
            let _ = writeln!(
                out,
                "   - Rating: {}",
                item.rating.map(|r| r.to_string()).unwrap_or_else(|| "N/A".to_string())
            );
            let ingredients = item.ingredients.as_deref().unwrap_or("N/A");
            let _ = writeln!(out, "   - Ingredients: {}\n", truncate(ingredients, INGREDIENTS_LIMIT));
        }
    }

    let web = evidence.web_items();
    if !web.is_empty() {
        out.push_str("### Web Search Results - Top 5:\n");
        for (idx, item) in web.iter().take(MAX_EVIDENCE_ITEMS).enumerate() {
            let _ = writeln!(out, "{}. **{}**", idx + 1, title_or_unknown(&item.title));
            let _ = writeln!(out, "   - URL: {}", item.url);
            let snippet = item.snippet.as_deref().unwrap_or("N/A");
            let _ = writeln!(out, "   - Snippet: {}", truncate(snippet, SNIPPET_LIMIT));
            let _ = writeln!(out, "   - Price: {}\n", price_or(item.price, "Not available"));
        }
    }

    let conflicts: Vec<&ReconciledEntry> = reconciled
        .unwrap_or_default()
        .iter()
        .filter(|e| e.conflict.is_some())
        .collect();
    if !conflicts.is_empty() {
        out.push_str("### Price Conflicts:\n");
        for e in conflicts {
            if let Some(c) = &e.conflict {
                let _ = writeln!(
                    out,
                    "- {}: catalog ${:.2} vs web ${:.2} ({:.1}% apart)",
                    e.primary.title(),
                    c.catalog_price,
                    c.web_price,
                    c.variance_pct
                );
            }
        }
        out.push('\n');
    }

    out.push_str("**IMPORTANT**: Check if the catalog results are RELEVANT to the user query. ");
    out.push_str("If they are off-topic (wrong product category), use ONLY the web results in your answer.");
    out
}

/// Every retrieved record considered, up to five per source.
pub fn compile_citations(evidence: &Evidence) -> Vec<Citation> {
    let catalog = evidence
        .catalog_items()
        .iter()
        .take(MAX_EVIDENCE_ITEMS)
        .filter_map(catalog_citation);
    let web = evidence
        .web_items()
        .iter()
        .take(MAX_EVIDENCE_ITEMS)
        .map(web_citation);
    catalog.chain(web).collect()
}

/// Template answer used when generation is unavailable. Web results are
/// preferred when present.
pub fn fallback_answer(evidence: &Evidence) -> (String, Vec<Citation>) {
    let mut lines = Vec::new();
    let mut citations = Vec::new();

    let web = evidence.web_items();
    if !web.is_empty() {
        for (idx, item) in web.iter().take(MAX_FALLBACK_ITEMS).enumerate() {
            let title = truncate(title_or(&item.title, "Product"), FALLBACK_TITLE_LIMIT);
            lines.push(format!("{}. {} (see link)", idx + 1, title));
            citations.push(web_citation(item));
        }
    } else {
        for (idx, item) in evidence
            .catalog_items()
            .iter()
            .take(MAX_FALLBACK_ITEMS)
            .enumerate()
        {
            let title = truncate(title_or(&item.title, "Product"), FALLBACK_TITLE_LIMIT);
            lines.push(format!("{}. {} — {}", idx + 1, title, price_or(item.price, "price N/A")));
            citations.extend(catalog_citation(item));
        }
    }

    let answer = format!(
        "Here are options that fit your request. {} See details on your screen.",
        lines.join(" ")
    );
    (answer, citations)
}

fn catalog_citation(item: &CatalogItem) -> Option<Citation> {
    item.id()
        .map(|id| Citation::private(id, truncate(&item.title, TITLE_LIMIT)))
}

fn web_citation(item: &WebItem) -> Citation {
    Citation::web(item.url.clone(), truncate(&item.title, TITLE_LIMIT))
}

fn price_or(price: Option<f64>, missing: &str) -> String {
    price
        .map(|p| format!("${:.2}", p))
        .unwrap_or_else(|| missing.to_string())
}

fn title_or<'a>(title: &'a str, missing: &'a str) -> &'a str {
    if title.trim().is_empty() {
        missing
    } else {
        title
    }
}

fn title_or_unknown(title: &str) -> &str {
    title_or(title, "Unknown")
}

/// First `limit` characters.
fn truncate(text: &str, limit: usize) -> String {
    text.chars().take(limit).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use shopvoice_core::testing::ScriptedBackend;
    use shopvoice_core::CitationSource;

    fn soap(id: &str, price: Option<f64>) -> CatalogItem {
        CatalogItem {
            doc_id: Some(id.to_string()),
            title: format!("Lemon Dish Soap {id}"),
            price,
            ingredients: Some("x".repeat(400)),
            ..CatalogItem::default()
        }
    }

    fn listing(url: &str, title: &str, price: Option<f64>) -> WebItem {
        WebItem {
            url: url.to_string(),
            title: title.to_string(),
            price,
            ..WebItem::default()
        }
    }

    #[test]
    fn test_digest_truncates_and_caps() {
        let evidence = Evidence {
            catalog: Some((0..7).map(|i| soap(&format!("d{i}"), Some(3.0))).collect()),
            web: None,
        };
        let digest = evidence_digest(&evidence, None);
        assert!(digest.contains("Doc ID: d4"));
        assert!(!digest.contains("Doc ID: d5"));
        assert!(digest.contains(&"x".repeat(200)));
        assert!(!digest.contains(&"x".repeat(201)));
        assert!(digest.contains("off-topic"));
    }

    #[test]
    fn test_citations_cover_both_sources() {
        let evidence = Evidence {
            catalog: Some(vec![soap("d1", Some(3.0)), CatalogItem::default()]),
            web: Some(vec![listing("https://shop.example/a", &"T".repeat(200), None)]),
        };
        let citations = compile_citations(&evidence);
        assert_eq!(citations.len(), 2);
        assert_eq!(citations[0].source, CitationSource::Private);
        assert_eq!(citations[1].source, CitationSource::Web);
        assert_eq!(citations[1].title.chars().count(), TITLE_LIMIT);
    }

    #[test]
    fn test_fallback_prefers_web() {
        let evidence = Evidence {
            catalog: Some(vec![soap("d1", Some(3.0))]),
            web: Some(vec![listing("https://shop.example/a", "Acme Soap", Some(4.0))]),
        };
        let (answer, citations) = fallback_answer(&evidence);
        assert_eq!(
            answer,
            "Here are options that fit your request. 1. Acme Soap (see link) See details on your screen."
        );
        assert_eq!(citations, vec![Citation::web("https://shop.example/a", "Acme Soap")]);
    }

    #[test]
    fn test_fallback_catalog_list() {
        let evidence = Evidence {
            catalog: Some(vec![
                soap("d1", Some(3.5)),
                soap("d2", None),
                soap("d3", Some(1.0)),
                soap("d4", Some(2.0)),
            ]),
            web: None,
        };
        let (answer, citations) = fallback_answer(&evidence);
        assert!(answer.contains("1. Lemon Dish Soap d1 — $3.50"));
        assert!(answer.contains("2. Lemon Dish Soap d2 — price N/A"));
        assert!(!answer.contains("d4"));
        assert_eq!(citations.len(), 3);
    }

    #[tokio::test]
    async fn test_no_results_short_circuits() {
        let backend = Arc::new(ScriptedBackend::replying(["unused"]));
        let stage = ResponseSynthesizer::new(backend.clone());
        let mut state = RequestState::new("unicorn polish");
        state.evidence.catalog = Some(Vec::new());

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert_eq!(state.answer_text(), NOT_FOUND_MESSAGE);
        assert!(state.citations.is_empty());
        assert_eq!(entry.get("status"), Some(&json!("no_results")));
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn test_generated_answer_logs_conflicts() {
        let backend = Arc::new(ScriptedBackend::replying(["  Try doc #d1, about $10.00.  "]));
        let stage = ResponseSynthesizer::new(backend);
        let mut state = RequestState::new("acme lemon dish soap price now");
        state.evidence = Evidence {
            catalog: Some(vec![CatalogItem {
                doc_id: Some("d1".to_string()),
                title: "Acme Lemon Dish Soap".to_string(),
                price: Some(10.0),
                ..CatalogItem::default()
            }]),
            web: Some(vec![listing("https://shop.example/a", "Acme Lemon Dish Soap", Some(12.0))]),
        };

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert_eq!(state.answer_text(), "Try doc #d1, about $10.00.");
        assert_eq!(state.citations.len(), 2);
        assert_eq!(entry.get("matched_pairs"), Some(&json!(1)));
        assert_eq!(entry.get("price_conflicts").unwrap().as_array().unwrap().len(), 1);
        assert_eq!(entry.get("citations_count"), Some(&json!(2)));
    }

    #[tokio::test]
    async fn test_generation_failure_uses_template() {
        let stage = ResponseSynthesizer::new(Arc::new(ScriptedBackend::unavailable()));
        let mut state = RequestState::new("soap");
        state.evidence.catalog = Some(vec![soap("d1", Some(3.5))]);

        let entry = stage.run(&mut state, &ExecutionContext::new()).await.unwrap();

        assert!(state.answer_text().starts_with("Here are options"));
        assert_eq!(entry.get("warning"), Some(&json!("llm_fallback")));
        assert_eq!(entry.get("catalog_count"), Some(&json!(1)));
    }
}
