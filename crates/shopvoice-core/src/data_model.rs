//! Data Model: RequestState, Intent, Plan, evidence and citations
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// Maximum number of image URLs retained per catalog record.
pub const MAX_IMAGE_URLS: usize = 5;

// ============================================================================
// INTENT
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Task {
    #[default]
    ProductRecommendation,
    ProductComparison,
    PriceCheck,
    ProductInfo,
    OutOfScope,
    #[serde(other)]
    Other,
}

impl Task {
    /// Parse a task label produced by a generative backend.
    pub fn parse(label: &str) -> Self {
        match label.trim().to_lowercase().as_str() {
            "product_recommendation" => Task::ProductRecommendation,
            "product_comparison" => Task::ProductComparison,
            "price_check" => Task::PriceCheck,
            "product_info" => Task::ProductInfo,
            "out_of_scope" => Task::OutOfScope,
            _ => Task::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Task::ProductRecommendation => "product_recommendation",
            Task::ProductComparison => "product_comparison",
            Task::PriceCheck => "price_check",
            Task::ProductInfo => "product_info",
            Task::OutOfScope => "out_of_scope",
            Task::Other => "other",
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Constraints extracted from the transcript. Unrecognized keys are kept in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Constraints {
    #[serde(default)]
    pub budget: Option<f64>,
    #[serde(default)]
    pub material: Option<String>,
    #[serde(default)]
    pub brand: Option<String>,
    #[serde(default)]
    pub category: Option<String>,
    #[serde(flatten)]
    pub extra: BTreeMap<String, Value>,
}

impl Constraints {
    pub fn is_empty(&self) -> bool {
        self.budget.is_none()
            && self.material.is_none()
            && self.brand.is_none()
            && self.category.is_none()
            && self.extra.is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Intent {
    pub task: Task,
    #[serde(default)]
    pub constraints: Constraints,
    #[serde(default)]
    pub needs_live: bool,
}

impl Intent {
    pub fn out_of_scope() -> Self {
        Self {
            task: Task::OutOfScope,
            constraints: Constraints::default(),
            needs_live: false,
        }
    }
}

// ============================================================================
// PLAN
// ============================================================================

/// A retrieval source.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Catalog,
    Web,
}

impl Source {
    /// Accepts the labels generative planners tend to produce.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_lowercase().as_str() {
            "catalog" | "rag" | "rag.search" | "catalog_search" | "private" => Some(Source::Catalog),
            "web" | "web.search" | "web_search" => Some(Source::Web),
            _ => None,
        }
    }

    /// Name of the retrieval tool serving this source.
    pub fn tool_name(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog_search",
            Source::Web => "web_search",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Source::Catalog => "catalog",
            Source::Web => "web",
        }
    }
}

impl fmt::Display for Source {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum Ranking {
    #[default]
    Relevance,
    PriceAsc,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ComparisonStrategy {
    #[default]
    None,
    PriceCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Plan {
    /// Ordered, duplicate-free.
    pub sources: Vec<Source>,
    /// Field → condition, e.g. `{"price": {"lte": 12.0}}`.
    #[serde(default)]
    pub filters: Map<String, Value>,
    pub query_text: String,
    pub fields: Vec<String>,
    pub ranking: Ranking,
    pub top_k: u32,
    pub comparison_strategy: ComparisonStrategy,
}

impl Plan {
    pub fn includes(&self, source: Source) -> bool {
        self.sources.contains(&source)
    }

    /// The query to send to retrieval tools, falling back to the transcript.
    pub fn effective_query<'a>(&'a self, transcript: &'a str) -> &'a str {
        if self.query_text.trim().is_empty() {
            transcript
        } else {
            &self.query_text
        }
    }
}

// ============================================================================
// EVIDENCE
// ============================================================================

/// A structured product record from the private catalog.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CatalogItem {
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub sku: Option<String>,
    #[serde(default, deserialize_with = "string_or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "opt_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "opt_number")]
    pub rating: Option<f64>,
    #[serde(default, deserialize_with = "opt_string")]
    pub brand: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "opt_string")]
    pub ingredients: Option<String>,
    #[serde(default, deserialize_with = "image_list")]
    pub image_urls: Vec<String>,
}

impl CatalogItem {
    /// Document id, or the SKU when the index did not assign one.
    pub fn id(&self) -> Option<&str> {
        self.doc_id.as_deref().or(self.sku.as_deref())
    }
}

/// A normalized live web search result.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WebItem {
    #[serde(default, deserialize_with = "string_or_default")]
    pub url: String,
    #[serde(default, deserialize_with = "string_or_default")]
    pub title: String,
    #[serde(default, deserialize_with = "opt_string")]
    pub snippet: Option<String>,
    #[serde(default, deserialize_with = "opt_price")]
    pub price: Option<f64>,
    #[serde(default, deserialize_with = "opt_string")]
    pub availability: Option<String>,
    #[serde(default, deserialize_with = "opt_string", skip_serializing_if = "Option::is_none")]
    pub profile: Option<String>,
}

/// Either kind of evidence record.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum EvidenceItem {
    Catalog(CatalogItem),
    Web(WebItem),
}

impl EvidenceItem {
    pub fn title(&self) -> &str {
        match self {
            EvidenceItem::Catalog(item) => &item.title,
            EvidenceItem::Web(item) => &item.title,
        }
    }

    pub fn price(&self) -> Option<f64> {
        match self {
            EvidenceItem::Catalog(item) => item.price,
            EvidenceItem::Web(item) => item.price,
        }
    }
}

/// Evidence keyed by source. A key is present only when that source was queried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Evidence {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub catalog: Option<Vec<CatalogItem>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub web: Option<Vec<WebItem>>,
}

impl Evidence {
    pub fn catalog_items(&self) -> &[CatalogItem] {
        self.catalog.as_deref().unwrap_or_default()
    }

    pub fn web_items(&self) -> &[WebItem] {
        self.web.as_deref().unwrap_or_default()
    }

    /// True when no source produced any record.
    pub fn is_empty(&self) -> bool {
        self.catalog_items().is_empty() && self.web_items().is_empty()
    }

    pub fn counts(&self) -> BTreeMap<Source, usize> {
        let mut counts = BTreeMap::new();
        if let Some(items) = &self.catalog {
            counts.insert(Source::Catalog, items.len());
        }
        if let Some(items) = &self.web {
            counts.insert(Source::Web, items.len());
        }
        counts
    }

    /// Every price carried by any record, in source order.
    pub fn prices(&self) -> Vec<f64> {
        self.catalog_items()
            .iter()
            .filter_map(|item| item.price)
            .chain(self.web_items().iter().filter_map(|item| item.price))
            .collect()
    }

    pub fn has_doc_id(&self, id: &str) -> bool {
        self.catalog_items().iter().any(|item| item.id() == Some(id))
    }

    pub fn has_url(&self, url: &str) -> bool {
        self.web_items().iter().any(|item| item.url == url)
    }
}

// ============================================================================
// CITATIONS & LOG
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CitationSource {
    Private,
    Web,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Citation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub doc_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    pub source: CitationSource,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub title: String,
}

impl Citation {
    pub fn private(doc_id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            doc_id: Some(doc_id.into()),
            url: None,
            source: CitationSource::Private,
            title: title.into(),
        }
    }

    pub fn web(url: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            doc_id: None,
            url: Some(url.into()),
            source: CitationSource::Web,
            title: title.into(),
        }
    }

    /// Whether this citation points at a record present in `evidence`.
    pub fn is_backed_by(&self, evidence: &Evidence) -> bool {
        match (self.source, &self.doc_id, &self.url) {
            (CitationSource::Private, Some(id), _) => evidence.has_doc_id(id),
            (CitationSource::Web, _, Some(url)) => evidence.has_url(url),
            _ => false,
        }
    }
}

/// One stage's record in the request log: `{node, ...payload}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub node: String,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl LogEntry {
    pub fn new(node: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            payload: Map::new(),
        }
    }

    /// Builder-style insert. Values that fail to serialize are stored as `null`.
    pub fn with(mut self, key: &str, value: impl Serialize) -> Self {
        self.insert(key, value);
        self
    }

    pub fn insert(&mut self, key: &str, value: impl Serialize) {
        let value = serde_json::to_value(value).unwrap_or(Value::Null);
        self.payload.insert(key.to_string(), value);
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.payload.get(key)
    }
}

// ============================================================================
// REQUEST STATE
// ============================================================================

/// Mutable state of one request, owned by the runner for the request's lifetime.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RequestState {
    pub transcript: String,
    #[serde(default)]
    pub intent: Option<Intent>,
    #[serde(default)]
    pub plan: Option<Plan>,
    #[serde(default)]
    pub evidence: Evidence,
    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub citations: Vec<Citation>,
    #[serde(default)]
    pub safety_flags: Vec<String>,
    #[serde(default)]
    pub log: Vec<LogEntry>,
}

impl RequestState {
    pub fn new(transcript: impl Into<String>) -> Self {
        Self {
            transcript: transcript.into(),
            ..Self::default()
        }
    }

    pub fn answer_text(&self) -> &str {
        self.answer.as_deref().unwrap_or("")
    }

    /// Replace the safety flags, keeping first occurrences only.
    pub fn set_safety_flags<I, S>(&mut self, flags: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.safety_flags.clear();
        for flag in flags {
            let flag = flag.into();
            if !flag.trim().is_empty() && !self.safety_flags.contains(&flag) {
                self.safety_flags.push(flag);
            }
        }
    }
}

// ============================================================================
// LENIENT DECODING
// ============================================================================

/// Parse a price from a number or a string such as `"$1,299.00"`.
/// Negative, non-finite and unparsable values yield `None`.
pub fn parse_price(value: &Value) -> Option<f64> {
    let price = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s
            .trim()
            .trim_start_matches('$')
            .replace(',', "")
            .trim()
            .parse::<f64>()
            .ok(),
        _ => None,
    };
    price.filter(|p| p.is_finite() && *p >= 0.0)
}

fn opt_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) if !s.trim().is_empty() => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn string_or_default<'de, D>(deserializer: D) -> Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(opt_string(deserializer)?.unwrap_or_default())
}

fn opt_price<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(parse_price))
}

fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Number(n)) => n.as_f64(),
        Some(Value::String(s)) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|n| n.is_finite()))
}

/// Image URLs arrive either as a list or as a `|`-joined string.
fn image_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    let urls: Vec<String> = match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        Some(Value::String(joined)) => joined.split('|').map(str::to_string).collect(),
        _ => Vec::new(),
    };
    Ok(urls
        .into_iter()
        .map(|u| u.trim().to_string())
        .filter(|u| !u.is_empty())
        .take(MAX_IMAGE_URLS)
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_catalog_item_lenient_decoding() {
        let item: CatalogItem = serde_json::from_value(json!({
            "doc_id": "p-17",
            "sku": 4411,
            "title": "Citrus Dish Soap",
            "price": "$3.49",
            "rating": "4.5",
            "brand": null,
            "image_urls": "a.jpg|b.jpg||c.jpg"
        }))
        .unwrap();

        assert_eq!(item.id(), Some("p-17"));
        assert_eq!(item.sku.as_deref(), Some("4411"));
        assert_eq!(item.price, Some(3.49));
        assert_eq!(item.rating, Some(4.5));
        assert_eq!(item.brand, None);
        assert_eq!(item.image_urls, vec!["a.jpg", "b.jpg", "c.jpg"]);
    }

    #[test]
    fn test_negative_price_is_dropped() {
        let item: WebItem = serde_json::from_value(json!({
            "url": "https://shop.example/x",
            "title": "X",
            "price": -4.0
        }))
        .unwrap();
        assert_eq!(item.price, None);
        assert_eq!(parse_price(&json!("1,299.00")), Some(1299.0));
        assert_eq!(parse_price(&json!("call for price")), None);
    }

    #[test]
    fn test_id_falls_back_to_sku() {
        let item = CatalogItem {
            sku: Some("SKU-9".to_string()),
            ..CatalogItem::default()
        };
        assert_eq!(item.id(), Some("SKU-9"));
    }

    #[test]
    fn test_evidence_serializes_only_queried_sources() {
        let evidence = Evidence {
            catalog: Some(vec![]),
            web: None,
        };
        let value = serde_json::to_value(&evidence).unwrap();
        assert_eq!(value, json!({ "catalog": [] }));
        assert!(evidence.is_empty());
        assert_eq!(evidence.counts().get(&Source::Catalog), Some(&0));
    }

    #[test]
    fn test_log_entry_flattens_payload() {
        let entry = LogEntry::new("query_planner").with("top_k", 5);
        let value = serde_json::to_value(&entry).unwrap();
        assert_eq!(value, json!({ "node": "query_planner", "top_k": 5 }));
    }

    #[test]
    fn test_citation_backing() {
        let evidence = Evidence {
            catalog: Some(vec![CatalogItem {
                doc_id: Some("d1".to_string()),
                ..CatalogItem::default()
            }]),
            web: Some(vec![WebItem {
                url: "https://a.example/p".to_string(),
                ..WebItem::default()
            }]),
        };
        assert!(Citation::private("d1", "").is_backed_by(&evidence));
        assert!(Citation::web("https://a.example/p", "").is_backed_by(&evidence));
        assert!(!Citation::private("d2", "").is_backed_by(&evidence));
    }

    #[test]
    fn test_safety_flags_are_deduplicated() {
        let mut state = RequestState::new("x");
        state.set_safety_flags(["drink", "ingest", "drink", " "]);
        assert_eq!(state.safety_flags, vec!["drink", "ingest"]);
    }

    #[test]
    fn test_source_and_task_parsing() {
        assert_eq!(Source::parse("rag.search"), Some(Source::Catalog));
        assert_eq!(Source::parse("WEB"), Some(Source::Web));
        assert_eq!(Source::parse("maps"), None);
        assert_eq!(Task::parse("Out_Of_Scope"), Task::OutOfScope);
        assert_eq!(Task::parse("haggle"), Task::Other);
    }
}
