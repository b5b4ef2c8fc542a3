//! Individual answer checks
//!
//! Each function is pure: it inspects an answer, its citations and the
//! evidence, and reports what it found or the repaired value. The validator
//! decides what to write back.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};

use shopvoice_core::{Citation, CitationSource, Evidence};

use crate::profile::ValidationProfile;

static PRICE_TOKEN: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\$(\d+(?:\.\d+)?)").expect("price pattern is valid"));

/// Single check result
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Check {
    pub name: String,
    pub status: CheckStatus,
    pub message: String,
}

impl Check {
    pub fn new(name: &str, status: CheckStatus, message: impl Into<String>) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckStatus {
    Pass,
    Warn,
    Fail,
    Fixed,
}

/// Whether the answer tells the user nothing was found.
pub fn acknowledges_empty(answer: &str, profile: &ValidationProfile) -> bool {
    let lowered = answer.to_lowercase();
    profile
        .acknowledgment_phrases
        .iter()
        .any(|p| lowered.contains(p.as_str()))
}

/// Outcome of citation validation and repair.
#[derive(Debug, Clone, PartialEq)]
pub struct CitationRepair {
    pub citations: Vec<Citation>,
    pub status: CheckStatus,
    pub issues: Vec<String>,
    pub removed: usize,
}

/// Drop citations that reference nothing retrieved, then make sure each
/// source with evidence is cited at least once.
pub fn repair_citations(
    citations: &[Citation],
    evidence: &Evidence,
    profile: &ValidationProfile,
) -> CitationRepair {
    let mut kept: Vec<Citation> = citations
        .iter()
        .filter(|c| c.is_backed_by(evidence))
        .cloned()
        .collect();
    let removed = citations.len() - kept.len();
    let mut issues = Vec::new();
    if removed > 0 {
        issues.push("unreferenced_citations_removed".to_string());
    }

    let has_private = kept.iter().any(|c| c.source == CitationSource::Private);
    let has_web = kept.iter().any(|c| c.source == CitationSource::Web);

    let catalog = evidence.catalog_items();
    let mut status = CheckStatus::Pass;
    if !catalog.is_empty() && !has_private {
        issues.push("missing_private_citations".to_string());
        let mut added = 0;
        for item in catalog.iter().take(profile.max_private_repairs) {
            let Some(id) = item.id() else { continue };
            if kept.iter().all(|c| c.doc_id.as_deref() != Some(id)) {
                kept.push(Citation::private(id, item.title.clone()));
                added += 1;
            }
        }
        status = if added > 0 {
            CheckStatus::Fixed
        } else {
            CheckStatus::Warn
        };
    }

    let web = evidence.web_items();
    if !web.is_empty() && !has_web {
        issues.push("missing_web_citations".to_string());
        // Web repairs do not change the status; it tracks private citations.
        for item in web.iter().take(profile.max_web_repairs) {
            if !item.url.is_empty()
                && kept.iter().all(|c| c.url.as_deref() != Some(item.url.as_str()))
            {
                kept.push(Citation::web(item.url.clone(), item.title.clone()));
            }
        }
    }

    if removed > 0 && status == CheckStatus::Pass {
        status = CheckStatus::Fixed;
    }

    CitationRepair {
        citations: kept,
        status,
        issues,
        removed,
    }
}

/// Every `$`-prefixed amount in the answer, as written and as a number.
pub fn mentioned_prices(answer: &str) -> Vec<(String, f64)> {
    PRICE_TOKEN
        .captures_iter(answer)
        .filter_map(|caps| {
            let token = caps.get(0)?.as_str().to_string();
            let value = caps.get(1)?.as_str().parse::<f64>().ok()?;
            Some((token, value))
        })
        .collect()
}

/// Tokens whose amount matches no evidence price within `tolerance`.
pub fn ungrounded_prices(answer: &str, evidence: &Evidence, tolerance: f64) -> Vec<String> {
    let known = evidence.prices();
    mentioned_prices(answer)
        .into_iter()
        .filter(|(_, value)| !known.iter().any(|p| (value - p).abs() < tolerance))
        .map(|(token, _)| token)
        .collect()
}

/// `answer_too_short` / `answer_too_long`, measured in characters.
pub fn coherence_issue(answer: &str, profile: &ValidationProfile) -> Option<&'static str> {
    let len = answer.chars().count();
    if len < profile.min_answer_chars {
        Some("answer_too_short")
    } else if len > profile.max_answer_chars {
        Some("answer_too_long")
    } else {
        None
    }
}

pub fn has_citation_marker(answer: &str, profile: &ValidationProfile) -> bool {
    let lowered = answer.to_lowercase();
    profile
        .citation_markers
        .iter()
        .any(|m| lowered.contains(m.as_str()))
}

/// `"\n\n(Sources: doc #a, shop.example)"`, or `None` when no citation
/// yields a reference.
pub fn citation_suffix(citations: &[Citation], max: usize) -> Option<String> {
    let parts: Vec<String> = citations
        .iter()
        .take(max)
        .filter_map(|c| match (&c.doc_id, &c.url) {
            (Some(id), _) => Some(format!("doc #{}", id)),
            (None, Some(url)) => Some(domain_of(url).to_string()),
            _ => None,
        })
        .collect();
    if parts.is_empty() {
        return None;
    }
    Some(format!("\n\n(Sources: {})", parts.join(", ")))
}

/// Third `/`-separated segment of a URL, which is the host for
/// `scheme://host/...`. Falls back to the whole string.
pub fn domain_of(url: &str) -> &str {
    url.split('/').nth(2).unwrap_or(url)
}

#[cfg(test)]
mod tests {
    use super::*;
    use shopvoice_core::{CatalogItem, WebItem};

    fn evidence() -> Evidence {
        Evidence {
            catalog: Some(vec![
                CatalogItem {
                    doc_id: Some("d1".to_string()),
                    title: "Lemon Soap".to_string(),
                    price: Some(3.49),
                    ..CatalogItem::default()
                },
                CatalogItem {
                    sku: Some("S2".to_string()),
                    title: "Lime Soap".to_string(),
                    price: Some(4.0),
                    ..CatalogItem::default()
                },
                CatalogItem::default(),
            ]),
            web: Some(vec![WebItem {
                url: "https://www.shop.example/p/1".to_string(),
                title: "Lemon Soap 2-pack".to_string(),
                price: Some(6.99),
                ..WebItem::default()
            }]),
        }
    }

    #[test]
    fn test_repair_adds_missing_sources() {
        let profile = ValidationProfile::default();
        let repair = repair_citations(&[], &evidence(), &profile);

        assert_eq!(repair.status, CheckStatus::Fixed);
        assert_eq!(repair.issues, vec!["missing_private_citations", "missing_web_citations"]);
        let ids: Vec<_> = repair.citations.iter().map(|c| c.doc_id.clone()).collect();
        assert_eq!(
            ids,
            vec![Some("d1".to_string()), Some("S2".to_string()), None]
        );
        assert_eq!(repair.citations[2].source, CitationSource::Web);
    }

    #[test]
    fn test_repairs_are_capped_per_source() {
        let profile = ValidationProfile::default();
        let evidence = Evidence {
            catalog: Some(
                (1..=5)
                    .map(|i| CatalogItem {
                        doc_id: Some(format!("d{i}")),
                        title: format!("Soap {i}"),
                        ..CatalogItem::default()
                    })
                    .collect(),
            ),
            web: Some(
                (1..=4)
                    .map(|i| WebItem {
                        url: format!("https://shop.example/p/{i}"),
                        title: format!("Soap {i}"),
                        ..WebItem::default()
                    })
                    .collect(),
            ),
        };
        let repair = repair_citations(&[], &evidence, &profile);

        let private = repair
            .citations
            .iter()
            .filter(|c| c.source == CitationSource::Private)
            .count();
        let web = repair
            .citations
            .iter()
            .filter(|c| c.source == CitationSource::Web)
            .count();
        assert_eq!(private, 3);
        assert_eq!(web, 2);
    }

    #[test]
    fn test_web_repair_alone_keeps_status() {
        let profile = ValidationProfile::default();
        let cited = vec![Citation::private("d1", "Lemon Soap")];
        let repair = repair_citations(&cited, &evidence(), &profile);

        assert_eq!(repair.status, CheckStatus::Pass);
        assert_eq!(repair.issues, vec!["missing_web_citations"]);
        assert_eq!(repair.citations.len(), 2);
        assert_eq!(repair.citations[1].source, CitationSource::Web);
    }

    #[test]
    fn test_repair_removes_unreferenced() {
        let profile = ValidationProfile::default();
        let cited = vec![
            Citation::private("d1", "Lemon Soap"),
            Citation::private("ghost", "Invented"),
            Citation::web("https://www.shop.example/p/1", ""),
        ];
        let repair = repair_citations(&cited, &evidence(), &profile);

        assert_eq!(repair.removed, 1);
        assert_eq!(repair.citations.len(), 2);
        assert_eq!(repair.status, CheckStatus::Fixed);
        assert_eq!(repair.issues, vec!["unreferenced_citations_removed"]);
    }

    #[test]
    fn test_repair_warns_when_nothing_citable() {
        let profile = ValidationProfile::default();
        let evidence = Evidence {
            catalog: Some(vec![CatalogItem::default()]),
            web: None,
        };
        let repair = repair_citations(&[], &evidence, &profile);
        assert_eq!(repair.status, CheckStatus::Warn);
        assert!(repair.citations.is_empty());
    }

    #[test]
    fn test_price_grounding_tolerance() {
        let answer = "Lemon Soap is $3.49, the 2-pack $6.995 and a bundle $12.";
        assert_eq!(ungrounded_prices(answer, &evidence(), 0.01), vec!["$12"]);
        assert_eq!(mentioned_prices(answer).len(), 3);
    }

    #[test]
    fn test_coherence_bounds() {
        let profile = ValidationProfile::default();
        assert_eq!(coherence_issue("too short", &profile), Some("answer_too_short"));
        assert_eq!(coherence_issue(&"a".repeat(501), &profile), Some("answer_too_long"));
        assert_eq!(coherence_issue(&"a".repeat(500), &profile), None);
    }

    #[test]
    fn test_suffix_uses_domains() {
        let citations = vec![
            Citation::private("d1", ""),
            Citation::web("https://www.shop.example/p/1", ""),
        ];
        assert_eq!(
            citation_suffix(&citations, 5).as_deref(),
            Some("\n\n(Sources: doc #d1, www.shop.example)")
        );
        assert_eq!(domain_of("shop.example"), "shop.example");
        assert!(citation_suffix(&[], 5).is_none());
    }

    #[test]
    fn test_markers_and_acknowledgment() {
        let profile = ValidationProfile::default();
        assert!(has_citation_marker("Try Doc #d1 today", &profile));
        assert!(!has_citation_marker("Try the lemon soap", &profile));
        assert!(acknowledges_empty("Sorry, NO RESULTS for that.", &profile));
    }
}
