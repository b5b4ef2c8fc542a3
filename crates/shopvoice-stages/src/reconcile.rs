//! EvidenceReconciler: align catalog and web records describing the same
//! product and surface price disagreement between them.

use serde::Serialize;

use shopvoice_core::{CatalogItem, EvidenceItem, WebItem};

use crate::similarity::token_set_ratio;

/// Title similarity a pair must exceed to count as the same product.
pub const MATCH_THRESHOLD: f64 = 80.0;
/// Relative price difference, in percent, above which a pair conflicts.
pub const PRICE_VARIANCE_PCT: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceType {
    Catalog,
    WebOnly,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PriceConflict {
    pub catalog_price: f64,
    pub web_price: f64,
    pub variance_pct: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconciledEntry {
    pub primary: EvidenceItem,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matched: Option<WebItem>,
    pub score: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub conflict: Option<PriceConflict>,
    pub source_type: SourceType,
}

impl ReconciledEntry {
    pub fn is_matched(&self) -> bool {
        self.matched.is_some()
    }
}

/// One entry per catalog item, in catalog order, followed by one `web_only`
/// entry per web item no catalog item matched.
pub fn reconcile(catalog: &[CatalogItem], web: &[WebItem]) -> Vec<ReconciledEntry> {
    let mut consumed = vec![false; web.len()];
    let mut entries = Vec::with_capacity(catalog.len() + web.len());

    for item in catalog {
        let best = web
            .iter()
            .enumerate()
            .map(|(idx, candidate)| (idx, token_set_ratio(&item.title, &candidate.title)))
            .fold(None, |best: Option<(usize, f64)>, (idx, score)| match best {
                Some((_, top)) if top >= score => best,
                _ => Some((idx, score)),
            });

        let mut entry = ReconciledEntry {
            primary: EvidenceItem::Catalog(item.clone()),
            matched: None,
            score: best.map(|(_, score)| score).unwrap_or(0.0),
            conflict: None,
            source_type: SourceType::Catalog,
        };

        if let Some((idx, score)) = best {
            if score > MATCH_THRESHOLD {
                consumed[idx] = true;
                let candidate = &web[idx];
                entry.conflict = price_conflict(item.price, candidate.price);
                entry.matched = Some(candidate.clone());
            }
        }
        entries.push(entry);
    }

    for (item, _) in web.iter().zip(&consumed).filter(|(_, used)| !**used) {
        entries.push(ReconciledEntry {
            primary: EvidenceItem::Web(item.clone()),
            matched: None,
            score: 0.0,
            conflict: None,
            source_type: SourceType::WebOnly,
        });
    }

    entries
}

/// Conflict between two prices, if both are known and the catalog price is
/// non-zero.
pub fn price_conflict(catalog_price: Option<f64>, web_price: Option<f64>) -> Option<PriceConflict> {
    let (catalog_price, web_price) = (catalog_price?, web_price?);
    if catalog_price <= 0.0 {
        return None;
    }
    let variance_pct = (catalog_price - web_price).abs() / catalog_price * 100.0;
    (variance_pct > PRICE_VARIANCE_PCT).then_some(PriceConflict {
        catalog_price,
        web_price,
        variance_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn catalog(title: &str, price: f64) -> CatalogItem {
        CatalogItem {
            doc_id: Some(format!("doc-{}", title.len())),
            title: title.to_string(),
            price: Some(price),
            ..CatalogItem::default()
        }
    }

    fn web(title: &str, price: Option<f64>) -> WebItem {
        WebItem {
            url: format!("https://shop.example/{}", title.len()),
            title: title.to_string(),
            price,
            ..WebItem::default()
        }
    }

    #[test]
    fn test_matched_pair_with_conflict() {
        let entries = reconcile(
            &[catalog("Acme Lemon Dish Soap", 10.0)],
            &[web("Acme Lemon Dish Soap 16oz", Some(12.0))],
        );
        assert_eq!(entries.len(), 1);
        let entry = &entries[0];
        assert!(entry.is_matched());
        assert_eq!(entry.score, 100.0);
        let conflict = entry.conflict.as_ref().unwrap();
        assert!((conflict.variance_pct - 20.0).abs() < 1e-9);
    }

    #[test]
    fn test_small_variance_is_not_a_conflict() {
        let entries = reconcile(
            &[catalog("Acme Lemon Dish Soap", 10.0)],
            &[web("acme lemon dish soap", Some(10.05))],
        );
        assert!(entries[0].is_matched());
        assert_eq!(entries[0].conflict, None);
    }

    #[test]
    fn test_unmatched_web_items_become_web_only() {
        let entries = reconcile(
            &[catalog("Acme Lemon Dish Soap", 10.0)],
            &[web("Zenith Floor Mop", Some(25.0)), web("Acme Lemon Dish Soap", None)],
        );
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].source_type, SourceType::Catalog);
        assert_eq!(entries[0].conflict, None);
        assert_eq!(entries[1].source_type, SourceType::WebOnly);
        assert_eq!(entries[1].primary.title(), "Zenith Floor Mop");
    }

    #[test]
    fn test_no_web_evidence() {
        let entries = reconcile(&[catalog("Kettle", 30.0)], &[]);
        assert_eq!(entries.len(), 1);
        assert!(!entries[0].is_matched());
        assert_eq!(entries[0].score, 0.0);
    }

    #[test]
    fn test_match_just_above_threshold() {
        let shared = "alpha bravo charlie delta echo foxtrot golf hotel india juliet zulu";
        let entries = reconcile(
            &[catalog(&format!("{shared} xxxxxxxxxxxxxxx yyyyyyyyyyyyyyyy"), 10.0)],
            &[web(&format!("{shared} {}", "q".repeat(200)), Some(12.0))],
        );
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_matched());
        assert!(entries[0].score > MATCH_THRESHOLD && entries[0].score < 80.5);
        assert!(entries[0].conflict.is_some());
    }

    #[test]
    fn test_price_conflict_edges() {
        assert!(price_conflict(Some(10.0), Some(12.0)).is_some());
        assert!(price_conflict(Some(10.0), Some(10.5)).is_none());
        assert!(price_conflict(Some(0.0), Some(5.0)).is_none());
        assert!(price_conflict(None, Some(5.0)).is_none());
    }
}
