//! QualityValidator: final gate over the synthesized answer
//!
//! Checks run in a fixed order: safety, evidence, citations, price
//! grounding, coherence, citation format. Safety short-circuits the rest.
//! Running the validator twice over the same evidence leaves the answer and
//! citations unchanged the second time.

use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use shopvoice_core::{ExecutionContext, LogEntry, RequestState, Stage, StageError};
use shopvoice_policy::{refusal_message, NOT_FOUND_MESSAGE};

use crate::checks::{
    acknowledges_empty, citation_suffix, coherence_issue, has_citation_marker, repair_citations,
    ungrounded_prices, Check, CheckStatus,
};
use crate::profile::ValidationProfile;

/// Overall validation verdict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationReport {
    /// `pass`, `warn` or `fail`. Repairs count as passing.
    pub status: CheckStatus,
    pub checks: Vec<Check>,
    pub issues: Vec<String>,
}

impl ValidationReport {
    fn from_checks(checks: Vec<Check>, issues: Vec<String>) -> Self {
        let status = if checks.iter().any(|c| c.status == CheckStatus::Fail) {
            CheckStatus::Fail
        } else if checks.iter().any(|c| c.status == CheckStatus::Warn) {
            CheckStatus::Warn
        } else {
            CheckStatus::Pass
        };
        Self {
            status,
            checks,
            issues,
        }
    }

    pub fn check(&self, name: &str) -> Option<&Check> {
        self.checks.iter().find(|c| c.name == name)
    }
}

pub struct QualityValidator {
    profile: ValidationProfile,
}

impl QualityValidator {
    pub const ID: &'static str = "quality_evaluator";

    pub fn new(profile: ValidationProfile) -> Self {
        Self { profile }
    }

    pub fn profile(&self) -> &ValidationProfile {
        &self.profile
    }

    /// Validate and repair `state.answer` / `state.citations` in place.
    pub fn validate(&self, state: &mut RequestState) -> ValidationReport {
        let mut checks = Vec::new();
        let mut issues = Vec::new();

        // === Safety ===
        if !state.safety_flags.is_empty() {
            state.answer = Some(refusal_message(&state.safety_flags));
            state.citations.clear();
            checks.push(Check::new(
                "safety",
                CheckStatus::Fail,
                format!("Flagged: {}", state.safety_flags.join(", ")),
            ));
            return ValidationReport::from_checks(checks, issues);
        }
        checks.push(Check::new("safety", CheckStatus::Pass, "No safety flags"));

        // === Evidence ===
        if state.evidence.is_empty() {
            if acknowledges_empty(state.answer_text(), &self.profile) {
                checks.push(Check::new(
                    "evidence",
                    CheckStatus::Pass,
                    "No evidence, answer acknowledges it",
                ));
            } else {
                state.answer = Some(NOT_FOUND_MESSAGE.to_string());
                issues.push("empty_evidence_not_acknowledged".to_string());
                checks.push(Check::new(
                    "evidence",
                    CheckStatus::Warn,
                    "No evidence, answer replaced with not-found message",
                ));
            }
        } else {
            let counts = state.evidence.counts();
            let summary: Vec<String> = counts.iter().map(|(s, n)| format!("{s}={n}")).collect();
            checks.push(Check::new("evidence", CheckStatus::Pass, summary.join(", ")));
        }

        // === Citations ===
        let repair = repair_citations(&state.citations, &state.evidence, &self.profile);
        checks.push(Check::new(
            "citations",
            repair.status,
            format!("{} citations, {} removed", repair.citations.len(), repair.removed),
        ));
        issues.extend(repair.issues);
        state.citations = repair.citations;

        // === Price grounding ===
        let ungrounded = ungrounded_prices(
            state.answer_text(),
            &state.evidence,
            self.profile.price_tolerance,
        );
        if ungrounded.is_empty() {
            checks.push(Check::new("grounding", CheckStatus::Pass, "All prices grounded"));
        } else {
            let listed = ungrounded.join(", ");
            issues.push(format!("potentially_ungrounded_prices: {}", listed));
            checks.push(Check::new(
                "grounding",
                CheckStatus::Warn,
                format!("Prices not found in evidence: {}", listed),
            ));
        }

        // === Coherence ===
        match coherence_issue(state.answer_text(), &self.profile) {
            Some(issue) => {
                issues.push(issue.to_string());
                checks.push(Check::new(
                    "coherence",
                    CheckStatus::Warn,
                    format!(
                        "Answer length {} outside [{}, {}]",
                        state.answer_text().chars().count(),
                        self.profile.min_answer_chars,
                        self.profile.max_answer_chars
                    ),
                ));
            }
            None => checks.push(Check::new("coherence", CheckStatus::Pass, "Length ok")),
        }

        // === Citation format ===
        let suffix = if has_citation_marker(state.answer_text(), &self.profile) {
            None
        } else {
            citation_suffix(&state.citations, self.profile.max_suffix_citations)
        };
        match suffix {
            Some(suffix) => {
                let answer = format!("{}{}", state.answer_text(), suffix);
                state.answer = Some(answer);
                checks.push(Check::new("citation_format", CheckStatus::Fixed, "Sources appended"));
            }
            None => checks.push(Check::new("citation_format", CheckStatus::Pass, "Sources present")),
        }

        ValidationReport::from_checks(checks, issues)
    }
}

impl Default for QualityValidator {
    fn default() -> Self {
        Self::new(ValidationProfile::default())
    }
}

#[async_trait]
impl Stage for QualityValidator {
    fn id(&self) -> &'static str {
        Self::ID
    }

    fn deterministic(&self) -> bool {
        true
    }

    async fn run(
        &self,
        state: &mut RequestState,
        _ctx: &ExecutionContext,
    ) -> Result<LogEntry, StageError> {
        let report = self.validate(state);

        match report.status {
            CheckStatus::Fail => warn!(issues = ?report.issues, "answer failed validation"),
            _ => info!(status = ?report.status, issues = report.issues.len(), "answer validated"),
        }

        let mut entry = LogEntry::new(Self::ID)
            .with("timestamp", Utc::now().to_rfc3339())
            .with("profile", &self.profile.name)
            .with("status", report.status)
            .with("checks", &report.checks)
            .with("issues", &report.issues);
        if report.check("safety").map(|c| c.status) == Some(CheckStatus::Fail) {
            entry.insert("safety_flags", &state.safety_flags);
        }
        Ok(entry)
    }
}
