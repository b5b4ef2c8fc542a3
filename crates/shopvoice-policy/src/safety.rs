//! Unsafe-use phrase catalogue
//!
//! Matching is plain substring membership over the lower-cased transcript,
//! and every matching phrase is reported.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Category of an unsafe-use phrase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SafetyCategory {
    MedicalClaim,
    Ingestion,
    Misuse,
    ImproperApplication,
    AgeInappropriate,
    WeightLoss,
    DiseaseClaim,
    MedicationSubstitution,
    PerformanceClaim,
}

impl fmt::Display for SafetyCategory {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let label = match self {
            SafetyCategory::MedicalClaim => "medical claims",
            SafetyCategory::Ingestion => "ingestion",
            SafetyCategory::Misuse => "misuse",
            SafetyCategory::ImproperApplication => "improper application",
            SafetyCategory::AgeInappropriate => "age-inappropriate use",
            SafetyCategory::WeightLoss => "weight loss",
            SafetyCategory::DiseaseClaim => "disease claims",
            SafetyCategory::MedicationSubstitution => "medication substitution",
            SafetyCategory::PerformanceClaim => "performance claims",
        };
        f.write_str(label)
    }
}

/// A phrase and the category it belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SafetyRule {
    pub phrase: &'static str,
    pub category: SafetyCategory,
}

const fn rule(phrase: &'static str, category: SafetyCategory) -> SafetyRule {
    SafetyRule { phrase, category }
}

/// The default unsafe-use phrases.
pub const DEFAULT_RULES: &[SafetyRule] = &[
    rule("cure", SafetyCategory::MedicalClaim),
    rule("treat disease", SafetyCategory::MedicalClaim),
    rule("medical condition", SafetyCategory::MedicalClaim),
    rule("diagnose", SafetyCategory::MedicalClaim),
    rule("prescription alternative", SafetyCategory::MedicalClaim),
    rule("drink", SafetyCategory::Ingestion),
    rule("eat", SafetyCategory::Ingestion),
    rule("consume", SafetyCategory::Ingestion),
    rule("ingest", SafetyCategory::Ingestion),
    rule("swallow", SafetyCategory::Ingestion),
    rule("get high", SafetyCategory::Misuse),
    rule("huffing", SafetyCategory::Misuse),
    rule("sniffing", SafetyCategory::Misuse),
    rule("abuse", SafetyCategory::Misuse),
    rule("recreational use", SafetyCategory::Misuse),
    rule("on skin", SafetyCategory::ImproperApplication),
    rule("in eyes", SafetyCategory::ImproperApplication),
    rule("inject", SafetyCategory::ImproperApplication),
    rule("inhale deeply", SafetyCategory::ImproperApplication),
    rule("for children under", SafetyCategory::AgeInappropriate),
    rule("for infants", SafetyCategory::AgeInappropriate),
    rule("for babies", SafetyCategory::AgeInappropriate),
    rule("weight loss", SafetyCategory::WeightLoss),
    rule("lose weight", SafetyCategory::WeightLoss),
    rule("burn fat", SafetyCategory::WeightLoss),
    rule("prevent cancer", SafetyCategory::DiseaseClaim),
    rule("cure diabetes", SafetyCategory::DiseaseClaim),
    rule("fix autism", SafetyCategory::DiseaseClaim),
    rule("instead of medicine", SafetyCategory::MedicationSubstitution),
    rule("replace medication", SafetyCategory::MedicationSubstitution),
    rule("stop taking", SafetyCategory::MedicationSubstitution),
    rule("make you stronger", SafetyCategory::PerformanceClaim),
    rule("build muscle fast", SafetyCategory::PerformanceClaim),
    rule("steroid alternative", SafetyCategory::PerformanceClaim),
];

/// One phrase found in a transcript.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SafetyMatch {
    pub phrase: String,
    pub category: SafetyCategory,
}

/// Scans text for unsafe-use phrases.
#[derive(Debug, Clone)]
pub struct SafetyPolicy {
    rules: Vec<SafetyRule>,
}

impl SafetyPolicy {
    pub fn new(rules: Vec<SafetyRule>) -> Self {
        Self { rules }
    }

    pub fn rules(&self) -> &[SafetyRule] {
        &self.rules
    }

    /// Every rule whose phrase occurs in the lower-cased text, in catalogue order.
    pub fn scan(&self, text: &str) -> Vec<SafetyMatch> {
        let lowered = text.to_lowercase();
        self.rules
            .iter()
            .filter(|r| lowered.contains(r.phrase))
            .map(|r| SafetyMatch {
                phrase: r.phrase.to_string(),
                category: r.category,
            })
            .collect()
    }

    /// Matched phrases only, as stored in `safety_flags`.
    pub fn flags(&self, text: &str) -> Vec<String> {
        self.scan(text).into_iter().map(|m| m.phrase).collect()
    }

    /// Category of a known phrase.
    pub fn category_of(&self, phrase: &str) -> Option<SafetyCategory> {
        self.rules
            .iter()
            .find(|r| r.phrase == phrase)
            .map(|r| r.category)
    }
}

impl Default for SafetyPolicy {
    fn default() -> Self {
        Self::new(DEFAULT_RULES.to_vec())
    }
}
