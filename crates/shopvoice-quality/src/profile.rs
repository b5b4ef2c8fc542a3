//! Validation profiles
//!
//! Thresholds and repair limits applied by the validator.

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ProfileError {
    #[error("PROFILE/YAML: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("PROFILE/INVALID: {0}")]
    Invalid(String),
}

/// Validation profile. Fields missing from a YAML document keep their
/// default values.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationProfile {
    /// Profile name (e.g., "voice@1.0")
    pub name: String,

    // === Coherence ===
    pub min_answer_chars: usize,
    pub max_answer_chars: usize,

    // === Citation repair ===
    /// Catalog citations added when none is private.
    pub max_private_repairs: usize,
    /// Web citations added when none is from the web.
    pub max_web_repairs: usize,
    /// Citations listed in the appended "(Sources: ...)" suffix.
    pub max_suffix_citations: usize,
    /// Lower-cased markers showing the answer already cites its sources.
    pub citation_markers: Vec<String>,

    // === Grounding ===
    /// Absolute tolerance when matching an answer price to evidence.
    pub price_tolerance: f64,

    /// Lower-cased phrases acknowledging that nothing was found.
    pub acknowledgment_phrases: Vec<String>,
}

impl ValidationProfile {
    /// Profile for spoken answers.
    pub fn voice() -> Self {
        Self {
            name: "voice@1.0".to_string(),
            min_answer_chars: 20,
            max_answer_chars: 500,
            max_private_repairs: 3,
            max_web_repairs: 2,
            max_suffix_citations: 5,
            citation_markers: vec!["(source".to_string(), "doc #".to_string()],
            price_tolerance: 0.01,
            acknowledgment_phrases: vec![
                "couldn't find".to_string(),
                "no products".to_string(),
                "no results".to_string(),
                "not found".to_string(),
            ],
        }
    }

    /// Load profile from YAML
    pub fn from_yaml(yaml: &str) -> Result<Self, ProfileError> {
        let profile: Self = serde_yaml::from_str(yaml)?;
        profile.validate()?;
        Ok(profile)
    }

    pub fn validate(&self) -> Result<(), ProfileError> {
        if self.min_answer_chars > self.max_answer_chars {
            return Err(ProfileError::Invalid(format!(
                "min_answer_chars {} exceeds max_answer_chars {}",
                self.min_answer_chars, self.max_answer_chars
            )));
        }
        if !self.price_tolerance.is_finite() || self.price_tolerance < 0.0 {
            return Err(ProfileError::Invalid(format!(
                "price_tolerance must be a non-negative number, got {}",
                self.price_tolerance
            )));
        }
        Ok(())
    }
}

impl Default for ValidationProfile {
    fn default() -> Self {
        Self::voice()
    }
}
