//! ShopVoice Policy: unsafe-use detection and refusals
//!
//! # Example
//!
//! ```
//! use shopvoice_policy::{refusal_message, SafetyPolicy};
//!
//! let policy = SafetyPolicy::default();
//! let flags = policy.flags("is this safe to drink?");
//! assert_eq!(flags, vec!["drink"]);
//! assert!(refusal_message(&flags).contains("drink"));
//! ```

pub mod safety;

pub use safety::{SafetyCategory, SafetyMatch, SafetyPolicy, SafetyRule, DEFAULT_RULES};

/// Answer given when retrieval produced no evidence at all.
pub const NOT_FOUND_MESSAGE: &str = "I couldn't find any products matching those criteria. \
     Try broadening your search or adjusting filters.";

/// Refusal returned in place of an answer when any safety flag is raised.
pub fn refusal_message(flags: &[String]) -> String {
    format!(
        "I can help with product recommendations, but I cannot provide advice on {}. \
         Please consult manufacturer instructions or a qualified professional.",
        flags.join(", ")
    )
}

/// Whether an answer is the refusal for the given flags.
pub fn is_refusal(answer: &str, flags: &[String]) -> bool {
    answer == refusal_message(flags)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_refusal_names_every_flag() {
        let flags = vec!["drink".to_string(), "for babies".to_string()];
        let message = refusal_message(&flags);
        assert!(message.contains("drink, for babies"));
        assert!(is_refusal(&message, &flags));
    }
}
