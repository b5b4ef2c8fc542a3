//! ShopVoice Quality: answer validation
//!
//! Enforces safety, grounding and citation invariants on the synthesized
//! answer, repairing what can be repaired and recording the rest.
//!
//! # Example
//!
//! ```
//! use shopvoice_core::RequestState;
//! use shopvoice_policy::NOT_FOUND_MESSAGE;
//! use shopvoice_quality::{CheckStatus, QualityValidator};
//!
//! let validator = QualityValidator::default();
//! let mut state = RequestState::new("unicorn polish");
//! state.answer = Some("Unicorn polish is $5 at doc #u1.".to_string());
//!
//! let report = validator.validate(&mut state);
//! assert_eq!(state.answer.as_deref(), Some(NOT_FOUND_MESSAGE));
//! assert_eq!(report.status, CheckStatus::Warn);
//! ```

pub mod checks;
pub mod profile;
pub mod validator;

pub use checks::{Check, CheckStatus, CitationRepair};
pub use profile::{ProfileError, ValidationProfile};
pub use validator::{QualityValidator, ValidationReport};
