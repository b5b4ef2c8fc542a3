//! ShopVoice Clients: HTTP implementations of the pipeline collaborators.
//!
//! Both clients are built once per process and shared across requests.

pub mod error;
pub mod llm;
pub mod tools;

pub use error::ClientError;
pub use llm::{HttpBackend, LlmConfig, Provider};
pub use tools::{HttpToolInvoker, ToolsConfig};
