use thiserror::Error;

/// Failure to construct a client. Request-time failures never use this type.
#[derive(Error, Debug)]
pub enum ClientError {
    #[error("CLIENT/BUILD: {0}")]
    Build(String),

    #[error("CLIENT/CONFIG: {0}")]
    Config(String),
}
