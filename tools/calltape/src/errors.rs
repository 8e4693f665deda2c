use thiserror::Error;

/// Failure raised by a backend operation. Recording passes it through untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{message}")]
pub struct BackendError {
    pub message: String,
}

impl BackendError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Error)]
pub enum TapeError {
    #[error("io error: {0}")]
    Io(String),
    #[error("config parse error: {0}")]
    ConfigParse(String),
    #[error("invalid config: {0}")]
    InvalidConfig(String),
    #[error("cli error: {0}")]
    Cli(String),
    #[error("unsupported value: {0}")]
    Unsupported(String),
    #[error("malformed record: {0}")]
    Malformed(String),
    #[error("unresolved identity: {0}")]
    Unresolved(String),
    #[error("no matching operation: {0}")]
    NoOperation(String),
    #[error("backend error: {0}")]
    Backend(BackendError),
    #[error("replay divergence: {0}")]
    Divergence(String),
}

impl From<BackendError> for TapeError {
    fn from(error: BackendError) -> Self {
        Self::Backend(error)
    }
}
