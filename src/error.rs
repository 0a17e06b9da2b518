// src/error.rs
use thiserror::Error;

pub type Result<T> = std::result::Result<T, UserOpError>;

#[derive(Error, Debug)]
pub enum UserOpError {
    /// Required environment or collaborator data is missing.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// The operation has an invalid shape and must be fixed by the caller.
    #[error("Invalid UserOperation: {0}")]
    Construction(String),

    #[error("Value does not fit in 128 bits: {0}")]
    Range(String),

    #[error("Cannot pad {actual} bytes to {target} bytes")]
    Padding { actual: usize, target: usize },

    /// The bundler or relayer explicitly refused a submission.
    #[error("Remote rejected request: {0}")]
    RemoteRejection(String),

    /// Polling ran out of attempts or time. The id is still valid for a manual retry.
    #[error("Timed out waiting for {id} after {attempts} attempts")]
    Timeout { id: String, attempts: u32 },

    #[error("Command template id mismatch: expected {expected}, computed {computed}")]
    TemplateMismatch { expected: String, computed: String },

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Ethereum provider error: {0}")]
    Provider(String),
}

impl UserOpError {
    /// Id of the request or operation the error belongs to, if it carries one.
    pub fn correlation_id(&self) -> Option<&str> {
        match self {
            Self::Timeout { id, .. } => Some(id),
            _ => None,
        }
    }
}

impl From<reqwest::Error> for UserOpError {
    fn from(e: reqwest::Error) -> Self {
        Self::Transport(e.to_string())
    }
}

impl From<ethers::providers::ProviderError> for UserOpError {
    fn from(e: ethers::providers::ProviderError) -> Self {
        Self::Provider(e.to_string())
    }
}
