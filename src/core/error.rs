

use thiserror::Error;

use crate::collaborators::CollaboratorError;
use crate::llm::providers::LlmProviderError;


#[derive(Error, Debug)]
pub enum MiseError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("LLM provider error: {0}")]
    LlmProvider(#[from] LlmProviderError),

    #[error("Collaborator error: {0}")]
    Collaborator(#[from] CollaboratorError),

    /// A session snapshot broke one of its structural rules. Always a bug.
    #[error("Session invariant violated: {0}")]
    Invariant(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl MiseError {
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    pub fn invariant(message: impl Into<String>) -> Self {
        Self::Invariant(message.into())
    }
}


pub type Result<T> = std::result::Result<T, MiseError>;
