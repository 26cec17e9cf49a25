use dr_model::{ExecutorFault, ModelError};
use dr_sampler::SelectError;
use thiserror::Error;

/// Broad classes of failure a caller may want to react to differently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed configuration or a mismatch between model, executor and
    /// settings. Not going to succeed on retry.
    Configuration,
    /// The executor (or tokenizer) failed while evaluating.
    Execution,
    /// A non-finite logit reached token selection.
    Numerical,
    /// The caller passed an unusable argument.
    InvalidInput,
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("prompt must contain at least one token")]
    EmptyPrompt,
    #[error("message is empty")]
    EmptyMessage,
    #[error("cache store holds {found} entries, expected {expected}; reset the conversation before generating")]
    CacheNotReady { found: usize, expected: usize },
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("failed to construct executor: {0}")]
    ExecutorLoad(#[source] ExecutorFault),
    #[error(transparent)]
    Model(#[from] ModelError),
    #[error("numerical error: {0}")]
    Numerical(#[source] SelectError),
    #[error("token selection failed: {0}")]
    Selection(#[source] SelectError),
    #[error("tensor error: {0}")]
    Tensor(#[from] dr_tensor::TensorError),
    #[error("tokenizer error: {0}")]
    Tokenizer(String),
}

impl EngineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            EngineError::EmptyPrompt | EngineError::EmptyMessage => ErrorKind::InvalidInput,
            EngineError::CacheNotReady { .. }
            | EngineError::Configuration(_)
            | EngineError::ExecutorLoad(_)
            | EngineError::Selection(_)
            | EngineError::Tensor(_) => ErrorKind::Configuration,
            EngineError::Model(e) if e.is_configuration() => ErrorKind::Configuration,
            EngineError::Model(_) | EngineError::Tokenizer(_) => ErrorKind::Execution,
            EngineError::Numerical(_) => ErrorKind::Numerical,
        }
    }
}

impl From<SelectError> for EngineError {
    fn from(err: SelectError) -> Self {
        match err {
            SelectError::NonFinite { .. } => EngineError::Numerical(err),
            other => EngineError::Selection(other),
        }
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
