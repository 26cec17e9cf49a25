use dr_tensor::{DType, Location, Shape};
use thiserror::Error;

use crate::executor::ExecutorFault;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("invalid model config JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid model config: {0}")]
    InvalidConfig(String),
    #[error("executor does not declare required input '{0}'")]
    MissingInput(String),
    #[error("cache tensor '{name}' is {got}-resident, configured placement is {expected}")]
    PlacementMismatch {
        name: String,
        expected: Location,
        got: Location,
    },
    #[error("cache tensor '{name}' is {got_dtype} {got_dims}, slot expects {expected_dtype} {expected_dims} with any length on axis 2")]
    CacheShapeMismatch {
        name: String,
        expected_dtype: DType,
        expected_dims: Shape,
        got_dtype: DType,
        got_dims: Shape,
    },
    #[error("no cache slot named '{0}'")]
    UnknownCacheSlot(String),
    #[error("feed does not match declared inputs: missing {missing:?}, unexpected {unexpected:?}")]
    FeedMismatch {
        missing: Vec<String>,
        unexpected: Vec<String>,
    },
    #[error("executor failed: {0}")]
    Executor(#[source] ExecutorFault),
    #[error("executor did not produce output '{0}'")]
    MissingOutput(String),
    #[error("tensor error: {0}")]
    TensorError(#[from] dr_tensor::TensorError),
}

impl ModelError {
    /// True for errors caused by configuration or model/executor mismatch,
    /// as opposed to a failure while evaluating a step.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            ModelError::Io(_)
                | ModelError::Json(_)
                | ModelError::InvalidConfig(_)
                | ModelError::MissingInput(_)
                | ModelError::PlacementMismatch { .. }
                | ModelError::CacheShapeMismatch { .. }
                | ModelError::UnknownCacheSlot(_)
                | ModelError::TensorError(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, ModelError>;
