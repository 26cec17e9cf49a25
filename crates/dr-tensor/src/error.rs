use thiserror::Error;

use crate::tensor::Location;

#[derive(Error, Debug)]
pub enum TensorError {
    #[error("dtype mismatch: expected {expected}, got {got}")]
    DTypeMismatch { expected: String, got: String },
    #[error("invalid axis {axis} for tensor with {ndim} dimensions")]
    InvalidAxis { axis: usize, ndim: usize },
    #[error("data length {len} does not match shape {shape:?} (numel={numel})")]
    LengthMismatch {
        len: usize,
        shape: Vec<usize>,
        numel: usize,
    },
    #[error("tensor is {0}-resident, host data is not addressable")]
    NotHostResident(Location),
    #[error("device allocation of {bytes} bytes failed on {device}: {reason}")]
    Allocation {
        device: String,
        bytes: usize,
        reason: String,
    },
    #[error("unknown dtype: {0}")]
    UnknownDType(String),
    #[error("unknown storage location: {0}")]
    UnknownLocation(String),
}

pub type Result<T> = std::result::Result<T, TensorError>;
