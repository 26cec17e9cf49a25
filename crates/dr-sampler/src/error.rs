use thiserror::Error;

#[derive(Error, Debug)]
pub enum SelectError {
    /// A scanned logit was NaN or infinite.
    #[error("non-finite logit {value} at vocab index {index} (position {position})")]
    NonFinite {
        position: usize,
        index: usize,
        value: f32,
    },
    #[error("logits must be [batch, seq, vocab] with non-empty seq and vocab, got {0:?}")]
    BadShape(Vec<usize>),
    #[error("tensor error: {0}")]
    Tensor(#[from] dr_tensor::TensorError),
}

pub type Result<T> = std::result::Result<T, SelectError>;
