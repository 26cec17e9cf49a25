use dr_tensor::{HostStorage, Tensor};

use crate::error::{Result, SelectError};
use crate::selector::TokenSelector;

/// Greedy selector: picks the token with the highest logit at the last position.
///
/// Ties go to the lowest index. Any NaN or infinity in the scanned row is an
/// error; it is never skipped or clamped.
#[derive(Debug, Clone, Copy, Default)]
pub struct GreedySelector;

impl GreedySelector {
    pub fn new() -> Self {
        Self
    }

    /// Argmax over the vocab axis of the last sequence position of
    /// `[1, seq, vocab]` logits.
    pub fn argmax(logits: &Tensor) -> Result<u32> {
        let dims = logits.shape().dims();
        if dims.len() != 3 || dims[0] != 1 || dims[1] == 0 || dims[2] == 0 {
            return Err(SelectError::BadShape(dims.to_vec()));
        }
        let (seq, vocab) = (dims[1], dims[2]);
        let position = seq - 1;
        let row_start = vocab * position;
        scan(logits.host()?, row_start, vocab, position)
    }

    /// Argmax over a plain row of logits.
    pub fn argmax_row(row: &[f32]) -> Result<u32> {
        if row.is_empty() {
            return Err(SelectError::BadShape(vec![0]));
        }
        scan(&HostStorage::F32(row.to_vec()), 0, row.len(), 0)
    }
}

fn scan(data: &HostStorage, row_start: usize, vocab: usize, position: usize) -> Result<u32> {
    let mut best = 0usize;
    let mut best_value = f32::NEG_INFINITY;
    for index in 0..vocab {
        let value = data.float_at(row_start + index)?;
        if !value.is_finite() {
            return Err(SelectError::NonFinite {
                position,
                index,
                value,
            });
        }
        // Strict comparison keeps the first of equal maxima.
        if index == 0 || value > best_value {
            best = index;
            best_value = value;
        }
    }
    Ok(best as u32)
}

impl TokenSelector for GreedySelector {
    fn name(&self) -> &str {
        "greedy"
    }

    fn select(&self, logits: &Tensor) -> Result<u32> {
        Self::argmax(logits)
    }
}
