use dr_tensor::Tensor;

use crate::error::Result;

/// Trait for strategies that turn a step's logits into the next token id.
pub trait TokenSelector: Send + Sync {
    /// Returns the name of this selector.
    fn name(&self) -> &str;

    /// Choose the next token from logits shaped `[1, seq, vocab]`, looking
    /// only at the last position.
    fn select(&self, logits: &Tensor) -> Result<u32>;

    /// Reset any internal state. Default implementation does nothing.
    fn reset(&mut self) {}
}
