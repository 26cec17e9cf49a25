use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Cooperative stop flag shared between a running generation and its callers.
///
/// The decoding loop checks it once per step, between executor calls, so an
/// in-flight step always finishes before the loop notices.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    flag: Arc<AtomicBool>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    /// Request that the current generation stop after its in-flight step.
    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }

    /// Clear a previous request. Called by the engine when a new generation starts.
    pub fn reset(&self) {
        self.flag.store(false, Ordering::Release);
    }
}
