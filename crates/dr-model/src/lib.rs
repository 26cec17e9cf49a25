pub mod cache;
pub mod config;
pub mod error;
pub mod executor;
pub mod feed;
pub mod names;

pub use cache::CacheStore;
pub use config::{EosTokenIds, ModelConfig};
pub use error::{ModelError, Result};
pub use executor::{ExecutorFault, ExecutorOptions, InferenceExecutor, StepAdapter, StepOutputs};
pub use feed::Feed;
