//! `dr-engine` - Greedy autoregressive decoding over an external executor.
//!
//! The [`DecodingEngine`] runs the step loop: feed the prompt, pick the
//! argmax token, move the executor's present-state outputs into the KV cache,
//! feed the new token, repeat until a terminal id, the token budget, or an
//! abort. [`Session`] loads a model configuration and builds the engine;
//! [`Conversation`] adds the chat prompt template and tokenizer boundary.

pub mod cancel;
pub mod chat;
pub mod engine;
pub mod error;
pub mod options;
pub mod session;

pub use cancel::CancellationToken;
pub use chat::{ChatReply, Conversation, PromptTemplate, Tokenizer, TokenizerFault};
pub use engine::{DecodeSettings, DecodingEngine, EngineState, FinishReason, ProgressCallback};
pub use error::{EngineError, ErrorKind, Result};
pub use options::{CachePlacement, GenerateOptions, SessionOptions};
pub use session::Session;
