//! Chat turns on top of a [`Session`]: prompt templating, optional document
//! context, and the tokenizer boundary.

use std::time::{Duration, Instant};

use dr_model::InferenceExecutor;
use dr_sampler::{GreedySelector, TokenSelector};
use tracing::{debug, info};

use crate::cancel::CancellationToken;
use crate::engine::{FinishReason, ProgressCallback};
use crate::error::{EngineError, Result};
use crate::options::GenerateOptions;
use crate::session::Session;

/// Error type returned by an external tokenizer.
pub type TokenizerFault = Box<dyn std::error::Error + Send + Sync>;

/// Text to token id conversion, supplied by the caller.
pub trait Tokenizer {
    fn encode(&self, text: &str) -> std::result::Result<Vec<u32>, TokenizerFault>;

    /// Decode `tokens`, leaving out special tokens when `skip_special` is set.
    fn decode(&self, tokens: &[u32], skip_special: bool) -> std::result::Result<String, TokenizerFault>;
}

/// Phi-3 style chat template with a single system turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PromptTemplate {
    pub system: String,
}

impl Default for PromptTemplate {
    fn default() -> Self {
        PromptTemplate {
            system: "You are a friendly assistant.".to_string(),
        }
    }
}

impl PromptTemplate {
    pub fn new(system: impl Into<String>) -> Self {
        PromptTemplate {
            system: system.into(),
        }
    }

    pub fn render(&self, query: &str) -> String {
        format!(
            "<|system|>\n{}<|end|>\n<|user|>\n{}<|end|>\n<|assistant|>\n",
            self.system, query
        )
    }
}

/// Result of one chat turn.
#[derive(Debug, Clone)]
pub struct ChatReply {
    /// Decoded continuation, prompt excluded.
    pub text: String,
    pub prompt_tokens: usize,
    pub generated_tokens: usize,
    /// `None` when no token was generated or callbacks were suppressed.
    pub time_to_first_token: Option<Duration>,
    pub elapsed: Duration,
    pub finish_reason: Option<FinishReason>,
}

impl ChatReply {
    pub fn tokens_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generated_tokens as f64 / secs
        } else {
            0.0
        }
    }
}

/// A chat front-end over a session and a tokenizer.
pub struct Conversation<E, T, S = GreedySelector> {
    session: Session<E, S>,
    tokenizer: T,
    template: PromptTemplate,
    max_tokens: Option<usize>,
    show_special: bool,
    document: Option<String>,
}

impl<E: InferenceExecutor, T: Tokenizer, S: TokenSelector> Conversation<E, T, S> {
    pub fn new(session: Session<E, S>, tokenizer: T) -> Self {
        Conversation {
            session,
            tokenizer,
            template: PromptTemplate::default(),
            max_tokens: None,
            show_special: false,
            document: None,
        }
    }

    pub fn with_template(mut self, template: PromptTemplate) -> Self {
        self.template = template;
        self
    }

    /// Token budget per turn, prompt included. Unset uses the session default.
    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    /// Keep special tokens in decoded replies.
    pub fn show_special(mut self, show: bool) -> Self {
        self.show_special = show;
        self
    }

    /// Prepend `text` to every following query.
    pub fn attach_document(&mut self, text: impl Into<String>) {
        let text = text.into();
        debug!(chars = text.len(), "document attached");
        self.document = Some(text);
    }

    pub fn detach_document(&mut self) -> Option<String> {
        self.document.take()
    }

    /// The query for `message`, with the attached document in front if any.
    pub fn compose_query(&self, message: &str) -> String {
        match self.document.as_deref().filter(|d| !d.is_empty()) {
            Some(doc) => format!("{doc}\n\n{message}"),
            None => message.to_string(),
        }
    }

    /// The prompt text sent to the tokenizer. Continuations skip the template.
    pub fn build_prompt(&self, query: &str, continuation: bool) -> String {
        if continuation {
            query.to_string()
        } else {
            self.template.render(query)
        }
    }

    /// Run one turn: template, encode, reset, generate, decode the continuation.
    pub fn ask(&mut self, message: &str, continuation: bool) -> Result<ChatReply> {
        if message.trim().is_empty() {
            return Err(EngineError::EmptyMessage);
        }
        let prompt = self.build_prompt(&self.compose_query(message), continuation);
        let input_ids = self
            .tokenizer
            .encode(&prompt)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;

        self.session.reset_conversation()?;
        let output_index = self.session.engine().output_tokens().len() + input_ids.len();

        let started = Instant::now();
        let mut first_token = None;
        let mut on_step = |output: &[u32]| {
            if first_token.is_none() && output.len() > output_index {
                first_token = Some(started.elapsed());
            }
        };
        let progress: ProgressCallback<'_> = &mut on_step;
        let options = GenerateOptions {
            max_tokens: self.max_tokens,
        };
        let output = self.session.generate(&input_ids, Some(progress), &options)?;
        let elapsed = started.elapsed();

        let generated = &output[output_index.min(output.len())..];
        let text = self
            .tokenizer
            .decode(generated, !self.show_special)
            .map_err(|e| EngineError::Tokenizer(e.to_string()))?;

        let reply = ChatReply {
            text,
            prompt_tokens: input_ids.len(),
            generated_tokens: generated.len(),
            time_to_first_token: first_token,
            elapsed,
            finish_reason: self.session.engine().finish_reason(),
        };
        if let Some(ttft) = reply.time_to_first_token {
            debug!(ttft_ms = ttft.as_millis() as u64, prompt_tokens = reply.prompt_tokens, "first token");
        }
        info!(
            tokens = reply.generated_tokens,
            elapsed_ms = elapsed.as_millis() as u64,
            tokens_per_sec = reply.tokens_per_second(),
            "chat turn finished"
        );
        Ok(reply)
    }

    pub fn abort_handle(&self) -> CancellationToken {
        self.session.abort_handle()
    }

    pub fn session(&self) -> &Session<E, S> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut Session<E, S> {
        &mut self.session
    }

    pub fn tokenizer(&self) -> &T {
        &self.tokenizer
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_template() {
        let prompt = PromptTemplate::default().render("Hi");
        assert_eq!(
            prompt,
            "<|system|>\nYou are a friendly assistant.<|end|>\n<|user|>\nHi<|end|>\n<|assistant|>\n"
        );
    }

    #[test]
    fn test_custom_system_message() {
        let prompt = PromptTemplate::new("Be terse.").render("2+2?");
        assert!(prompt.starts_with("<|system|>\nBe terse.<|end|>"));
        assert!(prompt.ends_with("<|user|>\n2+2?<|end|>\n<|assistant|>\n"));
    }

    #[test]
    fn test_reply_rate() {
        let reply = ChatReply {
            text: String::new(),
            prompt_tokens: 4,
            generated_tokens: 10,
            time_to_first_token: None,
            elapsed: Duration::from_secs(2),
            finish_reason: Some(FinishReason::MaxTokens),
        };
        assert!((reply.tokens_per_second() - 5.0).abs() < 1e-9);

        let instant = ChatReply {
            elapsed: Duration::ZERO,
            ..reply
        };
        assert_eq!(instant.tokens_per_second(), 0.0);
    }
}
