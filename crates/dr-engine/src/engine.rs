use std::time::Instant;

use dr_model::{names, CacheStore, Feed, InferenceExecutor, StepAdapter, StepOutputs};
use dr_sampler::{GreedySelector, TokenSelector};
use dr_tensor::{DType, Location, Shape, Tensor};
use tracing::{debug, info, trace, warn};

use crate::cancel::CancellationToken;
use crate::error::{EngineError, Result};
use crate::options::GenerateOptions;

/// Called after every step with the full output so far (prompt included).
pub type ProgressCallback<'a> = &'a mut dyn FnMut(&[u32]);

/// Lifecycle of the engine, observable between and after calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    /// No generation running; the cache is fresh or holds nothing.
    Idle,
    /// Building the prompt feed.
    Priming,
    /// Inside the step loop.
    Stepping,
    /// Last call stopped on a terminal id or the token budget.
    Completed,
    /// Last call stopped because it was cancelled.
    Aborted,
    /// Last call returned an error.
    Failed,
}

/// Why the last successful call stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    EndOfSequence(u32),
    MaxTokens,
    Cancelled,
}

/// Fixed parameters of the decoding loop.
#[derive(Debug, Clone)]
pub struct DecodeSettings {
    pub num_layers: usize,
    /// Empty cache shape, `[1, kv_heads, 0, head_dim]`.
    pub cache_dims: Shape,
    pub cache_dtype: DType,
    pub placement: Location,
    /// Ids that end generation: the model's eos ids plus any extras.
    pub terminal_ids: Vec<u32>,
    pub need_position_ids: bool,
    pub profiling: bool,
    pub default_max_tokens: usize,
}

/// Greedy autoregressive decoder over an external executor.
///
/// One generation runs at a time (`generate` takes `&mut self`). For the
/// duration of a call the feed, and the cache store inside it, is moved out
/// of the engine; whatever way the call ends, the feed is released before
/// `generate` returns, so no cache tensor or accelerator allocation survives
/// the call. Call [`DecodingEngine::reset_conversation`] before each call.
pub struct DecodingEngine<E, S = GreedySelector> {
    adapter: StepAdapter<E>,
    selector: S,
    settings: DecodeSettings,
    feed: Feed,
    output: Vec<u32>,
    cancel: CancellationToken,
    state: EngineState,
    finish: Option<FinishReason>,
}

impl<E: InferenceExecutor, S: TokenSelector> DecodingEngine<E, S> {
    /// Create an engine with a freshly reset cache.
    pub fn new(adapter: StepAdapter<E>, selector: S, settings: DecodeSettings) -> Result<Self> {
        if settings.num_layers != adapter.num_layers() {
            return Err(EngineError::Configuration(format!(
                "settings describe {} layers, executor adapter {}",
                settings.num_layers,
                adapter.num_layers()
            )));
        }
        if settings.need_position_ids != adapter.declares_position_ids() {
            return Err(EngineError::Configuration(format!(
                "need_position_ids is {} but the executor {} a position_ids input",
                settings.need_position_ids,
                if adapter.declares_position_ids() {
                    "declares"
                } else {
                    "does not declare"
                }
            )));
        }
        let mut engine = DecodingEngine {
            adapter,
            selector,
            settings,
            feed: Feed::default(),
            output: Vec::new(),
            cancel: CancellationToken::new(),
            state: EngineState::Idle,
            finish: None,
        };
        engine.reset_conversation()?;
        Ok(engine)
    }

    /// Drop the output so far and any cache state, and repopulate the cache
    /// with empty tensors for a new turn.
    pub fn reset_conversation(&mut self) -> Result<()> {
        let released = self.feed.release();
        self.feed = Feed::new(CacheStore::new(self.settings.placement));
        self.feed.cache_mut().reset(
            self.settings.num_layers,
            &self.settings.cache_dims,
            self.settings.cache_dtype,
        )?;
        self.output.clear();
        self.selector.reset();
        self.state = EngineState::Idle;
        self.finish = None;
        debug!(released, slots = self.feed.cache().len(), "conversation reset");
        Ok(())
    }

    /// Generate from `prompt` until a terminal id, the token budget, or an abort.
    ///
    /// Returns the output sequence: `prompt` followed by the generated
    /// tokens. Slice off `prompt.len()` tokens to get the continuation. A
    /// cancelled call still returns `Ok` with what was produced before the
    /// abort was observed.
    ///
    /// A call rejected before priming (empty prompt, cache not reset) leaves
    /// the engine in [`EngineState::Failed`] and touches neither the cache
    /// nor the output.
    ///
    /// `progress` is not called while profiling is enabled.
    pub fn generate(
        &mut self,
        prompt: &[u32],
        progress: Option<ProgressCallback<'_>>,
        options: &GenerateOptions,
    ) -> Result<Vec<u32>> {
        self.finish = None;
        if let Err(err) = self.check_ready(prompt) {
            self.state = EngineState::Failed;
            warn!(error = %err, "generation rejected");
            return Err(err);
        }
        let max_tokens = options.resolve_max_tokens(self.settings.default_max_tokens);
        let started = Instant::now();

        self.state = EngineState::Priming;
        let mut feed = std::mem::take(&mut self.feed);
        let result = self
            .prime(&mut feed, prompt)
            .and_then(|()| self.step_loop(&mut feed, progress, max_tokens));

        let released = feed.release();
        if self.settings.profiling {
            self.adapter.end_profiling();
        }

        match result {
            Ok(reason) => {
                self.state = match reason {
                    FinishReason::Cancelled => EngineState::Aborted,
                    _ => EngineState::Completed,
                };
                self.finish = Some(reason);
                let generated = self.output.len() - prompt.len();
                info!(
                    prompt_tokens = prompt.len(),
                    generated,
                    reason = ?reason,
                    released,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "generation finished"
                );
                Ok(self.output.clone())
            }
            Err(err) => {
                self.state = EngineState::Failed;
                warn!(error = %err, released, "generation failed");
                Err(err)
            }
        }
    }

    /// Ask the running generation to stop after its current step.
    pub fn abort(&self) {
        self.cancel.cancel();
    }

    /// A token that aborts this engine's generation from another thread.
    pub fn abort_handle(&self) -> CancellationToken {
        self.cancel.clone()
    }

    pub fn state(&self) -> EngineState {
        self.state
    }

    pub fn finish_reason(&self) -> Option<FinishReason> {
        self.finish
    }

    /// Output of the current conversation so far.
    pub fn output_tokens(&self) -> &[u32] {
        &self.output
    }

    /// The cache store. Empty between a finished call and the next reset.
    pub fn cache(&self) -> &CacheStore {
        self.feed.cache()
    }

    pub fn settings(&self) -> &DecodeSettings {
        &self.settings
    }

    pub fn executor(&self) -> &E {
        self.adapter.executor()
    }

    pub fn executor_mut(&mut self) -> &mut E {
        self.adapter.executor_mut()
    }

    fn check_ready(&self, prompt: &[u32]) -> Result<()> {
        if prompt.is_empty() {
            return Err(EngineError::EmptyPrompt);
        }
        let expected = self.settings.num_layers * 2;
        let found = self.feed.cache().len();
        if found != expected {
            return Err(EngineError::CacheNotReady { found, expected });
        }
        Ok(())
    }

    fn prime(&mut self, feed: &mut Feed, prompt: &[u32]) -> Result<()> {
        // Positions continue from the existing output, which is empty after
        // the reset `generate` requires.
        let prior_len = self.output.len();
        feed.set(names::INPUT_IDS, token_ids(prompt)?);
        if self.settings.need_position_ids {
            let positions = (prior_len..prior_len + prompt.len())
                .map(|p| p as i64)
                .collect();
            feed.set(
                names::POSITION_IDS,
                Tensor::from_i64(positions, Shape::new(vec![1, prompt.len()]))?,
            );
        }
        self.output.extend_from_slice(prompt);
        self.cancel.reset();
        Ok(())
    }

    fn step_loop(
        &mut self,
        feed: &mut Feed,
        mut progress: Option<ProgressCallback<'_>>,
        max_tokens: usize,
    ) -> Result<FinishReason> {
        self.state = EngineState::Stepping;
        let mut last = None;
        let mut step = 0usize;
        loop {
            if let Some(reason) = self.stop_reason(last, max_tokens) {
                return Ok(reason);
            }
            let seq_len = self.output.len();
            feed.set(
                names::ATTENTION_MASK,
                Tensor::from_i64(vec![1; seq_len], Shape::new(vec![1, seq_len]))?,
            );

            let StepOutputs { logits, presents } = self.adapter.run(feed)?;
            let token = self.selector.select(&logits)?;
            logits.dispose();

            self.output.push(token);
            step += 1;
            trace!(step, token, seq_len = self.output.len(), "token selected");

            if !self.settings.profiling {
                if let Some(callback) = progress.as_mut() {
                    callback(&self.output);
                }
            }

            for (name, tensor) in presents {
                let slot = names::past_name_for(&name)
                    .ok_or_else(|| EngineError::Configuration(format!("unmapped output '{}'", name)))?;
                feed.cache_mut().replace(&slot, tensor)?;
            }

            // The cache now covers every position up to seq_len - 1, so only
            // the new token is fed, at position seq_len.
            feed.set(names::INPUT_IDS, token_ids(&[token])?);
            if self.settings.need_position_ids {
                feed.set(
                    names::POSITION_IDS,
                    Tensor::from_i64(vec![seq_len as i64], Shape::new(vec![1, 1]))?,
                );
            }
            last = Some(token);
        }
    }

    fn stop_reason(&self, last: Option<u32>, max_tokens: usize) -> Option<FinishReason> {
        if let Some(token) = last.filter(|t| self.settings.terminal_ids.contains(t)) {
            return Some(FinishReason::EndOfSequence(token));
        }
        if self.output.len() >= max_tokens {
            return Some(FinishReason::MaxTokens);
        }
        if self.cancel.is_cancelled() {
            return Some(FinishReason::Cancelled);
        }
        None
    }
}

fn token_ids(tokens: &[u32]) -> Result<Tensor> {
    let ids = tokens.iter().map(|&t| i64::from(t)).collect();
    Ok(Tensor::from_i64(ids, Shape::new(vec![1, tokens.len()]))?)
}
