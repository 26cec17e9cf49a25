use dr_model::{ExecutorFault, ExecutorOptions, InferenceExecutor, ModelConfig, StepAdapter};
use dr_sampler::{GreedySelector, TokenSelector};
use dr_tensor::Location;
use tracing::info;

use crate::cancel::CancellationToken;
use crate::engine::{DecodeSettings, DecodingEngine, ProgressCallback};
use crate::error::{EngineError, Result};
use crate::options::{GenerateOptions, SessionOptions};

/// A loaded model: configuration, executor and decoding engine.
///
/// Loading resets the conversation once, so the first `generate` works
/// without an explicit reset; later turns must call
/// [`Session::reset_conversation`] first.
pub struct Session<E, S = GreedySelector> {
    config: ModelConfig,
    options: SessionOptions,
    engine: DecodingEngine<E, S>,
}

impl<E: InferenceExecutor> Session<E> {
    /// Load with greedy token selection.
    ///
    /// `build` constructs the executor from the options derived from the
    /// model config and session options (provider, cache dtype, output
    /// placement).
    pub fn load<F>(config: ModelConfig, options: SessionOptions, build: F) -> Result<Self>
    where
        F: FnOnce(&ExecutorOptions) -> std::result::Result<E, ExecutorFault>,
    {
        Self::load_with_selector(config, options, GreedySelector, build)
    }
}

impl<E: InferenceExecutor, S: TokenSelector> Session<E, S> {
    pub fn load_with_selector<F>(
        config: ModelConfig,
        options: SessionOptions,
        selector: S,
        build: F,
    ) -> Result<Self>
    where
        F: FnOnce(&ExecutorOptions) -> std::result::Result<E, ExecutorFault>,
    {
        config.validate()?;
        if options.default_max_tokens == 0 {
            return Err(EngineError::Configuration(
                "default_max_tokens must be positive".to_string(),
            ));
        }

        let placement = Location::from(options.cache_placement);
        let cache_dtype = options.cache_dtype();
        let mut exec_options =
            ExecutorOptions::for_model(&config, &options.provider, cache_dtype, placement);
        exec_options.profiling = options.profiling;
        exec_options.verbose = options.verbose;

        let executor = build(&exec_options).map_err(EngineError::ExecutorLoad)?;
        let adapter = StepAdapter::new(executor, config.num_hidden_layers)?;

        let mut terminal_ids = config.eos_token_ids();
        for id in &options.additional_terminal_ids {
            if !terminal_ids.contains(id) {
                terminal_ids.push(*id);
            }
        }
        let need_position_ids = options
            .need_position_ids
            .unwrap_or_else(|| adapter.declares_position_ids());

        let settings = DecodeSettings {
            num_layers: config.num_hidden_layers,
            cache_dims: config.cache_shape(),
            cache_dtype,
            placement,
            terminal_ids,
            need_position_ids,
            profiling: options.profiling,
            default_max_tokens: options.default_max_tokens,
        };
        info!(
            provider = %options.provider,
            layers = settings.num_layers,
            cache_dtype = %cache_dtype,
            placement = %placement,
            position_ids = need_position_ids,
            terminal_ids = ?settings.terminal_ids,
            "session loaded"
        );
        let engine = DecodingEngine::new(adapter, selector, settings)?;

        Ok(Session {
            config,
            options,
            engine,
        })
    }

    /// See [`DecodingEngine::generate`].
    pub fn generate(
        &mut self,
        prompt: &[u32],
        progress: Option<ProgressCallback<'_>>,
        options: &GenerateOptions,
    ) -> Result<Vec<u32>> {
        self.engine.generate(prompt, progress, options)
    }

    pub fn reset_conversation(&mut self) -> Result<()> {
        self.engine.reset_conversation()
    }

    pub fn abort(&self) {
        self.engine.abort();
    }

    pub fn abort_handle(&self) -> CancellationToken {
        self.engine.abort_handle()
    }

    pub fn engine(&self) -> &DecodingEngine<E, S> {
        &self.engine
    }

    pub fn engine_mut(&mut self) -> &mut DecodingEngine<E, S> {
        &mut self.engine
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }
}
