use std::collections::{BTreeMap, BTreeSet};

use dr_tensor::{DType, Location, Tensor};
use tracing::trace;

use crate::config::ModelConfig;
use crate::error::{ModelError, Result};
use crate::feed::Feed;
use crate::names;

/// Error type returned by an external executor.
pub type ExecutorFault = Box<dyn std::error::Error + Send + Sync>;

/// Settings handed to an executor when its session is constructed.
#[derive(Debug, Clone)]
pub struct ExecutorOptions {
    /// Execution provider name (e.g. "webgpu", "wasm", "cuda").
    pub provider: String,
    /// Element type of the cache tensors the executor will be fed.
    pub cache_dtype: DType,
    /// Where the executor should place each named output.
    pub preferred_output_locations: BTreeMap<String, Location>,
    pub profiling: bool,
    pub verbose: bool,
}

impl ExecutorOptions {
    /// Options that place every present-state output of `config` at `placement`.
    pub fn for_model(config: &ModelConfig, provider: &str, cache_dtype: DType, placement: Location) -> Self {
        let preferred_output_locations = names::present_outputs(config.num_hidden_layers)
            .map(|name| (name, placement))
            .collect();
        ExecutorOptions {
            provider: provider.to_string(),
            cache_dtype,
            preferred_output_locations,
            profiling: false,
            verbose: false,
        }
    }
}

/// Trait for the external engine that evaluates one forward pass.
///
/// Implementations own the network and whatever device state it needs. A call
/// to `run` is logically blocking; the returned map must contain a `logits`
/// tensor shaped `[1, seq, vocab]` and one `present.{layer}.key|value` tensor
/// per layer.
pub trait InferenceExecutor: Send {
    /// Names of the inputs the loaded model declares.
    fn input_names(&self) -> Vec<String>;

    /// Evaluate one step.
    fn run(&mut self, feed: &Feed) -> std::result::Result<BTreeMap<String, Tensor>, ExecutorFault>;

    /// Flush profiling data collected since the session was created.
    fn end_profiling(&mut self) {}
}

/// Outputs of one step, split into the parts the decoding loop consumes.
#[derive(Debug)]
pub struct StepOutputs {
    pub logits: Tensor,
    /// Present-state outputs in `(output name, tensor)` form.
    pub presents: Vec<(String, Tensor)>,
}

/// Checked wrapper around an [`InferenceExecutor`].
///
/// Verifies at construction that the executor declares every input the
/// decoding loop feeds, and on each step that the feed matches the declared
/// inputs exactly and that all expected outputs came back.
pub struct StepAdapter<E> {
    executor: E,
    declared: BTreeSet<String>,
    num_layers: usize,
}

impl<E: InferenceExecutor> StepAdapter<E> {
    pub fn new(executor: E, num_layers: usize) -> Result<Self> {
        let declared: BTreeSet<String> = executor.input_names().into_iter().collect();
        let required = [names::INPUT_IDS.to_string(), names::ATTENTION_MASK.to_string()]
            .into_iter()
            .chain(names::cache_slots(num_layers));
        for name in required {
            if !declared.contains(&name) {
                return Err(ModelError::MissingInput(name));
            }
        }
        Ok(StepAdapter {
            executor,
            declared,
            num_layers,
        })
    }

    /// Whether the model declares a `position_ids` input.
    pub fn declares_position_ids(&self) -> bool {
        self.declared.contains(names::POSITION_IDS)
    }

    pub fn declared_inputs(&self) -> impl Iterator<Item = &str> {
        self.declared.iter().map(String::as_str)
    }

    pub fn num_layers(&self) -> usize {
        self.num_layers
    }

    /// Run one step.
    ///
    /// Outputs that are neither `logits` nor present-state are dropped here.
    pub fn run(&mut self, feed: &Feed) -> Result<StepOutputs> {
        self.check_feed(feed)?;
        let mut outputs = self.executor.run(feed).map_err(ModelError::Executor)?;
        trace!(outputs = outputs.len(), "executor step finished");

        let logits = outputs
            .remove(names::LOGITS)
            .ok_or_else(|| ModelError::MissingOutput(names::LOGITS.to_string()))?;
        if let Some(missing) = names::present_outputs(self.num_layers).find(|n| !outputs.contains_key(n)) {
            return Err(ModelError::MissingOutput(missing));
        }
        let presents = outputs
            .into_iter()
            .filter(|(name, _)| names::is_present(name))
            .collect();
        Ok(StepOutputs { logits, presents })
    }

    pub fn end_profiling(&mut self) {
        self.executor.end_profiling();
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn executor_mut(&mut self) -> &mut E {
        &mut self.executor
    }

    fn check_feed(&self, feed: &Feed) -> Result<()> {
        let fed: BTreeSet<&str> = feed.names().collect();
        let missing: Vec<String> = self
            .declared
            .iter()
            .filter(|n| !fed.contains(n.as_str()))
            .cloned()
            .collect();
        let unexpected: Vec<String> = fed
            .iter()
            .filter(|n| !self.declared.contains(**n))
            .map(|n| n.to_string())
            .collect();
        if missing.is_empty() && unexpected.is_empty() {
            Ok(())
        } else {
            Err(ModelError::FeedMismatch { missing, unexpected })
        }
    }
}
