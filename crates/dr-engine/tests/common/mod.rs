#![allow(dead_code)]

use std::collections::BTreeMap;
use std::sync::Arc;

use dr_engine::{Session, SessionOptions};
use dr_model::{names, ExecutorFault, ExecutorOptions, Feed, InferenceExecutor, ModelConfig};
use dr_tensor::{DType, DeviceMemory, Location, Shape, Tensor};

pub const LAYERS: usize = 2;
pub const KV_HEADS: usize = 2;
pub const HEAD_DIM: usize = 4;
pub const EOS: u32 = 2;

/// What the executor answers at a given step of a call.
#[derive(Debug, Clone, Copy)]
pub enum Step {
    /// Logits peaked at this id.
    Token(u32),
    /// Logits containing a NaN.
    NonFinite,
    /// The executor reports a fault.
    Fail,
}

/// What the executor saw when it was run.
#[derive(Debug, Clone)]
pub struct StepRecord {
    pub input_ids: Vec<i64>,
    pub position_ids: Option<Vec<i64>>,
    pub mask_len: usize,
    pub cache_entries: usize,
    pub cache_seq_len: Option<usize>,
    pub cache_dtype: Option<DType>,
    pub live_buffers: usize,
}

/// In-process executor that replays a token script.
///
/// The step index restarts whenever the fed cache is empty, so the script
/// applies to each call after a reset. Present outputs grow every cache slot
/// by the number of fed tokens and are placed where the options asked, on
/// `device` for accelerator placement.
pub struct ScriptedExecutor {
    pub vocab: usize,
    pub script: Vec<Step>,
    pub default_token: u32,
    pub with_position_ids: bool,
    /// Return host presents regardless of the preferred locations.
    pub ignore_placement: bool,
    pub device: Option<Arc<dyn DeviceMemory>>,
    /// Element type of present outputs; the cache dtype when unset.
    pub present_dtype: Option<DType>,
    pub options: ExecutorOptions,
    pub records: Vec<StepRecord>,
    pub profiles_flushed: usize,
    step: usize,
}

impl ScriptedExecutor {
    pub fn new(options: &ExecutorOptions, script: Vec<Step>) -> Self {
        ScriptedExecutor {
            vocab: 16,
            script,
            default_token: 7,
            with_position_ids: true,
            ignore_placement: false,
            device: None,
            present_dtype: None,
            options: options.clone(),
            records: Vec::new(),
            profiles_flushed: 0,
            step: 0,
        }
    }

    pub fn vocab(mut self, vocab: usize) -> Self {
        self.vocab = vocab;
        self
    }

    pub fn default_token(mut self, token: u32) -> Self {
        self.default_token = token;
        self
    }

    pub fn without_position_ids(mut self) -> Self {
        self.with_position_ids = false;
        self
    }

    pub fn on_device(mut self, device: Arc<dyn DeviceMemory>) -> Self {
        self.device = Some(device);
        self
    }

    pub fn presents_as(mut self, dtype: DType) -> Self {
        self.present_dtype = Some(dtype);
        self
    }

    pub fn ignoring_placement(mut self) -> Self {
        self.ignore_placement = true;
        self
    }

    fn logits(&self, positions: usize, action: Step) -> Result<Tensor, ExecutorFault> {
        let mut data = vec![0.0f32; positions * self.vocab];
        let row = (positions - 1) * self.vocab;
        match action {
            Step::Token(id) => data[row + id as usize] = 1.0,
            Step::NonFinite => data[row + 1] = f32::NAN,
            Step::Fail => unreachable!(),
        }
        Ok(Tensor::from_f32(data, Shape::new(vec![1, positions, self.vocab]))?)
    }

    fn present(&self, name: &str, shape: Shape) -> Result<Tensor, ExecutorFault> {
        let wants_device = !self.ignore_placement
            && self.options.preferred_output_locations.get(name) == Some(&Location::Accelerator);
        let dtype = self.present_dtype.unwrap_or(self.options.cache_dtype);
        match (&self.device, wants_device) {
            (Some(device), true) => Ok(Tensor::on_device(device, dtype, shape)?),
            _ => Ok(Tensor::zeros(dtype, shape)),
        }
    }
}

impl InferenceExecutor for ScriptedExecutor {
    fn input_names(&self) -> Vec<String> {
        let mut inputs = vec![names::INPUT_IDS.to_string(), names::ATTENTION_MASK.to_string()];
        if self.with_position_ids {
            inputs.push(names::POSITION_IDS.to_string());
        }
        inputs.extend(names::cache_slots(LAYERS));
        inputs
    }

    fn run(&mut self, feed: &Feed) -> Result<BTreeMap<String, Tensor>, ExecutorFault> {
        let input_ids = feed.get(names::INPUT_IDS).ok_or("no input_ids")?.i64_data()?.to_vec();
        let position_ids = match feed.get(names::POSITION_IDS) {
            Some(t) => Some(t.i64_data()?.to_vec()),
            None => None,
        };
        let mask_len = feed.get(names::ATTENTION_MASK).ok_or("no attention_mask")?.numel();
        let cache = feed.cache();
        let cache_seq_len = cache.seq_len();
        if cache_seq_len == Some(0) {
            self.step = 0;
        }
        self.records.push(StepRecord {
            input_ids: input_ids.clone(),
            position_ids,
            mask_len,
            cache_entries: cache.len(),
            cache_seq_len,
            cache_dtype: cache.iter().next().map(|(_, t)| t.dtype()),
            live_buffers: self.device.as_ref().map_or(0, |d| d.live_buffers()),
        });

        let action = self
            .script
            .get(self.step)
            .copied()
            .unwrap_or(Step::Token(self.default_token));
        self.step += 1;
        if let Step::Fail = action {
            return Err("device lost".into());
        }

        let mut out = BTreeMap::new();
        out.insert(names::LOGITS.to_string(), self.logits(input_ids.len(), action)?);
        let seq = cache_seq_len.unwrap_or(0) + input_ids.len();
        for name in names::present_outputs(LAYERS) {
            let shape = Shape::new(vec![1, KV_HEADS, seq, HEAD_DIM]);
            let tensor = self.present(&name, shape)?;
            out.insert(name, tensor);
        }
        Ok(out)
    }

    fn end_profiling(&mut self) {
        self.profiles_flushed += 1;
    }
}

/// Two layers, two heads of width four, eos id 2.
pub fn config() -> ModelConfig {
    ModelConfig::from_json(&format!(
        r#"{{"hidden_size": {}, "num_attention_heads": {}, "num_hidden_layers": {}, "eos_token_id": {}}}"#,
        KV_HEADS * HEAD_DIM,
        KV_HEADS,
        LAYERS,
        EOS
    ))
    .unwrap()
}

pub fn load<F>(options: SessionOptions, build: F) -> Session<ScriptedExecutor>
where
    F: FnOnce(&ExecutorOptions) -> ScriptedExecutor,
{
    Session::load(config(), options, |opts| Ok(build(opts))).unwrap()
}

pub fn scripted(script: Vec<Step>) -> Session<ScriptedExecutor> {
    load(SessionOptions::default(), |opts| ScriptedExecutor::new(opts, script))
}
