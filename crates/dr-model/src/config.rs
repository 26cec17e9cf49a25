use std::path::Path;

use dr_tensor::Shape;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ModelError, Result};

/// End-of-sequence id(s) as written in `config.json`: either a single id or a list.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EosTokenIds {
    Single(u32),
    Multiple(Vec<u32>),
}

impl EosTokenIds {
    pub fn to_vec(&self) -> Vec<u32> {
        match self {
            EosTokenIds::Single(id) => vec![*id],
            EosTokenIds::Multiple(ids) => ids.clone(),
        }
    }
}

/// Configuration for a causal language model, parsed from its `config.json`.
///
/// Only the fields the decoding loop needs are read; everything else in the
/// file is ignored.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Number of transformer layers.
    pub num_hidden_layers: usize,
    /// Embedding dimension / hidden size.
    pub hidden_size: usize,
    /// Number of attention heads for queries.
    pub num_attention_heads: usize,
    /// Number of attention heads for keys/values (GQA). Falls back to
    /// `num_attention_heads` when absent.
    #[serde(default)]
    pub num_key_value_heads: Option<usize>,
    /// Terminal token id(s).
    pub eos_token_id: EosTokenIds,
    /// Vocabulary size, if the file states it.
    #[serde(default)]
    pub vocab_size: Option<usize>,
}

impl ModelConfig {
    /// Parse and validate a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<ModelConfig> {
        let config: ModelConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Read, parse and validate a `config.json` file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<ModelConfig> {
        let path = path.as_ref();
        debug!(path = %path.display(), "reading model config");
        let json = std::fs::read_to_string(path)?;
        Self::from_json(&json)
    }

    /// Check the invariants the cache layout depends on.
    pub fn validate(&self) -> Result<()> {
        if self.num_hidden_layers == 0 {
            return Err(invalid("num_hidden_layers must be positive"));
        }
        if self.num_attention_heads == 0 {
            return Err(invalid("num_attention_heads must be positive"));
        }
        if self.kv_heads() == 0 {
            return Err(invalid("num_key_value_heads must be positive"));
        }
        if self.hidden_size == 0 || self.hidden_size % self.num_attention_heads != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "hidden_size {} is not a positive multiple of num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        if self.eos_token_ids().is_empty() {
            return Err(invalid("eos_token_id list is empty"));
        }
        Ok(())
    }

    pub fn kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }

    /// Dimension of each attention head (hidden_size / num_attention_heads).
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Shape of an empty per-layer cache tensor: `[1, kv_heads, 0, head_dim]`.
    pub fn cache_shape(&self) -> Shape {
        Shape::new(vec![1, self.kv_heads(), 0, self.head_dim()])
    }

    pub fn eos_token_ids(&self) -> Vec<u32> {
        self.eos_token_id.to_vec()
    }
}

fn invalid(msg: &str) -> ModelError {
    ModelError::InvalidConfig(msg.to_string())
}
