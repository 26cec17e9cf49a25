use dr_tensor::{DType, Location};
use serde::{Deserialize, Serialize};

/// Where the executor should leave present-state outputs, and therefore where
/// cache tensors live between steps.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CachePlacement {
    /// Copy present-state back to host memory after every step.
    #[default]
    Host,
    /// Keep present-state on the accelerator; old entries are released on replace.
    Accelerator,
}

impl From<CachePlacement> for Location {
    fn from(placement: CachePlacement) -> Self {
        match placement {
            CachePlacement::Host => Location::Host,
            CachePlacement::Accelerator => Location::Accelerator,
        }
    }
}

/// Session-wide settings, fixed at load time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionOptions {
    /// Execution provider handed to the executor ("webgpu", "wasm", ...).
    pub provider: String,
    /// Use float16 cache tensors. Ignored for the `wasm` provider, which only
    /// runs float32.
    pub fp16: bool,
    /// Collect executor profiles. Progress callbacks are suppressed while on.
    pub profiling: bool,
    pub verbose: bool,
    pub cache_placement: CachePlacement,
    /// Token ids that end generation in addition to the model's eos ids.
    pub additional_terminal_ids: Vec<u32>,
    /// Force feeding `position_ids` on or off. `None` follows the inputs the
    /// executor declares.
    pub need_position_ids: Option<bool>,
    /// Token budget used when a call does not set one.
    pub default_max_tokens: usize,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            provider: "webgpu".to_string(),
            fp16: true,
            profiling: false,
            verbose: false,
            cache_placement: CachePlacement::Host,
            additional_terminal_ids: Vec::new(),
            need_position_ids: None,
            default_max_tokens: 256,
        }
    }
}

impl SessionOptions {
    pub fn cache_dtype(&self) -> DType {
        if self.fp16 && self.provider != "wasm" {
            DType::F16
        } else {
            DType::F32
        }
    }
}

/// Per-call settings for `generate`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GenerateOptions {
    /// Upper bound on the total output length, prompt included. Zero or
    /// `None` selects the session default.
    pub max_tokens: Option<usize>,
}

impl GenerateOptions {
    pub fn with_max_tokens(max_tokens: usize) -> Self {
        Self {
            max_tokens: Some(max_tokens),
        }
    }

    pub(crate) fn resolve_max_tokens(&self, default: usize) -> usize {
        self.max_tokens.filter(|n| *n > 0).unwrap_or(default)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let opts = SessionOptions::default();
        assert_eq!(opts.provider, "webgpu");
        assert_eq!(opts.cache_dtype(), DType::F16);
        assert_eq!(opts.cache_placement, CachePlacement::Host);
        assert_eq!(opts.default_max_tokens, 256);
    }

    #[test]
    fn test_wasm_forces_f32() {
        let opts = SessionOptions {
            provider: "wasm".into(),
            ..SessionOptions::default()
        };
        assert_eq!(opts.cache_dtype(), DType::F32);
    }

    #[test]
    fn test_deserialize_partial() {
        let opts: SessionOptions = serde_json::from_str(
            r#"{"cache_placement": "accelerator", "additional_terminal_ids": [32007], "fp16": false}"#,
        )
        .unwrap();
        assert_eq!(opts.cache_placement, CachePlacement::Accelerator);
        assert_eq!(opts.additional_terminal_ids, vec![32007]);
        assert_eq!(opts.cache_dtype(), DType::F32);
        assert_eq!(opts.provider, "webgpu");
        assert_eq!(Location::from(opts.cache_placement), Location::Accelerator);
    }

    #[test]
    fn test_max_tokens_resolution() {
        assert_eq!(GenerateOptions::default().resolve_max_tokens(256), 256);
        assert_eq!(GenerateOptions::with_max_tokens(0).resolve_max_tokens(256), 256);
        assert_eq!(GenerateOptions::with_max_tokens(6).resolve_max_tokens(256), 6);
    }
}
