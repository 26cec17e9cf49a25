use std::collections::BTreeMap;

use dr_tensor::{DType, Location, Shape, Tensor};
use tracing::debug;

use crate::error::{ModelError, Result};
use crate::names;

/// Key-Value cache for transformer attention layers.
///
/// Holds one tensor per layer for keys and one for values, keyed by the
/// executor input name they are fed under (`past_key_values.{layer}.key`).
/// The store owns these tensors outright; the feed lends them to the executor
/// by reference and each step's present-state outputs are moved in through
/// [`CacheStore::replace`].
///
/// Layout for each slot: `[1, kv_heads, seq_len, head_dim]`, where `seq_len`
/// starts at 0 after a reset and grows by the number of tokens fed per step.
#[derive(Debug)]
pub struct CacheStore {
    slots: BTreeMap<String, Tensor>,
    /// Where replacement tensors are expected to live.
    placement: Location,
    /// Empty-extent dims and element type from the last reset.
    layout: Option<(Shape, DType)>,
}

impl CacheStore {
    /// Create an empty store whose entries must live at `placement`.
    pub fn new(placement: Location) -> Self {
        CacheStore {
            slots: BTreeMap::new(),
            placement,
            layout: None,
        }
    }

    pub fn placement(&self) -> Location {
        self.placement
    }

    /// Release every entry, then populate `num_layers * 2` empty-extent host
    /// tensors of `dtype` with shape `dims` (`[1, heads, 0, head_dim]`).
    pub fn reset(&mut self, num_layers: usize, dims: &Shape, dtype: DType) -> Result<()> {
        if dims.ndim() != 4 || dims.dim(2) != 0 {
            return Err(ModelError::InvalidConfig(format!(
                "cache dims must be [batch, heads, 0, head_dim], got {}",
                dims
            )));
        }
        let released = self.clear();
        self.layout = Some((dims.clone(), dtype));
        for name in names::cache_slots(num_layers) {
            self.slots.insert(name, Tensor::zeros(dtype, dims.clone()));
        }
        debug!(
            slots = self.slots.len(),
            released,
            %dtype,
            dims = %dims,
            "cache store reset"
        );
        Ok(())
    }

    /// Swap the entry named `name` for `tensor`, releasing the old entry.
    ///
    /// # Errors
    /// - [`ModelError::PlacementMismatch`] if `tensor` is not where the
    ///   configured placement says cache tensors live.
    /// - [`ModelError::CacheShapeMismatch`] if `tensor` does not have the
    ///   dtype given at reset, or differs from the reset dims on any axis
    ///   other than the sequence axis 2.
    /// - [`ModelError::UnknownCacheSlot`] if there is no such slot.
    ///
    /// On error the store is unchanged and `tensor` is released.
    pub fn replace(&mut self, name: &str, tensor: Tensor) -> Result<()> {
        if tensor.location() != self.placement {
            return Err(ModelError::PlacementMismatch {
                name: name.to_string(),
                expected: self.placement,
                got: tensor.location(),
            });
        }
        self.check_layout(name, &tensor)?;
        let slot = self
            .slots
            .get_mut(name)
            .ok_or_else(|| ModelError::UnknownCacheSlot(name.to_string()))?;
        let old = std::mem::replace(slot, tensor);
        old.dispose();
        Ok(())
    }

    fn check_layout(&self, name: &str, tensor: &Tensor) -> Result<()> {
        let Some((dims, dtype)) = &self.layout else {
            return Ok(());
        };
        let got = tensor.shape();
        let fits = tensor.dtype() == *dtype
            && got.ndim() == dims.ndim()
            && (0..dims.ndim()).all(|axis| axis == 2 || got.dim(axis) == dims.dim(axis));
        if fits {
            Ok(())
        } else {
            Err(ModelError::CacheShapeMismatch {
                name: name.to_string(),
                expected_dtype: *dtype,
                expected_dims: dims.clone(),
                got_dtype: tensor.dtype(),
                got_dims: got.clone(),
            })
        }
    }

    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.slots.get(name)
    }

    /// Number of cache entries.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Number of entries currently held in accelerator memory.
    pub fn accelerator_resident(&self) -> usize {
        self.slots.values().filter(|t| t.is_accelerator()).count()
    }

    /// Sequence extent of the cached state (axis 2 of the first slot).
    pub fn seq_len(&self) -> Option<usize> {
        self.slots
            .values()
            .next()
            .and_then(|t| t.shape().try_dim(2).ok())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.slots.iter().map(|(name, t)| (name.as_str(), t))
    }

    /// Drop every entry. Returns how many accelerator allocations were released.
    pub fn clear(&mut self) -> usize {
        std::mem::take(&mut self.slots)
            .into_values()
            .map(Tensor::dispose)
            .filter(|released| *released)
            .count()
    }
}

impl Default for CacheStore {
    fn default() -> Self {
        CacheStore::new(Location::Host)
    }
}
