use std::collections::BTreeMap;

use dr_tensor::Tensor;

use crate::cache::CacheStore;

/// The named tensors submitted to one evaluation step.
///
/// Plain inputs (`input_ids`, `position_ids`, `attention_mask`) are owned here;
/// cache inputs are owned by the embedded [`CacheStore`] and looked up through
/// it, so the executor always sees the store's current tensors without copies.
#[derive(Debug, Default)]
pub struct Feed {
    inputs: BTreeMap<String, Tensor>,
    cache: CacheStore,
}

impl Feed {
    pub fn new(cache: CacheStore) -> Self {
        Feed {
            inputs: BTreeMap::new(),
            cache,
        }
    }

    /// Set a plain input, releasing whatever was fed under that name before.
    pub fn set(&mut self, name: &str, tensor: Tensor) {
        if let Some(old) = self.inputs.insert(name.to_string(), tensor) {
            old.dispose();
        }
    }

    /// Look up an input by name, plain inputs first, then cache slots.
    pub fn get(&self, name: &str) -> Option<&Tensor> {
        self.inputs.get(name).or_else(|| self.cache.get(name))
    }

    pub fn cache(&self) -> &CacheStore {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut CacheStore {
        &mut self.cache
    }

    /// Every fed tensor, plain inputs followed by cache slots.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Tensor)> {
        self.inputs
            .iter()
            .map(|(name, t)| (name.as_str(), t))
            .chain(self.cache.iter())
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.iter().map(|(name, _)| name)
    }

    pub fn len(&self) -> usize {
        self.inputs.len() + self.cache.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Release every tensor, plain and cached, and leave the feed empty.
    /// Returns how many accelerator allocations were released.
    pub fn release(&mut self) -> usize {
        let inputs = std::mem::take(&mut self.inputs)
            .into_values()
            .map(Tensor::dispose)
            .filter(|released| *released)
            .count();
        inputs + self.cache.clear()
    }
}
