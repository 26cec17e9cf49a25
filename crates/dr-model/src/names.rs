//! Input/output names of a decoder exported with past key/value inputs.
//!
//! Cache inputs are `past_key_values.{layer}.key|value`; the executor answers
//! each step with `present.{layer}.key|value`. Mapping an output to its slot
//! swaps the `present` prefix for `past_key_values`.

pub const INPUT_IDS: &str = "input_ids";
pub const POSITION_IDS: &str = "position_ids";
pub const ATTENTION_MASK: &str = "attention_mask";
pub const LOGITS: &str = "logits";

pub const PAST_PREFIX: &str = "past_key_values";
pub const PRESENT_PREFIX: &str = "present";

pub fn past_key(layer: usize) -> String {
    format!("{PAST_PREFIX}.{layer}.key")
}

pub fn past_value(layer: usize) -> String {
    format!("{PAST_PREFIX}.{layer}.value")
}

pub fn present_key(layer: usize) -> String {
    format!("{PRESENT_PREFIX}.{layer}.key")
}

pub fn present_value(layer: usize) -> String {
    format!("{PRESENT_PREFIX}.{layer}.value")
}

/// All cache slot names for `num_layers` layers, key before value.
pub fn cache_slots(num_layers: usize) -> impl Iterator<Item = String> {
    (0..num_layers).flat_map(|layer| [past_key(layer), past_value(layer)])
}

/// All present-state output names for `num_layers` layers.
pub fn present_outputs(num_layers: usize) -> impl Iterator<Item = String> {
    (0..num_layers).flat_map(|layer| [present_key(layer), present_value(layer)])
}

pub fn is_present(name: &str) -> bool {
    name.starts_with(PRESENT_PREFIX)
}

/// Cache slot fed by a present-state output, or `None` for other outputs.
pub fn past_name_for(output: &str) -> Option<String> {
    output
        .strip_prefix(PRESENT_PREFIX)
        .map(|rest| format!("{PAST_PREFIX}{rest}"))
}
