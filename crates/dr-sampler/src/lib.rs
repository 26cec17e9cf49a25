pub mod error;
pub mod greedy;
pub mod selector;

pub use error::{Result, SelectError};
pub use greedy::GreedySelector;
pub use selector::TokenSelector;
