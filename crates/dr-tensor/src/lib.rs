//! `dr-tensor` - Tensors for decode-runtime.
//!
//! This crate provides:
//! - A `Tensor` type whose storage is either host memory or an accelerator buffer
//! - A `DeviceMemory` trait for accelerator allocators, plus `TrackedDevice`
//! - `DeviceBuffer`, which releases its allocation when dropped
//! - Shape utilities and data type definitions (F32, F16, I64)

pub mod device;
pub mod dtype;
pub mod error;
pub mod shape;
pub mod storage;
pub mod tensor;

// Re-export primary types at the crate root for convenience.
pub use device::{BufferId, DeviceBuffer, DeviceMemory, TrackedDevice};
pub use dtype::DType;
pub use error::{Result, TensorError};
pub use shape::Shape;
pub use storage::HostStorage;
pub use tensor::{Location, Storage, Tensor};
