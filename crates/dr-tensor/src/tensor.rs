use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use half::f16;

use crate::device::{DeviceBuffer, DeviceMemory};
use crate::dtype::DType;
use crate::error::{Result, TensorError};
use crate::shape::Shape;
use crate::storage::HostStorage;

/// Where a tensor's elements live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Location {
    /// General host memory, directly addressable.
    Host,
    /// Accelerator memory; must be released explicitly.
    Accelerator,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Location::Host => f.write_str("host"),
            Location::Accelerator => f.write_str("accelerator"),
        }
    }
}

impl FromStr for Location {
    type Err = TensorError;

    /// Accepts both the plain names and the executor spellings
    /// (`cpu`, `gpu-buffer`).
    fn from_str(s: &str) -> Result<Self> {
        match s {
            "host" | "cpu" => Ok(Location::Host),
            "accelerator" | "gpu-buffer" | "gpu" => Ok(Location::Accelerator),
            other => Err(TensorError::UnknownLocation(other.to_string())),
        }
    }
}

/// Backing memory of a tensor.
#[derive(Debug)]
pub enum Storage {
    Host(HostStorage),
    Device(DeviceBuffer),
}

/// A typed, shaped buffer with an explicit storage location.
///
/// Tensors are deliberately not `Clone`: each one has exactly one owner, and
/// an accelerator-resident tensor gives its allocation back to the device when
/// that owner drops it or calls [`Tensor::dispose`].
#[derive(Debug)]
pub struct Tensor {
    storage: Storage,
    shape: Shape,
    dtype: DType,
}

impl Tensor {
    /// Create a host tensor from existing storage.
    ///
    /// # Errors
    /// Returns an error if the storage length does not match `shape.numel()`.
    pub fn from_host(storage: HostStorage, shape: Shape) -> Result<Self> {
        if storage.len() != shape.numel() {
            return Err(TensorError::LengthMismatch {
                len: storage.len(),
                shape: shape.dims().to_vec(),
                numel: shape.numel(),
            });
        }
        Ok(Tensor {
            dtype: storage.dtype(),
            storage: Storage::Host(storage),
            shape,
        })
    }

    pub fn from_f32(data: Vec<f32>, shape: Shape) -> Result<Self> {
        Self::from_host(HostStorage::F32(data), shape)
    }

    pub fn from_f16(data: Vec<f16>, shape: Shape) -> Result<Self> {
        Self::from_host(HostStorage::F16(data), shape)
    }

    pub fn from_i64(data: Vec<i64>, shape: Shape) -> Result<Self> {
        Self::from_host(HostStorage::I64(data), shape)
    }

    /// Create a zero-filled host tensor. With a zero-extent axis this is the
    /// empty placeholder fed for a cache that has not seen any tokens yet.
    pub fn zeros(dtype: DType, shape: Shape) -> Self {
        Tensor {
            storage: Storage::Host(HostStorage::zeros(dtype, shape.numel())),
            shape,
            dtype,
        }
    }

    /// Allocate an accelerator-resident tensor on `device`.
    pub fn on_device(device: &Arc<dyn DeviceMemory>, dtype: DType, shape: Shape) -> Result<Self> {
        let buffer = DeviceBuffer::allocate(device, shape.numel() * dtype.size_in_bytes())?;
        Ok(Self::from_device_buffer(buffer, dtype, shape))
    }

    /// Wrap an existing accelerator allocation.
    pub fn from_device_buffer(buffer: DeviceBuffer, dtype: DType, shape: Shape) -> Self {
        Tensor {
            storage: Storage::Device(buffer),
            shape,
            dtype,
        }
    }

    /// Returns a reference to the tensor's shape.
    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    /// Returns the tensor's data type.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    pub fn numel(&self) -> usize {
        self.shape.numel()
    }

    pub fn location(&self) -> Location {
        match self.storage {
            Storage::Host(_) => Location::Host,
            Storage::Device(_) => Location::Accelerator,
        }
    }

    pub fn is_accelerator(&self) -> bool {
        self.location() == Location::Accelerator
    }

    /// Returns the underlying storage reference.
    pub fn storage(&self) -> &Storage {
        &self.storage
    }

    /// Returns the host storage.
    ///
    /// # Errors
    /// Returns [`TensorError::NotHostResident`] for accelerator tensors.
    pub fn host(&self) -> Result<&HostStorage> {
        match &self.storage {
            Storage::Host(h) => Ok(h),
            Storage::Device(_) => Err(TensorError::NotHostResident(Location::Accelerator)),
        }
    }

    /// Returns the host data of an I64 tensor.
    pub fn i64_data(&self) -> Result<&[i64]> {
        self.host()?.as_i64_slice()
    }

    /// Release this tensor now. Returns true if an accelerator allocation was
    /// given back to its device.
    pub fn dispose(self) -> bool {
        let released = self.is_accelerator();
        drop(self);
        released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::TrackedDevice;

    #[test]
    fn test_from_i64() {
        let t = Tensor::from_i64(vec![5, 9, 2], Shape::new(vec![1, 3])).unwrap();
        assert_eq!(t.dtype(), DType::I64);
        assert_eq!(t.location(), Location::Host);
        assert_eq!(t.i64_data().unwrap(), &[5, 9, 2]);
    }

    #[test]
    fn test_length_mismatch() {
        let err = Tensor::from_f32(vec![1.0, 2.0], Shape::new(vec![1, 3])).unwrap_err();
        assert!(matches!(err, TensorError::LengthMismatch { len: 2, numel: 3, .. }));
    }

    #[test]
    fn test_empty_kv_placeholder() {
        let t = Tensor::zeros(DType::F16, Shape::new(vec![1, 4, 0, 16]));
        assert_eq!(t.numel(), 0);
        assert!(t.host().unwrap().is_empty());
        assert!(!t.dispose());
    }

    #[test]
    fn test_device_tensor_dispose() {
        let tracked = Arc::new(TrackedDevice::new("gpu"));
        let dev: Arc<dyn DeviceMemory> = tracked.clone();
        let t = Tensor::on_device(&dev, DType::F16, Shape::new(vec![1, 2, 3, 4])).unwrap();
        assert!(t.is_accelerator());
        assert_eq!(tracked.live_bytes(), 48);
        assert!(matches!(t.host(), Err(TensorError::NotHostResident(_))));
        assert!(t.dispose());
        assert_eq!(tracked.live_buffers(), 0);
    }

    #[test]
    fn test_location_parse() {
        assert_eq!("cpu".parse::<Location>().unwrap(), Location::Host);
        assert_eq!("gpu-buffer".parse::<Location>().unwrap(), Location::Accelerator);
        assert!("texture".parse::<Location>().is_err());
    }
}
