use half::f16;

use crate::dtype::DType;
use crate::error::{Result, TensorError};

/// Host-side tensor storage.
#[derive(Debug, Clone, PartialEq)]
pub enum HostStorage {
    /// 32-bit floating point storage.
    F32(Vec<f32>),
    /// 16-bit floating point storage.
    F16(Vec<f16>),
    /// 64-bit integer storage (token ids, positions, attention masks).
    I64(Vec<i64>),
}

impl HostStorage {
    /// Number of elements in this storage.
    pub fn len(&self) -> usize {
        match self {
            HostStorage::F32(v) => v.len(),
            HostStorage::F16(v) => v.len(),
            HostStorage::I64(v) => v.len(),
        }
    }

    /// Returns true if the storage contains no elements.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the dtype of this storage.
    pub fn dtype(&self) -> DType {
        match self {
            HostStorage::F32(_) => DType::F32,
            HostStorage::F16(_) => DType::F16,
            HostStorage::I64(_) => DType::I64,
        }
    }

    /// Create zero-filled storage for the given dtype and element count.
    pub fn zeros(dtype: DType, n: usize) -> Self {
        match dtype {
            DType::F32 => HostStorage::F32(vec![0.0; n]),
            DType::F16 => HostStorage::F16(vec![f16::ZERO; n]),
            DType::I64 => HostStorage::I64(vec![0; n]),
        }
    }

    /// Returns the data as an f32 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not F32.
    pub fn as_f32_slice(&self) -> Result<&[f32]> {
        match self {
            HostStorage::F32(v) => Ok(v.as_slice()),
            other => Err(mismatch(DType::F32, other.dtype())),
        }
    }

    /// Returns the data as an i64 slice.
    ///
    /// # Errors
    /// Returns an error if the storage is not I64.
    pub fn as_i64_slice(&self) -> Result<&[i64]> {
        match self {
            HostStorage::I64(v) => Ok(v.as_slice()),
            other => Err(mismatch(DType::I64, other.dtype())),
        }
    }

    /// Reads element `i` of a floating point storage widened to f32.
    ///
    /// # Errors
    /// Returns an error for integer storage.
    ///
    /// # Panics
    /// Panics if `i >= len()`.
    pub fn float_at(&self, i: usize) -> Result<f32> {
        match self {
            HostStorage::F32(v) => Ok(v[i]),
            HostStorage::F16(v) => Ok(v[i].to_f32()),
            HostStorage::I64(_) => Err(mismatch(DType::F32, DType::I64)),
        }
    }
}

fn mismatch(expected: DType, got: DType) -> TensorError {
    TensorError::DTypeMismatch {
        expected: expected.to_string(),
        got: got.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_zeros_per_dtype() {
        assert_eq!(HostStorage::zeros(DType::F32, 3), HostStorage::F32(vec![0.0; 3]));
        assert_eq!(HostStorage::zeros(DType::I64, 2), HostStorage::I64(vec![0, 0]));
        let h = HostStorage::zeros(DType::F16, 4);
        assert_eq!(h.dtype(), DType::F16);
        assert_eq!(h.len(), 4);
    }

    #[test]
    fn test_empty() {
        assert!(HostStorage::zeros(DType::F16, 0).is_empty());
    }

    #[test]
    fn test_slice_dtype_checks() {
        let ids = HostStorage::I64(vec![5, 9, 2]);
        assert_eq!(ids.as_i64_slice().unwrap(), &[5, 9, 2]);
        assert!(ids.as_f32_slice().is_err());
        assert!(ids.float_at(0).is_err());
    }

    #[test]
    fn test_float_at_widens_half() {
        let h = HostStorage::F16(vec![f16::from_f32(1.5), f16::from_f32(-0.25)]);
        assert_relative_eq!(h.float_at(0).unwrap(), 1.5);
        assert_relative_eq!(h.float_at(1).unwrap(), -0.25);
    }
}
