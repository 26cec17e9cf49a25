use std::fmt;

use crate::error::{Result, TensorError};

/// Dimension sizes of a tensor, outermost first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Shape {
    dims: Vec<usize>,
}

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Shape { dims }
    }

    pub fn from_slice(dims: &[usize]) -> Self {
        Shape::new(dims.to_vec())
    }

    /// Rank.
    pub fn ndim(&self) -> usize {
        self.dims.len()
    }

    /// Element count. Zero when any axis has zero extent, as an empty
    /// cache `[1, heads, 0, head_dim]` does.
    pub fn numel(&self) -> usize {
        self.dims.iter().product()
    }

    /// Extent of `axis`.
    ///
    /// # Panics
    /// Panics if `axis >= ndim()`; use [`Shape::try_dim`] for untrusted axes.
    pub fn dim(&self, axis: usize) -> usize {
        self.dims[axis]
    }

    pub fn try_dim(&self, axis: usize) -> Result<usize> {
        self.dims.get(axis).copied().ok_or(TensorError::InvalidAxis {
            axis,
            ndim: self.ndim(),
        })
    }

    pub fn dims(&self) -> &[usize] {
        &self.dims
    }

    /// This shape with `axis` resized to `len`, e.g. a cache grown along its
    /// sequence axis.
    pub fn with_dim(&self, axis: usize, len: usize) -> Result<Shape> {
        self.try_dim(axis)?;
        let mut dims = self.dims.clone();
        dims[axis] = len;
        Ok(Shape::new(dims))
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let parts: Vec<String> = self.dims.iter().map(usize::to_string).collect();
        write!(f, "[{}]", parts.join(", "))
    }
}

impl From<Vec<usize>> for Shape {
    fn from(dims: Vec<usize>) -> Self {
        Shape::new(dims)
    }
}

impl From<&[usize]> for Shape {
    fn from(dims: &[usize]) -> Self {
        Shape::from_slice(dims)
    }
}
