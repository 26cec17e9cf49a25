use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{trace, warn};

use crate::error::{Result, TensorError};

/// Opaque handle to an allocation owned by a [`DeviceMemory`].
pub type BufferId = u64;

/// Trait for accelerator memory allocators (WebGPU, CUDA, Metal, etc.).
///
/// Allocations are never garbage collected: every successful `allocate` must
/// be matched by exactly one `release`. [`DeviceBuffer`] enforces that pairing
/// through ownership, so callers normally never call `release` directly.
pub trait DeviceMemory: Send + Sync + Debug {
    /// Returns the name of this device (e.g., "webgpu", "cuda:0").
    fn name(&self) -> &str;

    /// Reserve `bytes` of device memory and return its handle.
    fn allocate(&self, bytes: usize) -> Result<BufferId>;

    /// Return an allocation to the device.
    fn release(&self, id: BufferId);

    /// Number of allocations currently held.
    fn live_buffers(&self) -> usize;
}

/// An accelerator allocation that is released when dropped.
#[derive(Debug)]
pub struct DeviceBuffer {
    id: BufferId,
    bytes: usize,
    device: Arc<dyn DeviceMemory>,
}

impl DeviceBuffer {
    /// Allocate a new buffer of `bytes` on `device`.
    pub fn allocate(device: &Arc<dyn DeviceMemory>, bytes: usize) -> Result<Self> {
        let id = device.allocate(bytes)?;
        trace!(device = device.name(), id, bytes, "device buffer allocated");
        Ok(DeviceBuffer {
            id,
            bytes,
            device: Arc::clone(device),
        })
    }

    /// Take ownership of an allocation that was made outside this crate,
    /// typically by an executor handing back an output it placed on the device.
    pub fn adopt(device: Arc<dyn DeviceMemory>, id: BufferId, bytes: usize) -> Self {
        DeviceBuffer { id, bytes, device }
    }

    pub fn id(&self) -> BufferId {
        self.id
    }

    pub fn bytes(&self) -> usize {
        self.bytes
    }

    pub fn device_name(&self) -> &str {
        self.device.name()
    }
}

impl Drop for DeviceBuffer {
    fn drop(&mut self) {
        trace!(device = self.device.name(), id = self.id, "device buffer released");
        self.device.release(self.id);
    }
}

/// Bookkeeping accelerator: hands out ids, tracks live allocations and an
/// optional byte budget, but holds no real memory.
///
/// Used as the device for executors that keep their own storage, and by tests
/// that assert the no-leak invariant.
#[derive(Debug)]
pub struct TrackedDevice {
    name: String,
    capacity: Option<usize>,
    next_id: AtomicU64,
    live: Mutex<HashMap<BufferId, usize>>,
}

impl TrackedDevice {
    /// Create an unbounded tracked device.
    pub fn new(name: impl Into<String>) -> Self {
        TrackedDevice {
            name: name.into(),
            capacity: None,
            next_id: AtomicU64::new(1),
            live: Mutex::new(HashMap::new()),
        }
    }

    /// Create a tracked device that refuses allocations beyond `bytes` in total.
    pub fn with_capacity(name: impl Into<String>, bytes: usize) -> Self {
        TrackedDevice {
            capacity: Some(bytes),
            ..TrackedDevice::new(name)
        }
    }

    /// Total bytes currently allocated.
    pub fn live_bytes(&self) -> usize {
        self.lock().values().sum()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<BufferId, usize>> {
        self.live.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl DeviceMemory for TrackedDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn allocate(&self, bytes: usize) -> Result<BufferId> {
        let mut live = self.lock();
        if let Some(capacity) = self.capacity {
            let used: usize = live.values().sum();
            if used + bytes > capacity {
                return Err(TensorError::Allocation {
                    device: self.name.clone(),
                    bytes,
                    reason: format!("{} of {} bytes in use", used, capacity),
                });
            }
        }
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        live.insert(id, bytes);
        Ok(id)
    }

    fn release(&self, id: BufferId) {
        if self.lock().remove(&id).is_none() {
            warn!(device = %self.name, id, "release of unknown device buffer");
        }
    }

    fn live_buffers(&self) -> usize {
        self.lock().len()
    }
}
