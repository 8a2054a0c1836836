// Copyright 2025 eraflo
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Per-frame linear allocation of host-visible upload memory.

use rhi_core::api::{GpuAllocation, GpuBuffer};
use rhi_core::RhiError;

use super::resources::ResourceStore;

/// A bump allocator over one upload buffer, reset once per frame.
///
/// When a request does not fit, the buffer is replaced by one of
/// `(capacity + size + 1) * 2` bytes and allocation restarts at offset zero.
/// The old buffer stays alive for as long as earlier allocations reference it
/// and is then handed to deferred destruction.
#[derive(Debug)]
pub struct LinearAllocator {
    buffer: Option<GpuBuffer>,
    initial_capacity: u64,
    capacity: u64,
    offset: u64,
    reallocations: u32,
}

impl LinearAllocator {
    /// Creates an allocator whose first buffer will hold `initial_capacity` bytes.
    /// No memory is allocated until the first request.
    pub fn new(initial_capacity: u64) -> Self {
        Self {
            buffer: None,
            initial_capacity,
            capacity: 0,
            offset: 0,
            reallocations: 0,
        }
    }

    pub(crate) fn allocate(
        &mut self,
        store: &ResourceStore,
        size: u64,
        alignment: u64,
    ) -> Result<GpuAllocation, RhiError> {
        let alignment = alignment.max(1);
        let mut start = self.offset.next_multiple_of(alignment);
        let buffer = match &self.buffer {
            Some(buffer) if start + size <= self.capacity => buffer.clone(),
            Some(_) => {
                let capacity = (self.capacity + size + 1) * 2;
                log::debug!(
                    "Transient buffer of {} bytes cannot fit {} more; reallocating to {} bytes",
                    self.capacity,
                    size,
                    capacity
                );
                self.replace(store, capacity)?;
                self.reallocations += 1;
                start = 0;
                self.current()?
            }
            None => {
                self.replace(store, self.initial_capacity.max(size))?;
                start = 0;
                self.current()?
            }
        };
        self.offset = start + size;
        Ok(GpuAllocation {
            buffer,
            offset: start,
            size,
        })
    }

    fn replace(&mut self, store: &ResourceStore, capacity: u64) -> Result<(), RhiError> {
        self.buffer = Some(store.create_upload_buffer(capacity.max(1))?);
        self.capacity = capacity.max(1);
        self.offset = 0;
        Ok(())
    }

    fn current(&self) -> Result<GpuBuffer, RhiError> {
        self.buffer.clone().ok_or(RhiError::InvalidHandle)
    }

    /// Makes the whole buffer available again. Only valid once the GPU has
    /// finished with every allocation made since the previous reset.
    pub fn reset(&mut self) {
        self.offset = 0;
    }

    /// Bytes in the current buffer, zero before the first allocation.
    pub fn capacity(&self) -> u64 {
        self.capacity
    }

    /// Bytes handed out from the current buffer since the last reset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// How many times the buffer was replaced by a larger one.
    pub fn reallocations(&self) -> u32 {
        self.reallocations
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::backend::Backend;
    use crate::graphics::deferred::DeferredDestroyQueue;
    use crate::graphics::dx12::Dx12Backend;
    use crate::graphics::soft::SoftDevice;
    use rhi_core::NativeDevice;
    use std::sync::Arc;

    fn store() -> (Arc<SoftDevice>, ResourceStore) {
        let soft = Arc::new(SoftDevice::new());
        let native: Arc<dyn NativeDevice> = soft.clone();
        let destroyer = Arc::new(DeferredDestroyQueue::new(native.clone()));
        let backend: Arc<dyn Backend> = Arc::new(Dx12Backend);
        (soft, ResourceStore::new(native, destroyer, backend))
    }

    #[test]
    fn test_first_allocation_creates_the_buffer() {
        let (_soft, store) = store();
        let mut allocator = LinearAllocator::new(1024);
        assert_eq!(allocator.capacity(), 0);

        let a = allocator.allocate(&store, 100, 256).unwrap();
        let b = allocator.allocate(&store, 100, 256).unwrap();

        assert_eq!(allocator.capacity(), 1024);
        assert_eq!(a.offset, 0);
        assert_eq!(b.offset, 256);
        assert!(a.buffer.same_resource(&b.buffer));
        assert_eq!(allocator.reallocations(), 0);
    }

    #[test]
    fn test_oversized_first_request_fits() {
        let (_soft, store) = store();
        let mut allocator = LinearAllocator::new(64);
        let a = allocator.allocate(&store, 1000, 16).unwrap();
        assert_eq!(a.offset, 0);
        assert_eq!(allocator.capacity(), 1000);
    }

    #[test]
    fn test_overflow_reallocates_once_and_restarts() {
        // --- ARRANGE ---
        let (_soft, store) = store();
        let mut allocator = LinearAllocator::new(512);
        let first = allocator.allocate(&store, 400, 4).unwrap();

        // --- ACT ---
        let second = allocator.allocate(&store, 200, 4).unwrap();
        let third = allocator.allocate(&store, 200, 4).unwrap();

        // --- ASSERT ---
        assert_eq!(allocator.reallocations(), 1);
        assert_eq!(allocator.capacity(), (512 + 200 + 1) * 2);
        assert_eq!(second.offset, 0);
        assert_eq!(third.offset, 200);
        assert!(!first.buffer.same_resource(&second.buffer));
        assert!(second.buffer.same_resource(&third.buffer));
    }

    #[test]
    fn test_reset_reuses_the_buffer() {
        let (_soft, store) = store();
        let mut allocator = LinearAllocator::new(256);
        let a = allocator.allocate(&store, 128, 4).unwrap();
        allocator.reset();
        let b = allocator.allocate(&store, 128, 4).unwrap();
        assert_eq!(b.offset, 0);
        assert!(a.buffer.same_resource(&b.buffer));
    }

    #[test]
    fn test_replaced_buffer_is_deferred() {
        let (soft, store) = store();
        let mut allocator = LinearAllocator::new(16);
        let first = allocator.allocate(&store, 16, 1).unwrap();
        allocator.allocate(&store, 16, 1).unwrap();
        let destroyer = store.destroyer().clone();

        drop(first);

        assert_eq!(destroyer.pending(), 1);
        assert_eq!(soft.live_objects(), 2);
    }
}
