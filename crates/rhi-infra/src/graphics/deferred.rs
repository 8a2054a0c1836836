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

//! Deferred destruction of native objects.
//!
//! A native object may still be referenced by command buffers the GPU has not
//! finished. Instead of destroying it when its handle is dropped, the object is
//! stamped with the frame it was released in and destroyed once enough frames
//! have been submitted that no in-flight work can see it.

use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use rhi_core::native::{NativeObject, NativeObjectKind};
use rhi_core::NativeDevice;

use super::lock;

#[derive(Debug, Clone, Copy)]
struct Retired {
    object: NativeObject,
    frame: u64,
}

/// Holds released native objects until the GPU can no longer reference them.
pub struct DeferredDestroyQueue {
    native: Arc<dyn NativeDevice>,
    frame: AtomicU64,
    queues: Vec<Mutex<VecDeque<Retired>>>,
}

impl fmt::Debug for DeferredDestroyQueue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeferredDestroyQueue")
            .field("frame", &self.frame.load(Ordering::Relaxed))
            .field("pending", &self.pending())
            .finish()
    }
}

impl DeferredDestroyQueue {
    /// Creates an empty queue destroying objects through `native`.
    pub fn new(native: Arc<dyn NativeDevice>) -> Self {
        Self {
            native,
            frame: AtomicU64::new(0),
            queues: NativeObjectKind::ALL
                .iter()
                .map(|_| Mutex::new(VecDeque::new()))
                .collect(),
        }
    }

    /// The frame new releases are stamped with.
    pub fn current_frame(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    /// Schedules `object` for destruction, stamped with the current frame.
    pub fn release(&self, object: impl Into<NativeObject>) {
        let object = object.into();
        let frame = self.current_frame();
        log::trace!("Retiring {:?} at frame {}", object, frame);
        lock(&self.queues[object.kind().index()]).push_back(Retired { object, frame });
    }

    /// Advances to `current_frame` and destroys every object released at least
    /// `latency` frames earlier.
    ///
    /// Entries are stamped in non-decreasing frame order, so each queue is
    /// drained from the front until the first entry that is still too recent.
    pub fn update(&self, current_frame: u64, latency: u64) {
        self.frame.store(current_frame, Ordering::Release);
        let mut destroyed = 0usize;
        for queue in &self.queues {
            let mut queue = lock(queue);
            while let Some(front) = queue.front() {
                if current_frame.saturating_sub(front.frame) < latency {
                    break;
                }
                if let Some(retired) = queue.pop_front() {
                    self.native.destroy(retired.object);
                    destroyed += 1;
                }
            }
        }
        if destroyed > 0 {
            log::trace!("Destroyed {} retired native objects at frame {}", destroyed, current_frame);
        }
    }

    /// Destroys every pending object regardless of age. Only safe once the GPU is idle.
    pub fn destroy_all(&self) {
        for queue in &self.queues {
            for retired in lock(queue).drain(..) {
                self.native.destroy(retired.object);
            }
        }
    }

    /// Total objects awaiting destruction.
    pub fn pending(&self) -> usize {
        self.queues.iter().map(|q| lock(q).len()).sum()
    }

    /// Objects of `kind` awaiting destruction.
    pub fn pending_of(&self, kind: NativeObjectKind) -> usize {
        lock(&self.queues[kind.index()]).len()
    }

    /// Whether `object` is awaiting destruction.
    pub fn contains(&self, object: impl Into<NativeObject>) -> bool {
        let object = object.into();
        lock(&self.queues[object.kind().index()])
            .iter()
            .any(|r| r.object == object)
    }
}

impl Drop for DeferredDestroyQueue {
    fn drop(&mut self) {
        self.destroy_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::soft::SoftDevice;
    use rhi_core::api::BindFlags;
    use rhi_core::native::{MemoryKind, NativeBuffer, NativeBufferDesc};
    use rhi_core::ResourceMiscFlags;

    fn buffer(native: &SoftDevice) -> NativeBuffer {
        native
            .create_buffer(
                &NativeBufferDesc {
                    size: 16,
                    memory: MemoryKind::DeviceLocal,
                    bind_flags: BindFlags::VERTEX_BUFFER,
                    misc_flags: ResourceMiscFlags::empty(),
                    stride: 0,
                },
                None,
            )
            .unwrap()
    }

    #[test]
    fn test_objects_survive_until_latency_elapses() {
        // ARRANGE
        let soft = Arc::new(SoftDevice::new());
        let queue = DeferredDestroyQueue::new(soft.clone());
        let depth = 3;
        queue.update(10, depth);
        let object = buffer(&soft);

        // ACT
        queue.release(object);

        // ASSERT
        for frame in 10..13 {
            queue.update(frame, depth);
            assert!(soft.is_alive(object.0), "destroyed early at frame {frame}");
            assert!(queue.contains(object));
        }
        queue.update(13, depth);
        assert!(!soft.is_alive(object.0));
        assert_eq!(queue.pending(), 0);
    }

    #[test]
    fn test_queues_are_per_kind_and_ordered() {
        let soft = Arc::new(SoftDevice::new());
        let queue = DeferredDestroyQueue::new(soft.clone());
        let first = buffer(&soft);
        let second = buffer(&soft);

        queue.release(first);
        queue.update(1, 2);
        queue.release(second);
        assert_eq!(queue.pending_of(NativeObjectKind::Buffer), 2);
        assert_eq!(queue.pending_of(NativeObjectKind::Texture), 0);

        queue.update(2, 2);
        assert!(!soft.is_alive(first.0));
        assert!(soft.is_alive(second.0));

        queue.update(3, 2);
        assert!(!soft.is_alive(second.0));
    }

    #[test]
    fn test_drop_destroys_everything() {
        let soft = Arc::new(SoftDevice::new());
        let object = buffer(&soft);
        {
            let queue = DeferredDestroyQueue::new(soft.clone());
            queue.release(object);
        }
        assert!(!soft.is_alive(object.0));
    }
}
