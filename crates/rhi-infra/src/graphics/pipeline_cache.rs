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

//! The device-wide cache of compiled native pipelines.

use std::fmt;
use std::sync::{Arc, Mutex};

use ahash::AHashMap;
use rhi_core::native::NativePipeline;

use super::deferred::DeferredDestroyQueue;
use super::lock;

/// Native pipelines keyed by the hash of the pipeline state and the render
/// pass they were compiled for.
///
/// Command lists compile into a private map while recording and merge it here
/// at submission. When two lists compiled the same key, the first merged wins
/// and the other pipeline goes to deferred destruction.
pub struct PipelineCache {
    pipelines: Mutex<AHashMap<u64, NativePipeline>>,
    destroyer: Arc<DeferredDestroyQueue>,
}

impl fmt::Debug for PipelineCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PipelineCache").field("len", &self.len()).finish()
    }
}

impl PipelineCache {
    pub fn new(destroyer: Arc<DeferredDestroyQueue>) -> Self {
        Self {
            pipelines: Mutex::new(AHashMap::new()),
            destroyer,
        }
    }

    pub fn get(&self, hash: u64) -> Option<NativePipeline> {
        lock(&self.pipelines).get(&hash).copied()
    }

    /// Adds pipelines compiled by one command list.
    pub fn merge(&self, private: impl IntoIterator<Item = (u64, NativePipeline)>) {
        let mut pipelines = lock(&self.pipelines);
        for (hash, pipeline) in private {
            match pipelines.get(&hash) {
                Some(existing) if *existing == pipeline => {}
                Some(_) => {
                    log::trace!("Pipeline {:#018x} was compiled twice; releasing the copy", hash);
                    self.destroyer.release(pipeline);
                }
                None => {
                    pipelines.insert(hash, pipeline);
                }
            }
        }
    }

    /// Releases every cached pipeline.
    pub fn clear(&self) {
        let drained: Vec<_> = lock(&self.pipelines).drain().collect();
        log::debug!("Clearing {} cached pipelines", drained.len());
        for (_, pipeline) in drained {
            self.destroyer.release(pipeline);
        }
    }

    pub fn len(&self) -> usize {
        lock(&self.pipelines).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Drop for PipelineCache {
    fn drop(&mut self) {
        self.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::soft::SoftDevice;
    use rhi_core::NativeDevice;

    fn cache() -> PipelineCache {
        let native: Arc<dyn NativeDevice> = Arc::new(SoftDevice::new());
        PipelineCache::new(Arc::new(DeferredDestroyQueue::new(native)))
    }

    #[test]
    fn test_first_merge_wins() {
        // --- ARRANGE ---
        let cache = cache();
        cache.merge([(1, NativePipeline(10))]);

        // --- ACT ---
        cache.merge([(1, NativePipeline(11)), (2, NativePipeline(12))]);

        // --- ASSERT ---
        assert_eq!(cache.get(1), Some(NativePipeline(10)));
        assert_eq!(cache.get(2), Some(NativePipeline(12)));
        assert_eq!(cache.len(), 2);
        assert!(cache.destroyer.contains(NativePipeline(11)));
    }

    #[test]
    fn test_clear_releases_everything() {
        let cache = cache();
        cache.merge([(1, NativePipeline(10)), (2, NativePipeline(12))]);

        cache.clear();

        assert!(cache.is_empty());
        assert_eq!(cache.destroyer.pending(), 2);
    }
}
