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

//! Descriptor binding through a ring of shader-visible heap space.
//!
//! Each commit copies the bound descriptors of one bind point into a fresh,
//! contiguous range of the frame's shader-visible heaps and points the root
//! tables at it. Ranges are never reused within a frame, so earlier draws keep
//! seeing the descriptors they were recorded with. The ring rewinds when the
//! frame slot is recorded again, after its previous use has retired.

use std::sync::Arc;

use rhi_core::api::{BindPoint, DescriptorTable, ShaderStage};
use rhi_core::native::{
    DescriptorHeapKind, NativeCommand, NativeDescriptor, NativeDescriptorHeap,
    NativeDescriptorHeapDesc, NativeSampler, NativeView,
};
use rhi_core::{NativeDevice, RhiError};

use super::{BoundConstant, DescriptorBinder, Points};
use crate::graphics::backend::Encoder;
use crate::graphics::deferred::DeferredDestroyQueue;
use crate::graphics::resources::{payload, Owned, PipelineLayoutInfo};

/// Payload of a descriptor table: CPU-only staging heaps that commits copy from.
pub(crate) struct HeapTablePayload {
    pub resources: Option<NativeDescriptorHeap>,
    pub samplers: Option<NativeDescriptorHeap>,
    pub _owned: Owned,
}

/// The root parameter of explicit table `space`.
pub(crate) fn table_root_index(space: u32, kind: DescriptorHeapKind) -> u32 {
    match kind {
        DescriptorHeapKind::Resource => 2 + 2 * space,
        DescriptorHeapKind::Sampler => 3 + 2 * space,
    }
}

struct Block {
    heap: NativeDescriptorHeap,
    capacity: u32,
}

/// Linear allocation over a list of shader-visible heaps of one kind.
struct HeapRing {
    kind: DescriptorHeapKind,
    blocks: Vec<Block>,
    current: usize,
    offset: u32,
    initial_capacity: u32,
    max_capacity: u32,
}

impl HeapRing {
    fn new(kind: DescriptorHeapKind, initial_capacity: u32, max_capacity: u32) -> Self {
        Self {
            kind,
            blocks: Vec::new(),
            current: 0,
            offset: 0,
            initial_capacity: initial_capacity.min(max_capacity),
            max_capacity,
        }
    }

    fn create(&self, native: &dyn NativeDevice, capacity: u32) -> Result<Block, RhiError> {
        let heap = native.create_descriptor_heap(&NativeDescriptorHeapDesc {
            kind: self.kind,
            capacity,
            shader_visible: true,
        })?;
        Ok(Block { heap, capacity })
    }

    fn heap(&self) -> Option<NativeDescriptorHeap> {
        self.blocks.get(self.current).map(|b| b.heap)
    }

    /// Reserves `count` consecutive descriptors. The flag is set when the
    /// returned heap differs from the one the previous allocation came from.
    fn allocate(
        &mut self,
        native: &dyn NativeDevice,
        destroyer: &DeferredDestroyQueue,
        count: u32,
    ) -> Result<(NativeDescriptorHeap, u32, bool), RhiError> {
        if count > self.max_capacity {
            return Err(RhiError::InvalidDescriptor(format!(
                "{} descriptors exceed the {:?} heap limit of {}",
                count, self.kind, self.max_capacity
            )));
        }
        if self.blocks.is_empty() {
            let block = self.create(native, self.initial_capacity.max(count))?;
            self.blocks.push(block);
            self.current = 0;
            self.offset = 0;
            return self.take(count, true);
        }
        let capacity = self.blocks[self.current].capacity;
        if self.offset + count <= capacity {
            return self.take(count, false);
        }
        if self.current + 1 < self.blocks.len() {
            self.current += 1;
            self.offset = 0;
        } else if capacity < self.max_capacity {
            let grown = (capacity * 2).max(count).min(self.max_capacity);
            log::debug!(
                "Growing {:?} descriptor heap from {} to {} descriptors",
                self.kind,
                capacity,
                grown
            );
            let block = self.create(native, grown)?;
            let old = std::mem::replace(&mut self.blocks[self.current], block);
            destroyer.release(old.heap);
            self.offset = 0;
        } else {
            log::debug!(
                "{:?} descriptor heap is at its limit of {}; adding another",
                self.kind,
                self.max_capacity
            );
            let block = self.create(native, self.max_capacity)?;
            self.blocks.push(block);
            self.current = self.blocks.len() - 1;
            self.offset = 0;
        }
        self.take(count, true)
    }

    fn take(&mut self, count: u32, switched: bool) -> Result<(NativeDescriptorHeap, u32, bool), RhiError> {
        let heap = self.heap().ok_or(RhiError::InvalidHandle)?;
        let offset = self.offset;
        self.offset += count;
        Ok((heap, offset, switched))
    }

    fn rewind(&mut self) {
        self.current = 0;
        self.offset = 0;
    }

    fn release(&mut self, destroyer: &DeferredDestroyQueue) {
        for block in self.blocks.drain(..) {
            destroyer.release(block.heap);
        }
    }
}

pub(crate) struct HeapRingBinder {
    resources: HeapRing,
    samplers: HeapRing,
    points: Points,
    heaps_set: bool,
    destroyer: Arc<DeferredDestroyQueue>,
}

/// One table's source heaps and sizes, resolved before allocation.
struct TableCopy {
    space: u32,
    resources: Option<(NativeDescriptorHeap, u32)>,
    samplers: Option<(NativeDescriptorHeap, u32)>,
}

impl HeapRingBinder {
    pub fn new(
        destroyer: Arc<DeferredDestroyQueue>,
        resource_capacity: u32,
        sampler_capacity: u32,
        max_resources: u32,
        max_samplers: u32,
    ) -> Self {
        Self {
            resources: HeapRing::new(DescriptorHeapKind::Resource, resource_capacity, max_resources),
            samplers: HeapRing::new(DescriptorHeapKind::Sampler, sampler_capacity, max_samplers),
            points: Points::default(),
            heaps_set: false,
            destroyer,
        }
    }

    fn try_commit(&mut self, enc: &Encoder<'_>, bind_point: BindPoint) -> Result<(), RhiError> {
        let point = self.points.get(bind_point);
        if !point.dirty {
            return Ok(());
        }
        let Some(layout) = point.layout.clone() else {
            return Ok(());
        };
        let desc = &layout.desc;

        let mut resources = Vec::new();
        point.gather_resources(enc, &desc.bindings, &mut resources);
        let mut samplers = Vec::new();
        point.gather_samplers(enc, &desc.bindings, &mut samplers);

        let mut tables = Vec::new();
        for (space, table_layout) in desc.tables.iter().enumerate() {
            let Some(table) = &point.tables[space] else {
                log::warn!("Descriptor table space {} of {:?} is not bound", space, bind_point);
                continue;
            };
            let Some(source) = payload::<HeapTablePayload>(table.internal.as_ref()) else {
                continue;
            };
            tables.push(TableCopy {
                space: space as u32,
                resources: source
                    .resources
                    .map(|h| (h, table_layout.resource_count()))
                    .filter(|(_, n)| *n > 0),
                samplers: source
                    .samplers
                    .map(|h| (h, table_layout.sampler_count()))
                    .filter(|(_, n)| *n > 0),
            });
        }

        let resource_total = resources.len() as u32
            + tables.iter().filter_map(|t| t.resources).map(|(_, n)| n).sum::<u32>();
        let sampler_total = samplers.len() as u32
            + tables.iter().filter_map(|t| t.samplers).map(|(_, n)| n).sum::<u32>();

        let mut switched = false;
        let resource_range = if resource_total > 0 {
            let (heap, offset, s) = self.resources.allocate(enc.native, &self.destroyer, resource_total)?;
            switched |= s;
            Some((heap, offset))
        } else {
            None
        };
        let sampler_range = if sampler_total > 0 {
            let (heap, offset, s) = self.samplers.allocate(enc.native, &self.destroyer, sampler_total)?;
            switched |= s;
            Some((heap, offset))
        } else {
            None
        };

        if switched || !self.heaps_set {
            enc.record(NativeCommand::SetDescriptorHeaps {
                resource: self.resources.heap(),
                sampler: self.samplers.heap(),
            });
            self.heaps_set = true;
            if switched {
                // Tables of the other bind points point into the old heap.
                self.points.invalidate();
            }
        }

        if let Some((heap, base)) = resource_range {
            let mut offset = base;
            if !resources.is_empty() {
                enc.native.write_descriptors(heap, offset, &resources)?;
                enc.record(NativeCommand::SetDescriptorTable {
                    bind_point,
                    root_index: 0,
                    heap,
                    offset,
                });
                offset += resources.len() as u32;
            }
            for table in &tables {
                if let Some((src, count)) = table.resources {
                    enc.native.copy_descriptors(heap, offset, src, 0, count)?;
                    enc.record(NativeCommand::SetDescriptorTable {
                        bind_point,
                        root_index: table_root_index(table.space, DescriptorHeapKind::Resource),
                        heap,
                        offset,
                    });
                    offset += count;
                }
            }
        }

        if let Some((heap, base)) = sampler_range {
            let mut offset = base;
            if !samplers.is_empty() {
                enc.native.write_descriptors(heap, offset, &samplers)?;
                enc.record(NativeCommand::SetDescriptorTable {
                    bind_point,
                    root_index: 1,
                    heap,
                    offset,
                });
                offset += samplers.len() as u32;
            }
            for table in &tables {
                if let Some((src, count)) = table.samplers {
                    enc.native.copy_descriptors(heap, offset, src, 0, count)?;
                    enc.record(NativeCommand::SetDescriptorTable {
                        bind_point,
                        root_index: table_root_index(table.space, DescriptorHeapKind::Sampler),
                        heap,
                        offset,
                    });
                    offset += count;
                }
            }
        }
        self.points.get(bind_point).dirty = false;
        Ok(())
    }
}

impl Drop for HeapRingBinder {
    fn drop(&mut self) {
        self.resources.release(&self.destroyer);
        self.samplers.release(&self.destroyer);
    }
}

impl DescriptorBinder for HeapRingBinder {
    fn reset(&mut self, _enc: &Encoder<'_>) {
        self.resources.rewind();
        self.samplers.rewind();
        self.points.reset();
        self.heaps_set = false;
    }

    fn set_layout(
        &mut self,
        enc: &Encoder<'_>,
        bind_point: BindPoint,
        layout: Option<&Arc<PipelineLayoutInfo>>,
    ) {
        if self.points.get(bind_point).set_layout(layout) {
            if let Some(layout) = layout {
                enc.record(NativeCommand::SetPipelineLayout {
                    bind_point,
                    layout: layout.native,
                });
            }
        }
    }

    fn bind_resource(&mut self, _enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        self.points.of_stage(stage).bind_resource(slot, view);
    }

    fn bind_uav(&mut self, _enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        self.points.of_stage(stage).bind_uav(slot, view);
    }

    fn bind_constant_buffer(
        &mut self,
        _enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        constant: Option<BoundConstant>,
    ) {
        self.points.of_stage(stage).bind_constant_buffer(slot, constant);
    }

    fn bind_sampler(
        &mut self,
        _enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<NativeSampler>,
    ) {
        self.points.of_stage(stage).bind_sampler(slot, sampler);
    }

    fn unbind_resources(&mut self, _enc: &Encoder<'_>, slot: u32, count: u32) {
        self.points.unbind_resources(slot, count);
    }

    fn unbind_uavs(&mut self, _enc: &Encoder<'_>, slot: u32, count: u32) {
        self.points.unbind_uavs(slot, count);
    }

    fn bind_table(&mut self, _enc: &Encoder<'_>, bind_point: BindPoint, space: u32, table: &DescriptorTable) {
        self.points.get(bind_point).bind_table(space, table);
    }

    fn invalidate(&mut self) {
        self.points.invalidate();
    }

    fn commit(&mut self, enc: &Encoder<'_>, bind_point: BindPoint) {
        if let Err(e) = self.try_commit(enc, bind_point) {
            panic!("failed to commit {:?} descriptors: {}", bind_point, e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::binding::test_support::Harness;
    use rhi_core::api::{BindingLayout, ShaderBinding, ViewDimension};

    fn binder(harness: &Harness, capacity: u32, max: u32) -> HeapRingBinder {
        HeapRingBinder::new(harness.destroyer.clone(), capacity, 16, max, 64)
    }

    fn single_srv() -> BindingLayout {
        BindingLayout::from_bindings([ShaderBinding::resource(0, ViewDimension::Texture2D)])
    }

    #[test]
    fn test_unchanged_bindings_are_written_once() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 64, 1024);
        let layout = harness.layout(single_srv(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(5)));
        binder.commit(&enc, BindPoint::Graphics);
        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(5)));
        binder.commit(&enc, BindPoint::Graphics);

        // --- ASSERT ---
        let stats = harness.soft.stats();
        assert_eq!(stats.descriptors_written, 1);
        assert_eq!(stats.command_count("set_descriptor_table"), 1);
        assert_eq!(stats.command_count("set_descriptor_heaps"), 1);
        assert_eq!(stats.command_count("set_pipeline_layout"), 1);
    }

    #[test]
    fn test_changed_binding_gets_a_fresh_range() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 64, 1024);
        let layout = harness.layout(single_srv(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(5)));
        binder.commit(&enc, BindPoint::Graphics);
        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(6)));
        binder.commit(&enc, BindPoint::Graphics);

        assert_eq!(binder.resources.offset, 2);
        assert_eq!(harness.soft.stats().descriptors_written, 2);
    }

    #[test]
    fn test_ring_grows_up_to_the_limit_then_adds_heaps() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 2, 4);
        let layout = harness.layout(single_srv(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        for view in 0..9u64 {
            binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(100 + view)));
            binder.commit(&enc, BindPoint::Graphics);
        }

        // --- ASSERT ---
        // 2 fit the first heap, it grows once to 4, then two more heaps of 4.
        assert_eq!(binder.resources.blocks.len(), 2);
        assert!(binder
            .resources
            .blocks
            .iter()
            .all(|b| harness.soft.heap_capacity(b.heap) == Some(4)));
        assert_eq!(harness.destroyer.pending(), 1);
        let heaps_set = harness.soft.stats().command_count("set_descriptor_heaps");
        assert_eq!(heaps_set, 3);
    }

    #[test]
    fn test_reset_rewinds_to_the_first_heap() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 1, 1);
        let layout = harness.layout(single_srv(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));
        for view in 0..3u64 {
            binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(view + 1)));
            binder.commit(&enc, BindPoint::Graphics);
        }
        assert_eq!(binder.resources.current, 2);

        binder.reset(&enc);

        assert_eq!(binder.resources.current, 0);
        assert_eq!(binder.resources.offset, 0);
        assert_eq!(binder.resources.blocks.len(), 3);
    }

    fn eight_srvs() -> BindingLayout {
        BindingLayout::from_bindings([ShaderBinding::resource(7, ViewDimension::Texture2D)])
    }

    #[test]
    #[should_panic(expected = "failed to commit")]
    fn test_commit_beyond_the_heap_limit_panics() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 2, 4);
        let layout = harness.layout(eight_srvs(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        binder.commit(&enc, BindPoint::Graphics);
    }

    #[test]
    fn test_failed_commit_stays_dirty() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 2, 4);
        let layout = harness.layout(eight_srvs(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            binder.commit(&enc, BindPoint::Graphics)
        }));

        // --- ASSERT ---
        assert!(result.is_err());
        assert!(binder.points.get(BindPoint::Graphics).dirty);
        let stats = harness.soft.stats();
        assert_eq!(stats.descriptors_written, 0);
        assert_eq!(stats.command_count("set_descriptor_table"), 0);
    }

    #[test]
    fn test_nothing_is_written_without_a_layout() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = binder(&harness, 8, 8);
        binder.bind_resource(&enc, ShaderStage::Compute, 0, Some(NativeView(1)));
        binder.commit(&enc, BindPoint::Compute);
        assert_eq!(harness.soft.stats().descriptors_written, 0);
    }
}
