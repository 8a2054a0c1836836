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

//! Descriptor binding through sets drawn from a per-frame pool.

use std::sync::{Arc, Mutex};

use rhi_core::api::{BindPoint, DescriptorTable, ShaderStage, CBV_COUNT, SAMPLER_COUNT, SRV_COUNT, UAV_COUNT};
use rhi_core::native::{
    NativeCommand, NativeDescriptor, NativeDescriptorPool, NativeDescriptorPoolDesc,
    NativeDescriptorSet, NativePipelineLayout, NativeSampler, NativeView,
};
use rhi_core::{NativeError, RhiError};

use super::{BoundConstant, DescriptorBinder, Points};
use crate::graphics::backend::Encoder;
use crate::graphics::deferred::DeferredDestroyQueue;
use crate::graphics::lock;
use crate::graphics::resources::{payload, PipelineLayoutInfo};

/// Payload of a descriptor table: the contents of its set, resources first,
/// then samplers, and a layout holding only that set at index 1.
pub(crate) struct SetTablePayload {
    pub layout: Arc<PipelineLayoutInfo>,
    pub descriptors: Mutex<Vec<NativeDescriptor>>,
}

const DESCRIPTORS_PER_SET: u32 = (CBV_COUNT + SRV_COUNT + UAV_COUNT + SAMPLER_COUNT) as u32;

pub(crate) struct SetPoolBinder {
    pool: Option<NativeDescriptorPool>,
    max_sets: u32,
    points: Points,
    destroyer: Arc<DeferredDestroyQueue>,
}

impl SetPoolBinder {
    pub fn new(destroyer: Arc<DeferredDestroyQueue>, max_sets: u32) -> Self {
        Self {
            pool: None,
            max_sets: max_sets.max(1),
            points: Points::default(),
            destroyer,
        }
    }

    fn create_pool(&mut self, enc: &Encoder<'_>) -> Result<NativeDescriptorPool, RhiError> {
        let pool = enc.native.create_descriptor_pool(&NativeDescriptorPoolDesc {
            max_sets: self.max_sets,
            descriptors_per_set: DESCRIPTORS_PER_SET,
        })?;
        self.pool = Some(pool);
        Ok(pool)
    }

    /// Allocates a set, doubling the pool when it runs dry.
    fn allocate(
        &mut self,
        enc: &Encoder<'_>,
        layout: NativePipelineLayout,
        set_index: u32,
    ) -> Result<NativeDescriptorSet, RhiError> {
        let pool = match self.pool {
            Some(pool) => pool,
            None => self.create_pool(enc)?,
        };
        match enc.native.allocate_descriptor_set(pool, layout, set_index) {
            Err(NativeError::OutOfPoolMemory) => {
                self.max_sets *= 2;
                log::debug!("Descriptor pool exhausted; growing to {} sets", self.max_sets);
                // Sets already recorded this frame stay valid until the old pool retires.
                self.destroyer.release(pool);
                let pool = self.create_pool(enc)?;
                Ok(enc.native.allocate_descriptor_set(pool, layout, set_index)?)
            }
            other => Ok(other?),
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
        let mut descriptors = Vec::new();
        point.gather_resources(enc, &layout.desc.bindings, &mut descriptors);
        point.gather_samplers(enc, &layout.desc.bindings, &mut descriptors);
        let tables: Vec<(u32, DescriptorTable)> = point
            .tables
            .iter()
            .take(layout.desc.tables.len())
            .enumerate()
            .filter_map(|(space, table)| {
                if table.is_none() {
                    log::warn!("Descriptor table space {} of {:?} is not bound", space, bind_point);
                }
                Some((space as u32, table.clone()?))
            })
            .collect();

        if !descriptors.is_empty() {
            let set = self.allocate(enc, layout.native, 0)?;
            enc.native.update_descriptor_set_with_template(set, &descriptors)?;
            enc.record(NativeCommand::BindDescriptorSets {
                bind_point,
                layout: layout.native,
                first_set: 0,
                sets: vec![set],
            });
        }

        for (space, table) in tables {
            let Some(source) = payload::<SetTablePayload>(table.internal.as_ref()) else {
                continue;
            };
            let contents = lock(&source.descriptors).clone();
            if contents.is_empty() {
                continue;
            }
            let set = self.allocate(enc, source.layout.native, 1)?;
            enc.native.update_descriptor_set_with_template(set, &contents)?;
            enc.record(NativeCommand::BindDescriptorSets {
                bind_point,
                layout: layout.native,
                first_set: 1 + space,
                sets: vec![set],
            });
        }
        self.points.get(bind_point).dirty = false;
        Ok(())
    }
}

impl Drop for SetPoolBinder {
    fn drop(&mut self) {
        if let Some(pool) = self.pool.take() {
            self.destroyer.release(pool);
        }
    }
}

impl DescriptorBinder for SetPoolBinder {
    fn reset(&mut self, enc: &Encoder<'_>) {
        if let Some(pool) = self.pool {
            if let Err(e) = enc.native.reset_descriptor_pool(pool) {
                log::error!("Failed to reset descriptor pool: {}", e);
            }
        }
        self.points.reset();
    }

    fn set_layout(
        &mut self,
        _enc: &Encoder<'_>,
        bind_point: BindPoint,
        layout: Option<&Arc<PipelineLayoutInfo>>,
    ) {
        self.points.get(bind_point).set_layout(layout);
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
    use crate::graphics::resources::Owned;
    use rhi_core::api::{BindingLayout, ShaderBinding, ViewDimension};
    use rhi_core::native::NativePipelineLayoutDesc;

    fn layout_with_sampler() -> BindingLayout {
        BindingLayout::from_bindings([
            ShaderBinding::resource(0, ViewDimension::Texture2D),
            ShaderBinding::sampler(0),
        ])
    }

    #[test]
    fn test_unchanged_bindings_allocate_one_set() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 4);
        let layout = harness.layout(
            BindingLayout::from_bindings([ShaderBinding::resource(0, ViewDimension::Texture2D)]),
            Vec::new(),
        );
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        for _ in 0..3 {
            binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(8)));
            binder.commit(&enc, BindPoint::Graphics);
        }

        // --- ASSERT ---
        let stats = harness.soft.stats();
        assert_eq!(stats.descriptor_sets_allocated, 1);
        assert_eq!(stats.descriptors_written, 1);
        assert_eq!(stats.template_updates, 1);
        assert_eq!(stats.command_count("bind_descriptor_sets"), 1);
    }

    #[test]
    fn test_samplers_share_set_zero() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 4);
        let layout = harness.layout(layout_with_sampler(), Vec::new());
        binder.set_layout(&enc, BindPoint::Compute, Some(&layout));

        binder.commit(&enc, BindPoint::Compute);

        let stats = harness.soft.stats();
        assert_eq!(stats.descriptor_sets_allocated, 1);
        assert_eq!(stats.descriptors_written, 2);
    }

    #[test]
    fn test_exhausted_pool_is_doubled() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 2);
        let layout = harness.layout(layout_with_sampler(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        for view in 0..3u64 {
            binder.bind_resource(&enc, ShaderStage::Vertex, 0, Some(NativeView(view + 1)));
            binder.commit(&enc, BindPoint::Graphics);
        }

        // --- ASSERT ---
        assert_eq!(binder.max_sets, 4);
        let pool = binder.pool.unwrap();
        assert_eq!(harness.soft.pool_capacity(pool), Some(4));
        assert_eq!(harness.destroyer.pending(), 1);
        assert_eq!(harness.soft.stats().descriptor_sets_allocated, 3);
    }

    #[test]
    fn test_reset_frees_the_pool() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 1);
        let layout = harness.layout(layout_with_sampler(), Vec::new());
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));
        binder.commit(&enc, BindPoint::Graphics);

        binder.reset(&enc);
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));
        binder.commit(&enc, BindPoint::Graphics);

        assert_eq!(binder.max_sets, 1);
        assert_eq!(harness.soft.stats().descriptor_pool_resets, 1);
    }

    /// A layout whose native handle the device never created.
    fn unknown_layout(harness: &Harness) -> Arc<PipelineLayoutInfo> {
        Arc::new(PipelineLayoutInfo {
            native: NativePipelineLayout(u64::MAX),
            desc: NativePipelineLayoutDesc {
                bindings: layout_with_sampler(),
                tables: Vec::new(),
            },
            _owned: Owned::new(&harness.destroyer),
        })
    }

    #[test]
    #[should_panic(expected = "failed to commit")]
    fn test_failed_set_allocation_panics() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 4);
        let layout = unknown_layout(&harness);
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        binder.commit(&enc, BindPoint::Graphics);
    }

    #[test]
    fn test_failed_commit_stays_dirty() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = SetPoolBinder::new(harness.destroyer.clone(), 4);
        let layout = unknown_layout(&harness);
        binder.set_layout(&enc, BindPoint::Graphics, Some(&layout));

        // --- ACT ---
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            binder.commit(&enc, BindPoint::Graphics)
        }));

        // --- ASSERT ---
        assert!(result.is_err());
        assert!(binder.points.get(BindPoint::Graphics).dirty);
        assert_eq!(harness.soft.stats().command_count("bind_descriptor_sets"), 0);
    }
}
