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

//! Per command list recording state.
//!
//! Each of the [`COMMANDLIST_COUNT`](rhi_core::api::COMMANDLIST_COUNT) lists
//! owns one [`FrameSlot`] per frame in flight, created the first time the list
//! is begun in that slot and reset, not recreated, every later time.

use ahash::AHashMap;
use rhi_core::api::{
    BindPoint, BindingModel, CommandList, GpuQuery, PipelineState, RaytracingPipelineState,
    Rect, RenderPass, Shader, Viewport,
};
use rhi_core::native::{NativeCommand, NativeCommandBuffer, NativePipeline, QueueKind};
use rhi_core::RhiError;

use super::backend::{Backend, Encoder};
use super::binding::{DescriptorBinder, FlatSlotBinder, HeapRingBinder, SetPoolBinder};
use super::pipeline::FieldStateCache;
use super::resources::{NullDescriptors, ResourceStore};
use super::transient::LinearAllocator;

/// Sizes the per-slot allocators are created with.
#[derive(Debug, Clone, Copy)]
pub(crate) struct SlotConfig {
    pub transient_size: u64,
    pub resource_heap_capacity: u32,
    pub sampler_heap_capacity: u32,
    pub max_resource_heap: u32,
    pub max_sampler_heap: u32,
    pub descriptor_pool_sets: u32,
}

/// What one command list records into during one frame in flight.
pub(crate) struct FrameSlot {
    pub cmd: NativeCommandBuffer,
    pub transient: LinearAllocator,
    pub binder: Box<dyn DescriptorBinder>,
}

impl FrameSlot {
    fn new(store: &ResourceStore, backend: &dyn Backend, config: &SlotConfig) -> Result<Self, RhiError> {
        let cmd = store.native().create_command_buffer(QueueKind::Graphics)?;
        let destroyer = store.destroyer().clone();
        let binder: Box<dyn DescriptorBinder> = match backend.binding_model() {
            BindingModel::FlatSlot => Box::new(FlatSlotBinder::new()),
            BindingModel::DescriptorHeapRing => Box::new(HeapRingBinder::new(
                destroyer,
                config.resource_heap_capacity,
                config.sampler_heap_capacity,
                config.max_resource_heap,
                config.max_sampler_heap,
            )),
            BindingModel::DescriptorSetPool => {
                Box::new(SetPoolBinder::new(destroyer, config.descriptor_pool_sets))
            }
        };
        Ok(Self {
            cmd,
            transient: LinearAllocator::new(config.transient_size),
            binder,
        })
    }
}

/// Everything a command list remembers between recording calls.
pub(crate) struct CommandListState {
    slots: Vec<Option<FrameSlot>>,
    active: Option<usize>,
    /// Frames submitted before the one being recorded.
    pub frame: u64,
    pub pso: Option<PipelineState>,
    pub pso_dirty: bool,
    pub compute_shader: Option<Shader>,
    pub compute_dirty: bool,
    pub raytracing_pso: Option<RaytracingPipelineState>,
    pub raytracing_dirty: bool,
    pub pass: Option<RenderPass>,
    /// Queries ended in this list, readable once it is submitted.
    pub ended_queries: Vec<GpuQuery>,
    /// Pipelines compiled by this list, merged into the device cache at submission.
    pub pipelines: AHashMap<u64, NativePipeline>,
    pub bound_pipelines: [Option<NativePipeline>; 3],
    pub fields: FieldStateCache,
    pub stencil_ref: u32,
    pub blend_factor: [f32; 4],
}

impl CommandListState {
    pub fn new(ring_size: usize) -> Self {
        Self {
            slots: (0..ring_size).map(|_| None).collect(),
            active: None,
            frame: 0,
            pso: None,
            pso_dirty: false,
            compute_shader: None,
            compute_dirty: false,
            raytracing_pso: None,
            raytracing_dirty: false,
            pass: None,
            ended_queries: Vec::new(),
            pipelines: AHashMap::new(),
            bound_pipelines: [None; 3],
            fields: FieldStateCache::default(),
            stencil_ref: 0,
            blend_factor: [1.0; 4],
        }
    }

    /// Opens the list for `frame`, creating the ring slot on first use, and
    /// records the default dynamic state.
    pub fn begin(
        &mut self,
        list: CommandList,
        frame: u64,
        store: &ResourceStore,
        nulls: &NullDescriptors,
        backend: &dyn Backend,
        config: &SlotConfig,
        extent: (u32, u32),
    ) -> Result<(), RhiError> {
        let index = (frame % self.slots.len() as u64) as usize;
        if self.slots[index].is_none() {
            log::debug!("Creating frame slot {} of command list {}", index, list.index());
            self.slots[index] = Some(FrameSlot::new(store, backend, config)?);
        }
        let Some(slot) = self.slots[index].as_mut() else {
            return Err(RhiError::InvalidHandle);
        };
        store.native().begin_command_buffer(slot.cmd)?;
        slot.transient.reset();

        let enc = Encoder {
            native: store.native(),
            cmd: slot.cmd,
            nulls,
            list,
            frame,
        };
        slot.binder.reset(&enc);

        self.active = Some(index);
        self.frame = frame;
        self.pso = None;
        self.pso_dirty = false;
        self.compute_shader = None;
        self.compute_dirty = false;
        self.raytracing_pso = None;
        self.raytracing_dirty = false;
        self.pass = None;
        self.ended_queries.clear();
        self.bound_pipelines = [None; 3];
        self.fields.clear();
        self.stencil_ref = 0;
        self.blend_factor = [1.0; 4];

        enc.record(NativeCommand::SetViewports {
            viewports: vec![Viewport::full(extent.0, extent.1)],
        });
        enc.record(NativeCommand::SetScissorRects {
            rects: vec![Rect::MAXIMAL],
        });
        if !backend.binds_state_per_field() {
            enc.record(NativeCommand::SetStencilRef { value: 0 });
            enc.record(NativeCommand::SetBlendFactor { factor: [1.0; 4] });
        }
        Ok(())
    }

    /// The slot being recorded.
    ///
    /// Panics if the list was not begun this frame.
    pub fn slot(&mut self) -> &mut FrameSlot {
        let slot = self.active.and_then(|i| self.slots.get_mut(i)).and_then(Option::as_mut);
        match slot {
            Some(slot) => slot,
            None => panic!("command list used without begin_command_list"),
        }
    }

    pub fn native_cmd(&mut self) -> NativeCommandBuffer {
        self.slot().cmd
    }

    pub fn is_open(&self) -> bool {
        self.active.is_some()
    }

    /// Closes the list, returning its command buffer for submission.
    pub fn finish(&mut self, store: &ResourceStore) -> Option<NativeCommandBuffer> {
        let index = self.active.take()?;
        let slot = self.slots.get(index)?.as_ref()?;
        if self.pass.take().is_some() {
            log::warn!("Command list submitted inside a render pass");
        }
        if let Err(e) = store.native().end_command_buffer(slot.cmd) {
            log::error!("Failed to close command buffer: {}", e);
            return None;
        }
        Some(slot.cmd)
    }

    pub fn bound_pipeline(&mut self, bind_point: BindPoint) -> &mut Option<NativePipeline> {
        &mut self.bound_pipelines[super::binding::point_index(bind_point)]
    }

    /// Releases the native command buffers of every slot.
    pub fn release(&mut self, store: &ResourceStore) {
        for slot in self.slots.iter_mut().filter_map(Option::take) {
            store.destroyer().release(slot.cmd);
        }
        self.active = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::deferred::DeferredDestroyQueue;
    use crate::graphics::dx11::Dx11Backend;
    use crate::graphics::dx12::Dx12Backend;
    use crate::graphics::soft::SoftDevice;
    use rhi_core::NativeDevice;
    use std::sync::Arc;

    const CONFIG: SlotConfig = SlotConfig {
        transient_size: 1024,
        resource_heap_capacity: 16,
        sampler_heap_capacity: 4,
        max_resource_heap: 64,
        max_sampler_heap: 16,
        descriptor_pool_sets: 4,
    };

    fn fixture(backend: Arc<dyn Backend>) -> (Arc<SoftDevice>, ResourceStore, NullDescriptors) {
        let soft = Arc::new(SoftDevice::new());
        let native: Arc<dyn NativeDevice> = soft.clone();
        let destroyer = Arc::new(DeferredDestroyQueue::new(native.clone()));
        let nulls = NullDescriptors::new(native.as_ref(), &destroyer).unwrap();
        (soft, ResourceStore::new(native, destroyer, backend), nulls)
    }

    #[test]
    fn test_slots_are_created_once_per_ring_index() {
        // --- ARRANGE ---
        let backend: Arc<dyn Backend> = Arc::new(Dx12Backend);
        let (soft, store, nulls) = fixture(backend.clone());
        let mut state = CommandListState::new(3);

        // --- ACT ---
        let mut buffers = Vec::new();
        for frame in 0..6 {
            state
                .begin(CommandList(0), frame, &store, &nulls, backend.as_ref(), &CONFIG, (64, 64))
                .unwrap();
            buffers.push(state.finish(&store).unwrap());
        }

        // --- ASSERT ---
        assert_eq!(buffers[0], buffers[3]);
        assert_eq!(buffers[1], buffers[4]);
        assert_ne!(buffers[0], buffers[1]);
        assert_eq!(soft.stats().command_count("set_blend_factor"), 6);
    }

    #[test]
    fn test_begin_resets_bound_state() {
        let backend: Arc<dyn Backend> = Arc::new(Dx11Backend);
        let (soft, store, nulls) = fixture(backend.clone());
        let mut state = CommandListState::new(2);
        state
            .begin(CommandList(1), 0, &store, &nulls, backend.as_ref(), &CONFIG, (8, 8))
            .unwrap();
        state.stencil_ref = 9;
        state.pso_dirty = true;

        state
            .begin(CommandList(1), 1, &store, &nulls, backend.as_ref(), &CONFIG, (8, 8))
            .unwrap();

        assert_eq!(state.stencil_ref, 0);
        assert!(!state.pso_dirty);
        assert_eq!(state.blend_factor, [1.0; 4]);
        let stats = soft.stats();
        assert_eq!(stats.command_count("set_viewports"), 2);
        assert_eq!(stats.command_count("set_stencil_ref"), 0);
    }

    #[test]
    #[should_panic(expected = "without begin_command_list")]
    fn test_recording_an_unopened_list_panics() {
        let mut state = CommandListState::new(2);
        state.native_cmd();
    }
}
