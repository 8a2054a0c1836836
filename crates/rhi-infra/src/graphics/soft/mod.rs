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

//! A CPU implementation of the native graphics seam.
//!
//! [`SoftDevice`] stores buffers and textures in host memory and executes
//! transfers, clears, query writes and descriptor updates on the CPU. It does
//! not rasterize: draws and dispatches are recorded in a log together with the
//! constant buffer contents they would have read. Every native call is counted
//! in [`NativeStats`] so callers can observe exactly what a backend asked for.
//!
//! In [`ExecutionMode::Immediate`] submissions execute and signal their fence
//! at once. In [`ExecutionMode::Manual`] they queue up until
//! [`SoftDevice::complete_next`] retires them one at a time, which makes frame
//! pacing observable.

mod execute;
mod objects;
mod texel;

use std::collections::{BTreeMap, HashMap, VecDeque};
use std::sync::{Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use raw_window_handle::RawWindowHandle;
use rhi_core::api::{
    BindPoint, DeviceType, GraphicsDeviceCapability, SamplerDesc, ShaderStage, SubresourceData,
    MAX_RESOURCE_HEAP_CAPACITY, MAX_SAMPLER_HEAP_CAPACITY,
};
use rhi_core::native::*;
use rhi_core::{NativeDevice, NativeError};

use self::objects::*;

/// When submitted work executes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ExecutionMode {
    /// Work executes inside `submit`.
    #[default]
    Immediate,
    /// Work executes when [`SoftDevice::complete_next`] or
    /// [`SoftDevice::complete_all`] is called.
    Manual,
}

/// Counters of native calls made on a [`SoftDevice`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct NativeStats {
    pub buffers_created: u64,
    pub textures_created: u64,
    pub views_created: u64,
    pub samplers_created: u64,
    pub shaders_created: u64,
    pub state_objects_created: u64,
    pub pipeline_layouts_created: u64,
    pub render_passes_created: u64,
    pub pipelines_created: u64,
    pub descriptor_heaps_created: u64,
    pub descriptor_pools_created: u64,
    pub descriptor_pool_resets: u64,
    pub descriptor_sets_allocated: u64,
    /// Calls that wrote descriptors into a heap or a set.
    pub descriptor_write_calls: u64,
    /// Descriptors written by those calls.
    pub descriptors_written: u64,
    /// Calls that copied a descriptor range between heaps.
    pub descriptor_copy_calls: u64,
    /// Whole-set template updates.
    pub template_updates: u64,
    pub objects_destroyed: u64,
    pub submissions: u64,
    pub presents: u64,
    /// Commands that referenced an object which no longer existed when executed.
    pub stale_references: u64,
    /// Recorded commands by [`NativeCommand::name`].
    pub commands: BTreeMap<&'static str, u64>,
}

impl NativeStats {
    /// How many commands named `name` were recorded.
    pub fn command_count(&self, name: &str) -> u64 {
        self.commands.get(name).copied().unwrap_or(0)
    }
}

/// Bytes of one constant buffer visible to a draw or dispatch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstantBufferSnapshot {
    /// The stage it was bound to, on the flat-slot model.
    pub stage: Option<ShaderStage>,
    /// Slot number.
    pub slot: u32,
    /// Contents at execution time.
    pub data: Vec<u8>,
}

/// What a draw or dispatch would have read, captured when it executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DrawRecord {
    /// The command name.
    pub command: &'static str,
    /// Graphics, compute or ray tracing.
    pub bind_point: BindPoint,
    /// The bound pipeline, on models with monolithic pipelines.
    pub pipeline: Option<NativePipeline>,
    /// Visible constant buffers, ordered by slot.
    pub constant_buffers: Vec<ConstantBufferSnapshot>,
}

impl DrawRecord {
    /// Contents of the constant buffer at `slot`, from the first stage that binds it.
    pub fn constant_buffer(&self, slot: u32) -> Option<&[u8]> {
        self.constant_buffers
            .iter()
            .find(|c| c.slot == slot)
            .map(|c| c.data.as_slice())
    }
}

struct Submission {
    commands: Vec<NativeCommand>,
    signal: Option<(NativeFence, u64)>,
}

pub(crate) struct SoftState {
    next_id: u64,
    objects: HashMap<u64, SoftObject>,
    sets: HashMap<u64, SoftSet>,
    pending: VecDeque<Submission>,
    stats: NativeStats,
    draws: Vec<DrawRecord>,
    epoch: Instant,
}

/// A native device that executes on the CPU.
#[derive(Debug)]
pub struct SoftDevice {
    mode: ExecutionMode,
    info: NativeAdapterInfo,
    state: Mutex<SoftState>,
    progress: Condvar,
}

impl std::fmt::Debug for SoftState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SoftState")
            .field("objects", &self.objects.len())
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl Default for SoftDevice {
    fn default() -> Self {
        Self::new()
    }
}

impl SoftDevice {
    /// Creates a device in [`ExecutionMode::Immediate`] exposing every feature.
    pub fn new() -> Self {
        Self::with_mode(ExecutionMode::Immediate)
    }

    /// Creates a device with the given execution mode.
    pub fn with_mode(mode: ExecutionMode) -> Self {
        Self {
            mode,
            info: NativeAdapterInfo {
                name: "RHI Software Device".to_string(),
                device_type: DeviceType::Cpu,
                features: GraphicsDeviceCapability::all(),
                limits: NativeLimits {
                    max_resource_heap_descriptors: MAX_RESOURCE_HEAP_CAPACITY,
                    max_sampler_heap_descriptors: MAX_SAMPLER_HEAP_CAPACITY,
                    constant_buffer_alignment: 256,
                    timestamp_frequency: 1_000_000_000,
                },
            },
            state: Mutex::new(SoftState {
                next_id: 0,
                objects: HashMap::new(),
                sets: HashMap::new(),
                pending: VecDeque::new(),
                stats: NativeStats::default(),
                draws: Vec::new(),
                epoch: Instant::now(),
            }),
            progress: Condvar::new(),
        }
    }

    /// Restricts the reported hardware features.
    pub fn with_features(mut self, features: GraphicsDeviceCapability) -> Self {
        self.info.features = features;
        self
    }

    /// Overrides the reported limits.
    pub fn with_limits(mut self, limits: NativeLimits) -> Self {
        self.info.limits = limits;
        self
    }

    fn state(&self) -> MutexGuard<'_, SoftState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A snapshot of the call counters.
    pub fn stats(&self) -> NativeStats {
        self.state().stats.clone()
    }

    /// Draws and dispatches executed so far.
    pub fn draw_log(&self) -> Vec<DrawRecord> {
        self.state().draws.clone()
    }

    /// Forgets the executed draws.
    pub fn clear_draw_log(&self) {
        self.state().draws.clear();
    }

    /// Whether the object with raw handle `raw` exists.
    pub fn is_alive(&self, raw: u64) -> bool {
        let state = self.state();
        state.objects.contains_key(&raw) || state.sets.contains_key(&raw)
    }

    /// Number of live objects, descriptor sets excluded.
    pub fn live_objects(&self) -> usize {
        self.state().objects.len()
    }

    /// Submissions not yet executed.
    pub fn pending_submissions(&self) -> usize {
        self.state().pending.len()
    }

    /// Contents of a buffer.
    pub fn buffer_contents(&self, buffer: NativeBuffer) -> Option<Vec<u8>> {
        self.state().buffer(buffer).ok().map(|b| b.data.clone())
    }

    /// Contents of one texture subresource.
    pub fn texture_subresource(&self, texture: NativeTexture, index: u32) -> Option<Vec<u8>> {
        self.state()
            .texture(texture)
            .ok()
            .and_then(|t| t.subresources.get(index as usize).cloned())
    }

    /// Capacity of a descriptor heap.
    pub fn heap_capacity(&self, heap: NativeDescriptorHeap) -> Option<u32> {
        self.state().heap(heap).ok().map(|h| h.desc.capacity)
    }

    /// Set capacity of a descriptor pool.
    pub fn pool_capacity(&self, pool: NativeDescriptorPool) -> Option<u32> {
        self.state().pool(pool).ok().map(|p| p.desc.max_sets)
    }

    /// Executes the oldest pending submission. Returns `false` if none was pending.
    pub fn complete_next(&self) -> bool {
        let mut state = self.state();
        let Some(submission) = state.pending.pop_front() else {
            return false;
        };
        state.run(submission);
        drop(state);
        self.progress.notify_all();
        true
    }

    /// Executes every pending submission and returns how many ran.
    pub fn complete_all(&self) -> usize {
        let mut completed = 0;
        while self.complete_next() {
            completed += 1;
        }
        completed
    }
}

impl SoftState {
    fn insert(&mut self, object: SoftObject) -> u64 {
        self.next_id += 1;
        let id = self.next_id;
        self.objects.insert(id, object);
        id
    }

    fn run(&mut self, submission: Submission) {
        self.execute(&submission.commands);
        if let Some((fence, value)) = submission.signal {
            match self.objects.get_mut(&fence.0) {
                Some(SoftObject::Fence(current)) => *current = (*current).max(value),
                _ => log::error!("Submission signals unknown fence {:?}", fence),
            }
        }
    }

    fn fence_value(&self, fence: NativeFence) -> Result<u64, NativeError> {
        match self.objects.get(&fence.0) {
            Some(SoftObject::Fence(value)) => Ok(*value),
            _ => Err(NativeError::InvalidHandle),
        }
    }

    fn create_image(&mut self, desc: &NativeSwapchainDesc) -> NativeTexture {
        let texture_desc = NativeTextureDesc {
            kind: rhi_core::api::TextureKind::Texture2D,
            width: desc.width,
            height: desc.height,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            format: desc.format,
            native_format: desc.native_format,
            sample_count: 1,
            bind_flags: rhi_core::api::BindFlags::RENDER_TARGET,
            misc_flags: rhi_core::api::ResourceMiscFlags::empty(),
            memory: MemoryKind::DeviceLocal,
        };
        NativeTexture(self.insert(SoftObject::Texture(SoftTexture::new(texture_desc))))
    }

    fn destroy_object(&mut self, raw: u64) {
        let Some(object) = self.objects.remove(&raw) else {
            log::warn!("Destroying unknown native object {}", raw);
            return;
        };
        self.stats.objects_destroyed += 1;
        match object {
            SoftObject::DescriptorPool(pool) => {
                for set in pool.sets {
                    self.sets.remove(&set);
                }
            }
            SoftObject::Swapchain(swapchain) => {
                for image in swapchain.images {
                    self.objects.remove(&image.0);
                }
            }
            _ => {}
        }
    }
}

impl NativeDevice for SoftDevice {
    fn adapter_info(&self) -> NativeAdapterInfo {
        self.info.clone()
    }

    fn create_buffer(
        &self,
        desc: &NativeBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeBuffer, NativeError> {
        if desc.size == 0 {
            return Err(NativeError::InvalidArgument("zero-sized buffer".into()));
        }
        let mut data = vec![0u8; desc.size as usize];
        if let Some(init) = initial_data {
            if init.len() as u64 > desc.size {
                return Err(NativeError::InvalidArgument(format!(
                    "{} bytes of initial data for a {} byte buffer",
                    init.len(),
                    desc.size
                )));
            }
            data[..init.len()].copy_from_slice(init);
        }
        let mut state = self.state();
        state.stats.buffers_created += 1;
        Ok(NativeBuffer(state.insert(SoftObject::Buffer(SoftBuffer {
            desc: desc.clone(),
            data,
        }))))
    }

    fn create_texture(
        &self,
        desc: &NativeTextureDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<NativeTexture, NativeError> {
        if desc.width == 0 || desc.height == 0 || desc.depth == 0 || desc.mip_levels == 0 {
            return Err(NativeError::InvalidArgument("zero-sized texture".into()));
        }
        let mut texture = SoftTexture::new(desc.clone());
        if let Some(init) = initial_data {
            for (index, sub) in init.iter().enumerate().take(texture.subresources.len()) {
                texture.write_subresource(index as u32, sub.data, sub.row_pitch, sub.slice_pitch);
            }
        }
        let mut state = self.state();
        state.stats.textures_created += 1;
        Ok(NativeTexture(state.insert(SoftObject::Texture(texture))))
    }

    fn create_view(&self, desc: &NativeViewDesc) -> Result<NativeView, NativeError> {
        let mut state = self.state();
        match desc.target {
            NativeViewTarget::Buffer(buffer) => {
                let size = state.buffer(buffer)?.desc.size;
                if desc.offset + desc.size > size {
                    return Err(NativeError::InvalidArgument(format!(
                        "view range {}..{} exceeds buffer of {} bytes",
                        desc.offset,
                        desc.offset + desc.size,
                        size
                    )));
                }
            }
            NativeViewTarget::Texture(texture) => {
                let t = state.texture(texture)?;
                if desc.first_mip + desc.mip_count > t.desc.mip_levels
                    || desc.first_slice + desc.slice_count > t.desc.array_size.max(t.desc.depth)
                {
                    return Err(NativeError::InvalidArgument(
                        "view subresource range exceeds texture".into(),
                    ));
                }
            }
            NativeViewTarget::AccelerationStructure(structure) => {
                state.acceleration_structure(structure)?;
            }
            NativeViewTarget::Null => {}
        }
        state.stats.views_created += 1;
        Ok(NativeView(state.insert(SoftObject::View(*desc))))
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<NativeSampler, NativeError> {
        let mut state = self.state();
        state.stats.samplers_created += 1;
        Ok(NativeSampler(state.insert(SoftObject::Sampler(*desc))))
    }

    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<NativeShader, NativeError> {
        if bytecode.is_empty() {
            return Err(NativeError::InvalidArgument("empty shader bytecode".into()));
        }
        let mut state = self.state();
        state.stats.shaders_created += 1;
        Ok(NativeShader(state.insert(SoftObject::Shader(stage))))
    }

    fn create_state_object(
        &self,
        desc: &NativeStateObjectDesc,
    ) -> Result<NativeStateObject, NativeError> {
        let mut state = self.state();
        if let NativeStateObjectDesc::InputLayout { vertex_shader, .. } = desc {
            match state.objects.get(&vertex_shader.0) {
                Some(SoftObject::Shader(ShaderStage::Vertex)) => {}
                _ => {
                    return Err(NativeError::InvalidArgument(
                        "input layout needs a vertex shader".into(),
                    ))
                }
            }
        }
        state.stats.state_objects_created += 1;
        Ok(NativeStateObject(state.insert(SoftObject::StateObject)))
    }

    fn create_pipeline_layout(
        &self,
        desc: &NativePipelineLayoutDesc,
    ) -> Result<NativePipelineLayout, NativeError> {
        let mut state = self.state();
        state.stats.pipeline_layouts_created += 1;
        Ok(NativePipelineLayout(
            state.insert(SoftObject::PipelineLayout(desc.clone())),
        ))
    }

    fn create_render_pass(&self, desc: &NativeRenderPassDesc) -> Result<NativeRenderPass, NativeError> {
        let mut state = self.state();
        state.stats.render_passes_created += 1;
        Ok(NativeRenderPass(state.insert(SoftObject::RenderPass(desc.clone()))))
    }

    fn create_graphics_pipeline(
        &self,
        desc: &NativeGraphicsPipelineDesc,
    ) -> Result<NativePipeline, NativeError> {
        let mut state = self.state();
        state.pipeline_layout(desc.layout)?;
        for (_, shader) in &desc.shaders {
            if !matches!(state.objects.get(&shader.0), Some(SoftObject::Shader(_))) {
                return Err(NativeError::InvalidHandle);
            }
        }
        if let Some(pass) = desc.render_pass {
            if !matches!(state.objects.get(&pass.0), Some(SoftObject::RenderPass(_))) {
                return Err(NativeError::InvalidHandle);
            }
        }
        state.stats.pipelines_created += 1;
        Ok(NativePipeline(state.insert(SoftObject::Pipeline {
            bind_point: BindPoint::Graphics,
        })))
    }

    fn create_compute_pipeline(
        &self,
        desc: &NativeComputePipelineDesc,
    ) -> Result<NativePipeline, NativeError> {
        let mut state = self.state();
        state.pipeline_layout(desc.layout)?;
        match state.objects.get(&desc.shader.0) {
            Some(SoftObject::Shader(ShaderStage::Compute)) => {}
            _ => return Err(NativeError::InvalidArgument("not a compute shader".into())),
        }
        state.stats.pipelines_created += 1;
        Ok(NativePipeline(state.insert(SoftObject::Pipeline {
            bind_point: BindPoint::Compute,
        })))
    }

    fn create_raytracing_pipeline(
        &self,
        desc: &NativeRaytracingPipelineDesc,
    ) -> Result<NativePipeline, NativeError> {
        if !self.info.features.contains(GraphicsDeviceCapability::RAYTRACING) {
            return Err(NativeError::Unsupported("ray tracing".into()));
        }
        let mut state = self.state();
        state.pipeline_layout(desc.layout)?;
        state.stats.pipelines_created += 1;
        Ok(NativePipeline(state.insert(SoftObject::Pipeline {
            bind_point: BindPoint::Raytracing,
        })))
    }

    fn acceleration_structure_size(&self, desc: &NativeAccelerationStructureDesc) -> u64 {
        let per_primitive = match desc.kind {
            rhi_core::api::AccelerationStructureKind::BottomLevel => 64,
            rhi_core::api::AccelerationStructureKind::TopLevel => 128,
        };
        (256 + desc.geometry_count as u64 * 64 + desc.primitive_count as u64 * per_primitive)
            .next_multiple_of(256)
    }

    fn create_acceleration_structure(
        &self,
        desc: &NativeAccelerationStructureDesc,
        buffer: NativeBuffer,
    ) -> Result<NativeAccelerationStructure, NativeError> {
        if !self.info.features.contains(GraphicsDeviceCapability::RAYTRACING) {
            return Err(NativeError::Unsupported("ray tracing".into()));
        }
        let required = self.acceleration_structure_size(desc);
        let mut state = self.state();
        if state.buffer(buffer)?.desc.size < required {
            return Err(NativeError::InvalidArgument(
                "acceleration structure buffer is too small".into(),
            ));
        }
        Ok(NativeAccelerationStructure(state.insert(
            SoftObject::AccelerationStructure(SoftAccelerationStructure {
                buffer,
                builds: 0,
            }),
        )))
    }

    fn create_query_heap(&self, desc: &NativeQueryHeapDesc) -> Result<NativeQueryHeap, NativeError> {
        let mut state = self.state();
        Ok(NativeQueryHeap(state.insert(SoftObject::QueryHeap(SoftQueryHeap {
            desc: *desc,
            results: vec![None; desc.count as usize],
        }))))
    }

    fn destroy(&self, object: NativeObject) {
        self.state().destroy_object(object.raw());
    }

    fn write_buffer(&self, buffer: NativeBuffer, offset: u64, data: &[u8]) -> Result<(), NativeError> {
        let mut state = self.state();
        let b = state.buffer_mut(buffer)?;
        if !b.desc.memory.is_host_visible() {
            return Err(NativeError::InvalidArgument("buffer is not host visible".into()));
        }
        b.write(offset, data)
    }

    fn read_buffer(&self, buffer: NativeBuffer, offset: u64, out: &mut [u8]) -> Result<(), NativeError> {
        let state = self.state();
        let b = state.buffer(buffer)?;
        if !b.desc.memory.is_host_visible() {
            return Err(NativeError::InvalidArgument("buffer is not host visible".into()));
        }
        let start = offset as usize;
        let end = start + out.len();
        if end > b.data.len() {
            return Err(NativeError::InvalidArgument("read past the end of the buffer".into()));
        }
        out.copy_from_slice(&b.data[start..end]);
        Ok(())
    }

    fn read_query(&self, heap: NativeQueryHeap, index: u32) -> Result<Option<u64>, NativeError> {
        let state = self.state();
        let heap = state.query_heap(heap)?;
        heap.results
            .get(index as usize)
            .copied()
            .ok_or_else(|| NativeError::InvalidArgument("query index out of range".into()))
    }

    fn create_descriptor_heap(
        &self,
        desc: &NativeDescriptorHeapDesc,
    ) -> Result<NativeDescriptorHeap, NativeError> {
        let limit = match desc.kind {
            DescriptorHeapKind::Resource => self.info.limits.max_resource_heap_descriptors,
            DescriptorHeapKind::Sampler => self.info.limits.max_sampler_heap_descriptors,
        };
        if desc.shader_visible && desc.capacity > limit {
            return Err(NativeError::OutOfMemory);
        }
        let mut state = self.state();
        state.stats.descriptor_heaps_created += 1;
        Ok(NativeDescriptorHeap(state.insert(SoftObject::DescriptorHeap(
            SoftHeap {
                desc: *desc,
                slots: vec![None; desc.capacity as usize],
            },
        ))))
    }

    fn write_descriptors(
        &self,
        heap: NativeDescriptorHeap,
        offset: u32,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        let h = state.heap_mut(heap)?;
        let start = offset as usize;
        let end = start + descriptors.len();
        if end > h.slots.len() {
            return Err(NativeError::InvalidArgument(format!(
                "descriptor range {}..{} exceeds heap of {}",
                start,
                end,
                h.slots.len()
            )));
        }
        for (slot, descriptor) in h.slots[start..end].iter_mut().zip(descriptors) {
            *slot = Some(*descriptor);
        }
        state.stats.descriptor_write_calls += 1;
        state.stats.descriptors_written += descriptors.len() as u64;
        Ok(())
    }

    fn copy_descriptors(
        &self,
        dst: NativeDescriptorHeap,
        dst_offset: u32,
        src: NativeDescriptorHeap,
        src_offset: u32,
        count: u32,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        let source = state.heap(src)?;
        let (s, n) = (src_offset as usize, count as usize);
        if s + n > source.slots.len() {
            return Err(NativeError::InvalidArgument("copy source out of range".into()));
        }
        let copied: Vec<_> = source.slots[s..s + n].to_vec();
        let destination = state.heap_mut(dst)?;
        let d = dst_offset as usize;
        if d + n > destination.slots.len() {
            return Err(NativeError::InvalidArgument("copy destination out of range".into()));
        }
        destination.slots[d..d + n].copy_from_slice(&copied);
        state.stats.descriptor_copy_calls += 1;
        Ok(())
    }

    fn create_descriptor_pool(
        &self,
        desc: &NativeDescriptorPoolDesc,
    ) -> Result<NativeDescriptorPool, NativeError> {
        let mut state = self.state();
        state.stats.descriptor_pools_created += 1;
        Ok(NativeDescriptorPool(state.insert(SoftObject::DescriptorPool(
            SoftPool {
                desc: *desc,
                sets: Vec::new(),
            },
        ))))
    }

    fn reset_descriptor_pool(&self, pool: NativeDescriptorPool) -> Result<(), NativeError> {
        let mut state = self.state();
        let sets = std::mem::take(&mut state.pool_mut(pool)?.sets);
        for set in sets {
            state.sets.remove(&set);
        }
        state.stats.descriptor_pool_resets += 1;
        Ok(())
    }

    fn allocate_descriptor_set(
        &self,
        pool: NativeDescriptorPool,
        layout: NativePipelineLayout,
        set_index: u32,
    ) -> Result<NativeDescriptorSet, NativeError> {
        let mut state = self.state();
        let size = set_size(state.pipeline_layout(layout)?, set_index)?;
        let p = state.pool(pool)?;
        if p.sets.len() as u32 >= p.desc.max_sets {
            return Err(NativeError::OutOfPoolMemory);
        }
        state.next_id += 1;
        let id = state.next_id;
        state.pool_mut(pool)?.sets.push(id);
        state.sets.insert(
            id,
            SoftSet {
                layout,
                slots: vec![None; size],
            },
        );
        state.stats.descriptor_sets_allocated += 1;
        Ok(NativeDescriptorSet(id))
    }

    fn update_descriptor_set(
        &self,
        set: NativeDescriptorSet,
        first_binding: u32,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        state.write_set(set, first_binding as usize, descriptors)?;
        state.stats.descriptor_write_calls += 1;
        state.stats.descriptors_written += descriptors.len() as u64;
        Ok(())
    }

    fn update_descriptor_set_with_template(
        &self,
        set: NativeDescriptorSet,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        state.write_set(set, 0, descriptors)?;
        state.stats.template_updates += 1;
        state.stats.descriptors_written += descriptors.len() as u64;
        Ok(())
    }

    fn create_command_buffer(&self, queue: QueueKind) -> Result<NativeCommandBuffer, NativeError> {
        let mut state = self.state();
        Ok(NativeCommandBuffer(state.insert(SoftObject::CommandBuffer(
            SoftCommandBuffer {
                queue,
                recording: false,
                commands: Vec::new(),
            },
        ))))
    }

    fn begin_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<(), NativeError> {
        let mut state = self.state();
        let cb = state.command_buffer_mut(cmd)?;
        cb.commands.clear();
        cb.recording = true;
        Ok(())
    }

    fn record(&self, cmd: NativeCommandBuffer, command: NativeCommand) {
        let mut state = self.state();
        let name = command.name();
        match state.command_buffer_mut(cmd) {
            Ok(cb) if cb.recording => cb.commands.push(command),
            Ok(_) => {
                log::warn!("Dropping `{}` recorded into closed command buffer {:?}", name, cmd);
                return;
            }
            Err(_) => {
                log::warn!("Dropping `{}` recorded into unknown command buffer {:?}", name, cmd);
                return;
            }
        }
        *state.stats.commands.entry(name).or_insert(0) += 1;
    }

    fn end_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<(), NativeError> {
        let mut state = self.state();
        let cb = state.command_buffer_mut(cmd)?;
        if !cb.recording {
            return Err(NativeError::InvalidArgument("command buffer is not recording".into()));
        }
        cb.recording = false;
        Ok(())
    }

    fn create_fence(&self, initial_value: u64) -> Result<NativeFence, NativeError> {
        let mut state = self.state();
        Ok(NativeFence(state.insert(SoftObject::Fence(initial_value))))
    }

    fn submit(
        &self,
        queue: QueueKind,
        command_buffers: &[NativeCommandBuffer],
        waits: &[(NativeFence, u64)],
        signal: Option<(NativeFence, u64)>,
    ) -> Result<(), NativeError> {
        let mut state = self.state();
        let mut commands = Vec::new();
        for cmd in command_buffers {
            let cb = state.command_buffer_mut(*cmd)?;
            if cb.recording {
                return Err(NativeError::InvalidArgument(
                    "submitted command buffer is still recording".into(),
                ));
            }
            if cb.queue != queue {
                return Err(NativeError::InvalidArgument(format!(
                    "{:?} command buffer submitted to the {:?} queue",
                    cb.queue, queue
                )));
            }
            commands.extend(cb.commands.iter().cloned());
        }
        for (fence, _) in waits {
            state.fence_value(*fence)?;
        }
        state.stats.submissions += 1;
        let submission = Submission { commands, signal };
        match self.mode {
            ExecutionMode::Immediate => {
                state.run(submission);
                drop(state);
                self.progress.notify_all();
            }
            ExecutionMode::Manual => state.pending.push_back(submission),
        }
        Ok(())
    }

    fn fence_value(&self, fence: NativeFence) -> u64 {
        self.state().fence_value(fence).unwrap_or(0)
    }

    fn wait_fence(&self, fence: NativeFence, value: u64) -> Result<(), NativeError> {
        let mut state = self.state();
        loop {
            if state.fence_value(fence)? >= value {
                return Ok(());
            }
            let signaled_later = state
                .pending
                .iter()
                .any(|s| matches!(s.signal, Some((f, v)) if f == fence && v >= value));
            if !signaled_later {
                return Err(NativeError::InvalidArgument(format!(
                    "fence {:?} will never reach {}",
                    fence, value
                )));
            }
            state = self
                .progress
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
    }

    fn wait_idle(&self) -> Result<(), NativeError> {
        let mut state = self.state();
        while !state.pending.is_empty() {
            state = self
                .progress
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        Ok(())
    }

    fn create_swapchain(
        &self,
        desc: &NativeSwapchainDesc,
        _window: Option<RawWindowHandle>,
    ) -> Result<NativeSwapchain, NativeError> {
        if desc.buffer_count == 0 || desc.width == 0 || desc.height == 0 {
            return Err(NativeError::InvalidArgument("empty swapchain".into()));
        }
        let mut state = self.state();
        let images = (0..desc.buffer_count)
            .map(|_| state.create_image(desc))
            .collect();
        Ok(NativeSwapchain(state.insert(SoftObject::Swapchain(
            SoftSwapchain {
                desc: *desc,
                images,
                next: 0,
            },
        ))))
    }

    fn swapchain_images(&self, swapchain: NativeSwapchain) -> Result<Vec<NativeTexture>, NativeError> {
        Ok(self.state().swapchain(swapchain)?.images.clone())
    }

    fn resize_swapchain(
        &self,
        swapchain: NativeSwapchain,
        width: u32,
        height: u32,
    ) -> Result<(), NativeError> {
        if width == 0 || height == 0 {
            return Err(NativeError::InvalidArgument("empty swapchain".into()));
        }
        let mut state = self.state();
        let mut desc = state.swapchain(swapchain)?.desc;
        desc.width = width;
        desc.height = height;
        let old = std::mem::take(&mut state.swapchain_mut(swapchain)?.images);
        for image in old {
            state.objects.remove(&image.0);
        }
        let images = (0..desc.buffer_count)
            .map(|_| state.create_image(&desc))
            .collect();
        let sc = state.swapchain_mut(swapchain)?;
        sc.desc = desc;
        sc.images = images;
        sc.next = 0;
        Ok(())
    }

    fn acquire_next_image(&self, swapchain: NativeSwapchain) -> Result<u32, NativeError> {
        let mut state = self.state();
        let sc = state.swapchain_mut(swapchain)?;
        let index = sc.next;
        sc.next = (sc.next + 1) % sc.desc.buffer_count;
        Ok(index)
    }

    fn present(&self, swapchain: NativeSwapchain, _vsync: bool) -> Result<(), NativeError> {
        let mut state = self.state();
        state.swapchain(swapchain)?;
        state.stats.presents += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::api::{BindFlags, BindingLayout, Format, ResourceMiscFlags, ShaderBinding, TextureKind, ViewDimension};

    fn upload_buffer(device: &SoftDevice, size: u64) -> NativeBuffer {
        device
            .create_buffer(
                &NativeBufferDesc {
                    size,
                    memory: MemoryKind::Upload,
                    bind_flags: BindFlags::empty(),
                    misc_flags: ResourceMiscFlags::empty(),
                    stride: 0,
                },
                None,
            )
            .unwrap()
    }

    fn recorded(device: &SoftDevice, commands: Vec<NativeCommand>) -> NativeCommandBuffer {
        let cmd = device.create_command_buffer(QueueKind::Graphics).unwrap();
        device.begin_command_buffer(cmd).unwrap();
        for command in commands {
            device.record(cmd, command);
        }
        device.end_command_buffer(cmd).unwrap();
        cmd
    }

    #[test]
    fn test_immediate_submit_executes_and_signals() {
        // --- ARRANGE ---
        let device = SoftDevice::new();
        let src = device.create_buffer(
            &NativeBufferDesc {
                size: 4,
                memory: MemoryKind::Upload,
                bind_flags: BindFlags::empty(),
                misc_flags: ResourceMiscFlags::empty(),
                stride: 0,
            },
            Some(&[1, 2, 3, 4]),
        ).unwrap();
        let dst = upload_buffer(&device, 4);
        let fence = device.create_fence(0).unwrap();
        let cmd = recorded(
            &device,
            vec![NativeCommand::CopyBuffer { src, src_offset: 0, dst, dst_offset: 0, size: 4 }],
        );

        // --- ACT ---
        device.submit(QueueKind::Graphics, &[cmd], &[], Some((fence, 1))).unwrap();

        // --- ASSERT ---
        assert_eq!(device.fence_value(fence), 1);
        assert_eq!(device.buffer_contents(dst).unwrap(), vec![1, 2, 3, 4]);
        assert_eq!(device.stats().command_count("copy_buffer"), 1);
    }

    #[test]
    fn test_manual_mode_defers_until_completed() {
        let device = SoftDevice::with_mode(ExecutionMode::Manual);
        let buffer = upload_buffer(&device, 4);
        let fence = device.create_fence(0).unwrap();
        let cmd = recorded(
            &device,
            vec![NativeCommand::UpdateBuffer { buffer, offset: 0, data: vec![9; 4] }],
        );

        device.submit(QueueKind::Graphics, &[cmd], &[], Some((fence, 1))).unwrap();
        assert_eq!(device.fence_value(fence), 0);
        assert_eq!(device.pending_submissions(), 1);

        assert!(device.complete_next());
        assert!(!device.complete_next());
        assert_eq!(device.fence_value(fence), 1);
        assert_eq!(device.buffer_contents(buffer).unwrap(), vec![9; 4]);
    }

    #[test]
    fn test_waiting_for_an_unreachable_value_fails() {
        let device = SoftDevice::new();
        let fence = device.create_fence(3).unwrap();
        assert!(device.wait_fence(fence, 2).is_ok());
        assert!(device.wait_fence(fence, 4).is_err());
    }

    #[test]
    fn test_descriptor_pool_runs_out_of_sets() {
        let device = SoftDevice::new();
        let layout = device
            .create_pipeline_layout(&NativePipelineLayoutDesc {
                bindings: BindingLayout::from_bindings([
                    ShaderBinding::constant_buffer(0),
                    ShaderBinding::resource(1, ViewDimension::Texture2D),
                ]),
                tables: Vec::new(),
            })
            .unwrap();
        let pool = device
            .create_descriptor_pool(&NativeDescriptorPoolDesc { max_sets: 2, descriptors_per_set: 8 })
            .unwrap();

        device.allocate_descriptor_set(pool, layout, 0).unwrap();
        let set = device.allocate_descriptor_set(pool, layout, 0).unwrap();
        let third = device.allocate_descriptor_set(pool, layout, 0);

        assert_eq!(third, Err(NativeError::OutOfPoolMemory));
        // One constant buffer and two shader resource slots.
        assert!(device
            .update_descriptor_set_with_template(set, &[NativeDescriptor::NullConstantBuffer; 3])
            .is_ok());
        assert!(device
            .update_descriptor_set_with_template(set, &[NativeDescriptor::NullConstantBuffer; 4])
            .is_err());

        device.reset_descriptor_pool(pool).unwrap();
        assert!(!device.is_alive(set.0));
        assert!(device.allocate_descriptor_set(pool, layout, 0).is_ok());
    }

    #[test]
    fn test_render_pass_clear_writes_texels() {
        let device = SoftDevice::new();
        let texture = device
            .create_texture(
                &NativeTextureDesc {
                    kind: TextureKind::Texture2D,
                    width: 2,
                    height: 2,
                    depth: 1,
                    array_size: 1,
                    mip_levels: 1,
                    format: Format::R8G8B8A8Unorm,
                    native_format: 0,
                    sample_count: 1,
                    bind_flags: BindFlags::RENDER_TARGET,
                    misc_flags: ResourceMiscFlags::empty(),
                    memory: MemoryKind::DeviceLocal,
                },
                None,
            )
            .unwrap();
        let mut view_desc = NativeViewDesc::null(ViewKind::RenderTarget, ViewDimension::Texture2D);
        view_desc.target = NativeViewTarget::Texture(texture);
        let view = device.create_view(&view_desc).unwrap();
        let cmd = recorded(
            &device,
            vec![
                NativeCommand::BeginRenderPass {
                    render_pass: None,
                    colors: vec![NativeColorTarget {
                        view,
                        load_op: rhi_core::api::LoadOp::Clear,
                        store_op: rhi_core::api::StoreOp::Store,
                        clear_color: [0.0, 1.0, 0.0, 1.0],
                        resolve: None,
                    }],
                    depth_stencil: None,
                },
                NativeCommand::EndRenderPass,
            ],
        );

        device.submit(QueueKind::Graphics, &[cmd], &[], None).unwrap();

        assert_eq!(device.texture_subresource(texture, 0).unwrap(), [0, 255, 0, 255].repeat(4));
    }

    #[test]
    fn test_destroyed_objects_are_counted_as_stale() {
        let device = SoftDevice::new();
        let buffer = upload_buffer(&device, 16);
        let cmd = recorded(
            &device,
            vec![NativeCommand::UpdateBuffer { buffer, offset: 0, data: vec![0; 4] }],
        );
        device.destroy(buffer.into());

        device.submit(QueueKind::Graphics, &[cmd], &[], None).unwrap();

        assert_eq!(device.stats().stale_references, 1);
        assert_eq!(device.stats().objects_destroyed, 1);
    }
}
