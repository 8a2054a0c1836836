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

//! The caller-facing device façade.

use std::fmt::Debug;

use crate::api::*;
use crate::error::RhiError;

/// A graphics device: the single entry point for creating resources, recording
/// command lists and submitting frames.
///
/// Creation functions return [`RhiError`] on failure. Recording functions take a
/// [`CommandList`] obtained from [`GraphicsDevice::begin_command_list`] in the
/// current frame; they have no error channel and panic on violated
/// preconditions such as an out-of-range slot.
///
/// Different command lists may be recorded concurrently from different threads.
/// A single command list must only be recorded from one thread at a time.
pub trait GraphicsDevice: Send + Sync + Debug + 'static {
    // --- Resource creation ---

    /// Creates a GPU buffer.
    /// ## Arguments
    /// * `desc` - Size, usage and bind flags of the buffer.
    /// * `initial_data` - Optional contents, at most `desc.size` bytes.
    /// ## Returns
    /// The buffer handle, with default views created for every bind flag.
    /// ## Errors
    /// * `RhiError::InvalidDescriptor` - If the description violates its invariants.
    /// * `RhiError::Native` - If the native API fails.
    fn create_buffer(
        &self,
        desc: &GpuBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<GpuBuffer, RhiError>;

    /// Creates a texture.
    /// ## Arguments
    /// * `desc` - The texture description. A `mip_levels` of 0 derives the full chain.
    /// * `initial_data` - Optional contents, one entry per subresource in
    ///   mip-major order within each array slice.
    /// ## Returns
    /// The texture handle, with default views created for every bind flag.
    /// ## Errors
    /// * `RhiError::InvalidDescriptor` - If the description violates its invariants.
    /// * `RhiError::Native` - If the native API fails.
    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<Texture, RhiError>;

    /// Creates a shader from compiled bytecode.
    ///
    /// `reflection` lists the slots the shader reads. Without it the shader is
    /// assumed to read every slot.
    fn create_shader(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
        reflection: Option<&[ShaderBinding]>,
    ) -> Result<Shader, RhiError>;

    /// Creates a sampler.
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, RhiError>;

    /// Creates a query.
    fn create_query(&self, desc: &GpuQueryDesc) -> Result<GpuQuery, RhiError>;

    /// Creates a graphics pipeline.
    ///
    /// Flat-slot backends build their state objects here. Backends with
    /// render-pass-typed pipelines defer the native compile to the first draw.
    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<PipelineState, RhiError>;

    /// Creates a render pass.
    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPass, RhiError>;

    /// Creates an acceleration structure and its backing buffer.
    /// ## Errors
    /// * `RhiError::Unsupported` - If the device lacks ray tracing.
    fn create_raytracing_acceleration_structure(
        &self,
        desc: &RaytracingAccelerationStructureDesc,
    ) -> Result<AccelerationStructure, RhiError>;

    /// Creates a ray tracing pipeline.
    /// ## Errors
    /// * `RhiError::Unsupported` - If the device lacks ray tracing.
    fn create_raytracing_pipeline_state(
        &self,
        desc: &RaytracingPipelineStateDesc,
    ) -> Result<RaytracingPipelineState, RhiError>;

    /// Creates an explicit descriptor table.
    /// ## Errors
    /// * `RhiError::Unsupported` - On flat-slot backends.
    fn create_descriptor_table(
        &self,
        layout: &DescriptorTableLayout,
    ) -> Result<DescriptorTable, RhiError>;

    /// Writes one descriptor of a table.
    ///
    /// `range_index` counts resource ranges first, then sampler ranges.
    fn write_descriptor_table(
        &self,
        table: &DescriptorTable,
        range_index: usize,
        array_index: u32,
        write: DescriptorWrite<'_>,
    ) -> Result<(), RhiError>;

    /// Creates an additional view over a range of a texture.
    /// ## Arguments
    /// * `kind` - Which view class to create.
    /// * `first_slice`, `slice_count` - Array range; `None` means all remaining slices.
    /// * `first_mip`, `mip_count` - Mip range; `None` means all remaining mips.
    /// ## Returns
    /// `-1` if this became the default view, else the index of the new view
    /// among the explicit views of that class (0, 1, ...).
    fn create_texture_subresource(
        &self,
        texture: &Texture,
        kind: SubresourceType,
        first_slice: u32,
        slice_count: Option<u32>,
        first_mip: u32,
        mip_count: Option<u32>,
    ) -> Result<i32, RhiError>;

    /// Creates an additional view over a byte range of a buffer.
    ///
    /// Returns the view index with the same convention as
    /// [`GraphicsDevice::create_texture_subresource`].
    fn create_buffer_subresource(
        &self,
        buffer: &GpuBuffer,
        kind: SubresourceType,
        offset: u64,
        size: Option<u64>,
    ) -> Result<i32, RhiError>;

    /// Number of explicit views of `kind` on a resource.
    fn subresource_count(&self, resource: &GpuResource, kind: SubresourceType) -> usize;

    /// Maps a host-visible buffer for CPU access.
    fn map(&self, buffer: &GpuBuffer, mode: MapMode) -> Result<Mapping, RhiError>;

    /// Returns a mapping, writing it back if it was opened for writing.
    fn unmap(&self, buffer: &GpuBuffer, mapping: Mapping) -> Result<(), RhiError>;

    // --- Frame control ---

    /// Reserves the next command list and resets its state for the current frame.
    ///
    /// Panics if [`COMMANDLIST_COUNT`] lists are already open.
    fn begin_command_list(&self) -> CommandList;

    /// Closes and submits every command list begun this frame, then advances
    /// the frame. Blocks while more frames than the swapchain holds are in flight.
    fn submit_command_lists(&self);

    /// Flushes pending work and blocks until the GPU is idle.
    fn wait_for_gpu(&self);

    /// Begins the back buffer render pass, clearing to the configured color.
    fn present_begin(&self, cmd: CommandList);

    /// Ends the back buffer render pass, submits the frame and presents.
    fn present_end(&self, cmd: CommandList);

    /// Destroys every cached pipeline after the GPU is done with them.
    fn clear_pipeline_state_cache(&self);

    /// Resizes the swapchain.
    fn set_resolution(&self, width: u32, height: u32) -> Result<(), RhiError>;

    /// The swapchain image of the current frame.
    fn back_buffer(&self) -> Texture;

    /// Frames submitted so far.
    fn frame_count(&self) -> u64;

    /// Optional features of this device.
    fn capabilities(&self) -> GraphicsDeviceCapability;

    /// Whether every feature in `capability` is supported.
    fn check_capability(&self, capability: GraphicsDeviceCapability) -> bool {
        self.capabilities().contains(capability)
    }

    /// Adapter and backend identity.
    fn adapter_info(&self) -> AdapterInfo;

    /// Timestamp query ticks per second.
    fn timestamp_frequency(&self) -> u64;

    /// Bytes per texel (or block) of `format`.
    fn format_stride(&self, format: Format) -> u32 {
        format.bytes_per_block()
    }

    // --- Binding ---

    /// Sets the viewports.
    fn bind_viewports(&self, viewports: &[Viewport], cmd: CommandList);

    /// Sets the scissor rectangles.
    fn bind_scissor_rects(&self, rects: &[Rect], cmd: CommandList);

    /// Binds a shader resource view to `slot` of `stage`.
    ///
    /// An empty resource binds a null view. Rebinding the identical view is a no-op.
    fn bind_resource(
        &self,
        stage: ShaderStage,
        resource: &GpuResource,
        slot: u32,
        cmd: CommandList,
        subresource: i32,
    );

    /// Binds default shader resource views to consecutive slots.
    fn bind_resources(
        &self,
        stage: ShaderStage,
        resources: &[&GpuResource],
        slot: u32,
        cmd: CommandList,
    );

    /// Binds an unordered access view to `slot` of `stage`.
    fn bind_uav(
        &self,
        stage: ShaderStage,
        resource: &GpuResource,
        slot: u32,
        cmd: CommandList,
        subresource: i32,
    );

    /// Binds default unordered access views to consecutive slots.
    fn bind_uavs(&self, stage: ShaderStage, resources: &[&GpuResource], slot: u32, cmd: CommandList);

    /// Clears `count` shader resource slots starting at `slot`, on every stage.
    fn unbind_resources(&self, slot: u32, count: u32, cmd: CommandList);

    /// Clears `count` unordered access slots starting at `slot`, on every stage.
    fn unbind_uavs(&self, slot: u32, count: u32, cmd: CommandList);

    /// Binds a sampler to `slot` of `stage`.
    fn bind_sampler(&self, stage: ShaderStage, sampler: &Sampler, slot: u32, cmd: CommandList);

    /// Binds a constant buffer, starting `offset` bytes in, to `slot` of `stage`.
    fn bind_constant_buffer(
        &self,
        stage: ShaderStage,
        buffer: &GpuBuffer,
        slot: u32,
        cmd: CommandList,
        offset: u64,
    );

    /// Binds vertex buffers to consecutive input slots.
    fn bind_vertex_buffers(
        &self,
        buffers: &[&GpuBuffer],
        slot: u32,
        strides: &[u32],
        offsets: Option<&[u64]>,
        cmd: CommandList,
    );

    /// Binds the index buffer.
    fn bind_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat, offset: u64, cmd: CommandList);

    /// Sets the stencil reference value.
    fn bind_stencil_ref(&self, value: u32, cmd: CommandList);

    /// Sets the blend factor.
    fn bind_blend_factor(&self, factor: [f32; 4], cmd: CommandList);

    /// Makes `pso` the active graphics pipeline. Rebinding the active pipeline is a no-op.
    fn bind_pipeline_state(&self, pso: &PipelineState, cmd: CommandList);

    /// Makes `shader` the active compute shader.
    fn bind_compute_shader(&self, shader: &Shader, cmd: CommandList);

    /// Binds an explicit descriptor table to `space` of `bind_point`.
    fn bind_descriptor_table(
        &self,
        bind_point: BindPoint,
        space: u32,
        table: &DescriptorTable,
        cmd: CommandList,
    );

    /// Makes `pso` the active ray tracing pipeline.
    fn bind_raytracing_pipeline_state(&self, pso: &RaytracingPipelineState, cmd: CommandList);

    // --- Passes and work ---

    /// Begins a render pass.
    fn render_pass_begin(&self, pass: &RenderPass, cmd: CommandList);

    /// Ends the active render pass.
    fn render_pass_end(&self, cmd: CommandList);

    /// Draws non-indexed geometry.
    fn draw(&self, vertex_count: u32, start_vertex: u32, cmd: CommandList);

    /// Draws indexed geometry.
    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32, cmd: CommandList);

    /// Draws instanced non-indexed geometry.
    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
        cmd: CommandList,
    );

    /// Draws instanced indexed geometry.
    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
        cmd: CommandList,
    );

    /// Draws with [`IndirectDrawArgsInstanced`] read from `args` at `offset`.
    fn draw_instanced_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList);

    /// Draws with [`IndirectDrawArgsIndexedInstanced`] read from `args` at `offset`.
    fn draw_indexed_instanced_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList);

    /// Dispatches compute thread groups.
    fn dispatch(&self, x: u32, y: u32, z: u32, cmd: CommandList);

    /// Dispatches with [`IndirectDispatchArgs`] read from `args` at `offset`.
    fn dispatch_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList);

    /// Dispatches mesh shader thread groups.
    fn dispatch_mesh(&self, x: u32, y: u32, z: u32, cmd: CommandList);

    /// Dispatches mesh shading with arguments read from `args` at `offset`.
    fn dispatch_mesh_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList);

    /// Traces rays with the active ray tracing pipeline.
    fn dispatch_rays(&self, desc: &DispatchRaysDesc, cmd: CommandList);

    /// Builds `dst`, or refits it from `src`.
    fn build_raytracing_acceleration_structure(
        &self,
        dst: &AccelerationStructure,
        cmd: CommandList,
        src: Option<&AccelerationStructure>,
    );

    // --- Transfers and synchronization ---

    /// Copies a whole resource. Texture to buffer copies are tightly packed.
    fn copy_resource(&self, dst: &GpuResource, src: &GpuResource, cmd: CommandList);

    /// Copies a byte range between buffers.
    fn copy_buffer_region(
        &self,
        dst: &GpuBuffer,
        dst_offset: u64,
        src: &GpuBuffer,
        src_offset: u64,
        size: u64,
        cmd: CommandList,
    );

    /// Updates buffer contents as seen by work recorded after this call.
    fn update_buffer(&self, buffer: &GpuBuffer, data: &[u8], cmd: CommandList);

    /// Records explicit barriers.
    fn barrier(&self, barriers: &[GpuBarrier<'_>], cmd: CommandList);

    /// Allocates transient upload memory valid for this frame only.
    fn allocate_gpu(&self, size: u64, cmd: CommandList) -> GpuAllocation;

    /// Copies `data` into a transient allocation at `offset` bytes into it.
    ///
    /// ## Errors
    ///
    /// Fails if the write does not fit inside the allocation.
    fn write_allocation(
        &self,
        allocation: &GpuAllocation,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RhiError>;

    // --- Queries ---

    /// Begins an occlusion query.
    fn query_begin(&self, query: &GpuQuery, cmd: CommandList);

    /// Ends a query, or writes a timestamp.
    fn query_end(&self, query: &GpuQuery, cmd: CommandList);

    /// Reads a query without blocking.
    fn query_read(&self, query: &GpuQuery) -> QueryRead;

    /// Reads a query, spinning until the result is available.
    ///
    /// ## Errors
    ///
    /// Fails instead of spinning when the query was never ended in a
    /// submitted command list, or when the native read fails.
    fn query_read_blocking(&self, query: &GpuQuery) -> Result<GpuQueryResult, RhiError>;

    // --- Debug annotation ---

    /// Opens a named event region.
    fn event_begin(&self, name: &str, cmd: CommandList);

    /// Closes the innermost event region.
    fn event_end(&self, cmd: CommandList);

    /// Inserts a named marker.
    fn set_marker(&self, name: &str, cmd: CommandList);
}
