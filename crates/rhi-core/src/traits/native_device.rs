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

use raw_window_handle::RawWindowHandle;
use std::fmt::Debug;

use crate::api::{SamplerDesc, ShaderStage, SubresourceData};
use crate::error::NativeError;
use crate::native::*;

/// The native graphics API a backend drives.
///
/// Every method maps onto a call of a real graphics API; handles are plain
/// integers owned by the implementation. Implementations must be callable from
/// any thread. Objects passed to [`NativeDevice::destroy`] must no longer be
/// referenced by pending GPU work; the RHI guarantees this through deferred
/// destruction.
pub trait NativeDevice: Send + Sync + Debug + 'static {
    /// Identity, features and limits of the adapter.
    fn adapter_info(&self) -> NativeAdapterInfo;

    // --- Objects ---

    /// Creates a buffer, optionally filled at creation time.
    fn create_buffer(
        &self,
        desc: &NativeBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<NativeBuffer, NativeError>;

    /// Creates a texture, optionally filled at creation time (one entry per subresource).
    fn create_texture(
        &self,
        desc: &NativeTextureDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<NativeTexture, NativeError>;

    /// Creates a view of a buffer, texture or acceleration structure, or a null view.
    fn create_view(&self, desc: &NativeViewDesc) -> Result<NativeView, NativeError>;

    /// Creates a sampler.
    fn create_sampler(&self, desc: &SamplerDesc) -> Result<NativeSampler, NativeError>;

    /// Creates a shader module from bytecode.
    fn create_shader(&self, stage: ShaderStage, bytecode: &[u8]) -> Result<NativeShader, NativeError>;

    /// Creates a fixed-function state block.
    fn create_state_object(
        &self,
        desc: &NativeStateObjectDesc,
    ) -> Result<NativeStateObject, NativeError>;

    /// Creates a root signature or pipeline layout.
    fn create_pipeline_layout(
        &self,
        desc: &NativePipelineLayoutDesc,
    ) -> Result<NativePipelineLayout, NativeError>;

    /// Creates a render pass object.
    fn create_render_pass(&self, desc: &NativeRenderPassDesc) -> Result<NativeRenderPass, NativeError>;

    /// Compiles a graphics pipeline.
    fn create_graphics_pipeline(
        &self,
        desc: &NativeGraphicsPipelineDesc,
    ) -> Result<NativePipeline, NativeError>;

    /// Compiles a compute pipeline.
    fn create_compute_pipeline(
        &self,
        desc: &NativeComputePipelineDesc,
    ) -> Result<NativePipeline, NativeError>;

    /// Compiles a ray tracing pipeline.
    fn create_raytracing_pipeline(
        &self,
        desc: &NativeRaytracingPipelineDesc,
    ) -> Result<NativePipeline, NativeError>;

    /// Bytes of backing memory an acceleration structure needs.
    fn acceleration_structure_size(&self, desc: &NativeAccelerationStructureDesc) -> u64;

    /// Creates an acceleration structure placed in `buffer`.
    fn create_acceleration_structure(
        &self,
        desc: &NativeAccelerationStructureDesc,
        buffer: NativeBuffer,
    ) -> Result<NativeAccelerationStructure, NativeError>;

    /// Creates a query heap.
    fn create_query_heap(&self, desc: &NativeQueryHeapDesc) -> Result<NativeQueryHeap, NativeError>;

    /// Destroys an object immediately.
    fn destroy(&self, object: NativeObject);

    // --- Host access ---

    /// Writes host-visible buffer memory.
    fn write_buffer(&self, buffer: NativeBuffer, offset: u64, data: &[u8]) -> Result<(), NativeError>;

    /// Reads host-visible buffer memory.
    fn read_buffer(&self, buffer: NativeBuffer, offset: u64, out: &mut [u8]) -> Result<(), NativeError>;

    /// Reads a resolved query value, or `None` while the GPU has not reached it.
    fn read_query(&self, heap: NativeQueryHeap, index: u32) -> Result<Option<u64>, NativeError>;

    // --- Descriptors ---

    /// Creates a descriptor heap.
    fn create_descriptor_heap(
        &self,
        desc: &NativeDescriptorHeapDesc,
    ) -> Result<NativeDescriptorHeap, NativeError>;

    /// Writes consecutive descriptors into a heap with one call.
    fn write_descriptors(
        &self,
        heap: NativeDescriptorHeap,
        offset: u32,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError>;

    /// Copies a range of descriptors between heaps with one call.
    fn copy_descriptors(
        &self,
        dst: NativeDescriptorHeap,
        dst_offset: u32,
        src: NativeDescriptorHeap,
        src_offset: u32,
        count: u32,
    ) -> Result<(), NativeError>;

    /// Creates a descriptor pool.
    fn create_descriptor_pool(
        &self,
        desc: &NativeDescriptorPoolDesc,
    ) -> Result<NativeDescriptorPool, NativeError>;

    /// Frees every set allocated from a pool.
    fn reset_descriptor_pool(&self, pool: NativeDescriptorPool) -> Result<(), NativeError>;

    /// Allocates the set `set_index` of `layout` from `pool`.
    ///
    /// Fails with [`NativeError::OutOfPoolMemory`] when the pool is exhausted.
    fn allocate_descriptor_set(
        &self,
        pool: NativeDescriptorPool,
        layout: NativePipelineLayout,
        set_index: u32,
    ) -> Result<NativeDescriptorSet, NativeError>;

    /// Writes consecutive bindings of a set.
    fn update_descriptor_set(
        &self,
        set: NativeDescriptorSet,
        first_binding: u32,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError>;

    /// Writes a whole set from a pre-built update template with one call.
    fn update_descriptor_set_with_template(
        &self,
        set: NativeDescriptorSet,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError>;

    // --- Recording and submission ---

    /// Creates a command buffer for `queue`.
    fn create_command_buffer(&self, queue: QueueKind) -> Result<NativeCommandBuffer, NativeError>;

    /// Resets a command buffer and opens it for recording.
    fn begin_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<(), NativeError>;

    /// Appends a command to an open command buffer.
    fn record(&self, cmd: NativeCommandBuffer, command: NativeCommand);

    /// Closes a command buffer.
    fn end_command_buffer(&self, cmd: NativeCommandBuffer) -> Result<(), NativeError>;

    /// Creates a timeline fence.
    fn create_fence(&self, initial_value: u64) -> Result<NativeFence, NativeError>;

    /// Submits closed command buffers to a queue.
    ///
    /// Execution starts once every `(fence, value)` in `waits` is reached and
    /// `signal` is set when the work completes.
    fn submit(
        &self,
        queue: QueueKind,
        command_buffers: &[NativeCommandBuffer],
        waits: &[(NativeFence, u64)],
        signal: Option<(NativeFence, u64)>,
    ) -> Result<(), NativeError>;

    /// The last value the GPU signaled on `fence`.
    fn fence_value(&self, fence: NativeFence) -> u64;

    /// Blocks until `fence` reaches `value`.
    fn wait_fence(&self, fence: NativeFence, value: u64) -> Result<(), NativeError>;

    /// Blocks until every submitted command buffer has completed.
    fn wait_idle(&self) -> Result<(), NativeError>;

    // --- Presentation ---

    /// Creates a swapchain for a window, or an offscreen one without a window.
    fn create_swapchain(
        &self,
        desc: &NativeSwapchainDesc,
        window: Option<RawWindowHandle>,
    ) -> Result<NativeSwapchain, NativeError>;

    /// The images of a swapchain, owned by the swapchain.
    fn swapchain_images(&self, swapchain: NativeSwapchain) -> Result<Vec<NativeTexture>, NativeError>;

    /// Recreates the images of a swapchain at a new size.
    fn resize_swapchain(
        &self,
        swapchain: NativeSwapchain,
        width: u32,
        height: u32,
    ) -> Result<(), NativeError>;

    /// Index of the image to render into next.
    fn acquire_next_image(&self, swapchain: NativeSwapchain) -> Result<u32, NativeError>;

    /// Presents the acquired image.
    fn present(&self, swapchain: NativeSwapchain, vsync: bool) -> Result<(), NativeError>;
}
