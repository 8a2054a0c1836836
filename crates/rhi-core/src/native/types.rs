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

//! Creation descriptions and small value types of the native seam.

use crate::api::{
    AccelerationStructureFlags, AccelerationStructureKind, AttachmentKind, BindFlags,
    BindingLayout, BlendState, DepthStencilState, DescriptorTableLayout, DeviceType, Format,
    GpuQueryKind, GraphicsDeviceCapability, InputLayout, LoadOp, PrimitiveTopology,
    RasterizerState, ResourceMiscFlags, ShaderStage, StoreOp, TextureKind, ViewDimension,
};

use super::{
    NativeAccelerationStructure, NativeBuffer, NativePipelineLayout, NativeRenderPass,
    NativeSampler, NativeShader, NativeTexture, NativeView,
};

/// The heap a native allocation lives in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum MemoryKind {
    /// GPU-only memory.
    #[default]
    DeviceLocal,
    /// CPU-writable, GPU-readable memory.
    Upload,
    /// GPU-writable, CPU-readable memory.
    Readback,
}

impl MemoryKind {
    /// Whether the CPU can access the memory.
    pub fn is_host_visible(self) -> bool {
        !matches!(self, MemoryKind::DeviceLocal)
    }
}

/// A hardware queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum QueueKind {
    /// Graphics and everything else.
    Graphics,
    /// Asynchronous compute.
    Compute,
    /// Transfer only.
    Copy,
}

/// Describes a native buffer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeBufferDesc {
    /// Size in bytes.
    pub size: u64,
    /// Memory heap.
    pub memory: MemoryKind,
    /// Usage flags.
    pub bind_flags: BindFlags,
    /// Miscellaneous options.
    pub misc_flags: ResourceMiscFlags,
    /// Structure stride.
    pub stride: u32,
}

/// Describes a native texture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeTextureDesc {
    /// Dimensionality.
    pub kind: TextureKind,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels.
    pub depth: u32,
    /// Array slices.
    pub array_size: u32,
    /// Mip levels, resolved.
    pub mip_levels: u32,
    /// RHI format, kept for size computations.
    pub format: Format,
    /// The backend's own encoding of `format`.
    pub native_format: u32,
    /// Samples per texel.
    pub sample_count: u32,
    /// Usage flags.
    pub bind_flags: BindFlags,
    /// Miscellaneous options.
    pub misc_flags: ResourceMiscFlags,
    /// Memory heap.
    pub memory: MemoryKind,
}

impl NativeTextureDesc {
    /// Extent of `mip` as (width, height, depth).
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    /// Tightly packed size of subresource `index` (mip-major within each slice).
    pub fn subresource_size(&self, index: u32) -> u64 {
        let mip = index % self.mip_levels.max(1);
        let (w, h, d) = self.mip_extent(mip);
        self.format.slice_pitch(w, h) as u64 * d as u64
    }

    /// Number of subresources.
    pub fn subresource_count(&self) -> u32 {
        self.mip_levels.max(1) * self.array_size.max(1)
    }

    /// Index of (`mip`, `slice`).
    pub fn subresource_index(&self, mip: u32, slice: u32) -> u32 {
        mip + slice * self.mip_levels.max(1)
    }
}

/// The class of a view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ViewKind {
    /// Constant buffer view.
    ConstantBuffer,
    /// Shader resource view.
    ShaderResource,
    /// Unordered access view.
    UnorderedAccess,
    /// Render target view.
    RenderTarget,
    /// Depth stencil view.
    DepthStencil,
}

/// What a view looks at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeViewTarget {
    /// A buffer range.
    Buffer(NativeBuffer),
    /// A texture subresource range.
    Texture(NativeTexture),
    /// An acceleration structure.
    AccelerationStructure(NativeAccelerationStructure),
    /// Nothing: reads return zero and writes are dropped.
    Null,
}

/// Describes a native view.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeViewDesc {
    /// View class.
    pub kind: ViewKind,
    /// Viewed object.
    pub target: NativeViewTarget,
    /// Resource dimension as seen by shaders.
    pub dimension: ViewDimension,
    /// RHI view format.
    pub format: Format,
    /// The backend's own encoding of `format`.
    pub native_format: u32,
    /// First mip.
    pub first_mip: u32,
    /// Mip count.
    pub mip_count: u32,
    /// First array slice.
    pub first_slice: u32,
    /// Array slice count.
    pub slice_count: u32,
    /// Buffer views: byte offset.
    pub offset: u64,
    /// Buffer views: byte size.
    pub size: u64,
    /// Buffer views: element stride.
    pub stride: u32,
}

impl NativeViewDesc {
    /// A view of nothing with the given class and dimension.
    pub fn null(kind: ViewKind, dimension: ViewDimension) -> Self {
        Self {
            kind,
            target: NativeViewTarget::Null,
            dimension,
            format: Format::Unknown,
            native_format: 0,
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
            offset: 0,
            size: 0,
            stride: 0,
        }
    }
}

/// One descriptor written into a heap or a set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeDescriptor {
    /// A shader resource or unordered access view.
    View(NativeView),
    /// A constant buffer range.
    ConstantBuffer {
        /// Backing buffer.
        buffer: NativeBuffer,
        /// Byte offset.
        offset: u64,
        /// Byte size.
        size: u64,
    },
    /// A constant buffer slot that reads zeros.
    NullConstantBuffer,
    /// A sampler.
    Sampler(NativeSampler),
}

/// Which descriptors a heap stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DescriptorHeapKind {
    /// Constant buffer, shader resource and unordered access descriptors.
    Resource,
    /// Samplers.
    Sampler,
}

/// Describes a descriptor heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDescriptorHeapDesc {
    /// Descriptor class.
    pub kind: DescriptorHeapKind,
    /// Descriptors.
    pub capacity: u32,
    /// Whether shaders read the heap directly; otherwise it is a CPU staging heap.
    pub shader_visible: bool,
}

/// Describes a descriptor pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeDescriptorPoolDesc {
    /// Sets the pool can hold before it must be reset.
    pub max_sets: u32,
    /// Descriptors reserved per set, across all classes.
    pub descriptors_per_set: u32,
}

/// Describes a root signature or pipeline layout.
///
/// Set or table 0 holds the implicit bindings (`bindings`), laid out as constant
/// buffers, then shader resources, then UAVs, each class dense from slot 0.
/// Heap layouts keep samplers in a table of their own at root 1; set layouts
/// append them to set 0 after the UAVs. Explicit tables follow.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NativePipelineLayoutDesc {
    /// Implicit bindings.
    pub bindings: BindingLayout,
    /// Explicit tables.
    pub tables: Vec<DescriptorTableLayout>,
}

/// Describes a fixed-function state block for the flat-slot model.
#[derive(Debug, Clone, PartialEq)]
pub enum NativeStateObjectDesc {
    /// Blend state.
    Blend(BlendState),
    /// Rasterizer state.
    Rasterizer(RasterizerState),
    /// Depth stencil state.
    DepthStencil(DepthStencilState),
    /// Input layout validated against a vertex shader.
    InputLayout {
        /// The layout.
        layout: InputLayout,
        /// Shader whose input signature the layout must match.
        vertex_shader: NativeShader,
    },
}

/// One attachment of a native render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAttachmentDesc {
    /// Role.
    pub kind: AttachmentKind,
    /// Native format.
    pub native_format: u32,
    /// Samples.
    pub sample_count: u32,
    /// Load behavior.
    pub load_op: LoadOp,
    /// Store behavior.
    pub store_op: StoreOp,
    /// Native layout before the pass.
    pub initial_layout: u32,
    /// Native layout during the pass.
    pub subpass_layout: u32,
    /// Native layout after the pass.
    pub final_layout: u32,
}

/// Describes a native render pass object.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct NativeRenderPassDesc {
    /// Attachments in order.
    pub attachments: Vec<NativeAttachmentDesc>,
}

/// Describes a monolithic graphics pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NativeGraphicsPipelineDesc {
    /// Layout the pipeline is compiled against.
    pub layout: NativePipelineLayout,
    /// Shaders by stage.
    pub shaders: Vec<(ShaderStage, NativeShader)>,
    /// Blend state.
    pub blend: BlendState,
    /// Rasterizer state.
    pub rasterizer: RasterizerState,
    /// Depth stencil state.
    pub depth_stencil: DepthStencilState,
    /// Vertex input.
    pub input_layout: Option<InputLayout>,
    /// Primitive assembly.
    pub topology: PrimitiveTopology,
    /// Sample mask.
    pub sample_mask: u32,
    /// Render pass object the pipeline is compatible with.
    pub render_pass: Option<NativeRenderPass>,
    /// Native color attachment formats.
    pub color_formats: Vec<u32>,
    /// Native depth attachment format.
    pub depth_format: Option<u32>,
    /// Samples per pixel.
    pub sample_count: u32,
}

/// Describes a compute pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeComputePipelineDesc {
    /// Layout the pipeline is compiled against.
    pub layout: NativePipelineLayout,
    /// Compute shader.
    pub shader: NativeShader,
}

/// Describes a ray tracing pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NativeRaytracingPipelineDesc {
    /// Layout the pipeline is compiled against.
    pub layout: NativePipelineLayout,
    /// Library shaders and their exported entry points.
    pub libraries: Vec<(NativeShader, String)>,
    /// Number of hit groups.
    pub hit_group_count: u32,
    /// Maximum recursion.
    pub max_trace_recursion_depth: u32,
    /// Maximum ray payload.
    pub max_payload_size_in_bytes: u32,
    /// Maximum hit attributes.
    pub max_attribute_size_in_bytes: u32,
}

/// Describes an acceleration structure for size queries and creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeAccelerationStructureDesc {
    /// Hierarchy level.
    pub kind: AccelerationStructureKind,
    /// Build preferences.
    pub flags: AccelerationStructureFlags,
    /// Geometries or instances.
    pub geometry_count: u32,
    /// Primitives across all geometries.
    pub primitive_count: u32,
}

/// Describes a query heap.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeQueryHeapDesc {
    /// Query kind.
    pub kind: GpuQueryKind,
    /// Queries in the heap.
    pub count: u32,
}

/// Describes a swapchain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeSwapchainDesc {
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Images.
    pub buffer_count: u32,
    /// RHI format.
    pub format: Format,
    /// Native format.
    pub native_format: u32,
    /// Exclusive fullscreen.
    pub fullscreen: bool,
    /// Present on vertical blank.
    pub vsync: bool,
}

/// Limits reported by a native device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NativeLimits {
    /// Largest shader-visible resource heap.
    pub max_resource_heap_descriptors: u32,
    /// Largest shader-visible sampler heap.
    pub max_sampler_heap_descriptors: u32,
    /// Required alignment of constant buffer offsets.
    pub constant_buffer_alignment: u64,
    /// Timestamp ticks per second.
    pub timestamp_frequency: u64,
}

/// Identity and feature support of a native device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NativeAdapterInfo {
    /// Adapter name.
    pub name: String,
    /// Adapter class.
    pub device_type: DeviceType,
    /// Hardware features, before the backend masks them.
    pub features: GraphicsDeviceCapability,
    /// Hardware limits.
    pub limits: NativeLimits,
}

/// A resource named by a barrier.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeResourceRef {
    /// A buffer.
    Buffer(NativeBuffer),
    /// A texture.
    Texture(NativeTexture),
    /// An acceleration structure.
    AccelerationStructure(NativeAccelerationStructure),
}

/// A native barrier, with states in the backend's own encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NativeBarrier {
    /// Orders memory accesses.
    Memory {
        /// One resource, or all.
        resource: Option<NativeResourceRef>,
    },
    /// Changes the state or layout of a resource.
    Transition {
        /// The resource.
        resource: NativeResourceRef,
        /// Native state before.
        before: u32,
        /// Native state after.
        after: u32,
        /// A single mip, or all.
        mip: Option<u32>,
        /// A single slice, or all.
        slice: Option<u32>,
    },
}
