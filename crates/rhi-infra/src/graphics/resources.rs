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

//! Backend payloads behind the public handles, and the store that creates them.
//!
//! Every public handle carries an opaque [`BackendPayload`]. The types in this
//! module are what those payloads hold: native handles plus the views created
//! for them. Payloads own their native objects and hand them to the
//! [`DeferredDestroyQueue`] when the last handle clone is dropped.

use std::any::Any;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};

use rhi_core::api::{
    BackendPayload, BindFlags, ClearValue, Format, GpuAllocation, GpuBuffer, GpuBufferDesc,
    GpuResource, GpuResourceKind, LoadOp, ResourceMiscFlags, ResourceState, SamplerDesc,
    StoreOp, SubresourceData, SubresourceType, Texture, TextureDesc, TextureKind, ViewDimension,
};
use rhi_core::native::*;
use rhi_core::{NativeDevice, RhiError};

use super::backend::Backend;
use super::deferred::DeferredDestroyQueue;
use super::lock;

/// Native objects released together when their owner is dropped.
pub(crate) struct Owned {
    objects: Vec<NativeObject>,
    destroyer: Arc<DeferredDestroyQueue>,
}

impl Owned {
    pub fn new(destroyer: &Arc<DeferredDestroyQueue>) -> Self {
        Self {
            objects: Vec::new(),
            destroyer: destroyer.clone(),
        }
    }

    pub fn with(destroyer: &Arc<DeferredDestroyQueue>, object: impl Into<NativeObject>) -> Self {
        let mut owned = Self::new(destroyer);
        owned.push(object);
        owned
    }

    pub fn push(&mut self, object: impl Into<NativeObject>) {
        self.objects.push(object.into());
    }
}

impl Drop for Owned {
    fn drop(&mut self) {
        for object in self.objects.drain(..) {
            self.destroyer.release(object);
        }
    }
}

/// Downcasts an optional payload to the type this backend stored in it.
pub(crate) fn payload<T: Any>(internal: Option<&BackendPayload>) -> Option<&T> {
    let found = internal?.downcast_ref::<T>();
    if found.is_none() {
        log::warn!(
            "Handle payload is not a {}; was it created by another device?",
            std::any::type_name::<T>()
        );
    }
    found
}

pub(crate) fn resource_payload(resource: &GpuResource) -> Option<&ResourcePayload> {
    payload::<ResourcePayload>(resource.internal.as_ref())
}

/// The native object behind a buffer, texture or acceleration structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum NativeResource {
    Buffer(NativeBuffer),
    Texture(NativeTexture),
    AccelerationStructure {
        structure: NativeAccelerationStructure,
        buffer: NativeBuffer,
    },
}

/// The views of one class: the whole-resource view plus explicit partial views.
#[derive(Debug, Default)]
pub(crate) struct SubresourceViews {
    default: Option<NativeView>,
    explicit: Vec<NativeView>,
}

impl SubresourceViews {
    /// Stores a view and returns its subresource index: `-1` for the first
    /// view, then `0, 1, 2, ...`.
    pub fn insert(&mut self, view: NativeView) -> i32 {
        if self.default.is_none() {
            self.default = Some(view);
            return -1;
        }
        self.explicit.push(view);
        self.explicit.len() as i32 - 1
    }

    pub fn get(&self, index: i32) -> Result<NativeView, RhiError> {
        let found = match index {
            -1 => self.default,
            i if i >= 0 => self.explicit.get(i as usize).copied(),
            _ => None,
        };
        found.ok_or(RhiError::InvalidSubresource {
            index,
            count: self.explicit.len(),
        })
    }

    pub fn count(&self) -> usize {
        self.explicit.len()
    }

    fn all(&self) -> impl Iterator<Item = NativeView> + '_ {
        self.default.iter().chain(self.explicit.iter()).copied()
    }
}

#[derive(Debug, Default)]
pub(crate) struct ViewSet {
    srv: SubresourceViews,
    uav: SubresourceViews,
    rtv: SubresourceViews,
    dsv: SubresourceViews,
}

impl ViewSet {
    pub fn of(&self, kind: SubresourceType) -> &SubresourceViews {
        match kind {
            SubresourceType::Srv => &self.srv,
            SubresourceType::Uav => &self.uav,
            SubresourceType::Rtv => &self.rtv,
            SubresourceType::Dsv => &self.dsv,
        }
    }

    pub fn of_mut(&mut self, kind: SubresourceType) -> &mut SubresourceViews {
        match kind {
            SubresourceType::Srv => &mut self.srv,
            SubresourceType::Uav => &mut self.uav,
            SubresourceType::Rtv => &mut self.rtv,
            SubresourceType::Dsv => &mut self.dsv,
        }
    }

    fn drain(&mut self) -> Vec<NativeView> {
        let views = [&self.srv, &self.uav, &self.rtv, &self.dsv]
            .into_iter()
            .flat_map(SubresourceViews::all)
            .collect();
        *self = ViewSet::default();
        views
    }
}

/// The latest transient copy of a dynamic buffer written by one command list.
#[derive(Debug, Clone)]
pub(crate) struct DynamicAllocation {
    pub frame: u64,
    pub allocation: GpuAllocation,
}

/// Payload of buffers, textures and acceleration structures.
pub(crate) struct ResourcePayload {
    pub native: NativeResource,
    pub memory: MemoryKind,
    /// Bytes of the resource; for textures, every subresource tightly packed.
    pub size: u64,
    pub texture_desc: Option<NativeTextureDesc>,
    /// Per command list, for dynamic buffers on backends that rename them.
    pub dynamic: Option<Mutex<Vec<Option<DynamicAllocation>>>>,
    views: Mutex<ViewSet>,
    owns_native: bool,
    destroyer: Arc<DeferredDestroyQueue>,
}

impl ResourcePayload {
    pub fn buffer(&self) -> Option<NativeBuffer> {
        match self.native {
            NativeResource::Buffer(buffer) => Some(buffer),
            NativeResource::AccelerationStructure { buffer, .. } => Some(buffer),
            NativeResource::Texture(_) => None,
        }
    }

    pub fn texture(&self) -> Option<NativeTexture> {
        match self.native {
            NativeResource::Texture(texture) => Some(texture),
            _ => None,
        }
    }

    pub fn view(&self, kind: SubresourceType, index: i32) -> Result<NativeView, RhiError> {
        lock(&self.views).of(kind).get(index)
    }

    pub fn view_count(&self, kind: SubresourceType) -> usize {
        lock(&self.views).of(kind).count()
    }

    fn add_view(&self, kind: SubresourceType, view: NativeView) -> i32 {
        lock(&self.views).of_mut(kind).insert(view)
    }

    /// The transient copy `list` wrote during `frame`, if any.
    pub fn dynamic_allocation(&self, list: usize, frame: u64) -> Option<GpuAllocation> {
        let slots = lock(self.dynamic.as_ref()?);
        slots
            .get(list)?
            .as_ref()
            .filter(|d| d.frame == frame)
            .map(|d| d.allocation.clone())
    }

    pub fn set_dynamic_allocation(&self, list: usize, frame: u64, allocation: GpuAllocation) {
        if let Some(dynamic) = &self.dynamic {
            let mut slots = lock(dynamic);
            if slots.len() <= list {
                slots.resize(list + 1, None);
            }
            slots[list] = Some(DynamicAllocation { frame, allocation });
        }
    }
}

impl Drop for ResourcePayload {
    fn drop(&mut self) {
        let views = self
            .views
            .get_mut()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .drain();
        for view in views {
            self.destroyer.release(view);
        }
        if !self.owns_native {
            return;
        }
        match self.native {
            NativeResource::Buffer(buffer) => self.destroyer.release(buffer),
            NativeResource::Texture(texture) => self.destroyer.release(texture),
            NativeResource::AccelerationStructure { structure, buffer } => {
                self.destroyer.release(structure);
                self.destroyer.release(buffer);
            }
        }
    }
}

pub(crate) struct ShaderPayload {
    pub native: NativeShader,
    /// Compute shaders on pipeline backends carry their own pipeline.
    pub compute: Option<ComputePipeline>,
    pub _owned: Owned,
}

pub(crate) struct ComputePipeline {
    pub layout: Arc<PipelineLayoutInfo>,
    pub pipeline: NativePipeline,
}

pub(crate) struct SamplerPayload {
    pub native: NativeSampler,
    pub _owned: Owned,
}

/// A native pipeline layout together with the description it was built from.
pub(crate) struct PipelineLayoutInfo {
    pub native: NativePipelineLayout,
    pub desc: NativePipelineLayoutDesc,
    pub _owned: Owned,
}

/// Fixed-function state objects of the flat-slot model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub(crate) struct FieldStates {
    pub blend: Option<NativeStateObject>,
    pub rasterizer: Option<NativeStateObject>,
    pub depth_stencil: Option<NativeStateObject>,
    pub input_layout: Option<NativeStateObject>,
}

pub(crate) struct PipelinePayload {
    pub layout: Option<Arc<PipelineLayoutInfo>>,
    pub fields: FieldStates,
    pub _owned: Owned,
}

pub(crate) struct RaytracingPipelinePayload {
    pub pipeline: NativePipeline,
    pub layout: Arc<PipelineLayoutInfo>,
    pub _owned: Owned,
}

pub(crate) struct QueryPayload {
    pub heap: NativeQueryHeap,
    pub ended: AtomicBool,
    pub _owned: Owned,
}

/// One attachment of a render pass, resolved to native handles.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PassAttachment {
    pub texture: NativeTexture,
    pub view: NativeView,
    pub load_op: LoadOp,
    pub store_op: StoreOp,
    pub clear: ClearValue,
    pub initial_layout: ResourceState,
    pub subpass_layout: ResourceState,
    pub final_layout: ResourceState,
}

#[derive(Debug, Clone, Copy)]
pub(crate) struct PassColor {
    pub target: PassAttachment,
    pub resolve: Option<PassAttachment>,
}

pub(crate) struct RenderPassPayload {
    pub native: Option<NativeRenderPass>,
    pub colors: Vec<PassColor>,
    pub depth: Option<PassAttachment>,
    /// Attachments beyond color and depth, such as shading rate images.
    pub others: Vec<PassAttachment>,
    pub color_formats: Vec<u32>,
    pub depth_format: Option<u32>,
    pub sample_count: u32,
    pub _owned: Owned,
}

impl RenderPassPayload {
    /// Every attachment: colors with their resolves, depth, then the rest.
    pub fn attachments(&self) -> impl Iterator<Item = &PassAttachment> {
        self.colors
            .iter()
            .flat_map(|c| std::iter::once(&c.target).chain(c.resolve.iter()))
            .chain(self.depth.iter())
            .chain(self.others.iter())
    }
}

fn clear_color(clear: ClearValue) -> [f32; 4] {
    match clear {
        ClearValue::Color(color) => color,
        ClearValue::DepthStencil { .. } => [0.0; 4],
    }
}

impl PassAttachment {
    pub fn clear_color(&self) -> [f32; 4] {
        clear_color(self.clear)
    }

    pub fn clear_depth_stencil(&self) -> (f32, u8) {
        match self.clear {
            ClearValue::DepthStencil { depth, stencil } => (depth, stencil),
            ClearValue::Color(_) => (1.0, 0),
        }
    }

    pub fn native_color_target(&self, resolve: Option<&PassAttachment>) -> NativeColorTarget {
        NativeColorTarget {
            view: self.view,
            load_op: self.load_op,
            store_op: self.store_op,
            clear_color: self.clear_color(),
            resolve: resolve.map(|r| r.view),
        }
    }

    pub fn native_depth_target(&self) -> NativeDepthTarget {
        let (clear_depth, clear_stencil) = self.clear_depth_stencil();
        NativeDepthTarget {
            view: self.view,
            load_op: self.load_op,
            store_op: self.store_op,
            clear_depth,
            clear_stencil,
        }
    }
}

/// Views that stand in for empty descriptor slots, one per dimension.
pub(crate) struct NullDescriptors {
    srv: Vec<(ViewDimension, NativeView)>,
    uav: Vec<(ViewDimension, NativeView)>,
    sampler: NativeSampler,
    _owned: Owned,
}

impl NullDescriptors {
    pub fn new(
        native: &dyn NativeDevice,
        destroyer: &Arc<DeferredDestroyQueue>,
    ) -> Result<Self, RhiError> {
        let mut owned = Owned::new(destroyer);
        let mut srv = Vec::new();
        let mut uav = Vec::new();
        for dimension in ViewDimension::ALL {
            let view = native.create_view(&NativeViewDesc::null(ViewKind::ShaderResource, dimension))?;
            owned.push(view);
            srv.push((dimension, view));
            if dimension != ViewDimension::AccelerationStructure {
                let view =
                    native.create_view(&NativeViewDesc::null(ViewKind::UnorderedAccess, dimension))?;
                owned.push(view);
                uav.push((dimension, view));
            }
        }
        let sampler = native.create_sampler(&SamplerDesc::default())?;
        owned.push(sampler);
        Ok(Self {
            srv,
            uav,
            sampler,
            _owned: owned,
        })
    }

    fn find(views: &[(ViewDimension, NativeView)], dimension: ViewDimension) -> NativeView {
        views
            .iter()
            .find(|(d, _)| *d == dimension)
            .or_else(|| views.iter().find(|(d, _)| *d == ViewDimension::Texture2D))
            .map(|(_, v)| *v)
            .unwrap_or(NativeView(0))
    }

    pub fn srv(&self, dimension: ViewDimension) -> NativeView {
        Self::find(&self.srv, dimension)
    }

    pub fn uav(&self, dimension: ViewDimension) -> NativeView {
        Self::find(&self.uav, dimension)
    }

    pub fn sampler(&self) -> NativeSampler {
        self.sampler
    }
}

/// The dimension shaders see through a texture view spanning `slices` slices.
fn texture_view_dimension(desc: &TextureDesc, kind: SubresourceType, slices: u32) -> ViewDimension {
    match desc.kind {
        TextureKind::Texture1D if slices > 1 => ViewDimension::Texture1DArray,
        TextureKind::Texture1D => ViewDimension::Texture1D,
        TextureKind::Texture3D => ViewDimension::Texture3D,
        TextureKind::Texture2D => {
            if desc.is_cube() && kind == SubresourceType::Srv && slices % 6 == 0 {
                if slices > 6 {
                    ViewDimension::TextureCubeArray
                } else {
                    ViewDimension::TextureCube
                }
            } else if desc.sample_count > 1 {
                if slices > 1 {
                    ViewDimension::Texture2DMsArray
                } else {
                    ViewDimension::Texture2DMs
                }
            } else if slices > 1 {
                ViewDimension::Texture2DArray
            } else {
                ViewDimension::Texture2D
            }
        }
    }
}

fn required_flag(kind: SubresourceType) -> BindFlags {
    match kind {
        SubresourceType::Srv => BindFlags::SHADER_RESOURCE,
        SubresourceType::Uav => BindFlags::UNORDERED_ACCESS,
        SubresourceType::Rtv => BindFlags::RENDER_TARGET,
        SubresourceType::Dsv => BindFlags::DEPTH_STENCIL,
    }
}

fn view_kind(kind: SubresourceType) -> ViewKind {
    match kind {
        SubresourceType::Srv => ViewKind::ShaderResource,
        SubresourceType::Uav => ViewKind::UnorderedAccess,
        SubresourceType::Rtv => ViewKind::RenderTarget,
        SubresourceType::Dsv => ViewKind::DepthStencil,
    }
}

/// Bytes of every subresource of a texture, tightly packed.
pub(crate) fn texture_bytes(desc: &NativeTextureDesc) -> u64 {
    (0..desc.subresource_count())
        .map(|i| desc.subresource_size(i))
        .sum()
}

/// Creates native resources and their views for one backend.
pub(crate) struct ResourceStore {
    native: Arc<dyn NativeDevice>,
    destroyer: Arc<DeferredDestroyQueue>,
    backend: Arc<dyn Backend>,
}

impl ResourceStore {
    pub fn new(
        native: Arc<dyn NativeDevice>,
        destroyer: Arc<DeferredDestroyQueue>,
        backend: Arc<dyn Backend>,
    ) -> Self {
        Self {
            native,
            destroyer,
            backend,
        }
    }

    pub fn native(&self) -> &dyn NativeDevice {
        self.native.as_ref()
    }

    pub fn destroyer(&self) -> &Arc<DeferredDestroyQueue> {
        &self.destroyer
    }

    fn wrap(
        &self,
        kind: GpuResourceKind,
        native: NativeResource,
        memory: MemoryKind,
        size: u64,
        texture_desc: Option<NativeTextureDesc>,
        dynamic: bool,
        owns_native: bool,
    ) -> (GpuResource, BackendPayload) {
        let payload = BackendPayload::new(ResourcePayload {
            native,
            memory,
            size,
            texture_desc,
            dynamic: dynamic.then(|| Mutex::new(Vec::new())),
            views: Mutex::new(ViewSet::default()),
            owns_native,
            destroyer: self.destroyer.clone(),
        });
        (
            GpuResource {
                kind,
                internal: Some(payload.clone()),
            },
            payload,
        )
    }

    /// Creates a buffer and its default views.
    pub fn create_buffer(
        &self,
        desc: &GpuBufferDesc,
        memory: MemoryKind,
        initial_data: Option<&[u8]>,
        renamed: bool,
    ) -> Result<GpuBuffer, RhiError> {
        let native = self.native.create_buffer(
            &NativeBufferDesc {
                size: desc.size,
                memory,
                bind_flags: desc.bind_flags,
                misc_flags: desc.misc_flags,
                stride: desc.stride,
            },
            initial_data,
        )?;
        let (resource, _) = self.wrap(
            GpuResourceKind::Buffer,
            NativeResource::Buffer(native),
            memory,
            desc.size,
            None,
            renamed,
            true,
        );
        let buffer = GpuBuffer {
            resource,
            desc: desc.clone(),
        };
        if desc.bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            self.create_buffer_view(&buffer, SubresourceType::Srv, 0, None)?;
        }
        if desc.bind_flags.contains(BindFlags::UNORDERED_ACCESS) {
            self.create_buffer_view(&buffer, SubresourceType::Uav, 0, None)?;
        }
        Ok(buffer)
    }

    /// A host-visible buffer usable as a copy source and for transient bindings.
    pub fn create_upload_buffer(&self, size: u64) -> Result<GpuBuffer, RhiError> {
        let desc = GpuBufferDesc {
            size,
            bind_flags: BindFlags::VERTEX_BUFFER
                | BindFlags::INDEX_BUFFER
                | BindFlags::CONSTANT_BUFFER
                | BindFlags::SHADER_RESOURCE,
            misc_flags: ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS,
            ..Default::default()
        };
        let native = self.native.create_buffer(
            &NativeBufferDesc {
                size,
                memory: MemoryKind::Upload,
                bind_flags: desc.bind_flags,
                misc_flags: desc.misc_flags,
                stride: 0,
            },
            None,
        )?;
        let (resource, _) = self.wrap(
            GpuResourceKind::Buffer,
            NativeResource::Buffer(native),
            MemoryKind::Upload,
            size,
            None,
            false,
            true,
        );
        Ok(GpuBuffer { resource, desc })
    }

    pub fn create_buffer_view(
        &self,
        buffer: &GpuBuffer,
        kind: SubresourceType,
        offset: u64,
        size: Option<u64>,
    ) -> Result<i32, RhiError> {
        let payload = resource_payload(buffer).ok_or(RhiError::InvalidHandle)?;
        let native = payload.buffer().ok_or(RhiError::InvalidHandle)?;
        if !matches!(kind, SubresourceType::Srv | SubresourceType::Uav) {
            return Err(RhiError::InvalidDescriptor(format!(
                "buffers have no {:?} views",
                kind
            )));
        }
        if !buffer.desc.bind_flags.contains(required_flag(kind)) {
            return Err(RhiError::InvalidDescriptor(format!(
                "buffer lacks the bind flag for {:?} views",
                kind
            )));
        }
        let size = size.unwrap_or(buffer.desc.size.saturating_sub(offset));
        if size == 0 || offset + size > buffer.desc.size {
            return Err(RhiError::InvalidDescriptor(format!(
                "view range {}+{} exceeds buffer of {} bytes",
                offset, size, buffer.desc.size
            )));
        }
        let desc = &buffer.desc;
        let (format, stride) = if desc.misc_flags.contains(ResourceMiscFlags::BUFFER_STRUCTURED) {
            (Format::Unknown, desc.stride)
        } else if desc.misc_flags.contains(ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS) {
            (Format::R32Typeless, 4)
        } else {
            (desc.format, desc.format.bytes_per_block())
        };
        let view = self.native.create_view(&NativeViewDesc {
            kind: view_kind(kind),
            target: NativeViewTarget::Buffer(native),
            dimension: ViewDimension::Buffer,
            format,
            native_format: self.backend.native_format(format),
            first_mip: 0,
            mip_count: 1,
            first_slice: 0,
            slice_count: 1,
            offset,
            size,
            stride,
        })?;
        Ok(payload.add_view(kind, view))
    }

    fn native_texture_desc(&self, desc: &TextureDesc, memory: MemoryKind) -> NativeTextureDesc {
        NativeTextureDesc {
            kind: desc.kind,
            width: desc.width,
            height: desc.height,
            depth: desc.depth,
            array_size: desc.array_size,
            mip_levels: desc.mip_levels,
            format: desc.format,
            native_format: self.backend.native_format(desc.format),
            sample_count: desc.sample_count,
            bind_flags: desc.bind_flags,
            misc_flags: desc.misc_flags,
            memory,
        }
    }

    /// Creates a texture with mips already resolved in `desc`, plus one
    /// default view per bind flag.
    pub fn create_texture(
        &self,
        desc: &TextureDesc,
        memory: MemoryKind,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<Texture, RhiError> {
        let native_desc = self.native_texture_desc(desc, memory);
        let native = self.native.create_texture(&native_desc, initial_data)?;
        let (resource, _) = self.wrap(
            GpuResourceKind::Texture,
            NativeResource::Texture(native),
            memory,
            texture_bytes(&native_desc),
            Some(native_desc),
            false,
            true,
        );
        let texture = Texture {
            resource,
            desc: desc.clone(),
        };
        self.create_default_views(&texture)?;
        Ok(texture)
    }

    /// Wraps a texture owned elsewhere, such as a swapchain image.
    pub fn wrap_texture(&self, native: NativeTexture, desc: &TextureDesc) -> Result<Texture, RhiError> {
        let native_desc = self.native_texture_desc(desc, MemoryKind::DeviceLocal);
        let (resource, _) = self.wrap(
            GpuResourceKind::Texture,
            NativeResource::Texture(native),
            MemoryKind::DeviceLocal,
            texture_bytes(&native_desc),
            Some(native_desc),
            false,
            false,
        );
        let texture = Texture {
            resource,
            desc: desc.clone(),
        };
        self.create_default_views(&texture)?;
        Ok(texture)
    }

    fn create_default_views(&self, texture: &Texture) -> Result<(), RhiError> {
        for kind in [
            SubresourceType::Srv,
            SubresourceType::Uav,
            SubresourceType::Rtv,
            SubresourceType::Dsv,
        ] {
            if texture.desc.bind_flags.contains(required_flag(kind)) {
                self.create_texture_view(texture, kind, 0, None, 0, None)?;
            }
        }
        Ok(())
    }

    pub fn create_texture_view(
        &self,
        texture: &Texture,
        kind: SubresourceType,
        first_slice: u32,
        slice_count: Option<u32>,
        first_mip: u32,
        mip_count: Option<u32>,
    ) -> Result<i32, RhiError> {
        let payload = resource_payload(texture).ok_or(RhiError::InvalidHandle)?;
        let native = payload.texture().ok_or(RhiError::InvalidHandle)?;
        let desc = &texture.desc;
        if !desc.bind_flags.contains(required_flag(kind)) {
            return Err(RhiError::InvalidDescriptor(format!(
                "texture lacks the bind flag for {:?} views",
                kind
            )));
        }
        let mips = desc.resolved_mip_levels();
        let slices = if desc.kind == TextureKind::Texture3D {
            desc.depth
        } else {
            desc.array_size
        };
        let mip_count = mip_count.unwrap_or(match kind {
            SubresourceType::Srv => mips.saturating_sub(first_mip),
            _ => 1,
        });
        let slice_count = slice_count.unwrap_or(slices.saturating_sub(first_slice));
        if mip_count == 0
            || slice_count == 0
            || first_mip + mip_count > mips
            || first_slice + slice_count > slices
        {
            return Err(RhiError::InvalidDescriptor(format!(
                "view of mips {}+{} slices {}+{} exceeds texture of {} mips and {} slices",
                first_mip, mip_count, first_slice, slice_count, mips, slices
            )));
        }
        let format = match kind {
            SubresourceType::Srv => desc.format.shader_view_format(),
            SubresourceType::Dsv => desc.format.depth_view_format(),
            _ => desc.format,
        };
        let view = self.native.create_view(&NativeViewDesc {
            kind: view_kind(kind),
            target: NativeViewTarget::Texture(native),
            dimension: texture_view_dimension(desc, kind, slice_count),
            format,
            native_format: self.backend.native_format(format),
            first_mip,
            mip_count,
            first_slice,
            slice_count,
            offset: 0,
            size: 0,
            stride: 0,
        })?;
        Ok(payload.add_view(kind, view))
    }

    /// Wraps an acceleration structure and its backing buffer.
    pub fn wrap_acceleration_structure(
        &self,
        structure: NativeAccelerationStructure,
        buffer: NativeBuffer,
        size: u64,
    ) -> Result<GpuResource, RhiError> {
        let (resource, payload) = self.wrap(
            GpuResourceKind::RaytracingAccelerationStructure,
            NativeResource::AccelerationStructure { structure, buffer },
            MemoryKind::DeviceLocal,
            size,
            None,
            false,
            true,
        );
        let view = self.native.create_view(&NativeViewDesc {
            kind: ViewKind::ShaderResource,
            target: NativeViewTarget::AccelerationStructure(structure),
            dimension: ViewDimension::AccelerationStructure,
            ..NativeViewDesc::null(ViewKind::ShaderResource, ViewDimension::AccelerationStructure)
        })?;
        if let Some(payload) = payload.downcast_ref::<ResourcePayload>() {
            payload.add_view(SubresourceType::Srv, view);
        }
        Ok(resource)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_view_is_the_default() {
        let mut views = SubresourceViews::default();

        assert_eq!(views.insert(NativeView(10)), -1);
        assert_eq!(views.insert(NativeView(11)), 0);
        assert_eq!(views.insert(NativeView(12)), 1);

        assert_eq!(views.get(-1).unwrap(), NativeView(10));
        assert_eq!(views.get(0).unwrap(), NativeView(11));
        assert_eq!(views.get(1).unwrap(), NativeView(12));
        assert_eq!(views.count(), 2);
    }

    #[test]
    fn test_out_of_range_views_are_rejected() {
        let mut views = SubresourceViews::default();
        assert!(matches!(
            views.get(-1),
            Err(RhiError::InvalidSubresource { index: -1, count: 0 })
        ));
        views.insert(NativeView(1));
        views.insert(NativeView(2));
        assert!(matches!(
            views.get(1),
            Err(RhiError::InvalidSubresource { index: 1, count: 1 })
        ));
        assert!(views.get(-2).is_err());
    }

    #[test]
    fn test_cube_views_only_for_shader_resources() {
        let desc = TextureDesc {
            array_size: 12,
            misc_flags: ResourceMiscFlags::TEXTURECUBE,
            ..Default::default()
        };
        assert_eq!(
            texture_view_dimension(&desc, SubresourceType::Srv, 12),
            ViewDimension::TextureCubeArray
        );
        assert_eq!(
            texture_view_dimension(&desc, SubresourceType::Srv, 6),
            ViewDimension::TextureCube
        );
        assert_eq!(
            texture_view_dimension(&desc, SubresourceType::Rtv, 6),
            ViewDimension::Texture2DArray
        );
    }
}
