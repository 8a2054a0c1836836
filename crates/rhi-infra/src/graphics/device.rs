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

//! The [`GraphicsDevice`] façade shared by every backend.
//!
//! A [`Device`] owns the resource store, the per command list recording state,
//! the pipeline cache, the copy queue and the swapchain. Everything that differs
//! between the flat-slot, heap-ring and set-pool backends is reached through the
//! [`Backend`] trait and the [`DescriptorBinder`] each command list slot carries.
//!
//! Frame pacing: with `D` back buffers the CPU may record frame `N` while frames
//! `N - D .. N` are still executing. Submitting frame `N` waits for frame
//! `N - D` to finish, so at most `D` frames are ever in flight and the `D + 1`
//! ring slots of every command list are never reused while the GPU reads them.

use std::fmt;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use raw_window_handle::RawWindowHandle;
use rhi_core::api::*;
use rhi_core::hash::structural_hash;
use rhi_core::native::{
    DescriptorHeapKind, MemoryKind, NativeAccelerationStructureDesc, NativeAdapterInfo,
    NativeBuffer, NativeBufferDesc, NativeCommand, NativeCommandBuffer,
    NativeComputePipelineDesc, NativeDescriptor, NativeDescriptorHeap, NativeDescriptorHeapDesc,
    NativeFence, NativePipeline, NativePipelineLayoutDesc, NativeQueryHeapDesc,
    NativeRaytracingPipelineDesc, NativeStateObjectDesc, NativeSwapchain, NativeSwapchainDesc,
    NativeVertexBuffer, NativeView, QueueKind,
};
use rhi_core::{GraphicsDevice, NativeDevice, RhiError};

use super::backend::{Backend, Encoder};
use super::binding::{BoundConstant, DescriptorBinder, HeapTablePayload, SetTablePayload};
use super::deferred::DeferredDestroyQueue;
use super::dx11::Dx11Backend;
use super::dx12::Dx12Backend;
use super::lock;
use super::pipeline::{
    graphics_layout_desc, graphics_pipeline_desc, native_shader, pipeline_hash, LayoutCache,
};
use super::pipeline_cache::PipelineCache;
use super::resources::{
    payload, resource_payload, ComputePipeline, FieldStates, NativeResource, NullDescriptors,
    Owned, PassAttachment, PassColor, PipelinePayload, QueryPayload, RaytracingPipelinePayload,
    RenderPassPayload, ResourcePayload, ResourceStore, SamplerPayload, ShaderPayload,
};
use super::state::{CommandListState, SlotConfig};
use super::upload::CopyQueue;
use super::vulkan::VulkanBackend;

/// The swapchain and the back buffer handles wrapping its images.
struct Swapchain {
    native: NativeSwapchain,
    images: Vec<Texture>,
    /// One clearing pass per image, begun by `present_begin`.
    passes: Vec<RenderPass>,
    current: usize,
    width: u32,
    height: u32,
}

/// A graphics device driving one backend through a [`NativeDevice`].
pub struct Device {
    settings: DeviceSettings,
    native: Arc<dyn NativeDevice>,
    backend: Arc<dyn Backend>,
    store: ResourceStore,
    nulls: NullDescriptors,
    layouts: LayoutCache,
    pipelines: PipelineCache,
    copy_queue: CopyQueue,
    lists: Vec<Mutex<CommandListState>>,
    open_lists: AtomicUsize,
    frame: AtomicU64,
    frame_fence: NativeFence,
    swapchain: Mutex<Swapchain>,
    adapter: NativeAdapterInfo,
    caps: GraphicsDeviceCapability,
    slot_config: SlotConfig,
    backbuffer_format: u32,
    _owned: Owned,
}

/// Creates a device for `settings.backend` on top of `native`.
///
/// `window` is handed to the native swapchain; `None` creates an offscreen one.
///
/// ## Errors
/// * `RhiError::Config` - If the settings are invalid.
/// * `RhiError::Native` - If a native object could not be created.
pub fn create_device(
    settings: DeviceSettings,
    native: Arc<dyn NativeDevice>,
    window: Option<RawWindowHandle>,
) -> Result<Device, RhiError> {
    settings.validate()?;
    let backend: Arc<dyn Backend> = match settings.backend {
        BackendKind::Dx11 => Arc::new(Dx11Backend),
        BackendKind::Dx12 => Arc::new(Dx12Backend),
        BackendKind::Vulkan => Arc::new(VulkanBackend),
    };
    let adapter = native.adapter_info();
    let caps = backend.capabilities(adapter.features);

    let destroyer = Arc::new(DeferredDestroyQueue::new(native.clone()));
    let store = ResourceStore::new(native.clone(), destroyer.clone(), backend.clone());
    let nulls = NullDescriptors::new(native.as_ref(), &destroyer)?;
    let ring_size = settings.backbuffer_count as usize + 1;
    let copy_queue = CopyQueue::new(
        native.as_ref(),
        &destroyer,
        ring_size,
        settings.transient_buffer_size,
    )?;

    let frame_fence = native.create_fence(0)?;
    let mut owned = Owned::with(&destroyer, frame_fence);

    let backbuffer_format = backend.native_format(settings.backbuffer_format);
    let swapchain = native.create_swapchain(
        &NativeSwapchainDesc {
            width: settings.width,
            height: settings.height,
            buffer_count: settings.backbuffer_count,
            format: settings.backbuffer_format,
            native_format: backbuffer_format,
            fullscreen: settings.fullscreen,
            vsync: settings.vsync,
        },
        window,
    )?;
    owned.push(swapchain);
    let (images, passes) = wrap_backbuffers(&store, backend.as_ref(), &settings, swapchain)?;
    let current = native.acquire_next_image(swapchain)? as usize;

    let slot_config = SlotConfig {
        transient_size: settings.transient_buffer_size,
        resource_heap_capacity: settings.resource_heap_capacity,
        sampler_heap_capacity: settings.sampler_heap_capacity,
        max_resource_heap: adapter
            .limits
            .max_resource_heap_descriptors
            .min(MAX_RESOURCE_HEAP_CAPACITY),
        max_sampler_heap: adapter
            .limits
            .max_sampler_heap_descriptors
            .min(MAX_SAMPLER_HEAP_CAPACITY),
        descriptor_pool_sets: settings.descriptor_pool_sets,
    };

    log::info!(
        "Created {:?} device on '{}' ({:?}), {} back buffers of {}x{}, capabilities {:?}",
        backend.kind(),
        adapter.name,
        adapter.device_type,
        settings.backbuffer_count,
        settings.width,
        settings.height,
        caps
    );

    Ok(Device {
        swapchain: Mutex::new(Swapchain {
            native: swapchain,
            images,
            passes,
            current,
            width: settings.width,
            height: settings.height,
        }),
        lists: (0..COMMANDLIST_COUNT)
            .map(|_| Mutex::new(CommandListState::new(ring_size)))
            .collect(),
        open_lists: AtomicUsize::new(0),
        frame: AtomicU64::new(0),
        pipelines: PipelineCache::new(destroyer.clone()),
        layouts: LayoutCache::new(),
        settings,
        native,
        backend,
        store,
        nulls,
        copy_queue,
        frame_fence,
        adapter,
        caps,
        slot_config,
        backbuffer_format,
        _owned: owned,
    })
}

/// Wraps the swapchain images and builds the pass that clears each of them.
fn wrap_backbuffers(
    store: &ResourceStore,
    backend: &dyn Backend,
    settings: &DeviceSettings,
    swapchain: NativeSwapchain,
) -> Result<(Vec<Texture>, Vec<RenderPass>), RhiError> {
    let mut images = Vec::new();
    let mut passes = Vec::new();
    for (index, native) in store.native().swapchain_images(swapchain)?.into_iter().enumerate() {
        let desc = TextureDesc {
            width: settings.width,
            height: settings.height,
            format: settings.backbuffer_format,
            bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
            clear: ClearValue::Color(settings.clear_color),
            layout: ResourceState::PRESENT,
            ..Default::default()
        };
        let texture = store.wrap_texture(native, &desc)?;
        let pass = build_render_pass(
            store,
            backend,
            &RenderPassDesc {
                attachments: vec![RenderPassAttachment::render_target(
                    &texture,
                    LoadOp::Clear,
                    StoreOp::Store,
                )],
            },
        )?;
        log::debug!("Wrapped swapchain image {} as a back buffer", index);
        images.push(texture);
        passes.push(pass);
    }
    Ok((images, passes))
}

fn build_render_pass(
    store: &ResourceStore,
    backend: &dyn Backend,
    desc: &RenderPassDesc,
) -> Result<RenderPass, RhiError> {
    let mut colors = Vec::new();
    let mut resolves = Vec::new();
    let mut depth = None;
    let mut others = Vec::new();
    let mut color_formats = Vec::new();
    let mut depth_format = None;

    for attachment in &desc.attachments {
        let payload = resource_payload(&attachment.texture).ok_or(RhiError::InvalidHandle)?;
        let texture = payload.texture().ok_or(RhiError::InvalidHandle)?;
        let sub = attachment.subresource;
        let view = match attachment.kind {
            AttachmentKind::RenderTarget => payload.view(SubresourceType::Rtv, sub)?,
            AttachmentKind::DepthStencil => payload.view(SubresourceType::Dsv, sub)?,
            AttachmentKind::Resolve => payload
                .view(SubresourceType::Rtv, sub)
                .or_else(|_| payload.view(SubresourceType::Srv, sub))?,
            AttachmentKind::ShadingRateSource => payload.view(SubresourceType::Srv, sub)?,
        };
        let pass_attachment = PassAttachment {
            texture,
            view,
            load_op: attachment.load_op,
            store_op: attachment.store_op,
            clear: attachment.texture.desc.clear,
            initial_layout: attachment.initial_layout,
            subpass_layout: attachment.subpass_layout,
            final_layout: attachment.final_layout,
        };
        let format = backend.native_format(attachment.texture.desc.format);
        match attachment.kind {
            AttachmentKind::RenderTarget => {
                colors.push(PassColor {
                    target: pass_attachment,
                    resolve: None,
                });
                color_formats.push(format);
            }
            AttachmentKind::DepthStencil => {
                if depth.is_some() {
                    return Err(RhiError::InvalidDescriptor(
                        "render pass has more than one depth stencil attachment".into(),
                    ));
                }
                depth = Some(pass_attachment);
                depth_format = Some(format);
            }
            AttachmentKind::Resolve => resolves.push(pass_attachment),
            AttachmentKind::ShadingRateSource => others.push(pass_attachment),
        }
    }

    if colors.len() > MAX_RENDER_TARGETS {
        return Err(RhiError::InvalidDescriptor(format!(
            "{} render targets exceed the limit of {}",
            colors.len(),
            MAX_RENDER_TARGETS
        )));
    }
    if resolves.len() > colors.len() {
        return Err(RhiError::InvalidDescriptor(
            "every resolve attachment needs a render target before it".into(),
        ));
    }
    for (color, resolve) in colors.iter_mut().zip(resolves) {
        color.resolve = Some(resolve);
    }

    let mut owned = Owned::new(store.destroyer());
    let native = match backend.native_render_pass(desc) {
        Some(native_desc) => {
            let pass = store.native().create_render_pass(&native_desc)?;
            owned.push(pass);
            Some(pass)
        }
        None => None,
    };

    Ok(RenderPass {
        desc: desc.clone(),
        hash: structural_hash(desc),
        internal: Some(BackendPayload::new(RenderPassPayload {
            native,
            colors,
            depth,
            others,
            color_formats,
            depth_format,
            sample_count: desc.sample_count(),
            _owned: owned,
        })),
    })
}

fn pipeline_payload(pso: &PipelineState) -> &PipelinePayload {
    payload::<PipelinePayload>(pso.internal.as_ref())
        .unwrap_or_else(|| panic!("pipeline state was not created by this device"))
}

fn shader_payload(shader: &Shader) -> &ShaderPayload {
    payload::<ShaderPayload>(shader.internal.as_ref())
        .unwrap_or_else(|| panic!("shader was not created by this device"))
}

fn native_buffer(resource: &GpuResource) -> NativeBuffer {
    resource_payload(resource)
        .and_then(ResourcePayload::buffer)
        .unwrap_or_else(|| panic!("resource is not a buffer created by this device"))
}

/// The view `subresource` of `resource`, or `None` for an empty resource.
fn resource_view(resource: &GpuResource, kind: SubresourceType, subresource: i32) -> Option<NativeView> {
    if !resource.is_valid() {
        return None;
    }
    let payload = resource_payload(resource)
        .unwrap_or_else(|| panic!("resource was not created by this device"));
    match payload.view(kind, subresource) {
        Ok(view) => Some(view),
        Err(e) => panic!("cannot bind {:?} view: {}", kind, e),
    }
}

impl Device {
    fn list(&self, cmd: CommandList) -> MutexGuard<'_, CommandListState> {
        let list = self
            .lists
            .get(cmd.index())
            .unwrap_or_else(|| panic!("command list {} out of range", cmd.index()));
        lock(list)
    }

    fn encoder(&self, cmd: CommandList, native_cmd: NativeCommandBuffer, frame: u64) -> Encoder<'_> {
        Encoder {
            native: self.native.as_ref(),
            cmd: native_cmd,
            nulls: &self.nulls,
            list: cmd,
            frame,
        }
    }

    /// The result of a query, `None` while the GPU has not produced it yet.
    fn read_query_result(&self, query: &GpuQuery) -> Result<Option<GpuQueryResult>, RhiError> {
        let payload =
            payload::<QueryPayload>(query.internal.as_ref()).ok_or(RhiError::InvalidHandle)?;
        if !payload.ended.load(Ordering::Acquire) {
            return Err(RhiError::InvalidDescriptor(
                "query was not ended in a submitted command list".into(),
            ));
        }
        let Some(value) = self.native.read_query(payload.heap, 0)? else {
            return Ok(None);
        };
        let frequency = self.adapter.limits.timestamp_frequency;
        Ok(Some(match query.desc.kind {
            GpuQueryKind::Event | GpuQueryKind::OcclusionBinary => GpuQueryResult {
                result_passed: value != 0,
                ..Default::default()
            },
            GpuQueryKind::Occlusion => GpuQueryResult {
                result_passed: value > 0,
                result_passed_sample_count: value,
                ..Default::default()
            },
            GpuQueryKind::Timestamp => GpuQueryResult {
                result_timestamp: value,
                result_timestamp_frequency: frequency,
                ..Default::default()
            },
            GpuQueryKind::TimestampDisjoint => GpuQueryResult {
                result_timestamp_frequency: frequency,
                result_disjoint: value != 0,
                ..Default::default()
            },
        }))
    }

    fn record(&self, cmd: CommandList, command: NativeCommand) {
        let mut state = self.list(cmd);
        let frame = state.frame;
        let native_cmd = state.native_cmd();
        self.encoder(cmd, native_cmd, frame).record(command);
    }

    fn with_binder(&self, cmd: CommandList, f: impl FnOnce(&mut dyn DescriptorBinder, &Encoder<'_>)) {
        let mut state = self.list(cmd);
        let frame = state.frame;
        let slot = state.slot();
        let enc = self.encoder(cmd, slot.cmd, frame);
        f(slot.binder.as_mut(), &enc);
    }

    fn memory_for(&self, usage: Usage, cpu_access: CpuAccessFlags) -> MemoryKind {
        match usage {
            Usage::Staging if cpu_access.contains(CpuAccessFlags::READ) => MemoryKind::Readback,
            Usage::Staging => MemoryKind::Upload,
            Usage::Dynamic => self.backend.dynamic_memory(),
            Usage::Default | Usage::Immutable => MemoryKind::DeviceLocal,
        }
    }

    /// Whether initial data can be handed to native creation directly.
    fn creates_with_data(&self, memory: MemoryKind) -> bool {
        memory.is_host_visible() || !self.backend.uploads_through_copy_queue()
    }

    fn require(&self, capability: GraphicsDeviceCapability, what: &str) -> Result<(), RhiError> {
        if self.caps.contains(capability) {
            Ok(())
        } else {
            Err(RhiError::Unsupported(format!("{} on this device", what)))
        }
    }

    /// The compiled pipeline for the bound state and the active render pass.
    fn graphics_pipeline(&self, state: &mut CommandListState, pso: &PipelineState) -> NativePipeline {
        let target = if !self.backend.pipelines_depend_on_render_pass() {
            0
        } else {
            match &state.pass {
                Some(pass) => pass.hash,
                None => structural_hash(&self.settings.backbuffer_format),
            }
        };
        let hash = pipeline_hash(pso.hash, target);
        if let Some(pipeline) = state.pipelines.get(&hash).copied().or_else(|| self.pipelines.get(hash)) {
            return pipeline;
        }

        let layout = pipeline_payload(pso)
            .layout
            .as_ref()
            .unwrap_or_else(|| panic!("pipeline state has no layout on this backend"));
        let pass = state
            .pass
            .as_ref()
            .and_then(|p| payload::<RenderPassPayload>(p.internal.as_ref()));
        let pipeline = graphics_pipeline_desc(&pso.desc, layout, pass, self.backbuffer_format)
            .and_then(|desc| self.native.create_graphics_pipeline(&desc).map_err(RhiError::from))
            .unwrap_or_else(|e| panic!("failed to compile pipeline {:#018x}: {}", hash, e));
        log::trace!("Compiled pipeline {:#018x} for target {:#018x}", hash, target);
        state.pipelines.insert(hash, pipeline);
        pipeline
    }

    fn bind_native_pipeline(
        state: &mut CommandListState,
        enc: &Encoder<'_>,
        bind_point: BindPoint,
        pipeline: NativePipeline,
    ) {
        let bound = state.bound_pipeline(bind_point);
        if *bound != Some(pipeline) {
            *bound = Some(pipeline);
            enc.record(NativeCommand::BindPipeline {
                bind_point,
                pipeline,
            });
        }
    }

    fn flush_graphics(&self, state: &mut CommandListState, enc: &Encoder<'_>) {
        if state.pso_dirty {
            let Some(pso) = state.pso.clone() else {
                panic!("draw recorded without a pipeline state");
            };
            if self.backend.binds_state_per_field() {
                let fields = &pipeline_payload(&pso).fields;
                state
                    .fields
                    .bind(enc, &pso.desc, fields, state.blend_factor, state.stencil_ref);
            } else {
                let pipeline = self.graphics_pipeline(state, &pso);
                Self::bind_native_pipeline(state, enc, BindPoint::Graphics, pipeline);
            }
            state.pso_dirty = false;
        }
        state.slot().binder.commit(enc, BindPoint::Graphics);
    }

    fn flush_compute(&self, state: &mut CommandListState, enc: &Encoder<'_>) {
        if state.compute_dirty {
            let Some(shader) = state.compute_shader.clone() else {
                panic!("dispatch recorded without a compute shader");
            };
            let payload = shader_payload(&shader);
            if self.backend.binds_state_per_field() {
                enc.record(NativeCommand::SetShader {
                    stage: ShaderStage::Compute,
                    shader: Some(payload.native),
                });
            } else {
                let compute = payload
                    .compute
                    .as_ref()
                    .unwrap_or_else(|| panic!("bound shader is not a compute shader"));
                Self::bind_native_pipeline(state, enc, BindPoint::Compute, compute.pipeline);
            }
            state.compute_dirty = false;
        }
        state.slot().binder.commit(enc, BindPoint::Compute);
    }

    fn flush_raytracing(&self, state: &mut CommandListState, enc: &Encoder<'_>) {
        if state.raytracing_dirty {
            let Some(pso) = state.raytracing_pso.clone() else {
                panic!("rays dispatched without a ray tracing pipeline");
            };
            let pipeline = payload::<RaytracingPipelinePayload>(pso.internal.as_ref())
                .unwrap_or_else(|| panic!("ray tracing pipeline was not created by this device"))
                .pipeline;
            Self::bind_native_pipeline(state, enc, BindPoint::Raytracing, pipeline);
            state.raytracing_dirty = false;
        }
        state.slot().binder.commit(enc, BindPoint::Raytracing);
    }

    /// Flushes pending state for `bind_point`, then records `command`.
    fn work(&self, cmd: CommandList, bind_point: BindPoint, command: NativeCommand) {
        let mut state = self.list(cmd);
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        match bind_point {
            BindPoint::Graphics => self.flush_graphics(&mut state, &enc),
            BindPoint::Compute => self.flush_compute(&mut state, &enc),
            BindPoint::Raytracing => self.flush_raytracing(&mut state, &enc),
        }
        enc.record(command);
    }

    fn null_descriptor(&self, range: &DescriptorRange) -> NativeDescriptor {
        match range.kind {
            BindingKind::ConstantBuffer => NativeDescriptor::NullConstantBuffer,
            BindingKind::ShaderResource => NativeDescriptor::View(self.nulls.srv(range.dimension)),
            BindingKind::UnorderedAccess => NativeDescriptor::View(self.nulls.uav(range.dimension)),
            BindingKind::Sampler => NativeDescriptor::Sampler(self.nulls.sampler()),
        }
    }

    fn null_descriptors(&self, ranges: &[DescriptorRange]) -> Vec<NativeDescriptor> {
        ranges
            .iter()
            .flat_map(|range| std::iter::repeat(self.null_descriptor(range)).take(range.count as usize))
            .collect()
    }

    /// A CPU-only heap holding `initial`, or `None` when it is empty.
    fn staging_heap(
        &self,
        kind: DescriptorHeapKind,
        initial: &[NativeDescriptor],
        owned: &mut Owned,
    ) -> Result<Option<NativeDescriptorHeap>, RhiError> {
        if initial.is_empty() {
            return Ok(None);
        }
        let heap = self.native.create_descriptor_heap(&NativeDescriptorHeapDesc {
            kind,
            capacity: initial.len() as u32,
            shader_visible: false,
        })?;
        owned.push(heap);
        self.native.write_descriptors(heap, 0, initial)?;
        Ok(Some(heap))
    }

    fn table_descriptor(
        &self,
        write: DescriptorWrite<'_>,
        dimension: ViewDimension,
    ) -> Result<NativeDescriptor, RhiError> {
        let view = |resource: &GpuResource, kind: SubresourceType, subresource: i32, null: NativeView| {
            if !resource.is_valid() {
                return Ok(null);
            }
            resource_payload(resource)
                .ok_or(RhiError::InvalidHandle)?
                .view(kind, subresource)
        };
        Ok(match write {
            DescriptorWrite::Resource { resource, subresource } => NativeDescriptor::View(view(
                resource,
                SubresourceType::Srv,
                subresource,
                self.nulls.srv(dimension),
            )?),
            DescriptorWrite::Uav { resource, subresource } => NativeDescriptor::View(view(
                resource,
                SubresourceType::Uav,
                subresource,
                self.nulls.uav(dimension),
            )?),
            DescriptorWrite::ConstantBuffer { buffer, offset } => {
                if offset >= buffer.desc.size {
                    return Err(RhiError::InvalidDescriptor(format!(
                        "offset {} is past the end of a {} byte buffer",
                        offset, buffer.desc.size
                    )));
                }
                NativeDescriptor::ConstantBuffer {
                    buffer: resource_payload(buffer)
                        .and_then(ResourcePayload::buffer)
                        .ok_or(RhiError::InvalidHandle)?,
                    offset,
                    size: buffer.desc.size - offset,
                }
            }
            DescriptorWrite::Sampler(sampler) => NativeDescriptor::Sampler(
                payload::<SamplerPayload>(sampler.internal.as_ref())
                    .ok_or(RhiError::InvalidHandle)?
                    .native,
            ),
        })
    }

    /// Tightly packed subresource copies from `src` into every subresource of `dst`.
    fn buffer_to_texture(&self, src: NativeBuffer, dst: &ResourcePayload) -> Vec<NativeCommand> {
        let (Some(texture), Some(desc)) = (dst.texture(), dst.texture_desc.as_ref()) else {
            return Vec::new();
        };
        let mut src_offset = 0u64;
        (0..desc.subresource_count())
            .map(|subresource| {
                let (width, height, _) = desc.mip_extent(subresource % desc.mip_levels.max(1));
                let command = NativeCommand::CopyBufferToTexture {
                    src,
                    src_offset,
                    row_pitch: desc.format.row_pitch(width),
                    slice_pitch: desc.format.slice_pitch(width, height),
                    dst: texture,
                    subresource,
                };
                src_offset += desc.subresource_size(subresource);
                command
            })
            .collect()
    }
}

impl fmt::Debug for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Device")
            .field("backend", &self.backend.kind())
            .field("adapter", &self.adapter.name)
            .field("frame", &self.frame.load(Ordering::Relaxed))
            .field("pipelines", &self.pipelines.len())
            .finish_non_exhaustive()
    }
}

impl GraphicsDevice for Device {
    fn create_buffer(
        &self,
        desc: &GpuBufferDesc,
        initial_data: Option<&[u8]>,
    ) -> Result<GpuBuffer, RhiError> {
        desc.validate()?;
        if let Some(data) = initial_data {
            if data.len() as u64 > desc.size {
                return Err(RhiError::InvalidDescriptor(format!(
                    "{} bytes of initial data exceed a {} byte buffer",
                    data.len(),
                    desc.size
                )));
            }
        }
        let memory = self.memory_for(desc.usage, desc.cpu_access);
        let renamed = desc.is_dynamic_constant_buffer() && !memory.is_host_visible();
        let direct = self.creates_with_data(memory);
        let buffer = self.store.create_buffer(
            desc,
            memory,
            if direct { initial_data } else { None },
            renamed,
        )?;
        if let (false, Some(data)) = (direct, initial_data) {
            self.copy_queue
                .upload_buffer(&self.store, native_buffer(&buffer), 0, data)?;
        }
        log::trace!("Created {} byte {:?} buffer in {:?} memory", desc.size, desc.usage, memory);
        Ok(buffer)
    }

    fn create_texture(
        &self,
        desc: &TextureDesc,
        initial_data: Option<&[SubresourceData<'_>]>,
    ) -> Result<Texture, RhiError> {
        desc.validate()?;
        let mut resolved = desc.clone();
        resolved.mip_levels = desc.resolved_mip_levels();
        if let Some(data) = initial_data {
            if data.len() != resolved.subresource_count() as usize {
                return Err(RhiError::InvalidDescriptor(format!(
                    "{} initial subresources given for a texture of {}",
                    data.len(),
                    resolved.subresource_count()
                )));
            }
        }
        let memory = self.memory_for(desc.usage, desc.cpu_access);
        let direct = self.creates_with_data(memory);
        let texture = self
            .store
            .create_texture(&resolved, memory, if direct { initial_data } else { None })?;
        if let (false, Some(data)) = (direct, initial_data) {
            let native = resource_payload(&texture)
                .and_then(ResourcePayload::texture)
                .ok_or(RhiError::InvalidHandle)?;
            self.copy_queue.upload_texture(&self.store, native, data)?;
        }
        log::trace!(
            "Created {}x{}x{} {:?} texture with {} mips",
            resolved.width,
            resolved.height,
            resolved.array_size,
            resolved.format,
            resolved.mip_levels
        );
        Ok(texture)
    }

    fn create_shader(
        &self,
        stage: ShaderStage,
        bytecode: &[u8],
        reflection: Option<&[ShaderBinding]>,
    ) -> Result<Shader, RhiError> {
        let bindings = match reflection {
            Some(bindings) => {
                if let Some(bad) = bindings.iter().find(|b| b.slot as usize >= b.kind.slot_count()) {
                    return Err(RhiError::InvalidDescriptor(format!(
                        "{:?} slot {} exceeds the per-stage limit",
                        bad.kind, bad.slot
                    )));
                }
                BindingLayout::from_bindings(bindings.iter().copied())
            }
            None => BindingLayout::full(),
        };
        let native = self.native.create_shader(stage, bytecode)?;
        let mut owned = Owned::with(self.store.destroyer(), native);

        let compute = if stage == ShaderStage::Compute && !self.backend.binds_state_per_field() {
            let layout = self.layouts.get_or_create(
                self.native.as_ref(),
                self.store.destroyer(),
                NativePipelineLayoutDesc {
                    bindings: bindings.clone(),
                    tables: Vec::new(),
                },
            )?;
            let pipeline = self.native.create_compute_pipeline(&NativeComputePipelineDesc {
                layout: layout.native,
                shader: native,
            })?;
            owned.push(pipeline);
            log::trace!("Compiled compute pipeline for {} bytes of bytecode", bytecode.len());
            Some(ComputePipeline { layout, pipeline })
        } else {
            None
        };

        Ok(Shader {
            stage,
            hash: structural_hash(bytecode),
            bindings,
            internal: Some(BackendPayload::new(ShaderPayload {
                native,
                compute,
                _owned: owned,
            })),
        })
    }

    fn create_sampler(&self, desc: &SamplerDesc) -> Result<Sampler, RhiError> {
        let native = self.native.create_sampler(desc)?;
        Ok(Sampler {
            desc: desc.clone(),
            internal: Some(BackendPayload::new(SamplerPayload {
                native,
                _owned: Owned::with(self.store.destroyer(), native),
            })),
        })
    }

    fn create_query(&self, desc: &GpuQueryDesc) -> Result<GpuQuery, RhiError> {
        let heap = self.native.create_query_heap(&NativeQueryHeapDesc {
            kind: desc.kind,
            count: 1,
        })?;
        Ok(GpuQuery {
            desc: *desc,
            internal: Some(BackendPayload::new(QueryPayload {
                heap,
                ended: Default::default(),
                _owned: Owned::with(self.store.destroyer(), heap),
            })),
        })
    }

    fn create_pipeline_state(&self, desc: &PipelineStateDesc) -> Result<PipelineState, RhiError> {
        let slots = [
            (ShaderStage::Vertex, &desc.vs),
            (ShaderStage::Hull, &desc.hs),
            (ShaderStage::Domain, &desc.ds),
            (ShaderStage::Geometry, &desc.gs),
            (ShaderStage::Pixel, &desc.ps),
            (ShaderStage::Amplification, &desc.amplification),
            (ShaderStage::Mesh, &desc.mesh),
        ];
        for (stage, shader) in slots {
            if let Some(shader) = shader {
                if shader.stage != stage {
                    return Err(RhiError::InvalidDescriptor(format!(
                        "{:?} shader bound to the {:?} stage",
                        shader.stage, stage
                    )));
                }
            }
        }
        if desc.vs.is_none() && desc.mesh.is_none() {
            return Err(RhiError::InvalidDescriptor(
                "pipeline needs a vertex or mesh shader".into(),
            ));
        }
        if desc.hs.is_some() || desc.ds.is_some() {
            self.require(GraphicsDeviceCapability::TESSELLATION, "tessellation")?;
        }
        if desc.is_mesh_pipeline() {
            self.require(GraphicsDeviceCapability::MESH_SHADER, "mesh shaders")?;
        }

        let mut owned = Owned::new(self.store.destroyer());
        let (layout, fields) = if self.backend.binds_state_per_field() {
            let mut create = |state: NativeStateObjectDesc| -> Result<_, RhiError> {
                let object = self.native.create_state_object(&state)?;
                owned.push(object);
                Ok(Some(object))
            };
            let blend = create(NativeStateObjectDesc::Blend(desc.blend.clone()))?;
            let rasterizer = create(NativeStateObjectDesc::Rasterizer(desc.rasterizer.clone()))?;
            let depth_stencil =
                create(NativeStateObjectDesc::DepthStencil(desc.depth_stencil.clone()))?;
            let input_layout = match (&desc.input_layout, &desc.vs) {
                (Some(layout), Some(vs)) => create(NativeStateObjectDesc::InputLayout {
                    layout: layout.clone(),
                    vertex_shader: native_shader(vs).ok_or(RhiError::InvalidHandle)?,
                })?,
                _ => None,
            };
            (
                None,
                FieldStates {
                    blend,
                    rasterizer,
                    depth_stencil,
                    input_layout,
                },
            )
        } else {
            let layout = self.layouts.get_or_create(
                self.native.as_ref(),
                self.store.destroyer(),
                graphics_layout_desc(desc),
            )?;
            (Some(layout), FieldStates::default())
        };

        Ok(PipelineState {
            hash: desc.structural_hash(),
            desc: Arc::new(desc.clone()),
            internal: Some(BackendPayload::new(PipelinePayload {
                layout,
                fields,
                _owned: owned,
            })),
        })
    }

    fn create_render_pass(&self, desc: &RenderPassDesc) -> Result<RenderPass, RhiError> {
        build_render_pass(&self.store, self.backend.as_ref(), desc)
    }

    fn create_raytracing_acceleration_structure(
        &self,
        desc: &RaytracingAccelerationStructureDesc,
    ) -> Result<AccelerationStructure, RhiError> {
        self.require(GraphicsDeviceCapability::RAYTRACING, "ray tracing")?;
        let (geometry_count, primitive_count) = match desc.kind {
            AccelerationStructureKind::BottomLevel => (
                desc.bottom_level.len() as u32,
                desc.bottom_level.iter().map(BottomLevelGeometry::primitive_count).sum(),
            ),
            AccelerationStructureKind::TopLevel => {
                let instances = desc.top_level.as_ref().ok_or_else(|| {
                    RhiError::InvalidDescriptor("top-level structure without instances".into())
                })?;
                (1, instances.count)
            }
        };
        let native_desc = NativeAccelerationStructureDesc {
            kind: desc.kind,
            flags: desc.flags,
            geometry_count,
            primitive_count,
        };
        let size = self.native.acceleration_structure_size(&native_desc);
        let buffer = self.native.create_buffer(
            &NativeBufferDesc {
                size,
                memory: MemoryKind::DeviceLocal,
                bind_flags: BindFlags::UNORDERED_ACCESS | BindFlags::SHADER_RESOURCE,
                misc_flags: ResourceMiscFlags::RAY_TRACING,
                stride: 0,
            },
            None,
        )?;
        let structure = match self.native.create_acceleration_structure(&native_desc, buffer) {
            Ok(structure) => structure,
            Err(e) => {
                self.store.destroyer().release(buffer);
                return Err(e.into());
            }
        };
        let resource = self.store.wrap_acceleration_structure(structure, buffer, size)?;
        log::trace!("Created {:?} acceleration structure of {} bytes", desc.kind, size);
        Ok(AccelerationStructure {
            resource,
            desc: desc.clone(),
            size,
        })
    }

    fn create_raytracing_pipeline_state(
        &self,
        desc: &RaytracingPipelineStateDesc,
    ) -> Result<RaytracingPipelineState, RhiError> {
        self.require(GraphicsDeviceCapability::RAYTRACING, "ray tracing")?;
        let mut bindings = BindingLayout::default();
        let mut libraries = Vec::new();
        for library in &desc.shader_libraries {
            bindings.merge(&library.shader.bindings);
            let shader = native_shader(&library.shader).ok_or(RhiError::InvalidHandle)?;
            libraries.push((shader, library.function_name.clone()));
        }
        let layout = self.layouts.get_or_create(
            self.native.as_ref(),
            self.store.destroyer(),
            NativePipelineLayoutDesc {
                bindings,
                tables: Vec::new(),
            },
        )?;
        let pipeline = self.native.create_raytracing_pipeline(&NativeRaytracingPipelineDesc {
            layout: layout.native,
            libraries,
            hit_group_count: desc.hit_groups.len() as u32,
            max_trace_recursion_depth: desc.max_trace_recursion_depth,
            max_payload_size_in_bytes: desc.max_payload_size_in_bytes,
            max_attribute_size_in_bytes: desc.max_attribute_size_in_bytes,
        })?;
        Ok(RaytracingPipelineState {
            desc: desc.clone(),
            internal: Some(BackendPayload::new(RaytracingPipelinePayload {
                pipeline,
                layout,
                _owned: Owned::with(self.store.destroyer(), pipeline),
            })),
        })
    }

    fn create_descriptor_table(
        &self,
        layout: &DescriptorTableLayout,
    ) -> Result<DescriptorTable, RhiError> {
        self.require(GraphicsDeviceCapability::DESCRIPTOR_TABLES, "descriptor tables")?;
        if layout.resources.iter().any(|r| r.kind == BindingKind::Sampler)
            || layout.samplers.iter().any(|r| r.kind != BindingKind::Sampler)
        {
            return Err(RhiError::InvalidDescriptor(
                "sampler ranges and resource ranges must not be mixed".into(),
            ));
        }
        let resources = self.null_descriptors(&layout.resources);
        let samplers = self.null_descriptors(&layout.samplers);

        let internal = match self.backend.binding_model() {
            BindingModel::FlatSlot => {
                return Err(RhiError::Unsupported(
                    "descriptor tables with flat-slot binding".into(),
                ))
            }
            BindingModel::DescriptorHeapRing => {
                let mut owned = Owned::new(self.store.destroyer());
                let resources = self.staging_heap(DescriptorHeapKind::Resource, &resources, &mut owned)?;
                let samplers = self.staging_heap(DescriptorHeapKind::Sampler, &samplers, &mut owned)?;
                BackendPayload::new(HeapTablePayload {
                    resources,
                    samplers,
                    _owned: owned,
                })
            }
            BindingModel::DescriptorSetPool => {
                let table_layout = self.layouts.get_or_create(
                    self.native.as_ref(),
                    self.store.destroyer(),
                    NativePipelineLayoutDesc {
                        bindings: BindingLayout::default(),
                        tables: vec![layout.clone()],
                    },
                )?;
                let mut descriptors = resources;
                descriptors.extend(samplers);
                BackendPayload::new(SetTablePayload {
                    layout: table_layout,
                    descriptors: Mutex::new(descriptors),
                })
            }
        };
        log::trace!(
            "Created descriptor table of {} resources and {} samplers",
            layout.resource_count(),
            layout.sampler_count()
        );
        Ok(DescriptorTable {
            layout: Arc::new(layout.clone()),
            internal: Some(internal),
        })
    }

    fn write_descriptor_table(
        &self,
        table: &DescriptorTable,
        range_index: usize,
        array_index: u32,
        write: DescriptorWrite<'_>,
    ) -> Result<(), RhiError> {
        let (kind, index) = table
            .layout
            .descriptor_index(range_index, array_index)
            .ok_or_else(|| {
                RhiError::InvalidDescriptor(format!(
                    "descriptor {} of range {} is outside the table",
                    array_index, range_index
                ))
            })?;
        if write.kind() != kind {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} written into a {:?} range",
                write.kind(),
                kind
            )));
        }
        let dimension = table
            .layout
            .range(range_index)
            .map_or(ViewDimension::Texture2D, |range| range.dimension);
        let descriptor = self.table_descriptor(write, dimension)?;

        if let Some(heaps) = payload::<HeapTablePayload>(table.internal.as_ref()) {
            let heap = if kind == BindingKind::Sampler {
                heaps.samplers
            } else {
                heaps.resources
            };
            let heap = heap.ok_or(RhiError::InvalidHandle)?;
            self.native.write_descriptors(heap, index, &[descriptor])?;
            return Ok(());
        }
        if let Some(set) = payload::<SetTablePayload>(table.internal.as_ref()) {
            let index = if kind == BindingKind::Sampler {
                table.layout.resource_count() + index
            } else {
                index
            };
            let mut descriptors = lock(&set.descriptors);
            let slot = descriptors
                .get_mut(index as usize)
                .ok_or(RhiError::InvalidHandle)?;
            *slot = descriptor;
            return Ok(());
        }
        Err(RhiError::InvalidHandle)
    }

    fn create_texture_subresource(
        &self,
        texture: &Texture,
        kind: SubresourceType,
        first_slice: u32,
        slice_count: Option<u32>,
        first_mip: u32,
        mip_count: Option<u32>,
    ) -> Result<i32, RhiError> {
        self.store
            .create_texture_view(texture, kind, first_slice, slice_count, first_mip, mip_count)
    }

    fn create_buffer_subresource(
        &self,
        buffer: &GpuBuffer,
        kind: SubresourceType,
        offset: u64,
        size: Option<u64>,
    ) -> Result<i32, RhiError> {
        self.store.create_buffer_view(buffer, kind, offset, size)
    }

    fn subresource_count(&self, resource: &GpuResource, kind: SubresourceType) -> usize {
        resource_payload(resource).map_or(0, |p| p.view_count(kind))
    }

    fn map(&self, buffer: &GpuBuffer, mode: MapMode) -> Result<Mapping, RhiError> {
        let payload = resource_payload(buffer).ok_or(RhiError::InvalidHandle)?;
        if !payload.memory.is_host_visible() {
            return Err(RhiError::Unsupported(format!(
                "mapping a buffer in {:?} memory",
                payload.memory
            )));
        }
        let native = payload.buffer().ok_or(RhiError::InvalidHandle)?;
        let mut data = vec![0; buffer.desc.size as usize];
        if mode.reads() {
            self.native.read_buffer(native, 0, &mut data)?;
        }
        Ok(Mapping::new(mode, data))
    }

    fn unmap(&self, buffer: &GpuBuffer, mapping: Mapping) -> Result<(), RhiError> {
        if !mapping.mode().writes() {
            return Ok(());
        }
        let native = resource_payload(buffer)
            .and_then(ResourcePayload::buffer)
            .ok_or(RhiError::InvalidHandle)?;
        if mapping.data().len() as u64 != buffer.desc.size {
            return Err(RhiError::InvalidDescriptor(
                "mapping does not belong to this buffer".into(),
            ));
        }
        self.native.write_buffer(native, 0, mapping.data())?;
        Ok(())
    }

    fn begin_command_list(&self) -> CommandList {
        let index = self.open_lists.fetch_add(1, Ordering::AcqRel);
        assert!(
            index < COMMANDLIST_COUNT,
            "more than {} command lists begun in one frame",
            COMMANDLIST_COUNT
        );
        let cmd = CommandList(index as u32);
        let extent = {
            let swapchain = lock(&self.swapchain);
            (swapchain.width, swapchain.height)
        };
        let frame = self.frame.load(Ordering::Acquire);
        let mut state = lock(&self.lists[index]);
        if let Err(e) = state.begin(
            cmd,
            frame,
            &self.store,
            &self.nulls,
            self.backend.as_ref(),
            &self.slot_config,
            extent,
        ) {
            panic!("failed to begin command list {}: {}", index, e);
        }
        cmd
    }

    fn submit_command_lists(&self) {
        let count = self.open_lists.load(Ordering::Acquire).min(COMMANDLIST_COUNT);
        let frame = self.frame.load(Ordering::Acquire);
        let next_frame = frame + 1;

        let mut buffers = Vec::with_capacity(count);
        for list in &self.lists[..count] {
            if let Some(cmd) = lock(list).finish(&self.store) {
                buffers.push(cmd);
            }
        }

        let waits: Vec<_> = match self.copy_queue.flush(self.native.as_ref(), next_frame) {
            Ok(wait) => wait.into_iter().collect(),
            Err(e) => {
                log::error!("Failed to submit pending uploads: {}", e);
                Vec::new()
            }
        };
        if let Err(e) = self.native.submit(
            QueueKind::Graphics,
            &buffers,
            &waits,
            Some((self.frame_fence, next_frame)),
        ) {
            log::error!("Failed to submit frame {}: {}", frame, e);
        }

        for list in &self.lists[..count] {
            let mut state = lock(list);
            self.pipelines.merge(state.pipelines.drain());
            for query in state.ended_queries.drain(..) {
                if let Some(payload) = payload::<QueryPayload>(query.internal.as_ref()) {
                    payload.ended.store(true, Ordering::Release);
                }
            }
        }
        self.open_lists.store(0, Ordering::Release);
        self.frame.store(next_frame, Ordering::Release);

        let in_flight = self.settings.backbuffer_count as u64;
        if next_frame >= in_flight {
            if let Err(e) = self.native.wait_fence(self.frame_fence, next_frame - in_flight) {
                log::error!("Failed to wait for frame {}: {}", next_frame - in_flight, e);
            }
        }
        self.store.destroyer().update(next_frame, in_flight + 1);
    }

    fn wait_for_gpu(&self) {
        let frame = self.frame.load(Ordering::Acquire);
        if let Err(e) = self.copy_queue.flush(self.native.as_ref(), frame) {
            log::error!("Failed to submit pending uploads: {}", e);
        }
        if let Err(e) = self.native.wait_idle() {
            log::error!("Failed to wait for the device to go idle: {}", e);
        }
    }

    fn present_begin(&self, cmd: CommandList) {
        let pass = {
            let swapchain = lock(&self.swapchain);
            swapchain.passes[swapchain.current].clone()
        };
        self.render_pass_begin(&pass, cmd);
    }

    fn present_end(&self, cmd: CommandList) {
        self.render_pass_end(cmd);
        self.submit_command_lists();
        let mut swapchain = lock(&self.swapchain);
        if let Err(e) = self.native.present(swapchain.native, self.settings.vsync) {
            log::error!("Failed to present: {}", e);
        }
        match self.native.acquire_next_image(swapchain.native) {
            Ok(index) => swapchain.current = index as usize % swapchain.images.len().max(1),
            Err(e) => log::error!("Failed to acquire the next back buffer: {}", e),
        }
    }

    fn clear_pipeline_state_cache(&self) {
        self.pipelines.clear();
    }

    fn set_resolution(&self, width: u32, height: u32) -> Result<(), RhiError> {
        if width == 0 || height == 0 {
            return Err(RhiError::InvalidDescriptor(format!(
                "{}x{} has a zero extent",
                width, height
            )));
        }
        {
            let swapchain = lock(&self.swapchain);
            if (swapchain.width, swapchain.height) == (width, height) {
                return Ok(());
            }
        }
        self.wait_for_gpu();
        let mut swapchain = lock(&self.swapchain);
        self.native.resize_swapchain(swapchain.native, width, height)?;
        let settings = DeviceSettings {
            width,
            height,
            ..self.settings.clone()
        };
        let (images, passes) =
            wrap_backbuffers(&self.store, self.backend.as_ref(), &settings, swapchain.native)?;
        swapchain.images = images;
        swapchain.passes = passes;
        swapchain.width = width;
        swapchain.height = height;
        swapchain.current = self.native.acquire_next_image(swapchain.native)? as usize;
        log::info!("Resized back buffers to {}x{}", width, height);
        Ok(())
    }

    fn back_buffer(&self) -> Texture {
        let swapchain = lock(&self.swapchain);
        swapchain.images[swapchain.current].clone()
    }

    fn frame_count(&self) -> u64 {
        self.frame.load(Ordering::Acquire)
    }

    fn capabilities(&self) -> GraphicsDeviceCapability {
        self.caps
    }

    fn adapter_info(&self) -> AdapterInfo {
        AdapterInfo {
            name: self.adapter.name.clone(),
            backend: self.backend.kind(),
            binding_model: self.backend.binding_model(),
            device_type: self.adapter.device_type,
        }
    }

    fn timestamp_frequency(&self) -> u64 {
        self.adapter.limits.timestamp_frequency
    }

    fn bind_viewports(&self, viewports: &[Viewport], cmd: CommandList) {
        assert!(
            viewports.len() <= MAX_VIEWPORTS,
            "{} viewports exceed the limit of {}",
            viewports.len(),
            MAX_VIEWPORTS
        );
        self.record(
            cmd,
            NativeCommand::SetViewports {
                viewports: viewports.to_vec(),
            },
        );
    }

    fn bind_scissor_rects(&self, rects: &[Rect], cmd: CommandList) {
        assert!(
            rects.len() <= MAX_VIEWPORTS,
            "{} scissor rects exceed the limit of {}",
            rects.len(),
            MAX_VIEWPORTS
        );
        self.record(
            cmd,
            NativeCommand::SetScissorRects {
                rects: rects.to_vec(),
            },
        );
    }

    fn bind_resource(
        &self,
        stage: ShaderStage,
        resource: &GpuResource,
        slot: u32,
        cmd: CommandList,
        subresource: i32,
    ) {
        let view = resource_view(resource, SubresourceType::Srv, subresource);
        self.with_binder(cmd, |binder, enc| binder.bind_resource(enc, stage, slot, view));
    }

    fn bind_resources(
        &self,
        stage: ShaderStage,
        resources: &[&GpuResource],
        slot: u32,
        cmd: CommandList,
    ) {
        assert!(
            resources.len() <= MAX_MULTI_BIND_RESOURCES,
            "{} resources exceed the multi-bind limit of {}",
            resources.len(),
            MAX_MULTI_BIND_RESOURCES
        );
        let views: Vec<_> = resources
            .iter()
            .map(|r| resource_view(r, SubresourceType::Srv, -1))
            .collect();
        self.with_binder(cmd, |binder, enc| {
            for (i, view) in views.into_iter().enumerate() {
                binder.bind_resource(enc, stage, slot + i as u32, view);
            }
        });
    }

    fn bind_uav(
        &self,
        stage: ShaderStage,
        resource: &GpuResource,
        slot: u32,
        cmd: CommandList,
        subresource: i32,
    ) {
        let view = resource_view(resource, SubresourceType::Uav, subresource);
        self.with_binder(cmd, |binder, enc| binder.bind_uav(enc, stage, slot, view));
    }

    fn bind_uavs(&self, stage: ShaderStage, resources: &[&GpuResource], slot: u32, cmd: CommandList) {
        assert!(
            resources.len() <= MAX_MULTI_BIND_UAVS,
            "{} UAVs exceed the multi-bind limit of {}",
            resources.len(),
            MAX_MULTI_BIND_UAVS
        );
        let views: Vec<_> = resources
            .iter()
            .map(|r| resource_view(r, SubresourceType::Uav, -1))
            .collect();
        self.with_binder(cmd, |binder, enc| {
            for (i, view) in views.into_iter().enumerate() {
                binder.bind_uav(enc, stage, slot + i as u32, view);
            }
        });
    }

    fn unbind_resources(&self, slot: u32, count: u32, cmd: CommandList) {
        self.with_binder(cmd, |binder, enc| binder.unbind_resources(enc, slot, count));
    }

    fn unbind_uavs(&self, slot: u32, count: u32, cmd: CommandList) {
        self.with_binder(cmd, |binder, enc| binder.unbind_uavs(enc, slot, count));
    }

    fn bind_sampler(&self, stage: ShaderStage, sampler: &Sampler, slot: u32, cmd: CommandList) {
        let native = payload::<SamplerPayload>(sampler.internal.as_ref()).map(|p| p.native);
        self.with_binder(cmd, |binder, enc| binder.bind_sampler(enc, stage, slot, native));
    }

    fn bind_constant_buffer(
        &self,
        stage: ShaderStage,
        buffer: &GpuBuffer,
        slot: u32,
        cmd: CommandList,
        offset: u64,
    ) {
        let constant = buffer.is_valid().then(|| BoundConstant {
            buffer: buffer.clone(),
            offset,
        });
        self.with_binder(cmd, |binder, enc| {
            binder.bind_constant_buffer(enc, stage, slot, constant)
        });
    }

    fn bind_vertex_buffers(
        &self,
        buffers: &[&GpuBuffer],
        slot: u32,
        strides: &[u32],
        offsets: Option<&[u64]>,
        cmd: CommandList,
    ) {
        assert!(
            slot as usize + buffers.len() <= MAX_VERTEX_BUFFERS,
            "vertex buffers {}..{} exceed the limit of {}",
            slot,
            slot as usize + buffers.len(),
            MAX_VERTEX_BUFFERS
        );
        assert!(strides.len() >= buffers.len(), "every vertex buffer needs a stride");
        let buffers = buffers
            .iter()
            .enumerate()
            .map(|(i, buffer)| NativeVertexBuffer {
                buffer: native_buffer(buffer),
                offset: offsets.and_then(|o| o.get(i)).copied().unwrap_or(0),
                stride: strides[i],
            })
            .collect();
        self.record(
            cmd,
            NativeCommand::BindVertexBuffers {
                first_slot: slot,
                buffers,
            },
        );
    }

    fn bind_index_buffer(&self, buffer: &GpuBuffer, format: IndexFormat, offset: u64, cmd: CommandList) {
        self.record(
            cmd,
            NativeCommand::BindIndexBuffer {
                buffer: native_buffer(buffer),
                offset,
                format,
            },
        );
    }

    fn bind_stencil_ref(&self, value: u32, cmd: CommandList) {
        let mut state = self.list(cmd);
        if state.stencil_ref == value {
            return;
        }
        state.stencil_ref = value;
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        if !self.backend.binds_state_per_field() {
            enc.record(NativeCommand::SetStencilRef { value });
        } else if let Some(pso) = state.pso.clone() {
            let depth_stencil = pipeline_payload(&pso).fields.depth_stencil;
            state.fields.bind_depth_stencil(&enc, depth_stencil, value);
        }
    }

    fn bind_blend_factor(&self, factor: [f32; 4], cmd: CommandList) {
        let mut state = self.list(cmd);
        if state.blend_factor == factor {
            return;
        }
        state.blend_factor = factor;
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        if !self.backend.binds_state_per_field() {
            enc.record(NativeCommand::SetBlendFactor { factor });
        } else if let Some(pso) = state.pso.clone() {
            let blend = pipeline_payload(&pso).fields.blend;
            state.fields.bind_blend(&enc, blend, factor, pso.desc.sample_mask);
        }
    }

    fn bind_pipeline_state(&self, pso: &PipelineState, cmd: CommandList) {
        let layout = pipeline_payload(pso).layout.clone();
        let mut state = self.list(cmd);
        if state.pso.as_ref().is_some_and(|bound| bound.same(pso)) {
            return;
        }
        state.pso = Some(pso.clone());
        state.pso_dirty = true;
        let frame = state.frame;
        let slot = state.slot();
        let enc = self.encoder(cmd, slot.cmd, frame);
        slot.binder.set_layout(&enc, BindPoint::Graphics, layout.as_ref());
    }

    fn bind_compute_shader(&self, shader: &Shader, cmd: CommandList) {
        assert!(
            shader.stage == ShaderStage::Compute,
            "{:?} shader bound as a compute shader",
            shader.stage
        );
        let layout = shader_payload(shader).compute.as_ref().map(|c| c.layout.clone());
        let mut state = self.list(cmd);
        let unchanged = state
            .compute_shader
            .as_ref()
            .is_some_and(|bound| same_payload(bound.internal.as_ref(), shader.internal.as_ref()));
        if unchanged {
            return;
        }
        state.compute_shader = Some(shader.clone());
        state.compute_dirty = true;
        let frame = state.frame;
        let slot = state.slot();
        let enc = self.encoder(cmd, slot.cmd, frame);
        slot.binder.set_layout(&enc, BindPoint::Compute, layout.as_ref());
    }

    fn bind_descriptor_table(
        &self,
        bind_point: BindPoint,
        space: u32,
        table: &DescriptorTable,
        cmd: CommandList,
    ) {
        assert!(
            (space as usize) < MAX_DESCRIPTOR_TABLES,
            "descriptor table space {} exceeds the limit of {}",
            space,
            MAX_DESCRIPTOR_TABLES
        );
        self.with_binder(cmd, |binder, enc| binder.bind_table(enc, bind_point, space, table));
    }

    fn bind_raytracing_pipeline_state(&self, pso: &RaytracingPipelineState, cmd: CommandList) {
        let layout = payload::<RaytracingPipelinePayload>(pso.internal.as_ref())
            .unwrap_or_else(|| panic!("ray tracing pipeline was not created by this device"))
            .layout
            .clone();
        let mut state = self.list(cmd);
        let unchanged = state
            .raytracing_pso
            .as_ref()
            .is_some_and(|bound| same_payload(bound.internal.as_ref(), pso.internal.as_ref()));
        if unchanged {
            return;
        }
        state.raytracing_pso = Some(pso.clone());
        state.raytracing_dirty = true;
        let frame = state.frame;
        let slot = state.slot();
        let enc = self.encoder(cmd, slot.cmd, frame);
        slot.binder.set_layout(&enc, BindPoint::Raytracing, Some(&layout));
    }

    fn render_pass_begin(&self, pass: &RenderPass, cmd: CommandList) {
        let pass_payload = payload::<RenderPassPayload>(pass.internal.as_ref())
            .unwrap_or_else(|| panic!("render pass was not created by this device"));
        let mut state = self.list(cmd);
        assert!(state.pass.is_none(), "render pass begun inside another render pass");
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        self.backend.begin_render_pass(&enc, pass_payload);
        state.pass = Some(pass.clone());
        if self.backend.pipelines_depend_on_render_pass() {
            state.pso_dirty = true;
        }
    }

    fn render_pass_end(&self, cmd: CommandList) {
        let mut state = self.list(cmd);
        let Some(pass) = state.pass.take() else {
            panic!("render_pass_end without an active render pass");
        };
        let pass_payload = payload::<RenderPassPayload>(pass.internal.as_ref())
            .unwrap_or_else(|| panic!("render pass was not created by this device"));
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        self.backend.end_render_pass(&enc, pass_payload);
        if self.backend.pipelines_depend_on_render_pass() {
            state.pso_dirty = true;
        }
    }

    fn draw(&self, vertex_count: u32, start_vertex: u32, cmd: CommandList) {
        self.draw_instanced(vertex_count, 1, start_vertex, 0, cmd);
    }

    fn draw_indexed(&self, index_count: u32, start_index: u32, base_vertex: i32, cmd: CommandList) {
        self.draw_indexed_instanced(index_count, 1, start_index, base_vertex, 0, cmd);
    }

    fn draw_instanced(
        &self,
        vertex_count: u32,
        instance_count: u32,
        start_vertex: u32,
        start_instance: u32,
        cmd: CommandList,
    ) {
        self.work(
            cmd,
            BindPoint::Graphics,
            NativeCommand::Draw {
                vertex_count,
                instance_count,
                first_vertex: start_vertex,
                first_instance: start_instance,
            },
        );
    }

    fn draw_indexed_instanced(
        &self,
        index_count: u32,
        instance_count: u32,
        start_index: u32,
        base_vertex: i32,
        start_instance: u32,
        cmd: CommandList,
    ) {
        self.work(
            cmd,
            BindPoint::Graphics,
            NativeCommand::DrawIndexed {
                index_count,
                instance_count,
                first_index: start_index,
                base_vertex,
                first_instance: start_instance,
            },
        );
    }

    fn draw_instanced_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList) {
        let buffer = native_buffer(args);
        self.work(
            cmd,
            BindPoint::Graphics,
            NativeCommand::DrawIndirect {
                buffer,
                offset,
                indexed: false,
            },
        );
    }

    fn draw_indexed_instanced_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList) {
        let buffer = native_buffer(args);
        self.work(
            cmd,
            BindPoint::Graphics,
            NativeCommand::DrawIndirect {
                buffer,
                offset,
                indexed: true,
            },
        );
    }

    fn dispatch(&self, x: u32, y: u32, z: u32, cmd: CommandList) {
        self.work(cmd, BindPoint::Compute, NativeCommand::Dispatch { x, y, z });
    }

    fn dispatch_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList) {
        let buffer = native_buffer(args);
        self.work(cmd, BindPoint::Compute, NativeCommand::DispatchIndirect { buffer, offset });
    }

    fn dispatch_mesh(&self, x: u32, y: u32, z: u32, cmd: CommandList) {
        assert!(
            self.caps.contains(GraphicsDeviceCapability::MESH_SHADER),
            "mesh shaders are not supported on this device"
        );
        self.work(cmd, BindPoint::Graphics, NativeCommand::DispatchMesh { x, y, z });
    }

    fn dispatch_mesh_indirect(&self, args: &GpuBuffer, offset: u64, cmd: CommandList) {
        assert!(
            self.caps.contains(GraphicsDeviceCapability::MESH_SHADER),
            "mesh shaders are not supported on this device"
        );
        let buffer = native_buffer(args);
        self.work(cmd, BindPoint::Graphics, NativeCommand::DispatchMeshIndirect { buffer, offset });
    }

    fn dispatch_rays(&self, desc: &DispatchRaysDesc, cmd: CommandList) {
        assert!(
            self.caps.contains(GraphicsDeviceCapability::RAYTRACING),
            "ray tracing is not supported on this device"
        );
        self.work(
            cmd,
            BindPoint::Raytracing,
            NativeCommand::DispatchRays {
                width: desc.width,
                height: desc.height,
                depth: desc.depth,
            },
        );
    }

    fn build_raytracing_acceleration_structure(
        &self,
        dst: &AccelerationStructure,
        cmd: CommandList,
        src: Option<&AccelerationStructure>,
    ) {
        let structure = |resource: &GpuResource| match resource_payload(resource).map(|p| p.native) {
            Some(NativeResource::AccelerationStructure { structure, .. }) => structure,
            _ => panic!("resource is not an acceleration structure created by this device"),
        };
        self.record(
            cmd,
            NativeCommand::BuildAccelerationStructure {
                dst: structure(dst),
                src: src.map(|s| structure(s)),
            },
        );
    }

    fn copy_resource(&self, dst: &GpuResource, src: &GpuResource, cmd: CommandList) {
        let (Some(dst_payload), Some(src_payload)) = (resource_payload(dst), resource_payload(src)) else {
            panic!("copy between resources not created by this device");
        };
        let commands = match (src_payload.native, dst_payload.native) {
            (NativeResource::Buffer(src), NativeResource::Buffer(dst)) => vec![NativeCommand::CopyBuffer {
                src,
                src_offset: 0,
                dst,
                dst_offset: 0,
                size: src_payload.size.min(dst_payload.size),
            }],
            (NativeResource::Texture(src), NativeResource::Texture(dst)) => {
                vec![NativeCommand::CopyTexture { src, dst }]
            }
            (NativeResource::Texture(src), NativeResource::Buffer(dst)) => {
                vec![NativeCommand::CopyTextureToBuffer {
                    src,
                    dst,
                    dst_offset: 0,
                }]
            }
            (NativeResource::Buffer(src), NativeResource::Texture(_)) => {
                self.buffer_to_texture(src, dst_payload)
            }
            _ => panic!("acceleration structures cannot be copied"),
        };
        let mut state = self.list(cmd);
        let frame = state.frame;
        let enc = self.encoder(cmd, state.native_cmd(), frame);
        for command in commands {
            enc.record(command);
        }
    }

    fn copy_buffer_region(
        &self,
        dst: &GpuBuffer,
        dst_offset: u64,
        src: &GpuBuffer,
        src_offset: u64,
        size: u64,
        cmd: CommandList,
    ) {
        assert!(
            src_offset + size <= src.desc.size && dst_offset + size <= dst.desc.size,
            "copy of {} bytes from {} to {} is out of bounds",
            size,
            src_offset,
            dst_offset
        );
        self.record(
            cmd,
            NativeCommand::CopyBuffer {
                src: native_buffer(src),
                src_offset,
                dst: native_buffer(dst),
                dst_offset,
                size,
            },
        );
    }

    fn update_buffer(&self, buffer: &GpuBuffer, data: &[u8], cmd: CommandList) {
        assert!(
            data.len() as u64 <= buffer.desc.size,
            "update of {} bytes exceeds a {} byte buffer",
            data.len(),
            buffer.desc.size
        );
        if data.is_empty() {
            return;
        }
        let payload = resource_payload(buffer)
            .unwrap_or_else(|| panic!("buffer was not created by this device"));
        let dst = payload
            .buffer()
            .unwrap_or_else(|| panic!("resource is not a buffer"));

        let mut state = self.list(cmd);
        let frame = state.frame;
        let slot = state.slot();
        let enc = self.encoder(cmd, slot.cmd, frame);

        if self.backend.binds_state_per_field() {
            enc.record(NativeCommand::UpdateBuffer {
                buffer: dst,
                offset: 0,
                data: data.to_vec(),
            });
            return;
        }

        let renamed = payload.dynamic.is_some();
        let (size, alignment) = if renamed {
            (
                buffer.desc.size.max(data.len() as u64),
                self.adapter.limits.constant_buffer_alignment,
            )
        } else {
            (data.len() as u64, 4)
        };
        let allocation = slot
            .transient
            .allocate(&self.store, size, alignment)
            .unwrap_or_else(|e| panic!("transient allocation of {} bytes failed: {}", size, e));
        let src = native_buffer(&allocation.buffer);
        if let Err(e) = self.native.write_buffer(src, allocation.offset, data) {
            panic!("failed to write transient memory: {}", e);
        }

        if renamed {
            payload.set_dynamic_allocation(cmd.index(), frame, allocation);
            slot.binder.invalidate();
            return;
        }

        let resting = ResourceState::for_buffer(buffer.desc.bind_flags);
        let barrier = |before, after| {
            self.backend
                .native_barrier(&GpuBarrier::buffer(buffer, before, after))
                .map(|b| NativeCommand::Barriers { barriers: vec![b] })
        };
        if let Some(command) = barrier(resting, ResourceState::COPY_DST) {
            enc.record(command);
        }
        enc.record(NativeCommand::CopyBuffer {
            src,
            src_offset: allocation.offset,
            dst,
            dst_offset: 0,
            size: data.len() as u64,
        });
        if let Some(command) = barrier(ResourceState::COPY_DST, resting) {
            enc.record(command);
        }
    }

    fn barrier(&self, barriers: &[GpuBarrier<'_>], cmd: CommandList) {
        let barriers: Vec<_> = barriers
            .iter()
            .filter_map(|b| self.backend.native_barrier(b))
            .collect();
        if !barriers.is_empty() {
            self.record(cmd, NativeCommand::Barriers { barriers });
        }
    }

    fn allocate_gpu(&self, size: u64, cmd: CommandList) -> GpuAllocation {
        let mut state = self.list(cmd);
        state
            .slot()
            .transient
            .allocate(&self.store, size, self.adapter.limits.constant_buffer_alignment)
            .unwrap_or_else(|e| panic!("transient allocation of {} bytes failed: {}", size, e))
    }

    fn write_allocation(
        &self,
        allocation: &GpuAllocation,
        offset: u64,
        data: &[u8],
    ) -> Result<(), RhiError> {
        let end = offset.checked_add(data.len() as u64);
        if !matches!(end, Some(end) if end <= allocation.size) {
            return Err(RhiError::InvalidDescriptor(format!(
                "write of {} bytes at {} exceeds an allocation of {} bytes",
                data.len(),
                offset,
                allocation.size
            )));
        }
        let buffer = resource_payload(&allocation.buffer)
            .and_then(ResourcePayload::buffer)
            .ok_or(RhiError::InvalidHandle)?;
        self.native.write_buffer(buffer, allocation.offset + offset, data)?;
        Ok(())
    }

    fn query_begin(&self, query: &GpuQuery, cmd: CommandList) {
        let payload = payload::<QueryPayload>(query.internal.as_ref())
            .unwrap_or_else(|| panic!("query was not created by this device"));
        if query.desc.kind == GpuQueryKind::Timestamp {
            log::warn!("Timestamp queries are only ended; query_begin ignored");
            return;
        }
        payload.ended.store(false, Ordering::Release);
        self.record(
            cmd,
            NativeCommand::BeginQuery {
                heap: payload.heap,
                index: 0,
            },
        );
    }

    fn query_end(&self, query: &GpuQuery, cmd: CommandList) {
        let payload = payload::<QueryPayload>(query.internal.as_ref())
            .unwrap_or_else(|| panic!("query was not created by this device"));
        payload.ended.store(false, Ordering::Release);
        self.record(
            cmd,
            NativeCommand::EndQuery {
                heap: payload.heap,
                index: 0,
            },
        );
        self.list(cmd).ended_queries.push(query.clone());
    }

    fn query_read(&self, query: &GpuQuery) -> QueryRead {
        match self.read_query_result(query) {
            Ok(Some(result)) => QueryRead::Ready(result),
            Ok(None) => QueryRead::NotReady,
            Err(e) => {
                log::warn!("Failed to read query: {}", e);
                QueryRead::NotReady
            }
        }
    }

    fn query_read_blocking(&self, query: &GpuQuery) -> Result<GpuQueryResult, RhiError> {
        loop {
            if let Some(result) = self.read_query_result(query)? {
                return Ok(result);
            }
            std::thread::yield_now();
        }
    }

    fn event_begin(&self, name: &str, cmd: CommandList) {
        self.record(
            cmd,
            NativeCommand::BeginEvent {
                name: name.to_owned(),
            },
        );
    }

    fn event_end(&self, cmd: CommandList) {
        self.record(cmd, NativeCommand::EndEvent);
    }

    fn set_marker(&self, name: &str, cmd: CommandList) {
        self.record(
            cmd,
            NativeCommand::SetMarker {
                name: name.to_owned(),
            },
        );
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        if let Err(e) = self.native.wait_idle() {
            log::error!("Failed to wait for the device to go idle on shutdown: {}", e);
        }
        for list in &self.lists {
            lock(list).release(&self.store);
        }
        self.pipelines.clear();
        self.store.destroyer().destroy_all();
        log::info!(
            "Destroyed {:?} device after {} frames",
            self.backend.kind(),
            self.frame.load(Ordering::Acquire)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::soft::{ExecutionMode, SoftDevice};

    fn settings(backend: BackendKind) -> DeviceSettings {
        DeviceSettings {
            backend,
            width: 64,
            height: 64,
            backbuffer_format: Format::R8G8B8A8Unorm,
            transient_buffer_size: 4096,
            ..Default::default()
        }
    }

    fn device(backend: BackendKind) -> (Arc<SoftDevice>, Device) {
        let _ = env_logger::builder().is_test(true).try_init();
        let soft = Arc::new(SoftDevice::new());
        let device = create_device(settings(backend), soft.clone(), None).unwrap();
        (soft, device)
    }

    fn dynamic_constant_buffer(device: &Device) -> GpuBuffer {
        device
            .create_buffer(
                &GpuBufferDesc {
                    size: 16,
                    usage: Usage::Dynamic,
                    bind_flags: BindFlags::CONSTANT_BUFFER,
                    cpu_access: CpuAccessFlags::WRITE,
                    ..Default::default()
                },
                None,
            )
            .unwrap()
    }

    fn table_layout() -> DescriptorTableLayout {
        DescriptorTableLayout {
            resources: vec![DescriptorRange::new(BindingKind::ShaderResource, 0, 2)],
            samplers: vec![DescriptorRange::new(BindingKind::Sampler, 0, 1)],
            visibility: None,
        }
    }

    #[test]
    fn test_invalid_settings_are_rejected() {
        let soft = Arc::new(SoftDevice::new());
        let settings = DeviceSettings {
            backbuffer_count: 5,
            ..Default::default()
        };

        let result = create_device(settings, soft, None);

        assert!(matches!(result, Err(RhiError::Config(_))));
    }

    #[test]
    fn test_device_reports_backend_and_adapter() {
        let (_soft, device) = device(BackendKind::Vulkan);

        let info = device.adapter_info();

        assert_eq!(info.backend, BackendKind::Vulkan);
        assert_eq!(info.binding_model, BindingModel::DescriptorSetPool);
        assert_eq!(info.device_type, DeviceType::Cpu);
        assert_eq!(device.timestamp_frequency(), 1_000_000_000);
        assert_eq!(device.frame_count(), 0);
    }

    #[test]
    fn test_dynamic_constant_buffer_is_renamed_per_update() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Dx12);
        let buffer = dynamic_constant_buffer(&device);
        let cmd = device.begin_command_list();

        // --- ACT ---
        device.update_buffer(&buffer, &[1; 16], cmd);
        let first = resource_payload(&buffer)
            .and_then(|p| p.dynamic_allocation(cmd.index(), 0))
            .unwrap();
        device.update_buffer(&buffer, &[2; 16], cmd);
        let second = resource_payload(&buffer)
            .and_then(|p| p.dynamic_allocation(cmd.index(), 0))
            .unwrap();
        device.submit_command_lists();

        // --- ASSERT ---
        assert_ne!(first.offset, second.offset);
        assert_eq!(first.offset % 256, 0);
        assert_eq!(second.offset % 256, 0);
    }

    #[test]
    fn test_flat_slot_updates_are_recorded_inline() {
        let (soft, device) = device(BackendKind::Dx11);
        let buffer = dynamic_constant_buffer(&device);
        let cmd = device.begin_command_list();

        device.update_buffer(&buffer, &[3; 16], cmd);
        device.submit_command_lists();

        assert_eq!(soft.stats().command_count("update_buffer"), 1);
        assert!(resource_payload(&buffer).unwrap().dynamic.is_none());
        let native = resource_payload(&buffer).and_then(ResourcePayload::buffer).unwrap();
        assert_eq!(soft.buffer_contents(native).unwrap(), vec![3; 16]);
    }

    #[test]
    #[should_panic(expected = "command lists begun in one frame")]
    fn test_too_many_command_lists_panic() {
        let (_soft, device) = device(BackendKind::Dx11);
        for _ in 0..=COMMANDLIST_COUNT {
            device.begin_command_list();
        }
    }

    #[test]
    fn test_event_query_is_ready_after_submit() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Dx12);
        let query = device
            .create_query(&GpuQueryDesc {
                kind: GpuQueryKind::Event,
            })
            .unwrap();
        let cmd = device.begin_command_list();

        // --- ACT ---
        let unended = device.query_read(&query);
        device.query_end(&query, cmd);
        let recorded = device.query_read(&query);
        device.submit_command_lists();
        let submitted = device.query_read(&query);

        // --- ASSERT ---
        assert_eq!(unended, QueryRead::NotReady);
        assert_eq!(recorded, QueryRead::NotReady);
        assert!(submitted.ready().unwrap().result_passed);
    }

    #[test]
    fn test_reused_query_is_not_ready_until_resubmitted() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Vulkan);
        let query = device
            .create_query(&GpuQueryDesc {
                kind: GpuQueryKind::Timestamp,
            })
            .unwrap();
        let cmd = device.begin_command_list();
        device.query_end(&query, cmd);
        device.submit_command_lists();
        let first = device.query_read(&query);

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.query_end(&query, cmd);
        let recorded = device.query_read(&query);
        device.submit_command_lists();
        let resubmitted = device.query_read(&query);

        // --- ASSERT ---
        assert!(first.ready().is_some());
        assert_eq!(recorded, QueryRead::NotReady);
        assert!(resubmitted.ready().is_some());
    }

    #[test]
    fn test_blocking_read_returns_once_the_query_completes() {
        // --- ARRANGE ---
        let _ = env_logger::builder().is_test(true).try_init();
        let soft = Arc::new(SoftDevice::with_mode(ExecutionMode::Manual));
        let device = create_device(settings(BackendKind::Dx12), soft.clone(), None).unwrap();
        let query = device
            .create_query(&GpuQueryDesc {
                kind: GpuQueryKind::Event,
            })
            .unwrap();
        let cmd = device.begin_command_list();
        device.query_end(&query, cmd);
        device.submit_command_lists();
        assert_eq!(device.query_read(&query), QueryRead::NotReady);

        // --- ACT ---
        let result = std::thread::scope(|scope| {
            let reader = scope.spawn(|| device.query_read_blocking(&query));
            while !reader.is_finished() {
                soft.complete_all();
                std::thread::yield_now();
            }
            reader.join().unwrap()
        });

        // --- ASSERT ---
        assert!(result.unwrap().result_passed);
    }

    #[test]
    fn test_blocking_read_of_an_unsubmitted_query_fails() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Dx11);
        let query = device
            .create_query(&GpuQueryDesc {
                kind: GpuQueryKind::Event,
            })
            .unwrap();

        // --- ACT ---
        let never_ended = device.query_read_blocking(&query);
        let cmd = device.begin_command_list();
        device.query_end(&query, cmd);
        let not_submitted = device.query_read_blocking(&query);
        let foreign = device.query_read_blocking(&GpuQuery::default());
        device.submit_command_lists();

        // --- ASSERT ---
        assert!(matches!(never_ended, Err(RhiError::InvalidDescriptor(_))));
        assert!(matches!(not_submitted, Err(RhiError::InvalidDescriptor(_))));
        assert!(matches!(foreign, Err(RhiError::InvalidHandle)));
        assert!(device.query_read_blocking(&query).unwrap().result_passed);
    }

    #[test]
    fn test_write_allocation_rejects_overflowing_offsets() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Dx12);
        let cmd = device.begin_command_list();
        let allocation = device.allocate_gpu(64, cmd);

        // --- ACT ---
        let wrapped = device.write_allocation(&allocation, u64::MAX, &[1, 2]);
        let past_end = device.write_allocation(&allocation, 60, &[0; 8]);
        let fits = device.write_allocation(&allocation, 56, &[0; 8]);
        device.submit_command_lists();

        // --- ASSERT ---
        assert!(matches!(wrapped, Err(RhiError::InvalidDescriptor(_))));
        assert!(matches!(past_end, Err(RhiError::InvalidDescriptor(_))));
        assert!(fits.is_ok());
    }

    #[test]
    fn test_empty_table_slots_hold_null_views_of_the_range_dimension() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Vulkan);
        let layout = DescriptorTableLayout {
            resources: vec![
                DescriptorRange::new(BindingKind::ShaderResource, 0, 1)
                    .with_dimension(ViewDimension::TextureCube),
                DescriptorRange::new(BindingKind::UnorderedAccess, 0, 1)
                    .with_dimension(ViewDimension::Texture3D),
            ],
            samplers: Vec::new(),
            visibility: None,
        };
        let texture = device
            .create_texture(
                &TextureDesc {
                    bind_flags: BindFlags::SHADER_RESOURCE,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let table = device.create_descriptor_table(&layout).unwrap();
        let created = lock(&payload::<SetTablePayload>(table.internal.as_ref()).unwrap().descriptors).clone();

        // --- ACT ---
        let empty = GpuResource::default();
        device
            .write_descriptor_table(&table, 0, 0, DescriptorWrite::Resource { resource: &texture, subresource: -1 })
            .unwrap();
        device
            .write_descriptor_table(&table, 0, 0, DescriptorWrite::Resource { resource: &empty, subresource: -1 })
            .unwrap();
        device
            .write_descriptor_table(&table, 1, 0, DescriptorWrite::Uav { resource: &empty, subresource: -1 })
            .unwrap();
        let written = lock(&payload::<SetTablePayload>(table.internal.as_ref()).unwrap().descriptors).clone();

        // --- ASSERT ---
        let cube = NativeDescriptor::View(device.nulls.srv(ViewDimension::TextureCube));
        let volume = NativeDescriptor::View(device.nulls.uav(ViewDimension::Texture3D));
        assert_eq!(created, vec![cube, volume]);
        assert_eq!(written, vec![cube, volume]);
        assert_ne!(cube, NativeDescriptor::View(device.nulls.srv(ViewDimension::Texture2D)));
    }

    #[test]
    fn test_descriptor_tables_follow_the_binding_model() {
        let (_soft, flat) = device(BackendKind::Dx11);
        assert!(matches!(
            flat.create_descriptor_table(&table_layout()),
            Err(RhiError::Unsupported(_))
        ));

        let (_soft, pooled) = device(BackendKind::Vulkan);
        let table = pooled.create_descriptor_table(&table_layout()).unwrap();
        let sampler = pooled.create_sampler(&SamplerDesc::default()).unwrap();

        assert!(pooled
            .write_descriptor_table(&table, 1, 0, DescriptorWrite::Sampler(&sampler))
            .is_ok());
        assert!(matches!(
            pooled.write_descriptor_table(&table, 0, 0, DescriptorWrite::Sampler(&sampler)),
            Err(RhiError::InvalidDescriptor(_))
        ));
        assert!(matches!(
            pooled.write_descriptor_table(&table, 0, 2, DescriptorWrite::Sampler(&sampler)),
            Err(RhiError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_heap_tables_write_into_staging_heaps() {
        let (soft, device) = device(BackendKind::Dx12);
        let texture = device
            .create_texture(
                &TextureDesc {
                    bind_flags: BindFlags::SHADER_RESOURCE,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let heaps_before = soft.stats().descriptor_heaps_created;

        let table = device.create_descriptor_table(&table_layout()).unwrap();
        device
            .write_descriptor_table(
                &table,
                0,
                1,
                DescriptorWrite::Resource {
                    resource: &texture,
                    subresource: -1,
                },
            )
            .unwrap();

        let heaps = payload::<HeapTablePayload>(table.internal.as_ref()).unwrap();
        assert_eq!(soft.heap_capacity(heaps.resources.unwrap()), Some(2));
        assert_eq!(soft.heap_capacity(heaps.samplers.unwrap()), Some(1));
        assert_eq!(soft.stats().descriptor_heaps_created, heaps_before + 2);
    }

    #[test]
    fn test_set_resolution_rewraps_back_buffers() {
        // --- ARRANGE ---
        let (_soft, device) = device(BackendKind::Vulkan);
        let before = device.back_buffer();

        // --- ACT ---
        device.set_resolution(128, 96).unwrap();
        let after = device.back_buffer();

        // --- ASSERT ---
        assert_eq!((before.desc.width, before.desc.height), (64, 64));
        assert_eq!((after.desc.width, after.desc.height), (128, 96));
        assert!(!after.same_resource(&before));
        assert!(matches!(
            device.set_resolution(0, 96),
            Err(RhiError::InvalidDescriptor(_))
        ));
    }

    #[test]
    fn test_pipelines_compile_per_render_pass_on_pass_typed_backends() {
        // --- ARRANGE ---
        let (soft, device) = device(BackendKind::Vulkan);
        let vs = device
            .create_shader(ShaderStage::Vertex, &[1, 2, 3], Some(&[ShaderBinding::constant_buffer(0)]))
            .unwrap();
        let pso = device
            .create_pipeline_state(&PipelineStateDesc {
                vs: Some(vs),
                ..Default::default()
            })
            .unwrap();
        let target = device
            .create_texture(
                &TextureDesc {
                    width: 4,
                    height: 4,
                    format: Format::R16G16B16A16Float,
                    bind_flags: BindFlags::RENDER_TARGET,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let pass = device
            .create_render_pass(&RenderPassDesc {
                attachments: vec![RenderPassAttachment::render_target(
                    &target,
                    LoadOp::DontCare,
                    StoreOp::Store,
                )],
            })
            .unwrap();

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.bind_pipeline_state(&pso, cmd);
        device.render_pass_begin(&pass, cmd);
        device.draw(3, 0, cmd);
        device.draw(3, 0, cmd);
        device.render_pass_end(cmd);
        device.present_begin(cmd);
        device.draw(3, 0, cmd);
        device.present_end(cmd);

        // --- ASSERT ---
        let stats = soft.stats();
        assert_eq!(stats.pipelines_created, 2);
        assert_eq!(stats.command_count("bind_pipeline"), 2);
        assert_eq!(stats.presents, 1);
        assert_eq!(device.pipelines.len(), 2);
        assert_eq!(device.frame_count(), 1);
    }
}
