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

//! The seam between the shared device machinery and one binding model.
//!
//! Everything that differs between the flat-slot, descriptor-heap and
//! descriptor-set backends and is not descriptor binding itself lives behind
//! [`Backend`]: format and state encodings, where dynamic buffers live, how a
//! render pass is opened and closed, and whether native pipelines depend on it.

use std::fmt::Debug;

use rhi_core::api::{
    BackendKind, BindingModel, CommandList, Format, GpuBarrier, GpuResource,
    GraphicsDeviceCapability, RenderPassDesc, ResourceState,
};
use rhi_core::native::{
    MemoryKind, NativeBarrier, NativeCommand, NativeCommandBuffer, NativeRenderPassDesc,
    NativeResourceRef,
};
use rhi_core::NativeDevice;

use super::resources::{
    resource_payload, NativeResource, NullDescriptors, PassAttachment, RenderPassPayload,
};

/// What a binding strategy or backend needs to record into one command list.
pub(crate) struct Encoder<'a> {
    pub native: &'a dyn NativeDevice,
    pub cmd: NativeCommandBuffer,
    pub nulls: &'a NullDescriptors,
    pub list: CommandList,
    /// Frames submitted before the one being recorded.
    pub frame: u64,
}

impl Encoder<'_> {
    pub fn record(&self, command: NativeCommand) {
        self.native.record(self.cmd, command);
    }
}

pub(crate) trait Backend: Send + Sync + Debug + 'static {
    fn kind(&self) -> BackendKind;

    fn binding_model(&self) -> BindingModel {
        self.kind().binding_model()
    }

    /// Masks the adapter's features down to what this backend exposes.
    fn capabilities(&self, adapter: GraphicsDeviceCapability) -> GraphicsDeviceCapability;

    fn native_format(&self, format: Format) -> u32;

    fn format_from_native(&self, native: u32) -> Option<Format>;

    /// Encodes a resource state as a native state or image layout.
    fn native_state(&self, state: ResourceState, texture: bool) -> u32;

    /// Where buffers with dynamic usage are allocated.
    fn dynamic_memory(&self) -> MemoryKind;

    /// Whether initial data of device-local resources goes through the copy queue.
    /// Otherwise it is handed to native creation directly.
    fn uploads_through_copy_queue(&self) -> bool;

    /// Whether a compiled pipeline is tied to the render pass it was built for.
    fn pipelines_depend_on_render_pass(&self) -> bool;

    /// Whether individual fixed-function state objects are bound instead of
    /// monolithic pipelines.
    fn binds_state_per_field(&self) -> bool {
        self.binding_model() == BindingModel::FlatSlot
    }

    /// Builds the native render pass object, for backends that have one.
    fn native_render_pass(&self, desc: &RenderPassDesc) -> Option<NativeRenderPassDesc>;

    fn begin_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload);

    fn end_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload);

    /// Translates one barrier, or `None` when the backend tracks hazards itself.
    fn native_barrier(&self, barrier: &GpuBarrier<'_>) -> Option<NativeBarrier>;
}

/// The native object a public resource handle wraps.
pub(crate) fn native_resource_ref(resource: &GpuResource) -> Option<NativeResourceRef> {
    let payload = resource_payload(resource)?;
    Some(match payload.native {
        NativeResource::Buffer(buffer) => NativeResourceRef::Buffer(buffer),
        NativeResource::Texture(texture) => NativeResourceRef::Texture(texture),
        NativeResource::AccelerationStructure { structure, .. } => {
            NativeResourceRef::AccelerationStructure(structure)
        }
    })
}

/// Translates a barrier with the backend's state encoding.
pub(crate) fn translate_barrier(backend: &dyn Backend, barrier: &GpuBarrier<'_>) -> Option<NativeBarrier> {
    match barrier {
        GpuBarrier::Memory { resource } => Some(NativeBarrier::Memory {
            resource: match resource {
                Some(resource) => Some(native_resource_ref(resource)?),
                None => None,
            },
        }),
        GpuBarrier::Image {
            texture,
            before,
            after,
            mip,
            slice,
        } => Some(NativeBarrier::Transition {
            resource: native_resource_ref(texture)?,
            before: backend.native_state(*before, true),
            after: backend.native_state(*after, true),
            mip: *mip,
            slice: *slice,
        }),
        GpuBarrier::Buffer {
            buffer,
            before,
            after,
        } => Some(NativeBarrier::Transition {
            resource: native_resource_ref(buffer)?,
            before: backend.native_state(*before, false),
            after: backend.native_state(*after, false),
            mip: None,
            slice: None,
        }),
    }
}

/// Whole-texture transitions for every attachment whose state differs
/// between `from` and `to`.
pub(crate) fn attachment_transitions(
    backend: &dyn Backend,
    pass: &RenderPassPayload,
    from: impl Fn(&PassAttachment) -> ResourceState,
    to: impl Fn(&PassAttachment) -> ResourceState,
) -> Vec<NativeBarrier> {
    pass.attachments()
        .filter(|a| from(a) != to(a))
        .map(|a| NativeBarrier::Transition {
            resource: NativeResourceRef::Texture(a.texture),
            before: backend.native_state(from(a), true),
            after: backend.native_state(to(a), true),
            mip: None,
            slice: None,
        })
        .collect()
}
