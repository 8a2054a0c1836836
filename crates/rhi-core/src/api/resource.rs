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

//! The shared resource base, its flags and the backend payload it carries.

use bitflags::bitflags;
use std::any::Any;
use std::fmt;
use std::sync::Arc;

use super::{GpuBuffer, Texture};

/// How a resource is expected to be accessed over its lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Usage {
    /// GPU read/write, no CPU access.
    #[default]
    Default,
    /// GPU read only, contents fixed at creation.
    Immutable,
    /// CPU-written every frame, GPU read.
    Dynamic,
    /// CPU-visible copy source or destination.
    Staging,
}

bitflags! {
    /// Pipeline roles a resource may be bound to.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct BindFlags: u32 {
        /// Vertex input.
        const VERTEX_BUFFER = 1 << 0;
        /// Index input.
        const INDEX_BUFFER = 1 << 1;
        /// Constant buffer.
        const CONSTANT_BUFFER = 1 << 2;
        /// Shader resource view.
        const SHADER_RESOURCE = 1 << 3;
        /// Stream output target.
        const STREAM_OUTPUT = 1 << 4;
        /// Color attachment.
        const RENDER_TARGET = 1 << 5;
        /// Depth attachment.
        const DEPTH_STENCIL = 1 << 6;
        /// Unordered access view.
        const UNORDERED_ACCESS = 1 << 7;
        /// Variable rate shading source.
        const SHADING_RATE = 1 << 8;
    }
}

bitflags! {
    /// CPU access a resource allows.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct CpuAccessFlags: u32 {
        /// The CPU may write the resource.
        const WRITE = 1 << 0;
        /// The CPU may read the resource back.
        const READ = 1 << 1;
    }
}

bitflags! {
    /// Miscellaneous creation options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceMiscFlags: u32 {
        /// The resource may be opened by another device.
        const SHARED = 1 << 0;
        /// A 2D texture array interpreted as cube faces.
        const TEXTURECUBE = 1 << 1;
        /// The buffer may hold indirect draw or dispatch arguments.
        const INDIRECT_ARGS = 1 << 2;
        /// The buffer may be viewed as a raw byte address buffer.
        const BUFFER_ALLOW_RAW_VIEWS = 1 << 3;
        /// The buffer holds elements of `stride` bytes.
        const BUFFER_STRUCTURED = 1 << 4;
        /// The resource is sparsely bound.
        const TILED = 1 << 5;
        /// The buffer is ray tracing geometry input.
        const RAY_TRACING = 1 << 6;
    }
}

bitflags! {
    /// A resource state or image layout named by the caller in barriers and
    /// render pass attachments. Backends translate it into their own encoding.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ResourceState: u32 {
        /// Contents are undefined.
        const UNDEFINED = 0;
        /// Read by graphics shaders.
        const SHADER_RESOURCE = 1 << 0;
        /// Read by compute shaders.
        const SHADER_RESOURCE_COMPUTE = 1 << 1;
        /// Read and written through a UAV.
        const UNORDERED_ACCESS = 1 << 2;
        /// Copy source.
        const COPY_SRC = 1 << 3;
        /// Copy destination.
        const COPY_DST = 1 << 4;
        /// Color attachment.
        const RENDERTARGET = 1 << 5;
        /// Writable depth attachment.
        const DEPTHSTENCIL = 1 << 6;
        /// Read-only depth attachment.
        const DEPTHSTENCIL_READONLY = 1 << 7;
        /// Vertex input.
        const VERTEX_BUFFER = 1 << 8;
        /// Index input.
        const INDEX_BUFFER = 1 << 9;
        /// Constant buffer.
        const CONSTANT_BUFFER = 1 << 10;
        /// Indirect argument source.
        const INDIRECT_ARGUMENT = 1 << 11;
        /// Ray tracing acceleration structure.
        const RAYTRACING_ACCELERATION_STRUCTURE = 1 << 12;
        /// Variable rate shading source image.
        const SHADING_RATE_SOURCE = 1 << 13;
        /// Swapchain image handed to presentation.
        const PRESENT = 1 << 14;
    }
}

impl ResourceState {
    /// The state a buffer naturally rests in for the given bind flags.
    pub fn for_buffer(bind_flags: BindFlags) -> ResourceState {
        let mut state = ResourceState::empty();
        if bind_flags.contains(BindFlags::VERTEX_BUFFER) {
            state |= ResourceState::VERTEX_BUFFER;
        }
        if bind_flags.contains(BindFlags::INDEX_BUFFER) {
            state |= ResourceState::INDEX_BUFFER;
        }
        if bind_flags.contains(BindFlags::CONSTANT_BUFFER) {
            state |= ResourceState::CONSTANT_BUFFER;
        }
        if bind_flags.contains(BindFlags::SHADER_RESOURCE) {
            state |= ResourceState::SHADER_RESOURCE;
        }
        if bind_flags.contains(BindFlags::UNORDERED_ACCESS) {
            state |= ResourceState::UNORDERED_ACCESS;
        }
        state
    }
}

/// Which kind of view a subresource describes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubresourceType {
    /// Shader resource view.
    Srv,
    /// Unordered access view.
    Uav,
    /// Render target view.
    Rtv,
    /// Depth stencil view.
    Dsv,
}

/// The concrete kind behind a [`GpuResource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum GpuResourceKind {
    /// No resource.
    #[default]
    Unknown,
    /// A linear buffer.
    Buffer,
    /// A texture.
    Texture,
    /// A ray tracing acceleration structure.
    RaytracingAccelerationStructure,
}

/// Backend-owned state attached to a handle.
///
/// The payload is shared between clones of a handle. The backend downcasts it
/// back to its own type; callers only compare or drop it.
#[derive(Clone)]
pub struct BackendPayload(Arc<dyn Any + Send + Sync>);

impl BackendPayload {
    /// Wraps a backend value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Borrows the payload as `T` if that is its concrete type.
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Whether two payloads are the same backend object.
    pub fn ptr_eq(&self, other: &BackendPayload) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for BackendPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("BackendPayload(..)")
    }
}

/// Compares two optional payloads by identity.
pub fn same_payload(a: Option<&BackendPayload>, b: Option<&BackendPayload>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    }
}

/// The common base of every GPU memory resource.
///
/// A default-constructed resource is empty; binding an empty resource binds a
/// null view of the slot's expected dimension.
#[derive(Debug, Clone, Default)]
pub struct GpuResource {
    /// Which concrete kind this resource is.
    pub kind: GpuResourceKind,
    /// The backend payload; `None` for an empty resource.
    pub internal: Option<BackendPayload>,
}

impl GpuResource {
    /// Whether this handle refers to a live backend object.
    pub fn is_valid(&self) -> bool {
        self.internal.is_some()
    }

    /// Whether the resource is a buffer.
    pub fn is_buffer(&self) -> bool {
        self.kind == GpuResourceKind::Buffer
    }

    /// Whether the resource is a texture.
    pub fn is_texture(&self) -> bool {
        self.kind == GpuResourceKind::Texture
    }

    /// Whether the resource is an acceleration structure.
    pub fn is_acceleration_structure(&self) -> bool {
        self.kind == GpuResourceKind::RaytracingAccelerationStructure
    }

    /// Whether both handles share the same backend object.
    pub fn same_resource(&self, other: &GpuResource) -> bool {
        same_payload(self.internal.as_ref(), other.internal.as_ref())
    }
}

/// A synchronization barrier recorded explicitly by the caller.
///
/// Flat-slot backends have implicit hazard tracking and ignore barriers.
#[derive(Debug, Clone, Copy)]
pub enum GpuBarrier<'a> {
    /// Orders all prior UAV writes (to one resource, or to all of them) before later accesses.
    Memory {
        /// The resource to synchronize; `None` means every resource.
        resource: Option<&'a GpuResource>,
    },
    /// Transitions a texture, or a single subresource of it, between layouts.
    Image {
        /// The texture to transition.
        texture: &'a Texture,
        /// State before the barrier.
        before: ResourceState,
        /// State after the barrier.
        after: ResourceState,
        /// A single mip to transition, or all of them.
        mip: Option<u32>,
        /// A single array slice to transition, or all of them.
        slice: Option<u32>,
    },
    /// Transitions a buffer between states.
    Buffer {
        /// The buffer to transition.
        buffer: &'a GpuBuffer,
        /// State before the barrier.
        before: ResourceState,
        /// State after the barrier.
        after: ResourceState,
    },
}

impl<'a> GpuBarrier<'a> {
    /// A global memory barrier.
    pub fn memory() -> Self {
        GpuBarrier::Memory { resource: None }
    }

    /// A whole-texture layout transition.
    pub fn image(texture: &'a Texture, before: ResourceState, after: ResourceState) -> Self {
        GpuBarrier::Image {
            texture,
            before,
            after,
            mip: None,
            slice: None,
        }
    }

    /// A buffer state transition.
    pub fn buffer(buffer: &'a GpuBuffer, before: ResourceState, after: ResourceState) -> Self {
        GpuBarrier::Buffer {
            buffer,
            before,
            after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_payload_identity() {
        let a = BackendPayload::new(1u32);
        let b = a.clone();
        let c = BackendPayload::new(1u32);
        assert!(a.ptr_eq(&b));
        assert!(!a.ptr_eq(&c));
        assert_eq!(a.downcast_ref::<u32>(), Some(&1));
        assert!(a.downcast_ref::<u64>().is_none());
    }

    #[test]
    fn test_empty_resource() {
        let resource = GpuResource::default();
        assert!(!resource.is_valid());
        assert!(resource.same_resource(&GpuResource::default()));
    }

    #[test]
    fn test_buffer_rest_state() {
        let state = ResourceState::for_buffer(BindFlags::VERTEX_BUFFER | BindFlags::SHADER_RESOURCE);
        assert!(state.contains(ResourceState::VERTEX_BUFFER));
        assert!(state.contains(ResourceState::SHADER_RESOURCE));
        assert!(!state.contains(ResourceState::COPY_DST));
    }
}
