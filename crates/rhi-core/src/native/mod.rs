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

//! The vocabulary of the native graphics API seam.
//!
//! Backends never talk to a graphics API directly. They create objects through
//! [`NativeDevice`](crate::NativeDevice), receive plain integer handles back, and
//! record [`NativeCommand`]s into native command buffers. The command set is the
//! union of what the three binding models need: per-stage slot binds, descriptor
//! heap tables and descriptor sets.

mod command;
mod types;

pub use self::command::*;
pub use self::types::*;

macro_rules! native_handles {
    ($($(#[$meta:meta])* $name:ident => $variant:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
            pub struct $name(pub u64);

            impl From<$name> for NativeObject {
                fn from(handle: $name) -> Self {
                    NativeObject::$variant(handle)
                }
            }
        )*

        /// Any native object that can be destroyed.
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
        pub enum NativeObject {
            $($variant($name),)*
        }

        /// The kind of a [`NativeObject`], used to keep one retire queue per kind.
        #[allow(missing_docs)]
        #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
        pub enum NativeObjectKind {
            $($variant,)*
        }

        impl NativeObjectKind {
            /// Every kind, in declaration order.
            pub const ALL: &'static [NativeObjectKind] = &[$(NativeObjectKind::$variant,)*];
        }

        impl NativeObject {
            /// The kind of this object.
            pub fn kind(&self) -> NativeObjectKind {
                match self {
                    $(NativeObject::$variant(_) => NativeObjectKind::$variant,)*
                }
            }

            /// The raw handle value.
            pub fn raw(&self) -> u64 {
                match self {
                    $(NativeObject::$variant(h) => h.0,)*
                }
            }
        }
    };
}

native_handles! {
    /// A native buffer.
    NativeBuffer => Buffer;
    /// A native texture.
    NativeTexture => Texture;
    /// A native resource view or descriptor.
    NativeView => View;
    /// A native sampler.
    NativeSampler => Sampler;
    /// A native shader module.
    NativeShader => Shader;
    /// A fixed-function state block (blend, rasterizer, depth stencil or input layout).
    NativeStateObject => StateObject;
    /// A root signature or pipeline layout.
    NativePipelineLayout => PipelineLayout;
    /// A native render pass object.
    NativeRenderPass => RenderPass;
    /// A compiled pipeline.
    NativePipeline => Pipeline;
    /// A descriptor heap.
    NativeDescriptorHeap => DescriptorHeap;
    /// A descriptor pool.
    NativeDescriptorPool => DescriptorPool;
    /// A query heap.
    NativeQueryHeap => QueryHeap;
    /// An acceleration structure.
    NativeAccelerationStructure => AccelerationStructure;
    /// A command buffer.
    NativeCommandBuffer => CommandBuffer;
    /// A fence.
    NativeFence => Fence;
    /// A swapchain.
    NativeSwapchain => Swapchain;
}

impl NativeObjectKind {
    /// Index of this kind in [`NativeObjectKind::ALL`].
    pub fn index(self) -> usize {
        self as usize
    }
}

/// A descriptor set allocated from a pool. Sets are freed with their pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NativeDescriptorSet(pub u64);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_object_kinds_are_indexed_in_order() {
        for (i, kind) in NativeObjectKind::ALL.iter().enumerate() {
            assert_eq!(kind.index(), i);
        }
        let object: NativeObject = NativeBuffer(7).into();
        assert_eq!(object.kind(), NativeObjectKind::Buffer);
        assert_eq!(object.raw(), 7);
    }
}
