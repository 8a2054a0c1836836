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

//! Backend identity and optional capabilities.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};
use std::fmt;

bitflags! {
    /// Optional features a device may expose.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct GraphicsDeviceCapability: u32 {
        /// Hull and domain shaders.
        const TESSELLATION = 1 << 0;
        /// Conservative rasterization.
        const CONSERVATIVE_RASTERIZATION = 1 << 1;
        /// Rasterizer ordered views.
        const RASTERIZER_ORDERED_VIEWS = 1 << 2;
        /// Typed UAV loads of the common formats.
        const UAV_LOAD_FORMAT_COMMON = 1 << 3;
        /// Typed UAV loads of `R11G11B10Float`.
        const UAV_LOAD_FORMAT_R11G11B10_FLOAT = 1 << 4;
        /// Render target and viewport array index from vertex shaders.
        const RENDERTARGET_AND_VIEWPORT_ARRAYINDEX_WITHOUT_GS = 1 << 5;
        /// Ray tracing pipelines (tier 1.0).
        const RAYTRACING = 1 << 6;
        /// Inline ray queries (tier 1.1).
        const RAYTRACING_INLINE = 1 << 7;
        /// Mesh and amplification shaders.
        const MESH_SHADER = 1 << 8;
        /// Per-draw variable rate shading (tier 1).
        const VARIABLE_RATE_SHADING = 1 << 9;
        /// Image-based variable rate shading (tier 2).
        const VARIABLE_RATE_SHADING_TIER2 = 1 << 10;
        /// Explicit descriptor tables.
        const DESCRIPTOR_TABLES = 1 << 11;
    }
}

/// The native API family a device drives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum BackendKind {
    /// Direct3D 11 style flat slot binding.
    Dx11,
    /// Direct3D 12 style descriptor heaps.
    #[default]
    Dx12,
    /// Vulkan style descriptor sets.
    Vulkan,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Dx11 => write!(f, "DX11"),
            BackendKind::Dx12 => write!(f, "DX12"),
            BackendKind::Vulkan => write!(f, "Vulkan"),
        }
    }
}

/// How a backend turns slot bindings into native state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BindingModel {
    /// Each slot is a native bind call.
    FlatSlot,
    /// A ring of shader-visible descriptor heap space, one table per draw.
    DescriptorHeapRing,
    /// A descriptor set allocated from a per-frame pool, one set per draw.
    DescriptorSetPool,
}

impl BackendKind {
    /// The binding model this backend family uses.
    pub const fn binding_model(self) -> BindingModel {
        match self {
            BackendKind::Dx11 => BindingModel::FlatSlot,
            BackendKind::Dx12 => BindingModel::DescriptorHeapRing,
            BackendKind::Vulkan => BindingModel::DescriptorSetPool,
        }
    }
}

/// The broad class of adapter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DeviceType {
    /// Integrated GPU.
    IntegratedGpu,
    /// Discrete GPU.
    DiscreteGpu,
    /// Virtualized GPU.
    VirtualGpu,
    /// Software rasterizer.
    Cpu,
    /// Unknown.
    #[default]
    Other,
}

/// Information about the adapter behind a device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AdapterInfo {
    /// Adapter name.
    pub name: String,
    /// Backend family.
    pub backend: BackendKind,
    /// Binding model of the backend.
    pub binding_model: BindingModel,
    /// Adapter class.
    pub device_type: DeviceType,
}
