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

//! Ray tracing acceleration structures, pipelines and dispatch descriptions.

use bitflags::bitflags;
use std::ops::Deref;

use super::{BackendPayload, Format, GpuBuffer, GpuResource, IndexFormat, Shader};

bitflags! {
    /// Build preferences for an acceleration structure.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct AccelerationStructureFlags: u32 {
        /// Allow refitting with `build_raytracing_acceleration_structure` and a source.
        const ALLOW_UPDATE = 1 << 0;
        /// Allow compaction.
        const ALLOW_COMPACTION = 1 << 1;
        /// Favor trace speed.
        const PREFER_FAST_TRACE = 1 << 2;
        /// Favor build speed.
        const PREFER_FAST_BUILD = 1 << 3;
        /// Minimize memory.
        const MINIMIZE_MEMORY = 1 << 4;
    }
}

/// Which level of the hierarchy a structure is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum AccelerationStructureKind {
    /// Geometry.
    #[default]
    BottomLevel,
    /// Instances of bottom-level structures.
    TopLevel,
}

/// Geometry of a bottom-level structure.
#[derive(Debug, Clone)]
pub enum BottomLevelGeometry {
    /// Indexed or non-indexed triangles.
    Triangles {
        /// Vertex positions.
        vertex_buffer: GpuBuffer,
        /// Byte offset of the first vertex.
        vertex_byte_offset: u64,
        /// Number of vertices.
        vertex_count: u32,
        /// Bytes between vertices.
        vertex_stride: u32,
        /// Position format.
        vertex_format: Format,
        /// Optional index buffer.
        index_buffer: Option<GpuBuffer>,
        /// Number of indices.
        index_count: u32,
        /// Index element type.
        index_format: IndexFormat,
        /// Geometry is opaque.
        opaque: bool,
    },
    /// Axis-aligned bounding boxes for procedural primitives.
    ProceduralAabbs {
        /// Packed AABBs.
        aabb_buffer: GpuBuffer,
        /// Byte offset of the first AABB.
        offset: u64,
        /// Number of AABBs.
        count: u32,
        /// Bytes between AABBs.
        stride: u32,
        /// Geometry is opaque.
        opaque: bool,
    },
}

impl BottomLevelGeometry {
    /// Primitives this geometry contributes.
    pub fn primitive_count(&self) -> u32 {
        match self {
            BottomLevelGeometry::Triangles {
                index_buffer,
                index_count,
                vertex_count,
                ..
            } => {
                if index_buffer.is_some() {
                    index_count / 3
                } else {
                    vertex_count / 3
                }
            }
            BottomLevelGeometry::ProceduralAabbs { count, .. } => *count,
        }
    }
}

/// Instance input of a top-level structure.
#[derive(Debug, Clone)]
pub struct TopLevelInstances {
    /// Packed instance descriptions.
    pub instance_buffer: GpuBuffer,
    /// Byte offset of the first instance.
    pub offset: u64,
    /// Number of instances.
    pub count: u32,
}

/// Describes an acceleration structure.
#[derive(Debug, Clone, Default)]
pub struct RaytracingAccelerationStructureDesc {
    /// Build preferences.
    pub flags: AccelerationStructureFlags,
    /// Hierarchy level.
    pub kind: AccelerationStructureKind,
    /// Geometry, for bottom-level structures.
    pub bottom_level: Vec<BottomLevelGeometry>,
    /// Instances, for top-level structures.
    pub top_level: Option<TopLevelInstances>,
}

/// A handle to an acceleration structure.
#[derive(Debug, Clone, Default)]
pub struct AccelerationStructure {
    /// The shared resource base.
    pub resource: GpuResource,
    /// The description the structure was created from.
    pub desc: RaytracingAccelerationStructureDesc,
    /// Bytes of GPU memory backing the structure.
    pub size: u64,
}

impl Deref for AccelerationStructure {
    type Target = GpuResource;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// A named entry point in a shader library.
#[derive(Debug, Clone)]
pub struct ShaderLibrary {
    /// The library shader.
    pub shader: Shader,
    /// Exported function.
    pub function_name: String,
    /// Role of the entry point.
    pub kind: ShaderLibraryKind,
}

/// The role of a ray tracing entry point.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderLibraryKind {
    RayGeneration,
    Miss,
    ClosestHit,
    AnyHit,
    Intersection,
}

/// A hit group combining entry points by library index.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ShaderHitGroup {
    pub name: String,
    pub closest_hit_shader: Option<u32>,
    pub any_hit_shader: Option<u32>,
    pub intersection_shader: Option<u32>,
}

/// Describes a ray tracing pipeline.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct RaytracingPipelineStateDesc {
    pub shader_libraries: Vec<ShaderLibrary>,
    pub hit_groups: Vec<ShaderHitGroup>,
    pub max_trace_recursion_depth: u32,
    pub max_attribute_size_in_bytes: u32,
    pub max_payload_size_in_bytes: u32,
}

/// A handle to a ray tracing pipeline.
#[derive(Debug, Clone)]
pub struct RaytracingPipelineState {
    /// The description this pipeline was created from.
    pub desc: RaytracingPipelineStateDesc,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

/// A region of a shader binding table.
#[derive(Debug, Clone, Default)]
pub struct ShaderTable {
    /// Buffer holding the records; `None` for an empty table.
    pub buffer: Option<GpuBuffer>,
    /// Byte offset of the first record.
    pub offset: u64,
    /// Bytes in the region.
    pub size: u64,
    /// Bytes between records.
    pub stride: u64,
}

/// Arguments of a ray dispatch.
#[allow(missing_docs)]
#[derive(Debug, Clone, Default)]
pub struct DispatchRaysDesc {
    pub ray_generation: ShaderTable,
    pub miss: ShaderTable,
    pub hit_group: ShaderTable,
    pub callable: ShaderTable,
    pub width: u32,
    pub height: u32,
    pub depth: u32,
}
