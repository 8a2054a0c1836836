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

//! Shared constants and small value types used across the API.

use serde::{Deserialize, Serialize};

/// Maximum number of command lists that may be open at the same time in one frame.
pub const COMMANDLIST_COUNT: usize = 32;
/// Constant-buffer slots per shader stage.
pub const CBV_COUNT: usize = 14;
/// Shader-resource slots per shader stage.
pub const SRV_COUNT: usize = 64;
/// Unordered-access slots per shader stage.
pub const UAV_COUNT: usize = 16;
/// Sampler slots per shader stage.
pub const SAMPLER_COUNT: usize = 16;
/// Largest batch accepted by a single multi-resource bind.
pub const MAX_MULTI_BIND_RESOURCES: usize = 16;
/// Largest batch accepted by a single multi-UAV bind.
pub const MAX_MULTI_BIND_UAVS: usize = 8;
/// Color attachments a render pass may reference.
pub const MAX_RENDER_TARGETS: usize = 8;
/// Vertex-buffer slots.
pub const MAX_VERTEX_BUFFERS: usize = 8;
/// Viewports and scissor rectangles bindable at once.
pub const MAX_VIEWPORTS: usize = 16;
/// Explicit descriptor tables a pipeline layout may declare.
pub const MAX_DESCRIPTOR_TABLES: usize = 4;

/// An opaque index identifying one of the [`COMMANDLIST_COUNT`] recording contexts.
///
/// Indices are handed out by `begin_command_list` in monotonically increasing
/// order and recycled after `submit_command_lists`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CommandList(pub u32);

impl CommandList {
    /// The array index of this command list.
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

/// A programmable pipeline stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Hull (tessellation control) shader.
    Hull,
    /// Domain (tessellation evaluation) shader.
    Domain,
    /// Geometry shader.
    Geometry,
    /// Pixel (fragment) shader.
    Pixel,
    /// Compute shader.
    Compute,
    /// Amplification (task) shader.
    Amplification,
    /// Mesh shader.
    Mesh,
    /// Ray tracing shader library.
    Library,
}

impl ShaderStage {
    /// Stages that carry their own resource slots on the flat-slot model.
    pub const FLAT: [ShaderStage; 6] = [
        ShaderStage::Vertex,
        ShaderStage::Hull,
        ShaderStage::Domain,
        ShaderStage::Geometry,
        ShaderStage::Pixel,
        ShaderStage::Compute,
    ];

    /// The stage's index within [`ShaderStage::FLAT`], if it has one.
    pub fn flat_index(self) -> Option<usize> {
        Self::FLAT.iter().position(|s| *s == self)
    }

    /// The bind point a shader of this stage executes on.
    pub fn bind_point(self) -> BindPoint {
        match self {
            ShaderStage::Compute => BindPoint::Compute,
            ShaderStage::Library => BindPoint::Raytracing,
            _ => BindPoint::Graphics,
        }
    }
}

/// The pipeline a binding or a pipeline object applies to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindPoint {
    /// Rasterization pipelines.
    Graphics,
    /// Compute pipelines.
    Compute,
    /// Ray tracing pipelines.
    Raytracing,
}

/// A viewport rectangle with a depth range.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// Left edge in pixels.
    pub x: f32,
    /// Top edge in pixels.
    pub y: f32,
    /// Width in pixels.
    pub width: f32,
    /// Height in pixels.
    pub height: f32,
    /// Near depth.
    pub min_depth: f32,
    /// Far depth.
    pub max_depth: f32,
}

impl Viewport {
    /// A viewport covering `width` x `height` pixels with the full depth range.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            x: 0.0,
            y: 0.0,
            width: width as f32,
            height: height as f32,
            min_depth: 0.0,
            max_depth: 1.0,
        }
    }
}

/// An integer scissor rectangle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Rect {
    /// Left edge, inclusive.
    pub left: i32,
    /// Top edge, inclusive.
    pub top: i32,
    /// Right edge, exclusive.
    pub right: i32,
    /// Bottom edge, exclusive.
    pub bottom: i32,
}

impl Rect {
    /// A scissor rectangle that clips nothing.
    pub const MAXIMAL: Rect = Rect {
        left: i32::MIN,
        top: i32::MIN,
        right: i32::MAX,
        bottom: i32::MAX,
    };
}

/// The element type of an index buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum IndexFormat {
    /// 16-bit indices.
    Uint16,
    /// 32-bit indices.
    #[default]
    Uint32,
}

impl IndexFormat {
    /// Size of one index in bytes.
    pub const fn size(self) -> u32 {
        match self {
            IndexFormat::Uint16 => 2,
            IndexFormat::Uint32 => 4,
        }
    }
}

/// How vertices are assembled into primitives.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PrimitiveTopology {
    /// Independent triangles.
    #[default]
    TriangleList,
    /// Connected triangle strip.
    TriangleStrip,
    /// Points.
    PointList,
    /// Independent lines.
    LineList,
    /// Connected line strip.
    LineStrip,
    /// Tessellation patches with the given number of control points.
    PatchList(u8),
}

/// A comparison used by depth, stencil and sampler tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ComparisonFunc {
    /// Never passes.
    #[default]
    Never,
    /// Passes if source < destination.
    Less,
    /// Passes if source == destination.
    Equal,
    /// Passes if source <= destination.
    LessEqual,
    /// Passes if source > destination.
    Greater,
    /// Passes if source != destination.
    NotEqual,
    /// Passes if source >= destination.
    GreaterEqual,
    /// Always passes.
    Always,
}
