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

//! Pipeline state descriptions and the fixed-function state blocks they hold.

use bitflags::bitflags;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use super::{
    same_payload, BackendPayload, BindingLayout, ComparisonFunc, DescriptorTableLayout, Format,
    PrimitiveTopology, Shader, MAX_RENDER_TARGETS,
};
use crate::hash::{hash_f32, structural_hash};

/// A blend factor.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Blend {
    Zero,
    One,
    SrcColor,
    InvSrcColor,
    SrcAlpha,
    InvSrcAlpha,
    DestAlpha,
    InvDestAlpha,
    DestColor,
    InvDestColor,
    SrcAlphaSat,
    BlendFactor,
    InvBlendFactor,
    Src1Color,
    InvSrc1Color,
    Src1Alpha,
    InvSrc1Alpha,
}

/// How source and destination terms are combined.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BlendOp {
    Add,
    Subtract,
    RevSubtract,
    Min,
    Max,
}

bitflags! {
    /// Channels written to a color attachment.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ColorWrite: u8 {
        /// Red.
        const RED = 1 << 0;
        /// Green.
        const GREEN = 1 << 1;
        /// Blue.
        const BLUE = 1 << 2;
        /// Alpha.
        const ALPHA = 1 << 3;
        /// All channels.
        const ALL = Self::RED.bits() | Self::GREEN.bits() | Self::BLUE.bits() | Self::ALPHA.bits();
    }
}

/// Blending of a single color attachment.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RenderTargetBlendState {
    pub blend_enable: bool,
    pub src_blend: Blend,
    pub dest_blend: Blend,
    pub blend_op: BlendOp,
    pub src_blend_alpha: Blend,
    pub dest_blend_alpha: Blend,
    pub blend_op_alpha: BlendOp,
    pub write_mask: ColorWrite,
}

impl Default for RenderTargetBlendState {
    fn default() -> Self {
        Self {
            blend_enable: false,
            src_blend: Blend::SrcAlpha,
            dest_blend: Blend::InvSrcAlpha,
            blend_op: BlendOp::Add,
            src_blend_alpha: Blend::One,
            dest_blend_alpha: Blend::One,
            blend_op_alpha: BlendOp::Add,
            write_mask: ColorWrite::ALL,
        }
    }
}

/// Output-merger blending.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct BlendState {
    /// Use alpha as a coverage mask.
    pub alpha_to_coverage_enable: bool,
    /// Use a separate state per attachment; otherwise attachment 0 applies to all.
    pub independent_blend_enable: bool,
    /// Per-attachment states.
    pub render_target: [RenderTargetBlendState; MAX_RENDER_TARGETS],
}

/// Polygon fill.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FillMode {
    /// Edges only.
    Wireframe,
    /// Filled.
    #[default]
    Solid,
}

/// Face culling.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    /// No culling.
    None,
    /// Cull front faces.
    Front,
    /// Cull back faces.
    #[default]
    Back,
}

/// Rasterizer configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterizerState {
    pub fill_mode: FillMode,
    pub cull_mode: CullMode,
    pub front_counter_clockwise: bool,
    pub depth_bias: i32,
    pub depth_bias_clamp: f32,
    pub slope_scaled_depth_bias: f32,
    pub depth_clip_enable: bool,
    pub multisample_enable: bool,
    pub antialiased_line_enable: bool,
    pub conservative_rasterization_enable: bool,
    pub forced_sample_count: u32,
}

impl Default for RasterizerState {
    fn default() -> Self {
        Self {
            fill_mode: FillMode::Solid,
            cull_mode: CullMode::Back,
            front_counter_clockwise: false,
            depth_bias: 0,
            depth_bias_clamp: 0.0,
            slope_scaled_depth_bias: 0.0,
            depth_clip_enable: true,
            multisample_enable: false,
            antialiased_line_enable: false,
            conservative_rasterization_enable: false,
            forced_sample_count: 0,
        }
    }
}

impl Eq for RasterizerState {}

impl Hash for RasterizerState {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.fill_mode.hash(state);
        self.cull_mode.hash(state);
        self.front_counter_clockwise.hash(state);
        self.depth_bias.hash(state);
        hash_f32(self.depth_bias_clamp, state);
        hash_f32(self.slope_scaled_depth_bias, state);
        self.depth_clip_enable.hash(state);
        self.multisample_enable.hash(state);
        self.antialiased_line_enable.hash(state);
        self.conservative_rasterization_enable.hash(state);
        self.forced_sample_count.hash(state);
    }
}

/// A stencil operation.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StencilOp {
    #[default]
    Keep,
    Zero,
    Replace,
    IncrSat,
    DecrSat,
    Invert,
    Incr,
    Decr,
}

/// Stencil behavior of one face.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilOp {
    pub stencil_fail_op: StencilOp,
    pub stencil_depth_fail_op: StencilOp,
    pub stencil_pass_op: StencilOp,
    pub stencil_func: ComparisonFunc,
}

impl Default for DepthStencilOp {
    fn default() -> Self {
        Self {
            stencil_fail_op: StencilOp::Keep,
            stencil_depth_fail_op: StencilOp::Keep,
            stencil_pass_op: StencilOp::Keep,
            stencil_func: ComparisonFunc::Always,
        }
    }
}

/// Whether depth writes are enabled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthWriteMask {
    /// Depth is read only.
    Zero,
    /// Depth is written.
    #[default]
    All,
}

/// Depth and stencil test configuration.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DepthStencilState {
    pub depth_enable: bool,
    pub depth_write_mask: DepthWriteMask,
    pub depth_func: ComparisonFunc,
    pub stencil_enable: bool,
    pub stencil_read_mask: u8,
    pub stencil_write_mask: u8,
    pub front_face: DepthStencilOp,
    pub back_face: DepthStencilOp,
    pub depth_bounds_test_enable: bool,
}

impl Default for DepthStencilState {
    fn default() -> Self {
        Self {
            depth_enable: false,
            depth_write_mask: DepthWriteMask::All,
            depth_func: ComparisonFunc::Less,
            stencil_enable: false,
            stencil_read_mask: 0xff,
            stencil_write_mask: 0xff,
            front_face: DepthStencilOp::default(),
            back_face: DepthStencilOp::default(),
            depth_bounds_test_enable: false,
        }
    }
}

/// Whether a vertex element advances per vertex or per instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum InputClassification {
    /// Advances per vertex.
    #[default]
    PerVertexData,
    /// Advances per instance.
    PerInstanceData,
}

/// One attribute of the vertex input layout.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct InputLayoutElement {
    pub semantic_name: String,
    pub semantic_index: u32,
    pub format: Format,
    pub input_slot: u32,
    /// Byte offset within the vertex, or [`InputLayout::APPEND_ALIGNED_ELEMENT`].
    pub aligned_byte_offset: u32,
    pub input_slot_class: InputClassification,
}

/// The vertex input layout of a pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct InputLayout {
    /// Attributes in declaration order.
    pub elements: Vec<InputLayoutElement>,
}

impl InputLayout {
    /// Places an element directly after the previous one in its slot.
    pub const APPEND_ALIGNED_ELEMENT: u32 = u32::MAX;
}

/// An explicit binding layout that replaces the one reflected from shaders.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct RootLayoutDesc {
    /// Slots of the implicit table; `None` keeps the reflected layout.
    pub bindings: Option<BindingLayout>,
    /// Explicit descriptor tables, bound to spaces `0..tables.len()`.
    pub tables: Vec<DescriptorTableLayout>,
}

/// Describes a graphics pipeline.
///
/// Field-wise equal descriptions produce the same [`PipelineState::hash`].
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PipelineStateDesc {
    pub vs: Option<Shader>,
    pub hs: Option<Shader>,
    pub ds: Option<Shader>,
    pub gs: Option<Shader>,
    pub ps: Option<Shader>,
    pub amplification: Option<Shader>,
    pub mesh: Option<Shader>,
    pub blend: BlendState,
    pub rasterizer: RasterizerState,
    pub depth_stencil: DepthStencilState,
    pub input_layout: Option<InputLayout>,
    pub topology: PrimitiveTopology,
    pub sample_mask: u32,
    pub root_layout: Option<RootLayoutDesc>,
}

impl Default for PipelineStateDesc {
    fn default() -> Self {
        Self {
            vs: None,
            hs: None,
            ds: None,
            gs: None,
            ps: None,
            amplification: None,
            mesh: None,
            blend: BlendState::default(),
            rasterizer: RasterizerState::default(),
            depth_stencil: DepthStencilState::default(),
            input_layout: None,
            topology: PrimitiveTopology::TriangleList,
            sample_mask: u32::MAX,
            root_layout: None,
        }
    }
}

impl PipelineStateDesc {
    /// The shaders present in this description.
    pub fn shaders(&self) -> impl Iterator<Item = &Shader> {
        [
            &self.vs,
            &self.hs,
            &self.ds,
            &self.gs,
            &self.ps,
            &self.amplification,
            &self.mesh,
        ]
        .into_iter()
        .flatten()
    }

    /// Whether geometry is produced by mesh shading rather than vertex input.
    pub fn is_mesh_pipeline(&self) -> bool {
        self.mesh.is_some()
    }

    /// The structural hash used to key native pipelines.
    pub fn structural_hash(&self) -> u64 {
        structural_hash(self)
    }
}

/// A handle to a graphics pipeline.
///
/// Backends with render-pass-typed pipelines compile the native object lazily,
/// on the first draw under a given render pass.
#[derive(Debug, Clone)]
pub struct PipelineState {
    /// The description this pipeline was created from.
    pub desc: Arc<PipelineStateDesc>,
    /// Structural hash of `desc`.
    pub hash: u64,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

impl PipelineState {
    /// Whether this handle refers to a live pipeline.
    pub fn is_valid(&self) -> bool {
        self.internal.is_some()
    }

    /// Whether both handles are the same pipeline object.
    pub fn same(&self, other: &PipelineState) -> bool {
        same_payload(self.internal.as_ref(), other.internal.as_ref())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{ShaderBinding, ShaderStage};

    fn shader(stage: ShaderStage, hash: u64) -> Shader {
        Shader {
            stage,
            hash,
            bindings: BindingLayout::default(),
            internal: Some(BackendPayload::new(hash)),
        }
    }

    #[test]
    fn test_equal_descriptions_hash_equally() {
        // ARRANGE
        let a = PipelineStateDesc {
            vs: Some(shader(ShaderStage::Vertex, 1)),
            ps: Some(shader(ShaderStage::Pixel, 2)),
            ..Default::default()
        };
        // Different shader handles carrying the same bytecode.
        let b = PipelineStateDesc {
            vs: Some(shader(ShaderStage::Vertex, 1)),
            ps: Some(shader(ShaderStage::Pixel, 2)),
            ..Default::default()
        };

        // ACT & ASSERT
        assert_eq!(a, b);
        assert_eq!(a.structural_hash(), b.structural_hash());
    }

    #[test]
    fn test_any_field_changes_the_hash() {
        let base = PipelineStateDesc::default();
        let mut culled = base.clone();
        culled.rasterizer.cull_mode = CullMode::None;
        let mut biased = base.clone();
        biased.rasterizer.slope_scaled_depth_bias = 1.5;
        let mut blended = base.clone();
        blended.blend.render_target[0].blend_enable = true;

        let h = base.structural_hash();
        assert_ne!(h, culled.structural_hash());
        assert_ne!(h, biased.structural_hash());
        assert_ne!(h, blended.structural_hash());
    }

    #[test]
    fn test_shader_reflection_changes_the_hash() {
        // ARRANGE
        let plain = PipelineStateDesc {
            ps: Some(shader(ShaderStage::Pixel, 2)),
            ..Default::default()
        };
        let mut sampled = plain.clone();
        if let Some(ps) = sampled.ps.as_mut() {
            ps.bindings = BindingLayout::from_bindings([ShaderBinding::sampler(0)]);
        }

        // ACT & ASSERT
        assert_ne!(plain, sampled);
        assert_ne!(plain.structural_hash(), sampled.structural_hash());
    }
}
