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

//! Commands recorded into native command buffers.

use crate::api::{BindPoint, IndexFormat, LoadOp, PrimitiveTopology, Rect, ShaderStage, StoreOp, Viewport};

use super::{
    NativeAccelerationStructure, NativeBarrier, NativeBuffer, NativeDescriptorHeap,
    NativeDescriptorSet, NativePipeline, NativePipelineLayout, NativeQueryHeap, NativeRenderPass,
    NativeSampler, NativeShader, NativeStateObject, NativeTexture, NativeView,
};

/// A constant buffer range bound to a flat slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeBufferRange {
    /// Buffer.
    pub buffer: NativeBuffer,
    /// Byte offset.
    pub offset: u64,
    /// Byte size.
    pub size: u64,
}

/// A vertex buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NativeVertexBuffer {
    /// Buffer.
    pub buffer: NativeBuffer,
    /// Byte offset of the first vertex.
    pub offset: u64,
    /// Bytes between vertices.
    pub stride: u32,
}

/// A color attachment of a native render pass begin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeColorTarget {
    /// Render target view.
    pub view: NativeView,
    /// Load behavior.
    pub load_op: LoadOp,
    /// Store behavior.
    pub store_op: StoreOp,
    /// Clear color for [`LoadOp::Clear`].
    pub clear_color: [f32; 4],
    /// Resolve destination view.
    pub resolve: Option<NativeView>,
}

/// The depth attachment of a native render pass begin.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NativeDepthTarget {
    /// Depth stencil view.
    pub view: NativeView,
    /// Load behavior.
    pub load_op: LoadOp,
    /// Store behavior.
    pub store_op: StoreOp,
    /// Clear depth.
    pub clear_depth: f32,
    /// Clear stencil.
    pub clear_stencil: u8,
}

/// One native command.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq)]
pub enum NativeCommand {
    // Flat-slot binding.
    SetShader { stage: ShaderStage, shader: Option<NativeShader> },
    SetBlendState { state: Option<NativeStateObject>, blend_factor: [f32; 4], sample_mask: u32 },
    SetRasterizerState { state: Option<NativeStateObject> },
    SetDepthStencilState { state: Option<NativeStateObject>, stencil_ref: u32 },
    SetInputLayout { state: Option<NativeStateObject> },
    SetPrimitiveTopology { topology: PrimitiveTopology },
    SetConstantBuffers { stage: ShaderStage, start_slot: u32, buffers: Vec<Option<NativeBufferRange>> },
    SetShaderResources { stage: ShaderStage, start_slot: u32, views: Vec<Option<NativeView>> },
    SetUnorderedAccessViews { stage: ShaderStage, start_slot: u32, views: Vec<Option<NativeView>> },
    SetSamplers { stage: ShaderStage, start_slot: u32, samplers: Vec<Option<NativeSampler>> },
    SetRenderTargets { colors: Vec<NativeView>, depth_stencil: Option<NativeView> },
    ClearRenderTarget { view: NativeView, color: [f32; 4] },
    ClearDepthStencil { view: NativeView, depth: Option<f32>, stencil: Option<u8> },
    ResolveSubresource { src: NativeTexture, dst: NativeTexture },

    // Descriptor heap binding.
    SetDescriptorHeaps { resource: Option<NativeDescriptorHeap>, sampler: Option<NativeDescriptorHeap> },
    SetDescriptorTable { bind_point: BindPoint, root_index: u32, heap: NativeDescriptorHeap, offset: u32 },

    // Descriptor set binding.
    BindDescriptorSets { bind_point: BindPoint, layout: NativePipelineLayout, first_set: u32, sets: Vec<NativeDescriptorSet> },

    // Pipelines and passes.
    SetPipelineLayout { bind_point: BindPoint, layout: NativePipelineLayout },
    BindPipeline { bind_point: BindPoint, pipeline: NativePipeline },
    BeginRenderPass { render_pass: Option<NativeRenderPass>, colors: Vec<NativeColorTarget>, depth_stencil: Option<NativeDepthTarget> },
    EndRenderPass,

    // Dynamic state.
    SetViewports { viewports: Vec<Viewport> },
    SetScissorRects { rects: Vec<Rect> },
    SetStencilRef { value: u32 },
    SetBlendFactor { factor: [f32; 4] },
    BindVertexBuffers { first_slot: u32, buffers: Vec<NativeVertexBuffer> },
    BindIndexBuffer { buffer: NativeBuffer, offset: u64, format: IndexFormat },

    // Work.
    Draw { vertex_count: u32, instance_count: u32, first_vertex: u32, first_instance: u32 },
    DrawIndexed { index_count: u32, instance_count: u32, first_index: u32, base_vertex: i32, first_instance: u32 },
    DrawIndirect { buffer: NativeBuffer, offset: u64, indexed: bool },
    Dispatch { x: u32, y: u32, z: u32 },
    DispatchIndirect { buffer: NativeBuffer, offset: u64 },
    DispatchMesh { x: u32, y: u32, z: u32 },
    DispatchMeshIndirect { buffer: NativeBuffer, offset: u64 },
    DispatchRays { width: u32, height: u32, depth: u32 },
    BuildAccelerationStructure { dst: NativeAccelerationStructure, src: Option<NativeAccelerationStructure> },

    // Transfers.
    CopyBuffer { src: NativeBuffer, src_offset: u64, dst: NativeBuffer, dst_offset: u64, size: u64 },
    CopyTexture { src: NativeTexture, dst: NativeTexture },
    CopyTextureToBuffer { src: NativeTexture, dst: NativeBuffer, dst_offset: u64 },
    CopyBufferToTexture { src: NativeBuffer, src_offset: u64, row_pitch: u32, slice_pitch: u32, dst: NativeTexture, subresource: u32 },
    UpdateBuffer { buffer: NativeBuffer, offset: u64, data: Vec<u8> },
    Barriers { barriers: Vec<NativeBarrier> },

    // Queries.
    BeginQuery { heap: NativeQueryHeap, index: u32 },
    EndQuery { heap: NativeQueryHeap, index: u32 },

    // Debug annotation.
    BeginEvent { name: String },
    EndEvent,
    SetMarker { name: String },
}

impl NativeCommand {
    /// A stable name for the command variant.
    pub fn name(&self) -> &'static str {
        use NativeCommand::*;
        match self {
            SetShader { .. } => "set_shader",
            SetBlendState { .. } => "set_blend_state",
            SetRasterizerState { .. } => "set_rasterizer_state",
            SetDepthStencilState { .. } => "set_depth_stencil_state",
            SetInputLayout { .. } => "set_input_layout",
            SetPrimitiveTopology { .. } => "set_primitive_topology",
            SetConstantBuffers { .. } => "set_constant_buffers",
            SetShaderResources { .. } => "set_shader_resources",
            SetUnorderedAccessViews { .. } => "set_unordered_access_views",
            SetSamplers { .. } => "set_samplers",
            SetRenderTargets { .. } => "set_render_targets",
            ClearRenderTarget { .. } => "clear_render_target",
            ClearDepthStencil { .. } => "clear_depth_stencil",
            ResolveSubresource { .. } => "resolve_subresource",
            SetDescriptorHeaps { .. } => "set_descriptor_heaps",
            SetDescriptorTable { .. } => "set_descriptor_table",
            BindDescriptorSets { .. } => "bind_descriptor_sets",
            SetPipelineLayout { .. } => "set_pipeline_layout",
            BindPipeline { .. } => "bind_pipeline",
            BeginRenderPass { .. } => "begin_render_pass",
            EndRenderPass => "end_render_pass",
            SetViewports { .. } => "set_viewports",
            SetScissorRects { .. } => "set_scissor_rects",
            SetStencilRef { .. } => "set_stencil_ref",
            SetBlendFactor { .. } => "set_blend_factor",
            BindVertexBuffers { .. } => "bind_vertex_buffers",
            BindIndexBuffer { .. } => "bind_index_buffer",
            Draw { .. } => "draw",
            DrawIndexed { .. } => "draw_indexed",
            DrawIndirect { .. } => "draw_indirect",
            Dispatch { .. } => "dispatch",
            DispatchIndirect { .. } => "dispatch_indirect",
            DispatchMesh { .. } => "dispatch_mesh",
            DispatchMeshIndirect { .. } => "dispatch_mesh_indirect",
            DispatchRays { .. } => "dispatch_rays",
            BuildAccelerationStructure { .. } => "build_acceleration_structure",
            CopyBuffer { .. } => "copy_buffer",
            CopyTexture { .. } => "copy_texture",
            CopyTextureToBuffer { .. } => "copy_texture_to_buffer",
            CopyBufferToTexture { .. } => "copy_buffer_to_texture",
            UpdateBuffer { .. } => "update_buffer",
            Barriers { .. } => "barriers",
            BeginQuery { .. } => "begin_query",
            EndQuery { .. } => "end_query",
            BeginEvent { .. } => "begin_event",
            EndEvent => "end_event",
            SetMarker { .. } => "set_marker",
        }
    }

    /// Whether the command launches GPU work that reads bound state.
    pub fn is_draw_or_dispatch(&self) -> bool {
        use NativeCommand::*;
        matches!(
            self,
            Draw { .. }
                | DrawIndexed { .. }
                | DrawIndirect { .. }
                | Dispatch { .. }
                | DispatchIndirect { .. }
                | DispatchMesh { .. }
                | DispatchMeshIndirect { .. }
                | DispatchRays { .. }
        )
    }

    /// The bind point a draw or dispatch reads, if this is one.
    pub fn bind_point(&self) -> Option<BindPoint> {
        use NativeCommand::*;
        match self {
            Draw { .. } | DrawIndexed { .. } | DrawIndirect { .. } | DispatchMesh { .. }
            | DispatchMeshIndirect { .. } => Some(BindPoint::Graphics),
            Dispatch { .. } | DispatchIndirect { .. } => Some(BindPoint::Compute),
            DispatchRays { .. } => Some(BindPoint::Raytracing),
            _ => None,
        }
    }
}
