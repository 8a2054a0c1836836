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

//! The flat-slot backend: per-stage slots bound immediately, fixed-function
//! state objects instead of monolithic pipelines, and implicit hazard tracking.

use rhi_core::api::{
    BackendKind, Format, GpuBarrier, GraphicsDeviceCapability, LoadOp, RenderPassDesc,
    ResourceState,
};
use rhi_core::native::{MemoryKind, NativeBarrier, NativeCommand, NativeRenderPassDesc};

use super::backend::{Backend, Encoder};
use super::dxgi;
use super::resources::RenderPassPayload;

/// Features the flat-slot model cannot express.
const UNSUPPORTED: GraphicsDeviceCapability = GraphicsDeviceCapability::RAYTRACING
    .union(GraphicsDeviceCapability::RAYTRACING_INLINE)
    .union(GraphicsDeviceCapability::MESH_SHADER)
    .union(GraphicsDeviceCapability::VARIABLE_RATE_SHADING)
    .union(GraphicsDeviceCapability::VARIABLE_RATE_SHADING_TIER2)
    .union(GraphicsDeviceCapability::DESCRIPTOR_TABLES);

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Dx11Backend;

impl Backend for Dx11Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dx11
    }

    fn capabilities(&self, adapter: GraphicsDeviceCapability) -> GraphicsDeviceCapability {
        adapter.difference(UNSUPPORTED)
    }

    fn native_format(&self, format: Format) -> u32 {
        dxgi::to_dxgi(format)
    }

    fn format_from_native(&self, native: u32) -> Option<Format> {
        dxgi::from_dxgi(native)
    }

    fn native_state(&self, _state: ResourceState, _texture: bool) -> u32 {
        0
    }

    fn dynamic_memory(&self) -> MemoryKind {
        MemoryKind::Upload
    }

    fn uploads_through_copy_queue(&self) -> bool {
        false
    }

    fn pipelines_depend_on_render_pass(&self) -> bool {
        false
    }

    fn native_render_pass(&self, _desc: &RenderPassDesc) -> Option<NativeRenderPassDesc> {
        None
    }

    fn begin_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload) {
        enc.record(NativeCommand::SetRenderTargets {
            colors: pass.colors.iter().map(|c| c.target.view).collect(),
            depth_stencil: pass.depth.map(|d| d.view),
        });
        for color in &pass.colors {
            if color.target.load_op == LoadOp::Clear {
                enc.record(NativeCommand::ClearRenderTarget {
                    view: color.target.view,
                    color: color.target.clear_color(),
                });
            }
        }
        if let Some(depth) = pass.depth.filter(|d| d.load_op == LoadOp::Clear) {
            let (clear_depth, clear_stencil) = depth.clear_depth_stencil();
            enc.record(NativeCommand::ClearDepthStencil {
                view: depth.view,
                depth: Some(clear_depth),
                stencil: Some(clear_stencil),
            });
        }
    }

    fn end_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload) {
        for color in &pass.colors {
            if let Some(resolve) = &color.resolve {
                enc.record(NativeCommand::ResolveSubresource {
                    src: color.target.texture,
                    dst: resolve.texture,
                });
            }
        }
        enc.record(NativeCommand::SetRenderTargets {
            colors: Vec::new(),
            depth_stencil: None,
        });
    }

    fn native_barrier(&self, _barrier: &GpuBarrier<'_>) -> Option<NativeBarrier> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_capabilities_are_masked() {
        let caps = Dx11Backend.capabilities(GraphicsDeviceCapability::all());
        assert!(caps.contains(GraphicsDeviceCapability::TESSELLATION));
        assert!(!caps.intersects(UNSUPPORTED));
    }

    #[test]
    fn test_dynamic_buffers_live_in_upload_memory() {
        assert_eq!(Dx11Backend.dynamic_memory(), MemoryKind::Upload);
        assert!(Dx11Backend.binds_state_per_field());
        assert!(!Dx11Backend.pipelines_depend_on_render_pass());
    }
}
