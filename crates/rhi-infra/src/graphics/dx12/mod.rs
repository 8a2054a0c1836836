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

//! The descriptor-heap backend: monolithic pipelines compiled per render pass,
//! explicit resource states, and a copy queue for initial uploads.

mod states;

use rhi_core::api::{
    BackendKind, Format, GpuBarrier, GraphicsDeviceCapability, RenderPassDesc, ResourceState,
};
use rhi_core::native::{MemoryKind, NativeBarrier, NativeCommand, NativeRenderPassDesc};

use super::backend::{attachment_transitions, translate_barrier, Backend, Encoder};
use super::dxgi;
use super::resources::RenderPassPayload;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct Dx12Backend;

impl Backend for Dx12Backend {
    fn kind(&self) -> BackendKind {
        BackendKind::Dx12
    }

    fn capabilities(&self, adapter: GraphicsDeviceCapability) -> GraphicsDeviceCapability {
        adapter
    }

    fn native_format(&self, format: Format) -> u32 {
        dxgi::to_dxgi(format)
    }

    fn format_from_native(&self, native: u32) -> Option<Format> {
        dxgi::from_dxgi(native)
    }

    fn native_state(&self, state: ResourceState, _texture: bool) -> u32 {
        states::resource_states(state)
    }

    fn dynamic_memory(&self) -> MemoryKind {
        MemoryKind::DeviceLocal
    }

    fn uploads_through_copy_queue(&self) -> bool {
        true
    }

    fn pipelines_depend_on_render_pass(&self) -> bool {
        true
    }

    fn native_render_pass(&self, _desc: &RenderPassDesc) -> Option<NativeRenderPassDesc> {
        None
    }

    fn begin_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload) {
        let barriers = attachment_transitions(self, pass, |a| a.initial_layout, |a| a.subpass_layout);
        if !barriers.is_empty() {
            enc.record(NativeCommand::Barriers { barriers });
        }
        enc.record(NativeCommand::BeginRenderPass {
            render_pass: None,
            colors: pass
                .colors
                .iter()
                .map(|c| c.target.native_color_target(c.resolve.as_ref()))
                .collect(),
            depth_stencil: pass.depth.map(|d| d.native_depth_target()),
        });
    }

    fn end_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload) {
        enc.record(NativeCommand::EndRenderPass);
        let barriers = attachment_transitions(self, pass, |a| a.subpass_layout, |a| a.final_layout);
        if !barriers.is_empty() {
            enc.record(NativeCommand::Barriers { barriers });
        }
    }

    fn native_barrier(&self, barrier: &GpuBarrier<'_>) -> Option<NativeBarrier> {
        translate_barrier(self, barrier)
    }
}
