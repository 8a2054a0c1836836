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

//! The descriptor-set backend: monolithic pipelines tied to native render
//! pass objects, image layouts instead of resource states, and a copy queue
//! for initial uploads.

mod conv;

use rhi_core::api::{
    BackendKind, Format, GpuBarrier, GraphicsDeviceCapability, RenderPassDesc, ResourceState,
};
use rhi_core::native::{
    MemoryKind, NativeAttachmentDesc, NativeBarrier, NativeCommand, NativeRenderPassDesc,
};

use super::backend::{translate_barrier, Backend, Encoder};
use super::resources::RenderPassPayload;

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct VulkanBackend;

impl Backend for VulkanBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::Vulkan
    }

    fn capabilities(&self, adapter: GraphicsDeviceCapability) -> GraphicsDeviceCapability {
        adapter
    }

    fn native_format(&self, format: Format) -> u32 {
        conv::to_vk_format(format)
    }

    fn format_from_native(&self, native: u32) -> Option<Format> {
        conv::from_vk_format(native)
    }

    fn native_state(&self, state: ResourceState, texture: bool) -> u32 {
        if texture {
            conv::image_layout(state)
        } else {
            conv::access_flags(state)
        }
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

    fn native_render_pass(&self, desc: &RenderPassDesc) -> Option<NativeRenderPassDesc> {
        let attachments = desc
            .attachments
            .iter()
            .map(|a| NativeAttachmentDesc {
                kind: a.kind,
                native_format: conv::to_vk_format(a.texture.desc.format),
                sample_count: a.texture.desc.sample_count,
                load_op: a.load_op,
                store_op: a.store_op,
                initial_layout: conv::image_layout(a.initial_layout),
                subpass_layout: conv::image_layout(a.subpass_layout),
                final_layout: conv::image_layout(a.final_layout),
            })
            .collect();
        Some(NativeRenderPassDesc { attachments })
    }

    // Layout transitions are part of the render pass object.
    fn begin_render_pass(&self, enc: &Encoder<'_>, pass: &RenderPassPayload) {
        enc.record(NativeCommand::BeginRenderPass {
            render_pass: pass.native,
            colors: pass
                .colors
                .iter()
                .map(|c| c.target.native_color_target(c.resolve.as_ref()))
                .collect(),
            depth_stencil: pass.depth.map(|d| d.native_depth_target()),
        });
    }

    fn end_render_pass(&self, enc: &Encoder<'_>, _pass: &RenderPassPayload) {
        enc.record(NativeCommand::EndRenderPass);
    }

    fn native_barrier(&self, barrier: &GpuBarrier<'_>) -> Option<NativeBarrier> {
        translate_barrier(self, barrier)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rhi_core::api::{LoadOp, RenderPassAttachment, StoreOp, Texture, TextureDesc};

    #[test]
    fn test_render_pass_object_carries_layouts() {
        let texture = Texture {
            desc: TextureDesc {
                format: Format::B8G8R8A8Unorm,
                ..Default::default()
            },
            ..Default::default()
        };
        let mut attachment = RenderPassAttachment::render_target(&texture, LoadOp::Clear, StoreOp::Store);
        attachment.final_layout = ResourceState::PRESENT;
        let desc = RenderPassDesc {
            attachments: vec![attachment],
        };

        let native = VulkanBackend.native_render_pass(&desc).unwrap();

        let a = native.attachments[0];
        assert_eq!(a.native_format, 44);
        assert_eq!(a.initial_layout, 5);
        assert_eq!(a.subpass_layout, 2);
        assert_eq!(a.final_layout, 1_000_001_002);
    }
}
