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

//! Render passes: the attachments drawn into between begin and end.

use std::hash::{Hash, Hasher};

use super::{BackendPayload, ResourceState, Texture};

/// What happens to an attachment's contents when the pass begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum LoadOp {
    /// Keep existing contents.
    #[default]
    Load,
    /// Clear to the texture's clear value.
    Clear,
    /// Contents are undefined.
    DontCare,
}

/// What happens to an attachment's contents when the pass ends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StoreOp {
    /// Keep the rendered contents.
    #[default]
    Store,
    /// Contents may be discarded.
    DontCare,
}

/// The role of an attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AttachmentKind {
    /// Color output.
    RenderTarget,
    /// Depth and stencil.
    DepthStencil,
    /// Multisample resolve destination of the preceding render target.
    Resolve,
    /// Variable rate shading image.
    ShadingRateSource,
}

/// One attachment of a render pass.
#[derive(Debug, Clone)]
pub struct RenderPassAttachment {
    /// Role.
    pub kind: AttachmentKind,
    /// Load behavior.
    pub load_op: LoadOp,
    /// Store behavior.
    pub store_op: StoreOp,
    /// The attached texture.
    pub texture: Texture,
    /// Subresource view index, `-1` for the default view.
    pub subresource: i32,
    /// Layout before the pass.
    pub initial_layout: ResourceState,
    /// Layout during the pass.
    pub subpass_layout: ResourceState,
    /// Layout after the pass.
    pub final_layout: ResourceState,
}

impl RenderPassAttachment {
    /// A color attachment that rests in the texture's own layout outside the pass.
    pub fn render_target(texture: &Texture, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            kind: AttachmentKind::RenderTarget,
            load_op,
            store_op,
            texture: texture.clone(),
            subresource: -1,
            initial_layout: texture.desc.layout,
            subpass_layout: ResourceState::RENDERTARGET,
            final_layout: texture.desc.layout,
        }
    }

    /// A depth stencil attachment that rests in the texture's own layout outside the pass.
    pub fn depth_stencil(texture: &Texture, load_op: LoadOp, store_op: StoreOp) -> Self {
        Self {
            kind: AttachmentKind::DepthStencil,
            load_op,
            store_op,
            texture: texture.clone(),
            subresource: -1,
            initial_layout: texture.desc.layout,
            subpass_layout: ResourceState::DEPTHSTENCIL,
            final_layout: texture.desc.layout,
        }
    }

    /// A resolve destination for the preceding multisampled render target.
    pub fn resolve(texture: &Texture) -> Self {
        Self {
            kind: AttachmentKind::Resolve,
            load_op: LoadOp::DontCare,
            store_op: StoreOp::Store,
            texture: texture.clone(),
            subresource: -1,
            initial_layout: texture.desc.layout,
            subpass_layout: ResourceState::COPY_DST,
            final_layout: texture.desc.layout,
        }
    }
}

// Pipelines compiled against a pass only depend on its formats and operations,
// so the texture identity stays out of the hash.
impl Hash for RenderPassAttachment {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.kind.hash(state);
        self.texture.desc.format.hash(state);
        self.texture.desc.sample_count.hash(state);
        self.load_op.hash(state);
        self.store_op.hash(state);
        self.initial_layout.hash(state);
        self.subpass_layout.hash(state);
        self.final_layout.hash(state);
    }
}

/// Describes a render pass. Attachment order is significant.
#[derive(Debug, Clone, Default, Hash)]
pub struct RenderPassDesc {
    /// The attachments, in binding order.
    pub attachments: Vec<RenderPassAttachment>,
}

impl RenderPassDesc {
    /// The color attachments, in order.
    pub fn render_targets(&self) -> impl Iterator<Item = &RenderPassAttachment> {
        self.attachments
            .iter()
            .filter(|a| a.kind == AttachmentKind::RenderTarget)
    }

    /// The depth stencil attachment, if any.
    pub fn depth_stencil(&self) -> Option<&RenderPassAttachment> {
        self.attachments
            .iter()
            .find(|a| a.kind == AttachmentKind::DepthStencil)
    }

    /// The sample count of the first color or depth attachment.
    pub fn sample_count(&self) -> u32 {
        self.attachments
            .iter()
            .find(|a| matches!(a.kind, AttachmentKind::RenderTarget | AttachmentKind::DepthStencil))
            .map(|a| a.texture.desc.sample_count)
            .unwrap_or(1)
    }
}

/// A handle to a render pass.
#[derive(Debug, Clone)]
pub struct RenderPass {
    /// The description this pass was created from.
    pub desc: RenderPassDesc,
    /// Hash over attachment formats, sample counts, operations and layouts.
    pub hash: u64,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{Format, TextureDesc};
    use crate::hash::structural_hash;

    fn texture(format: Format) -> Texture {
        Texture {
            desc: TextureDesc {
                format,
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_pass_hash_ignores_texture_identity() {
        let a = RenderPassDesc {
            attachments: vec![RenderPassAttachment::render_target(
                &texture(Format::R8G8B8A8Unorm),
                LoadOp::Clear,
                StoreOp::Store,
            )],
        };
        let b = RenderPassDesc {
            attachments: vec![RenderPassAttachment::render_target(
                &texture(Format::R8G8B8A8Unorm),
                LoadOp::Clear,
                StoreOp::Store,
            )],
        };
        assert_eq!(structural_hash(&a), structural_hash(&b));
    }

    #[test]
    fn test_pass_hash_covers_format_and_ops() {
        let rt = texture(Format::R8G8B8A8Unorm);
        let base = RenderPassDesc {
            attachments: vec![RenderPassAttachment::render_target(&rt, LoadOp::Clear, StoreOp::Store)],
        };
        let loaded = RenderPassDesc {
            attachments: vec![RenderPassAttachment::render_target(&rt, LoadOp::Load, StoreOp::Store)],
        };
        let hdr = RenderPassDesc {
            attachments: vec![RenderPassAttachment::render_target(
                &texture(Format::R16G16B16A16Float),
                LoadOp::Clear,
                StoreOp::Store,
            )],
        };
        let h = structural_hash(&base);
        assert_ne!(h, structural_hash(&loaded));
        assert_ne!(h, structural_hash(&hdr));
    }
}
