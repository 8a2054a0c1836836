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

//! Pipeline layouts, per-field state binding and native pipeline descriptions.

use std::sync::{Arc, Mutex, Weak};

use ahash::AHashMap;
use rhi_core::api::{BindingLayout, PipelineStateDesc, PrimitiveTopology, Shader, ShaderStage};
use rhi_core::hash::hash_combine;
use rhi_core::native::{
    NativeCommand, NativeGraphicsPipelineDesc, NativePipelineLayoutDesc, NativeShader,
    NativeStateObject,
};
use rhi_core::{NativeDevice, RhiError};

use super::backend::Encoder;
use super::deferred::DeferredDestroyQueue;
use super::lock;
use super::resources::{payload, FieldStates, Owned, PipelineLayoutInfo, RenderPassPayload, ShaderPayload};

/// Shares one native layout between everything created with an equal description.
pub(crate) struct LayoutCache {
    layouts: Mutex<AHashMap<NativePipelineLayoutDesc, Weak<PipelineLayoutInfo>>>,
}

impl LayoutCache {
    pub fn new() -> Self {
        Self {
            layouts: Mutex::new(AHashMap::new()),
        }
    }

    pub fn get_or_create(
        &self,
        native: &dyn NativeDevice,
        destroyer: &Arc<DeferredDestroyQueue>,
        desc: NativePipelineLayoutDesc,
    ) -> Result<Arc<PipelineLayoutInfo>, RhiError> {
        let mut layouts = lock(&self.layouts);
        if let Some(layout) = layouts.get(&desc).and_then(Weak::upgrade) {
            return Ok(layout);
        }
        layouts.retain(|_, weak| weak.strong_count() > 0);
        let handle = native.create_pipeline_layout(&desc)?;
        log::trace!(
            "Created pipeline layout with {} resources and {} tables",
            desc.bindings.resource_count(),
            desc.tables.len()
        );
        let layout = Arc::new(PipelineLayoutInfo {
            native: handle,
            desc: desc.clone(),
            _owned: Owned::with(destroyer, handle),
        });
        layouts.insert(desc, Arc::downgrade(&layout));
        Ok(layout)
    }
}

/// The layout a graphics pipeline is compiled against: the union of what its
/// shaders read, unless the description overrides it.
pub(crate) fn graphics_layout_desc(desc: &PipelineStateDesc) -> NativePipelineLayoutDesc {
    let mut merged = BindingLayout::default();
    for shader in desc.shaders() {
        merged.merge(&shader.bindings);
    }
    match &desc.root_layout {
        Some(root) => NativePipelineLayoutDesc {
            bindings: root.bindings.clone().unwrap_or(merged),
            tables: root.tables.clone(),
        },
        None => NativePipelineLayoutDesc {
            bindings: merged,
            tables: Vec::new(),
        },
    }
}

pub(crate) fn native_shader(shader: &Shader) -> Option<NativeShader> {
    payload::<ShaderPayload>(shader.internal.as_ref()).map(|p| p.native)
}

/// The cache key of a pipeline compiled for a render pass (or for the back
/// buffer format when no pass is active).
pub(crate) fn pipeline_hash(pso_hash: u64, target_hash: u64) -> u64 {
    hash_combine(pso_hash, target_hash)
}

/// Describes the native pipeline for `desc` drawing into `pass`, or into the
/// back buffer format when no pass is active.
pub(crate) fn graphics_pipeline_desc(
    desc: &PipelineStateDesc,
    layout: &PipelineLayoutInfo,
    pass: Option<&RenderPassPayload>,
    backbuffer_format: u32,
) -> Result<NativeGraphicsPipelineDesc, RhiError> {
    let stages = [
        (ShaderStage::Vertex, &desc.vs),
        (ShaderStage::Hull, &desc.hs),
        (ShaderStage::Domain, &desc.ds),
        (ShaderStage::Geometry, &desc.gs),
        (ShaderStage::Pixel, &desc.ps),
        (ShaderStage::Amplification, &desc.amplification),
        (ShaderStage::Mesh, &desc.mesh),
    ];
    let mut shaders = Vec::new();
    for (stage, shader) in stages {
        if let Some(shader) = shader {
            shaders.push((stage, native_shader(shader).ok_or(RhiError::InvalidHandle)?));
        }
    }
    let (render_pass, color_formats, depth_format, sample_count) = match pass {
        Some(pass) => (
            pass.native,
            pass.color_formats.clone(),
            pass.depth_format,
            pass.sample_count,
        ),
        None => (None, vec![backbuffer_format], None, 1),
    };
    Ok(NativeGraphicsPipelineDesc {
        layout: layout.native,
        shaders,
        blend: desc.blend.clone(),
        rasterizer: desc.rasterizer.clone(),
        depth_stencil: desc.depth_stencil.clone(),
        input_layout: if desc.is_mesh_pipeline() {
            None
        } else {
            desc.input_layout.clone()
        },
        topology: desc.topology,
        sample_mask: desc.sample_mask,
        render_pass,
        color_formats,
        depth_format,
        sample_count,
    })
}

/// What the native context has bound for each fixed-function field, used to
/// skip redundant state changes on the flat-slot model.
#[derive(Debug, Default)]
pub(crate) struct FieldStateCache {
    shaders: [Option<Option<NativeShader>>; 5],
    blend: Option<(Option<NativeStateObject>, [f32; 4], u32)>,
    rasterizer: Option<Option<NativeStateObject>>,
    depth_stencil: Option<(Option<NativeStateObject>, u32)>,
    input_layout: Option<Option<NativeStateObject>>,
    topology: Option<PrimitiveTopology>,
}

const GRAPHICS_STAGES: [ShaderStage; 5] = [
    ShaderStage::Vertex,
    ShaderStage::Hull,
    ShaderStage::Domain,
    ShaderStage::Geometry,
    ShaderStage::Pixel,
];

impl FieldStateCache {
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Records every field of `desc` that differs from what is bound.
    pub fn bind(
        &mut self,
        enc: &Encoder<'_>,
        desc: &PipelineStateDesc,
        fields: &FieldStates,
        blend_factor: [f32; 4],
        stencil_ref: u32,
    ) {
        let shaders = [&desc.vs, &desc.hs, &desc.ds, &desc.gs, &desc.ps];
        for ((stage, shader), bound) in GRAPHICS_STAGES.iter().zip(shaders).zip(self.shaders.iter_mut()) {
            let native = shader.as_ref().and_then(native_shader);
            if *bound != Some(native) {
                *bound = Some(native);
                enc.record(NativeCommand::SetShader {
                    stage: *stage,
                    shader: native,
                });
            }
        }
        self.bind_blend(enc, fields.blend, blend_factor, desc.sample_mask);
        if self.rasterizer != Some(fields.rasterizer) {
            self.rasterizer = Some(fields.rasterizer);
            enc.record(NativeCommand::SetRasterizerState {
                state: fields.rasterizer,
            });
        }
        self.bind_depth_stencil(enc, fields.depth_stencil, stencil_ref);
        if self.input_layout != Some(fields.input_layout) {
            self.input_layout = Some(fields.input_layout);
            enc.record(NativeCommand::SetInputLayout {
                state: fields.input_layout,
            });
        }
        if self.topology != Some(desc.topology) {
            self.topology = Some(desc.topology);
            enc.record(NativeCommand::SetPrimitiveTopology {
                topology: desc.topology,
            });
        }
    }

    pub fn bind_blend(
        &mut self,
        enc: &Encoder<'_>,
        state: Option<NativeStateObject>,
        blend_factor: [f32; 4],
        sample_mask: u32,
    ) {
        let value = (state, blend_factor, sample_mask);
        if self.blend != Some(value) {
            self.blend = Some(value);
            enc.record(NativeCommand::SetBlendState {
                state,
                blend_factor,
                sample_mask,
            });
        }
    }

    pub fn bind_depth_stencil(&mut self, enc: &Encoder<'_>, state: Option<NativeStateObject>, stencil_ref: u32) {
        if self.depth_stencil != Some((state, stencil_ref)) {
            self.depth_stencil = Some((state, stencil_ref));
            enc.record(NativeCommand::SetDepthStencilState { state, stencil_ref });
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::binding::test_support::Harness;
    use rhi_core::api::{RootLayoutDesc, ShaderBinding, ViewDimension};

    fn shader(stage: ShaderStage, bindings: &[ShaderBinding]) -> Shader {
        Shader {
            stage,
            hash: 0,
            bindings: BindingLayout::from_bindings(bindings.iter().copied()),
            internal: None,
        }
    }

    #[test]
    fn test_layout_merges_shader_bindings() {
        let desc = PipelineStateDesc {
            vs: Some(shader(ShaderStage::Vertex, &[ShaderBinding::constant_buffer(0)])),
            ps: Some(shader(
                ShaderStage::Pixel,
                &[
                    ShaderBinding::resource(1, ViewDimension::Texture2D),
                    ShaderBinding::sampler(0),
                ],
            )),
            ..Default::default()
        };

        let layout = graphics_layout_desc(&desc);

        assert_eq!(layout.bindings.resource_count(), 3);
        assert!(layout.tables.is_empty());
    }

    #[test]
    fn test_root_layout_overrides_reflection() {
        let desc = PipelineStateDesc {
            vs: Some(shader(ShaderStage::Vertex, &[ShaderBinding::constant_buffer(4)])),
            root_layout: Some(RootLayoutDesc {
                bindings: Some(BindingLayout::default()),
                tables: Vec::new(),
            }),
            ..Default::default()
        };
        assert!(graphics_layout_desc(&desc).bindings.is_empty());
    }

    #[test]
    fn test_equal_layouts_are_shared() {
        let harness = Harness::new();
        let cache = LayoutCache::new();
        let desc = NativePipelineLayoutDesc::default();

        let a = cache
            .get_or_create(harness.soft.as_ref(), &harness.destroyer, desc.clone())
            .unwrap();
        let b = cache
            .get_or_create(harness.soft.as_ref(), &harness.destroyer, desc.clone())
            .unwrap();
        assert!(Arc::ptr_eq(&a, &b));

        drop((a, b));
        let _c = cache
            .get_or_create(harness.soft.as_ref(), &harness.destroyer, desc)
            .unwrap();
        assert_eq!(harness.soft.stats().pipeline_layouts_created, 2);
    }

    #[test]
    fn test_unchanged_fields_are_not_rebound() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut cache = FieldStateCache::default();
        let desc = PipelineStateDesc::default();
        let fields = FieldStates {
            blend: Some(NativeStateObject(1)),
            rasterizer: Some(NativeStateObject(2)),
            depth_stencil: Some(NativeStateObject(3)),
            input_layout: None,
        };

        // --- ACT ---
        cache.bind(&enc, &desc, &fields, [1.0; 4], 0);
        let first = harness.soft.stats().commands.values().sum::<u64>();
        cache.bind(&enc, &desc, &fields, [1.0; 4], 0);
        cache.bind(&enc, &desc, &fields, [1.0; 4], 7);

        // --- ASSERT ---
        let stats = harness.soft.stats();
        assert_eq!(first, 5 + 5);
        assert_eq!(stats.commands.values().sum::<u64>(), first + 1);
        assert_eq!(stats.command_count("set_depth_stencil_state"), 2);
    }
}
