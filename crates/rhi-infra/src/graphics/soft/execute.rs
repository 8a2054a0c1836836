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

//! Executes recorded native commands against host memory.

use std::collections::BTreeMap;

use rhi_core::api::{BindPoint, BindingKind, Format, GpuQueryKind, LoadOp, ShaderStage};
use rhi_core::native::*;

use super::objects::SoftObject;
use super::texel::{encode_color, encode_depth_stencil};
use super::{ConstantBufferSnapshot, DrawRecord, SoftState};

/// Binding state accumulated while walking one submission.
#[derive(Default)]
struct Bound {
    flat_constants: BTreeMap<(ShaderStage, u32), NativeBufferRange>,
    layouts: BTreeMap<u8, NativePipelineLayout>,
    root_tables: BTreeMap<(u8, u32), (NativeDescriptorHeap, u32)>,
    sets: BTreeMap<(u8, u32), NativeDescriptorSet>,
    pipelines: BTreeMap<u8, NativePipeline>,
}

fn point_key(point: BindPoint) -> u8 {
    match point {
        BindPoint::Graphics => 0,
        BindPoint::Compute => 1,
        BindPoint::Raytracing => 2,
    }
}

impl SoftState {
    pub(super) fn execute(&mut self, commands: &[NativeCommand]) {
        let mut bound = Bound::default();
        for command in commands {
            self.execute_one(command, &mut bound);
        }
    }

    fn stale(&mut self, what: &str, raw: u64) {
        self.stats.stale_references += 1;
        log::error!("Executed command references destroyed {} {}", what, raw);
    }

    fn check_views(&mut self, views: &[Option<NativeView>]) {
        for view in views.iter().flatten() {
            if !matches!(self.objects.get(&view.0), Some(SoftObject::View(_))) {
                self.stale("view", view.0);
            }
        }
    }

    fn execute_one(&mut self, command: &NativeCommand, bound: &mut Bound) {
        use NativeCommand::*;
        match command {
            SetConstantBuffers { stage, start_slot, buffers } => {
                for (i, range) in buffers.iter().enumerate() {
                    let key = (*stage, start_slot + i as u32);
                    match range {
                        Some(range) => {
                            if self.buffer(range.buffer).is_err() {
                                self.stale("buffer", range.buffer.0);
                            }
                            bound.flat_constants.insert(key, *range);
                        }
                        None => {
                            bound.flat_constants.remove(&key);
                        }
                    }
                }
            }
            SetShaderResources { views, .. } | SetUnorderedAccessViews { views, .. } => {
                self.check_views(views);
            }
            SetRenderTargets { colors, depth_stencil } => {
                let views: Vec<_> = colors.iter().copied().map(Some).chain([*depth_stencil]).collect();
                self.check_views(&views);
            }
            ClearRenderTarget { view, color } => self.clear_color(*view, *color),
            ClearDepthStencil { view, depth, stencil } => self.clear_depth(*view, *depth, *stencil),
            ResolveSubresource { src, dst } => self.copy_texture(*src, *dst),
            SetDescriptorHeaps { resource, sampler } => {
                for heap in [resource, sampler].into_iter().flatten() {
                    if self.heap(*heap).is_err() {
                        self.stale("descriptor heap", heap.0);
                    }
                }
            }
            SetDescriptorTable { bind_point, root_index, heap, offset } => {
                if self.heap(*heap).is_err() {
                    self.stale("descriptor heap", heap.0);
                }
                bound
                    .root_tables
                    .insert((point_key(*bind_point), *root_index), (*heap, *offset));
            }
            BindDescriptorSets { bind_point, layout, first_set, sets } => {
                bound.layouts.insert(point_key(*bind_point), *layout);
                for (i, set) in sets.iter().enumerate() {
                    if !self.sets.contains_key(&set.0) {
                        self.stale("descriptor set", set.0);
                    }
                    bound
                        .sets
                        .insert((point_key(*bind_point), first_set + i as u32), *set);
                }
            }
            SetPipelineLayout { bind_point, layout } => {
                if self.pipeline_layout(*layout).is_err() {
                    self.stale("pipeline layout", layout.0);
                }
                bound.layouts.insert(point_key(*bind_point), *layout);
            }
            BindPipeline { bind_point, pipeline } => {
                match self.objects.get(&pipeline.0) {
                    Some(SoftObject::Pipeline { bind_point: created }) if created == bind_point => {}
                    Some(SoftObject::Pipeline { .. }) => {
                        log::error!("Pipeline {:?} bound to the wrong bind point", pipeline)
                    }
                    _ => self.stale("pipeline", pipeline.0),
                }
                bound.pipelines.insert(point_key(*bind_point), *pipeline);
            }
            BeginRenderPass { colors, depth_stencil, .. } => {
                for color in colors {
                    if color.load_op == LoadOp::Clear {
                        self.clear_color(color.view, color.clear_color);
                    }
                }
                if let Some(ds) = depth_stencil {
                    if ds.load_op == LoadOp::Clear {
                        self.clear_depth(ds.view, Some(ds.clear_depth), Some(ds.clear_stencil));
                    }
                }
            }
            EndRenderPass => {}
            BindVertexBuffers { buffers, .. } => {
                for vb in buffers {
                    if self.buffer(vb.buffer).is_err() {
                        self.stale("buffer", vb.buffer.0);
                    }
                }
            }
            BindIndexBuffer { buffer, .. } => {
                if self.buffer(*buffer).is_err() {
                    self.stale("buffer", buffer.0);
                }
            }
            BuildAccelerationStructure { dst, src } => {
                if let Some(src) = src {
                    if self.acceleration_structure(*src).is_err() {
                        self.stale("acceleration structure", src.0);
                    }
                }
                let backing = match self.acceleration_structure_mut(*dst) {
                    Ok(structure) => {
                        structure.builds += 1;
                        Some(structure.buffer)
                    }
                    Err(_) => {
                        self.stale("acceleration structure", dst.0);
                        None
                    }
                };
                if let Some(buffer) = backing {
                    if self.buffer(buffer).is_err() {
                        self.stale("buffer", buffer.0);
                    }
                }
            }
            CopyBuffer { src, src_offset, dst, dst_offset, size } => {
                let (s, n) = (*src_offset as usize, *size as usize);
                let bytes = match self.buffer(*src) {
                    Ok(b) if s + n <= b.data.len() => b.data[s..s + n].to_vec(),
                    Ok(_) => {
                        log::error!("copy_buffer reads past the end of {:?}", src);
                        return;
                    }
                    Err(_) => return self.stale("buffer", src.0),
                };
                match self.buffer_mut(*dst) {
                    Ok(b) => {
                        if let Err(e) = b.write(*dst_offset, &bytes) {
                            log::error!("copy_buffer: {}", e);
                        }
                    }
                    Err(_) => self.stale("buffer", dst.0),
                }
            }
            CopyTexture { src, dst } => self.copy_texture(*src, *dst),
            CopyTextureToBuffer { src, dst, dst_offset } => {
                let packed: Vec<u8> = match self.texture(*src) {
                    Ok(t) => t.subresources.concat(),
                    Err(_) => return self.stale("texture", src.0),
                };
                match self.buffer_mut(*dst) {
                    Ok(b) => {
                        if let Err(e) = b.write(*dst_offset, &packed) {
                            log::error!("copy_texture_to_buffer: {}", e);
                        }
                    }
                    Err(_) => self.stale("buffer", dst.0),
                }
            }
            CopyBufferToTexture { src, src_offset, row_pitch, slice_pitch, dst, subresource } => {
                let bytes = match self.buffer(*src) {
                    Ok(b) => b.data.get(*src_offset as usize..).unwrap_or_default().to_vec(),
                    Err(_) => return self.stale("buffer", src.0),
                };
                match self.texture_mut(*dst) {
                    Ok(t) => t.write_subresource(*subresource, &bytes, *row_pitch, *slice_pitch),
                    Err(_) => self.stale("texture", dst.0),
                }
            }
            UpdateBuffer { buffer, offset, data } => match self.buffer_mut(*buffer) {
                Ok(b) => {
                    if let Err(e) = b.write(*offset, data) {
                        log::error!("update_buffer: {}", e);
                    }
                }
                Err(_) => self.stale("buffer", buffer.0),
            },
            BeginQuery { heap, index } => {
                if let Ok(h) = self.query_heap_mut(*heap) {
                    if let Some(slot) = h.results.get_mut(*index as usize) {
                        *slot = None;
                    }
                }
            }
            EndQuery { heap, index } => {
                let now = self.epoch.elapsed().as_nanos() as u64;
                match self.query_heap_mut(*heap) {
                    Ok(h) => {
                        let value = match h.desc.kind {
                            GpuQueryKind::Event => 1,
                            GpuQueryKind::Timestamp => now,
                            GpuQueryKind::Occlusion
                            | GpuQueryKind::OcclusionBinary
                            | GpuQueryKind::TimestampDisjoint => 0,
                        };
                        if let Some(slot) = h.results.get_mut(*index as usize) {
                            *slot = Some(value);
                        }
                    }
                    Err(_) => self.stale("query heap", heap.0),
                }
            }
            work if work.is_draw_or_dispatch() => self.snapshot(work, bound),
            _ => {}
        }
    }

    fn copy_texture(&mut self, src: NativeTexture, dst: NativeTexture) {
        let subresources = match self.texture(src) {
            Ok(t) => t.subresources.clone(),
            Err(_) => return self.stale("texture", src.0),
        };
        match self.texture_mut(dst) {
            Ok(t) => {
                for (out, data) in t.subresources.iter_mut().zip(subresources) {
                    if out.len() == data.len() {
                        *out = data;
                    }
                }
            }
            Err(_) => self.stale("texture", dst.0),
        }
    }

    /// Fills every texel of the subresources a view covers.
    fn fill_view(&mut self, view: NativeView, texel: impl Fn(Format, &[u8]) -> Option<Vec<u8>>) {
        let desc = match self.view(view) {
            Ok(desc) => *desc,
            Err(_) => return self.stale("view", view.0),
        };
        let NativeViewTarget::Texture(target) = desc.target else {
            return;
        };
        let texture = match self.texture_mut(target) {
            Ok(texture) => texture,
            Err(_) => return self.stale("texture", target.0),
        };
        let format = if desc.format == Format::Unknown {
            texture.desc.format
        } else {
            desc.format
        };
        let block = format.bytes_per_block() as usize;
        let mips = texture.desc.mip_levels.max(1);
        let slices = texture.desc.array_size.max(1);
        for slice in desc.first_slice..(desc.first_slice + desc.slice_count).min(slices) {
            for mip in desc.first_mip..(desc.first_mip + desc.mip_count).min(mips) {
                let index = texture.desc.subresource_index(mip, slice) as usize;
                let Some(data) = texture.subresources.get_mut(index) else {
                    continue;
                };
                for chunk in data.chunks_exact_mut(block) {
                    match texel(format, chunk) {
                        Some(bytes) => chunk.copy_from_slice(&bytes),
                        None => {
                            log::warn!("Cannot clear texels of format {:?}", format);
                            return;
                        }
                    }
                }
            }
        }
    }

    fn clear_color(&mut self, view: NativeView, color: [f32; 4]) {
        self.fill_view(view, |format, _| encode_color(format, color));
    }

    fn clear_depth(&mut self, view: NativeView, depth: Option<f32>, stencil: Option<u8>) {
        self.fill_view(view, |format, previous| {
            encode_depth_stencil(format, depth, stencil, previous)
        });
    }

    fn read_range(&self, buffer: NativeBuffer, offset: u64, size: u64) -> Option<Vec<u8>> {
        let b = self.buffer(buffer).ok()?;
        let start = offset as usize;
        let end = (start + size as usize).min(b.data.len());
        b.data.get(start..end).map(<[u8]>::to_vec)
    }

    fn descriptor_constant(&self, descriptor: Option<&Option<NativeDescriptor>>) -> Option<Vec<u8>> {
        match descriptor {
            Some(Some(NativeDescriptor::ConstantBuffer { buffer, offset, size })) => {
                self.read_range(*buffer, *offset, *size)
            }
            _ => None,
        }
    }

    /// Records the constant buffers a draw or dispatch sees.
    fn snapshot(&mut self, command: &NativeCommand, bound: &Bound) {
        let Some(bind_point) = command.bind_point() else {
            return;
        };
        let key = point_key(bind_point);
        let mut constant_buffers = Vec::new();

        for ((stage, slot), range) in &bound.flat_constants {
            if stage.bind_point() != bind_point {
                continue;
            }
            if let Some(data) = self.read_range(range.buffer, range.offset, range.size) {
                constant_buffers.push(ConstantBufferSnapshot {
                    stage: Some(*stage),
                    slot: *slot,
                    data,
                });
            }
        }

        let layout = bound
            .layouts
            .get(&key)
            .and_then(|layout| self.pipeline_layout(*layout).ok());
        let cbv_count = layout.map_or(0, |l| l.bindings.count(BindingKind::ConstantBuffer));

        if let Some((heap, offset)) = bound.root_tables.get(&(key, 0)) {
            if let Ok(heap) = self.heap(*heap) {
                for slot in 0..cbv_count {
                    let descriptor = heap.slots.get((offset + slot) as usize);
                    if let Some(data) = self.descriptor_constant(descriptor) {
                        constant_buffers.push(ConstantBufferSnapshot { stage: None, slot, data });
                    }
                }
            }
        }

        if let Some(set) = bound.sets.get(&(key, 0)).and_then(|s| self.sets.get(&s.0)) {
            let cbv_count = self
                .pipeline_layout(set.layout)
                .map_or(0, |l| l.bindings.count(BindingKind::ConstantBuffer));
            for slot in 0..cbv_count {
                if let Some(data) = self.descriptor_constant(set.slots.get(slot as usize)) {
                    constant_buffers.push(ConstantBufferSnapshot { stage: None, slot, data });
                }
            }
        }

        self.draws.push(DrawRecord {
            command: command.name(),
            bind_point,
            pipeline: bound.pipelines.get(&key).copied(),
            constant_buffers,
        });
    }
}
