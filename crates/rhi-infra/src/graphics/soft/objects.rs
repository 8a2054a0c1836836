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

//! Host-side storage behind soft device handles.

use rhi_core::api::{ShaderStage, SamplerDesc};
use rhi_core::native::*;
use rhi_core::NativeError;

use super::SoftState;

pub(super) enum SoftObject {
    Buffer(SoftBuffer),
    Texture(SoftTexture),
    View(NativeViewDesc),
    Sampler(SamplerDesc),
    Shader(ShaderStage),
    StateObject,
    PipelineLayout(NativePipelineLayoutDesc),
    RenderPass(NativeRenderPassDesc),
    Pipeline { bind_point: rhi_core::api::BindPoint },
    DescriptorHeap(SoftHeap),
    DescriptorPool(SoftPool),
    QueryHeap(SoftQueryHeap),
    AccelerationStructure(SoftAccelerationStructure),
    CommandBuffer(SoftCommandBuffer),
    Fence(u64),
    Swapchain(SoftSwapchain),
}

pub(super) struct SoftBuffer {
    pub desc: NativeBufferDesc,
    pub data: Vec<u8>,
}

impl SoftBuffer {
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<(), NativeError> {
        let start = offset as usize;
        let end = start + data.len();
        if end > self.data.len() {
            return Err(NativeError::InvalidArgument(format!(
                "write of {}..{} past a {} byte buffer",
                start,
                end,
                self.data.len()
            )));
        }
        self.data[start..end].copy_from_slice(data);
        Ok(())
    }
}

pub(super) struct SoftTexture {
    pub desc: NativeTextureDesc,
    /// Tightly packed subresources, indexed `mip + slice * mips`.
    pub subresources: Vec<Vec<u8>>,
}

impl SoftTexture {
    pub fn new(desc: NativeTextureDesc) -> Self {
        let subresources = (0..desc.subresource_count())
            .map(|i| vec![0u8; desc.subresource_size(i) as usize])
            .collect();
        Self { desc, subresources }
    }

    /// Copies pitched rows into a packed subresource.
    pub fn write_subresource(&mut self, index: u32, data: &[u8], row_pitch: u32, slice_pitch: u32) {
        let mip = index % self.desc.mip_levels.max(1);
        let (w, h, d) = self.desc.mip_extent(mip);
        let format = self.desc.format;
        let packed_row = format.row_pitch(w) as usize;
        let rows = (h.div_ceil(format.block_extent())) as usize;
        let src_row = if row_pitch == 0 { packed_row } else { row_pitch as usize };
        let src_slice = if slice_pitch == 0 { src_row * rows } else { slice_pitch as usize };
        let Some(dst) = self.subresources.get_mut(index as usize) else {
            return;
        };
        for z in 0..d as usize {
            for y in 0..rows {
                let src = z * src_slice + y * src_row;
                let out = (z * rows + y) * packed_row;
                if src + packed_row > data.len() || out + packed_row > dst.len() {
                    return;
                }
                dst[out..out + packed_row].copy_from_slice(&data[src..src + packed_row]);
            }
        }
    }
}

pub(super) struct SoftHeap {
    pub desc: NativeDescriptorHeapDesc,
    pub slots: Vec<Option<NativeDescriptor>>,
}

pub(super) struct SoftPool {
    pub desc: NativeDescriptorPoolDesc,
    pub sets: Vec<u64>,
}

pub(super) struct SoftSet {
    pub layout: NativePipelineLayout,
    pub slots: Vec<Option<NativeDescriptor>>,
}

pub(super) struct SoftQueryHeap {
    pub desc: NativeQueryHeapDesc,
    pub results: Vec<Option<u64>>,
}

pub(super) struct SoftAccelerationStructure {
    pub buffer: NativeBuffer,
    pub builds: u32,
}

pub(super) struct SoftCommandBuffer {
    pub queue: QueueKind,
    pub recording: bool,
    pub commands: Vec<NativeCommand>,
}

pub(super) struct SoftSwapchain {
    pub desc: NativeSwapchainDesc,
    pub images: Vec<NativeTexture>,
    pub next: u32,
}

/// Descriptors in set `set_index` of a layout: set 0 holds the implicit
/// resources followed by samplers, set `i` holds table `i - 1`.
pub(super) fn set_size(layout: &NativePipelineLayoutDesc, set_index: u32) -> Result<usize, NativeError> {
    let size = match set_index {
        0 => {
            layout.bindings.resource_count()
                + layout.bindings.count(rhi_core::api::BindingKind::Sampler)
        }
        i => {
            let table = layout.tables.get(i as usize - 1).ok_or_else(|| {
                NativeError::InvalidArgument(format!("layout has no set {}", i))
            })?;
            table.resource_count() + table.sampler_count()
        }
    };
    Ok(size as usize)
}

macro_rules! accessors {
    ($($get:ident, $get_mut:ident, $handle:ty => $variant:ident($ty:ty);)*) => {
        impl SoftState {
            $(
                pub(super) fn $get(&self, handle: $handle) -> Result<&$ty, NativeError> {
                    match self.objects.get(&handle.0) {
                        Some(SoftObject::$variant(inner)) => Ok(inner),
                        _ => Err(NativeError::InvalidHandle),
                    }
                }

                #[allow(dead_code)]
                pub(super) fn $get_mut(&mut self, handle: $handle) -> Result<&mut $ty, NativeError> {
                    match self.objects.get_mut(&handle.0) {
                        Some(SoftObject::$variant(inner)) => Ok(inner),
                        _ => Err(NativeError::InvalidHandle),
                    }
                }
            )*
        }
    };
}

accessors! {
    buffer, buffer_mut, NativeBuffer => Buffer(SoftBuffer);
    texture, texture_mut, NativeTexture => Texture(SoftTexture);
    view, view_mut, NativeView => View(NativeViewDesc);
    pipeline_layout, pipeline_layout_mut, NativePipelineLayout => PipelineLayout(NativePipelineLayoutDesc);
    heap, heap_mut, NativeDescriptorHeap => DescriptorHeap(SoftHeap);
    pool, pool_mut, NativeDescriptorPool => DescriptorPool(SoftPool);
    query_heap, query_heap_mut, NativeQueryHeap => QueryHeap(SoftQueryHeap);
    acceleration_structure, acceleration_structure_mut, NativeAccelerationStructure => AccelerationStructure(SoftAccelerationStructure);
    command_buffer, command_buffer_mut, NativeCommandBuffer => CommandBuffer(SoftCommandBuffer);
    swapchain, swapchain_mut, NativeSwapchain => Swapchain(SoftSwapchain);
}

impl SoftState {
    pub(super) fn write_set(
        &mut self,
        set: NativeDescriptorSet,
        first: usize,
        descriptors: &[NativeDescriptor],
    ) -> Result<(), NativeError> {
        let target = self.sets.get_mut(&set.0).ok_or(NativeError::InvalidHandle)?;
        let end = first + descriptors.len();
        if end > target.slots.len() {
            return Err(NativeError::InvalidArgument(format!(
                "descriptor range {}..{} exceeds set of {}",
                first,
                end,
                target.slots.len()
            )));
        }
        for (slot, descriptor) in target.slots[first..end].iter_mut().zip(descriptors) {
            *slot = Some(*descriptor);
        }
        Ok(())
    }
}
