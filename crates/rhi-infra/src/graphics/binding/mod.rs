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

//! Descriptor binding strategies.
//!
//! A [`DescriptorBinder`] turns per-slot binds into native descriptor state.
//! The flat-slot strategy records every bind immediately. The heap-ring and
//! set-pool strategies only remember binds and materialize them at
//! [`DescriptorBinder::commit`], right before a draw or dispatch, writing
//! nothing when no bind changed since the previous commit.

mod flat_slot;
mod heap_ring;
mod set_pool;

pub(crate) use self::flat_slot::FlatSlotBinder;
pub(crate) use self::heap_ring::{HeapRingBinder, HeapTablePayload};
pub(crate) use self::set_pool::{SetPoolBinder, SetTablePayload};

use std::sync::Arc;

use rhi_core::api::{
    BindPoint, BindingKind, BindingLayout, DescriptorTable, GpuBuffer, ShaderStage,
    CBV_COUNT, MAX_DESCRIPTOR_TABLES, SAMPLER_COUNT, SRV_COUNT, UAV_COUNT,
};
use rhi_core::native::{NativeDescriptor, NativeSampler, NativeView};

use super::backend::Encoder;
use super::resources::{resource_payload, PipelineLayoutInfo};

/// A constant buffer bound at a byte offset.
#[derive(Debug, Clone)]
pub(crate) struct BoundConstant {
    pub buffer: GpuBuffer,
    pub offset: u64,
}

impl BoundConstant {
    fn same(&self, other: &BoundConstant) -> bool {
        self.offset == other.offset && self.buffer.same_resource(&other.buffer)
    }

    /// The descriptor for this binding as seen by `enc`'s command list.
    ///
    /// A dynamic buffer updated by this list during this frame reads its
    /// transient copy; otherwise the buffer's own memory is used.
    pub fn descriptor(&self, enc: &Encoder<'_>) -> NativeDescriptor {
        let Some(payload) = resource_payload(&self.buffer) else {
            return NativeDescriptor::NullConstantBuffer;
        };
        if let Some(allocation) = payload.dynamic_allocation(enc.list.index(), enc.frame) {
            if let Some(buffer) = resource_payload(&allocation.buffer).and_then(|p| p.buffer()) {
                return NativeDescriptor::ConstantBuffer {
                    buffer,
                    offset: allocation.offset + self.offset,
                    size: allocation.size.saturating_sub(self.offset),
                };
            }
        }
        match payload.buffer() {
            Some(buffer) => NativeDescriptor::ConstantBuffer {
                buffer,
                offset: self.offset,
                size: self.buffer.desc.size.saturating_sub(self.offset),
            },
            None => NativeDescriptor::NullConstantBuffer,
        }
    }
}

pub(crate) trait DescriptorBinder: Send {
    /// Forgets every binding at the start of a command list.
    fn reset(&mut self, enc: &Encoder<'_>);

    /// Sets the layout subsequent commits of `bind_point` are written against.
    fn set_layout(
        &mut self,
        enc: &Encoder<'_>,
        bind_point: BindPoint,
        layout: Option<&Arc<PipelineLayoutInfo>>,
    );

    fn bind_resource(&mut self, enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>);

    fn bind_uav(&mut self, enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>);

    fn bind_constant_buffer(
        &mut self,
        enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        constant: Option<BoundConstant>,
    );

    fn bind_sampler(
        &mut self,
        enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<NativeSampler>,
    );

    /// Clears shader resource slots on every stage.
    fn unbind_resources(&mut self, enc: &Encoder<'_>, slot: u32, count: u32);

    /// Clears unordered access slots on every stage.
    fn unbind_uavs(&mut self, enc: &Encoder<'_>, slot: u32, count: u32);

    fn bind_table(&mut self, enc: &Encoder<'_>, bind_point: BindPoint, space: u32, table: &DescriptorTable);

    /// Forces the next commit of every bind point to rewrite its descriptors.
    fn invalidate(&mut self);

    /// Makes the bindings of `bind_point` visible to the next draw or dispatch.
    fn commit(&mut self, enc: &Encoder<'_>, bind_point: BindPoint);
}

pub(crate) fn point_index(bind_point: BindPoint) -> usize {
    match bind_point {
        BindPoint::Graphics => 0,
        BindPoint::Compute => 1,
        BindPoint::Raytracing => 2,
    }
}

/// What one bind point of a deferred binder has bound.
pub(crate) struct PointState {
    pub constants: Vec<Option<BoundConstant>>,
    pub resources: Vec<Option<NativeView>>,
    pub uavs: Vec<Option<NativeView>>,
    pub samplers: Vec<Option<NativeSampler>>,
    pub tables: Vec<Option<DescriptorTable>>,
    pub layout: Option<Arc<PipelineLayoutInfo>>,
    pub dirty: bool,
}

impl Default for PointState {
    fn default() -> Self {
        Self {
            constants: vec![None; CBV_COUNT],
            resources: vec![None; SRV_COUNT],
            uavs: vec![None; UAV_COUNT],
            samplers: vec![None; SAMPLER_COUNT],
            tables: vec![None; MAX_DESCRIPTOR_TABLES],
            layout: None,
            dirty: true,
        }
    }
}

fn replace<T: PartialEq>(slot: Option<&mut Option<T>>, value: Option<T>) -> bool {
    match slot {
        Some(slot) if *slot != value => {
            *slot = value;
            true
        }
        Some(_) => false,
        None => panic!("binding slot out of range"),
    }
}

impl PointState {
    pub fn bind_resource(&mut self, slot: u32, view: Option<NativeView>) {
        self.dirty |= replace(self.resources.get_mut(slot as usize), view);
    }

    pub fn bind_uav(&mut self, slot: u32, view: Option<NativeView>) {
        self.dirty |= replace(self.uavs.get_mut(slot as usize), view);
    }

    pub fn bind_sampler(&mut self, slot: u32, sampler: Option<NativeSampler>) {
        self.dirty |= replace(self.samplers.get_mut(slot as usize), sampler);
    }

    pub fn bind_constant_buffer(&mut self, slot: u32, constant: Option<BoundConstant>) {
        let current = self
            .constants
            .get_mut(slot as usize)
            .unwrap_or_else(|| panic!("constant buffer slot {} out of range", slot));
        let unchanged = match (current.as_ref(), constant.as_ref()) {
            (Some(a), Some(b)) => a.same(b),
            (None, None) => true,
            _ => false,
        };
        if !unchanged {
            *current = constant;
            self.dirty = true;
        }
    }

    pub fn bind_table(&mut self, space: u32, table: &DescriptorTable) {
        let current = self
            .tables
            .get_mut(space as usize)
            .unwrap_or_else(|| panic!("descriptor table space {} out of range", space));
        let unchanged = current
            .as_ref()
            .is_some_and(|t| rhi_core::api::same_payload(t.internal.as_ref(), table.internal.as_ref()));
        if !unchanged {
            *current = Some(table.clone());
            self.dirty = true;
        }
    }

    /// Replaces the layout, returning whether it changed.
    pub fn set_layout(&mut self, layout: Option<&Arc<PipelineLayoutInfo>>) -> bool {
        let changed = match (&self.layout, layout) {
            (Some(a), Some(b)) => !Arc::ptr_eq(a, b),
            (None, None) => false,
            _ => true,
        };
        if changed {
            self.layout = layout.cloned();
            self.dirty = true;
        }
        changed
    }

    /// Descriptors of the implicit table: constant buffers, then shader
    /// resources, then UAVs, each dense from slot 0. Empty slots read nulls.
    pub fn gather_resources(&self, enc: &Encoder<'_>, layout: &BindingLayout, out: &mut Vec<NativeDescriptor>) {
        for slot in 0..layout.count(BindingKind::ConstantBuffer) {
            out.push(match &self.constants[slot as usize] {
                Some(constant) => constant.descriptor(enc),
                None => NativeDescriptor::NullConstantBuffer,
            });
        }
        for slot in 0..layout.count(BindingKind::ShaderResource) {
            let view = self.resources[slot as usize].unwrap_or_else(|| {
                enc.nulls
                    .srv(layout.dimension(BindingKind::ShaderResource, slot))
            });
            out.push(NativeDescriptor::View(view));
        }
        for slot in 0..layout.count(BindingKind::UnorderedAccess) {
            let view = self.uavs[slot as usize].unwrap_or_else(|| {
                enc.nulls
                    .uav(layout.dimension(BindingKind::UnorderedAccess, slot))
            });
            out.push(NativeDescriptor::View(view));
        }
    }

    pub fn gather_samplers(&self, enc: &Encoder<'_>, layout: &BindingLayout, out: &mut Vec<NativeDescriptor>) {
        for slot in 0..layout.count(BindingKind::Sampler) {
            let sampler = self.samplers[slot as usize].unwrap_or_else(|| enc.nulls.sampler());
            out.push(NativeDescriptor::Sampler(sampler));
        }
    }
}

/// Per bind point state of a deferred binder.
#[derive(Default)]
pub(crate) struct Points([PointState; 3]);

impl Points {
    pub fn get(&mut self, bind_point: BindPoint) -> &mut PointState {
        &mut self.0[point_index(bind_point)]
    }

    pub fn of_stage(&mut self, stage: ShaderStage) -> &mut PointState {
        self.get(stage.bind_point())
    }

    pub fn all(&mut self) -> impl Iterator<Item = &mut PointState> {
        self.0.iter_mut()
    }

    pub fn reset(&mut self) {
        self.0 = Default::default();
    }

    pub fn invalidate(&mut self) {
        for point in self.all() {
            point.dirty = true;
        }
    }

    pub fn unbind_resources(&mut self, slot: u32, count: u32) {
        for point in self.all() {
            for s in slot..slot + count {
                point.bind_resource(s, None);
            }
        }
    }

    pub fn unbind_uavs(&mut self, slot: u32, count: u32) {
        for point in self.all() {
            for s in slot..slot + count {
                point.bind_uav(s, None);
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use rhi_core::api::{BindingLayout, CommandList, DescriptorTableLayout};
    use rhi_core::native::{NativeCommandBuffer, NativePipelineLayoutDesc, QueueKind};
    use rhi_core::NativeDevice;

    use crate::graphics::backend::Encoder;
    use crate::graphics::deferred::DeferredDestroyQueue;
    use crate::graphics::resources::{NullDescriptors, Owned, PipelineLayoutInfo};
    use crate::graphics::soft::SoftDevice;

    pub struct Harness {
        pub soft: Arc<SoftDevice>,
        pub destroyer: Arc<DeferredDestroyQueue>,
        pub nulls: NullDescriptors,
        pub cmd: NativeCommandBuffer,
    }

    impl Harness {
        pub fn new() -> Self {
            let soft = Arc::new(SoftDevice::new());
            let native: Arc<dyn NativeDevice> = soft.clone();
            let destroyer = Arc::new(DeferredDestroyQueue::new(native));
            let nulls = NullDescriptors::new(soft.as_ref(), &destroyer).unwrap();
            let cmd = soft.create_command_buffer(QueueKind::Graphics).unwrap();
            soft.begin_command_buffer(cmd).unwrap();
            Self {
                soft,
                destroyer,
                nulls,
                cmd,
            }
        }

        pub fn encoder(&self) -> Encoder<'_> {
            Encoder {
                native: self.soft.as_ref(),
                cmd: self.cmd,
                nulls: &self.nulls,
                list: CommandList(0),
                frame: 0,
            }
        }

        pub fn layout(&self, bindings: BindingLayout, tables: Vec<DescriptorTableLayout>) -> Arc<PipelineLayoutInfo> {
            let desc = NativePipelineLayoutDesc { bindings, tables };
            let native = self.soft.create_pipeline_layout(&desc).unwrap();
            Arc::new(PipelineLayoutInfo {
                native,
                desc,
                _owned: Owned::with(&self.destroyer, native),
            })
        }
    }
}
