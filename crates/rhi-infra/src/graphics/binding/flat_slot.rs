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

//! Immediate per-stage slot binding.

use std::sync::Arc;

use rhi_core::api::{
    BindPoint, DescriptorTable, ShaderStage, CBV_COUNT, SAMPLER_COUNT, SRV_COUNT, UAV_COUNT,
};
use rhi_core::native::{NativeBufferRange, NativeCommand, NativeSampler, NativeView};

use super::{BoundConstant, DescriptorBinder};
use crate::graphics::backend::Encoder;
use crate::graphics::resources::{resource_payload, PipelineLayoutInfo};

/// What the native context currently has bound to one stage.
struct StageSlots {
    constants: [Option<NativeBufferRange>; CBV_COUNT],
    resources: [Option<NativeView>; SRV_COUNT],
    uavs: [Option<NativeView>; UAV_COUNT],
    samplers: [Option<NativeSampler>; SAMPLER_COUNT],
}

impl Default for StageSlots {
    fn default() -> Self {
        Self {
            constants: [None; CBV_COUNT],
            resources: [None; SRV_COUNT],
            uavs: [None; UAV_COUNT],
            samplers: [None; SAMPLER_COUNT],
        }
    }
}

/// Records every bind as it happens, skipping binds the context already has.
#[derive(Default)]
pub(crate) struct FlatSlotBinder {
    stages: [StageSlots; 6],
}

impl FlatSlotBinder {
    pub fn new() -> Self {
        Self::default()
    }

    fn stage(&mut self, stage: ShaderStage) -> Option<&mut StageSlots> {
        match stage.flat_index() {
            Some(index) => Some(&mut self.stages[index]),
            None => {
                log::warn!("{:?} shaders have no resource slots on this backend", stage);
                None
            }
        }
    }
}

fn slot_mut<T>(slots: &mut [Option<T>], slot: u32) -> &mut Option<T> {
    let len = slots.len();
    slots
        .get_mut(slot as usize)
        .unwrap_or_else(|| panic!("slot {} out of range (0..{})", slot, len))
}

impl DescriptorBinder for FlatSlotBinder {
    fn reset(&mut self, _enc: &Encoder<'_>) {
        self.stages = Default::default();
    }

    fn set_layout(
        &mut self,
        _enc: &Encoder<'_>,
        _bind_point: BindPoint,
        _layout: Option<&Arc<PipelineLayoutInfo>>,
    ) {
    }

    fn bind_resource(&mut self, enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        let Some(slots) = self.stage(stage) else {
            return;
        };
        let current = slot_mut(&mut slots.resources, slot);
        if *current != view {
            *current = view;
            enc.record(NativeCommand::SetShaderResources {
                stage,
                start_slot: slot,
                views: vec![view],
            });
        }
    }

    fn bind_uav(&mut self, enc: &Encoder<'_>, stage: ShaderStage, slot: u32, view: Option<NativeView>) {
        let Some(slots) = self.stage(stage) else {
            return;
        };
        let current = slot_mut(&mut slots.uavs, slot);
        if *current != view {
            *current = view;
            enc.record(NativeCommand::SetUnorderedAccessViews {
                stage,
                start_slot: slot,
                views: vec![view],
            });
        }
    }

    fn bind_constant_buffer(
        &mut self,
        enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        constant: Option<BoundConstant>,
    ) {
        let range = constant.as_ref().and_then(|c| {
            let buffer = resource_payload(&c.buffer)?.buffer()?;
            Some(NativeBufferRange {
                buffer,
                offset: c.offset,
                size: c.buffer.desc.size.saturating_sub(c.offset),
            })
        });
        let Some(slots) = self.stage(stage) else {
            return;
        };
        let current = slot_mut(&mut slots.constants, slot);
        if *current != range {
            *current = range;
            enc.record(NativeCommand::SetConstantBuffers {
                stage,
                start_slot: slot,
                buffers: vec![range],
            });
        }
    }

    fn bind_sampler(
        &mut self,
        enc: &Encoder<'_>,
        stage: ShaderStage,
        slot: u32,
        sampler: Option<NativeSampler>,
    ) {
        let Some(slots) = self.stage(stage) else {
            return;
        };
        let current = slot_mut(&mut slots.samplers, slot);
        if *current != sampler {
            *current = sampler;
            enc.record(NativeCommand::SetSamplers {
                stage,
                start_slot: slot,
                samplers: vec![sampler],
            });
        }
    }

    fn unbind_resources(&mut self, enc: &Encoder<'_>, slot: u32, count: u32) {
        assert!(
            (slot + count) as usize <= SRV_COUNT,
            "unbinding slots {}..{} exceeds {}",
            slot,
            slot + count,
            SRV_COUNT
        );
        for (stage, slots) in ShaderStage::FLAT.iter().zip(self.stages.iter_mut()) {
            slots.resources[slot as usize..(slot + count) as usize].fill(None);
            enc.record(NativeCommand::SetShaderResources {
                stage: *stage,
                start_slot: slot,
                views: vec![None; count as usize],
            });
        }
    }

    fn unbind_uavs(&mut self, enc: &Encoder<'_>, slot: u32, count: u32) {
        assert!(
            (slot + count) as usize <= UAV_COUNT,
            "unbinding slots {}..{} exceeds {}",
            slot,
            slot + count,
            UAV_COUNT
        );
        for (stage, slots) in ShaderStage::FLAT.iter().zip(self.stages.iter_mut()) {
            slots.uavs[slot as usize..(slot + count) as usize].fill(None);
            enc.record(NativeCommand::SetUnorderedAccessViews {
                stage: *stage,
                start_slot: slot,
                views: vec![None; count as usize],
            });
        }
    }

    fn bind_table(&mut self, _enc: &Encoder<'_>, _bind_point: BindPoint, _space: u32, _table: &DescriptorTable) {
        log::warn!("Descriptor tables are not supported by flat-slot binding; bind ignored");
    }

    fn invalidate(&mut self) {}

    fn commit(&mut self, _enc: &Encoder<'_>, _bind_point: BindPoint) {}
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::binding::test_support::Harness;

    #[test]
    fn test_identical_binds_are_recorded_once() {
        // --- ARRANGE ---
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = FlatSlotBinder::new();

        // --- ACT ---
        binder.bind_resource(&enc, ShaderStage::Pixel, 3, Some(NativeView(42)));
        binder.bind_resource(&enc, ShaderStage::Pixel, 3, Some(NativeView(42)));
        binder.bind_resource(&enc, ShaderStage::Vertex, 3, Some(NativeView(42)));

        // --- ASSERT ---
        let stats = harness.soft.stats();
        assert_eq!(stats.command_count("set_shader_resources"), 2);
    }

    #[test]
    fn test_unbind_clears_every_stage() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = FlatSlotBinder::new();
        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(1)));

        binder.unbind_resources(&enc, 0, 4);
        binder.bind_resource(&enc, ShaderStage::Pixel, 0, Some(NativeView(1)));

        let stats = harness.soft.stats();
        assert_eq!(stats.command_count("set_shader_resources"), 1 + 6 + 1);
    }

    #[test]
    fn test_reset_forgets_the_cache() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = FlatSlotBinder::new();
        binder.bind_sampler(&enc, ShaderStage::Compute, 1, Some(NativeSampler(9)));

        binder.reset(&enc);
        binder.bind_sampler(&enc, ShaderStage::Compute, 1, Some(NativeSampler(9)));

        assert_eq!(harness.soft.stats().command_count("set_samplers"), 2);
    }

    #[test]
    #[should_panic]
    fn test_out_of_range_slot_panics() {
        let harness = Harness::new();
        let enc = harness.encoder();
        let mut binder = FlatSlotBinder::new();
        binder.bind_uav(&enc, ShaderStage::Compute, UAV_COUNT as u32, None);
    }
}
