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

//! Explicit descriptor tables, written once and bound as a whole.

use std::sync::Arc;

use super::{
    BackendPayload, BindingKind, GpuBuffer, GpuResource, Sampler, ShaderStage, ViewDimension,
};

/// A contiguous run of slots of one descriptor class.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DescriptorRange {
    /// Descriptor class.
    pub kind: BindingKind,
    /// First shader slot.
    pub base_slot: u32,
    /// Number of descriptors.
    pub count: u32,
    /// Resource dimension of view ranges; unset slots hold a null view of it.
    pub dimension: ViewDimension,
}

impl DescriptorRange {
    /// A range of `count` descriptors starting at `base_slot`, viewing 2D textures.
    pub fn new(kind: BindingKind, base_slot: u32, count: u32) -> Self {
        Self {
            kind,
            base_slot,
            count,
            dimension: ViewDimension::Texture2D,
        }
    }

    /// The same range viewing resources of `dimension`.
    pub fn with_dimension(self, dimension: ViewDimension) -> Self {
        Self { dimension, ..self }
    }
}

/// The shape of a descriptor table: resource ranges and sampler ranges.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DescriptorTableLayout {
    /// Constant buffer, shader resource and UAV ranges.
    pub resources: Vec<DescriptorRange>,
    /// Sampler ranges.
    pub samplers: Vec<DescriptorRange>,
    /// Stage the table is visible to; `None` for all.
    pub visibility: Option<ShaderStage>,
}

impl DescriptorTableLayout {
    /// Resource descriptors in the table.
    pub fn resource_count(&self) -> u32 {
        self.resources.iter().map(|r| r.count).sum()
    }

    /// Sampler descriptors in the table.
    pub fn sampler_count(&self) -> u32 {
        self.samplers.iter().map(|r| r.count).sum()
    }

    /// Range `range_index`, counting resource ranges first.
    pub fn range(&self, range_index: usize) -> Option<&DescriptorRange> {
        self.resources.iter().chain(self.samplers.iter()).nth(range_index)
    }

    /// Flat descriptor index of `array_index` within range `range_index`,
    /// counting resource ranges first and sampler ranges after them.
    pub fn descriptor_index(&self, range_index: usize, array_index: u32) -> Option<(BindingKind, u32)> {
        let ranges = self.resources.iter().chain(self.samplers.iter());
        let mut resource_base = 0;
        let mut sampler_base = 0;
        for (i, range) in ranges.enumerate() {
            let is_sampler = range.kind == BindingKind::Sampler;
            if i == range_index {
                if array_index >= range.count {
                    return None;
                }
                let base = if is_sampler { sampler_base } else { resource_base };
                return Some((range.kind, base + array_index));
            }
            if is_sampler {
                sampler_base += range.count;
            } else {
                resource_base += range.count;
            }
        }
        None
    }
}

/// A handle to a descriptor table.
#[derive(Debug, Clone)]
pub struct DescriptorTable {
    /// The layout this table was created with.
    pub layout: Arc<DescriptorTableLayout>,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

/// One descriptor written into a table slot.
#[derive(Debug, Clone, Copy)]
pub enum DescriptorWrite<'a> {
    /// A shader resource view of `resource`.
    Resource {
        /// The viewed resource; an empty resource writes a null view.
        resource: &'a GpuResource,
        /// Subresource view index, `-1` for the default view.
        subresource: i32,
    },
    /// An unordered access view of `resource`.
    Uav {
        /// The viewed resource; an empty resource writes a null view.
        resource: &'a GpuResource,
        /// Subresource view index, `-1` for the default view.
        subresource: i32,
    },
    /// A constant buffer range starting at `offset`.
    ConstantBuffer {
        /// The buffer.
        buffer: &'a GpuBuffer,
        /// Byte offset.
        offset: u64,
    },
    /// A sampler.
    Sampler(&'a Sampler),
}

impl DescriptorWrite<'_> {
    /// The descriptor class this write fills.
    pub fn kind(&self) -> BindingKind {
        match self {
            DescriptorWrite::Resource { .. } => BindingKind::ShaderResource,
            DescriptorWrite::Uav { .. } => BindingKind::UnorderedAccess,
            DescriptorWrite::ConstantBuffer { .. } => BindingKind::ConstantBuffer,
            DescriptorWrite::Sampler(_) => BindingKind::Sampler,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_descriptor_index_flattens_ranges() {
        let layout = DescriptorTableLayout {
            resources: vec![
                DescriptorRange::new(BindingKind::ConstantBuffer, 0, 2),
                DescriptorRange::new(BindingKind::ShaderResource, 0, 4)
                    .with_dimension(ViewDimension::TextureCube),
            ],
            samplers: vec![DescriptorRange::new(BindingKind::Sampler, 0, 3)],
            visibility: None,
        };
        assert_eq!(layout.resource_count(), 6);
        assert_eq!(layout.sampler_count(), 3);
        assert_eq!(layout.descriptor_index(0, 1), Some((BindingKind::ConstantBuffer, 1)));
        assert_eq!(layout.descriptor_index(1, 3), Some((BindingKind::ShaderResource, 5)));
        assert_eq!(layout.descriptor_index(2, 2), Some((BindingKind::Sampler, 2)));
        assert_eq!(layout.descriptor_index(1, 4), None);
        assert_eq!(layout.descriptor_index(3, 0), None);
        assert_eq!(layout.range(1).map(|r| r.dimension), Some(ViewDimension::TextureCube));
        assert_eq!(layout.range(2).map(|r| r.kind), Some(BindingKind::Sampler));
        assert!(layout.range(3).is_none());
    }
}
