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

//! Shaders and the binding layout reflected from them.

use std::hash::{Hash, Hasher};

use super::{BackendPayload, ShaderStage, CBV_COUNT, SAMPLER_COUNT, SRV_COUNT, UAV_COUNT};

/// The descriptor class of a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum BindingKind {
    /// Constant buffer view.
    ConstantBuffer,
    /// Shader resource view.
    ShaderResource,
    /// Unordered access view.
    UnorderedAccess,
    /// Sampler.
    Sampler,
}

impl BindingKind {
    /// How many slots of this class a shader stage exposes.
    pub const fn slot_count(self) -> usize {
        match self {
            BindingKind::ConstantBuffer => CBV_COUNT,
            BindingKind::ShaderResource => SRV_COUNT,
            BindingKind::UnorderedAccess => UAV_COUNT,
            BindingKind::Sampler => SAMPLER_COUNT,
        }
    }
}

/// The resource dimension a view slot expects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[allow(missing_docs)]
pub enum ViewDimension {
    Buffer,
    Texture1D,
    Texture1DArray,
    #[default]
    Texture2D,
    Texture2DArray,
    Texture2DMs,
    Texture2DMsArray,
    TextureCube,
    TextureCubeArray,
    Texture3D,
    AccelerationStructure,
}

impl ViewDimension {
    /// Every dimension a null shader-resource view is created for.
    pub const ALL: [ViewDimension; 11] = [
        ViewDimension::Buffer,
        ViewDimension::Texture1D,
        ViewDimension::Texture1DArray,
        ViewDimension::Texture2D,
        ViewDimension::Texture2DArray,
        ViewDimension::Texture2DMs,
        ViewDimension::Texture2DMsArray,
        ViewDimension::TextureCube,
        ViewDimension::TextureCubeArray,
        ViewDimension::Texture3D,
        ViewDimension::AccelerationStructure,
    ];
}

/// One slot a shader reads from, as reported by reflection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderBinding {
    /// Descriptor class.
    pub kind: BindingKind,
    /// Slot number within the class.
    pub slot: u32,
    /// Expected resource dimension.
    pub dimension: ViewDimension,
}

impl ShaderBinding {
    /// A constant buffer at `slot`.
    pub fn constant_buffer(slot: u32) -> Self {
        Self {
            kind: BindingKind::ConstantBuffer,
            slot,
            dimension: ViewDimension::Buffer,
        }
    }

    /// A shader resource at `slot` with the given dimension.
    pub fn resource(slot: u32, dimension: ViewDimension) -> Self {
        Self {
            kind: BindingKind::ShaderResource,
            slot,
            dimension,
        }
    }

    /// An unordered access view at `slot` with the given dimension.
    pub fn uav(slot: u32, dimension: ViewDimension) -> Self {
        Self {
            kind: BindingKind::UnorderedAccess,
            slot,
            dimension,
        }
    }

    /// A sampler at `slot`.
    pub fn sampler(slot: u32) -> Self {
        Self {
            kind: BindingKind::Sampler,
            slot,
            dimension: ViewDimension::Buffer,
        }
    }
}

/// The set of slots a pipeline reads, used to size descriptor tables and sets.
///
/// Tables are dense: every class spans slots `0..count(kind)`, and slots not
/// listed explicitly are filled with null descriptors.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct BindingLayout {
    entries: Vec<ShaderBinding>,
}

impl BindingLayout {
    /// A layout covering every slot of every class.
    pub fn full() -> Self {
        let mut entries = Vec::new();
        entries.extend((0..CBV_COUNT as u32).map(ShaderBinding::constant_buffer));
        entries.extend((0..SRV_COUNT as u32).map(|s| ShaderBinding::resource(s, ViewDimension::Texture2D)));
        entries.extend((0..UAV_COUNT as u32).map(|s| ShaderBinding::uav(s, ViewDimension::Texture2D)));
        entries.extend((0..SAMPLER_COUNT as u32).map(ShaderBinding::sampler));
        Self { entries }
    }

    /// Builds a layout from reflected bindings. Duplicate slots keep the first entry.
    pub fn from_bindings<I: IntoIterator<Item = ShaderBinding>>(bindings: I) -> Self {
        let mut layout = Self::default();
        for binding in bindings {
            layout.insert(binding);
        }
        layout
    }

    fn insert(&mut self, binding: ShaderBinding) {
        assert!(
            (binding.slot as usize) < binding.kind.slot_count(),
            "{:?} slot {} exceeds the per-stage limit",
            binding.kind,
            binding.slot
        );
        let exists = self
            .entries
            .iter()
            .any(|e| e.kind == binding.kind && e.slot == binding.slot);
        if !exists {
            self.entries.push(binding);
            self.entries.sort();
        }
    }

    /// Adds every binding of `other` not already present.
    pub fn merge(&mut self, other: &BindingLayout) {
        for binding in &other.entries {
            self.insert(*binding);
        }
    }

    /// The table size for `kind`: the highest used slot plus one.
    pub fn count(&self, kind: BindingKind) -> u32 {
        self.entries
            .iter()
            .filter(|e| e.kind == kind)
            .map(|e| e.slot + 1)
            .max()
            .unwrap_or(0)
    }

    /// Constant buffers, shader resources and UAVs together.
    pub fn resource_count(&self) -> u32 {
        self.count(BindingKind::ConstantBuffer)
            + self.count(BindingKind::ShaderResource)
            + self.count(BindingKind::UnorderedAccess)
    }

    /// The dimension expected at `slot`, defaulting to 2D textures.
    pub fn dimension(&self, kind: BindingKind, slot: u32) -> ViewDimension {
        self.entries
            .iter()
            .find(|e| e.kind == kind && e.slot == slot)
            .map(|e| e.dimension)
            .unwrap_or(match kind {
                BindingKind::ConstantBuffer | BindingKind::Sampler => ViewDimension::Buffer,
                _ => ViewDimension::Texture2D,
            })
    }

    /// The reflected entries, sorted.
    pub fn entries(&self) -> &[ShaderBinding] {
        &self.entries
    }

    /// Whether the layout has no bindings.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A handle to a compiled shader.
///
/// Two shaders compare equal when they have the same stage, bytecode hash and
/// reflected bindings; pipeline descriptions hash shaders the same way.
#[derive(Debug, Clone)]
pub struct Shader {
    /// The pipeline stage.
    pub stage: ShaderStage,
    /// Hash of the bytecode.
    pub hash: u64,
    /// Slots the shader reads.
    pub bindings: BindingLayout,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

impl PartialEq for Shader {
    fn eq(&self, other: &Self) -> bool {
        self.stage == other.stage && self.hash == other.hash && self.bindings == other.bindings
    }
}

impl Eq for Shader {}

impl Hash for Shader {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.stage.hash(state);
        self.hash.hash(state);
        self.bindings.hash(state);
    }
}

impl Shader {
    /// Whether this handle refers to a live shader.
    pub fn is_valid(&self) -> bool {
        self.internal.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::structural_hash;

    #[test]
    fn test_layout_counts_are_dense() {
        let layout = BindingLayout::from_bindings([
            ShaderBinding::constant_buffer(2),
            ShaderBinding::resource(0, ViewDimension::TextureCube),
            ShaderBinding::resource(0, ViewDimension::Texture2D),
            ShaderBinding::sampler(1),
        ]);
        assert_eq!(layout.count(BindingKind::ConstantBuffer), 3);
        assert_eq!(layout.count(BindingKind::ShaderResource), 1);
        assert_eq!(layout.count(BindingKind::UnorderedAccess), 0);
        assert_eq!(layout.count(BindingKind::Sampler), 2);
        assert_eq!(layout.resource_count(), 4);
        assert_eq!(
            layout.dimension(BindingKind::ShaderResource, 0),
            ViewDimension::TextureCube
        );
        assert_eq!(
            layout.dimension(BindingKind::ShaderResource, 5),
            ViewDimension::Texture2D
        );
    }

    #[test]
    fn test_full_layout() {
        let layout = BindingLayout::full();
        assert_eq!(layout.count(BindingKind::ShaderResource), SRV_COUNT as u32);
        assert_eq!(layout.count(BindingKind::Sampler), SAMPLER_COUNT as u32);
    }

    #[test]
    fn test_merge_keeps_existing_entries() {
        let mut a = BindingLayout::from_bindings([ShaderBinding::resource(1, ViewDimension::Texture3D)]);
        let b = BindingLayout::from_bindings([
            ShaderBinding::resource(1, ViewDimension::Texture2D),
            ShaderBinding::uav(0, ViewDimension::Buffer),
        ]);
        a.merge(&b);
        assert_eq!(a.entries().len(), 2);
        assert_eq!(a.dimension(BindingKind::ShaderResource, 1), ViewDimension::Texture3D);
    }

    #[test]
    fn test_shaders_with_different_bindings_differ() {
        // --- ARRANGE ---
        let shader = |bindings: BindingLayout| Shader {
            stage: ShaderStage::Pixel,
            hash: 7,
            bindings,
            internal: None,
        };
        let one = shader(BindingLayout::from_bindings([ShaderBinding::resource(0, ViewDimension::Texture2D)]));
        let same = shader(BindingLayout::from_bindings([ShaderBinding::resource(0, ViewDimension::Texture2D)]));
        let cube = shader(BindingLayout::from_bindings([ShaderBinding::resource(0, ViewDimension::TextureCube)]));
        let wider = shader(BindingLayout::from_bindings([
            ShaderBinding::resource(0, ViewDimension::Texture2D),
            ShaderBinding::sampler(0),
        ]));

        // --- ACT ---
        let hashes = [&one, &same, &cube, &wider].map(structural_hash);

        // --- ASSERT ---
        assert_eq!(one, same);
        assert_eq!(hashes[0], hashes[1]);
        assert_ne!(one, cube);
        assert_ne!(hashes[0], hashes[2]);
        assert_ne!(one, wider);
        assert_ne!(hashes[0], hashes[3]);
    }
}
