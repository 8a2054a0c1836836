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

//! Sampler states.

use std::hash::{Hash, Hasher};

use super::{BackendPayload, ComparisonFunc};
use crate::hash::hash_f32;

/// Texture filtering mode.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Filter {
    MinMagMipPoint,
    MinMagPointMipLinear,
    MinPointMagLinearMipPoint,
    MinMagLinearMipPoint,
    #[default]
    MinMagMipLinear,
    Anisotropic,
    ComparisonMinMagMipPoint,
    ComparisonMinMagMipLinear,
    ComparisonAnisotropic,
    MinimumMinMagMipLinear,
    MaximumMinMagMipLinear,
}

/// How texture coordinates outside `[0, 1]` are resolved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureAddressMode {
    /// Tile.
    #[default]
    Wrap,
    /// Tile, mirroring every other repetition.
    Mirror,
    /// Clamp to the edge texel.
    Clamp,
    /// Use the border color.
    Border,
    /// Mirror once, then clamp.
    MirrorOnce,
}

/// Describes a sampler.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplerDesc {
    /// Filtering mode.
    pub filter: Filter,
    /// Addressing along U.
    pub address_u: TextureAddressMode,
    /// Addressing along V.
    pub address_v: TextureAddressMode,
    /// Addressing along W.
    pub address_w: TextureAddressMode,
    /// Bias added to the computed mip.
    pub mip_lod_bias: f32,
    /// Anisotropy clamp for anisotropic filters.
    pub max_anisotropy: u32,
    /// Comparison for comparison filters.
    pub comparison_func: ComparisonFunc,
    /// Border color for [`TextureAddressMode::Border`].
    pub border_color: [f32; 4],
    /// Lowest accessible mip.
    pub min_lod: f32,
    /// Highest accessible mip.
    pub max_lod: f32,
}

impl Default for SamplerDesc {
    fn default() -> Self {
        Self {
            filter: Filter::MinMagMipLinear,
            address_u: TextureAddressMode::Wrap,
            address_v: TextureAddressMode::Wrap,
            address_w: TextureAddressMode::Wrap,
            mip_lod_bias: 0.0,
            max_anisotropy: 1,
            comparison_func: ComparisonFunc::Never,
            border_color: [0.0; 4],
            min_lod: 0.0,
            max_lod: f32::MAX,
        }
    }
}

impl Eq for SamplerDesc {}

impl Hash for SamplerDesc {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.filter.hash(state);
        self.address_u.hash(state);
        self.address_v.hash(state);
        self.address_w.hash(state);
        hash_f32(self.mip_lod_bias, state);
        self.max_anisotropy.hash(state);
        self.comparison_func.hash(state);
        for c in self.border_color {
            hash_f32(c, state);
        }
        hash_f32(self.min_lod, state);
        hash_f32(self.max_lod, state);
    }
}

/// A handle to a sampler.
#[derive(Debug, Clone, Default)]
pub struct Sampler {
    /// The description the sampler was created from.
    pub desc: SamplerDesc,
    /// The backend payload.
    pub internal: Option<BackendPayload>,
}

impl Sampler {
    /// Whether this handle refers to a live sampler.
    pub fn is_valid(&self) -> bool {
        self.internal.is_some()
    }
}
