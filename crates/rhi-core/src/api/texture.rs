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

//! Textures and their descriptions.

use std::ops::Deref;

use super::{BindFlags, CpuAccessFlags, Format, GpuResource, ResourceMiscFlags, ResourceState, Usage};
use crate::error::RhiError;

/// The dimensionality of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TextureKind {
    /// One-dimensional.
    Texture1D,
    /// Two-dimensional.
    #[default]
    Texture2D,
    /// Volume.
    Texture3D,
}

/// The optimized clear value of an attachment.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ClearValue {
    /// RGBA clear color.
    Color([f32; 4]),
    /// Depth and stencil clear values.
    DepthStencil {
        /// Depth value.
        depth: f32,
        /// Stencil value.
        stencil: u8,
    },
}

impl Default for ClearValue {
    fn default() -> Self {
        ClearValue::Color([0.0; 4])
    }
}

/// Describes a texture.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureDesc {
    /// Dimensionality.
    pub kind: TextureKind,
    /// Width in texels.
    pub width: u32,
    /// Height in texels.
    pub height: u32,
    /// Depth in texels, for volume textures.
    pub depth: u32,
    /// Number of array slices (6 per cube for cube textures).
    pub array_size: u32,
    /// Number of mips; `0` derives the full chain.
    pub mip_levels: u32,
    /// Texel format.
    pub format: Format,
    /// Samples per texel.
    pub sample_count: u32,
    /// Expected access pattern.
    pub usage: Usage,
    /// Pipeline roles.
    pub bind_flags: BindFlags,
    /// CPU access.
    pub cpu_access: CpuAccessFlags,
    /// Miscellaneous options.
    pub misc_flags: ResourceMiscFlags,
    /// Clear value used when a render pass clears this texture.
    pub clear: ClearValue,
    /// The state the texture rests in between passes.
    pub layout: ResourceState,
}

impl Default for TextureDesc {
    fn default() -> Self {
        Self {
            kind: TextureKind::Texture2D,
            width: 1,
            height: 1,
            depth: 1,
            array_size: 1,
            mip_levels: 1,
            format: Format::R8G8B8A8Unorm,
            sample_count: 1,
            usage: Usage::Default,
            bind_flags: BindFlags::empty(),
            cpu_access: CpuAccessFlags::empty(),
            misc_flags: ResourceMiscFlags::empty(),
            clear: ClearValue::default(),
            layout: ResourceState::SHADER_RESOURCE,
        }
    }
}

/// Number of mips in a full chain down to 1x1x1.
pub fn mip_count(width: u32, height: u32, depth: u32) -> u32 {
    let (mut w, mut h, mut d) = (width.max(1), height.max(1), depth.max(1));
    let mut mips = 1;
    while w > 1 || h > 1 || d > 1 {
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        d = (d / 2).max(1);
        mips += 1;
    }
    mips
}

impl TextureDesc {
    /// The mip count, deriving the full chain when `mip_levels` is 0.
    pub fn resolved_mip_levels(&self) -> u32 {
        if self.mip_levels == 0 {
            mip_count(self.width, self.height, self.depth)
        } else {
            self.mip_levels
        }
    }

    /// Total subresources: mips times array slices.
    pub fn subresource_count(&self) -> u32 {
        self.resolved_mip_levels() * self.array_size.max(1)
    }

    /// Extent of `mip` as (width, height, depth).
    pub fn mip_extent(&self, mip: u32) -> (u32, u32, u32) {
        (
            (self.width >> mip).max(1),
            (self.height >> mip).max(1),
            (self.depth >> mip).max(1),
        )
    }

    /// Whether the texture is a cube or cube array.
    pub fn is_cube(&self) -> bool {
        self.misc_flags.contains(ResourceMiscFlags::TEXTURECUBE)
    }

    /// Checks the invariants a backend relies upon.
    pub fn validate(&self) -> Result<(), RhiError> {
        if self.width == 0 || self.height == 0 || self.depth == 0 || self.array_size == 0 {
            return Err(RhiError::InvalidDescriptor(
                "texture extents and array size must be non-zero".into(),
            ));
        }
        if self.format == Format::Unknown {
            return Err(RhiError::InvalidDescriptor("texture format is unknown".into()));
        }
        if self.kind != TextureKind::Texture3D && self.depth != 1 {
            return Err(RhiError::InvalidDescriptor(
                "only volume textures may have depth".into(),
            ));
        }
        if self.is_cube() && self.array_size % 6 != 0 {
            return Err(RhiError::InvalidDescriptor(
                "cube textures need a multiple of six slices".into(),
            ));
        }
        if !self.sample_count.is_power_of_two() {
            return Err(RhiError::InvalidDescriptor(
                "sample count must be a power of two".into(),
            ));
        }
        if self.bind_flags.contains(BindFlags::DEPTH_STENCIL) && !self.format.is_depth() {
            return Err(RhiError::InvalidDescriptor(format!(
                "{:?} cannot back a depth stencil",
                self.format
            )));
        }
        if self.usage == Usage::Dynamic {
            return Err(RhiError::Unsupported("dynamic textures".into()));
        }
        Ok(())
    }
}

/// A handle to a texture.
#[derive(Debug, Clone, Default)]
pub struct Texture {
    /// The shared resource base.
    pub resource: GpuResource,
    /// The description the texture was created from, with mips resolved.
    pub desc: TextureDesc,
}

impl Deref for Texture {
    type Target = GpuResource;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// Initial contents of one subresource.
#[derive(Debug, Clone, Copy)]
pub struct SubresourceData<'a> {
    /// Texel bytes.
    pub data: &'a [u8],
    /// Bytes between rows in `data`.
    pub row_pitch: u32,
    /// Bytes between depth slices in `data`.
    pub slice_pitch: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mip_chain_derivation() {
        assert_eq!(mip_count(1, 1, 1), 1);
        assert_eq!(mip_count(2, 2, 1), 2);
        assert_eq!(mip_count(256, 64, 1), 9);
        assert_eq!(mip_count(300, 1, 1), 9);

        let desc = TextureDesc {
            width: 64,
            height: 64,
            mip_levels: 0,
            array_size: 2,
            ..Default::default()
        };
        assert_eq!(desc.resolved_mip_levels(), 7);
        assert_eq!(desc.subresource_count(), 14);
        assert_eq!(desc.mip_extent(3), (8, 8, 1));
    }

    #[test]
    fn test_texture_desc_validation() {
        assert!(TextureDesc::default().validate().is_ok());

        let zero = TextureDesc {
            width: 0,
            ..Default::default()
        };
        assert!(zero.validate().is_err());

        let bad_depth = TextureDesc {
            bind_flags: BindFlags::DEPTH_STENCIL,
            ..Default::default()
        };
        assert!(bad_depth.validate().is_err());

        let bad_cube = TextureDesc {
            misc_flags: ResourceMiscFlags::TEXTURECUBE,
            array_size: 4,
            ..Default::default()
        };
        assert!(bad_cube.validate().is_err());
    }
}
