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

//! Pixel and element formats.

use serde::{Deserialize, Serialize};

/// A texel or element format, named after its channel layout.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum Format {
    #[default]
    Unknown,

    R32G32B32A32Float,
    R32G32B32A32Uint,
    R32G32B32A32Sint,

    R32G32B32Float,
    R32G32B32Uint,
    R32G32B32Sint,

    R16G16B16A16Float,
    R16G16B16A16Unorm,
    R16G16B16A16Uint,
    R16G16B16A16Snorm,
    R16G16B16A16Sint,

    R32G32Float,
    R32G32Uint,
    R32G32Sint,
    /// Depth + stencil with 24 unused bits, typeless.
    R32G8X24Typeless,
    D32FloatS8X24Uint,

    R10G10B10A2Unorm,
    R10G10B10A2Uint,
    R11G11B10Float,
    R8G8B8A8Unorm,
    R8G8B8A8UnormSrgb,
    R8G8B8A8Uint,
    R8G8B8A8Snorm,
    R8G8B8A8Sint,
    B8G8R8A8Unorm,
    B8G8R8A8UnormSrgb,
    R16G16Float,
    R16G16Unorm,
    R16G16Uint,
    R16G16Snorm,
    R16G16Sint,
    /// Depth, typeless.
    R32Typeless,
    D32Float,
    R32Float,
    R32Uint,
    R32Sint,
    /// Depth + stencil, typeless.
    R24G8Typeless,
    D24UnormS8Uint,

    R8G8Unorm,
    R8G8Uint,
    R8G8Snorm,
    R8G8Sint,
    /// Depth, typeless.
    R16Typeless,
    R16Float,
    D16Unorm,
    R16Unorm,
    R16Uint,
    R16Snorm,
    R16Sint,

    R8Unorm,
    R8Uint,
    R8Snorm,
    R8Sint,

    R9G9B9E5SharedExp,

    Bc1Unorm,
    Bc1UnormSrgb,
    Bc2Unorm,
    Bc2UnormSrgb,
    Bc3Unorm,
    Bc3UnormSrgb,
    Bc4Unorm,
    Bc4Snorm,
    Bc5Unorm,
    Bc5Snorm,
    Bc6hUf16,
    Bc6hSf16,
    Bc7Unorm,
    Bc7UnormSrgb,
}

impl Format {
    /// Every format except [`Format::Unknown`].
    pub const ALL: &'static [Format] = &[
        Format::R32G32B32A32Float,
        Format::R32G32B32A32Uint,
        Format::R32G32B32A32Sint,
        Format::R32G32B32Float,
        Format::R32G32B32Uint,
        Format::R32G32B32Sint,
        Format::R16G16B16A16Float,
        Format::R16G16B16A16Unorm,
        Format::R16G16B16A16Uint,
        Format::R16G16B16A16Snorm,
        Format::R16G16B16A16Sint,
        Format::R32G32Float,
        Format::R32G32Uint,
        Format::R32G32Sint,
        Format::R32G8X24Typeless,
        Format::D32FloatS8X24Uint,
        Format::R10G10B10A2Unorm,
        Format::R10G10B10A2Uint,
        Format::R11G11B10Float,
        Format::R8G8B8A8Unorm,
        Format::R8G8B8A8UnormSrgb,
        Format::R8G8B8A8Uint,
        Format::R8G8B8A8Snorm,
        Format::R8G8B8A8Sint,
        Format::B8G8R8A8Unorm,
        Format::B8G8R8A8UnormSrgb,
        Format::R16G16Float,
        Format::R16G16Unorm,
        Format::R16G16Uint,
        Format::R16G16Snorm,
        Format::R16G16Sint,
        Format::R32Typeless,
        Format::D32Float,
        Format::R32Float,
        Format::R32Uint,
        Format::R32Sint,
        Format::R24G8Typeless,
        Format::D24UnormS8Uint,
        Format::R8G8Unorm,
        Format::R8G8Uint,
        Format::R8G8Snorm,
        Format::R8G8Sint,
        Format::R16Typeless,
        Format::R16Float,
        Format::D16Unorm,
        Format::R16Unorm,
        Format::R16Uint,
        Format::R16Snorm,
        Format::R16Sint,
        Format::R8Unorm,
        Format::R8Uint,
        Format::R8Snorm,
        Format::R8Sint,
        Format::R9G9B9E5SharedExp,
        Format::Bc1Unorm,
        Format::Bc1UnormSrgb,
        Format::Bc2Unorm,
        Format::Bc2UnormSrgb,
        Format::Bc3Unorm,
        Format::Bc3UnormSrgb,
        Format::Bc4Unorm,
        Format::Bc4Snorm,
        Format::Bc5Unorm,
        Format::Bc5Snorm,
        Format::Bc6hUf16,
        Format::Bc6hSf16,
        Format::Bc7Unorm,
        Format::Bc7UnormSrgb,
    ];

    /// Bytes per texel, or per 4x4 block for block-compressed formats.
    pub const fn bytes_per_block(self) -> u32 {
        use Format::*;
        match self {
            Unknown => 0,
            R32G32B32A32Float | R32G32B32A32Uint | R32G32B32A32Sint => 16,
            R32G32B32Float | R32G32B32Uint | R32G32B32Sint => 12,
            R16G16B16A16Float | R16G16B16A16Unorm | R16G16B16A16Uint | R16G16B16A16Snorm
            | R16G16B16A16Sint | R32G32Float | R32G32Uint | R32G32Sint | R32G8X24Typeless
            | D32FloatS8X24Uint => 8,
            R10G10B10A2Unorm | R10G10B10A2Uint | R11G11B10Float | R8G8B8A8Unorm
            | R8G8B8A8UnormSrgb | R8G8B8A8Uint | R8G8B8A8Snorm | R8G8B8A8Sint | B8G8R8A8Unorm
            | B8G8R8A8UnormSrgb | R16G16Float | R16G16Unorm | R16G16Uint | R16G16Snorm
            | R16G16Sint | R32Typeless | D32Float | R32Float | R32Uint | R32Sint
            | R24G8Typeless | D24UnormS8Uint | R9G9B9E5SharedExp => 4,
            R8G8Unorm | R8G8Uint | R8G8Snorm | R8G8Sint | R16Typeless | R16Float | D16Unorm
            | R16Unorm | R16Uint | R16Snorm | R16Sint => 2,
            R8Unorm | R8Uint | R8Snorm | R8Sint => 1,
            Bc1Unorm | Bc1UnormSrgb | Bc4Unorm | Bc4Snorm => 8,
            Bc2Unorm | Bc2UnormSrgb | Bc3Unorm | Bc3UnormSrgb | Bc5Unorm | Bc5Snorm
            | Bc6hUf16 | Bc6hSf16 | Bc7Unorm | Bc7UnormSrgb => 16,
        }
    }

    /// Texel footprint of one block along each axis: 4 for BC formats, 1 otherwise.
    pub const fn block_extent(self) -> u32 {
        if self.is_compressed() {
            4
        } else {
            1
        }
    }

    /// Whether this is a block-compressed format.
    pub const fn is_compressed(self) -> bool {
        use Format::*;
        matches!(
            self,
            Bc1Unorm
                | Bc1UnormSrgb
                | Bc2Unorm
                | Bc2UnormSrgb
                | Bc3Unorm
                | Bc3UnormSrgb
                | Bc4Unorm
                | Bc4Snorm
                | Bc5Unorm
                | Bc5Snorm
                | Bc6hUf16
                | Bc6hSf16
                | Bc7Unorm
                | Bc7UnormSrgb
        )
    }

    /// Whether the format can back a depth attachment.
    pub const fn is_depth(self) -> bool {
        use Format::*;
        matches!(
            self,
            D32FloatS8X24Uint
                | R32G8X24Typeless
                | D32Float
                | R32Typeless
                | D24UnormS8Uint
                | R24G8Typeless
                | D16Unorm
                | R16Typeless
        )
    }

    /// Whether the format carries a stencil aspect.
    pub const fn has_stencil(self) -> bool {
        use Format::*;
        matches!(
            self,
            D32FloatS8X24Uint | R32G8X24Typeless | D24UnormS8Uint | R24G8Typeless
        )
    }

    /// Whether the format is one of the typeless depth aliases.
    pub const fn is_typeless(self) -> bool {
        use Format::*;
        matches!(self, R32G8X24Typeless | R32Typeless | R24G8Typeless | R16Typeless)
    }

    /// Whether reads decode sRGB to linear.
    pub const fn is_srgb(self) -> bool {
        use Format::*;
        matches!(
            self,
            R8G8B8A8UnormSrgb
                | B8G8R8A8UnormSrgb
                | Bc1UnormSrgb
                | Bc2UnormSrgb
                | Bc3UnormSrgb
                | Bc7UnormSrgb
        )
    }

    /// The depth view format for a typeless depth alias, or `self`.
    pub const fn depth_view_format(self) -> Format {
        use Format::*;
        match self {
            R32G8X24Typeless => D32FloatS8X24Uint,
            R32Typeless => D32Float,
            R24G8Typeless => D24UnormS8Uint,
            R16Typeless => D16Unorm,
            other => other,
        }
    }

    /// The color view format used to sample a depth format, or `self`.
    pub const fn shader_view_format(self) -> Format {
        use Format::*;
        match self {
            R32G8X24Typeless | D32FloatS8X24Uint => R32G32Float,
            R32Typeless | D32Float => R32Float,
            R24G8Typeless | D24UnormS8Uint => R32Uint,
            R16Typeless | D16Unorm => R16Unorm,
            other => other,
        }
    }

    /// Bytes in one tightly packed row of `width` texels.
    pub const fn row_pitch(self, width: u32) -> u32 {
        let extent = self.block_extent();
        width.div_ceil(extent) * self.bytes_per_block()
    }

    /// Bytes in one tightly packed 2D slice.
    pub const fn slice_pitch(self, width: u32, height: u32) -> u32 {
        self.row_pitch(width) * height.div_ceil(self.block_extent())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_all_formats_have_a_size() {
        for format in Format::ALL {
            assert!(format.bytes_per_block() > 0, "{format:?}");
        }
        assert_eq!(Format::Unknown.bytes_per_block(), 0);
    }

    #[test]
    fn test_compressed_pitches_round_up_to_blocks() {
        assert_eq!(Format::Bc1Unorm.row_pitch(5), 16);
        assert_eq!(Format::Bc1Unorm.slice_pitch(5, 5), 32);
        assert_eq!(Format::R8G8B8A8Unorm.slice_pitch(2, 2), 16);
    }

    #[test]
    fn test_depth_aliases() {
        assert_eq!(Format::R24G8Typeless.depth_view_format(), Format::D24UnormS8Uint);
        assert_eq!(Format::D32Float.shader_view_format(), Format::R32Float);
        assert!(Format::D24UnormS8Uint.has_stencil());
        assert!(!Format::D32Float.has_stencil());
    }
}
