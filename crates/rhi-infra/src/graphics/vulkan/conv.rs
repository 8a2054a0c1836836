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

//! `VkFormat`, `VkImageLayout` and `VkAccessFlags` encodings.

use rhi_core::api::{Format, ResourceState};

pub(crate) fn to_vk_format(format: Format) -> u32 {
    use Format::*;
    match format {
        Unknown => 0,
        R32G32B32A32Float => 109,
        R32G32B32A32Uint => 107,
        R32G32B32A32Sint => 108,
        R32G32B32Float => 106,
        R32G32B32Uint => 104,
        R32G32B32Sint => 105,
        R16G16B16A16Float => 97,
        R16G16B16A16Unorm => 91,
        R16G16B16A16Uint => 95,
        R16G16B16A16Snorm => 92,
        R16G16B16A16Sint => 96,
        R32G32Float => 103,
        R32G32Uint => 101,
        R32G32Sint => 102,
        // Vulkan has no typeless formats; the depth format is used for both.
        R32G8X24Typeless | D32FloatS8X24Uint => 130,
        R10G10B10A2Unorm => 64,
        R10G10B10A2Uint => 68,
        R11G11B10Float => 122,
        R8G8B8A8Unorm => 37,
        R8G8B8A8UnormSrgb => 43,
        R8G8B8A8Uint => 41,
        R8G8B8A8Snorm => 38,
        R8G8B8A8Sint => 42,
        B8G8R8A8Unorm => 44,
        B8G8R8A8UnormSrgb => 50,
        R16G16Float => 83,
        R16G16Unorm => 77,
        R16G16Uint => 81,
        R16G16Snorm => 78,
        R16G16Sint => 82,
        R32Typeless | D32Float => 126,
        R32Float => 100,
        R32Uint => 98,
        R32Sint => 99,
        R24G8Typeless | D24UnormS8Uint => 129,
        R8G8Unorm => 16,
        R8G8Uint => 20,
        R8G8Snorm => 17,
        R8G8Sint => 21,
        R16Typeless | D16Unorm => 124,
        R16Float => 76,
        R16Unorm => 70,
        R16Uint => 74,
        R16Snorm => 71,
        R16Sint => 75,
        R8Unorm => 9,
        R8Uint => 13,
        R8Snorm => 10,
        R8Sint => 14,
        R9G9B9E5SharedExp => 123,
        Bc1Unorm => 133,
        Bc1UnormSrgb => 134,
        Bc2Unorm => 135,
        Bc2UnormSrgb => 136,
        Bc3Unorm => 137,
        Bc3UnormSrgb => 138,
        Bc4Unorm => 139,
        Bc4Snorm => 140,
        Bc5Unorm => 141,
        Bc5Snorm => 142,
        Bc6hUf16 => 143,
        Bc6hSf16 => 144,
        Bc7Unorm => 145,
        Bc7UnormSrgb => 146,
    }
}

/// The format a `VkFormat` value stands for. Values shared with a typeless
/// format decode to the depth format.
pub(crate) fn from_vk_format(value: u32) -> Option<Format> {
    Format::ALL
        .iter()
        .copied()
        .filter(|f| !f.is_typeless())
        .chain([Format::Unknown])
        .find(|f| to_vk_format(*f) == value)
}

const IMAGE_LAYOUT_UNDEFINED: u32 = 0;
const IMAGE_LAYOUT_GENERAL: u32 = 1;
const IMAGE_LAYOUT_COLOR_ATTACHMENT: u32 = 2;
const IMAGE_LAYOUT_DEPTH_STENCIL_ATTACHMENT: u32 = 3;
const IMAGE_LAYOUT_DEPTH_STENCIL_READ_ONLY: u32 = 4;
const IMAGE_LAYOUT_SHADER_READ_ONLY: u32 = 5;
const IMAGE_LAYOUT_TRANSFER_SRC: u32 = 6;
const IMAGE_LAYOUT_TRANSFER_DST: u32 = 7;
const IMAGE_LAYOUT_PRESENT_SRC: u32 = 1_000_001_002;
const IMAGE_LAYOUT_SHADING_RATE_ATTACHMENT: u32 = 1_000_164_003;

/// The image layout a texture in `state` must be in.
pub(crate) fn image_layout(state: ResourceState) -> u32 {
    if state.is_empty() {
        return IMAGE_LAYOUT_UNDEFINED;
    }
    let single = [
        (ResourceState::RENDERTARGET, IMAGE_LAYOUT_COLOR_ATTACHMENT),
        (ResourceState::DEPTHSTENCIL, IMAGE_LAYOUT_DEPTH_STENCIL_ATTACHMENT),
        (ResourceState::DEPTHSTENCIL_READONLY, IMAGE_LAYOUT_DEPTH_STENCIL_READ_ONLY),
        (ResourceState::COPY_SRC, IMAGE_LAYOUT_TRANSFER_SRC),
        (ResourceState::COPY_DST, IMAGE_LAYOUT_TRANSFER_DST),
        (ResourceState::PRESENT, IMAGE_LAYOUT_PRESENT_SRC),
        (ResourceState::SHADING_RATE_SOURCE, IMAGE_LAYOUT_SHADING_RATE_ATTACHMENT),
    ];
    if let Some((_, layout)) = single.iter().find(|(s, _)| *s == state) {
        return *layout;
    }
    let shader_read = ResourceState::SHADER_RESOURCE | ResourceState::SHADER_RESOURCE_COMPUTE;
    if shader_read.contains(state) {
        return IMAGE_LAYOUT_SHADER_READ_ONLY;
    }
    IMAGE_LAYOUT_GENERAL
}

const ACCESS_INDIRECT_COMMAND_READ: u32 = 0x1;
const ACCESS_INDEX_READ: u32 = 0x2;
const ACCESS_VERTEX_ATTRIBUTE_READ: u32 = 0x4;
const ACCESS_UNIFORM_READ: u32 = 0x8;
const ACCESS_SHADER_READ: u32 = 0x20;
const ACCESS_SHADER_WRITE: u32 = 0x40;
const ACCESS_COLOR_ATTACHMENT_WRITE: u32 = 0x100;
const ACCESS_DEPTH_STENCIL_ATTACHMENT_READ: u32 = 0x200;
const ACCESS_DEPTH_STENCIL_ATTACHMENT_WRITE: u32 = 0x400;
const ACCESS_TRANSFER_READ: u32 = 0x800;
const ACCESS_TRANSFER_WRITE: u32 = 0x1000;
const ACCESS_MEMORY_READ: u32 = 0x8000;
const ACCESS_ACCELERATION_STRUCTURE_READ: u32 = 0x20_0000;
const ACCESS_SHADING_RATE_READ: u32 = 0x80_0000;

/// The access mask of a buffer or texture in `state`.
pub(crate) fn access_flags(state: ResourceState) -> u32 {
    let table = [
        (ResourceState::SHADER_RESOURCE, ACCESS_SHADER_READ),
        (ResourceState::SHADER_RESOURCE_COMPUTE, ACCESS_SHADER_READ),
        (ResourceState::UNORDERED_ACCESS, ACCESS_SHADER_READ | ACCESS_SHADER_WRITE),
        (ResourceState::COPY_SRC, ACCESS_TRANSFER_READ),
        (ResourceState::COPY_DST, ACCESS_TRANSFER_WRITE),
        (ResourceState::RENDERTARGET, ACCESS_COLOR_ATTACHMENT_WRITE),
        (
            ResourceState::DEPTHSTENCIL,
            ACCESS_DEPTH_STENCIL_ATTACHMENT_READ | ACCESS_DEPTH_STENCIL_ATTACHMENT_WRITE,
        ),
        (ResourceState::DEPTHSTENCIL_READONLY, ACCESS_DEPTH_STENCIL_ATTACHMENT_READ),
        (ResourceState::VERTEX_BUFFER, ACCESS_VERTEX_ATTRIBUTE_READ),
        (ResourceState::INDEX_BUFFER, ACCESS_INDEX_READ),
        (ResourceState::CONSTANT_BUFFER, ACCESS_UNIFORM_READ),
        (ResourceState::INDIRECT_ARGUMENT, ACCESS_INDIRECT_COMMAND_READ),
        (
            ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
            ACCESS_ACCELERATION_STRUCTURE_READ,
        ),
        (ResourceState::SHADING_RATE_SOURCE, ACCESS_SHADING_RATE_READ),
        (ResourceState::PRESENT, ACCESS_MEMORY_READ),
    ];
    table
        .iter()
        .filter(|(s, _)| state.contains(*s))
        .fold(0, |mask, (_, access)| mask | access)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_formats_round_trip_except_typeless() {
        for &format in Format::ALL {
            let decoded = from_vk_format(to_vk_format(format));
            if format.is_typeless() {
                assert_eq!(decoded, Some(format.depth_view_format()));
            } else {
                assert_eq!(decoded, Some(format), "{:?}", format);
            }
        }
        assert_eq!(from_vk_format(0), Some(Format::Unknown));
        assert_eq!(from_vk_format(1), None);
    }

    #[test]
    fn test_image_layouts() {
        assert_eq!(image_layout(ResourceState::UNDEFINED), IMAGE_LAYOUT_UNDEFINED);
        assert_eq!(image_layout(ResourceState::RENDERTARGET), IMAGE_LAYOUT_COLOR_ATTACHMENT);
        assert_eq!(
            image_layout(ResourceState::SHADER_RESOURCE | ResourceState::SHADER_RESOURCE_COMPUTE),
            IMAGE_LAYOUT_SHADER_READ_ONLY
        );
        assert_eq!(image_layout(ResourceState::UNORDERED_ACCESS), IMAGE_LAYOUT_GENERAL);
        assert_eq!(image_layout(ResourceState::PRESENT), IMAGE_LAYOUT_PRESENT_SRC);
    }

    #[test]
    fn test_access_flags_combine() {
        let mask = access_flags(ResourceState::VERTEX_BUFFER | ResourceState::INDEX_BUFFER);
        assert_eq!(mask, ACCESS_VERTEX_ATTRIBUTE_READ | ACCESS_INDEX_READ);
        assert_eq!(access_flags(ResourceState::UNDEFINED), 0);
    }
}
