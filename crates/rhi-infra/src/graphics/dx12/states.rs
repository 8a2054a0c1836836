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

//! `D3D12_RESOURCE_STATES` encoding.

use rhi_core::api::ResourceState;

const COMMON: u32 = 0;
const VERTEX_AND_CONSTANT_BUFFER: u32 = 0x1;
const INDEX_BUFFER: u32 = 0x2;
const RENDER_TARGET: u32 = 0x4;
const UNORDERED_ACCESS: u32 = 0x8;
const DEPTH_WRITE: u32 = 0x10;
const DEPTH_READ: u32 = 0x20;
const NON_PIXEL_SHADER_RESOURCE: u32 = 0x40;
const PIXEL_SHADER_RESOURCE: u32 = 0x80;
const INDIRECT_ARGUMENT: u32 = 0x200;
const COPY_DEST: u32 = 0x400;
const COPY_SOURCE: u32 = 0x800;
const RAYTRACING_ACCELERATION_STRUCTURE: u32 = 0x40_0000;
const SHADING_RATE_SOURCE: u32 = 0x100_0000;

pub(crate) fn resource_states(state: ResourceState) -> u32 {
    if state.contains(ResourceState::PRESENT) {
        return COMMON;
    }
    let table = [
        (
            ResourceState::SHADER_RESOURCE,
            NON_PIXEL_SHADER_RESOURCE | PIXEL_SHADER_RESOURCE,
        ),
        (ResourceState::SHADER_RESOURCE_COMPUTE, NON_PIXEL_SHADER_RESOURCE),
        (ResourceState::UNORDERED_ACCESS, UNORDERED_ACCESS),
        (ResourceState::COPY_SRC, COPY_SOURCE),
        (ResourceState::COPY_DST, COPY_DEST),
        (ResourceState::RENDERTARGET, RENDER_TARGET),
        (ResourceState::DEPTHSTENCIL, DEPTH_WRITE),
        (ResourceState::DEPTHSTENCIL_READONLY, DEPTH_READ),
        (ResourceState::VERTEX_BUFFER, VERTEX_AND_CONSTANT_BUFFER),
        (ResourceState::CONSTANT_BUFFER, VERTEX_AND_CONSTANT_BUFFER),
        (ResourceState::INDEX_BUFFER, INDEX_BUFFER),
        (ResourceState::INDIRECT_ARGUMENT, INDIRECT_ARGUMENT),
        (
            ResourceState::RAYTRACING_ACCELERATION_STRUCTURE,
            RAYTRACING_ACCELERATION_STRUCTURE,
        ),
        (ResourceState::SHADING_RATE_SOURCE, SHADING_RATE_SOURCE),
    ];
    table
        .iter()
        .filter(|(s, _)| state.contains(*s))
        .fold(COMMON, |bits, (_, native)| bits | native)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_states_combine_bitwise() {
        assert_eq!(resource_states(ResourceState::UNDEFINED), COMMON);
        assert_eq!(resource_states(ResourceState::PRESENT), COMMON);
        assert_eq!(resource_states(ResourceState::SHADER_RESOURCE), 0xC0);
        assert_eq!(
            resource_states(ResourceState::VERTEX_BUFFER | ResourceState::CONSTANT_BUFFER),
            VERTEX_AND_CONSTANT_BUFFER
        );
        assert_eq!(
            resource_states(ResourceState::COPY_DST | ResourceState::UNORDERED_ACCESS),
            COPY_DEST | UNORDERED_ACCESS
        );
    }
}
