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

//! Buffers, transient allocations and CPU mappings.

use bytemuck::{Pod, Zeroable};
use std::ops::Deref;

use super::{BindFlags, CpuAccessFlags, Format, GpuResource, ResourceMiscFlags, Usage};
use crate::error::RhiError;

/// Describes a linear GPU buffer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct GpuBufferDesc {
    /// Size in bytes. Must be non-zero.
    pub size: u64,
    /// Expected access pattern.
    pub usage: Usage,
    /// Pipeline roles.
    pub bind_flags: BindFlags,
    /// CPU access.
    pub cpu_access: CpuAccessFlags,
    /// Miscellaneous options.
    pub misc_flags: ResourceMiscFlags,
    /// Element stride for structured buffers.
    pub stride: u32,
    /// Element format for typed buffer views; `Unknown` for raw or structured.
    pub format: Format,
}

impl GpuBufferDesc {
    /// Checks the invariants a backend relies upon.
    pub fn validate(&self) -> Result<(), RhiError> {
        if self.size == 0 {
            return Err(RhiError::InvalidDescriptor("buffer size must be non-zero".into()));
        }
        if self.usage == Usage::Dynamic && !self.cpu_access.contains(CpuAccessFlags::WRITE) {
            return Err(RhiError::InvalidDescriptor(
                "dynamic buffers require CPU write access".into(),
            ));
        }
        if self.usage == Usage::Staging && self.cpu_access.is_empty() {
            return Err(RhiError::InvalidDescriptor(
                "staging buffers require CPU read or write access".into(),
            ));
        }
        if self.misc_flags.contains(ResourceMiscFlags::BUFFER_STRUCTURED) && self.stride == 0 {
            return Err(RhiError::InvalidDescriptor(
                "structured buffers require a non-zero stride".into(),
            ));
        }
        Ok(())
    }

    /// Whether updates go through per-command-list transient memory.
    pub fn is_dynamic_constant_buffer(&self) -> bool {
        self.usage == Usage::Dynamic && self.bind_flags.contains(BindFlags::CONSTANT_BUFFER)
    }
}

/// A handle to a GPU buffer.
#[derive(Debug, Clone, Default)]
pub struct GpuBuffer {
    /// The shared resource base.
    pub resource: GpuResource,
    /// The description the buffer was created from.
    pub desc: GpuBufferDesc,
}

impl Deref for GpuBuffer {
    type Target = GpuResource;

    fn deref(&self) -> &Self::Target {
        &self.resource
    }
}

/// A sub-range of a per-frame transient buffer.
///
/// Valid only within the frame and command list it was allocated for.
#[derive(Debug, Clone)]
pub struct GpuAllocation {
    /// The backing buffer.
    pub buffer: GpuBuffer,
    /// Byte offset of the allocation within `buffer`.
    pub offset: u64,
    /// Size of the allocation in bytes.
    pub size: u64,
}

/// The access requested when mapping a buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MapMode {
    /// Read the current contents.
    Read,
    /// Overwrite the contents.
    Write,
    /// Read and write back.
    ReadWrite,
}

impl MapMode {
    /// Whether the mapping reads the current contents.
    pub fn reads(self) -> bool {
        matches!(self, MapMode::Read | MapMode::ReadWrite)
    }

    /// Whether unmapping writes the contents back.
    pub fn writes(self) -> bool {
        matches!(self, MapMode::Write | MapMode::ReadWrite)
    }
}

/// A CPU view of a host-visible buffer, obtained from `map` and returned to `unmap`.
#[derive(Debug)]
pub struct Mapping {
    mode: MapMode,
    data: Vec<u8>,
}

impl Mapping {
    /// Builds a mapping over `data`.
    pub fn new(mode: MapMode, data: Vec<u8>) -> Self {
        Self { mode, data }
    }

    /// The access this mapping was opened with.
    pub fn mode(&self) -> MapMode {
        self.mode
    }

    /// The mapped bytes.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// The mapped bytes, writable.
    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Consumes the mapping and returns its bytes.
    pub fn into_data(self) -> Vec<u8> {
        self.data
    }
}

/// Arguments of a non-indexed indirect draw, as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawArgsInstanced {
    /// Vertices per instance.
    pub vertex_count_per_instance: u32,
    /// Instances to draw.
    pub instance_count: u32,
    /// First vertex.
    pub start_vertex_location: u32,
    /// First instance.
    pub start_instance_location: u32,
}

/// Arguments of an indexed indirect draw, as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDrawArgsIndexedInstanced {
    /// Indices per instance.
    pub index_count_per_instance: u32,
    /// Instances to draw.
    pub instance_count: u32,
    /// First index.
    pub start_index_location: u32,
    /// Value added to each index.
    pub base_vertex_location: i32,
    /// First instance.
    pub start_instance_location: u32,
}

/// Arguments of an indirect dispatch, as laid out in GPU memory.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct IndirectDispatchArgs {
    /// Thread groups along X.
    pub thread_group_count_x: u32,
    /// Thread groups along Y.
    pub thread_group_count_y: u32,
    /// Thread groups along Z.
    pub thread_group_count_z: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_buffer_desc_validation() {
        let ok = GpuBufferDesc {
            size: 64,
            usage: Usage::Dynamic,
            bind_flags: BindFlags::CONSTANT_BUFFER,
            cpu_access: CpuAccessFlags::WRITE,
            ..Default::default()
        };
        assert!(ok.validate().is_ok());
        assert!(ok.is_dynamic_constant_buffer());

        let empty = GpuBufferDesc::default();
        assert!(matches!(empty.validate(), Err(RhiError::InvalidDescriptor(_))));

        let no_cpu = GpuBufferDesc {
            cpu_access: CpuAccessFlags::empty(),
            ..ok.clone()
        };
        assert!(no_cpu.validate().is_err());

        let structured = GpuBufferDesc {
            size: 64,
            misc_flags: ResourceMiscFlags::BUFFER_STRUCTURED,
            ..Default::default()
        };
        assert!(structured.validate().is_err());
    }

    #[test]
    fn test_indirect_args_layout() {
        assert_eq!(std::mem::size_of::<IndirectDrawArgsInstanced>(), 16);
        assert_eq!(std::mem::size_of::<IndirectDrawArgsIndexedInstanced>(), 20);
        assert_eq!(std::mem::size_of::<IndirectDispatchArgs>(), 12);
    }
}
