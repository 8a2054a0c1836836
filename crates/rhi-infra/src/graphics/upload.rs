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

//! The copy queue that moves initial data into device-local resources.
//!
//! Uploads are staged in a per-frame linear allocator and recorded into a copy
//! command buffer that stays open until the next graphics submission. The
//! graphics queue waits on the copy fence before running that frame's lists.

use std::sync::{Arc, Mutex};

use rhi_core::api::SubresourceData;
use rhi_core::native::{
    NativeBuffer, NativeCommand, NativeCommandBuffer, NativeFence, NativeTexture, QueueKind,
};
use rhi_core::{NativeDevice, RhiError};

use super::deferred::DeferredDestroyQueue;
use super::lock;
use super::resources::{resource_payload, Owned, ResourceStore};
use super::transient::LinearAllocator;

const BUFFER_ALIGNMENT: u64 = 4;
const TEXTURE_ALIGNMENT: u64 = 512;

struct CopySlot {
    cmd: NativeCommandBuffer,
    staging: LinearAllocator,
}

struct CopyState {
    slots: Vec<Option<CopySlot>>,
    open: Option<usize>,
    /// The frame uploads are recorded for.
    frame: u64,
    /// Last value submitted on the copy fence.
    value: u64,
    owned: Owned,
}

pub(crate) struct CopyQueue {
    state: Mutex<CopyState>,
    fence: NativeFence,
    staging_size: u64,
}

impl CopyQueue {
    pub fn new(
        native: &dyn NativeDevice,
        destroyer: &Arc<DeferredDestroyQueue>,
        ring_size: usize,
        staging_size: u64,
    ) -> Result<Self, RhiError> {
        let fence = native.create_fence(0)?;
        Ok(Self {
            state: Mutex::new(CopyState {
                slots: (0..ring_size.max(1)).map(|_| None).collect(),
                open: None,
                frame: 0,
                value: 0,
                owned: Owned::with(destroyer, fence),
            }),
            fence,
            staging_size,
        })
    }

    /// Copies `data` into `dst` at `dst_offset`.
    pub fn upload_buffer(
        &self,
        store: &ResourceStore,
        dst: NativeBuffer,
        dst_offset: u64,
        data: &[u8],
    ) -> Result<(), RhiError> {
        let mut state = lock(&self.state);
        let slot = self.open(&mut state, store)?;
        let (src, src_offset) = stage(store, &mut slot.staging, data, BUFFER_ALIGNMENT)?;
        store.native().record(
            slot.cmd,
            NativeCommand::CopyBuffer {
                src,
                src_offset,
                dst,
                dst_offset,
                size: data.len() as u64,
            },
        );
        Ok(())
    }

    /// Copies one entry of `data` into each subresource of `dst`, in
    /// subresource order.
    pub fn upload_texture(
        &self,
        store: &ResourceStore,
        dst: NativeTexture,
        data: &[SubresourceData<'_>],
    ) -> Result<(), RhiError> {
        let mut state = lock(&self.state);
        let slot = self.open(&mut state, store)?;
        for (subresource, sub) in data.iter().enumerate() {
            let (src, src_offset) = stage(store, &mut slot.staging, sub.data, TEXTURE_ALIGNMENT)?;
            store.native().record(
                slot.cmd,
                NativeCommand::CopyBufferToTexture {
                    src,
                    src_offset,
                    row_pitch: sub.row_pitch,
                    slice_pitch: sub.slice_pitch,
                    dst,
                    subresource: subresource as u32,
                },
            );
        }
        Ok(())
    }

    fn open<'s>(
        &self,
        state: &'s mut CopyState,
        store: &ResourceStore,
    ) -> Result<&'s mut CopySlot, RhiError> {
        let index = (state.frame % state.slots.len() as u64) as usize;
        if state.open.is_none() {
            if state.slots[index].is_none() {
                let cmd = store.native().create_command_buffer(QueueKind::Copy)?;
                state.owned.push(cmd);
                log::debug!("Creating copy command buffer for ring slot {}", index);
                state.slots[index] = Some(CopySlot {
                    cmd,
                    staging: LinearAllocator::new(self.staging_size),
                });
            }
            if let Some(slot) = state.slots[index].as_mut() {
                store.native().begin_command_buffer(slot.cmd)?;
                slot.staging.reset();
            }
            state.open = Some(index);
        }
        state.slots[index].as_mut().ok_or(RhiError::InvalidHandle)
    }

    /// Submits pending uploads and moves recording on to `next_frame`.
    ///
    /// Returns the fence value the graphics queue has to wait for, or `None`
    /// when nothing was uploaded.
    pub fn flush(
        &self,
        native: &dyn NativeDevice,
        next_frame: u64,
    ) -> Result<Option<(NativeFence, u64)>, RhiError> {
        let mut state = lock(&self.state);
        state.frame = next_frame;
        let Some(index) = state.open.take() else {
            return Ok(None);
        };
        let cmd = state.slots[index]
            .as_ref()
            .map(|slot| slot.cmd)
            .ok_or(RhiError::InvalidHandle)?;
        native.end_command_buffer(cmd)?;
        state.value += 1;
        let signal = (self.fence, state.value);
        native.submit(QueueKind::Copy, &[cmd], &[], Some(signal))?;
        log::trace!("Submitted uploads signaling copy fence value {}", state.value);
        Ok(Some(signal))
    }

    #[cfg(test)]
    fn is_open(&self) -> bool {
        lock(&self.state).open.is_some()
    }
}

/// Writes `data` into staging memory, returning where it landed.
fn stage(
    store: &ResourceStore,
    staging: &mut LinearAllocator,
    data: &[u8],
    alignment: u64,
) -> Result<(NativeBuffer, u64), RhiError> {
    let allocation = staging.allocate(store, data.len() as u64, alignment)?;
    let src = resource_payload(&allocation.buffer)
        .and_then(|p| p.buffer())
        .ok_or(RhiError::InvalidHandle)?;
    store.native().write_buffer(src, allocation.offset, data)?;
    Ok((src, allocation.offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graphics::dx12::Dx12Backend;
    use crate::graphics::soft::SoftDevice;
    use rhi_core::api::{BindFlags, Format, ResourceMiscFlags, TextureKind};
    use rhi_core::native::{MemoryKind, NativeBufferDesc, NativeTextureDesc};

    fn fixture() -> (Arc<SoftDevice>, ResourceStore, CopyQueue) {
        let soft = Arc::new(SoftDevice::new());
        let native: Arc<dyn NativeDevice> = soft.clone();
        let destroyer = Arc::new(DeferredDestroyQueue::new(native.clone()));
        let queue = CopyQueue::new(native.as_ref(), &destroyer, 3, 64).unwrap();
        let store = ResourceStore::new(native, destroyer, Arc::new(Dx12Backend));
        (soft, store, queue)
    }

    fn device_buffer(soft: &SoftDevice, size: u64) -> NativeBuffer {
        soft.create_buffer(
            &NativeBufferDesc {
                size,
                memory: MemoryKind::DeviceLocal,
                bind_flags: BindFlags::VERTEX_BUFFER,
                misc_flags: ResourceMiscFlags::empty(),
                stride: 0,
            },
            None,
        )
        .unwrap()
    }

    #[test]
    fn test_buffer_upload_lands_after_flush() {
        // --- ARRANGE ---
        let _ = env_logger::builder().is_test(true).try_init();
        let (soft, store, queue) = fixture();
        let dst = device_buffer(&soft, 8);

        // --- ACT ---
        queue.upload_buffer(&store, dst, 4, &[1, 2, 3, 4]).unwrap();
        let before = soft.buffer_contents(dst).unwrap();
        let wait = queue.flush(store.native(), 1).unwrap();

        // --- ASSERT ---
        assert_eq!(before, vec![0; 8]);
        assert_eq!(wait.map(|(_, v)| v), Some(1));
        assert_eq!(soft.buffer_contents(dst).unwrap(), vec![0, 0, 0, 0, 1, 2, 3, 4]);
        assert!(!queue.is_open());
    }

    #[test]
    fn test_flush_without_uploads_submits_nothing() {
        let (soft, store, queue) = fixture();

        assert!(queue.flush(store.native(), 1).unwrap().is_none());
        assert_eq!(soft.stats().submissions, 0);
    }

    #[test]
    fn test_texture_upload_writes_each_subresource() {
        // --- ARRANGE ---
        let (soft, store, queue) = fixture();
        let desc = NativeTextureDesc {
            kind: TextureKind::Texture2D,
            width: 2,
            height: 1,
            depth: 1,
            array_size: 2,
            mip_levels: 1,
            format: Format::R8G8B8A8Unorm,
            native_format: 0,
            sample_count: 1,
            bind_flags: BindFlags::SHADER_RESOURCE,
            misc_flags: ResourceMiscFlags::empty(),
            memory: MemoryKind::DeviceLocal,
        };
        let dst = soft.create_texture(&desc, None).unwrap();
        let first = [1u8; 8];
        let second = [2u8; 8];
        let data = [
            SubresourceData {
                data: &first,
                row_pitch: 8,
                slice_pitch: 8,
            },
            SubresourceData {
                data: &second,
                row_pitch: 8,
                slice_pitch: 8,
            },
        ];

        // --- ACT ---
        queue.upload_texture(&store, dst, &data).unwrap();
        queue.flush(store.native(), 1).unwrap();

        // --- ASSERT ---
        assert_eq!(soft.texture_subresource(dst, 0).unwrap(), first.to_vec());
        assert_eq!(soft.texture_subresource(dst, 1).unwrap(), second.to_vec());
        assert_eq!(soft.stats().command_count("copy_buffer_to_texture"), 2);
    }

    #[test]
    fn test_fence_values_increase_per_flush() {
        let (soft, store, queue) = fixture();
        let dst = device_buffer(&soft, 4);

        queue.upload_buffer(&store, dst, 0, &[9; 4]).unwrap();
        let first = queue.flush(store.native(), 1).unwrap().unwrap();
        queue.upload_buffer(&store, dst, 0, &[7; 4]).unwrap();
        let second = queue.flush(store.native(), 2).unwrap().unwrap();

        assert_eq!(first.0, second.0);
        assert_eq!((first.1, second.1), (1, 2));
        assert_eq!(soft.fence_value(second.0), 2);
    }
}
