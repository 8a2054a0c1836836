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

use std::sync::Arc;

use rhi_core::{
    BackendKind, BindFlags, DeviceSettings, GpuBufferDesc, GraphicsDevice, LoadOp,
    RenderPassAttachment, RenderPassDesc, ResourceMiscFlags, RhiError, ShaderStage, StoreOp,
    SubresourceType, TextureDesc,
};
use rhi_infra::{create_device, Device, SoftDevice};

fn device() -> Device {
    let _ = env_logger::builder().is_test(true).try_init();
    let settings = DeviceSettings {
        backend: BackendKind::Dx12,
        width: 16,
        height: 16,
        ..Default::default()
    };
    create_device(settings, Arc::new(SoftDevice::new()), None).unwrap()
}

fn array_texture(device: &Device) -> rhi_core::Texture {
    device
        .create_texture(
            &TextureDesc {
                width: 4,
                height: 4,
                array_size: 2,
                bind_flags: BindFlags::SHADER_RESOURCE | BindFlags::RENDER_TARGET,
                ..Default::default()
            },
            None,
        )
        .unwrap()
}

#[test]
fn test_explicit_views_are_numbered_after_the_default() {
    // --- ARRANGE ---
    let device = device();
    let texture = array_texture(&device);

    // --- ACT ---
    let first = device
        .create_texture_subresource(&texture, SubresourceType::Srv, 0, Some(1), 0, None)
        .unwrap();
    let second = device
        .create_texture_subresource(&texture, SubresourceType::Srv, 1, Some(1), 0, None)
        .unwrap();

    // --- ASSERT ---
    assert_eq!((first, second), (0, 1));
    assert_eq!(device.subresource_count(&texture, SubresourceType::Srv), 2);
    assert_eq!(device.subresource_count(&texture, SubresourceType::Rtv), 0);
    assert_eq!(device.subresource_count(&texture, SubresourceType::Uav), 0);
}

#[test]
fn test_buffer_range_views_follow_the_default_view() {
    let device = device();
    let buffer = device
        .create_buffer(
            &GpuBufferDesc {
                size: 256,
                bind_flags: BindFlags::SHADER_RESOURCE,
                misc_flags: ResourceMiscFlags::BUFFER_ALLOW_RAW_VIEWS,
                ..Default::default()
            },
            None,
        )
        .unwrap();

    let whole = device.subresource_count(&buffer, SubresourceType::Srv);
    let half = device
        .create_buffer_subresource(&buffer, SubresourceType::Srv, 128, None)
        .unwrap();

    assert_eq!(whole, 0);
    assert_eq!(half, 0);
    assert!(device
        .create_buffer_subresource(&buffer, SubresourceType::Srv, 200, Some(100))
        .is_err());
    assert!(device
        .create_buffer_subresource(&buffer, SubresourceType::Uav, 0, None)
        .is_err());
}

#[test]
fn test_render_pass_rejects_missing_views() {
    // --- ARRANGE ---
    let device = device();
    let texture = array_texture(&device);
    let attachment = RenderPassAttachment {
        subresource: 3,
        ..RenderPassAttachment::render_target(&texture, LoadOp::Clear, StoreOp::Store)
    };

    // --- ACT ---
    let result = device.create_render_pass(&RenderPassDesc {
        attachments: vec![attachment],
    });

    // --- ASSERT ---
    assert!(matches!(
        result,
        Err(RhiError::InvalidSubresource { index: 3, count: 0 })
    ));
}

#[test]
fn test_render_pass_accepts_an_explicit_slice_view() {
    let device = device();
    let texture = array_texture(&device);
    let slice = device
        .create_texture_subresource(&texture, SubresourceType::Rtv, 1, Some(1), 0, Some(1))
        .unwrap();

    let pass = device.create_render_pass(&RenderPassDesc {
        attachments: vec![RenderPassAttachment {
            subresource: slice,
            ..RenderPassAttachment::render_target(&texture, LoadOp::Load, StoreOp::Store)
        }],
    });

    assert!(pass.is_ok());
}

#[test]
#[should_panic(expected = "cannot bind")]
fn test_binding_a_missing_view_panics() {
    let device = device();
    let texture = array_texture(&device);
    let cmd = device.begin_command_list();

    device.bind_resource(ShaderStage::Pixel, &texture, 0, cmd, 5);
}
