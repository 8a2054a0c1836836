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

use bytemuck::{Pod, Zeroable};
use rhi_core::{
    BackendKind, BindFlags, ClearValue, CpuAccessFlags, DeviceSettings, GpuBuffer, GpuBufferDesc,
    GraphicsDevice, LoadOp, MapMode, PipelineStateDesc, RenderPassAttachment, RenderPassDesc,
    ShaderBinding, ShaderStage, StoreOp, SubresourceData, TextureDesc, Usage,
};
use rhi_infra::{create_device, Device, SoftDevice};

const BACKENDS: [BackendKind; 3] = [BackendKind::Dx11, BackendKind::Dx12, BackendKind::Vulkan];

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
struct Tint {
    color: [f32; 4],
}

fn device(backend: BackendKind, transient_buffer_size: u64) -> (Arc<SoftDevice>, Device) {
    let _ = env_logger::builder().is_test(true).try_init();
    let soft = Arc::new(SoftDevice::new());
    let settings = DeviceSettings {
        backend,
        width: 8,
        height: 8,
        transient_buffer_size,
        ..Default::default()
    };
    let device = create_device(settings, soft.clone(), None).unwrap();
    (soft, device)
}

fn readback(device: &Device, size: u64) -> GpuBuffer {
    device
        .create_buffer(
            &GpuBufferDesc {
                size,
                usage: Usage::Staging,
                cpu_access: CpuAccessFlags::READ,
                ..Default::default()
            },
            None,
        )
        .unwrap()
}

#[test]
fn test_cleared_render_target_reads_back() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (_soft, device) = device(backend, 4096);
        let target = device
            .create_texture(
                &TextureDesc {
                    width: 2,
                    height: 2,
                    bind_flags: BindFlags::RENDER_TARGET | BindFlags::SHADER_RESOURCE,
                    clear: ClearValue::Color([1.0, 0.0, 0.0, 1.0]),
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let pass = device
            .create_render_pass(&RenderPassDesc {
                attachments: vec![RenderPassAttachment::render_target(
                    &target,
                    LoadOp::Clear,
                    StoreOp::Store,
                )],
            })
            .unwrap();
        let staging = readback(&device, 16);

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.render_pass_begin(&pass, cmd);
        device.render_pass_end(cmd);
        device.copy_resource(&staging, &target, cmd);
        device.submit_command_lists();
        let mapping = device.map(&staging, MapMode::Read).unwrap();

        // --- ASSERT ---
        assert_eq!(mapping.data(), [255, 0, 0, 255].repeat(4).as_slice(), "{:?}", backend);
        device.unmap(&staging, mapping).unwrap();
    }
}

#[test]
fn test_initial_texture_data_reaches_the_device() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (_soft, device) = device(backend, 4096);
        let texels: Vec<u8> = (1..=8).collect();
        let texture = device
            .create_texture(
                &TextureDesc {
                    width: 2,
                    height: 1,
                    bind_flags: BindFlags::SHADER_RESOURCE,
                    ..Default::default()
                },
                Some(&[SubresourceData {
                    data: &texels,
                    row_pitch: 8,
                    slice_pitch: 8,
                }]),
            )
            .unwrap();
        let staging = readback(&device, 8);

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.copy_resource(&staging, &texture, cmd);
        device.submit_command_lists();

        // --- ASSERT ---
        let mapping = device.map(&staging, MapMode::Read).unwrap();
        assert_eq!(mapping.into_data(), texels, "{:?}", backend);
    }
}

#[test]
fn test_each_draw_sees_the_constants_written_before_it() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (soft, device) = device(backend, 4096);
        let vs = device
            .create_shader(
                ShaderStage::Vertex,
                b"vs_tint",
                Some(&[ShaderBinding::constant_buffer(0)]),
            )
            .unwrap();
        let pso = device
            .create_pipeline_state(&PipelineStateDesc {
                vs: Some(vs),
                ..Default::default()
            })
            .unwrap();
        let constants = device
            .create_buffer(
                &GpuBufferDesc {
                    size: std::mem::size_of::<Tint>() as u64,
                    usage: Usage::Dynamic,
                    bind_flags: BindFlags::CONSTANT_BUFFER,
                    cpu_access: CpuAccessFlags::WRITE,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let red = Tint {
            color: [1.0, 0.0, 0.0, 1.0],
        };
        let blue = Tint {
            color: [0.0, 0.0, 1.0, 1.0],
        };

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.bind_pipeline_state(&pso, cmd);
        device.bind_constant_buffer(ShaderStage::Vertex, &constants, 0, cmd, 0);
        device.update_buffer(&constants, bytemuck::bytes_of(&red), cmd);
        device.draw(3, 0, cmd);
        device.update_buffer(&constants, bytemuck::bytes_of(&blue), cmd);
        device.draw(3, 0, cmd);
        device.submit_command_lists();

        // --- ASSERT ---
        let draws = soft.draw_log();
        assert_eq!(draws.len(), 2, "{:?}", backend);
        let seen: Vec<Tint> = draws
            .iter()
            .map(|draw| bytemuck::pod_read_unaligned::<Tint>(draw.constant_buffer(0).unwrap()))
            .collect();
        assert_eq!(seen, vec![red, blue], "{:?}", backend);
    }
}

#[test]
fn test_transient_memory_grows_past_its_initial_size() {
    // --- ARRANGE ---
    let (_soft, device) = device(BackendKind::Dx12, 256);
    let cmd = device.begin_command_list();

    // --- ACT ---
    let small = device.allocate_gpu(64, cmd);
    let large = device.allocate_gpu(1024, cmd);

    // --- ASSERT ---
    assert!(large.size >= 1024);
    assert!(!small.buffer.same_resource(&large.buffer));
    assert!(device.write_allocation(&large, 0, &[5; 1024]).is_ok());
    assert!(device.write_allocation(&large, large.size - 8, &[0; 16]).is_err());
    device.submit_command_lists();
}

#[test]
fn test_transient_writes_survive_buffer_growth() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (_soft, device) = device(backend, 256);
        let staging = readback(&device, 64 + 1024);
        let cmd = device.begin_command_list();
        let before = device.allocate_gpu(64, cmd);
        device.write_allocation(&before, 0, &[0xAA; 64]).unwrap();

        // --- ACT ---
        let after = device.allocate_gpu(1024, cmd);
        device.write_allocation(&after, 0, &[0x55; 1024]).unwrap();
        device.copy_buffer_region(&staging, 0, &before.buffer, before.offset, 64, cmd);
        device.copy_buffer_region(&staging, 64, &after.buffer, after.offset, 1024, cmd);
        device.submit_command_lists();

        // --- ASSERT ---
        assert!(!before.buffer.same_resource(&after.buffer), "{:?}", backend);
        let mapping = device.map(&staging, MapMode::Read).unwrap();
        let data = mapping.into_data();
        assert_eq!(&data[..64], [0xAA; 64].as_slice(), "{:?}", backend);
        assert_eq!(&data[64..], [0x55; 1024].as_slice(), "{:?}", backend);
    }
}
