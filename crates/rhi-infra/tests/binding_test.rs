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
    BackendKind, BindFlags, BindPoint, BindingKind, BindingLayout, DescriptorRange,
    DescriptorTableLayout, DescriptorWrite, DeviceSettings, Format, GpuBuffer, GpuBufferDesc,
    GraphicsDevice, PipelineState, PipelineStateDesc, RootLayoutDesc, Sampler, SamplerDesc,
    ShaderBinding, ShaderStage, Texture, TextureDesc, Usage, ViewDimension,
};
use rhi_infra::{create_device, Device, NativeStats, SoftDevice};

const BACKENDS: [BackendKind; 3] = [BackendKind::Dx11, BackendKind::Dx12, BackendKind::Vulkan];

fn device(backend: BackendKind) -> (Arc<SoftDevice>, Device) {
    let _ = env_logger::builder().is_test(true).try_init();
    let soft = Arc::new(SoftDevice::new());
    let settings = DeviceSettings {
        backend,
        width: 32,
        height: 32,
        backbuffer_format: Format::R8G8B8A8Unorm,
        ..Default::default()
    };
    let device = create_device(settings, soft.clone(), None).unwrap();
    (soft, device)
}

struct Scene {
    pso: PipelineState,
    texture: Texture,
    sampler: Sampler,
    constants: GpuBuffer,
}

fn scene(device: &Device) -> Scene {
    let vs = device
        .create_shader(
            ShaderStage::Vertex,
            b"vs_main",
            Some(&[
                ShaderBinding::constant_buffer(0),
                ShaderBinding::resource(0, ViewDimension::Texture2D),
                ShaderBinding::sampler(0),
            ]),
        )
        .unwrap();
    let pso = device
        .create_pipeline_state(&PipelineStateDesc {
            vs: Some(vs),
            ..Default::default()
        })
        .unwrap();
    let texture = device
        .create_texture(
            &TextureDesc {
                width: 4,
                height: 4,
                bind_flags: BindFlags::SHADER_RESOURCE,
                ..Default::default()
            },
            None,
        )
        .unwrap();
    let sampler = device.create_sampler(&SamplerDesc::default()).unwrap();
    let constants = device
        .create_buffer(
            &GpuBufferDesc {
                size: 64,
                usage: Usage::Default,
                bind_flags: BindFlags::CONSTANT_BUFFER,
                ..Default::default()
            },
            Some(&[7; 64]),
        )
        .unwrap();
    Scene {
        pso,
        texture,
        sampler,
        constants,
    }
}

fn bind_scene(device: &Device, scene: &Scene, cmd: rhi_core::CommandList) {
    device.bind_pipeline_state(&scene.pso, cmd);
    device.bind_constant_buffer(ShaderStage::Vertex, &scene.constants, 0, cmd, 0);
    device.bind_resource(ShaderStage::Vertex, &scene.texture, 0, cmd, -1);
    device.bind_sampler(ShaderStage::Vertex, &scene.sampler, 0, cmd);
}

/// Native descriptor traffic: everything that rebinding unchanged state must not touch.
fn descriptor_traffic(stats: &NativeStats) -> Vec<u64> {
    vec![
        stats.descriptor_write_calls,
        stats.descriptors_written,
        stats.descriptor_copy_calls,
        stats.descriptor_sets_allocated,
        stats.template_updates,
        stats.command_count("set_shader_resources"),
        stats.command_count("set_constant_buffers"),
        stats.command_count("set_samplers"),
        stats.command_count("set_descriptor_table"),
        stats.command_count("bind_descriptor_sets"),
    ]
}

fn total_commands(stats: &NativeStats) -> u64 {
    stats.commands.values().sum()
}

#[test]
fn test_rebinding_unchanged_state_records_only_the_draw() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (soft, device) = device(backend);
        let scene = scene(&device);
        let cmd = device.begin_command_list();
        bind_scene(&device, &scene, cmd);
        device.draw(3, 0, cmd);
        let first = soft.stats();

        // --- ACT ---
        bind_scene(&device, &scene, cmd);
        device.draw(3, 0, cmd);
        let second = soft.stats();
        device.submit_command_lists();

        // --- ASSERT ---
        assert_eq!(
            descriptor_traffic(&first),
            descriptor_traffic(&second),
            "{:?} rewrote unchanged descriptors",
            backend
        );
        assert_eq!(total_commands(&second), total_commands(&first) + 1, "{:?}", backend);
        assert_eq!(second.command_count("draw"), 2, "{:?}", backend);
    }
}

#[test]
fn test_changed_binding_is_committed_before_the_next_draw() {
    for backend in BACKENDS {
        let (soft, device) = device(backend);
        let scene = scene(&device);
        let other = device
            .create_texture(
                &TextureDesc {
                    bind_flags: BindFlags::SHADER_RESOURCE,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let cmd = device.begin_command_list();
        bind_scene(&device, &scene, cmd);
        device.draw(3, 0, cmd);
        let first = soft.stats();

        device.bind_resource(ShaderStage::Vertex, &other, 0, cmd, -1);
        device.draw(3, 0, cmd);
        let second = soft.stats();
        device.submit_command_lists();

        assert_ne!(
            descriptor_traffic(&first),
            descriptor_traffic(&second),
            "{:?} did not commit the new texture",
            backend
        );
    }
}

#[test]
fn test_rebinding_the_same_pipeline_is_free() {
    for backend in BACKENDS {
        // --- ARRANGE ---
        let (soft, device) = device(backend);
        let scene = scene(&device);
        let cmd = device.begin_command_list();

        // --- ACT ---
        device.bind_pipeline_state(&scene.pso, cmd);
        device.draw(3, 0, cmd);
        device.bind_pipeline_state(&scene.pso, cmd);
        device.draw(3, 0, cmd);
        device.submit_command_lists();

        // --- ASSERT ---
        let stats = soft.stats();
        match backend {
            BackendKind::Dx11 => {
                assert_eq!(stats.pipelines_created, 0);
                assert_eq!(stats.command_count("set_blend_state"), 1);
                assert_eq!(stats.command_count("set_shader"), 5);
            }
            _ => {
                assert_eq!(stats.pipelines_created, 1, "{:?}", backend);
                assert_eq!(stats.command_count("bind_pipeline"), 1, "{:?}", backend);
            }
        }
    }
}

#[test]
fn test_equal_descriptions_share_one_native_pipeline() {
    // --- ARRANGE ---
    let (soft, device) = device(BackendKind::Dx12);
    let vs = device.create_shader(ShaderStage::Vertex, b"vs_main", None).unwrap();
    let desc = PipelineStateDesc {
        vs: Some(vs),
        ..Default::default()
    };
    let a = device.create_pipeline_state(&desc).unwrap();
    let b = device.create_pipeline_state(&desc).unwrap();

    // --- ACT ---
    let cmd = device.begin_command_list();
    device.bind_pipeline_state(&a, cmd);
    device.draw(3, 0, cmd);
    device.submit_command_lists();
    let cmd = device.begin_command_list();
    device.bind_pipeline_state(&b, cmd);
    device.draw(3, 0, cmd);
    device.submit_command_lists();

    // --- ASSERT ---
    assert_eq!(a.hash, b.hash);
    assert!(!a.same(&b));
    assert_eq!(soft.stats().pipelines_created, 1);
    assert_eq!(soft.stats().command_count("bind_pipeline"), 2);
}

#[test]
fn test_clearing_the_cache_recompiles() {
    let (soft, device) = device(BackendKind::Vulkan);
    let scene = scene(&device);

    for _ in 0..2 {
        let cmd = device.begin_command_list();
        device.bind_pipeline_state(&scene.pso, cmd);
        device.draw(3, 0, cmd);
        device.submit_command_lists();
        device.clear_pipeline_state_cache();
    }

    assert_eq!(soft.stats().pipelines_created, 2);
}

#[test]
fn test_bound_tables_are_committed_once_per_change() {
    for backend in [BackendKind::Dx12, BackendKind::Vulkan] {
        // --- ARRANGE ---
        let (soft, device) = device(backend);
        let scene = scene(&device);
        let layout = DescriptorTableLayout {
            resources: vec![DescriptorRange::new(BindingKind::ShaderResource, 0, 2)],
            samplers: vec![DescriptorRange::new(BindingKind::Sampler, 0, 1)],
            visibility: None,
        };
        let table = device.create_descriptor_table(&layout).unwrap();
        device
            .write_descriptor_table(
                &table,
                0,
                1,
                DescriptorWrite::Resource {
                    resource: &scene.texture,
                    subresource: -1,
                },
            )
            .unwrap();
        device
            .write_descriptor_table(&table, 1, 0, DescriptorWrite::Sampler(&scene.sampler))
            .unwrap();
        let vs = device
            .create_shader(ShaderStage::Vertex, b"vs_table", Some(&[]))
            .unwrap();
        let pso = device
            .create_pipeline_state(&PipelineStateDesc {
                vs: Some(vs),
                root_layout: Some(RootLayoutDesc {
                    bindings: Some(BindingLayout::default()),
                    tables: vec![layout],
                }),
                ..Default::default()
            })
            .unwrap();
        let before = soft.stats();

        // --- ACT ---
        let cmd = device.begin_command_list();
        device.bind_pipeline_state(&pso, cmd);
        device.bind_descriptor_table(BindPoint::Graphics, 0, &table, cmd);
        device.draw(3, 0, cmd);
        let first = soft.stats();
        device.draw(3, 0, cmd);
        device.submit_command_lists();
        let second = soft.stats();

        // --- ASSERT ---
        match backend {
            BackendKind::Dx12 => {
                // One range copy per heap kind, no per-descriptor writes.
                assert_eq!(first.descriptor_copy_calls - before.descriptor_copy_calls, 2);
                assert_eq!(first.descriptors_written, before.descriptors_written);
                assert_eq!(
                    first.command_count("set_descriptor_table")
                        - before.command_count("set_descriptor_table"),
                    2
                );
            }
            _ => {
                assert_eq!(first.template_updates - before.template_updates, 1);
                assert_eq!(first.descriptor_sets_allocated - before.descriptor_sets_allocated, 1);
                assert_eq!(
                    first.command_count("bind_descriptor_sets")
                        - before.command_count("bind_descriptor_sets"),
                    1
                );
            }
        }
        assert_eq!(second.descriptor_copy_calls, first.descriptor_copy_calls, "{:?}", backend);
        assert_eq!(second.template_updates, first.template_updates, "{:?}", backend);
        assert_eq!(second.command_count("draw"), first.command_count("draw") + 1);
    }
}
