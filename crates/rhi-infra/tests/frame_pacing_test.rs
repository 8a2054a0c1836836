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

use std::sync::mpsc;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rhi_core::{BackendKind, BindFlags, DeviceSettings, GpuBufferDesc, GraphicsDevice};
use rhi_infra::{create_device, Device, ExecutionMode, SoftDevice};

fn device(backend: BackendKind, mode: ExecutionMode) -> (Arc<SoftDevice>, Device) {
    let _ = env_logger::builder().is_test(true).try_init();
    let soft = Arc::new(SoftDevice::with_mode(mode));
    let settings = DeviceSettings {
        backend,
        backbuffer_count: 2,
        width: 16,
        height: 16,
        ..Default::default()
    };
    let device = create_device(settings, soft.clone(), None).unwrap();
    (soft, device)
}

#[test]
fn test_released_buffer_outlives_the_frames_in_flight() {
    for backend in [BackendKind::Dx11, BackendKind::Dx12, BackendKind::Vulkan] {
        // --- ARRANGE ---
        let (soft, device) = device(backend, ExecutionMode::Immediate);
        let buffer = device
            .create_buffer(
                &GpuBufferDesc {
                    size: 64,
                    bind_flags: BindFlags::VERTEX_BUFFER,
                    ..Default::default()
                },
                None,
            )
            .unwrap();
        let live = soft.live_objects();
        let destroyed = soft.stats().objects_destroyed;

        // --- ACT ---
        drop(buffer);
        device.submit_command_lists();
        device.submit_command_lists();
        let after_two = soft.stats().objects_destroyed;
        device.submit_command_lists();
        let after_three = soft.stats().objects_destroyed;

        // --- ASSERT ---
        assert_eq!(after_two, destroyed, "{:?} destroyed too early", backend);
        assert_eq!(after_three, destroyed + 1, "{:?}", backend);
        assert_eq!(soft.live_objects(), live - 1, "{:?}", backend);
    }
}

#[test]
fn test_cpu_runs_at_most_two_frames_ahead() {
    // --- ARRANGE ---
    let (soft, device) = device(BackendKind::Vulkan, ExecutionMode::Manual);
    device.submit_command_lists();
    device.submit_command_lists();
    assert_eq!(soft.pending_submissions(), 2);
    let (tx, rx) = mpsc::channel();
    let shared = &device;

    thread::scope(|scope| {
        // --- ACT ---
        scope.spawn(move || {
            shared.submit_command_lists();
            tx.send(shared.frame_count()).unwrap();
        });

        // --- ASSERT ---
        assert!(rx.recv_timeout(Duration::from_millis(100)).is_err());
        assert!(soft.complete_next());
        assert_eq!(rx.recv_timeout(Duration::from_secs(5)), Ok(3));
    });

    soft.complete_all();
}

#[test]
fn test_frame_count_advances_per_submission() {
    let (soft, device) = device(BackendKind::Dx12, ExecutionMode::Immediate);

    for _ in 0..5 {
        let cmd = device.begin_command_list();
        device.event_begin("frame", cmd);
        device.event_end(cmd);
        device.submit_command_lists();
    }

    assert_eq!(device.frame_count(), 5);
    assert_eq!(soft.stats().command_count("begin_event"), 5);
    assert_eq!(soft.pending_submissions(), 0);
}

#[test]
fn test_command_buffers_are_reused_around_the_ring() {
    let (soft, device) = device(BackendKind::Vulkan, ExecutionMode::Immediate);
    for _ in 0..3 {
        device.begin_command_list();
        device.submit_command_lists();
    }
    let live = soft.live_objects();

    for _ in 0..6 {
        device.begin_command_list();
        device.submit_command_lists();
    }

    assert_eq!(soft.live_objects(), live);
}
