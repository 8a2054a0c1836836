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

use rhi_core::{BackendKind, ConfigError, DeviceSettings, Format};
use std::io::Write;

#[test]
fn test_settings_load_from_file() {
    // ARRANGE
    let mut file = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        file,
        r#"(
            backend: Dx11,
            backbuffer_count: 3,
            width: 640,
            height: 480,
            backbuffer_format: R8G8B8A8Unorm,
            transient_buffer_size: 65536,
        )"#
    )
    .unwrap();

    // ACT
    let settings = DeviceSettings::from_file(file.path()).unwrap();

    // ASSERT
    assert_eq!(settings.backend, BackendKind::Dx11);
    assert_eq!(settings.backbuffer_count, 3);
    assert_eq!((settings.width, settings.height), (640, 480));
    assert_eq!(settings.backbuffer_format, Format::R8G8B8A8Unorm);
    assert_eq!(settings.transient_buffer_size, 65536);
    assert!(settings.vsync, "unlisted fields keep their defaults");
}

#[test]
fn test_missing_file_reports_path() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.ron");

    let err = DeviceSettings::from_file(&path).unwrap_err();

    match err {
        ConfigError::Io { path: reported, .. } => assert!(reported.ends_with("absent.ron")),
        other => panic!("expected an I/O error, got {other:?}"),
    }
}

#[test]
fn test_saved_settings_reload() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("device.ron");
    let settings = DeviceSettings {
        backend: BackendKind::Vulkan,
        clear_color: [0.25, 0.5, 0.75, 1.0],
        ..Default::default()
    };

    std::fs::write(&path, settings.to_ron_string().unwrap()).unwrap();

    assert_eq!(DeviceSettings::from_file(&path).unwrap(), settings);
}
