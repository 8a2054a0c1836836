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

//! Device creation settings.

use serde::{Deserialize, Serialize};
use std::path::Path;

use super::{BackendKind, Format};
use crate::error::ConfigError;

/// Largest shader-visible resource descriptor heap a device may request.
pub const MAX_RESOURCE_HEAP_CAPACITY: u32 = 1_000_000;
/// Largest shader-visible sampler descriptor heap a device may request.
pub const MAX_SAMPLER_HEAP_CAPACITY: u32 = 2048;

/// Everything needed to create a device, loadable from RON.
///
/// Missing fields take their default values, so a settings file only needs to
/// name what it changes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DeviceSettings {
    /// Which backend family to drive.
    pub backend: BackendKind,
    /// Swapchain images, and the number of frames allowed in flight (2 or 3).
    pub backbuffer_count: u32,
    /// Back buffer width in pixels.
    pub width: u32,
    /// Back buffer height in pixels.
    pub height: u32,
    /// Exclusive fullscreen.
    pub fullscreen: bool,
    /// Present on vertical blank.
    pub vsync: bool,
    /// Ask the native API for validation.
    pub debug_layer: bool,
    /// Back buffer format.
    pub backbuffer_format: Format,
    /// Initial size of each per-frame transient buffer, in bytes.
    pub transient_buffer_size: u64,
    /// Initial shader-visible resource heap capacity, in descriptors.
    pub resource_heap_capacity: u32,
    /// Initial shader-visible sampler heap capacity, in descriptors.
    pub sampler_heap_capacity: u32,
    /// Initial descriptor pool size, in sets.
    pub descriptor_pool_sets: u32,
    /// Clear color of the back buffer.
    pub clear_color: [f32; 4],
}

impl Default for DeviceSettings {
    fn default() -> Self {
        Self {
            backend: BackendKind::Dx12,
            backbuffer_count: 2,
            width: 1280,
            height: 720,
            fullscreen: false,
            vsync: true,
            debug_layer: false,
            backbuffer_format: Format::R10G10B10A2Unorm,
            transient_buffer_size: 4 * 1024 * 1024,
            resource_heap_capacity: 4096,
            sampler_heap_capacity: 256,
            descriptor_pool_sets: 256,
            clear_color: [0.0, 0.0, 0.0, 1.0],
        }
    }
}

impl DeviceSettings {
    /// Parses settings from RON text and validates them.
    pub fn from_ron_str(text: &str) -> Result<Self, ConfigError> {
        let settings: DeviceSettings =
            ron::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }

    /// Reads and validates settings from a RON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let settings = Self::from_ron_str(&text)?;
        log::debug!("Loaded {:?} device settings from {}", settings.backend, path.display());
        Ok(settings)
    }

    /// Serializes the settings to pretty RON.
    pub fn to_ron_string(&self) -> Result<String, ConfigError> {
        let pretty = ron::ser::PrettyConfig::default().indentor("  ".to_string());
        ron::ser::to_string_pretty(self, pretty).map_err(|e| ConfigError::Parse(e.to_string()))
    }

    /// Checks every field against its accepted range.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(2..=3).contains(&self.backbuffer_count) {
            return Err(ConfigError::Invalid {
                field: "backbuffer_count",
                reason: format!("{} is not 2 or 3", self.backbuffer_count),
            });
        }
        if self.width == 0 || self.height == 0 {
            return Err(ConfigError::Invalid {
                field: "width",
                reason: format!("{}x{} has a zero extent", self.width, self.height),
            });
        }
        if self.backbuffer_format == Format::Unknown || self.backbuffer_format.is_depth() {
            return Err(ConfigError::Invalid {
                field: "backbuffer_format",
                reason: format!("{:?} is not a color format", self.backbuffer_format),
            });
        }
        if self.transient_buffer_size == 0 {
            return Err(ConfigError::Invalid {
                field: "transient_buffer_size",
                reason: "must be non-zero".into(),
            });
        }
        if self.resource_heap_capacity == 0 || self.resource_heap_capacity > MAX_RESOURCE_HEAP_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "resource_heap_capacity",
                reason: format!("must be in 1..={MAX_RESOURCE_HEAP_CAPACITY}"),
            });
        }
        if self.sampler_heap_capacity == 0 || self.sampler_heap_capacity > MAX_SAMPLER_HEAP_CAPACITY {
            return Err(ConfigError::Invalid {
                field: "sampler_heap_capacity",
                reason: format!("must be in 1..={MAX_SAMPLER_HEAP_CAPACITY}"),
            });
        }
        if self.descriptor_pool_sets == 0 {
            return Err(ConfigError::Invalid {
                field: "descriptor_pool_sets",
                reason: "must be non-zero".into(),
            });
        }
        Ok(())
    }

    /// Frames the CPU may record ahead of the GPU.
    pub fn frames_in_flight(&self) -> u32 {
        self.backbuffer_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let settings = DeviceSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.transient_buffer_size, 4 * 1024 * 1024);
        assert_eq!(settings.frames_in_flight(), 2);
    }

    #[test]
    fn test_partial_ron_uses_defaults() {
        let settings = DeviceSettings::from_ron_str("(backend: Vulkan, backbuffer_count: 3)").unwrap();
        assert_eq!(settings.backend, BackendKind::Vulkan);
        assert_eq!(settings.backbuffer_count, 3);
        assert_eq!(settings.width, 1280);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = DeviceSettings::from_ron_str("(backbuffer_count: 5)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "backbuffer_count", .. }));

        let err = DeviceSettings::from_ron_str("(sampler_heap_capacity: 5000)").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "sampler_heap_capacity", .. }));

        let err = DeviceSettings::from_ron_str("(width: \"wide\")").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_ron_round_trip() {
        let settings = DeviceSettings {
            backend: BackendKind::Dx11,
            vsync: false,
            ..Default::default()
        };
        let text = settings.to_ron_string().unwrap();
        assert_eq!(DeviceSettings::from_ron_str(&text).unwrap(), settings);
    }
}
