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

//! `DXGI_FORMAT` values shared by the flat-slot and descriptor-heap backends.

use rhi_core::api::Format;

macro_rules! dxgi_formats {
    ($($format:ident => $value:literal,)*) => {
        pub(crate) fn to_dxgi(format: Format) -> u32 {
            match format {
                Format::Unknown => 0,
                $(Format::$format => $value,)*
            }
        }

        pub(crate) fn from_dxgi(value: u32) -> Option<Format> {
            match value {
                0 => Some(Format::Unknown),
                $($value => Some(Format::$format),)*
                _ => None,
            }
        }
    };
}

dxgi_formats! {
    R32G32B32A32Float => 2,
    R32G32B32A32Uint => 3,
    R32G32B32A32Sint => 4,
    R32G32B32Float => 6,
    R32G32B32Uint => 7,
    R32G32B32Sint => 8,
    R16G16B16A16Float => 10,
    R16G16B16A16Unorm => 11,
    R16G16B16A16Uint => 12,
    R16G16B16A16Snorm => 13,
    R16G16B16A16Sint => 14,
    R32G32Float => 16,
    R32G32Uint => 17,
    R32G32Sint => 18,
    R32G8X24Typeless => 19,
    D32FloatS8X24Uint => 20,
    R10G10B10A2Unorm => 24,
    R10G10B10A2Uint => 25,
    R11G11B10Float => 26,
    R8G8B8A8Unorm => 28,
    R8G8B8A8UnormSrgb => 29,
    R8G8B8A8Uint => 30,
    R8G8B8A8Snorm => 31,
    R8G8B8A8Sint => 32,
    R16G16Float => 34,
    R16G16Unorm => 35,
    R16G16Uint => 36,
    R16G16Snorm => 37,
    R16G16Sint => 38,
    R32Typeless => 39,
    D32Float => 40,
    R32Float => 41,
    R32Uint => 42,
    R32Sint => 43,
    R24G8Typeless => 44,
    D24UnormS8Uint => 45,
    R8G8Unorm => 49,
    R8G8Uint => 50,
    R8G8Snorm => 51,
    R8G8Sint => 52,
    R16Typeless => 53,
    R16Float => 54,
    D16Unorm => 55,
    R16Unorm => 56,
    R16Uint => 57,
    R16Snorm => 58,
    R16Sint => 59,
    R8Unorm => 61,
    R8Uint => 62,
    R8Snorm => 63,
    R8Sint => 64,
    R9G9B9E5SharedExp => 67,
    Bc1Unorm => 71,
    Bc1UnormSrgb => 72,
    Bc2Unorm => 74,
    Bc2UnormSrgb => 75,
    Bc3Unorm => 77,
    Bc3UnormSrgb => 78,
    Bc4Unorm => 80,
    Bc4Snorm => 81,
    Bc5Unorm => 83,
    Bc5Snorm => 84,
    B8G8R8A8Unorm => 87,
    B8G8R8A8UnormSrgb => 91,
    Bc6hUf16 => 95,
    Bc6hSf16 => 96,
    Bc7Unorm => 98,
    Bc7UnormSrgb => 99,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_format_round_trips() {
        for &format in Format::ALL {
            let value = to_dxgi(format);
            assert_ne!(value, 0, "{:?} has no DXGI value", format);
            assert_eq!(from_dxgi(value), Some(format));
        }
    }

    #[test]
    fn test_unknown_values() {
        assert_eq!(to_dxgi(Format::Unknown), 0);
        assert_eq!(from_dxgi(0), Some(Format::Unknown));
        assert_eq!(from_dxgi(1), None);
        assert_eq!(from_dxgi(5000), None);
    }
}
