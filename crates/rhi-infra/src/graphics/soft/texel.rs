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

//! Encoding of clear values into texel bytes.

use half::f16;
use rhi_core::api::Format;

fn unorm8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

fn snorm8(v: f32) -> u8 {
    ((v.clamp(-1.0, 1.0) * 127.0).round() as i8) as u8
}

fn unorm16(v: f32) -> [u8; 2] {
    ((v.clamp(0.0, 1.0) * 65535.0).round() as u16).to_le_bytes()
}

fn snorm16(v: f32) -> [u8; 2] {
    ((v.clamp(-1.0, 1.0) * 32767.0).round() as i16).to_le_bytes()
}

fn linear_to_srgb(v: f32) -> f32 {
    let v = v.clamp(0.0, 1.0);
    if v <= 0.003_130_8 {
        v * 12.92
    } else {
        1.055 * v.powf(1.0 / 2.4) - 0.055
    }
}

// Packs the exponent and the top mantissa bits of a half float into an
// unsigned small float with `mantissa_bits` of mantissa.
fn small_float(v: f32, mantissa_bits: u32) -> u32 {
    let bits = f16::from_f32(v.max(0.0)).to_bits() as u32;
    (bits & 0x7fff) >> (10 - mantissa_bits)
}

/// The bytes of one texel of `format` holding `color`, or `None` for formats
/// that cannot be cleared texel-by-texel.
pub(crate) fn encode_color(format: Format, color: [f32; 4]) -> Option<Vec<u8>> {
    use Format::*;
    let [r, g, b, a] = color;
    let bytes = match format {
        R32G32B32A32Float => color.iter().flat_map(|c| c.to_le_bytes()).collect(),
        R32G32B32A32Uint => color.iter().flat_map(|c| (*c as u32).to_le_bytes()).collect(),
        R32G32B32A32Sint => color.iter().flat_map(|c| (*c as i32).to_le_bytes()).collect(),
        R32G32B32Float => color[..3].iter().flat_map(|c| c.to_le_bytes()).collect(),
        R32G32B32Uint => color[..3].iter().flat_map(|c| (*c as u32).to_le_bytes()).collect(),
        R32G32B32Sint => color[..3].iter().flat_map(|c| (*c as i32).to_le_bytes()).collect(),
        R16G16B16A16Float => color
            .iter()
            .flat_map(|c| f16::from_f32(*c).to_le_bytes())
            .collect(),
        R16G16B16A16Unorm => color.iter().flat_map(|c| unorm16(*c)).collect(),
        R16G16B16A16Snorm => color.iter().flat_map(|c| snorm16(*c)).collect(),
        R16G16B16A16Uint => color.iter().flat_map(|c| (*c as u16).to_le_bytes()).collect(),
        R16G16B16A16Sint => color.iter().flat_map(|c| (*c as i16).to_le_bytes()).collect(),
        R32G32Float => color[..2].iter().flat_map(|c| c.to_le_bytes()).collect(),
        R32G32Uint => color[..2].iter().flat_map(|c| (*c as u32).to_le_bytes()).collect(),
        R32G32Sint => color[..2].iter().flat_map(|c| (*c as i32).to_le_bytes()).collect(),
        R10G10B10A2Unorm => {
            let q = |v: f32, max: f32| (v.clamp(0.0, 1.0) * max).round() as u32;
            let packed = q(r, 1023.0) | q(g, 1023.0) << 10 | q(b, 1023.0) << 20 | q(a, 3.0) << 30;
            packed.to_le_bytes().to_vec()
        }
        R10G10B10A2Uint => {
            let packed = (r as u32 & 0x3ff)
                | (g as u32 & 0x3ff) << 10
                | (b as u32 & 0x3ff) << 20
                | (a as u32 & 0x3) << 30;
            packed.to_le_bytes().to_vec()
        }
        R11G11B10Float => {
            let packed = small_float(r, 6) | small_float(g, 6) << 11 | small_float(b, 5) << 22;
            packed.to_le_bytes().to_vec()
        }
        R8G8B8A8Unorm => color.iter().map(|c| unorm8(*c)).collect(),
        R8G8B8A8UnormSrgb => vec![
            unorm8(linear_to_srgb(r)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(b)),
            unorm8(a),
        ],
        R8G8B8A8Uint => color.iter().map(|c| *c as u8).collect(),
        R8G8B8A8Snorm => color.iter().map(|c| snorm8(*c)).collect(),
        R8G8B8A8Sint => color.iter().map(|c| (*c as i8) as u8).collect(),
        B8G8R8A8Unorm => vec![unorm8(b), unorm8(g), unorm8(r), unorm8(a)],
        B8G8R8A8UnormSrgb => vec![
            unorm8(linear_to_srgb(b)),
            unorm8(linear_to_srgb(g)),
            unorm8(linear_to_srgb(r)),
            unorm8(a),
        ],
        R16G16Float => color[..2]
            .iter()
            .flat_map(|c| f16::from_f32(*c).to_le_bytes())
            .collect(),
        R16G16Unorm => color[..2].iter().flat_map(|c| unorm16(*c)).collect(),
        R16G16Snorm => color[..2].iter().flat_map(|c| snorm16(*c)).collect(),
        R16G16Uint => color[..2].iter().flat_map(|c| (*c as u16).to_le_bytes()).collect(),
        R16G16Sint => color[..2].iter().flat_map(|c| (*c as i16).to_le_bytes()).collect(),
        R32Float => r.to_le_bytes().to_vec(),
        R32Uint => (r as u32).to_le_bytes().to_vec(),
        R32Sint => (r as i32).to_le_bytes().to_vec(),
        R8G8Unorm => vec![unorm8(r), unorm8(g)],
        R8G8Snorm => vec![snorm8(r), snorm8(g)],
        R8G8Uint => vec![r as u8, g as u8],
        R8G8Sint => vec![(r as i8) as u8, (g as i8) as u8],
        R16Float => f16::from_f32(r).to_le_bytes().to_vec(),
        R16Unorm => unorm16(r).to_vec(),
        R16Snorm => snorm16(r).to_vec(),
        R16Uint => (r as u16).to_le_bytes().to_vec(),
        R16Sint => (r as i16).to_le_bytes().to_vec(),
        R8Unorm => vec![unorm8(r)],
        R8Snorm => vec![snorm8(r)],
        R8Uint => vec![r as u8],
        R8Sint => vec![(r as i8) as u8],
        _ => return None,
    };
    Some(bytes)
}

/// The bytes of one texel of a depth format holding `depth` and `stencil`.
///
/// `None` components keep the bits of `previous`.
pub(crate) fn encode_depth_stencil(
    format: Format,
    depth: Option<f32>,
    stencil: Option<u8>,
    previous: &[u8],
) -> Option<Vec<u8>> {
    use Format::*;
    let mut texel = previous.to_vec();
    texel.resize(format.bytes_per_block() as usize, 0);
    match format.depth_view_format() {
        D32Float => {
            if let Some(d) = depth {
                texel.copy_from_slice(&d.to_le_bytes());
            }
        }
        D16Unorm => {
            if let Some(d) = depth {
                texel.copy_from_slice(&unorm16(d));
            }
        }
        D24UnormS8Uint => {
            let mut packed = u32::from_le_bytes([texel[0], texel[1], texel[2], texel[3]]);
            if let Some(d) = depth {
                let d = (d.clamp(0.0, 1.0) * 16_777_215.0).round() as u32;
                packed = (packed & 0xff00_0000) | d;
            }
            if let Some(s) = stencil {
                packed = (packed & 0x00ff_ffff) | (s as u32) << 24;
            }
            texel.copy_from_slice(&packed.to_le_bytes());
        }
        D32FloatS8X24Uint => {
            if let Some(d) = depth {
                texel[..4].copy_from_slice(&d.to_le_bytes());
            }
            if let Some(s) = stencil {
                texel[4..].copy_from_slice(&(s as u32).to_le_bytes());
            }
        }
        _ => return None,
    }
    Some(texel)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgba8_clear() {
        assert_eq!(
            encode_color(Format::R8G8B8A8Unorm, [1.0, 0.0, 0.0, 1.0]),
            Some(vec![255, 0, 0, 255])
        );
        assert_eq!(
            encode_color(Format::B8G8R8A8Unorm, [1.0, 0.0, 0.0, 1.0]),
            Some(vec![0, 0, 255, 255])
        );
    }

    #[test]
    fn test_texel_sizes_match_format() {
        for format in Format::ALL {
            if let Some(bytes) = encode_color(*format, [0.5; 4]) {
                assert_eq!(bytes.len() as u32, format.bytes_per_block(), "{format:?}");
            }
        }
    }

    #[test]
    fn test_half_clear() {
        let bytes = encode_color(Format::R16Float, [1.0, 0.0, 0.0, 0.0]).unwrap();
        assert_eq!(bytes, f16::ONE.to_le_bytes().to_vec());
    }

    #[test]
    fn test_depth_stencil_keeps_unselected_aspect() {
        let cleared = encode_depth_stencil(Format::D24UnormS8Uint, Some(1.0), Some(7), &[]).unwrap();
        let depth_only = encode_depth_stencil(Format::D24UnormS8Uint, Some(0.0), None, &cleared).unwrap();
        assert_eq!(depth_only[3], 7);
        assert_eq!(&depth_only[..3], &[0, 0, 0]);
        assert!(encode_depth_stencil(Format::R8Unorm, Some(1.0), None, &[]).is_none());
    }
}
