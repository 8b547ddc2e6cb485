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

//! Texture formats and storage size computation.

use serde::{Deserialize, Serialize};

/// Pixel formats understood by the core.
///
/// Compressed formats come first, then `Unknown`, then uncompressed color formats,
/// then `UnknownDepth` and the depth/stencil formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum TextureFormat {
    /// DXT1 / BC1.
    BC1,
    /// DXT3 / BC2.
    BC2,
    /// DXT5 / BC3.
    BC3,
    /// BC4 single channel.
    BC4,
    /// BC5 two channels.
    BC5,
    /// BC6H HDR.
    BC6H,
    /// BC7.
    BC7,
    /// ETC1 RGB8.
    ETC1,
    /// ETC2 RGB8.
    ETC2,
    /// ETC2 RGBA8.
    ETC2A,
    /// ASTC 4x4.
    ASTC4x4,
    /// Compressed format marker.
    Unknown,
    /// 8-bit alpha.
    A8,
    /// 8-bit red.
    R8,
    /// 16-bit red.
    R16,
    /// 16-bit float red.
    R16F,
    /// 32-bit unsigned red.
    R32U,
    /// 32-bit float red.
    R32F,
    /// 8-bit red-green.
    RG8,
    /// 16-bit red-green.
    RG16,
    /// 16-bit float red-green.
    RG16F,
    /// 32-bit float red-green.
    RG32F,
    /// 8-bit BGRA.
    #[default]
    BGRA8,
    /// 8-bit RGBA.
    RGBA8,
    /// 16-bit RGBA.
    RGBA16,
    /// 16-bit float RGBA.
    RGBA16F,
    /// 32-bit float RGBA.
    RGBA32F,
    /// Packed 5-6-5.
    R5G6B5,
    /// Packed 4-4-4-4.
    RGBA4,
    /// Packed 10-10-10-2.
    RGB10A2,
    /// Packed 11-11-10 float.
    RG11B10F,
    /// Depth format marker.
    UnknownDepth,
    /// 16-bit depth.
    D16,
    /// 24-bit depth.
    D24,
    /// 24-bit depth, 8-bit stencil.
    D24S8,
    /// 32-bit depth.
    D32,
    /// 32-bit float depth.
    D32F,
    /// Stencil only.
    D0S8,
}

/// Block description of a format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockInfo {
    /// Bits per pixel.
    pub bits_per_pixel: u8,
    /// Block width in pixels.
    pub block_width: u8,
    /// Block height in pixels.
    pub block_height: u8,
    /// Block size in bytes.
    pub block_size: u8,
    /// Minimum number of blocks along X.
    pub min_block_x: u8,
    /// Minimum number of blocks along Y.
    pub min_block_y: u8,
    /// Depth bits.
    pub depth_bits: u8,
    /// Stencil bits.
    pub stencil_bits: u8,
}

const fn block(bpp: u8, bw: u8, bh: u8, size: u8, min_x: u8, min_y: u8) -> BlockInfo {
    BlockInfo {
        bits_per_pixel: bpp,
        block_width: bw,
        block_height: bh,
        block_size: size,
        min_block_x: min_x,
        min_block_y: min_y,
        depth_bits: 0,
        stencil_bits: 0,
    }
}

const fn pixel(bpp: u8) -> BlockInfo {
    block(bpp, 1, 1, bpp / 8, 1, 1)
}

const fn depth(bpp: u8, depth_bits: u8, stencil_bits: u8) -> BlockInfo {
    BlockInfo {
        depth_bits,
        stencil_bits,
        ..pixel(bpp)
    }
}

impl TextureFormat {
    /// Every format in discriminant order.
    pub const ALL: [TextureFormat; 38] = {
        use TextureFormat::*;
        [
            BC1, BC2, BC3, BC4, BC5, BC6H, BC7, ETC1, ETC2, ETC2A, ASTC4x4, Unknown, A8, R8, R16, R16F,
            R32U, R32F, RG8, RG16, RG16F, RG32F, BGRA8, RGBA8, RGBA16, RGBA16F, RGBA32F, R5G6B5, RGBA4,
            RGB10A2, RG11B10F, UnknownDepth, D16, D24, D24S8, D32, D32F, D0S8,
        ]
    };

    /// Format from its raw value, as stored in command payloads.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// Block layout of this format.
    pub const fn block_info(self) -> BlockInfo {
        use TextureFormat::*;
        match self {
            BC1 => block(4, 4, 4, 8, 1, 1),
            BC2 | BC3 | BC5 | BC6H | BC7 => block(8, 4, 4, 16, 1, 1),
            BC4 => block(4, 4, 4, 8, 1, 1),
            ETC1 | ETC2 => block(4, 4, 4, 8, 1, 1),
            ETC2A => block(8, 4, 4, 16, 1, 1),
            ASTC4x4 => block(8, 4, 4, 16, 1, 1),
            Unknown | UnknownDepth => block(0, 0, 0, 0, 0, 0),
            A8 | R8 => pixel(8),
            R16 | R16F | RG8 | R5G6B5 | RGBA4 => pixel(16),
            R32U | R32F | RG16 | RG16F | BGRA8 | RGBA8 | RGB10A2 | RG11B10F => pixel(32),
            RG32F | RGBA16 | RGBA16F => pixel(64),
            RGBA32F => pixel(128),
            D16 => depth(16, 16, 0),
            D24 => depth(32, 24, 0),
            D24S8 => depth(32, 24, 8),
            D32 | D32F => depth(32, 32, 0),
            D0S8 => depth(8, 0, 8),
        }
    }

    /// `true` for block-compressed formats.
    pub fn is_compressed(self) -> bool {
        self < TextureFormat::Unknown
    }

    /// `true` for depth and stencil formats.
    pub fn is_depth(self) -> bool {
        self > TextureFormat::UnknownDepth
    }

    /// `true` for the `Unknown`/`UnknownDepth` markers.
    pub fn is_marker(self) -> bool {
        matches!(self, TextureFormat::Unknown | TextureFormat::UnknownDepth)
    }

    /// Human readable name.
    pub fn name(self) -> String {
        format!("{self:?}")
    }
}

/// Size of one mip level, in bytes.
pub fn mip_size(format: TextureFormat, width: u32, height: u32, depth: u32) -> u32 {
    let info = format.block_info();
    if info.block_width == 0 {
        return 0;
    }
    let bw = info.block_width as u32;
    let bh = info.block_height as u32;
    let blocks_x = width.div_ceil(bw).max(info.min_block_x as u32);
    let blocks_y = height.div_ceil(bh).max(info.min_block_y as u32);
    let row = blocks_x * bw * info.bits_per_pixel as u32 / 8;
    row * blocks_y * bh * depth.max(1)
}

/// Number of mips of a full chain for the given size.
pub fn mip_count(width: u32, height: u32, depth: u32) -> u8 {
    let max = width.max(height).max(depth).max(1);
    (32 - max.leading_zeros()) as u8
}

/// Storage needed by a texture with every mip, layer and cube face.
pub fn texture_size(
    format: TextureFormat,
    width: u32,
    height: u32,
    depth: u32,
    cube_map: bool,
    num_mips: u8,
    num_layers: u16,
) -> u32 {
    let sides = if cube_map { 6 } else { 1 };
    let mut total = 0u32;
    let (mut w, mut h, mut d) = (width.max(1), height.max(1), depth.max(1));
    for _ in 0..num_mips.max(1) {
        total = total.saturating_add(mip_size(format, w, h, d));
        w = (w / 2).max(1);
        h = (h / 2).max(1);
        d = (d / 2).max(1);
    }
    total
        .saturating_mul(sides)
        .saturating_mul(num_layers.max(1) as u32)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn raw_values_map_back_to_formats() {
        for format in TextureFormat::ALL {
            assert_eq!(TextureFormat::from_u8(format as u8), Some(format));
        }
        assert_eq!(TextureFormat::from_u8(200), None);
    }

    #[test]
    fn uncompressed_sizes_follow_bits_per_pixel() {
        assert_eq!(mip_size(TextureFormat::RGBA8, 4, 4, 1), 64);
        assert_eq!(mip_size(TextureFormat::R8, 3, 3, 1), 9);
        assert_eq!(mip_size(TextureFormat::RGBA32F, 2, 2, 2), 128);
    }

    #[test]
    fn compressed_sizes_round_to_blocks() {
        assert_eq!(mip_size(TextureFormat::BC1, 1, 1, 1), 8, "one block minimum");
        assert_eq!(mip_size(TextureFormat::BC3, 8, 8, 1), 64);
    }

    #[test]
    fn full_chain_and_cube_multiply() {
        assert_eq!(mip_count(256, 128, 1), 9);
        let flat = texture_size(TextureFormat::RGBA8, 4, 4, 1, false, 3, 1);
        assert_eq!(flat, 64 + 16 + 4);
        let cube = texture_size(TextureFormat::RGBA8, 4, 4, 1, true, 3, 2);
        assert_eq!(cube, flat * 6 * 2);
    }

    #[test]
    fn depth_formats_are_classified() {
        assert!(TextureFormat::D24S8.is_depth());
        assert_eq!(TextureFormat::D24S8.block_info().stencil_bits, 8);
        assert!(!TextureFormat::RGBA8.is_depth());
        assert!(TextureFormat::BC7.is_compressed());
        assert!(!TextureFormat::RGBA8.is_compressed());
    }
}
