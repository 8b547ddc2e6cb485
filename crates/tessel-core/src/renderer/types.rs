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

//! Plain enums and descriptors shared by the API and render sides.

use super::flags::{CapsFlags, FormatCaps};
use super::format::TextureFormat;
use crate::handle::HandleKind;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Rendering backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum RendererType {
    /// Accepts everything, draws nothing.
    Noop,
    /// In-memory reference backend.
    Headless,
    /// Direct3D 11.
    Direct3D11,
    /// Direct3D 12.
    Direct3D12,
    /// Metal.
    Metal,
    /// OpenGL ES.
    OpenGLES,
    /// OpenGL.
    OpenGL,
    /// Vulkan.
    Vulkan,
    /// Auto-select.
    #[default]
    Count,
}

impl RendererType {
    /// Human readable backend name.
    pub const fn name(self) -> &'static str {
        match self {
            RendererType::Noop => "Noop",
            RendererType::Headless => "Headless",
            RendererType::Direct3D11 => "Direct3D 11",
            RendererType::Direct3D12 => "Direct3D 12",
            RendererType::Metal => "Metal",
            RendererType::OpenGLES => "OpenGL ES",
            RendererType::OpenGL => "OpenGL",
            RendererType::Vulkan => "Vulkan",
            RendererType::Count => "Auto",
        }
    }
}

impl fmt::Display for RendererType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// How the draws of a view are ordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum ViewMode {
    /// Group by program, then depth.
    #[default]
    Default,
    /// Submission order.
    Sequential,
    /// Front to back.
    DepthAscending,
    /// Back to front.
    DepthDescending,
}

/// Type of a uniform value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum UniformType {
    /// Texture stage index.
    Sampler = 0,
    /// Terminates a uniform stream. Never created by users.
    End = 1,
    /// 4 floats.
    Vec4 = 2,
    /// 3x3 floats.
    Mat3 = 3,
    /// 4x4 floats.
    Mat4 = 4,
}

impl UniformType {
    /// Size in bytes of one element.
    pub const fn size(self) -> u32 {
        match self {
            UniformType::Sampler => 4,
            UniformType::End => 0,
            UniformType::Vec4 => 16,
            UniformType::Mat3 => 36,
            UniformType::Mat4 => 64,
        }
    }

    /// Decodes the 5-bit type field of a uniform opcode.
    pub const fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(UniformType::Sampler),
            1 => Some(UniformType::End),
            2 => Some(UniformType::Vec4),
            3 => Some(UniformType::Mat3),
            4 => Some(UniformType::Mat4),
            _ => None,
        }
    }
}

/// Access mode of a compute binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum Access {
    /// Read only.
    #[default]
    Read,
    /// Write only.
    Write,
    /// Read and write.
    ReadWrite,
}

/// Size of a texture relative to the backbuffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[repr(u8)]
pub enum BackbufferRatio {
    /// Same size.
    Equal,
    /// Half size.
    Half,
    /// Quarter size.
    Quarter,
    /// Eighth size.
    Eighth,
    /// Sixteenth size.
    Sixteenth,
    /// Double size.
    Double,
    /// Not relative to the backbuffer.
    #[default]
    Count,
}

impl BackbufferRatio {
    /// Derives texture dimensions and mip count from the backbuffer size.
    ///
    /// Returns `(width, height, num_mips)`; `num_mips` is the full chain if `has_mips`.
    pub fn texture_size(self, bb_width: u32, bb_height: u32, has_mips: bool) -> (u16, u16, u8) {
        let (w, h) = match self {
            BackbufferRatio::Equal | BackbufferRatio::Count => (bb_width, bb_height),
            BackbufferRatio::Half => (bb_width / 2, bb_height / 2),
            BackbufferRatio::Quarter => (bb_width / 4, bb_height / 4),
            BackbufferRatio::Eighth => (bb_width / 8, bb_height / 8),
            BackbufferRatio::Sixteenth => (bb_width / 16, bb_height / 16),
            BackbufferRatio::Double => (bb_width * 2, bb_height * 2),
        };
        let w = w.clamp(1, u16::MAX as u32);
        let h = h.clamp(1, u16::MAX as u32);
        let mips = if has_mips {
            super::format::mip_count(w, h, 1)
        } else {
            1
        };
        (w as u16, h as u16, mips)
    }
}

/// Native window handle kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum NativeWindowHandleType {
    /// Platform default.
    #[default]
    Default,
    /// Wayland surface.
    Wayland,
}

/// Occlusion query outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OcclusionQueryResult {
    /// Nothing passed the depth test.
    Invisible,
    /// At least one sample passed.
    Visible(u32),
    /// Not available yet.
    NoResult,
}

impl OcclusionQueryResult {
    /// Interprets a raw result value.
    pub const fn from_raw(value: i32) -> Self {
        if value == crate::limits::OCCLUSION_NO_RESULT {
            OcclusionQueryResult::NoResult
        } else if value <= 0 {
            OcclusionQueryResult::Invisible
        } else {
            OcclusionQueryResult::Visible(value as u32)
        }
    }
}

/// Texture properties computed at creation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextureInfo {
    /// Format.
    pub format: TextureFormat,
    /// Total storage in bytes.
    pub storage_size: u32,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
    /// Depth.
    pub depth: u16,
    /// Number of layers.
    pub num_layers: u16,
    /// Number of mips.
    pub num_mips: u8,
    /// Bits per pixel.
    pub bits_per_pixel: u8,
    /// `true` for cube maps.
    pub cube_map: bool,
}

/// Limits reported by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapsLimits {
    /// Draw calls per frame.
    pub max_draw_calls: u32,
    /// Blits per frame.
    pub max_blits: u32,
    /// Largest texture side.
    pub max_texture_size: u32,
    /// Largest texture array.
    pub max_texture_layers: u32,
    /// Views.
    pub max_views: u32,
    /// Frame buffer attachments.
    pub max_fb_attachments: u32,
    /// Encoders.
    pub max_encoders: u32,
    /// Transient vertex buffer bytes.
    pub transient_vb_size: u32,
    /// Transient index buffer bytes.
    pub transient_ib_size: u32,
}

impl Default for CapsLimits {
    fn default() -> Self {
        use crate::limits::*;
        Self {
            max_draw_calls: MAX_DRAW_CALLS,
            max_blits: MAX_BLIT_ITEMS,
            max_texture_size: 16_384,
            max_texture_layers: 2048,
            max_views: MAX_VIEWS as u32,
            max_fb_attachments: MAX_FRAME_BUFFER_ATTACHMENTS as u32,
            max_encoders: MAX_ENCODERS as u32,
            transient_vb_size: TRANSIENT_VERTEX_BUFFER_SIZE,
            transient_ib_size: TRANSIENT_INDEX_BUFFER_SIZE,
        }
    }
}

/// Capabilities reported by the backend after initialization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Caps {
    /// Active backend.
    pub renderer_type: RendererType,
    /// Supported features.
    pub supported: CapsFlags,
    /// `true` if clip space depth is `[0, 1]`.
    pub homogeneous_depth: bool,
    /// `true` if texture origin is bottom-left.
    pub origin_bottom_left: bool,
    /// Limits.
    pub limits: CapsLimits,
    /// Support bits per format, indexed by `TextureFormat as usize`.
    pub formats: Vec<FormatCaps>,
}

impl Default for Caps {
    fn default() -> Self {
        Self {
            renderer_type: RendererType::Noop,
            supported: CapsFlags::EMPTY,
            homogeneous_depth: false,
            origin_bottom_left: false,
            limits: CapsLimits::default(),
            formats: vec![FormatCaps::EMPTY; TextureFormat::D0S8 as usize + 1],
        }
    }
}

impl Caps {
    /// Support bits of one format.
    pub fn format(&self, format: TextureFormat) -> FormatCaps {
        self.formats
            .get(format as usize)
            .copied()
            .unwrap_or(FormatCaps::EMPTY)
    }
}

/// Per-encoder counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct EncoderStats {
    /// Draws recorded.
    pub num_draws: u32,
    /// Dispatches recorded.
    pub num_computes: u32,
    /// Blits recorded.
    pub num_blits: u32,
    /// Draws dropped (empty, stale, or over capacity).
    pub num_dropped: u32,
}

/// Snapshot of the last completed frame.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Stats {
    /// Number of the submitted frame.
    pub frame_num: u32,
    /// Render items submitted.
    pub num_render_items: u32,
    /// Draws submitted.
    pub num_draws: u32,
    /// Dispatches submitted.
    pub num_computes: u32,
    /// Blits submitted.
    pub num_blits: u32,
    /// Draws dropped.
    pub num_dropped: u32,
    /// Per-encoder counters.
    pub encoders: Vec<EncoderStats>,
    /// Live handles per kind.
    pub live_handles: Vec<(HandleKind, u16)>,
    /// Transient vertex bytes used.
    pub transient_vb_used: u32,
    /// Transient index bytes used.
    pub transient_ib_used: u32,
    /// Backbuffer width.
    pub width: u32,
    /// Backbuffer height.
    pub height: u32,
    /// Debug text columns.
    pub text_width: u16,
    /// Debug text rows.
    pub text_height: u16,
    /// Time spent waiting for the render thread, in nanoseconds.
    pub wait_render_ns: u64,
    /// Time between the last two `frame()` calls, in nanoseconds.
    pub cpu_time_frame_ns: u64,
}

impl Stats {
    /// Live handle count of one kind.
    pub fn live(&self, kind: HandleKind) -> u16 {
        self.live_handles
            .iter()
            .find(|(k, _)| *k == kind)
            .map(|(_, n)| *n)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_sizes_match_layout() {
        assert_eq!(UniformType::Vec4.size(), 16);
        assert_eq!(UniformType::Mat3.size(), 36);
        assert_eq!(UniformType::Mat4.size(), 64);
        assert_eq!(UniformType::from_u8(4), Some(UniformType::Mat4));
        assert_eq!(UniformType::from_u8(9), None);
    }

    #[test]
    fn ratio_sizes_clamp_to_one() {
        assert_eq!(BackbufferRatio::Half.texture_size(1280, 720, false), (640, 360, 1));
        assert_eq!(BackbufferRatio::Sixteenth.texture_size(8, 8, false), (1, 1, 1));
        let (w, h, mips) = BackbufferRatio::Equal.texture_size(256, 128, true);
        assert_eq!((w, h, mips), (256, 128, 9));
    }

    #[test]
    fn occlusion_raw_values() {
        assert_eq!(OcclusionQueryResult::from_raw(i32::MIN), OcclusionQueryResult::NoResult);
        assert_eq!(OcclusionQueryResult::from_raw(0), OcclusionQueryResult::Invisible);
        assert_eq!(OcclusionQueryResult::from_raw(12), OcclusionQueryResult::Visible(12));
    }
}
