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

//! Flag sets carried by draws, buffers, textures and the backbuffer.
//!
//! The bit layouts are stable: they are written raw into command buffers and render
//! items and decoded on the render thread.

use crate::tessel_bitflags;

tessel_bitflags! {
    /// Fixed-function pipeline state of a draw.
    ///
    /// Multi-bit fields (depth test, blend, cull, primitive type, alpha reference,
    /// point size) are stored under their `*_MASK` with the matching `*_SHIFT`.
    pub struct StateFlags: u64 {
        /// Enable red channel writes.
        const WRITE_R = 0x0000_0000_0000_0001;
        /// Enable green channel writes.
        const WRITE_G = 0x0000_0000_0000_0002;
        /// Enable blue channel writes.
        const WRITE_B = 0x0000_0000_0000_0004;
        /// Enable alpha channel writes.
        const WRITE_A = 0x0000_0000_0000_0008;
        /// Enable depth writes.
        const WRITE_Z = 0x0000_0040_0000_0000;
        /// Red, green and blue writes.
        const WRITE_RGB = 0x0000_0000_0000_0007;
        /// Depth test: less.
        const DEPTH_TEST_LESS = 0x0000_0000_0000_0010;
        /// Depth test: less or equal.
        const DEPTH_TEST_LEQUAL = 0x0000_0000_0000_0020;
        /// Depth test: equal.
        const DEPTH_TEST_EQUAL = 0x0000_0000_0000_0030;
        /// Depth test: greater or equal.
        const DEPTH_TEST_GEQUAL = 0x0000_0000_0000_0040;
        /// Depth test: greater.
        const DEPTH_TEST_GREATER = 0x0000_0000_0000_0050;
        /// Depth test: not equal.
        const DEPTH_TEST_NOTEQUAL = 0x0000_0000_0000_0060;
        /// Depth test: never.
        const DEPTH_TEST_NEVER = 0x0000_0000_0000_0070;
        /// Depth test: always.
        const DEPTH_TEST_ALWAYS = 0x0000_0000_0000_0080;
        /// Blend function field.
        const BLEND_MASK = 0x0000_0000_0fff_f000;
        /// Blend equation field.
        const BLEND_EQUATION_MASK = 0x0000_0003_f000_0000;
        /// Independent blend state per render target.
        const BLEND_INDEPENDENT = 0x0000_0004_0000_0000;
        /// Alpha to coverage.
        const BLEND_ALPHA_TO_COVERAGE = 0x0000_0008_0000_0000;
        /// Cull clockwise triangles.
        const CULL_CW = 0x0000_0010_0000_0000;
        /// Cull counter-clockwise triangles.
        const CULL_CCW = 0x0000_0020_0000_0000;
        /// Front faces are counter-clockwise.
        const FRONT_CCW = 0x0000_0080_0000_0000;
        /// Alpha reference field.
        const ALPHA_REF_MASK = 0x0000_ff00_0000_0000;
        /// Triangle strip topology.
        const PT_TRISTRIP = 0x0001_0000_0000_0000;
        /// Line list topology.
        const PT_LINES = 0x0002_0000_0000_0000;
        /// Line strip topology.
        const PT_LINESTRIP = 0x0003_0000_0000_0000;
        /// Point list topology.
        const PT_POINTS = 0x0004_0000_0000_0000;
        /// Point size field.
        const POINT_SIZE_MASK = 0x00f0_0000_0000_0000;
        /// Multisample rasterization.
        const MSAA = 0x0100_0000_0000_0000;
        /// Line antialiasing.
        const LINEAA = 0x0200_0000_0000_0000;
        /// Conservative rasterization.
        const CONSERVATIVE_RASTER = 0x0400_0000_0000_0000;
    }
}

impl StateFlags {
    /// Depth test field.
    pub const DEPTH_TEST_MASK: u64 = 0x0000_0000_0000_00f0;
    /// Shift of the blend function field.
    pub const BLEND_SHIFT: u32 = 12;
    /// Shift of the blend equation field.
    pub const BLEND_EQUATION_SHIFT: u32 = 28;
    /// Shift of the alpha reference field.
    pub const ALPHA_REF_SHIFT: u32 = 40;
    /// Primitive type field.
    pub const PT_MASK: u64 = 0x0007_0000_0000_0000;
    /// Shift of the point size field.
    pub const POINT_SIZE_SHIFT: u32 = 52;
    /// Cull field.
    pub const CULL_MASK: u64 = 0x0000_0030_0000_0000;

    /// State used when nothing was set.
    pub const DEFAULT: Self = Self::from_bits_truncate(
        Self::WRITE_RGB.bits()
            | Self::WRITE_A.bits()
            | Self::WRITE_Z.bits()
            | Self::DEPTH_TEST_LESS.bits()
            | Self::CULL_CW.bits()
            | Self::MSAA.bits(),
    );

    /// Packs an alpha reference value.
    pub const fn alpha_ref(value: u8) -> Self {
        Self::from_bits_truncate((value as u64) << Self::ALPHA_REF_SHIFT)
    }

    /// Packs a point size.
    pub const fn point_size(value: u8) -> Self {
        Self::from_bits_truncate(((value as u64) << Self::POINT_SIZE_SHIFT) & 0x00f0_0000_0000_0000)
    }

    /// Separate blend function for color and alpha.
    pub const fn blend_func_separate(
        src_rgb: BlendFactor,
        dst_rgb: BlendFactor,
        src_a: BlendFactor,
        dst_a: BlendFactor,
    ) -> Self {
        let rgb = (src_rgb as u64) | ((dst_rgb as u64) << 4);
        let alpha = (src_a as u64) | ((dst_a as u64) << 4);
        Self::from_bits_truncate((rgb | (alpha << 8)) << Self::BLEND_SHIFT)
    }

    /// Same blend function for color and alpha.
    pub const fn blend_func(src: BlendFactor, dst: BlendFactor) -> Self {
        Self::blend_func_separate(src, dst, src, dst)
    }

    /// Classic `src * a + dst * (1 - a)` blending.
    pub const fn blend_alpha() -> Self {
        Self::blend_func(BlendFactor::SrcAlpha, BlendFactor::InvSrcAlpha)
    }

    /// Additive blending.
    pub const fn blend_add() -> Self {
        Self::blend_func(BlendFactor::One, BlendFactor::One)
    }

    /// Raw blend function field.
    pub const fn blend_bits(&self) -> u64 {
        (self.bits() & Self::BLEND_MASK.bits()) >> Self::BLEND_SHIFT
    }

    /// Raw alpha reference value.
    pub const fn alpha_ref_value(&self) -> u8 {
        ((self.bits() & Self::ALPHA_REF_MASK.bits()) >> Self::ALPHA_REF_SHIFT) as u8
    }

    /// Quantized 2-bit blend class used by draw sort keys.
    ///
    /// Opaque draws sort first (0), then alpha-tested (1), then blended (2), then
    /// blended with alpha test (3).
    pub const fn blend_class(&self) -> u8 {
        let blended = if self.blend_bits() != 0 { 2 } else { 0 };
        let alpha_tested = if self.alpha_ref_value() != 0 { 1 } else { 0 };
        blended | alpha_tested
    }
}

/// Blend factors packed by [`StateFlags::blend_func`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum BlendFactor {
    /// 0
    Zero = 1,
    /// 1
    One = 2,
    /// Source color.
    SrcColor = 3,
    /// 1 - source color.
    InvSrcColor = 4,
    /// Source alpha.
    SrcAlpha = 5,
    /// 1 - source alpha.
    InvSrcAlpha = 6,
    /// Destination alpha.
    DstAlpha = 7,
    /// 1 - destination alpha.
    InvDstAlpha = 8,
    /// Destination color.
    DstColor = 9,
    /// 1 - destination color.
    InvDstColor = 10,
    /// Saturated source alpha.
    SrcAlphaSat = 11,
    /// Blend factor.
    Factor = 12,
    /// 1 - blend factor.
    InvFactor = 13,
}

tessel_bitflags! {
    /// Stencil state, front and back packed by the encoder.
    pub struct StencilFlags: u32 {
        /// Reference value field.
        const FUNC_REF_MASK = 0x0000_00ff;
        /// Read mask field.
        const FUNC_RMASK_MASK = 0x0000_ff00;
        /// Test: less.
        const TEST_LESS = 0x0001_0000;
        /// Test: less or equal.
        const TEST_LEQUAL = 0x0002_0000;
        /// Test: equal.
        const TEST_EQUAL = 0x0003_0000;
        /// Test: greater or equal.
        const TEST_GEQUAL = 0x0004_0000;
        /// Test: greater.
        const TEST_GREATER = 0x0005_0000;
        /// Test: not equal.
        const TEST_NOTEQUAL = 0x0006_0000;
        /// Test: never.
        const TEST_NEVER = 0x0007_0000;
        /// Test: always.
        const TEST_ALWAYS = 0x0008_0000;
        /// Op on stencil fail: keep.
        const OP_FAIL_S_KEEP = 0x0010_0000;
        /// Op on stencil fail: replace.
        const OP_FAIL_S_REPLACE = 0x0030_0000;
        /// Op on depth fail: keep.
        const OP_FAIL_Z_KEEP = 0x0100_0000;
        /// Op on pass: keep.
        const OP_PASS_Z_KEEP = 0x1000_0000;
        /// Op on pass: replace.
        const OP_PASS_Z_REPLACE = 0x3000_0000;
    }
}

impl StencilFlags {
    /// "No stencil" marker; the encoder stores it for a disabled face.
    pub const NONE: Self = Self::EMPTY;
    /// Sentinel meaning "same as front" for the back face.
    pub const BACK_SAME_AS_FRONT: u32 = 0;
}

tessel_bitflags! {
    /// What a view clears before its first draw.
    pub struct ClearFlags: u16 {
        /// Clear color.
        const COLOR = 0x0001;
        /// Clear depth.
        const DEPTH = 0x0002;
        /// Clear stencil.
        const STENCIL = 0x0004;
        /// Discard color attachment 0 after rendering.
        const DISCARD_COLOR_0 = 0x0008;
        /// Discard color attachment 1 after rendering.
        const DISCARD_COLOR_1 = 0x0010;
        /// Discard depth after rendering.
        const DISCARD_DEPTH = 0x0800;
        /// Discard stencil after rendering.
        const DISCARD_STENCIL = 0x1000;
    }
}

tessel_bitflags! {
    /// Which parts of the encoder state are reset after a submit.
    pub struct DiscardFlags: u8 {
        /// Texture and buffer bindings.
        const BINDINGS = 0x01;
        /// Index buffer.
        const INDEX_BUFFER = 0x02;
        /// Instance data.
        const INSTANCE_DATA = 0x04;
        /// Pipeline state, stencil and uniforms.
        const STATE = 0x08;
        /// Transform.
        const TRANSFORM = 0x10;
        /// Vertex streams.
        const VERTEX_STREAMS = 0x20;
        /// Everything.
        const ALL = 0xff;
    }
}

tessel_bitflags! {
    /// Buffer creation flags.
    pub struct BufferFlags: u16 {
        /// Compute format field.
        const COMPUTE_FORMAT_MASK = 0x000f;
        /// Compute type field.
        const COMPUTE_TYPE_MASK = 0x0030;
        /// Readable from compute shaders.
        const COMPUTE_READ = 0x0100;
        /// Writable from compute shaders.
        const COMPUTE_WRITE = 0x0200;
        /// Holds indirect draw arguments.
        const DRAW_INDIRECT = 0x0400;
        /// Dynamic buffer may grow on update.
        const ALLOW_RESIZE = 0x0800;
        /// Indices are 32-bit.
        const INDEX32 = 0x1000;
        /// Readable and writable from compute shaders.
        const COMPUTE_READ_WRITE = 0x0300;
    }
}

tessel_bitflags! {
    /// Texture creation flags.
    pub struct TextureFlags: u64 {
        /// Texture is multisampled when sampled.
        const MSAA_SAMPLE = 0x0000_0008_0000_0000;
        /// Render target.
        const RT = 0x0000_0010_0000_0000;
        /// Render target field (write only and MSAA level).
        const RT_MASK = 0x0000_00f0_0000_0000;
        /// Render target that is never sampled.
        const RT_WRITE_ONLY = 0x0000_0080_0000_0000;
        /// Writable from compute shaders.
        const COMPUTE_WRITE = 0x0000_1000_0000_0000;
        /// sRGB sampling.
        const SRGB = 0x0000_2000_0000_0000;
        /// Destination of blits.
        const BLIT_DST = 0x0000_4000_0000_0000;
        /// Can be read back to the CPU.
        const READ_BACK = 0x0000_8000_0000_0000;
    }
}

tessel_bitflags! {
    /// Sampler state of a texture binding.
    pub struct SamplerFlags: u32 {
        /// Mirror addressing on U.
        const U_MIRROR = 0x0000_0001;
        /// Clamp addressing on U.
        const U_CLAMP = 0x0000_0002;
        /// Mirror addressing on V.
        const V_MIRROR = 0x0000_0004;
        /// Clamp addressing on V.
        const V_CLAMP = 0x0000_0008;
        /// Mirror addressing on W.
        const W_MIRROR = 0x0000_0010;
        /// Clamp addressing on W.
        const W_CLAMP = 0x0000_0020;
        /// Point minification.
        const MIN_POINT = 0x0000_0040;
        /// Anisotropic minification.
        const MIN_ANISOTROPIC = 0x0000_0080;
        /// Point magnification.
        const MAG_POINT = 0x0000_0100;
        /// Anisotropic magnification.
        const MAG_ANISOTROPIC = 0x0000_0200;
        /// Point mip filtering.
        const MIP_POINT = 0x0000_0400;
        /// Use the sampler state given at texture creation.
        const INTERNAL_DEFAULT = 0x1000_0000;
    }
}

tessel_bitflags! {
    /// Backbuffer reset flags.
    pub struct ResetFlags: u32 {
        /// Fullscreen.
        const FULLSCREEN = 0x0000_0001;
        /// 2x MSAA.
        const MSAA_X2 = 0x0000_0010;
        /// 4x MSAA.
        const MSAA_X4 = 0x0000_0020;
        /// 8x MSAA.
        const MSAA_X8 = 0x0000_0030;
        /// 16x MSAA.
        const MSAA_X16 = 0x0000_0040;
        /// MSAA field.
        const MSAA_MASK = 0x0000_0070;
        /// Wait for vertical sync.
        const VSYNC = 0x0000_0080;
        /// Maximum anisotropic filtering.
        const MAXANISOTROPY = 0x0000_0100;
        /// Frame capture.
        const CAPTURE = 0x0000_0200;
        /// Flush the backend after rendering.
        const FLUSH_AFTER_RENDER = 0x0000_2000;
        /// Flip after rendering instead of before waiting for the next frame.
        const FLIP_AFTER_RENDER = 0x0000_4000;
        /// sRGB backbuffer.
        const SRGB_BACKBUFFER = 0x0000_8000;
        /// HDR10 output.
        const HDR10 = 0x0001_0000;
        /// High DPI.
        const HIDPI = 0x0002_0000;
        /// Depth clamp.
        const DEPTH_CLAMP = 0x0004_0000;
        /// Suspend rendering.
        const SUSPEND = 0x0008_0000;
        /// Transparent backbuffer.
        const TRANSPARENT_BACKBUFFER = 0x0010_0000;
    }
}

tessel_bitflags! {
    /// Debug features.
    pub struct DebugFlags: u32 {
        /// Wireframe rendering.
        const WIREFRAME = 0x0000_0001;
        /// Skip draw calls at the backend ("infinitely fast hardware").
        const IFH = 0x0000_0002;
        /// Display statistics.
        const STATS = 0x0000_0004;
        /// Display debug text.
        const TEXT = 0x0000_0008;
        /// Profiler markers.
        const PROFILER = 0x0000_0010;
    }
}

tessel_bitflags! {
    /// Internal per-item submit flags.
    pub struct SubmitFlags: u8 {
        /// Left eye.
        const EYE_LEFT = 0x01;
        /// Right eye.
        const EYE_RIGHT = 0x02;
        /// The bound index buffer holds 32-bit indices.
        const INDEX32 = 0x40;
        /// Draw only if the occlusion query reports visible.
        const OCCLUSION_VISIBLE = 0x80;
    }
}

tessel_bitflags! {
    /// Features reported by the backend in [`Caps`](super::types::Caps).
    pub struct CapsFlags: u64 {
        /// Alpha to coverage.
        const ALPHA_TO_COVERAGE = 1 << 0;
        /// Independent blend per target.
        const BLEND_INDEPENDENT = 1 << 1;
        /// Compute shaders.
        const COMPUTE = 1 << 2;
        /// Conservative rasterization.
        const CONSERVATIVE_RASTER = 1 << 3;
        /// Indirect draws and dispatches.
        const DRAW_INDIRECT = 1 << 4;
        /// Fragment depth output.
        const FRAGMENT_DEPTH = 1 << 5;
        /// Hardware instancing.
        const INSTANCING = 1 << 6;
        /// 32-bit indices.
        const INDEX32 = 1 << 7;
        /// Occlusion queries.
        const OCCLUSION_QUERY = 1 << 8;
        /// Backend supports being driven from several threads.
        const RENDERER_MULTITHREADED = 1 << 9;
        /// Additional swap chains.
        const SWAP_CHAIN = 1 << 10;
        /// 2D texture arrays.
        const TEXTURE_2D_ARRAY = 1 << 11;
        /// 3D textures.
        const TEXTURE_3D = 1 << 12;
        /// Texture blits.
        const TEXTURE_BLIT = 1 << 13;
        /// Cube map arrays.
        const TEXTURE_CUBE_ARRAY = 1 << 14;
        /// Texture read back.
        const TEXTURE_READ_BACK = 1 << 15;
        /// Half float vertex attributes.
        const VERTEX_ATTRIB_HALF = 1 << 16;
        /// Packed 10-bit vertex attributes.
        const VERTEX_ATTRIB_UINT10 = 1 << 17;
        /// Image read/write from shaders.
        const IMAGE_RW = 1 << 18;
    }
}

tessel_bitflags! {
    /// Per-format support bits reported in [`Caps::formats`](super::types::Caps).
    pub struct FormatCaps: u32 {
        /// 2D sampling.
        const TEXTURE_2D = 1 << 0;
        /// 3D sampling.
        const TEXTURE_3D = 1 << 1;
        /// Cube sampling.
        const TEXTURE_CUBE = 1 << 2;
        /// Vertex attribute.
        const VERTEX = 1 << 3;
        /// Compute image.
        const IMAGE_RW = 1 << 4;
        /// Render target.
        const FRAMEBUFFER = 1 << 5;
        /// Multisampled render target.
        const FRAMEBUFFER_MSAA = 1 << 6;
        /// Mip generation.
        const MIP_AUTOGEN = 1 << 7;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_state_contains_depth_write_and_test() {
        let state = StateFlags::DEFAULT;
        assert!(state.contains(StateFlags::WRITE_Z));
        assert!(state.contains(StateFlags::DEPTH_TEST_LESS));
        assert_eq!(state.blend_class(), 0, "default state is opaque");
    }

    #[test]
    fn blend_class_orders_opaque_alpha_tested_blended() {
        let opaque = StateFlags::DEFAULT;
        let tested = StateFlags::DEFAULT | StateFlags::alpha_ref(128);
        let blended = StateFlags::DEFAULT | StateFlags::blend_alpha();
        let both = blended | StateFlags::alpha_ref(1);

        assert_eq!(opaque.blend_class(), 0);
        assert_eq!(tested.blend_class(), 1);
        assert_eq!(blended.blend_class(), 2);
        assert_eq!(both.blend_class(), 3);
    }

    #[test]
    fn blend_func_packs_factors_into_blend_field() {
        let state = StateFlags::blend_func(BlendFactor::One, BlendFactor::Zero);
        assert_eq!(state.blend_bits(), 0x1212);
        assert_eq!(state.bits() & !StateFlags::BLEND_MASK.bits(), 0);
    }

    #[test]
    fn discard_all_covers_every_group() {
        let all = DiscardFlags::ALL;
        for part in [
            DiscardFlags::BINDINGS,
            DiscardFlags::INDEX_BUFFER,
            DiscardFlags::INSTANCE_DATA,
            DiscardFlags::STATE,
            DiscardFlags::TRANSFORM,
            DiscardFlags::VERTEX_STREAMS,
        ] {
            assert!(all.contains(part), "{part:?} must be part of ALL");
        }
    }
}
