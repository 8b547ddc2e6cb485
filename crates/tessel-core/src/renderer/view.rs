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

//! The view table: viewport, clear, camera and sort mode of every view.

use super::flags::ClearFlags;
use super::types::ViewMode;
use crate::handle::FrameBufferHandle;
use crate::math::Mat4;
use bytemuck::{Pod, Zeroable};

/// Integer rectangle in pixels.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash, Pod, Zeroable)]
#[repr(C)]
pub struct Rect {
    /// Left.
    pub x: u16,
    /// Top.
    pub y: u16,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
}

impl Rect {
    /// Builds a rectangle.
    pub const fn new(x: u16, y: u16, width: u16, height: u16) -> Self {
        Self { x, y, width, height }
    }

    /// `true` if the rectangle covers no pixel.
    pub const fn is_zero_area(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    /// `true` if every field is zero.
    pub const fn is_zero(&self) -> bool {
        self.x == 0 && self.y == 0 && self.width == 0 && self.height == 0
    }

    /// Overlap of `a` and `b`; an empty overlap has zero width or height.
    pub fn intersection(a: &Rect, b: &Rect) -> Rect {
        let sx = a.x.max(b.x) as u32;
        let sy = a.y.max(b.y) as u32;
        let ex = (a.x as u32 + a.width as u32).min(b.x as u32 + b.width as u32);
        let ey = (a.y as u32 + a.height as u32).min(b.y as u32 + b.height as u32);
        Rect {
            x: sx as u16,
            y: sy as u16,
            width: ex.saturating_sub(sx) as u16,
            height: ey.saturating_sub(sy) as u16,
        }
    }

    /// Shrinks `self` to its overlap with `other`.
    pub fn intersect(&mut self, other: &Rect) {
        *self = Rect::intersection(self, other);
    }
}

/// Clear parameters of a view.
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Clear {
    /// What to clear.
    pub flags: ClearFlags,
    /// Packed `0xRRGGBBAA` color when no palette is used.
    pub rgba: u32,
    /// Palette entry per color attachment when `use_palette` is set.
    pub index: [u8; 8],
    /// Clear attachments from the color palette instead of `rgba`.
    pub use_palette: bool,
    /// Depth value.
    pub depth: f32,
    /// Stencil value.
    pub stencil: u8,
}

impl Clear {
    /// Clear with a single color.
    pub fn color(flags: ClearFlags, rgba: u32, depth: f32, stencil: u8) -> Self {
        let bytes = rgba.to_be_bytes();
        Self {
            flags,
            rgba,
            index: [bytes[0], bytes[1], bytes[2], bytes[3], 0, 0, 0, 0],
            use_palette: false,
            depth,
            stencil,
        }
    }

    /// Clear every color attachment from the palette.
    pub fn palette(flags: ClearFlags, depth: f32, stencil: u8, index: [u8; 8]) -> Self {
        Self {
            flags,
            rgba: 0,
            index,
            use_palette: true,
            depth,
            stencil,
        }
    }
}

/// One entry of the view table.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct View {
    /// Clear parameters.
    pub clear: Clear,
    /// Viewport.
    pub rect: Rect,
    /// Scissor; a zero rectangle disables it.
    pub scissor: Rect,
    /// View matrix.
    pub view: Mat4,
    /// Projection matrix.
    pub proj: Mat4,
    /// Render target; invalid means the backbuffer.
    pub frame_buffer: FrameBufferHandle,
    /// Draw ordering.
    pub mode: ViewMode,
}

impl Default for View {
    fn default() -> Self {
        Self {
            clear: Clear {
                depth: 1.0,
                ..Clear::default()
            },
            rect: Rect::new(0, 0, 1, 1),
            scissor: Rect::default(),
            view: Mat4::IDENTITY,
            proj: Mat4::IDENTITY,
            frame_buffer: FrameBufferHandle::INVALID,
            mode: ViewMode::Default,
        }
    }
}

impl View {
    /// Restores the defaults.
    pub fn reset(&mut self) {
        *self = View::default();
    }

    /// Sets the viewport.
    pub fn set_rect(&mut self, x: u16, y: u16, width: u16, height: u16) {
        self.rect = Rect::new(x, y, width.max(1), height.max(1));
    }

    /// Sets the transforms.
    pub fn set_transform(&mut self, view: Option<Mat4>, proj: Option<Mat4>) {
        self.view = view.unwrap_or(Mat4::IDENTITY);
        self.proj = proj.unwrap_or(Mat4::IDENTITY);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_of_overlapping_rects() {
        let a = Rect::new(0, 0, 100, 100);
        let b = Rect::new(50, 25, 100, 100);
        assert_eq!(Rect::intersection(&a, &b), Rect::new(50, 25, 50, 75));
    }

    #[test]
    fn disjoint_rects_have_zero_area() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(20, 20, 10, 10);
        assert!(Rect::intersection(&a, &b).is_zero_area());
    }

    #[test]
    fn intersecting_with_an_empty_target_gives_zero_area() {
        let mut rect = Rect::new(0, 0, 1280, 720);
        rect.intersect(&Rect::new(0, 0, 0, 0));
        assert!(rect.is_zero_area());
    }

    #[test]
    fn view_rect_never_collapses_below_one_pixel() {
        let mut view = View::default();
        view.set_rect(4, 4, 0, 0);
        assert_eq!(view.rect, Rect::new(4, 4, 1, 1));
    }

    #[test]
    fn color_clear_also_fills_the_first_palette_slots() {
        let clear = Clear::color(ClearFlags::COLOR, 0x11223344, 1.0, 0);
        assert_eq!(&clear.index[..4], &[0x11, 0x22, 0x33, 0x44]);
        assert!(!clear.use_palette);
    }
}
