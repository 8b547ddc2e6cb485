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

//! The view table. Changes apply to the frame being recorded and are copied
//! into it at `frame()`.

use super::{lock, Context};
use std::sync::PoisonError;
use tessel_core::handle::{FrameBufferHandle, ViewId};
use tessel_core::limits::{MAX_COLOR_PALETTE, MAX_VIEWS};
use tessel_core::math::Mat4;
use tessel_core::renderer::flags::{ClearFlags, DebugFlags};
use tessel_core::renderer::{BackbufferRatio, Clear, Command, Rect, View, ViewMode};

/// Views as last set by the application.
#[derive(Debug, Clone)]
pub(crate) struct ViewState {
    pub views: Vec<View>,
    pub order: Vec<ViewId>,
    pub palette: [[f32; 4]; MAX_COLOR_PALETTE],
    pub debug: DebugFlags,
}

impl Default for ViewState {
    fn default() -> Self {
        Self {
            views: vec![View::default(); MAX_VIEWS],
            order: Vec::new(),
            palette: [[0.0; 4]; MAX_COLOR_PALETTE],
            debug: DebugFlags::EMPTY,
        }
    }
}

impl Context {
    fn with_view(&self, view: ViewId, what: &str, f: impl FnOnce(&mut View)) {
        let mut state = self.views.write().unwrap_or_else(PoisonError::into_inner);
        match state.views.get_mut(view as usize) {
            Some(entry) => f(entry),
            None => log::warn!("{what}: view {view} out of range (max {MAX_VIEWS})"),
        }
    }

    /// Debug name shown by graphics debuggers.
    pub fn set_view_name(&self, view: ViewId, name: &str) {
        if view as usize >= MAX_VIEWS {
            log::warn!("set_view_name: view {view} out of range");
            return;
        }
        lock(&self.submit).cmd_pre.push(Command::UpdateViewName {
            view,
            name: name.to_owned(),
        });
    }

    /// Viewport in pixels. Width and height are at least 1; the viewport is
    /// clipped to the render target when the frame is submitted.
    pub fn set_view_rect(&self, view: ViewId, x: u16, y: u16, width: u16, height: u16) {
        self.with_view(view, "set_view_rect", |v| v.set_rect(x, y, width, height));
    }

    /// Viewport sized relative to the current backbuffer.
    pub fn set_view_rect_ratio(&self, view: ViewId, x: u16, y: u16, ratio: BackbufferRatio) {
        let resolution = lock(&self.resources).resolution;
        let (width, height, _) = ratio.texture_size(resolution.width, resolution.height, false);
        self.set_view_rect(view, x, y, width, height);
    }

    /// Scissor applied to every draw of the view. A zero rectangle disables it.
    pub fn set_view_scissor(&self, view: ViewId, x: u16, y: u16, width: u16, height: u16) {
        self.with_view(view, "set_view_scissor", |v| v.scissor = Rect::new(x, y, width, height));
    }

    /// Clears with a color.
    pub fn set_view_clear(&self, view: ViewId, flags: ClearFlags, rgba: u32, depth: f32, stencil: u8) {
        self.with_view(view, "set_view_clear", |v| v.clear = Clear::color(flags, rgba, depth, stencil));
    }

    /// Clears each color attachment with a palette entry.
    pub fn set_view_clear_palette(&self, view: ViewId, flags: ClearFlags, depth: f32, stencil: u8, index: [u8; 8]) {
        self.with_view(view, "set_view_clear_palette", |v| {
            v.clear = Clear::palette(flags, depth, stencil, index)
        });
    }

    /// Sets a palette entry used by [`set_view_clear_palette`](Self::set_view_clear_palette).
    pub fn set_palette_color(&self, index: u8, rgba: [f32; 4]) {
        let mut state = self.views.write().unwrap_or_else(PoisonError::into_inner);
        match state.palette.get_mut(index as usize) {
            Some(entry) => *entry = rgba,
            None => log::warn!("Palette index {index} out of range (max {MAX_COLOR_PALETTE})"),
        }
    }

    /// Palette entry from packed `0xRRGGBBAA`.
    pub fn set_palette_color_rgba8(&self, index: u8, rgba: u32) {
        let channel = |shift: u32| ((rgba >> shift) & 0xff) as f32 / 255.0;
        self.set_palette_color(index, [channel(24), channel(16), channel(8), channel(0)]);
    }

    /// How the draws of the view are ordered. Applies to draws submitted after
    /// the call.
    pub fn set_view_mode(&self, view: ViewId, mode: ViewMode) {
        self.with_view(view, "set_view_mode", |v| v.mode = mode);
    }

    /// Render target; an invalid handle selects the backbuffer.
    pub fn set_view_frame_buffer(&self, view: ViewId, frame_buffer: FrameBufferHandle) {
        self.with_view(view, "set_view_frame_buffer", |v| v.frame_buffer = frame_buffer);
    }

    /// View and projection matrices; `None` means identity.
    pub fn set_view_transform(&self, view: ViewId, view_matrix: Option<Mat4>, proj: Option<Mat4>) {
        self.with_view(view, "set_view_transform", |v| v.set_transform(view_matrix, proj));
    }

    /// Render order of views. Listed views go first, the others follow in id
    /// order. An empty list restores the id order.
    pub fn set_view_order(&self, order: &[ViewId]) {
        self.views.write().unwrap_or_else(PoisonError::into_inner).order = order.to_vec();
    }

    /// Restores the defaults of a view.
    pub fn reset_view(&self, view: ViewId) {
        self.with_view(view, "reset_view", View::reset);
    }

    /// Current settings of a view.
    pub fn view(&self, view: ViewId) -> Option<View> {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .views
            .get(view as usize)
            .copied()
    }
}

#[cfg(test)]
mod tests {
    use crate::context::tests::headless_context;
    use tessel_core::config::Threading;
    use tessel_core::renderer::flags::ClearFlags;
    use tessel_core::renderer::ViewMode;

    #[test]
    fn views_keep_their_settings_across_frames() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        context.set_view_rect(3, 0, 0, 0, 10);
        context.set_view_clear(3, ClearFlags::COLOR, 0xff00_00ff, 1.0, 0);
        context.set_view_mode(3, ViewMode::Sequential);
        context.frame();
        context.frame();

        let view = context.view(3).unwrap();
        assert_eq!((view.rect.width, view.rect.height), (1, 10));
        assert_eq!(view.clear.rgba, 0xff00_00ff);
        assert_eq!(context.view_mode(3), ViewMode::Sequential);

        context.reset_view(3);
        assert_eq!(context.view_mode(3), ViewMode::Default);
    }

    #[test]
    fn out_of_range_views_are_ignored() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        context.set_view_rect(u16::MAX, 0, 0, 10, 10);
        assert!(context.view(u16::MAX).is_none());
    }

    #[test]
    fn palette_from_packed_color() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        context.set_palette_color_rgba8(1, 0xff00_00ff);
        let palette = context.views.read().unwrap().palette;
        assert_eq!(palette[1], [1.0, 0.0, 0.0, 1.0]);
    }
}
