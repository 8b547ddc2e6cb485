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

//! User hooks invoked by the core.

use crate::error::Fatal;

/// A screenshot produced by the render thread.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenShot {
    /// Path given to the request.
    pub path: String,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Bytes per row.
    pub pitch: u32,
    /// BGRA8 pixels.
    pub data: Vec<u8>,
    /// `true` if rows are stored bottom-up.
    pub yflip: bool,
}

/// Receives fatal errors, traces and screenshots.
///
/// Callbacks may be invoked from the render thread.
pub trait Callback: Send + Sync {
    /// Called for unrecoverable conditions and, with debug checks on, for validation
    /// failures. Returning lets the core continue in a degraded state.
    fn fatal(&self, code: Fatal, message: &str);

    /// Diagnostic trace.
    fn trace(&self, message: &str) {
        log::trace!("{message}");
    }

    /// A requested screenshot is ready.
    fn screen_shot(&self, shot: ScreenShot) {
        log::info!(
            "Screenshot '{}' captured ({}x{}), no handler installed",
            shot.path,
            shot.width,
            shot.height
        );
    }
}

/// Default callback that forwards everything to the `log` facade.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogCallback;

impl Callback for LogCallback {
    fn fatal(&self, code: Fatal, message: &str) {
        log::error!("Fatal {code:?}: {message}");
    }
}
