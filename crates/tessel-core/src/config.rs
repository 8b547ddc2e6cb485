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

//! Initialization parameters.

use crate::callback::Callback;
use crate::limits;
use crate::physics::PhysicsType;
use crate::renderer::flags::{DebugFlags, ResetFlags};
use crate::renderer::format::TextureFormat;
use crate::renderer::types::{NativeWindowHandleType, RendererType};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

/// Backbuffer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Resolution {
    /// Backbuffer format.
    pub format: TextureFormat,
    /// Width in pixels.
    pub width: u32,
    /// Height in pixels.
    pub height: u32,
    /// Reset flags.
    pub reset: ResetFlags,
    /// Number of back buffers.
    pub num_back_buffers: u8,
    /// Frames the backend may queue.
    pub max_frame_latency: u8,
}

impl Default for Resolution {
    fn default() -> Self {
        Self {
            format: TextureFormat::RGBA8,
            width: 1280,
            height: 720,
            reset: ResetFlags::EMPTY,
            num_back_buffers: 2,
            max_frame_latency: 0,
        }
    }
}

/// Runtime-adjustable capacities.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InitLimits {
    /// Encoders available, the default encoder included.
    pub max_encoders: u16,
    /// Capacity a command buffer is rewound to after each frame.
    pub min_resource_cb_size: u32,
    /// Transient vertex buffer bytes per frame.
    pub transient_vb_size: u32,
    /// Transient index buffer bytes per frame.
    pub transient_ib_size: u32,
}

impl Default for InitLimits {
    fn default() -> Self {
        Self {
            max_encoders: limits::MAX_ENCODERS as u16,
            min_resource_cb_size: limits::MIN_RESOURCE_COMMAND_BUFFER_SIZE as u32,
            transient_vb_size: limits::TRANSIENT_VERTEX_BUFFER_SIZE,
            transient_ib_size: limits::TRANSIENT_INDEX_BUFFER_SIZE,
        }
    }
}

/// Native handles of the platform. Stored as integers; the core never dereferences them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PlatformData {
    /// Native display.
    pub ndt: usize,
    /// Native window.
    pub nwh: usize,
    /// Existing graphics context.
    pub context: usize,
    /// Existing backbuffer.
    pub back_buffer: usize,
    /// Existing depth/stencil backbuffer.
    pub back_buffer_ds: usize,
    /// Kind of `nwh`.
    pub window_type: NativeWindowHandleType,
}

/// Who drives the render side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum Threading {
    /// Rendering runs inline inside `frame()`.
    SingleThreaded,
    /// The context spawns and owns a render thread.
    #[default]
    Spawn,
    /// The application calls `RenderLoop::render_frame` from a thread of its choice.
    External,
}

/// Everything needed to initialize a context.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Init {
    /// Requested renderer; `Count` picks the best available.
    pub renderer_type: RendererType,
    /// Requested physics; `Count` picks the richest available.
    pub physics_type: PhysicsType,
    /// Backbuffer.
    pub resolution: Resolution,
    /// Capacities.
    pub limits: InitLimits,
    /// Render threading model.
    pub threading: Threading,
    /// Debug features enabled at start.
    pub debug: DebugFlags,
    /// Report validation failures to [`Callback::fatal`].
    pub debug_checks: bool,
    /// Native handles.
    pub platform_data: PlatformData,
    /// User callback; defaults to [`LogCallback`](crate::callback::LogCallback).
    #[serde(skip)]
    pub callback: Option<Arc<dyn Callback>>,
}

impl Default for Init {
    fn default() -> Self {
        Self {
            renderer_type: RendererType::Count,
            physics_type: PhysicsType::Count,
            resolution: Resolution::default(),
            limits: InitLimits::default(),
            threading: Threading::default(),
            debug: DebugFlags::EMPTY,
            debug_checks: cfg!(debug_assertions),
            platform_data: PlatformData::default(),
            callback: None,
        }
    }
}

impl fmt::Debug for Init {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Init")
            .field("renderer_type", &self.renderer_type)
            .field("physics_type", &self.physics_type)
            .field("resolution", &self.resolution)
            .field("limits", &self.limits)
            .field("threading", &self.threading)
            .field("debug", &self.debug)
            .field("debug_checks", &self.debug_checks)
            .field("platform_data", &self.platform_data)
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

impl Init {
    /// Parses an `Init` from JSON; missing fields take their defaults.
    pub fn from_json_str(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    /// Serializes to pretty JSON. The callback is not serialized.
    pub fn to_json_string(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_auto_select_backends() {
        let init = Init::default();
        assert_eq!(init.renderer_type, RendererType::Count);
        assert_eq!(init.physics_type, PhysicsType::Count);
        assert_eq!(init.threading, Threading::Spawn);
        assert_eq!(init.limits.transient_vb_size, 6 << 20);
    }

    #[test]
    fn partial_json_fills_in_defaults() {
        let init = Init::from_json_str(
            r#"{ "renderer_type": "Headless", "threading": "SingleThreaded",
                 "resolution": { "width": 320, "height": 200 } }"#,
        )
        .expect("valid json");
        assert_eq!(init.renderer_type, RendererType::Headless);
        assert_eq!(init.threading, Threading::SingleThreaded);
        assert_eq!(init.resolution.width, 320);
        assert_eq!(init.resolution.format, TextureFormat::RGBA8);
        assert_eq!(init.limits, InitLimits::default());
    }

    #[test]
    fn json_round_trip_keeps_values() {
        let mut init = Init::default();
        init.resolution.reset = ResetFlags::VSYNC | ResetFlags::MSAA_X4;
        init.limits.max_encoders = 4;
        let back = Init::from_json_str(&init.to_json_string().unwrap()).unwrap();
        assert_eq!(back.resolution, init.resolution);
        assert_eq!(back.limits, init.limits);
    }
}
