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

//! The public-facing API of the Tessel frame submission core.
//!
//! Applications create a [`Context`], create resources through it, record draws
//! with [`Encoder`]s and call [`Context::frame`] once per tick. The render loop
//! runs on its own thread, on the caller's thread, or on a thread the
//! application drives through [`RenderLoop`], depending on the configured
//! threading mode.

mod context;
mod encoder;
mod error;
mod render_loop;
mod resources;

pub use context::Context;
pub use encoder::Encoder;
pub use error::InitError;
pub use render_loop::{RenderFrame, RenderLoop};
pub use resources::{DynamicBufferInfo, MeshInfo, UniformInfo};

pub use tessel_core;
pub use tessel_data;

/// The types most applications need.
pub mod prelude {
    pub use crate::{Context, Encoder, InitError, RenderFrame, RenderLoop};
    pub use tessel_core::config::{Init, InitLimits, Resolution, Threading};
    pub use tessel_core::handle::*;
    pub use tessel_core::math::{Mat4, Quat, Vec3};
    pub use tessel_core::memory::Memory;
    pub use tessel_core::renderer::flags::*;
    pub use tessel_core::renderer::{
        Attrib, AttribType, BackbufferRatio, RendererType, TextureFormat, UniformType, VertexLayout, ViewMode,
    };
}
