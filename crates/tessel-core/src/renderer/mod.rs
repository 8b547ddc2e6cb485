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

//! Backend-agnostic rendering contracts and per-frame data.
//!
//! Everything the submit thread records lands in a [`Frame`]: render items and their
//! sort keys, blits, matrices, uniform streams and the two resource command buffers.
//! A backend implementing [`RendererContext`] consumes a frame on the render thread
//! without knowing how it was produced.

pub mod command_buffer;
pub mod flags;
pub mod format;
pub mod frame;
pub mod radix_sort;
pub mod selector;
pub mod shader;
pub mod sort_key;
pub mod text;
pub mod traits;
pub mod transient;
pub mod types;
pub mod uniform_buffer;
pub mod vertex_layout;
pub mod view;

pub use self::command_buffer::{
    Attachment, Command, CommandBuffer, CommandType, ReadbackSlot, TextureDesc, TextureRect, WindowTarget,
};
pub use self::flags::*;
pub use self::format::TextureFormat;
pub use self::frame::{
    BlitItem, Frame, FrameCounters, RenderBind, RenderCompute, RenderDraw, RenderItem, VertexStream,
};
pub use self::selector::{select_renderer, RendererCreator};
pub use self::sort_key::{BlitKey, SortKey};
pub use self::traits::RendererContext;
pub use self::transient::{InstanceDataBuffer, TransientBuffer, TransientIndexBuffer, TransientVertexBuffer};
pub use self::types::*;
pub use self::uniform_buffer::UniformBuffer;
pub use self::vertex_layout::{Attrib, AttribType, VertexLayout};
pub use self::view::{Clear, Rect, View};
