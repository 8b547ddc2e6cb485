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

//! The contract every renderer backend implements.

use super::command_buffer::{Attachment, ReadbackSlot, TextureDesc, TextureRect, WindowTarget};
use super::flags::BufferFlags;
use super::frame::Frame;
use super::types::{Caps, RendererType, UniformType};
use super::vertex_layout::VertexLayout;
use crate::callback::Callback;
use crate::error::ResourceError;
use crate::handle::*;
use crate::memory::Memory;

/// A rendering backend.
///
/// All methods are called on the render thread, in command order: the creates and
/// updates of a frame, then [`submit`](RendererContext::submit), then its destroys.
/// A backend is created on the render thread and never leaves it, but the thread
/// itself may be spawned by the context, hence the `Send` bound.
pub trait RendererContext: Send {
    /// Backend type.
    fn renderer_type(&self) -> RendererType;

    /// Human readable backend name.
    fn renderer_name(&self) -> &'static str {
        self.renderer_type().name()
    }

    /// Capabilities, valid after creation.
    fn caps(&self) -> &Caps;

    /// `true` once the device is lost. The context then swaps in the no-op backend.
    fn is_device_removed(&self) -> bool {
        false
    }

    /// Presents the last rendered frame.
    fn flip(&mut self);

    /// Registers a vertex layout.
    fn create_vertex_layout(&mut self, handle: VertexLayoutHandle, layout: &VertexLayout);
    /// Forgets a vertex layout.
    fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle);

    /// Creates a static index buffer.
    fn create_index_buffer(&mut self, handle: IndexBufferHandle, mem: &Memory, flags: BufferFlags)
        -> Result<(), ResourceError>;
    /// Destroys a static index buffer.
    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle);

    /// Creates a static vertex buffer.
    fn create_vertex_buffer(
        &mut self,
        handle: VertexBufferHandle,
        mem: &Memory,
        layout: VertexLayoutHandle,
        flags: BufferFlags,
    ) -> Result<(), ResourceError>;
    /// Destroys a static vertex buffer.
    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle);

    /// Creates an empty, updatable index buffer.
    fn create_dynamic_index_buffer(&mut self, handle: IndexBufferHandle, size: u32, flags: BufferFlags)
        -> Result<(), ResourceError>;
    /// Writes `mem` at `offset`, at most `size` bytes.
    fn update_dynamic_index_buffer(&mut self, handle: IndexBufferHandle, offset: u32, size: u32, mem: &Memory);
    /// Destroys an updatable index buffer.
    fn destroy_dynamic_index_buffer(&mut self, handle: IndexBufferHandle);

    /// Creates an empty, updatable vertex buffer.
    fn create_dynamic_vertex_buffer(&mut self, handle: VertexBufferHandle, size: u32, flags: BufferFlags)
        -> Result<(), ResourceError>;
    /// Writes `mem` at `offset`, at most `size` bytes.
    fn update_dynamic_vertex_buffer(&mut self, handle: VertexBufferHandle, offset: u32, size: u32, mem: &Memory);
    /// Destroys an updatable vertex buffer.
    fn destroy_dynamic_vertex_buffer(&mut self, handle: VertexBufferHandle);

    /// Creates a shader from its container.
    fn create_shader(&mut self, handle: ShaderHandle, mem: &Memory) -> Result<(), ResourceError>;
    /// Destroys a shader.
    fn destroy_shader(&mut self, handle: ShaderHandle);

    /// Links a program. `fsh` is invalid for compute programs.
    fn create_program(&mut self, handle: ProgramHandle, vsh: ShaderHandle, fsh: ShaderHandle)
        -> Result<(), ResourceError>;
    /// Destroys a program.
    fn destroy_program(&mut self, handle: ProgramHandle);

    /// Creates a texture, optionally with initial contents.
    fn create_texture(&mut self, handle: TextureHandle, desc: &TextureDesc, mem: Option<&Memory>)
        -> Result<(), ResourceError>;
    /// Writes a region of a texture.
    fn update_texture(&mut self, handle: TextureHandle, side: u8, mip: u8, rect: &TextureRect, pitch: u16, mem: &Memory);
    /// Resizes a backbuffer-ratio texture.
    fn resize_texture(&mut self, handle: TextureHandle, width: u16, height: u16, num_mips: u8, num_layers: u16);
    /// Copies a mip back to the CPU into `target`.
    fn read_texture(&mut self, handle: TextureHandle, mip: u8, target: &ReadbackSlot);
    /// Replaces the native texture behind `handle`. Returns `false` if unsupported.
    fn override_internal(&mut self, _handle: TextureHandle, _native: usize) -> bool {
        false
    }
    /// Destroys a texture.
    fn destroy_texture(&mut self, handle: TextureHandle);

    /// Creates a frame buffer from texture attachments.
    fn create_frame_buffer(&mut self, handle: FrameBufferHandle, attachments: &[Attachment])
        -> Result<(), ResourceError>;
    /// Creates a frame buffer presenting to a native window.
    fn create_frame_buffer_window(&mut self, handle: FrameBufferHandle, window: &WindowTarget)
        -> Result<(), ResourceError>;
    /// Destroys a frame buffer.
    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle);

    /// Creates or grows a uniform.
    fn create_uniform(&mut self, handle: UniformHandle, ty: UniformType, num: u16, name: &str);
    /// Sets the value a handle-referencing uniform opcode resolves to.
    fn update_uniform(&mut self, _loc: u16, _data: &[u8]) {}
    /// Destroys a uniform.
    fn destroy_uniform(&mut self, handle: UniformHandle);

    /// Forgets the last result of a query.
    fn invalidate_occlusion_query(&mut self, handle: OcclusionQueryHandle);
    /// Names a view for graphics debuggers.
    fn update_view_name(&mut self, _view: ViewId, _name: &str) {}
    /// Names a resource for graphics debuggers.
    fn set_name(&mut self, _handle: AnyHandle, _name: &str) {}
    /// Inserts a marker for graphics debuggers.
    fn set_marker(&mut self, _marker: &str) {}

    /// Captures a frame buffer, or the backbuffer for an invalid handle, and hands
    /// the pixels to `callback`.
    fn request_screen_shot(&mut self, handle: FrameBufferHandle, path: &str, callback: &dyn Callback);

    /// Renders the sorted items of `frame`. Occlusion results are written back into
    /// `frame.occlusion`.
    fn submit(&mut self, frame: &mut Frame);
}
