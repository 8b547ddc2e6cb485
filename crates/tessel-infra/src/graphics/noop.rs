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

//! Backend that accepts every command and draws nothing.
//!
//! Also used as the replacement when the real device is lost.

use tessel_core::callback::Callback;
use tessel_core::error::ResourceError;
use tessel_core::handle::*;
use tessel_core::memory::Memory;
use tessel_core::renderer::command_buffer::{Attachment, ReadbackSlot, TextureDesc, TextureRect, WindowTarget};
use tessel_core::renderer::{BufferFlags, Caps, Frame, RendererContext, RendererType, UniformType, VertexLayout};

/// The no-op renderer.
#[derive(Debug)]
pub struct NoopRenderer {
    caps: Caps,
}

impl NoopRenderer {
    /// Creates the backend.
    pub fn new() -> Self {
        Self {
            caps: Caps {
                renderer_type: RendererType::Noop,
                ..Caps::default()
            },
        }
    }
}

impl Default for NoopRenderer {
    fn default() -> Self {
        Self::new()
    }
}

impl RendererContext for NoopRenderer {
    fn renderer_type(&self) -> RendererType {
        RendererType::Noop
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn flip(&mut self) {}

    fn create_vertex_layout(&mut self, _handle: VertexLayoutHandle, _layout: &VertexLayout) {}
    fn destroy_vertex_layout(&mut self, _handle: VertexLayoutHandle) {}

    fn create_index_buffer(&mut self, _: IndexBufferHandle, _: &Memory, _: BufferFlags) -> Result<(), ResourceError> {
        Ok(())
    }
    fn destroy_index_buffer(&mut self, _handle: IndexBufferHandle) {}

    fn create_vertex_buffer(
        &mut self,
        _: VertexBufferHandle,
        _: &Memory,
        _: VertexLayoutHandle,
        _: BufferFlags,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
    fn destroy_vertex_buffer(&mut self, _handle: VertexBufferHandle) {}

    fn create_dynamic_index_buffer(&mut self, _: IndexBufferHandle, _: u32, _: BufferFlags) -> Result<(), ResourceError> {
        Ok(())
    }
    fn update_dynamic_index_buffer(&mut self, _: IndexBufferHandle, _: u32, _: u32, _: &Memory) {}
    fn destroy_dynamic_index_buffer(&mut self, _handle: IndexBufferHandle) {}

    fn create_dynamic_vertex_buffer(
        &mut self,
        _: VertexBufferHandle,
        _: u32,
        _: BufferFlags,
    ) -> Result<(), ResourceError> {
        Ok(())
    }
    fn update_dynamic_vertex_buffer(&mut self, _: VertexBufferHandle, _: u32, _: u32, _: &Memory) {}
    fn destroy_dynamic_vertex_buffer(&mut self, _handle: VertexBufferHandle) {}

    fn create_shader(&mut self, _: ShaderHandle, _: &Memory) -> Result<(), ResourceError> {
        Ok(())
    }
    fn destroy_shader(&mut self, _handle: ShaderHandle) {}

    fn create_program(&mut self, _: ProgramHandle, _: ShaderHandle, _: ShaderHandle) -> Result<(), ResourceError> {
        Ok(())
    }
    fn destroy_program(&mut self, _handle: ProgramHandle) {}

    fn create_texture(&mut self, _: TextureHandle, _: &TextureDesc, _: Option<&Memory>) -> Result<(), ResourceError> {
        Ok(())
    }
    fn update_texture(&mut self, _: TextureHandle, _: u8, _: u8, _: &TextureRect, _: u16, _: &Memory) {}
    fn resize_texture(&mut self, _: TextureHandle, _: u16, _: u16, _: u8, _: u16) {}
    fn read_texture(&mut self, _: TextureHandle, _: u8, _: &ReadbackSlot) {}
    fn destroy_texture(&mut self, _handle: TextureHandle) {}

    fn create_frame_buffer(&mut self, _: FrameBufferHandle, _: &[Attachment]) -> Result<(), ResourceError> {
        Ok(())
    }
    fn create_frame_buffer_window(&mut self, _: FrameBufferHandle, _: &WindowTarget) -> Result<(), ResourceError> {
        Ok(())
    }
    fn destroy_frame_buffer(&mut self, _handle: FrameBufferHandle) {}

    fn create_uniform(&mut self, _: UniformHandle, _: UniformType, _: u16, _: &str) {}
    fn destroy_uniform(&mut self, _handle: UniformHandle) {}

    fn invalidate_occlusion_query(&mut self, _handle: OcclusionQueryHandle) {}

    fn request_screen_shot(&mut self, _handle: FrameBufferHandle, path: &str, _callback: &dyn Callback) {
        log::debug!("Noop renderer ignores screenshot request '{path}'");
    }

    fn submit(&mut self, _frame: &mut Frame) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_resources_without_storing_them() {
        let mut renderer = NoopRenderer::new();
        assert!(renderer
            .create_index_buffer(IndexBufferHandle(0), &Memory::copy(&[0; 12]), BufferFlags::EMPTY)
            .is_ok());
        renderer.destroy_index_buffer(IndexBufferHandle(0));
        assert_eq!(renderer.caps().renderer_type, RendererType::Noop);
        assert!(!renderer.is_device_removed());
    }
}
