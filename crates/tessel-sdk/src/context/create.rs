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

//! Resource creation, update and destruction.
//!
//! Each call takes the resource lock and then the submit frame, records its
//! command and returns. Handles are usable in encoders right away; the render
//! loop creates the backend object before the draws of the same frame.

use super::{lock, Context};
use crate::resources::{transient_parent, DynamicBufferInfo, MeshInfo, TextureShape, UniformInfo};
use tessel_core::error::{ResourceError, ValidationCode};
use tessel_core::handle::*;
use tessel_core::limits::*;
use tessel_core::memory::Memory;
use tessel_core::renderer::flags::{BufferFlags, SamplerFlags, TextureFlags};
use tessel_core::renderer::{
    Attachment, BackbufferRatio, InstanceDataBuffer, OcclusionQueryResult, ReadbackSlot, TextureFormat, TextureInfo,
    TextureRect, TransientIndexBuffer, TransientVertexBuffer, UniformType, VertexLayout, WindowTarget,
};

impl Context {
    // --- Vertex layouts and static buffers ---

    /// Registers a vertex layout. Identical layouts share one handle.
    pub fn create_vertex_layout(&self, layout: &VertexLayout) -> Result<VertexLayoutHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_vertex_layout(frame, layout))
    }

    pub fn destroy_vertex_layout(&self, handle: VertexLayoutHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_vertex_layout(frame, handle))
    }

    pub fn create_index_buffer(&self, mem: Memory, flags: BufferFlags) -> Result<IndexBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_index_buffer(frame, mem, flags))
    }

    pub fn destroy_index_buffer(&self, handle: IndexBufferHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_index_buffer(frame, handle))
    }

    pub fn create_vertex_buffer(
        &self,
        mem: Memory,
        layout: &VertexLayout,
        flags: BufferFlags,
    ) -> Result<VertexBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_vertex_buffer(frame, mem, layout, flags))
    }

    pub fn destroy_vertex_buffer(&self, handle: VertexBufferHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_vertex_buffer(frame, handle))
    }

    // --- Dynamic buffers ---

    /// Dynamic index buffer of `num` indices, suballocated from a shared parent.
    pub fn create_dynamic_index_buffer(
        &self,
        num: u32,
        flags: BufferFlags,
        mem: Option<Memory>,
    ) -> Result<DynamicIndexBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_dynamic_index_buffer(frame, num, flags, mem))
    }

    /// Writes indices from `start_index`. Buffers created with
    /// [`BufferFlags::ALLOW_RESIZE`] grow to fit; others are truncated.
    pub fn update_dynamic_index_buffer(
        &self,
        handle: DynamicIndexBufferHandle,
        start_index: u32,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.update_dynamic_index_buffer(frame, handle, start_index, mem))
    }

    /// The range is released at the next `frame()`.
    pub fn destroy_dynamic_index_buffer(&self, handle: DynamicIndexBufferHandle) -> Result<(), ResourceError> {
        lock(&self.resources).destroy_dynamic_index_buffer(handle)
    }

    pub fn dynamic_index_buffer_info(&self, handle: DynamicIndexBufferHandle) -> Option<DynamicBufferInfo> {
        lock(&self.resources).dynamic_index_buffer_info(handle)
    }

    pub fn create_dynamic_vertex_buffer(
        &self,
        num: u32,
        layout: &VertexLayout,
        flags: BufferFlags,
        mem: Option<Memory>,
    ) -> Result<DynamicVertexBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_dynamic_vertex_buffer(frame, num, layout, flags, mem))
    }

    pub fn update_dynamic_vertex_buffer(
        &self,
        handle: DynamicVertexBufferHandle,
        start_vertex: u32,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.update_dynamic_vertex_buffer(frame, handle, start_vertex, mem))
    }

    pub fn destroy_dynamic_vertex_buffer(&self, handle: DynamicVertexBufferHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_dynamic_vertex_buffer(frame, handle))
    }

    pub fn dynamic_vertex_buffer_info(&self, handle: DynamicVertexBufferHandle) -> Option<DynamicBufferInfo> {
        lock(&self.resources).dynamic_vertex_buffer_info(handle)
    }

    /// Buffer of `num` indirect draw or dispatch commands.
    pub fn create_indirect_buffer(&self, num: u32) -> Result<IndirectBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_indirect_buffer(frame, num))
    }

    pub fn destroy_indirect_buffer(&self, handle: IndirectBufferHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_indirect_buffer(frame, handle))
    }

    // --- Transient buffers ---

    /// How many of `num` indices still fit in this frame's transient index buffer.
    pub fn get_avail_transient_index_buffer(&self, num: u32, index32: bool) -> u32 {
        self.counters.transient_ib.available(num, if index32 { 4 } else { 2 })
    }

    /// How many of `num` vertices of `stride` bytes still fit.
    pub fn get_avail_transient_vertex_buffer(&self, num: u32, stride: u16) -> u32 {
        self.counters.transient_vb.available(num, stride as u32)
    }

    /// How many of `num` instances of `stride` bytes still fit.
    pub fn get_avail_instance_data_buffer(&self, num: u32, stride: u16) -> u32 {
        self.counters.transient_vb.available(num, stride as u32)
    }

    /// Scratch indices valid for the frame being recorded. Near the end of the
    /// buffer fewer than `num` indices are granted; check
    /// [`num_indices`](TransientIndexBuffer::num_indices).
    pub fn alloc_transient_index_buffer(&self, num: u32, index32: bool) -> TransientIndexBuffer {
        let size = if index32 { 4 } else { 2 };
        let (offset, granted) = self.counters.transient_ib.alloc(num, size);
        if granted < num {
            log::warn!("Transient index buffer full: {granted} of {num} indices granted");
        }
        TransientIndexBuffer {
            data: vec![0; (granted * size) as usize],
            handle: IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, self.counters.frame_num())),
            offset,
            start_index: offset / size,
            index32,
        }
    }

    /// Scratch vertices of a registered layout, valid for the frame being recorded.
    pub fn alloc_transient_vertex_buffer(
        &self,
        num: u32,
        layout: VertexLayoutHandle,
    ) -> Result<TransientVertexBuffer, ResourceError> {
        let stride = lock(&self.resources)
            .layout_stride(layout)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::VertexLayout, layout.idx()))?;
        let (offset, granted) = self.counters.transient_vb.alloc(num, stride as u32);
        if granted < num {
            log::warn!("Transient vertex buffer full: {granted} of {num} vertices granted");
        }
        Ok(TransientVertexBuffer {
            data: vec![0; (granted * stride as u32) as usize],
            handle: VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, self.counters.frame_num())),
            offset,
            start_vertex: offset / stride.max(1) as u32,
            stride,
            layout,
        })
    }

    /// Per-instance data carved out of the transient vertex buffer. `stride` is
    /// rounded up to 16 bytes.
    pub fn alloc_instance_data_buffer(&self, num: u32, stride: u16) -> InstanceDataBuffer {
        let stride = stride.max(1).next_multiple_of(16);
        let (offset, granted) = self.counters.transient_vb.alloc(num, stride as u32);
        if granted < num {
            log::warn!("Transient vertex buffer full: {granted} of {num} instances granted");
        }
        InstanceDataBuffer {
            data: vec![0; (granted * stride as u32) as usize],
            handle: VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, self.counters.frame_num())),
            offset,
            stride,
            num: granted,
        }
    }

    // --- Shaders, programs and uniforms ---

    /// Creates a uniform, or adds a reference to the one with the same name.
    pub fn create_uniform(&self, name: &str, ty: UniformType, num: u16) -> Result<UniformHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_uniform(frame, name, ty, num))
    }

    pub fn destroy_uniform(&self, handle: UniformHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_uniform(frame, handle))
    }

    pub fn uniform_info(&self, handle: UniformHandle) -> Option<UniformInfo> {
        lock(&self.resources).uniform_info(handle)
    }

    /// Creates a shader from a compiled shader container. Identical binaries
    /// share one handle.
    pub fn create_shader(&self, mem: Memory) -> Result<ShaderHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_shader(frame, mem))
    }

    pub fn destroy_shader(&self, handle: ShaderHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_shader(frame, handle))
    }

    /// Uniforms declared by a shader.
    pub fn get_shader_uniforms(&self, handle: ShaderHandle) -> Vec<UniformHandle> {
        lock(&self.resources).shader_uniforms(handle)
    }

    /// Links a vertex and a fragment shader. The same pair always yields the same
    /// program.
    pub fn create_program(
        &self,
        vsh: ShaderHandle,
        fsh: ShaderHandle,
        destroy_shaders: bool,
    ) -> Result<ProgramHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_program(frame, vsh, fsh, destroy_shaders))
    }

    pub fn create_compute_program(&self, csh: ShaderHandle, destroy_shader: bool) -> Result<ProgramHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_compute_program(frame, csh, destroy_shader))
    }

    pub fn destroy_program(&self, handle: ProgramHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_program(frame, handle))
    }

    // --- Textures ---

    #[allow(clippy::too_many_arguments)]
    pub fn create_texture_2d(
        &self,
        width: u16,
        height: u16,
        has_mips: bool,
        num_layers: u16,
        format: TextureFormat,
        flags: TextureFlags,
        mem: Option<Memory>,
    ) -> Result<TextureHandle, ResourceError> {
        let shape = TextureShape::new_2d(width, height, has_mips, num_layers, format, flags);
        self.with_resources(|res, frame| res.create_texture(frame, shape, mem))
    }

    /// 2D texture sized relative to the backbuffer; it follows [`reset`](Self::reset).
    pub fn create_texture_2d_scaled(
        &self,
        ratio: BackbufferRatio,
        has_mips: bool,
        num_layers: u16,
        format: TextureFormat,
        flags: TextureFlags,
    ) -> Result<TextureHandle, ResourceError> {
        let shape = TextureShape {
            ratio,
            ..TextureShape::new_2d(1, 1, has_mips, num_layers, format, flags)
        };
        self.with_resources(|res, frame| res.create_texture(frame, shape, None))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create_texture_3d(
        &self,
        width: u16,
        height: u16,
        depth: u16,
        has_mips: bool,
        format: TextureFormat,
        flags: TextureFlags,
        mem: Option<Memory>,
    ) -> Result<TextureHandle, ResourceError> {
        let shape = TextureShape {
            depth: depth.max(1),
            ..TextureShape::new_2d(width, height, has_mips, 1, format, flags)
        };
        self.with_resources(|res, frame| res.create_texture(frame, shape, mem))
    }

    pub fn create_texture_cube(
        &self,
        size: u16,
        has_mips: bool,
        num_layers: u16,
        format: TextureFormat,
        flags: TextureFlags,
        mem: Option<Memory>,
    ) -> Result<TextureHandle, ResourceError> {
        let shape = TextureShape {
            cube_map: true,
            ..TextureShape::new_2d(size, size, has_mips, num_layers, format, flags)
        };
        self.with_resources(|res, frame| res.create_texture(frame, shape, mem))
    }

    /// Uploads a region of one mip of a 2D texture layer. A `pitch` of zero
    /// means tightly packed rows.
    #[allow(clippy::too_many_arguments)]
    pub fn update_texture_2d(
        &self,
        handle: TextureHandle,
        layer: u16,
        mip: u8,
        x: u16,
        y: u16,
        width: u16,
        height: u16,
        mem: Memory,
        pitch: u16,
    ) -> Result<(), ResourceError> {
        let rect = TextureRect {
            x,
            y,
            z: layer,
            width,
            height,
            depth: 1,
        };
        self.with_resources(|res, frame| res.update_texture(frame, handle, 0, mip, rect, pitch, mem))
    }

    /// Uploads a region of one face of a cube texture.
    #[allow(clippy::too_many_arguments)]
    pub fn update_texture_cube(
        &self,
        handle: TextureHandle,
        layer: u16,
        side: u8,
        mip: u8,
        rect: TextureRect,
        mem: Memory,
        pitch: u16,
    ) -> Result<(), ResourceError> {
        let rect = TextureRect { z: layer, ..rect };
        self.with_resources(|res, frame| res.update_texture(frame, handle, side, mip, rect, pitch, mem))
    }

    /// Uploads a box of one mip of a 3D texture.
    pub fn update_texture_3d(
        &self,
        handle: TextureHandle,
        mip: u8,
        rect: TextureRect,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.update_texture(frame, handle, 0, mip, rect, 0, mem))
    }

    /// Reads a texture mip back after the draws of this frame. Returns the frame
    /// number at which the slot is filled, two frames from now.
    pub fn read_texture(&self, handle: TextureHandle, mip: u8) -> Result<(u32, ReadbackSlot), ResourceError> {
        self.with_resources(|res, frame| {
            let slot = res.read_texture(frame, handle, mip)?;
            Ok((frame.frame_num + 2, slot))
        })
    }

    pub fn destroy_texture(&self, handle: TextureHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_texture(frame, handle))
    }

    pub fn texture_info(&self, handle: TextureHandle) -> Option<TextureInfo> {
        lock(&self.resources).texture_info(handle)
    }

    // --- Frame buffers ---

    /// Frame buffer with one new texture, destroyed along with it.
    pub fn create_frame_buffer(
        &self,
        width: u16,
        height: u16,
        format: TextureFormat,
        flags: TextureFlags,
    ) -> Result<FrameBufferHandle, ResourceError> {
        let shape = TextureShape::new_2d(width, height, false, 1, format, flags | TextureFlags::RT);
        self.frame_buffer_over(shape)
    }

    /// Frame buffer with one new texture sized relative to the backbuffer.
    pub fn create_frame_buffer_scaled(
        &self,
        ratio: BackbufferRatio,
        format: TextureFormat,
        flags: TextureFlags,
    ) -> Result<FrameBufferHandle, ResourceError> {
        let shape = TextureShape {
            ratio,
            ..TextureShape::new_2d(1, 1, false, 1, format, flags | TextureFlags::RT)
        };
        self.frame_buffer_over(shape)
    }

    fn frame_buffer_over(&self, shape: TextureShape) -> Result<FrameBufferHandle, ResourceError> {
        self.with_resources(|res, frame| {
            let texture = res.create_texture(frame, shape, None)?;
            res.create_frame_buffer_from_attachments(frame, &[Attachment::new(texture)], true)
                .inspect_err(|_| {
                    let _ = res.destroy_texture(frame, texture);
                })
        })
    }

    /// Frame buffer over existing textures, mip 0 and layer 0 of each.
    pub fn create_frame_buffer_from_handles(
        &self,
        textures: &[TextureHandle],
        destroy_textures: bool,
    ) -> Result<FrameBufferHandle, ResourceError> {
        let attachments: Vec<Attachment> = textures.iter().copied().map(Attachment::new).collect();
        self.create_frame_buffer_from_attachments(&attachments, destroy_textures)
    }

    pub fn create_frame_buffer_from_attachments(
        &self,
        attachments: &[Attachment],
        destroy_textures: bool,
    ) -> Result<FrameBufferHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_frame_buffer_from_attachments(frame, attachments, destroy_textures))
    }

    /// Frame buffer presenting into a native window.
    pub fn create_frame_buffer_from_nwh(
        &self,
        nwh: u64,
        width: u16,
        height: u16,
        format: TextureFormat,
        depth_format: TextureFormat,
    ) -> Result<FrameBufferHandle, ResourceError> {
        let window = WindowTarget::new(nwh, width, height, format, depth_format);
        self.with_resources(|res, frame| res.create_frame_buffer_from_nwh(frame, window))
    }

    /// Texture behind an attachment.
    pub fn get_texture(&self, frame_buffer: FrameBufferHandle, attachment: u8) -> Option<TextureHandle> {
        lock(&self.resources).frame_buffer_texture(frame_buffer, attachment)
    }

    pub fn destroy_frame_buffer(&self, handle: FrameBufferHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_frame_buffer(frame, handle))
    }

    // --- Occlusion queries ---

    pub fn create_occlusion_query(&self) -> Result<OcclusionQueryHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_occlusion_query(frame))
    }

    /// Result of the last frame that used the query.
    pub fn get_result(&self, handle: OcclusionQueryHandle) -> OcclusionQueryResult {
        let valid = lock(&self.resources).is_valid(handle.into());
        if !valid {
            return OcclusionQueryResult::NoResult;
        }
        OcclusionQueryResult::from_raw(lock(&self.submit).occlusion_result(handle))
    }

    pub fn destroy_occlusion_query(&self, handle: OcclusionQueryHandle) -> Result<(), ResourceError> {
        lock(&self.resources).destroy_occlusion_query(handle)
    }

    // --- Meshes and materials ---

    /// Loads a mesh from chunked mesh data. Identical data shares one handle.
    pub fn create_mesh(&self, data: &[u8]) -> Result<MeshHandle, ResourceError> {
        self.with_resources(|res, frame| res.create_mesh(frame, data))
    }

    pub fn destroy_mesh(&self, handle: MeshHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_mesh(frame, handle))
    }

    pub fn mesh_info(&self, handle: MeshHandle) -> Option<MeshInfo> {
        lock(&self.resources).mesh_info(handle)
    }

    /// Program plus the uniform values and textures to apply with it.
    pub fn create_material(&self, program: ProgramHandle) -> Result<MaterialHandle, ResourceError> {
        lock(&self.resources).create_material(program)
    }

    pub fn set_material_uniform(
        &self,
        material: MaterialHandle,
        uniform: UniformHandle,
        data: &[u8],
        num: u16,
    ) -> Result<(), ResourceError> {
        lock(&self.resources).set_material_uniform(material, uniform, data, num)
    }

    pub fn set_material_texture(
        &self,
        material: MaterialHandle,
        stage: u8,
        sampler: UniformHandle,
        texture: TextureHandle,
        flags: SamplerFlags,
    ) -> Result<(), ResourceError> {
        self.validate("set_material_texture", |s| {
            s.check((stage as usize) < MAX_TEXTURE_SAMPLERS, ValidationCode::InvalidParameter, || {
                format!("texture stage {stage} out of range")
            })
        })?;
        self.with_resources(|res, frame| res.set_material_texture(frame, material, stage, sampler, texture, flags))
    }

    pub fn destroy_material(&self, handle: MaterialHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| res.destroy_material(frame, handle))
    }
}

#[cfg(test)]
mod tests {
    use crate::context::tests::headless_context;
    use tessel_core::config::Threading;
    use tessel_core::handle::*;
    use tessel_core::renderer::flags::TextureFlags;
    use tessel_core::renderer::{Attrib, AttribType, TextureFormat, VertexLayout};

    #[test]
    fn transient_index_allocation_is_clipped() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let size = context.limits.transient_ib_size;
        let first = context.alloc_transient_index_buffer(size / 2 - 1, false);
        assert_eq!(first.num_indices(), size / 2 - 1);
        assert_eq!(context.get_avail_transient_index_buffer(10, false), 1);
        let rest = context.alloc_transient_index_buffer(10, false);
        assert_eq!(rest.num_indices(), 1);
        assert_eq!(context.get_avail_transient_index_buffer(1, false), 0);

        context.frame();
        assert_eq!(context.get_avail_transient_index_buffer(10, false), 10);
    }

    #[test]
    fn transient_vertices_need_a_registered_layout() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        assert!(context.alloc_transient_vertex_buffer(3, VertexLayoutHandle::INVALID).is_err());

        let layout = VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .end();
        let handle = context.create_vertex_layout(&layout).unwrap();
        let tvb = context.alloc_transient_vertex_buffer(3, handle).unwrap();
        assert_eq!(tvb.num_vertices(), 3);
        assert_eq!(tvb.stride, 12);
        context.destroy_vertex_layout(handle).unwrap();
    }

    #[test]
    fn instance_stride_is_rounded_up() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let idb = context.alloc_instance_data_buffer(4, 20);
        assert_eq!(idb.stride, 32);
        assert_eq!(idb.data.len(), 128);
    }

    #[test]
    fn read_back_lands_two_frames_later() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let texture = context
            .create_texture_2d(4, 4, false, 1, TextureFormat::RGBA8, TextureFlags::READ_BACK, None)
            .unwrap();
        let (ready, _slot) = context.read_texture(texture, 0).unwrap();
        assert_eq!(ready, context.frame_num() + 2);
        context.destroy_texture(texture).unwrap();
    }

    #[test]
    fn frame_buffer_owns_its_texture() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let fb = context
            .create_frame_buffer(64, 32, TextureFormat::RGBA8, TextureFlags::EMPTY)
            .unwrap();
        let texture = context.get_texture(fb, 0).unwrap();
        assert_eq!(context.texture_info(texture).map(|i| (i.width, i.height)), Some((64, 32)));
        context.destroy_frame_buffer(fb).unwrap();
        context.frame();
        context.frame();
        assert!(context.texture_info(texture).is_none());
    }
}
