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

//! In-memory reference backend.
//!
//! Keeps every resource on the CPU, executes the sorted items of each frame without
//! rasterizing them, and reports what it saw through a [`HeadlessCapture`]. Clears,
//! texture updates, blits and read backs operate on real pixel storage so their
//! results can be checked.

mod capture;
mod resources;

pub use capture::{FrameReport, HeadlessCapture, HeadlessEvent, SubmittedItem};

use resources::{blit, encode_color, encode_depth, unpack_rgba, Buffer, FrameBuffer, Program, Slots, Texture, Uniform};
use std::collections::HashMap;
use tessel_core::callback::{Callback, ScreenShot};
use tessel_core::config::Init;
use tessel_core::error::ResourceError;
use tessel_core::handle::*;
use tessel_core::limits::MAX_COLOR_PALETTE;
use tessel_core::memory::Memory;
use tessel_core::renderer::frame::BindingType;
use tessel_core::renderer::shader::{ShaderBinary, ShaderStage};
use tessel_core::renderer::sort_key::SORT_KEY_PROGRAM_NONE;
use tessel_core::renderer::uniform_buffer::{UniformOpcode, UniformPayload};
use tessel_core::renderer::*;

/// The headless renderer.
#[derive(Debug)]
pub struct HeadlessRenderer {
    caps: Caps,
    capture: HeadlessCapture,
    layouts: Slots<VertexLayout>,
    index_buffers: Slots<Buffer>,
    vertex_buffers: Slots<Buffer>,
    shaders: Slots<ShaderBinary>,
    programs: Slots<Program>,
    textures: Slots<Texture>,
    frame_buffers: Slots<FrameBuffer>,
    uniforms: Slots<Uniform>,
    handle_values: HashMap<u16, Vec<u8>>,
    view_names: HashMap<ViewId, String>,
    names: HashMap<AnyHandle, String>,
    backbuffer: [u8; 4],
    resolution: (u32, u32),
}

fn headless_caps(init: &Init) -> Caps {
    let formats = TextureFormat::ALL
        .iter()
        .map(|&format| {
            if format.is_marker() {
                FormatCaps::EMPTY
            } else if format.is_compressed() {
                FormatCaps::TEXTURE_2D | FormatCaps::TEXTURE_CUBE
            } else if format.is_depth() {
                FormatCaps::TEXTURE_2D | FormatCaps::FRAMEBUFFER
            } else {
                FormatCaps::TEXTURE_2D
                    | FormatCaps::TEXTURE_3D
                    | FormatCaps::TEXTURE_CUBE
                    | FormatCaps::VERTEX
                    | FormatCaps::IMAGE_RW
                    | FormatCaps::FRAMEBUFFER
                    | FormatCaps::MIP_AUTOGEN
            }
        })
        .collect();
    Caps {
        renderer_type: RendererType::Headless,
        supported: CapsFlags::COMPUTE
            | CapsFlags::DRAW_INDIRECT
            | CapsFlags::INDEX32
            | CapsFlags::INSTANCING
            | CapsFlags::OCCLUSION_QUERY
            | CapsFlags::RENDERER_MULTITHREADED
            | CapsFlags::SWAP_CHAIN
            | CapsFlags::TEXTURE_2D_ARRAY
            | CapsFlags::TEXTURE_3D
            | CapsFlags::TEXTURE_BLIT
            | CapsFlags::TEXTURE_CUBE_ARRAY
            | CapsFlags::TEXTURE_READ_BACK
            | CapsFlags::IMAGE_RW,
        homogeneous_depth: false,
        origin_bottom_left: false,
        limits: CapsLimits {
            max_encoders: init.limits.max_encoders as u32,
            transient_vb_size: init.limits.transient_vb_size,
            transient_ib_size: init.limits.transient_ib_size,
            ..CapsLimits::default()
        },
        formats,
    }
}

impl HeadlessRenderer {
    /// Creates the backend, reporting into `capture`.
    pub fn new(init: &Init, capture: HeadlessCapture) -> Self {
        log::info!(
            "Headless renderer created ({}x{})",
            init.resolution.width,
            init.resolution.height
        );
        Self {
            caps: headless_caps(init),
            capture,
            layouts: Slots::default(),
            index_buffers: Slots::default(),
            vertex_buffers: Slots::default(),
            shaders: Slots::default(),
            programs: Slots::default(),
            textures: Slots::default(),
            frame_buffers: Slots::default(),
            uniforms: Slots::default(),
            handle_values: HashMap::new(),
            view_names: HashMap::new(),
            names: HashMap::new(),
            backbuffer: [0, 0, 0, 255],
            resolution: (init.resolution.width, init.resolution.height),
        }
    }

    /// The capture this backend reports into.
    pub fn capture(&self) -> &HeadlessCapture {
        &self.capture
    }

    /// Contents of a texture level.
    pub fn texture_data(&self, handle: TextureHandle, layer: u16, mip: u8) -> Option<&[u8]> {
        self.textures.get(handle.idx())?.level(layer, mip)
    }

    /// Contents of an index buffer.
    pub fn index_buffer_data(&self, handle: IndexBufferHandle) -> Option<&[u8]> {
        self.index_buffers.get(handle.idx()).map(|b| b.data.as_slice())
    }

    /// Contents of a vertex buffer.
    pub fn vertex_buffer_data(&self, handle: VertexBufferHandle) -> Option<&[u8]> {
        self.vertex_buffers.get(handle.idx()).map(|b| b.data.as_slice())
    }

    /// Last value assigned to a uniform.
    pub fn uniform_value(&self, handle: UniformHandle) -> Option<&[u8]> {
        self.uniforms.get(handle.idx()).map(|u| u.value.as_slice())
    }

    /// Name given to a resource.
    pub fn name_of(&self, handle: AnyHandle) -> Option<&str> {
        self.names.get(&handle).map(String::as_str)
    }

    /// Name given to a view.
    pub fn view_name(&self, view: ViewId) -> Option<&str> {
        self.view_names.get(&view).map(String::as_str)
    }

    /// Number of live resources of each kind this backend stores.
    pub fn num_textures(&self) -> usize {
        self.textures.len()
    }

    fn event(&self, command: CommandType, handle: impl Into<AnyHandle>, size: usize) {
        self.capture.record(HeadlessEvent::Command {
            command,
            handle: handle.into(),
            size: size as u32,
        });
    }

    fn stream_vertices(&self, stream: &VertexStream) -> u32 {
        let Some(buffer) = self.vertex_buffers.get(stream.handle.idx()) else {
            return 0;
        };
        let layout = if stream.layout.is_valid() { stream.layout } else { buffer.layout };
        let stride = self.layouts.get(layout.idx()).map_or(0, |l| l.stride() as u32);
        if stride == 0 {
            return 0;
        }
        (buffer.data.len() as u32 / stride).saturating_sub(stream.start_vertex)
    }

    /// Primitives a draw would emit, times its instances. Used as the occlusion
    /// result of the draw.
    fn draw_samples(&self, draw: &RenderDraw) -> u32 {
        let count = if draw.index_buffer.is_valid() {
            if draw.num_indices == u32::MAX {
                let index_size = if draw.submit_flags.contains(SubmitFlags::INDEX32) { 4 } else { 2 };
                let available = self
                    .index_buffers
                    .get(draw.index_buffer.idx())
                    .map_or(0, |b| b.data.len() as u32 / index_size);
                available.saturating_sub(draw.start_index)
            } else {
                draw.num_indices
            }
        } else if draw.num_vertices != u32::MAX {
            draw.num_vertices
        } else {
            draw.bound_streams()
                .map(|(_, s)| self.stream_vertices(s))
                .min()
                .unwrap_or(0)
        };
        count.saturating_mul(draw.num_instances.max(1))
    }

    fn check_draw(&self, draw: &RenderDraw, missing: &mut Vec<AnyHandle>) {
        let mut require = |ok: bool, handle: AnyHandle| {
            if !ok && !missing.contains(&handle) {
                missing.push(handle);
            }
        };
        if draw.index_buffer.is_valid() {
            require(self.index_buffers.contains(draw.index_buffer.idx()), draw.index_buffer.into());
        }
        for (_, stream) in draw.bound_streams() {
            require(self.vertex_buffers.contains(stream.handle.idx()), stream.handle.into());
            if stream.layout.is_valid() {
                require(self.layouts.contains(stream.layout.idx()), stream.layout.into());
            }
        }
        if draw.instance_data_buffer.is_valid() {
            require(
                self.vertex_buffers.contains(draw.instance_data_buffer.idx()),
                draw.instance_data_buffer.into(),
            );
        }
        if draw.indirect_buffer.is_valid() {
            let backing = draw.indirect_buffer.as_vertex_buffer();
            require(self.vertex_buffers.contains(backing.idx()), draw.indirect_buffer.into());
        }
    }

    fn check_bindings(&self, bind: &RenderBind, missing: &mut Vec<AnyHandle>) {
        for (_, binding) in bind.bound() {
            let (ok, handle): (bool, AnyHandle) = match binding.ty {
                BindingType::Texture | BindingType::Image => (
                    self.textures.contains(binding.idx),
                    TextureHandle(binding.idx).into(),
                ),
                BindingType::IndexBuffer => (
                    self.index_buffers.contains(binding.idx),
                    IndexBufferHandle(binding.idx).into(),
                ),
                BindingType::VertexBuffer => (
                    self.vertex_buffers.contains(binding.idx),
                    VertexBufferHandle(binding.idx).into(),
                ),
            };
            if !ok && !missing.contains(&handle) {
                missing.push(handle);
            }
        }
    }

    fn apply_uniform(&mut self, opcode: UniformOpcode, payload: UniformPayload<'_>) {
        if opcode.ty == UniformType::Sampler {
            return;
        }
        let value = match payload {
            UniformPayload::Inline(bytes) => bytes.to_vec(),
            UniformPayload::Handle(handle) => match self.handle_values.get(&handle.idx()) {
                Some(value) => value.clone(),
                None => return,
            },
        };
        if let Some(uniform) = self.uniforms.get_mut(opcode.loc) {
            uniform.value = value;
        }
    }

    fn clear_view(&mut self, id: ViewId, view: &View, palette: &[[f32; 4]; MAX_COLOR_PALETTE], report: &mut FrameReport) {
        let clear = view.clear;
        if !clear.flags.intersects(ClearFlags::COLOR | ClearFlags::DEPTH | ClearFlags::STENCIL) {
            return;
        }
        report.cleared.push(id);
        let color_of = |attachment: usize| {
            if clear.use_palette {
                let entry = clear.index[attachment.min(7)] as usize;
                palette[entry.min(MAX_COLOR_PALETTE - 1)]
            } else {
                unpack_rgba(clear.rgba)
            }
        };
        let bgra = |rgba: [f32; 4]| {
            let mut pixel = [0u8; 4];
            if let Some(encoded) = encode_color(TextureFormat::BGRA8, rgba) {
                pixel.copy_from_slice(&encoded);
            }
            pixel
        };

        if !view.frame_buffer.is_valid() {
            if clear.flags.contains(ClearFlags::COLOR) {
                self.backbuffer = bgra(color_of(0));
            }
            return;
        }
        let Some(frame_buffer) = self.frame_buffers.get_mut(view.frame_buffer.idx()) else {
            report.missing.push(view.frame_buffer.into());
            return;
        };
        if frame_buffer.window.is_some() {
            if clear.flags.contains(ClearFlags::COLOR) {
                frame_buffer.color = bgra(color_of(0));
            }
            return;
        }
        let attachments = frame_buffer.attachments.clone();
        let mut color_attachment = 0;
        for attachment in &attachments {
            let Some(texture) = self.textures.get_mut(attachment.handle.idx()) else {
                continue;
            };
            let pixel = if texture.format.is_depth() {
                if !clear.flags.contains(ClearFlags::DEPTH) {
                    continue;
                }
                encode_depth(texture.format, clear.depth)
            } else {
                color_attachment += 1;
                if !clear.flags.contains(ClearFlags::COLOR) {
                    continue;
                }
                encode_color(texture.format, color_of(color_attachment - 1))
            };
            let Some(pixel) = pixel else {
                log::trace!("Headless clear skips format {:?}", texture.format);
                continue;
            };
            for layer in attachment.layer..attachment.layer + attachment.num_layers.max(1) {
                texture.fill(layer, attachment.mip as u8, Some(view.rect), &pixel);
            }
        }
    }

    fn run_blit(&mut self, view: ViewId, item: &BlitItem, report: &mut FrameReport) {
        if item.src == item.dst {
            log::warn!("Blit from texture {} onto itself ignored", item.src.idx());
            return;
        }
        let Some(src) = self.textures.remove(item.src.idx()) else {
            report.missing.push(item.src.into());
            return;
        };
        match self.textures.get_mut(item.dst.idx()) {
            Some(dst) => {
                if blit(&src, dst, item) {
                    report.blits.push((view, item.src, item.dst));
                } else {
                    log::warn!(
                        "Blit between {:?} and {:?} is not supported",
                        src.format,
                        dst.format
                    );
                }
            }
            None => report.missing.push(item.dst.into()),
        }
        self.textures.insert(item.src.idx(), src);
    }

    fn backbuffer_shot(&self, path: &str) -> ScreenShot {
        let (width, height) = self.resolution;
        ScreenShot {
            path: path.to_owned(),
            width,
            height,
            pitch: width * 4,
            data: self.backbuffer.repeat((width * height) as usize),
            yflip: false,
        }
    }
}

impl RendererContext for HeadlessRenderer {
    fn renderer_type(&self) -> RendererType {
        RendererType::Headless
    }

    fn caps(&self) -> &Caps {
        &self.caps
    }

    fn is_device_removed(&self) -> bool {
        self.capture.is_device_removed()
    }

    fn flip(&mut self) {
        self.capture.flip();
    }

    fn create_vertex_layout(&mut self, handle: VertexLayoutHandle, layout: &VertexLayout) {
        self.event(CommandType::CreateVertexLayout, handle, layout.stride() as usize);
        self.layouts.insert(handle.idx(), layout.clone());
    }

    fn destroy_vertex_layout(&mut self, handle: VertexLayoutHandle) {
        self.event(CommandType::DestroyVertexLayout, handle, 0);
        self.layouts.remove(handle.idx());
    }

    fn create_index_buffer(&mut self, handle: IndexBufferHandle, mem: &Memory, flags: BufferFlags) -> Result<(), ResourceError> {
        self.event(CommandType::CreateIndexBuffer, handle, mem.as_slice().len());
        let buffer = Buffer::new(mem.as_slice().to_vec(), flags, VertexLayoutHandle::INVALID);
        self.index_buffers.insert(handle.idx(), buffer);
        Ok(())
    }

    fn destroy_index_buffer(&mut self, handle: IndexBufferHandle) {
        self.event(CommandType::DestroyIndexBuffer, handle, 0);
        self.index_buffers.remove(handle.idx());
    }

    fn create_vertex_buffer(
        &mut self,
        handle: VertexBufferHandle,
        mem: &Memory,
        layout: VertexLayoutHandle,
        flags: BufferFlags,
    ) -> Result<(), ResourceError> {
        self.event(CommandType::CreateVertexBuffer, handle, mem.as_slice().len());
        if layout.is_valid() && !self.layouts.contains(layout.idx()) {
            return Err(ResourceError::invalid_handle(HandleKind::VertexLayout, layout.idx()));
        }
        self.vertex_buffers
            .insert(handle.idx(), Buffer::new(mem.as_slice().to_vec(), flags, layout));
        Ok(())
    }

    fn destroy_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        self.event(CommandType::DestroyVertexBuffer, handle, 0);
        self.vertex_buffers.remove(handle.idx());
    }

    fn create_dynamic_index_buffer(&mut self, handle: IndexBufferHandle, size: u32, flags: BufferFlags) -> Result<(), ResourceError> {
        self.event(CommandType::CreateDynamicIndexBuffer, handle, size as usize);
        let buffer = Buffer::new(vec![0; size as usize], flags, VertexLayoutHandle::INVALID);
        self.index_buffers.insert(handle.idx(), buffer);
        Ok(())
    }

    fn update_dynamic_index_buffer(&mut self, handle: IndexBufferHandle, offset: u32, size: u32, mem: &Memory) {
        self.event(CommandType::UpdateDynamicIndexBuffer, handle, mem.as_slice().len());
        match self.index_buffers.get_mut(handle.idx()) {
            Some(buffer) => buffer.update(offset, size, mem.as_slice()),
            None => log::warn!("Update of unknown index buffer {}", handle.idx()),
        }
    }

    fn destroy_dynamic_index_buffer(&mut self, handle: IndexBufferHandle) {
        self.event(CommandType::DestroyDynamicIndexBuffer, handle, 0);
        self.index_buffers.remove(handle.idx());
    }

    fn create_dynamic_vertex_buffer(
        &mut self,
        handle: VertexBufferHandle,
        size: u32,
        flags: BufferFlags,
    ) -> Result<(), ResourceError> {
        self.event(CommandType::CreateDynamicVertexBuffer, handle, size as usize);
        let buffer = Buffer::new(vec![0; size as usize], flags, VertexLayoutHandle::INVALID);
        self.vertex_buffers.insert(handle.idx(), buffer);
        Ok(())
    }

    fn update_dynamic_vertex_buffer(&mut self, handle: VertexBufferHandle, offset: u32, size: u32, mem: &Memory) {
        self.event(CommandType::UpdateDynamicVertexBuffer, handle, mem.as_slice().len());
        match self.vertex_buffers.get_mut(handle.idx()) {
            Some(buffer) => buffer.update(offset, size, mem.as_slice()),
            None => log::warn!("Update of unknown vertex buffer {}", handle.idx()),
        }
    }

    fn destroy_dynamic_vertex_buffer(&mut self, handle: VertexBufferHandle) {
        self.event(CommandType::DestroyDynamicVertexBuffer, handle, 0);
        self.vertex_buffers.remove(handle.idx());
    }

    fn create_shader(&mut self, handle: ShaderHandle, mem: &Memory) -> Result<(), ResourceError> {
        self.event(CommandType::CreateShader, handle, mem.as_slice().len());
        let binary = ShaderBinary::parse(mem.as_slice())?;
        log::debug!(
            "Shader {} ({:?}, {} uniforms, {} bytes of code)",
            handle.idx(),
            binary.stage,
            binary.uniforms.len(),
            binary.code.len()
        );
        self.shaders.insert(handle.idx(), binary);
        Ok(())
    }

    fn destroy_shader(&mut self, handle: ShaderHandle) {
        self.event(CommandType::DestroyShader, handle, 0);
        self.shaders.remove(handle.idx());
    }

    fn create_program(&mut self, handle: ProgramHandle, vsh: ShaderHandle, fsh: ShaderHandle) -> Result<(), ResourceError> {
        self.event(CommandType::CreateProgram, handle, 0);
        let vs = self
            .shaders
            .get(vsh.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Shader, vsh.idx()))?;
        let compute = vs.stage == ShaderStage::Compute;
        let fsh = if fsh.is_valid() {
            let fs = self
                .shaders
                .get(fsh.idx())
                .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Shader, fsh.idx()))?;
            if vs.hash_out != fs.hash_in {
                log::warn!(
                    "Program {}: vertex outputs {:#010x} do not match fragment inputs {:#010x}",
                    handle.idx(),
                    vs.hash_out,
                    fs.hash_in
                );
            }
            Some(fsh.idx())
        } else {
            None
        };
        self.programs.insert(
            handle.idx(),
            Program {
                vsh: vsh.idx(),
                fsh,
                compute,
            },
        );
        Ok(())
    }

    fn destroy_program(&mut self, handle: ProgramHandle) {
        self.event(CommandType::DestroyProgram, handle, 0);
        if let Some(program) = self.programs.remove(handle.idx()) {
            log::trace!(
                "Program {} (vs {}, fs {:?}) destroyed",
                handle.idx(),
                program.vsh,
                program.fsh
            );
        }
    }

    fn create_texture(&mut self, handle: TextureHandle, desc: &TextureDesc, mem: Option<&Memory>) -> Result<(), ResourceError> {
        self.event(CommandType::CreateTexture, handle, mem.map_or(0, |m| m.as_slice().len()));
        if desc.texture_format().is_marker() {
            return Err(ResourceError::invalid_parameter(format!(
                "texture {} has no usable format",
                handle.idx()
            )));
        }
        let mut texture = Texture::new(desc);
        if let Some(mem) = mem {
            texture.load(mem.as_slice());
        }
        self.textures.insert(handle.idx(), texture);
        Ok(())
    }

    fn update_texture(&mut self, handle: TextureHandle, side: u8, mip: u8, rect: &TextureRect, pitch: u16, mem: &Memory) {
        self.event(CommandType::UpdateTexture, handle, mem.as_slice().len());
        match self.textures.get_mut(handle.idx()) {
            Some(texture) => texture.update(side, mip, rect, pitch, mem.as_slice()),
            None => log::warn!("Update of unknown texture {}", handle.idx()),
        }
    }

    fn resize_texture(&mut self, handle: TextureHandle, width: u16, height: u16, num_mips: u8, num_layers: u16) {
        self.event(CommandType::ResizeTexture, handle, 0);
        if let Some(texture) = self.textures.get_mut(handle.idx()) {
            texture.resize(width, height, num_mips, num_layers);
        }
    }

    fn read_texture(&mut self, handle: TextureHandle, mip: u8, target: &ReadbackSlot) {
        self.event(CommandType::ReadTexture, handle, 0);
        match self.textures.get(handle.idx()).and_then(|t| t.level(0, mip)) {
            Some(level) => target.fill(level.to_vec()),
            None => log::warn!("Read back of texture {} mip {mip} failed", handle.idx()),
        }
    }

    fn override_internal(&mut self, handle: TextureHandle, native: usize) -> bool {
        match self.textures.get_mut(handle.idx()) {
            Some(texture) => {
                texture.native = Some(native);
                true
            }
            None => false,
        }
    }

    fn destroy_texture(&mut self, handle: TextureHandle) {
        self.event(CommandType::DestroyTexture, handle, 0);
        self.textures.remove(handle.idx());
    }

    fn create_frame_buffer(&mut self, handle: FrameBufferHandle, attachments: &[Attachment]) -> Result<(), ResourceError> {
        self.event(CommandType::CreateFrameBuffer, handle, attachments.len());
        let mut size = None;
        for attachment in attachments {
            let texture = self
                .textures
                .get(attachment.handle.idx())
                .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Texture, attachment.handle.idx()))?;
            let (w, h, _) = texture.mip_dims(attachment.mip as u8);
            size.get_or_insert((w, h));
        }
        let (width, height) = size.unwrap_or((0, 0));
        self.frame_buffers.insert(
            handle.idx(),
            FrameBuffer {
                attachments: attachments.to_vec(),
                window: None,
                width,
                height,
                color: [0, 0, 0, 255],
            },
        );
        Ok(())
    }

    fn create_frame_buffer_window(&mut self, handle: FrameBufferHandle, window: &WindowTarget) -> Result<(), ResourceError> {
        self.event(CommandType::CreateFrameBuffer, handle, 0);
        self.frame_buffers.insert(
            handle.idx(),
            FrameBuffer {
                attachments: Vec::new(),
                window: Some(*window),
                width: window.width as u32,
                height: window.height as u32,
                color: [0, 0, 0, 255],
            },
        );
        Ok(())
    }

    fn destroy_frame_buffer(&mut self, handle: FrameBufferHandle) {
        self.event(CommandType::DestroyFrameBuffer, handle, 0);
        self.frame_buffers.remove(handle.idx());
    }

    fn create_uniform(&mut self, handle: UniformHandle, ty: UniformType, num: u16, name: &str) {
        self.event(CommandType::CreateUniform, handle, (ty.size() * num as u32) as usize);
        let value = vec![0; (ty.size() * num as u32) as usize];
        self.uniforms.insert(
            handle.idx(),
            Uniform {
                ty,
                num,
                name: name.to_owned(),
                value,
            },
        );
    }

    fn update_uniform(&mut self, loc: u16, data: &[u8]) {
        self.handle_values.insert(loc, data.to_vec());
    }

    fn destroy_uniform(&mut self, handle: UniformHandle) {
        self.event(CommandType::DestroyUniform, handle, 0);
        if let Some(uniform) = self.uniforms.remove(handle.idx()) {
            log::trace!("Uniform '{}' ({:?}[{}]) destroyed", uniform.name, uniform.ty, uniform.num);
        }
        self.handle_values.remove(&handle.idx());
    }

    fn invalidate_occlusion_query(&mut self, handle: OcclusionQueryHandle) {
        self.event(CommandType::InvalidateOcclusionQuery, handle, 0);
    }

    fn update_view_name(&mut self, view: ViewId, name: &str) {
        self.view_names.insert(view, name.to_owned());
    }

    fn set_name(&mut self, handle: AnyHandle, name: &str) {
        self.event(CommandType::SetName, handle, name.len());
        self.names.insert(handle, name.to_owned());
    }

    fn set_marker(&mut self, marker: &str) {
        log::trace!("Headless marker: {marker}");
    }

    fn request_screen_shot(&mut self, handle: FrameBufferHandle, path: &str, callback: &dyn Callback) {
        if !handle.is_valid() {
            callback.screen_shot(self.backbuffer_shot(path));
            return;
        }
        let Some(frame_buffer) = self.frame_buffers.get(handle.idx()) else {
            log::warn!("Screenshot of unknown frame buffer {}", handle.idx());
            return;
        };
        if frame_buffer.window.is_some() {
            let (width, height) = (frame_buffer.width, frame_buffer.height);
            callback.screen_shot(ScreenShot {
                path: path.to_owned(),
                width,
                height,
                pitch: width * 4,
                data: frame_buffer.color.repeat((width * height) as usize),
                yflip: false,
            });
            return;
        }
        let color = frame_buffer.attachments.iter().find_map(|a| {
            let texture = self.textures.get(a.handle.idx())?;
            (!texture.format.is_depth()).then_some((a, texture))
        });
        let Some((attachment, texture)) = color else {
            log::warn!("Frame buffer {} has no color attachment to capture", handle.idx());
            return;
        };
        let Some(level) = texture.level(attachment.layer, attachment.mip as u8) else {
            return;
        };
        let data = match texture.format {
            TextureFormat::BGRA8 => level.to_vec(),
            TextureFormat::RGBA8 => level
                .chunks_exact(4)
                .flat_map(|p| [p[2], p[1], p[0], p[3]])
                .collect(),
            other => {
                log::warn!("Screenshots of {other:?} frame buffers are not supported");
                return;
            }
        };
        let (width, height, _) = texture.mip_dims(attachment.mip as u8);
        callback.screen_shot(ScreenShot {
            path: path.to_owned(),
            width,
            height,
            pitch: width * 4,
            data,
            yflip: false,
        });
    }

    fn submit(&mut self, frame: &mut Frame) {
        self.resolution = (frame.resolution.width, frame.resolution.height);
        let mut report = FrameReport::new(frame.frame_num);

        let vb = &frame.transient_vb;
        if vb.handle.is_valid() && !vb.data().is_empty() {
            if let Some(buffer) = self.vertex_buffers.get_mut(vb.handle.idx()) {
                buffer.update(0, vb.data().len() as u32, vb.data());
                report.transient_vb_bytes = vb.data().len() as u32;
            }
        }
        let ib = &frame.transient_ib;
        if ib.handle.is_valid() && !ib.data().is_empty() {
            if let Some(buffer) = self.index_buffers.get_mut(ib.handle.idx()) {
                buffer.update(0, ib.data().len() as u32, ib.data());
                report.transient_ib_bytes = ib.data().len() as u32;
            }
        }

        let blits: Vec<(ViewId, BlitItem)> = frame.sorted_blits().map(|(v, b)| (v, *b)).collect();
        let mut next_blit = 0;
        let mut current_view = None;
        let mut occlusion: Vec<(OcclusionQueryHandle, i32)> = Vec::new();

        for (key, is_draw, item, bind) in frame.sorted_items() {
            let culled = frame.is_view_culled(key.view);
            if current_view != Some(key.view) {
                current_view = Some(key.view);
                let position = frame.view_remap[key.view as usize];
                while let Some((blit_view, blit_item)) = blits.get(next_blit) {
                    if frame.view_remap[*blit_view as usize] > position {
                        break;
                    }
                    self.run_blit(*blit_view, blit_item, &mut report);
                    next_blit += 1;
                }
                report.views.push(key.view);
                if !culled {
                    self.clear_view(key.view, &frame.views[key.view as usize], &frame.color_palette, &mut report);
                }
            }

            if culled {
                report.culled += 1;
                if let RenderItem::Draw(draw) = item {
                    if draw.occlusion_query.is_valid() {
                        occlusion.push((draw.occlusion_query, 0));
                    }
                }
                continue;
            }

            let touch = is_draw && key.program == SORT_KEY_PROGRAM_NONE;
            let program_ok = touch || self.programs.get(key.program).is_some_and(|p| p.compute != is_draw);
            if !program_ok {
                let handle: AnyHandle = ProgramHandle(key.program).into();
                if !report.missing.contains(&handle) {
                    report.missing.push(handle);
                }
            }
            self.check_bindings(bind, &mut report.missing);

            let (uniform_idx, begin, end, samples) = match item {
                RenderItem::Draw(_) if touch => (0, 0, 0, 0),
                RenderItem::Draw(draw) => {
                    self.check_draw(draw, &mut report.missing);
                    let samples = self.draw_samples(draw);
                    if draw.occlusion_query.is_valid() {
                        occlusion.push((draw.occlusion_query, samples as i32));
                    }
                    (draw.uniform_idx, draw.uniform_begin, draw.uniform_end, samples)
                }
                RenderItem::Compute(compute) => {
                    if compute.indirect_buffer.is_valid()
                        && !self.vertex_buffers.contains(compute.indirect_buffer.as_vertex_buffer().idx())
                    {
                        report.missing.push(compute.indirect_buffer.into());
                    }
                    (compute.uniform_idx, compute.uniform_begin, compute.uniform_end, 0)
                }
            };
            if let Some(uniforms) = frame.uniform_buffers.get(uniform_idx as usize) {
                for (opcode, payload) in uniforms.read(begin, end) {
                    self.apply_uniform(opcode, payload);
                    report.uniform_updates += 1;
                }
            }

            report.items.push(SubmittedItem {
                view: key.view,
                program: key.program,
                depth: key.depth,
                seq: key.seq,
                is_draw,
                samples,
            });
        }

        for (view, item) in &blits[next_blit.min(blits.len())..] {
            self.run_blit(*view, item, &mut report);
        }
        for (query, result) in occlusion {
            if let Some(slot) = frame.occlusion.get_mut(query.idx() as usize) {
                *slot = result;
            }
        }
        if !report.missing.is_empty() {
            log::warn!("Frame {} referenced {} unknown resources", frame.frame_num, report.missing.len());
        }
        self.capture.push_report(report);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use tessel_core::error::Fatal;
    use tessel_core::renderer::sort_key::SortKey;

    #[derive(Default)]
    struct ShotCollector {
        shots: Mutex<Vec<ScreenShot>>,
    }

    impl Callback for ShotCollector {
        fn fatal(&self, _code: Fatal, _message: &str) {}

        fn screen_shot(&self, shot: ScreenShot) {
            self.shots.lock().unwrap().push(shot);
        }
    }

    fn renderer() -> (HeadlessRenderer, HeadlessCapture) {
        let capture = HeadlessCapture::new();
        let mut init = Init::default();
        init.resolution.width = 4;
        init.resolution.height = 2;
        (HeadlessRenderer::new(&init, capture.clone()), capture)
    }

    fn shader(stage: ShaderStage) -> Memory {
        Memory::from_vec(ShaderBinary::new(stage, 1, 1, vec![0u8; 8]).encode())
    }

    fn program(r: &mut HeadlessRenderer, handle: ProgramHandle) {
        r.create_shader(ShaderHandle(0), &shader(ShaderStage::Vertex)).unwrap();
        r.create_shader(ShaderHandle(1), &shader(ShaderStage::Fragment)).unwrap();
        r.create_program(handle, ShaderHandle(0), ShaderHandle(1)).unwrap();
    }

    fn draw_key(view: ViewId, program: u16) -> u64 {
        SortKey {
            view,
            program,
            ..SortKey::default()
        }
        .encode_draw(ViewMode::Default)
    }

    fn draw_with_vertices(vb: VertexBufferHandle) -> RenderDraw {
        let mut draw = RenderDraw::default();
        draw.set_vertex_stream(
            0,
            VertexStream {
                handle: vb,
                start_vertex: 0,
                layout: VertexLayoutHandle::INVALID,
            },
            3,
        );
        draw.resolve_vertex_count();
        draw
    }

    fn triangle_buffers(r: &mut HeadlessRenderer) -> VertexBufferHandle {
        let layout = VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .end();
        r.create_vertex_layout(VertexLayoutHandle(0), &layout);
        let vb = VertexBufferHandle(0);
        r.create_vertex_buffer(vb, &Memory::copy(&[0u8; 36]), VertexLayoutHandle(0), BufferFlags::EMPTY)
            .unwrap();
        vb
    }

    #[test]
    fn programs_need_known_shaders() {
        let (mut r, _) = renderer();
        let err = r.create_program(ProgramHandle(0), ShaderHandle(3), ShaderHandle::INVALID);
        assert_eq!(err, Err(ResourceError::invalid_handle(HandleKind::Shader, 3)));
        assert!(r.create_shader(ShaderHandle(0), &Memory::copy(b"junk")).is_err());
    }

    #[test]
    fn submit_reports_items_in_sorted_order() {
        let (mut r, capture) = renderer();
        program(&mut r, ProgramHandle(2));
        let vb = triangle_buffers(&mut r);
        let mut frame = Frame::new(1, 64);
        frame.start(5);
        frame.put_item(0, draw_key(1, 2), RenderItem::Draw(draw_with_vertices(vb)), RenderBind::default());
        frame.put_item(1, draw_key(0, 2), RenderItem::Draw(draw_with_vertices(vb)), RenderBind::default());
        frame.sort();
        r.submit(&mut frame);

        let report = capture.last_report().unwrap();
        assert_eq!(report.frame_num, 5);
        assert_eq!(report.views, vec![0, 1]);
        assert_eq!(report.num_draws(), 2);
        assert!(report.missing.is_empty(), "{:?}", report.missing);
        assert_eq!(report.items[0].samples, 3);
    }

    #[test]
    fn missing_resources_are_reported() {
        let (mut r, capture) = renderer();
        let mut frame = Frame::new(1, 64);
        frame.put_item(
            0,
            draw_key(0, 7),
            RenderItem::Draw(draw_with_vertices(VertexBufferHandle(9))),
            RenderBind::default(),
        );
        frame.sort();
        r.submit(&mut frame);
        let missing = capture.last_report().unwrap().missing;
        assert!(missing.contains(&ProgramHandle(7).into()));
        assert!(missing.contains(&VertexBufferHandle(9).into()));
    }

    #[test]
    fn culled_views_report_invisible_queries() {
        let (mut r, capture) = renderer();
        program(&mut r, ProgramHandle(0));
        let vb = triangle_buffers(&mut r);
        let mut frame = Frame::new(1, 64);
        frame.views[0].rect = Rect::new(0, 0, 0, 0);
        let mut hidden = draw_with_vertices(vb);
        hidden.occlusion_query = OcclusionQueryHandle(0);
        let mut shown = draw_with_vertices(vb);
        shown.occlusion_query = OcclusionQueryHandle(1);
        frame.put_item(0, draw_key(0, 0), RenderItem::Draw(hidden), RenderBind::default());
        frame.put_item(1, draw_key(1, 0), RenderItem::Draw(shown), RenderBind::default());
        frame.sort();
        r.submit(&mut frame);

        assert_eq!(frame.occlusion_result(OcclusionQueryHandle(0)), 0);
        assert_eq!(frame.occlusion_result(OcclusionQueryHandle(1)), 3);
        let report = capture.last_report().unwrap();
        assert_eq!(report.culled, 1);
        assert_eq!(report.num_draws(), 1);
    }

    #[test]
    fn clear_fills_frame_buffer_attachments() {
        let (mut r, capture) = renderer();
        program(&mut r, ProgramHandle(0));
        let vb = triangle_buffers(&mut r);
        let color = TextureHandle(0);
        let depth = TextureHandle(1);
        let desc = |format| TextureDesc::new(2, 2, 1, 1, 1, format, false, TextureFlags::RT);
        r.create_texture(color, &desc(TextureFormat::RGBA8), None).unwrap();
        r.create_texture(depth, &desc(TextureFormat::D32F), None).unwrap();
        r.create_frame_buffer(FrameBufferHandle(0), &[Attachment::new(color), Attachment::new(depth)])
            .unwrap();

        let mut frame = Frame::new(1, 64);
        frame.views[3].frame_buffer = FrameBufferHandle(0);
        frame.views[3].rect = Rect::new(0, 0, 2, 2);
        frame.views[3].clear = Clear::color(ClearFlags::COLOR | ClearFlags::DEPTH, 0x11223344, 0.5, 0);
        frame.put_item(0, draw_key(3, 0), RenderItem::Draw(draw_with_vertices(vb)), RenderBind::default());
        frame.sort();
        r.submit(&mut frame);

        assert_eq!(capture.last_report().unwrap().cleared, vec![3]);
        let pixels = r.texture_data(color, 0, 0).unwrap();
        assert!(pixels.chunks(4).all(|p| p == [0x11, 0x22, 0x33, 0x44]));
        let depth_bytes = r.texture_data(depth, 0, 0).unwrap();
        assert_eq!(&depth_bytes[..4], &0.5f32.to_ne_bytes());
    }

    #[test]
    fn backbuffer_screenshot_uses_clear_color() {
        let (mut r, _) = renderer();
        program(&mut r, ProgramHandle(0));
        let vb = triangle_buffers(&mut r);
        let mut frame = Frame::new(1, 64);
        frame.resolution.width = 4;
        frame.resolution.height = 2;
        frame.views[0].rect = Rect::new(0, 0, 4, 2);
        frame.views[0].clear = Clear::color(ClearFlags::COLOR, 0xff000080, 1.0, 0);
        frame.put_item(0, draw_key(0, 0), RenderItem::Draw(draw_with_vertices(vb)), RenderBind::default());
        frame.sort();
        r.submit(&mut frame);

        let collector = ShotCollector::default();
        r.request_screen_shot(FrameBufferHandle::INVALID, "shot.png", &collector);
        let shots = collector.shots.lock().unwrap();
        assert_eq!(shots.len(), 1);
        assert_eq!((shots[0].width, shots[0].height, shots[0].pitch), (4, 2, 16));
        assert_eq!(&shots[0].data[..4], &[0, 0, 255, 128]);
        assert_eq!(shots[0].data.len(), 32);
    }

    #[test]
    fn uniform_streams_are_replayed() {
        let (mut r, capture) = renderer();
        program(&mut r, ProgramHandle(0));
        let vb = triangle_buffers(&mut r);
        r.create_uniform(UniformHandle(4), UniformType::Vec4, 1, "u_color");

        let mut frame = Frame::new(1, 64);
        let value = [1.0f32, 2.0, 3.0, 4.0];
        let begin = frame.uniform_buffers[0].pos();
        frame.uniform_buffers[0].write_uniform(UniformType::Vec4, 4, bytemuck::cast_slice(&value), 1);
        let mut draw = draw_with_vertices(vb);
        draw.uniform_begin = begin;
        draw.uniform_end = frame.uniform_buffers[0].pos();
        frame.put_item(0, draw_key(0, 0), RenderItem::Draw(draw), RenderBind::default());
        frame.finish();
        frame.sort();
        r.submit(&mut frame);

        assert_eq!(capture.last_report().unwrap().uniform_updates, 1);
        assert_eq!(r.uniform_value(UniformHandle(4)), Some(bytemuck::cast_slice::<f32, u8>(&value)));
    }

    #[test]
    fn read_back_fills_slot() {
        let (mut r, _) = renderer();
        let desc = TextureDesc::new(2, 1, 1, 1, 1, TextureFormat::R8, false, TextureFlags::READ_BACK);
        r.create_texture(TextureHandle(0), &desc, Some(&Memory::copy(&[7, 9]))).unwrap();
        let slot = ReadbackSlot::new();
        r.read_texture(TextureHandle(0), 0, &slot);
        assert_eq!(slot.take(), Some(vec![7, 9]));
    }

    #[test]
    fn removed_device_is_reported() {
        let (r, capture) = renderer();
        assert!(!r.is_device_removed());
        capture.remove_device();
        assert!(r.is_device_removed());
    }
}
