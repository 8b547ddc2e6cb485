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

//! Resource command streams.
//!
//! Every frame carries two command buffers: `cmd_pre` holds creates and updates and
//! is executed by the render thread before the frame's draws, `cmd_post` holds
//! destroys and read backs and is executed after them.
//!
//! A command is a `u8` tag followed by its fields in declaration order, each padded
//! to its natural alignment. Payloads that are not plain data (memory blocks, names,
//! vertex layouts, read back targets) are kept in a side table and referenced by a
//! `u32` index, so the byte stream itself stays `Pod`.

use super::flags::{BufferFlags, TextureFlags};
use super::format::TextureFormat;
use super::types::{RendererType, UniformType};
use super::vertex_layout::VertexLayout;
use crate::error::ResourceError;
use crate::handle::*;
use crate::memory::Memory;
use bytemuck::{Pod, Zeroable};
use std::sync::{Arc, Mutex};

/// Tag of a command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum CommandType {
    /// Create the backend.
    RendererInit,
    /// First half of shutdown, executed before the last frame's draws.
    RendererShutdownBegin,
    /// Register a vertex layout.
    CreateVertexLayout,
    /// Create a static index buffer.
    CreateIndexBuffer,
    /// Create a static vertex buffer.
    CreateVertexBuffer,
    /// Create a parent buffer for dynamic index ranges.
    CreateDynamicIndexBuffer,
    /// Write into a dynamic index parent.
    UpdateDynamicIndexBuffer,
    /// Create a parent buffer for dynamic vertex ranges.
    CreateDynamicVertexBuffer,
    /// Write into a dynamic vertex parent.
    UpdateDynamicVertexBuffer,
    /// Create a shader.
    CreateShader,
    /// Link a program.
    CreateProgram,
    /// Create a texture.
    CreateTexture,
    /// Write a texture region.
    UpdateTexture,
    /// Resize a backbuffer-ratio texture.
    ResizeTexture,
    /// Create a frame buffer.
    CreateFrameBuffer,
    /// Create or grow a uniform.
    CreateUniform,
    /// Name a view for debuggers.
    UpdateViewName,
    /// Forget an occlusion query result.
    InvalidateOcclusionQuery,
    /// Name a resource for debuggers.
    SetName,
    /// Separates pre commands from post commands and terminates a stream.
    End,
    /// Second half of shutdown; makes the render loop exit.
    RendererShutdownEnd,
    /// Destroy a vertex layout.
    DestroyVertexLayout,
    /// Destroy a static index buffer.
    DestroyIndexBuffer,
    /// Destroy a static vertex buffer.
    DestroyVertexBuffer,
    /// Destroy a dynamic index parent.
    DestroyDynamicIndexBuffer,
    /// Destroy a dynamic vertex parent.
    DestroyDynamicVertexBuffer,
    /// Destroy a shader.
    DestroyShader,
    /// Destroy a program.
    DestroyProgram,
    /// Destroy a texture.
    DestroyTexture,
    /// Destroy a frame buffer.
    DestroyFrameBuffer,
    /// Destroy a uniform.
    DestroyUniform,
    /// Copy texture contents back to the CPU.
    ReadTexture,
}

impl CommandType {
    const ALL: [CommandType; 32] = [
        CommandType::RendererInit,
        CommandType::RendererShutdownBegin,
        CommandType::CreateVertexLayout,
        CommandType::CreateIndexBuffer,
        CommandType::CreateVertexBuffer,
        CommandType::CreateDynamicIndexBuffer,
        CommandType::UpdateDynamicIndexBuffer,
        CommandType::CreateDynamicVertexBuffer,
        CommandType::UpdateDynamicVertexBuffer,
        CommandType::CreateShader,
        CommandType::CreateProgram,
        CommandType::CreateTexture,
        CommandType::UpdateTexture,
        CommandType::ResizeTexture,
        CommandType::CreateFrameBuffer,
        CommandType::CreateUniform,
        CommandType::UpdateViewName,
        CommandType::InvalidateOcclusionQuery,
        CommandType::SetName,
        CommandType::End,
        CommandType::RendererShutdownEnd,
        CommandType::DestroyVertexLayout,
        CommandType::DestroyIndexBuffer,
        CommandType::DestroyVertexBuffer,
        CommandType::DestroyDynamicIndexBuffer,
        CommandType::DestroyDynamicVertexBuffer,
        CommandType::DestroyShader,
        CommandType::DestroyProgram,
        CommandType::DestroyTexture,
        CommandType::DestroyFrameBuffer,
        CommandType::DestroyUniform,
        CommandType::ReadTexture,
    ];

    fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }

    /// `true` for commands that belong in `cmd_post`.
    pub fn is_post(self) -> bool {
        self as u8 > CommandType::End as u8
    }
}

/// Texture creation parameters as written into the command stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct TextureDesc {
    /// Creation flags.
    pub flags: u64,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
    /// Depth (3D textures).
    pub depth: u16,
    /// Array layers.
    pub num_layers: u16,
    /// Mip count.
    pub num_mips: u8,
    /// `TextureFormat` as `u8`.
    pub format: u8,
    /// `1` for cube maps.
    pub cube_map: u8,
    _pad: [u8; 5],
}

impl TextureDesc {
    /// Builds a descriptor.
    pub fn new(
        width: u16,
        height: u16,
        depth: u16,
        num_layers: u16,
        num_mips: u8,
        format: TextureFormat,
        cube_map: bool,
        flags: TextureFlags,
    ) -> Self {
        Self {
            flags: flags.bits(),
            width,
            height,
            depth,
            num_layers,
            num_mips,
            format: format as u8,
            cube_map: cube_map as u8,
            _pad: [0; 5],
        }
    }

    /// Creation flags.
    pub fn texture_flags(&self) -> TextureFlags {
        TextureFlags::from_bits_truncate(self.flags)
    }

    /// Pixel format, `Unknown` if the raw value is out of range.
    pub fn texture_format(&self) -> TextureFormat {
        TextureFormat::from_u8(self.format).unwrap_or(TextureFormat::Unknown)
    }
}

/// Region of a texture.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Pod, Zeroable)]
#[repr(C)]
pub struct TextureRect {
    /// X.
    pub x: u16,
    /// Y.
    pub y: u16,
    /// Z or layer.
    pub z: u16,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
    /// Depth.
    pub depth: u16,
}

/// One frame buffer attachment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct Attachment {
    /// Texture.
    pub handle: TextureHandle,
    /// Mip level.
    pub mip: u16,
    /// First layer or cube side.
    pub layer: u16,
    /// Number of layers.
    pub num_layers: u16,
    /// `Access` as `u8`.
    pub access: u8,
    /// Resolve flags.
    pub resolve: u8,
}

impl Attachment {
    /// Full write attachment of mip 0, layer 0.
    pub fn new(handle: TextureHandle) -> Self {
        Self {
            handle,
            mip: 0,
            layer: 0,
            num_layers: 1,
            access: super::types::Access::Write as u8,
            resolve: 0,
        }
    }
}

/// Frame buffer targeting a native window.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Pod, Zeroable)]
#[repr(C)]
pub struct WindowTarget {
    /// Native window handle.
    pub nwh: u64,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
    /// Color format.
    pub format: u8,
    /// Depth format.
    pub depth_format: u8,
    _pad: [u8; 2],
}

impl WindowTarget {
    /// Builds a window target.
    pub fn new(nwh: u64, width: u16, height: u16, format: TextureFormat, depth_format: TextureFormat) -> Self {
        Self {
            nwh,
            width,
            height,
            format: format as u8,
            depth_format: depth_format as u8,
            _pad: [0; 2],
        }
    }
}

/// Shared destination of a texture read back.
#[derive(Debug, Clone, Default)]
pub struct ReadbackSlot {
    data: Arc<Mutex<Option<Vec<u8>>>>,
}

impl ReadbackSlot {
    /// Creates an empty slot.
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores the result; called by the backend.
    pub fn fill(&self, bytes: Vec<u8>) {
        if let Ok(mut slot) = self.data.lock() {
            *slot = Some(bytes);
        }
    }

    /// `true` once the backend filled the slot.
    pub fn is_ready(&self) -> bool {
        self.data.lock().map(|s| s.is_some()).unwrap_or(false)
    }

    /// Takes the result.
    pub fn take(&self) -> Option<Vec<u8>> {
        self.data.lock().ok().and_then(|mut s| s.take())
    }
}

impl PartialEq for ReadbackSlot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// A decoded command.
#[derive(Debug, Clone, PartialEq)]
#[allow(missing_docs)]
pub enum Command {
    RendererInit {
        renderer_type: RendererType,
    },
    RendererShutdownBegin,
    CreateVertexLayout {
        handle: VertexLayoutHandle,
        layout: VertexLayout,
    },
    CreateIndexBuffer {
        handle: IndexBufferHandle,
        mem: Memory,
        flags: BufferFlags,
    },
    CreateVertexBuffer {
        handle: VertexBufferHandle,
        mem: Memory,
        layout: VertexLayoutHandle,
        flags: BufferFlags,
    },
    CreateDynamicIndexBuffer {
        handle: IndexBufferHandle,
        size: u32,
        flags: BufferFlags,
    },
    UpdateDynamicIndexBuffer {
        handle: IndexBufferHandle,
        offset: u32,
        size: u32,
        mem: Memory,
    },
    CreateDynamicVertexBuffer {
        handle: VertexBufferHandle,
        size: u32,
        flags: BufferFlags,
    },
    UpdateDynamicVertexBuffer {
        handle: VertexBufferHandle,
        offset: u32,
        size: u32,
        mem: Memory,
    },
    CreateShader {
        handle: ShaderHandle,
        mem: Memory,
    },
    CreateProgram {
        handle: ProgramHandle,
        vsh: ShaderHandle,
        fsh: ShaderHandle,
    },
    CreateTexture {
        handle: TextureHandle,
        desc: TextureDesc,
        mem: Option<Memory>,
    },
    UpdateTexture {
        handle: TextureHandle,
        side: u8,
        mip: u8,
        rect: TextureRect,
        pitch: u16,
        mem: Memory,
    },
    ResizeTexture {
        handle: TextureHandle,
        width: u16,
        height: u16,
        num_mips: u8,
        num_layers: u16,
    },
    CreateFrameBuffer {
        handle: FrameBufferHandle,
        window: Option<WindowTarget>,
        attachments: Vec<Attachment>,
    },
    CreateUniform {
        handle: UniformHandle,
        ty: UniformType,
        num: u16,
        name: String,
    },
    UpdateViewName {
        view: ViewId,
        name: String,
    },
    InvalidateOcclusionQuery {
        handle: OcclusionQueryHandle,
    },
    SetName {
        handle: AnyHandle,
        name: String,
    },
    End,
    RendererShutdownEnd,
    DestroyVertexLayout {
        handle: VertexLayoutHandle,
    },
    DestroyIndexBuffer {
        handle: IndexBufferHandle,
    },
    DestroyVertexBuffer {
        handle: VertexBufferHandle,
    },
    DestroyDynamicIndexBuffer {
        handle: IndexBufferHandle,
    },
    DestroyDynamicVertexBuffer {
        handle: VertexBufferHandle,
    },
    DestroyShader {
        handle: ShaderHandle,
    },
    DestroyProgram {
        handle: ProgramHandle,
    },
    DestroyTexture {
        handle: TextureHandle,
    },
    DestroyFrameBuffer {
        handle: FrameBufferHandle,
    },
    DestroyUniform {
        handle: UniformHandle,
    },
    ReadTexture {
        handle: TextureHandle,
        mip: u8,
        target: ReadbackSlot,
    },
}

impl Command {
    /// Tag written for this command.
    pub fn command_type(&self) -> CommandType {
        match self {
            Command::RendererInit { .. } => CommandType::RendererInit,
            Command::RendererShutdownBegin => CommandType::RendererShutdownBegin,
            Command::CreateVertexLayout { .. } => CommandType::CreateVertexLayout,
            Command::CreateIndexBuffer { .. } => CommandType::CreateIndexBuffer,
            Command::CreateVertexBuffer { .. } => CommandType::CreateVertexBuffer,
            Command::CreateDynamicIndexBuffer { .. } => CommandType::CreateDynamicIndexBuffer,
            Command::UpdateDynamicIndexBuffer { .. } => CommandType::UpdateDynamicIndexBuffer,
            Command::CreateDynamicVertexBuffer { .. } => CommandType::CreateDynamicVertexBuffer,
            Command::UpdateDynamicVertexBuffer { .. } => CommandType::UpdateDynamicVertexBuffer,
            Command::CreateShader { .. } => CommandType::CreateShader,
            Command::CreateProgram { .. } => CommandType::CreateProgram,
            Command::CreateTexture { .. } => CommandType::CreateTexture,
            Command::UpdateTexture { .. } => CommandType::UpdateTexture,
            Command::ResizeTexture { .. } => CommandType::ResizeTexture,
            Command::CreateFrameBuffer { .. } => CommandType::CreateFrameBuffer,
            Command::CreateUniform { .. } => CommandType::CreateUniform,
            Command::UpdateViewName { .. } => CommandType::UpdateViewName,
            Command::InvalidateOcclusionQuery { .. } => CommandType::InvalidateOcclusionQuery,
            Command::SetName { .. } => CommandType::SetName,
            Command::End => CommandType::End,
            Command::RendererShutdownEnd => CommandType::RendererShutdownEnd,
            Command::DestroyVertexLayout { .. } => CommandType::DestroyVertexLayout,
            Command::DestroyIndexBuffer { .. } => CommandType::DestroyIndexBuffer,
            Command::DestroyVertexBuffer { .. } => CommandType::DestroyVertexBuffer,
            Command::DestroyDynamicIndexBuffer { .. } => CommandType::DestroyDynamicIndexBuffer,
            Command::DestroyDynamicVertexBuffer { .. } => CommandType::DestroyDynamicVertexBuffer,
            Command::DestroyShader { .. } => CommandType::DestroyShader,
            Command::DestroyProgram { .. } => CommandType::DestroyProgram,
            Command::DestroyTexture { .. } => CommandType::DestroyTexture,
            Command::DestroyFrameBuffer { .. } => CommandType::DestroyFrameBuffer,
            Command::DestroyUniform { .. } => CommandType::DestroyUniform,
            Command::ReadTexture { .. } => CommandType::ReadTexture,
        }
    }
}

/// Non-POD values referenced from the byte stream.
#[derive(Debug, Clone)]
enum Payload {
    Memory(Memory),
    Name(String),
    Layout(VertexLayout),
    Readback(ReadbackSlot),
    Attachments(Vec<Attachment>),
}

/// Aligned byte stream of resource commands.
#[derive(Debug, Clone)]
pub struct CommandBuffer {
    buffer: Vec<u8>,
    payloads: Vec<Payload>,
    min_capacity: usize,
    finished: bool,
}

impl CommandBuffer {
    /// Creates an empty buffer that rewinds to `min_capacity` bytes.
    pub fn new(min_capacity: usize) -> Self {
        Self {
            buffer: Vec::with_capacity(min_capacity),
            payloads: Vec::new(),
            min_capacity,
            finished: false,
        }
    }

    /// Clears the stream for a new frame, shrinking any peak allocation back to the
    /// minimum capacity.
    pub fn start(&mut self) {
        self.buffer.clear();
        self.buffer.shrink_to(self.min_capacity);
        self.payloads.clear();
        self.finished = false;
    }

    /// Terminates the stream with `End`. Idempotent.
    pub fn finish(&mut self) {
        if !self.finished {
            self.write_tag(CommandType::End);
            self.finished = true;
        }
    }

    /// Drops every side-table payload. Called by the render thread once the stream
    /// has been executed, which releases the memory blocks it referenced.
    pub fn release_payloads(&mut self) {
        self.payloads.clear();
    }

    /// Bytes written so far.
    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    /// `true` if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Raw stream.
    pub fn as_bytes(&self) -> &[u8] {
        &self.buffer
    }

    /// Currently allocated capacity.
    pub fn capacity(&self) -> usize {
        self.buffer.capacity()
    }

    fn align(&mut self, align: usize) {
        let len = self.buffer.len();
        let padded = len.div_ceil(align) * align;
        self.buffer.resize(padded, 0);
    }

    /// Writes a POD value after padding to its alignment.
    pub fn write<T: Pod>(&mut self, value: &T) {
        self.align(std::mem::align_of::<T>());
        self.buffer.extend_from_slice(bytemuck::bytes_of(value));
    }

    fn write_tag(&mut self, tag: CommandType) {
        self.buffer.push(tag as u8);
    }

    fn write_payload(&mut self, payload: Payload) {
        let idx = self.payloads.len() as u32;
        self.payloads.push(payload);
        self.write(&idx);
    }

    /// Appends a command.
    pub fn push(&mut self, command: Command) {
        self.write_tag(command.command_type());
        match command {
            Command::RendererInit { renderer_type } => self.write(&(renderer_type as u8)),
            Command::RendererShutdownBegin | Command::End | Command::RendererShutdownEnd => {}
            Command::CreateVertexLayout { handle, layout } => {
                self.write(&handle);
                self.write_payload(Payload::Layout(layout));
            }
            Command::CreateIndexBuffer { handle, mem, flags } => {
                self.write(&handle);
                self.write_payload(Payload::Memory(mem));
                self.write(&flags.bits());
            }
            Command::CreateVertexBuffer {
                handle,
                mem,
                layout,
                flags,
            } => {
                self.write(&handle);
                self.write_payload(Payload::Memory(mem));
                self.write(&layout);
                self.write(&flags.bits());
            }
            Command::CreateDynamicIndexBuffer { handle, size, flags } => {
                self.write(&handle);
                self.write(&size);
                self.write(&flags.bits());
            }
            Command::CreateDynamicVertexBuffer { handle, size, flags } => {
                self.write(&handle);
                self.write(&size);
                self.write(&flags.bits());
            }
            Command::UpdateDynamicIndexBuffer {
                handle,
                offset,
                size,
                mem,
            } => {
                self.write(&handle);
                self.write(&offset);
                self.write(&size);
                self.write_payload(Payload::Memory(mem));
            }
            Command::UpdateDynamicVertexBuffer {
                handle,
                offset,
                size,
                mem,
            } => {
                self.write(&handle);
                self.write(&offset);
                self.write(&size);
                self.write_payload(Payload::Memory(mem));
            }
            Command::CreateShader { handle, mem } => {
                self.write(&handle);
                self.write_payload(Payload::Memory(mem));
            }
            Command::CreateProgram { handle, vsh, fsh } => {
                self.write(&handle);
                self.write(&vsh);
                self.write(&fsh);
            }
            Command::CreateTexture { handle, desc, mem } => {
                self.write(&handle);
                self.write(&desc);
                self.write(&(mem.is_some() as u8));
                if let Some(mem) = mem {
                    self.write_payload(Payload::Memory(mem));
                }
            }
            Command::UpdateTexture {
                handle,
                side,
                mip,
                rect,
                pitch,
                mem,
            } => {
                self.write(&handle);
                self.write(&side);
                self.write(&mip);
                self.write(&rect);
                self.write(&pitch);
                self.write_payload(Payload::Memory(mem));
            }
            Command::ResizeTexture {
                handle,
                width,
                height,
                num_mips,
                num_layers,
            } => {
                self.write(&handle);
                self.write(&width);
                self.write(&height);
                self.write(&num_mips);
                self.write(&num_layers);
            }
            Command::CreateFrameBuffer {
                handle,
                window,
                attachments,
            } => {
                self.write(&handle);
                self.write(&(window.is_some() as u8));
                match window {
                    Some(window) => self.write(&window),
                    None => self.write_payload(Payload::Attachments(attachments)),
                }
            }
            Command::CreateUniform {
                handle,
                ty,
                num,
                name,
            } => {
                self.write(&handle);
                self.write(&(ty as u8));
                self.write(&num);
                self.write_payload(Payload::Name(name));
            }
            Command::UpdateViewName { view, name } => {
                self.write(&view);
                self.write_payload(Payload::Name(name));
            }
            Command::InvalidateOcclusionQuery { handle } => self.write(&handle),
            Command::SetName { handle, name } => {
                self.write(&(handle.kind as u8));
                self.write(&handle.idx);
                self.write_payload(Payload::Name(name));
            }
            Command::DestroyVertexLayout { handle } => self.write(&handle),
            Command::DestroyIndexBuffer { handle } => self.write(&handle),
            Command::DestroyVertexBuffer { handle } => self.write(&handle),
            Command::DestroyDynamicIndexBuffer { handle } => self.write(&handle),
            Command::DestroyDynamicVertexBuffer { handle } => self.write(&handle),
            Command::DestroyShader { handle } => self.write(&handle),
            Command::DestroyProgram { handle } => self.write(&handle),
            Command::DestroyTexture { handle } => self.write(&handle),
            Command::DestroyFrameBuffer { handle } => self.write(&handle),
            Command::DestroyUniform { handle } => self.write(&handle),
            Command::ReadTexture { handle, mip, target } => {
                self.write(&handle);
                self.write(&mip);
                self.write_payload(Payload::Readback(target));
            }
        }
    }

    /// Iterates the commands up to the first `End`.
    pub fn commands(&self) -> CommandReader<'_> {
        CommandReader {
            buffer: self,
            pos: 0,
            done: false,
        }
    }
}

/// Decoding cursor over a [`CommandBuffer`].
#[derive(Debug)]
pub struct CommandReader<'a> {
    buffer: &'a CommandBuffer,
    pos: usize,
    done: bool,
}

impl CommandReader<'_> {
    fn read<T: Pod>(&mut self) -> Result<T, ResourceError> {
        let align = std::mem::align_of::<T>();
        let start = self.pos.div_ceil(align) * align;
        let end = start + std::mem::size_of::<T>();
        let bytes = self
            .buffer
            .buffer
            .get(start..end)
            .ok_or_else(|| ResourceError::Decode(format!("command stream truncated at {start}")))?;
        self.pos = end;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn payload(&mut self) -> Result<&Payload, ResourceError> {
        let idx: u32 = self.read()?;
        self.buffer
            .payloads
            .get(idx as usize)
            .ok_or_else(|| ResourceError::Decode(format!("missing command payload {idx}")))
    }

    fn memory(&mut self) -> Result<Memory, ResourceError> {
        match self.payload()? {
            Payload::Memory(mem) => Ok(mem.clone()),
            other => Err(unexpected("memory", other)),
        }
    }

    fn name(&mut self) -> Result<String, ResourceError> {
        match self.payload()? {
            Payload::Name(name) => Ok(name.clone()),
            other => Err(unexpected("name", other)),
        }
    }

    fn buffer_flags(&mut self) -> Result<BufferFlags, ResourceError> {
        Ok(BufferFlags::from_bits_truncate(self.read()?))
    }

    fn decode(&mut self, tag: CommandType) -> Result<Command, ResourceError> {
        Ok(match tag {
            CommandType::RendererInit => {
                let raw: u8 = self.read()?;
                let renderer_type = renderer_type_from_u8(raw);
                Command::RendererInit { renderer_type }
            }
            CommandType::RendererShutdownBegin => Command::RendererShutdownBegin,
            CommandType::End => Command::End,
            CommandType::RendererShutdownEnd => Command::RendererShutdownEnd,
            CommandType::CreateVertexLayout => {
                let handle = self.read()?;
                let layout = match self.payload()? {
                    Payload::Layout(layout) => *layout,
                    other => return Err(unexpected("layout", other)),
                };
                Command::CreateVertexLayout { handle, layout }
            }
            CommandType::CreateIndexBuffer => Command::CreateIndexBuffer {
                handle: self.read()?,
                mem: self.memory()?,
                flags: self.buffer_flags()?,
            },
            CommandType::CreateVertexBuffer => Command::CreateVertexBuffer {
                handle: self.read()?,
                mem: self.memory()?,
                layout: self.read()?,
                flags: self.buffer_flags()?,
            },
            CommandType::CreateDynamicIndexBuffer => Command::CreateDynamicIndexBuffer {
                handle: self.read()?,
                size: self.read()?,
                flags: self.buffer_flags()?,
            },
            CommandType::CreateDynamicVertexBuffer => Command::CreateDynamicVertexBuffer {
                handle: self.read()?,
                size: self.read()?,
                flags: self.buffer_flags()?,
            },
            CommandType::UpdateDynamicIndexBuffer => Command::UpdateDynamicIndexBuffer {
                handle: self.read()?,
                offset: self.read()?,
                size: self.read()?,
                mem: self.memory()?,
            },
            CommandType::UpdateDynamicVertexBuffer => Command::UpdateDynamicVertexBuffer {
                handle: self.read()?,
                offset: self.read()?,
                size: self.read()?,
                mem: self.memory()?,
            },
            CommandType::CreateShader => Command::CreateShader {
                handle: self.read()?,
                mem: self.memory()?,
            },
            CommandType::CreateProgram => Command::CreateProgram {
                handle: self.read()?,
                vsh: self.read()?,
                fsh: self.read()?,
            },
            CommandType::CreateTexture => {
                let handle = self.read()?;
                let desc = self.read()?;
                let has_mem: u8 = self.read()?;
                let mem = if has_mem != 0 { Some(self.memory()?) } else { None };
                Command::CreateTexture { handle, desc, mem }
            }
            CommandType::UpdateTexture => Command::UpdateTexture {
                handle: self.read()?,
                side: self.read()?,
                mip: self.read()?,
                rect: self.read()?,
                pitch: self.read()?,
                mem: self.memory()?,
            },
            CommandType::ResizeTexture => Command::ResizeTexture {
                handle: self.read()?,
                width: self.read()?,
                height: self.read()?,
                num_mips: self.read()?,
                num_layers: self.read()?,
            },
            CommandType::CreateFrameBuffer => {
                let handle = self.read()?;
                let is_window: u8 = self.read()?;
                if is_window != 0 {
                    Command::CreateFrameBuffer {
                        handle,
                        window: Some(self.read()?),
                        attachments: Vec::new(),
                    }
                } else {
                    let attachments = match self.payload()? {
                        Payload::Attachments(list) => list.clone(),
                        other => return Err(unexpected("attachments", other)),
                    };
                    Command::CreateFrameBuffer {
                        handle,
                        window: None,
                        attachments,
                    }
                }
            }
            CommandType::CreateUniform => {
                let handle = self.read()?;
                let raw: u8 = self.read()?;
                let ty = UniformType::from_u8(raw)
                    .ok_or_else(|| ResourceError::Decode(format!("bad uniform type {raw}")))?;
                Command::CreateUniform {
                    handle,
                    ty,
                    num: self.read()?,
                    name: self.name()?,
                }
            }
            CommandType::UpdateViewName => Command::UpdateViewName {
                view: self.read()?,
                name: self.name()?,
            },
            CommandType::InvalidateOcclusionQuery => Command::InvalidateOcclusionQuery { handle: self.read()? },
            CommandType::SetName => {
                let raw_kind: u8 = self.read()?;
                let kind = HandleKind::from_u8(raw_kind)
                    .ok_or_else(|| ResourceError::Decode(format!("bad handle kind {raw_kind}")))?;
                let idx = self.read()?;
                Command::SetName {
                    handle: AnyHandle { kind, idx },
                    name: self.name()?,
                }
            }
            CommandType::DestroyVertexLayout => Command::DestroyVertexLayout { handle: self.read()? },
            CommandType::DestroyIndexBuffer => Command::DestroyIndexBuffer { handle: self.read()? },
            CommandType::DestroyVertexBuffer => Command::DestroyVertexBuffer { handle: self.read()? },
            CommandType::DestroyDynamicIndexBuffer => Command::DestroyDynamicIndexBuffer { handle: self.read()? },
            CommandType::DestroyDynamicVertexBuffer => Command::DestroyDynamicVertexBuffer { handle: self.read()? },
            CommandType::DestroyShader => Command::DestroyShader { handle: self.read()? },
            CommandType::DestroyProgram => Command::DestroyProgram { handle: self.read()? },
            CommandType::DestroyTexture => Command::DestroyTexture { handle: self.read()? },
            CommandType::DestroyFrameBuffer => Command::DestroyFrameBuffer { handle: self.read()? },
            CommandType::DestroyUniform => Command::DestroyUniform { handle: self.read()? },
            CommandType::ReadTexture => {
                let handle = self.read()?;
                let mip = self.read()?;
                let target = match self.payload()? {
                    Payload::Readback(slot) => slot.clone(),
                    other => return Err(unexpected("readback", other)),
                };
                Command::ReadTexture { handle, mip, target }
            }
        })
    }
}

impl Iterator for CommandReader<'_> {
    type Item = Result<Command, ResourceError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.done {
            return None;
        }
        let Some(&raw) = self.buffer.buffer.get(self.pos) else {
            self.done = true;
            return None;
        };
        self.pos += 1;
        let Some(tag) = CommandType::from_u8(raw) else {
            self.done = true;
            return Some(Err(ResourceError::Decode(format!("unknown command tag {raw}"))));
        };
        if tag == CommandType::End {
            self.done = true;
            return None;
        }
        let result = self.decode(tag);
        if result.is_err() {
            self.done = true;
        }
        Some(result)
    }
}

fn unexpected(what: &str, got: &Payload) -> ResourceError {
    ResourceError::Decode(format!("expected {what} payload, found {got:?}"))
}

fn renderer_type_from_u8(raw: u8) -> RendererType {
    match raw {
        0 => RendererType::Noop,
        1 => RendererType::Headless,
        2 => RendererType::Direct3D11,
        3 => RendererType::Direct3D12,
        4 => RendererType::Metal,
        5 => RendererType::OpenGLES,
        6 => RendererType::OpenGL,
        7 => RendererType::Vulkan,
        _ => RendererType::Count,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tags_split_pre_and_post() {
        assert!(!CommandType::CreateIndexBuffer.is_post());
        assert!(!CommandType::SetName.is_post());
        assert!(CommandType::DestroyIndexBuffer.is_post());
        assert!(CommandType::ReadTexture.is_post());
        assert!(CommandType::RendererShutdownEnd.is_post());
    }

    #[test]
    fn fields_are_padded_to_natural_alignment() {
        let mut cb = CommandBuffer::new(64);
        cb.push(Command::CreateDynamicIndexBuffer {
            handle: IndexBufferHandle(3),
            size: 0x100,
            flags: BufferFlags::ALLOW_RESIZE,
        });
        // tag(1) pad(1) handle(2) size(4) flags(2)
        assert_eq!(cb.as_bytes().len(), 10);
        assert_eq!(cb.as_bytes()[0], CommandType::CreateDynamicIndexBuffer as u8);
        assert_eq!(cb.as_bytes()[1], 0, "padding before u16");
        assert_eq!(u16::from_ne_bytes([cb.as_bytes()[2], cb.as_bytes()[3]]), 3);
    }

    #[test]
    fn push_then_read_returns_same_commands() {
        let mem = Memory::copy(&[1, 2, 3, 4]);
        let slot = ReadbackSlot::new();
        let commands = vec![
            Command::RendererInit {
                renderer_type: RendererType::Headless,
            },
            Command::CreateIndexBuffer {
                handle: IndexBufferHandle(0),
                mem: mem.clone(),
                flags: BufferFlags::EMPTY,
            },
            Command::CreateUniform {
                handle: UniformHandle(2),
                ty: UniformType::Mat4,
                num: 3,
                name: "u_bones".into(),
            },
            Command::CreateFrameBuffer {
                handle: FrameBufferHandle(1),
                window: None,
                attachments: vec![Attachment::new(TextureHandle(7))],
            },
            Command::SetName {
                handle: TextureHandle(7).into(),
                name: "albedo".into(),
            },
            Command::ReadTexture {
                handle: TextureHandle(7),
                mip: 1,
                target: slot.clone(),
            },
        ];

        let mut cb = CommandBuffer::new(64);
        for cmd in commands.clone() {
            cb.push(cmd);
        }
        cb.finish();

        let decoded: Vec<Command> = cb.commands().collect::<Result<_, _>>().expect("valid stream");
        assert_eq!(decoded, commands);
    }

    #[test]
    fn reading_stops_at_end() {
        let mut cb = CommandBuffer::new(64);
        cb.push(Command::DestroyShader {
            handle: ShaderHandle(1),
        });
        cb.finish();
        cb.finish();
        assert_eq!(cb.commands().count(), 1);
    }

    #[test]
    fn start_rewinds_to_minimum_capacity() {
        let mut cb = CommandBuffer::new(16);
        for i in 0..1000 {
            cb.push(Command::DestroyTexture {
                handle: TextureHandle(i),
            });
        }
        assert!(cb.capacity() > 1000);
        cb.start();
        assert!(cb.is_empty());
        assert!(cb.capacity() < 1000, "peak allocation is reclaimed");
    }

    #[test]
    fn release_payloads_drops_memory() {
        let mem = Memory::copy(&[0; 8]);
        let mut cb = CommandBuffer::new(16);
        cb.push(Command::CreateShader {
            handle: ShaderHandle(0),
            mem: mem.clone(),
        });
        cb.finish();
        cb.release_payloads();
        assert!(cb.commands().next().unwrap().is_err(), "payload is gone");
    }
}
