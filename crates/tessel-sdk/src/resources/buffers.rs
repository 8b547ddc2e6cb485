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

//! Vertex layouts, static and dynamic index/vertex buffers, indirect buffers.
//!
//! Dynamic buffers are ranges suballocated inside large parent buffers taken from
//! the index/vertex buffer pools. Parents are created on demand and destroyed once
//! their allocator region holds no used block.

use super::{
    DynamicIndexBufferRef, DynamicVertexBufferRef, IndexBufferRef, Resources, VertexBufferRef, VertexLayoutRef,
};
use tessel_core::error::{ResourceError, ValidationCode};
use tessel_core::handle::*;
use tessel_core::limits::*;
use tessel_core::memory::Memory;
use tessel_core::renderer::flags::BufferFlags;
use tessel_core::renderer::{Command, Frame, VertexLayout};
use tessel_core::utils::align_up;
use tessel_data::allocators::{address_offset, address_parent, make_address};

/// Where a dynamic buffer currently lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DynamicBufferInfo {
    /// Index of the parent index/vertex buffer.
    pub parent: u16,
    /// Byte offset of the range inside the parent.
    pub offset: u32,
    /// Usable size in bytes.
    pub size: u32,
    /// First index or vertex of the range, in elements of the parent.
    pub start: u32,
    /// Number of indices or vertices.
    pub num: u32,
}

const fn index_size(flags: BufferFlags) -> u32 {
    if flags.contains(BufferFlags::INDEX32) {
        4
    } else {
        2
    }
}

fn parent_size(min_size: u32, size: u32) -> u32 {
    min_size.max(align_up(size, DYNAMIC_BUFFER_GRANULARITY))
}

impl Resources {
    /// Finds or creates the layout handle of `layout`, adding a reference.
    pub fn create_vertex_layout(
        &mut self,
        frame: &mut Frame,
        layout: &VertexLayout,
    ) -> Result<VertexLayoutHandle, ResourceError> {
        self.validate("create_vertex_layout", |s| {
            s.check(layout.stride() > 0, ValidationCode::InvalidParameter, || {
                "vertex layout has a zero stride".to_owned()
            })
        })?;

        let hash = layout.hash();
        if let Some(idx) = self.layout_map.find(hash) {
            if let Some(layout_ref) = self.vertex_layout_refs.get_mut(idx) {
                layout_ref.ref_count += 1;
                return Ok(VertexLayoutHandle(idx));
            }
        }

        let idx = self.alloc_handle(HandleKind::VertexLayout)?;
        let handle = VertexLayoutHandle(idx);
        self.layout_map.insert(hash, idx);
        self.vertex_layout_refs.set(
            idx,
            VertexLayoutRef {
                hash,
                stride: layout.stride(),
                ref_count: 1,
            },
        );
        frame.cmd_pre.push(Command::CreateVertexLayout {
            handle,
            layout: layout.clone(),
        });
        Ok(handle)
    }

    /// Drops a reference to a layout; the last one destroys it.
    pub fn destroy_vertex_layout(&mut self, frame: &mut Frame, handle: VertexLayoutHandle) -> Result<(), ResourceError> {
        let layout_ref = self
            .vertex_layout_refs
            .get_mut(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::VertexLayout, handle.idx()))?;
        layout_ref.ref_count -= 1;
        if layout_ref.ref_count > 0 {
            return Ok(());
        }
        self.vertex_layout_refs.take(handle.idx());
        self.layout_map.remove_by_handle(handle.idx());
        frame.cmd_post.push(Command::DestroyVertexLayout { handle });
        Self::queue_free(frame, handle);
        Ok(())
    }

    /// Stride of a live layout.
    pub fn layout_stride(&self, handle: VertexLayoutHandle) -> Option<u16> {
        self.vertex_layout_refs.get(handle.idx()).map(|l| l.stride)
    }

    pub fn create_index_buffer(
        &mut self,
        frame: &mut Frame,
        mem: Memory,
        flags: BufferFlags,
    ) -> Result<IndexBufferHandle, ResourceError> {
        self.validate("create_index_buffer", |s| {
            s.check(!mem.is_empty(), ValidationCode::InvalidParameter, || {
                "index data is empty".to_owned()
            })
        })?;

        let idx = self.alloc_handle(HandleKind::IndexBuffer)?;
        let handle = IndexBufferHandle(idx);
        self.index_buffer_refs.set(
            idx,
            IndexBufferRef {
                size: mem.len() as u32,
                flags,
                dynamic: false,
            },
        );
        frame.cmd_pre.push(Command::CreateIndexBuffer { handle, mem, flags });
        Ok(handle)
    }

    pub fn destroy_index_buffer(&mut self, frame: &mut Frame, handle: IndexBufferHandle) -> Result<(), ResourceError> {
        let is_static = self.index_buffer_refs.get(handle.idx()).is_some_and(|r| !r.dynamic);
        self.validate("destroy_index_buffer", |s| {
            s.check(is_static, ValidationCode::InvalidHandle, || {
                format!("index buffer {} is not a live static buffer", handle.idx())
            })
        })?;
        self.index_buffer_refs.take(handle.idx());
        frame.cmd_post.push(Command::DestroyIndexBuffer { handle });
        Self::queue_free(frame, handle);
        Ok(())
    }

    pub fn create_vertex_buffer(
        &mut self,
        frame: &mut Frame,
        mem: Memory,
        layout: &VertexLayout,
        flags: BufferFlags,
    ) -> Result<VertexBufferHandle, ResourceError> {
        self.validate("create_vertex_buffer", |s| {
            s.check(!mem.is_empty(), ValidationCode::InvalidParameter, || {
                "vertex data is empty".to_owned()
            })
        })?;

        let layout_handle = self.create_vertex_layout(frame, layout)?;
        let idx = match self.alloc_handle(HandleKind::VertexBuffer) {
            Ok(idx) => idx,
            Err(err) => {
                self.destroy_vertex_layout(frame, layout_handle)?;
                return Err(err);
            }
        };
        let handle = VertexBufferHandle(idx);
        self.vertex_buffer_refs.set(
            idx,
            VertexBufferRef {
                size: mem.len() as u32,
                layout: layout_handle,
                stride: layout.stride(),
                flags,
                dynamic: false,
            },
        );
        frame.cmd_pre.push(Command::CreateVertexBuffer {
            handle,
            mem,
            layout: layout_handle,
            flags,
        });
        Ok(handle)
    }

    pub fn destroy_vertex_buffer(&mut self, frame: &mut Frame, handle: VertexBufferHandle) -> Result<(), ResourceError> {
        let is_static = self.vertex_buffer_refs.get(handle.idx()).is_some_and(|r| !r.dynamic);
        self.validate("destroy_vertex_buffer", |s| {
            s.check(is_static, ValidationCode::InvalidHandle, || {
                format!("vertex buffer {} is not a live static buffer", handle.idx())
            })
        })?;
        let Some(buffer) = self.vertex_buffer_refs.take(handle.idx()) else {
            return Ok(());
        };
        frame.cmd_post.push(Command::DestroyVertexBuffer { handle });
        Self::queue_free(frame, handle);
        self.destroy_vertex_layout(frame, buffer.layout)
    }

    /// Vertices held by a static vertex buffer.
    pub fn vertex_buffer_vertices(&self, handle: VertexBufferHandle) -> Option<u32> {
        self.vertex_buffer_refs
            .get(handle.idx())
            .map(|vb| if vb.stride == 0 { 0 } else { vb.size / vb.stride as u32 })
    }

    /// Suballocates `size` bytes of index space, creating a parent if needed.
    fn alloc_index_range(&mut self, frame: &mut Frame, size: u32, flags: BufferFlags) -> Result<u64, ResourceError> {
        if let Some(ptr) = self.dynamic_ib_alloc.alloc(size) {
            return Ok(ptr);
        }
        let parent_size = parent_size(DYNAMIC_INDEX_BUFFER_SIZE, size);
        let idx = self.alloc_handle(HandleKind::IndexBuffer)?;
        let handle = IndexBufferHandle(idx);
        let flags = flags.with(BufferFlags::ALLOW_RESIZE);
        log::debug!("Dynamic index parent {idx} created ({parent_size} bytes)");
        self.index_buffer_refs.set(
            idx,
            IndexBufferRef {
                size: parent_size,
                flags,
                dynamic: true,
            },
        );
        frame.cmd_pre.push(Command::CreateDynamicIndexBuffer {
            handle,
            size: parent_size,
            flags,
        });
        self.dynamic_ib_alloc.add(make_address(idx, 0), parent_size);
        self.dynamic_ib_alloc
            .alloc(size)
            .ok_or(ResourceError::Exhausted {
                kind: HandleKind::DynamicIndexBuffer,
            })
    }

    /// Suballocates `size` bytes of vertex space, creating a parent if needed.
    fn alloc_vertex_range(&mut self, frame: &mut Frame, size: u32, flags: BufferFlags) -> Result<u64, ResourceError> {
        if let Some(ptr) = self.dynamic_vb_alloc.alloc(size) {
            return Ok(ptr);
        }
        let parent_size = parent_size(DYNAMIC_VERTEX_BUFFER_SIZE, size);
        let idx = self.alloc_handle(HandleKind::VertexBuffer)?;
        let handle = VertexBufferHandle(idx);
        let flags = flags.with(BufferFlags::ALLOW_RESIZE);
        log::debug!("Dynamic vertex parent {idx} created ({parent_size} bytes)");
        self.vertex_buffer_refs.set(
            idx,
            VertexBufferRef {
                size: parent_size,
                layout: VertexLayoutHandle::INVALID,
                stride: 0,
                flags,
                dynamic: true,
            },
        );
        frame.cmd_pre.push(Command::CreateDynamicVertexBuffer {
            handle,
            size: parent_size,
            flags,
        });
        self.dynamic_vb_alloc.add(make_address(idx, 0), parent_size);
        self.dynamic_vb_alloc
            .alloc(size)
            .ok_or(ResourceError::Exhausted {
                kind: HandleKind::DynamicVertexBuffer,
            })
    }

    /// Destroys every dynamic index parent whose region is entirely free.
    pub fn release_empty_index_parents(&mut self, frame: &mut Frame) {
        if !self.dynamic_ib_alloc.compact() {
            return;
        }
        while let Some(ptr) = self.dynamic_ib_alloc.remove() {
            let handle = IndexBufferHandle(address_parent(ptr));
            log::debug!("Dynamic index parent {} released", handle.idx());
            self.index_buffer_refs.take(handle.idx());
            frame.cmd_post.push(Command::DestroyDynamicIndexBuffer { handle });
            Self::queue_free(frame, handle);
        }
    }

    /// Destroys every dynamic vertex parent whose region is entirely free.
    pub fn release_empty_vertex_parents(&mut self, frame: &mut Frame) {
        if !self.dynamic_vb_alloc.compact() {
            return;
        }
        while let Some(ptr) = self.dynamic_vb_alloc.remove() {
            let handle = VertexBufferHandle(address_parent(ptr));
            log::debug!("Dynamic vertex parent {} released", handle.idx());
            self.vertex_buffer_refs.take(handle.idx());
            frame.cmd_post.push(Command::DestroyDynamicVertexBuffer { handle });
            Self::queue_free(frame, handle);
        }
    }

    /// Dynamic index buffer of `num` indices, optionally filled with `mem`.
    pub fn create_dynamic_index_buffer(
        &mut self,
        frame: &mut Frame,
        num: u32,
        flags: BufferFlags,
        mem: Option<Memory>,
    ) -> Result<DynamicIndexBufferHandle, ResourceError> {
        let size = num.saturating_mul(index_size(flags));
        self.validate("create_dynamic_index_buffer", |s| {
            s.check(size > 0, ValidationCode::InvalidParameter, || {
                "dynamic index buffer of zero indices".to_owned()
            })
        })?;

        let idx = self.alloc_handle(HandleKind::DynamicIndexBuffer)?;
        let address = match self.alloc_index_range(frame, size, flags) {
            Ok(address) => address,
            Err(err) => {
                self.free_handle(HandleKind::DynamicIndexBuffer, idx);
                return Err(err);
            }
        };
        self.dynamic_index_buffer_refs.set(
            idx,
            DynamicIndexBufferRef {
                address,
                size,
                start_index: address_offset(address) / index_size(flags),
                flags,
            },
        );
        let handle = DynamicIndexBufferHandle(idx);
        if let Some(mem) = mem {
            self.update_dynamic_index_buffer(frame, handle, 0, mem)?;
        }
        Ok(handle)
    }

    /// Writes `mem` at index `start_index`. A larger payload reallocates the buffer
    /// when it was created with `ALLOW_RESIZE` and is truncated otherwise.
    pub fn update_dynamic_index_buffer(
        &mut self,
        frame: &mut Frame,
        handle: DynamicIndexBufferHandle,
        start_index: u32,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        let dib = self
            .dynamic_index_buffer_refs
            .get(handle.idx())
            .cloned()
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::DynamicIndexBuffer, handle.idx()))?;
        let stride = index_size(dib.flags);
        let offset = start_index.saturating_mul(stride);
        let required = offset.saturating_add(mem.len() as u32);

        let dib = if required > dib.size && dib.flags.contains(BufferFlags::ALLOW_RESIZE) {
            self.dynamic_ib_alloc.free(dib.address);
            self.release_empty_index_parents(frame);
            let address = self.alloc_index_range(frame, required, dib.flags)?;
            log::debug!(
                "Dynamic index buffer {} resized {} -> {required} bytes",
                handle.idx(),
                dib.size
            );
            let resized = DynamicIndexBufferRef {
                address,
                size: required,
                start_index: address_offset(address) / stride,
                flags: dib.flags,
            };
            self.dynamic_index_buffer_refs.set(handle.idx(), resized.clone());
            resized
        } else {
            dib
        };

        let size = dib.size.saturating_sub(offset).min(mem.len() as u32);
        if size == 0 {
            return Ok(());
        }
        frame.cmd_pre.push(Command::UpdateDynamicIndexBuffer {
            handle: IndexBufferHandle(address_parent(dib.address)),
            offset: address_offset(dib.address) + offset,
            size,
            mem,
        });
        Ok(())
    }

    /// Queues the range for release at the next `frame()`.
    pub fn destroy_dynamic_index_buffer(
        &mut self,
        handle: DynamicIndexBufferHandle,
    ) -> Result<(), ResourceError> {
        let dib = self
            .dynamic_index_buffer_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::DynamicIndexBuffer, handle.idx()))?;
        self.pending.dynamic_index_buffers.push((handle, dib.address));
        Ok(())
    }

    pub fn dynamic_index_buffer_info(&self, handle: DynamicIndexBufferHandle) -> Option<DynamicBufferInfo> {
        self.dynamic_index_buffer_refs.get(handle.idx()).map(|dib| DynamicBufferInfo {
            parent: address_parent(dib.address),
            offset: address_offset(dib.address),
            size: dib.size,
            start: dib.start_index,
            num: dib.size / index_size(dib.flags),
        })
    }

    /// Dynamic vertex buffer of `num` vertices, optionally filled with `mem`.
    pub fn create_dynamic_vertex_buffer(
        &mut self,
        frame: &mut Frame,
        num: u32,
        layout: &VertexLayout,
        flags: BufferFlags,
        mem: Option<Memory>,
    ) -> Result<DynamicVertexBufferHandle, ResourceError> {
        let stride = layout.stride() as u32;
        // The range is allocated one stride larger so it can start on a whole vertex.
        let sizes = num
            .checked_mul(stride)
            .and_then(|size| size.checked_add(stride).map(|padded| (size, padded)));
        self.validate("create_dynamic_vertex_buffer", |s| {
            s.check(sizes.is_some(), ValidationCode::InvalidParameter, || {
                format!("{num} vertices of {stride} bytes overflow a buffer")
            });
            s.check(sizes.is_some_and(|(size, _)| size > 0), ValidationCode::InvalidParameter, || {
                "dynamic vertex buffer of zero bytes".to_owned()
            })
        })?;
        let (size, padded) = sizes.unwrap_or_default();

        let layout_handle = self.create_vertex_layout(frame, layout)?;
        let idx = match self.alloc_handle(HandleKind::DynamicVertexBuffer) {
            Ok(idx) => idx,
            Err(err) => {
                self.destroy_vertex_layout(frame, layout_handle)?;
                return Err(err);
            }
        };
        let address = match self.alloc_vertex_range(frame, padded, flags) {
            Ok(address) => address,
            Err(err) => {
                self.free_handle(HandleKind::DynamicVertexBuffer, idx);
                self.destroy_vertex_layout(frame, layout_handle)?;
                return Err(err);
            }
        };
        self.dynamic_vertex_buffer_refs.set(
            idx,
            DynamicVertexBufferRef {
                address,
                size,
                start_vertex: address_offset(address).div_ceil(stride),
                num_vertices: num,
                stride: stride as u16,
                layout: layout_handle,
                flags,
            },
        );
        let handle = DynamicVertexBufferHandle(idx);
        if let Some(mem) = mem {
            self.update_dynamic_vertex_buffer(frame, handle, 0, mem)?;
        }
        Ok(handle)
    }

    /// Writes `mem` at vertex `start_vertex`, with the same resize rules as
    /// [`update_dynamic_index_buffer`](Self::update_dynamic_index_buffer).
    pub fn update_dynamic_vertex_buffer(
        &mut self,
        frame: &mut Frame,
        handle: DynamicVertexBufferHandle,
        start_vertex: u32,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        let dvb = self
            .dynamic_vertex_buffer_refs
            .get(handle.idx())
            .cloned()
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::DynamicVertexBuffer, handle.idx()))?;
        let stride = dvb.stride as u32;
        let offset = start_vertex.saturating_mul(stride);
        let required = offset.saturating_add(mem.len() as u32);

        let dvb = if required > dvb.size && dvb.flags.contains(BufferFlags::ALLOW_RESIZE) {
            let padded = required.checked_add(stride);
            self.validate("update_dynamic_vertex_buffer", |s| {
                s.check(padded.is_some(), ValidationCode::InvalidParameter, || {
                    format!("dynamic vertex buffer {} cannot grow to {required} bytes", handle.idx())
                })
            })?;
            self.dynamic_vb_alloc.free(dvb.address);
            self.release_empty_vertex_parents(frame);
            let address = self.alloc_vertex_range(frame, padded.unwrap_or_default(), dvb.flags)?;
            log::debug!(
                "Dynamic vertex buffer {} resized {} -> {required} bytes",
                handle.idx(),
                dvb.size
            );
            let resized = DynamicVertexBufferRef {
                address,
                size: required,
                start_vertex: address_offset(address).div_ceil(stride),
                num_vertices: required / stride,
                ..dvb
            };
            self.dynamic_vertex_buffer_refs.set(handle.idx(), resized.clone());
            resized
        } else {
            dvb
        };

        let size = dvb.size.saturating_sub(offset).min(mem.len() as u32);
        if size == 0 {
            return Ok(());
        }
        frame.cmd_pre.push(Command::UpdateDynamicVertexBuffer {
            handle: VertexBufferHandle(address_parent(dvb.address)),
            offset: dvb.start_vertex * stride + offset,
            size,
            mem,
        });
        Ok(())
    }

    /// Queues the range for release at the next `frame()`; the layout reference
    /// is dropped now.
    pub fn destroy_dynamic_vertex_buffer(
        &mut self,
        frame: &mut Frame,
        handle: DynamicVertexBufferHandle,
    ) -> Result<(), ResourceError> {
        let dvb = self
            .dynamic_vertex_buffer_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::DynamicVertexBuffer, handle.idx()))?;
        self.pending.dynamic_vertex_buffers.push((handle, dvb.address));
        self.destroy_vertex_layout(frame, dvb.layout)
    }

    pub fn dynamic_vertex_buffer_info(&self, handle: DynamicVertexBufferHandle) -> Option<DynamicBufferInfo> {
        self.dynamic_vertex_buffer_refs.get(handle.idx()).map(|dvb| DynamicBufferInfo {
            parent: address_parent(dvb.address),
            offset: dvb.start_vertex * dvb.stride as u32,
            size: dvb.size,
            start: dvb.start_vertex,
            num: dvb.num_vertices,
        })
    }

    /// Buffer holding `num` indirect draw records.
    pub fn create_indirect_buffer(&mut self, frame: &mut Frame, num: u32) -> Result<IndirectBufferHandle, ResourceError> {
        let size = num.saturating_mul(DRAW_INDIRECT_STRIDE);
        self.validate("create_indirect_buffer", |s| {
            s.check(size > 0, ValidationCode::InvalidParameter, || {
                "indirect buffer of zero records".to_owned()
            })
        })?;
        let idx = self.alloc_handle(HandleKind::VertexBuffer)?;
        self.vertex_buffer_refs.set(
            idx,
            VertexBufferRef {
                size,
                layout: VertexLayoutHandle::INVALID,
                stride: DRAW_INDIRECT_STRIDE as u16,
                flags: BufferFlags::DRAW_INDIRECT,
                dynamic: true,
            },
        );
        frame.cmd_pre.push(Command::CreateDynamicVertexBuffer {
            handle: VertexBufferHandle(idx),
            size,
            flags: BufferFlags::DRAW_INDIRECT,
        });
        Ok(IndirectBufferHandle(idx))
    }

    pub fn destroy_indirect_buffer(&mut self, frame: &mut Frame, handle: IndirectBufferHandle) -> Result<(), ResourceError> {
        let backing = handle.as_vertex_buffer();
        let is_indirect = self
            .vertex_buffer_refs
            .get(backing.idx())
            .is_some_and(|vb| vb.flags.contains(BufferFlags::DRAW_INDIRECT));
        self.validate("destroy_indirect_buffer", |s| {
            s.check(is_indirect, ValidationCode::InvalidHandle, || {
                format!("{} is not an indirect buffer", handle.idx())
            })
        })?;
        self.vertex_buffer_refs.take(backing.idx());
        frame.cmd_post.push(Command::DestroyDynamicVertexBuffer { handle: backing });
        Self::queue_free(frame, backing);
        Ok(())
    }
}
