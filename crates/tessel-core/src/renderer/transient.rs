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

//! Per-frame scratch geometry.
//!
//! Each frame owns one transient index buffer and one transient vertex buffer. Space
//! is handed out by a lock-free bump pointer; offsets are valid until the next
//! `frame()` call.

use crate::handle::{IndexBufferHandle, VertexBufferHandle, VertexLayoutHandle};
use crate::utils::align_up;
use std::sync::atomic::{AtomicU32, Ordering};

/// Bump allocator over a fixed-size region.
#[derive(Debug)]
pub struct TransientAllocator {
    offset: AtomicU32,
    size: AtomicU32,
}

impl TransientAllocator {
    /// Allocator over `size` bytes.
    pub const fn new(size: u32) -> Self {
        Self {
            offset: AtomicU32::new(0),
            size: AtomicU32::new(size),
        }
    }

    /// Reserves up to `num` elements of `stride` bytes, starting at a multiple of
    /// `stride`. Returns the byte offset and the number of elements that fit, which
    /// is less than `num` near the end of the region.
    pub fn alloc(&self, num: u32, stride: u32) -> (u32, u32) {
        let stride = stride.max(1);
        let size = self.size.load(Ordering::Relaxed);
        let mut current = self.offset.load(Ordering::Relaxed);
        loop {
            let offset = align_up(current, stride).min(size);
            let granted = num.min((size - offset) / stride);
            let next = offset + granted * stride;
            match self
                .offset
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(_) => return (offset, granted),
                Err(actual) => current = actual,
            }
        }
    }

    /// How many `stride`-sized elements are still available.
    pub fn available(&self, num: u32, stride: u32) -> u32 {
        let stride = stride.max(1);
        let size = self.size.load(Ordering::Relaxed);
        let offset = align_up(self.offset.load(Ordering::Acquire), stride).min(size);
        num.min((size - offset) / stride)
    }

    /// Bytes handed out this frame.
    pub fn used(&self) -> u32 {
        self.offset.load(Ordering::Acquire)
    }

    /// Capacity in bytes.
    pub fn size(&self) -> u32 {
        self.size.load(Ordering::Relaxed)
    }

    /// Rewinds to zero, optionally changing the capacity.
    pub fn reset(&self, size: Option<u32>) {
        if let Some(size) = size {
            self.size.store(size, Ordering::Relaxed);
        }
        self.offset.store(0, Ordering::Release);
    }
}

/// The frame side of a transient buffer: the backing GPU buffer and the bytes to
/// upload into it before the frame's draws.
#[derive(Debug, Clone)]
pub struct TransientBuffer<H> {
    /// Backing buffer, a dynamic parent created at init.
    pub handle: H,
    /// Capacity in bytes.
    pub size: u32,
    data: Vec<u8>,
}

impl<H: Copy + Default> TransientBuffer<H> {
    /// An empty buffer of `size` bytes backed by `handle`.
    pub fn new(handle: H, size: u32) -> Self {
        Self {
            handle,
            size,
            data: Vec::new(),
        }
    }

    /// Copies `bytes` at `offset`. Writes past the capacity are clipped.
    pub fn write(&mut self, offset: u32, bytes: &[u8]) {
        let start = (offset as usize).min(self.size as usize);
        let end = (start + bytes.len()).min(self.size as usize);
        if self.data.len() < end {
            self.data.resize(end, 0);
        }
        self.data[start..end].copy_from_slice(&bytes[..end - start]);
    }

    /// Bytes written this frame.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// Forgets the previous frame's contents, keeping the allocation.
    pub fn clear(&mut self) {
        self.data.clear();
    }
}

impl<H: Copy + Default> Default for TransientBuffer<H> {
    fn default() -> Self {
        Self::new(H::default(), 0)
    }
}

/// Scratch index data handed to the application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransientIndexBuffer {
    /// Index bytes to fill.
    pub data: Vec<u8>,
    /// Backing buffer.
    pub handle: IndexBufferHandle,
    /// Byte offset inside the backing buffer.
    pub offset: u32,
    /// First index inside the backing buffer.
    pub start_index: u32,
    /// Indices are 32-bit.
    pub index32: bool,
}

impl TransientIndexBuffer {
    /// Number of indices.
    pub fn num_indices(&self) -> u32 {
        let size = if self.index32 { 4 } else { 2 };
        self.data.len() as u32 / size
    }
}

/// Scratch vertex data handed to the application.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransientVertexBuffer {
    /// Vertex bytes to fill.
    pub data: Vec<u8>,
    /// Backing buffer.
    pub handle: VertexBufferHandle,
    /// Byte offset inside the backing buffer.
    pub offset: u32,
    /// First vertex inside the backing buffer.
    pub start_vertex: u32,
    /// Vertex stride.
    pub stride: u16,
    /// Layout of the vertices.
    pub layout: VertexLayoutHandle,
}

impl TransientVertexBuffer {
    /// Number of vertices.
    pub fn num_vertices(&self) -> u32 {
        if self.stride == 0 {
            0
        } else {
            self.data.len() as u32 / self.stride as u32
        }
    }
}

/// Per-instance data carved out of the transient vertex buffer.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceDataBuffer {
    /// Instance bytes to fill.
    pub data: Vec<u8>,
    /// Backing buffer.
    pub handle: VertexBufferHandle,
    /// Byte offset inside the backing buffer.
    pub offset: u32,
    /// Bytes per instance.
    pub stride: u16,
    /// Number of instances.
    pub num: u32,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn alloc_aligns_to_stride() {
        let alloc = TransientAllocator::new(100);
        assert_eq!(alloc.alloc(1, 2), (0, 1));
        assert_eq!(alloc.alloc(2, 12), (12, 2));
        assert_eq!(alloc.used(), 36);
    }

    #[test]
    fn alloc_near_capacity_returns_what_fits() {
        let alloc = TransientAllocator::new(64);
        assert_eq!(alloc.alloc(28, 2), (0, 28));
        // 8 bytes left, room for 4 indices.
        assert_eq!(alloc.available(10, 2), 4);
        assert_eq!(alloc.alloc(10, 2), (56, 4));
        assert_eq!(alloc.alloc(1, 2), (64, 0));
    }

    #[test]
    fn concurrent_allocations_do_not_overlap() {
        let alloc = Arc::new(TransientAllocator::new(16 * 1000));
        let threads: Vec<_> = (0..4)
            .map(|_| {
                let alloc = alloc.clone();
                std::thread::spawn(move || (0..250).map(|_| alloc.alloc(1, 16).0).collect::<Vec<_>>())
            })
            .collect();
        let mut offsets: Vec<u32> = threads.into_iter().flat_map(|t| t.join().unwrap()).collect();
        offsets.sort_unstable();
        offsets.dedup();
        assert_eq!(offsets.len(), 1000);
    }

    #[test]
    fn reset_can_resize() {
        let alloc = TransientAllocator::new(8);
        alloc.alloc(4, 2);
        alloc.reset(Some(32));
        assert_eq!(alloc.used(), 0);
        assert_eq!(alloc.alloc(16, 2), (0, 16));
    }

    #[test]
    fn frame_buffer_writes_are_clipped() {
        let mut buffer = TransientBuffer::new(VertexBufferHandle(1), 8);
        buffer.write(4, &[1, 2, 3, 4, 5, 6]);
        assert_eq!(buffer.data(), &[0, 0, 0, 0, 1, 2, 3, 4]);
        buffer.clear();
        assert!(buffer.data().is_empty());
    }
}
