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

//! The per-tick record exchanged between the submit and render threads.
//!
//! Two [`Frame`]s exist. One is filled by the submit thread while the render thread
//! consumes the other; `frame()` swaps them. Render items are written at slots
//! reserved through [`FrameCounters`], so encoders on different threads never touch
//! the same index.

use super::command_buffer::CommandBuffer;
use super::flags::{DebugFlags, DiscardFlags, SamplerFlags, StateFlags, StencilFlags, SubmitFlags};
use super::radix_sort::radix_sort;
use super::sort_key::{BlitKey, SortKey};
use super::text::TextVideoMem;
use super::transient::{TransientAllocator, TransientBuffer};
use super::types::{EncoderStats, ViewMode};
use super::uniform_buffer::UniformBuffer;
use super::view::{Rect, View};
use crate::config::Resolution;
use crate::handle::*;
use crate::limits::*;
use crate::math::Mat4;
use crate::sync::BoundedCounter;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

/// Scissor index meaning "no scissor".
pub const NO_SCISSOR: u16 = u16::MAX;

/// One bound vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct VertexStream {
    /// Buffer; a dynamic vertex buffer is resolved to its parent before submit.
    pub handle: VertexBufferHandle,
    /// First vertex.
    pub start_vertex: u32,
    /// Layout overriding the buffer's own layout.
    pub layout: VertexLayoutHandle,
}

/// Draw call state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderDraw {
    /// Pipeline state.
    pub state: StateFlags,
    /// Front and back stencil state.
    pub stencil: StencilFlags,
    /// Blend factor color.
    pub rgba: u32,
    /// Which frame uniform buffer `uniform_begin..uniform_end` refers to.
    pub uniform_idx: u8,
    /// Start of the uniform stream of this draw.
    pub uniform_begin: u32,
    /// End of the uniform stream of this draw.
    pub uniform_end: u32,
    /// First matrix in the matrix cache.
    pub start_matrix: u32,
    /// Number of matrices.
    pub num_matrices: u16,
    /// Index buffer; invalid for non-indexed draws.
    pub index_buffer: IndexBufferHandle,
    /// First index.
    pub start_index: u32,
    /// Number of indices; `u32::MAX` means the whole buffer.
    pub num_indices: u32,
    /// Vertex streams.
    pub streams: [VertexStream; MAX_VERTEX_STREAMS],
    /// Bit `i` set when stream `i` is bound.
    pub stream_mask: u8,
    /// Vertices available in each stream slot.
    pub stream_vertices: [u32; MAX_VERTEX_STREAMS],
    /// Count set for draws without streams; `u32::MAX` when unset.
    pub vertex_count: u32,
    /// Vertex count of the submitted draw, see [`RenderDraw::resolve_vertex_count`].
    pub num_vertices: u32,
    /// Instance data buffer.
    pub instance_data_buffer: VertexBufferHandle,
    /// Byte offset of the instance data.
    pub instance_data_offset: u32,
    /// Bytes per instance.
    pub instance_data_stride: u16,
    /// Instance count.
    pub num_instances: u32,
    /// Index into the rect cache, or [`NO_SCISSOR`].
    pub scissor: u16,
    /// Indirect argument buffer.
    pub indirect_buffer: IndirectBufferHandle,
    /// First indirect draw.
    pub start_indirect: u32,
    /// Number of indirect draws.
    pub num_indirect: u32,
    /// Query written by this draw.
    pub occlusion_query: OcclusionQueryHandle,
    /// Item flags.
    pub submit_flags: SubmitFlags,
}

impl Default for RenderDraw {
    fn default() -> Self {
        Self {
            state: StateFlags::DEFAULT,
            stencil: StencilFlags::NONE,
            rgba: 0,
            uniform_idx: 0,
            uniform_begin: 0,
            uniform_end: 0,
            start_matrix: 0,
            num_matrices: 1,
            index_buffer: IndexBufferHandle::INVALID,
            start_index: 0,
            num_indices: u32::MAX,
            streams: [VertexStream::default(); MAX_VERTEX_STREAMS],
            stream_mask: 0,
            stream_vertices: [0; MAX_VERTEX_STREAMS],
            vertex_count: u32::MAX,
            num_vertices: u32::MAX,
            instance_data_buffer: VertexBufferHandle::INVALID,
            instance_data_offset: 0,
            instance_data_stride: 0,
            num_instances: 1,
            scissor: NO_SCISSOR,
            indirect_buffer: IndirectBufferHandle::INVALID,
            start_indirect: 0,
            num_indirect: u32::MAX,
            occlusion_query: OcclusionQueryHandle::INVALID,
            submit_flags: SubmitFlags::EMPTY,
        }
    }
}

impl RenderDraw {
    /// Resets the parts of the state named by `flags`.
    pub fn clear(&mut self, flags: DiscardFlags) {
        let fresh = RenderDraw::default();
        if flags.contains(DiscardFlags::STATE) {
            self.uniform_begin = self.uniform_end;
            self.state = fresh.state;
            self.stencil = fresh.stencil;
            self.rgba = fresh.rgba;
            self.scissor = fresh.scissor;
        }
        if flags.contains(DiscardFlags::TRANSFORM) {
            self.start_matrix = fresh.start_matrix;
            self.num_matrices = fresh.num_matrices;
        }
        if flags.contains(DiscardFlags::INSTANCE_DATA) {
            self.instance_data_buffer = fresh.instance_data_buffer;
            self.instance_data_offset = 0;
            self.instance_data_stride = 0;
            self.num_instances = 1;
        }
        if flags.contains(DiscardFlags::VERTEX_STREAMS) {
            self.streams = fresh.streams;
            self.stream_mask = 0;
            self.stream_vertices = fresh.stream_vertices;
            self.vertex_count = fresh.vertex_count;
            self.num_vertices = fresh.num_vertices;
        }
        if flags.contains(DiscardFlags::INDEX_BUFFER) {
            self.index_buffer = fresh.index_buffer;
            self.start_index = 0;
            self.num_indices = fresh.num_indices;
            self.submit_flags.remove(SubmitFlags::INDEX32);
        }
        self.start_indirect = 0;
        self.num_indirect = u32::MAX;
        self.indirect_buffer = IndirectBufferHandle::INVALID;
        self.occlusion_query = OcclusionQueryHandle::INVALID;
        self.submit_flags.remove(SubmitFlags::OCCLUSION_VISIBLE);
    }

    /// Binds `stream`. Returns `false` for an out of range stream index.
    pub fn set_vertex_stream(&mut self, stream: u8, value: VertexStream, num_vertices: u32) -> bool {
        let Some(slot) = self.streams.get_mut(stream as usize) else {
            return false;
        };
        let bit = 1u8 << stream;
        if value.handle.is_valid() {
            *slot = value;
            self.stream_mask |= bit;
            self.stream_vertices[stream as usize] = num_vertices;
        } else {
            *slot = VertexStream::default();
            self.stream_mask &= !bit;
            self.stream_vertices[stream as usize] = 0;
        }
        true
    }

    /// Minimum across the bound streams, or the explicit count when no stream
    /// is bound.
    pub fn derived_vertex_count(&self) -> u32 {
        self.bound_streams()
            .map(|(i, _)| self.stream_vertices[i as usize])
            .min()
            .unwrap_or(self.vertex_count)
    }

    /// Fixes `num_vertices` for submission.
    pub fn resolve_vertex_count(&mut self) {
        self.num_vertices = self.derived_vertex_count();
    }

    /// `true` if nothing would be drawn. A vertex count set without any bound
    /// stream draws attribute-less vertices.
    pub fn is_empty(&self) -> bool {
        let count = self.derived_vertex_count();
        let no_vertices = count == 0 || (self.stream_mask == 0 && count == u32::MAX);
        let no_indices = !self.index_buffer.is_valid() || self.num_indices == 0;
        let no_indirect = !self.indirect_buffer.is_valid();
        no_vertices && no_indices && no_indirect
    }

    /// Iterates the bound streams.
    pub fn bound_streams(&self) -> impl Iterator<Item = (u8, &VertexStream)> + '_ {
        self.streams
            .iter()
            .enumerate()
            .filter(move |(i, _)| self.stream_mask & (1 << i) != 0)
            .map(|(i, s)| (i as u8, s))
    }
}

/// Dispatch state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderCompute {
    /// Which frame uniform buffer the range refers to.
    pub uniform_idx: u8,
    /// Start of the uniform stream.
    pub uniform_begin: u32,
    /// End of the uniform stream.
    pub uniform_end: u32,
    /// First matrix in the matrix cache.
    pub start_matrix: u32,
    /// Number of matrices.
    pub num_matrices: u16,
    /// Work groups along X.
    pub num_x: u32,
    /// Work groups along Y.
    pub num_y: u32,
    /// Work groups along Z.
    pub num_z: u32,
    /// Indirect argument buffer.
    pub indirect_buffer: IndirectBufferHandle,
    /// First indirect dispatch.
    pub start_indirect: u32,
    /// Number of indirect dispatches.
    pub num_indirect: u32,
    /// Item flags.
    pub submit_flags: SubmitFlags,
}

impl Default for RenderCompute {
    fn default() -> Self {
        Self {
            uniform_idx: 0,
            uniform_begin: 0,
            uniform_end: 0,
            start_matrix: 0,
            num_matrices: 0,
            num_x: 0,
            num_y: 0,
            num_z: 0,
            indirect_buffer: IndirectBufferHandle::INVALID,
            start_indirect: 0,
            num_indirect: u32::MAX,
            submit_flags: SubmitFlags::EMPTY,
        }
    }
}

impl RenderCompute {
    /// Resets the parts of the state named by `flags`.
    pub fn clear(&mut self, flags: DiscardFlags) {
        if flags.contains(DiscardFlags::STATE) {
            self.uniform_begin = self.uniform_end;
        }
        if flags.contains(DiscardFlags::TRANSFORM) {
            self.start_matrix = 0;
            self.num_matrices = 0;
        }
        self.num_x = 0;
        self.num_y = 0;
        self.num_z = 0;
        self.indirect_buffer = IndirectBufferHandle::INVALID;
        self.start_indirect = 0;
        self.num_indirect = u32::MAX;
        self.submit_flags = SubmitFlags::EMPTY;
    }
}

/// A recorded item.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RenderItem {
    /// Draw call.
    Draw(RenderDraw),
    /// Compute dispatch.
    Compute(RenderCompute),
}

impl Default for RenderItem {
    fn default() -> Self {
        RenderItem::Draw(RenderDraw::default())
    }
}

/// Resource kind of a binding slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[repr(u8)]
pub enum BindingType {
    /// Storage image.
    Image,
    /// Index buffer read from compute.
    IndexBuffer,
    /// Vertex buffer read from compute.
    VertexBuffer,
    /// Sampled texture.
    #[default]
    Texture,
}

/// One texture or buffer binding.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Binding {
    /// Handle index; [`INVALID_HANDLE`] when unbound.
    pub idx: u16,
    /// Kind of `idx`.
    pub ty: BindingType,
    /// Sampler state for textures.
    pub sampler_flags: SamplerFlags,
    /// Format for images.
    pub format: u8,
    /// `Access` for images and buffers.
    pub access: u8,
    /// Mip for images.
    pub mip: u8,
}

impl Default for Binding {
    fn default() -> Self {
        Self {
            idx: INVALID_HANDLE,
            ty: BindingType::Texture,
            sampler_flags: SamplerFlags::EMPTY,
            format: 0,
            access: 0,
            mip: 0,
        }
    }
}

/// Binding slots of an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct RenderBind {
    /// Slots by stage.
    pub bind: [Binding; MAX_TEXTURE_SAMPLERS],
}

impl RenderBind {
    /// Unbinds every slot.
    pub fn clear(&mut self) {
        self.bind = [Binding::default(); MAX_TEXTURE_SAMPLERS];
    }

    /// Bound slots.
    pub fn bound(&self) -> impl Iterator<Item = (u8, &Binding)> + '_ {
        self.bind
            .iter()
            .enumerate()
            .filter(|(_, b)| b.idx != INVALID_HANDLE)
            .map(|(i, b)| (i as u8, b))
    }
}

/// A texture copy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitItem {
    /// Source X.
    pub src_x: u16,
    /// Source Y.
    pub src_y: u16,
    /// Source Z.
    pub src_z: u16,
    /// Destination X.
    pub dst_x: u16,
    /// Destination Y.
    pub dst_y: u16,
    /// Destination Z.
    pub dst_z: u16,
    /// Width.
    pub width: u16,
    /// Height.
    pub height: u16,
    /// Depth.
    pub depth: u16,
    /// Source mip.
    pub src_mip: u8,
    /// Destination mip.
    pub dst_mip: u8,
    /// Source texture.
    pub src: TextureHandle,
    /// Destination texture.
    pub dst: TextureHandle,
}

/// Transforms referenced by render items. Slot 0 always holds the identity.
#[derive(Debug, Clone, PartialEq)]
pub struct MatrixCache {
    cache: Vec<Mat4>,
}

impl Default for MatrixCache {
    fn default() -> Self {
        Self {
            cache: vec![Mat4::IDENTITY],
        }
    }
}

impl MatrixCache {
    /// Keeps only the identity slot.
    pub fn reset(&mut self) {
        self.cache.truncate(1);
    }

    /// Stores `matrices` at a reserved range starting at `start`.
    pub fn set(&mut self, start: u32, matrices: &[Mat4]) {
        let start = start as usize;
        let end = start + matrices.len();
        if self.cache.len() < end {
            self.cache.resize(end, Mat4::IDENTITY);
        }
        self.cache[start..end].copy_from_slice(matrices);
    }

    /// Matrix at `idx`, the identity when out of range.
    pub fn get(&self, idx: u32) -> Mat4 {
        self.cache.get(idx as usize).copied().unwrap_or(Mat4::IDENTITY)
    }

    /// Matrices `start..start + num`.
    pub fn range(&self, start: u32, num: u16) -> &[Mat4] {
        let start = (start as usize).min(self.cache.len());
        let end = (start + num as usize).min(self.cache.len());
        &self.cache[start..end]
    }

    /// Slots in use.
    pub fn len(&self) -> usize {
        self.cache.len()
    }

    /// Always `false`; the identity slot is permanent.
    pub fn is_empty(&self) -> bool {
        self.cache.is_empty()
    }
}

/// Scissor rectangles referenced by render items.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RectCache {
    cache: Vec<Rect>,
}

impl RectCache {
    /// Forgets every rectangle.
    pub fn reset(&mut self) {
        self.cache.clear();
    }

    /// Stores `rect` at a reserved slot.
    pub fn set(&mut self, idx: u16, rect: Rect) {
        let idx = idx as usize;
        if self.cache.len() <= idx {
            self.cache.resize(idx + 1, Rect::default());
        }
        self.cache[idx] = rect;
    }

    /// Rectangle at `idx`.
    pub fn get(&self, idx: u16) -> Option<Rect> {
        self.cache.get(idx as usize).copied()
    }
}

/// Handle indices whose destroy was recorded this frame. They are returned to
/// their allocators when the frame is swapped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FreeLists {
    lists: Vec<Vec<u16>>,
}

impl Default for FreeLists {
    fn default() -> Self {
        Self {
            lists: vec![Vec::new(); HandleKind::ALL.len()],
        }
    }
}

impl FreeLists {
    /// Queues `handle`. Returns `false` if it was already queued.
    pub fn queue(&mut self, handle: AnyHandle) -> bool {
        let list = &mut self.lists[handle.kind as usize];
        if list.contains(&handle.idx) {
            return false;
        }
        list.push(handle.idx);
        true
    }

    /// `true` if `handle` is queued.
    pub fn is_queued(&self, handle: AnyHandle) -> bool {
        self.lists[handle.kind as usize].contains(&handle.idx)
    }

    /// Queued indices of `kind`.
    pub fn get(&self, kind: HandleKind) -> &[u16] {
        &self.lists[kind as usize]
    }

    /// Removes and returns the queued indices of `kind`.
    pub fn take(&mut self, kind: HandleKind) -> Vec<u16> {
        std::mem::take(&mut self.lists[kind as usize])
    }

    /// Total number of queued indices.
    pub fn len(&self) -> usize {
        self.lists.iter().map(Vec::len).sum()
    }

    /// `true` if nothing is queued.
    pub fn is_empty(&self) -> bool {
        self.lists.iter().all(Vec::is_empty)
    }

    /// Forgets everything.
    pub fn clear(&mut self) {
        self.lists.iter_mut().for_each(Vec::clear);
    }
}

/// A pending screenshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScreenShotRequest {
    /// Frame buffer to capture; invalid means the backbuffer.
    pub handle: FrameBufferHandle,
    /// Destination handed to [`Callback::screen_shot`](crate::callback::Callback::screen_shot).
    pub path: String,
}

/// Atomics shared by every encoder recording into the submit frame.
#[derive(Debug)]
pub struct FrameCounters {
    frame_num: AtomicU32,
    /// Render item slots.
    pub render_items: BoundedCounter,
    /// Blit slots.
    pub blit_items: BoundedCounter,
    /// Matrix cache slots; slot 0 is the identity.
    pub matrices: BoundedCounter,
    /// Scissor rect slots.
    pub rects: BoundedCounter,
    /// Transient vertex space.
    pub transient_vb: TransientAllocator,
    /// Transient index space.
    pub transient_ib: TransientAllocator,
    seq: Vec<AtomicU32>,
    occlusion_used: Vec<AtomicBool>,
}

impl FrameCounters {
    /// Counters for transient buffers of the given sizes.
    pub fn new(transient_vb_size: u32, transient_ib_size: u32) -> Self {
        let counters = Self {
            frame_num: AtomicU32::new(0),
            render_items: BoundedCounter::new(MAX_DRAW_CALLS),
            blit_items: BoundedCounter::new(MAX_BLIT_ITEMS),
            matrices: BoundedCounter::new(MAX_MATRIX_CACHE),
            rects: BoundedCounter::new(MAX_RECT_CACHE),
            transient_vb: TransientAllocator::new(transient_vb_size),
            transient_ib: TransientAllocator::new(transient_ib_size),
            seq: (0..MAX_VIEWS).map(|_| AtomicU32::new(0)).collect(),
            occlusion_used: (0..MAX_OCCLUSION_QUERIES).map(|_| AtomicBool::new(false)).collect(),
        };
        counters.matrices.reset(1);
        counters
    }

    /// Rewinds everything for `frame_num`.
    pub fn start(&self, frame_num: u32) {
        self.frame_num.store(frame_num, Ordering::Release);
        self.render_items.reset(0);
        self.blit_items.reset(0);
        self.matrices.reset(1);
        self.rects.reset(0);
        self.transient_vb.reset(None);
        self.transient_ib.reset(None);
        for seq in &self.seq {
            seq.store(0, Ordering::Relaxed);
        }
        for used in &self.occlusion_used {
            used.store(false, Ordering::Relaxed);
        }
    }

    /// Number of the frame being recorded.
    pub fn frame_num(&self) -> u32 {
        self.frame_num.load(Ordering::Acquire)
    }

    /// Next sequence number of `view`.
    pub fn next_seq(&self, view: ViewId) -> u32 {
        self.seq
            .get(view as usize)
            .map_or(0, |s| s.fetch_add(1, Ordering::AcqRel))
    }

    /// Marks `query` as used this frame. Returns `false` if it already was.
    pub fn use_occlusion_query(&self, query: OcclusionQueryHandle) -> bool {
        self.occlusion_used
            .get(query.idx() as usize)
            .is_some_and(|used| !used.swap(true, Ordering::AcqRel))
    }
}

impl Default for FrameCounters {
    fn default() -> Self {
        Self::new(TRANSIENT_VERTEX_BUFFER_SIZE, TRANSIENT_INDEX_BUFFER_SIZE)
    }
}

/// Everything recorded during one tick.
#[derive(Debug)]
pub struct Frame {
    /// Frame number.
    pub frame_num: u32,
    /// Backbuffer state for this frame.
    pub resolution: Resolution,
    /// Debug features for this frame.
    pub debug: DebugFlags,
    /// View table.
    pub views: Vec<View>,
    /// Position to view: `view_order[i]` is rendered i-th.
    pub view_order: Vec<ViewId>,
    /// View to position, the inverse of `view_order`.
    pub view_remap: Vec<ViewId>,
    /// Clear color palette.
    pub color_palette: [[f32; 4]; MAX_COLOR_PALETTE],
    /// Render item slots, indexed by reserved slot.
    pub render_items: Vec<RenderItem>,
    /// Bindings of each render item.
    pub render_binds: Vec<RenderBind>,
    item_keys: Vec<u64>,
    item_filled: Vec<bool>,
    /// Sorted keys with view bits remapped to positions.
    pub sort_keys: Vec<u64>,
    /// Render item slot of each sorted key.
    pub sort_values: Vec<u16>,
    /// Blit slots.
    pub blit_items: Vec<BlitItem>,
    blit_item_views: Vec<ViewId>,
    blit_filled: Vec<bool>,
    /// Sorted blit keys with view bits remapped to positions.
    pub blit_keys: Vec<u32>,
    /// Transforms.
    pub matrix_cache: MatrixCache,
    /// Scissors.
    pub rect_cache: RectCache,
    /// Uniform streams, one per encoder.
    pub uniform_buffers: Vec<UniformBuffer>,
    /// Creates and updates, executed before the draws.
    pub cmd_pre: CommandBuffer,
    /// Destroys and read backs, executed after the draws.
    pub cmd_post: CommandBuffer,
    /// Handles released when this frame is swapped.
    pub free_lists: FreeLists,
    /// Occlusion query results, [`OCCLUSION_NO_RESULT`] when unknown.
    pub occlusion: Vec<i32>,
    /// Transient vertex data.
    pub transient_vb: TransientBuffer<VertexBufferHandle>,
    /// Transient index data.
    pub transient_ib: TransientBuffer<IndexBufferHandle>,
    /// Debug text.
    pub text: TextVideoMem,
    /// Screenshots to take after the draws.
    pub screenshots: Vec<ScreenShotRequest>,
    /// Debug markers set by encoders.
    pub markers: Vec<String>,
    /// Per-encoder counters.
    pub encoder_stats: Vec<EncoderStats>,
    /// Draws dropped while recording.
    pub num_dropped: u32,
    /// Time the submit thread waited for the render thread before this swap.
    pub wait_render_ns: u64,
    temp_keys: Vec<u64>,
    temp_values: Vec<u16>,
    temp_blit_keys: Vec<u32>,
    temp_blit_values: Vec<u16>,
}

impl Frame {
    /// An empty frame with room for `max_encoders` uniform streams.
    pub fn new(max_encoders: usize, min_cmd_capacity: usize) -> Self {
        let identity: Vec<ViewId> = (0..MAX_VIEWS as ViewId).collect();
        Self {
            frame_num: 0,
            resolution: Resolution::default(),
            debug: DebugFlags::EMPTY,
            views: vec![View::default(); MAX_VIEWS],
            view_order: identity.clone(),
            view_remap: identity,
            color_palette: [[0.0; 4]; MAX_COLOR_PALETTE],
            render_items: Vec::new(),
            render_binds: Vec::new(),
            item_keys: Vec::new(),
            item_filled: Vec::new(),
            sort_keys: Vec::new(),
            sort_values: Vec::new(),
            blit_items: Vec::new(),
            blit_item_views: Vec::new(),
            blit_filled: Vec::new(),
            blit_keys: Vec::new(),
            matrix_cache: MatrixCache::default(),
            rect_cache: RectCache::default(),
            uniform_buffers: (0..max_encoders.max(1)).map(|_| UniformBuffer::new()).collect(),
            cmd_pre: CommandBuffer::new(min_cmd_capacity),
            cmd_post: CommandBuffer::new(min_cmd_capacity),
            free_lists: FreeLists::default(),
            occlusion: vec![OCCLUSION_NO_RESULT; MAX_OCCLUSION_QUERIES as usize],
            transient_vb: TransientBuffer::default(),
            transient_ib: TransientBuffer::default(),
            text: TextVideoMem::default(),
            screenshots: Vec::new(),
            markers: Vec::new(),
            encoder_stats: vec![EncoderStats::default(); max_encoders.max(1)],
            num_dropped: 0,
            wait_render_ns: 0,
            temp_keys: Vec::new(),
            temp_values: Vec::new(),
            temp_blit_keys: Vec::new(),
            temp_blit_values: Vec::new(),
        }
    }

    /// Clears every recording for `frame_num`. Occlusion results are kept.
    pub fn start(&mut self, frame_num: u32) {
        self.frame_num = frame_num;
        self.render_items.clear();
        self.render_binds.clear();
        self.item_keys.clear();
        self.item_filled.clear();
        self.sort_keys.clear();
        self.sort_values.clear();
        self.blit_items.clear();
        self.blit_item_views.clear();
        self.blit_filled.clear();
        self.blit_keys.clear();
        self.matrix_cache.reset();
        self.rect_cache.reset();
        for ub in &mut self.uniform_buffers {
            ub.reset(0);
        }
        self.cmd_pre.start();
        self.cmd_post.start();
        self.free_lists.clear();
        self.transient_vb.clear();
        self.transient_ib.clear();
        self.screenshots.clear();
        self.markers.clear();
        self.encoder_stats.fill(EncoderStats::default());
        self.num_dropped = 0;
    }

    /// Terminates the command and uniform streams.
    pub fn finish(&mut self) {
        self.cmd_pre.finish();
        self.cmd_post.finish();
        for ub in &mut self.uniform_buffers {
            ub.finish();
        }
    }

    /// Stores a render item at its reserved slot.
    pub fn put_item(&mut self, slot: u32, key: u64, item: RenderItem, bind: RenderBind) {
        let slot = slot as usize;
        if self.render_items.len() <= slot {
            self.render_items.resize(slot + 1, RenderItem::default());
            self.render_binds.resize(slot + 1, RenderBind::default());
            self.item_keys.resize(slot + 1, 0);
            self.item_filled.resize(slot + 1, false);
        }
        self.render_items[slot] = item;
        self.render_binds[slot] = bind;
        self.item_keys[slot] = key;
        self.item_filled[slot] = true;
    }

    /// Stores a blit at its reserved slot.
    pub fn put_blit(&mut self, slot: u32, view: ViewId, item: BlitItem) {
        let slot = slot as usize;
        if self.blit_items.len() <= slot {
            self.blit_items.resize(slot + 1, BlitItem::default());
            self.blit_item_views.resize(slot + 1, 0);
            self.blit_filled.resize(slot + 1, false);
        }
        self.blit_items[slot] = item;
        self.blit_item_views[slot] = view;
        self.blit_filled[slot] = true;
    }

    /// Number of render items recorded.
    pub fn num_render_items(&self) -> u32 {
        self.item_filled.iter().filter(|f| **f).count() as u32
    }

    /// Number of blits recorded.
    pub fn num_blit_items(&self) -> u32 {
        self.blit_filled.iter().filter(|f| **f).count() as u32
    }

    /// Sets the view order; views not listed keep their relative order after the
    /// listed ones. Also rebuilds `view_remap`.
    pub fn set_view_order(&mut self, order: &[ViewId]) {
        let mut seen = vec![false; MAX_VIEWS];
        self.view_order.clear();
        for &view in order.iter().filter(|v| (**v as usize) < MAX_VIEWS) {
            if !seen[view as usize] {
                seen[view as usize] = true;
                self.view_order.push(view);
            }
        }
        for view in 0..MAX_VIEWS as ViewId {
            if !seen[view as usize] {
                self.view_order.push(view);
            }
        }
        for (pos, &view) in self.view_order.iter().enumerate() {
            self.view_remap[view as usize] = pos as ViewId;
        }
    }

    /// Remaps every key from logical view to render position and radix sorts the
    /// render items and blits. Unfilled slots are skipped.
    pub fn sort(&mut self) {
        self.sort_keys.clear();
        self.sort_values.clear();
        for (slot, key) in self.item_keys.iter().enumerate() {
            if self.item_filled[slot] {
                self.sort_keys.push(SortKey::remap_view(*key, &self.view_remap));
                self.sort_values.push(slot as u16);
            }
        }
        radix_sort(
            &mut self.sort_keys,
            &mut self.sort_values,
            &mut self.temp_keys,
            &mut self.temp_values,
        );

        self.blit_keys.clear();
        let mut blit_values = Vec::with_capacity(self.blit_items.len());
        for (slot, view) in self.blit_item_views.iter().enumerate() {
            if self.blit_filled[slot] {
                let key = BlitKey {
                    view: self.view_remap[*view as usize],
                    item: slot as u16,
                };
                self.blit_keys.push(key.encode());
                blit_values.push(slot as u16);
            }
        }
        radix_sort(
            &mut self.blit_keys,
            &mut blit_values,
            &mut self.temp_blit_keys,
            &mut self.temp_blit_values,
        );
    }

    /// Sorted render items with their decoded keys. Views are logical ids.
    pub fn sorted_items(&self) -> impl Iterator<Item = (SortKey, bool, &RenderItem, &RenderBind)> + '_ {
        self.sort_keys
            .iter()
            .zip(&self.sort_values)
            .map(move |(&key, &slot)| {
                let mut decoded = SortKey::default();
                let is_draw = decoded.decode(key, &self.view_order);
                let slot = slot as usize;
                (decoded, is_draw, &self.render_items[slot], &self.render_binds[slot])
            })
    }

    /// Sorted blits as `(logical view, item)`.
    pub fn sorted_blits(&self) -> impl Iterator<Item = (ViewId, &BlitItem)> + '_ {
        self.blit_keys.iter().map(move |&key| {
            let decoded = BlitKey::decode(key);
            (self.view_order[decoded.view as usize], &self.blit_items[decoded.item as usize])
        })
    }

    /// Views whose viewport ended up empty; their items must not be drawn.
    pub fn is_view_culled(&self, view: ViewId) -> bool {
        self.views
            .get(view as usize)
            .map_or(true, |v| v.rect.is_zero_area())
    }

    /// Sort mode of `view`.
    pub fn view_mode(&self, view: ViewId) -> ViewMode {
        self.views.get(view as usize).map_or(ViewMode::Default, |v| v.mode)
    }

    /// Result of `query`.
    pub fn occlusion_result(&self, query: OcclusionQueryHandle) -> i32 {
        self.occlusion
            .get(query.idx() as usize)
            .copied()
            .unwrap_or(OCCLUSION_NO_RESULT)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draw_key(view: ViewId, program: u16, depth: u32, seq: u32, mode: ViewMode) -> u64 {
        SortKey {
            view,
            program,
            depth,
            seq,
            ..SortKey::default()
        }
        .encode_draw(mode)
    }

    #[test]
    fn discard_state_moves_uniform_begin() {
        let mut draw = RenderDraw {
            uniform_begin: 4,
            uniform_end: 40,
            state: StateFlags::WRITE_R,
            ..RenderDraw::default()
        };
        draw.clear(DiscardFlags::STATE);
        assert_eq!(draw.uniform_begin, 40);
        assert_eq!(draw.state, StateFlags::DEFAULT);
    }

    #[test]
    fn discard_keeps_what_was_not_named() {
        let mut draw = RenderDraw::default();
        draw.set_vertex_stream(
            0,
            VertexStream {
                handle: VertexBufferHandle(2),
                start_vertex: 0,
                layout: VertexLayoutHandle::INVALID,
            },
            3,
        );
        draw.index_buffer = IndexBufferHandle(1);
        draw.clear(DiscardFlags::INDEX_BUFFER);
        assert!(!draw.index_buffer.is_valid());
        assert_eq!(draw.stream_mask, 1);
        assert_eq!(draw.derived_vertex_count(), 3);
        draw.clear(DiscardFlags::ALL);
        assert_eq!(draw.stream_mask, 0);
        assert!(draw.is_empty());
    }

    fn stream(handle: u16) -> VertexStream {
        VertexStream {
            handle: VertexBufferHandle(handle),
            start_vertex: 0,
            layout: VertexLayoutHandle::INVALID,
        }
    }

    #[test]
    fn rebinding_a_stream_replaces_its_vertex_count() {
        let mut draw = RenderDraw::default();
        draw.set_vertex_stream(0, stream(1), 3);
        draw.resolve_vertex_count();
        assert_eq!(draw.num_vertices, 3);

        draw.clear(DiscardFlags::STATE);
        draw.set_vertex_stream(0, stream(2), 6);
        draw.resolve_vertex_count();
        assert_eq!(draw.num_vertices, 6, "the larger buffer counts, not the previous one");

        draw.set_vertex_stream(1, stream(3), 4);
        assert_eq!(draw.derived_vertex_count(), 4, "minimum across bound streams");
        draw.set_vertex_stream(1, VertexStream::default(), 0);
        assert_eq!(draw.derived_vertex_count(), 6, "unbound streams no longer count");
    }

    #[test]
    fn explicit_vertex_count_applies_without_streams() {
        let mut draw = RenderDraw {
            vertex_count: 2,
            ..RenderDraw::default()
        };
        assert_eq!(draw.derived_vertex_count(), 2);
        draw.set_vertex_stream(0, stream(1), 6);
        assert_eq!(draw.derived_vertex_count(), 6, "bound streams take precedence");
        draw.clear(DiscardFlags::VERTEX_STREAMS);
        assert_eq!(draw.derived_vertex_count(), u32::MAX);
        assert!(draw.is_empty());
    }

    #[test]
    fn sort_groups_views_and_orders_programs() {
        let mut frame = Frame::new(1, 64);
        frame.put_item(0, draw_key(1, 2, 0, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.put_item(1, draw_key(0, 5, 100, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.put_item(2, draw_key(0, 3, 10, 1, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.sort();

        let order: Vec<(ViewId, u16)> = frame.sorted_items().map(|(k, _, _, _)| (k.view, k.program)).collect();
        assert_eq!(order, vec![(0, 3), (0, 5), (1, 2)]);
    }

    #[test]
    fn view_order_moves_whole_buckets() {
        let mut frame = Frame::new(1, 64);
        frame.set_view_order(&[1, 0]);
        assert_eq!(&frame.view_order[..3], &[1, 0, 2]);
        assert_eq!(&frame.view_remap[..3], &[1, 0, 2]);

        frame.put_item(0, draw_key(0, 1, 0, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.put_item(1, draw_key(1, 9, 0, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.put_item(2, draw_key(2, 0, 0, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.sort();

        let views: Vec<ViewId> = frame.sorted_items().map(|(k, _, _, _)| k.view).collect();
        assert_eq!(views, vec![1, 0, 2]);
    }

    #[test]
    fn unfilled_slots_are_skipped() {
        let mut frame = Frame::new(1, 64);
        frame.put_item(3, draw_key(0, 1, 0, 0, ViewMode::Default), RenderItem::default(), RenderBind::default());
        frame.sort();
        assert_eq!(frame.num_render_items(), 1);
        assert_eq!(frame.sort_values, vec![3]);
    }

    #[test]
    fn blits_sort_by_view_then_submission() {
        let mut frame = Frame::new(1, 64);
        frame.put_blit(0, 2, BlitItem { width: 1, ..BlitItem::default() });
        frame.put_blit(1, 0, BlitItem { width: 2, ..BlitItem::default() });
        frame.put_blit(2, 0, BlitItem { width: 3, ..BlitItem::default() });
        frame.sort();
        let widths: Vec<u16> = frame.sorted_blits().map(|(_, b)| b.width).collect();
        assert_eq!(widths, vec![2, 3, 1]);
    }

    #[test]
    fn counters_restart_each_frame() {
        let counters = FrameCounters::new(64, 64);
        assert_eq!(counters.next_seq(3), 0);
        assert_eq!(counters.next_seq(3), 1);
        assert!(counters.use_occlusion_query(OcclusionQueryHandle(0)));
        assert!(!counters.use_occlusion_query(OcclusionQueryHandle(0)));
        assert_eq!(counters.matrices.reserve(1), (1, 1), "slot 0 is the identity");

        counters.start(7);
        assert_eq!(counters.frame_num(), 7);
        assert_eq!(counters.next_seq(3), 0);
        assert!(counters.use_occlusion_query(OcclusionQueryHandle(0)));
    }

    #[test]
    fn free_lists_reject_duplicates() {
        let mut lists = FreeLists::default();
        assert!(lists.queue(TextureHandle(4).into()));
        assert!(!lists.queue(TextureHandle(4).into()));
        assert!(lists.queue(ShaderHandle(4).into()));
        assert_eq!(lists.len(), 2);
        assert_eq!(lists.take(HandleKind::Texture), vec![4]);
        assert!(!lists.is_queued(TextureHandle(4).into()));
    }

    #[test]
    fn start_keeps_occlusion_results() {
        let mut frame = Frame::new(2, 64);
        frame.occlusion[1] = 25;
        frame.put_item(0, 0, RenderItem::default(), RenderBind::default());
        frame.start(2);
        assert_eq!(frame.num_render_items(), 0);
        assert_eq!(frame.occlusion_result(OcclusionQueryHandle(1)), 25);
    }
}
