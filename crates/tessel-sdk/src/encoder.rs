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

//! Draw and dispatch recording.
//!
//! An [`Encoder`] accumulates render state, and each `submit` or `dispatch`
//! snapshots that state into a render item. Slots in the frame's item, matrix
//! and scissor arrays are reserved with atomic counters as items are recorded;
//! the items themselves, the encoder's uniform stream and its transient data are
//! copied into the submit frame when the encoder ends. Encoders on different
//! threads therefore only meet on the counters while recording.

use crate::context::{lock, Context};
use crate::resources::{transient_parent, Resources};
use std::sync::MutexGuard;
use tessel_core::error::ValidationCode;
use tessel_core::handle::*;
use tessel_core::limits::*;
use tessel_core::math::Mat4;
use tessel_core::renderer::flags::{
    BufferFlags, DiscardFlags, SamplerFlags, StateFlags, StencilFlags, SubmitFlags,
};
use tessel_core::renderer::frame::{Binding, BindingType, NO_SCISSOR};
use tessel_core::renderer::sort_key::SORT_KEY_PROGRAM_NONE;
use tessel_core::renderer::{
    Access, BlitItem, EncoderStats, InstanceDataBuffer, Rect, RenderBind, RenderCompute, RenderDraw, RenderItem,
    SortKey, TextureFormat, TransientIndexBuffer, TransientVertexBuffer, UniformBuffer, UniformType, VertexStream,
};

/// Records draws, dispatches and blits for the current frame.
///
/// Obtained from [`Context::begin`]. Everything recorded reaches the frame when
/// the encoder is ended or dropped.
pub struct Encoder<'a> {
    ctx: &'a Context,
    slot: usize,
    frame_num: u32,
    draw: RenderDraw,
    compute: RenderCompute,
    bind: RenderBind,
    uniforms: UniformBuffer,
    uniform_begin: u32,
    items: Vec<(u32, u64, RenderItem, RenderBind)>,
    blits: Vec<(u32, ViewId, BlitItem)>,
    matrices: Vec<(u32, Vec<Mat4>)>,
    rects: Vec<(u16, Rect)>,
    transient_vb: Vec<(u32, Vec<u8>)>,
    transient_ib: Vec<(u32, Vec<u8>)>,
    markers: Vec<String>,
    stats: EncoderStats,
}

impl std::fmt::Debug for Encoder<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Encoder")
            .field("slot", &self.slot)
            .field("frame_num", &self.frame_num)
            .field("items", &self.items.len())
            .field("stats", &self.stats)
            .finish()
    }
}

impl<'a> Encoder<'a> {
    pub(crate) fn new(ctx: &'a Context, slot: usize, frame_num: u32) -> Self {
        Self {
            ctx,
            slot,
            frame_num,
            draw: RenderDraw::default(),
            compute: RenderCompute::default(),
            bind: RenderBind::default(),
            uniforms: UniformBuffer::new(),
            uniform_begin: 0,
            items: Vec::new(),
            blits: Vec::new(),
            matrices: Vec::new(),
            rects: Vec::new(),
            transient_vb: Vec::new(),
            transient_ib: Vec::new(),
            markers: Vec::new(),
            stats: EncoderStats::default(),
        }
    }

    /// Encoder slot, which also selects the frame's uniform stream.
    pub fn slot(&self) -> usize {
        self.slot
    }

    /// Ends recording. Same as dropping the encoder.
    pub fn end(self) {}

    fn resources(&self) -> MutexGuard<'a, Resources> {
        lock(&self.ctx.resources)
    }

    fn check_view(&self, view: ViewId, what: &'static str) -> bool {
        self.ctx
            .validate(what, |s| {
                s.check((view as usize) < MAX_VIEWS, ValidationCode::InvalidParameter, || {
                    format!("view {view} out of range (max {MAX_VIEWS})")
                })
            })
            .is_ok()
    }

    // --- State ---

    /// Debug marker inserted before this encoder's items.
    pub fn set_marker(&mut self, marker: &str) {
        self.markers.push(marker.to_owned());
    }

    /// Render state and blend factor color for the next draw.
    pub fn set_state(&mut self, state: StateFlags, rgba: u32) {
        self.draw.state = state;
        self.draw.rgba = rgba;
    }

    pub fn set_stencil(&mut self, stencil: StencilFlags) {
        self.draw.stencil = stencil;
    }

    /// Scissor for the next draw, in pixels. Returns the cache index, reusable
    /// with [`set_scissor_cached`](Self::set_scissor_cached) this frame, or
    /// `NO_SCISSOR` once the cache is full.
    pub fn set_scissor(&mut self, x: u16, y: u16, width: u16, height: u16) -> u16 {
        let Some(idx) = self.ctx.counters.rects.reserve_one() else {
            log::warn!("Scissor cache full ({MAX_RECT_CACHE} rects)");
            self.draw.scissor = NO_SCISSOR;
            return NO_SCISSOR;
        };
        let idx = idx as u16;
        self.rects.push((idx, Rect::new(x, y, width, height)));
        self.draw.scissor = idx;
        idx
    }

    pub fn set_scissor_cached(&mut self, cache: u16) {
        self.draw.scissor = cache;
    }

    /// Model matrices for the next draw. Returns the first cache index,
    /// reusable with [`set_transform_cached`](Self::set_transform_cached) this frame.
    pub fn set_transform(&mut self, matrices: &[Mat4]) -> u32 {
        if matrices.is_empty() {
            return 0;
        }
        let (first, granted) = self.ctx.counters.matrices.reserve(matrices.len() as u32);
        if granted == 0 {
            log::warn!("Matrix cache full ({MAX_MATRIX_CACHE} matrices)");
            return 0;
        }
        self.matrices.push((first, matrices[..granted as usize].to_vec()));
        self.draw.start_matrix = first;
        self.draw.num_matrices = granted as u16;
        first
    }

    pub fn set_transform_cached(&mut self, cache: u32, num: u16) {
        self.draw.start_matrix = cache;
        self.draw.num_matrices = num;
    }

    /// Writes `num` elements of a uniform into this encoder's uniform stream.
    /// Values are applied to the next draw or dispatch. A `num` of `u16::MAX`
    /// takes as many elements as `value` holds.
    pub fn set_uniform(&mut self, uniform: UniformHandle, value: &[u8], num: u16) {
        let layout = self.resources().uniform_layout(uniform);
        let Some((ty, declared)) = layout else {
            let _ = self.ctx.validate("set_uniform", |s| {
                s.check(false, ValidationCode::InvalidHandle, || {
                    format!("uniform {} is not valid", uniform.idx())
                })
            });
            return;
        };
        let num = if num == u16::MAX {
            (value.len() / ty.size().max(1) as usize).clamp(1, declared as usize) as u16
        } else {
            num.min(declared)
        };
        self.uniforms.write_uniform(ty, uniform.idx(), value, num);
    }

    /// Typed convenience over [`set_uniform`](Self::set_uniform).
    pub fn set_uniform_pod<T: bytemuck::Pod>(&mut self, uniform: UniformHandle, values: &[T]) {
        self.set_uniform(uniform, bytemuck::cast_slice(values), u16::MAX);
    }

    // --- Geometry ---

    fn bind_indices(&mut self, handle: IndexBufferHandle, index32: bool, first: u32, num: u32) {
        self.draw.index_buffer = handle;
        self.draw.start_index = first;
        self.draw.num_indices = num;
        if index32 {
            self.draw.submit_flags.insert(SubmitFlags::INDEX32);
        } else {
            self.draw.submit_flags.remove(SubmitFlags::INDEX32);
        }
    }

    /// Static index buffer; `num` of `u32::MAX` draws every index from `first`.
    pub fn set_index_buffer(&mut self, handle: IndexBufferHandle, first: u32, num: u32) {
        let info = self
            .resources()
            .index_buffer_refs
            .get(handle.idx())
            .map(|ib| (ib.size, ib.flags.contains(BufferFlags::INDEX32)));
        let Some((size, index32)) = info else {
            log::warn!("set_index_buffer: {handle:?} is not valid");
            return;
        };
        let available = size / if index32 { 4 } else { 2 };
        self.bind_indices(handle, index32, first, num.min(available.saturating_sub(first)));
    }

    pub fn set_dynamic_index_buffer(&mut self, handle: DynamicIndexBufferHandle, first: u32, num: u32) {
        let info = {
            let resources = self.resources();
            let found = resources.dynamic_index_buffer_info(handle).zip(
                resources
                    .dynamic_index_buffer_refs
                    .get(handle.idx())
                    .map(|dib| dib.flags.contains(BufferFlags::INDEX32)),
            );
            found
        };
        let Some((info, index32)) = info else {
            log::warn!("set_dynamic_index_buffer: {handle:?} is not valid");
            return;
        };
        self.bind_indices(
            IndexBufferHandle(info.parent),
            index32,
            info.start + first,
            num.min(info.num.saturating_sub(first)),
        );
    }

    pub fn set_transient_index_buffer(&mut self, tib: &TransientIndexBuffer, first: u32, num: u32) {
        if tib.handle != IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, self.frame_num)) {
            log::warn!("Transient index buffer from another frame ignored");
            return;
        }
        if !self.transient_ib.iter().any(|(offset, _)| *offset == tib.offset) {
            self.transient_ib.push((tib.offset, tib.data.clone()));
        }
        self.bind_indices(
            tib.handle,
            tib.index32,
            tib.start_index + first,
            num.min(tib.num_indices().saturating_sub(first)),
        );
    }

    /// Binds a vertex stream. `num` of `u32::MAX` uses every vertex from `start`.
    pub fn set_vertex_buffer(&mut self, stream: u8, handle: VertexBufferHandle, start: u32, num: u32) {
        let info = self
            .resources()
            .vertex_buffer_refs
            .get(handle.idx())
            .map(|vb| (vb.layout, if vb.stride == 0 { 0 } else { vb.size / vb.stride as u32 }));
        let Some((layout, available)) = info else {
            log::warn!("set_vertex_buffer: {handle:?} is not valid");
            return;
        };
        self.bind_stream(stream, handle, layout, start, num.min(available.saturating_sub(start)));
    }

    /// Binds a vertex stream read with another registered layout.
    pub fn set_vertex_buffer_with_layout(
        &mut self,
        stream: u8,
        handle: VertexBufferHandle,
        start: u32,
        num: u32,
        layout: VertexLayoutHandle,
    ) {
        self.set_vertex_buffer(stream, handle, start, num);
        if let Some(bound) = self.draw.streams.get_mut(stream as usize) {
            if bound.handle == handle {
                bound.layout = layout;
            }
        }
    }

    pub fn set_dynamic_vertex_buffer(&mut self, stream: u8, handle: DynamicVertexBufferHandle, start: u32, num: u32) {
        let info = {
            let resources = self.resources();
            let found = resources.dynamic_vertex_buffer_info(handle).zip(
                resources
                    .dynamic_vertex_buffer_refs
                    .get(handle.idx())
                    .map(|dvb| dvb.layout),
            );
            found
        };
        let Some((info, layout)) = info else {
            log::warn!("set_dynamic_vertex_buffer: {handle:?} is not valid");
            return;
        };
        self.bind_stream(
            stream,
            VertexBufferHandle(info.parent),
            layout,
            info.start + start,
            num.min(info.num.saturating_sub(start)),
        );
    }

    pub fn set_transient_vertex_buffer(&mut self, stream: u8, tvb: &TransientVertexBuffer, start: u32, num: u32) {
        if tvb.handle != VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, self.frame_num)) {
            log::warn!("Transient vertex buffer from another frame ignored");
            return;
        }
        if !self.transient_vb.iter().any(|(offset, _)| *offset == tvb.offset) {
            self.transient_vb.push((tvb.offset, tvb.data.clone()));
        }
        self.bind_stream(
            stream,
            tvb.handle,
            tvb.layout,
            tvb.start_vertex + start,
            num.min(tvb.num_vertices().saturating_sub(start)),
        );
    }

    fn bind_stream(&mut self, stream: u8, handle: VertexBufferHandle, layout: VertexLayoutHandle, start: u32, num: u32) {
        let value = VertexStream {
            handle,
            start_vertex: start,
            layout,
        };
        if !self.draw.set_vertex_stream(stream, value, num) {
            log::warn!("Vertex stream {stream} out of range (max {MAX_VERTEX_STREAMS})");
        }
    }

    /// Vertex count for draws without vertex buffers. Bound streams take
    /// precedence.
    pub fn set_vertex_count(&mut self, num: u32) {
        self.draw.vertex_count = num;
    }

    pub fn set_instance_data_buffer(&mut self, idb: &InstanceDataBuffer, start: u32, num: u32) {
        if idb.handle != VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, self.frame_num)) {
            log::warn!("Instance data buffer from another frame ignored");
            return;
        }
        if !self.transient_vb.iter().any(|(offset, _)| *offset == idb.offset) {
            self.transient_vb.push((idb.offset, idb.data.clone()));
        }
        let start = start.min(idb.num);
        let Some(offset) = instance_offset(idb.offset, start, idb.stride) else {
            log::warn!("set_instance_data_buffer: instance {start} is past the addressable range");
            return;
        };
        self.draw.instance_data_buffer = idb.handle;
        self.draw.instance_data_offset = offset;
        self.draw.instance_data_stride = idb.stride;
        self.draw.num_instances = num.min(idb.num - start);
    }

    /// Instance data read from a static vertex buffer, one vertex per instance.
    pub fn set_instance_data_from_vertex_buffer(&mut self, handle: VertexBufferHandle, start: u32, num: u32) {
        let info = self
            .resources()
            .vertex_buffer_refs
            .get(handle.idx())
            .map(|vb| (vb.stride, if vb.stride == 0 { 0 } else { vb.size / vb.stride as u32 }));
        let Some((stride, available)) = info else {
            log::warn!("set_instance_data_from_vertex_buffer: {handle:?} is not valid");
            return;
        };
        let Some(offset) = instance_offset(0, start, stride) else {
            log::warn!("set_instance_data_from_vertex_buffer: instance {start} is past the addressable range");
            return;
        };
        self.draw.instance_data_buffer = handle;
        self.draw.instance_data_offset = offset;
        self.draw.instance_data_stride = stride;
        self.draw.num_instances = num.min(available.saturating_sub(start));
    }

    pub fn set_instance_data_from_dynamic_vertex_buffer(
        &mut self,
        handle: DynamicVertexBufferHandle,
        start: u32,
        num: u32,
    ) {
        let info = {
            let resources = self.resources();
            let found = resources.dynamic_vertex_buffer_info(handle).zip(
                resources
                    .dynamic_vertex_buffer_refs
                    .get(handle.idx())
                    .map(|dvb| dvb.stride),
            );
            found
        };
        let Some((info, stride)) = info else {
            log::warn!("set_instance_data_from_dynamic_vertex_buffer: {handle:?} is not valid");
            return;
        };
        let Some(offset) = info
            .start
            .checked_add(start)
            .and_then(|first| instance_offset(0, first, stride))
        else {
            log::warn!("set_instance_data_from_dynamic_vertex_buffer: instance {start} is past the addressable range");
            return;
        };
        self.draw.instance_data_buffer = VertexBufferHandle(info.parent);
        self.draw.instance_data_offset = offset;
        self.draw.instance_data_stride = stride;
        self.draw.num_instances = num.min(info.num.saturating_sub(start));
    }

    /// Instance count for draws without instance data.
    pub fn set_instance_count(&mut self, num: u32) {
        self.draw.num_instances = num;
    }

    // --- Bindings ---

    fn set_binding(&mut self, stage: u8, binding: Binding) {
        match self.bind.bind.get_mut(stage as usize) {
            Some(slot) => *slot = binding,
            None => log::warn!("Binding stage {stage} out of range (max {MAX_TEXTURE_SAMPLERS})"),
        }
    }

    /// Binds a texture to `stage` and points the sampler uniform at it.
    pub fn set_texture(&mut self, stage: u8, sampler: UniformHandle, texture: TextureHandle, flags: SamplerFlags) {
        self.set_binding(
            stage,
            Binding {
                idx: texture.idx(),
                ty: BindingType::Texture,
                sampler_flags: flags,
                ..Binding::default()
            },
        );
        if sampler.is_valid() {
            self.uniforms
                .write_uniform(UniformType::Sampler, sampler.idx(), &u32::from(stage).to_ne_bytes(), 1);
        }
    }

    /// Binds a texture mip as a storage image.
    pub fn set_image(&mut self, stage: u8, texture: TextureHandle, mip: u8, access: Access, format: TextureFormat) {
        self.set_binding(
            stage,
            Binding {
                idx: texture.idx(),
                ty: BindingType::Image,
                format: format as u8,
                access: access as u8,
                mip,
                ..Binding::default()
            },
        );
    }

    pub fn set_compute_index_buffer(&mut self, stage: u8, handle: IndexBufferHandle, access: Access) {
        self.set_binding(stage, buffer_binding(handle.idx(), BindingType::IndexBuffer, access));
    }

    pub fn set_compute_vertex_buffer(&mut self, stage: u8, handle: VertexBufferHandle, access: Access) {
        self.set_binding(stage, buffer_binding(handle.idx(), BindingType::VertexBuffer, access));
    }

    pub fn set_compute_dynamic_index_buffer(&mut self, stage: u8, handle: DynamicIndexBufferHandle, access: Access) {
        let parent = self.resources().dynamic_index_buffer_info(handle).map(|info| info.parent);
        match parent {
            Some(parent) => self.set_binding(stage, buffer_binding(parent, BindingType::IndexBuffer, access)),
            None => log::warn!("set_compute_dynamic_index_buffer: {handle:?} is not valid"),
        }
    }

    pub fn set_compute_dynamic_vertex_buffer(&mut self, stage: u8, handle: DynamicVertexBufferHandle, access: Access) {
        let parent = self.resources().dynamic_vertex_buffer_info(handle).map(|info| info.parent);
        match parent {
            Some(parent) => self.set_binding(stage, buffer_binding(parent, BindingType::VertexBuffer, access)),
            None => log::warn!("set_compute_dynamic_vertex_buffer: {handle:?} is not valid"),
        }
    }

    pub fn set_compute_indirect_buffer(&mut self, stage: u8, handle: IndirectBufferHandle, access: Access) {
        let backing = handle.as_vertex_buffer();
        self.set_binding(stage, buffer_binding(backing.idx(), BindingType::VertexBuffer, access));
    }

    /// Applies a material's uniforms and textures and returns its program.
    pub fn set_material(&mut self, material: MaterialHandle) -> Option<ProgramHandle> {
        let material_ref = self.resources().material(material).cloned();
        let Some(material_ref) = material_ref else {
            log::warn!("set_material: {material:?} is not valid");
            return None;
        };
        for (uniform, value, num) in &material_ref.uniforms {
            self.set_uniform(*uniform, value, *num);
        }
        for texture in &material_ref.textures {
            self.set_texture(texture.stage, texture.sampler, texture.texture, texture.flags);
        }
        Some(material_ref.program)
    }

    // --- Submission ---

    /// Resets the state named by `flags` without submitting.
    pub fn discard(&mut self, flags: DiscardFlags) {
        self.draw.clear(flags);
        self.compute.clear(flags);
        if flags.contains(DiscardFlags::BINDINGS) {
            self.bind.clear();
        }
        if flags.contains(DiscardFlags::STATE) {
            self.uniform_begin = self.uniforms.pos();
        }
    }

    /// Submits an empty draw so the view is cleared even without draws.
    pub fn touch(&mut self, view: ViewId) {
        self.submit_draw(view, ProgramHandle::INVALID, OcclusionQueryHandle::INVALID, 0, DiscardFlags::ALL);
    }

    /// Submits the current state as a draw with `program`. Draws without
    /// geometry are dropped.
    pub fn submit(&mut self, view: ViewId, program: ProgramHandle, depth: u32, flags: DiscardFlags) {
        self.submit_draw(view, program, OcclusionQueryHandle::INVALID, depth, flags);
    }

    /// Submits a draw whose visibility is measured by `query`. A query may be
    /// used once per frame.
    pub fn submit_occlusion_query(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        query: OcclusionQueryHandle,
        depth: u32,
        flags: DiscardFlags,
    ) {
        self.submit_draw(view, program, query, depth, flags);
    }

    /// Submits `num` draws read from an indirect buffer.
    #[allow(clippy::too_many_arguments)]
    pub fn submit_indirect(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        indirect: IndirectBufferHandle,
        start: u32,
        num: u32,
        depth: u32,
        flags: DiscardFlags,
    ) {
        self.draw.indirect_buffer = indirect;
        self.draw.start_indirect = start;
        self.draw.num_indirect = num;
        self.submit_draw(view, program, OcclusionQueryHandle::INVALID, depth, flags);
    }

    /// Submits each group of a mesh with the current state. State is kept
    /// between groups; `flags` applies after the last one.
    pub fn submit_mesh(&mut self, view: ViewId, mesh: MeshHandle, program: ProgramHandle, depth: u32, flags: DiscardFlags) {
        let groups = self.resources().mesh_groups(mesh).map(<[_]>::to_vec);
        let Some(groups) = groups else {
            log::warn!("submit_mesh: {mesh:?} is not valid");
            self.discard(flags);
            return;
        };
        let last = groups.len().saturating_sub(1);
        for (i, group) in groups.iter().enumerate() {
            self.set_index_buffer(group.index_buffer, 0, group.num_indices);
            self.set_vertex_buffer(0, group.vertex_buffer, 0, group.num_vertices);
            let group_flags = if i == last {
                flags
            } else {
                DiscardFlags::INDEX_BUFFER | DiscardFlags::VERTEX_STREAMS
            };
            self.submit(view, program, depth, group_flags);
        }
    }

    fn drop_item(&mut self, flags: DiscardFlags) {
        self.stats.num_dropped += 1;
        self.discard(flags);
    }

    fn submit_draw(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        query: OcclusionQueryHandle,
        depth: u32,
        flags: DiscardFlags,
    ) {
        if !self.check_view(view, "submit") {
            self.drop_item(flags);
            return;
        }
        if query.is_valid() {
            let fresh = self.ctx.counters.use_occlusion_query(query);
            let reused = self.ctx.validate("submit", |s| {
                s.check(fresh, ValidationCode::OcclusionQueryReused, || {
                    format!("occlusion query {} already used this frame", query.idx())
                })
            });
            if reused.is_ok() {
                self.draw.occlusion_query = query;
            }
        }
        self.draw.resolve_vertex_count();
        if program.is_valid() && self.draw.is_empty() {
            log::trace!("Empty draw in view {view} dropped");
            self.drop_item(flags);
            return;
        }
        let Some(slot) = self.ctx.counters.render_items.reserve_one() else {
            log::warn!("Render item limit reached ({MAX_DRAW_CALLS}), draw dropped");
            self.drop_item(flags);
            return;
        };

        self.draw.uniform_idx = self.slot as u8;
        self.draw.uniform_begin = self.uniform_begin;
        self.draw.uniform_end = self.uniforms.pos();
        let key = SortKey {
            view,
            program: if program.is_valid() { program.idx() } else { SORT_KEY_PROGRAM_NONE },
            depth,
            seq: self.ctx.counters.next_seq(view),
            blend: self.draw.state.blend_class(),
            ..SortKey::default()
        }
        .encode_draw(self.ctx.view_mode(view));
        self.items.push((slot, key, RenderItem::Draw(self.draw), self.bind));
        self.stats.num_draws += 1;
        self.discard(flags);
    }

    /// Dispatches a compute program over `num_x * num_y * num_z` groups.
    pub fn dispatch(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        num_x: u32,
        num_y: u32,
        num_z: u32,
        flags: DiscardFlags,
    ) {
        self.compute.num_x = num_x.max(1);
        self.compute.num_y = num_y.max(1);
        self.compute.num_z = num_z.max(1);
        self.dispatch_compute(view, program, flags);
    }

    /// Dispatches `num` group counts read from an indirect buffer.
    pub fn dispatch_indirect(
        &mut self,
        view: ViewId,
        program: ProgramHandle,
        indirect: IndirectBufferHandle,
        start: u32,
        num: u32,
        flags: DiscardFlags,
    ) {
        self.compute.indirect_buffer = indirect;
        self.compute.start_indirect = start;
        self.compute.num_indirect = num;
        self.dispatch_compute(view, program, flags);
    }

    fn dispatch_compute(&mut self, view: ViewId, program: ProgramHandle, flags: DiscardFlags) {
        if !self.check_view(view, "dispatch") {
            self.drop_item(flags);
            return;
        }
        if !program.is_valid() {
            log::warn!("Dispatch without a program in view {view} dropped");
            self.drop_item(flags);
            return;
        }
        let Some(slot) = self.ctx.counters.render_items.reserve_one() else {
            log::warn!("Render item limit reached ({MAX_DRAW_CALLS}), dispatch dropped");
            self.drop_item(flags);
            return;
        };

        self.compute.uniform_idx = self.slot as u8;
        self.compute.uniform_begin = self.uniform_begin;
        self.compute.uniform_end = self.uniforms.pos();
        self.compute.start_matrix = self.draw.start_matrix;
        self.compute.num_matrices = self.draw.num_matrices;
        let key = SortKey {
            view,
            program: program.idx(),
            seq: self.ctx.counters.next_seq(view),
            ..SortKey::default()
        }
        .encode_compute();
        self.items.push((slot, key, RenderItem::Compute(self.compute), self.bind));
        self.stats.num_computes += 1;
        self.discard(flags);
    }

    /// Copies a region between textures, ordered with the view's other blits
    /// before its draws.
    pub fn blit(&mut self, view: ViewId, item: BlitItem) {
        if !self.check_view(view, "blit") {
            return;
        }
        let Some(slot) = self.ctx.counters.blit_items.reserve_one() else {
            log::warn!("Blit limit reached ({MAX_BLIT_ITEMS}), blit dropped");
            self.stats.num_dropped += 1;
            return;
        };
        self.blits.push((slot, view, item));
        self.stats.num_blits += 1;
    }

    /// 2D copy of `width` x `height` texels between mip 0 of two textures.
    #[allow(clippy::too_many_arguments)]
    pub fn blit_2d(
        &mut self,
        view: ViewId,
        dst: TextureHandle,
        dst_x: u16,
        dst_y: u16,
        src: TextureHandle,
        src_x: u16,
        src_y: u16,
        width: u16,
        height: u16,
    ) {
        self.blit(
            view,
            BlitItem {
                src_x,
                src_y,
                dst_x,
                dst_y,
                width,
                height,
                depth: 1,
                src,
                dst,
                ..BlitItem::default()
            },
        );
    }

    /// Moves everything recorded into the submit frame.
    fn flush(&mut self) {
        let mut frame = lock(&self.ctx.submit);
        if frame.frame_num != self.frame_num {
            let lost = self.items.len() + self.blits.len();
            if lost > 0 {
                log::warn!(
                    "Encoder {} began in frame {} and ended in frame {}: {lost} item(s) dropped",
                    self.slot,
                    self.frame_num,
                    frame.frame_num
                );
            }
            frame.num_dropped += lost as u32;
            return;
        }

        let base = match frame.uniform_buffers.get_mut(self.slot) {
            Some(buffer) => buffer.append(self.uniforms.as_bytes()),
            None => 0,
        };
        for (slot, key, mut item, bind) in self.items.drain(..) {
            match &mut item {
                RenderItem::Draw(draw) => {
                    draw.uniform_begin += base;
                    draw.uniform_end += base;
                }
                RenderItem::Compute(compute) => {
                    compute.uniform_begin += base;
                    compute.uniform_end += base;
                }
            }
            frame.put_item(slot, key, item, bind);
        }
        for (slot, view, item) in self.blits.drain(..) {
            frame.put_blit(slot, view, item);
        }
        for (start, matrices) in self.matrices.drain(..) {
            frame.matrix_cache.set(start, &matrices);
        }
        for (idx, rect) in self.rects.drain(..) {
            frame.rect_cache.set(idx, rect);
        }
        for (offset, bytes) in self.transient_vb.drain(..) {
            frame.transient_vb.write(offset, &bytes);
        }
        for (offset, bytes) in self.transient_ib.drain(..) {
            frame.transient_ib.write(offset, &bytes);
        }
        frame.markers.append(&mut self.markers);
        if let Some(stats) = frame.encoder_stats.get_mut(self.slot) {
            stats.num_draws += self.stats.num_draws;
            stats.num_computes += self.stats.num_computes;
            stats.num_blits += self.stats.num_blits;
            stats.num_dropped += self.stats.num_dropped;
        }
        frame.num_dropped += self.stats.num_dropped;
    }
}

impl Drop for Encoder<'_> {
    fn drop(&mut self) {
        self.flush();
        self.ctx.release_encoder(self.slot);
    }
}

fn buffer_binding(idx: u16, ty: BindingType, access: Access) -> Binding {
    Binding {
        idx,
        ty,
        access: access as u8,
        ..Binding::default()
    }
}

/// Byte offset of instance `first` in a buffer starting at `base`, or `None` past `u32`.
fn instance_offset(base: u32, first: u32, stride: u16) -> Option<u32> {
    first.checked_mul(stride as u32)?.checked_add(base)
}

#[cfg(test)]
mod tests {
    use super::instance_offset;
    use crate::context::lock;
    use crate::context::tests::headless_context;
    use tessel_core::config::Threading;
    use tessel_core::handle::*;
    use tessel_core::math::Mat4;
    use tessel_core::renderer::flags::DiscardFlags;
    use tessel_core::renderer::UniformType;

    #[test]
    fn empty_draws_are_dropped() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let mut encoder = context.begin(false).unwrap();
        encoder.submit(0, ProgramHandle(0), 0, DiscardFlags::ALL);
        assert_eq!(encoder.stats.num_dropped, 1);
        assert!(encoder.items.is_empty());
    }

    #[test]
    fn instance_offsets_past_u32_are_rejected() {
        assert_eq!(instance_offset(64, 3, 16), Some(112));
        assert_eq!(instance_offset(0, u32::MAX / 8, 16), None);
        assert_eq!(instance_offset(u32::MAX - 8, 1, 16), None);
    }

    #[test]
    fn touch_records_an_item() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let mut encoder = context.begin(false).unwrap();
        encoder.touch(4);
        encoder.end();
        assert_eq!(lock(&context.submit).num_render_items(), 1);
    }

    #[test]
    fn uniform_ranges_are_rebased_per_slot() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let uniform = context.create_uniform("u_color", UniformType::Vec4, 1).unwrap();

        for _ in 0..2 {
            let mut encoder = context.begin(false).unwrap();
            encoder.set_uniform_pod(uniform, &[1.0f32, 0.0, 0.0, 1.0]);
            encoder.set_vertex_count(3);
            encoder.submit(0, ProgramHandle(0), 0, DiscardFlags::ALL);
        }

        let frame = lock(&context.submit);
        let ranges: Vec<(u32, u32)> = frame
            .render_items
            .iter()
            .map(|item| match item {
                tessel_core::renderer::RenderItem::Draw(draw) => (draw.uniform_begin, draw.uniform_end),
                tessel_core::renderer::RenderItem::Compute(c) => (c.uniform_begin, c.uniform_end),
            })
            .collect();
        assert_eq!(ranges.len(), 2);
        assert_eq!(ranges[0].1, ranges[1].0);
        assert!(ranges[1].1 > ranges[1].0);
        drop(frame);
        context.destroy_uniform(uniform).unwrap();
    }

    #[test]
    fn transforms_land_in_the_matrix_cache() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let scale = Mat4::from_translation(tessel_core::math::Vec3::new(2.0, 0.0, 0.0));
        let first = {
            let mut encoder = context.begin(false).unwrap();
            encoder.set_transform(&[scale, scale])
        };
        assert_eq!(first, 1);
        let frame = lock(&context.submit);
        assert_eq!(frame.matrix_cache.get(first), scale);
        assert_eq!(frame.matrix_cache.get(first + 1), scale);
    }

    #[test]
    fn stale_encoders_drop_their_items() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let mut encoder = context.begin(true).unwrap();
        encoder.touch(0);
        // Simulates a frame swap the encoder did not wait for.
        lock(&context.submit).frame_num += 1;
        drop(encoder);
        assert_eq!(lock(&context.submit).num_render_items(), 0);
        assert_eq!(lock(&context.submit).num_dropped, 1);
        lock(&context.submit).frame_num -= 1;
    }
}
