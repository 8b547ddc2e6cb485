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

//! Handle pools, reference tables and identity maps.
//!
//! Everything here lives behind the context's resource lock. Creation records into
//! the submit frame's `cmd_pre`; destruction records into its `cmd_post` and queues
//! the index in the frame's free lists, so the index only comes back at the swap.
//! Lock order is always resources, then the submit frame.

mod buffers;
mod meshes;
mod queries;
mod shaders;
mod textures;

pub use buffers::DynamicBufferInfo;
pub use meshes::MeshInfo;
pub use shaders::UniformInfo;
pub(crate) use textures::TextureShape;

use std::sync::Arc;
use tessel_core::callback::Callback;
use tessel_core::config::Resolution;
use tessel_core::error::{ErrorScope, ResourceError};
use tessel_core::handle::*;
use tessel_core::limits::*;
use tessel_core::math::Aabb;
use tessel_core::physics::PhysicsContext;
use tessel_core::renderer::flags::{BufferFlags, SamplerFlags, TextureFlags};
use tessel_core::renderer::{Attachment, BackbufferRatio, Frame, TextureInfo, UniformType, WindowTarget};
use tessel_core::renderer::shader::ShaderStage;
use tessel_data::{EntityStore, HandleAlloc, HandleHashMap, NonLocalAllocator};

/// Index of the transient parent used by `frame_num` in a pool of `capacity`.
///
/// The two highest indices of the index and vertex buffer pools are reserved for
/// the transient buffers and alternate between frames, so the buffer being
/// uploaded is never the one the render thread is reading.
pub(crate) const fn transient_parent(capacity: u16, frame_num: u32) -> u16 {
    capacity - 1 - (frame_num % 2) as u16
}

/// Pool indices kept out of the user allocators.
pub(crate) const TRANSIENT_PARENTS: u16 = 2;

/// Per-index resource state; `None` marks a dead or never created entry.
#[derive(Debug)]
pub(crate) struct RefTable<T>(Vec<Option<T>>);

impl<T> RefTable<T> {
    fn new(capacity: u16) -> Self {
        Self((0..capacity).map(|_| None).collect())
    }

    pub fn get(&self, idx: u16) -> Option<&T> {
        self.0.get(idx as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: u16) -> Option<&mut T> {
        self.0.get_mut(idx as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, idx: u16) -> bool {
        self.get(idx).is_some()
    }

    pub fn set(&mut self, idx: u16, value: T) {
        if let Some(slot) = self.0.get_mut(idx as usize) {
            *slot = Some(value);
        }
    }

    pub fn take(&mut self, idx: u16) -> Option<T> {
        self.0.get_mut(idx as usize).and_then(Option::take)
    }
}

#[derive(Debug, Clone)]
pub(crate) struct IndexBufferRef {
    pub size: u32,
    pub flags: BufferFlags,
    /// Created with `CreateDynamicIndexBuffer`, as a dynamic parent.
    pub dynamic: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct VertexBufferRef {
    pub size: u32,
    pub layout: VertexLayoutHandle,
    pub stride: u16,
    pub flags: BufferFlags,
    /// Dynamic parent or indirect buffer.
    pub dynamic: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct VertexLayoutRef {
    pub hash: u32,
    pub stride: u16,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct DynamicIndexBufferRef {
    pub address: u64,
    pub size: u32,
    pub start_index: u32,
    pub flags: BufferFlags,
}

#[derive(Debug, Clone)]
pub(crate) struct DynamicVertexBufferRef {
    pub address: u64,
    pub size: u32,
    pub start_vertex: u32,
    pub num_vertices: u32,
    pub stride: u16,
    pub layout: VertexLayoutHandle,
    pub flags: BufferFlags,
}

#[derive(Debug, Clone)]
pub(crate) struct ShaderRef {
    pub hash: u32,
    pub stage: ShaderStage,
    pub hash_in: u32,
    pub hash_out: u32,
    pub uniforms: Vec<UniformHandle>,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct ProgramRef {
    pub vsh: ShaderHandle,
    pub fsh: ShaderHandle,
    pub compute: bool,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct TextureRef {
    pub info: TextureInfo,
    pub flags: TextureFlags,
    pub ratio: BackbufferRatio,
    pub has_mips: bool,
    /// Owned by a frame buffer, which destroys it.
    pub owned: bool,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct FrameBufferRef {
    pub attachments: Vec<Attachment>,
    pub window: Option<WindowTarget>,
    pub width: u16,
    pub height: u16,
    pub destroy_textures: bool,
}

#[derive(Debug, Clone)]
pub(crate) struct UniformRef {
    pub name: String,
    pub ty: UniformType,
    pub num: u16,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct MeshGroupRef {
    pub vertex_buffer: VertexBufferHandle,
    pub index_buffer: IndexBufferHandle,
    pub num_vertices: u32,
    pub num_indices: u32,
    pub aabb: Aabb,
}

#[derive(Debug, Clone)]
pub(crate) struct MeshRef {
    pub hash: u32,
    pub groups: Vec<MeshGroupRef>,
    pub ref_count: u16,
}

#[derive(Debug, Clone)]
pub(crate) struct MaterialTexture {
    pub stage: u8,
    pub sampler: UniformHandle,
    pub texture: TextureHandle,
    pub flags: SamplerFlags,
}

#[derive(Debug, Clone)]
pub(crate) struct MaterialRef {
    pub program: ProgramHandle,
    pub uniforms: Vec<(UniformHandle, Vec<u8>, u16)>,
    pub textures: Vec<MaterialTexture>,
}

/// Destructions applied at the next `frame()`, once draws of the current frame
/// can no longer reference them.
#[derive(Debug, Default)]
pub(crate) struct PendingFrees {
    pub dynamic_index_buffers: Vec<(DynamicIndexBufferHandle, u64)>,
    pub dynamic_vertex_buffers: Vec<(DynamicVertexBufferHandle, u64)>,
    pub occlusion_queries: Vec<OcclusionQueryHandle>,
    pub bodies: Vec<BodyHandle>,
    /// Programs without references; linking the same pair again before the
    /// swap revives them.
    pub programs: Vec<(ProgramHandle, ProgramRef)>,
}

/// Every pool, table and map guarded by the resource lock.
pub(crate) struct Resources {
    pub index_buffers: HandleAlloc,
    pub vertex_buffers: HandleAlloc,
    pub vertex_layouts: HandleAlloc,
    pub dynamic_index_buffers: HandleAlloc,
    pub dynamic_vertex_buffers: HandleAlloc,
    pub shaders: HandleAlloc,
    pub programs: HandleAlloc,
    pub textures: HandleAlloc,
    pub frame_buffers: HandleAlloc,
    pub uniforms: HandleAlloc,
    pub occlusion_queries: HandleAlloc,
    pub meshes: HandleAlloc,
    pub materials: HandleAlloc,
    pub bodies: HandleAlloc,

    pub index_buffer_refs: RefTable<IndexBufferRef>,
    pub vertex_buffer_refs: RefTable<VertexBufferRef>,
    pub vertex_layout_refs: RefTable<VertexLayoutRef>,
    pub dynamic_index_buffer_refs: RefTable<DynamicIndexBufferRef>,
    pub dynamic_vertex_buffer_refs: RefTable<DynamicVertexBufferRef>,
    pub shader_refs: RefTable<ShaderRef>,
    pub program_refs: RefTable<ProgramRef>,
    pub texture_refs: RefTable<TextureRef>,
    pub frame_buffer_refs: RefTable<FrameBufferRef>,
    pub uniform_refs: RefTable<UniformRef>,
    pub occlusion_query_refs: RefTable<()>,
    pub mesh_refs: RefTable<MeshRef>,
    pub material_refs: RefTable<MaterialRef>,
    pub body_refs: RefTable<()>,

    pub layout_map: HandleHashMap,
    pub shader_map: HandleHashMap,
    pub program_map: HandleHashMap,
    pub uniform_map: HandleHashMap,
    pub mesh_map: HandleHashMap,

    pub dynamic_ib_alloc: NonLocalAllocator,
    pub dynamic_vb_alloc: NonLocalAllocator,
    pub pending: PendingFrees,
    /// Queries whose results must read as "no result" in both frames after the swap.
    pub occlusion_resets: Vec<OcclusionQueryHandle>,

    pub ecs: EntityStore,
    pub physics: Box<dyn PhysicsContext>,

    /// Backbuffer state the next frame is recorded for.
    pub resolution: Resolution,
    pub callback: Arc<dyn Callback>,
    pub debug_checks: bool,
}

impl Resources {
    pub fn new(
        resolution: Resolution,
        physics: Box<dyn PhysicsContext>,
        callback: Arc<dyn Callback>,
        debug_checks: bool,
    ) -> Self {
        Self {
            index_buffers: HandleAlloc::new(MAX_INDEX_BUFFERS - TRANSIENT_PARENTS),
            vertex_buffers: HandleAlloc::new(MAX_VERTEX_BUFFERS - TRANSIENT_PARENTS),
            vertex_layouts: HandleAlloc::new(MAX_VERTEX_LAYOUTS),
            dynamic_index_buffers: HandleAlloc::new(MAX_DYNAMIC_INDEX_BUFFERS),
            dynamic_vertex_buffers: HandleAlloc::new(MAX_DYNAMIC_VERTEX_BUFFERS),
            shaders: HandleAlloc::new(MAX_SHADERS),
            // The last program index marks items without a program in sort keys.
            programs: HandleAlloc::new(MAX_PROGRAMS - 1),
            textures: HandleAlloc::new(MAX_TEXTURES),
            frame_buffers: HandleAlloc::new(MAX_FRAME_BUFFERS),
            uniforms: HandleAlloc::new(MAX_UNIFORMS),
            occlusion_queries: HandleAlloc::new(MAX_OCCLUSION_QUERIES),
            meshes: HandleAlloc::new(MAX_MESHES),
            materials: HandleAlloc::new(MAX_MATERIALS),
            bodies: HandleAlloc::new(MAX_BODIES),

            index_buffer_refs: RefTable::new(MAX_INDEX_BUFFERS),
            vertex_buffer_refs: RefTable::new(MAX_VERTEX_BUFFERS),
            vertex_layout_refs: RefTable::new(MAX_VERTEX_LAYOUTS),
            dynamic_index_buffer_refs: RefTable::new(MAX_DYNAMIC_INDEX_BUFFERS),
            dynamic_vertex_buffer_refs: RefTable::new(MAX_DYNAMIC_VERTEX_BUFFERS),
            shader_refs: RefTable::new(MAX_SHADERS),
            program_refs: RefTable::new(MAX_PROGRAMS),
            texture_refs: RefTable::new(MAX_TEXTURES),
            frame_buffer_refs: RefTable::new(MAX_FRAME_BUFFERS),
            uniform_refs: RefTable::new(MAX_UNIFORMS),
            occlusion_query_refs: RefTable::new(MAX_OCCLUSION_QUERIES),
            mesh_refs: RefTable::new(MAX_MESHES),
            material_refs: RefTable::new(MAX_MATERIALS),
            body_refs: RefTable::new(MAX_BODIES),

            layout_map: HandleHashMap::new(MAX_VERTEX_LAYOUTS),
            shader_map: HandleHashMap::new(MAX_SHADERS),
            program_map: HandleHashMap::new(MAX_PROGRAMS),
            uniform_map: HandleHashMap::new(MAX_UNIFORMS),
            mesh_map: HandleHashMap::new(MAX_MESHES),

            dynamic_ib_alloc: NonLocalAllocator::new(),
            dynamic_vb_alloc: NonLocalAllocator::new(),
            pending: PendingFrees::default(),
            occlusion_resets: Vec::new(),

            ecs: EntityStore::new(MAX_ENTITIES, MAX_COMPONENTS),
            physics,

            resolution,
            callback,
            debug_checks,
        }
    }

    /// Pool backing `kind`. Indirect buffers share the vertex buffer pool; entities
    /// and components are pooled by the entity store.
    fn pool(&self, kind: HandleKind) -> Option<&HandleAlloc> {
        Some(match kind {
            HandleKind::IndexBuffer => &self.index_buffers,
            HandleKind::VertexBuffer | HandleKind::IndirectBuffer => &self.vertex_buffers,
            HandleKind::VertexLayout => &self.vertex_layouts,
            HandleKind::DynamicIndexBuffer => &self.dynamic_index_buffers,
            HandleKind::DynamicVertexBuffer => &self.dynamic_vertex_buffers,
            HandleKind::Shader => &self.shaders,
            HandleKind::Program => &self.programs,
            HandleKind::Texture => &self.textures,
            HandleKind::FrameBuffer => &self.frame_buffers,
            HandleKind::Uniform => &self.uniforms,
            HandleKind::OcclusionQuery => &self.occlusion_queries,
            HandleKind::Mesh => &self.meshes,
            HandleKind::Material => &self.materials,
            HandleKind::Body => &self.bodies,
            HandleKind::Entity | HandleKind::Component => return None,
        })
    }

    fn pool_mut(&mut self, kind: HandleKind) -> Option<&mut HandleAlloc> {
        Some(match kind {
            HandleKind::IndexBuffer => &mut self.index_buffers,
            HandleKind::VertexBuffer | HandleKind::IndirectBuffer => &mut self.vertex_buffers,
            HandleKind::VertexLayout => &mut self.vertex_layouts,
            HandleKind::DynamicIndexBuffer => &mut self.dynamic_index_buffers,
            HandleKind::DynamicVertexBuffer => &mut self.dynamic_vertex_buffers,
            HandleKind::Shader => &mut self.shaders,
            HandleKind::Program => &mut self.programs,
            HandleKind::Texture => &mut self.textures,
            HandleKind::FrameBuffer => &mut self.frame_buffers,
            HandleKind::Uniform => &mut self.uniforms,
            HandleKind::OcclusionQuery => &mut self.occlusion_queries,
            HandleKind::Mesh => &mut self.meshes,
            HandleKind::Material => &mut self.materials,
            HandleKind::Body => &mut self.bodies,
            HandleKind::Entity | HandleKind::Component => return None,
        })
    }

    /// Runs the checks of entry point `what` in an error scope.
    pub fn validate(&self, what: &'static str, checks: impl FnOnce(&mut ErrorScope<'_>)) -> Result<(), ResourceError> {
        let mut scope = ErrorScope::new(self.callback.as_ref(), self.debug_checks, what);
        checks(&mut scope);
        scope.finish()
    }

    /// Takes an index from the pool of `kind`.
    pub fn alloc_handle(&mut self, kind: HandleKind) -> Result<u16, ResourceError> {
        let pool = self.pool_mut(kind).ok_or(ResourceError::Exhausted { kind })?;
        let idx = pool.alloc().ok_or_else(|| {
            log::warn!("{kind} pool exhausted ({} live)", pool.num_handles());
            ResourceError::Exhausted { kind }
        })?;
        log::debug!("{kind} {idx} allocated");
        Ok(idx)
    }

    /// Returns an index that never reached the render thread.
    pub fn free_handle(&mut self, kind: HandleKind, idx: u16) {
        if let Some(pool) = self.pool_mut(kind) {
            pool.free(idx);
        }
    }

    /// The index is taken in its pool, whether or not the resource is still alive.
    pub fn is_allocated(&self, handle: AnyHandle) -> bool {
        match handle.kind {
            HandleKind::Entity => self.ecs.is_entity_valid(EntityHandle(handle.idx)),
            HandleKind::Component => self.ecs.is_component_valid(ComponentHandle(handle.idx)),
            kind => self.pool(kind).is_some_and(|pool| pool.is_valid(handle.idx)),
        }
    }

    /// The index is taken and the resource has not been destroyed.
    pub fn is_valid(&self, handle: AnyHandle) -> bool {
        let idx = handle.idx;
        let alive = match handle.kind {
            HandleKind::IndexBuffer => self.index_buffer_refs.contains(idx),
            HandleKind::VertexBuffer | HandleKind::IndirectBuffer => self.vertex_buffer_refs.contains(idx),
            HandleKind::VertexLayout => self.vertex_layout_refs.contains(idx),
            HandleKind::DynamicIndexBuffer => self.dynamic_index_buffer_refs.contains(idx),
            HandleKind::DynamicVertexBuffer => self.dynamic_vertex_buffer_refs.contains(idx),
            HandleKind::Shader => self.shader_refs.contains(idx),
            HandleKind::Program => self.program_refs.contains(idx),
            HandleKind::Texture => self.texture_refs.contains(idx),
            HandleKind::FrameBuffer => self.frame_buffer_refs.contains(idx),
            HandleKind::Uniform => self.uniform_refs.contains(idx),
            HandleKind::OcclusionQuery => self.occlusion_query_refs.contains(idx),
            HandleKind::Mesh => self.mesh_refs.contains(idx),
            HandleKind::Material => self.material_refs.contains(idx),
            HandleKind::Body => self.body_refs.contains(idx),
            HandleKind::Entity | HandleKind::Component => true,
        };
        alive && self.is_allocated(handle)
    }

    /// Live handles per kind, skipping empty pools.
    pub fn live_handles(&self) -> Vec<(HandleKind, u16)> {
        HandleKind::ALL
            .into_iter()
            .filter(|kind| *kind != HandleKind::IndirectBuffer)
            .map(|kind| {
                let live = match kind {
                    HandleKind::Entity => self.ecs.num_entities(),
                    HandleKind::Component => self.ecs.num_components(),
                    kind => self.pool(kind).map_or(0, HandleAlloc::num_handles),
                };
                (kind, live)
            })
            .filter(|(_, live)| *live > 0)
            .collect()
    }

    /// Logs every pool that still holds handles. Returns the number of leaked handles.
    pub fn report_leaks(&self) -> usize {
        let mut leaked = 0;
        for (kind, live) in self.live_handles() {
            log::error!("{kind}: {live} live");
            leaked += live as usize;
        }
        leaked
    }

    /// Queues `handle` for release at the swap of `frame`.
    pub fn queue_free(frame: &mut Frame, handle: impl Into<AnyHandle>) {
        let handle = handle.into();
        if !frame.free_lists.queue(handle) {
            log::warn!("{} {} queued for release twice", handle.kind, handle.idx);
        }
    }

    /// Applies the destructions deferred to this `frame()`.
    pub fn free_pending(&mut self, frame: &mut Frame) {
        let pending = std::mem::take(&mut self.pending);

        for (handle, address) in &pending.dynamic_index_buffers {
            self.dynamic_ib_alloc.free(*address);
            Self::queue_free(frame, *handle);
        }
        if !pending.dynamic_index_buffers.is_empty() {
            self.release_empty_index_parents(frame);
        }

        for (handle, address) in &pending.dynamic_vertex_buffers {
            self.dynamic_vb_alloc.free(*address);
            Self::queue_free(frame, *handle);
        }
        if !pending.dynamic_vertex_buffers.is_empty() {
            self.release_empty_vertex_parents(frame);
        }

        for query in pending.occlusion_queries {
            Self::queue_free(frame, query);
            self.occlusion_resets.push(query);
        }

        for body in pending.bodies {
            self.physics.destroy_body(body);
            Self::queue_free(frame, body);
        }

        for (handle, program) in pending.programs {
            self.release_program(frame, handle, program);
        }
    }

    /// Returns every index queued in `frame` to its pool.
    pub fn release_queued(&mut self, frame: &mut Frame) {
        for kind in HandleKind::ALL {
            for idx in frame.free_lists.take(kind) {
                let released = match kind {
                    HandleKind::Entity => self.ecs.release_entity(EntityHandle(idx)),
                    HandleKind::Component => self.ecs.release_component(ComponentHandle(idx)),
                    kind => self.pool_mut(kind).is_some_and(|pool| pool.free(idx)),
                };
                if !released {
                    log::warn!("{kind} {idx} was queued for release but is not allocated");
                }
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tessel_core::callback::LogCallback;
    use tessel_infra::NoopPhysics;

    /// Fresh resources and a submit frame to record into.
    pub(crate) fn resources() -> (Resources, Frame) {
        let res = Resources::new(
            Resolution::default(),
            Box::new(NoopPhysics::new()),
            Arc::new(LogCallback),
            false,
        );
        (res, Frame::new(1, MIN_RESOURCE_COMMAND_BUFFER_SIZE as usize))
    }

    #[test]
    fn transient_parents_sit_above_the_user_pools() {
        let (mut res, _) = resources();
        let top = transient_parent(MAX_INDEX_BUFFERS, 0);
        assert_eq!(transient_parent(MAX_INDEX_BUFFERS, 1), top - 1);
        assert_eq!(transient_parent(MAX_INDEX_BUFFERS, 2), top);
        while let Ok(idx) = res.alloc_handle(HandleKind::IndexBuffer) {
            assert!(idx < top - 1, "user index {idx} collides with a transient parent");
        }
    }

    #[test]
    fn queued_handles_return_to_their_pool_at_release() {
        let (mut res, mut frame) = resources();
        let idx = res.alloc_handle(HandleKind::Texture).unwrap();
        Resources::queue_free(&mut frame, TextureHandle(idx));
        assert!(res.is_allocated(TextureHandle(idx).into()));
        res.release_queued(&mut frame);
        assert!(!res.is_allocated(TextureHandle(idx).into()));
        assert_eq!(res.report_leaks(), 0);
    }
}
