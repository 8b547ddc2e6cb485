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

//! Entity and component pools.

use super::component::{type_hash_of, ComponentBlob, ComponentType};
use super::query::EntityQuery;
use crate::allocators::{HandleAlloc, HandleHashMap};
use bytemuck::Pod;
use std::collections::HashMap;
use tessel_core::error::ResourceError;
use tessel_core::handle::{ComponentHandle, EntityHandle, HandleKind};
use tessel_core::limits::MAX_COMPONENTS_PER_ENTITY;

#[derive(Debug, Clone)]
struct EntityEntry {
    components: HandleHashMap,
    destroy_components: bool,
    ref_count: u16,
}

/// What became of an entity after [`EntityStore::destroy_entity`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntityRelease {
    /// Other references keep the entity alive.
    Retained,
    /// The entity is dead. Its index and the listed dead components must be
    /// handed back with [`EntityStore::release_entity`] and
    /// [`EntityStore::release_component`] once the renderer can no longer see them.
    Destroyed {
        /// Components whose last reference went away with the entity.
        components: Vec<ComponentHandle>,
    },
}

/// Entities owning a small map of `type hash -> component`, and typeless
/// component blobs.
///
/// Destroying something only kills its entry; the pool index stays taken until
/// released, so a dead handle is never confused with a newer resource in flight.
#[derive(Debug, Clone)]
pub struct EntityStore {
    entity_alloc: HandleAlloc,
    component_alloc: HandleAlloc,
    entities: Vec<Option<EntityEntry>>,
    components: Vec<Option<ComponentBlob>>,
    types: HashMap<u32, ComponentType>,
}

impl EntityStore {
    /// Creates pools of `max_entities` entities and `max_components` components.
    pub fn new(max_entities: u16, max_components: u16) -> Self {
        Self {
            entity_alloc: HandleAlloc::new(max_entities),
            component_alloc: HandleAlloc::new(max_components),
            entities: vec![None; max_entities as usize],
            components: vec![None; max_components as usize],
            types: HashMap::new(),
        }
    }

    /// Registers `T` so components added under its hash are size-checked.
    /// Returns the type hash.
    pub fn register_type<T: 'static>(&mut self) -> u32 {
        let hash = type_hash_of::<T>();
        self.types.insert(hash, ComponentType::of::<T>());
        hash
    }

    /// Registered layout for `hash`.
    pub fn component_type(&self, hash: u32) -> Option<&ComponentType> {
        self.types.get(&hash)
    }

    // --- Entities ---

    /// Creates an entity with an empty component map. When `destroy_components`
    /// is set, destroying the entity also drops one reference of every component
    /// it holds.
    pub fn create_entity(&mut self, destroy_components: bool) -> Result<EntityHandle, ResourceError> {
        let idx = self.entity_alloc.alloc().ok_or_else(|| {
            log::warn!("Entity pool exhausted ({} live)", self.entity_alloc.num_handles());
            ResourceError::Exhausted {
                kind: HandleKind::Entity,
            }
        })?;
        self.entities[idx as usize] = Some(EntityEntry {
            components: HandleHashMap::new(MAX_COMPONENTS_PER_ENTITY * 2),
            destroy_components,
            ref_count: 1,
        });
        Ok(EntityHandle(idx))
    }

    fn entity(&self, handle: EntityHandle) -> Result<&EntityEntry, ResourceError> {
        self.entities
            .get(handle.idx() as usize)
            .and_then(Option::as_ref)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Entity, handle.idx()))
    }

    fn entity_mut(&mut self, handle: EntityHandle) -> Result<&mut EntityEntry, ResourceError> {
        self.entities
            .get_mut(handle.idx() as usize)
            .and_then(Option::as_mut)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Entity, handle.idx()))
    }

    /// Adds a reference to a live entity.
    pub fn retain_entity(&mut self, handle: EntityHandle) -> Result<(), ResourceError> {
        let entry = self.entity_mut(handle)?;
        entry.ref_count = entry.ref_count.saturating_add(1);
        Ok(())
    }

    /// Drops a reference. At zero the entity dies; when it was created with
    /// `destroy_components`, each of its components loses one reference too.
    pub fn destroy_entity(&mut self, handle: EntityHandle) -> Result<EntityRelease, ResourceError> {
        let entry = self.entity_mut(handle)?;
        entry.ref_count -= 1;
        if entry.ref_count > 0 {
            return Ok(EntityRelease::Retained);
        }
        let entry = self.entities[handle.idx() as usize]
            .take()
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Entity, handle.idx()))?;

        let mut dead = Vec::new();
        if entry.destroy_components {
            for (_, idx) in entry.components.iter() {
                if let Ok(true) = self.destroy_component(ComponentHandle(idx)) {
                    dead.push(ComponentHandle(idx));
                }
            }
        }
        log::debug!("Entity {} destroyed with {} component(s)", handle.idx(), dead.len());
        Ok(EntityRelease::Destroyed { components: dead })
    }

    /// Returns a dead entity's index to the pool.
    pub fn release_entity(&mut self, handle: EntityHandle) -> bool {
        if self.is_entity_valid(handle) {
            return false;
        }
        self.entity_alloc.free(handle.idx())
    }

    /// `true` if the entity is alive.
    pub fn is_entity_valid(&self, handle: EntityHandle) -> bool {
        self.entity(handle).is_ok()
    }

    /// Number of allocated entity indices, including dead ones not yet released.
    pub fn num_entities(&self) -> u16 {
        self.entity_alloc.num_handles()
    }

    /// Live entities.
    pub fn entities(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.entity_alloc
            .iter()
            .filter(|&idx| self.entities[idx as usize].is_some())
            .map(EntityHandle)
    }

    // --- Components ---

    /// Copies `data` into a new component with one reference.
    pub fn create_component(&mut self, data: &[u8]) -> Result<ComponentHandle, ResourceError> {
        let idx = self.component_alloc.alloc().ok_or_else(|| {
            log::warn!("Component pool exhausted ({} live)", self.component_alloc.num_handles());
            ResourceError::Exhausted {
                kind: HandleKind::Component,
            }
        })?;
        self.components[idx as usize] = Some(ComponentBlob::new(data));
        Ok(ComponentHandle(idx))
    }

    /// Creates a component holding the bytes of `value`.
    pub fn create_component_from<T: Pod>(&mut self, value: &T) -> Result<ComponentHandle, ResourceError> {
        self.create_component(bytemuck::bytes_of(value))
    }

    fn blob(&self, handle: ComponentHandle) -> Option<&ComponentBlob> {
        self.components.get(handle.idx() as usize).and_then(Option::as_ref)
    }

    fn blob_mut(&mut self, handle: ComponentHandle) -> Option<&mut ComponentBlob> {
        self.components.get_mut(handle.idx() as usize).and_then(Option::as_mut)
    }

    /// Adds a reference to a live component.
    pub fn retain_component(&mut self, handle: ComponentHandle) -> Result<(), ResourceError> {
        self.blob_mut(handle)
            .map(ComponentBlob::retain)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Component, handle.idx()))
    }

    /// Drops a reference. Returns `true` if the component died; its index must then
    /// be released with [`release_component`](Self::release_component).
    pub fn destroy_component(&mut self, handle: ComponentHandle) -> Result<bool, ResourceError> {
        let blob = self
            .blob_mut(handle)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Component, handle.idx()))?;
        if blob.release() > 0 {
            return Ok(false);
        }
        self.components[handle.idx() as usize] = None;
        Ok(true)
    }

    /// Returns a dead component's index to the pool.
    pub fn release_component(&mut self, handle: ComponentHandle) -> bool {
        if self.is_component_valid(handle) {
            return false;
        }
        self.component_alloc.free(handle.idx())
    }

    /// `true` if the component is alive.
    pub fn is_component_valid(&self, handle: ComponentHandle) -> bool {
        self.blob(handle).is_some()
    }

    /// References held on a live component.
    pub fn component_ref_count(&self, handle: ComponentHandle) -> Option<u16> {
        self.blob(handle).map(ComponentBlob::ref_count)
    }

    /// Number of allocated component indices, including dead ones not yet released.
    pub fn num_components(&self) -> u16 {
        self.component_alloc.num_handles()
    }

    /// Bytes of a component.
    pub fn component_data(&self, handle: ComponentHandle) -> Option<&[u8]> {
        self.blob(handle).map(ComponentBlob::bytes)
    }

    /// Writable bytes of a component.
    pub fn component_data_mut(&mut self, handle: ComponentHandle) -> Option<&mut [u8]> {
        self.blob_mut(handle).map(ComponentBlob::bytes_mut)
    }

    // --- Entity <-> component ---

    /// Attaches `component` to `entity` under `type_hash`. The component's
    /// reference count does not change.
    pub fn add_component(
        &mut self,
        entity: EntityHandle,
        component: ComponentHandle,
        type_hash: u32,
    ) -> Result<(), ResourceError> {
        let size = self
            .blob(component)
            .map(ComponentBlob::len)
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Component, component.idx()))?;
        if let Some(ty) = self.types.get(&type_hash) {
            if ty.size != size {
                return Err(ResourceError::invalid_parameter(format!(
                    "component of {size} bytes added as {} ({} bytes)",
                    ty.name, ty.size
                )));
            }
        }
        let entry = self.entity_mut(entity)?;
        if entry.components.len() >= MAX_COMPONENTS_PER_ENTITY as usize {
            return Err(ResourceError::invalid_parameter(format!(
                "entity {} already holds {MAX_COMPONENTS_PER_ENTITY} components",
                entity.idx()
            )));
        }
        if !entry.components.insert(type_hash, component.idx()) {
            return Err(ResourceError::invalid_parameter(format!(
                "entity {} already has a component of type {type_hash:#010x}",
                entity.idx()
            )));
        }
        Ok(())
    }

    /// Detaches the component stored under `type_hash`.
    pub fn remove_component(
        &mut self,
        entity: EntityHandle,
        type_hash: u32,
    ) -> Result<Option<ComponentHandle>, ResourceError> {
        Ok(self
            .entity_mut(entity)?
            .components
            .remove_by_key(type_hash)
            .map(ComponentHandle))
    }

    /// Component handle stored under `type_hash`.
    pub fn component_handle(&self, entity: EntityHandle, type_hash: u32) -> Option<ComponentHandle> {
        self.entity(entity)
            .ok()?
            .components
            .find(type_hash)
            .map(ComponentHandle)
    }

    /// Bytes of the component stored under `type_hash`.
    pub fn get_component(&self, entity: EntityHandle, type_hash: u32) -> Option<&[u8]> {
        let handle = self.component_handle(entity, type_hash)?;
        self.component_data(handle)
    }

    /// Writable bytes of the component stored under `type_hash`.
    pub fn get_component_mut(&mut self, entity: EntityHandle, type_hash: u32) -> Option<&mut [u8]> {
        let handle = self.component_handle(entity, type_hash)?;
        self.component_data_mut(handle)
    }

    /// Reads the component registered for `T`.
    pub fn read<T: Pod>(&self, entity: EntityHandle) -> Option<T> {
        let handle = self.component_handle(entity, type_hash_of::<T>())?;
        self.blob(handle)?.read()
    }

    /// Overwrites the component registered for `T`. Returns `false` if there is
    /// none or its size differs.
    pub fn write<T: Pod>(&mut self, entity: EntityHandle, value: &T) -> bool {
        let Some(handle) = self.component_handle(entity, type_hash_of::<T>()) else {
            return false;
        };
        self.blob_mut(handle).is_some_and(|blob| blob.write(value))
    }

    /// Number of components attached to `entity`.
    pub fn num_entity_components(&self, entity: EntityHandle) -> usize {
        self.entity(entity).map_or(0, |e| e.components.len())
    }

    /// Fills `query` with every live entity holding all of `type_hashes`, in
    /// ascending handle order. Returns the number of matches.
    pub fn query_entities(&self, type_hashes: &[u32], query: &mut EntityQuery) -> usize {
        query.entities.clear();
        for idx in self.entity_alloc.iter() {
            let Some(entry) = &self.entities[idx as usize] else {
                continue;
            };
            if type_hashes.iter().all(|&h| entry.components.contains_key(h)) {
                query.entities.push(EntityHandle(idx));
            }
        }
        query.entities.sort_unstable();
        query.entities.len()
    }

    /// Drops every entity and component.
    pub fn reset(&mut self) {
        self.entity_alloc.reset();
        self.component_alloc.reset();
        self.entities.fill(None);
        self.components.fill(None);
    }
}

impl Default for EntityStore {
    fn default() -> Self {
        Self::new(
            tessel_core::limits::MAX_ENTITIES,
            tessel_core::limits::MAX_COMPONENTS,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Position([f32; 3]);

    #[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
    #[repr(C)]
    struct Health(u32);

    fn with<T: Pod>(store: &mut EntityStore, e: EntityHandle, value: T) -> ComponentHandle {
        let c = store.create_component_from(&value).unwrap();
        store.add_component(e, c, type_hash_of::<T>()).unwrap();
        c
    }

    #[test]
    fn typed_access_round_trips() {
        let mut store = EntityStore::new(8, 8);
        let e = store.create_entity(true).unwrap();
        with(&mut store, e, Position([1.0, 2.0, 3.0]));

        assert_eq!(store.read::<Position>(e), Some(Position([1.0, 2.0, 3.0])));
        assert!(store.write(e, &Position([0.0; 3])));
        assert_eq!(store.read::<Position>(e), Some(Position([0.0; 3])));
        assert_eq!(store.read::<Health>(e), None);
    }

    #[test]
    fn query_matches_every_hash() {
        let mut store = EntityStore::new(8, 16);
        let a = store.create_entity(true).unwrap();
        let b = store.create_entity(true).unwrap();
        with(&mut store, a, Position([0.0; 3]));
        with(&mut store, a, Health(10));
        with(&mut store, b, Health(5));

        let mut query = EntityQuery::new();
        let hashes = [type_hash_of::<Position>(), type_hash_of::<Health>()];
        assert_eq!(store.query_entities(&hashes, &mut query), 1);
        assert_eq!(query.entities(), &[a]);

        store.query_entities(&[type_hash_of::<Health>()], &mut query);
        assert_eq!(query.entities(), &[a, b], "the buffer is refilled, not appended");
    }

    #[test]
    fn destroy_drops_owned_components() {
        let mut store = EntityStore::new(8, 8);
        let e = store.create_entity(true).unwrap();
        let c = with(&mut store, e, Health(1));

        store.retain_entity(e).unwrap();
        assert_eq!(store.destroy_entity(e).unwrap(), EntityRelease::Retained);
        assert!(store.is_entity_valid(e));

        assert_eq!(
            store.destroy_entity(e).unwrap(),
            EntityRelease::Destroyed { components: vec![c] }
        );
        assert!(!store.is_entity_valid(e));
        assert!(!store.is_component_valid(c));
        assert_eq!(store.num_entities(), 1, "index stays taken until released");
        assert!(store.release_entity(e));
        assert!(store.release_component(c));
        assert_eq!(store.num_entities(), 0);
        assert_eq!(store.num_components(), 0);
    }

    #[test]
    fn shared_component_survives_first_owner() {
        let mut store = EntityStore::new(8, 8);
        let a = store.create_entity(true).unwrap();
        let b = store.create_entity(true).unwrap();
        let c = with(&mut store, a, Health(3));
        store.retain_component(c).unwrap();
        store.add_component(b, c, type_hash_of::<Health>()).unwrap();

        assert_eq!(
            store.destroy_entity(a).unwrap(),
            EntityRelease::Destroyed { components: vec![] }
        );
        assert_eq!(store.read::<Health>(b), Some(Health(3)));
        assert_eq!(store.component_ref_count(c), Some(1));
    }

    #[test]
    fn entity_without_ownership_leaves_components_alone() {
        let mut store = EntityStore::new(8, 8);
        let e = store.create_entity(false).unwrap();
        let c = with(&mut store, e, Health(3));
        store.destroy_entity(e).unwrap();
        assert!(store.is_component_valid(c));
    }

    #[test]
    fn registered_types_are_size_checked() {
        let mut store = EntityStore::new(4, 4);
        let hash = store.register_type::<Position>();
        let e = store.create_entity(true).unwrap();
        let wrong = store.create_component_from(&Health(1)).unwrap();
        assert!(matches!(
            store.add_component(e, wrong, hash),
            Err(ResourceError::Validation(_))
        ));
    }

    #[test]
    fn duplicate_type_and_dead_handles_are_rejected() {
        let mut store = EntityStore::new(4, 4);
        let e = store.create_entity(true).unwrap();
        let c = with(&mut store, e, Health(1));
        assert!(store.add_component(e, c, type_hash_of::<Health>()).is_err());
        assert_eq!(store.remove_component(e, type_hash_of::<Health>()).unwrap(), Some(c));
        assert_eq!(store.get_component(e, type_hash_of::<Health>()), None);

        store.destroy_entity(e).unwrap();
        assert!(matches!(
            store.destroy_entity(e),
            Err(ResourceError::InvalidHandle { kind: HandleKind::Entity, .. })
        ));
    }

    #[test]
    fn exhausted_pool_reports_kind() {
        let mut store = EntityStore::new(1, 1);
        store.create_entity(false).unwrap();
        assert_eq!(
            store.create_entity(false),
            Err(ResourceError::Exhausted { kind: HandleKind::Entity })
        );
    }
}
