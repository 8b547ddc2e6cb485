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

//! Entities, components and physics bodies.
//!
//! Entity and component indices follow the same deferred release as GPU
//! resources: a destroyed handle is not reused before the next `frame()`.

use super::{lock, Context};
use crate::resources::Resources;
use bytemuck::Pod;
use tessel_core::error::ResourceError;
use tessel_core::handle::*;
use tessel_core::math::{Quat, Vec3};
use tessel_core::physics::{BodyDesc, GroundInfo, PhysicsContext};
use tessel_data::ecs::EntityRelease;
use tessel_data::{EntityQuery, EntityStore};

impl Context {
    /// Runs `f` with the entity store locked.
    pub fn with_ecs<R>(&self, f: impl FnOnce(&mut EntityStore) -> R) -> R {
        f(&mut lock(&self.resources).ecs)
    }

    /// Registers `T` as a component type. Components added under its hash must
    /// then have its size.
    pub fn register_component_type<T: 'static>(&self) -> u32 {
        lock(&self.resources).ecs.register_type::<T>()
    }

    /// Creates an entity. With `destroy_components` its components lose a
    /// reference when the entity dies.
    pub fn create_entity(&self, destroy_components: bool) -> Result<EntityHandle, ResourceError> {
        lock(&self.resources).ecs.create_entity(destroy_components)
    }

    /// Drops a reference to an entity.
    pub fn destroy_entity(&self, entity: EntityHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| {
            if let EntityRelease::Destroyed { components } = res.ecs.destroy_entity(entity)? {
                Resources::queue_free(frame, entity);
                for component in components {
                    Resources::queue_free(frame, component);
                }
            }
            Ok(())
        })
    }

    pub fn is_entity_valid(&self, entity: EntityHandle) -> bool {
        lock(&self.resources).ecs.is_entity_valid(entity)
    }

    /// Creates a component holding a copy of `data`.
    pub fn create_component(&self, data: &[u8]) -> Result<ComponentHandle, ResourceError> {
        lock(&self.resources).ecs.create_component(data)
    }

    pub fn create_component_from<T: Pod>(&self, value: &T) -> Result<ComponentHandle, ResourceError> {
        lock(&self.resources).ecs.create_component_from(value)
    }

    /// Drops a reference to a component.
    pub fn destroy_component(&self, component: ComponentHandle) -> Result<(), ResourceError> {
        self.with_resources(|res, frame| {
            if res.ecs.destroy_component(component)? {
                Resources::queue_free(frame, component);
            }
            Ok(())
        })
    }

    pub fn add_component(
        &self,
        entity: EntityHandle,
        component: ComponentHandle,
        type_hash: u32,
    ) -> Result<(), ResourceError> {
        lock(&self.resources).ecs.add_component(entity, component, type_hash)
    }

    /// Detaches a component; the component itself stays alive.
    pub fn remove_component(
        &self,
        entity: EntityHandle,
        type_hash: u32,
    ) -> Result<Option<ComponentHandle>, ResourceError> {
        lock(&self.resources).ecs.remove_component(entity, type_hash)
    }

    /// Copy of the bytes stored under `type_hash`.
    pub fn get_component(&self, entity: EntityHandle, type_hash: u32) -> Option<Vec<u8>> {
        lock(&self.resources)
            .ecs
            .get_component(entity, type_hash)
            .map(<[u8]>::to_vec)
    }

    /// Reads the component registered for `T`.
    pub fn read_component<T: Pod>(&self, entity: EntityHandle) -> Option<T> {
        lock(&self.resources).ecs.read(entity)
    }

    /// Overwrites the component registered for `T`. Returns `false` if the
    /// entity has none.
    pub fn write_component<T: Pod>(&self, entity: EntityHandle, value: &T) -> bool {
        lock(&self.resources).ecs.write(entity, value)
    }

    /// Fills `query` with the entities holding every listed type.
    pub fn query_entities(&self, type_hashes: &[u32], query: &mut EntityQuery) -> usize {
        lock(&self.resources).ecs.query_entities(type_hashes, query)
    }

    // --- Physics ---

    /// Runs `f` with the physics backend locked.
    pub fn with_physics<R>(&self, f: impl FnOnce(&mut dyn PhysicsContext) -> R) -> R {
        f(lock(&self.resources).physics.as_mut())
    }

    /// Advances the simulation by `dt` seconds.
    pub fn simulate(&self, dt: f32) {
        lock(&self.resources).physics.simulate(dt);
    }

    pub fn create_body(&self, desc: &BodyDesc) -> Result<BodyHandle, ResourceError> {
        lock(&self.resources).create_body(desc)
    }

    /// The body leaves the simulation at the next `frame()`.
    pub fn destroy_body(&self, body: BodyHandle) -> Result<(), ResourceError> {
        lock(&self.resources).destroy_body(body)
    }

    pub fn body_position(&self, body: BodyHandle) -> Option<Vec3> {
        lock(&self.resources).physics.position(body)
    }

    pub fn body_rotation(&self, body: BodyHandle) -> Option<Quat> {
        lock(&self.resources).physics.rotation(body)
    }

    pub fn add_linear_impulse(&self, body: BodyHandle, impulse: Vec3) {
        lock(&self.resources).physics.add_linear_impulse(body, impulse);
    }

    pub fn ground_info(&self, body: BodyHandle) -> GroundInfo {
        lock(&self.resources).physics.ground_info(body)
    }
}

#[cfg(test)]
mod tests {
    use crate::context::tests::headless_context;
    use tessel_core::config::Threading;
    use tessel_data::{type_hash_of, EntityQuery};

    #[test]
    fn destroyed_entities_free_at_the_swap() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let hash = context.register_component_type::<u32>();
        assert_eq!(hash, type_hash_of::<u32>());

        let entity = context.create_entity(true).unwrap();
        let component = context.create_component_from(&7u32).unwrap();
        context.add_component(entity, component, hash).unwrap();
        assert_eq!(context.read_component::<u32>(entity), Some(7));
        assert!(context.write_component(entity, &9u32));

        let mut query = EntityQuery::new();
        assert_eq!(context.query_entities(&[hash], &mut query), 1);

        context.destroy_entity(entity).unwrap();
        assert!(!context.is_entity_valid(entity));
        let reused = context.create_entity(false).unwrap();
        assert_ne!(reused, entity);

        context.frame();
        assert!(!context.with_ecs(|store| store.is_component_valid(component)));
        context.destroy_entity(reused).unwrap();
    }
}
