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

//! # Physics Abstractions
//!
//! The contract physics backends implement and the selection of a backend at init.
//! Body handles are allocated by the context; backends key their state by them.

use crate::config::Init;
use crate::handle::BodyHandle;
use crate::math::{Quat, Vec3};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;

/// Available physics backends. `Count` requests the richest one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum PhysicsType {
    /// Accepts bodies, never moves them.
    Noop,
    /// Built-in integrator.
    Basic,
    /// Pick automatically.
    #[default]
    Count,
}

impl PhysicsType {
    /// Display name.
    pub const fn name(self) -> &'static str {
        match self {
            PhysicsType::Noop => "Noop",
            PhysicsType::Basic => "Basic",
            PhysicsType::Count => "Auto",
        }
    }
}

/// Errors raised by physics backends.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PhysicsError {
    /// The backend could not start.
    #[error("Physics backend initialization failed: {0}")]
    InitializationFailed(String),
    /// Every candidate backend failed.
    #[error("No physics backend available")]
    NoBackend,
    /// The body is unknown to the backend.
    #[error("Unknown body {0}")]
    UnknownBody(u16),
}

/// How a body moves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum BodyType {
    /// Responds to forces.
    #[default]
    Dynamic,
    /// Never moves.
    Static,
    /// Moved only by setting its velocity or position.
    Kinematic,
}

/// Collision shape, in body-local units before scaling.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum BodyShape {
    /// Sphere of the given radius.
    Sphere(f32),
    /// Box with half extents.
    Box(Vec3),
    /// Capsule with half height and radius.
    Capsule(f32, f32),
}

impl Default for BodyShape {
    fn default() -> Self {
        BodyShape::Sphere(0.5)
    }
}

impl BodyShape {
    /// Half extents of the axis aligned bounds.
    pub fn half_extents(&self) -> Vec3 {
        match *self {
            BodyShape::Sphere(r) => Vec3::new(r, r, r),
            BodyShape::Box(h) => h,
            BodyShape::Capsule(half_height, r) => Vec3::new(r, half_height + r, r),
        }
    }

    /// Shape with `scale` applied. Negative components are treated as positive.
    pub fn scaled(&self, scale: Vec3) -> BodyShape {
        let s = scale.abs();
        match *self {
            BodyShape::Sphere(r) => BodyShape::Sphere(r * s.x.max(s.y).max(s.z)),
            BodyShape::Box(h) => BodyShape::Box(h.mul_elem(s)),
            BodyShape::Capsule(half_height, r) => BodyShape::Capsule(half_height * s.y, r * s.x.max(s.z)),
        }
    }
}

/// Description of a body to create.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BodyDesc {
    /// Initial position.
    pub position: Vec3,
    /// Initial rotation.
    pub rotation: Quat,
    /// Scale applied to the shape.
    pub scale: Vec3,
    /// Shape.
    pub shape: BodyShape,
    /// Motion type.
    pub body_type: BodyType,
    /// Collision layer.
    pub layer: u16,
    /// Mass in kg, dynamic bodies only.
    pub mass: f32,
    /// Initial linear velocity.
    pub linear_velocity: Vec3,
    /// Initial angular velocity.
    pub angular_velocity: Vec3,
}

impl Default for BodyDesc {
    fn default() -> Self {
        Self {
            position: Vec3::ZERO,
            rotation: Quat::IDENTITY,
            scale: Vec3::ONE,
            shape: BodyShape::default(),
            body_type: BodyType::Dynamic,
            layer: 0,
            mass: 1.0,
            linear_velocity: Vec3::ZERO,
            angular_velocity: Vec3::ZERO,
        }
    }
}

/// Support state of a body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum GroundState {
    /// Standing on walkable ground.
    OnGround,
    /// Touching ground too steep to stand on.
    OnSteepGround,
    /// Touching something that does not support it.
    NotSupported,
    /// Nothing below.
    #[default]
    InAir,
}

/// What a body stands on.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct GroundInfo {
    /// Support state.
    pub state: GroundState,
    /// Contact point.
    pub position: Vec3,
    /// Surface normal.
    pub normal: Vec3,
    /// Velocity of the supporting body.
    pub velocity: Vec3,
    /// Supporting body, invalid when in air.
    #[serde(skip)]
    pub body: BodyHandle,
}

/// A physics backend.
pub trait PhysicsContext: Send {
    /// Backend type.
    fn physics_type(&self) -> PhysicsType;

    /// Advances the simulation by `dt` seconds.
    fn simulate(&mut self, dt: f32);

    /// Adds a body under `handle`.
    fn create_body(&mut self, handle: BodyHandle, desc: &BodyDesc) -> Result<(), PhysicsError>;
    /// Removes a body.
    fn destroy_body(&mut self, handle: BodyHandle);

    /// Position.
    fn position(&self, handle: BodyHandle) -> Option<Vec3>;
    /// Teleports a body.
    fn set_position(&mut self, handle: BodyHandle, position: Vec3);
    /// Rotation.
    fn rotation(&self, handle: BodyHandle) -> Option<Quat>;
    /// Sets the rotation.
    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat);
    /// Linear velocity.
    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3>;
    /// Sets the linear velocity.
    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3);
    /// Angular velocity.
    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3>;
    /// Sets the angular velocity.
    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3);

    /// Applies a force for the next step.
    fn add_force(&mut self, handle: BodyHandle, force: Vec3);
    /// Applies a torque for the next step.
    fn add_torque(&mut self, handle: BodyHandle, torque: Vec3);
    /// Changes the linear velocity by `impulse / mass`.
    fn add_linear_impulse(&mut self, handle: BodyHandle, impulse: Vec3);
    /// Changes the angular velocity by `impulse / mass`.
    fn add_angular_impulse(&mut self, handle: BodyHandle, impulse: Vec3);

    /// What the body stands on.
    fn ground_info(&self, handle: BodyHandle) -> GroundInfo;

    /// Gravity.
    fn gravity(&self) -> Vec3;
    /// Changes gravity.
    fn set_gravity(&mut self, gravity: Vec3);
}

/// Constructor of a physics backend.
pub type CreatePhysicsFn = dyn Fn(&Init) -> Result<Box<dyn PhysicsContext>, PhysicsError> + Send + Sync;

/// A physics backend registration.
#[derive(Clone)]
pub struct PhysicsCreator {
    /// Backend type.
    pub physics_type: PhysicsType,
    /// Display name.
    pub name: &'static str,
    /// Richness of the backend; higher is preferred when `Count` is requested.
    pub score: u32,
    /// Constructor.
    pub create: Arc<CreatePhysicsFn>,
}

impl PhysicsCreator {
    /// Registers `create` as the constructor of `physics_type`.
    pub fn new<F>(physics_type: PhysicsType, name: &'static str, score: u32, create: F) -> Self
    where
        F: Fn(&Init) -> Result<Box<dyn PhysicsContext>, PhysicsError> + Send + Sync + 'static,
    {
        Self {
            physics_type,
            name,
            score,
            create: Arc::new(create),
        }
    }
}

impl std::fmt::Debug for PhysicsCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PhysicsCreator")
            .field("physics_type", &self.physics_type)
            .field("name", &self.name)
            .field("score", &self.score)
            .finish()
    }
}

/// Creates the requested physics backend, or the highest scoring one for `Count`.
/// Falls back to lower scoring backends when creation fails.
pub fn select_physics(creators: &[PhysicsCreator], init: &Init) -> Result<Box<dyn PhysicsContext>, PhysicsError> {
    let mut ranked: Vec<&PhysicsCreator> = creators.iter().collect();
    ranked.sort_by_key(|c| {
        let bonus = if c.physics_type == init.physics_type { 1000 } else { 0 };
        std::cmp::Reverse(c.score + bonus)
    });
    for creator in ranked {
        match (creator.create)(init) {
            Ok(physics) => {
                log::info!("Physics backend selected: {}", creator.name);
                return Ok(physics);
            }
            Err(e) => log::warn!("Physics backend '{}' failed to initialize: {}", creator.name, e),
        }
    }
    Err(PhysicsError::NoBackend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_scale_is_ignored() {
        let shape = BodyShape::Box(Vec3::new(1.0, 2.0, 3.0));
        assert_eq!(
            shape.scaled(Vec3::new(-2.0, 1.0, -1.0)),
            BodyShape::Box(Vec3::new(2.0, 2.0, 3.0))
        );
        assert_eq!(BodyShape::Sphere(1.0).scaled(Vec3::new(-3.0, 1.0, 1.0)), BodyShape::Sphere(3.0));
    }

    #[test]
    fn capsule_bounds_include_caps() {
        let h = BodyShape::Capsule(1.0, 0.5).half_extents();
        assert_eq!(h, Vec3::new(0.5, 1.5, 0.5));
    }

    #[test]
    fn empty_registry_has_no_backend() {
        assert!(matches!(select_physics(&[], &Init::default()), Err(PhysicsError::NoBackend)));
    }
}
