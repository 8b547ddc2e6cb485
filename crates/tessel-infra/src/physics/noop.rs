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

//! Backend that stores bodies and never simulates them.

use std::collections::HashMap;
use tessel_core::handle::BodyHandle;
use tessel_core::math::{Quat, Vec3};
use tessel_core::physics::{BodyDesc, GroundInfo, PhysicsContext, PhysicsError, PhysicsType};

/// The no-op physics backend.
#[derive(Debug, Default)]
pub struct NoopPhysics {
    bodies: HashMap<BodyHandle, BodyDesc>,
    gravity: Vec3,
}

impl NoopPhysics {
    /// Creates the backend.
    pub fn new() -> Self {
        Self {
            bodies: HashMap::new(),
            gravity: Vec3::new(0.0, -9.81, 0.0),
        }
    }
}

impl PhysicsContext for NoopPhysics {
    fn physics_type(&self) -> PhysicsType {
        PhysicsType::Noop
    }

    fn simulate(&mut self, _dt: f32) {}

    fn create_body(&mut self, handle: BodyHandle, desc: &BodyDesc) -> Result<(), PhysicsError> {
        self.bodies.insert(handle, *desc);
        Ok(())
    }

    fn destroy_body(&mut self, handle: BodyHandle) {
        self.bodies.remove(&handle);
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.position)
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.position = position;
        }
    }

    fn rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.bodies.get(&handle).map(|b| b.rotation)
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.rotation = rotation;
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.linear_velocity = velocity;
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.bodies.get(&handle).map(|b| b.angular_velocity)
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        if let Some(body) = self.bodies.get_mut(&handle) {
            body.angular_velocity = velocity;
        }
    }

    fn add_force(&mut self, _handle: BodyHandle, _force: Vec3) {}
    fn add_torque(&mut self, _handle: BodyHandle, _torque: Vec3) {}
    fn add_linear_impulse(&mut self, _handle: BodyHandle, _impulse: Vec3) {}
    fn add_angular_impulse(&mut self, _handle: BodyHandle, _impulse: Vec3) {}

    fn ground_info(&self, _handle: BodyHandle) -> GroundInfo {
        GroundInfo::default()
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bodies_never_move() {
        let mut physics = NoopPhysics::new();
        let body = BodyHandle(0);
        let desc = BodyDesc {
            position: Vec3::new(0.0, 5.0, 0.0),
            linear_velocity: Vec3::new(1.0, 0.0, 0.0),
            ..BodyDesc::default()
        };
        physics.create_body(body, &desc).unwrap();
        physics.add_force(body, Vec3::new(0.0, 100.0, 0.0));
        physics.simulate(1.0);
        assert_eq!(physics.position(body), Some(Vec3::new(0.0, 5.0, 0.0)));
        physics.destroy_body(body);
        assert_eq!(physics.position(body), None);
    }
}
