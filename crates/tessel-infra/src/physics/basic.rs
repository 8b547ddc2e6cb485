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

//! Built-in rigid body integrator.
//!
//! Semi-implicit Euler with gravity, accumulated forces and impulses. Bodies do not
//! collide with each other; the only contact handled is a body resting on the
//! support found beneath it, which keeps it from sinking and lets it sleep.

use tessel_core::handle::BodyHandle;
use tessel_core::math::{Quat, Vec3};
use tessel_core::physics::{
    BodyDesc, BodyShape, BodyType, GroundInfo, GroundState, PhysicsContext, PhysicsError, PhysicsType,
};

const AXIS_X: Vec3 = Vec3::new(1.0, 0.0, 0.0);
const AXIS_Z: Vec3 = Vec3::new(0.0, 0.0, 1.0);

/// Tuning of [`BasicPhysics`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BasicPhysicsSettings {
    /// Initial gravity.
    pub gravity: Vec3,
    /// Linear speed limit in m/s.
    pub max_linear_speed: f32,
    /// Angular speed limit in rad/s.
    pub max_angular_speed: f32,
    /// Fraction of linear velocity lost per second.
    pub linear_damping: f32,
    /// Fraction of angular velocity lost per second.
    pub angular_damping: f32,
    /// Speed under which a supported body starts counting towards sleep.
    pub sleep_speed: f32,
    /// Seconds of rest before a body sleeps.
    pub time_to_sleep: f32,
    /// Largest gap between a body and the support below it.
    pub ground_epsilon: f32,
    /// Steepest walkable slope, in radians.
    pub max_slope_angle: f32,
}

impl Default for BasicPhysicsSettings {
    fn default() -> Self {
        Self {
            gravity: Vec3::new(0.0, -9.81, 0.0),
            max_linear_speed: 500.0,
            max_angular_speed: 0.25 * std::f32::consts::PI * 60.0,
            linear_damping: 0.05,
            angular_damping: 0.05,
            sleep_speed: 0.03,
            time_to_sleep: 0.5,
            ground_epsilon: 0.02,
            max_slope_angle: 50f32.to_radians(),
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct Body {
    body_type: BodyType,
    shape: BodyShape,
    layer: u16,
    inv_mass: f32,
    position: Vec3,
    rotation: Quat,
    linear_velocity: Vec3,
    angular_velocity: Vec3,
    force: Vec3,
    torque: Vec3,
    rest_time: f32,
    sleeping: bool,
    ground: GroundInfo,
}

fn conjugate(q: Quat) -> Quat {
    Quat {
        x: -q.x,
        y: -q.y,
        z: -q.z,
        w: q.w,
    }
}

fn clamp_length(v: Vec3, max: f32) -> Vec3 {
    let len = v.length();
    if len > max && len > 0.0 {
        v * (max / len)
    } else {
        v
    }
}

impl Body {
    fn new(desc: &BodyDesc) -> Self {
        let inv_mass = match desc.body_type {
            BodyType::Dynamic if desc.mass > 0.0 => 1.0 / desc.mass,
            BodyType::Dynamic => 1.0,
            BodyType::Static | BodyType::Kinematic => 0.0,
        };
        Self {
            body_type: desc.body_type,
            shape: desc.shape.scaled(desc.scale),
            layer: desc.layer,
            inv_mass,
            position: desc.position,
            rotation: desc.rotation.normalize(),
            linear_velocity: desc.linear_velocity,
            angular_velocity: desc.angular_velocity,
            force: Vec3::ZERO,
            torque: Vec3::ZERO,
            rest_time: 0.0,
            sleeping: false,
            ground: GroundInfo::default(),
        }
    }

    fn wake(&mut self) {
        self.sleeping = false;
        self.rest_time = 0.0;
    }

    /// Half extents of the world-space bounds.
    fn half_extents(&self) -> Vec3 {
        let h = self.shape.half_extents();
        if let BodyShape::Sphere(_) = self.shape {
            return h;
        }
        let ax = self.rotation.rotate(AXIS_X) * h.x;
        let ay = self.rotation.rotate(Vec3::Y) * h.y;
        let az = self.rotation.rotate(AXIS_Z) * h.z;
        ax.abs() + ay.abs() + az.abs()
    }

    fn bounds(&self) -> (Vec3, Vec3) {
        let h = self.half_extents();
        (self.position - h, self.position + h)
    }

    /// Outward surface normal closest to the world point `p`.
    fn surface_normal(&self, p: Vec3) -> Vec3 {
        let local = conjugate(self.rotation).rotate(p - self.position);
        let local_normal = match self.shape {
            BodyShape::Sphere(_) => local,
            BodyShape::Capsule(half_height, _) => {
                let axis_y = local.y.clamp(-half_height, half_height);
                local - Vec3::new(0.0, axis_y, 0.0)
            }
            BodyShape::Box(h) => {
                let rx = local.x.abs() / h.x.max(f32::EPSILON);
                let ry = local.y.abs() / h.y.max(f32::EPSILON);
                let rz = local.z.abs() / h.z.max(f32::EPSILON);
                if ry >= rx && ry >= rz {
                    Vec3::new(0.0, local.y.signum(), 0.0)
                } else if rx >= rz {
                    Vec3::new(local.x.signum(), 0.0, 0.0)
                } else {
                    Vec3::new(0.0, 0.0, local.z.signum())
                }
            }
        };
        if local_normal.length() <= f32::EPSILON {
            return Vec3::Y;
        }
        self.rotation.rotate(local_normal).normalize()
    }
}

/// The built-in physics backend.
#[derive(Debug)]
pub struct BasicPhysics {
    settings: BasicPhysicsSettings,
    gravity: Vec3,
    bodies: Vec<Option<Body>>,
}

impl Default for BasicPhysics {
    fn default() -> Self {
        Self::new(BasicPhysicsSettings::default())
    }
}

impl BasicPhysics {
    /// Creates an empty world.
    pub fn new(settings: BasicPhysicsSettings) -> Self {
        Self {
            settings,
            gravity: settings.gravity,
            bodies: Vec::new(),
        }
    }

    /// `true` if the body is asleep.
    pub fn is_sleeping(&self, handle: BodyHandle) -> bool {
        self.body(handle).is_some_and(|b| b.sleeping)
    }

    /// Collision layer of a body.
    pub fn layer(&self, handle: BodyHandle) -> Option<u16> {
        self.body(handle).map(|b| b.layer)
    }

    /// Number of live bodies.
    pub fn num_bodies(&self) -> usize {
        self.bodies.iter().flatten().count()
    }

    fn body(&self, handle: BodyHandle) -> Option<&Body> {
        self.bodies.get(handle.idx() as usize).and_then(Option::as_ref)
    }

    fn body_mut(&mut self, handle: BodyHandle) -> Option<&mut Body> {
        self.bodies.get_mut(handle.idx() as usize).and_then(Option::as_mut)
    }

    fn integrate(&mut self, dt: f32) {
        let settings = self.settings;
        let gravity = self.gravity;
        for body in self.bodies.iter_mut().flatten() {
            if body.body_type == BodyType::Static || body.sleeping {
                body.force = Vec3::ZERO;
                body.torque = Vec3::ZERO;
                continue;
            }
            if body.body_type == BodyType::Dynamic {
                body.linear_velocity += (gravity + body.force * body.inv_mass) * dt;
                body.angular_velocity += body.torque * body.inv_mass * dt;
                body.linear_velocity = body.linear_velocity * (1.0 - settings.linear_damping * dt).max(0.0);
                body.angular_velocity = body.angular_velocity * (1.0 - settings.angular_damping * dt).max(0.0);
                if body.ground.state == GroundState::OnGround {
                    let relative = body.linear_velocity - body.ground.velocity;
                    let into_ground = relative.dot(body.ground.normal);
                    if into_ground < 0.0 {
                        body.linear_velocity = body.linear_velocity - body.ground.normal * into_ground;
                    }
                }
                body.linear_velocity = clamp_length(body.linear_velocity, settings.max_linear_speed);
                body.angular_velocity = clamp_length(body.angular_velocity, settings.max_angular_speed);
            }
            body.position += body.linear_velocity * dt;
            body.rotation = body.rotation.integrate(body.angular_velocity, dt);
            body.force = Vec3::ZERO;
            body.torque = Vec3::ZERO;
        }
    }

    /// Finds the support beneath body `idx`, if any.
    fn find_ground(&self, idx: usize) -> (GroundInfo, f32) {
        let Some(body) = self.bodies[idx].as_ref() else {
            return (GroundInfo::default(), 0.0);
        };
        let (min, max) = body.bounds();
        let mut best: Option<(usize, f32)> = None;
        for (other_idx, other) in self.bodies.iter().enumerate() {
            let Some(other) = other else { continue };
            if other_idx == idx {
                continue;
            }
            let (other_min, other_max) = other.bounds();
            let overlaps = min.x < other_max.x && max.x > other_min.x && min.z < other_max.z && max.z > other_min.z;
            let gap = min.y - other_max.y;
            let above_center = min.y >= (other_min.y + other_max.y) * 0.5;
            if !overlaps || gap > self.settings.ground_epsilon || !above_center {
                continue;
            }
            if best.map_or(true, |(_, top)| other_max.y > top) {
                best = Some((other_idx, other_max.y));
            }
        }
        let Some((support_idx, top)) = best else {
            return (GroundInfo::default(), 0.0);
        };
        let Some(support) = self.bodies[support_idx].as_ref() else {
            return (GroundInfo::default(), 0.0);
        };
        let contact = Vec3::new(body.position.x, top, body.position.z);
        let normal = support.surface_normal(Vec3::new(body.position.x, min.y, body.position.z));
        let state = if support.body_type != BodyType::Static {
            GroundState::NotSupported
        } else if normal.dot(Vec3::Y) < self.settings.max_slope_angle.cos() {
            GroundState::OnSteepGround
        } else {
            GroundState::OnGround
        };
        let info = GroundInfo {
            state,
            position: contact,
            normal,
            velocity: support.linear_velocity,
            body: BodyHandle(support_idx as u16),
        };
        (info, (top - min.y).max(0.0))
    }

    fn update_ground(&mut self, dt: f32) {
        for idx in 0..self.bodies.len() {
            let moving = self.bodies[idx]
                .as_ref()
                .is_some_and(|b| b.body_type != BodyType::Static);
            if !moving {
                continue;
            }
            let (ground, penetration) = self.find_ground(idx);
            let settings = self.settings;
            let Some(body) = self.bodies[idx].as_mut() else { continue };
            body.ground = ground;
            if body.body_type != BodyType::Dynamic {
                continue;
            }
            if ground.state == GroundState::OnGround {
                body.position.y += penetration;
                let relative = body.linear_velocity - ground.velocity;
                let into_ground = relative.dot(ground.normal);
                if into_ground < 0.0 {
                    body.linear_velocity = body.linear_velocity - ground.normal * into_ground;
                }
                let resting = body.linear_velocity.length() < settings.sleep_speed
                    && body.angular_velocity.length() < settings.sleep_speed;
                body.rest_time = if resting { body.rest_time + dt } else { 0.0 };
                if body.rest_time >= settings.time_to_sleep && !body.sleeping {
                    body.sleeping = true;
                    body.linear_velocity = Vec3::ZERO;
                    body.angular_velocity = Vec3::ZERO;
                    log::trace!("Body {idx} fell asleep");
                }
            } else {
                body.rest_time = 0.0;
            }
        }
    }
}

impl PhysicsContext for BasicPhysics {
    fn physics_type(&self) -> PhysicsType {
        PhysicsType::Basic
    }

    fn simulate(&mut self, dt: f32) {
        if dt <= 0.0 {
            return;
        }
        self.integrate(dt);
        self.update_ground(dt);
    }

    fn create_body(&mut self, handle: BodyHandle, desc: &BodyDesc) -> Result<(), PhysicsError> {
        if !handle.is_valid() {
            return Err(PhysicsError::UnknownBody(handle.idx()));
        }
        let idx = handle.idx() as usize;
        if self.bodies.len() <= idx {
            self.bodies.resize(idx + 1, None);
        }
        if self.bodies[idx].is_some() {
            log::warn!("Body {idx} replaced");
        }
        self.bodies[idx] = Some(Body::new(desc));
        Ok(())
    }

    fn destroy_body(&mut self, handle: BodyHandle) {
        if let Some(slot) = self.bodies.get_mut(handle.idx() as usize) {
            *slot = None;
        }
        for body in self.bodies.iter_mut().flatten() {
            if body.ground.body == handle {
                body.ground = GroundInfo::default();
                body.wake();
            }
        }
    }

    fn position(&self, handle: BodyHandle) -> Option<Vec3> {
        self.body(handle).map(|b| b.position)
    }

    fn set_position(&mut self, handle: BodyHandle, position: Vec3) {
        if let Some(body) = self.body_mut(handle) {
            body.position = position;
            body.wake();
        }
    }

    fn rotation(&self, handle: BodyHandle) -> Option<Quat> {
        self.body(handle).map(|b| b.rotation)
    }

    fn set_rotation(&mut self, handle: BodyHandle, rotation: Quat) {
        if let Some(body) = self.body_mut(handle) {
            body.rotation = rotation.normalize();
            body.wake();
        }
    }

    fn linear_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.body(handle).map(|b| b.linear_velocity)
    }

    fn set_linear_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        let max = self.settings.max_linear_speed;
        if let Some(body) = self.body_mut(handle) {
            if body.body_type != BodyType::Static {
                body.linear_velocity = clamp_length(velocity, max);
                body.wake();
            }
        }
    }

    fn angular_velocity(&self, handle: BodyHandle) -> Option<Vec3> {
        self.body(handle).map(|b| b.angular_velocity)
    }

    fn set_angular_velocity(&mut self, handle: BodyHandle, velocity: Vec3) {
        let max = self.settings.max_angular_speed;
        if let Some(body) = self.body_mut(handle) {
            if body.body_type != BodyType::Static {
                body.angular_velocity = clamp_length(velocity, max);
                body.wake();
            }
        }
    }

    fn add_force(&mut self, handle: BodyHandle, force: Vec3) {
        if let Some(body) = self.body_mut(handle) {
            body.force += force;
            body.wake();
        }
    }

    fn add_torque(&mut self, handle: BodyHandle, torque: Vec3) {
        if let Some(body) = self.body_mut(handle) {
            body.torque += torque;
            body.wake();
        }
    }

    fn add_linear_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        let max = self.settings.max_linear_speed;
        if let Some(body) = self.body_mut(handle) {
            body.linear_velocity = clamp_length(body.linear_velocity + impulse * body.inv_mass, max);
            body.wake();
        }
    }

    fn add_angular_impulse(&mut self, handle: BodyHandle, impulse: Vec3) {
        let max = self.settings.max_angular_speed;
        if let Some(body) = self.body_mut(handle) {
            body.angular_velocity = clamp_length(body.angular_velocity + impulse * body.inv_mass, max);
            body.wake();
        }
    }

    fn ground_info(&self, handle: BodyHandle) -> GroundInfo {
        self.body(handle).map(|b| b.ground).unwrap_or_default()
    }

    fn gravity(&self) -> Vec3 {
        self.gravity
    }

    fn set_gravity(&mut self, gravity: Vec3) {
        self.gravity = gravity;
        for body in self.bodies.iter_mut().flatten() {
            body.wake();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DT: f32 = 1.0 / 60.0;

    fn floor() -> BodyDesc {
        BodyDesc {
            position: Vec3::new(0.0, -0.5, 0.0),
            shape: BodyShape::Box(Vec3::new(10.0, 0.5, 10.0)),
            body_type: BodyType::Static,
            ..BodyDesc::default()
        }
    }

    fn ball(y: f32) -> BodyDesc {
        BodyDesc {
            position: Vec3::new(0.0, y, 0.0),
            shape: BodyShape::Sphere(0.5),
            ..BodyDesc::default()
        }
    }

    #[test]
    fn free_fall_follows_gravity() {
        let mut physics = BasicPhysics::new(BasicPhysicsSettings {
            linear_damping: 0.0,
            ..BasicPhysicsSettings::default()
        });
        let body = BodyHandle(0);
        physics.create_body(body, &ball(100.0)).unwrap();
        for _ in 0..60 {
            physics.simulate(DT);
        }
        let v = physics.linear_velocity(body).unwrap();
        assert!((v.y + 9.81).abs() < 1e-3, "{v:?}");
        let y = physics.position(body).unwrap().y;
        // Semi-implicit Euler overshoots the analytic 4.905 m slightly.
        assert!(y < 100.0 - 4.9 && y > 100.0 - 5.0, "{y}");
        assert_eq!(physics.ground_info(body).state, GroundState::InAir);
    }

    #[test]
    fn ball_comes_to_rest_on_the_floor() {
        let mut physics = BasicPhysics::default();
        let ground = BodyHandle(0);
        let body = BodyHandle(1);
        physics.create_body(ground, &floor()).unwrap();
        physics.create_body(body, &ball(2.0)).unwrap();
        for _ in 0..180 {
            physics.simulate(DT);
        }
        let info = physics.ground_info(body);
        assert_eq!(info.state, GroundState::OnGround);
        assert_eq!(info.body, ground);
        assert!((info.normal.y - 1.0).abs() < 1e-4);
        let y = physics.position(body).unwrap().y;
        assert!((y - 0.5).abs() < 0.03, "{y}");
        assert!(physics.is_sleeping(body));

        physics.add_linear_impulse(body, Vec3::new(0.0, 5.0, 0.0));
        assert!(!physics.is_sleeping(body));
        physics.simulate(DT);
        assert_eq!(physics.ground_info(body).state, GroundState::InAir);
    }

    #[test]
    fn tilted_support_is_steep() {
        let mut physics = BasicPhysics::default();
        let ramp = BodyDesc {
            shape: BodyShape::Box(Vec3::new(1.0, 0.1, 1.0)),
            rotation: Quat::from_axis_angle(AXIS_Z, 60f32.to_radians()),
            body_type: BodyType::Static,
            ..BodyDesc::default()
        };
        physics.create_body(BodyHandle(0), &ramp).unwrap();
        let top = physics.body(BodyHandle(0)).unwrap().bounds().1.y;
        physics.create_body(BodyHandle(1), &ball(top + 0.5 + 0.01)).unwrap();
        physics.set_gravity(Vec3::ZERO);
        physics.simulate(DT);
        assert_eq!(physics.ground_info(BodyHandle(1)).state, GroundState::OnSteepGround);
    }

    #[test]
    fn standing_on_a_dynamic_body_is_not_support() {
        let mut physics = BasicPhysics::default();
        physics.set_gravity(Vec3::ZERO);
        physics.create_body(BodyHandle(0), &ball(0.0)).unwrap();
        physics.create_body(BodyHandle(1), &ball(1.0)).unwrap();
        physics.simulate(DT);
        assert_eq!(physics.ground_info(BodyHandle(1)).state, GroundState::NotSupported);
    }

    #[test]
    fn speeds_are_clamped_and_static_bodies_ignore_impulses() {
        let mut physics = BasicPhysics::default();
        physics.create_body(BodyHandle(0), &ball(0.0)).unwrap();
        physics.add_linear_impulse(BodyHandle(0), Vec3::new(1.0e6, 0.0, 0.0));
        let v = physics.linear_velocity(BodyHandle(0)).unwrap();
        assert!((v.length() - 500.0).abs() < 1e-2);

        physics.create_body(BodyHandle(1), &floor()).unwrap();
        physics.add_linear_impulse(BodyHandle(1), Vec3::new(0.0, 10.0, 0.0));
        physics.simulate(DT);
        assert_eq!(physics.position(BodyHandle(1)), Some(Vec3::new(0.0, -0.5, 0.0)));
    }

    #[test]
    fn heavier_bodies_accelerate_less() {
        let mut physics = BasicPhysics::default();
        physics.set_gravity(Vec3::ZERO);
        let light = BodyDesc { mass: 1.0, ..ball(0.0) };
        let heavy = BodyDesc { mass: 4.0, ..ball(10.0) };
        physics.create_body(BodyHandle(0), &light).unwrap();
        physics.create_body(BodyHandle(1), &heavy).unwrap();
        physics.add_linear_impulse(BodyHandle(0), Vec3::new(4.0, 0.0, 0.0));
        physics.add_linear_impulse(BodyHandle(1), Vec3::new(4.0, 0.0, 0.0));
        assert_eq!(physics.linear_velocity(BodyHandle(0)).unwrap().x, 4.0);
        assert_eq!(physics.linear_velocity(BodyHandle(1)).unwrap().x, 1.0);
    }

    #[test]
    fn destroying_the_support_wakes_bodies() {
        let mut physics = BasicPhysics::default();
        physics.create_body(BodyHandle(0), &floor()).unwrap();
        physics.create_body(BodyHandle(1), &ball(0.5)).unwrap();
        for _ in 0..60 {
            physics.simulate(DT);
        }
        assert!(physics.is_sleeping(BodyHandle(1)));
        physics.destroy_body(BodyHandle(0));
        assert!(!physics.is_sleeping(BodyHandle(1)));
        assert_eq!(physics.ground_info(BodyHandle(1)).state, GroundState::InAir);
        assert_eq!(physics.num_bodies(), 1);
    }
}
