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

//! Physics backends.

mod basic;
mod noop;

pub use basic::{BasicPhysics, BasicPhysicsSettings};
pub use noop::NoopPhysics;

use tessel_core::physics::{PhysicsCreator, PhysicsType};

/// Every physics backend this crate provides. `BasicPhysics` scores highest, so
/// it is what an unspecified request gets.
pub fn default_physics_creators() -> Vec<PhysicsCreator> {
    vec![
        PhysicsCreator::new(PhysicsType::Basic, "Basic", 10, |_| {
            Ok(Box::new(BasicPhysics::new(BasicPhysicsSettings::default())))
        }),
        PhysicsCreator::new(PhysicsType::Noop, "Noop", 0, |_| Ok(Box::new(NoopPhysics::new()))),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::config::Init;
    use tessel_core::physics::select_physics;

    #[test]
    fn richest_backend_by_default() {
        let physics = select_physics(&default_physics_creators(), &Init::default()).unwrap();
        assert_eq!(physics.physics_type(), PhysicsType::Basic);
    }

    #[test]
    fn requested_backend_wins() {
        let init = Init {
            physics_type: PhysicsType::Noop,
            ..Init::default()
        };
        let physics = select_physics(&default_physics_creators(), &init).unwrap();
        assert_eq!(physics.physics_type(), PhysicsType::Noop);
    }
}
