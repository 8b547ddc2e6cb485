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

//! Concrete backends for the renderer and physics contracts of `tessel-core`.
//!
//! Nothing here is called directly by the frame loop: backends are registered
//! through [`default_renderer_creators`] and [`default_physics_creators`] and picked
//! at init by score.

#![warn(missing_docs)]

#[cfg(feature = "graphics")]
pub mod graphics;
#[cfg(feature = "physics")]
pub mod physics;

#[cfg(feature = "graphics")]
pub use graphics::{
    default_renderer_creators, headless_creator, noop_creator, FrameReport, HeadlessCapture, HeadlessEvent,
    HeadlessRenderer, NoopRenderer, SubmittedItem,
};
#[cfg(feature = "physics")]
pub use physics::{default_physics_creators, BasicPhysics, BasicPhysicsSettings, NoopPhysics};
