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

//! Errors raised while bringing a context up.

use tessel_core::error::RenderError;
use tessel_core::physics::PhysicsError;
use thiserror::Error;

/// Why [`Context::init`](crate::Context::init) failed.
#[derive(Debug, Error)]
pub enum InitError {
    /// No renderer backend could be created.
    #[error("Renderer initialization failed: {0}")]
    Render(#[from] RenderError),
    /// No physics backend could be created.
    #[error("Physics initialization failed: {0}")]
    Physics(#[from] PhysicsError),
    /// The render thread could not be spawned.
    #[error("Failed to spawn the render thread: {0}")]
    Thread(#[from] std::io::Error),
}
