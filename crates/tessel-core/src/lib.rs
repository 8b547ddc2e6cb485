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

//! # Tessel Core
//!
//! Foundational crate containing the handle types, the per-frame data that travels
//! between the submit and render threads, the byte codecs used to record it, and the
//! interface contracts that renderer and physics backends implement.

#![warn(missing_docs)]

pub mod callback;
pub mod config;
pub mod error;
pub mod handle;
pub mod hash;
pub mod limits;
pub mod math;
pub mod memory;
pub mod physics;
pub mod renderer;
pub mod sync;
pub mod utils;

pub use callback::{Callback, LogCallback};
pub use config::{Init, InitLimits, PlatformData, Resolution, Threading};
pub use error::{ErrorScope, Fatal, RenderError, ResourceError, ValidationCode, ValidationError};
pub use handle::*;
pub use memory::Memory;
