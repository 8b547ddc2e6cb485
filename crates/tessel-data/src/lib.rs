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

//! Data layer: fixed-capacity handle pools, the dynamic buffer suballocator, the
//! entity-component store and the mesh chunk format.

#![warn(missing_docs)]

pub mod allocators;
pub mod ecs;
pub mod mesh;

pub use allocators::{HandleAlloc, HandleHashMap, NonLocalAllocator};
pub use ecs::{type_hash_of, EntityQuery, EntityStore};
