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

//! Entity-component store.
//!
//! Entities are pool indices owning a small `type hash -> component` map.
//! Components are typeless byte blobs; typed access goes through `bytemuck`.

mod component;
mod query;
mod store;

pub use component::{type_hash_of, ComponentBlob, ComponentType};
pub use query::EntityQuery;
pub use store::{EntityRelease, EntityStore};
