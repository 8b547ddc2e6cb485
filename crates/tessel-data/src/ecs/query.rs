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

//! Reusable result buffer of entity queries.

use tessel_core::handle::EntityHandle;

/// Entities matched by the last query it was passed to. Keep one around and
/// reuse it to avoid reallocating every frame.
#[derive(Debug, Default, Clone)]
pub struct EntityQuery {
    pub(crate) entities: Vec<EntityHandle>,
}

impl EntityQuery {
    /// Empty result buffer.
    pub fn new() -> Self {
        Self::default()
    }

    /// Matched entities in ascending handle order.
    pub fn entities(&self) -> &[EntityHandle] {
        &self.entities
    }

    /// Number of matches.
    pub fn len(&self) -> usize {
        self.entities.len()
    }

    /// `true` if nothing matched.
    pub fn is_empty(&self) -> bool {
        self.entities.is_empty()
    }

    /// Iterates the matches.
    pub fn iter(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.entities.iter().copied()
    }
}

impl<'a> IntoIterator for &'a EntityQuery {
    type Item = &'a EntityHandle;
    type IntoIter = std::slice::Iter<'a, EntityHandle>;

    fn into_iter(self) -> Self::IntoIter {
        self.entities.iter()
    }
}
