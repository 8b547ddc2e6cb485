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

//! Identity key to handle index map.
//!
//! Used to find a resource again by what it is: a uniform by name hash, a shader by
//! bytecode hash, a program by its shader pair, a mesh by data hash, or a component
//! type hash inside an entity.

use tessel_core::handle::INVALID_HANDLE;

/// Open-addressed map from 32-bit keys to 16-bit handle indices.
///
/// Linear probing over a power-of-two table. Removal shifts the following run
/// back so lookups never need tombstones.
#[derive(Debug, Clone)]
pub struct HandleHashMap {
    keys: Vec<u32>,
    handles: Vec<u16>,
    len: usize,
}

impl HandleHashMap {
    /// Creates a map able to hold `max_entries` entries.
    pub fn new(max_entries: u16) -> Self {
        let capacity = (max_entries.max(1) as usize).next_power_of_two();
        Self {
            keys: vec![0; capacity],
            handles: vec![INVALID_HANDLE; capacity],
            len: 0,
        }
    }

    #[inline]
    fn mask(&self) -> usize {
        self.keys.len() - 1
    }

    #[inline]
    fn ideal_slot(&self, key: u32) -> usize {
        // murmur3 finalizer
        let mut h = key;
        h ^= h >> 16;
        h = h.wrapping_mul(0x85eb_ca6b);
        h ^= h >> 13;
        h = h.wrapping_mul(0xc2b2_ae35);
        h ^= h >> 16;
        h as usize & self.mask()
    }

    fn find_slot(&self, key: u32) -> Option<usize> {
        let mut slot = self.ideal_slot(key);
        for _ in 0..self.keys.len() {
            if self.handles[slot] == INVALID_HANDLE {
                return None;
            }
            if self.keys[slot] == key {
                return Some(slot);
            }
            slot = (slot + 1) & self.mask();
        }
        None
    }

    /// Maps `key` to `handle`. Returns `false` if the key is already present, the
    /// map is full or `handle` is the invalid index.
    pub fn insert(&mut self, key: u32, handle: u16) -> bool {
        if handle == INVALID_HANDLE || self.len == self.keys.len() {
            return false;
        }
        let mut slot = self.ideal_slot(key);
        loop {
            if self.handles[slot] == INVALID_HANDLE {
                self.keys[slot] = key;
                self.handles[slot] = handle;
                self.len += 1;
                return true;
            }
            if self.keys[slot] == key {
                return false;
            }
            slot = (slot + 1) & self.mask();
        }
    }

    /// Handle mapped to `key`.
    pub fn find(&self, key: u32) -> Option<u16> {
        self.find_slot(key).map(|slot| self.handles[slot])
    }

    /// `true` if `key` is mapped.
    pub fn contains_key(&self, key: u32) -> bool {
        self.find_slot(key).is_some()
    }

    /// Removes `key`, returning the handle it mapped to.
    pub fn remove_by_key(&mut self, key: u32) -> Option<u16> {
        let slot = self.find_slot(key)?;
        let handle = self.handles[slot];
        self.remove_slot(slot);
        Some(handle)
    }

    /// Removes the entry pointing at `handle`. Returns `false` if there is none.
    pub fn remove_by_handle(&mut self, handle: u16) -> bool {
        if handle == INVALID_HANDLE {
            return false;
        }
        match self.handles.iter().position(|&h| h == handle) {
            Some(slot) => {
                self.remove_slot(slot);
                true
            }
            None => false,
        }
    }

    fn remove_slot(&mut self, mut hole: usize) {
        self.handles[hole] = INVALID_HANDLE;
        self.len -= 1;
        let mask = self.mask();
        let mut next = (hole + 1) & mask;
        while self.handles[next] != INVALID_HANDLE {
            let ideal = self.ideal_slot(self.keys[next]);
            // Distance from the ideal slot, measured around the ring.
            let dist_next = next.wrapping_sub(ideal) & mask;
            let dist_hole = hole.wrapping_sub(ideal) & mask;
            if dist_hole < dist_next {
                self.keys[hole] = self.keys[next];
                self.handles[hole] = self.handles[next];
                self.handles[next] = INVALID_HANDLE;
                hole = next;
            }
            next = (next + 1) & mask;
        }
    }

    /// Number of entries.
    pub fn len(&self) -> usize {
        self.len
    }

    /// `true` when empty.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Number of slots.
    pub fn capacity(&self) -> usize {
        self.keys.len()
    }

    /// Removes every entry.
    pub fn clear(&mut self) {
        self.handles.fill(INVALID_HANDLE);
        self.len = 0;
    }

    /// Iterates `(key, handle)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (u32, u16)> + '_ {
        self.keys
            .iter()
            .zip(self.handles.iter())
            .filter(|(_, &h)| h != INVALID_HANDLE)
            .map(|(&k, &h)| (k, h))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insert_find_remove() {
        let mut map = HandleHashMap::new(16);
        assert!(map.insert(0xdead_beef, 3));
        assert!(!map.insert(0xdead_beef, 4), "duplicate keys are refused");
        assert_eq!(map.find(0xdead_beef), Some(3));
        assert_eq!(map.remove_by_key(0xdead_beef), Some(3));
        assert_eq!(map.find(0xdead_beef), None);
        assert!(map.is_empty());
    }

    #[test]
    fn remove_by_handle_keeps_colliding_keys_reachable() {
        // A two-slot table forces every key into the same probe run.
        let mut map = HandleHashMap::new(2);
        assert!(map.insert(1, 10));
        assert!(map.insert(2, 20));
        assert!(!map.insert(3, 30), "map is full");

        assert!(map.remove_by_handle(10));
        assert_eq!(map.find(2), Some(20));
        assert!(!map.remove_by_handle(10));
        assert!(map.insert(3, 30));
        assert_eq!(map.find(3), Some(30));
    }

    #[test]
    fn survives_churn() {
        let mut map = HandleHashMap::new(64);
        for i in 0..48u16 {
            assert!(map.insert(i as u32 * 7919, i));
        }
        for i in (0..48u16).step_by(2) {
            assert!(map.remove_by_handle(i));
        }
        for i in 0..48u16 {
            let expected = if i % 2 == 0 { None } else { Some(i) };
            assert_eq!(map.find(i as u32 * 7919), expected, "key of handle {i}");
        }
        assert_eq!(map.len(), 24);
        assert_eq!(map.iter().count(), 24);
    }

    #[test]
    fn invalid_handle_is_never_stored() {
        let mut map = HandleHashMap::new(4);
        assert!(!map.insert(1, INVALID_HANDLE));
        assert!(!map.remove_by_handle(INVALID_HANDLE));
    }
}
