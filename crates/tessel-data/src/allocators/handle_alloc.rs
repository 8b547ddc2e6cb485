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

//! Dense/sparse pool of 16-bit handle indices.

/// Fixed-capacity pool of 16-bit indices with O(1) allocation, release and
/// membership test, plus dense iteration over the live indices.
///
/// `dense[..num]` holds the live indices, `dense[num..]` the free ones, and
/// `sparse[idx]` is the position of `idx` inside `dense`. A released index is the
/// next one handed out.
#[derive(Debug, Clone)]
pub struct HandleAlloc {
    num: u16,
    dense: Vec<u16>,
    sparse: Vec<u16>,
}

impl HandleAlloc {
    /// Creates a pool of `capacity` indices. `u16::MAX` is never handed out, so the
    /// largest usable capacity is `u16::MAX`.
    pub fn new(capacity: u16) -> Self {
        let dense: Vec<u16> = (0..capacity).collect();
        let sparse = dense.clone();
        Self {
            num: 0,
            dense,
            sparse,
        }
    }

    /// Takes a free index, or `None` when the pool is full.
    pub fn alloc(&mut self) -> Option<u16> {
        if self.num as usize >= self.dense.len() {
            return None;
        }
        let pos = self.num;
        self.num += 1;
        let idx = self.dense[pos as usize];
        self.sparse[idx as usize] = pos;
        Some(idx)
    }

    /// Returns `idx` to the pool. Returns `false` if it was not live.
    pub fn free(&mut self, idx: u16) -> bool {
        if !self.is_valid(idx) {
            return false;
        }
        self.num -= 1;
        let last = self.dense[self.num as usize];
        let pos = self.sparse[idx as usize];
        self.dense[self.num as usize] = idx;
        self.sparse[last as usize] = pos;
        self.dense[pos as usize] = last;
        self.sparse[idx as usize] = self.num;
        true
    }

    /// `true` if `idx` is currently allocated.
    #[inline]
    pub fn is_valid(&self, idx: u16) -> bool {
        let Some(&pos) = self.sparse.get(idx as usize) else {
            return false;
        };
        pos < self.num && self.dense[pos as usize] == idx
    }

    /// Live indices, in no particular order.
    pub fn handles(&self) -> &[u16] {
        &self.dense[..self.num as usize]
    }

    /// Iterates the live indices.
    pub fn iter(&self) -> impl Iterator<Item = u16> + '_ {
        self.handles().iter().copied()
    }

    /// Number of live indices.
    #[inline]
    pub fn num_handles(&self) -> u16 {
        self.num
    }

    /// Pool size.
    #[inline]
    pub fn capacity(&self) -> u16 {
        self.dense.len() as u16
    }

    /// `true` when no index is live.
    pub fn is_empty(&self) -> bool {
        self.num == 0
    }

    /// Releases every index.
    pub fn reset(&mut self) {
        self.num = 0;
        for (i, (d, s)) in self.dense.iter_mut().zip(self.sparse.iter_mut()).enumerate() {
            *d = i as u16;
            *s = i as u16;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocates_in_order_until_full() {
        let mut pool = HandleAlloc::new(3);
        assert_eq!(pool.alloc(), Some(0));
        assert_eq!(pool.alloc(), Some(1));
        assert_eq!(pool.alloc(), Some(2));
        assert_eq!(pool.alloc(), None, "pool of 3 must refuse a fourth index");
        assert_eq!(pool.num_handles(), 3);
    }

    #[test]
    fn free_keeps_dense_array_packed() {
        let mut pool = HandleAlloc::new(8);
        for _ in 0..5 {
            pool.alloc();
        }
        assert!(pool.free(1));
        assert!(!pool.is_valid(1));
        assert!(pool.is_valid(4), "the moved index must stay valid");

        let mut live: Vec<u16> = pool.iter().collect();
        live.sort_unstable();
        assert_eq!(live, vec![0, 2, 3, 4]);
    }

    #[test]
    fn released_index_is_reused_first() {
        let mut pool = HandleAlloc::new(8);
        pool.alloc();
        pool.alloc();
        pool.alloc();
        pool.free(0);
        assert_eq!(pool.alloc(), Some(0));
    }

    #[test]
    fn double_free_and_out_of_range_are_rejected() {
        let mut pool = HandleAlloc::new(4);
        let idx = pool.alloc().unwrap();
        assert!(pool.free(idx));
        assert!(!pool.free(idx));
        assert!(!pool.is_valid(100));
        assert!(!pool.free(u16::MAX));
    }

    #[test]
    fn reset_releases_everything() {
        let mut pool = HandleAlloc::new(4);
        pool.alloc();
        pool.alloc();
        pool.reset();
        assert!(pool.is_empty());
        assert_eq!(pool.alloc(), Some(0));
    }
}
