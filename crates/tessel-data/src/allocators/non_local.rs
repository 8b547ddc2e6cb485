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

//! First-fit suballocator for ranges inside dynamic index/vertex buffers.
//!
//! Addresses are 64-bit: the high 32 bits carry the parent buffer handle, the low
//! 32 bits a byte offset inside it. Blocks of different parents never coalesce.

use std::collections::HashMap;

/// Stored address that points at no block.
pub const NON_LOCAL_INVALID: u64 = u64::MAX;

/// Minimum block size and alignment.
pub const MIN_BLOCK_SIZE: u32 = 16;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct FreeBlock {
    ptr: u64,
    size: u32,
}

/// First-fit free list over address-ordered blocks.
#[derive(Debug, Default, Clone)]
pub struct NonLocalAllocator {
    free: Vec<FreeBlock>,
    used: HashMap<u64, u32>,
    used_size: u64,
    total_size: u64,
}

/// Builds an address from a parent handle and an offset.
#[inline]
pub const fn make_address(parent: u16, offset: u32) -> u64 {
    ((parent as u64) << 32) | offset as u64
}

/// Parent handle of an address.
#[inline]
pub const fn address_parent(addr: u64) -> u16 {
    (addr >> 32) as u16
}

/// Byte offset of an address.
#[inline]
pub const fn address_offset(addr: u64) -> u32 {
    addr as u32
}

impl NonLocalAllocator {
    /// Empty allocator with no backing region.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a fresh backing region.
    pub fn add(&mut self, ptr: u64, size: u32) {
        let block = FreeBlock { ptr, size };
        let pos = self.free.partition_point(|b| b.ptr < ptr);
        self.free.insert(pos, block);
        self.total_size += size as u64;
    }

    /// Hands out a block of at least `size` bytes, rounded up to
    /// [`MIN_BLOCK_SIZE`], from the first free block large enough.
    pub fn alloc(&mut self, size: u32) -> Option<u64> {
        let size = size.max(1).checked_next_multiple_of(MIN_BLOCK_SIZE)?;
        let pos = self.free.iter().position(|b| b.size >= size)?;
        let block = &mut self.free[pos];
        let ptr = block.ptr;
        if block.size == size {
            self.free.remove(pos);
        } else {
            block.ptr += size as u64;
            block.size -= size;
        }
        self.used.insert(ptr, size);
        self.used_size += size as u64;
        Some(ptr)
    }

    /// Returns a used block to the free list. Unknown addresses are ignored and
    /// reported as `false`.
    pub fn free(&mut self, ptr: u64) -> bool {
        let Some(size) = self.used.remove(&ptr) else {
            return false;
        };
        self.used_size -= size as u64;
        let pos = self.free.partition_point(|b| b.ptr < ptr);
        self.free.insert(pos, FreeBlock { ptr, size });
        true
    }

    /// Merges address-adjacent free blocks. Returns `true` if no block is in use,
    /// meaning every backing region can be released.
    pub fn compact(&mut self) -> bool {
        self.free.sort_unstable();
        let mut merged: Vec<FreeBlock> = Vec::with_capacity(self.free.len());
        for block in self.free.drain(..) {
            match merged.last_mut() {
                Some(last) if last.ptr + last.size as u64 == block.ptr => last.size += block.size,
                _ => merged.push(block),
            }
        }
        self.free = merged;
        self.used.is_empty()
    }

    /// Pops a whole free region so its parent buffer can be destroyed. Only
    /// meaningful once [`compact`](Self::compact) reported no used blocks.
    pub fn remove(&mut self) -> Option<u64> {
        if !self.used.is_empty() || self.free.is_empty() {
            return None;
        }
        let block = self.free.remove(0);
        self.total_size -= block.size as u64;
        Some(block.ptr)
    }

    /// Drops every block and region.
    pub fn reset(&mut self) {
        self.free.clear();
        self.used.clear();
        self.used_size = 0;
        self.total_size = 0;
    }

    /// Bytes in use.
    pub fn used_size(&self) -> u64 {
        self.used_size
    }

    /// Bytes free.
    pub fn free_size(&self) -> u64 {
        self.free.iter().map(|b| b.size as u64).sum()
    }

    /// Bytes of every region added and not removed.
    pub fn total_size(&self) -> u64 {
        self.total_size
    }

    /// Number of free blocks.
    pub fn num_free_blocks(&self) -> usize {
        self.free.len()
    }

    /// Number of used blocks.
    pub fn num_used_blocks(&self) -> usize {
        self.used.len()
    }

    /// Size of the used block at `ptr`.
    pub fn block_size(&self, ptr: u64) -> Option<u32> {
        self.used.get(&ptr).copied()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_conserved(a: &NonLocalAllocator) {
        assert_eq!(a.free_size() + a.used_size(), a.total_size(), "free + used must equal added");
    }

    #[test]
    fn first_fit_splits_blocks() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(2, 0), 1024);
        let p0 = a.alloc(64).unwrap();
        let p1 = a.alloc(10).unwrap();
        assert_eq!(address_parent(p0), 2);
        assert_eq!(address_offset(p0), 0);
        assert_eq!(address_offset(p1), 64);
        assert_eq!(a.block_size(p1), Some(16), "sizes round up to 16 bytes");
        assert_conserved(&a);
    }

    #[test]
    fn exhausted_returns_none() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(0, 0), 32);
        assert!(a.alloc(32).is_some());
        assert_eq!(a.alloc(16), None);
    }

    #[test]
    fn compact_coalesces_neighbours_only_within_parent() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(0, 0), 64);
        a.add(make_address(1, 0), 64);
        let blocks: Vec<u64> = (0..4).map(|_| a.alloc(32).unwrap()).collect();
        for &b in &blocks {
            assert!(a.free(b));
        }
        assert_conserved(&a);
        assert!(a.compact(), "nothing is in use");
        assert_eq!(a.num_free_blocks(), 2, "regions of different parents stay apart");

        assert_eq!(a.remove(), Some(make_address(0, 0)));
        assert_eq!(a.remove(), Some(make_address(1, 0)));
        assert_eq!(a.remove(), None);
        assert_eq!(a.total_size(), 0);
    }

    #[test]
    fn freed_range_is_reused_after_compaction() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(0, 0), 256);
        let p0 = a.alloc(64).unwrap();
        let p1 = a.alloc(64).unwrap();
        let _p2 = a.alloc(64).unwrap();
        a.free(p0);
        a.free(p1);
        assert!(!a.compact());
        assert_eq!(a.alloc(128), Some(p0), "the two freed neighbours merge into one block");
        assert_conserved(&a);
    }

    #[test]
    fn mixed_sequence_conserves_bytes_and_leaves_no_adjacent_free_blocks() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(0, 0), 512);
        a.add(make_address(1, 0), 256);
        let mut live = Vec::new();
        for (i, size) in [48u32, 16, 100, 64, 32, 200, 16, 80].into_iter().enumerate() {
            if let Some(ptr) = a.alloc(size) {
                live.push(ptr);
            }
            assert_conserved(&a);
            if i % 3 == 2 {
                assert!(a.free(live.remove(0)));
                assert_conserved(&a);
            }
        }
        for ptr in live.iter().skip(1).step_by(2) {
            assert!(a.free(*ptr));
        }
        assert_conserved(&a);

        assert!(!a.compact());
        assert_conserved(&a);
        for pair in a.free.windows(2) {
            assert_ne!(pair[0].ptr + pair[0].size as u64, pair[1].ptr, "adjacent free blocks must be merged");
        }
        assert_eq!(a.total_size(), 768);
    }

    #[test]
    fn remove_refuses_while_blocks_are_used() {
        let mut a = NonLocalAllocator::new();
        a.add(make_address(0, 0), 64);
        let p = a.alloc(16).unwrap();
        assert_eq!(a.remove(), None);
        assert!(!a.free(p + 1), "unknown address");
        assert!(a.free(p));
        assert!(a.compact());
        assert!(a.remove().is_some());
    }
}
