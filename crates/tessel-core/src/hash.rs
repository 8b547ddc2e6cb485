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

//! Incremental MurmurHash2A.
//!
//! Used for every 32-bit identity key: uniform names, shader bytecode, program pairs,
//! vertex layouts, mesh data and component type names.

use bytemuck::Pod;

const M: u32 = 0x5bd1_e995;

#[inline]
fn mmix(h: &mut u32, mut k: u32) {
    k = k.wrapping_mul(M);
    k ^= k >> 24;
    k = k.wrapping_mul(M);
    *h = h.wrapping_mul(M);
    *h ^= k;
}

/// Streaming MurmurHash2A state.
#[derive(Debug, Clone, Copy)]
pub struct Murmur2A {
    hash: u32,
    tail: u32,
    count: u32,
    size: u32,
}

impl Default for Murmur2A {
    fn default() -> Self {
        Self::new(0)
    }
}

impl Murmur2A {
    /// Starts a hash with `seed`.
    pub const fn new(seed: u32) -> Self {
        Self {
            hash: seed,
            tail: 0,
            count: 0,
            size: 0,
        }
    }

    /// Feeds raw bytes.
    pub fn add(&mut self, mut data: &[u8]) -> &mut Self {
        self.size = self.size.wrapping_add(data.len() as u32);
        data = self.mix_tail(data);
        while data.len() >= 4 {
            let k = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
            mmix(&mut self.hash, k);
            data = &data[4..];
        }
        self.mix_tail(data);
        self
    }

    /// Feeds the bytes of a POD value.
    pub fn add_pod<T: Pod>(&mut self, value: &T) -> &mut Self {
        self.add(bytemuck::bytes_of(value))
    }

    /// Feeds the bytes of a POD slice.
    pub fn add_slice<T: Pod>(&mut self, values: &[T]) -> &mut Self {
        self.add(bytemuck::cast_slice(values))
    }

    /// Feeds a string's UTF-8 bytes.
    pub fn add_str(&mut self, value: &str) -> &mut Self {
        self.add(value.as_bytes())
    }

    fn mix_tail<'a>(&mut self, mut data: &'a [u8]) -> &'a [u8] {
        while !data.is_empty() && (data.len() < 4 || self.count > 0) {
            self.tail |= (data[0] as u32) << (self.count * 8);
            self.count += 1;
            data = &data[1..];
            if self.count == 4 {
                mmix(&mut self.hash, self.tail);
                self.tail = 0;
                self.count = 0;
            }
        }
        data
    }

    /// Finishes the hash.
    pub fn finish(&self) -> u32 {
        let mut hash = self.hash;
        mmix(&mut hash, self.tail);
        mmix(&mut hash, self.size);
        hash ^= hash >> 13;
        hash = hash.wrapping_mul(M);
        hash ^= hash >> 15;
        hash
    }
}

/// One-shot hash of a byte slice.
pub fn murmur2a(data: &[u8]) -> u32 {
    Murmur2A::new(0).add(data).finish()
}

/// One-shot hash of a string, used for uniform names and component types.
pub fn murmur2a_str(value: &str) -> u32 {
    murmur2a(value.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incremental_matches_one_shot_across_splits() {
        let data: Vec<u8> = (0u8..37).collect();
        let whole = murmur2a(&data);
        for split in 0..data.len() {
            let mut hasher = Murmur2A::new(0);
            hasher.add(&data[..split]).add(&data[split..]);
            assert_eq!(hasher.finish(), whole, "split at {split} changed the hash");
        }
    }

    #[test]
    fn different_inputs_differ() {
        assert_ne!(murmur2a_str("u_color"), murmur2a_str("u_colour"));
        assert_ne!(murmur2a(&[]), murmur2a(&[0]));
    }

    #[test]
    fn seed_changes_result() {
        let a = Murmur2A::new(0).add(b"abc").finish();
        let b = Murmur2A::new(1).add(b"abc").finish();
        assert_ne!(a, b);
    }
}
