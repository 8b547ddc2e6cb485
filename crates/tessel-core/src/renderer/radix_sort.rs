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

//! Stable least-significant-digit radix sort of keys with attached values.
//!
//! Keys are processed 11 bits at a time. A pass whose digit is the same for every
//! key leaves the order untouched and is skipped.

const RADIX_BITS: u32 = 11;
const RADIX_BUCKETS: usize = 1 << RADIX_BITS;
const RADIX_MASK: u64 = (RADIX_BUCKETS - 1) as u64;

/// An unsigned integer key.
pub trait RadixKey: Copy + Default {
    /// Width of the key in bits.
    const BITS: u32;
    /// The key widened to 64 bits.
    fn to_u64(self) -> u64;
}

impl RadixKey for u32 {
    const BITS: u32 = 32;
    fn to_u64(self) -> u64 {
        self as u64
    }
}

impl RadixKey for u64 {
    const BITS: u32 = 64;
    fn to_u64(self) -> u64 {
        self
    }
}

/// Sorts `keys` ascending, moving `values` along. Equal keys keep their relative order.
///
/// `temp_keys` and `temp_values` are scratch buffers, grown as needed and reusable
/// across calls.
pub fn radix_sort<K: RadixKey, V: Copy + Default>(
    keys: &mut [K],
    values: &mut [V],
    temp_keys: &mut Vec<K>,
    temp_values: &mut Vec<V>,
) {
    let len = keys.len().min(values.len());
    if len < 2 {
        return;
    }
    let keys = &mut keys[..len];
    let values = &mut values[..len];
    temp_keys.clear();
    temp_keys.resize(len, K::default());
    temp_values.clear();
    temp_values.resize(len, V::default());

    let mut in_temp = false;
    let mut histogram = [0usize; RADIX_BUCKETS];
    let mut shift = 0;
    while shift < K::BITS {
        histogram.fill(0);
        let (src_keys, src_values, dst_keys, dst_values): (&[K], &[V], &mut [K], &mut [V]) =
            if in_temp {
                (&temp_keys[..], &temp_values[..], &mut keys[..], &mut values[..])
            } else {
                (&keys[..], &values[..], &mut temp_keys[..], &mut temp_values[..])
            };

        for key in src_keys {
            histogram[((key.to_u64() >> shift) & RADIX_MASK) as usize] += 1;
        }

        let first = ((src_keys[0].to_u64() >> shift) & RADIX_MASK) as usize;
        if histogram[first] == len {
            shift += RADIX_BITS;
            continue;
        }

        let mut offset = 0;
        for bucket in histogram.iter_mut() {
            let count = *bucket;
            *bucket = offset;
            offset += count;
        }

        for (key, value) in src_keys.iter().zip(src_values) {
            let digit = ((key.to_u64() >> shift) & RADIX_MASK) as usize;
            let dst = histogram[digit];
            histogram[digit] += 1;
            dst_keys[dst] = *key;
            dst_values[dst] = *value;
        }

        in_temp = !in_temp;
        shift += RADIX_BITS;
    }

    if in_temp {
        keys.copy_from_slice(&temp_keys[..len]);
        values.copy_from_slice(&temp_values[..len]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn lcg(seed: &mut u64) -> u64 {
        *seed = seed
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        *seed
    }

    #[test]
    fn sorts_random_u64_keys_like_a_stable_sort() {
        let mut seed = 42;
        let mut keys: Vec<u64> = (0..5000).map(|_| lcg(&mut seed) & 0xff00_0000_ffff_0000).collect();
        let mut values: Vec<u16> = (0..keys.len() as u16).collect();

        let mut expected: Vec<(u64, u16)> = keys.iter().copied().zip(values.iter().copied()).collect();
        expected.sort_by_key(|(k, _)| *k);

        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        let actual: Vec<(u64, u16)> = keys.into_iter().zip(values).collect();
        assert_eq!(actual, expected, "radix sort must match a stable sort");
    }

    #[test]
    fn equal_keys_preserve_insertion_order() {
        let mut keys = vec![7u32, 7, 7, 1, 7];
        let mut values = vec![0u16, 1, 2, 3, 4];
        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        assert_eq!(keys, vec![1, 7, 7, 7, 7]);
        assert_eq!(values, vec![3, 0, 1, 2, 4]);
    }

    #[test]
    fn uniform_keys_are_left_untouched() {
        let mut keys = vec![5u64; 10];
        let mut values: Vec<u16> = (0..10).collect();
        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        assert_eq!(values, (0..10).collect::<Vec<u16>>());
    }

    #[test]
    fn high_bits_only_differences_are_sorted() {
        let mut keys = vec![0xff00_0000_0000_0000u64, 0x0100_0000_0000_0000, 0];
        let mut values = vec![0u16, 1, 2];
        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());
        assert_eq!(values, vec![2, 1, 0]);
    }
}
