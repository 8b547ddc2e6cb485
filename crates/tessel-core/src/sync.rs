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

//! Lock-free counters shared by concurrent encoders.

use std::sync::atomic::{AtomicU32, Ordering};

/// A counter that never exceeds its limit.
///
/// Encoders reserve render item, blit, matrix and rect slots through it; once the
/// limit is reached every further reservation fails instead of wrapping.
#[derive(Debug)]
pub struct BoundedCounter {
    value: AtomicU32,
    limit: AtomicU32,
}

impl BoundedCounter {
    /// A counter at zero that saturates at `limit`.
    pub const fn new(limit: u32) -> Self {
        Self {
            value: AtomicU32::new(0),
            limit: AtomicU32::new(limit),
        }
    }

    /// Adds `n`, clamped at the limit. Returns the previous value.
    pub fn fetch_add_sat(&self, n: u32) -> u32 {
        let limit = self.limit.load(Ordering::Relaxed);
        let mut current = self.value.load(Ordering::Relaxed);
        loop {
            let next = current.saturating_add(n).min(limit);
            match self
                .value
                .compare_exchange_weak(current, next, Ordering::AcqRel, Ordering::Relaxed)
            {
                Ok(prev) => return prev,
                Err(actual) => current = actual,
            }
        }
    }

    /// Reserves `n` consecutive slots. Returns the first index and how many were
    /// granted, which is less than `n` near the limit.
    pub fn reserve(&self, n: u32) -> (u32, u32) {
        let prev = self.fetch_add_sat(n);
        let limit = self.limit.load(Ordering::Relaxed);
        (prev, n.min(limit.saturating_sub(prev)))
    }

    /// Reserves a single slot, or `None` at the limit.
    pub fn reserve_one(&self) -> Option<u32> {
        match self.reserve(1) {
            (idx, 1) => Some(idx),
            _ => None,
        }
    }

    /// Current value.
    pub fn get(&self) -> u32 {
        self.value.load(Ordering::Acquire)
    }

    /// Current limit.
    pub fn limit(&self) -> u32 {
        self.limit.load(Ordering::Relaxed)
    }

    /// Resets to `value` (clamped) without changing the limit.
    pub fn reset(&self, value: u32) {
        let limit = self.limit.load(Ordering::Relaxed);
        self.value.store(value.min(limit), Ordering::Release);
    }

    /// Changes the limit and resets the value to zero.
    pub fn reset_with_limit(&self, limit: u32) {
        self.limit.store(limit, Ordering::Relaxed);
        self.value.store(0, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn saturates_at_limit() {
        let counter = BoundedCounter::new(5);
        assert_eq!(counter.reserve(3), (0, 3));
        assert_eq!(counter.reserve(3), (3, 2), "only two slots left");
        assert_eq!(counter.reserve(1), (5, 0));
        assert_eq!(counter.reserve_one(), None);
        assert_eq!(counter.get(), 5);
    }

    #[test]
    fn concurrent_reservations_never_overlap() {
        let counter = Arc::new(BoundedCounter::new(1000));
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                std::thread::spawn(move || {
                    let mut mine = Vec::new();
                    while let Some(idx) = counter.reserve_one() {
                        mine.push(idx);
                    }
                    mine
                })
            })
            .collect();

        let mut all: Vec<u32> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        all.sort_unstable();
        assert_eq!(all, (0..1000).collect::<Vec<u32>>());
    }

    #[test]
    fn reset_with_limit_changes_capacity() {
        let counter = BoundedCounter::new(2);
        counter.reserve(2);
        counter.reset_with_limit(4);
        assert_eq!(counter.reserve(4), (0, 4));
    }
}
