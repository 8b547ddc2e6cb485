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

//! Shared immutable payloads passed from the API thread to the render thread.
//!
//! A [`Memory`] is a cheaply cloneable handle to a byte buffer. Resource commands
//! hold one clone; when the render thread drops the last clone after executing the
//! command, the buffer is released and any hook given to [`Memory::make_ref`] runs.

use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Mutex};

type ReleaseFn = Box<dyn FnOnce() + Send>;

enum Storage {
    Owned(Vec<u8>),
    Static(&'static [u8]),
    Borrowed(Box<dyn AsRef<[u8]> + Send + Sync>),
}

struct Inner {
    storage: Storage,
    release: Mutex<Option<ReleaseFn>>,
}

impl Inner {
    fn bytes(&self) -> &[u8] {
        match &self.storage {
            Storage::Owned(data) => data.as_slice(),
            Storage::Static(data) => *data,
            Storage::Borrowed(owner) => (**owner).as_ref(),
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        let release = match self.release.get_mut() {
            Ok(slot) => slot.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        };
        if let Some(release) = release {
            release();
        }
    }
}

/// Reference-counted immutable byte buffer.
#[derive(Clone)]
pub struct Memory {
    inner: Arc<Inner>,
}

impl Memory {
    fn from_storage(storage: Storage, release: Option<ReleaseFn>) -> Self {
        Self {
            inner: Arc::new(Inner {
                storage,
                release: Mutex::new(release),
            }),
        }
    }

    /// A zero-filled buffer of `size` bytes.
    pub fn alloc(size: usize) -> Self {
        Self::from_vec(vec![0; size])
    }

    /// Copies `data`.
    pub fn copy(data: &[u8]) -> Self {
        Self::from_vec(data.to_vec())
    }

    /// Copies the bytes of a POD slice.
    pub fn copy_pod<T: bytemuck::Pod>(data: &[T]) -> Self {
        Self::copy(bytemuck::cast_slice(data))
    }

    /// Takes ownership of `data`.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_storage(Storage::Owned(data), None)
    }

    /// References static data without copying.
    pub fn from_static(data: &'static [u8]) -> Self {
        Self::from_storage(Storage::Static(data), None)
    }

    /// Wraps caller-owned data without copying. `release` runs once the last clone
    /// is dropped, which usually happens on the render thread.
    pub fn make_ref<T>(owner: T, release: impl FnOnce() + Send + 'static) -> Self
    where
        T: AsRef<[u8]> + Send + Sync + 'static,
    {
        Self::from_storage(Storage::Borrowed(Box::new(owner)), Some(Box::new(release)))
    }

    /// The bytes.
    pub fn as_slice(&self) -> &[u8] {
        self.inner.bytes()
    }

    /// `true` if both values share the same buffer.
    pub fn ptr_eq(&self, other: &Memory) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl Deref for Memory {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl AsRef<[u8]> for Memory {
    fn as_ref(&self) -> &[u8] {
        self.as_slice()
    }
}

impl fmt::Debug for Memory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Memory").field("size", &self.len()).finish()
    }
}

impl PartialEq for Memory {
    fn eq(&self, other: &Self) -> bool {
        self.as_slice() == other.as_slice()
    }
}

impl Eq for Memory {}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn copy_and_alloc_expose_bytes() {
        let memory = Memory::copy(&[1, 2, 3]);
        assert_eq!(&*memory, &[1, 2, 3]);
        assert_eq!(Memory::alloc(4).as_slice(), &[0, 0, 0, 0]);
        assert_eq!(Memory::copy_pod(&[1u16]).len(), 2);
    }

    #[test]
    fn release_runs_once_after_last_clone() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = released.clone();
        let memory = Memory::make_ref(vec![9u8; 8], move || {
            counter.fetch_add(1, Ordering::SeqCst);
        });
        let clone = memory.clone();
        assert!(clone.ptr_eq(&memory));

        drop(memory);
        assert_eq!(released.load(Ordering::SeqCst), 0, "a clone is still alive");
        let handle = std::thread::spawn(move || drop(clone));
        handle.join().unwrap();
        assert_eq!(released.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn static_memory_is_not_copied() {
        static DATA: [u8; 3] = [4, 5, 6];
        let memory = Memory::from_static(&DATA);
        assert_eq!(memory.as_slice().as_ptr(), DATA.as_ptr());
    }
}
