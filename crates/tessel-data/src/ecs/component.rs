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

//! Typeless component blobs and the type registry.

use bytemuck::Pod;
use tessel_core::hash::murmur2a_str;

/// Identity hash of a component type, stable for a given type name.
pub fn type_hash_of<T: ?Sized + 'static>() -> u32 {
    murmur2a_str(std::any::type_name::<T>())
}

/// Size and alignment registered for a component type hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ComponentType {
    /// Type name, for diagnostics.
    pub name: &'static str,
    /// Size in bytes.
    pub size: usize,
    /// Alignment in bytes.
    pub align: usize,
}

impl ComponentType {
    /// Layout of `T`.
    pub fn of<T: 'static>() -> Self {
        Self {
            name: std::any::type_name::<T>(),
            size: std::mem::size_of::<T>(),
            align: std::mem::align_of::<T>(),
        }
    }
}

/// An owned copy of component bytes with its reference count.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ComponentBlob {
    data: Box<[u8]>,
    ref_count: u16,
}

impl ComponentBlob {
    /// Copies `data`; the blob starts with one reference.
    pub fn new(data: &[u8]) -> Self {
        Self {
            data: data.into(),
            ref_count: 1,
        }
    }

    /// Raw bytes.
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Raw bytes, writable in place.
    pub fn bytes_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    /// Size in bytes.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// `true` for a zero-sized component.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Reads the blob as `T`, or `None` if the size differs.
    pub fn read<T: Pod>(&self) -> Option<T> {
        (self.data.len() == std::mem::size_of::<T>()).then(|| bytemuck::pod_read_unaligned(&self.data))
    }

    /// Overwrites the blob with `value`. Returns `false` if the size differs.
    pub fn write<T: Pod>(&mut self, value: &T) -> bool {
        let bytes = bytemuck::bytes_of(value);
        if bytes.len() != self.data.len() {
            return false;
        }
        self.data.copy_from_slice(bytes);
        true
    }

    pub(crate) fn ref_count(&self) -> u16 {
        self.ref_count
    }

    pub(crate) fn retain(&mut self) {
        self.ref_count = self.ref_count.saturating_add(1);
    }

    /// Drops one reference; returns the remaining count.
    pub(crate) fn release(&mut self) -> u16 {
        self.ref_count = self.ref_count.saturating_sub(1);
        self.ref_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn type_hash_is_stable_and_distinct() {
        assert_eq!(type_hash_of::<u32>(), type_hash_of::<u32>());
        assert_ne!(type_hash_of::<u32>(), type_hash_of::<f32>());
    }

    #[test]
    fn blob_typed_access_checks_size() {
        let mut blob = ComponentBlob::new(bytemuck::bytes_of(&[1.0f32, 2.0, 3.0]));
        assert_eq!(blob.read::<[f32; 3]>(), Some([1.0, 2.0, 3.0]));
        assert_eq!(blob.read::<f32>(), None);
        assert!(blob.write(&[4.0f32, 5.0, 6.0]));
        assert!(!blob.write(&1u8));
        assert_eq!(blob.read::<[f32; 3]>(), Some([4.0, 5.0, 6.0]));
    }

    #[test]
    fn component_type_layout() {
        let ty = ComponentType::of::<[u16; 3]>();
        assert_eq!((ty.size, ty.align), (6, 2));
    }
}
