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

//! Unaligned little-endian readers and writers for packed binary containers
//! (shader headers, mesh chunks).

use crate::error::ResourceError;
use bytemuck::Pod;

/// Cursor over a packed byte slice.
#[derive(Debug, Clone)]
pub struct ByteReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> ByteReader<'a> {
    /// Starts reading at the beginning of `data`.
    pub fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    /// Bytes left.
    pub fn remaining(&self) -> usize {
        self.data.len() - self.pos
    }

    /// `true` once everything was consumed.
    pub fn is_empty(&self) -> bool {
        self.remaining() == 0
    }

    /// Current offset.
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Takes the next `len` bytes.
    pub fn bytes(&mut self, len: usize) -> Result<&'a [u8], ResourceError> {
        if self.remaining() < len {
            return Err(ResourceError::Decode(format!(
                "unexpected end of data: need {len} bytes at offset {}, {} left",
                self.pos,
                self.remaining()
            )));
        }
        let out = &self.data[self.pos..self.pos + len];
        self.pos += len;
        Ok(out)
    }

    /// Reads a POD value without alignment requirements.
    pub fn pod<T: Pod>(&mut self) -> Result<T, ResourceError> {
        let bytes = self.bytes(std::mem::size_of::<T>())?;
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    /// Reads a `u8`.
    pub fn u8(&mut self) -> Result<u8, ResourceError> {
        self.pod()
    }

    /// Reads a little-endian `u16`.
    pub fn u16(&mut self) -> Result<u16, ResourceError> {
        self.pod::<[u8; 2]>().map(u16::from_le_bytes)
    }

    /// Reads a little-endian `u32`.
    pub fn u32(&mut self) -> Result<u32, ResourceError> {
        self.pod::<[u8; 4]>().map(u32::from_le_bytes)
    }

    /// Reads `len` bytes as UTF-8 (lossy).
    pub fn string(&mut self, len: usize) -> Result<String, ResourceError> {
        Ok(String::from_utf8_lossy(self.bytes(len)?).into_owned())
    }
}

/// Appends packed little-endian values to a byte vector.
pub trait ByteWriter {
    /// Appends a `u8`.
    fn put_u8(&mut self, value: u8);
    /// Appends a little-endian `u16`.
    fn put_u16(&mut self, value: u16);
    /// Appends a little-endian `u32`.
    fn put_u32(&mut self, value: u32);
    /// Appends the raw bytes of a POD value.
    fn put_pod<T: Pod>(&mut self, value: &T);
}

impl ByteWriter for Vec<u8> {
    fn put_u8(&mut self, value: u8) {
        self.push(value);
    }

    fn put_u16(&mut self, value: u16) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_u32(&mut self, value: u32) {
        self.extend_from_slice(&value.to_le_bytes());
    }

    fn put_pod<T: Pod>(&mut self, value: &T) {
        self.extend_from_slice(bytemuck::bytes_of(value));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reads_back_what_was_written() {
        let mut buf = Vec::new();
        buf.put_u8(7);
        buf.put_u16(0x1234);
        buf.put_u32(0xdead_beef);
        buf.extend_from_slice(b"name");

        let mut reader = ByteReader::new(&buf);
        assert_eq!(reader.u8().unwrap(), 7);
        assert_eq!(reader.u16().unwrap(), 0x1234);
        assert_eq!(reader.u32().unwrap(), 0xdead_beef);
        assert_eq!(reader.string(4).unwrap(), "name");
        assert!(reader.is_empty());
    }

    #[test]
    fn truncated_input_is_a_decode_error() {
        let mut reader = ByteReader::new(&[1, 2]);
        assert!(matches!(reader.u32(), Err(ResourceError::Decode(_))));
        assert_eq!(reader.position(), 0, "failed reads do not advance");
    }
}
