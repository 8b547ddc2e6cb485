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

//! Per-encoder stream of opcoded uniform assignments.
//!
//! ```text
//! bits 27..31  type  (5)
//! bits 11..26  loc   (16)
//! bits  1..10  num   (10)
//! bit   0      copy  (1)
//! ```
//!
//! With `copy = 1` the opcode is followed by `num * type.size()` value bytes. With
//! `copy = 0` it is followed by a `u16` uniform handle whose current value is read at
//! replay time. A `UniformType::End` opcode terminates the stream.

use super::types::UniformType;
use crate::handle::UniformHandle;
use crate::limits::{MAX_UNIFORM_ARRAY_SIZE, UNIFORM_BUFFER_SIZE};

const TYPE_SHIFT: u32 = 27;
const TYPE_MASK: u32 = 0x1f;
const LOC_SHIFT: u32 = 11;
const LOC_MASK: u32 = 0xffff;
const NUM_SHIFT: u32 = 1;
const NUM_MASK: u32 = 0x3ff;
const COPY_MASK: u32 = 0x1;

/// Decoded opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UniformOpcode {
    /// Value type.
    pub ty: UniformType,
    /// Location; the uniform handle index for user uniforms.
    pub loc: u16,
    /// Array size.
    pub num: u16,
    /// `true` when the value is stored inline.
    pub copy: bool,
}

impl UniformOpcode {
    /// Packs the opcode.
    pub const fn encode(&self) -> u32 {
        ((self.ty as u32 & TYPE_MASK) << TYPE_SHIFT)
            | ((self.loc as u32 & LOC_MASK) << LOC_SHIFT)
            | ((self.num as u32 & NUM_MASK) << NUM_SHIFT)
            | (self.copy as u32 & COPY_MASK)
    }

    /// Unpacks an opcode; `None` for an unknown type.
    pub const fn decode(opcode: u32) -> Option<Self> {
        let ty = match UniformType::from_u8(((opcode >> TYPE_SHIFT) & TYPE_MASK) as u8) {
            Some(ty) => ty,
            None => return None,
        };
        Some(Self {
            ty,
            loc: ((opcode >> LOC_SHIFT) & LOC_MASK) as u16,
            num: ((opcode >> NUM_SHIFT) & NUM_MASK) as u16,
            copy: opcode & COPY_MASK != 0,
        })
    }
}

/// Value attached to an opcode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UniformPayload<'a> {
    /// Inline value bytes.
    Inline(&'a [u8]),
    /// Value held by a uniform handle.
    Handle(UniformHandle),
}

/// Growable uniform stream with a write cursor.
#[derive(Debug, Clone)]
pub struct UniformBuffer {
    data: Vec<u8>,
}

impl Default for UniformBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl UniformBuffer {
    /// Creates an empty buffer with the default capacity.
    pub fn new() -> Self {
        Self {
            data: Vec::with_capacity(UNIFORM_BUFFER_SIZE),
        }
    }

    /// Current write position, used as `uniform_begin`/`uniform_end` of render items.
    pub fn pos(&self) -> u32 {
        self.data.len() as u32
    }

    /// Rewinds to `start`.
    pub fn reset(&mut self, start: u32) {
        self.data.truncate(start as usize);
    }

    /// Writes an inline value. `num` is capped at [`MAX_UNIFORM_ARRAY_SIZE`] and
    /// `value` is truncated or zero-padded to `num * ty.size()`.
    pub fn write_uniform(&mut self, ty: UniformType, loc: u16, value: &[u8], num: u16) {
        let num = num.min(MAX_UNIFORM_ARRAY_SIZE);
        let opcode = UniformOpcode {
            ty,
            loc,
            num,
            copy: true,
        };
        self.write_opcode(opcode.encode());
        let size = num as usize * ty.size() as usize;
        let copied = size.min(value.len());
        self.data.extend_from_slice(&value[..copied]);
        self.data.resize(self.data.len() + (size - copied), 0);
    }

    /// Writes a deferred reference to the value held by `handle`.
    pub fn write_uniform_handle(&mut self, ty: UniformType, loc: u16, handle: UniformHandle, num: u16) {
        let num = num.min(MAX_UNIFORM_ARRAY_SIZE);
        let opcode = UniformOpcode {
            ty,
            loc,
            num,
            copy: false,
        };
        self.write_opcode(opcode.encode());
        self.data.extend_from_slice(&handle.idx().to_ne_bytes());
    }

    /// Terminates the stream.
    pub fn finish(&mut self) {
        let end = UniformOpcode {
            ty: UniformType::End,
            loc: 0,
            num: 0,
            copy: false,
        };
        self.write_opcode(end.encode());
    }

    /// Appends a stream recorded elsewhere, e.g. by an encoder, and returns the
    /// position it starts at.
    pub fn append(&mut self, bytes: &[u8]) -> u32 {
        let start = self.pos();
        self.data.extend_from_slice(bytes);
        start
    }

    fn write_opcode(&mut self, opcode: u32) {
        self.data.extend_from_slice(&opcode.to_ne_bytes());
    }

    /// Raw bytes.
    pub fn as_bytes(&self) -> &[u8] {
        &self.data
    }

    /// Reads the assignments recorded between `begin` and `end`.
    pub fn read(&self, begin: u32, end: u32) -> UniformReader<'_> {
        let end = (end as usize).min(self.data.len());
        let begin = (begin as usize).min(end);
        UniformReader {
            data: &self.data[begin..end],
            pos: 0,
        }
    }
}

/// Iterator over the assignments of a uniform range.
#[derive(Debug, Clone)]
pub struct UniformReader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for UniformReader<'a> {
    type Item = (UniformOpcode, UniformPayload<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        let raw = self.data.get(self.pos..self.pos + 4)?;
        let opcode = UniformOpcode::decode(u32::from_ne_bytes([raw[0], raw[1], raw[2], raw[3]]))?;
        self.pos += 4;
        if opcode.ty == UniformType::End {
            self.pos = self.data.len();
            return None;
        }
        if opcode.copy {
            let size = opcode.num as usize * opcode.ty.size() as usize;
            let value = self.data.get(self.pos..self.pos + size)?;
            self.pos += size;
            Some((opcode, UniformPayload::Inline(value)))
        } else {
            let raw = self.data.get(self.pos..self.pos + 2)?;
            self.pos += 2;
            let handle = UniformHandle::new(u16::from_ne_bytes([raw[0], raw[1]]));
            Some((opcode, UniformPayload::Handle(handle)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn opcode_packs_fields_at_documented_bits() {
        let op = UniformOpcode {
            ty: UniformType::Mat4,
            loc: 0xabcd,
            num: 3,
            copy: true,
        };
        let raw = op.encode();
        assert_eq!(raw >> 27, 4);
        assert_eq!((raw >> 11) & 0xffff, 0xabcd);
        assert_eq!((raw >> 1) & 0x3ff, 3);
        assert_eq!(raw & 1, 1);
        assert_eq!(UniformOpcode::decode(raw), Some(op));
    }

    #[test]
    fn oversized_arrays_are_capped_and_keep_the_stream_aligned() {
        let mut buffer = UniformBuffer::new();
        let values = vec![0x20u8; 1024 * 16];
        buffer.write_uniform(UniformType::Vec4, 7, &values, 1023);
        buffer.write_uniform(UniformType::Vec4, 8, &values, 1024);
        buffer.write_uniform(UniformType::Vec4, 9, &[1u8; 16], 1);
        let end = buffer.pos();
        buffer.finish();

        let ops: Vec<(u16, u16)> = buffer.read(0, end).map(|(op, _)| (op.loc, op.num)).collect();
        assert_eq!(ops, vec![(7, 1023), (8, 1023), (9, 1)]);
    }

    #[test]
    fn write_then_read_reproduces_stream() {
        let mut buffer = UniformBuffer::new();
        let color = [1.0f32, 0.5, 0.25, 1.0];
        let begin = buffer.pos();
        buffer.write_uniform(UniformType::Vec4, 2, bytemuck::cast_slice(&color), 1);
        buffer.write_uniform_handle(UniformType::Mat4, 5, UniformHandle::new(5), 1);
        let end = buffer.pos();
        buffer.finish();

        let items: Vec<_> = buffer.read(begin, end).collect();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].0.loc, 2);
        assert_eq!(items[0].1, UniformPayload::Inline(bytemuck::cast_slice(&color)));
        assert_eq!(items[1].1, UniformPayload::Handle(UniformHandle::new(5)));

        let all: Vec<_> = buffer.read(0, buffer.pos()).collect();
        assert_eq!(all, items, "End opcode stops the reader");
    }

    #[test]
    fn reset_rewinds_to_start() {
        let mut buffer = UniformBuffer::new();
        buffer.write_uniform(UniformType::Vec4, 0, &[0; 16], 1);
        let mark = buffer.pos();
        buffer.write_uniform(UniformType::Vec4, 1, &[0; 16], 1);
        buffer.reset(mark);
        assert_eq!(buffer.pos(), mark);
        assert_eq!(buffer.read(0, buffer.pos()).count(), 1);
    }

    #[test]
    fn short_values_are_zero_padded() {
        let mut buffer = UniformBuffer::new();
        buffer.write_uniform(UniformType::Vec4, 0, &[1, 2], 2);
        let (_, payload) = buffer.read(0, buffer.pos()).next().unwrap();
        match payload {
            UniformPayload::Inline(bytes) => {
                assert_eq!(bytes.len(), 32);
                assert_eq!(&bytes[..3], &[1, 2, 0]);
            }
            other => panic!("unexpected payload {other:?}"),
        }
    }
}
