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

//! Vertex layout description.
//!
//! A layout is built with [`VertexLayout::begin`], a sequence of [`add`](VertexLayout::add)
//! and [`skip`](VertexLayout::skip) calls, and [`end`](VertexLayout::end), which seals
//! the stride and computes the identity hash used to deduplicate registered layouts.

use crate::hash::Murmur2A;

/// Vertex attribute semantic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Attrib {
    /// Position.
    Position,
    /// Normal.
    Normal,
    /// Tangent.
    Tangent,
    /// Bitangent.
    Bitangent,
    /// Color 0.
    Color0,
    /// Color 1.
    Color1,
    /// Color 2.
    Color2,
    /// Color 3.
    Color3,
    /// Skinning indices.
    Indices,
    /// Skinning weights.
    Weight,
    /// Texture coordinates 0.
    TexCoord0,
    /// Texture coordinates 1.
    TexCoord1,
    /// Texture coordinates 2.
    TexCoord2,
    /// Texture coordinates 3.
    TexCoord3,
    /// Texture coordinates 4.
    TexCoord4,
    /// Texture coordinates 5.
    TexCoord5,
    /// Texture coordinates 6.
    TexCoord6,
    /// Texture coordinates 7.
    TexCoord7,
}

/// Number of attribute semantics.
pub const ATTRIB_COUNT: usize = 18;

impl Attrib {
    /// All attributes in declaration order.
    pub const ALL: [Attrib; ATTRIB_COUNT] = [
        Attrib::Position,
        Attrib::Normal,
        Attrib::Tangent,
        Attrib::Bitangent,
        Attrib::Color0,
        Attrib::Color1,
        Attrib::Color2,
        Attrib::Color3,
        Attrib::Indices,
        Attrib::Weight,
        Attrib::TexCoord0,
        Attrib::TexCoord1,
        Attrib::TexCoord2,
        Attrib::TexCoord3,
        Attrib::TexCoord4,
        Attrib::TexCoord5,
        Attrib::TexCoord6,
        Attrib::TexCoord7,
    ];

    /// Stable identifier used in serialized layouts.
    pub const fn id(self) -> u16 {
        match self {
            Attrib::Position => 0x0001,
            Attrib::Normal => 0x0002,
            Attrib::Tangent => 0x0003,
            Attrib::Bitangent => 0x0004,
            Attrib::Color0 => 0x0005,
            Attrib::Color1 => 0x0006,
            Attrib::Color2 => 0x0018,
            Attrib::Color3 => 0x0019,
            Attrib::Indices => 0x000e,
            Attrib::Weight => 0x000f,
            Attrib::TexCoord0 => 0x0010,
            Attrib::TexCoord1 => 0x0011,
            Attrib::TexCoord2 => 0x0012,
            Attrib::TexCoord3 => 0x0013,
            Attrib::TexCoord4 => 0x0014,
            Attrib::TexCoord5 => 0x0015,
            Attrib::TexCoord6 => 0x0016,
            Attrib::TexCoord7 => 0x0017,
        }
    }

    /// Inverse of [`Attrib::id`].
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|a| a.id() == id)
    }
}

/// Component type of an attribute.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum AttribType {
    /// `u8`.
    Uint8,
    /// Packed 10-10-10-2.
    Uint10,
    /// `i16`.
    Int16,
    /// `f16`.
    Half,
    /// `f32`.
    Float,
}

impl AttribType {
    const ALL: [AttribType; 5] = [
        AttribType::Uint8,
        AttribType::Uint10,
        AttribType::Int16,
        AttribType::Half,
        AttribType::Float,
    ];

    /// Stable identifier used in serialized layouts.
    pub const fn id(self) -> u16 {
        match self {
            AttribType::Uint8 => 0x0001,
            AttribType::Uint10 => 0x0005,
            AttribType::Int16 => 0x0002,
            AttribType::Half => 0x0003,
            AttribType::Float => 0x0004,
        }
    }

    /// Inverse of [`AttribType::id`].
    pub fn from_id(id: u16) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.id() == id)
    }

    /// Size in bytes of `num` components (1 to 4).
    pub const fn size(self, num: u8) -> u8 {
        const SIZES: [[u8; 4]; 5] = [
            [1, 2, 4, 4],
            [4, 4, 4, 4],
            [2, 4, 6, 8],
            [2, 4, 6, 8],
            [4, 8, 12, 16],
        ];
        let n = if num == 0 { 0 } else { (num - 1) & 3 };
        SIZES[self as usize][n as usize]
    }

    /// Only 8- and 16-bit integer types may be fetched as integers.
    const fn allows_as_int(self) -> bool {
        matches!(self, AttribType::Uint8 | AttribType::Int16)
    }
}

/// Decoded attribute description.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AttribDesc {
    /// Number of components (1 to 4).
    pub num: u8,
    /// Component type.
    pub ty: AttribType,
    /// Integer values are normalized to `[0, 1]`/`[-1, 1]`.
    pub normalized: bool,
    /// Fetched as integers in the shader.
    pub as_int: bool,
}

const UNUSED: u16 = u16::MAX;

/// Description of a vertex stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexLayout {
    hash: u32,
    stride: u16,
    offset: [u16; ATTRIB_COUNT],
    attributes: [u16; ATTRIB_COUNT],
}

impl Default for VertexLayout {
    fn default() -> Self {
        Self {
            hash: 0,
            stride: 0,
            offset: [0; ATTRIB_COUNT],
            attributes: [UNUSED; ATTRIB_COUNT],
        }
    }
}

impl VertexLayout {
    /// Starts a new layout.
    pub fn begin() -> Self {
        Self::default()
    }

    /// Appends an attribute at the current stride.
    #[must_use]
    pub fn add(mut self, attrib: Attrib, num: u8, ty: AttribType, normalized: bool, as_int: bool) -> Self {
        let num = num.clamp(1, 4);
        let encoded_norm = (normalized as u16) << 7;
        let encoded_type = (ty as u16 & 7) << 3;
        let encoded_num = (num as u16 - 1) & 3;
        let encoded_as_int = ((as_int && ty.allows_as_int()) as u16) << 8;
        self.attributes[attrib as usize] = encoded_norm | encoded_type | encoded_num | encoded_as_int;
        self.offset[attrib as usize] = self.stride;
        self.stride += ty.size(num) as u16;
        self
    }

    /// Leaves `bytes` of padding.
    #[must_use]
    pub fn skip(mut self, bytes: u8) -> Self {
        self.stride += bytes as u16;
        self
    }

    /// Seals the layout and computes its hash.
    #[must_use]
    pub fn end(mut self) -> Self {
        let mut hasher = Murmur2A::new(0);
        hasher
            .add_slice(&self.attributes)
            .add_slice(&self.offset)
            .add_pod(&self.stride);
        self.hash = hasher.finish();
        self
    }

    /// Overrides stride and offset of `attrib`, used when reading serialized layouts.
    pub fn set_offset(&mut self, attrib: Attrib, offset: u16) {
        self.offset[attrib as usize] = offset;
    }

    /// Overrides the stride, used when reading serialized layouts.
    pub fn set_stride(&mut self, stride: u16) {
        self.stride = stride;
    }

    /// Identity hash.
    pub fn hash(&self) -> u32 {
        self.hash
    }

    /// Bytes per vertex.
    pub fn stride(&self) -> u16 {
        self.stride
    }

    /// Byte offset of `attrib` inside a vertex.
    pub fn offset(&self, attrib: Attrib) -> u16 {
        self.offset[attrib as usize]
    }

    /// `true` if `attrib` is part of the layout.
    pub fn has(&self, attrib: Attrib) -> bool {
        self.attributes[attrib as usize] != UNUSED
    }

    /// Decoded description of `attrib`, if present.
    pub fn decode(&self, attrib: Attrib) -> Option<AttribDesc> {
        let value = self.attributes[attrib as usize];
        if value == UNUSED {
            return None;
        }
        let ty = AttribType::ALL.get(((value >> 3) & 7) as usize).copied()?;
        Some(AttribDesc {
            num: ((value & 3) + 1) as u8,
            ty,
            normalized: (value >> 7) & 1 == 1,
            as_int: (value >> 8) & 1 == 1,
        })
    }

    /// Attributes present, in declaration order.
    pub fn attributes(&self) -> impl Iterator<Item = (Attrib, AttribDesc)> + '_ {
        Attrib::ALL
            .iter()
            .filter_map(move |&a| self.decode(a).map(|d| (a, d)))
    }

    /// Bytes needed for `num` vertices.
    pub fn size(&self, num: u32) -> u32 {
        num * self.stride as u32
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pos_color_uv() -> VertexLayout {
        VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .add(Attrib::Color0, 4, AttribType::Uint8, true, false)
            .add(Attrib::TexCoord0, 2, AttribType::Half, false, false)
            .end()
    }

    #[test]
    fn stride_and_offsets_accumulate() {
        let layout = pos_color_uv();
        assert_eq!(layout.stride(), 12 + 4 + 4);
        assert_eq!(layout.offset(Attrib::Position), 0);
        assert_eq!(layout.offset(Attrib::Color0), 12);
        assert_eq!(layout.offset(Attrib::TexCoord0), 16);
        assert!(!layout.has(Attrib::Normal));
    }

    #[test]
    fn decode_recovers_attribute_description() {
        let layout = pos_color_uv();
        let color = layout.decode(Attrib::Color0).expect("color is present");
        assert_eq!(color.num, 4);
        assert_eq!(color.ty, AttribType::Uint8);
        assert!(color.normalized);
        assert!(!color.as_int);
        assert_eq!(layout.attributes().count(), 3);
    }

    #[test]
    fn as_int_is_ignored_for_float_types() {
        let layout = VertexLayout::begin()
            .add(Attrib::Indices, 4, AttribType::Float, false, true)
            .end();
        assert!(!layout.decode(Attrib::Indices).unwrap().as_int);
    }

    #[test]
    fn equal_layouts_share_a_hash() {
        assert_eq!(pos_color_uv().hash(), pos_color_uv().hash());
        let padded = VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .skip(4)
            .end();
        let unpadded = VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .end();
        assert_ne!(padded.hash(), unpadded.hash());
    }

    #[test]
    fn ids_round_trip() {
        for attrib in Attrib::ALL {
            assert_eq!(Attrib::from_id(attrib.id()), Some(attrib));
        }
        assert_eq!(AttribType::from_id(0x0005), Some(AttribType::Uint10));
        assert_eq!(AttribType::size(AttribType::Uint10, 3), 4);
    }
}
