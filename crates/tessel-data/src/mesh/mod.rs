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

//! Mesh chunk format.
//!
//! A mesh file is a sequence of chunks, each introduced by a four byte magic:
//! three identifying bytes and a version byte. `VB`/`VBC` open a group with its
//! bounds, layout and vertices, `IB`/`IBC` attach indices, `PRI` names the
//! material and primitives and closes the group. Readers ignore the version byte.

mod codec;
mod reader;
mod writer;

pub use codec::{Lz4Codec, MeshCodec, MeshoptCodec};
pub use reader::{load_mesh, read_layout, read_mesh};
pub use writer::{save_mesh, write_layout, write_mesh};

use tessel_core::error::ResourceError;
use tessel_core::math::{Aabb, Obb, Sphere};
use tessel_core::renderer::VertexLayout;
use thiserror::Error;

const fn fourcc(a: u8, b: u8, c: u8, version: u8) -> u32 {
    a as u32 | (b as u32) << 8 | (c as u32) << 16 | (version as u32) << 24
}

/// Uncompressed vertex chunk.
pub const CHUNK_MAGIC_VB: u32 = fourcc(b'V', b'B', b' ', 0x01);
/// Compressed vertex chunk.
pub const CHUNK_MAGIC_VBC: u32 = fourcc(b'V', b'B', b'C', 0x00);
/// Uncompressed index chunk.
pub const CHUNK_MAGIC_IB: u32 = fourcc(b'I', b'B', b' ', 0x00);
/// Compressed index chunk.
pub const CHUNK_MAGIC_IBC: u32 = fourcc(b'I', b'B', b'C', 0x01);
/// Primitive chunk.
pub const CHUNK_MAGIC_PRI: u32 = fourcc(b'P', b'R', b'I', 0x00);

/// Identifying part of a magic, without the version byte.
#[inline]
pub(crate) const fn chunk_id(magic: u32) -> u32 {
    magic & 0x00ff_ffff
}

/// How a group payload is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChunkEncoding {
    /// Raw bytes.
    #[default]
    Raw,
    /// Passed through a [`MeshCodec`].
    Compressed,
}

/// A named index range of a group.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Primitive {
    /// Name.
    pub name: String,
    /// First index.
    pub start_index: u32,
    /// Index count.
    pub num_indices: u32,
    /// First vertex.
    pub start_vertex: u32,
    /// Vertex count.
    pub num_vertices: u32,
    /// Bounding sphere.
    pub sphere: Sphere,
    /// Bounding box.
    pub aabb: Aabb,
    /// Oriented bounding box.
    pub obb: Obb,
}

/// One vertex/index buffer pair and its primitives.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct MeshGroup {
    /// Bounding sphere.
    pub sphere: Sphere,
    /// Bounding box.
    pub aabb: Aabb,
    /// Oriented bounding box.
    pub obb: Obb,
    /// Vertex layout.
    pub layout: VertexLayout,
    /// Vertex count.
    pub num_vertices: u16,
    /// `num_vertices * layout.stride()` bytes.
    pub vertices: Vec<u8>,
    /// 16-bit indices.
    pub indices: Vec<u16>,
    /// Material name.
    pub material: String,
    /// Primitives.
    pub primitives: Vec<Primitive>,
    /// Chunk used for the vertices.
    pub vertex_encoding: ChunkEncoding,
    /// Chunk used for the indices.
    pub index_encoding: ChunkEncoding,
}

/// A decoded mesh file.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Mesh {
    /// Groups in file order.
    pub groups: Vec<MeshGroup>,
}

impl Mesh {
    /// Layout of the first group.
    pub fn layout(&self) -> Option<&VertexLayout> {
        self.groups.first().map(|g| &g.layout)
    }

    /// Vertex count over every group.
    pub fn num_vertices(&self) -> u32 {
        self.groups.iter().map(|g| g.num_vertices as u32).sum()
    }

    /// Index count over every group.
    pub fn num_indices(&self) -> u32 {
        self.groups.iter().map(|g| g.indices.len() as u32).sum()
    }

    /// Box around every group.
    pub fn aabb(&self) -> Aabb {
        Aabb::from_points(self.groups.iter().flat_map(|g| [g.aabb.min, g.aabb.max]))
    }
}

/// Failure to load or save a mesh file.
#[derive(Debug, Error)]
pub enum MeshFileError {
    /// The file could not be read or written.
    #[error("Mesh file I/O failed: {0}")]
    Io(#[from] std::io::Error),
    /// The contents are not a valid mesh.
    #[error(transparent)]
    Format(#[from] ResourceError),
}
