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

//! Mesh chunk decoding.

use super::{
    chunk_id, ChunkEncoding, Mesh, MeshCodec, MeshFileError, MeshGroup, Primitive, CHUNK_MAGIC_IB,
    CHUNK_MAGIC_IBC, CHUNK_MAGIC_PRI, CHUNK_MAGIC_VB, CHUNK_MAGIC_VBC,
};
use std::path::Path;
use tessel_core::error::ResourceError;
use tessel_core::math::{Aabb, Obb, Sphere};
use tessel_core::renderer::{Attrib, AttribType, VertexLayout};
use tessel_core::utils::reader::ByteReader;

/// Reads a serialized vertex layout. Attributes or types this build does not
/// know are skipped.
pub fn read_layout(reader: &mut ByteReader<'_>) -> Result<VertexLayout, ResourceError> {
    let num_attrs = reader.u8()?;
    let stride = reader.u16()?;
    let mut layout = VertexLayout::begin();
    let mut offsets = Vec::with_capacity(num_attrs as usize);
    for _ in 0..num_attrs {
        let offset = reader.u16()?;
        let attrib_id = reader.u16()?;
        let num = reader.u8()?;
        let type_id = reader.u16()?;
        let normalized = reader.u8()? != 0;
        let as_int = reader.u8()? != 0;
        match (Attrib::from_id(attrib_id), AttribType::from_id(type_id)) {
            (Some(attrib), Some(ty)) => {
                layout = layout.add(attrib, num, ty, normalized, as_int);
                offsets.push((attrib, offset));
            }
            _ => log::debug!("Skipping unknown vertex attribute {attrib_id:#06x} of type {type_id:#06x}"),
        }
    }
    for (attrib, offset) in offsets {
        layout.set_offset(attrib, offset);
    }
    layout.set_stride(stride);
    Ok(layout.end())
}

fn read_bounds(reader: &mut ByteReader<'_>) -> Result<(Sphere, Aabb, Obb), ResourceError> {
    Ok((reader.pod()?, reader.pod()?, reader.pod()?))
}

fn read_vertex_header(reader: &mut ByteReader<'_>, group: &mut MeshGroup) -> Result<(), ResourceError> {
    let (sphere, aabb, obb) = read_bounds(reader)?;
    group.sphere = sphere;
    group.aabb = aabb;
    group.obb = obb;
    group.layout = read_layout(reader)?;
    group.num_vertices = reader.u16()?;
    Ok(())
}

fn read_indices(bytes: &[u8]) -> Vec<u16> {
    bytes
        .chunks_exact(2)
        .map(|c| u16::from_le_bytes([c[0], c[1]]))
        .collect()
}

fn read_primitives(reader: &mut ByteReader<'_>, group: &mut MeshGroup) -> Result<(), ResourceError> {
    let material_len = reader.u16()?;
    group.material = reader.string(material_len as usize)?;
    let num_prims = reader.u16()?;
    group.primitives.reserve(num_prims as usize);
    for _ in 0..num_prims {
        let name_len = reader.u16()?;
        let name = reader.string(name_len as usize)?;
        let start_index = reader.u32()?;
        let num_indices = reader.u32()?;
        let start_vertex = reader.u32()?;
        let num_vertices = reader.u32()?;
        let (sphere, aabb, obb) = read_bounds(reader)?;
        group.primitives.push(Primitive {
            name,
            start_index,
            num_indices,
            start_vertex,
            num_vertices,
            sphere,
            aabb,
            obb,
        });
    }
    Ok(())
}

/// Decodes a mesh file held in memory. Compressed chunks go through `codec`.
pub fn read_mesh(data: &[u8], codec: &dyn MeshCodec) -> Result<Mesh, ResourceError> {
    let mut reader = ByteReader::new(data);
    let mut mesh = Mesh::default();
    let mut group = MeshGroup::default();

    while !reader.is_empty() {
        let at = reader.position();
        let magic = reader.u32()?;
        match chunk_id(magic) {
            id if id == chunk_id(CHUNK_MAGIC_VB) => {
                read_vertex_header(&mut reader, &mut group)?;
                let size = group.num_vertices as usize * group.layout.stride() as usize;
                group.vertices = reader.bytes(size)?.to_vec();
                group.vertex_encoding = ChunkEncoding::Raw;
            }
            id if id == chunk_id(CHUNK_MAGIC_VBC) => {
                read_vertex_header(&mut reader, &mut group)?;
                let compressed_size = reader.u32()?;
                let compressed = reader.bytes(compressed_size as usize)?;
                group.vertices = codec.decode_vertices(compressed, group.num_vertices, group.layout.stride())?;
                group.vertex_encoding = ChunkEncoding::Compressed;
            }
            id if id == chunk_id(CHUNK_MAGIC_IB) => {
                let num_indices = reader.u32()?;
                group.indices = read_indices(reader.bytes(num_indices as usize * 2)?);
                group.index_encoding = ChunkEncoding::Raw;
            }
            id if id == chunk_id(CHUNK_MAGIC_IBC) => {
                let num_indices = reader.u32()?;
                let compressed_size = reader.u32()?;
                let compressed = reader.bytes(compressed_size as usize)?;
                group.indices = codec.decode_indices(compressed, num_indices)?;
                group.index_encoding = ChunkEncoding::Compressed;
            }
            id if id == chunk_id(CHUNK_MAGIC_PRI) => {
                read_primitives(&mut reader, &mut group)?;
                mesh.groups.push(std::mem::take(&mut group));
            }
            _ => {
                return Err(ResourceError::Decode(format!(
                    "unknown mesh chunk {magic:#010x} at offset {at}"
                )));
            }
        }
    }

    if !group.vertices.is_empty() {
        log::debug!("Mesh data ends with a group lacking primitives; keeping it");
        mesh.groups.push(group);
    }
    Ok(mesh)
}

/// Reads and decodes a mesh file.
pub fn load_mesh(path: impl AsRef<Path>, codec: &dyn MeshCodec) -> Result<Mesh, MeshFileError> {
    let data = std::fs::read(path)?;
    Ok(read_mesh(&data, codec)?)
}
