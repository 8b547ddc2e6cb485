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

//! Mesh chunk encoding.

use super::{
    ChunkEncoding, Mesh, MeshCodec, MeshFileError, MeshGroup, Primitive, CHUNK_MAGIC_IB, CHUNK_MAGIC_IBC,
    CHUNK_MAGIC_PRI, CHUNK_MAGIC_VB, CHUNK_MAGIC_VBC,
};
use std::path::Path;
use tessel_core::error::ResourceError;
use tessel_core::math::{Aabb, Obb, Sphere};
use tessel_core::renderer::VertexLayout;
use tessel_core::utils::reader::ByteWriter;

/// Appends the serialized form of `layout`.
pub fn write_layout(out: &mut Vec<u8>, layout: &VertexLayout) {
    let attributes: Vec<_> = layout.attributes().collect();
    out.put_u8(attributes.len() as u8);
    out.put_u16(layout.stride());
    for (attrib, desc) in attributes {
        out.put_u16(layout.offset(attrib));
        out.put_u16(attrib.id());
        out.put_u8(desc.num);
        out.put_u16(desc.ty.id());
        out.put_u8(desc.normalized as u8);
        out.put_u8(desc.as_int as u8);
    }
}

fn write_bounds(out: &mut Vec<u8>, sphere: &Sphere, aabb: &Aabb, obb: &Obb) {
    out.put_pod(sphere);
    out.put_pod(aabb);
    out.put_pod(obb);
}

fn write_str(out: &mut Vec<u8>, value: &str) -> Result<(), ResourceError> {
    let len = u16::try_from(value.len())
        .map_err(|_| ResourceError::invalid_parameter(format!("mesh string of {} bytes", value.len())))?;
    out.put_u16(len);
    out.extend_from_slice(value.as_bytes());
    Ok(())
}

fn write_primitive(out: &mut Vec<u8>, prim: &Primitive) -> Result<(), ResourceError> {
    write_str(out, &prim.name)?;
    out.put_u32(prim.start_index);
    out.put_u32(prim.num_indices);
    out.put_u32(prim.start_vertex);
    out.put_u32(prim.num_vertices);
    write_bounds(out, &prim.sphere, &prim.aabb, &prim.obb);
    Ok(())
}

fn write_group(out: &mut Vec<u8>, group: &MeshGroup, codec: &dyn MeshCodec) -> Result<(), ResourceError> {
    let expected = group.num_vertices as usize * group.layout.stride() as usize;
    if group.vertices.len() != expected {
        return Err(ResourceError::invalid_parameter(format!(
            "group has {} vertex bytes, layout expects {expected}",
            group.vertices.len()
        )));
    }

    let compressed_vertices = group.vertex_encoding == ChunkEncoding::Compressed;
    out.put_u32(if compressed_vertices { CHUNK_MAGIC_VBC } else { CHUNK_MAGIC_VB });
    write_bounds(out, &group.sphere, &group.aabb, &group.obb);
    write_layout(out, &group.layout);
    out.put_u16(group.num_vertices);
    if compressed_vertices {
        let packed = codec.encode_vertices(&group.vertices, group.layout.stride())?;
        out.put_u32(packed.len() as u32);
        out.extend_from_slice(&packed);
    } else {
        out.extend_from_slice(&group.vertices);
    }

    if !group.indices.is_empty() {
        match group.index_encoding {
            ChunkEncoding::Compressed => {
                let packed = codec.encode_indices(&group.indices)?;
                out.put_u32(CHUNK_MAGIC_IBC);
                out.put_u32(group.indices.len() as u32);
                out.put_u32(packed.len() as u32);
                out.extend_from_slice(&packed);
            }
            ChunkEncoding::Raw => {
                out.put_u32(CHUNK_MAGIC_IB);
                out.put_u32(group.indices.len() as u32);
                for &index in &group.indices {
                    out.put_u16(index);
                }
            }
        }
    }

    out.put_u32(CHUNK_MAGIC_PRI);
    write_str(out, &group.material)?;
    let num_prims = u16::try_from(group.primitives.len())
        .map_err(|_| ResourceError::invalid_parameter("more than 65535 primitives in a group"))?;
    out.put_u16(num_prims);
    for prim in &group.primitives {
        write_primitive(out, prim)?;
    }
    Ok(())
}

/// Encodes `mesh`. Each group is written with the encodings it records.
pub fn write_mesh(mesh: &Mesh, codec: &dyn MeshCodec) -> Result<Vec<u8>, ResourceError> {
    let mut out = Vec::new();
    for group in &mesh.groups {
        write_group(&mut out, group, codec)?;
    }
    Ok(out)
}

/// Encodes `mesh` into a file.
pub fn save_mesh(path: impl AsRef<Path>, mesh: &Mesh, codec: &dyn MeshCodec) -> Result<(), MeshFileError> {
    let data = write_mesh(mesh, codec)?;
    std::fs::write(path, data)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::super::*;
    use tessel_core::math::Vec3;
    use tessel_core::renderer::{Attrib, AttribType};
    use tessel_core::utils::reader::ByteReader;

    fn layout() -> VertexLayout {
        VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .add(Attrib::Color0, 4, AttribType::Uint8, true, false)
            .end()
    }

    fn quad(vertex_encoding: ChunkEncoding, index_encoding: ChunkEncoding) -> Mesh {
        let layout = layout();
        let mut vertices = Vec::new();
        for (x, y) in [(0.0f32, 0.0f32), (1.0, 0.0), (1.0, 1.0), (0.0, 1.0)] {
            vertices.extend_from_slice(bytemuck::bytes_of(&[x, y, 0.0f32]));
            vertices.extend_from_slice(&[255, 0, 0, 255]);
        }
        let aabb = Aabb {
            min: Vec3::ZERO,
            max: Vec3::new(1.0, 1.0, 0.0),
        };
        Mesh {
            groups: vec![MeshGroup {
                sphere: Sphere {
                    center: Vec3::new(0.5, 0.5, 0.0),
                    radius: 0.75,
                },
                aabb,
                obb: Obb::from(aabb),
                layout,
                num_vertices: 4,
                vertices,
                indices: vec![0, 1, 2, 0, 2, 3],
                material: "default".into(),
                primitives: vec![Primitive {
                    name: "quad".into(),
                    start_index: 0,
                    num_indices: 6,
                    start_vertex: 0,
                    num_vertices: 4,
                    sphere: Sphere::default(),
                    aabb,
                    obb: Obb::from(aabb),
                }],
                vertex_encoding,
                index_encoding,
            }],
        }
    }

    #[test]
    fn layout_survives_serialization() {
        let layout = layout();
        let mut bytes = Vec::new();
        write_layout(&mut bytes, &layout);
        assert_eq!(bytes.len(), 3 + 2 * 9);
        let decoded = read_layout(&mut ByteReader::new(&bytes)).unwrap();
        assert_eq!(decoded, layout);
        assert_eq!(decoded.hash(), layout.hash());
    }

    #[test]
    fn raw_mesh_reencodes_byte_for_byte() {
        let mesh = quad(ChunkEncoding::Raw, ChunkEncoding::Raw);
        let first = write_mesh(&mesh, &Lz4Codec).unwrap();
        let decoded = read_mesh(&first, &Lz4Codec).unwrap();
        assert_eq!(decoded, mesh);
        assert_eq!(write_mesh(&decoded, &Lz4Codec).unwrap(), first);
        assert_eq!(&first[..4], b"VB \x01");
    }

    #[test]
    fn compressed_chunks_restore_payload() {
        let mesh = quad(ChunkEncoding::Compressed, ChunkEncoding::Compressed);
        let bytes = write_mesh(&mesh, &Lz4Codec).unwrap();
        assert_eq!(&bytes[..4], b"VBC\x00");
        let decoded = read_mesh(&bytes, &Lz4Codec).unwrap();
        assert_eq!(decoded.groups[0].vertices, mesh.groups[0].vertices);
        assert_eq!(decoded.groups[0].indices, mesh.groups[0].indices);
        assert_eq!(decoded.groups[0].index_encoding, ChunkEncoding::Compressed);
    }

    #[test]
    fn meshopt_chunks_survive_read_write_read() {
        let mesh = quad(ChunkEncoding::Compressed, ChunkEncoding::Compressed);
        let bytes = write_mesh(&mesh, &MeshoptCodec).unwrap();
        assert_eq!(&bytes[..4], b"VBC\x00");
        let first = read_mesh(&bytes, &MeshoptCodec).unwrap();
        let second = read_mesh(&write_mesh(&first, &MeshoptCodec).unwrap(), &MeshoptCodec).unwrap();
        assert_eq!(first, mesh);
        assert_eq!(second, first);
    }

    #[test]
    fn version_byte_is_ignored() {
        let mesh = quad(ChunkEncoding::Raw, ChunkEncoding::Raw);
        let mut bytes = write_mesh(&mesh, &Lz4Codec).unwrap();
        bytes[3] = 0x00;
        assert_eq!(read_mesh(&bytes, &Lz4Codec).unwrap(), mesh);
    }

    #[test]
    fn truncated_and_unknown_chunks_fail() {
        let mesh = quad(ChunkEncoding::Raw, ChunkEncoding::Raw);
        let bytes = write_mesh(&mesh, &Lz4Codec).unwrap();
        assert!(matches!(
            read_mesh(&bytes[..bytes.len() - 3], &Lz4Codec),
            Err(ResourceError::Decode(_))
        ));
        assert!(matches!(
            read_mesh(b"XYZ\x00", &Lz4Codec),
            Err(ResourceError::Decode(_))
        ));
    }

    #[test]
    fn file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quad.bin");
        let mesh = quad(ChunkEncoding::Raw, ChunkEncoding::Compressed);
        save_mesh(&path, &mesh, &Lz4Codec).unwrap();
        let loaded = load_mesh(&path, &Lz4Codec).unwrap();
        assert_eq!(loaded, mesh);
        assert_eq!(loaded.num_indices(), 6);
        assert_eq!(loaded.aabb(), mesh.groups[0].aabb);
    }

    #[test]
    fn missing_file_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            load_mesh(dir.path().join("missing.bin"), &Lz4Codec),
            Err(MeshFileError::Io(_))
        ));
    }
}
