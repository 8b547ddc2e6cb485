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

//! Codecs for compressed mesh chunks. [`MeshoptCodec`] reads what the mesh
//! tools write; [`Lz4Codec`] is a general purpose alternative.

use tessel_core::error::ResourceError;

/// Compresses and decompresses the payload of `VBC`/`IBC` chunks.
///
/// The chunk framing (counts and compressed size) is handled by the reader and
/// writer; a codec only sees the payload.
pub trait MeshCodec: Send + Sync {
    /// Codec name, for diagnostics.
    fn name(&self) -> &'static str;

    /// Compresses `num_vertices` vertices of `stride` bytes.
    fn encode_vertices(&self, vertices: &[u8], stride: u16) -> Result<Vec<u8>, ResourceError>;

    /// Decompresses exactly `num_vertices * stride` bytes.
    fn decode_vertices(&self, data: &[u8], num_vertices: u16, stride: u16) -> Result<Vec<u8>, ResourceError>;

    /// Compresses a 16-bit index list.
    fn encode_indices(&self, indices: &[u16]) -> Result<Vec<u8>, ResourceError>;

    /// Decompresses exactly `num_indices` indices.
    fn decode_indices(&self, data: &[u8], num_indices: u32) -> Result<Vec<u16>, ResourceError>;
}

/// Largest vertex the meshopt vertex codec accepts.
const MESHOPT_MAX_STRIDE: u16 = 256;

/// meshoptimizer vertex and index buffer compression, the encoding of `VBC` and
/// `IBC` chunks written by the mesh tools.
///
/// Vertex strides must be a multiple of 4 up to 256 bytes, and index lists must
/// hold whole triangles.
#[derive(Debug, Default, Clone, Copy)]
pub struct MeshoptCodec;

impl MeshoptCodec {
    fn check_stride(stride: u16) -> Result<(), ResourceError> {
        if stride == 0 || stride % 4 != 0 || stride > MESHOPT_MAX_STRIDE {
            return Err(ResourceError::Decode(format!(
                "meshopt: vertex stride {stride} is not a multiple of 4 in 4..={MESHOPT_MAX_STRIDE}"
            )));
        }
        Ok(())
    }

    fn check_triangles(num_indices: usize) -> Result<(), ResourceError> {
        if num_indices % 3 != 0 {
            return Err(ResourceError::Decode(format!(
                "meshopt: {num_indices} indices do not form triangles"
            )));
        }
        Ok(())
    }
}

impl MeshCodec for MeshoptCodec {
    fn name(&self) -> &'static str {
        "meshopt"
    }

    fn encode_vertices(&self, vertices: &[u8], stride: u16) -> Result<Vec<u8>, ResourceError> {
        Self::check_stride(stride)?;
        let stride = stride as usize;
        if vertices.len() % stride != 0 {
            return Err(ResourceError::Decode(format!(
                "meshopt: {} bytes are not whole {stride} byte vertices",
                vertices.len()
            )));
        }
        let count = vertices.len() / stride;
        // SAFETY: `out` holds the bound computed for `count * stride` input
        // bytes and `vertices` holds exactly that many.
        let packed = unsafe {
            let bound = meshopt::ffi::meshopt_encodeVertexBufferBound(count, stride);
            let mut out = vec![0u8; bound];
            let written = meshopt::ffi::meshopt_encodeVertexBuffer(
                out.as_mut_ptr(),
                out.len(),
                vertices.as_ptr().cast(),
                count,
                stride,
            );
            out.truncate(written);
            out
        };
        if packed.is_empty() {
            return Err(ResourceError::Decode("meshopt: vertex encoding failed".into()));
        }
        Ok(packed)
    }

    fn decode_vertices(&self, data: &[u8], num_vertices: u16, stride: u16) -> Result<Vec<u8>, ResourceError> {
        Self::check_stride(stride)?;
        let mut out = vec![0u8; num_vertices as usize * stride as usize];
        // SAFETY: `out` holds `num_vertices * stride` bytes; the decoder reads at
        // most `data.len()` bytes and reports malformed input through its result.
        let result = unsafe {
            meshopt::ffi::meshopt_decodeVertexBuffer(
                out.as_mut_ptr().cast(),
                num_vertices as usize,
                stride as usize,
                data.as_ptr(),
                data.len(),
            )
        };
        if result != 0 {
            return Err(ResourceError::Decode(format!("meshopt: vertex decoding failed ({result})")));
        }
        Ok(out)
    }

    fn encode_indices(&self, indices: &[u16]) -> Result<Vec<u8>, ResourceError> {
        Self::check_triangles(indices.len())?;
        let wide: Vec<u32> = indices.iter().map(|&i| u32::from(i)).collect();
        let num_vertices = wide.iter().max().map_or(0, |&max| max as usize + 1);
        meshopt::encode_index_buffer(&wide, num_vertices).map_err(|e| ResourceError::Decode(format!("meshopt: {e}")))
    }

    fn decode_indices(&self, data: &[u8], num_indices: u32) -> Result<Vec<u16>, ResourceError> {
        Self::check_triangles(num_indices as usize)?;
        meshopt::decode_index_buffer::<u16>(data, num_indices as usize)
            .map_err(|e| ResourceError::Decode(format!("meshopt: {e}")))
    }
}

/// LZ4 block compression of the raw payload.
#[derive(Debug, Default, Clone, Copy)]
pub struct Lz4Codec;

impl Lz4Codec {
    fn decompress(data: &[u8], expected: usize) -> Result<Vec<u8>, ResourceError> {
        let out = lz4_flex::block::decompress(data, expected)
            .map_err(|e| ResourceError::Decode(format!("lz4: {e}")))?;
        if out.len() != expected {
            return Err(ResourceError::Decode(format!(
                "lz4: expected {expected} bytes, got {}",
                out.len()
            )));
        }
        Ok(out)
    }
}

impl MeshCodec for Lz4Codec {
    fn name(&self) -> &'static str {
        "lz4"
    }

    fn encode_vertices(&self, vertices: &[u8], _stride: u16) -> Result<Vec<u8>, ResourceError> {
        Ok(lz4_flex::block::compress(vertices))
    }

    fn decode_vertices(&self, data: &[u8], num_vertices: u16, stride: u16) -> Result<Vec<u8>, ResourceError> {
        Self::decompress(data, num_vertices as usize * stride as usize)
    }

    fn encode_indices(&self, indices: &[u16]) -> Result<Vec<u8>, ResourceError> {
        let bytes: Vec<u8> = indices.iter().flat_map(|i| i.to_le_bytes()).collect();
        Ok(lz4_flex::block::compress(&bytes))
    }

    fn decode_indices(&self, data: &[u8], num_indices: u32) -> Result<Vec<u16>, ResourceError> {
        let bytes = Self::decompress(data, num_indices as usize * 2)?;
        Ok(bytes
            .chunks_exact(2)
            .map(|c| u16::from_le_bytes([c[0], c[1]]))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn meshopt_restores_vertices_and_indices() {
        let vertices: Vec<u8> = (0..64u32).flat_map(|i| (i as f32).to_le_bytes()).collect();
        let packed = MeshoptCodec.encode_vertices(&vertices, 16).unwrap();
        assert_eq!(MeshoptCodec.decode_vertices(&packed, 16, 16).unwrap(), vertices);

        let indices: Vec<u16> = vec![0, 1, 2, 2, 1, 3, 3, 1, 4];
        let packed = MeshoptCodec.encode_indices(&indices).unwrap();
        assert_eq!(MeshoptCodec.decode_indices(&packed, 9).unwrap(), indices);
    }

    #[test]
    fn meshopt_rejects_what_it_cannot_encode() {
        assert!(matches!(
            MeshoptCodec.encode_vertices(&[0u8; 12], 6),
            Err(ResourceError::Decode(_))
        ));
        assert!(MeshoptCodec.encode_indices(&[0, 1]).is_err(), "not a triangle list");
        assert!(MeshoptCodec.decode_vertices(b"garbage", 4, 16).is_err());
    }

    #[test]
    fn lz4_restores_indices() {
        let indices: Vec<u16> = (0..300).map(|i| i % 17).collect();
        let packed = Lz4Codec.encode_indices(&indices).unwrap();
        assert!(packed.len() < indices.len() * 2, "repetitive data must shrink");
        assert_eq!(Lz4Codec.decode_indices(&packed, 300).unwrap(), indices);
    }

    #[test]
    fn wrong_expected_size_is_a_decode_error() {
        let packed = Lz4Codec.encode_vertices(&[7u8; 64], 16).unwrap();
        assert!(matches!(
            Lz4Codec.decode_vertices(&packed, 5, 16),
            Err(ResourceError::Decode(_))
        ));
    }
}
