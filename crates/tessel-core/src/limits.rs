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

//! Fixed capacities of every pool and per-frame array.

/// Number of views. Must be a power of two; the sort key stores `log2(MAX_VIEWS)` bits.
pub const MAX_VIEWS: usize = 256;
/// Render items (draws + dispatches) per frame.
pub const MAX_DRAW_CALLS: u32 = 65_535;
/// Blit items per frame.
pub const MAX_BLIT_ITEMS: u32 = 1024;
/// Matrices cached per frame.
pub const MAX_MATRIX_CACHE: u32 = MAX_DRAW_CALLS + 1;
/// Scissor rectangles cached per frame.
pub const MAX_RECT_CACHE: u32 = 4096;
/// Encoders alive at once, the default encoder included.
pub const MAX_ENCODERS: usize = 8;
/// Vertex streams per draw.
pub const MAX_VERTEX_STREAMS: usize = 4;
/// Texture/buffer binding slots per draw.
pub const MAX_TEXTURE_SAMPLERS: usize = 16;
/// Attachments per frame buffer.
pub const MAX_FRAME_BUFFER_ATTACHMENTS: usize = 8;
/// Clear colors in the palette.
pub const MAX_COLOR_PALETTE: usize = 16;
/// Screenshot requests per frame.
pub const MAX_SCREENSHOTS: usize = 4;

/// Static index buffers (dynamic parents included).
pub const MAX_INDEX_BUFFERS: u16 = 4096;
/// Static vertex buffers (dynamic parents, transient and indirect buffers included).
pub const MAX_VERTEX_BUFFERS: u16 = 4096;
/// Registered vertex layouts.
pub const MAX_VERTEX_LAYOUTS: u16 = 64;
/// Dynamic index buffers.
pub const MAX_DYNAMIC_INDEX_BUFFERS: u16 = 4096;
/// Dynamic vertex buffers.
pub const MAX_DYNAMIC_VERTEX_BUFFERS: u16 = 4096;
/// Shaders.
pub const MAX_SHADERS: u16 = 512;
/// Programs. The sort key stores `log2(MAX_PROGRAMS)` bits of program index.
pub const MAX_PROGRAMS: u16 = 512;
/// Textures.
pub const MAX_TEXTURES: u16 = 4096;
/// Frame buffers.
pub const MAX_FRAME_BUFFERS: u16 = 128;
/// Uniforms.
pub const MAX_UNIFORMS: u16 = 512;
/// Occlusion queries.
pub const MAX_OCCLUSION_QUERIES: u16 = 256;
/// Meshes.
pub const MAX_MESHES: u16 = 512;
/// Component blobs.
pub const MAX_COMPONENTS: u16 = 16_384;
/// Entities.
pub const MAX_ENTITIES: u16 = 4096;
/// Physics bodies.
pub const MAX_BODIES: u16 = 4096;
/// Materials.
pub const MAX_MATERIALS: u16 = 512;
/// Components a single entity may reference.
pub const MAX_COMPONENTS_PER_ENTITY: u16 = 16;

/// Minimum size of a parent buffer used for dynamic index ranges.
pub const DYNAMIC_INDEX_BUFFER_SIZE: u32 = 1 << 20;
/// Minimum size of a parent buffer used for dynamic vertex ranges.
pub const DYNAMIC_VERTEX_BUFFER_SIZE: u32 = 3 << 20;
/// Parent buffers are rounded up to this granularity.
pub const DYNAMIC_BUFFER_GRANULARITY: u32 = 1 << 20;
/// Default transient vertex buffer capacity in bytes.
pub const TRANSIENT_VERTEX_BUFFER_SIZE: u32 = 6 << 20;
/// Default transient index buffer capacity in bytes.
pub const TRANSIENT_INDEX_BUFFER_SIZE: u32 = 2 << 20;
/// Capacity a command buffer is rewound to after every frame.
pub const MIN_RESOURCE_COMMAND_BUFFER_SIZE: usize = 64 << 10;
/// Initial uniform buffer capacity per encoder.
pub const UNIFORM_BUFFER_SIZE: usize = 1 << 20;
/// Largest uniform array; the uniform opcode stores the count in 10 bits.
pub const MAX_UNIFORM_ARRAY_SIZE: u16 = 1023;
/// Bytes per indirect draw/dispatch argument record.
pub const DRAW_INDIRECT_STRIDE: u32 = 32;

/// Sentinel stored in the occlusion result array while no result is known.
pub const OCCLUSION_NO_RESULT: i32 = i32::MIN;
