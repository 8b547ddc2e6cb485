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

//! Opaque 16-bit resource handles.
//!
//! Every resource kind gets its own newtype so that a texture handle can never be
//! passed where a program is expected. The raw index is `Pod`, which lets handles be
//! written verbatim into command buffers and per-frame arrays. [`INVALID_HANDLE`]
//! (`0xFFFF`) marks an empty slot in that POD data; the public API reports failures
//! through `Result` instead.

use bytemuck::{Pod, Zeroable};
use std::fmt;

/// The raw index reserved for "no resource".
pub const INVALID_HANDLE: u16 = u16::MAX;

/// Every kind of resource that owns a handle pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum HandleKind {
    /// Static index buffer.
    IndexBuffer,
    /// Static vertex buffer.
    VertexBuffer,
    /// Deduplicated vertex layout.
    VertexLayout,
    /// Sub-allocated index buffer range.
    DynamicIndexBuffer,
    /// Sub-allocated vertex buffer range.
    DynamicVertexBuffer,
    /// Buffer holding indirect draw/dispatch arguments.
    IndirectBuffer,
    /// Shader module.
    Shader,
    /// Linked vertex+fragment or compute program.
    Program,
    /// Texture.
    Texture,
    /// Frame buffer (texture attachments or native window).
    FrameBuffer,
    /// Named uniform.
    Uniform,
    /// GPU visibility counter.
    OcclusionQuery,
    /// Mesh made of vertex/index buffer groups.
    Mesh,
    /// Typeless component blob.
    Component,
    /// Entity owning a component map.
    Entity,
    /// Physics body.
    Body,
    /// Material (program + uniform values + textures).
    Material,
}

impl HandleKind {
    /// All kinds, in declaration order.
    pub const ALL: [HandleKind; 17] = [
        HandleKind::IndexBuffer,
        HandleKind::VertexBuffer,
        HandleKind::VertexLayout,
        HandleKind::DynamicIndexBuffer,
        HandleKind::DynamicVertexBuffer,
        HandleKind::IndirectBuffer,
        HandleKind::Shader,
        HandleKind::Program,
        HandleKind::Texture,
        HandleKind::FrameBuffer,
        HandleKind::Uniform,
        HandleKind::OcclusionQuery,
        HandleKind::Mesh,
        HandleKind::Component,
        HandleKind::Entity,
        HandleKind::Body,
        HandleKind::Material,
    ];

    /// Human readable name, used by traces and the leak report.
    pub const fn name(self) -> &'static str {
        match self {
            HandleKind::IndexBuffer => "IndexBuffer",
            HandleKind::VertexBuffer => "VertexBuffer",
            HandleKind::VertexLayout => "VertexLayout",
            HandleKind::DynamicIndexBuffer => "DynamicIndexBuffer",
            HandleKind::DynamicVertexBuffer => "DynamicVertexBuffer",
            HandleKind::IndirectBuffer => "IndirectBuffer",
            HandleKind::Shader => "Shader",
            HandleKind::Program => "Program",
            HandleKind::Texture => "Texture",
            HandleKind::FrameBuffer => "FrameBuffer",
            HandleKind::Uniform => "Uniform",
            HandleKind::OcclusionQuery => "OcclusionQuery",
            HandleKind::Mesh => "Mesh",
            HandleKind::Component => "Component",
            HandleKind::Entity => "Entity",
            HandleKind::Body => "Body",
            HandleKind::Material => "Material",
        }
    }

    /// Decodes a kind from its `repr(u8)` value.
    pub fn from_u8(value: u8) -> Option<Self> {
        Self::ALL.get(value as usize).copied()
    }
}

impl fmt::Display for HandleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Declares a typed handle newtype.
macro_rules! define_handle {
    ($(#[$attr:meta])* $name:ident => $kind:ident) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Pod, Zeroable)]
        #[repr(transparent)]
        pub struct $name(pub u16);

        impl $name {
            /// The empty handle.
            pub const INVALID: Self = Self(INVALID_HANDLE);
            /// The resource kind this handle refers to.
            pub const KIND: HandleKind = HandleKind::$kind;

            /// Wraps a raw pool index.
            #[inline]
            pub const fn new(idx: u16) -> Self {
                Self(idx)
            }

            /// The raw pool index.
            #[inline]
            pub const fn idx(self) -> u16 {
                self.0
            }

            /// `true` unless this is [`Self::INVALID`].
            #[inline]
            pub const fn is_valid(self) -> bool {
                self.0 != INVALID_HANDLE
            }
        }

        impl Default for $name {
            fn default() -> Self {
                Self::INVALID
            }
        }

        impl fmt::Debug for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                if self.is_valid() {
                    write!(f, "{}({})", stringify!($name), self.0)
                } else {
                    write!(f, "{}(INVALID)", stringify!($name))
                }
            }
        }

        impl From<$name> for AnyHandle {
            fn from(handle: $name) -> Self {
                AnyHandle {
                    kind: HandleKind::$kind,
                    idx: handle.0,
                }
            }
        }
    };
}

define_handle!(
    /// Handle to a static index buffer.
    IndexBufferHandle => IndexBuffer
);
define_handle!(
    /// Handle to a static vertex buffer.
    VertexBufferHandle => VertexBuffer
);
define_handle!(
    /// Handle to a registered vertex layout.
    VertexLayoutHandle => VertexLayout
);
define_handle!(
    /// Handle to a dynamic index buffer range.
    DynamicIndexBufferHandle => DynamicIndexBuffer
);
define_handle!(
    /// Handle to a dynamic vertex buffer range.
    DynamicVertexBufferHandle => DynamicVertexBuffer
);
define_handle!(
    /// Handle to an indirect argument buffer. Shares the vertex buffer pool.
    IndirectBufferHandle => IndirectBuffer
);
define_handle!(
    /// Handle to a shader module.
    ShaderHandle => Shader
);
define_handle!(
    /// Handle to a program.
    ProgramHandle => Program
);
define_handle!(
    /// Handle to a texture.
    TextureHandle => Texture
);
define_handle!(
    /// Handle to a frame buffer.
    FrameBufferHandle => FrameBuffer
);
define_handle!(
    /// Handle to a named uniform.
    UniformHandle => Uniform
);
define_handle!(
    /// Handle to an occlusion query.
    OcclusionQueryHandle => OcclusionQuery
);
define_handle!(
    /// Handle to a mesh.
    MeshHandle => Mesh
);
define_handle!(
    /// Handle to a component blob.
    ComponentHandle => Component
);
define_handle!(
    /// Handle to an entity.
    EntityHandle => Entity
);
define_handle!(
    /// Handle to a physics body.
    BodyHandle => Body
);
define_handle!(
    /// Handle to a material.
    MaterialHandle => Material
);

impl IndirectBufferHandle {
    /// The vertex buffer slot backing this indirect buffer.
    pub const fn as_vertex_buffer(self) -> VertexBufferHandle {
        VertexBufferHandle(self.0)
    }
}

/// A handle with its kind erased. Equality is by `(kind, idx)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct AnyHandle {
    /// Resource kind.
    pub kind: HandleKind,
    /// Raw pool index.
    pub idx: u16,
}

impl AnyHandle {
    /// `true` unless the index is [`INVALID_HANDLE`].
    pub const fn is_valid(&self) -> bool {
        self.idx != INVALID_HANDLE
    }
}

/// Identifies a view (render pass). Views are plain indices, not pooled resources.
pub type ViewId = u16;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_handle_is_invalid() {
        assert!(!TextureHandle::default().is_valid());
        assert_eq!(ProgramHandle::INVALID.idx(), INVALID_HANDLE);
        assert!(ProgramHandle::new(0).is_valid());
    }

    #[test]
    fn erased_handles_compare_by_kind_and_index() {
        let a: AnyHandle = IndexBufferHandle(3).into();
        let b: AnyHandle = VertexBufferHandle(3).into();
        let c: AnyHandle = IndexBufferHandle(3).into();
        assert_ne!(a, b, "same index, different kind must differ");
        assert_eq!(a, c);
    }

    #[test]
    fn kind_round_trips_through_u8() {
        for kind in HandleKind::ALL {
            assert_eq!(HandleKind::from_u8(kind as u8), Some(kind));
        }
        assert_eq!(HandleKind::from_u8(200), None);
    }

    #[test]
    fn debug_format_marks_invalid() {
        assert_eq!(format!("{:?}", MeshHandle(7)), "MeshHandle(7)");
        assert_eq!(format!("{:?}", MeshHandle::INVALID), "MeshHandle(INVALID)");
    }
}
