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

//! Shader container header.
//!
//! A shader binary is a packed little-endian container:
//!
//! ```text
//! u32 magic            'V','S','H',ver | 'F','S','H',ver | 'C','S','H',ver
//! u32 hash_in          interface hash of the stage inputs
//! u32 hash_out         interface hash of the stage outputs
//! u16 num_uniforms
//!   u8  name_len, name[name_len]
//!   u8  type           UniformType, 0x10 = fragment, 0x20 = sampler
//!   u8  num
//!   u16 reg_index
//!   u16 reg_count
//! u32 code_size, code[code_size]
//! ```
//!
//! The bytecode is opaque to the core and handed to the backend untouched.

use super::types::UniformType;
use crate::error::ResourceError;
use crate::utils::reader::{ByteReader, ByteWriter};

/// Container version written by [`ShaderBinary::encode`].
pub const SHADER_BIN_VERSION: u8 = 11;

/// Pipeline stage of a shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    /// Vertex shader.
    Vertex,
    /// Fragment shader.
    Fragment,
    /// Compute shader.
    Compute,
}

impl ShaderStage {
    const fn tag(self) -> [u8; 3] {
        match self {
            ShaderStage::Vertex => *b"VSH",
            ShaderStage::Fragment => *b"FSH",
            ShaderStage::Compute => *b"CSH",
        }
    }

    fn from_tag(tag: &[u8]) -> Option<Self> {
        match tag {
            b"VSH" => Some(ShaderStage::Vertex),
            b"FSH" => Some(ShaderStage::Fragment),
            b"CSH" => Some(ShaderStage::Compute),
            _ => None,
        }
    }
}

/// Uniform declared by a shader.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderUniform {
    /// Uniform name.
    pub name: String,
    /// Value type.
    pub ty: UniformType,
    /// Array size.
    pub num: u16,
    /// Register the backend binds it to.
    pub reg_index: u16,
    /// Registers used.
    pub reg_count: u16,
    /// Declared by a fragment shader.
    pub fragment: bool,
}

/// Parsed shader container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShaderBinary {
    /// Stage.
    pub stage: ShaderStage,
    /// Version byte of the magic.
    pub version: u8,
    /// Input interface hash.
    pub hash_in: u32,
    /// Output interface hash.
    pub hash_out: u32,
    /// Declared uniforms.
    pub uniforms: Vec<ShaderUniform>,
    /// Backend bytecode.
    pub code: Vec<u8>,
}

impl ShaderBinary {
    /// Parses a container.
    pub fn parse(data: &[u8]) -> Result<Self, ResourceError> {
        let mut reader = ByteReader::new(data);
        let magic = reader.bytes(4)?;
        let stage = ShaderStage::from_tag(&magic[..3]).ok_or_else(|| {
            ResourceError::Decode(format!("unknown shader magic {:02x?}", magic))
        })?;
        let version = magic[3];
        let hash_in = reader.u32()?;
        let hash_out = reader.u32()?;

        let num_uniforms = reader.u16()?;
        let mut uniforms = Vec::with_capacity(num_uniforms as usize);
        for _ in 0..num_uniforms {
            let name_len = reader.u8()? as usize;
            let name = reader.string(name_len)?;
            let raw_type = reader.u8()?;
            let ty = UniformType::from_u8(raw_type & 0x0f).ok_or_else(|| {
                ResourceError::Decode(format!("uniform '{name}' has unknown type {raw_type:#x}"))
            })?;
            let num = reader.u8()? as u16;
            let reg_index = reader.u16()?;
            let reg_count = reader.u16()?;
            uniforms.push(ShaderUniform {
                name,
                ty,
                num,
                reg_index,
                reg_count,
                fragment: raw_type & 0x10 != 0,
            });
        }

        let code_size = reader.u32()? as usize;
        let code = reader.bytes(code_size)?.to_vec();

        Ok(Self {
            stage,
            version,
            hash_in,
            hash_out,
            uniforms,
            code,
        })
    }

    /// Builds a container.
    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(16 + self.code.len());
        out.extend_from_slice(&self.stage.tag());
        out.put_u8(self.version);
        out.put_u32(self.hash_in);
        out.put_u32(self.hash_out);
        out.put_u16(self.uniforms.len() as u16);
        for uniform in &self.uniforms {
            let name = uniform.name.as_bytes();
            out.put_u8(name.len().min(255) as u8);
            out.extend_from_slice(&name[..name.len().min(255)]);
            let mut raw_type = uniform.ty as u8;
            if uniform.fragment {
                raw_type |= 0x10;
            }
            if uniform.ty == UniformType::Sampler {
                raw_type |= 0x20;
            }
            out.put_u8(raw_type);
            out.put_u8(uniform.num.min(255) as u8);
            out.put_u16(uniform.reg_index);
            out.put_u16(uniform.reg_count);
        }
        out.put_u32(self.code.len() as u32);
        out.extend_from_slice(&self.code);
        out
    }

    /// Convenience constructor for a container without uniforms.
    pub fn new(stage: ShaderStage, hash_in: u32, hash_out: u32, code: impl Into<Vec<u8>>) -> Self {
        Self {
            stage,
            version: SHADER_BIN_VERSION,
            hash_in,
            hash_out,
            uniforms: Vec::new(),
            code: code.into(),
        }
    }

    /// Adds a declared uniform.
    #[must_use]
    pub fn with_uniform(mut self, name: &str, ty: UniformType, num: u16) -> Self {
        let fragment = self.stage == ShaderStage::Fragment;
        self.uniforms.push(ShaderUniform {
            name: name.to_owned(),
            ty,
            num,
            reg_index: 0,
            reg_count: num,
            fragment,
        });
        self
    }
}

/// Uniforms filled by the core itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PredefinedUniform {
    /// View rectangle.
    ViewRect,
    /// 1 / view size.
    ViewTexel,
    /// View matrix.
    View,
    /// Inverse view matrix.
    InvView,
    /// Projection.
    Proj,
    /// Inverse projection.
    InvProj,
    /// View * projection.
    ViewProj,
    /// Inverse of view * projection.
    InvViewProj,
    /// Model matrices.
    Model,
    /// Model * view.
    ModelView,
    /// Model * view * projection.
    ModelViewProj,
    /// Alpha reference.
    AlphaRef,
}

impl PredefinedUniform {
    const ALL: [PredefinedUniform; 12] = [
        PredefinedUniform::ViewRect,
        PredefinedUniform::ViewTexel,
        PredefinedUniform::View,
        PredefinedUniform::InvView,
        PredefinedUniform::Proj,
        PredefinedUniform::InvProj,
        PredefinedUniform::ViewProj,
        PredefinedUniform::InvViewProj,
        PredefinedUniform::Model,
        PredefinedUniform::ModelView,
        PredefinedUniform::ModelViewProj,
        PredefinedUniform::AlphaRef,
    ];

    /// Shader-side name.
    pub const fn name(self) -> &'static str {
        match self {
            PredefinedUniform::ViewRect => "u_viewRect",
            PredefinedUniform::ViewTexel => "u_viewTexel",
            PredefinedUniform::View => "u_view",
            PredefinedUniform::InvView => "u_invView",
            PredefinedUniform::Proj => "u_proj",
            PredefinedUniform::InvProj => "u_invProj",
            PredefinedUniform::ViewProj => "u_viewProj",
            PredefinedUniform::InvViewProj => "u_invViewProj",
            PredefinedUniform::Model => "u_model",
            PredefinedUniform::ModelView => "u_modelView",
            PredefinedUniform::ModelViewProj => "u_modelViewProj",
            PredefinedUniform::AlphaRef => "u_alphaRef4",
        }
    }

    /// Looks a name up.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|p| p.name() == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encode_then_parse_preserves_header() {
        let shader = ShaderBinary::new(ShaderStage::Fragment, 0xaabb, 0xccdd, vec![1, 2, 3])
            .with_uniform("u_color", UniformType::Vec4, 1)
            .with_uniform("s_albedo", UniformType::Sampler, 1);
        let parsed = ShaderBinary::parse(&shader.encode()).expect("valid container");
        assert_eq!(parsed, shader);
        assert!(parsed.uniforms[0].fragment);
    }

    #[test]
    fn unknown_magic_is_rejected() {
        let mut data = ShaderBinary::new(ShaderStage::Vertex, 0, 1, vec![]).encode();
        data[0] = b'X';
        assert!(matches!(ShaderBinary::parse(&data), Err(ResourceError::Decode(_))));
    }

    #[test]
    fn truncated_code_is_rejected() {
        let mut data = ShaderBinary::new(ShaderStage::Compute, 0, 0, vec![9; 8]).encode();
        data.truncate(data.len() - 1);
        assert!(ShaderBinary::parse(&data).is_err());
    }

    #[test]
    fn predefined_names_are_recognized() {
        assert_eq!(PredefinedUniform::from_name("u_model"), Some(PredefinedUniform::Model));
        assert_eq!(PredefinedUniform::from_name("u_tint"), None);
    }
}
