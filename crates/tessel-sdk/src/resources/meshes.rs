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

//! Meshes and materials.

use super::{MaterialRef, MaterialTexture, MeshGroupRef, MeshRef, Resources};
use tessel_core::error::{ResourceError, ValidationCode};
use tessel_core::handle::*;
use tessel_core::hash::murmur2a;
use tessel_core::limits::MAX_TEXTURE_SAMPLERS;
use tessel_core::math::Aabb;
use tessel_core::memory::Memory;
use tessel_core::renderer::flags::{BufferFlags, SamplerFlags};
use tessel_core::renderer::Frame;
use tessel_data::mesh::{read_mesh, MeshoptCodec};

/// Summary of a loaded mesh.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct MeshInfo {
    pub num_groups: u32,
    pub num_vertices: u32,
    pub num_indices: u32,
    pub aabb: Aabb,
}

impl Resources {
    /// Decodes a mesh file and uploads one vertex/index buffer pair per group.
    /// Identical files share a handle.
    pub fn create_mesh(&mut self, frame: &mut Frame, data: &[u8]) -> Result<MeshHandle, ResourceError> {
        let hash = murmur2a(data);
        if let Some(idx) = self.mesh_map.find(hash) {
            if let Some(mesh) = self.mesh_refs.get_mut(idx) {
                mesh.ref_count += 1;
                return Ok(MeshHandle(idx));
            }
        }

        let mesh = read_mesh(data, &MeshoptCodec)?;
        let idx = self.alloc_handle(HandleKind::Mesh)?;
        let mut groups = Vec::with_capacity(mesh.groups.len());
        for group in mesh.groups {
            match self.upload_group(frame, group.vertices, &group.indices, &group.layout) {
                Ok((vertex_buffer, index_buffer)) => groups.push(MeshGroupRef {
                    vertex_buffer,
                    index_buffer,
                    num_vertices: group.num_vertices as u32,
                    num_indices: group.indices.len() as u32,
                    aabb: group.aabb,
                }),
                Err(err) => {
                    log::warn!("Mesh group upload failed, rolling back: {err}");
                    self.destroy_groups(frame, &groups);
                    self.free_handle(HandleKind::Mesh, idx);
                    return Err(err);
                }
            }
        }

        self.mesh_map.insert(hash, idx);
        self.mesh_refs.set(
            idx,
            MeshRef {
                hash,
                groups,
                ref_count: 1,
            },
        );
        Ok(MeshHandle(idx))
    }

    fn upload_group(
        &mut self,
        frame: &mut Frame,
        vertices: Vec<u8>,
        indices: &[u16],
        layout: &tessel_core::renderer::VertexLayout,
    ) -> Result<(VertexBufferHandle, IndexBufferHandle), ResourceError> {
        let vertex_buffer = self.create_vertex_buffer(frame, Memory::from_vec(vertices), layout, BufferFlags::EMPTY)?;
        match self.create_index_buffer(frame, Memory::copy_pod(indices), BufferFlags::EMPTY) {
            Ok(index_buffer) => Ok((vertex_buffer, index_buffer)),
            Err(err) => {
                self.destroy_vertex_buffer(frame, vertex_buffer)?;
                Err(err)
            }
        }
    }

    fn destroy_groups(&mut self, frame: &mut Frame, groups: &[MeshGroupRef]) {
        for group in groups {
            if let Err(err) = self.destroy_vertex_buffer(frame, group.vertex_buffer) {
                log::warn!("Mesh vertex buffer release failed: {err}");
            }
            if let Err(err) = self.destroy_index_buffer(frame, group.index_buffer) {
                log::warn!("Mesh index buffer release failed: {err}");
            }
        }
    }

    pub fn destroy_mesh(&mut self, frame: &mut Frame, handle: MeshHandle) -> Result<(), ResourceError> {
        let mesh = self
            .mesh_refs
            .get_mut(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Mesh, handle.idx()))?;
        mesh.ref_count -= 1;
        if mesh.ref_count > 0 {
            return Ok(());
        }
        let Some(mesh) = self.mesh_refs.take(handle.idx()) else {
            return Ok(());
        };
        self.mesh_map.remove_by_key(mesh.hash);
        self.destroy_groups(frame, &mesh.groups);
        Self::queue_free(frame, handle);
        Ok(())
    }

    pub fn mesh_info(&self, handle: MeshHandle) -> Option<MeshInfo> {
        let mesh = self.mesh_refs.get(handle.idx())?;
        Some(MeshInfo {
            num_groups: mesh.groups.len() as u32,
            num_vertices: mesh.groups.iter().map(|g| g.num_vertices).sum(),
            num_indices: mesh.groups.iter().map(|g| g.num_indices).sum(),
            aabb: Aabb::from_points(mesh.groups.iter().flat_map(|g| [g.aabb.min, g.aabb.max])),
        })
    }

    pub(crate) fn mesh_groups(&self, handle: MeshHandle) -> Option<&[MeshGroupRef]> {
        self.mesh_refs.get(handle.idx()).map(|m| m.groups.as_slice())
    }

    pub fn create_material(&mut self, program: ProgramHandle) -> Result<MaterialHandle, ResourceError> {
        let live = self.program_refs.contains(program.idx());
        self.validate("create_material", |s| {
            s.check(live, ValidationCode::InvalidHandle, || {
                format!("program {} is not valid", program.idx())
            })
        })?;
        let idx = self.alloc_handle(HandleKind::Material)?;
        self.retain_program(program);
        self.material_refs.set(
            idx,
            MaterialRef {
                program,
                uniforms: Vec::new(),
                textures: Vec::new(),
            },
        );
        Ok(MaterialHandle(idx))
    }

    /// Stores `num` elements of a uniform value, replacing any previous value.
    pub fn set_material_uniform(
        &mut self,
        handle: MaterialHandle,
        uniform: UniformHandle,
        data: &[u8],
        num: u16,
    ) -> Result<(), ResourceError> {
        let layout = self.uniform_layout(uniform);
        let live = self.material_refs.contains(handle.idx());
        self.validate("set_material_uniform", |s| {
            s.check(live, ValidationCode::InvalidHandle, || {
                format!("material {} is not valid", handle.idx())
            });
            s.check(layout.is_some(), ValidationCode::InvalidHandle, || {
                format!("uniform {} is not valid", uniform.idx())
            });
            if let Some((ty, _)) = layout {
                let needed = ty.size() as usize * num.max(1) as usize;
                s.check(data.len() >= needed, ValidationCode::InvalidParameter, || {
                    format!("uniform value has {} bytes, {needed} needed", data.len())
                });
            }
        })?;
        let size = layout.map_or(0, |(ty, _)| ty.size() as usize * num.max(1) as usize);
        let value = data[..size.min(data.len())].to_vec();

        let existing = self
            .material_refs
            .get(handle.idx())
            .is_some_and(|m| m.uniforms.iter().any(|(u, _, _)| *u == uniform));
        if !existing {
            self.retain_uniform(uniform);
        }
        if let Some(material) = self.material_refs.get_mut(handle.idx()) {
            match material.uniforms.iter_mut().find(|(u, _, _)| *u == uniform) {
                Some(entry) => *entry = (uniform, value, num),
                None => material.uniforms.push((uniform, value, num)),
            }
        }
        Ok(())
    }

    /// Binds `texture` at `stage` through `sampler`, replacing the stage's previous binding.
    pub fn set_material_texture(
        &mut self,
        frame: &mut Frame,
        handle: MaterialHandle,
        stage: u8,
        sampler: UniformHandle,
        texture: TextureHandle,
        flags: SamplerFlags,
    ) -> Result<(), ResourceError> {
        let live = self.material_refs.contains(handle.idx());
        let sampler_live = self.uniform_refs.contains(sampler.idx());
        let texture_live = self.texture_refs.contains(texture.idx());
        self.validate("set_material_texture", |s| {
            s.check(live, ValidationCode::InvalidHandle, || {
                format!("material {} is not valid", handle.idx())
            });
            s.check((stage as usize) < MAX_TEXTURE_SAMPLERS, ValidationCode::InvalidParameter, || {
                format!("stage {stage} out of range")
            });
            s.check(sampler_live && texture_live, ValidationCode::InvalidHandle, || {
                format!("sampler {} or texture {} is not valid", sampler.idx(), texture.idx())
            });
        })?;

        self.retain_uniform(sampler);
        self.retain_texture(texture);
        let replaced = self.material_refs.get_mut(handle.idx()).and_then(|material| {
            let binding = MaterialTexture {
                stage,
                sampler,
                texture,
                flags,
            };
            match material.textures.iter_mut().find(|t| t.stage == stage) {
                Some(slot) => Some(std::mem::replace(slot, binding)),
                None => {
                    material.textures.push(binding);
                    None
                }
            }
        });
        if let Some(old) = replaced {
            self.release_texture(frame, old.texture);
            self.destroy_uniform(frame, old.sampler)?;
        }
        Ok(())
    }

    pub fn destroy_material(&mut self, frame: &mut Frame, handle: MaterialHandle) -> Result<(), ResourceError> {
        let material = self
            .material_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Material, handle.idx()))?;
        Self::queue_free(frame, handle);
        for (uniform, _, _) in &material.uniforms {
            self.destroy_uniform(frame, *uniform)?;
        }
        for binding in &material.textures {
            self.release_texture(frame, binding.texture);
            self.destroy_uniform(frame, binding.sampler)?;
        }
        self.destroy_program(frame, material.program)
    }

    pub(crate) fn material(&self, handle: MaterialHandle) -> Option<&MaterialRef> {
        self.material_refs.get(handle.idx())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::resources;
    use tessel_core::math::Vec3;
    use tessel_core::renderer::{Attrib, AttribType, UniformType, VertexLayout};
    use tessel_data::mesh::{write_mesh, Mesh, MeshGroup};

    fn triangle() -> Vec<u8> {
        let layout = VertexLayout::begin()
            .add(Attrib::Position, 3, AttribType::Float, false, false)
            .end();
        let vertices: Vec<f32> = vec![0.0, 0.0, 0.0, 1.0, 0.0, 0.0, 0.0, 1.0, 0.0];
        let mesh = Mesh {
            groups: vec![MeshGroup {
                aabb: Aabb {
                    min: Vec3::ZERO,
                    max: Vec3::new(1.0, 1.0, 0.0),
                },
                layout,
                num_vertices: 3,
                vertices: bytemuck::cast_slice(&vertices).to_vec(),
                indices: vec![0, 1, 2],
                ..Default::default()
            }],
        };
        write_mesh(&mesh, &MeshoptCodec).unwrap()
    }

    #[test]
    fn identical_mesh_files_share_a_handle() {
        let (mut res, mut frame) = resources();
        let data = triangle();
        let a = res.create_mesh(&mut frame, &data).unwrap();
        let b = res.create_mesh(&mut frame, &data).unwrap();
        assert_eq!(a, b);

        let info = res.mesh_info(a).unwrap();
        assert_eq!((info.num_groups, info.num_vertices, info.num_indices), (1, 3, 3));
        let group = res.mesh_groups(a).unwrap()[0].clone();

        res.destroy_mesh(&mut frame, a).unwrap();
        assert!(res.is_valid(group.vertex_buffer.into()));
        res.destroy_mesh(&mut frame, b).unwrap();
        assert!(!res.is_valid(group.vertex_buffer.into()));
        assert!(!res.is_valid(group.index_buffer.into()));
    }

    #[test]
    fn garbage_is_not_a_mesh() {
        let (mut res, mut frame) = resources();
        assert!(res.create_mesh(&mut frame, b"not a mesh").is_err());
        assert_eq!(res.meshes.num_handles(), 0);
    }

    #[test]
    fn materials_keep_their_uniforms_alive() {
        let (mut res, mut frame) = resources();
        let uniform = res.create_uniform(&mut frame, "u_tint", UniformType::Vec4, 1).unwrap();
        let program = {
            use tessel_core::renderer::shader::{ShaderBinary, ShaderStage};
            let vs = ShaderBinary::new(ShaderStage::Vertex, 0, 7, vec![1; 4]).encode();
            let fs = ShaderBinary::new(ShaderStage::Fragment, 7, 0, vec![2; 4]).encode();
            let vsh = res.create_shader(&mut frame, Memory::from_vec(vs)).unwrap();
            let fsh = res.create_shader(&mut frame, Memory::from_vec(fs)).unwrap();
            res.create_program(&mut frame, vsh, fsh, true).unwrap()
        };
        let material = res.create_material(program).unwrap();
        assert!(res.set_material_uniform(material, uniform, &[0; 8], 1).is_err());
        res.set_material_uniform(material, uniform, &[1; 16], 1).unwrap();
        res.set_material_uniform(material, uniform, &[2; 16], 1).unwrap();
        assert_eq!(res.material(material).unwrap().uniforms.len(), 1);

        res.destroy_uniform(&mut frame, uniform).unwrap();
        assert!(res.is_valid(uniform.into()), "the material still holds it");
        res.destroy_program(&mut frame, program).unwrap();
        assert!(res.is_valid(program.into()));

        res.destroy_material(&mut frame, material).unwrap();
        assert!(!res.is_valid(uniform.into()));
        assert!(!res.is_valid(program.into()));
    }
}
