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

//! Shaders, programs and uniforms, all deduplicated by identity.

use super::{ProgramRef, Resources, ShaderRef, UniformRef};
use tessel_core::error::{Fatal, ResourceError, ValidationCode};
use tessel_core::handle::*;
use tessel_core::hash::{murmur2a, murmur2a_str, Murmur2A};
use tessel_core::limits::MAX_UNIFORM_ARRAY_SIZE;
use tessel_core::memory::Memory;
use tessel_core::renderer::shader::{PredefinedUniform, ShaderBinary, ShaderStage};
use tessel_core::renderer::{Command, Frame, UniformType};

/// Declaration of a live uniform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UniformInfo {
    /// Name.
    pub name: String,
    /// Type, the largest requested so far.
    pub ty: UniformType,
    /// Array size, the largest requested so far.
    pub num: u16,
}

fn program_key(vsh: ShaderHandle, fsh: ShaderHandle) -> u32 {
    Murmur2A::new(0).add_pod(&vsh.0).add_pod(&fsh.0).finish()
}

impl Resources {
    /// Creates a uniform, or returns the existing one of the same name grown to
    /// the larger type and array size.
    pub fn create_uniform(
        &mut self,
        frame: &mut Frame,
        name: &str,
        ty: UniformType,
        num: u16,
    ) -> Result<UniformHandle, ResourceError> {
        self.validate("create_uniform", |s| {
            s.check(
                PredefinedUniform::from_name(name).is_none(),
                ValidationCode::PredefinedUniform,
                || format!("'{name}' is a predefined uniform"),
            );
            s.check(!name.is_empty(), ValidationCode::InvalidParameter, || {
                "uniform name is empty".to_owned()
            });
            s.check(num <= MAX_UNIFORM_ARRAY_SIZE, ValidationCode::InvalidParameter, || {
                format!("'{name}' has {num} elements (max {MAX_UNIFORM_ARRAY_SIZE})")
            });
        })?;
        let num = num.max(1);

        let key = murmur2a_str(name);
        if let Some(idx) = self.uniform_map.find(key) {
            if let Some(uniform) = self.uniform_refs.get_mut(idx) {
                uniform.ref_count += 1;
                let grown_ty = if ty.size() > uniform.ty.size() { ty } else { uniform.ty };
                let grown_num = uniform.num.max(num);
                if grown_ty != uniform.ty || grown_num != uniform.num {
                    uniform.ty = grown_ty;
                    uniform.num = grown_num;
                    frame.cmd_pre.push(Command::CreateUniform {
                        handle: UniformHandle(idx),
                        ty: grown_ty,
                        num: grown_num,
                        name: name.to_owned(),
                    });
                }
                return Ok(UniformHandle(idx));
            }
        }

        let idx = self.alloc_handle(HandleKind::Uniform)?;
        let handle = UniformHandle(idx);
        self.uniform_map.insert(key, idx);
        self.uniform_refs.set(
            idx,
            UniformRef {
                name: name.to_owned(),
                ty,
                num,
                ref_count: 1,
            },
        );
        frame.cmd_pre.push(Command::CreateUniform {
            handle,
            ty,
            num,
            name: name.to_owned(),
        });
        Ok(handle)
    }

    pub fn destroy_uniform(&mut self, frame: &mut Frame, handle: UniformHandle) -> Result<(), ResourceError> {
        let uniform = self
            .uniform_refs
            .get_mut(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Uniform, handle.idx()))?;
        uniform.ref_count -= 1;
        if uniform.ref_count > 0 {
            return Ok(());
        }
        self.uniform_refs.take(handle.idx());
        self.uniform_map.remove_by_handle(handle.idx());
        frame.cmd_post.push(Command::DestroyUniform { handle });
        Self::queue_free(frame, handle);
        Ok(())
    }

    pub fn uniform_info(&self, handle: UniformHandle) -> Option<UniformInfo> {
        self.uniform_refs.get(handle.idx()).map(|u| UniformInfo {
            name: u.name.clone(),
            ty: u.ty,
            num: u.num,
        })
    }

    /// Type and array size used when recording a value for `handle`.
    pub(crate) fn uniform_layout(&self, handle: UniformHandle) -> Option<(UniformType, u16)> {
        self.uniform_refs.get(handle.idx()).map(|u| (u.ty, u.num))
    }

    /// Creates a shader from a container, or adds a reference to an identical one.
    /// Uniforms the shader declares are created alongside it.
    pub fn create_shader(&mut self, frame: &mut Frame, mem: Memory) -> Result<ShaderHandle, ResourceError> {
        let hash = murmur2a(&mem);
        if let Some(idx) = self.shader_map.find(hash) {
            if let Some(shader) = self.shader_refs.get_mut(idx) {
                shader.ref_count += 1;
                return Ok(ShaderHandle(idx));
            }
        }

        let binary = match ShaderBinary::parse(&mem) {
            Ok(binary) => binary,
            Err(err) => {
                log::warn!("create_shader: {err}");
                if self.debug_checks {
                    self.callback.fatal(Fatal::InvalidShader, &err.to_string());
                }
                return Err(err);
            }
        };

        let idx = self.alloc_handle(HandleKind::Shader)?;
        let mut uniforms = Vec::with_capacity(binary.uniforms.len());
        for declared in &binary.uniforms {
            if PredefinedUniform::from_name(&declared.name).is_some() {
                continue;
            }
            match self.create_uniform(frame, &declared.name, declared.ty, declared.num) {
                Ok(uniform) => uniforms.push(uniform),
                Err(err) => log::warn!("Shader {idx}: uniform '{}' skipped: {err}", declared.name),
            }
        }

        let handle = ShaderHandle(idx);
        self.shader_map.insert(hash, idx);
        self.shader_refs.set(
            idx,
            ShaderRef {
                hash,
                stage: binary.stage,
                hash_in: binary.hash_in,
                hash_out: binary.hash_out,
                uniforms,
                ref_count: 1,
            },
        );
        frame.cmd_pre.push(Command::CreateShader { handle, mem });
        Ok(handle)
    }

    pub fn destroy_shader(&mut self, frame: &mut Frame, handle: ShaderHandle) -> Result<(), ResourceError> {
        let shader = self
            .shader_refs
            .get_mut(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Shader, handle.idx()))?;
        shader.ref_count -= 1;
        if shader.ref_count > 0 {
            return Ok(());
        }
        let Some(shader) = self.shader_refs.take(handle.idx()) else {
            return Ok(());
        };
        for uniform in shader.uniforms {
            self.destroy_uniform(frame, uniform)?;
        }
        self.shader_map.remove_by_handle(handle.idx());
        frame.cmd_post.push(Command::DestroyShader { handle });
        Self::queue_free(frame, handle);
        Ok(())
    }

    /// Uniforms declared by a shader.
    pub fn shader_uniforms(&self, handle: ShaderHandle) -> Vec<UniformHandle> {
        self.shader_refs
            .get(handle.idx())
            .map(|s| s.uniforms.clone())
            .unwrap_or_default()
    }

    fn retain_shader(&mut self, handle: ShaderHandle) {
        if let Some(shader) = self.shader_refs.get_mut(handle.idx()) {
            shader.ref_count += 1;
        }
    }

    /// Links `vsh` and `fsh`. The same pair returns the same program. With
    /// `destroy_shaders` the caller hands its shader references to the program.
    pub fn create_program(
        &mut self,
        frame: &mut Frame,
        vsh: ShaderHandle,
        fsh: ShaderHandle,
        destroy_shaders: bool,
    ) -> Result<ProgramHandle, ResourceError> {
        let vs = self.shader_refs.get(vsh.idx()).cloned();
        let fs = if fsh.is_valid() { self.shader_refs.get(fsh.idx()).cloned() } else { None };
        self.validate("create_program", |s| {
            s.check(vs.is_some(), ValidationCode::InvalidHandle, || {
                format!("vertex shader {} is not valid", vsh.idx())
            });
            s.check(!fsh.is_valid() || fs.is_some(), ValidationCode::InvalidHandle, || {
                format!("fragment shader {} is not valid", fsh.idx())
            });
            if let (Some(vs), Some(fs)) = (&vs, &fs) {
                s.check(vs.hash_out == fs.hash_in, ValidationCode::ShaderMismatch, || {
                    format!(
                        "vertex outputs {:#010x} do not match fragment inputs {:#010x}",
                        vs.hash_out, fs.hash_in
                    )
                });
            }
        })?;
        let compute = vs.is_some_and(|vs| vs.stage == ShaderStage::Compute);
        self.link_program(frame, vsh, fsh, compute, destroy_shaders)
    }

    /// Program made of a single compute shader.
    pub fn create_compute_program(
        &mut self,
        frame: &mut Frame,
        csh: ShaderHandle,
        destroy_shader: bool,
    ) -> Result<ProgramHandle, ResourceError> {
        let stage = self.shader_refs.get(csh.idx()).map(|s| s.stage);
        self.validate("create_compute_program", |s| {
            s.check(stage == Some(ShaderStage::Compute), ValidationCode::InvalidHandle, || {
                format!("shader {} is not a live compute shader", csh.idx())
            })
        })?;
        self.link_program(frame, csh, ShaderHandle::INVALID, true, destroy_shader)
    }

    fn link_program(
        &mut self,
        frame: &mut Frame,
        vsh: ShaderHandle,
        fsh: ShaderHandle,
        compute: bool,
        destroy_shaders: bool,
    ) -> Result<ProgramHandle, ResourceError> {
        let key = program_key(vsh, fsh);
        let found = self.program_map.find(key);
        if let Some(idx) = found.filter(|idx| !self.program_refs.contains(*idx)) {
            self.revive_program(idx);
        }
        let existing = found.filter(|idx| self.program_refs.contains(*idx));

        let handle = match existing {
            Some(idx) => {
                if let Some(program) = self.program_refs.get_mut(idx) {
                    program.ref_count += 1;
                }
                ProgramHandle(idx)
            }
            None => {
                let idx = self.alloc_handle(HandleKind::Program)?;
                let handle = ProgramHandle(idx);
                self.retain_shader(vsh);
                if fsh.is_valid() {
                    self.retain_shader(fsh);
                }
                self.program_map.insert(key, idx);
                self.program_refs.set(
                    idx,
                    ProgramRef {
                        vsh,
                        fsh,
                        compute,
                        ref_count: 1,
                    },
                );
                frame.cmd_pre.push(Command::CreateProgram { handle, vsh, fsh });
                handle
            }
        };

        if destroy_shaders {
            self.destroy_shader(frame, vsh)?;
            if fsh.is_valid() {
                self.destroy_shader(frame, fsh)?;
            }
        }
        Ok(handle)
    }

    pub fn destroy_program(&mut self, frame: &mut Frame, handle: ProgramHandle) -> Result<(), ResourceError> {
        let program = self
            .program_refs
            .get_mut(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Program, handle.idx()))?;
        program.ref_count -= 1;
        if program.ref_count > 0 {
            return Ok(());
        }
        if let Some(program) = self.program_refs.take(handle.idx()) {
            log::debug!("Program {} released at the next swap", handle.idx());
            self.pending.programs.push((handle, program));
        }
        Ok(())
    }

    /// Takes back a program destroyed earlier in this frame. Its shaders are
    /// still retained.
    fn revive_program(&mut self, idx: u16) {
        let Some(pos) = self.pending.programs.iter().position(|(h, _)| h.idx() == idx) else {
            return;
        };
        let (_, mut program) = self.pending.programs.swap_remove(pos);
        program.ref_count = 0;
        self.program_refs.set(idx, program);
    }

    pub(crate) fn release_program(&mut self, frame: &mut Frame, handle: ProgramHandle, program: ProgramRef) {
        self.program_map.remove_by_handle(handle.idx());
        frame.cmd_post.push(Command::DestroyProgram { handle });
        Self::queue_free(frame, handle);
        for shader in [program.vsh, program.fsh] {
            if shader.is_valid() {
                if let Err(err) = self.destroy_shader(frame, shader) {
                    log::warn!("Releasing program {}: {err}", handle.idx());
                }
            }
        }
    }

    pub(crate) fn retain_program(&mut self, handle: ProgramHandle) -> bool {
        match self.program_refs.get_mut(handle.idx()) {
            Some(program) => {
                program.ref_count += 1;
                true
            }
            None => false,
        }
    }

    /// `Some(is_compute)` for a live program.
    pub(crate) fn program_kind(&self, handle: ProgramHandle) -> Option<bool> {
        self.program_refs.get(handle.idx()).map(|p| p.compute)
    }

    pub(crate) fn retain_uniform(&mut self, handle: UniformHandle) -> bool {
        match self.uniform_refs.get_mut(handle.idx()) {
            Some(uniform) => {
                uniform.ref_count += 1;
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::resources;
    use tessel_core::renderer::CommandType;

    fn shader(stage: ShaderStage, hash_in: u32, hash_out: u32, code: u8) -> Memory {
        Memory::from_vec(
            ShaderBinary::new(stage, hash_in, hash_out, vec![code; 8])
                .with_uniform("u_color", UniformType::Vec4, 1)
                .with_uniform("u_modelViewProj", UniformType::Mat4, 1)
                .encode(),
        )
    }

    #[test]
    fn uniforms_grow_to_the_largest_declaration() {
        let (mut res, mut frame) = resources();
        let a = res.create_uniform(&mut frame, "u_params", UniformType::Vec4, 2).unwrap();
        let b = res.create_uniform(&mut frame, "u_params", UniformType::Mat4, 1).unwrap();
        assert_eq!(a, b);
        let info = res.uniform_info(a).unwrap();
        assert_eq!(info.ty, UniformType::Mat4);
        assert_eq!(info.num, 2);
    }

    #[test]
    fn predefined_names_are_rejected() {
        let (mut res, mut frame) = resources();
        let err = res
            .create_uniform(&mut frame, "u_viewProj", UniformType::Mat4, 1)
            .unwrap_err();
        assert!(matches!(err, ResourceError::Validation(v) if v.code == ValidationCode::PredefinedUniform));
    }

    #[test]
    fn shaders_create_their_uniforms_except_predefined_ones() {
        let (mut res, mut frame) = resources();
        let vs = res
            .create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1))
            .unwrap();
        let uniforms = res.shader_uniforms(vs);
        assert_eq!(uniforms.len(), 1);
        assert_eq!(res.uniform_info(uniforms[0]).unwrap().name, "u_color");

        let again = res
            .create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1))
            .unwrap();
        assert_eq!(vs, again, "identical bytecode is deduplicated");
    }

    #[test]
    fn mismatched_interfaces_do_not_link() {
        let (mut res, mut frame) = resources();
        let vs = res.create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1)).unwrap();
        let fs = res.create_shader(&mut frame, shader(ShaderStage::Fragment, 8, 0, 2)).unwrap();
        let err = res.create_program(&mut frame, vs, fs, false).unwrap_err();
        assert!(matches!(err, ResourceError::Validation(v) if v.code == ValidationCode::ShaderMismatch));
    }

    #[test]
    fn program_owns_shaders_handed_to_it() {
        let (mut res, mut frame) = resources();
        let vs = res.create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1)).unwrap();
        let fs = res.create_shader(&mut frame, shader(ShaderStage::Fragment, 7, 0, 2)).unwrap();
        let program = res.create_program(&mut frame, vs, fs, true).unwrap();
        assert_eq!(res.program_kind(program), Some(false));
        assert!(res.is_valid(vs.into()));

        res.destroy_program(&mut frame, program).unwrap();
        assert!(!res.is_valid(program.into()));
        assert!(res.is_valid(vs.into()), "shaders stay until the swap");
        res.free_pending(&mut frame);
        assert!(!res.is_valid(vs.into()));
        assert!(!res.is_valid(fs.into()));
        let destroyed: Vec<_> = frame
            .cmd_post
            .commands()
            .map(|c| c.unwrap().command_type())
            .collect();
        assert!(destroyed.contains(&CommandType::DestroyProgram));
        assert!(destroyed.contains(&CommandType::DestroyShader));
        assert!(destroyed.contains(&CommandType::DestroyUniform));
    }

    #[test]
    fn the_same_pair_links_once() {
        let (mut res, mut frame) = resources();
        let vs = res.create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1)).unwrap();
        let fs = res.create_shader(&mut frame, shader(ShaderStage::Fragment, 7, 0, 2)).unwrap();
        let a = res.create_program(&mut frame, vs, fs, false).unwrap();
        let b = res.create_program(&mut frame, vs, fs, false).unwrap();
        assert_eq!(a, b);
        res.destroy_program(&mut frame, a).unwrap();
        assert!(res.is_valid(a.into()));
    }

    #[test]
    fn relinking_a_destroyed_pair_returns_the_same_handle() {
        let (mut res, mut frame) = resources();
        let vs = res.create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1)).unwrap();
        let fs = res.create_shader(&mut frame, shader(ShaderStage::Fragment, 7, 0, 2)).unwrap();
        let first = res.create_program(&mut frame, vs, fs, false).unwrap();
        res.destroy_program(&mut frame, first).unwrap();
        assert!(!res.is_valid(first.into()));

        let second = res.create_program(&mut frame, vs, fs, false).unwrap();
        assert_eq!(first, second);
        assert!(res.is_valid(second.into()));
        res.free_pending(&mut frame);
        assert!(res.is_valid(second.into()), "a revived program survives the swap");
        let destroyed = frame
            .cmd_post
            .commands()
            .any(|c| c.unwrap().command_type() == CommandType::DestroyProgram);
        assert!(!destroyed, "the backend never saw the program go away");
    }

    #[test]
    fn compute_programs_need_a_compute_shader() {
        let (mut res, mut frame) = resources();
        let vs = res.create_shader(&mut frame, shader(ShaderStage::Vertex, 0, 7, 1)).unwrap();
        assert!(res.create_compute_program(&mut frame, vs, false).is_err());
        let cs = res.create_shader(&mut frame, shader(ShaderStage::Compute, 0, 0, 3)).unwrap();
        let program = res.create_compute_program(&mut frame, cs, false).unwrap();
        assert_eq!(res.program_kind(program), Some(true));
    }
}
