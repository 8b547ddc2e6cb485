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

//! Textures and frame buffers.
//!
//! A frame buffer holds a reference on each attached texture. Textures handed to a
//! frame buffer with `destroy_textures` become owned by it and can no longer be
//! destroyed directly.

use super::{FrameBufferRef, Resources, TextureRef};
use tessel_core::error::{ResourceError, ValidationCode};
use tessel_core::handle::*;
use tessel_core::limits::MAX_FRAME_BUFFER_ATTACHMENTS;
use tessel_core::memory::Memory;
use tessel_core::renderer::flags::TextureFlags;
use tessel_core::renderer::format::{mip_count, texture_size};
use tessel_core::renderer::{
    Attachment, BackbufferRatio, Command, Frame, ReadbackSlot, TextureDesc, TextureFormat, TextureInfo,
    TextureRect, WindowTarget,
};

/// Shape of a texture to create.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TextureShape {
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub num_layers: u16,
    pub cube_map: bool,
    pub has_mips: bool,
    pub format: TextureFormat,
    pub flags: TextureFlags,
    pub ratio: BackbufferRatio,
}

impl TextureShape {
    pub fn new_2d(width: u16, height: u16, has_mips: bool, num_layers: u16, format: TextureFormat, flags: TextureFlags) -> Self {
        Self {
            width,
            height,
            depth: 1,
            num_layers: num_layers.max(1),
            cube_map: false,
            has_mips,
            format,
            flags,
            ratio: BackbufferRatio::Count,
        }
    }

    fn info(&self) -> TextureInfo {
        let num_mips = if self.has_mips {
            mip_count(self.width as u32, self.height as u32, self.depth as u32)
        } else {
            1
        };
        TextureInfo {
            format: self.format,
            storage_size: texture_size(
                self.format,
                self.width as u32,
                self.height as u32,
                self.depth as u32,
                self.cube_map,
                num_mips,
                self.num_layers,
            ),
            width: self.width,
            height: self.height,
            depth: self.depth,
            num_layers: self.num_layers,
            num_mips,
            bits_per_pixel: self.format.block_info().bits_per_pixel,
            cube_map: self.cube_map,
        }
    }
}

impl Resources {
    /// Creates a texture. Ratio textures take their size from the current
    /// resolution.
    pub(crate) fn create_texture(
        &mut self,
        frame: &mut Frame,
        mut shape: TextureShape,
        mem: Option<Memory>,
    ) -> Result<TextureHandle, ResourceError> {
        if shape.ratio != BackbufferRatio::Count {
            let (width, height, _) =
                shape
                    .ratio
                    .texture_size(self.resolution.width, self.resolution.height, shape.has_mips);
            shape.width = width;
            shape.height = height;
        }
        let info = shape.info();
        self.validate("create_texture", |s| {
            s.check(!shape.format.is_marker(), ValidationCode::InvalidParameter, || {
                format!("{:?} is not a usable texture format", shape.format)
            });
            s.check(shape.width > 0 && shape.height > 0, ValidationCode::InvalidParameter, || {
                format!("texture size {}x{} is empty", shape.width, shape.height)
            });
            if let Some(mem) = &mem {
                s.check(mem.len() >= info.storage_size as usize, ValidationCode::InvalidParameter, || {
                    format!("texture data has {} bytes, {} needed", mem.len(), info.storage_size)
                });
            }
        })?;

        let idx = self.alloc_handle(HandleKind::Texture)?;
        let handle = TextureHandle(idx);
        self.texture_refs.set(
            idx,
            TextureRef {
                info,
                flags: shape.flags,
                ratio: shape.ratio,
                has_mips: shape.has_mips,
                owned: false,
                ref_count: 1,
            },
        );
        frame.cmd_pre.push(Command::CreateTexture {
            handle,
            desc: TextureDesc::new(
                info.width,
                info.height,
                info.depth,
                info.num_layers,
                info.num_mips,
                info.format,
                info.cube_map,
                shape.flags,
            ),
            mem,
        });
        Ok(handle)
    }

    /// Uploads a sub-rectangle of one mip of a layer or cube side.
    pub fn update_texture(
        &mut self,
        frame: &mut Frame,
        handle: TextureHandle,
        side: u8,
        mip: u8,
        rect: TextureRect,
        pitch: u16,
        mem: Memory,
    ) -> Result<(), ResourceError> {
        let info = self.texture_refs.get(handle.idx()).map(|t| t.info);
        self.validate("update_texture", |s| {
            s.check(info.is_some(), ValidationCode::InvalidHandle, || {
                format!("texture {} is not valid", handle.idx())
            });
            if let Some(info) = info {
                s.check(mip < info.num_mips, ValidationCode::InvalidParameter, || {
                    format!("mip {mip} out of {} mips", info.num_mips)
                });
            }
        })?;
        if rect.width == 0 || rect.height == 0 {
            return Ok(());
        }
        frame.cmd_pre.push(Command::UpdateTexture {
            handle,
            side,
            mip,
            rect,
            pitch,
            mem,
        });
        Ok(())
    }

    /// Schedules a copy of `mip` into a slot filled on the render thread.
    pub fn read_texture(&mut self, frame: &mut Frame, handle: TextureHandle, mip: u8) -> Result<ReadbackSlot, ResourceError> {
        let texture = self.texture_refs.get(handle.idx()).map(|t| (t.flags, t.info.num_mips));
        self.validate("read_texture", |s| {
            s.check(texture.is_some(), ValidationCode::InvalidHandle, || {
                format!("texture {} is not valid", handle.idx())
            });
            if let Some((flags, num_mips)) = texture {
                s.check(
                    flags.intersects(TextureFlags::READ_BACK | TextureFlags::BLIT_DST),
                    ValidationCode::InvalidParameter,
                    || format!("texture {} was not created for read back", handle.idx()),
                );
                s.check(mip < num_mips, ValidationCode::InvalidParameter, || {
                    format!("mip {mip} out of {num_mips} mips")
                });
            }
        })?;
        let slot = ReadbackSlot::new();
        frame.cmd_post.push(Command::ReadTexture {
            handle,
            mip,
            target: slot.clone(),
        });
        Ok(slot)
    }

    pub fn destroy_texture(&mut self, frame: &mut Frame, handle: TextureHandle) -> Result<(), ResourceError> {
        let owned = self.texture_refs.get(handle.idx()).map(|t| t.owned);
        self.validate("destroy_texture", |s| {
            s.check(owned.is_some(), ValidationCode::InvalidHandle, || {
                format!("texture {} is not valid", handle.idx())
            });
            s.check(owned != Some(true), ValidationCode::InvalidParameter, || {
                format!("texture {} is owned by a frame buffer", handle.idx())
            });
        })?;
        self.release_texture(frame, handle);
        Ok(())
    }

    pub(crate) fn retain_texture(&mut self, handle: TextureHandle) -> bool {
        match self.texture_refs.get_mut(handle.idx()) {
            Some(texture) => {
                texture.ref_count += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn release_texture(&mut self, frame: &mut Frame, handle: TextureHandle) {
        let Some(texture) = self.texture_refs.get_mut(handle.idx()) else {
            return;
        };
        texture.ref_count -= 1;
        if texture.ref_count > 0 {
            return;
        }
        self.texture_refs.take(handle.idx());
        frame.cmd_post.push(Command::DestroyTexture { handle });
        Self::queue_free(frame, handle);
    }

    pub fn texture_info(&self, handle: TextureHandle) -> Option<TextureInfo> {
        self.texture_refs.get(handle.idx()).map(|t| t.info)
    }

    /// Resizes every backbuffer-ratio texture to the current resolution.
    pub fn resize_ratio_textures(&mut self, frame: &mut Frame) {
        let (bb_width, bb_height) = (self.resolution.width, self.resolution.height);
        for &idx in self.textures.handles() {
            let Some(texture) = self.texture_refs.get_mut(idx) else {
                continue;
            };
            if texture.ratio == BackbufferRatio::Count {
                continue;
            }
            let (width, height, num_mips) = texture.ratio.texture_size(bb_width, bb_height, texture.has_mips);
            if (width, height) == (texture.info.width, texture.info.height) {
                continue;
            }
            log::debug!("Ratio texture {idx} resized to {width}x{height}");
            texture.info.width = width;
            texture.info.height = height;
            texture.info.num_mips = num_mips;
            texture.info.storage_size = texture_size(
                texture.info.format,
                width as u32,
                height as u32,
                1,
                texture.info.cube_map,
                num_mips,
                texture.info.num_layers,
            );
            frame.cmd_pre.push(Command::ResizeTexture {
                handle: TextureHandle(idx),
                width,
                height,
                num_mips,
                num_layers: texture.info.num_layers,
            });
        }

        for &idx in self.frame_buffers.handles() {
            let Some(first) = self
                .frame_buffer_refs
                .get(idx)
                .and_then(|fb| fb.attachments.first().copied())
            else {
                continue;
            };
            let size = self.texture_refs.get(first.handle.idx()).map(|t| {
                (
                    (t.info.width >> first.mip).max(1),
                    (t.info.height >> first.mip).max(1),
                )
            });
            if let (Some(fb), Some((width, height))) = (self.frame_buffer_refs.get_mut(idx), size) {
                fb.width = width;
                fb.height = height;
            }
        }
    }

    /// Frame buffer over `attachments`. With `destroy_textures` the textures are
    /// destroyed with the frame buffer.
    pub fn create_frame_buffer_from_attachments(
        &mut self,
        frame: &mut Frame,
        attachments: &[Attachment],
        destroy_textures: bool,
    ) -> Result<FrameBufferHandle, ResourceError> {
        let first = attachments
            .first()
            .and_then(|a| self.texture_refs.get(a.handle.idx()).map(|t| (t.info, a.mip)));
        self.validate("create_frame_buffer", |s| {
            s.check(
                !attachments.is_empty() && attachments.len() <= MAX_FRAME_BUFFER_ATTACHMENTS,
                ValidationCode::InvalidParameter,
                || format!("{} attachments, 1..={MAX_FRAME_BUFFER_ATTACHMENTS} allowed", attachments.len()),
            );
            for attachment in attachments {
                let texture = self.texture_refs.get(attachment.handle.idx());
                s.check(texture.is_some(), ValidationCode::InvalidHandle, || {
                    format!("attachment texture {} is not valid", attachment.handle.idx())
                });
                if let Some(texture) = texture {
                    s.check(
                        (attachment.mip as u8) < texture.info.num_mips,
                        ValidationCode::InvalidParameter,
                        || format!("attachment mip {} out of range", attachment.mip),
                    );
                    s.check(
                        !destroy_textures || !texture.owned,
                        ValidationCode::InvalidParameter,
                        || format!("texture {} already belongs to a frame buffer", attachment.handle.idx()),
                    );
                }
            }
        })?;

        let idx = self.alloc_handle(HandleKind::FrameBuffer)?;
        let handle = FrameBufferHandle(idx);
        for attachment in attachments {
            self.retain_texture(attachment.handle);
            if destroy_textures {
                if let Some(texture) = self.texture_refs.get_mut(attachment.handle.idx()) {
                    texture.owned = true;
                }
            }
        }
        let (width, height) = first.map_or((0, 0), |(info, mip)| {
            ((info.width >> mip).max(1), (info.height >> mip).max(1))
        });
        self.frame_buffer_refs.set(
            idx,
            FrameBufferRef {
                attachments: attachments.to_vec(),
                window: None,
                width,
                height,
                destroy_textures,
            },
        );
        frame.cmd_pre.push(Command::CreateFrameBuffer {
            handle,
            window: None,
            attachments: attachments.to_vec(),
        });
        Ok(handle)
    }

    /// Frame buffer presenting into a native window.
    pub fn create_frame_buffer_from_nwh(
        &mut self,
        frame: &mut Frame,
        window: WindowTarget,
    ) -> Result<FrameBufferHandle, ResourceError> {
        self.validate("create_frame_buffer_from_nwh", |s| {
            s.check(window.nwh != 0, ValidationCode::InvalidParameter, || {
                "native window handle is null".to_owned()
            });
            s.check(window.width > 0 && window.height > 0, ValidationCode::InvalidParameter, || {
                format!("window size {}x{} is empty", window.width, window.height)
            });
        })?;
        let idx = self.alloc_handle(HandleKind::FrameBuffer)?;
        let handle = FrameBufferHandle(idx);
        self.frame_buffer_refs.set(
            idx,
            FrameBufferRef {
                attachments: Vec::new(),
                window: Some(window),
                width: window.width,
                height: window.height,
                destroy_textures: false,
            },
        );
        frame.cmd_pre.push(Command::CreateFrameBuffer {
            handle,
            window: Some(window),
            attachments: Vec::new(),
        });
        Ok(handle)
    }

    pub fn destroy_frame_buffer(&mut self, frame: &mut Frame, handle: FrameBufferHandle) -> Result<(), ResourceError> {
        let fb = self
            .frame_buffer_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::FrameBuffer, handle.idx()))?;
        frame.cmd_post.push(Command::DestroyFrameBuffer { handle });
        Self::queue_free(frame, handle);

        let mut released: Vec<TextureHandle> = Vec::with_capacity(fb.attachments.len());
        for attachment in &fb.attachments {
            self.release_texture(frame, attachment.handle);
            if fb.destroy_textures && !released.contains(&attachment.handle) {
                released.push(attachment.handle);
            }
        }
        for texture in released {
            if let Some(texture_ref) = self.texture_refs.get_mut(texture.idx()) {
                texture_ref.owned = false;
            }
            self.release_texture(frame, texture);
        }
        Ok(())
    }

    /// Texture of attachment `attachment`.
    pub fn frame_buffer_texture(&self, handle: FrameBufferHandle, attachment: u8) -> Option<TextureHandle> {
        self.frame_buffer_refs
            .get(handle.idx())?
            .attachments
            .get(attachment as usize)
            .map(|a| a.handle)
    }

    /// Size of a frame buffer's render area.
    pub fn frame_buffer_size(&self, handle: FrameBufferHandle) -> Option<(u16, u16)> {
        self.frame_buffer_refs.get(handle.idx()).map(|fb| (fb.width, fb.height))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resources::tests::resources;

    fn rgba(width: u16, height: u16, flags: TextureFlags) -> TextureShape {
        TextureShape::new_2d(width, height, false, 1, TextureFormat::RGBA8, flags)
    }

    #[test]
    fn texture_data_must_cover_the_storage() {
        let (mut res, mut frame) = resources();
        assert!(res
            .create_texture(&mut frame, rgba(4, 4, TextureFlags::EMPTY), Some(Memory::alloc(63)))
            .is_err());
        let tex = res
            .create_texture(&mut frame, rgba(4, 4, TextureFlags::EMPTY), Some(Memory::alloc(64)))
            .unwrap();
        assert_eq!(res.texture_info(tex).unwrap().storage_size, 64);
    }

    #[test]
    fn read_back_needs_the_flag() {
        let (mut res, mut frame) = resources();
        let plain = res.create_texture(&mut frame, rgba(2, 2, TextureFlags::EMPTY), None).unwrap();
        assert!(res.read_texture(&mut frame, plain, 0).is_err());
        let readable = res
            .create_texture(&mut frame, rgba(2, 2, TextureFlags::READ_BACK), None)
            .unwrap();
        let slot = res.read_texture(&mut frame, readable, 0).unwrap();
        assert!(!slot.is_ready());
    }

    #[test]
    fn owned_textures_die_with_their_frame_buffer() {
        let (mut res, mut frame) = resources();
        let color = res.create_texture(&mut frame, rgba(8, 8, TextureFlags::RT), None).unwrap();
        let fb = res
            .create_frame_buffer_from_attachments(&mut frame, &[Attachment::new(color)], true)
            .unwrap();
        assert_eq!(res.frame_buffer_size(fb), Some((8, 8)));
        assert!(res.destroy_texture(&mut frame, color).is_err(), "owned by the frame buffer");

        res.destroy_frame_buffer(&mut frame, fb).unwrap();
        assert!(!res.is_valid(color.into()));
        assert!(frame.free_lists.is_queued(color.into()));
    }

    #[test]
    fn shared_textures_outlive_the_frame_buffer() {
        let (mut res, mut frame) = resources();
        let color = res.create_texture(&mut frame, rgba(8, 8, TextureFlags::RT), None).unwrap();
        let fb = res
            .create_frame_buffer_from_attachments(&mut frame, &[Attachment::new(color)], false)
            .unwrap();
        res.destroy_frame_buffer(&mut frame, fb).unwrap();
        assert!(res.is_valid(color.into()));
        res.destroy_texture(&mut frame, color).unwrap();
        assert!(!res.is_valid(color.into()));
    }

    #[test]
    fn ratio_textures_follow_the_resolution() {
        let (mut res, mut frame) = resources();
        let shape = TextureShape {
            ratio: BackbufferRatio::Half,
            ..rgba(0, 0, TextureFlags::RT)
        };
        let tex = res.create_texture(&mut frame, shape, None).unwrap();
        assert_eq!(res.texture_info(tex).unwrap().width, res.resolution.width as u16 / 2);

        res.resolution.width = 400;
        res.resolution.height = 200;
        res.resize_ratio_textures(&mut frame);
        let info = res.texture_info(tex).unwrap();
        assert_eq!((info.width, info.height), (200, 100));
    }
}
