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

//! CPU-side storage of the headless backend's resources.

use tessel_core::renderer::command_buffer::{Attachment, TextureDesc, TextureRect, WindowTarget};
use tessel_core::renderer::format::mip_size;
use tessel_core::handle::VertexLayoutHandle;
use tessel_core::renderer::{BlitItem, BufferFlags, Rect, TextureFormat, UniformType};

/// Resources of one kind, indexed by handle.
#[derive(Debug)]
pub(crate) struct Slots<T> {
    items: Vec<Option<T>>,
}

impl<T> Default for Slots<T> {
    fn default() -> Self {
        Self { items: Vec::new() }
    }
}

impl<T> Slots<T> {
    pub fn insert(&mut self, idx: u16, value: T) -> Option<T> {
        let idx = idx as usize;
        if self.items.len() <= idx {
            self.items.resize_with(idx + 1, || None);
        }
        self.items[idx].replace(value)
    }

    pub fn remove(&mut self, idx: u16) -> Option<T> {
        self.items.get_mut(idx as usize).and_then(Option::take)
    }

    pub fn get(&self, idx: u16) -> Option<&T> {
        self.items.get(idx as usize).and_then(Option::as_ref)
    }

    pub fn get_mut(&mut self, idx: u16) -> Option<&mut T> {
        self.items.get_mut(idx as usize).and_then(Option::as_mut)
    }

    pub fn contains(&self, idx: u16) -> bool {
        self.get(idx).is_some()
    }

    pub fn len(&self) -> usize {
        self.items.iter().filter(|i| i.is_some()).count()
    }
}

/// Index or vertex buffer. Dynamic parents share the namespace of static buffers.
#[derive(Debug)]
pub(crate) struct Buffer {
    pub data: Vec<u8>,
    pub flags: BufferFlags,
    pub layout: VertexLayoutHandle,
}

impl Buffer {
    pub fn new(data: Vec<u8>, flags: BufferFlags, layout: VertexLayoutHandle) -> Self {
        Self { data, flags, layout }
    }

    /// Writes `bytes` at `offset`, at most `size` bytes. Grows the buffer only if it
    /// allows resizing.
    pub fn update(&mut self, offset: u32, size: u32, bytes: &[u8]) {
        let offset = offset as usize;
        let len = bytes.len().min(size as usize);
        let end = offset + len;
        if end > self.data.len() {
            if self.flags.contains(BufferFlags::ALLOW_RESIZE) {
                self.data.resize(end, 0);
            } else {
                log::warn!(
                    "Buffer update of {len} bytes at {offset} clipped to {} bytes",
                    self.data.len()
                );
            }
        }
        let end = end.min(self.data.len());
        if offset < end {
            self.data[offset..end].copy_from_slice(&bytes[..end - offset]);
        }
    }
}

#[derive(Debug)]
pub(crate) struct Program {
    pub vsh: u16,
    pub fsh: Option<u16>,
    pub compute: bool,
}

#[derive(Debug)]
pub(crate) struct Uniform {
    pub ty: UniformType,
    pub num: u16,
    pub name: String,
    pub value: Vec<u8>,
}

/// Texture storage: one byte vector per `(layer, side, mip)`.
#[derive(Debug)]
pub(crate) struct Texture {
    pub format: TextureFormat,
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub num_layers: u16,
    pub num_mips: u8,
    pub cube_map: bool,
    pub native: Option<usize>,
    levels: Vec<Vec<u8>>,
}

impl Texture {
    pub fn new(desc: &TextureDesc) -> Self {
        let mut texture = Self {
            format: desc.texture_format(),
            width: desc.width.max(1),
            height: desc.height.max(1),
            depth: desc.depth.max(1),
            num_layers: desc.num_layers.max(1),
            num_mips: desc.num_mips.max(1),
            cube_map: desc.cube_map != 0,
            native: None,
            levels: Vec::new(),
        };
        texture.allocate();
        texture
    }

    fn sides(&self) -> u16 {
        if self.cube_map {
            6
        } else {
            1
        }
    }

    fn allocate(&mut self) {
        let mut levels = Vec::new();
        for _ in 0..self.num_layers * self.sides() {
            for mip in 0..self.num_mips {
                let (w, h, d) = self.mip_dims(mip);
                levels.push(vec![0; mip_size(self.format, w, h, d) as usize]);
            }
        }
        self.levels = levels;
    }

    /// Dimensions of `mip`.
    pub fn mip_dims(&self, mip: u8) -> (u32, u32, u32) {
        let shrink = |v: u16| ((v as u32) >> mip).max(1);
        (shrink(self.width), shrink(self.height), shrink(self.depth))
    }

    fn level_index(&self, face: u16, mip: u8) -> Option<usize> {
        if mip >= self.num_mips || face >= self.num_layers * self.sides() {
            return None;
        }
        Some(face as usize * self.num_mips as usize + mip as usize)
    }

    pub fn level(&self, face: u16, mip: u8) -> Option<&[u8]> {
        self.level_index(face, mip).map(|i| self.levels[i].as_slice())
    }

    fn level_mut(&mut self, face: u16, mip: u8) -> Option<&mut Vec<u8>> {
        self.level_index(face, mip).map(move |i| &mut self.levels[i])
    }

    /// Fills the levels in `(layer, side, mip)` order from `data`.
    pub fn load(&mut self, data: &[u8]) {
        let mut offset = 0;
        for level in &mut self.levels {
            let n = level.len().min(data.len().saturating_sub(offset));
            level[..n].copy_from_slice(&data[offset..offset + n]);
            offset += n;
        }
        if offset < data.len() {
            log::debug!("Texture data has {} trailing bytes", data.len() - offset);
        }
    }

    /// Total storage.
    pub fn storage_size(&self) -> usize {
        self.levels.iter().map(Vec::len).sum()
    }

    pub fn resize(&mut self, width: u16, height: u16, num_mips: u8, num_layers: u16) {
        self.width = width.max(1);
        self.height = height.max(1);
        self.num_mips = num_mips.max(1);
        self.num_layers = num_layers.max(1);
        self.allocate();
    }

    fn bytes_per_pixel(&self) -> Option<usize> {
        if self.format.is_compressed() || self.format.is_marker() {
            None
        } else {
            Some(self.format.block_info().bits_per_pixel as usize / 8)
        }
    }

    /// Writes a region of a mip. `side` selects the cube side; for arrays `rect.z`
    /// selects the layer, for volumes the first slice.
    pub fn update(&mut self, side: u8, mip: u8, rect: &TextureRect, pitch: u16, data: &[u8]) {
        let (mip_w, mip_h, mip_d) = self.mip_dims(mip);
        let volume = self.depth > 1;
        let face = if volume {
            side as u16
        } else {
            rect.z * self.sides() + side as u16
        };
        let Some(bpp) = self.bytes_per_pixel() else {
            // Block formats are replaced as a whole.
            if let Some(level) = self.level_mut(face, mip) {
                let n = level.len().min(data.len());
                level[..n].copy_from_slice(&data[..n]);
            }
            return;
        };
        let row_bytes = rect.width as usize * bpp;
        let src_pitch = if pitch == 0 || pitch == u16::MAX {
            row_bytes
        } else {
            pitch as usize
        };
        let dst_pitch = mip_w as usize * bpp;
        let slice_bytes = dst_pitch * mip_h as usize;
        let (z0, slices) = if volume { (rect.z as usize, rect.depth.max(1) as usize) } else { (0, 1) };
        let Some(level) = self.level_mut(face, mip) else {
            log::warn!("Texture update outside of mip {mip} face {face}");
            return;
        };
        for z in 0..slices {
            if z0 + z >= mip_d as usize {
                break;
            }
            for y in 0..rect.height as usize {
                let dst_y = rect.y as usize + y;
                if dst_y >= mip_h as usize {
                    break;
                }
                let src = (z * rect.height as usize + y) * src_pitch;
                let dst = (z0 + z) * slice_bytes + dst_y * dst_pitch + rect.x as usize * bpp;
                let n = row_bytes
                    .min(dst_pitch.saturating_sub(rect.x as usize * bpp))
                    .min(data.len().saturating_sub(src));
                if n == 0 {
                    continue;
                }
                level[dst..dst + n].copy_from_slice(&data[src..src + n]);
            }
        }
    }

    /// Writes one pixel value to the texels of `face`/`mip` inside `region`, or to
    /// all of them.
    pub fn fill(&mut self, face: u16, mip: u8, region: Option<Rect>, pixel: &[u8]) {
        let Some(bpp) = self.bytes_per_pixel() else {
            return;
        };
        if pixel.len() != bpp {
            return;
        }
        let (w, h, d) = self.mip_dims(mip);
        let (x0, y0, x1, y1) = match region {
            Some(r) => (
                (r.x as u32).min(w),
                (r.y as u32).min(h),
                (r.x as u32 + r.width as u32).min(w),
                (r.y as u32 + r.height as u32).min(h),
            ),
            None => (0, 0, w, h),
        };
        let Some(level) = self.level_mut(face, mip) else {
            return;
        };
        for z in 0..d {
            for y in y0..y1 {
                let row = ((z * h + y) * w) as usize * bpp;
                for x in x0..x1 {
                    let at = row + x as usize * bpp;
                    level[at..at + bpp].copy_from_slice(pixel);
                }
            }
        }
    }
}

/// Copies a region between two textures of the same pixel size. Returns `false`
/// when the formats are incompatible.
pub(crate) fn blit(src: &Texture, dst: &mut Texture, item: &BlitItem) -> bool {
    let (Some(bpp), Some(dst_bpp)) = (src.bytes_per_pixel(), dst.bytes_per_pixel()) else {
        return false;
    };
    if bpp != dst_bpp {
        return false;
    }
    let (src_w, src_h, _) = src.mip_dims(item.src_mip);
    let (dst_w, dst_h, _) = dst.mip_dims(item.dst_mip);
    let width = (item.width as u32)
        .min(src_w.saturating_sub(item.src_x as u32))
        .min(dst_w.saturating_sub(item.dst_x as u32)) as usize;
    let height = (item.height as u32)
        .min(src_h.saturating_sub(item.src_y as u32))
        .min(dst_h.saturating_sub(item.dst_y as u32)) as usize;
    let Some(src_level) = src.level(item.src_z, item.src_mip) else {
        return false;
    };
    let rows: Vec<Vec<u8>> = (0..height)
        .map(|y| {
            let start = ((item.src_y as usize + y) * src_w as usize + item.src_x as usize) * bpp;
            src_level[start..start + width * bpp].to_vec()
        })
        .collect();
    let Some(dst_level) = dst.level_mut(item.dst_z, item.dst_mip) else {
        return false;
    };
    for (y, row) in rows.iter().enumerate() {
        let start = ((item.dst_y as usize + y) * dst_w as usize + item.dst_x as usize) * bpp;
        dst_level[start..start + row.len()].copy_from_slice(row);
    }
    true
}

#[derive(Debug)]
pub(crate) struct FrameBuffer {
    pub attachments: Vec<Attachment>,
    pub window: Option<WindowTarget>,
    pub width: u32,
    pub height: u32,
    /// Last clear color of a window target, BGRA.
    pub color: [u8; 4],
}

/// Encodes a normalized color for `format`. `None` for formats the headless
/// backend does not clear.
pub(crate) fn encode_color(format: TextureFormat, rgba: [f32; 4]) -> Option<Vec<u8>> {
    let unorm = |v: f32| (v.clamp(0.0, 1.0) * 255.0 + 0.5) as u8;
    let [r, g, b, a] = rgba.map(unorm);
    match format {
        TextureFormat::RGBA8 => Some(vec![r, g, b, a]),
        TextureFormat::BGRA8 => Some(vec![b, g, r, a]),
        TextureFormat::R8 => Some(vec![r]),
        TextureFormat::A8 => Some(vec![a]),
        TextureFormat::RG8 => Some(vec![r, g]),
        TextureFormat::RGBA32F => Some(bytemuck::cast_slice(&rgba).to_vec()),
        TextureFormat::R32F => Some(rgba[0].to_ne_bytes().to_vec()),
        _ => None,
    }
}

/// Encodes a depth value for `format`.
pub(crate) fn encode_depth(format: TextureFormat, depth: f32) -> Option<Vec<u8>> {
    let depth = depth.clamp(0.0, 1.0);
    match format {
        TextureFormat::D32F => Some(depth.to_ne_bytes().to_vec()),
        TextureFormat::D16 => Some(((depth * u16::MAX as f32) as u16).to_ne_bytes().to_vec()),
        TextureFormat::D32 => Some(((depth as f64 * u32::MAX as f64) as u32).to_ne_bytes().to_vec()),
        _ => None,
    }
}

/// Unpacks `0xRRGGBBAA`.
pub(crate) fn unpack_rgba(rgba: u32) -> [f32; 4] {
    rgba.to_be_bytes().map(|c| c as f32 / 255.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::renderer::TextureFlags;

    fn rgba8(width: u16, height: u16, mips: u8) -> Texture {
        Texture::new(&TextureDesc::new(
            width,
            height,
            1,
            1,
            mips,
            TextureFormat::RGBA8,
            false,
            TextureFlags::EMPTY,
        ))
    }

    #[test]
    fn storage_covers_every_mip() {
        let texture = rgba8(4, 4, 3);
        assert_eq!(texture.storage_size(), (16 + 4 + 1) * 4);
        assert_eq!(texture.level(0, 2).map(<[u8]>::len), Some(4));
        assert!(texture.level(0, 3).is_none());
    }

    #[test]
    fn update_writes_rows_with_pitch() {
        let mut texture = rgba8(4, 4, 1);
        let rect = TextureRect {
            x: 1,
            y: 2,
            width: 2,
            height: 2,
            ..TextureRect::default()
        };
        // Source rows are 12 bytes apart; only the first 8 of each are used.
        let data: Vec<u8> = (0..24).collect();
        texture.update(0, 0, &rect, 12, &data);
        let level = texture.level(0, 0).unwrap();
        assert_eq!(&level[2 * 16 + 4..2 * 16 + 12], &data[0..8]);
        assert_eq!(&level[3 * 16 + 4..3 * 16 + 12], &data[12..20]);
        assert!(level[..2 * 16].iter().all(|b| *b == 0));
    }

    #[test]
    fn blit_copies_region_between_textures() {
        let mut src = rgba8(4, 4, 1);
        src.fill(0, 0, None, &[9, 8, 7, 6]);
        let mut dst = rgba8(2, 2, 1);
        let item = BlitItem {
            width: 8,
            height: 8,
            depth: 1,
            ..BlitItem::default()
        };
        assert!(blit(&src, &mut dst, &item));
        assert!(dst.level(0, 0).unwrap().chunks(4).all(|p| p == [9, 8, 7, 6]));
    }

    #[test]
    fn fill_respects_region() {
        let mut texture = rgba8(4, 4, 1);
        texture.fill(0, 0, Some(Rect::new(2, 2, 8, 8)), &[1, 1, 1, 1]);
        let level = texture.level(0, 0).unwrap();
        assert_eq!(level.iter().filter(|b| **b == 1).count(), 4 * 4);
        assert_eq!(&level[(2 * 4 + 2) * 4..(2 * 4 + 2) * 4 + 4], &[1, 1, 1, 1]);
        assert_eq!(&level[..4], &[0, 0, 0, 0]);
    }

    #[test]
    fn growing_requires_allow_resize() {
        let mut fixed = Buffer::new(vec![0; 4], BufferFlags::EMPTY, VertexLayoutHandle::INVALID);
        fixed.update(2, 4, &[1, 2, 3, 4]);
        assert_eq!(fixed.data, vec![0, 0, 1, 2]);

        let mut growable = Buffer::new(vec![0; 4], BufferFlags::ALLOW_RESIZE, VertexLayoutHandle::INVALID);
        growable.update(2, 4, &[1, 2, 3, 4]);
        assert_eq!(growable.data, vec![0, 0, 1, 2, 3, 4]);
    }

    #[test]
    fn colors_follow_channel_order() {
        let red = unpack_rgba(0xff0000ff);
        assert_eq!(encode_color(TextureFormat::RGBA8, red), Some(vec![255, 0, 0, 255]));
        assert_eq!(encode_color(TextureFormat::BGRA8, red), Some(vec![0, 0, 255, 255]));
        assert_eq!(encode_color(TextureFormat::BC1, red), None);
    }
}
