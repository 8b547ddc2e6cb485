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

//! 64-bit draw/compute sort keys and 32-bit blit keys.
//!
//! ```text
//! 63      56 55  54..53  52 ........................................... 10
//! [ view  ][D][ type ][ fields, ordered per draw type                  ][0]
//!
//! type Program : blend(2)  program(9) depth(32)
//! type Depth   : depth(32) blend(2)   program(9)
//! type Sequence: seq(20)   blend(2)   program(9)
//! compute (D=0): seq(20)   program(9)
//! ```
//!
//! A single ascending sort therefore groups by view first, then by whatever the
//! view's [`ViewMode`] asks for. Bits below the packed fields are zero, so items
//! with identical fields keep their submission order through a stable sort.

use super::types::ViewMode;
use crate::handle::ViewId;
use crate::limits::{MAX_PROGRAMS, MAX_VIEWS};

const fn log2(v: usize) -> u32 {
    usize::BITS - 1 - v.leading_zeros()
}

/// Bits of the view field.
pub const SORT_KEY_NUM_BITS_VIEW: u32 = log2(MAX_VIEWS);
/// Shift of the view field.
pub const SORT_KEY_VIEW_SHIFT: u32 = 64 - SORT_KEY_NUM_BITS_VIEW;
/// Mask of the view field.
pub const SORT_KEY_VIEW_MASK: u64 = ((MAX_VIEWS as u64) - 1) << SORT_KEY_VIEW_SHIFT;

/// Shift of the draw bit.
pub const SORT_KEY_DRAW_BIT_SHIFT: u32 = SORT_KEY_VIEW_SHIFT - 1;
/// The draw bit; clear for compute items.
pub const SORT_KEY_DRAW_BIT: u64 = 1 << SORT_KEY_DRAW_BIT_SHIFT;

/// Bits of the draw type field.
pub const SORT_KEY_NUM_BITS_DRAW_TYPE: u32 = 2;
/// Shift of the draw type field.
pub const SORT_KEY_DRAW_TYPE_SHIFT: u32 = SORT_KEY_DRAW_BIT_SHIFT - SORT_KEY_NUM_BITS_DRAW_TYPE;
/// Mask of the draw type field.
pub const SORT_KEY_DRAW_TYPE_MASK: u64 = 3 << SORT_KEY_DRAW_TYPE_SHIFT;

/// Bits of the blend field.
pub const SORT_KEY_NUM_BITS_BLEND: u32 = 2;
/// Bits of the program field.
pub const SORT_KEY_NUM_BITS_PROGRAM: u32 = log2(MAX_PROGRAMS as usize);
/// Bits of the depth field.
pub const SORT_KEY_NUM_BITS_DEPTH: u32 = 32;
/// Bits of the sequence field.
pub const SORT_KEY_NUM_BITS_SEQ: u32 = 20;

/// Program field of items that only touch their view so it gets cleared. No
/// program is ever allocated at this index.
pub const SORT_KEY_PROGRAM_NONE: u16 = (1 << SORT_KEY_NUM_BITS_PROGRAM) - 1;

const BLEND_MASK: u64 = (1 << SORT_KEY_NUM_BITS_BLEND) - 1;
const PROGRAM_MASK: u64 = (1 << SORT_KEY_NUM_BITS_PROGRAM) - 1;
const DEPTH_MASK: u64 = (1 << SORT_KEY_NUM_BITS_DEPTH) - 1;
const SEQ_MASK: u64 = (1 << SORT_KEY_NUM_BITS_SEQ) - 1;

// Draw type 0: blend, program, depth.
const DRAW_0_BLEND_SHIFT: u32 = SORT_KEY_DRAW_TYPE_SHIFT - SORT_KEY_NUM_BITS_BLEND;
const DRAW_0_PROGRAM_SHIFT: u32 = DRAW_0_BLEND_SHIFT - SORT_KEY_NUM_BITS_PROGRAM;
const DRAW_0_DEPTH_SHIFT: u32 = DRAW_0_PROGRAM_SHIFT - SORT_KEY_NUM_BITS_DEPTH;

// Draw type 1: depth, blend, program.
const DRAW_1_DEPTH_SHIFT: u32 = SORT_KEY_DRAW_TYPE_SHIFT - SORT_KEY_NUM_BITS_DEPTH;
const DRAW_1_BLEND_SHIFT: u32 = DRAW_1_DEPTH_SHIFT - SORT_KEY_NUM_BITS_BLEND;
const DRAW_1_PROGRAM_SHIFT: u32 = DRAW_1_BLEND_SHIFT - SORT_KEY_NUM_BITS_PROGRAM;

// Draw type 2: sequence, blend, program.
const DRAW_2_SEQ_SHIFT: u32 = SORT_KEY_DRAW_TYPE_SHIFT - SORT_KEY_NUM_BITS_SEQ;
const DRAW_2_BLEND_SHIFT: u32 = DRAW_2_SEQ_SHIFT - SORT_KEY_NUM_BITS_BLEND;
const DRAW_2_PROGRAM_SHIFT: u32 = DRAW_2_BLEND_SHIFT - SORT_KEY_NUM_BITS_PROGRAM;

// Compute: sequence, program.
const COMPUTE_SEQ_SHIFT: u32 = SORT_KEY_DRAW_BIT_SHIFT - SORT_KEY_NUM_BITS_SEQ;
const COMPUTE_PROGRAM_SHIFT: u32 = COMPUTE_SEQ_SHIFT - SORT_KEY_NUM_BITS_PROGRAM;

/// Field ordering of a draw key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DrawType {
    /// Blend, program, depth.
    #[default]
    Program = 0,
    /// Depth, blend, program.
    Depth = 1,
    /// Sequence, blend, program.
    Sequence = 2,
}

impl DrawType {
    const fn from_bits(bits: u64) -> Self {
        match bits {
            1 => DrawType::Depth,
            2 => DrawType::Sequence,
            _ => DrawType::Program,
        }
    }
}

/// Unpacked sort key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SortKey {
    /// Logical view.
    pub view: ViewId,
    /// Program index.
    pub program: u16,
    /// Depth, already negated for [`ViewMode::DepthDescending`] after decode.
    pub depth: u32,
    /// Per-view submission counter.
    pub seq: u32,
    /// Quantized blend class.
    pub blend: u8,
    /// Field ordering.
    pub draw_type: DrawType,
}

impl SortKey {
    /// Packs a draw key for a view in `mode`.
    pub fn encode_draw(&self, mode: ViewMode) -> u64 {
        let view = ((self.view as u64) << SORT_KEY_VIEW_SHIFT) & SORT_KEY_VIEW_MASK;
        let blend = self.blend as u64 & BLEND_MASK;
        let program = self.program as u64 & PROGRAM_MASK;
        match mode {
            ViewMode::Default => {
                let depth = self.depth as u64 & DEPTH_MASK;
                view | SORT_KEY_DRAW_BIT
                    | ((DrawType::Program as u64) << SORT_KEY_DRAW_TYPE_SHIFT)
                    | (blend << DRAW_0_BLEND_SHIFT)
                    | (program << DRAW_0_PROGRAM_SHIFT)
                    | (depth << DRAW_0_DEPTH_SHIFT)
            }
            ViewMode::Sequential => {
                let seq = self.seq as u64 & SEQ_MASK;
                view | SORT_KEY_DRAW_BIT
                    | ((DrawType::Sequence as u64) << SORT_KEY_DRAW_TYPE_SHIFT)
                    | (seq << DRAW_2_SEQ_SHIFT)
                    | (blend << DRAW_2_BLEND_SHIFT)
                    | (program << DRAW_2_PROGRAM_SHIFT)
            }
            ViewMode::DepthAscending | ViewMode::DepthDescending => {
                let depth = if mode == ViewMode::DepthDescending {
                    !self.depth
                } else {
                    self.depth
                };
                let depth = depth as u64 & DEPTH_MASK;
                view | SORT_KEY_DRAW_BIT
                    | ((DrawType::Depth as u64) << SORT_KEY_DRAW_TYPE_SHIFT)
                    | (depth << DRAW_1_DEPTH_SHIFT)
                    | (blend << DRAW_1_BLEND_SHIFT)
                    | (program << DRAW_1_PROGRAM_SHIFT)
            }
        }
    }

    /// Packs a compute key.
    pub fn encode_compute(&self) -> u64 {
        let view = ((self.view as u64) << SORT_KEY_VIEW_SHIFT) & SORT_KEY_VIEW_MASK;
        let seq = self.seq as u64 & SEQ_MASK;
        let program = self.program as u64 & PROGRAM_MASK;
        view | (seq << COMPUTE_SEQ_SHIFT) | (program << COMPUTE_PROGRAM_SHIFT)
    }

    /// Unpacks `key`. `view_order` maps the physical view position stored in a
    /// remapped key back to the logical view id. Returns `true` for draw keys.
    pub fn decode(&mut self, key: u64, view_order: &[ViewId]) -> bool {
        let position = ((key & SORT_KEY_VIEW_MASK) >> SORT_KEY_VIEW_SHIFT) as usize;
        self.view = view_order.get(position).copied().unwrap_or(position as ViewId);

        if key & SORT_KEY_DRAW_BIT == 0 {
            self.seq = ((key >> COMPUTE_SEQ_SHIFT) & SEQ_MASK) as u32;
            self.program = ((key >> COMPUTE_PROGRAM_SHIFT) & PROGRAM_MASK) as u16;
            return false;
        }

        self.draw_type = DrawType::from_bits((key & SORT_KEY_DRAW_TYPE_MASK) >> SORT_KEY_DRAW_TYPE_SHIFT);
        let (blend_shift, program_shift) = match self.draw_type {
            DrawType::Program => {
                self.depth = ((key >> DRAW_0_DEPTH_SHIFT) & DEPTH_MASK) as u32;
                (DRAW_0_BLEND_SHIFT, DRAW_0_PROGRAM_SHIFT)
            }
            DrawType::Depth => {
                self.depth = ((key >> DRAW_1_DEPTH_SHIFT) & DEPTH_MASK) as u32;
                (DRAW_1_BLEND_SHIFT, DRAW_1_PROGRAM_SHIFT)
            }
            DrawType::Sequence => {
                self.seq = ((key >> DRAW_2_SEQ_SHIFT) & SEQ_MASK) as u32;
                (DRAW_2_BLEND_SHIFT, DRAW_2_PROGRAM_SHIFT)
            }
        };
        self.blend = ((key >> blend_shift) & BLEND_MASK) as u8;
        self.program = ((key >> program_shift) & PROGRAM_MASK) as u16;
        true
    }

    /// Raw view field of a key.
    pub fn decode_view(key: u64) -> ViewId {
        ((key & SORT_KEY_VIEW_MASK) >> SORT_KEY_VIEW_SHIFT) as ViewId
    }

    /// Rewrites the view field through `view_remap` (logical id to physical position).
    pub fn remap_view(key: u64, view_remap: &[ViewId]) -> u64 {
        let view = Self::decode_view(key) as usize;
        let remapped = view_remap.get(view).copied().unwrap_or(view as ViewId) as u64;
        (key & !SORT_KEY_VIEW_MASK) | ((remapped << SORT_KEY_VIEW_SHIFT) & SORT_KEY_VIEW_MASK)
    }

    /// Resets every field.
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// 32-bit key of a blit item: physical view in the top bits, item index below.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BlitKey {
    /// View.
    pub view: ViewId,
    /// Index into the frame's blit items.
    pub item: u16,
}

impl BlitKey {
    /// Packs the key.
    pub fn encode(&self) -> u32 {
        ((self.view as u32) << 24) | self.item as u32
    }

    /// Unpacks a key.
    pub fn decode(key: u32) -> Self {
        Self {
            view: (key >> 24) as ViewId,
            item: (key & 0xffff) as u16,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::radix_sort::radix_sort;

    fn identity_order() -> Vec<ViewId> {
        (0..MAX_VIEWS as ViewId).collect()
    }

    #[test]
    fn layout_fits_in_64_bits() {
        assert_eq!(SORT_KEY_NUM_BITS_VIEW, 8);
        assert_eq!(SORT_KEY_NUM_BITS_PROGRAM, 9);
        assert_eq!(DRAW_0_DEPTH_SHIFT, 10);
        assert_eq!(DRAW_1_PROGRAM_SHIFT, 10);
        assert!(COMPUTE_PROGRAM_SHIFT >= 10);
    }

    #[test]
    fn encode_then_decode_preserves_view_and_program() {
        let order = identity_order();
        for mode in [
            ViewMode::Default,
            ViewMode::Sequential,
            ViewMode::DepthAscending,
            ViewMode::DepthDescending,
        ] {
            let key = SortKey {
                view: 17,
                program: 301,
                depth: 1234,
                seq: 9,
                blend: 2,
                ..Default::default()
            };
            let mut decoded = SortKey::default();
            assert!(decoded.decode(key.encode_draw(mode), &order));
            assert_eq!(decoded.view, 17, "view lost in {mode:?}");
            assert_eq!(decoded.program, 301, "program lost in {mode:?}");
            assert_eq!(decoded.blend, 2, "blend lost in {mode:?}");
        }

        let compute = SortKey {
            view: 3,
            program: 7,
            seq: 5,
            ..Default::default()
        };
        let mut decoded = SortKey::default();
        assert!(!decoded.decode(compute.encode_compute(), &order));
        assert_eq!((decoded.view, decoded.program, decoded.seq), (3, 7, 5));
    }

    #[test]
    fn program_mode_orders_by_program_before_depth() {
        let a = SortKey { program: 5, depth: 100, ..Default::default() }.encode_draw(ViewMode::Default);
        let b = SortKey { program: 3, depth: 10, ..Default::default() }.encode_draw(ViewMode::Default);
        let c = SortKey { program: 3, depth: 1000, ..Default::default() }.encode_draw(ViewMode::Default);
        assert!(b < c && c < a);
    }

    #[test]
    fn descending_depth_puts_far_items_first() {
        let near = SortKey { depth: 0, ..Default::default() }.encode_draw(ViewMode::DepthDescending);
        let far = SortKey { depth: 0x00ff_ffff, ..Default::default() }.encode_draw(ViewMode::DepthDescending);
        assert!(far < near);
    }

    #[test]
    fn views_stay_contiguous_after_remap_and_sort() {
        // Render view 2 before view 0 and view 1.
        let mut remap = identity_order();
        remap[0] = 1;
        remap[1] = 2;
        remap[2] = 0;

        let mut keys: Vec<u64> = [0u16, 1, 2, 0, 2, 1, 0]
            .iter()
            .enumerate()
            .map(|(i, &view)| {
                SortKey { view, program: (7 - i) as u16, ..Default::default() }
                    .encode_draw(ViewMode::Default)
            })
            .map(|key| SortKey::remap_view(key, &remap))
            .collect();
        let mut values: Vec<u16> = (0..keys.len() as u16).collect();
        radix_sort(&mut keys, &mut values, &mut Vec::new(), &mut Vec::new());

        let views: Vec<ViewId> = keys.iter().map(|&k| SortKey::decode_view(k)).collect();
        let mut sorted = views.clone();
        sorted.sort();
        assert_eq!(views, sorted, "physical views must be contiguous");
        assert_eq!(views, vec![0, 0, 1, 1, 1, 2, 2]);
    }

    #[test]
    fn blit_keys_order_by_view_before_item() {
        let key = BlitKey { view: 4, item: 1000 }.encode();
        assert_eq!(BlitKey::decode(key), BlitKey { view: 4, item: 1000 });
        let later_view = BlitKey { view: 5, item: 0 }.encode();
        assert!(key < later_view);
    }
}
