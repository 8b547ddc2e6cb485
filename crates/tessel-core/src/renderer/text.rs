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

//! Character grid for debug text. Drawing it is up to the backend.

/// Glyph width in pixels.
pub const FONT_WIDTH: u32 = 8;
/// Glyph height in pixels for the regular font.
pub const FONT_HEIGHT: u32 = 16;
/// Glyph height in pixels for the small font.
pub const FONT_HEIGHT_SMALL: u32 = 8;

/// One grid cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TextCell {
    /// ASCII character.
    pub ch: u8,
    /// Background nibble (high) and foreground nibble (low) palette colors.
    pub attr: u8,
}

/// Debug text grid sized from the backbuffer resolution.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TextVideoMem {
    width: u16,
    height: u16,
    small: bool,
    cells: Vec<TextCell>,
}

impl Default for TextVideoMem {
    fn default() -> Self {
        let mut mem = Self {
            width: 0,
            height: 0,
            small: false,
            cells: Vec::new(),
        };
        mem.resize(false, 1, 1);
        mem
    }
}

impl TextVideoMem {
    /// Columns.
    pub fn width(&self) -> u16 {
        self.width
    }

    /// Rows.
    pub fn height(&self) -> u16 {
        self.height
    }

    /// Uses the 8 pixel font.
    pub fn is_small(&self) -> bool {
        self.small
    }

    /// Resizes the grid to cover `width` x `height` pixels. The grid is cleared
    /// only if its dimensions change.
    pub fn resize(&mut self, small: bool, width: u32, height: u32) {
        let glyph_height = if small { FONT_HEIGHT_SMALL } else { FONT_HEIGHT };
        let cols = (width / FONT_WIDTH).clamp(1, u16::MAX as u32) as u16;
        let rows = (height / glyph_height).clamp(1, u16::MAX as u32) as u16;
        if cols != self.width || rows != self.height || small != self.small {
            self.small = small;
            self.width = cols;
            self.height = rows;
            self.cells = vec![TextCell::default(); cols as usize * rows as usize];
        }
    }

    /// Fills the grid with spaces of `attr`.
    pub fn clear(&mut self, attr: u8) {
        self.cells.fill(TextCell { ch: b' ', attr });
    }

    /// Writes `text` at column `x`, row `y`. Output is clipped to the grid.
    ///
    /// `ESC [ n m` sequences switch the attribute to `n` for the rest of the text.
    pub fn print(&mut self, x: u16, y: u16, attr: u8, text: &str) {
        if x >= self.width || y >= self.height {
            return;
        }
        let row = y as usize * self.width as usize;
        let mut col = x as usize;
        let mut attr = attr;
        let bytes = text.as_bytes();
        let mut i = 0;
        while i < bytes.len() && col < self.width as usize {
            if bytes[i] == 0x1b && bytes.get(i + 1) == Some(&b'[') {
                let digits_start = i + 2;
                let digits_end = bytes[digits_start..]
                    .iter()
                    .position(|b| !b.is_ascii_digit())
                    .map_or(bytes.len(), |p| digits_start + p);
                if bytes.get(digits_end) == Some(&b'm') {
                    if let Ok(value) = text[digits_start..digits_end].parse::<u8>() {
                        attr = value;
                    }
                    i = digits_end + 1;
                    continue;
                }
            }
            let ch = if bytes[i].is_ascii() { bytes[i] } else { b'?' };
            self.cells[row + col] = TextCell { ch, attr };
            col += 1;
            i += 1;
        }
    }

    /// Cell at column `x`, row `y`.
    pub fn cell(&self, x: u16, y: u16) -> Option<TextCell> {
        if x >= self.width || y >= self.height {
            return None;
        }
        self.cells.get(y as usize * self.width as usize + x as usize).copied()
    }

    /// Characters of one row.
    pub fn row_text(&self, y: u16) -> String {
        if y >= self.height {
            return String::new();
        }
        let start = y as usize * self.width as usize;
        self.cells[start..start + self.width as usize]
            .iter()
            .map(|c| if c.ch == 0 { ' ' } else { c.ch as char })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn grid_follows_resolution() {
        let mut mem = TextVideoMem::default();
        mem.resize(false, 1280, 720);
        assert_eq!((mem.width(), mem.height()), (160, 45));
        mem.resize(true, 1280, 720);
        assert_eq!((mem.width(), mem.height()), (160, 90));
    }

    #[test]
    fn print_clips_and_applies_escapes() {
        let mut mem = TextVideoMem::default();
        mem.resize(false, 80, 32);
        mem.clear(0);
        mem.print(6, 0, 0x0f, "ab\x1b[3mcdef");
        assert_eq!(mem.row_text(0), "      abcd");
        assert_eq!(mem.cell(7, 0).map(|c| c.attr), Some(0x0f));
        assert_eq!(mem.cell(8, 0).map(|c| c.attr), Some(3));
        mem.print(0, 5, 0, "out of range");
        assert_eq!(mem.row_text(1), "          ");
    }
}
