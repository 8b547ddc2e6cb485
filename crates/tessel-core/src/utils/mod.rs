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

//! Small helpers shared by every crate of the workspace.

pub mod bitflags;
pub mod reader;

/// Rounds `value` up to the next multiple of `align`.
///
/// `align` does not need to be a power of two; a zero alignment returns `value`.
#[inline]
pub const fn align_up(value: u32, align: u32) -> u32 {
    if align == 0 {
        return value;
    }
    let rem = value % align;
    if rem == 0 {
        value
    } else {
        value + (align - rem)
    }
}

/// Rounds `value` up to the next multiple of 16.
#[inline]
pub const fn align_16(value: u32) -> u32 {
    (value + 15) & !15
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn align_up_handles_non_power_of_two_strides() {
        assert_eq!(align_up(0, 12), 0);
        assert_eq!(align_up(1, 12), 12);
        assert_eq!(align_up(24, 12), 24);
        assert_eq!(align_up(25, 12), 36);
        assert_eq!(align_up(7, 0), 7);
    }

    #[test]
    fn align_16_rounds_to_sixteen() {
        assert_eq!(align_16(0), 0);
        assert_eq!(align_16(1), 16);
        assert_eq!(align_16(16), 16);
        assert_eq!(align_16(33), 48);
    }
}
