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

//! A macro to define flag sets that travel through command buffers as raw bits.
//!
//! The generated type is a transparent wrapper over an integer. Values written into a
//! command or uniform buffer use [`bits`](#method.bits) and are rebuilt on the render
//! side with `from_bits_truncate`, so unknown bits survive the round trip.

#[macro_export]
#[doc(hidden)]
macro_rules! tessel_bitflags {
    (
        $(#[$attr:meta])*
        $vis:vis struct $name:ident: $ty:ty {
            $(
                $(#[$flag_attr:meta])*
                const $flag_name:ident = $flag_value:expr;
            )*
        }
    ) => {
        $(#[$attr])*
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Default, serde::Serialize, serde::Deserialize)]
        #[serde(transparent)]
        $vis struct $name {
            bits: $ty,
        }

        impl $name {
            /// An empty set of flags.
            pub const EMPTY: Self = Self { bits: 0 };

            /// Creates a flag set from raw bits, keeping bits that match no named flag.
            pub const fn from_bits_truncate(bits: $ty) -> Self {
                Self { bits }
            }

            /// Returns the raw value of the flag set.
            pub const fn bits(&self) -> $ty {
                self.bits
            }

            /// Returns `true` if no bit is set.
            pub const fn is_empty(&self) -> bool {
                self.bits == 0
            }

            /// Returns `true` if all flags in `other` are contained within `self`.
            pub const fn contains(&self, other: Self) -> bool {
                (self.bits & other.bits) == other.bits
            }

            /// Returns `true` if any flag in `other` is contained within `self`.
            pub const fn intersects(&self, other: Self) -> bool {
                (self.bits & other.bits) != 0
            }

            /// Inserts the flags in `other` into `self`.
            pub fn insert(&mut self, other: Self) {
                self.bits |= other.bits;
            }

            /// Removes the flags in `other` from `self`.
            pub fn remove(&mut self, other: Self) {
                self.bits &= !other.bits;
            }

            /// Returns a new `Self` with `other` flags inserted.
            #[must_use]
            pub const fn with(mut self, other: Self) -> Self {
                self.bits |= other.bits;
                self
            }

            /// Returns a new `Self` with `other` flags removed.
            #[must_use]
            pub const fn without(mut self, other: Self) -> Self {
                self.bits &= !other.bits;
                self
            }

            $(
                $(#[$flag_attr])*
                pub const $flag_name: Self = Self { bits: $flag_value };
            )*
        }

        impl core::ops::BitOr for $name {
            type Output = Self;
            fn bitor(self, other: Self) -> Self {
                Self { bits: self.bits | other.bits }
            }
        }

        impl core::ops::BitAnd for $name {
            type Output = Self;
            fn bitand(self, other: Self) -> Self {
                Self { bits: self.bits & other.bits }
            }
        }

        impl core::ops::Not for $name {
            type Output = Self;
            fn not(self) -> Self {
                Self { bits: !self.bits }
            }
        }

        impl core::ops::BitOrAssign for $name {
            fn bitor_assign(&mut self, other: Self) {
                self.bits |= other.bits;
            }
        }

        impl core::ops::BitAndAssign for $name {
            fn bitand_assign(&mut self, other: Self) {
                self.bits &= other.bits;
            }
        }

        impl core::fmt::Debug for $name {
            fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
                let mut bits = self.bits;
                let mut first_flag = true;

                write!(f, "{} {{ ", stringify!($name))?;

                $(
                    let flag: $ty = $name::$flag_name.bits;
                    if flag != 0 && (bits & flag) == flag {
                        if !first_flag {
                            write!(f, " | ")?;
                        }
                        write!(f, "{}", stringify!($flag_name))?;
                        bits &= !flag;
                        first_flag = false;
                    }
                )*

                if bits != 0 {
                    if !first_flag {
                        write!(f, " | ")?;
                    }
                    write!(f, "UNKNOWN({:#x})", bits)?;
                    first_flag = false;
                }

                if self.bits == 0 && first_flag {
                    write!(f, "EMPTY")?;
                }

                write!(f, " }}")
            }
        }
    };
}

#[cfg(test)]
mod tests {
    use crate::tessel_bitflags;

    tessel_bitflags! {
        /// Flags used only to exercise the macro.
        pub struct SampleFlags: u16 {
            const FIRST = 1 << 0;
            const SECOND = 1 << 1;
            const THIRD = 1 << 2;
            const FIRST_AND_THIRD = (1 << 0) | (1 << 2);
        }
    }

    tessel_bitflags! {
        /// Flags wider than `i32`.
        pub struct WideFlags: u64 {
            const LOW = 0x0000_0000_0000_0001;
            const HIGH = 0x8000_0000_0000_0000;
            const MASK = 0x00ff_0000_0000_0000;
        }
    }

    #[test]
    fn wide_flags_print_their_names() {
        let flags = WideFlags::HIGH | WideFlags::MASK;
        assert_eq!(format!("{flags:?}"), "WideFlags { HIGH | MASK }");
        assert_eq!(format!("{:?}", WideFlags::LOW), "WideFlags { LOW }");
    }

    #[test]
    fn empty_set_debug_prints_empty() {
        let flags = SampleFlags::EMPTY;
        assert!(flags.is_empty());
        assert_eq!(format!("{flags:?}"), "SampleFlags { EMPTY }");
    }

    #[test]
    fn combined_flags_contain_their_parts() {
        let flags = SampleFlags::FIRST | SampleFlags::THIRD;
        assert_eq!(flags, SampleFlags::FIRST_AND_THIRD);
        assert!(flags.contains(SampleFlags::FIRST));
        assert!(!flags.contains(SampleFlags::SECOND));
        assert!(flags.intersects(SampleFlags::THIRD | SampleFlags::SECOND));
    }

    #[test]
    fn unknown_bits_survive_round_trip() {
        let flags = SampleFlags::from_bits_truncate(0x8001);
        assert_eq!(flags.bits(), 0x8001);
        assert_eq!(format!("{flags:?}"), "SampleFlags { FIRST | UNKNOWN(0x8000) }");
    }

    #[test]
    fn insert_remove_and_with_without() {
        let mut flags = SampleFlags::EMPTY;
        flags.insert(SampleFlags::SECOND);
        assert!(flags.contains(SampleFlags::SECOND));
        flags.remove(SampleFlags::SECOND);
        assert!(flags.is_empty());

        let flags = SampleFlags::FIRST.with(SampleFlags::SECOND).without(SampleFlags::FIRST);
        assert_eq!(flags, SampleFlags::SECOND);
    }
}
