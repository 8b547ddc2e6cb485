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

//! Allocators backing resource handles and dynamic buffer ranges.

mod handle_alloc;
mod handle_hash_map;
mod non_local;

pub use handle_alloc::HandleAlloc;
pub use handle_hash_map::HandleHashMap;
pub use non_local::{
    address_offset, address_parent, make_address, NonLocalAllocator, MIN_BLOCK_SIZE, NON_LOCAL_INVALID,
};
