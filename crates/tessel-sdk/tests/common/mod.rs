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

#![allow(dead_code)]

use tessel_core::config::{Init, Threading};
use tessel_core::handle::{ProgramHandle, ShaderHandle};
use tessel_core::memory::Memory;
use tessel_core::renderer::shader::{ShaderBinary, ShaderStage};
use tessel_core::renderer::RendererType;
use tessel_infra::{default_physics_creators, headless_creator, HeadlessCapture};
use tessel_sdk::Context;

/// Interface hash shared by every test vertex/fragment pair.
pub const VARYINGS: u32 = 0x5eed_f00d;

/// A context on the headless backend plus a handle to inspect what it received.
pub fn headless(threading: Threading) -> (Context, HeadlessCapture) {
    headless_with(Init {
        threading,
        ..Init::default()
    })
}

/// Same as [`headless`] with a custom configuration.
pub fn headless_with(init: Init) -> (Context, HeadlessCapture) {
    let _ = env_logger::builder().is_test(true).try_init();
    let capture = HeadlessCapture::new();
    let init = Init {
        renderer_type: RendererType::Headless,
        ..init
    };
    let context = Context::init_with(init, vec![headless_creator(capture.clone())], default_physics_creators())
        .expect("headless context should initialize");
    (context, capture)
}

pub fn vertex_shader(context: &Context, code: u8) -> ShaderHandle {
    let bin = ShaderBinary::new(ShaderStage::Vertex, 0, VARYINGS, vec![code; 4]);
    context
        .create_shader(Memory::from_vec(bin.encode()))
        .expect("vertex shader should be accepted")
}

pub fn fragment_shader(context: &Context) -> ShaderHandle {
    let bin = ShaderBinary::new(ShaderStage::Fragment, VARYINGS, 0, vec![0xf5; 4]);
    context
        .create_shader(Memory::from_vec(bin.encode()))
        .expect("fragment shader should be accepted")
}

/// `count` distinct programs; the i-th one has index i in a fresh context.
pub fn programs(context: &Context, count: u8) -> Vec<ProgramHandle> {
    let fsh = fragment_shader(context);
    (0..count)
        .map(|i| {
            let vsh = vertex_shader(context, i);
            context
                .create_program(vsh, fsh, false)
                .expect("program should link")
        })
        .collect()
}
