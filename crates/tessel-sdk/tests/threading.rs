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

//! Recording from several threads and the render loop threading modes.

mod common;

use std::thread;

use common::{headless, headless_with, programs};
use tessel_core::config::{Init, InitLimits, Threading};
use tessel_core::memory::Memory;
use tessel_core::renderer::flags::{BufferFlags, DiscardFlags};
use tessel_core::renderer::RendererType;
use tessel_sdk::RenderFrame;

#[test]
fn test_thread_encoders_fill_one_frame() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::Spawn);
    let programs = programs(&context, 4);
    let recorded = context.frame_num();

    // --- 2. ACT ---
    thread::scope(|scope| {
        for (view, program) in programs.iter().enumerate() {
            let context = &context;
            scope.spawn(move || {
                let mut encoder = context.begin(true).expect("a thread encoder should be free");
                for depth in 0..8 {
                    encoder.set_vertex_count(3);
                    encoder.submit(view as u16, *program, depth, DiscardFlags::ALL);
                }
            });
        }
    });
    context.frame();
    // The render thread trails by one frame.
    context.frame();

    // --- 3. ASSERT ---
    let report = capture
        .reports()
        .into_iter()
        .find(|r| r.frame_num == recorded)
        .expect("the recorded frame should have been rendered");
    assert_eq!(report.items.len(), 32, "every thread's draws arrived");
    assert!(
        report.items.windows(2).all(|w| w[0].view <= w[1].view),
        "items are sorted by view"
    );
    assert_eq!(report.views, vec![0, 1, 2, 3]);
    for item in &report.items {
        assert_eq!(item.program, programs[item.view as usize].idx(), "each view got its thread's program");
    }
}

#[test]
fn test_thread_encoders_are_limited() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless_with(Init {
        threading: Threading::SingleThreaded,
        limits: InitLimits {
            max_encoders: 2,
            ..InitLimits::default()
        },
        ..Init::default()
    });

    // --- 2. ACT ---
    let default = context.begin(false);
    let first = context.begin(true);
    let second = context.begin(true);

    // --- 3. ASSERT ---
    assert!(default.is_some());
    assert!(first.is_some(), "one thread encoder fits");
    assert!(second.is_none(), "the second one does not");
    assert!(context.begin(false).is_none(), "the default encoder is taken");
    drop((default, first));
    context.frame();
    assert!(context.begin(true).is_some(), "slots are returned at frame()");
}

#[test]
fn test_external_mode_is_driven_by_the_caller() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::External);
    let mut render_loop = context.take_render_loop().expect("external mode hands out the loop");
    assert!(context.take_render_loop().is_none(), "the loop is handed out once");
    let render_thread = thread::spawn(move || {
        let mut rendered = 0u32;
        while render_loop.render_frame(None) != RenderFrame::Exiting {
            rendered += 1;
        }
        rendered
    });

    // --- 2. ACT ---
    for _ in 0..3 {
        let mut encoder = context.begin(false).unwrap();
        encoder.touch(0);
        encoder.end();
        context.frame();
    }
    let renderer = context.renderer_type();
    let leaked = context.shutdown();
    let rendered = render_thread.join().expect("render thread should not panic");

    // --- 3. ASSERT ---
    assert_eq!(renderer, RendererType::Headless);
    assert_eq!(leaked, 0);
    assert!(rendered >= 3, "rendered {rendered} frames");
    assert!(capture.num_submits() >= 3);
}

#[test]
fn test_shutdown_reports_leaked_handles() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::Spawn);
    let _forgotten = context
        .create_index_buffer(Memory::copy(&[0u8; 12]), BufferFlags::EMPTY)
        .unwrap();

    // --- 2. ACT ---
    let leaked = context.shutdown();

    // --- 3. ASSERT ---
    assert_eq!(leaked, 1);
}
