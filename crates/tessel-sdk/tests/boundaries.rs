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

//! Edge cases at the limits of buffers, views and devices.

mod common;

use common::{fragment_shader, headless, headless_with, programs, vertex_shader};
use tessel_core::config::{Init, InitLimits, Threading};
use tessel_core::limits::{MAX_DRAW_CALLS, MAX_UNIFORM_ARRAY_SIZE};
use tessel_core::memory::Memory;
use tessel_core::renderer::command_buffer::CommandType;
use tessel_core::renderer::flags::{BufferFlags, DiscardFlags, ResetFlags, TextureFlags};
use tessel_core::renderer::types::OcclusionQueryResult;
use tessel_core::renderer::{
    Attrib, AttribType, BackbufferRatio, RendererType, TextureFormat, UniformType, VertexLayout,
};

#[test]
fn test_uniforms_with_the_same_name_share_a_handle() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);

    // --- 2. ACT ---
    let first = context.create_uniform("u_tint", UniformType::Vec4, 1).unwrap();
    let second = context.create_uniform("u_tint", UniformType::Mat4, 2).unwrap();

    // --- 3. ASSERT ---
    assert_eq!(first, second, "a name maps to one uniform");
    let info = context.uniform_info(first).unwrap();
    assert_eq!(info.ty, UniformType::Mat4, "the type grows to the largest request");
    assert_eq!(info.num, 2);

    context.destroy_uniform(first).unwrap();
    assert!(context.is_valid(first), "one reference is still held");
    context.destroy_uniform(second).unwrap();
    assert!(!context.is_valid(first));
}

#[test]
fn test_transient_index_buffer_grants_what_fits() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless_with(Init {
        threading: Threading::SingleThreaded,
        limits: InitLimits {
            transient_ib_size: 64,
            ..InitLimits::default()
        },
        ..Init::default()
    });

    // --- 2. ACT ---
    let full = context.alloc_transient_index_buffer(28, false);
    let partial = context.alloc_transient_index_buffer(10, false);
    let empty = context.alloc_transient_index_buffer(1, false);

    // --- 3. ASSERT ---
    assert_eq!(full.num_indices(), 28);
    assert_eq!(context.get_avail_transient_index_buffer(10, false), 0);
    assert_eq!(partial.num_indices(), 4, "only 8 bytes were left");
    assert_eq!(partial.start_index, 28);
    assert_eq!(empty.num_indices(), 0);

    // The next frame starts with the whole buffer again.
    context.frame();
    assert_eq!(context.get_avail_transient_index_buffer(32, false), 32);
}

#[test]
fn test_dynamic_index_buffer_without_resize_keeps_its_size() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let dib = context
        .create_dynamic_index_buffer(4, BufferFlags::EMPTY, None)
        .unwrap();
    let before = context.dynamic_index_buffer_info(dib).unwrap();

    // --- 2. ACT ---
    context
        .update_dynamic_index_buffer(dib, 2, Memory::copy(&[1u8; 32]))
        .unwrap();

    // --- 3. ASSERT ---
    let after = context.dynamic_index_buffer_info(dib).unwrap();
    assert_eq!(after.size, before.size, "the write was truncated instead");
    assert_eq!(after.parent, before.parent);
    context.destroy_dynamic_index_buffer(dib).unwrap();
}

#[test]
fn test_texture_read_back_completes_after_the_frame() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let pixels: Vec<u8> = (0..16u8).collect();
    let texture = context
        .create_texture_2d(2, 2, false, 1, TextureFormat::RGBA8, TextureFlags::READ_BACK, Some(Memory::copy(&pixels)))
        .unwrap();
    let recording = context.frame_num();

    // --- 2. ACT ---
    let (ready_at, slot) = context.read_texture(texture, 0).unwrap();
    assert!(!slot.is_ready(), "nothing is read before the frame is rendered");
    context.frame();

    // --- 3. ASSERT ---
    assert_eq!(ready_at, recording + 2);
    assert_eq!(slot.take(), Some(pixels));
    context.destroy_texture(texture).unwrap();
}

#[test]
fn test_views_outside_the_backbuffer_are_culled() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::SingleThreaded);
    let programs = programs(&context, 1);
    // Clipping to the 1280x720 backbuffer leaves nothing.
    context.set_view_rect(1, 4000, 4000, 16, 16);

    // --- 2. ACT ---
    {
        let mut encoder = context.begin(false).unwrap();
        encoder.set_vertex_count(3);
        encoder.submit(0, programs[0], 0, DiscardFlags::ALL);
        encoder.set_vertex_count(3);
        encoder.submit(1, programs[0], 0, DiscardFlags::ALL);
    }
    context.frame();

    // --- 3. ASSERT ---
    let report = capture.last_report().unwrap();
    assert_eq!(report.culled, 1, "the draw in view 1 is skipped");
    assert_eq!(report.items.len(), 1);
    assert_eq!(report.items[0].view, 0);
}

#[test]
fn test_occlusion_result_arrives_two_frames_later() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let programs = programs(&context, 1);
    let query = context.create_occlusion_query().unwrap();
    assert_eq!(context.get_result(query), OcclusionQueryResult::NoResult);

    // --- 2. ACT ---
    {
        let mut encoder = context.begin(false).unwrap();
        encoder.set_vertex_count(3);
        encoder.submit_occlusion_query(0, programs[0], query, 0, DiscardFlags::ALL);
    }
    context.frame();
    let after_one = context.get_result(query);
    context.frame();

    // --- 3. ASSERT ---
    assert_eq!(after_one, OcclusionQueryResult::NoResult, "still in flight");
    assert_eq!(context.get_result(query), OcclusionQueryResult::Visible(3));
    context.destroy_occlusion_query(query).unwrap();
    assert_eq!(context.get_result(query), OcclusionQueryResult::NoResult);
}

#[test]
fn test_removed_device_falls_back_to_noop() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::SingleThreaded);
    assert_eq!(context.renderer_type(), RendererType::Headless);

    // --- 2. ACT ---
    capture.remove_device();
    context.frame();
    context.frame();

    // --- 3. ASSERT ---
    assert_eq!(context.renderer_type(), RendererType::Noop);
    // Recording keeps working against the fallback.
    let ib = context
        .create_index_buffer(Memory::copy(&[0u8; 6]), BufferFlags::EMPTY)
        .unwrap();
    context.frame();
    context.destroy_index_buffer(ib).unwrap();
}

#[test]
fn test_stats_count_the_submitted_frame() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let programs = programs(&context, 2);

    // --- 2. ACT ---
    {
        let mut encoder = context.begin(false).unwrap();
        for program in &programs {
            encoder.set_vertex_count(3);
            encoder.submit(0, *program, 0, DiscardFlags::ALL);
        }
        // Nothing bound: dropped.
        encoder.submit(0, programs[0], 0, DiscardFlags::ALL);
        encoder.touch(2);
    }
    let submitted = context.frame_num();
    context.frame();

    // --- 3. ASSERT ---
    let stats = context.stats();
    assert_eq!(stats.frame_num, submitted);
    assert_eq!(stats.num_render_items, 3, "two draws and a touch");
    assert_eq!(stats.num_draws, 3);
    assert_eq!(stats.num_dropped, 1, "the draw without geometry");
}

#[test]
fn test_reset_resizes_backbuffer_ratio_textures() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::SingleThreaded);
    let fb = context
        .create_frame_buffer_scaled(BackbufferRatio::Half, TextureFormat::RGBA8, TextureFlags::EMPTY)
        .unwrap();
    let texture = context.get_texture(fb, 0).expect("the frame buffer owns one texture");
    assert_eq!(context.texture_info(texture).map(|i| (i.width, i.height)), Some((640, 360)));

    // --- 2. ACT ---
    context.reset(800, 600, ResetFlags::EMPTY, TextureFormat::BGRA8);
    context.frame();

    // --- 3. ASSERT ---
    assert_eq!(context.texture_info(texture).map(|i| (i.width, i.height)), Some((400, 300)));
    assert!(
        capture.commands_for(texture.into()).contains(&CommandType::ResizeTexture),
        "the backend was told about the new size"
    );
    context.destroy_frame_buffer(fb).unwrap();
}

#[test]
fn test_uniform_arrays_are_capped_at_the_opcode_width() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);

    // --- 2. ACT ---
    let largest = context.create_uniform("u_bones", UniformType::Mat4, MAX_UNIFORM_ARRAY_SIZE);
    let too_large = context.create_uniform("u_lights", UniformType::Vec4, MAX_UNIFORM_ARRAY_SIZE + 1);

    // --- 3. ASSERT ---
    let largest = largest.expect("1023 elements fit");
    assert_eq!(context.uniform_info(largest).map(|i| i.num), Some(1023));
    assert!(too_large.is_err(), "1024 elements are rejected");
    context.destroy_uniform(largest).unwrap();
}

#[test]
fn test_rebinding_a_stream_uses_the_new_vertex_count() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::SingleThreaded);
    let programs = programs(&context, 1);
    let layout = VertexLayout::begin()
        .add(Attrib::Position, 4, AttribType::Float, false, false)
        .end();
    let small = context
        .create_vertex_buffer(Memory::copy(&[0u8; 3 * 16]), &layout, BufferFlags::EMPTY)
        .unwrap();
    let large = context
        .create_vertex_buffer(Memory::copy(&[0u8; 6 * 16]), &layout, BufferFlags::EMPTY)
        .unwrap();

    // --- 2. ACT ---
    {
        let mut encoder = context.begin(false).unwrap();
        encoder.set_vertex_buffer(0, small, 0, u32::MAX);
        encoder.submit(0, programs[0], 0, DiscardFlags::STATE);
        encoder.set_vertex_buffer(0, large, 0, u32::MAX);
        encoder.submit(0, programs[0], 1, DiscardFlags::ALL);
        encoder.set_vertex_count(2);
        encoder.set_vertex_buffer(0, large, 0, u32::MAX);
        encoder.submit(0, programs[0], 2, DiscardFlags::ALL);
    }
    context.frame();

    // --- 3. ASSERT ---
    let report = capture.last_report().unwrap();
    let mut samples: Vec<(u32, u32)> = report.items.iter().map(|i| (i.depth, i.samples)).collect();
    samples.sort();
    assert_eq!(samples, vec![(0, 3), (1, 6), (2, 6)], "bound streams decide the count");
    context.destroy_vertex_buffer(small).unwrap();
    context.destroy_vertex_buffer(large).unwrap();
}

#[test]
fn test_destroyed_program_relinks_to_the_same_handle() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let vsh = vertex_shader(&context, 1);
    let fsh = fragment_shader(&context);
    let first = context.create_program(vsh, fsh, false).unwrap();

    // --- 2. ACT ---
    context.destroy_program(first).unwrap();
    let second = context.create_program(vsh, fsh, false).unwrap();
    context.frame();

    // --- 3. ASSERT ---
    assert_eq!(first, second, "the pair maps back to its program");
    assert!(context.is_valid(second), "the relinked program survives the swap");
    context.destroy_program(second).unwrap();
    context.destroy_shader(vsh).unwrap();
    context.destroy_shader(fsh).unwrap();
    context.frame();
    assert!(!context.is_allocated(second));
}

#[test]
fn test_render_items_past_the_limit_are_dropped() {
    // --- 1. ARRANGE ---
    let (context, capture) = headless(Threading::SingleThreaded);
    let programs = programs(&context, 1);

    // --- 2. ACT ---
    {
        let mut encoder = context.begin(false).unwrap();
        for _ in 0..MAX_DRAW_CALLS + 5 {
            encoder.set_vertex_count(3);
            encoder.submit(0, programs[0], 0, DiscardFlags::ALL);
        }
    }
    context.frame();

    // --- 3. ASSERT ---
    let stats = context.stats();
    assert_eq!(stats.num_render_items, MAX_DRAW_CALLS, "the frame is full");
    assert_eq!(stats.num_draws, MAX_DRAW_CALLS);
    assert_eq!(stats.num_dropped, 5, "every draw past the limit is counted");
    assert_eq!(capture.last_report().unwrap().num_draws(), MAX_DRAW_CALLS as usize);
}

#[test]
fn test_dynamic_vertex_buffer_sizes_past_u32_are_rejected() {
    // --- 1. ARRANGE ---
    let (context, _capture) = headless(Threading::SingleThreaded);
    let layout = VertexLayout::begin()
        .add(Attrib::Position, 4, AttribType::Float, false, false)
        .end();
    let huge = u32::MAX / 16;

    // --- 2. ACT ---
    let oversized = context.create_dynamic_vertex_buffer(huge, &layout, BufferFlags::EMPTY, None);
    let dvb = context
        .create_dynamic_vertex_buffer(4, &layout, BufferFlags::ALLOW_RESIZE, None)
        .unwrap();
    let before = context.dynamic_vertex_buffer_info(dvb).unwrap();
    let grown = context.update_dynamic_vertex_buffer(dvb, huge, Memory::copy(&[0u8; 16]));

    // --- 3. ASSERT ---
    assert!(oversized.is_err(), "the padded size does not fit in u32");
    assert_eq!(dvb.idx(), 0, "the rejected buffer took no handle");
    assert!(grown.is_err(), "the resize does not fit in u32");
    let after = context.dynamic_vertex_buffer_info(dvb).unwrap();
    assert_eq!((after.parent, after.start, after.size), (before.parent, before.start, before.size));
    context.destroy_dynamic_vertex_buffer(dvb).unwrap();
}
