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

// Tessel headless demo
// Balls fall on a floor; each worker thread records a share of them per frame.

use std::thread;

use anyhow::Result;
use tessel_infra::{default_physics_creators, headless_creator, HeadlessCapture};
use tessel_sdk::prelude::*;
use tessel_sdk::tessel_core::physics::{BodyDesc, BodyShape, BodyType, GroundState};
use tessel_sdk::tessel_core::renderer::shader::{ShaderBinary, ShaderStage};
use tessel_sdk::tessel_data::EntityQuery;

const NUM_BALLS: usize = 64;
const NUM_WORKERS: usize = 4;
const NUM_FRAMES: u32 = 120;
const VARYINGS: u32 = 0x0b0b_0b0b;

/// Component linking an entity to its rigid body.
#[repr(C)]
#[derive(Copy, Clone, Debug, bytemuck::Pod, bytemuck::Zeroable)]
struct Ball {
    body: BodyHandle,
    color: u16,
}

const PALETTE: [[f32; 4]; 4] = [
    [0.9, 0.2, 0.2, 1.0],
    [0.2, 0.9, 0.2, 1.0],
    [0.2, 0.2, 0.9, 1.0],
    [0.9, 0.9, 0.2, 1.0],
];

fn create_program(context: &Context) -> Result<ProgramHandle> {
    let vs = ShaderBinary::new(ShaderStage::Vertex, 0, VARYINGS, b"ball.vs".to_vec());
    let fs = ShaderBinary::new(ShaderStage::Fragment, VARYINGS, 0, b"ball.fs".to_vec());
    let vsh = context.create_shader(Memory::from_vec(vs.encode()))?;
    let fsh = context.create_shader(Memory::from_vec(fs.encode()))?;
    Ok(context.create_program(vsh, fsh, true)?)
}

fn spawn_balls(context: &Context, ball_type: u32) -> Result<Vec<EntityHandle>> {
    let mut entities = Vec::with_capacity(NUM_BALLS);
    for i in 0..NUM_BALLS {
        let body = context.create_body(&BodyDesc {
            position: Vec3::new((i % 8) as f32 - 3.5, 2.0 + (i / 8) as f32, 0.0),
            shape: BodyShape::Sphere(0.4),
            ..BodyDesc::default()
        })?;
        let entity = context.create_entity(true)?;
        let component = context.create_component_from(&Ball {
            body,
            color: (i % PALETTE.len()) as u16,
        })?;
        context.add_component(entity, component, ball_type)?;
        entities.push(entity);
    }
    Ok(entities)
}

/// Resources shared by every recording thread.
struct Scene {
    program: ProgramHandle,
    tint: UniformHandle,
    layout: VertexLayoutHandle,
    quad: [Vec3; 4],
}

/// Records the draws of `balls` into a thread encoder.
fn record(context: &Context, balls: &[EntityHandle], scene: &Scene) {
    let Some(mut encoder) = context.begin(true) else {
        log::warn!("No encoder available, {} balls skipped", balls.len());
        return;
    };
    let quad: &[u8] = bytemuck::cast_slice(scene.quad.as_slice());
    for entity in balls {
        let Some(ball) = context.read_component::<Ball>(*entity) else {
            continue;
        };
        let Some(position) = context.body_position(ball.body) else {
            continue;
        };
        let Ok(mut tvb) = context.alloc_transient_vertex_buffer(4, scene.layout) else {
            break;
        };
        if tvb.num_vertices() < 4 {
            log::warn!("Transient vertex buffer exhausted");
            break;
        }
        tvb.data.copy_from_slice(quad);

        encoder.set_transform(&[Mat4::from_translation(position)]);
        encoder.set_uniform_pod(scene.tint, &PALETTE[ball.color as usize][..]);
        encoder.set_transient_vertex_buffer(0, &tvb, 0, 4);
        encoder.set_state(StateFlags::DEFAULT, 0);
        // Sorted back to front by height.
        let depth = (position.y.max(0.0) * 1000.0) as u32;
        encoder.submit(0, scene.program, depth, DiscardFlags::ALL);
    }
    encoder.end();
}

fn main() -> Result<()> {
    env_logger::init();

    let capture = HeadlessCapture::new();
    let init = Init {
        renderer_type: RendererType::Headless,
        threading: Threading::Spawn,
        ..Init::default()
    };
    let context = Context::init_with(init, vec![headless_creator(capture.clone())], default_physics_creators())?;
    log::info!("Running on {}", context.renderer_type().name());

    context.set_view_clear(0, ClearFlags::COLOR | ClearFlags::DEPTH, 0x3030_30ff, 1.0, 0);
    context.set_view_rect(0, 0, 0, 1280, 720);
    context.set_view_mode(0, ViewMode::DepthDescending);

    let scene = Scene {
        program: create_program(&context)?,
        tint: context.create_uniform("u_tint", UniformType::Vec4, 1)?,
        layout: context.create_vertex_layout(
            &VertexLayout::begin()
                .add(Attrib::Position, 3, AttribType::Float, false, false)
                .end(),
        )?,
        quad: [
            Vec3::new(-0.4, -0.4, 0.0),
            Vec3::new(0.4, -0.4, 0.0),
            Vec3::new(0.4, 0.4, 0.0),
            Vec3::new(-0.4, 0.4, 0.0),
        ],
    };
    let floor = context.create_body(&BodyDesc {
        position: Vec3::new(0.0, -0.5, 0.0),
        shape: BodyShape::Box(Vec3::new(10.0, 0.5, 10.0)),
        body_type: BodyType::Static,
        ..BodyDesc::default()
    })?;

    let ball_type = context.register_component_type::<Ball>();
    let entities = spawn_balls(&context, ball_type)?;

    let mut query = EntityQuery::new();
    for _ in 0..NUM_FRAMES {
        context.simulate(1.0 / 60.0);
        context.query_entities(&[ball_type], &mut query);
        let balls = query.entities();
        let share = balls.len().div_ceil(NUM_WORKERS).max(1);

        thread::scope(|scope| {
            for chunk in balls.chunks(share) {
                let context = &context;
                let scene = &scene;
                scope.spawn(move || record(context, chunk, scene));
            }
        });

        context.dbg_text_clear(0, false);
        context.dbg_text_print(1, 1, 0x0f, &format!("frame {}", context.frame_num()));
        context.frame();
    }

    let stats = context.stats();
    log::info!(
        "Last frame: {} draws, {} dropped, {} transient vertex bytes",
        stats.num_draws,
        stats.num_dropped,
        stats.transient_vb_used
    );
    if let Some(report) = capture.last_report() {
        log::info!(
            "Frame {} rendered {} items in {} views",
            report.frame_num,
            report.items.len(),
            report.views.len()
        );
    }
    let resting = entities
        .iter()
        .filter_map(|e| context.read_component::<Ball>(*e))
        .filter(|ball| context.ground_info(ball.body).state == GroundState::OnGround)
        .count();
    log::info!("{resting} of {NUM_BALLS} balls resting on the floor");

    for entity in entities {
        if let Some(ball) = context.read_component::<Ball>(entity) {
            context.destroy_body(ball.body)?;
        }
        context.destroy_entity(entity)?;
    }
    context.destroy_body(floor)?;
    context.destroy_vertex_layout(scene.layout)?;
    context.destroy_uniform(scene.tint)?;
    context.destroy_program(scene.program)?;

    let leaked = context.shutdown();
    if leaked > 0 {
        anyhow::bail!("{leaked} handle(s) leaked");
    }
    Ok(())
}
