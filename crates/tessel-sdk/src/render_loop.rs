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

//! The render side of the frame loop.
//!
//! A [`RenderLoop`] owns the renderer backend. Each call to
//! [`render_frame`](RenderLoop::render_frame) takes one frame handed over by the
//! context, executes its `cmd_pre` commands, submits the sorted draws, takes the
//! requested screenshots, executes its `cmd_post` commands and hands the frame back.

use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;
use tessel_core::callback::Callback;
use tessel_core::config::Init;
use tessel_core::error::{Fatal, RenderError, ResourceError};
use tessel_core::renderer::flags::ResetFlags;
use tessel_core::renderer::{
    select_renderer, Caps, Command, CommandBuffer, Frame, RendererContext, RendererCreator, RendererType,
};
use tessel_infra::NoopRenderer;

/// Outcome of one [`RenderLoop::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderFrame {
    /// A frame was executed but no renderer is initialized yet.
    NoContext,
    /// A frame was rendered.
    Render,
    /// No frame was posted within the timeout. Nothing changed.
    Timeout,
    /// The renderer shut down; the loop must stop.
    Exiting,
}

/// Owner of the renderer backend, driven from the render thread.
pub struct RenderLoop {
    renderer: Option<Box<dyn RendererContext>>,
    creators: Vec<RendererCreator>,
    init: Init,
    api_rx: Receiver<Box<Frame>>,
    render_tx: Sender<Box<Frame>>,
    init_tx: Sender<Result<(), RenderError>>,
    caps: Arc<Mutex<Caps>>,
    callback: Arc<dyn Callback>,
    flipped: bool,
    flip_after_render: bool,
    exit: bool,
}

impl std::fmt::Debug for RenderLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RenderLoop")
            .field("renderer", &self.renderer.as_ref().map(|r| r.renderer_name()))
            .field("exit", &self.exit)
            .finish()
    }
}

impl RenderLoop {
    pub(crate) fn new(
        init: Init,
        creators: Vec<RendererCreator>,
        api_rx: Receiver<Box<Frame>>,
        render_tx: Sender<Box<Frame>>,
        init_tx: Sender<Result<(), RenderError>>,
        caps: Arc<Mutex<Caps>>,
        callback: Arc<dyn Callback>,
    ) -> Self {
        Self {
            renderer: None,
            creators,
            init,
            api_rx,
            render_tx,
            init_tx,
            caps,
            callback,
            flipped: true,
            flip_after_render: false,
            exit: false,
        }
    }

    /// Type of the active backend, if any.
    pub fn renderer_type(&self) -> Option<RendererType> {
        self.renderer.as_ref().map(|r| r.renderer_type())
    }

    /// `true` once the renderer has shut down or the context is gone.
    pub fn is_exiting(&self) -> bool {
        self.exit
    }

    /// Renders one frame. Waits at most `timeout` for the context to post one;
    /// `None` waits until it does.
    pub fn render_frame(&mut self, timeout: Option<Duration>) -> RenderFrame {
        if self.exit {
            return RenderFrame::Exiting;
        }

        if !self.flip_after_render {
            self.flip();
        }

        let received = match timeout {
            Some(timeout) => self.api_rx.recv_timeout(timeout),
            None => self.api_rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };
        let mut frame = match received {
            Ok(frame) => frame,
            Err(RecvTimeoutError::Timeout) => return RenderFrame::Timeout,
            Err(RecvTimeoutError::Disconnected) => {
                log::info!("Context is gone, render loop exiting");
                self.exit = true;
                return RenderFrame::Exiting;
            }
        };
        log::trace!("Rendering frame {}", frame.frame_num);
        self.flip_after_render = frame.resolution.reset.contains(ResetFlags::FLIP_AFTER_RENDER);

        self.execute(&frame.cmd_pre);

        if let Some(renderer) = self.renderer.as_deref_mut() {
            for marker in &frame.markers {
                renderer.set_marker(marker);
            }
            renderer.submit(&mut frame);
            self.flipped = false;
        }
        self.check_device();

        if let Some(renderer) = self.renderer.as_deref_mut() {
            for request in &frame.screenshots {
                renderer.request_screen_shot(request.handle, &request.path, self.callback.as_ref());
            }
        }

        self.execute(&frame.cmd_post);

        frame.cmd_pre.release_payloads();
        frame.cmd_post.release_payloads();

        let has_renderer = self.renderer.is_some();
        if self.render_tx.send(frame).is_err() {
            log::info!("Context is gone, render loop exiting");
            self.exit = true;
        }

        if self.flip_after_render {
            self.flip();
        }

        if self.exit {
            RenderFrame::Exiting
        } else if has_renderer {
            RenderFrame::Render
        } else {
            RenderFrame::NoContext
        }
    }

    fn flip(&mut self) {
        if self.flipped {
            return;
        }
        if let Some(renderer) = self.renderer.as_deref_mut() {
            renderer.flip();
        }
        self.flipped = true;
    }

    /// Replaces a lost device with the no-op backend so the loop keeps turning.
    fn check_device(&mut self) {
        let removed = self.renderer.as_ref().is_some_and(|r| r.is_device_removed());
        if !removed {
            return;
        }
        log::error!("Render device removed, falling back to the no-op renderer");
        self.callback.fatal(Fatal::DeviceLost, "Render device removed");
        let noop = NoopRenderer::new();
        self.store_caps(noop.caps());
        self.renderer = Some(Box::new(noop));
    }

    fn store_caps(&self, caps: &Caps) {
        *self.caps.lock().unwrap_or_else(PoisonError::into_inner) = caps.clone();
    }

    fn init_renderer(&mut self, renderer_type: RendererType) {
        if self.renderer.is_some() {
            log::warn!("Renderer already initialized, init command ignored");
            return;
        }
        self.init.renderer_type = renderer_type;
        let result = select_renderer(&self.creators, &self.init).map(|renderer| {
            log::info!("Renderer initialized: {}", renderer.renderer_name());
            self.store_caps(renderer.caps());
            self.renderer = Some(renderer);
        });
        if let Err(err) = &result {
            log::error!("Renderer initialization failed: {err}");
            self.callback.fatal(Fatal::UnableToInitialize, &err.to_string());
            self.exit = true;
        }
        // Nobody waits on the result in externally driven setups.
        let _ = self.init_tx.send(result);
    }

    fn execute(&mut self, buffer: &CommandBuffer) {
        for command in buffer.commands() {
            let command = match command {
                Ok(command) => command,
                Err(err) => {
                    log::error!("Command buffer is corrupted: {err}");
                    break;
                }
            };
            log::trace!("Executing {:?}", command.command_type());
            match command {
                Command::End => break,
                Command::RendererInit { renderer_type } => self.init_renderer(renderer_type),
                Command::RendererShutdownBegin => log::info!("Renderer shutting down"),
                Command::RendererShutdownEnd => {
                    if let Some(renderer) = self.renderer.take() {
                        log::info!("Renderer {} destroyed", renderer.renderer_name());
                    }
                    self.exit = true;
                }
                command => {
                    let Some(renderer) = self.renderer.as_deref_mut() else {
                        log::warn!("{:?} dropped, no renderer", command.command_type());
                        continue;
                    };
                    let ty = command.command_type();
                    if let Err(err) = dispatch(renderer, command, self.callback.as_ref()) {
                        log::error!("{ty:?} failed: {err}");
                    }
                }
            }
        }
    }
}

/// Forwards one resource command to the backend.
fn dispatch(
    renderer: &mut dyn RendererContext,
    command: Command,
    callback: &dyn Callback,
) -> Result<(), ResourceError> {
    match command {
        Command::CreateVertexLayout { handle, layout } => renderer.create_vertex_layout(handle, &layout),
        Command::CreateIndexBuffer { handle, mem, flags } => renderer.create_index_buffer(handle, &mem, flags)?,
        Command::CreateVertexBuffer {
            handle,
            mem,
            layout,
            flags,
        } => renderer.create_vertex_buffer(handle, &mem, layout, flags)?,
        Command::CreateDynamicIndexBuffer { handle, size, flags } => {
            renderer.create_dynamic_index_buffer(handle, size, flags)?
        }
        Command::UpdateDynamicIndexBuffer {
            handle,
            offset,
            size,
            mem,
        } => renderer.update_dynamic_index_buffer(handle, offset, size, &mem),
        Command::CreateDynamicVertexBuffer { handle, size, flags } => {
            renderer.create_dynamic_vertex_buffer(handle, size, flags)?
        }
        Command::UpdateDynamicVertexBuffer {
            handle,
            offset,
            size,
            mem,
        } => renderer.update_dynamic_vertex_buffer(handle, offset, size, &mem),
        Command::CreateShader { handle, mem } => {
            if let Err(err) = renderer.create_shader(handle, &mem) {
                callback.fatal(Fatal::InvalidShader, &format!("Shader {}: {err}", handle.idx()));
                return Err(err);
            }
        }
        Command::CreateProgram { handle, vsh, fsh } => renderer.create_program(handle, vsh, fsh)?,
        Command::CreateTexture { handle, desc, mem } => {
            if let Err(err) = renderer.create_texture(handle, &desc, mem.as_ref()) {
                callback.fatal(Fatal::UnableToCreateTexture, &format!("Texture {}: {err}", handle.idx()));
                return Err(err);
            }
        }
        Command::UpdateTexture {
            handle,
            side,
            mip,
            rect,
            pitch,
            mem,
        } => renderer.update_texture(handle, side, mip, &rect, pitch, &mem),
        Command::ResizeTexture {
            handle,
            width,
            height,
            num_mips,
            num_layers,
        } => renderer.resize_texture(handle, width, height, num_mips, num_layers),
        Command::CreateFrameBuffer {
            handle,
            window,
            attachments,
        } => match window {
            Some(window) => renderer.create_frame_buffer_window(handle, &window)?,
            None => renderer.create_frame_buffer(handle, &attachments)?,
        },
        Command::CreateUniform { handle, ty, num, name } => renderer.create_uniform(handle, ty, num, &name),
        Command::UpdateViewName { view, name } => renderer.update_view_name(view, &name),
        Command::InvalidateOcclusionQuery { handle } => renderer.invalidate_occlusion_query(handle),
        Command::SetName { handle, name } => renderer.set_name(handle, &name),
        Command::DestroyVertexLayout { handle } => renderer.destroy_vertex_layout(handle),
        Command::DestroyIndexBuffer { handle } => renderer.destroy_index_buffer(handle),
        Command::DestroyVertexBuffer { handle } => renderer.destroy_vertex_buffer(handle),
        Command::DestroyDynamicIndexBuffer { handle } => renderer.destroy_dynamic_index_buffer(handle),
        Command::DestroyDynamicVertexBuffer { handle } => renderer.destroy_dynamic_vertex_buffer(handle),
        Command::DestroyShader { handle } => renderer.destroy_shader(handle),
        Command::DestroyProgram { handle } => renderer.destroy_program(handle),
        Command::DestroyTexture { handle } => renderer.destroy_texture(handle),
        Command::DestroyFrameBuffer { handle } => renderer.destroy_frame_buffer(handle),
        Command::DestroyUniform { handle } => renderer.destroy_uniform(handle),
        Command::ReadTexture { handle, mip, target } => renderer.read_texture(handle, mip, &target),
        Command::RendererInit { .. } | Command::RendererShutdownBegin | Command::RendererShutdownEnd | Command::End => {}
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::callback::LogCallback;
    use tessel_core::handle::IndexBufferHandle;
    use tessel_core::memory::Memory;
    use tessel_core::renderer::flags::BufferFlags;
    use tessel_core::renderer::CommandType;
    use tessel_infra::{headless_creator, HeadlessCapture};

    struct Harness {
        render_loop: RenderLoop,
        api_tx: Sender<Box<Frame>>,
        render_rx: Receiver<Box<Frame>>,
        init_rx: Receiver<Result<(), RenderError>>,
        capture: HeadlessCapture,
    }

    fn harness() -> Harness {
        let capture = HeadlessCapture::new();
        let (api_tx, api_rx) = crossbeam_channel::bounded(1);
        let (render_tx, render_rx) = crossbeam_channel::bounded(1);
        let (init_tx, init_rx) = crossbeam_channel::bounded(1);
        let render_loop = RenderLoop::new(
            Init::default(),
            vec![headless_creator(capture.clone())],
            api_rx,
            render_tx,
            init_tx,
            Arc::new(Mutex::new(Caps::default())),
            Arc::new(LogCallback),
        );
        Harness {
            render_loop,
            api_tx,
            render_rx,
            init_rx,
            capture,
        }
    }

    fn frame_with(pre: &[Command], post: &[Command]) -> Box<Frame> {
        let mut frame = Box::new(Frame::new(1, 256));
        for command in pre {
            frame.cmd_pre.push(command.clone());
        }
        for command in post {
            frame.cmd_post.push(command.clone());
        }
        frame.finish();
        frame
    }

    #[test]
    fn times_out_without_a_frame() {
        let mut h = harness();
        assert_eq!(
            h.render_loop.render_frame(Some(Duration::from_millis(1))),
            RenderFrame::Timeout
        );
        assert!(h.render_loop.renderer_type().is_none());
    }

    #[test]
    fn frames_without_init_report_no_context() {
        let mut h = harness();
        h.api_tx.send(frame_with(&[], &[])).unwrap();
        assert_eq!(h.render_loop.render_frame(None), RenderFrame::NoContext);
        assert!(h.render_rx.try_recv().is_ok(), "the frame must be handed back");
    }

    #[test]
    fn init_then_commands_reach_the_backend_in_order() {
        let mut h = harness();
        let handle = IndexBufferHandle(0);
        h.api_tx
            .send(frame_with(
                &[
                    Command::RendererInit {
                        renderer_type: RendererType::Count,
                    },
                    Command::CreateIndexBuffer {
                        handle,
                        mem: Memory::copy(&[0u8; 12]),
                        flags: BufferFlags::EMPTY,
                    },
                ],
                &[Command::DestroyIndexBuffer { handle }],
            ))
            .unwrap();

        assert_eq!(h.render_loop.render_frame(None), RenderFrame::Render);
        assert!(h.init_rx.try_recv().unwrap().is_ok());
        assert_eq!(h.render_loop.renderer_type(), Some(RendererType::Headless));
        assert_eq!(
            h.capture.commands_for(handle.into()),
            vec![CommandType::CreateIndexBuffer, CommandType::DestroyIndexBuffer]
        );
        assert_eq!(h.capture.num_submits(), 1);
    }

    #[test]
    fn shutdown_end_stops_the_loop() {
        let mut h = harness();
        h.api_tx
            .send(frame_with(
                &[Command::RendererInit {
                    renderer_type: RendererType::Headless,
                }],
                &[Command::RendererShutdownEnd],
            ))
            .unwrap();
        assert_eq!(h.render_loop.render_frame(None), RenderFrame::Exiting);
        assert!(h.render_loop.is_exiting());
        assert!(h.render_loop.renderer_type().is_none());
        assert_eq!(h.render_loop.render_frame(None), RenderFrame::Exiting);
    }

    #[test]
    fn removed_device_falls_back_to_noop() {
        let mut h = harness();
        h.api_tx
            .send(frame_with(
                &[Command::RendererInit {
                    renderer_type: RendererType::Headless,
                }],
                &[],
            ))
            .unwrap();
        h.render_loop.render_frame(None);
        h.render_rx.try_recv().unwrap();

        h.capture.remove_device();
        h.api_tx.send(frame_with(&[], &[])).unwrap();
        assert_eq!(h.render_loop.render_frame(None), RenderFrame::Render);
        assert_eq!(h.render_loop.renderer_type(), Some(RendererType::Noop));
    }

    #[test]
    fn disconnected_context_exits() {
        let mut h = harness();
        drop(h.api_tx);
        assert_eq!(h.render_loop.render_frame(None), RenderFrame::Exiting);
    }
}
