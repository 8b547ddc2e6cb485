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

//! The submit side of the frame loop.
//!
//! A [`Context`] owns two [`Frame`]s. Encoders record into the submit frame while
//! the render loop executes the other one; [`Context::frame`] swaps them. Every
//! method takes `&self`, so a context can be shared between the threads that
//! record encoders.

mod create;
mod scene;
mod views;

use crate::encoder::Encoder;
use crate::error::InitError;
use crate::render_loop::{RenderFrame, RenderLoop};
use crate::resources::{transient_parent, Resources, TRANSIENT_PARENTS};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender, TryRecvError};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use std::time::Instant;
use tessel_core::callback::{Callback, LogCallback};
use tessel_core::config::{Init, InitLimits, Threading};
use tessel_core::error::{ErrorScope, RenderError, ResourceError};
use tessel_core::handle::*;
use tessel_core::limits::*;
use tessel_core::physics::{select_physics, PhysicsCreator};
use tessel_core::renderer::flags::{BufferFlags, DebugFlags, ResetFlags};
use tessel_core::renderer::{
    Caps, Command, EncoderStats, Frame, FrameCounters, Rect, RendererCreator, RendererType, Stats, TextureFormat, View,
    ViewMode,
};
use tessel_infra::{default_physics_creators, default_renderer_creators};

pub(crate) use views::ViewState;

pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Which encoder slots are taken this frame.
#[derive(Debug)]
struct EncoderSlots {
    busy: Vec<bool>,
    /// Thread encoders begun since the last `frame()`; each signals once it ends.
    aux_begun: usize,
}

/// Frame submission context.
pub struct Context {
    pub(crate) resources: Mutex<Resources>,
    pub(crate) submit: Mutex<Box<Frame>>,
    pub(crate) counters: FrameCounters,
    pub(crate) views: RwLock<ViewState>,
    encoder_slots: Mutex<EncoderSlots>,
    encoder_end_tx: Sender<()>,
    encoder_end_rx: Receiver<()>,
    api_tx: Sender<Box<Frame>>,
    render_rx: Receiver<Box<Frame>>,
    init_rx: Receiver<Result<(), RenderError>>,
    render_loop: Mutex<Option<RenderLoop>>,
    render_thread: Mutex<Option<JoinHandle<()>>>,
    caps: Arc<Mutex<Caps>>,
    last_stats: Mutex<Stats>,
    last_frame: Mutex<Instant>,
    threading: Threading,
    limits: InitLimits,
    pub(crate) callback: Arc<dyn Callback>,
    pub(crate) debug_checks: bool,
    shut_down: AtomicBool,
}

impl std::fmt::Debug for Context {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Context")
            .field("frame_num", &self.counters.frame_num())
            .field("threading", &self.threading)
            .field("limits", &self.limits)
            .finish_non_exhaustive()
    }
}

impl Context {
    /// Initializes with the built-in renderer and physics backends.
    pub fn init(init: Init) -> Result<Self, InitError> {
        Self::init_with(init, default_renderer_creators(), default_physics_creators())
    }

    /// Initializes with an explicit list of backends.
    ///
    /// Returns once the renderer reported its initialization, except with
    /// [`Threading::External`] where the caller must first drive the loop taken
    /// with [`take_render_loop`](Self::take_render_loop).
    pub fn init_with(
        init: Init,
        renderer_creators: Vec<RendererCreator>,
        physics_creators: Vec<PhysicsCreator>,
    ) -> Result<Self, InitError> {
        let physics = select_physics(&physics_creators, &init)?;
        let callback: Arc<dyn Callback> = init.callback.clone().unwrap_or_else(|| Arc::new(LogCallback));
        let limits = init.limits;
        let max_encoders = (limits.max_encoders as usize).clamp(1, MAX_ENCODERS);
        let min_cb = (limits.min_resource_cb_size as usize).max(MIN_RESOURCE_COMMAND_BUFFER_SIZE);

        let (api_tx, api_rx) = bounded::<Box<Frame>>(1);
        let (render_tx, render_rx) = bounded::<Box<Frame>>(1);
        let (init_tx, init_rx) = bounded(1);
        let (encoder_end_tx, encoder_end_rx) = unbounded();
        render_tx
            .send(Box::new(Frame::new(max_encoders, min_cb)))
            .map_err(|_| RenderError::InitializationFailed("render channel closed".to_owned()))?;

        let caps = Arc::new(Mutex::new(Caps::default()));
        let render_loop = RenderLoop::new(
            init.clone(),
            renderer_creators,
            api_rx,
            render_tx,
            init_tx,
            Arc::clone(&caps),
            Arc::clone(&callback),
        );

        let counters = FrameCounters::new(limits.transient_vb_size, limits.transient_ib_size);
        counters.start(0);
        let mut submit = Box::new(Frame::new(max_encoders, min_cb));
        submit.start(0);
        submit.resolution = init.resolution;
        submit.debug = init.debug;
        submit.transient_vb.handle = VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, 0));
        submit.transient_vb.size = limits.transient_vb_size;
        submit.transient_ib.handle = IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, 0));
        submit.transient_ib.size = limits.transient_ib_size;
        submit.cmd_pre.push(Command::RendererInit {
            renderer_type: init.renderer_type,
        });
        for frame_num in 0..TRANSIENT_PARENTS as u32 {
            submit.cmd_pre.push(Command::CreateDynamicVertexBuffer {
                handle: VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, frame_num)),
                size: limits.transient_vb_size,
                flags: BufferFlags::EMPTY,
            });
            submit.cmd_pre.push(Command::CreateDynamicIndexBuffer {
                handle: IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, frame_num)),
                size: limits.transient_ib_size,
                flags: BufferFlags::EMPTY,
            });
        }

        let (render_thread, render_loop) = match init.threading {
            Threading::Spawn => {
                let mut render_loop = render_loop;
                let handle = thread::Builder::new().name("tessel-render".to_owned()).spawn(move || {
                    while render_loop.render_frame(None) != RenderFrame::Exiting {}
                    log::info!("Render thread stopped");
                })?;
                (Some(handle), None)
            }
            Threading::SingleThreaded | Threading::External => (None, Some(render_loop)),
        };

        let context = Self {
            resources: Mutex::new(Resources::new(
                init.resolution,
                physics,
                Arc::clone(&callback),
                init.debug_checks,
            )),
            submit: Mutex::new(submit),
            counters,
            views: RwLock::new(ViewState::default()),
            encoder_slots: Mutex::new(EncoderSlots {
                busy: vec![false; max_encoders],
                aux_begun: 0,
            }),
            encoder_end_tx,
            encoder_end_rx,
            api_tx,
            render_rx,
            init_rx,
            render_loop: Mutex::new(render_loop),
            render_thread: Mutex::new(render_thread),
            caps,
            last_stats: Mutex::new(Stats::default()),
            last_frame: Mutex::new(Instant::now()),
            threading: init.threading,
            limits,
            callback,
            debug_checks: init.debug_checks,
            shut_down: AtomicBool::new(false),
        };

        context.frame();
        if init.threading != Threading::External {
            let result = context
                .init_rx
                .recv()
                .unwrap_or_else(|_| Err(RenderError::InitializationFailed("render loop stopped".to_owned())));
            if let Err(err) = result {
                context.abort();
                return Err(err.into());
            }
            log::info!("Context initialized with {}", context.caps().renderer_type.name());
        }
        Ok(context)
    }

    /// Stops without the shutdown handshake after the renderer failed to start.
    fn abort(&self) {
        self.shut_down.store(true, Ordering::SeqCst);
        self.join_render_thread();
    }

    /// Render loop to drive from the caller's thread, with
    /// [`Threading::External`]. Returns `None` once taken or in other modes.
    pub fn take_render_loop(&self) -> Option<RenderLoop> {
        if self.threading != Threading::External {
            return None;
        }
        lock(&self.render_loop).take()
    }

    /// Number of the frame being recorded.
    pub fn frame_num(&self) -> u32 {
        self.counters.frame_num()
    }

    /// Capabilities reported by the renderer.
    pub fn caps(&self) -> Caps {
        lock(&self.caps).clone()
    }

    /// Active renderer backend.
    pub fn renderer_type(&self) -> RendererType {
        lock(&self.caps).renderer_type
    }

    /// Statistics of the last submitted frame.
    pub fn stats(&self) -> Stats {
        lock(&self.last_stats).clone()
    }

    pub(crate) fn validate(
        &self,
        what: &'static str,
        checks: impl FnOnce(&mut ErrorScope<'_>),
    ) -> Result<(), ResourceError> {
        let mut scope = ErrorScope::new(self.callback.as_ref(), self.debug_checks, what);
        checks(&mut scope);
        scope.finish()
    }

    pub(crate) fn with_resources<R>(&self, f: impl FnOnce(&mut Resources, &mut Frame) -> R) -> R {
        let mut resources = lock(&self.resources);
        let mut submit = lock(&self.submit);
        f(&mut resources, &mut submit)
    }

    pub(crate) fn view_mode(&self, view: ViewId) -> ViewMode {
        self.views
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .views
            .get(view as usize)
            .map_or(ViewMode::Default, |v| v.mode)
    }

    // --- Encoders ---

    /// Begins an encoder. With `for_thread` one of the extra encoder slots is
    /// used, for recording on another thread; otherwise the default slot.
    /// Returns `None` when no slot is free.
    pub fn begin(&self, for_thread: bool) -> Option<Encoder<'_>> {
        if self.shut_down.load(Ordering::SeqCst) {
            return None;
        }
        let mut slots = lock(&self.encoder_slots);
        let slot = if for_thread {
            let Some(slot) = (1..slots.busy.len()).find(|&i| !slots.busy[i]) else {
                log::warn!("All {} thread encoders are in use", slots.busy.len() - 1);
                return None;
            };
            slots.aux_begun += 1;
            slot
        } else {
            if slots.busy[0] {
                log::warn!("The default encoder is already recording");
                return None;
            }
            0
        };
        slots.busy[slot] = true;
        Some(Encoder::new(self, slot, self.counters.frame_num()))
    }

    pub(crate) fn release_encoder(&self, slot: usize) {
        if slot == 0 {
            lock(&self.encoder_slots).busy[0] = false;
        } else if self.encoder_end_tx.send(()).is_err() {
            log::warn!("Encoder {slot} ended after shutdown");
        }
    }

    /// Waits until every thread encoder begun this frame has ended.
    fn wait_for_encoders(&self) {
        let begun = {
            let mut slots = lock(&self.encoder_slots);
            if slots.busy[0] {
                log::warn!("frame() called while the default encoder is recording");
            }
            std::mem::take(&mut slots.aux_begun)
        };
        for _ in 0..begun {
            if self.encoder_end_rx.recv().is_err() {
                break;
            }
        }
        let mut slots = lock(&self.encoder_slots);
        for busy in slots.busy.iter_mut().skip(1) {
            *busy = false;
        }
    }

    // --- Frame ---

    /// Finishes the frame being recorded, hands it to the render loop and starts
    /// the next one. Returns the number of the new frame.
    pub fn frame(&self) -> u32 {
        if self.shut_down.load(Ordering::SeqCst) {
            return self.counters.frame_num();
        }
        self.advance()
    }

    fn advance(&self) -> u32 {
        self.wait_for_encoders();

        let wait_start = Instant::now();
        let rendered = if self.threading == Threading::SingleThreaded {
            match self.render_rx.try_recv() {
                Ok(frame) => Some(frame),
                Err(TryRecvError::Empty) => {
                    log::error!("Single threaded render loop did not return the previous frame");
                    None
                }
                Err(TryRecvError::Disconnected) => None,
            }
        } else {
            self.render_rx.recv().ok()
        };
        let Some(mut rendered) = rendered else {
            log::error!("Render loop is gone, frame {} dropped", self.counters.frame_num());
            return self.counters.frame_num();
        };
        let wait_render_ns = wait_start.elapsed().as_nanos() as u64;

        let mut resources = lock(&self.resources);
        let mut submit = lock(&self.submit);

        resources.free_pending(&mut submit);
        self.commit_views(&resources, &mut submit);
        submit.sort();
        submit.wait_render_ns = wait_render_ns;
        let stats = self.frame_stats(&resources, &submit, wait_render_ns);
        resources.release_queued(&mut submit);
        submit.finish();

        std::mem::swap(&mut *submit, &mut rendered);
        let mut outgoing = rendered;

        // The returned frame holds the latest results; the outgoing one keeps a copy.
        outgoing.occlusion.copy_from_slice(&submit.occlusion);
        for query in resources.occlusion_resets.drain(..) {
            for frame in [&mut *submit, &mut *outgoing] {
                if let Some(result) = frame.occlusion.get_mut(query.idx() as usize) {
                    *result = OCCLUSION_NO_RESULT;
                }
            }
        }

        let frame_num = outgoing.frame_num + 1;
        submit.start(frame_num);
        self.counters.start(frame_num);
        submit.transient_vb.handle = VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, frame_num));
        submit.transient_vb.size = self.limits.transient_vb_size;
        submit.transient_ib.handle = IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, frame_num));
        submit.transient_ib.size = self.limits.transient_ib_size;
        submit.resolution = resources.resolution;
        submit.debug = outgoing.debug;
        let small = outgoing.text.is_small();
        submit
            .text
            .resize(small, resources.resolution.width, resources.resolution.height);
        drop(submit);
        drop(resources);

        log::trace!("Frame {} submitted", frame_num - 1);
        if self.api_tx.send(outgoing).is_err() {
            log::error!("Render loop is gone, frame {} dropped", frame_num - 1);
        }
        if self.threading == Threading::SingleThreaded {
            if let Some(render_loop) = lock(&self.render_loop).as_mut() {
                render_loop.render_frame(None);
            }
        }

        *lock(&self.last_stats) = stats;
        frame_num
    }

    /// Copies the view table into the submit frame, clipping each viewport to
    /// its render target.
    fn commit_views(&self, resources: &Resources, submit: &mut Frame) {
        let state = self.views.read().unwrap_or_else(PoisonError::into_inner);
        let backbuffer = Rect::new(
            0,
            0,
            resources.resolution.width.min(u16::MAX as u32) as u16,
            resources.resolution.height.min(u16::MAX as u32) as u16,
        );
        for (slot, view) in submit.views.iter_mut().zip(&state.views) {
            let mut view: View = *view;
            let target = if view.frame_buffer.is_valid() {
                resources
                    .frame_buffer_size(view.frame_buffer)
                    .map_or(Rect::default(), |(width, height)| Rect::new(0, 0, width, height))
            } else {
                backbuffer
            };
            view.rect.intersect(&target);
            if !view.scissor.is_zero() {
                view.scissor.intersect(&view.rect);
            }
            *slot = view;
        }
        submit.set_view_order(&state.order);
        submit.color_palette = state.palette;
        submit.debug = state.debug;
    }

    fn frame_stats(&self, resources: &Resources, submit: &Frame, wait_render_ns: u64) -> Stats {
        let totals = submit
            .encoder_stats
            .iter()
            .fold(EncoderStats::default(), |mut acc, stats| {
                acc.num_draws += stats.num_draws;
                acc.num_computes += stats.num_computes;
                acc.num_blits += stats.num_blits;
                acc
            });
        let now = Instant::now();
        let cpu_time_frame_ns = {
            let mut last = lock(&self.last_frame);
            let elapsed = now.duration_since(*last).as_nanos() as u64;
            *last = now;
            elapsed
        };
        Stats {
            frame_num: submit.frame_num,
            num_render_items: submit.num_render_items(),
            num_draws: totals.num_draws,
            num_computes: totals.num_computes,
            num_blits: submit.num_blit_items(),
            num_dropped: submit.num_dropped,
            encoders: submit.encoder_stats.clone(),
            live_handles: resources.live_handles(),
            transient_vb_used: self.counters.transient_vb.used(),
            transient_ib_used: self.counters.transient_ib.used(),
            width: submit.resolution.width,
            height: submit.resolution.height,
            text_width: submit.text.width(),
            text_height: submit.text.height(),
            wait_render_ns,
            cpu_time_frame_ns,
        }
    }

    // --- Backbuffer and debug ---

    /// Changes the backbuffer. Textures sized relative to the backbuffer are
    /// resized in the next frame.
    pub fn reset(&self, width: u32, height: u32, flags: ResetFlags, format: TextureFormat) {
        self.with_resources(|resources, submit| {
            resources.resolution.width = width.max(1);
            resources.resolution.height = height.max(1);
            resources.resolution.reset = flags;
            resources.resolution.format = format;
            resources.resize_ratio_textures(submit);
        });
        log::debug!("Backbuffer reset to {width}x{height}");
    }

    /// Debug features shown by the renderer.
    pub fn set_debug(&self, debug: DebugFlags) {
        self.views.write().unwrap_or_else(PoisonError::into_inner).debug = debug;
    }

    /// Clears the debug text of the frame being recorded.
    pub fn dbg_text_clear(&self, attr: u8, small: bool) {
        let resolution = lock(&self.resources).resolution;
        let mut submit = lock(&self.submit);
        submit.text.resize(small, resolution.width, resolution.height);
        submit.text.clear(attr);
    }

    /// Prints debug text at a cell position.
    pub fn dbg_text_print(&self, x: u16, y: u16, attr: u8, text: &str) {
        lock(&self.submit).text.print(x, y, attr, text);
    }

    /// Captures a frame buffer, or the backbuffer for an invalid handle, after
    /// the draws of this frame. The pixels go to [`Callback::screen_shot`].
    pub fn request_screen_shot(&self, frame_buffer: FrameBufferHandle, path: &str) {
        if frame_buffer.is_valid() && !lock(&self.resources).is_valid(frame_buffer.into()) {
            log::warn!("Screenshot of dead frame buffer {} ignored", frame_buffer.idx());
            return;
        }
        let mut submit = lock(&self.submit);
        if submit.screenshots.len() >= MAX_SCREENSHOTS {
            log::warn!("Only {MAX_SCREENSHOTS} screenshots per frame, {path} ignored");
            return;
        }
        submit.screenshots.push(tessel_core::renderer::frame::ScreenShotRequest {
            handle: frame_buffer,
            path: path.to_owned(),
        });
    }

    /// Attaches a debug name to a resource.
    pub fn set_name(&self, handle: impl Into<AnyHandle>, name: &str) {
        let handle = handle.into();
        self.with_resources(|resources, submit| resources.set_name(submit, handle, name));
    }

    /// `true` while the resource is alive.
    pub fn is_valid(&self, handle: impl Into<AnyHandle>) -> bool {
        lock(&self.resources).is_valid(handle.into())
    }

    /// `true` while the handle's index is taken in its pool. A destroyed handle
    /// stays allocated until the frame that destroyed it is swapped.
    pub fn is_allocated(&self, handle: impl Into<AnyHandle>) -> bool {
        lock(&self.resources).is_allocated(handle.into())
    }

    // --- Shutdown ---

    /// Destroys the renderer and stops the render thread. Returns the number of
    /// handles the application leaked.
    pub fn shutdown(mut self) -> usize {
        self.shutdown_inner()
    }

    fn shutdown_inner(&mut self) -> usize {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return 0;
        }
        {
            let mut submit = lock(&self.submit);
            for frame_num in 0..TRANSIENT_PARENTS as u32 {
                submit.cmd_post.push(Command::DestroyDynamicVertexBuffer {
                    handle: VertexBufferHandle(transient_parent(MAX_VERTEX_BUFFERS, frame_num)),
                });
                submit.cmd_post.push(Command::DestroyDynamicIndexBuffer {
                    handle: IndexBufferHandle(transient_parent(MAX_INDEX_BUFFERS, frame_num)),
                });
            }
            submit.cmd_pre.push(Command::RendererShutdownBegin);
            submit.cmd_post.push(Command::RendererShutdownEnd);
        }
        self.advance();

        match self.threading {
            Threading::Spawn => self.join_render_thread(),
            // Wait for the loop driven by the application to run the last frame.
            Threading::External => {
                let _ = self.render_rx.recv();
            }
            Threading::SingleThreaded => {}
        }

        let leaked = lock(&self.resources).report_leaks();
        if leaked > 0 {
            log::warn!("{leaked} handle(s) leaked at shutdown");
        }
        log::info!("Context shut down");
        leaked
    }

    fn join_render_thread(&self) {
        if let Some(handle) = lock(&self.render_thread).take() {
            if handle.join().is_err() {
                log::error!("Render thread panicked");
            }
        }
    }
}

impl Drop for Context {
    fn drop(&mut self) {
        self.shutdown_inner();
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use tessel_core::renderer::flags::DiscardFlags;
    use tessel_infra::{headless_creator, HeadlessCapture};

    pub(crate) fn headless_context(threading: Threading) -> (Context, HeadlessCapture) {
        let capture = HeadlessCapture::new();
        let init = Init {
            renderer_type: RendererType::Headless,
            threading,
            ..Init::default()
        };
        let context =
            Context::init_with(init, vec![headless_creator(capture.clone())], default_physics_creators()).unwrap();
        (context, capture)
    }

    #[test]
    fn frames_count_up_from_one() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        assert_eq!(context.frame_num(), 1);
        assert_eq!(context.frame(), 2);
        assert_eq!(context.frame(), 3);
        assert_eq!(context.renderer_type(), RendererType::Headless);
    }

    #[test]
    fn transient_parents_alternate() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let first = lock(&context.submit).transient_vb.handle;
        context.frame();
        let second = lock(&context.submit).transient_vb.handle;
        assert_ne!(first, second);
        assert_eq!(first.idx().max(second.idx()), MAX_VERTEX_BUFFERS - 1);
    }

    #[test]
    fn default_encoder_is_exclusive() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let encoder = context.begin(false).unwrap();
        assert!(context.begin(false).is_none());
        drop(encoder);
        let mut encoder = context.begin(false).unwrap();
        encoder.touch(0);
        encoder.discard(DiscardFlags::ALL);
    }

    #[test]
    fn thread_encoders_run_out() {
        let (context, _capture) = headless_context(Threading::SingleThreaded);
        let extra = MAX_ENCODERS - 1;
        let encoders: Vec<_> = (0..extra).map_while(|_| context.begin(true)).collect();
        assert_eq!(encoders.len(), extra);
        assert!(context.begin(true).is_none());
        drop(encoders);
        context.frame();
        assert!(context.begin(true).is_some());
    }

    #[test]
    fn shutdown_reports_leaks() {
        let (context, _capture) = headless_context(Threading::Spawn);
        let _leaked = context.create_uniform("u_leak", tessel_core::renderer::UniformType::Vec4, 1).unwrap();
        assert_eq!(context.shutdown(), 1);
    }
}
