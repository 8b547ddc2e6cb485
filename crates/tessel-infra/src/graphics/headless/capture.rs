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

//! What the headless backend saw, shared with whoever created it.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tessel_core::handle::{AnyHandle, TextureHandle, ViewId};
use tessel_core::renderer::CommandType;

/// One backend call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeadlessEvent {
    /// A resource command reached the backend.
    Command {
        /// Which command.
        command: CommandType,
        /// Target resource.
        handle: AnyHandle,
        /// Payload size in bytes, `0` when there is none.
        size: u32,
    },
    /// A frame was submitted.
    Submit {
        /// Frame number.
        frame_num: u32,
    },
    /// The frame was presented.
    Flip,
}

/// A render item as the backend executed it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubmittedItem {
    /// Logical view.
    pub view: ViewId,
    /// Program index.
    pub program: u16,
    /// Depth bits of the sort key.
    pub depth: u32,
    /// Submission sequence within the view.
    pub seq: u32,
    /// `false` for dispatches.
    pub is_draw: bool,
    /// Primitives drawn, times instances. Zero for dispatches.
    pub samples: u32,
}

/// Summary of one submitted frame.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FrameReport {
    /// Frame number.
    pub frame_num: u32,
    /// Executed items in render order.
    pub items: Vec<SubmittedItem>,
    /// Views in the order they were entered.
    pub views: Vec<ViewId>,
    /// Views whose clear was applied.
    pub cleared: Vec<ViewId>,
    /// Executed blits as `(view, src, dst)`.
    pub blits: Vec<(ViewId, TextureHandle, TextureHandle)>,
    /// Items skipped because their view had an empty viewport.
    pub culled: u32,
    /// Handles referenced by items that the backend does not know.
    pub missing: Vec<AnyHandle>,
    /// Uniform assignments replayed.
    pub uniform_updates: u32,
    /// Transient vertex bytes uploaded.
    pub transient_vb_bytes: u32,
    /// Transient index bytes uploaded.
    pub transient_ib_bytes: u32,
}

impl FrameReport {
    pub(crate) fn new(frame_num: u32) -> Self {
        Self {
            frame_num,
            ..Self::default()
        }
    }

    /// Number of executed draws.
    pub fn num_draws(&self) -> usize {
        self.items.iter().filter(|i| i.is_draw).count()
    }

    /// Number of executed dispatches.
    pub fn num_computes(&self) -> usize {
        self.items.iter().filter(|i| !i.is_draw).count()
    }

    /// Items executed in `view`.
    pub fn items_in(&self, view: ViewId) -> impl Iterator<Item = &SubmittedItem> + '_ {
        self.items.iter().filter(move |i| i.view == view)
    }
}

#[derive(Debug, Default)]
struct CaptureState {
    events: Vec<HeadlessEvent>,
    reports: Vec<FrameReport>,
    flips: u32,
    device_removed: bool,
}

/// Cloneable view into a headless backend's activity.
///
/// The backend lives on the render thread; tests keep a clone and inspect it from
/// the submit side once a frame has completed.
#[derive(Debug, Clone, Default)]
pub struct HeadlessCapture {
    state: Arc<Mutex<CaptureState>>,
}

impl HeadlessCapture {
    /// A fresh capture.
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, CaptureState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Every recorded call.
    pub fn events(&self) -> Vec<HeadlessEvent> {
        self.lock().events.clone()
    }

    /// Commands of type `command` received so far.
    pub fn count(&self, command: CommandType) -> usize {
        self.lock()
            .events
            .iter()
            .filter(|e| matches!(e, HeadlessEvent::Command { command: c, .. } if *c == command))
            .count()
    }

    /// Commands received for `handle`, in order.
    pub fn commands_for(&self, handle: AnyHandle) -> Vec<CommandType> {
        self.lock()
            .events
            .iter()
            .filter_map(|e| match e {
                HeadlessEvent::Command { command, handle: h, .. } if *h == handle => Some(*command),
                _ => None,
            })
            .collect()
    }

    /// Every frame report.
    pub fn reports(&self) -> Vec<FrameReport> {
        self.lock().reports.clone()
    }

    /// The most recent frame report.
    pub fn last_report(&self) -> Option<FrameReport> {
        self.lock().reports.last().cloned()
    }

    /// Number of submitted frames.
    pub fn num_submits(&self) -> usize {
        self.lock().reports.len()
    }

    /// Number of presents.
    pub fn flips(&self) -> u32 {
        self.lock().flips
    }

    /// Simulates losing the device. The backend reports it on its next check.
    pub fn remove_device(&self) {
        self.lock().device_removed = true;
    }

    /// Forgets every event and report.
    pub fn clear(&self) {
        let mut state = self.lock();
        state.events.clear();
        state.reports.clear();
        state.flips = 0;
    }

    pub(crate) fn record(&self, event: HeadlessEvent) {
        self.lock().events.push(event);
    }

    pub(crate) fn push_report(&self, report: FrameReport) {
        let mut state = self.lock();
        state.events.push(HeadlessEvent::Submit {
            frame_num: report.frame_num,
        });
        state.reports.push(report);
    }

    pub(crate) fn flip(&self) {
        let mut state = self.lock();
        state.flips += 1;
        state.events.push(HeadlessEvent::Flip);
    }

    pub(crate) fn is_device_removed(&self) -> bool {
        self.lock().device_removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::handle::TextureHandle;

    #[test]
    fn clones_share_state() {
        let capture = HeadlessCapture::new();
        let backend_side = capture.clone();
        backend_side.record(HeadlessEvent::Command {
            command: CommandType::CreateTexture,
            handle: TextureHandle(3).into(),
            size: 16,
        });
        backend_side.push_report(FrameReport::new(1));
        backend_side.flip();

        assert_eq!(capture.count(CommandType::CreateTexture), 1);
        assert_eq!(capture.commands_for(TextureHandle(3).into()), vec![CommandType::CreateTexture]);
        assert_eq!(capture.num_submits(), 1);
        assert_eq!(capture.flips(), 1);

        capture.clear();
        assert!(capture.events().is_empty());
    }

    #[test]
    fn device_removal_is_sticky() {
        let capture = HeadlessCapture::new();
        assert!(!capture.is_device_removed());
        capture.remove_device();
        capture.clear();
        assert!(capture.is_device_removed());
    }
}
