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

//! Renderer backends.

mod headless;
mod noop;

pub use headless::{FrameReport, HeadlessCapture, HeadlessEvent, HeadlessRenderer, SubmittedItem};
pub use noop::NoopRenderer;

use tessel_core::renderer::{RendererCreator, RendererType};

/// Priority of the headless backend when no type is requested.
pub const HEADLESS_PRIORITY: u32 = 10;
/// Priority of the no-op backend when no type is requested.
pub const NOOP_PRIORITY: u32 = 0;

/// Every backend this crate provides. With no explicit request the headless
/// backend is preferred over the no-op one.
pub fn default_renderer_creators() -> Vec<RendererCreator> {
    vec![headless_creator(HeadlessCapture::default()), noop_creator()]
}

/// Registration of [`NoopRenderer`].
pub fn noop_creator() -> RendererCreator {
    RendererCreator::new(RendererType::Noop, "Noop", NOOP_PRIORITY, true, |_| {
        Ok(Box::new(NoopRenderer::new()))
    })
}

/// Registration of a [`HeadlessRenderer`] reporting into `capture`.
pub fn headless_creator(capture: HeadlessCapture) -> RendererCreator {
    RendererCreator::new(
        RendererType::Headless,
        "Headless",
        HEADLESS_PRIORITY,
        true,
        move |init| Ok(Box::new(HeadlessRenderer::new(init, capture.clone()))),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use tessel_core::config::Init;
    use tessel_core::renderer::select_renderer;

    #[test]
    fn auto_selection_prefers_headless() {
        let renderer = select_renderer(&default_renderer_creators(), &Init::default()).unwrap();
        assert_eq!(renderer.renderer_type(), RendererType::Headless);
    }

    #[test]
    fn explicit_request_wins() {
        let init = Init {
            renderer_type: RendererType::Noop,
            ..Init::default()
        };
        let renderer = select_renderer(&default_renderer_creators(), &init).unwrap();
        assert_eq!(renderer.renderer_type(), RendererType::Noop);
    }

    #[test]
    fn unavailable_request_falls_back() {
        let init = Init {
            renderer_type: RendererType::Vulkan,
            ..Init::default()
        };
        let renderer = select_renderer(&default_renderer_creators(), &init).unwrap();
        assert_eq!(renderer.renderer_type(), RendererType::Headless);
    }
}
