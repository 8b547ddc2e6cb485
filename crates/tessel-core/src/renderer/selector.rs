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

//! Renderer backend selection.
//!
//! Backends register a [`RendererCreator`]. At init every supported creator gets a
//! score from its platform priority plus a large bonus when its type was requested;
//! creators are then tried in descending score order and the first one that
//! initializes wins.

use super::traits::RendererContext;
use super::types::RendererType;
use crate::config::Init;
use crate::error::RenderError;
use std::sync::Arc;

/// Score bonus of the requested backend.
pub const REQUESTED_BONUS: u32 = 1000;

/// Constructor of a backend.
pub type CreateRendererFn = dyn Fn(&Init) -> Result<Box<dyn RendererContext>, RenderError> + Send + Sync;

/// A backend registration.
#[derive(Clone)]
pub struct RendererCreator {
    /// Backend type.
    pub renderer_type: RendererType,
    /// Display name.
    pub name: &'static str,
    /// Platform priority; higher is preferred.
    pub priority: u32,
    /// Whether the backend can run on this platform at all.
    pub supported: bool,
    /// Constructor.
    pub create: Arc<CreateRendererFn>,
}

impl RendererCreator {
    /// Registers `create` as the constructor of `renderer_type`.
    pub fn new<F>(renderer_type: RendererType, name: &'static str, priority: u32, supported: bool, create: F) -> Self
    where
        F: Fn(&Init) -> Result<Box<dyn RendererContext>, RenderError> + Send + Sync + 'static,
    {
        Self {
            renderer_type,
            name,
            priority,
            supported,
            create: Arc::new(create),
        }
    }
}

impl std::fmt::Debug for RendererCreator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RendererCreator")
            .field("renderer_type", &self.renderer_type)
            .field("name", &self.name)
            .field("priority", &self.priority)
            .field("supported", &self.supported)
            .finish()
    }
}

/// Supported creators in the order they will be tried.
pub fn rank_renderers(creators: &[RendererCreator], requested: RendererType) -> Vec<&RendererCreator> {
    let mut ranked: Vec<(u32, usize, &RendererCreator)> = creators
        .iter()
        .enumerate()
        .filter(|(_, c)| c.supported)
        .map(|(i, c)| {
            let bonus = if c.renderer_type == requested { REQUESTED_BONUS } else { 0 };
            (c.priority + bonus, i, c)
        })
        .collect();
    // Descending score, registration order on ties.
    ranked.sort_by(|a, b| b.0.cmp(&a.0).then(a.1.cmp(&b.1)));
    ranked.into_iter().map(|(_, _, c)| c).collect()
}

/// Creates the best backend for `init`.
pub fn select_renderer(
    creators: &[RendererCreator],
    init: &Init,
) -> Result<Box<dyn RendererContext>, RenderError> {
    for creator in rank_renderers(creators, init.renderer_type) {
        match (creator.create)(init) {
            Ok(renderer) => {
                log::info!("Renderer backend selected: {}", creator.name);
                return Ok(renderer);
            }
            Err(e) => log::warn!("Renderer backend '{}' failed to initialize: {}", creator.name, e),
        }
    }
    log::error!("No renderer backend could be initialized");
    Err(RenderError::NoBackend)
}
