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

//! Occlusion queries, physics bodies and debug names.

use super::Resources;
use tessel_core::error::ResourceError;
use tessel_core::handle::*;
use tessel_core::limits::OCCLUSION_NO_RESULT;
use tessel_core::physics::BodyDesc;
use tessel_core::renderer::{Command, Frame};

impl Resources {
    pub fn create_occlusion_query(&mut self, frame: &mut Frame) -> Result<OcclusionQueryHandle, ResourceError> {
        let idx = self.alloc_handle(HandleKind::OcclusionQuery)?;
        let handle = OcclusionQueryHandle(idx);
        self.occlusion_query_refs.set(idx, ());
        if let Some(result) = frame.occlusion.get_mut(idx as usize) {
            *result = OCCLUSION_NO_RESULT;
        }
        self.occlusion_resets.push(handle);
        frame.cmd_pre.push(Command::InvalidateOcclusionQuery { handle });
        Ok(handle)
    }

    /// The index is released at the next `frame()`.
    pub fn destroy_occlusion_query(&mut self, handle: OcclusionQueryHandle) -> Result<(), ResourceError> {
        self.occlusion_query_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::OcclusionQuery, handle.idx()))?;
        self.pending.occlusion_queries.push(handle);
        Ok(())
    }

    pub fn create_body(&mut self, desc: &BodyDesc) -> Result<BodyHandle, ResourceError> {
        let idx = self.alloc_handle(HandleKind::Body)?;
        let handle = BodyHandle(idx);
        if let Err(err) = self.physics.create_body(handle, desc) {
            log::warn!("Physics rejected body {idx}: {err}");
            self.free_handle(HandleKind::Body, idx);
            return Err(ResourceError::Backend(err.to_string()));
        }
        self.body_refs.set(idx, ());
        Ok(handle)
    }

    /// The body leaves the simulation at the next `frame()`.
    pub fn destroy_body(&mut self, handle: BodyHandle) -> Result<(), ResourceError> {
        self.body_refs
            .take(handle.idx())
            .ok_or_else(|| ResourceError::invalid_handle(HandleKind::Body, handle.idx()))?;
        self.pending.bodies.push(handle);
        Ok(())
    }

    /// Names a resource for debuggers. Unknown handles are ignored.
    pub fn set_name(&mut self, frame: &mut Frame, handle: AnyHandle, name: &str) {
        if !self.is_valid(handle) {
            log::warn!("Cannot name {} {}: not a live handle", handle.kind, handle.idx);
            return;
        }
        frame.cmd_pre.push(Command::SetName {
            handle,
            name: name.to_owned(),
        });
    }
}

#[cfg(test)]
mod tests {
    use crate::resources::tests::resources;
    use tessel_core::handle::*;
    use tessel_core::limits::OCCLUSION_NO_RESULT;
    use tessel_core::physics::BodyDesc;

    #[test]
    fn new_queries_read_as_unknown() {
        let (mut res, mut frame) = resources();
        frame.occlusion[0] = 42;
        let query = res.create_occlusion_query(&mut frame).unwrap();
        assert_eq!(query.idx(), 0);
        assert_eq!(frame.occlusion[0], OCCLUSION_NO_RESULT);
        assert_eq!(res.occlusion_resets, vec![query]);
    }

    #[test]
    fn destroyed_queries_wait_for_the_next_frame() {
        let (mut res, mut frame) = resources();
        let query = res.create_occlusion_query(&mut frame).unwrap();
        res.destroy_occlusion_query(query).unwrap();
        assert!(res.is_allocated(query.into()));
        assert!(res.destroy_occlusion_query(query).is_err());

        res.free_pending(&mut frame);
        res.release_queued(&mut frame);
        assert!(!res.is_allocated(query.into()));
    }

    #[test]
    fn bodies_are_registered_with_physics() {
        let (mut res, mut frame) = resources();
        let body = res.create_body(&BodyDesc::default()).unwrap();
        assert!(res.is_valid(body.into()));
        res.destroy_body(body).unwrap();
        res.free_pending(&mut frame);
        res.release_queued(&mut frame);
        assert!(!res.is_allocated(body.into()));
    }
}
