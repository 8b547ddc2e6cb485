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

//! Defines the hierarchy of error types for the frame submission core.
//!
//! Caller bugs are [`ValidationError`]s, pool or cap exhaustion is
//! [`ResourceError::Exhausted`], and backend failures are [`RenderError`]s. None of
//! them ever cross from the render thread back to the API thread; render-side
//! failures are logged where they happen.

use crate::callback::Callback;
use crate::handle::HandleKind;
use thiserror::Error;

/// Category of a caller bug.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ValidationCode {
    /// A handle that is not alive was passed in.
    InvalidHandle,
    /// A parameter is out of range or inconsistent.
    InvalidParameter,
    /// The backend does not support the requested feature.
    MissingCapability,
    /// A uniform name clashes with a predefined uniform.
    PredefinedUniform,
    /// Vertex shader output does not match fragment shader input.
    ShaderMismatch,
    /// An occlusion query was submitted twice in one frame.
    OcclusionQueryReused,
}

/// A caller bug detected by an entry point.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{code:?}: {message}")]
pub struct ValidationError {
    /// What kind of mistake it is.
    pub code: ValidationCode,
    /// Human readable detail.
    pub message: String,
}

impl ValidationError {
    /// Creates a validation error.
    pub fn new(code: ValidationCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

/// An error related to the creation or use of a resource.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ResourceError {
    /// The caller passed something invalid.
    #[error("Validation failed: {0}")]
    Validation(#[from] ValidationError),
    /// The handle pool for this kind is full.
    #[error("No free {kind} handle left")]
    Exhausted {
        /// The pool that ran out.
        kind: HandleKind,
    },
    /// The handle does not refer to a live resource.
    #[error("Invalid {kind} handle {idx}")]
    InvalidHandle {
        /// Resource kind.
        kind: HandleKind,
        /// Raw index that was rejected.
        idx: u16,
    },
    /// A binary payload (mesh, shader, layout) could not be decoded.
    #[error("Failed to decode resource data: {0}")]
    Decode(String),
    /// An error originating from the backend implementation.
    #[error("Backend-specific resource error: {0}")]
    Backend(String),
}

impl ResourceError {
    /// Shorthand for [`ResourceError::InvalidHandle`].
    pub fn invalid_handle(kind: HandleKind, idx: u16) -> Self {
        ResourceError::InvalidHandle { kind, idx }
    }

    /// Shorthand for a [`ValidationCode::InvalidParameter`] error.
    pub fn invalid_parameter(message: impl Into<String>) -> Self {
        ResourceError::Validation(ValidationError::new(
            ValidationCode::InvalidParameter,
            message,
        ))
    }
}

/// A top-level error for renderer setup and frame processing.
#[derive(Debug, Error)]
pub enum RenderError {
    /// The backend could not be initialized.
    #[error("Renderer initialization failed: {0}")]
    InitializationFailed(String),
    /// No backend in the candidate list could be created.
    #[error("No renderer backend could be created")]
    NoBackend,
    /// The device was lost; the backend has been replaced by the noop renderer.
    #[error("Graphics device was removed")]
    DeviceRemoved,
    /// A resource operation failed.
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),
}

/// Error codes delivered to [`Callback::fatal`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Fatal {
    /// A validation check failed while debug checks are enabled.
    DebugCheck,
    /// A shader container could not be parsed.
    InvalidShader,
    /// The renderer could not be initialized.
    UnableToInitialize,
    /// A texture could not be created.
    UnableToCreateTexture,
    /// The device was lost.
    DeviceLost,
}

/// Collects the first validation failure of an entry point.
///
/// The scope logs what it records and, when `debug_checks` is on, reports it to the
/// user callback as [`Fatal::DebugCheck`]. It never panics.
pub struct ErrorScope<'a> {
    callback: &'a dyn Callback,
    debug_checks: bool,
    what: &'static str,
    error: Option<ValidationError>,
}

impl<'a> ErrorScope<'a> {
    /// Opens a scope for the entry point named `what`.
    pub fn new(callback: &'a dyn Callback, debug_checks: bool, what: &'static str) -> Self {
        Self {
            callback,
            debug_checks,
            what,
            error: None,
        }
    }

    /// Records `code` with `message` unless `condition` holds. Only the first failure is kept.
    pub fn check(&mut self, condition: bool, code: ValidationCode, message: impl FnOnce() -> String) {
        if condition || self.error.is_some() {
            return;
        }
        let err = ValidationError::new(code, message());
        log::warn!("{}: {}", self.what, err);
        if self.debug_checks {
            self.callback
                .fatal(Fatal::DebugCheck, &format!("{}: {}", self.what, err));
        }
        self.error = Some(err);
    }

    /// `true` if nothing failed so far.
    pub fn is_ok(&self) -> bool {
        self.error.is_none()
    }

    /// Closes the scope, returning the recorded failure if any.
    pub fn finish(self) -> Result<(), ResourceError> {
        match self.error {
            Some(err) => Err(ResourceError::Validation(err)),
            None => Ok(()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct RecordingCallback {
        fatals: Mutex<Vec<(Fatal, String)>>,
    }

    impl Callback for RecordingCallback {
        fn fatal(&self, code: Fatal, message: &str) {
            self.fatals.lock().unwrap().push((code, message.to_owned()));
        }
        fn trace(&self, _message: &str) {}
    }

    #[test]
    fn display_messages_are_readable() {
        let err = ResourceError::invalid_handle(HandleKind::Texture, 4);
        assert_eq!(err.to_string(), "Invalid Texture handle 4");

        let err = ResourceError::Exhausted {
            kind: HandleKind::Program,
        };
        assert_eq!(err.to_string(), "No free Program handle left");

        let err = RenderError::from(ResourceError::Decode("truncated".into()));
        assert_eq!(
            err.to_string(),
            "Resource error: Failed to decode resource data: truncated"
        );
    }

    #[test]
    fn error_scope_keeps_first_failure_only() {
        let callback = RecordingCallback::default();
        let mut scope = ErrorScope::new(&callback, false, "create_program");
        scope.check(true, ValidationCode::InvalidHandle, || "unused".into());
        assert!(scope.is_ok());
        scope.check(false, ValidationCode::ShaderMismatch, || "first".into());
        scope.check(false, ValidationCode::InvalidHandle, || "second".into());

        match scope.finish() {
            Err(ResourceError::Validation(err)) => {
                assert_eq!(err.code, ValidationCode::ShaderMismatch);
                assert_eq!(err.message, "first");
            }
            other => panic!("expected validation error, got {other:?}"),
        }
        assert!(
            callback.fatals.lock().unwrap().is_empty(),
            "no fatal callback without debug checks"
        );
    }

    #[test]
    fn error_scope_reports_fatal_with_debug_checks() {
        let callback = RecordingCallback::default();
        let mut scope = ErrorScope::new(&callback, true, "create_uniform");
        scope.check(false, ValidationCode::PredefinedUniform, || "u_model".into());
        assert!(scope.finish().is_err());

        let fatals = callback.fatals.lock().unwrap();
        assert_eq!(fatals.len(), 1);
        assert_eq!(fatals[0].0, Fatal::DebugCheck);
        assert!(fatals[0].1.contains("u_model"));
    }
}
