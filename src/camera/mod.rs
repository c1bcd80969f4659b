//! Camera backend abstraction.
//!
//! A `CameraBackend` owns one camera and exposes the small surface the
//! mode controller needs: profile reconfiguration, start/stop, still
//! capture to a file, single preview frames, and focus control. The trait
//! keeps the controller and scheduler testable against an in-memory fake
//! and leaves hardware specifics (today: `rpicam-still` on a Raspberry
//! Pi) in one module.
//!
//! Backends do not retry and do not queue: a failed call surfaces as
//! `Error::Hardware` and the capture loop owns recovery.

use std::path::Path;

use crate::config::Resolution;
use crate::error::Result;

pub mod rpicam;

#[cfg(any(test, feature = "testing-support"))]
pub mod mock;

/// Hardware configuration profile. Exactly one is active at a time;
/// switching requires a stop/configure/start cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CameraProfile {
    /// Full-resolution still capture.
    Still(Resolution),
    /// Low-resolution live preview frames.
    Preview(Resolution),
}

impl CameraProfile {
    pub fn resolution(&self) -> Resolution {
        match self {
            CameraProfile::Still(r) | CameraProfile::Preview(r) => *r,
        }
    }
}

impl std::fmt::Display for CameraProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CameraProfile::Still(r) => write!(f, "still {r}"),
            CameraProfile::Preview(r) => write!(f, "preview {r}"),
        }
    }
}

pub trait CameraBackend: Send {
    /// Apply a hardware profile. Must be called between `stop` and
    /// `start`.
    fn configure(&mut self, profile: CameraProfile) -> Result<()>;

    /// Begin operating with the configured profile.
    fn start(&mut self) -> Result<()>;

    /// Stop the camera. Idempotent.
    fn stop(&mut self) -> Result<()>;

    /// Capture a still image to `path` using the active profile.
    fn capture_still(&mut self, path: &Path) -> Result<()>;

    /// Grab one JPEG preview frame.
    fn capture_preview_frame(&mut self) -> Result<Vec<u8>>;

    /// Set manual focus, 0 (infinity) to 100 (closest).
    fn set_focus(&mut self, value: u8) -> Result<()>;

    /// Return to continuous autofocus.
    fn autofocus(&mut self) -> Result<()>;

    /// Human-readable backend name for logs.
    fn backend_name(&self) -> &'static str;
}

/// Create the camera backend for this host.
///
/// Only the Raspberry Pi backend exists today; the indirection keeps the
/// call sites stable when another backend lands.
pub fn create_backend() -> Result<Box<dyn CameraBackend>> {
    let backend = rpicam::RpicamBackend::new()?;
    log_block_start!("Camera backend: {}", backend.backend_name());
    Ok(Box::new(backend))
}
