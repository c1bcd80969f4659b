//! In-memory camera for tests.
//!
//! Records every call so tests can assert on the exact reconfiguration
//! sequence, writes a tiny placeholder JPEG for still captures, and can
//! be told to fail any operation to exercise error paths.

use std::path::Path;
use std::sync::{Arc, Mutex};

use super::{CameraBackend, CameraProfile};
use crate::error::{Error, Result};

/// Minimal JPEG header bytes; enough for content-type sniffing in tests.
const FAKE_JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10, 0x4A, 0x46, 0x49, 0x46];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CameraCall {
    Configure(String),
    Start,
    Stop,
    CaptureStill(String),
    PreviewFrame,
    SetFocus(u8),
    Autofocus,
}

/// Shared journal of calls, cloneable so tests keep a handle while the
/// controller owns the backend.
pub type CallLog = Arc<Mutex<Vec<CameraCall>>>;

pub struct MockCamera {
    calls: CallLog,
    profile: Option<CameraProfile>,
    running: bool,
    /// When set, every hardware call fails with this message.
    fail_with: Option<String>,
    /// When set, only capture calls fail; reconfiguration still works.
    fail_captures_with: Option<String>,
}

impl MockCamera {
    pub fn new() -> (Self, CallLog) {
        let calls: CallLog = Arc::new(Mutex::new(Vec::new()));
        (
            Self {
                calls: calls.clone(),
                profile: None,
                running: false,
                fail_with: None,
                fail_captures_with: None,
            },
            calls,
        )
    }

    pub fn failing(message: &str) -> (Self, CallLog) {
        let (mut camera, calls) = Self::new();
        camera.fail_with = Some(message.to_string());
        (camera, calls)
    }

    /// A camera that configures and starts fine but cannot take a
    /// picture, for exercising the loop's error downgrade.
    pub fn failing_captures(message: &str) -> (Self, CallLog) {
        let (mut camera, calls) = Self::new();
        camera.fail_captures_with = Some(message.to_string());
        (camera, calls)
    }

    fn record(&self, call: CameraCall) {
        self.calls.lock().unwrap().push(call);
    }

    fn check_failure(&self) -> Result<()> {
        match &self.fail_with {
            Some(msg) => Err(Error::Hardware(msg.clone())),
            None => Ok(()),
        }
    }

    fn check_capture_failure(&self) -> Result<()> {
        self.check_failure()?;
        match &self.fail_captures_with {
            Some(msg) => Err(Error::Hardware(msg.clone())),
            None => Ok(()),
        }
    }
}

impl CameraBackend for MockCamera {
    fn configure(&mut self, profile: CameraProfile) -> Result<()> {
        self.record(CameraCall::Configure(profile.to_string()));
        self.check_failure()?;
        if self.running {
            return Err(Error::Hardware(
                "cannot reconfigure a running camera".into(),
            ));
        }
        self.profile = Some(profile);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.record(CameraCall::Start);
        self.check_failure()?;
        if self.profile.is_none() {
            return Err(Error::Hardware("camera not configured".into()));
        }
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.record(CameraCall::Stop);
        self.check_failure()?;
        self.running = false;
        Ok(())
    }

    fn capture_still(&mut self, path: &Path) -> Result<()> {
        self.record(CameraCall::CaptureStill(path.display().to_string()));
        self.check_capture_failure()?;
        if !self.running {
            return Err(Error::Hardware("camera not started".into()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, FAKE_JPEG)?;
        Ok(())
    }

    fn capture_preview_frame(&mut self) -> Result<Vec<u8>> {
        self.record(CameraCall::PreviewFrame);
        self.check_capture_failure()?;
        if !self.running {
            return Err(Error::Hardware("camera not started".into()));
        }
        Ok(FAKE_JPEG.to_vec())
    }

    fn set_focus(&mut self, value: u8) -> Result<()> {
        self.record(CameraCall::SetFocus(value));
        self.check_failure()
    }

    fn autofocus(&mut self) -> Result<()> {
        self.record(CameraCall::Autofocus);
        self.check_failure()
    }

    fn backend_name(&self) -> &'static str {
        "mock"
    }
}
