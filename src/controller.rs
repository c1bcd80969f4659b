//! Camera mode arbitration.
//!
//! `ModeController` is the single authority over the camera's operating
//! mode and the persisted enable flag, and the only component that calls
//! the camera backend. Every hardware reconfiguration happens under one
//! mutex (the mode lock), taken for the full stop/configure/start
//! sequence so two callers can never interleave profiles.
//!
//! The scheduler thread, the web handlers, and the message-bus command
//! thread all hold an `Arc<ModeController>` and call in concurrently;
//! serialization happens here and nowhere else. Status reads (`mode()`,
//! `enabled()`) are lock-free against an atomic mirror so a hung camera
//! call cannot freeze `/status`.

use std::path::PathBuf;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU8, Ordering};

use chrono::{DateTime, Local};

use crate::camera::{CameraBackend, CameraProfile};
use crate::error::{Error, Result};
use crate::persist::StateStore;

/// Camera operating mode. Exactly one is active; `Preview` and
/// `Scheduled` are mutually exclusive because both need exclusive
/// hardware configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CameraMode {
    /// Hardware stopped or in a failed transition; not previewing, the
    /// scheduler will not fire.
    Idle = 0,
    /// Configured for still capture; the scheduler may fire.
    Scheduled = 1,
    /// Configured for low-resolution live streaming.
    Preview = 2,
}

impl CameraMode {
    fn from_u8(value: u8) -> Self {
        match value {
            2 => CameraMode::Preview,
            1 => CameraMode::Scheduled,
            _ => CameraMode::Idle,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CameraMode::Idle => "idle",
            CameraMode::Scheduled => "scheduled",
            CameraMode::Preview => "preview",
        }
    }
}

impl std::fmt::Display for CameraMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A completed still capture.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureRecord {
    pub time: DateTime<Local>,
    pub path: PathBuf,
}

// Camera handle plus the mode it is configured for; both live behind the
// mode lock so they can only change together.
struct CameraSession {
    camera: Box<dyn CameraBackend>,
    mode: CameraMode,
}

pub struct ModeController {
    session: Mutex<CameraSession>,
    // Mirror of session.mode for lock-free status reads.
    mode_cell: AtomicU8,
    enabled: AtomicBool,
    store: StateStore,
    photos_dir: PathBuf,
    still_profile: CameraProfile,
    preview_profile: CameraProfile,
    last_capture: Mutex<Option<CaptureRecord>>,
}

impl ModeController {
    /// Take ownership of the camera, configure it for still capture, and
    /// load the persisted enable flag. The controller starts in
    /// `Scheduled`.
    pub fn new(
        mut camera: Box<dyn CameraBackend>,
        still_profile: CameraProfile,
        preview_profile: CameraProfile,
        photos_dir: PathBuf,
        store: StateStore,
    ) -> Result<Self> {
        let enabled = store.load().enabled;

        camera.configure(still_profile)?;
        camera.start()?;

        log_block_start!("Camera ready for scheduled capture");
        log_indented!("Capture {}", if enabled { "enabled" } else { "disabled" });

        Ok(Self {
            session: Mutex::new(CameraSession {
                camera,
                mode: CameraMode::Scheduled,
            }),
            mode_cell: AtomicU8::new(CameraMode::Scheduled as u8),
            enabled: AtomicBool::new(enabled),
            store,
            photos_dir,
            still_profile,
            preview_profile,
            last_capture: Mutex::new(None),
        })
    }

    /// Current mode, without taking the mode lock.
    pub fn mode(&self) -> CameraMode {
        CameraMode::from_u8(self.mode_cell.load(Ordering::SeqCst))
    }

    /// Current enable flag, without taking the mode lock.
    pub fn enabled(&self) -> bool {
        self.enabled.load(Ordering::SeqCst)
    }

    pub fn last_capture(&self) -> Option<CaptureRecord> {
        self.last_capture.lock().unwrap().clone()
    }

    /// Enable scheduled capture and persist the flag. Does not touch the
    /// camera or the mode.
    pub fn enable_capture(&self) {
        self.set_enabled(true);
    }

    /// Disable scheduled capture and persist the flag.
    pub fn disable_capture(&self) {
        self.set_enabled(false);
    }

    fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
        log_block_start!("Capture {}", if enabled { "enabled" } else { "disabled" });
        if let Err(e) = self.store.save(enabled) {
            log_warning!("Failed to persist capture state: {e:#}");
        }
    }

    /// Switch to the live-preview profile. Valid from `Idle` and
    /// `Scheduled`; a no-op when already previewing, so concurrent
    /// callers converge on one reconfiguration. A suspended capture
    /// schedule keeps its enabled flag.
    pub fn enter_preview(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        if session.mode == CameraMode::Preview {
            return Ok(());
        }

        log_block_start!("Entering preview mode");
        self.switch_profile(&mut session, self.preview_profile, CameraMode::Preview)
    }

    /// Return from preview to the still-capture profile, reloading the
    /// persisted enable flag. A no-op unless currently previewing.
    pub fn exit_preview(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        if session.mode != CameraMode::Preview {
            log_debug!("exit_preview ignored in {} mode", session.mode);
            return Ok(());
        }

        log_block_start!("Leaving preview mode");
        self.switch_profile(&mut session, self.still_profile, CameraMode::Scheduled)?;
        self.enabled.store(self.store.load().enabled, Ordering::SeqCst);
        Ok(())
    }

    /// Capture one timestamped still image, from any mode.
    ///
    /// When previewing, the preview is fully exited, the photo taken, and
    /// the preview fully restored, all under one continuous hold of the
    /// mode lock. The caller's stream stalls for a moment but survives.
    pub fn capture_once(&self) -> Result<CaptureRecord> {
        let mut session = self.session.lock().unwrap();

        match session.mode {
            CameraMode::Preview => {
                self.switch_profile(&mut session, self.still_profile, CameraMode::Scheduled)?;
                let photo = self.take_photo(&mut session);
                // Restore the preview even when the capture failed; the
                // stream owner should get their session back either way.
                self.switch_profile(&mut session, self.preview_profile, CameraMode::Preview)?;
                photo
            }
            CameraMode::Idle => {
                // A failed earlier transition left the camera stopped;
                // bring it back to the still profile first.
                self.switch_profile(&mut session, self.still_profile, CameraMode::Scheduled)?;
                self.take_photo(&mut session)
            }
            CameraMode::Scheduled => self.take_photo(&mut session),
        }
    }

    /// One JPEG frame for the live stream. Only valid while previewing.
    pub fn preview_frame(&self) -> Result<Vec<u8>> {
        let mut session = self.session.lock().unwrap();
        if session.mode != CameraMode::Preview {
            return Err(Error::Hardware("preview not active".into()));
        }
        session.camera.capture_preview_frame()
    }

    /// Set manual focus (0 = infinity, 100 = closest).
    pub fn set_focus(&self, value: u8) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        session.camera.set_focus(value)
    }

    /// Return to continuous autofocus.
    pub fn autofocus(&self) -> Result<()> {
        let mut session = self.session.lock().unwrap();
        session.camera.autofocus()
    }

    /// Best-effort hardware stop for process shutdown.
    pub fn shutdown(&self) {
        let mut session = self.session.lock().unwrap();
        if let Err(e) = session.camera.stop() {
            log_warning!("Failed to stop camera during shutdown: {e}");
        }
        session.mode = CameraMode::Idle;
        self.mode_cell.store(CameraMode::Idle as u8, Ordering::SeqCst);
    }

    // Full stop/configure/start cycle. On failure the camera is left
    // stopped and the mode drops to Idle; the scheduler's next capture
    // attempt re-runs this path.
    fn switch_profile(
        &self,
        session: &mut CameraSession,
        profile: CameraProfile,
        mode: CameraMode,
    ) -> Result<()> {
        let result = session
            .camera
            .stop()
            .and_then(|_| session.camera.configure(profile))
            .and_then(|_| session.camera.start());

        match result {
            Ok(()) => {
                session.mode = mode;
                self.mode_cell.store(mode as u8, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => {
                session.mode = CameraMode::Idle;
                self.mode_cell.store(CameraMode::Idle as u8, Ordering::SeqCst);
                log_error!("Camera reconfiguration failed: {e}");
                Err(e)
            }
        }
    }

    fn take_photo(&self, session: &mut CameraSession) -> Result<CaptureRecord> {
        let now = Local::now();
        let filename = format!("photo_{}.jpg", now.format("%Y%m%d_%H%M%S"));
        let path = self.photos_dir.join(filename);

        std::fs::create_dir_all(&self.photos_dir)
            .map_err(|e| Error::Hardware(format!("cannot create photos dir: {e}")))?;

        session.camera.capture_still(&path)?;
        log_decorated!("Photo captured: {}", path.display());

        let record = CaptureRecord { time: now, path };
        *self.last_capture.lock().unwrap() = Some(record.clone());
        Ok(record)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::camera::mock::{CameraCall, MockCamera};
    use crate::config::Resolution;

    fn profiles() -> (CameraProfile, CameraProfile) {
        (
            CameraProfile::Still(Resolution {
                width: 1920,
                height: 1080,
            }),
            CameraProfile::Preview(Resolution {
                width: 640,
                height: 480,
            }),
        )
    }

    fn controller_with_mock(dir: &std::path::Path) -> (ModeController, crate::camera::mock::CallLog) {
        crate::logger::Log::set_enabled(false);
        let (camera, calls) = MockCamera::new();
        let (still, preview) = profiles();
        let controller = ModeController::new(
            Box::new(camera),
            still,
            preview,
            dir.join("photos"),
            StateStore::new(dir.join("state.json")),
        )
        .unwrap();
        (controller, calls)
    }

    #[test]
    fn starts_in_scheduled_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller_with_mock(dir.path());
        assert_eq!(controller.mode(), CameraMode::Scheduled);
        assert!(controller.enabled());
    }

    #[test]
    fn preview_round_trip_restores_enabled_flag() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller_with_mock(dir.path());

        controller.disable_capture();
        controller.enter_preview().unwrap();
        assert_eq!(controller.mode(), CameraMode::Preview);

        controller.exit_preview().unwrap();
        assert_eq!(controller.mode(), CameraMode::Scheduled);
        assert!(!controller.enabled(), "enabled flag must survive preview");
    }

    #[test]
    fn capture_during_preview_returns_to_preview() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, calls) = controller_with_mock(dir.path());

        controller.enter_preview().unwrap();
        let record = controller.capture_once().unwrap();

        assert_eq!(controller.mode(), CameraMode::Preview);
        assert!(record.path.exists(), "capture must produce a file");

        // The hardware saw still-then-preview reconfigurations, never an
        // interleaving.
        let log = calls.lock().unwrap();
        let configures: Vec<_> = log
            .iter()
            .filter_map(|c| match c {
                CameraCall::Configure(p) => Some(p.clone()),
                _ => None,
            })
            .collect();
        assert_eq!(
            configures,
            vec![
                "still 1920x1080",
                "preview 640x480",
                "still 1920x1080",
                "preview 640x480"
            ]
        );
    }

    #[test]
    fn capture_from_scheduled_produces_timestamped_file() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller_with_mock(dir.path());

        let record = controller.capture_once().unwrap();
        let name = record.path.file_name().unwrap().to_string_lossy().into_owned();
        assert!(name.starts_with("photo_") && name.ends_with(".jpg"));
        assert_eq!(controller.last_capture().unwrap().path, record.path);
    }

    #[test]
    fn concurrent_enter_preview_reconfigures_once() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, calls) = controller_with_mock(dir.path());
        let controller = std::sync::Arc::new(controller);

        let handles: Vec<_> = (0..2)
            .map(|_| {
                let controller = controller.clone();
                std::thread::spawn(move || controller.enter_preview())
            })
            .collect();
        for handle in handles {
            handle.join().unwrap().unwrap();
        }

        assert_eq!(controller.mode(), CameraMode::Preview);
        let log = calls.lock().unwrap();
        let preview_configures = log
            .iter()
            .filter(|c| matches!(c, CameraCall::Configure(p) if p.starts_with("preview")))
            .count();
        assert_eq!(preview_configures, 1);
    }

    #[test]
    fn enable_state_persists_across_controllers() {
        let dir = tempfile::tempdir().unwrap();
        {
            let (controller, _) = controller_with_mock(dir.path());
            controller.disable_capture();
        }
        let (controller, _) = controller_with_mock(dir.path());
        assert!(!controller.enabled());
    }

    #[test]
    fn failed_transition_surfaces_and_leaves_idle() {
        crate::logger::Log::set_enabled(false);
        let dir = tempfile::tempdir().unwrap();
        let (still, preview) = profiles();

        // Build a controller around a healthy camera first, then fail.
        let (camera, _) = MockCamera::new();
        let controller = ModeController::new(
            Box::new(camera),
            still,
            preview,
            dir.path().join("photos"),
            StateStore::new(dir.path().join("state.json")),
        )
        .unwrap();

        // Swap in a failing camera via a fresh controller: constructing
        // with a failing camera must error out immediately.
        drop(controller);
        let (failing, _) = MockCamera::failing("lens fell off");
        let result = ModeController::new(
            Box::new(failing),
            still,
            preview,
            dir.path().join("photos"),
            StateStore::new(dir.path().join("state.json")),
        );
        assert!(matches!(result, Err(Error::Hardware(_))));
    }

    #[test]
    fn preview_frame_requires_preview_mode() {
        let dir = tempfile::tempdir().unwrap();
        let (controller, _) = controller_with_mock(dir.path());

        assert!(matches!(
            controller.preview_frame(),
            Err(Error::Hardware(_))
        ));

        controller.enter_preview().unwrap();
        assert!(!controller.preview_frame().unwrap().is_empty());
    }
}
