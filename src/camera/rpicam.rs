//! Raspberry Pi camera backend via the `rpicam-still` command.
//!
//! Each capture shells out to `rpicam-still` (the libcamera CLI shipped
//! with Raspberry Pi OS; older installs name it `libcamera-still`). The
//! process-per-capture model means there is no persistent pipeline to
//! manage: `configure` records the requested profile and `start`/`stop`
//! bracket it by probing the binary once and releasing nothing.

use std::path::Path;
use std::process::{Command, Stdio};

use super::{CameraBackend, CameraProfile};
use crate::error::{Error, Result};

const CANDIDATE_BINARIES: &[&str] = &["rpicam-still", "libcamera-still"];

#[derive(Debug, Clone, Copy, PartialEq)]
enum Focus {
    Auto,
    /// Lens position in dioptres as understood by `--lens-position`.
    Manual(f32),
}

pub struct RpicamBackend {
    binary: &'static str,
    profile: Option<CameraProfile>,
    running: bool,
    focus: Focus,
}

impl RpicamBackend {
    /// Locate a usable capture binary.
    pub fn new() -> Result<Self> {
        let binary = CANDIDATE_BINARIES
            .iter()
            .find(|name| {
                Command::new(*name)
                    .arg("--version")
                    .stdout(Stdio::null())
                    .stderr(Stdio::null())
                    .status()
                    .map(|s| s.success())
                    .unwrap_or(false)
            })
            .copied()
            .ok_or_else(|| {
                Error::Hardware(format!(
                    "no camera binary found (tried {})",
                    CANDIDATE_BINARIES.join(", ")
                ))
            })?;

        Ok(Self {
            binary,
            profile: None,
            running: false,
            focus: Focus::Auto,
        })
    }

    fn active_profile(&self) -> Result<CameraProfile> {
        self.profile
            .ok_or_else(|| Error::Hardware("camera not configured".into()))
    }

    /// Shared capture invocation: resolution from the active profile,
    /// focus flags, output to `target` (a path or `-` for stdout).
    fn capture_command(&self, target: &str) -> Result<Command> {
        let profile = self.active_profile()?;
        let res = profile.resolution();

        let mut cmd = Command::new(self.binary);
        cmd.arg("--nopreview")
            .arg("--immediate")
            .arg("--width")
            .arg(res.width.to_string())
            .arg("--height")
            .arg(res.height.to_string())
            .arg("--output")
            .arg(target);

        match self.focus {
            Focus::Auto => {
                cmd.arg("--autofocus-mode").arg("auto");
            }
            Focus::Manual(position) => {
                cmd.arg("--autofocus-mode")
                    .arg("manual")
                    .arg("--lens-position")
                    .arg(format!("{position:.2}"));
            }
        }

        Ok(cmd)
    }

    fn run_capture(&self, mut cmd: Command) -> Result<std::process::Output> {
        let output = cmd
            .stdin(Stdio::null())
            .output()
            .map_err(|e| Error::Hardware(format!("failed to spawn {}: {e}", self.binary)))?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Hardware(format!(
                "{} exited with {}: {}",
                self.binary,
                output.status,
                stderr.trim()
            )));
        }

        Ok(output)
    }
}

impl CameraBackend for RpicamBackend {
    fn configure(&mut self, profile: CameraProfile) -> Result<()> {
        if self.running {
            return Err(Error::Hardware(
                "cannot reconfigure a running camera".into(),
            ));
        }
        log_debug!("Camera configured for {profile}");
        self.profile = Some(profile);
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        self.active_profile()?;
        self.running = true;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        self.running = false;
        Ok(())
    }

    fn capture_still(&mut self, path: &Path) -> Result<()> {
        if !self.running {
            return Err(Error::Hardware("camera not started".into()));
        }
        let target = path
            .to_str()
            .ok_or_else(|| Error::Hardware(format!("non-UTF-8 capture path {path:?}")))?;

        let cmd = self.capture_command(target)?;
        self.run_capture(cmd)?;
        Ok(())
    }

    fn capture_preview_frame(&mut self) -> Result<Vec<u8>> {
        if !self.running {
            return Err(Error::Hardware("camera not started".into()));
        }
        let mut cmd = self.capture_command("-")?;
        cmd.arg("--encoding").arg("jpg");

        let output = self.run_capture(cmd)?;
        if output.stdout.is_empty() {
            return Err(Error::Hardware("camera produced an empty frame".into()));
        }
        Ok(output.stdout)
    }

    fn set_focus(&mut self, value: u8) -> Result<()> {
        if value > 100 {
            return Err(Error::Hardware(format!("focus value {value} out of range")));
        }
        // Map 0..=100 onto 0..=10 dioptres, the usable range of the
        // official camera modules.
        self.focus = Focus::Manual(f32::from(value) / 10.0);
        Ok(())
    }

    fn autofocus(&mut self) -> Result<()> {
        self.focus = Focus::Auto;
        Ok(())
    }

    fn backend_name(&self) -> &'static str {
        self.binary
    }
}
