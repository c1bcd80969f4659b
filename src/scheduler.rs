//! The capture control loop.
//!
//! One iteration = one decision: publish status, compute today's capture
//! window, look at the clock, then either capture and sleep the
//! configured interval, or sleep toward the next boundary. Long waits are
//! capped at sixty seconds so an enable toggle or preview session started
//! from the web interface or the message bus is noticed within a minute.
//!
//! Nothing escapes an iteration: any error is logged, surfaced through
//! the status snapshot, and converted into a sixty-second retry. The loop
//! only ends when the shutdown flag drops.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use chrono::DateTime;
use chrono_tz::Tz;

use crate::config::Config;
use crate::constants::*;
use crate::controller::{CameraMode, ModeController};
use crate::error::Result;
use crate::mqtt::StatusPublisher;
use crate::sun::{self, CaptureWindow};
use crate::time_source::TimeSource;

/// Outcome of one scheduling decision.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Inside the window, enabled, not previewing: capture now.
    Capture,
    /// Nothing to do; sleep and re-evaluate.
    Sleep { duration: Duration, reason: SleepReason },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SleepReason {
    /// Window not open yet today.
    BeforeWindow,
    /// Past today's window; waiting toward tomorrow's start.
    AfterWindow,
    /// In the window but capture is disabled.
    Disabled,
    /// In the window but a preview session holds the camera.
    InPreview,
}

/// Pure per-tick decision. Extracted from the loop so the full decision
/// table is unit-testable without a camera or a clock.
pub fn decide(
    now: DateTime<Tz>,
    window: &CaptureWindow,
    enabled: bool,
    mode: CameraMode,
) -> Decision {
    if window.contains(now) && enabled && mode != CameraMode::Preview {
        return Decision::Capture;
    }

    if now > window.end {
        let until_tomorrow = (window.next_day_start() - now)
            .to_std()
            .unwrap_or(Duration::ZERO);
        return Decision::Sleep {
            duration: cap_sleep(until_tomorrow),
            reason: SleepReason::AfterWindow,
        };
    }

    if now < window.start {
        let until_start = (window.start - now).to_std().unwrap_or(Duration::ZERO);
        return Decision::Sleep {
            duration: cap_sleep(until_start),
            reason: SleepReason::BeforeWindow,
        };
    }

    // Inside the window but held back by the enable flag or a preview
    // session: full poll interval, re-check in a minute.
    let reason = if mode == CameraMode::Preview {
        SleepReason::InPreview
    } else {
        SleepReason::Disabled
    };
    Decision::Sleep {
        duration: Duration::from_secs(STATUS_POLL_CAP_SECS),
        reason,
    }
}

// Clamp a wait to 1..=60 seconds: never zero (a degenerate duration must
// not spin the loop) and never longer than the status poll cap.
fn cap_sleep(duration: Duration) -> Duration {
    Duration::from_secs(duration.as_secs().clamp(1, STATUS_POLL_CAP_SECS))
}

/// Live daemon state shared with the web layer.
#[derive(Debug, Clone, Default, serde::Serialize)]
pub struct DaemonStatus {
    pub window_start: Option<String>,
    pub window_end: Option<String>,
    pub status_message: String,
    pub uptime_seconds: u64,
}

pub type SharedStatus = Arc<Mutex<DaemonStatus>>;

pub struct Scheduler {
    controller: Arc<ModeController>,
    publisher: Option<StatusPublisher>,
    status: SharedStatus,
    time: Arc<dyn TimeSource>,
    running: Arc<AtomicBool>,
    location: crate::sun::Location,
    hours_before_sunrise: f64,
    hours_after_sunset: f64,
    interval: Duration,
    started: Instant,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        controller: Arc<ModeController>,
        publisher: Option<StatusPublisher>,
        status: SharedStatus,
        time: Arc<dyn TimeSource>,
        running: Arc<AtomicBool>,
    ) -> Self {
        Self {
            controller,
            publisher,
            status,
            time,
            running,
            location: config.location(),
            hours_before_sunrise: config.capture.hours_before_sunrise,
            hours_after_sunset: config.capture.hours_after_sunset,
            interval: Duration::from_secs(config.capture.interval_minutes * 60),
            started: Instant::now(),
        }
    }

    /// Production loop. Runs until the shutdown flag drops; a failed
    /// iteration degrades to a timed retry, never a crash.
    pub fn run(&self) {
        log_block_start!("Entering capture loop");

        while self.running.load(Ordering::SeqCst) {
            if let Err(e) = self.run_once() {
                log_pipe!();
                log_error!("Capture loop iteration failed: {e}");
                self.set_status_message(format!("error ({}): retrying in {ERROR_RETRY_SECS}s", e.kind()));
                self.idle(Duration::from_secs(ERROR_RETRY_SECS));
            }
        }

        log_block_start!("Capture loop stopped");
    }

    /// One loop iteration: publish status, compute today's window, decide,
    /// act, sleep. Public so tests can drive the loop one decision at a
    /// time.
    pub fn run_once(&self) -> Result<()> {
        self.publish_status();

        let now_local = self.time.now();
        let tz = sun::resolve_timezone(&self.location)?;
        let today = now_local.with_timezone(&tz).date_naive();
        let window = sun::compute_window(
            today,
            &self.location,
            self.hours_before_sunrise,
            self.hours_after_sunset,
        )?;
        if window.used_polar_fallback {
            log_warning!("Polar day/night at this latitude; using approximate capture window");
        }
        self.record_window(&window);

        let now = now_local.with_timezone(&window.timezone());
        let decision = decide(now, &window, self.controller.enabled(), self.controller.mode());

        match decision {
            Decision::Capture => {
                let record = self.controller.capture_once()?;
                if let Some(publisher) = &self.publisher {
                    publisher.publish_capture(&record);
                }
                self.set_status_message(format!(
                    "capturing; next photo in {} min",
                    self.interval.as_secs() / 60
                ));
                self.idle(self.interval);
            }
            Decision::Sleep { duration, reason } => {
                let message = match reason {
                    SleepReason::BeforeWindow => {
                        format!("waiting for capture window ({})", window.start.format("%H:%M"))
                    }
                    SleepReason::AfterWindow => {
                        "window closed; waiting for tomorrow".to_string()
                    }
                    SleepReason::Disabled => "capture disabled".to_string(),
                    SleepReason::InPreview => "preview active; capture suspended".to_string(),
                };
                log_debug!("{message} (sleeping {}s)", duration.as_secs());
                self.set_status_message(message);
                self.idle(duration);
            }
        }

        Ok(())
    }

    /// Smoke-test mode: a fixed number of captures at a short fixed
    /// interval, no window logic. `skip_video` mirrors the `--no-video`
    /// flag; assembly is disabled either way and only the log line
    /// differs.
    pub fn run_test_mode(&self, count: u32, interval_seconds: u64, skip_video: bool) {
        log_block_start!("Running in test mode: {count} captures at {interval_seconds}s");

        for i in 1..=count {
            if !self.running.load(Ordering::SeqCst) {
                log_decorated!("Test interrupted");
                break;
            }
            if !self.controller.enabled() {
                log_decorated!("Capture disabled, skipping remaining test photos");
                break;
            }

            log_decorated!("Taking test photo {i}/{count}");
            match self.controller.capture_once() {
                Ok(record) => {
                    if let Some(publisher) = &self.publisher {
                        publisher.publish_capture(&record);
                    }
                }
                Err(e) => log_error!("Test capture failed: {e}"),
            }
            self.publish_status();
            self.idle(Duration::from_secs(interval_seconds));
        }

        if skip_video {
            log_block_start!("Skipping video assembly (--no-video)");
        } else {
            log_block_start!("Video assembly is disabled in this build");
        }
        log_decorated!("Test completed");
    }

    fn publish_status(&self) {
        let uptime = self.started.elapsed().as_secs();
        {
            let mut status = self.status.lock().unwrap();
            status.uptime_seconds = uptime;
        }
        if let Some(publisher) = &self.publisher {
            publisher.publish_status(
                uptime,
                self.controller.enabled(),
                self.controller.last_capture().as_ref(),
            );
        }
    }

    fn record_window(&self, window: &CaptureWindow) {
        let mut status = self.status.lock().unwrap();
        status.window_start = Some(window.start.to_rfc3339());
        status.window_end = Some(window.end.to_rfc3339());
    }

    fn set_status_message(&self, message: String) {
        self.status.lock().unwrap().status_message = message;
    }

    // Interruptible sleep: one-second slices so shutdown is honored
    // promptly even mid-interval.
    fn idle(&self, duration: Duration) {
        let mut remaining = duration;
        while remaining > Duration::ZERO && self.running.load(Ordering::SeqCst) {
            let slice = remaining.min(Duration::from_secs(1));
            self.time.sleep(slice);
            remaining = remaining.saturating_sub(slice);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use chrono_tz::Tz;

    const TZ: Tz = chrono_tz::Europe::Stockholm;

    // Fixed window 06:00-20:00 on an ordinary day.
    fn fixed_window() -> CaptureWindow {
        CaptureWindow {
            start: TZ.with_ymd_and_hms(2025, 5, 10, 6, 0, 0).unwrap(),
            end: TZ.with_ymd_and_hms(2025, 5, 10, 20, 0, 0).unwrap(),
            used_polar_fallback: false,
        }
    }

    fn at(hour: u32, minute: u32) -> DateTime<Tz> {
        TZ.with_ymd_and_hms(2025, 5, 10, hour, minute, 0).unwrap()
    }

    #[test]
    fn before_window_sleeps_capped_at_sixty_seconds() {
        let decision = decide(at(5, 0), &fixed_window(), true, CameraMode::Scheduled);
        assert_eq!(
            decision,
            Decision::Sleep {
                duration: Duration::from_secs(60),
                reason: SleepReason::BeforeWindow
            }
        );
    }

    #[test]
    fn shortly_before_window_sleeps_the_remainder() {
        let decision = decide(at(5, 59), &fixed_window(), true, CameraMode::Scheduled);
        match decision {
            Decision::Sleep { duration, reason } => {
                assert_eq!(reason, SleepReason::BeforeWindow);
                assert_eq!(duration, Duration::from_secs(60));
            }
            other => panic!("unexpected decision {other:?}"),
        }

        let decision = decide(
            TZ.with_ymd_and_hms(2025, 5, 10, 5, 59, 30).unwrap(),
            &fixed_window(),
            true,
            CameraMode::Scheduled,
        );
        assert_eq!(
            decision,
            Decision::Sleep {
                duration: Duration::from_secs(30),
                reason: SleepReason::BeforeWindow
            }
        );
    }

    #[test]
    fn in_window_enabled_captures() {
        let decision = decide(at(10, 0), &fixed_window(), true, CameraMode::Scheduled);
        assert_eq!(decision, Decision::Capture);
    }

    #[test]
    fn in_window_disabled_sleeps_without_capturing() {
        let decision = decide(at(10, 0), &fixed_window(), false, CameraMode::Scheduled);
        assert_eq!(
            decision,
            Decision::Sleep {
                duration: Duration::from_secs(60),
                reason: SleepReason::Disabled
            }
        );
    }

    #[test]
    fn in_window_preview_suspends_capture() {
        let decision = decide(at(10, 0), &fixed_window(), true, CameraMode::Preview);
        assert_eq!(
            decision,
            Decision::Sleep {
                duration: Duration::from_secs(60),
                reason: SleepReason::InPreview
            }
        );
    }

    #[test]
    fn after_window_waits_for_tomorrow() {
        let decision = decide(at(21, 0), &fixed_window(), true, CameraMode::Scheduled);
        assert_eq!(
            decision,
            Decision::Sleep {
                duration: Duration::from_secs(60),
                reason: SleepReason::AfterWindow
            }
        );
    }

    #[test]
    fn window_boundaries_are_inclusive() {
        assert_eq!(
            decide(at(6, 0), &fixed_window(), true, CameraMode::Scheduled),
            Decision::Capture
        );
        assert_eq!(
            decide(at(20, 0), &fixed_window(), true, CameraMode::Scheduled),
            Decision::Capture
        );
    }

    #[test]
    fn idle_mode_does_not_block_capture_decision() {
        // Idle means a failed transition; the capture path re-arms the
        // camera, so the decision is still to capture.
        assert_eq!(
            decide(at(10, 0), &fixed_window(), true, CameraMode::Idle),
            Decision::Capture
        );
    }
}
