//! Binary entry point and high-level flow coordination.
//!
//! Dispatches the parsed CLI action, then for daemon runs coordinates
//! startup in order: configuration, log file, signal handling, the
//! single-instance lock, camera and controller, optional MQTT and web
//! surfaces, and finally the capture loop. Shutdown walks the same list
//! in reverse — stop the camera, announce `offline`, join the web
//! thread, release the lock.

use std::fs::{File, OpenOptions};
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};

use anyhow::{Context, Result};
use fs2::FileExt;

use heliocam::args::{self, CliAction, ParsedArgs, RunOptions};
use heliocam::camera::{self, CameraProfile};
use heliocam::config::Config;
use heliocam::constants::EXIT_FAILURE;
use heliocam::controller::ModeController;
use heliocam::logger::Log;
use heliocam::persist::StateStore;
use heliocam::scheduler::{DaemonStatus, Scheduler, SharedStatus};
use heliocam::signals::setup_signal_handler;
use heliocam::time_source::RealTimeSource;
use heliocam::web::AppState;
use heliocam::{
    log_block_start, log_debug, log_end, log_indented, log_pipe, log_version, log_warning, mqtt,
    web,
};

fn main() -> Result<()> {
    let parsed = ParsedArgs::from_env();

    match parsed.action {
        CliAction::ShowVersion => {
            args::display_version_info();
            Ok(())
        }
        CliAction::ShowHelp => {
            args::display_help();
            Ok(())
        }
        CliAction::ShowHelpDueToError => {
            args::display_help();
            std::process::exit(EXIT_FAILURE);
        }
        CliAction::CaptureOnce {
            debug_enabled,
            config_dir,
        } => run_capture_once(debug_enabled, config_dir.as_deref()),
        CliAction::Run(options) => run_daemon(options),
    }
}

fn still_profile(config: &Config) -> CameraProfile {
    CameraProfile::Still(config.capture.resolution)
}

fn preview_profile(config: &Config) -> CameraProfile {
    CameraProfile::Preview(config.capture.preview_resolution)
}

/// `--capture`: one photo, then exit. Useful for wiring checks and cron
/// jobs that want a frame outside the schedule.
fn run_capture_once(debug_enabled: bool, config_dir: Option<&str>) -> Result<()> {
    Log::set_debug(debug_enabled);
    log_version!();

    let config = Config::load(config_dir)?;
    Log::init_file(&config.log_file())?;

    let camera = camera::create_backend()?;
    let controller = ModeController::new(
        camera,
        still_profile(&config),
        preview_profile(&config),
        config.photos_dir(),
        StateStore::new(config.state_file()),
    )?;

    let record = controller.capture_once()?;
    log_block_start!("Captured {}", record.path.display());

    controller.shutdown();
    log_end!();
    Ok(())
}

fn run_daemon(options: RunOptions) -> Result<()> {
    Log::set_debug(options.debug_enabled);
    log_version!();

    if options.debug_enabled {
        log_pipe!();
        log_debug!("Debug mode enabled - showing detailed operations");
    }

    let config = Config::load(options.config_dir.as_deref())?;

    std::fs::create_dir_all(config.photos_dir())
        .with_context(|| format!("failed to create {}", config.photos_dir().display()))?;
    Log::init_file(&config.log_file())?;
    config.log_config();

    let signal_state = setup_signal_handler(options.debug_enabled)?;

    // One daemon per camera: hold an exclusive lock for the process
    // lifetime. flock is released by the kernel on any exit, so a stale
    // file from a hard kill never blocks the next start.
    let (lock_file, lock_path) = acquire_instance_lock()?;
    log_block_start!("Lock acquired, starting heliocam...");

    let camera = camera::create_backend()?;
    let controller = Arc::new(ModeController::new(
        camera,
        still_profile(&config),
        preview_profile(&config),
        config.photos_dir(),
        StateStore::new(config.state_file()),
    )?);

    let publisher = if config.mqtt.enabled {
        match mqtt::connect(&config.mqtt, controller.clone(), signal_state.running.clone()) {
            Ok(publisher) => Some(publisher),
            Err(e) => {
                log_pipe!();
                log_warning!("MQTT unavailable: {e}");
                log_indented!("Continuing without status publishing");
                None
            }
        }
    } else {
        None
    };

    let status: SharedStatus = Arc::new(Mutex::new(DaemonStatus::default()));

    let web_enabled = options.web_enabled || config.web.enabled;
    let web_handle = if web_enabled {
        let port = options.web_port.unwrap_or(config.web.port);
        let state = AppState {
            controller: controller.clone(),
            status: status.clone(),
            log_file: config.log_file(),
        };
        Some(web::spawn_server(port, state, signal_state.running.clone())?)
    } else {
        None
    };

    let scheduler = Scheduler::new(
        &config,
        controller.clone(),
        publisher.clone(),
        status,
        Arc::new(RealTimeSource),
        signal_state.running.clone(),
    );

    if options.test_mode {
        scheduler.run_test_mode(
            config.capture.test_capture_count,
            config.capture.test_interval_seconds,
            options.skip_video,
        );
    } else {
        scheduler.run();
    }

    // Ordered shutdown; also reached when test mode completes.
    log_block_start!("Shutting down heliocam...");
    signal_state.running.store(false, Ordering::SeqCst);

    controller.shutdown();
    if let Some(publisher) = publisher {
        publisher.publish_offline();
    }
    if let Some(handle) = web_handle {
        let _ = handle.join();
    }
    release_instance_lock(lock_file, &lock_path);

    log_end!();
    Ok(())
}

fn acquire_instance_lock() -> Result<(File, String)> {
    let runtime_dir = std::env::var("XDG_RUNTIME_DIR").unwrap_or_else(|_| "/tmp".to_string());
    let lock_path = format!("{runtime_dir}/heliocam.lock");

    // Open without truncating: truncation is only safe once the lock is
    // held, otherwise a losing race could wipe the owner's PID record.
    let mut lock_file = OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(false)
        .open(&lock_path)
        .with_context(|| format!("failed to open lock file {lock_path}"))?;

    match lock_file.try_lock_exclusive() {
        Ok(()) => {
            use std::io::{Seek, SeekFrom, Write};
            lock_file.set_len(0)?;
            lock_file.seek(SeekFrom::Start(0))?;
            writeln!(&lock_file, "{}", std::process::id())?;
            lock_file.flush()?;
            Ok((lock_file, lock_path))
        }
        Err(_) => {
            let owner = std::fs::read_to_string(&lock_path).unwrap_or_default();
            anyhow::bail!(
                "another heliocam instance is already running (pid {}); the camera is single-owner",
                owner.trim()
            );
        }
    }
}

fn release_instance_lock(lock_file: File, lock_path: &str) {
    let _ = fs2::FileExt::unlock(&lock_file);
    let _ = std::fs::remove_file(lock_path);
}
