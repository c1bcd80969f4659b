//! Shutdown signal handling.
//!
//! SIGINT and SIGTERM drop the shared running flag; every loop in the
//! process (scheduler, web server, MQTT thread) watches it and winds
//! down, after which `main` runs the ordered cleanup (stop camera,
//! publish offline, release the instance lock). There is no cancellation
//! of in-flight hardware calls; a capture finishes before the flag is
//! observed.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result};
use signal_hook::consts::{SIGINT, SIGTERM};
use signal_hook::iterator::Signals;

pub struct SignalState {
    pub running: Arc<AtomicBool>,
}

/// Install the handler thread. A second signal while shutdown is already
/// in progress exits immediately.
pub fn setup_signal_handler(debug_enabled: bool) -> Result<SignalState> {
    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();

    let mut signals =
        Signals::new([SIGINT, SIGTERM]).context("failed to register signal handlers")?;

    std::thread::Builder::new()
        .name("signals".into())
        .spawn(move || {
            for signal in signals.forever() {
                if !flag.load(Ordering::SeqCst) {
                    log_decorated!("Forced exit");
                    std::process::exit(crate::constants::EXIT_FAILURE);
                }
                log_block_start!("Received signal {signal}, shutting down...");
                flag.store(false, Ordering::SeqCst);
            }
        })
        .context("failed to spawn signal handler thread")?;

    if debug_enabled {
        log_debug!("Signal handlers installed for SIGINT and SIGTERM");
    }

    Ok(SignalState { running })
}
