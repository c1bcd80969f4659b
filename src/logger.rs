//! Structured logging with visual formatting and a log-file tee.
//!
//! Console output uses Unicode box drawing characters to group related
//! messages into blocks. Every line is also appended, stripped of ANSI
//! color codes and prefixed with a local timestamp, to the configured log
//! file — the same file the `/logs/latest` and `/logs/recent` web routes
//! read back.
//!
//! Conventions:
//! - `log_version!` once at startup, `log_end!` once at shutdown.
//! - `log_block_start!` opens a new conceptual block (state change,
//!   startup phase, mode transition).
//! - `log_decorated!` continues a block; `log_indented!` lists sub-items.
//! - `log_pipe!` inserts one empty spacer line, typically before a
//!   `log_warning!`/`log_error!` that interrupts a block.
//! - `log_info!`/`log_warning!`/`log_error!`/`log_debug!` carry a
//!   `[LEVEL]` prefix; `log_debug!` only prints when debug mode is on.

use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Mutex, OnceLock};

static LOGGING_ENABLED: AtomicBool = AtomicBool::new(true);
static DEBUG_ENABLED: AtomicBool = AtomicBool::new(false);

// Tee target for persistent logs, installed once at startup.
static LOG_FILE: OnceLock<Mutex<File>> = OnceLock::new();

/// Main logging interface. State lives in process-wide atomics so the
/// macros work from every thread (scheduler, web, bus callback).
pub struct Log;

impl Log {
    /// Enable or disable console/file output entirely. Used by tests to
    /// keep output quiet.
    pub fn set_enabled(enabled: bool) {
        LOGGING_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_enabled() -> bool {
        LOGGING_ENABLED.load(Ordering::SeqCst)
    }

    /// Toggle `log_debug!` output.
    pub fn set_debug(enabled: bool) {
        DEBUG_ENABLED.store(enabled, Ordering::SeqCst);
    }

    pub fn is_debug() -> bool {
        DEBUG_ENABLED.load(Ordering::SeqCst)
    }

    /// Install the log-file tee. Appends to `path`, creating parent
    /// directories as needed. Later calls are ignored.
    pub fn init_file(path: &Path) -> anyhow::Result<()> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let _ = LOG_FILE.set(Mutex::new(file));
        Ok(())
    }
}

// Strip ANSI escape sequences so the log file stays plain text.
fn strip_ansi_codes(text: &str) -> String {
    let mut result = String::with_capacity(text.len());
    let mut chars = text.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '\x1b' {
            if chars.peek() == Some(&'[') {
                chars.next();
                for ch in chars.by_ref() {
                    if ch == 'm' {
                        break;
                    }
                }
            } else {
                result.push(ch);
            }
        } else {
            result.push(ch);
        }
    }

    result
}

/// Route a formatted line to stdout and, when installed, the log file.
/// Public for macro access only.
pub fn write_output(text: &str) {
    print!("{text}");
    let _ = std::io::stdout().flush();

    if let Some(file) = LOG_FILE.get() {
        let stamp = chrono::Local::now().format("%Y-%m-%d %H:%M:%S");
        let clean = strip_ansi_codes(text);
        if let Ok(mut file) = file.lock() {
            for line in clean.lines() {
                let _ = writeln!(file, "{stamp} {line}");
            }
        }
    }
}

/// Log a decorated message, part of an existing block.
#[macro_export]
macro_rules! log_decorated {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┣ {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┣ {expr}\n"));
        }
    }};
}

/// Log an indented sub-item within a block.
#[macro_export]
macro_rules! log_indented {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┃   {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┃   {expr}\n"));
        }
    }};
}

/// Log a visual pipe separator for vertical spacing.
#[macro_export]
macro_rules! log_pipe {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("┃\n");
        }
    }};
}

/// Start a new conceptual block of log output.
#[macro_export]
macro_rules! log_block_start {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┃\n┣ {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┃\n┣ {expr}\n"));
        }
    }};
}

/// Log the application version header.
#[macro_export]
macro_rules! log_version {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let version = env!("CARGO_PKG_VERSION");
            $crate::logger::write_output(&format!("┏ heliocam v{version} ━━╸\n"));
        }
    }};
}

/// Log the final termination marker.
#[macro_export]
macro_rules! log_end {
    () => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            $crate::logger::write_output("╹\n");
        }
    }};
}

/// Log an informational message with `[INFO]` prefix.
#[macro_export]
macro_rules! log_info {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┣ [INFO] {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┣ [INFO] {expr}\n"));
        }
    }};
}

/// Log a warning with `[WARNING]` prefix.
#[macro_export]
macro_rules! log_warning {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┣ \x1b[33m[WARNING]\x1b[0m {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┣ \x1b[33m[WARNING]\x1b[0m {expr}\n"));
        }
    }};
}

/// Log an error with `[ERROR]` prefix.
#[macro_export]
macro_rules! log_error {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┣ \x1b[31m[ERROR]\x1b[0m {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┣ \x1b[31m[ERROR]\x1b[0m {expr}\n"));
        }
    }};
}

/// Log a debug message with `[DEBUG]` prefix. Only printed when debug
/// mode is active.
#[macro_export]
macro_rules! log_debug {
    ($fmt:literal $($arg:tt)*) => {{
        use $crate::logger::Log;
        if Log::is_enabled() && Log::is_debug() {
            let message = format!($fmt $($arg)*);
            $crate::logger::write_output(&format!("┣ \x1b[36m[DEBUG]\x1b[0m {message}\n"));
        }
    }};
    ($expr:expr) => {{
        use $crate::logger::Log;
        if Log::is_enabled() && Log::is_debug() {
            let expr = $expr;
            $crate::logger::write_output(&format!("┣ \x1b[36m[DEBUG]\x1b[0m {expr}\n"));
        }
    }};
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_ansi_sequences() {
        let colored = "\x1b[33m[WARNING]\x1b[0m camera offline";
        assert_eq!(strip_ansi_codes(colored), "[WARNING] camera offline");
    }

    #[test]
    fn passes_plain_text_through() {
        assert_eq!(strip_ansi_codes("┣ plain line"), "┣ plain line");
    }
}
