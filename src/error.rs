//! Error taxonomy for the daemon.
//!
//! Four failure classes with distinct recovery policies: configuration
//! errors are fatal at startup, hardware and sun-calculation errors are
//! downgraded to a timed retry by the capture loop, and bus errors only
//! ever cost a dropped status update.

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or invalid configuration. Fatal at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Camera init/capture/reconfigure failure. Logged, the operation is
    /// skipped and the capture loop continues.
    #[error("camera hardware error: {0}")]
    Hardware(String),

    /// Sunrise/sunset computation failure. Logged, the loop retries.
    #[error("sun time calculation error: {0}")]
    Geolocation(String),

    /// MQTT publish/connect failure. Status updates are dropped; capture
    /// is unaffected.
    #[error("message bus error: {0}")]
    Bus(String),
}

impl Error {
    /// Short machine-readable class name, used in `/status` payloads.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::Config(_) => "config",
            Error::Hardware(_) => "hardware",
            Error::Geolocation(_) => "geolocation",
            Error::Bus(_) => "bus",
        }
    }
}

impl From<std::io::Error> for Error {
    fn from(e: std::io::Error) -> Self {
        Error::Hardware(e.to_string())
    }
}
