//! Application constants and default values for heliocam.
//!
//! Configuration defaults, validation limits, and operational constants
//! used throughout the application.

// ═══ Application Configuration Defaults ═══
// These values are used when config options are not specified by the user

pub const DEFAULT_HOURS_BEFORE_SUNRISE: f64 = 1.0; // capture window starts this long before sunrise
pub const DEFAULT_HOURS_AFTER_SUNSET: f64 = 1.0; // capture window ends this long after sunset
pub const DEFAULT_INTERVAL_MINUTES: u64 = 5; // minutes between scheduled captures
pub const DEFAULT_STILL_WIDTH: u32 = 1920;
pub const DEFAULT_STILL_HEIGHT: u32 = 1080;
pub const DEFAULT_PREVIEW_WIDTH: u32 = 640;
pub const DEFAULT_PREVIEW_HEIGHT: u32 = 480;
pub const DEFAULT_TEST_CAPTURE_COUNT: u32 = 10;
pub const DEFAULT_TEST_INTERVAL_SECONDS: u64 = 2;

pub const DEFAULT_MQTT_PORT: u16 = 1883;
pub const DEFAULT_DEVICE_ID: &str = "timelapse_camera";
pub const DEFAULT_WEB_PORT: u16 = 8080;

pub const DEFAULT_PHOTOS_DIR: &str = "photos";
pub const DEFAULT_STATE_FILE: &str = "state.json";
pub const DEFAULT_LOG_FILE: &str = "heliocam.log";

// ═══ Validation Limits ═══
// These limits ensure user inputs are within reasonable and safe ranges

pub const MINIMUM_INTERVAL_MINUTES: u64 = 1;
pub const MAXIMUM_INTERVAL_MINUTES: u64 = 720; // one capture every 12 hours at most

pub const MAXIMUM_HOUR_OFFSET: f64 = 12.0; // window offsets beyond this invert day/night

pub const MINIMUM_RESOLUTION: u32 = 64;
pub const MAXIMUM_RESOLUTION: u32 = 8192;

pub const MAXIMUM_TEST_CAPTURE_COUNT: u32 = 1000;

// ═══ Scheduler Behavior ═══

/// Cap on long waits so the loop notices externally-toggled enable/mode
/// changes (web interface, message bus) within a minute.
pub const STATUS_POLL_CAP_SECS: u64 = 60;

/// Back-off after an iteration fails for any reason.
pub const ERROR_RETRY_SECS: u64 = 60;

// ═══ MQTT Contract ═══

pub const HOMEASSISTANT_DISCOVERY_PREFIX: &str = "homeassistant";
pub const MQTT_KEEP_ALIVE_SECS: u64 = 30;
pub const MQTT_CHANNEL_CAPACITY: usize = 10;
/// Camera frames travel base64-encoded over the bus; allow room for them.
pub const MQTT_MAX_PACKET_BYTES: usize = 10 * 1024 * 1024;

// ═══ Web Interface ═══

/// Delay between MJPEG preview frames served on `/stream`.
pub const STREAM_FRAME_INTERVAL_MS: u64 = 200;
/// Default and maximum line counts for the log routes.
pub const LOGS_DEFAULT_LINES: usize = 100;
pub const LOGS_MAX_LINES: usize = 2000;

// ═══ Exit Codes ═══

pub const EXIT_FAILURE: i32 = 1;
