//! Configuration system with validation and default-file generation.
//!
//! Settings load from `heliocam.toml` in the user's config directory
//! (`$XDG_CONFIG_HOME/heliocam/heliocam.toml`), or from an explicit
//! directory given with `--config`. When no file exists a commented
//! default is written so a fresh install has something to edit.
//!
//! ```toml
//! [location]
//! latitude = 59.3293
//! longitude = 18.0686
//! timezone = "Europe/Stockholm"   # optional, derived from coordinates when omitted
//!
//! [capture]
//! hours_before_sunrise = 1.0      # window opens this long before sunrise
//! hours_after_sunset = 1.0        # window closes this long after sunset
//! interval_minutes = 5            # minutes between scheduled captures
//! ```
//!
//! All values are validated at load time; an invalid configuration is
//! fatal at startup rather than a surprise at 04:30 the next morning.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::Deserialize;

use crate::constants::*;
use crate::error::Error;
use crate::sun::Location;

/// Top-level configuration, immutable for the process lifetime.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct Config {
    pub location: LocationConfig,
    #[serde(default)]
    pub capture: CaptureConfig,
    #[serde(default)]
    pub mqtt: MqttConfig,
    #[serde(default)]
    pub web: WebConfig,
    #[serde(default)]
    pub paths: PathsConfig,
}

/// Geographic location of the camera.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct LocationConfig {
    /// Latitude in degrees (-90 to +90).
    pub latitude: f64,
    /// Longitude in degrees (-180 to +180).
    pub longitude: f64,
    /// IANA timezone name. Resolved from the coordinates when omitted.
    pub timezone: Option<String>,
}

/// Capture window and camera settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct CaptureConfig {
    pub hours_before_sunrise: f64,
    pub hours_after_sunset: f64,
    pub interval_minutes: u64,
    pub resolution: Resolution,
    pub preview_resolution: Resolution,
    pub test_capture_count: u32,
    pub test_interval_seconds: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            hours_before_sunrise: DEFAULT_HOURS_BEFORE_SUNRISE,
            hours_after_sunset: DEFAULT_HOURS_AFTER_SUNSET,
            interval_minutes: DEFAULT_INTERVAL_MINUTES,
            resolution: Resolution {
                width: DEFAULT_STILL_WIDTH,
                height: DEFAULT_STILL_HEIGHT,
            },
            preview_resolution: Resolution {
                width: DEFAULT_PREVIEW_WIDTH,
                height: DEFAULT_PREVIEW_HEIGHT,
            },
            test_capture_count: DEFAULT_TEST_CAPTURE_COUNT,
            test_interval_seconds: DEFAULT_TEST_INTERVAL_SECONDS,
        }
    }
}

#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// Message-bus connection settings.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct MqttConfig {
    pub enabled: bool,
    pub host: String,
    pub port: u16,
    pub username: Option<String>,
    pub password: Option<String>,
    /// Topic prefix and Home Assistant unique-id base.
    pub device_id: String,
}

impl Default for MqttConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            host: "localhost".to_string(),
            port: DEFAULT_MQTT_PORT,
            username: None,
            password: None,
            device_id: DEFAULT_DEVICE_ID.to_string(),
        }
    }
}

/// Web interface settings. `--web`/`--web-port` override these.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    pub enabled: bool,
    pub port: u16,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            port: DEFAULT_WEB_PORT,
        }
    }
}

/// Filesystem layout. Everything lives under `base_dir`, which defaults
/// to the platform data directory.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(default)]
pub struct PathsConfig {
    pub base_dir: Option<PathBuf>,
    pub photos_dir: String,
    pub state_file: String,
    pub log_file: String,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            base_dir: None,
            photos_dir: DEFAULT_PHOTOS_DIR.to_string(),
            state_file: DEFAULT_STATE_FILE.to_string(),
            log_file: DEFAULT_LOG_FILE.to_string(),
        }
    }
}

impl Config {
    /// Load configuration, writing a commented default file first if none
    /// exists yet.
    pub fn load(config_dir: Option<&str>) -> Result<Self> {
        let path = config_path(config_dir)?;

        if !path.exists() {
            create_default_config(&path)?;
            log_block_start!("Created default configuration at {}", path.display());
            log_indented!("Edit the [location] section before relying on the capture window");
        }

        Self::load_from_path(&path)
    }

    /// Load and validate a specific config file.
    pub fn load_from_path(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config file {}", path.display()))?;

        validate_config(&config)?;
        Ok(config)
    }

    /// The camera's location as consumed by the sun calculator.
    pub fn location(&self) -> Location {
        Location {
            latitude: self.location.latitude,
            longitude: self.location.longitude,
            timezone: self.location.timezone.clone(),
        }
    }

    /// Root directory for photos, state and logs.
    pub fn base_dir(&self) -> PathBuf {
        self.paths.base_dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("heliocam")
        })
    }

    pub fn photos_dir(&self) -> PathBuf {
        self.base_dir().join(&self.paths.photos_dir)
    }

    pub fn state_file(&self) -> PathBuf {
        self.base_dir().join(&self.paths.state_file)
    }

    pub fn log_file(&self) -> PathBuf {
        self.base_dir().join(&self.paths.log_file)
    }

    /// Log the effective configuration at startup.
    pub fn log_config(&self) {
        log_block_start!("Loaded configuration");
        log_indented!(
            "Location: {:.4}°, {:.4}° ({})",
            self.location.latitude,
            self.location.longitude,
            self.location.timezone.as_deref().unwrap_or("timezone from coordinates")
        );
        log_indented!(
            "Capture window: sunrise -{:.1}h to sunset +{:.1}h",
            self.capture.hours_before_sunrise,
            self.capture.hours_after_sunset
        );
        log_indented!("Capture interval: {} minutes", self.capture.interval_minutes);
        log_indented!(
            "Resolution: {} (preview {})",
            self.capture.resolution,
            self.capture.preview_resolution
        );
        if self.mqtt.enabled {
            log_indented!(
                "MQTT: {}:{} as '{}'",
                self.mqtt.host,
                self.mqtt.port,
                self.mqtt.device_id
            );
        } else {
            log_indented!("MQTT: disabled");
        }
        if self.web.enabled {
            log_indented!("Web interface: port {}", self.web.port);
        }
        log_indented!("Data directory: {}", self.base_dir().display());
    }
}

/// Resolve the config file path: explicit `--config` directory, else the
/// XDG config directory.
pub fn config_path(config_dir: Option<&str>) -> Result<PathBuf> {
    match config_dir {
        Some(dir) => Ok(PathBuf::from(dir).join("heliocam.toml")),
        None => {
            let base = dirs::config_dir()
                .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))?;
            Ok(base.join("heliocam").join("heliocam.toml"))
        }
    }
}

/// Write the commented default configuration.
fn create_default_config(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create config directory {}", parent.display()))?;
    }
    std::fs::write(path, DEFAULT_CONFIG_TEMPLATE)
        .with_context(|| format!("Failed to write default config to {}", path.display()))?;
    Ok(())
}

const DEFAULT_CONFIG_TEMPLATE: &str = r#"#[Location]
[location]
latitude = 59.3293               # Geographic latitude (-90 to 90)
longitude = 18.0686              # Geographic longitude (-180 to 180)
# timezone = "Europe/Stockholm"  # IANA name; derived from coordinates when omitted

#[Capture]
[capture]
hours_before_sunrise = 1.0       # Window opens this many hours before sunrise
hours_after_sunset = 1.0         # Window closes this many hours after sunset
interval_minutes = 5             # Minutes between scheduled captures (1-720)
resolution = { width = 1920, height = 1080 }
preview_resolution = { width = 640, height = 480 }
test_capture_count = 10          # Photos taken by --test
test_interval_seconds = 2        # Seconds between --test photos

#[MQTT]
[mqtt]
enabled = false
host = "localhost"
port = 1883
# username = ""
# password = ""
device_id = "timelapse_camera"   # Topic prefix and Home Assistant device id

#[Web]
[web]
enabled = false
port = 8080

#[Paths]
[paths]
# base_dir = "/var/lib/heliocam" # Defaults to the platform data directory
photos_dir = "photos"
state_file = "state.json"
log_file = "heliocam.log"
"#;

/// Comprehensive validation to reject impossible or unsafe setups.
pub fn validate_config(config: &Config) -> Result<()> {
    let lat = config.location.latitude;
    if !(-90.0..=90.0).contains(&lat) {
        return Err(Error::Config(format!(
            "latitude must be between -90 and 90 degrees (got {lat})"
        ))
        .into());
    }

    let lon = config.location.longitude;
    if !(-180.0..=180.0).contains(&lon) {
        return Err(Error::Config(format!(
            "longitude must be between -180 and 180 degrees (got {lon})"
        ))
        .into());
    }

    if let Some(tz) = &config.location.timezone
        && tz.parse::<chrono_tz::Tz>().is_err()
    {
        return Err(Error::Config(format!("unknown timezone '{tz}'")).into());
    }

    for (name, hours) in [
        ("hours_before_sunrise", config.capture.hours_before_sunrise),
        ("hours_after_sunset", config.capture.hours_after_sunset),
    ] {
        if !(0.0..=MAXIMUM_HOUR_OFFSET).contains(&hours) || !hours.is_finite() {
            return Err(Error::Config(format!(
                "{name} ({hours}) must be between 0 and {MAXIMUM_HOUR_OFFSET} hours"
            ))
            .into());
        }
    }

    let interval = config.capture.interval_minutes;
    if !(MINIMUM_INTERVAL_MINUTES..=MAXIMUM_INTERVAL_MINUTES).contains(&interval) {
        return Err(Error::Config(format!(
            "interval_minutes ({interval}) must be between {MINIMUM_INTERVAL_MINUTES} and {MAXIMUM_INTERVAL_MINUTES}"
        ))
        .into());
    }

    for (name, res) in [
        ("resolution", config.capture.resolution),
        ("preview_resolution", config.capture.preview_resolution),
    ] {
        for (axis, value) in [("width", res.width), ("height", res.height)] {
            if !(MINIMUM_RESOLUTION..=MAXIMUM_RESOLUTION).contains(&value) {
                return Err(Error::Config(format!(
                    "{name}.{axis} ({value}) must be between {MINIMUM_RESOLUTION} and {MAXIMUM_RESOLUTION}"
                ))
                .into());
            }
        }
    }

    if config.capture.test_capture_count == 0
        || config.capture.test_capture_count > MAXIMUM_TEST_CAPTURE_COUNT
    {
        return Err(Error::Config(format!(
            "test_capture_count ({}) must be between 1 and {MAXIMUM_TEST_CAPTURE_COUNT}",
            config.capture.test_capture_count
        ))
        .into());
    }

    if config.mqtt.enabled && config.mqtt.device_id.is_empty() {
        return Err(Error::Config("mqtt.device_id must not be empty".into()).into());
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn minimal_config() -> Config {
        toml::from_str(
            r#"
            [location]
            latitude = 59.3293
            longitude = 18.0686
            "#,
        )
        .unwrap()
    }

    #[test]
    fn minimal_config_gets_defaults() {
        let config = minimal_config();
        assert_eq!(config.capture.interval_minutes, DEFAULT_INTERVAL_MINUTES);
        assert_eq!(config.mqtt.port, DEFAULT_MQTT_PORT);
        assert_eq!(config.web.port, DEFAULT_WEB_PORT);
        assert!(!config.mqtt.enabled);
        assert!(validate_config(&config).is_ok());
    }

    #[test]
    fn default_template_parses_and_validates() {
        let config: Config = toml::from_str(DEFAULT_CONFIG_TEMPLATE).unwrap();
        assert!(validate_config(&config).is_ok());
        assert_eq!(config.capture.test_capture_count, 10);
    }

    #[test]
    fn rejects_out_of_range_latitude() {
        let mut config = minimal_config();
        config.location.latitude = 91.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_negative_hour_offsets() {
        let mut config = minimal_config();
        config.capture.hours_before_sunrise = -1.0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_unknown_timezone() {
        let mut config = minimal_config();
        config.location.timezone = Some("Mars/Olympus_Mons".to_string());
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn rejects_zero_interval() {
        let mut config = minimal_config();
        config.capture.interval_minutes = 0;
        assert!(validate_config(&config).is_err());
    }

    #[test]
    fn loads_from_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("heliocam.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            "[location]\nlatitude = 40.7\nlongitude = -74.0\n\n[capture]\ninterval_minutes = 10"
        )
        .unwrap();

        let config = Config::load_from_path(&path).unwrap();
        assert_eq!(config.capture.interval_minutes, 10);
    }
}
