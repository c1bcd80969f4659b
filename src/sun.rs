//! Daily capture-window computation from sunrise and sunset.
//!
//! The window for a given date is the span from `sunrise - hours_before`
//! to `sunset + hours_after`, carried as full `DateTime<Tz>` values in
//! the location's timezone. Storing zoned datetimes instead of naive
//! times means day-boundary comparisons and "time until tomorrow's start"
//! arithmetic are plain subtraction, with no midnight special cases.
//!
//! Polar regions get a season-based fallback window when the astronomical
//! calculation degenerates (midnight sun / polar night), so the scheduler
//! keeps a defined daily rhythm at any latitude.

use chrono::{DateTime, Datelike, NaiveDate, NaiveTime, TimeZone, Timelike};
use chrono_tz::Tz;
use once_cell::sync::Lazy;
use sunrise::{Coordinates, SolarDay, SolarEvent};
use tzf_rs::DefaultFinder;

use crate::error::{Error, Result};

// The timezone finder parses its embedded dataset on construction; build
// it once.
static TZ_FINDER: Lazy<DefaultFinder> = Lazy::new(DefaultFinder::new);

/// Geographic location of the camera, from configuration.
#[derive(Debug, Clone, PartialEq)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    /// IANA timezone name. Resolved from the coordinates when `None`.
    pub timezone: Option<String>,
}

/// The daily time range during which scheduled capture is active.
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureWindow {
    pub start: DateTime<Tz>,
    pub end: DateTime<Tz>,
    /// True when the season-based polar approximation was used instead of
    /// real sunrise/sunset times.
    pub used_polar_fallback: bool,
}

impl CaptureWindow {
    pub fn contains(&self, t: DateTime<Tz>) -> bool {
        self.start <= t && t <= self.end
    }

    pub fn timezone(&self) -> Tz {
        self.start.timezone()
    }

    /// Tomorrow's window start: same wall-clock time as today's start on
    /// the next calendar day.
    pub fn next_day_start(&self) -> DateTime<Tz> {
        let tz = self.timezone();
        let tomorrow = self.start.date_naive() + chrono::Duration::days(1);
        let time = self.start.time();
        resolve_local(&tz, tomorrow, time)
            // DST gap at exactly this wall time: fall back to 24h later.
            .unwrap_or(self.start + chrono::Duration::days(1))
    }
}

/// Resolve the timezone for a location: the explicit config value when
/// present, otherwise a coordinate lookup.
pub fn resolve_timezone(location: &Location) -> Result<Tz> {
    validate_coordinates(location.latitude, location.longitude)?;

    if let Some(name) = &location.timezone {
        return name
            .parse::<Tz>()
            .map_err(|_| Error::Geolocation(format!("unknown timezone '{name}'")));
    }

    let name = TZ_FINDER.get_tz_name(location.longitude, location.latitude);
    name.parse::<Tz>().map_err(|_| {
        Error::Geolocation(format!(
            "could not resolve timezone for {:.4}, {:.4}",
            location.latitude, location.longitude
        ))
    })
}

/// Compute the capture window for `date` at `location`.
///
/// Offsets are hours; validation guarantees they are non-negative, and a
/// non-negative offset can only widen the sunrise..sunset span, so the
/// returned window always satisfies `start < end`.
pub fn compute_window(
    date: NaiveDate,
    location: &Location,
    hours_before_sunrise: f64,
    hours_after_sunset: f64,
) -> Result<CaptureWindow> {
    let tz = resolve_timezone(location)?;

    let (sunrise_at, sunset_at, used_polar_fallback) = solar_events(date, location, &tz)?;

    let before = hours_to_duration(hours_before_sunrise);
    let after = hours_to_duration(hours_after_sunset);

    let mut start = sunrise_at - before;
    let mut end = sunset_at + after;

    // Unreachable with validated (non-negative) offsets; kept so a caller
    // bypassing validation still gets a well-formed window.
    if start >= end {
        start = sunrise_at;
        end = sunset_at;
    }

    Ok(CaptureWindow {
        start: truncate_to_second(start),
        end: truncate_to_second(end),
        used_polar_fallback,
    })
}

/// Sunrise and sunset instants for `date` in `tz`, with the polar
/// fallback applied when the astronomical result degenerates.
fn solar_events(date: NaiveDate, location: &Location, tz: &Tz) -> Result<(DateTime<Tz>, DateTime<Tz>, bool)> {
    let coord = Coordinates::new(location.latitude, location.longitude).ok_or_else(|| {
        Error::Geolocation(format!(
            "invalid coordinates {:.4}, {:.4}",
            location.latitude, location.longitude
        ))
    })?;

    let solar_day = SolarDay::new(coord, date);
    let sunrise_at = solar_day.event_time(SolarEvent::Sunrise).with_timezone(tz);
    let sunset_at = solar_day.event_time(SolarEvent::Sunset).with_timezone(tz);

    if sunrise_at < sunset_at {
        return Ok((sunrise_at, sunset_at, false));
    }

    // Midnight sun or polar night: the solver has no real crossing to
    // report. Approximate a day with generous light in local summer and a
    // short midday window in local winter.
    let (rise, set) = polar_fallback_times(date, location.latitude);
    let sunrise_at = resolve_local(tz, date, rise)
        .ok_or_else(|| Error::Geolocation("ambiguous polar fallback sunrise".into()))?;
    let sunset_at = resolve_local(tz, date, set)
        .ok_or_else(|| Error::Geolocation("ambiguous polar fallback sunset".into()))?;

    Ok((sunrise_at, sunset_at, true))
}

/// Season-aware synthetic sunrise/sunset for extreme latitudes.
fn polar_fallback_times(date: NaiveDate, latitude: f64) -> (NaiveTime, NaiveTime) {
    let month = date.month();
    let northern_summer = (4..=9).contains(&month);
    let local_summer = if latitude >= 0.0 { northern_summer } else { !northern_summer };

    if local_summer {
        // Midnight sun: near-full day of usable light.
        (
            NaiveTime::from_hms_opt(3, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(21, 0, 0).unwrap(),
        )
    } else {
        // Polar night: a short window around local noon catches whatever
        // twilight there is.
        (
            NaiveTime::from_hms_opt(9, 0, 0).unwrap(),
            NaiveTime::from_hms_opt(15, 0, 0).unwrap(),
        )
    }
}

fn validate_coordinates(latitude: f64, longitude: f64) -> Result<()> {
    if !(-90.0..=90.0).contains(&latitude) {
        return Err(Error::Geolocation(format!("latitude {latitude} out of range")));
    }
    if !(-180.0..=180.0).contains(&longitude) {
        return Err(Error::Geolocation(format!("longitude {longitude} out of range")));
    }
    Ok(())
}

fn hours_to_duration(hours: f64) -> chrono::Duration {
    chrono::Duration::milliseconds((hours * 3_600_000.0) as i64)
}

/// Map a naive local time onto `tz`, preferring the earlier instant for
/// DST-ambiguous times.
fn resolve_local(tz: &Tz, date: NaiveDate, time: NaiveTime) -> Option<DateTime<Tz>> {
    tz.from_local_datetime(&date.and_time(time)).earliest()
}

fn truncate_to_second(dt: DateTime<Tz>) -> DateTime<Tz> {
    dt.with_nanosecond(0).unwrap_or(dt)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stockholm() -> Location {
        Location {
            latitude: 59.3293,
            longitude: 18.0686,
            timezone: Some("Europe/Stockholm".to_string()),
        }
    }

    #[test]
    fn summer_window_is_wide_and_ordered() {
        let date = NaiveDate::from_ymd_opt(2025, 6, 21).unwrap();
        let window = compute_window(date, &stockholm(), 1.0, 1.0).unwrap();

        assert!(window.start < window.end);
        assert!(!window.used_polar_fallback);
        // Midsummer in Stockholm: more than 18 hours sunrise to sunset,
        // plus two hours of offsets.
        let span = window.end - window.start;
        assert!(span > chrono::Duration::hours(19), "span was {span}");
    }

    #[test]
    fn offsets_widen_the_window() {
        let date = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
        let bare = compute_window(date, &stockholm(), 0.0, 0.0).unwrap();
        let padded = compute_window(date, &stockholm(), 2.0, 1.5).unwrap();

        assert_eq!(padded.start, bare.start - chrono::Duration::hours(2));
        assert_eq!(
            padded.end,
            bare.end + chrono::Duration::minutes(90)
        );
    }

    #[test]
    fn timezone_resolved_from_coordinates_when_omitted() {
        let location = Location {
            timezone: None,
            ..stockholm()
        };
        assert_eq!(resolve_timezone(&location).unwrap(), chrono_tz::Europe::Stockholm);
    }

    #[test]
    fn rejects_out_of_range_coordinates() {
        let location = Location {
            latitude: 123.0,
            longitude: 0.0,
            timezone: None,
        };
        let err = compute_window(
            NaiveDate::from_ymd_opt(2025, 1, 1).unwrap(),
            &location,
            1.0,
            1.0,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Geolocation(_)));
    }

    #[test]
    fn rejects_unknown_timezone_name() {
        let location = Location {
            timezone: Some("Atlantis/Central".to_string()),
            ..stockholm()
        };
        assert!(matches!(
            resolve_timezone(&location),
            Err(Error::Geolocation(_))
        ));
    }

    #[test]
    fn polar_winter_falls_back_to_midday_window() {
        let svalbard = Location {
            latitude: 78.2232,
            longitude: 15.6267,
            timezone: Some("Arctic/Longyearbyen".to_string()),
        };
        let date = NaiveDate::from_ymd_opt(2025, 12, 21).unwrap();
        let window = compute_window(date, &svalbard, 1.0, 1.0).unwrap();

        assert!(window.start < window.end);
        if window.used_polar_fallback {
            assert_eq!(window.start.time(), NaiveTime::from_hms_opt(8, 0, 0).unwrap());
            assert_eq!(window.end.time(), NaiveTime::from_hms_opt(16, 0, 0).unwrap());
        }
    }

    #[test]
    fn next_day_start_keeps_wall_clock_time() {
        let date = NaiveDate::from_ymd_opt(2025, 5, 10).unwrap();
        let window = compute_window(date, &stockholm(), 1.0, 1.0).unwrap();
        let tomorrow = window.next_day_start();

        assert_eq!(tomorrow.time(), window.start.time());
        assert_eq!(
            tomorrow.date_naive(),
            window.start.date_naive() + chrono::Duration::days(1)
        );
    }
}
