//! Raw telemetry record model
//!
//! Defines the flat records returned by the upstream provider, one struct per
//! stream. Records are immutable once fetched; timestamps are kept as the
//! provider's strings and parsed on demand so that a single malformed record
//! can be skipped without rejecting its whole collection.
//!
//! Coordinate system: track-plane x/y as reported by the provider (decimetres
//! for OpenF1), z up.

use crate::error::{Error, Result};
use chrono::{DateTime, NaiveDateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Parse a provider timestamp.
///
/// Accepts RFC 3339 with or without fractional seconds, and naive ISO 8601
/// date-times which are taken to be UTC.
pub fn parse_timestamp(raw: &str) -> Result<DateTime<Utc>> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Ok(dt.with_timezone(&Utc));
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(raw, format) {
            return Ok(naive.and_utc());
        }
    }
    Err(Error::InvalidTimestamp(raw.to_string()))
}

/// Longest duration, in seconds, accepted from the provider
pub const MAX_DURATION_SECS: f64 = 86_400.0;

/// Convert a duration in (fractional) seconds to a `TimeDelta`, microsecond precision.
///
/// `None` for non-finite values and anything longer than [`MAX_DURATION_SECS`]
/// in either direction.
pub fn seconds(value: f64) -> Option<TimeDelta> {
    if !value.is_finite() || value.abs() > MAX_DURATION_SECS {
        return None;
    }
    Some(TimeDelta::microseconds((value * 1_000_000.0).round() as i64))
}

/// `start` shifted by `secs` seconds, or `None` when the duration is unusable
pub fn offset_by(start: DateTime<Utc>, secs: f64) -> Option<DateTime<Utc>> {
    start.checked_add_signed(seconds(secs)?)
}

/// Anything carrying a provider timestamp
pub trait Timestamped {
    fn date(&self) -> &str;

    fn timestamp(&self) -> Option<DateTime<Utc>> {
        parse_timestamp(self.date()).ok()
    }
}

/// Parse and sort a stream by timestamp, dropping records whose date is malformed.
///
/// The sort is stable, so records sharing a timestamp keep their input order.
pub fn sorted_by_time<'a, T, I>(records: I) -> Vec<(DateTime<Utc>, &'a T)>
where
    T: Timestamped + 'a,
    I: IntoIterator<Item = &'a T>,
{
    let mut out: Vec<(DateTime<Utc>, &'a T)> = records
        .into_iter()
        .filter_map(|r| r.timestamp().map(|t| (t, r)))
        .collect();
    out.sort_by_key(|(t, _)| *t);
    out
}

// === Telemetry streams ===

/// Position fix on the track plane
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocationSample {
    pub date: String,
    pub driver_number: u32,
    pub x: Option<f64>,
    pub y: Option<f64>,
    pub z: Option<f64>,
}

/// Car sensor sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CarSample {
    pub date: String,
    pub driver_number: u32,
    /// km/h
    pub speed: Option<f64>,
    pub rpm: Option<f64>,
    /// Gear (0 = neutral)
    pub n_gear: Option<f64>,
    /// Throttle, 0-100
    pub throttle: Option<f64>,
    /// Brake, 0 or 100 on most cars
    pub brake: Option<f64>,
    /// Raw DRS state code
    pub drs: Option<f64>,
}

/// One completed (or attempted) lap
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LapRecord {
    pub driver_number: u32,
    pub lap_number: u32,
    pub date_start: Option<String>,
    pub duration_sector_1: Option<f64>,
    pub duration_sector_2: Option<f64>,
    pub duration_sector_3: Option<f64>,
    pub lap_duration: Option<f64>,
}

impl LapRecord {
    /// Lap start, or `None` when missing or malformed
    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.date_start
            .as_deref()
            .and_then(|raw| parse_timestamp(raw).ok())
    }
}

/// A gap value: seconds, or a textual lap gap such as `+1 LAP`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Gap {
    Seconds(f64),
    Text(String),
}

/// Gap-to-leader / interval-to-car-ahead snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IntervalRecord {
    pub date: String,
    pub driver_number: u32,
    pub gap_to_leader: Option<Gap>,
    pub interval: Option<Gap>,
}

/// Classification position snapshot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PositionRecord {
    pub date: String,
    pub driver_number: u32,
    pub position: Option<u32>,
}

/// Contiguous run of laps on one tyre set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StintRecord {
    pub driver_number: u32,
    pub stint_number: Option<u32>,
    pub lap_start: Option<u32>,
    pub lap_end: Option<u32>,
    pub compound: Option<String>,
    pub tyre_age_at_start: Option<u32>,
}

impl Timestamped for LocationSample {
    fn date(&self) -> &str {
        &self.date
    }
}

impl Timestamped for CarSample {
    fn date(&self) -> &str {
        &self.date
    }
}

impl Timestamped for IntervalRecord {
    fn date(&self) -> &str {
        &self.date
    }
}

impl Timestamped for PositionRecord {
    fn date(&self) -> &str {
        &self.date
    }
}

// === Session-level records ===

/// Final classification entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionResult {
    pub driver_number: u32,
    pub position: Option<u32>,
    pub number_of_laps: Option<u32>,
    pub dns: Option<bool>,
    #[serde(default)]
    pub dnf: Option<bool>,
    #[serde(default)]
    pub dsq: Option<bool>,
}

impl SessionResult {
    /// Started the race and completed at least one lap
    pub fn is_eligible(&self) -> bool {
        self.number_of_laps.unwrap_or(0) > 0 && self.dns == Some(false)
    }
}

/// Starting grid slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridEntry {
    pub driver_number: u32,
    pub position: Option<u32>,
}

/// Roster entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Driver {
    pub driver_number: u32,
    #[serde(default)]
    pub name_acronym: Option<String>,
    #[serde(default)]
    pub team_colour: Option<String>,
}
