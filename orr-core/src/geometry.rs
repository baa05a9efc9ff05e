//! Track geometry derived from position traces
//!
//! The racing line is the fastest-lap competitor's trace over that lap, the
//! pit lane is the race winner's trace across their first stop. Both are
//! stride-subsampled polylines. Landmarks mark the start/finish line and the
//! two intermediate sector boundaries.

use crate::model::{offset_by, sorted_by_time, LapRecord, LocationSample, StintRecord};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Margin added after a lap's end so the trace closes the loop
pub const GEOMETRY_PADDING_SECS: i64 = 2;

/// Keep every Nth sample of a trace
pub const DEFAULT_TRACK_STRIDE: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LandmarkKind {
    StartFinish,
    #[serde(rename = "sector_1_end")]
    Sector1End,
    #[serde(rename = "sector_2_end")]
    Sector2End,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Landmark {
    pub kind: LandmarkKind,
    pub x: f64,
    pub y: f64,
}

/// Axis-aligned bounds; all zero when there are no points
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BoundingBox {
    pub min_x: f64,
    pub max_x: f64,
    pub min_y: f64,
    pub max_y: f64,
}

impl BoundingBox {
    pub fn around<'a>(points: impl IntoIterator<Item = &'a Point>) -> Self {
        let mut points = points.into_iter();
        let Some(first) = points.next() else {
            return Self::default();
        };
        points.fold(
            Self {
                min_x: first.x,
                max_x: first.x,
                min_y: first.y,
                max_y: first.y,
            },
            |b, p| Self {
                min_x: b.min_x.min(p.x),
                max_x: b.max_x.max(p.x),
                min_y: b.min_y.min(p.y),
                max_y: b.max_y.max(p.y),
            },
        )
    }
}

/// Persisted `track_geometry.json` document
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct TrackGeometry {
    pub racing_line: Vec<Point>,
    pub pit_lane: Vec<Point>,
    pub landmarks: Vec<Landmark>,
    pub bounds: BoundingBox,
}

impl TrackGeometry {
    pub fn new(racing_line: Vec<Point>, pit_lane: Vec<Point>, landmarks: Vec<Landmark>) -> Self {
        let bounds = BoundingBox::around(racing_line.iter().chain(pit_lane.iter()));
        Self {
            racing_line,
            pit_lane,
            landmarks,
            bounds,
        }
    }
}

/// Half-open time window `[start, end)`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    pub fn contains(&self, t: DateTime<Utc>) -> bool {
        self.start <= t && t < self.end
    }
}

fn padding() -> TimeDelta {
    TimeDelta::seconds(GEOMETRY_PADDING_SECS)
}

/// The lap record for `driver_number` / `lap_number`
pub fn find_lap(laps: &[LapRecord], driver_number: u32, lap_number: u32) -> Option<&LapRecord> {
    laps.iter()
        .find(|l| l.driver_number == driver_number && l.lap_number == lap_number)
}

/// Window covering one lap plus padding; needs a start and a total duration
pub fn lap_window(lap: &LapRecord) -> Option<TimeWindow> {
    let start = lap.start()?;
    let end = offset_by(start, lap.lap_duration?)?.checked_add_signed(padding())?;
    Some(TimeWindow { start, end })
}

/// Sector boundary instants of a lap: start, end of sector 1, end of sector 2.
///
/// A boundary whose instant depends on an unknown duration is omitted.
pub fn sector_boundaries(lap: &LapRecord) -> Vec<(LandmarkKind, DateTime<Utc>)> {
    let Some(start) = lap.start() else {
        return Vec::new();
    };
    let mut out = vec![(LandmarkKind::StartFinish, start)];
    if let Some(s1_end) = lap.duration_sector_1.and_then(|s1| offset_by(start, s1)) {
        out.push((LandmarkKind::Sector1End, s1_end));
        if let Some(s2_end) = lap.duration_sector_2.and_then(|s2| offset_by(s1_end, s2)) {
            out.push((LandmarkKind::Sector2End, s2_end));
        }
    }
    out
}

/// Lap L where the driver's first stint ends and the next starts at L + 1
pub fn first_pit_transition(stints: &[StintRecord], driver_number: u32) -> Option<u32> {
    let mut own: Vec<&StintRecord> = stints
        .iter()
        .filter(|s| s.driver_number == driver_number)
        .collect();
    own.sort_by_key(|s| s.stint_number);

    own.windows(2).find_map(|pair| {
        let end = pair[0].lap_end?;
        (pair[1].lap_start? == end + 1).then_some(end)
    })
}

/// From the start of lap `in_lap` to the end of the following lap, plus padding
pub fn pit_window(laps: &[LapRecord], driver_number: u32, in_lap: u32) -> Option<TimeWindow> {
    let start = find_lap(laps, driver_number, in_lap)?.start()?;
    let out_lap = lap_window(find_lap(laps, driver_number, in_lap + 1)?)?;
    Some(TimeWindow {
        start,
        end: out_lap.end,
    })
}

/// Time-ordered positions inside `window`; samples without x/y are dropped
pub fn trace(samples: &[LocationSample], window: &TimeWindow) -> Vec<(DateTime<Utc>, Point)> {
    sorted_by_time(samples)
        .into_iter()
        .filter(|(t, _)| window.contains(*t))
        .filter_map(|(t, s)| Some((t, Point { x: s.x?, y: s.y? })))
        .collect()
}

/// Every `stride`th point starting with the first
pub fn subsample(trace: &[(DateTime<Utc>, Point)], stride: usize) -> Vec<Point> {
    trace
        .iter()
        .step_by(stride.max(1))
        .map(|(_, p)| *p)
        .collect()
}

/// Point recorded closest in time to `at`; the earlier sample wins a tie
pub fn closest_sample(trace: &[(DateTime<Utc>, Point)], at: DateTime<Utc>) -> Option<Point> {
    trace
        .iter()
        .min_by_key(|(t, _)| (*t - at).abs())
        .map(|(_, p)| *p)
}

/// Racing line and landmarks from the fastest lap's position samples
pub fn racing_line(
    lap: &LapRecord,
    samples: &[LocationSample],
    stride: usize,
) -> (Vec<Point>, Vec<Landmark>) {
    let Some(window) = lap_window(lap) else {
        tracing::warn!(
            "Fastest lap {} of #{} has no usable start or duration",
            lap.lap_number,
            lap.driver_number
        );
        return (Vec::new(), Vec::new());
    };

    let trace = trace(samples, &window);
    let landmarks = sector_boundaries(lap)
        .into_iter()
        .filter_map(|(kind, at)| {
            closest_sample(&trace, at).map(|p| Landmark { kind, x: p.x, y: p.y })
        })
        .collect();

    (subsample(&trace, stride), landmarks)
}

/// Pit lane polyline from the winner's samples across the pit window
pub fn pit_lane(window: &TimeWindow, samples: &[LocationSample], stride: usize) -> Vec<Point> {
    subsample(&trace(samples, window), stride)
}
