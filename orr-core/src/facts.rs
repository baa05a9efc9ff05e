//! Session-level race facts and the reference time anchor

use crate::model::{Driver, GridEntry, LapRecord, SessionResult};
use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

/// Seconds subtracted from the pole sitter's first lap start so that
/// pre-start-line samples are kept
pub const PRE_RACE_BUFFER_SECS: i64 = 20;

/// Rank assigned to results without a classification
const UNRANKED: u32 = 999;

/// Fastest lap of the session with its sector splits
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FastestLap {
    pub driver_number: u32,
    pub lap_number: u32,
    pub lap_time: f64,
    pub sector_1: Option<f64>,
    pub sector_2: Option<f64>,
    pub sector_3: Option<f64>,
}

/// Facts derived from results and laps
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RaceFacts {
    pub winner: Option<u32>,
    /// Ranks 1-3 in rank order
    pub podium: Vec<u32>,
    pub fastest_lap: Option<FastestLap>,
    /// Competitors that started and completed at least one lap, in result order
    pub eligible: Vec<u32>,
}

impl RaceFacts {
    pub fn is_eligible(&self, driver_number: u32) -> bool {
        self.eligible.contains(&driver_number)
    }
}

/// Derive winner, podium, fastest lap and the eligible set
pub fn extract_race_facts(results: &[SessionResult], laps: &[LapRecord]) -> RaceFacts {
    let mut ranked: Vec<&SessionResult> = results.iter().collect();
    ranked.sort_by_key(|r| r.position.unwrap_or(UNRANKED));

    let winner = ranked
        .iter()
        .find(|r| r.position == Some(1))
        .map(|r| r.driver_number);

    let podium = ranked
        .iter()
        .filter(|r| matches!(r.position, Some(1..=3)))
        .map(|r| r.driver_number)
        .collect();

    let eligible = results
        .iter()
        .filter(|r| r.is_eligible())
        .map(|r| r.driver_number)
        .collect();

    RaceFacts {
        winner,
        podium,
        fastest_lap: fastest_lap(laps),
        eligible,
    }
}

/// Minimum lap duration over laps that have one; the first of equal minima wins
pub fn fastest_lap(laps: &[LapRecord]) -> Option<FastestLap> {
    let mut best: Option<(&LapRecord, f64)> = None;
    for lap in laps {
        let Some(duration) = lap.lap_duration else {
            continue;
        };
        if best.map_or(true, |(_, current)| duration < current) {
            best = Some((lap, duration));
        }
    }

    best.map(|(lap, lap_time)| FastestLap {
        driver_number: lap.driver_number,
        lap_number: lap.lap_number,
        lap_time,
        sector_1: lap.duration_sector_1,
        sector_2: lap.duration_sector_2,
        sector_3: lap.duration_sector_3,
    })
}

/// Pole sitter from the starting grid, falling back to the first roster entry
pub fn pole_sitter(grid: &[GridEntry], roster: &[Driver]) -> Option<u32> {
    grid.iter()
        .find(|g| g.position == Some(1))
        .map(|g| g.driver_number)
        .or_else(|| roster.first().map(|d| d.driver_number))
}

/// Zero-time anchor of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReferenceTime {
    pub start: DateTime<Utc>,
    /// True when the anchor fell back to the wall clock
    pub degraded: bool,
}

/// Pole sitter's lap 1 start minus the pre-race buffer, or `now` when unavailable
pub fn resolve_reference_time(
    laps: &[LapRecord],
    pole: Option<u32>,
    now: DateTime<Utc>,
) -> ReferenceTime {
    let lap_one_start = pole.and_then(|driver| {
        laps.iter()
            .find(|l| l.driver_number == driver && l.lap_number == 1)
            .and_then(LapRecord::start)
    });

    match lap_one_start {
        Some(start) => ReferenceTime {
            start: start - TimeDelta::seconds(PRE_RACE_BUFFER_SECS),
            degraded: false,
        },
        None => {
            tracing::warn!(
                "Could not determine start time from pole sitter {:?}, using wall clock",
                pole
            );
            ReferenceTime {
                start: now,
                degraded: true,
            }
        }
    }
}

/// Persisted `race_metadata.json` document
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceMetadata {
    pub session_key: u32,
    pub reference_start_time: DateTime<Utc>,
    pub reference_degraded: bool,
    pub race_winner: Option<u32>,
    pub podium_drivers: Vec<u32>,
    pub fastest_lap: Option<FastestLap>,
}

impl RaceMetadata {
    pub fn new(session_key: u32, reference: &ReferenceTime, facts: &RaceFacts) -> Self {
        Self {
            session_key,
            reference_start_time: reference.start,
            reference_degraded: reference.degraded,
            race_winner: facts.winner,
            podium_drivers: facts.podium.clone(),
            fastest_lap: facts.fastest_lap.clone(),
        }
    }
}
