//! In-memory provider and a synthetic demo session
//!
//! `FixtureProvider` answers queries from canned record collections, applying
//! the same session / driver / date filters the real API applies. The demo
//! session simulates a short race around an elliptical circuit so the whole
//! pipeline can run offline.

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, TimeDelta, TimeZone, Utc};
use orr_core::model::parse_timestamp;
use orr_core::provider::{Endpoint, ProviderError, Query, TelemetryProvider};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::f64::consts::TAU;

pub const DEMO_SESSION_KEY: u32 = 1;

#[derive(Debug, Clone, Default)]
pub struct FixtureProvider {
    records: HashMap<Endpoint, Vec<Value>>,
    /// Queries that answer with HTTP 500: endpoint, optionally one driver only
    failures: Vec<(Endpoint, Option<u32>)>,
}

impl FixtureProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add raw records to an endpoint's collection
    pub fn with_records(mut self, endpoint: Endpoint, records: impl IntoIterator<Item = Value>) -> Self {
        self.records.entry(endpoint).or_default().extend(records);
        self
    }

    /// Make queries to `endpoint` fail, for every driver or for one
    pub fn failing(mut self, endpoint: Endpoint, driver_number: Option<u32>) -> Self {
        self.failures.push((endpoint, driver_number));
        self
    }

    fn fails(&self, query: &Query) -> bool {
        self.failures.iter().any(|(endpoint, driver)| {
            *endpoint == query.endpoint && (driver.is_none() || *driver == query.driver_number)
        })
    }

    /// Synthetic three-car race, see [`demo_session`]
    pub fn demo() -> Self {
        demo_session(DEMO_SESSION_KEY)
    }
}

fn matches(record: &Value, query: &Query) -> bool {
    if let Some(key) = record.get("session_key").and_then(Value::as_u64) {
        if key != u64::from(query.session_key) {
            return false;
        }
    }
    if let Some(driver) = query.driver_number {
        if record.get("driver_number").and_then(Value::as_u64) != Some(u64::from(driver)) {
            return false;
        }
    }
    if query.from.is_none() && query.until.is_none() {
        return true;
    }
    let Some(date) = record
        .get("date")
        .and_then(Value::as_str)
        .and_then(|raw| parse_timestamp(raw).ok())
    else {
        return true;
    };
    query.from.map_or(true, |from| date >= from) && query.until.map_or(true, |until| date < until)
}

#[async_trait]
impl TelemetryProvider for FixtureProvider {
    fn name(&self) -> &str {
        "Fixture"
    }

    async fn fetch(&self, query: &Query) -> Result<Vec<Value>, ProviderError> {
        if self.fails(query) {
            return Err(ProviderError::Status {
                endpoint: query.endpoint,
                status: 500,
            });
        }
        Ok(self
            .records
            .get(&query.endpoint)
            .map(|records| records.iter().filter(|r| matches(r, query)).cloned().collect())
            .unwrap_or_default())
    }
}

// =============================================================================
// Demo session
// =============================================================================

struct DemoCar {
    number: u32,
    acronym: &'static str,
    colour: &'static str,
    /// Seconds per lap
    pace: f64,
    grid: u32,
}

const DEMO_CARS: [DemoCar; 3] = [
    DemoCar { number: 1, acronym: "VER", colour: "3671C6", pace: 19.0, grid: 2 },
    DemoCar { number: 16, acronym: "LEC", colour: "E8002D", pace: 20.6, grid: 1 },
    DemoCar { number: 44, acronym: "HAM", colour: "27F4D2", pace: 20.3, grid: 3 },
];

const DEMO_LAPS: u32 = 5;
/// Semi-axes of the circuit
const RADIUS_X: f64 = 5000.0;
const RADIUS_Y: f64 = 3000.0;
/// Seconds on the grid before lights out
const GRID_WAIT: f64 = 10.0;
/// Extra seconds lost in the pit lane
const PIT_LOSS: f64 = 4.0;

fn iso(t: DateTime<Utc>) -> String {
    t.to_rfc3339_opts(SecondsFormat::Micros, false)
}

fn lights_out() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2023, 9, 16, 13, 0, 0)
        .single()
        .unwrap_or_default()
}

/// Lap times of a car; the winner loses time on the lap it pits
fn lap_times(car: &DemoCar) -> Vec<f64> {
    (1..=DEMO_LAPS)
        .map(|lap| {
            if car.number == 1 && lap == 3 {
                car.pace + PIT_LOSS
            } else {
                car.pace
            }
        })
        .collect()
}

/// Fraction of laps completed `t` seconds after lights out
fn progress(times: &[f64], t: f64) -> f64 {
    let mut elapsed = 0.0;
    for (i, lap) in times.iter().enumerate() {
        if t < elapsed + lap {
            return i as f64 + (t - elapsed) / lap;
        }
        elapsed += lap;
    }
    times.len() as f64
}

fn demo_session(session_key: u32) -> FixtureProvider {
    let start = lights_out();
    let at = |secs: f64| start + TimeDelta::microseconds((secs * 1_000_000.0).round() as i64);

    let mut laps = Vec::new();
    let mut locations = Vec::new();
    let mut car_data = Vec::new();
    let mut intervals = Vec::new();
    let mut positions = Vec::new();
    let mut stints = Vec::new();

    let finish_times: Vec<(u32, f64)> = DEMO_CARS
        .iter()
        .map(|c| (c.number, lap_times(c).iter().sum::<f64>()))
        .collect();
    let leader_finish = finish_times
        .iter()
        .map(|(_, t)| *t)
        .fold(f64::INFINITY, f64::min);

    for car in &DEMO_CARS {
        let times = lap_times(car);
        let race_time: f64 = times.iter().sum();

        let mut lap_start = 0.0;
        for (i, lap_time) in times.iter().enumerate() {
            laps.push(json!({
                "session_key": session_key,
                "driver_number": car.number,
                "lap_number": i + 1,
                "date_start": iso(at(lap_start)),
                "duration_sector_1": (lap_time * 0.3 * 1000.0).round() / 1000.0,
                "duration_sector_2": (lap_time * 0.35 * 1000.0).round() / 1000.0,
                "duration_sector_3": (lap_time * 0.35 * 1000.0).round() / 1000.0,
                "lap_duration": lap_time,
            }));
            lap_start += lap_time;
        }

        // Location at ~3.7 Hz, car data at ~4.3 Hz, from the grid until after the flag
        let track_point = |t: f64| {
            let theta = TAU * progress(&times, t.max(0.0));
            // Pit lane runs inside the main straight
            let inside = if car.number == 1 && (2.9..3.1).contains(&(theta / TAU)) { 0.9 } else { 1.0 };
            (RADIUS_X * theta.cos() * inside, RADIUS_Y * theta.sin() * inside)
        };

        let mut t = -GRID_WAIT;
        while t < race_time + 5.0 {
            let (x, y) = track_point(t);
            locations.push(json!({
                "session_key": session_key,
                "driver_number": car.number,
                "date": iso(at(t)),
                "x": x.round(),
                "y": y.round(),
                "z": 0,
            }));
            t += 0.27;
        }

        let mut t = -GRID_WAIT;
        let cruising = (TAU * (RADIUS_X + RADIUS_Y) / 2.0) / car.pace * 0.36;
        while t < race_time + 5.0 {
            let moving = t >= 0.0 && t < race_time;
            let speed = if moving { cruising } else { 0.0 };
            car_data.push(json!({
                "session_key": session_key,
                "driver_number": car.number,
                "date": iso(at(t)),
                "speed": speed.round(),
                "rpm": if moving { 11000 } else { 4000 },
                "n_gear": if moving { 7 } else { 0 },
                "throttle": if moving { 100 } else { 0 },
                "brake": 0,
                "drs": 0,
            }));
            t += 0.23;
        }

        let gap = race_time - leader_finish;
        let mut t = 4.0;
        while t < race_time {
            intervals.push(json!({
                "session_key": session_key,
                "driver_number": car.number,
                "date": iso(at(t)),
                "gap_to_leader": if gap > 0.0 { json!((gap * t / race_time * 1000.0).round() / 1000.0) } else { json!(0.0) },
                "interval": if gap > 0.0 { json!((gap * t / race_time * 500.0).round() / 1000.0) } else { json!(0.0) },
            }));
            t += 4.0;
        }

        positions.push(json!({
            "session_key": session_key,
            "driver_number": car.number,
            "date": iso(at(-GRID_WAIT)),
            "position": car.grid,
        }));

        if car.number == 1 {
            stints.push(json!({
                "session_key": session_key, "driver_number": 1, "stint_number": 1,
                "lap_start": 1, "lap_end": 3, "compound": "MEDIUM", "tyre_age_at_start": 0,
            }));
            stints.push(json!({
                "session_key": session_key, "driver_number": 1, "stint_number": 2,
                "lap_start": 4, "lap_end": DEMO_LAPS, "compound": "HARD", "tyre_age_at_start": 0,
            }));
        } else {
            stints.push(json!({
                "session_key": session_key, "driver_number": car.number, "stint_number": 1,
                "lap_start": 1, "lap_end": DEMO_LAPS, "compound": "SOFT", "tyre_age_at_start": 2,
            }));
        }
    }

    // Final classification, plus an entrant that never started
    let mut order = finish_times.clone();
    order.sort_by(|a, b| a.1.total_cmp(&b.1));
    for (rank, (number, time)) in order.iter().enumerate() {
        positions.push(json!({
            "session_key": session_key,
            "driver_number": number,
            "date": iso(at(*time)),
            "position": rank + 1,
        }));
    }
    let mut results: Vec<Value> = order
        .iter()
        .enumerate()
        .map(|(rank, (number, _))| {
            json!({
                "session_key": session_key,
                "driver_number": number,
                "position": rank + 1,
                "number_of_laps": DEMO_LAPS,
                "dns": false,
                "dnf": false,
                "dsq": false,
            })
        })
        .collect();
    results.push(json!({
        "session_key": session_key,
        "driver_number": 4,
        "position": null,
        "number_of_laps": 0,
        "dns": true,
        "dnf": false,
        "dsq": false,
    }));

    let mut drivers: Vec<Value> = DEMO_CARS
        .iter()
        .map(|c| {
            json!({
                "session_key": session_key,
                "driver_number": c.number,
                "name_acronym": c.acronym,
                "team_colour": c.colour,
            })
        })
        .collect();
    drivers.push(json!({
        "session_key": session_key, "driver_number": 4, "name_acronym": "NOR", "team_colour": "FF8000",
    }));

    let grid = DEMO_CARS
        .iter()
        .map(|c| json!({"session_key": session_key, "driver_number": c.number, "position": c.grid}));

    let session = json!({
        "session_key": session_key,
        "session_name": "Race",
        "session_type": "Race",
        "circuit_short_name": "Demo Ring",
        "date_start": iso(start - TimeDelta::minutes(5)),
        "date_end": iso(at(leader_finish + 60.0)),
    });

    FixtureProvider::new()
        .with_records(Endpoint::Sessions, [session])
        .with_records(Endpoint::Drivers, drivers)
        .with_records(Endpoint::SessionResult, results)
        .with_records(Endpoint::Laps, laps)
        .with_records(Endpoint::StartingGrid, grid)
        .with_records(Endpoint::Intervals, intervals)
        .with_records(Endpoint::Position, positions)
        .with_records(Endpoint::Stints, stints)
        .with_records(Endpoint::Location, locations)
        .with_records(Endpoint::CarData, car_data)
}
