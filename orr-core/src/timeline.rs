//! Competitor timeline builder
//!
//! Merges one competitor's streams into a single table keyed by elapsed
//! offset from the session reference time:
//!
//! 1. Location samples form the base sequence.
//! 2. Car-sensor samples attach by nearest timestamp (either direction).
//! 3. Intervals, classification positions and synthesized lap events attach
//!    by backward as-of (most recent record at or before the base sample).
//! 4. Tyre state attaches by exact lap number.
//!
//! Which rule applies to which column is read from [`Field::join_policy`].

use crate::align::{backward_indices, nearest_indices};
use crate::error::{Error, Result};
use crate::fields::{Field, JoinPolicy};
use crate::model::{
    offset_by, sorted_by_time, CarSample, Gap, IntervalRecord, LapRecord, LocationSample,
    PositionRecord, StintRecord,
};
use crate::table::{Column, TimelineTable, Value};
use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// One competitor's raw streams.
///
/// Session-wide collections may be passed as-is; records belonging to other
/// competitors are ignored.
#[derive(Debug, Clone, Copy)]
pub struct CompetitorStreams<'a> {
    pub driver_number: u32,
    pub locations: &'a [LocationSample],
    pub car_samples: &'a [CarSample],
    pub intervals: &'a [IntervalRecord],
    pub positions: &'a [PositionRecord],
    pub laps: &'a [LapRecord],
    pub stints: &'a [StintRecord],
}

// === Lap events ===

/// What a synthetic lap instant reports
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LapEventKind {
    /// Lap started; sector and lap times are unknown again
    Start,
    Sector1End(f64),
    Sector2End(f64),
    Finish { sector_3: Option<f64>, lap_time: f64 },
}

/// A point event derived from a lap record
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LapEvent {
    pub at: DateTime<Utc>,
    pub lap_number: u32,
    pub kind: LapEventKind,
}

impl LapEvent {
    fn value(&self, field: Field) -> Value {
        match (field, self.kind) {
            (Field::LapNumber, _) => Value::Number(self.lap_number as f64),
            (Field::Sector1, LapEventKind::Sector1End(s)) => Value::Number(s),
            (Field::Sector2, LapEventKind::Sector2End(s)) => Value::Number(s),
            (Field::Sector3, LapEventKind::Finish { sector_3, .. }) => Value::from(sector_3),
            (Field::LapTime, LapEventKind::Finish { lap_time, .. }) => Value::Number(lap_time),
            _ => Value::Null,
        }
    }
}

fn positive(value: Option<f64>) -> Option<f64> {
    value.filter(|v| v.is_finite() && *v > 0.0)
}

/// Expand lap records into time-ordered start / sector / finish instants.
///
/// Sector ends accumulate over the sectors that are known; a duration that is
/// not a usable span of time is treated as unknown. Laps without a parseable
/// start are skipped.
pub fn lap_events<'a>(laps: impl IntoIterator<Item = &'a LapRecord>) -> Vec<LapEvent> {
    let mut laps: Vec<&LapRecord> = laps.into_iter().collect();
    laps.sort_by_key(|l| l.lap_number);

    let mut events = Vec::with_capacity(laps.len() * 4);
    for lap in laps {
        let Some(start) = lap.start() else {
            tracing::debug!(
                "Skipping lap {} of #{}: unparseable start {:?}",
                lap.lap_number,
                lap.driver_number,
                lap.date_start
            );
            continue;
        };

        let event = |at, kind| LapEvent {
            at,
            lap_number: lap.lap_number,
            kind,
        };

        events.push(event(start, LapEventKind::Start));

        let mut cursor = start;
        if let Some(s1) = positive(lap.duration_sector_1) {
            if let Some(end) = offset_by(cursor, s1) {
                cursor = end;
                events.push(event(cursor, LapEventKind::Sector1End(s1)));
            }
        }
        if let Some(s2) = positive(lap.duration_sector_2) {
            if let Some(end) = offset_by(cursor, s2) {
                cursor = end;
                events.push(event(cursor, LapEventKind::Sector2End(s2)));
            }
        }
        let finish = positive(lap.lap_duration)
            .and_then(|total| offset_by(start, total).map(|end| (total, end)));
        if let Some((total, end)) = finish {
            events.push(event(
                end,
                LapEventKind::Finish {
                    sector_3: lap.duration_sector_3,
                    lap_time: total,
                },
            ));
        }
    }

    events.sort_by_key(|e| e.at);
    events
}

// === Tyre state ===

/// Tyre compound and age during one lap
#[derive(Debug, Clone, PartialEq)]
pub struct TyreState {
    pub compound: Option<String>,
    pub tyre_age: Option<u32>,
}

/// Expand stints into one tyre state per lap number.
///
/// Age on lap L is the stint's starting age plus laps since the stint began.
/// When two stints claim the same lap, the later stint wins.
pub fn expand_stints<'a>(stints: impl IntoIterator<Item = &'a StintRecord>) -> BTreeMap<u32, TyreState> {
    let mut stints: Vec<&StintRecord> = stints.into_iter().collect();
    stints.sort_by_key(|s| s.stint_number);

    let mut by_lap = BTreeMap::new();
    for stint in stints {
        let (Some(lap_start), Some(lap_end)) = (stint.lap_start, stint.lap_end) else {
            tracing::debug!("Skipping open-ended stint {:?} of #{}", stint.stint_number, stint.driver_number);
            continue;
        };
        for lap in lap_start..=lap_end {
            by_lap.insert(
                lap,
                TyreState {
                    compound: stint.compound.clone(),
                    tyre_age: stint
                        .tyre_age_at_start
                        .map(|age| age.saturating_add(lap - lap_start)),
                },
            );
        }
    }
    by_lap
}

// === Merge ===

fn gap_value(gap: Option<&Gap>) -> Value {
    match gap {
        Some(Gap::Seconds(s)) => Value::Number(*s),
        Some(Gap::Text(t)) => Value::Text(t.clone()),
        None => Value::Null,
    }
}

/// Streams aligned onto the base sequence, one index vector per source
struct Aligned<'a> {
    base: Vec<&'a LocationSample>,
    car: Vec<Option<&'a CarSample>>,
    intervals: Option<Vec<Option<&'a IntervalRecord>>>,
    positions: Option<Vec<Option<&'a PositionRecord>>>,
    lap_events: Option<Vec<Option<LapEvent>>>,
    tyres: Option<BTreeMap<u32, TyreState>>,
}

impl Aligned<'_> {
    fn contributes(&self, field: Field) -> bool {
        match field.join_policy() {
            JoinPolicy::Key => false,
            JoinPolicy::Base | JoinPolicy::Nearest => true,
            JoinPolicy::Backward => match field {
                Field::GapToLeader | Field::Interval => self.intervals.is_some(),
                Field::Position => self.positions.is_some(),
                _ => self.lap_events.is_some(),
            },
            JoinPolicy::ExactKey => self.tyres.is_some(),
        }
    }

    fn lap_number(&self, row: usize) -> Option<u32> {
        self.lap_events
            .as_ref()
            .and_then(|events| events[row])
            .map(|e| e.lap_number)
    }

    fn value(&self, field: Field, row: usize) -> Value {
        match field.join_policy() {
            JoinPolicy::Key => Value::Null,
            JoinPolicy::Base => {
                let loc = self.base[row];
                match field {
                    Field::DriverNumber => Value::Number(loc.driver_number as f64),
                    Field::X => Value::from(loc.x),
                    Field::Y => Value::from(loc.y),
                    _ => Value::Null,
                }
            }
            JoinPolicy::Nearest => {
                let Some(car) = self.car[row] else {
                    return Value::Null;
                };
                Value::from(match field {
                    Field::Speed => car.speed,
                    Field::Rpm => car.rpm,
                    Field::Gear => car.n_gear,
                    Field::Throttle => car.throttle,
                    Field::Brake => car.brake,
                    Field::Drs => car.drs,
                    _ => None,
                })
            }
            JoinPolicy::Backward => match field {
                Field::GapToLeader | Field::Interval => {
                    let rec = self.intervals.as_ref().and_then(|v| v[row]);
                    match (field, rec) {
                        (Field::GapToLeader, Some(r)) => gap_value(r.gap_to_leader.as_ref()),
                        (Field::Interval, Some(r)) => gap_value(r.interval.as_ref()),
                        _ => Value::Null,
                    }
                }
                Field::Position => Value::from(
                    self.positions
                        .as_ref()
                        .and_then(|v| v[row])
                        .and_then(|p| p.position),
                ),
                _ => self
                    .lap_events
                    .as_ref()
                    .and_then(|v| v[row])
                    .map_or(Value::Null, |e| e.value(field)),
            },
            JoinPolicy::ExactKey => {
                let state = self
                    .lap_number(row)
                    .and_then(|lap| self.tyres.as_ref().and_then(|t| t.get(&lap)));
                match (field, state) {
                    (Field::Compound, Some(s)) => {
                        s.compound.clone().map(Value::Text).unwrap_or(Value::Null)
                    }
                    (Field::TyreAge, Some(s)) => Value::from(s.tyre_age),
                    _ => Value::Null,
                }
            }
        }
    }
}

fn times<T>(records: &[(DateTime<Utc>, T)]) -> Vec<DateTime<Utc>> {
    records.iter().map(|(t, _)| *t).collect()
}

fn pick<T: Copy>(indices: Vec<Option<usize>>, records: &[(DateTime<Utc>, T)]) -> Vec<Option<T>> {
    indices
        .into_iter()
        .map(|i| i.map(|i| records[i].1))
        .collect()
}

/// Build one competitor's timeline.
///
/// Fails with `EmptyStream` when the competitor has no usable location or
/// car-sensor samples; callers skip such competitors. The returned table has
/// strictly increasing offsets and no missing cells.
pub fn build_timeline(
    streams: &CompetitorStreams<'_>,
    reference: DateTime<Utc>,
) -> Result<TimelineTable> {
    let driver = streams.driver_number;
    let own = move |d: u32| d == driver;

    let locations = sorted_by_time(streams.locations.iter().filter(|r| own(r.driver_number)));
    if locations.is_empty() {
        return Err(Error::EmptyStream {
            driver_number: driver,
            stream: "location",
        });
    }
    let cars = sorted_by_time(streams.car_samples.iter().filter(|r| own(r.driver_number)));
    if cars.is_empty() {
        return Err(Error::EmptyStream {
            driver_number: driver,
            stream: "car",
        });
    }

    let base_times = times(&locations);

    let intervals = sorted_by_time(streams.intervals.iter().filter(|r| own(r.driver_number)));
    let positions = sorted_by_time(streams.positions.iter().filter(|r| own(r.driver_number)));
    let events: Vec<(DateTime<Utc>, LapEvent)> =
        lap_events(streams.laps.iter().filter(|l| own(l.driver_number)))
            .into_iter()
            .map(|e| (e.at, e))
            .collect();
    let tyres = expand_stints(streams.stints.iter().filter(|s| own(s.driver_number)));

    let lap_rows = (!events.is_empty())
        .then(|| pick(backward_indices(&base_times, &times(&events)), &events));

    let aligned = Aligned {
        car: pick(nearest_indices(&base_times, &times(&cars)), &cars),
        intervals: (!intervals.is_empty())
            .then(|| pick(backward_indices(&base_times, &times(&intervals)), &intervals)),
        positions: (!positions.is_empty())
            .then(|| pick(backward_indices(&base_times, &times(&positions)), &positions)),
        // Tyre state is keyed by lap number, so it needs the lap column
        tyres: (!tyres.is_empty() && lap_rows.is_some()).then_some(tyres),
        lap_events: lap_rows,
        base: locations.iter().map(|(_, l)| *l).collect(),
    };

    let offsets: Vec<i64> = base_times
        .iter()
        .map(|t| (*t - reference).num_milliseconds())
        .collect();

    let columns: Vec<Column> = Field::ALL
        .into_iter()
        .filter(|f| aligned.contributes(*f))
        .map(|f| {
            let values = (0..offsets.len()).map(|row| aligned.value(f, row)).collect();
            Column::new(f.name(), values)
        })
        .collect();

    let mut table = TimelineTable::new(offsets, columns)?;
    table.fill_missing();
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeDelta, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2023, 9, 16, 13, 0, 0).unwrap()
    }

    fn at(ms: i64) -> String {
        (t0() + TimeDelta::milliseconds(ms)).to_rfc3339()
    }

    fn loc(ms: i64, x: f64) -> LocationSample {
        LocationSample { date: at(ms), driver_number: 1, x: Some(x), y: Some(-x), z: Some(0.0) }
    }

    fn car(ms: i64, speed: f64) -> CarSample {
        CarSample {
            date: at(ms),
            driver_number: 1,
            speed: Some(speed),
            rpm: Some(11000.0),
            n_gear: Some(7.0),
            throttle: Some(100.0),
            brake: Some(0.0),
            drs: None,
        }
    }

    fn lap(lap_number: u32, start_ms: i64) -> LapRecord {
        LapRecord {
            driver_number: 1,
            lap_number,
            date_start: Some(at(start_ms)),
            duration_sector_1: Some(0.1),
            duration_sector_2: Some(0.1),
            duration_sector_3: Some(0.1),
            lap_duration: Some(0.3),
        }
    }

    fn stint(n: u32, lap_start: u32, lap_end: u32, age: u32, compound: &str) -> StintRecord {
        StintRecord {
            driver_number: 1,
            stint_number: Some(n),
            lap_start: Some(lap_start),
            lap_end: Some(lap_end),
            compound: Some(compound.to_string()),
            tyre_age_at_start: Some(age),
        }
    }

    fn streams<'a>(
        locations: &'a [LocationSample],
        car_samples: &'a [CarSample],
    ) -> CompetitorStreams<'a> {
        CompetitorStreams {
            driver_number: 1,
            locations,
            car_samples,
            intervals: &[],
            positions: &[],
            laps: &[],
            stints: &[],
        }
    }

    fn column<'a>(table: &'a TimelineTable, name: &str) -> &'a [Value] {
        &table.column(name).unwrap().values
    }

    #[test]
    fn test_stint_expansion_ages() {
        let tyres = expand_stints(&[stint(1, 5, 8, 2, "SOFT")]);
        let ages: Vec<(u32, Option<u32>)> = tyres.iter().map(|(l, s)| (*l, s.tyre_age)).collect();
        assert_eq!(ages, vec![(5, Some(2)), (6, Some(3)), (7, Some(4)), (8, Some(5))]);
        assert_eq!(tyres[&5].compound.as_deref(), Some("SOFT"));
    }

    #[test]
    fn test_stint_overlap_later_wins() {
        let tyres = expand_stints(&[stint(2, 10, 12, 0, "HARD"), stint(1, 1, 10, 3, "MEDIUM")]);
        assert_eq!(tyres[&9].compound.as_deref(), Some("MEDIUM"));
        assert_eq!(tyres[&9].tyre_age, Some(11));
        assert_eq!(tyres[&10].compound.as_deref(), Some("HARD"));
        assert_eq!(tyres[&10].tyre_age, Some(0));
    }

    #[test]
    fn test_lap_events_sequence() {
        let events = lap_events(&[lap(1, 100)]);
        let offsets: Vec<i64> = events.iter().map(|e| (e.at - t0()).num_milliseconds()).collect();
        assert_eq!(offsets, vec![100, 200, 300, 400]);
        assert_eq!(events[0].kind, LapEventKind::Start);
        assert_eq!(events[1].kind, LapEventKind::Sector1End(0.1));
        assert_eq!(events[2].kind, LapEventKind::Sector2End(0.1));
        assert_eq!(
            events[3].kind,
            LapEventKind::Finish { sector_3: Some(0.1), lap_time: 0.3 }
        );
    }

    #[test]
    fn test_lap_events_skip_unparseable_start() {
        let mut bad = lap(2, 500);
        bad.date_start = Some("??".to_string());
        let events = lap_events(&[lap(1, 100), bad]);
        assert_eq!(events.len(), 4);
        assert!(events.iter().all(|e| e.lap_number == 1));
    }

    #[test]
    fn test_lap_events_without_sectors() {
        let mut partial = lap(1, 0);
        partial.duration_sector_1 = None;
        partial.lap_duration = None;
        let events = lap_events(&[partial]);
        let kinds: Vec<LapEventKind> = events.iter().map(|e| e.kind).collect();
        assert_eq!(kinds, vec![LapEventKind::Start, LapEventKind::Sector2End(0.1)]);
        assert_eq!((events[1].at - t0()).num_milliseconds(), 100);
    }

    #[test]
    fn test_lap_events_ignore_absurd_durations() {
        let mut bogus = lap(1, 0);
        bogus.lap_duration = Some(1e13);
        bogus.duration_sector_2 = Some(f64::INFINITY);
        let events = lap_events(&[bogus, lap(2, 1000)]);

        let lap_1: Vec<LapEventKind> = events
            .iter()
            .filter(|e| e.lap_number == 1)
            .map(|e| e.kind)
            .collect();
        assert_eq!(lap_1, vec![LapEventKind::Start, LapEventKind::Sector1End(0.1)]);
        assert_eq!(events.iter().filter(|e| e.lap_number == 2).count(), 4);
    }

    #[test]
    fn test_stint_age_saturates() {
        let tyres = expand_stints(&[stint(1, 1, 3, u32::MAX - 1, "HARD")]);
        let ages: Vec<Option<u32>> = tyres.values().map(|s| s.tyre_age).collect();
        assert_eq!(ages, vec![Some(u32::MAX - 1), Some(u32::MAX), Some(u32::MAX)]);
    }

    #[test]
    fn test_car_data_joins_by_nearest() {
        let locations = [loc(0, 1.0), loc(100, 2.0), loc(200, 3.0), loc(300, 4.0)];
        let cars = [car(40, 100.0), car(260, 200.0)];
        let table = build_timeline(&streams(&locations, &cars), t0()).unwrap();

        assert_eq!(table.offsets(), &[0, 100, 200, 300]);
        let speeds: Vec<f64> = column(&table, "speed").iter().filter_map(Value::as_f64).collect();
        assert_eq!(speeds, vec![100.0, 100.0, 200.0, 200.0]);
        // drs never reported: defaulted
        assert!(column(&table, "drs").iter().all(|v| *v == Value::Number(0.0)));
    }

    #[test]
    fn test_backward_fields_and_column_presence() {
        let locations = [loc(0, 1.0), loc(100, 2.0), loc(200, 3.0)];
        let cars = [car(0, 100.0)];
        let intervals = [IntervalRecord {
            date: at(150),
            driver_number: 1,
            gap_to_leader: Some(Gap::Seconds(1.5)),
            interval: Some(Gap::Text("+1 LAP".into())),
        }];
        let positions = [PositionRecord { date: at(50), driver_number: 1, position: Some(4) }];

        let mut s = streams(&locations, &cars);
        s.intervals = &intervals;
        s.positions = &positions;
        let table = build_timeline(&s, t0()).unwrap();

        assert_eq!(
            column(&table, "gap_to_leader"),
            &[Value::Number(0.0), Value::Number(0.0), Value::Number(1.5)]
        );
        assert_eq!(
            column(&table, "interval"),
            &[Value::Text(String::new()), Value::Text(String::new()), Value::Text("+1 LAP".into())]
        );
        assert_eq!(
            column(&table, "position"),
            &[Value::Number(0.0), Value::Number(4.0), Value::Number(4.0)]
        );
        assert!(table.column("lap_number").is_none());
        assert!(table.column("compound").is_none());
    }

    #[test]
    fn test_lap_and_tyre_columns() {
        let locations: Vec<LocationSample> = (0..6).map(|i| loc(i * 100 + 50, i as f64)).collect();
        let cars = [car(0, 100.0)];
        let laps = [lap(1, 100)];
        let stints = [stint(1, 1, 20, 3, "SOFT")];

        let mut s = streams(&locations, &cars);
        s.laps = &laps;
        s.stints = &stints;
        let table = build_timeline(&s, t0()).unwrap();

        // rows at 50, 150, 250, 350, 450, 550
        assert_eq!(table.number(Field::LapNumber, 0), Some(0.0));
        assert_eq!(table.number(Field::LapNumber, 1), Some(1.0));
        assert_eq!(table.number(Field::Sector1, 1), Some(0.0));
        assert_eq!(table.number(Field::Sector1, 2), Some(0.1));
        assert_eq!(table.number(Field::Sector2, 2), Some(0.0));
        assert_eq!(table.number(Field::Sector2, 3), Some(0.1));
        assert_eq!(table.number(Field::LapTime, 4), Some(0.3));
        assert_eq!(table.number(Field::Sector3, 5), Some(0.1));

        // pre-race row has no tyre state
        assert_eq!(column(&table, "compound")[0], Value::Text(String::new()));
        assert_eq!(table.number(Field::TyreAge, 0), Some(0.0));
        assert_eq!(column(&table, "compound")[1], Value::Text("SOFT".into()));
        assert_eq!(table.number(Field::TyreAge, 1), Some(3.0));
    }

    #[test]
    fn test_offsets_unique_and_complete() {
        let mut locations = vec![loc(0, 1.0), loc(100, 2.0)];
        // same millisecond as the previous sample once truncated
        let mut late = loc(100, 9.0);
        late.date = (t0() + TimeDelta::microseconds(100_700)).to_rfc3339();
        locations.push(late);
        locations.push(LocationSample { date: at(200), driver_number: 1, x: None, y: None, z: None });
        // another competitor's sample is ignored
        locations.push(LocationSample { date: at(50), driver_number: 2, x: Some(5.0), y: Some(5.0), z: None });

        let cars = [car(0, 100.0)];
        let table = build_timeline(&streams(&locations, &cars), t0()).unwrap();

        assert_eq!(table.offsets(), &[0, 100, 200]);
        assert!(table.offsets().windows(2).all(|w| w[0] < w[1]));
        assert_eq!(table.number(Field::X, 1), Some(9.0));
        assert_eq!(table.number(Field::X, 2), Some(0.0));
        assert!(!table.has_missing());
    }

    #[test]
    fn test_empty_streams_are_rejected() {
        let cars = [car(0, 100.0)];
        let err = build_timeline(&streams(&[], &cars), t0()).unwrap_err();
        assert!(matches!(err, Error::EmptyStream { stream: "location", .. }));

        let locations = [loc(0, 1.0)];
        let err = build_timeline(&streams(&locations, &[]), t0()).unwrap_err();
        assert!(matches!(err, Error::EmptyStream { stream: "car", .. }));
    }
}
