//! Session build pipeline
//!
//! One batch pass over a closed historical session:
//!
//! 1. fetch and persist the session-level collections verbatim;
//! 2. derive race facts and the reference time, persist `race_metadata.json`;
//! 3. build and persist the track geometry;
//! 4. fetch telemetry for each eligible competitor, build its timeline and
//!    persist it under `telemetry/`.
//!
//! Upstream failures never abort the build. A failed session-level fetch
//! degrades to an empty collection; a failed competitor fetch skips that
//! competitor; a failed geometry fetch leaves that polyline empty.

use crate::config::BuildConfig;
use crate::store::SessionStore;
use anyhow::Result;
use chrono::{DateTime, Utc};
use futures::stream::{self, StreamExt};
use orr_core::facts::{
    extract_race_facts, pole_sitter, resolve_reference_time, RaceFacts, RaceMetadata,
    ReferenceTime,
};
use orr_core::geometry::{
    find_lap, first_pit_transition, lap_window, pit_lane, pit_window, racing_line, TimeWindow,
    TrackGeometry,
};
use orr_core::model::{
    CarSample, Driver, GridEntry, IntervalRecord, LapRecord, LocationSample, PositionRecord,
    SessionResult, StintRecord,
};
use orr_core::provider::{decode_records, Endpoint, ProviderError, Query, TelemetryProvider};
use orr_core::timeline::{build_timeline, CompetitorStreams};
use serde_json::Value;
use std::path::PathBuf;
use tracing::{info, warn};

/// Session-level collections persisted as JSON documents, in fetch order
const SESSION_COLLECTIONS: [Endpoint; 8] = [
    Endpoint::Sessions,
    Endpoint::Drivers,
    Endpoint::SessionResult,
    Endpoint::Laps,
    Endpoint::StartingGrid,
    Endpoint::Intervals,
    Endpoint::Position,
    Endpoint::Stints,
];

/// Decoded session-level collections
#[derive(Debug, Default)]
struct SessionData {
    drivers: Vec<Driver>,
    results: Vec<SessionResult>,
    laps: Vec<LapRecord>,
    grid: Vec<GridEntry>,
    intervals: Vec<IntervalRecord>,
    positions: Vec<PositionRecord>,
    stints: Vec<StintRecord>,
}

/// What a build produced
#[derive(Debug)]
pub struct BuiltSession {
    pub dir: PathBuf,
    pub reference: ReferenceTime,
    pub facts: RaceFacts,
    pub geometry: TrackGeometry,
    /// Competitors with a persisted timeline, in build order
    pub built: Vec<u32>,
    /// Eligible competitors skipped for missing telemetry
    pub skipped: Vec<u32>,
}

pub struct SessionBuilder<'a> {
    provider: &'a dyn TelemetryProvider,
    config: &'a BuildConfig,
}

impl<'a> SessionBuilder<'a> {
    pub fn new(provider: &'a dyn TelemetryProvider, config: &'a BuildConfig) -> Self {
        Self { provider, config }
    }

    fn query(&self, endpoint: Endpoint) -> Query {
        Query::new(endpoint, self.config.session_key)
    }

    /// Fetch a collection; failures and empty answers both yield nothing
    async fn fetch_or_empty(&self, query: &Query) -> Vec<Value> {
        match self.provider.fetch(query).await {
            Ok(records) => {
                if records.is_empty() {
                    warn!("{} returned no records", query.endpoint);
                }
                records
            }
            Err(e) => {
                warn!("{} unavailable: {}", query.endpoint, e);
                Vec::new()
            }
        }
    }

    /// Run the whole build into `store`
    pub async fn build(&self, store: &SessionStore) -> Result<BuiltSession> {
        let session_key = self.config.session_key;
        info!(
            "Building session {} from {} into {}",
            session_key,
            self.provider.name(),
            store.dir().display()
        );

        let data = self.fetch_session_data(store).await?;

        let facts = extract_race_facts(&data.results, &data.laps);
        let pole = pole_sitter(&data.grid, &data.drivers);
        let reference = resolve_reference_time(&data.laps, pole, Utc::now());
        store.write_json(
            "race_metadata",
            &RaceMetadata::new(session_key, &reference, &facts),
        )?;
        info!(
            "Metadata saved. Winner: {:?}, fastest lap: {:?}s",
            facts.winner,
            facts.fastest_lap.as_ref().map(|f| f.lap_time)
        );

        let geometry = self.build_geometry(&data, &facts).await;
        store.write_json("track_geometry", &geometry)?;
        info!(
            "Track geometry: {} racing line points, {} pit lane points, {} landmarks",
            geometry.racing_line.len(),
            geometry.pit_lane.len(),
            geometry.landmarks.len()
        );

        let (built, skipped) = self
            .build_competitors(store, &data, &facts, reference.start)
            .await?;
        info!(
            "Built {} competitor timelines ({} skipped)",
            built.len(),
            skipped.len()
        );

        Ok(BuiltSession {
            dir: store.dir().to_path_buf(),
            reference,
            facts,
            geometry,
            built,
            skipped,
        })
    }

    async fn fetch_session_data(&self, store: &SessionStore) -> Result<SessionData> {
        let mut data = SessionData::default();
        for endpoint in SESSION_COLLECTIONS {
            info!("Fetching {}...", endpoint);
            let raw = self.fetch_or_empty(&self.query(endpoint)).await;
            if let Some(name) = endpoint.artifact_name() {
                store.write_json(name, &raw)?;
            }
            match endpoint {
                Endpoint::Drivers => data.drivers = decode_records(endpoint, &raw),
                Endpoint::SessionResult => data.results = decode_records(endpoint, &raw),
                Endpoint::Laps => data.laps = decode_records(endpoint, &raw),
                Endpoint::StartingGrid => data.grid = decode_records(endpoint, &raw),
                Endpoint::Intervals => data.intervals = decode_records(endpoint, &raw),
                Endpoint::Position => data.positions = decode_records(endpoint, &raw),
                Endpoint::Stints => data.stints = decode_records(endpoint, &raw),
                _ => {}
            }
        }
        Ok(data)
    }

    async fn locations_in(&self, driver_number: u32, window: &TimeWindow) -> Vec<LocationSample> {
        let query = self
            .query(Endpoint::Location)
            .driver(driver_number)
            .since(window.start)
            .before(window.end);
        decode_records(Endpoint::Location, &self.fetch_or_empty(&query).await)
    }

    async fn build_geometry(&self, data: &SessionData, facts: &RaceFacts) -> TrackGeometry {
        let stride = self.config.track_stride;

        let (line, landmarks) = match facts
            .fastest_lap
            .as_ref()
            .and_then(|f| find_lap(&data.laps, f.driver_number, f.lap_number))
        {
            Some(lap) => match lap_window(lap) {
                Some(window) => {
                    let samples = self.locations_in(lap.driver_number, &window).await;
                    racing_line(lap, &samples, stride)
                }
                None => racing_line(lap, &[], stride),
            },
            None => {
                warn!("No fastest lap, racing line left empty");
                (Vec::new(), Vec::new())
            }
        };

        let pit = match facts.winner {
            Some(winner) => {
                let window = first_pit_transition(&data.stints, winner)
                    .and_then(|in_lap| pit_window(&data.laps, winner, in_lap));
                match window {
                    Some(window) => {
                        let samples = self.locations_in(winner, &window).await;
                        pit_lane(&window, &samples, stride)
                    }
                    None => {
                        info!("Winner #{} has no usable pit stop, pit lane left empty", winner);
                        Vec::new()
                    }
                }
            }
            None => Vec::new(),
        };

        TrackGeometry::new(line, pit, landmarks)
    }

    async fn fetch_telemetry(
        &self,
        driver_number: u32,
        since: DateTime<Utc>,
    ) -> Result<(Vec<LocationSample>, Vec<CarSample>), ProviderError> {
        let location = self
            .query(Endpoint::Location)
            .driver(driver_number)
            .since(since);
        let car = self
            .query(Endpoint::CarData)
            .driver(driver_number)
            .since(since);

        let locations = self.provider.fetch(&location).await?;
        let cars = self.provider.fetch(&car).await?;
        Ok((
            decode_records(Endpoint::Location, &locations),
            decode_records(Endpoint::CarData, &cars),
        ))
    }

    async fn build_competitors(
        &self,
        store: &SessionStore,
        data: &SessionData,
        facts: &RaceFacts,
        reference: DateTime<Utc>,
    ) -> Result<(Vec<u32>, Vec<u32>)> {
        let order = competitor_order(&data.drivers, facts);
        info!(
            "Processing {} eligible competitors (limit {})",
            order.len(),
            self.config.driver_limit
        );

        let mut fetches = stream::iter(order)
            .map(|driver| async move { (driver, self.fetch_telemetry(driver, reference).await) })
            .buffered(self.config.fetch_concurrency.max(1));

        let mut built = Vec::new();
        let mut skipped = Vec::new();
        while let Some((driver, fetched)) = fetches.next().await {
            if built.len() >= self.config.driver_limit {
                break;
            }
            info!("Processing competitor #{}", driver);

            let (locations, car_samples) = match fetched {
                Ok(streams) => streams,
                Err(e) => {
                    warn!("Skipping #{}: {}", driver, e);
                    skipped.push(driver);
                    continue;
                }
            };

            let streams = CompetitorStreams {
                driver_number: driver,
                locations: &locations,
                car_samples: &car_samples,
                intervals: &data.intervals,
                positions: &data.positions,
                laps: &data.laps,
                stints: &data.stints,
            };
            match build_timeline(&streams, reference) {
                Ok(table) => {
                    let path = store.write_table(driver, &table)?;
                    info!("Saved {} rows to {}", table.len(), path.display());
                    built.push(driver);
                }
                Err(e) => {
                    warn!("Skipping #{}: {}", driver, e);
                    skipped.push(driver);
                }
            }
        }

        Ok((built, skipped))
    }
}

/// Roster order restricted to eligible competitors; result order when the
/// roster is empty
pub fn competitor_order(roster: &[Driver], facts: &RaceFacts) -> Vec<u32> {
    if roster.is_empty() {
        return facts.eligible.clone();
    }
    let mut order: Vec<u32> = Vec::new();
    for driver in roster {
        if facts.is_eligible(driver.driver_number) && !order.contains(&driver.driver_number) {
            order.push(driver.driver_number);
        }
    }
    order
}
