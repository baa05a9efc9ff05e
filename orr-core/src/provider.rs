//! Telemetry provider trait definition

use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use serde::de::DeserializeOwned;
use thiserror::Error;

/// Upstream collections the pipeline reads
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Sessions,
    Drivers,
    SessionResult,
    Laps,
    StartingGrid,
    Intervals,
    Position,
    Stints,
    Location,
    CarData,
}

impl Endpoint {
    /// Path segment on the provider API
    pub fn path(&self) -> &'static str {
        match self {
            Endpoint::Sessions => "sessions",
            Endpoint::Drivers => "drivers",
            Endpoint::SessionResult => "session_result",
            Endpoint::Laps => "laps",
            Endpoint::StartingGrid => "starting_grid",
            Endpoint::Intervals => "intervals",
            Endpoint::Position => "position",
            Endpoint::Stints => "stints",
            Endpoint::Location => "location",
            Endpoint::CarData => "car_data",
        }
    }

    /// Name of the persisted JSON document for session-level collections.
    /// Per-competitor telemetry streams are not persisted verbatim.
    pub fn artifact_name(&self) -> Option<&'static str> {
        match self {
            Endpoint::Sessions => Some("session_info"),
            Endpoint::Drivers => Some("drivers"),
            Endpoint::SessionResult => Some("session_result"),
            Endpoint::Laps => Some("laps"),
            Endpoint::StartingGrid => Some("starting_grid"),
            Endpoint::Intervals => Some("intervals"),
            Endpoint::Position => Some("positions"),
            Endpoint::Stints => Some("stints"),
            Endpoint::Location | Endpoint::CarData => None,
        }
    }
}

impl std::fmt::Display for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.path())
    }
}

/// A parameterised provider query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub endpoint: Endpoint,
    pub session_key: u32,
    pub driver_number: Option<u32>,
    /// Inclusive lower bound on the record timestamp
    pub from: Option<DateTime<Utc>>,
    /// Exclusive upper bound on the record timestamp
    pub until: Option<DateTime<Utc>>,
}

impl Query {
    pub fn new(endpoint: Endpoint, session_key: u32) -> Self {
        Self {
            endpoint,
            session_key,
            driver_number: None,
            from: None,
            until: None,
        }
    }

    pub fn driver(mut self, driver_number: u32) -> Self {
        self.driver_number = Some(driver_number);
        self
    }

    pub fn since(mut self, from: DateTime<Utc>) -> Self {
        self.from = Some(from);
        self
    }

    pub fn before(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    /// Query-string pairs in the provider's filter syntax
    pub fn params(&self) -> Vec<(String, String)> {
        let mut params = vec![("session_key".to_string(), self.session_key.to_string())];
        if let Some(driver) = self.driver_number {
            params.push(("driver_number".to_string(), driver.to_string()));
        }
        if let Some(from) = self.from {
            params.push((
                "date>=".to_string(),
                from.to_rfc3339_opts(SecondsFormat::Micros, false),
            ));
        }
        if let Some(until) = self.until {
            params.push((
                "date<".to_string(),
                until.to_rfc3339_opts(SecondsFormat::Micros, false),
            ));
        }
        params
    }
}

/// Upstream failures. Callers treat every variant as "unavailable" and skip
/// the unit of work that depended on the query.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("{endpoint} returned HTTP {status}")]
    Status { endpoint: Endpoint, status: u16 },

    #[error("request to {endpoint} failed: {message}")]
    Transport { endpoint: Endpoint, message: String },

    #[error("malformed payload from {endpoint}: {message}")]
    Payload { endpoint: Endpoint, message: String },
}

/// Trait for upstream telemetry sources
///
/// A provider answers parameterised queries with flat JSON records. An empty
/// collection is a valid answer, not an error.
#[async_trait]
pub trait TelemetryProvider: Send + Sync {
    /// Get the name of this provider (e.g., "OpenF1")
    fn name(&self) -> &str;

    /// Run a query and return the raw records
    async fn fetch(&self, query: &Query) -> Result<Vec<serde_json::Value>, ProviderError>;
}

/// Decode raw records, skipping the ones that do not fit `T`
pub fn decode_records<T: DeserializeOwned>(endpoint: Endpoint, raw: &[serde_json::Value]) -> Vec<T> {
    let mut skipped = 0usize;
    let records: Vec<T> = raw
        .iter()
        .filter_map(|value| match serde_json::from_value(value.clone()) {
            Ok(record) => Some(record),
            Err(_) => {
                skipped += 1;
                None
            }
        })
        .collect();
    if skipped > 0 {
        tracing::debug!("Skipped {} malformed {} records", skipped, endpoint);
    }
    records
}
