//! OpenRaceReplay Core Library
//!
//! This crate provides the telemetry record model, the provider trait and the
//! temporal alignment pipeline that turns irregular per-competitor streams into
//! replayable timelines.

pub mod align;
pub mod error;
pub mod facts;
pub mod fields;
pub mod geometry;
pub mod model;
pub mod provider;
pub mod resample;
pub mod table;
pub mod timeline;

pub use error::{Error, Result};
pub use fields::{Field, FillClass, JoinPolicy};
pub use provider::{Endpoint, ProviderError, Query, TelemetryProvider};
pub use resample::{resample, ReplayTable, DEFAULT_FRAME_STEP_MS};
pub use table::{TimelineTable, Value};
