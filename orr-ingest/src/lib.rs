//! Telemetry providers and the session build pipeline for OpenRaceReplay

pub mod config;
pub mod fixture;
pub mod openf1;
pub mod pipeline;
pub mod store;

pub use config::BuildConfig;
pub use fixture::FixtureProvider;
pub use openf1::OpenF1Provider;
pub use pipeline::{BuiltSession, SessionBuilder};
pub use store::SessionStore;
