//! Build configuration
//!
//! Every setting has a default and can be overridden through an `ORR_*`
//! environment variable.

use anyhow::{Context, Result};
use orr_core::geometry::DEFAULT_TRACK_STRIDE;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_SESSION_KEY: u32 = 9523;
pub const DEFAULT_API_BASE: &str = "https://api.openf1.org/v1";
pub const DEFAULT_DRIVER_LIMIT: usize = 22;

/// Read `name`, falling back to `default` when unset or empty
pub fn env_or<T>(name: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match std::env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .with_context(|| format!("invalid value for {}: {:?}", name, raw)),
        _ => Ok(default),
    }
}

/// Boolean flag: `1`, `true`, `yes` and `on` enable it
pub fn env_flag(name: &str) -> bool {
    std::env::var(name)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq)]
pub struct BuildConfig {
    pub session_key: u32,
    pub api_base: String,
    /// Artifacts go to `<output_root>/race_data_<session_key>/`
    pub output_root: PathBuf,
    /// Maximum number of competitors built into timelines
    pub driver_limit: usize,
    pub track_stride: usize,
    /// Competitor telemetry fetches in flight at once
    pub fetch_concurrency: usize,
    /// Write `.csv.zst` tables instead of plain CSV
    pub compress: bool,
    pub http_timeout: Duration,
}

impl Default for BuildConfig {
    fn default() -> Self {
        Self {
            session_key: DEFAULT_SESSION_KEY,
            api_base: DEFAULT_API_BASE.to_string(),
            output_root: PathBuf::from("."),
            driver_limit: DEFAULT_DRIVER_LIMIT,
            track_stride: DEFAULT_TRACK_STRIDE,
            fetch_concurrency: 1,
            compress: false,
            http_timeout: Duration::from_secs(60),
        }
    }
}

impl BuildConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        Ok(Self {
            session_key: env_or("ORR_SESSION_KEY", defaults.session_key)?,
            api_base: env_or("ORR_API_BASE", defaults.api_base)?,
            output_root: env_or("ORR_OUTPUT_ROOT", defaults.output_root)?,
            driver_limit: env_or("ORR_DRIVER_LIMIT", defaults.driver_limit)?,
            track_stride: env_or("ORR_TRACK_STRIDE", defaults.track_stride)?.max(1),
            fetch_concurrency: env_or("ORR_FETCH_CONCURRENCY", defaults.fetch_concurrency)?.max(1),
            compress: env_flag("ORR_COMPRESS"),
            http_timeout: Duration::from_secs(env_or(
                "ORR_HTTP_TIMEOUT_SECS",
                defaults.http_timeout.as_secs(),
            )?),
        })
    }

    /// Session output directory
    pub fn session_dir(&self) -> PathBuf {
        self.output_root
            .join(format!("race_data_{}", self.session_key))
    }
}
