//! Server configuration from `ORR_*` environment variables

use anyhow::{Context, Result};
use orr_core::DEFAULT_FRAME_STEP_MS;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

fn env_or<T>(name: &str, default: T) -> Result<T>
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

#[derive(Debug, Clone, PartialEq)]
pub struct ServerConfig {
    pub bind: SocketAddr,
    /// Directory holding `race_data_<key>/` session directories
    pub data_root: PathBuf,
    /// Virtual clock step and resampling grid
    pub frame_step_ms: i64,
    /// Wall time between two streamed frames
    pub tick: Duration,
    /// Cadence of the finished marker
    pub heartbeat: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            data_root: PathBuf::from("."),
            frame_step_ms: DEFAULT_FRAME_STEP_MS,
            tick: Duration::from_millis(100),
            heartbeat: Duration::from_secs(1),
        }
    }
}

impl ServerConfig {
    pub fn from_env() -> Result<Self> {
        let defaults = Self::default();
        let frame_step_ms: i64 = env_or("ORR_FRAME_STEP_MS", defaults.frame_step_ms)?;
        if frame_step_ms <= 0 {
            anyhow::bail!("ORR_FRAME_STEP_MS must be positive, got {}", frame_step_ms);
        }
        Ok(Self {
            bind: env_or("ORR_BIND", defaults.bind)?,
            data_root: env_or("ORR_DATA_ROOT", defaults.data_root)?,
            frame_step_ms,
            tick: Duration::from_millis(env_or("ORR_TICK_MS", 100u64)?),
            heartbeat: Duration::from_millis(env_or("ORR_HEARTBEAT_MS", 1000u64)?),
        })
    }
}
