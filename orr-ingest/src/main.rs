//! OpenRaceReplay session builder
//!
//! ```text
//! orr-build [SESSION_KEY]     build a session from the OpenF1 API
//! orr-build demo              build the synthetic demo session
//! orr-build inspect DIR       summarise the telemetry tables in DIR
//! ```

use anyhow::{bail, Context, Result};
use orr_ingest::fixture::DEMO_SESSION_KEY;
use orr_ingest::store::{list_tables, read_table, TELEMETRY_DIR};
use orr_ingest::{BuildConfig, FixtureProvider, OpenF1Provider, SessionBuilder, SessionStore};
use orr_core::TelemetryProvider;
use std::path::Path;
use std::time::Instant;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    match args.first().map(String::as_str) {
        Some("inspect") => {
            let Some(dir) = args.get(1) else {
                bail!("usage: orr-build inspect <dir>");
            };
            inspect(Path::new(dir))
        }
        Some("demo") => {
            let config = BuildConfig {
                session_key: DEMO_SESSION_KEY,
                ..BuildConfig::from_env()?
            };
            build(&FixtureProvider::demo(), &config).await
        }
        Some(key) => {
            let config = BuildConfig {
                session_key: key
                    .parse()
                    .with_context(|| format!("invalid session key {:?}", key))?,
                ..BuildConfig::from_env()?
            };
            let provider = OpenF1Provider::new(&config.api_base, config.http_timeout)?;
            build(&provider, &config).await
        }
        None => {
            let config = BuildConfig::from_env()?;
            let provider = OpenF1Provider::new(&config.api_base, config.http_timeout)?;
            build(&provider, &config).await
        }
    }
}

async fn build(provider: &dyn TelemetryProvider, config: &BuildConfig) -> Result<()> {
    let started = Instant::now();
    let store = SessionStore::create(config.session_dir(), config.compress)?;
    let session = SessionBuilder::new(provider, config).build(&store).await?;

    info!(
        "Session {} built in {:.1}s: {} timelines in {}",
        config.session_key,
        started.elapsed().as_secs_f64(),
        session.built.len(),
        session.dir.display()
    );
    if session.reference.degraded {
        warn!("Reference time fell back to the wall clock; offsets are approximate");
    }
    Ok(())
}

/// Print one line per table: rows, max offset and covered duration
fn inspect(dir: &Path) -> Result<()> {
    let telemetry = if dir.join(TELEMETRY_DIR).is_dir() {
        dir.join(TELEMETRY_DIR)
    } else {
        dir.to_path_buf()
    };
    println!("--- INSPECTING TABLES ({}) ---", telemetry.display());

    let tables = list_tables(&telemetry)?;
    if tables.is_empty() {
        println!("No telemetry tables found");
        return Ok(());
    }

    for (_, path) in tables {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        match read_table(&path) {
            Ok(table) => {
                let summary = table.summary();
                println!(
                    "{:<20} | Rows: {:<6} | Max Offset: {:<8} ms | Duration: {:.2} min",
                    name, summary.rows, summary.max_offset_ms, summary.duration_minutes
                );
            }
            Err(e) => println!("{:<20} | ERROR - {:#}", name, e),
        }
    }
    println!("{}", "-".repeat(50));
    Ok(())
}
