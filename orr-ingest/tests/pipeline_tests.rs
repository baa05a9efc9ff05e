//! Integration tests for the session build pipeline, run against the demo session

use orr_core::provider::Endpoint;
use orr_core::table::Value;
use orr_core::Field;
use orr_ingest::fixture::DEMO_SESSION_KEY;
use orr_ingest::store::{list_tables, read_table, TELEMETRY_DIR};
use orr_ingest::{BuildConfig, BuiltSession, FixtureProvider, SessionBuilder, SessionStore};
use std::path::PathBuf;

fn scratch_root(name: &str) -> PathBuf {
    let root = std::env::temp_dir().join(format!("orr-pipeline-{}-{}", name, std::process::id()));
    let _ = std::fs::remove_dir_all(&root);
    root
}

fn config(root: &PathBuf) -> BuildConfig {
    BuildConfig {
        session_key: DEMO_SESSION_KEY,
        output_root: root.clone(),
        ..BuildConfig::default()
    }
}

async fn build(provider: &FixtureProvider, config: &BuildConfig) -> BuiltSession {
    let store = SessionStore::create(config.session_dir(), config.compress).unwrap();
    SessionBuilder::new(provider, config)
        .build(&store)
        .await
        .expect("build should not fail")
}

#[tokio::test]
async fn test_demo_session_facts() {
    let root = scratch_root("facts");
    let session = build(&FixtureProvider::demo(), &config(&root)).await;

    assert_eq!(session.facts.winner, Some(1));
    assert_eq!(session.facts.podium, vec![1, 44, 16]);
    let fastest = session.facts.fastest_lap.clone().unwrap();
    assert_eq!((fastest.driver_number, fastest.lap_number), (1, 1));
    assert_eq!(fastest.lap_time, 19.0);

    // pole sitter #16 starts lap 1 at 13:00:00, minus the 20 s buffer
    assert!(!session.reference.degraded);
    assert_eq!(session.reference.start.to_rfc3339(), "2023-09-16T12:59:40+00:00");

    // #4 did not start
    assert_eq!(session.built, vec![1, 16, 44]);
    assert!(session.skipped.is_empty());

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_demo_session_artifacts() {
    let root = scratch_root("artifacts");
    let config = config(&root);
    let session = build(&FixtureProvider::demo(), &config).await;

    for name in [
        "session_info", "drivers", "session_result", "laps", "starting_grid",
        "intervals", "positions", "stints", "race_metadata", "track_geometry",
    ] {
        let path = session.dir.join(format!("{}.json", name));
        assert!(path.is_file(), "missing {}", path.display());
    }

    let metadata: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(session.dir.join("race_metadata.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(metadata["session_key"], DEMO_SESSION_KEY);
    assert_eq!(metadata["race_winner"], 1);
    assert_eq!(metadata["reference_degraded"], false);
    assert_eq!(metadata["fastest_lap"]["lap_time"], 19.0);

    // raw collections are persisted verbatim, extra fields included
    let sessions: serde_json::Value = serde_json::from_str(
        &std::fs::read_to_string(session.dir.join("session_info.json")).unwrap(),
    )
    .unwrap();
    assert_eq!(sessions[0]["circuit_short_name"], "Demo Ring");

    let tables = list_tables(&session.dir.join(TELEMETRY_DIR)).unwrap();
    let drivers: Vec<u32> = tables.iter().map(|(d, _)| *d).collect();
    assert_eq!(drivers, vec![1, 16, 44]);

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_demo_timelines_are_complete() {
    let root = scratch_root("timelines");
    let session = build(&FixtureProvider::demo(), &config(&root)).await;

    for (driver, path) in list_tables(&session.dir.join(TELEMETRY_DIR)).unwrap() {
        let table = read_table(&path).unwrap();
        assert!(!table.is_empty());
        assert!(
            table.offsets().windows(2).all(|w| w[0] < w[1]),
            "offsets of #{} must be strictly increasing",
            driver
        );
        assert!(!table.has_missing());

        for field in [Field::X, Field::Speed, Field::GapToLeader, Field::Position, Field::LapNumber, Field::Compound, Field::TyreAge] {
            assert!(table.field(field).is_some(), "#{} lacks {}", driver, field.name());
        }
        assert!(table.number(Field::DriverNumber, 0) == Some(driver as f64));

        // telemetry starts 10 s before lights out, 10 s after the reference
        assert!((9_000..=11_000).contains(&table.min_offset().unwrap()));
    }

    // the winner switched to hards for laps 4 and 5
    let winner = read_table(&session.dir.join(TELEMETRY_DIR).join("driver_1.csv")).unwrap();
    let compounds = &winner.field(Field::Compound).unwrap().values;
    assert!(compounds.contains(&Value::Text("MEDIUM".into())));
    assert!(compounds.contains(&Value::Text("HARD".into())));

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_demo_track_geometry() {
    let root = scratch_root("geometry");
    let session = build(&FixtureProvider::demo(), &config(&root)).await;
    let geometry = &session.geometry;

    assert!(!geometry.racing_line.is_empty());
    assert!(!geometry.pit_lane.is_empty(), "the winner pits once");
    assert_eq!(geometry.landmarks.len(), 3);
    assert!(geometry.bounds.max_x > geometry.bounds.min_x);
    assert!(geometry.bounds.max_x <= 5000.0);

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_driver_limit_applies_in_roster_order() {
    let root = scratch_root("limit");
    let config = BuildConfig {
        driver_limit: 2,
        fetch_concurrency: 3,
        ..config(&root)
    };
    let session = build(&FixtureProvider::demo(), &config).await;
    assert_eq!(session.built, vec![1, 16]);

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_failed_competitor_fetch_is_skipped() {
    let root = scratch_root("skip");
    let provider = FixtureProvider::demo().failing(Endpoint::CarData, Some(16));
    let session = build(&provider, &config(&root)).await;

    assert_eq!(session.built, vec![1, 44]);
    assert_eq!(session.skipped, vec![16]);
    assert!(!session.dir.join(TELEMETRY_DIR).join("driver_16.csv").exists());

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_unavailable_provider_degrades() {
    let root = scratch_root("empty");
    let session = build(&FixtureProvider::new(), &config(&root)).await;

    assert!(session.reference.degraded);
    assert!(session.built.is_empty());
    assert!(session.geometry.racing_line.is_empty());
    assert_eq!(session.geometry.bounds.max_x, 0.0);
    assert!(session.dir.join("laps.json").is_file());

    std::fs::remove_dir_all(&root).unwrap();
}

#[tokio::test]
async fn test_compressed_tables() {
    let root = scratch_root("zst");
    let config = BuildConfig {
        compress: true,
        ..config(&root)
    };
    let session = build(&FixtureProvider::demo(), &config).await;

    let path = session.dir.join(TELEMETRY_DIR).join("driver_44.csv.zst");
    assert!(path.is_file());
    assert!(!read_table(&path).unwrap().is_empty());

    std::fs::remove_dir_all(&root).unwrap();
}
