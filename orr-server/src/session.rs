//! Replay sessions loaded from a built session directory
//!
//! Each competitor table is read once and resampled onto the frame grid. A
//! session is immutable after loading and shared read-only by every viewer.

use anyhow::{Context, Result};
use orr_core::resample::{resample, ReplayTable};
use orr_core::table::{parse_table_file_name, TableSummary, TimelineTable};
use orr_core::Field;
use serde::Serialize;
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::path::Path;

/// One competitor's replay data
#[derive(Debug)]
pub struct CompetitorReplay {
    pub replay: ReplayTable,
    /// Summary of the table as stored
    pub source: TableSummary,
}

#[derive(Debug)]
pub struct ReplaySession {
    key: String,
    step_ms: i64,
    competitors: BTreeMap<u32, CompetitorReplay>,
    max_offset: i64,
}

/// Per-competitor line of the session summary
#[derive(Debug, Clone, Serialize)]
pub struct CompetitorSummary {
    pub driver_number: u32,
    pub rows: usize,
    pub max_offset_ms: i64,
    pub duration_minutes: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_key: String,
    pub frame_step_ms: i64,
    pub max_offset_ms: i64,
    pub competitors: Vec<CompetitorSummary>,
}

impl ReplaySession {
    /// Build from in-memory tables; tables that cannot be resampled are dropped
    pub fn from_tables(
        key: impl Into<String>,
        step_ms: i64,
        tables: impl IntoIterator<Item = (u32, TimelineTable)>,
    ) -> Self {
        let key = key.into();
        let mut competitors = BTreeMap::new();
        for (driver_number, table) in tables {
            match resample(&table, step_ms) {
                Ok(replay) => {
                    competitors.insert(
                        driver_number,
                        CompetitorReplay {
                            replay,
                            source: table.summary(),
                        },
                    );
                }
                Err(e) => tracing::warn!("Session {}: dropping #{}: {}", key, driver_number, e),
            }
        }

        let max_offset = competitors
            .values()
            .map(|c| c.source.max_offset_ms)
            .max()
            .unwrap_or(0);

        Self {
            key,
            step_ms,
            competitors,
            max_offset,
        }
    }

    /// Load every competitor table under `<dir>/telemetry`.
    ///
    /// Unreadable or malformed tables are skipped with a warning.
    pub fn load(key: &str, dir: &Path, step_ms: i64) -> Result<Self> {
        let telemetry = dir.join("telemetry");
        tracing::info!("Loading session {} from {}", key, dir.display());

        let mut tables = Vec::new();
        for entry in std::fs::read_dir(&telemetry)
            .with_context(|| format!("reading {}", telemetry.display()))?
        {
            let path = entry?.path();
            let Some((driver_number, _)) = path
                .file_name()
                .and_then(|n| n.to_str())
                .and_then(parse_table_file_name)
            else {
                continue;
            };
            match TimelineTable::read_path(&path) {
                Ok(table) => tables.push((driver_number, table)),
                Err(e) => tracing::warn!("Skipping {}: {:#}", path.display(), e),
            }
        }

        let session = Self::from_tables(key, step_ms, tables);
        tracing::info!(
            "Loaded {} competitors. Max time: {:.2} min",
            session.competitors.len(),
            session.max_offset as f64 / 60_000.0
        );
        Ok(session)
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    /// Largest stored offset across all competitors
    pub fn max_offset(&self) -> i64 {
        self.max_offset
    }

    pub fn competitor_count(&self) -> usize {
        self.competitors.len()
    }

    /// Frame `t|id,x,y,pos|...` for competitors with a valid position at `t`.
    ///
    /// `None` when no competitor qualifies.
    pub fn frame_at(&self, t: i64) -> Option<String> {
        let mut frame = t.to_string();
        let mut entries = 0;
        for (driver_number, competitor) in &self.competitors {
            let replay = &competitor.replay;
            let Some(row) = replay.row_at(t).filter(|&row| replay.is_valid(row)) else {
                continue;
            };
            let value = |field| replay.number(field, row).unwrap_or(0.0).round() as i64;
            let _ = write!(
                frame,
                "|{},{},{},{}",
                driver_number,
                value(Field::X),
                value(Field::Y),
                value(Field::Position)
            );
            entries += 1;
        }
        (entries > 0).then_some(frame)
    }

    /// End-of-data marker
    pub fn finished_marker(&self) -> String {
        format!("{}|FINISHED", self.max_offset)
    }

    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_key: self.key.clone(),
            frame_step_ms: self.step_ms,
            max_offset_ms: self.max_offset,
            competitors: self
                .competitors
                .iter()
                .map(|(driver_number, c)| CompetitorSummary {
                    driver_number: *driver_number,
                    rows: c.source.rows,
                    max_offset_ms: c.source.max_offset_ms,
                    duration_minutes: c.source.duration_minutes,
                })
                .collect(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use orr_core::table::{Column, Value};

    fn table(driver: f64, offsets: Vec<i64>, xs: &[f64], position: f64) -> TimelineTable {
        let n = offsets.len();
        TimelineTable::new(
            offsets,
            vec![
                Column::new("driver_number", vec![Value::Number(driver); n]),
                Column::new("x", xs.iter().map(|v| Value::Number(*v)).collect()),
                Column::new("y", xs.iter().map(|v| Value::Number(-v)).collect()),
                Column::new("position", vec![Value::Number(position); n]),
            ],
        )
        .unwrap()
    }

    #[test]
    fn test_frame_lists_valid_competitors() {
        let session = ReplaySession::from_tables(
            "9523",
            100,
            vec![
                (1, table(1.0, vec![0, 200], &[10.4, 20.4], 1.0)),
                (44, table(44.0, vec![100, 300], &[5.0, 7.0], 2.0)),
            ],
        );

        assert_eq!(session.max_offset(), 300);
        assert_eq!(session.frame_at(0).as_deref(), Some("0|1,10,-10,1"));
        assert_eq!(session.frame_at(100).as_deref(), Some("100|1,15,-15,1|44,5,-5,2"));
        assert_eq!(session.frame_at(300).as_deref(), Some("300|44,7,-7,2"));
        assert_eq!(session.frame_at(400), None);
        assert_eq!(session.finished_marker(), "300|FINISHED");
    }

    #[test]
    fn test_origin_placeholders_are_not_sent() {
        let session = ReplaySession::from_tables(
            "1",
            100,
            vec![(16, table(16.0, vec![0, 100, 200], &[0.0, 3.0, 0.0], 5.0))],
        );
        assert_eq!(session.frame_at(0), None);
        assert_eq!(session.frame_at(100).as_deref(), Some("100|16,3,-3,5"));
        assert_eq!(session.frame_at(200), None);
    }

    #[test]
    fn test_position_dropout_is_not_streamed_at_origin() {
        let session = ReplaySession::from_tables(
            "1",
            100,
            vec![(9, table(9.0, vec![0, 100, 200, 300, 400], &[1000.0, 1000.0, 0.0, 1000.0, 1000.0], 3.0))],
        );
        assert_eq!(session.frame_at(100).as_deref(), Some("100|9,1000,-1000,3"));
        assert_eq!(session.frame_at(200), None);
        assert_eq!(session.frame_at(300).as_deref(), Some("300|9,1000,-1000,3"));

        let session = ReplaySession::from_tables(
            "1",
            100,
            vec![(9, table(9.0, vec![0, 250, 500], &[1000.0, 0.0, 1000.0], 3.0))],
        );
        assert_eq!(session.frame_at(200).as_deref(), Some("200|9,1000,-1000,3"));
        assert_eq!(session.frame_at(300), None);
    }

    #[test]
    fn test_summary_reports_stored_tables() {
        let session = ReplaySession::from_tables(
            "1",
            100,
            vec![(1, table(1.0, vec![0, 60_000, 120_000], &[1.0, 2.0, 3.0], 1.0))],
        );
        let summary = session.summary();
        assert_eq!(summary.max_offset_ms, 120_000);
        assert_eq!(summary.competitors[0].rows, 3);
        assert_eq!(summary.competitors[0].duration_minutes, 2.0);
    }
}
