//! Session artifact store
//!
//! Layout of a built session:
//!
//! ```text
//! race_data_<key>/
//!   session_info.json  drivers.json  session_result.json  laps.json
//!   starting_grid.json intervals.json positions.json      stints.json
//!   race_metadata.json track_geometry.json
//!   telemetry/driver_<n>.csv   (or driver_<n>.csv.zst)
//! ```

use anyhow::{Context, Result};
use orr_core::table::{parse_table_file_name, table_file_name, TimelineTable};
use serde::Serialize;
use std::fs::{self, File};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

pub const TELEMETRY_DIR: &str = "telemetry";

pub struct SessionStore {
    dir: PathBuf,
    compress: bool,
}

impl SessionStore {
    /// Open (and create) a session directory
    pub fn create(dir: impl Into<PathBuf>, compress: bool) -> Result<Self> {
        let dir = dir.into();
        fs::create_dir_all(dir.join(TELEMETRY_DIR))
            .with_context(|| format!("creating {}", dir.display()))?;
        Ok(Self { dir, compress })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Write `<name>.json`, pretty-printed
    pub fn write_json<T: Serialize + ?Sized>(&self, name: &str, doc: &T) -> Result<PathBuf> {
        let path = self.dir.join(format!("{}.json", name));
        let mut writer = BufWriter::new(
            File::create(&path).with_context(|| format!("creating {}", path.display()))?,
        );
        serde_json::to_writer_pretty(&mut writer, doc)?;
        writer.flush()?;
        Ok(path)
    }

    /// Write one competitor's timeline under `telemetry/`
    pub fn write_table(&self, driver_number: u32, table: &TimelineTable) -> Result<PathBuf> {
        let path = self
            .dir
            .join(TELEMETRY_DIR)
            .join(table_file_name(driver_number, self.compress));
        table
            .write_path(&path)
            .with_context(|| format!("writing {}", path.display()))?;
        Ok(path)
    }
}

/// Read a table written by [`SessionStore::write_table`]
pub fn read_table(path: &Path) -> Result<TimelineTable> {
    TimelineTable::read_path(path).with_context(|| format!("reading {}", path.display()))
}

/// Competitor tables in a telemetry directory, by driver number
pub fn list_tables(telemetry_dir: &Path) -> Result<Vec<(u32, PathBuf)>> {
    let mut tables = Vec::new();
    for entry in fs::read_dir(telemetry_dir)
        .with_context(|| format!("reading {}", telemetry_dir.display()))?
    {
        let path = entry?.path();
        let parsed = path
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(parse_table_file_name);
        if let Some((driver_number, _)) = parsed {
            tables.push((driver_number, path));
        }
    }
    tables.sort();
    Ok(tables)
}
