//! Persisted per-competitor timeline tables
//!
//! A `TimelineTable` is a column-oriented table keyed by elapsed offset in
//! milliseconds. Offsets are strictly increasing: the constructor sorts rows
//! and collapses duplicate offsets, keeping the last row.
//!
//! On disk a table is a comma-separated file whose first column is
//! `time_offset`. Which other columns appear depends on which streams
//! contributed, so readers accept any header as long as the offset column is
//! there. Files named `*.zst` are zstd-compressed CSV.

use crate::error::{Error, Result};
use crate::fields::{Field, ValueKind};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

/// A single table cell
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Number(f64),
    Text(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    /// Parse a CSV cell: empty is null, numbers are numbers, anything else is text
    pub fn parse(raw: &str) -> Value {
        if raw.is_empty() {
            return Value::Null;
        }
        match raw.parse::<f64>() {
            Ok(v) if v.is_finite() => Value::Number(v),
            _ => Value::Text(raw.to_string()),
        }
    }

    fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Number(v) => format_number(*v),
            Value::Text(s) => s.clone(),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Number(v)
    }
}

impl From<Option<f64>> for Value {
    fn from(v: Option<f64>) -> Self {
        v.map(Value::Number).unwrap_or(Value::Null)
    }
}

impl From<Option<u32>> for Value {
    fn from(v: Option<u32>) -> Self {
        v.map(|n| Value::Number(n as f64)).unwrap_or(Value::Null)
    }
}

/// Integral values are written without a fractional part
fn format_number(v: f64) -> String {
    if v.fract() == 0.0 && v.abs() < 1e15 {
        format!("{}", v as i64)
    } else {
        format!("{}", v)
    }
}

/// A named column of cells
#[derive(Debug, Clone, PartialEq)]
pub struct Column {
    pub name: String,
    pub values: Vec<Value>,
}

impl Column {
    pub fn new(name: impl Into<String>, values: Vec<Value>) -> Self {
        Self {
            name: name.into(),
            values,
        }
    }

    /// Whether missing cells in this column default to 0 rather than ""
    pub fn is_numeric(&self) -> bool {
        match Field::from_name(&self.name).map(|f| f.value_kind()) {
            Some(ValueKind::Numeric) => true,
            Some(ValueKind::Categorical) => false,
            Some(ValueKind::Mixed) | None => self
                .values
                .iter()
                .all(|v| matches!(v, Value::Null | Value::Number(_))),
        }
    }
}

/// Column-oriented timeline keyed by millisecond offset
#[derive(Debug, Clone, PartialEq)]
pub struct TimelineTable {
    offsets: Vec<i64>,
    columns: Vec<Column>,
}

impl TimelineTable {
    /// Build a table, sorting by offset and collapsing duplicates (last row wins)
    pub fn new(offsets: Vec<i64>, columns: Vec<Column>) -> Result<Self> {
        for column in &columns {
            if column.values.len() != offsets.len() {
                return Err(Error::ColumnLength {
                    name: column.name.clone(),
                    expected: offsets.len(),
                    actual: column.values.len(),
                });
            }
        }

        let mut order: Vec<usize> = (0..offsets.len()).collect();
        order.sort_by_key(|&i| offsets[i]);

        // Keep the last row of each run of equal offsets
        let keep: Vec<usize> = order
            .iter()
            .enumerate()
            .filter(|&(pos, &i)| {
                order
                    .get(pos + 1)
                    .map_or(true, |&next| offsets[next] != offsets[i])
            })
            .map(|(_, &i)| i)
            .collect();

        let already_normal =
            keep.len() == offsets.len() && keep.iter().enumerate().all(|(p, &i)| p == i);
        if already_normal {
            return Ok(Self { offsets, columns });
        }

        let new_offsets = keep.iter().map(|&i| offsets[i]).collect();
        let new_columns = columns
            .into_iter()
            .map(|c| Column {
                values: keep.iter().map(|&i| c.values[i].clone()).collect(),
                name: c.name,
            })
            .collect();

        Ok(Self {
            offsets: new_offsets,
            columns: new_columns,
        })
    }

    pub fn len(&self) -> usize {
        self.offsets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.offsets.is_empty()
    }

    pub fn offsets(&self) -> &[i64] {
        &self.offsets
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn field(&self, field: Field) -> Option<&Column> {
        self.column(field.name())
    }

    pub fn min_offset(&self) -> Option<i64> {
        self.offsets.first().copied()
    }

    pub fn max_offset(&self) -> Option<i64> {
        self.offsets.last().copied()
    }

    /// Numeric value of `field` at `row`, if present and numeric
    pub fn number(&self, field: Field, row: usize) -> Option<f64> {
        self.field(field)
            .and_then(|c| c.values.get(row))
            .and_then(Value::as_f64)
    }

    /// Replace every missing cell: numeric columns with 0, others with ""
    pub fn fill_missing(&mut self) {
        for column in &mut self.columns {
            let default = if column.is_numeric() {
                Value::Number(0.0)
            } else {
                Value::Text(String::new())
            };
            for value in column.values.iter_mut().filter(|v| v.is_null()) {
                *value = default.clone();
            }
        }
    }

    /// Whether any cell is missing
    pub fn has_missing(&self) -> bool {
        self.columns
            .iter()
            .any(|c| c.values.iter().any(Value::is_null))
    }

    /// Write as CSV with a `time_offset` first column
    pub fn write_csv<W: Write>(&self, writer: W) -> Result<()> {
        let mut w = csv::Writer::from_writer(writer);

        let mut header = vec![Field::TimeOffset.name().to_string()];
        header.extend(self.columns.iter().map(|c| c.name.clone()));
        w.write_record(&header)?;

        for (row, offset) in self.offsets.iter().enumerate() {
            let mut record = Vec::with_capacity(self.columns.len() + 1);
            record.push(offset.to_string());
            record.extend(self.columns.iter().map(|c| c.values[row].render()));
            w.write_record(&record)?;
        }

        w.flush()?;
        Ok(())
    }

    /// Read a CSV table written by any builder variant.
    ///
    /// Fails with `MissingOffsetColumn` when there is no `time_offset` header.
    pub fn read_csv<R: Read>(reader: R) -> Result<Self> {
        let mut rdr = csv::Reader::from_reader(reader);

        let headers = rdr.headers()?.clone();
        let offset_idx = headers
            .iter()
            .position(|h| h == Field::TimeOffset.name())
            .ok_or(Error::MissingOffsetColumn)?;

        let names: Vec<(usize, String)> = headers
            .iter()
            .enumerate()
            .filter(|(i, _)| *i != offset_idx)
            .map(|(i, h)| (i, h.to_string()))
            .collect();

        let mut offsets = Vec::new();
        let mut values: Vec<Vec<Value>> = vec![Vec::new(); names.len()];

        for record in rdr.records() {
            let record = record?;
            let raw = record.get(offset_idx).unwrap_or_default();
            offsets.push(parse_offset(raw)?);
            for (slot, (idx, _)) in names.iter().enumerate() {
                values[slot].push(Value::parse(record.get(*idx).unwrap_or_default()));
            }
        }

        let columns = names
            .into_iter()
            .zip(values)
            .map(|((_, name), values)| Column { name, values })
            .collect();

        TimelineTable::new(offsets, columns)
    }
}

// === Files ===

pub const TABLE_EXTENSION: &str = "csv";
pub const COMPRESSED_TABLE_EXTENSION: &str = "csv.zst";

/// `driver_<n>.csv`, or `driver_<n>.csv.zst` when compressed
pub fn table_file_name(driver_number: u32, compressed: bool) -> String {
    let ext = if compressed {
        COMPRESSED_TABLE_EXTENSION
    } else {
        TABLE_EXTENSION
    };
    format!("driver_{}.{}", driver_number, ext)
}

/// Inverse of [`table_file_name`]: driver number and whether the file is compressed
pub fn parse_table_file_name(name: &str) -> Option<(u32, bool)> {
    let rest = name.strip_prefix("driver_")?;
    let (number, compressed) = if let Some(n) = rest.strip_suffix(".csv.zst") {
        (n, true)
    } else {
        (rest.strip_suffix(".csv")?, false)
    };
    number.parse().ok().map(|n| (n, compressed))
}

/// zstd level for compressed tables
const ZSTD_LEVEL: i32 = 3;

fn is_compressed(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == "zst")
}

impl TimelineTable {
    /// Read a table file, decompressing `.zst` files
    pub fn read_path(path: &Path) -> Result<Self> {
        let file = File::open(path)?;
        if is_compressed(path) {
            Self::read_csv(zstd::Decoder::new(file)?)
        } else {
            Self::read_csv(BufReader::new(file))
        }
    }

    /// Write a table file, compressing when the name ends in `.zst`
    pub fn write_path(&self, path: &Path) -> Result<()> {
        let file = File::create(path)?;
        if is_compressed(path) {
            let mut encoder = zstd::Encoder::new(file, ZSTD_LEVEL)?;
            self.write_csv(&mut encoder)?;
            encoder.finish()?;
        } else {
            self.write_csv(BufWriter::new(file))?;
        }
        Ok(())
    }
}

/// Row count and offset span of a table
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TableSummary {
    pub rows: usize,
    pub min_offset_ms: i64,
    pub max_offset_ms: i64,
    pub duration_minutes: f64,
}

impl TimelineTable {
    pub fn summary(&self) -> TableSummary {
        let min = self.min_offset().unwrap_or(0);
        let max = self.max_offset().unwrap_or(0);
        TableSummary {
            rows: self.len(),
            min_offset_ms: min,
            max_offset_ms: max,
            duration_minutes: (max - min) as f64 / 60_000.0,
        }
    }
}

/// Offsets are integers, but tolerate a float rendering such as `1200.0`
fn parse_offset(raw: &str) -> Result<i64> {
    let raw = raw.trim();
    if let Ok(v) = raw.parse::<i64>() {
        return Ok(v);
    }
    match raw.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v.trunc() as i64),
        _ => Err(Error::InvalidOffset(raw.to_string())),
    }
}
