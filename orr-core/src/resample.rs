//! Playback resampler
//!
//! Re-grids a persisted timeline onto every multiple of a fixed step from 0
//! to the competitor's last offset. Original observations and grid points are
//! merged on one time axis:
//!
//! - continuous fields (`x`, `y`) are linearly interpolated between the
//!   original position fixes and held constant beyond the first and last one.
//!   Rows at the (0, 0) fill placeholder are not fixes and never bracket an
//!   interpolation;
//! - every other field takes the most recent original value at or before the
//!   grid point, or the first original value before data starts.
//!
//! Only grid points are kept. Anything still missing is filled with 0 or "".
//! A grid point is valid when the latest original row at or before it is a
//! real fix, so dropouts are not rendered as cars parked at the origin.

use crate::align::backward_indices;
use crate::error::{Error, Result};
use crate::fields::{fill_class_of, Field, FillClass};
use crate::table::{Column, TimelineTable, Value};

/// Default grid step and virtual clock step
pub const DEFAULT_FRAME_STEP_MS: i64 = 100;

/// A timeline on a fixed grid, with per-row position validity
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayTable {
    step_ms: i64,
    table: TimelineTable,
    valid: Vec<bool>,
}

impl ReplayTable {
    pub fn step_ms(&self) -> i64 {
        self.step_ms
    }

    pub fn table(&self) -> &TimelineTable {
        &self.table
    }

    pub fn len(&self) -> usize {
        self.table.len()
    }

    pub fn is_empty(&self) -> bool {
        self.table.is_empty()
    }

    pub fn max_offset(&self) -> i64 {
        self.table.max_offset().unwrap_or(0)
    }

    /// Row for a grid instant. Off-grid and out-of-range instants have none.
    pub fn row_at(&self, offset: i64) -> Option<usize> {
        if offset < 0 || offset % self.step_ms != 0 {
            return None;
        }
        let row = usize::try_from(offset / self.step_ms).ok()?;
        (row < self.len()).then_some(row)
    }

    /// Whether the row lies within the span of real position fixes
    pub fn is_valid(&self, row: usize) -> bool {
        self.valid.get(row).copied().unwrap_or(false)
    }

    pub fn number(&self, field: Field, row: usize) -> Option<f64> {
        self.table.number(field, row)
    }
}

/// Linear interpolation over `points`, held flat past either end
fn interpolate(points: &[(i64, f64)], grid: &[i64]) -> Vec<Value> {
    let (Some(&(first_t, first_v)), Some(&(last_t, last_v))) = (points.first(), points.last())
    else {
        return vec![Value::Null; grid.len()];
    };

    // First original point at or after the grid instant
    let mut j = 0;
    grid.iter()
        .map(|&g| {
            if g <= first_t {
                return Value::Number(first_v);
            }
            if g >= last_t {
                return Value::Number(last_v);
            }
            while points[j].0 < g {
                j += 1;
            }
            let (t1, v1) = points[j];
            if t1 == g {
                return Value::Number(v1);
            }
            let (t0, v0) = points[j - 1];
            let frac = (g - t0) as f64 / (t1 - t0) as f64;
            Value::Number(v0 + (v1 - v0) * frac)
        })
        .collect()
}

/// Last value at or before each grid instant, else the first value
fn hold(points: &[(i64, &Value)], grid: &[i64]) -> Vec<Value> {
    let times: Vec<i64> = points.iter().map(|(t, _)| *t).collect();
    backward_indices(grid, &times)
        .into_iter()
        .map(|i| match i.or((!points.is_empty()).then_some(0)) {
            Some(i) => points[i].1.clone(),
            None => Value::Null,
        })
        .collect()
}

fn resample_column(offsets: &[i64], fixes: &[bool], column: &Column, grid: &[i64]) -> Column {
    let values = match fill_class_of(&column.name) {
        FillClass::Continuous => {
            let points: Vec<(i64, f64)> = offsets
                .iter()
                .zip(&column.values)
                .zip(fixes)
                .filter(|(_, is_fix)| **is_fix)
                .filter_map(|((t, v), _)| v.as_f64().map(|v| (*t, v)))
                .collect();
            interpolate(&points, grid)
        }
        FillClass::Discrete => {
            let points: Vec<(i64, &Value)> = offsets
                .iter()
                .zip(&column.values)
                .filter(|(_, v)| !v.is_null())
                .map(|(t, v)| (*t, v))
                .collect();
            hold(&points, grid)
        }
    };
    Column::new(column.name.clone(), values)
}

/// Per row: whether it holds a real position fix rather than the origin placeholder
fn position_fixes(table: &TimelineTable) -> Vec<bool> {
    (0..table.len())
        .map(|row| match (table.number(Field::X, row), table.number(Field::Y, row)) {
            (Some(x), Some(y)) => x != 0.0 || y != 0.0,
            _ => false,
        })
        .collect()
}

/// Resample `table` onto a `step_ms` grid covering `[0, max offset]`
pub fn resample(table: &TimelineTable, step_ms: i64) -> Result<ReplayTable> {
    if step_ms <= 0 {
        return Err(Error::InvalidStep(step_ms));
    }
    let max = match table.max_offset() {
        Some(max) if max >= 0 => max,
        _ => return Err(Error::EmptyTable),
    };

    let grid: Vec<i64> = (0..=max / step_ms).map(|i| i * step_ms).collect();

    let fixes = position_fixes(table);
    let columns = table
        .columns()
        .iter()
        .map(|c| resample_column(table.offsets(), &fixes, c, &grid))
        .collect();

    let valid = backward_indices(&grid, table.offsets())
        .into_iter()
        .map(|row| row.is_some_and(|row| fixes[row]))
        .collect();

    let mut gridded = TimelineTable::new(grid, columns)?;
    gridded.fill_missing();

    Ok(ReplayTable {
        step_ms,
        table: gridded,
        valid,
    })
}
