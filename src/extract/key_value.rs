use crate::extract::coerce;
use crate::extract::parse_datetime_text;
use crate::extract::ExtractionError;
use crate::record::Value;
use crate::spec::CellTarget;
use crate::spec::KeyValueSpec;
use crate::spreadsheet::cell_position;
use crate::spreadsheet::WorksheetGrid;
use std::fmt::Write;
use tracing::debug;
use tracing::warn;

/// Pulls a single named value out of the grid.
///
/// The target cell is resolved either directly by (row, col) or by
/// scanning a bounded window for a title match and applying the declared
/// offset. The value is coerced to the declared type and re-emitted
/// through the format string when one is present.
pub fn extract_key_value(
    grid: &WorksheetGrid,
    spec: &KeyValueSpec,
) -> Result<Value, ExtractionError> {
    let (row, col) = resolve_target(grid, spec)?;
    let cell = grid.value(row, col);
    let value = match spec.value_type {
        Some(kind) => coerce(cell, kind).ok_or_else(|| ExtractionError::TypeCoercion {
            file: grid.file_name.to_owned(),
            sheet: grid.sheet_name.to_owned(),
            position: cell_position(row, col),
            expected: kind,
            value: cell.get_text().unwrap_or_default(),
        })?,
        None => Value::from(cell),
    };
    let value = match &spec.format {
        Some(format) => apply_format(value, format, &spec.name),
        None => value,
    };
    debug!(key = %spec.name, %value, "extracted key-value");
    Ok(value)
}

fn resolve_target(
    grid: &WorksheetGrid,
    spec: &KeyValueSpec,
) -> Result<(usize, usize), ExtractionError> {
    match &spec.target {
        CellTarget::Coordinates { row, col } => {
            if grid.contains(*row, *col) {
                Ok((*row, *col))
            } else {
                Err(ExtractionError::MissingCell {
                    file: grid.file_name.to_owned(),
                    sheet: grid.sheet_name.to_owned(),
                    position: cell_position(*row, *col),
                })
            }
        }
        CellTarget::Title {
            title,
            rows,
            cols,
            row_offset,
            col_offset,
        } => {
            let (title_row, title_col) = find_title(grid, title, *rows, *cols).ok_or_else(|| {
                ExtractionError::TitleNotFound {
                    file: grid.file_name.to_owned(),
                    sheet: grid.sheet_name.to_owned(),
                    title: title.to_owned(),
                }
            })?;
            let row = title_row as i64 + row_offset;
            let col = title_col as i64 + col_offset;
            if row < 0 || col < 0 || !grid.contains(row as usize, col as usize) {
                return Err(ExtractionError::MissingCell {
                    file: grid.file_name.to_owned(),
                    sheet: grid.sheet_name.to_owned(),
                    position: cell_position(row.max(0) as usize, col.max(0) as usize),
                });
            }
            Ok((row as usize, col as usize))
        }
    }
}

/// Scans the search window row by row for an exact trimmed title match.
fn find_title(
    grid: &WorksheetGrid,
    title: &str,
    rows: usize,
    cols: usize,
) -> Option<(usize, usize)> {
    if grid.is_empty() {
        return None;
    }
    let row_upper = grid.row_upper_bound().min(rows.saturating_sub(1));
    let col_upper = grid.col_upper_bound().min(cols.saturating_sub(1));
    for row in 0..=row_upper {
        for col in 0..=col_upper {
            if grid.text(row, col).as_deref() == Some(title) {
                return Some((row, col));
            }
        }
    }
    None
}

/// Re-emits a date-bearing value through the spec's format string.
///
/// Text values are first parsed through the accepted input layouts.
/// Format application is lenient: a value that fits no layout keeps its
/// raw form with a warning, so a cosmetic format never fails a run.
fn apply_format(value: Value, format: &str, name: &str) -> Value {
    let datetime = match &value {
        Value::Date(date) => date.and_hms_opt(0, 0, 0),
        Value::Timestamp(datetime) => Some(*datetime),
        Value::Text(text) => {
            let parsed = parse_datetime_text(text);
            if parsed.is_none() {
                warn!(key = name, value = %text, "value fits no known date layout, keeping raw");
            }
            parsed
        }
        _ => None,
    };
    match datetime {
        Some(datetime) => {
            let mut formatted = String::new();
            if write!(formatted, "{}", datetime.format(format)).is_ok() {
                Value::Text(formatted)
            } else {
                warn!(key = name, format, "invalid date format string, keeping raw value");
                value
            }
        }
        None => value,
    }
}
