//! Extractors that turn declared worksheet regions into typed records.
//!
//! All three extractors are pure reads over a [`WorksheetGrid`]; they
//! share the blank-row termination rule and declared-type coercion
//! defined here. Errors carry enough context (file, sheet, position) to
//! be actionable without re-running the pipeline.

pub mod key_value;
pub mod no_title;
pub mod table;

use crate::database::column::ColumnType;
use crate::record::Value;
use crate::spreadsheet::CellValue;
use crate::spreadsheet::WorksheetGrid;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use thiserror::Error;

pub use key_value::extract_key_value;
pub use no_title::extract_no_title_table;
pub use table::extract_table;

/// Extraction errors, scoped to one table or key-value.
#[derive(Error, Debug)]
pub enum ExtractionError {
    #[error("Missing cell at '{position}' in sheet '{sheet}' of '{file}'")]
    MissingCell {
        file: String,
        sheet: String,
        position: String,
    },

    #[error("Title '{title}' not found in sheet '{sheet}' of '{file}'")]
    TitleNotFound {
        file: String,
        sheet: String,
        title: String,
    },

    #[error("Table '{title}' not found in sheet '{sheet}' of '{file}'")]
    TableNotFound {
        file: String,
        sheet: String,
        title: String,
    },

    #[error("Cannot coerce '{value}' at '{position}' in sheet '{sheet}' of '{file}' to {expected}")]
    TypeCoercion {
        file: String,
        sheet: String,
        position: String,
        expected: ColumnType,
        value: String,
    },

    #[error("Non-numeric value '{value}' in column '{column}' at row {row} of table '{table}'")]
    CalculationTypeMismatch {
        table: String,
        column: String,
        row: usize,
        value: String,
    },

    #[error("Sheet '{sheet}' of '{file}' was not supplied")]
    MissingSheet { file: String, sheet: String },
}

/// Accepted textual date layouts, day-first variants included.
const DATE_LAYOUTS: [&str; 4] = ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%d-%m-%Y"];

/// Parses a date from text, trying each accepted layout in order.
pub(crate) fn parse_date_text(text: &str) -> Option<NaiveDate> {
    let text = text.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| NaiveDate::parse_from_str(text, layout).ok())
        .or_else(|| parse_datetime_text(text).map(|datetime| datetime.date()))
}

/// Parses a date/time from text: each accepted date layout with a time
/// component, falling back to midnight for date-only text.
pub(crate) fn parse_datetime_text(text: &str) -> Option<NaiveDateTime> {
    let text = text.trim();
    DATE_LAYOUTS
        .iter()
        .find_map(|layout| {
            let layout = format!("{layout} %H:%M:%S");
            NaiveDateTime::parse_from_str(text, &layout).ok()
        })
        .or_else(|| {
            DATE_LAYOUTS.iter().find_map(|layout| {
                NaiveDate::parse_from_str(text, layout)
                    .ok()
                    .and_then(|date| date.and_hms_opt(0, 0, 0))
            })
        })
}

/// Coerces a cell to the declared column type.
/// Empty cells always coerce to null; None signals a coercion failure.
pub(crate) fn coerce(value: &CellValue, kind: ColumnType) -> Option<Value> {
    if value.is_empty() {
        return Some(Value::Null);
    }
    match kind {
        ColumnType::Boolean => match value {
            CellValue::Bool(flag) => Some(Value::Bool(*flag)),
            CellValue::Number(number) if *number == 0.0 => Some(Value::Bool(false)),
            CellValue::Number(number) if *number == 1.0 => Some(Value::Bool(true)),
            CellValue::Text(text) => match text.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Value::Bool(true)),
                "false" | "0" => Some(Value::Bool(false)),
                _ => None,
            },
            _ => None,
        },
        ColumnType::Integer => match value {
            CellValue::Number(number) if number.fract() == 0.0 => {
                Some(Value::Integer(*number as i64))
            }
            CellValue::Text(text) => text.trim().parse::<i64>().ok().map(Value::Integer),
            _ => None,
        },
        ColumnType::Float => match value {
            CellValue::Number(number) => Some(Value::Float(*number)),
            CellValue::Text(text) => text.trim().parse::<f64>().ok().map(Value::Float),
            _ => None,
        },
        ColumnType::Text => value.get_text().map(Value::Text),
        ColumnType::Date => match value {
            CellValue::Date(_) | CellValue::DateTime(_) => value.get_date().map(Value::Date),
            CellValue::Text(text) => parse_date_text(text).map(Value::Date),
            _ => None,
        },
        ColumnType::Timestamp => match value {
            CellValue::Date(_) | CellValue::DateTime(_) => {
                value.get_datetime().map(Value::Timestamp)
            }
            CellValue::Text(text) => parse_datetime_text(text).map(Value::Timestamp),
            _ => None,
        },
    }
}

/// Indexes of consecutive data rows starting at `first_row`.
///
/// Reading stops at the first blank row (every table column empty), at
/// the sheet boundary, or after `limit` rows, whichever comes first.
pub(crate) fn data_rows(
    grid: &WorksheetGrid,
    first_row: usize,
    cols: &[usize],
    limit: Option<usize>,
) -> Vec<usize> {
    let mut rows = Vec::new();
    if grid.is_empty() {
        return rows;
    }
    for row in first_row..=grid.row_upper_bound() {
        if grid.is_blank_row(row, cols) {
            break;
        }
        if let Some(limit) = limit {
            if rows.len() == limit {
                break;
            }
        }
        rows.push(row);
    }
    rows
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn coerce_empty_is_null() {
        assert_eq!(
            coerce(&CellValue::Empty, ColumnType::Integer),
            Some(Value::Null)
        );
    }

    #[test]
    fn coerce_numbers() {
        assert_eq!(
            coerce(&CellValue::Number(5.0), ColumnType::Integer),
            Some(Value::Integer(5))
        );
        assert_eq!(coerce(&CellValue::Number(5.5), ColumnType::Integer), None);
        assert_eq!(
            coerce(&CellValue::Text(" 12 ".to_owned()), ColumnType::Integer),
            Some(Value::Integer(12))
        );
        assert_eq!(
            coerce(&CellValue::Number(5.5), ColumnType::Float),
            Some(Value::Float(5.5))
        );
    }

    #[test]
    fn coerce_dates_from_text() {
        let expected = NaiveDate::from_ymd_opt(2025, 7, 13).unwrap();
        for text in ["2025-07-13", "13/07/2025", "13.07.2025", "13-07-2025"] {
            assert_eq!(
                coerce(&CellValue::Text(text.to_owned()), ColumnType::Date),
                Some(Value::Date(expected)),
                "layout {text}"
            );
        }
        assert_eq!(
            coerce(&CellValue::Text("not a date".to_owned()), ColumnType::Date),
            None
        );
    }

    #[test]
    fn coerce_datetime_with_time() {
        let datetime = parse_datetime_text("13/07/2025 23:01:19").unwrap();
        assert_eq!(
            datetime.format("%Y-%m-%d %H:%M:%S").to_string(),
            "2025-07-13 23:01:19"
        );
    }

    #[test]
    fn coerce_booleans() {
        assert_eq!(
            coerce(&CellValue::Text("TRUE".to_owned()), ColumnType::Boolean),
            Some(Value::Bool(true))
        );
        assert_eq!(
            coerce(&CellValue::Number(0.0), ColumnType::Boolean),
            Some(Value::Bool(false))
        );
        assert_eq!(
            coerce(&CellValue::Text("yes".to_owned()), ColumnType::Boolean),
            None
        );
    }

    #[test]
    fn data_rows_stop_at_blank() {
        let grid = WorksheetGrid::from_rows(
            "f",
            "s",
            vec![
                vec![CellValue::Number(1.0)],
                vec![CellValue::Number(2.0)],
                vec![CellValue::Empty],
                vec![CellValue::Number(3.0)],
            ],
        );
        assert_eq!(data_rows(&grid, 0, &[0], None), vec![0, 1]);
    }

    #[test]
    fn data_rows_honor_limit_and_boundary() {
        let grid = WorksheetGrid::from_rows(
            "f",
            "s",
            vec![
                vec![CellValue::Number(1.0)],
                vec![CellValue::Number(2.0)],
                vec![CellValue::Number(3.0)],
            ],
        );
        assert_eq!(data_rows(&grid, 0, &[0], Some(2)), vec![0, 1]);
        assert_eq!(data_rows(&grid, 1, &[0], None), vec![1, 2]);
        assert_eq!(data_rows(&grid, 5, &[0], None), Vec::<usize>::new());
    }
}
