//! Derived-column computation over one logical table's record sequence.
//!
//! Columns are computed in declared order against working copies of the
//! input records, which are never mutated; later columns may reference
//! earlier outputs. Aggregates run over extraction row order, which is
//! part of the contract. Nulls are skipped by aggregates; a non-null
//! non-numeric source value fails fast rather than coercing to zero.

pub mod expr;

use crate::error::SheetSinkError;
use crate::extract::ExtractionError;
use crate::record::Record;
use crate::record::Value;
use crate::spec::calculated::Aggregate;
use crate::spec::calculated::PartialWindow;
use crate::spec::calculated::PercentageMode;
use crate::spec::CalculatedColumnSpec;
use crate::spec::Placement;
use crate::spec::SpecError;
use chrono::NaiveDateTime;
use expr::Binding;
use expr::EvalError;
use expr::Expr;
use std::collections::HashMap;
use std::fmt::Write;
use tracing::debug;
use tracing::warn;

/// Per-run inputs the calculations need beyond the records themselves:
/// the processing-time wall clock (passed explicitly so behavior is
/// reproducible) and the extracted key-values visible to expressions.
pub struct CalcContext<'a> {
    pub now: NaiveDateTime,
    pub scalars: &'a HashMap<String, Value>,
}

/// Appends every declared calculated column to the record sequence.
/// Returns augmented copies; the input records stay untouched.
pub fn apply_calculated_columns(
    records: &[Record],
    specs: &[CalculatedColumnSpec],
    context: &CalcContext,
    table: &str,
) -> Result<Vec<Record>, SheetSinkError> {
    let mut working: Vec<Record> = records.to_vec();
    if working.is_empty() {
        return Ok(working);
    }
    for spec in specs {
        if spec.placement() == Placement::None {
            warn!(table, column = spec.name(), "calculated column with placement 'none' skipped");
            continue;
        }
        let mut column = compute_column(&working, spec, context, table)?;
        if spec.placement() == Placement::FirstRow {
            for value in column.iter_mut().skip(1) {
                *value = Value::Null;
            }
        }
        for (record, value) in working.iter_mut().zip(column.into_iter()) {
            record.set(spec.name(), value);
        }
        debug!(table, column = spec.name(), "calculated column appended");
    }
    Ok(working)
}

fn compute_column(
    records: &[Record],
    spec: &CalculatedColumnSpec,
    context: &CalcContext,
    table: &str,
) -> Result<Vec<Value>, SheetSinkError> {
    match spec {
        CalculatedColumnSpec::Cumulative {
            name,
            source,
            aggregate,
            ..
        } => {
            let series = numeric_series(records, source, name, table)?;
            Ok((0..series.len())
                .map(|index| apply_aggregate(&series[..=index], *aggregate))
                .collect())
        }
        CalculatedColumnSpec::Rolling {
            name,
            source,
            aggregate,
            window,
            on_partial_window,
            ..
        } => {
            let series = numeric_series(records, source, name, table)?;
            Ok((0..series.len())
                .map(|index| {
                    if index + 1 < *window {
                        match on_partial_window {
                            PartialWindow::Partial => apply_aggregate(&series[..=index], *aggregate),
                            PartialWindow::Null => Value::Null,
                        }
                    } else {
                        apply_aggregate(&series[index + 1 - window..=index], *aggregate)
                    }
                })
                .collect())
        }
        CalculatedColumnSpec::Percentage {
            name,
            source,
            mode,
            ..
        } => {
            let series = numeric_series(records, source, name, table)?;
            Ok(percentage(&series, *mode))
        }
        CalculatedColumnSpec::Custom {
            name, expression, ..
        } => custom_column(records, name, expression, context, table),
        CalculatedColumnSpec::CurrentDate { format, .. } => {
            let mut formatted = String::new();
            if write!(formatted, "{}", context.now.format(format)).is_err() {
                warn!(table, format, "invalid current_date format, using ISO date");
                formatted = context.now.format("%Y-%m-%d").to_string();
            }
            Ok(vec![Value::Text(formatted); records.len()])
        }
    }
}

/// Numeric view of a source column across all records.
/// Nulls stay null; anything else non-numeric fails fast.
fn numeric_series(
    records: &[Record],
    source: &str,
    output: &str,
    table: &str,
) -> Result<Vec<Option<f64>>, SheetSinkError> {
    records
        .iter()
        .enumerate()
        .map(|(row, record)| {
            let value = record.get(source).ok_or_else(|| SpecError::UnknownColumn {
                table: table.to_owned(),
                column: output.to_owned(),
                reference: source.to_owned(),
            })?;
            match value {
                Value::Null => Ok(None),
                _ => value.as_f64().map(Some).ok_or_else(|| {
                    SheetSinkError::from(ExtractionError::CalculationTypeMismatch {
                        table: table.to_owned(),
                        column: source.to_owned(),
                        row,
                        value: value.to_string(),
                    })
                }),
            }
        })
        .collect()
}

/// Reduces a window of the series with the requested aggregate.
fn apply_aggregate(window: &[Option<f64>], aggregate: Aggregate) -> Value {
    let values: Vec<f64> = window.iter().flatten().copied().collect();
    match aggregate {
        Aggregate::Count => Value::Integer(values.len() as i64),
        Aggregate::Average => {
            if values.is_empty() {
                Value::Null
            } else {
                Value::Float(values.iter().sum::<f64>() / values.len() as f64)
            }
        }
        Aggregate::Sum => number(values.iter().sum::<f64>(), values.is_empty()),
        Aggregate::Min => values
            .iter()
            .copied()
            .fold(None::<f64>, |min, value| {
                Some(min.map_or(value, |min| min.min(value)))
            })
            .map(|value| number(value, false))
            .unwrap_or(Value::Null),
        Aggregate::Max => values
            .iter()
            .copied()
            .fold(None::<f64>, |max, value| {
                Some(max.map_or(value, |max| max.max(value)))
            })
            .map(|value| number(value, false))
            .unwrap_or(Value::Null),
    }
}

/// Narrows whole results back to integers so an all-integer source
/// column keeps an integer-typed aggregate.
fn number(value: f64, empty: bool) -> Value {
    if empty {
        Value::Null
    } else if value.fract() == 0.0 && value.abs() < 9e18 {
        Value::Integer(value as i64)
    } else {
        Value::Float(value)
    }
}

fn percentage(series: &[Option<f64>], mode: PercentageMode) -> Vec<Value> {
    match mode {
        PercentageMode::OfTotal => {
            let total: f64 = series.iter().flatten().sum();
            series
                .iter()
                .map(|value| match value {
                    Some(value) if total != 0.0 => Value::Float(value / total * 100.0),
                    _ => Value::Null,
                })
                .collect()
        }
        PercentageMode::Change => {
            let mut column = vec![Value::Null];
            for index in 1..series.len() {
                column.push(match (series[index - 1], series[index]) {
                    (Some(previous), Some(current)) if previous != 0.0 => {
                        Value::Float((current - previous) / previous * 100.0)
                    }
                    _ => Value::Null,
                });
            }
            column
        }
    }
}

/// Evaluates a custom expression row by row.
/// References resolve to the row's columns first, then to extracted
/// key-values; anything else is a configuration error.
fn custom_column(
    records: &[Record],
    output: &str,
    expression: &str,
    context: &CalcContext,
    table: &str,
) -> Result<Vec<Value>, SheetSinkError> {
    let expr = Expr::parse(expression).map_err(|error| SpecError::BadExpression {
        table: table.to_owned(),
        column: output.to_owned(),
        message: error.to_string(),
    })?;
    let mut column = Vec::with_capacity(records.len());
    for (row, record) in records.iter().enumerate() {
        let resolve = |name: &str| -> Binding {
            let value = record.get(name).or_else(|| context.scalars.get(name));
            match value {
                None => Binding::Missing,
                Some(Value::Null) => Binding::Null,
                Some(value) => match value.as_f64() {
                    Some(number) => Binding::Number(number),
                    None => Binding::Other(value.to_string()),
                },
            }
        };
        let value = expr.evaluate(&resolve).map_err(|error| match error {
            EvalError::UnknownColumn { column } => SheetSinkError::from(SpecError::UnknownColumn {
                table: table.to_owned(),
                column: output.to_owned(),
                reference: column,
            }),
            EvalError::NotNumeric { column, value } => {
                SheetSinkError::from(ExtractionError::CalculationTypeMismatch {
                    table: table.to_owned(),
                    column,
                    row,
                    value,
                })
            }
        })?;
        column.push(value.map(Value::Float).unwrap_or(Value::Null));
    }
    Ok(column)
}
