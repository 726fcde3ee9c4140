use crate::extract::coerce;
use crate::extract::data_rows;
use crate::extract::ExtractionError;
use crate::record::Record;
use crate::record::Value;
use crate::spec::NoTitleTableSpec;
use crate::spreadsheet::cell_position;
use crate::spreadsheet::WorksheetGrid;
use tracing::debug;

/// Reads a headerless block into records.
///
/// Column semantics come entirely from the declared header list: the
/// block starts at the fixed (start_row, start_col), spans one column per
/// declared header, and each cell is coerced to its declared type before
/// exclusion rules drop unwanted columns. Row termination matches the
/// header-delimited extractor.
pub fn extract_no_title_table(
    grid: &WorksheetGrid,
    spec: &NoTitleTableSpec,
) -> Result<Vec<Record>, ExtractionError> {
    let cols: Vec<usize> = (spec.start_col..spec.start_col + spec.headers.len()).collect();
    let rows = data_rows(grid, spec.start_row, &cols, spec.row_limit);
    let mut records = Vec::with_capacity(rows.len());
    for row in rows {
        let mut record = Record::new();
        for (name, col) in spec.headers.iter().zip(cols.iter()) {
            let cell = grid.value(row, *col);
            let value = match spec.column_types.get(name) {
                Some(kind) => {
                    coerce(cell, *kind).ok_or_else(|| ExtractionError::TypeCoercion {
                        file: grid.file_name.to_owned(),
                        sheet: grid.sheet_name.to_owned(),
                        position: cell_position(row, *col),
                        expected: *kind,
                        value: cell.get_text().unwrap_or_default(),
                    })?
                }
                None => Value::from(cell),
            };
            if !spec.exclude_columns.contains(name) {
                record.set(name, value);
            }
        }
        records.push(record);
    }
    debug!(
        table = %spec.table_name,
        rows = records.len(),
        "extracted no-title table"
    );
    Ok(records)
}
