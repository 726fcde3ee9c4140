use crate::extract::data_rows;
use crate::extract::ExtractionError;
use crate::record::Record;
use crate::record::Value;
use crate::spec::TableSpec;
use crate::spreadsheet::WorksheetGrid;
use tracing::debug;

/// Reads a header-delimited table into records.
///
/// The header row is located by exact title match (scanning rows
/// top-down, optionally restricted to one column) or taken from a fixed
/// index. Column order in the header defines record column order; data
/// rows run until a blank row, the sheet boundary, or the declared row
/// limit. Zero data rows is a valid empty extraction.
pub fn extract_table(
    grid: &WorksheetGrid,
    spec: &TableSpec,
) -> Result<Vec<Record>, ExtractionError> {
    let (header_row, anchor_col) = locate_header(grid, spec)?;
    let columns = header_columns(grid, spec, header_row, anchor_col)?;
    let cols: Vec<usize> = columns.iter().map(|(_, col)| *col).collect();
    let rows = data_rows(grid, header_row + 1, &cols, spec.row_limit);
    let records = rows
        .into_iter()
        .map(|row| {
            columns
                .iter()
                .map(|(name, col)| (name.to_owned(), Value::from(grid.value(row, *col))))
                .collect()
        })
        .collect::<Vec<Record>>();
    debug!(
        table = %spec.table_name,
        columns = columns.len(),
        rows = records.len(),
        "extracted table"
    );
    Ok(records)
}

/// Finds the header row and the column the table starts at.
fn locate_header(
    grid: &WorksheetGrid,
    spec: &TableSpec,
) -> Result<(usize, usize), ExtractionError> {
    if let Some(header_row) = spec.header_row {
        if !grid.is_empty() && header_row <= grid.row_upper_bound() {
            // Anchor at the first named header cell
            for col in 0..=grid.col_upper_bound() {
                if grid.text(header_row, col).is_some() {
                    return Ok((header_row, col));
                }
            }
        }
        return Err(ExtractionError::TableNotFound {
            file: grid.file_name.to_owned(),
            sheet: grid.sheet_name.to_owned(),
            title: spec.table_name.to_owned(),
        });
    }

    let title = spec.title.as_deref().expect("validated header target");
    if !grid.is_empty() {
        for row in 0..=grid.row_upper_bound() {
            let cols: Vec<usize> = match spec.search_col {
                Some(col) => vec![col],
                None => (0..=grid.col_upper_bound()).collect(),
            };
            for col in cols {
                if grid.text(row, col).as_deref() == Some(title) {
                    return Ok((row + spec.header_offset, col));
                }
            }
        }
    }
    Err(ExtractionError::TableNotFound {
        file: grid.file_name.to_owned(),
        sheet: grid.sheet_name.to_owned(),
        title: title.to_owned(),
    })
}

/// Resolves the header cells into (name, column index) pairs.
///
/// With a declared column count the table spans that many consecutive
/// columns from the anchor, unnamed cells getting generated names;
/// otherwise every non-empty header cell belongs to the table.
fn header_columns(
    grid: &WorksheetGrid,
    spec: &TableSpec,
    header_row: usize,
    anchor_col: usize,
) -> Result<Vec<(String, usize)>, ExtractionError> {
    let columns: Vec<(String, usize)> = match spec.col_count {
        Some(count) => (anchor_col..anchor_col + count)
            .enumerate()
            .map(|(index, col)| {
                let name = grid
                    .text(header_row, col)
                    .unwrap_or_else(|| format!("column{}", index + 1));
                (name, col)
            })
            .collect(),
        None => (0..=grid.col_upper_bound())
            .filter_map(|col| grid.text(header_row, col).map(|name| (name, col)))
            .collect(),
    };
    if columns.is_empty() {
        return Err(ExtractionError::TableNotFound {
            file: grid.file_name.to_owned(),
            sheet: grid.sheet_name.to_owned(),
            title: spec
                .title
                .clone()
                .unwrap_or_else(|| spec.table_name.to_owned()),
        });
    }
    Ok(columns)
}
