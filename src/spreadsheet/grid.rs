use crate::spreadsheet::cell::Cell;
use crate::spreadsheet::cell::CellValue;
use std::collections::HashMap;

const EMPTY: CellValue = CellValue::Empty;

/// Immutable two-dimensional view of one worksheet.
///
/// Cells are stored sparsely with a position index for fast lookup; the
/// grid records the file and sheet it came from so that every downstream
/// error can name its origin. The grid is built once by the file-reading
/// collaborator and only ever read afterwards.
#[derive(Debug)]
pub struct WorksheetGrid {
    /// Source file name
    pub file_name: String,
    /// Sheet name
    pub sheet_name: String,
    /// All non-empty cells in the sheet
    cells: Vec<Cell>,
    /// Index mapping from (row, col) to cell vector position
    indexes: HashMap<(usize, usize), usize>,
    /// Last row containing data (0-based, inclusive)
    row_upper_bound: usize,
    /// Last column containing data (0-based, inclusive)
    col_upper_bound: usize,
}

impl WorksheetGrid {
    /// Builds a grid from dense rows of cell values.
    /// Empty values are skipped; the grid stays sparse.
    pub fn from_rows(file_name: &str, sheet_name: &str, rows: Vec<Vec<CellValue>>) -> Self {
        let mut cells: Vec<Cell> = Vec::new();
        let mut indexes: HashMap<(usize, usize), usize> = HashMap::new();
        let mut row_upper_bound = 0;
        let mut col_upper_bound = 0;
        for (row, values) in rows.into_iter().enumerate() {
            for (col, value) in values.into_iter().enumerate() {
                if value.is_empty() {
                    continue;
                }
                row_upper_bound = row_upper_bound.max(row);
                col_upper_bound = col_upper_bound.max(col);
                indexes.insert((row, col), cells.len());
                cells.push(Cell { row, col, value });
            }
        }
        WorksheetGrid {
            file_name: file_name.to_owned(),
            sheet_name: sheet_name.to_owned(),
            cells,
            indexes,
            row_upper_bound,
            col_upper_bound,
        }
    }

    /// Returns true if the sheet contains no cells.
    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    /// Last row containing data (0-based, inclusive).
    pub fn row_upper_bound(&self) -> usize {
        self.row_upper_bound
    }

    /// Last column containing data (0-based, inclusive).
    pub fn col_upper_bound(&self) -> usize {
        self.col_upper_bound
    }

    /// Checks if a position falls inside the data bounds of the sheet.
    pub fn contains(&self, row: usize, col: usize) -> bool {
        !self.is_empty() && row <= self.row_upper_bound && col <= self.col_upper_bound
    }

    /// Gets the cell at the specified position, if one exists.
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.indexes
            .get(&(row, col))
            .and_then(|index| self.cells.get(*index))
    }

    /// Gets the value at the specified position.
    /// Positions without a stored cell read as empty.
    pub fn value(&self, row: usize, col: usize) -> &CellValue {
        self.get(row, col).map(|cell| &cell.value).unwrap_or(&EMPTY)
    }

    /// Trimmed text of the cell at the specified position, if any.
    pub fn text(&self, row: usize, col: usize) -> Option<String> {
        self.value(row, col)
            .get_text()
            .map(|text| text.trim().to_owned())
            .filter(|text| !text.is_empty())
    }

    /// Checks if every one of the given columns is empty in a row.
    pub fn is_blank_row(&self, row: usize, cols: &[usize]) -> bool {
        cols.iter().all(|col| self.value(row, *col).is_empty())
    }
}
