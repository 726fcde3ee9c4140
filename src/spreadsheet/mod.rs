//! Worksheet data model: typed cells and the immutable grid the
//! extractors read from. The engine never opens spreadsheet files
//! itself; grids arrive fully materialized from the file-reading
//! collaborator.

pub mod cell;
pub mod grid;

pub use cell::cell_position;
pub use cell::Cell;
pub use cell::CellValue;
pub use grid::WorksheetGrid;
