//! # SheetSink
//!
//! A configuration-driven engine that extracts structured records from
//! spreadsheet worksheets and persists them into relational tables via
//! idempotent upsert.
//!
//! ## Features
//!
//! - **Declarative extraction**: per-file, per-sheet configuration
//!   describes where data lives (single cells, header-delimited tables,
//!   headerless blocks), validated once at load
//! - **Typed records**: cell values coerce to declared or inferred
//!   column types; no silent text fallbacks
//! - **Calculated columns**: cumulative and rolling aggregates,
//!   percentages, row-local custom expressions, and processing-time
//!   dates appended per placement policy
//! - **Key-value merge**: single extracted values broadcast onto table
//!   rows or kept aside for expressions to reference
//! - **Primary-key dedup**: last-write-within-file conflict resolution
//!   before the store is ever touched
//! - **Schema synthesis**: deterministic narrowest-type destination
//!   schemas with widen-only reconciliation against existing tables
//! - **Transactional upsert**: per-table all-or-nothing writes into an
//!   embedded DuckDB database
//!
//! The engine never opens spreadsheet files itself: worksheet grids are
//! supplied fully materialized by an external file-reading collaborator,
//! and each file's processing ends in a [`pipeline::FileReport`] for an
//! external status tracker.

pub mod assemble;
pub mod calculate;
pub mod database;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod record;
pub mod spec;
pub mod spreadsheet;

pub use crate::database::DuckDbStore;
pub use crate::database::RecordStore;
pub use crate::database::TableSchema;
pub use crate::database::UpdateMode;
pub use crate::error::SheetSinkError;
pub use crate::pipeline::Engine;
pub use crate::pipeline::FileReport;
pub use crate::pipeline::RunStatus;
pub use crate::record::Record;
pub use crate::record::Value;
pub use crate::spec::ExtractionSpec;
pub use crate::spreadsheet::CellValue;
pub use crate::spreadsheet::WorksheetGrid;
