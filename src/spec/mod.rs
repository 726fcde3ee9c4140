//! Declarative extraction configuration.
//!
//! An [`ExtractionSpec`] describes, per exact file name and exact sheet
//! name, which regions of a worksheet become key-values and tables and
//! how they are transformed on the way to the destination store. The
//! model is strongly typed: every variant kind is a tagged enum and
//! unknown kinds or fields fail the load instead of being ignored.
//! Validation runs once, eagerly, so a run either starts with a fully
//! coherent spec or not at all.

pub mod calculated;

use crate::calculate::expr::Expr;
use crate::database::column::ColumnType;
use crate::error::ResultMessage;
use crate::error::SheetSinkError;
use serde::Deserialize;
use std::collections::HashMap;
use std::collections::HashSet;
use std::path::Path;
use thiserror::Error;

pub use calculated::Aggregate;
pub use calculated::CalculatedColumnSpec;
pub use calculated::PartialWindow;
pub use calculated::PercentageMode;

/// Configuration errors: the spec is self-inconsistent or references
/// something that does not exist. Always fatal, never retried.
#[derive(Error, Debug)]
pub enum SpecError {
    #[error("No configuration for file '{file}'")]
    UnknownFile { file: String },

    #[error("Table '{table}' declares neither a title nor a header row")]
    MissingHeaderTarget { table: String },

    #[error("Table '{table}' declares both a title and a header row")]
    AmbiguousHeaderTarget { table: String },

    #[error("Table '{table}' declares no header columns")]
    EmptyHeaders { table: String },

    #[error("Table '{table}' declares no primary key columns")]
    EmptyPrimaryKey { table: String },

    #[error("Primary key column '{column}' is not part of table '{table}'")]
    PrimaryKeyMissing { table: String, column: String },

    #[error("Excluded column '{column}' is not declared in table '{table}'")]
    UnknownExcludedColumn { table: String, column: String },

    #[error("Duplicate column '{column}' in table '{table}'")]
    DuplicateColumn { table: String, column: String },

    #[error("Duplicate key-value '{name}' in sheet '{sheet}'")]
    DuplicateKeyValue { sheet: String, name: String },

    #[error("Rolling column '{column}' in table '{table}' has a zero-size window")]
    ZeroWindow { table: String, column: String },

    #[error("Table '{table}' declares a zero column count")]
    ZeroColumnCount { table: String },

    #[error("Invalid expression for column '{column}' in table '{table}': {message}")]
    BadExpression {
        table: String,
        column: String,
        message: String,
    },

    #[error("Expression column '{column}' in table '{table}' references unknown column '{reference}'")]
    UnknownColumn {
        table: String,
        column: String,
        reference: String,
    },
}

/// Placement policy for values merged or computed onto table rows.
#[derive(Copy, Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Placement {
    /// Same value copied into every row
    AllRows,
    /// First row only, null elsewhere
    FirstRow,
    /// Extracted but never merged; still visible to expressions
    #[default]
    None,
}

/// Where a key-value lives in the sheet: a fixed position, or the cell
/// at a declared offset from a matched title within a search window.
#[derive(Clone, Debug)]
pub enum CellTarget {
    Coordinates {
        row: usize,
        col: usize,
    },
    Title {
        title: String,
        /// Rows of the search window, scanned from the top of the sheet
        rows: usize,
        /// Columns of the search window
        cols: usize,
        /// Row offset from the matched title cell to the value cell
        row_offset: i64,
        /// Column offset from the matched title cell to the value cell
        col_offset: i64,
    },
}

/// Flat carrier enforcing that a target is either coordinates or a title
/// search, with no unknown or mixed fields.
#[derive(Deserialize)]
#[serde(deny_unknown_fields)]
struct RawTarget {
    #[serde(default)]
    row: Option<usize>,
    #[serde(default)]
    col: Option<usize>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    rows: Option<usize>,
    #[serde(default)]
    cols: Option<usize>,
    #[serde(default)]
    row_offset: Option<i64>,
    #[serde(default)]
    col_offset: Option<i64>,
}

impl<'de> Deserialize<'de> for CellTarget {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let raw = RawTarget::deserialize(deserializer)?;
        match (raw.title, raw.row, raw.col) {
            (Some(title), None, None) => Ok(CellTarget::Title {
                title,
                rows: raw.rows.unwrap_or(64),
                cols: raw.cols.unwrap_or(16),
                row_offset: raw.row_offset.unwrap_or(0),
                col_offset: raw.col_offset.unwrap_or(1),
            }),
            (None, Some(row), Some(col)) => {
                if raw.rows.is_some()
                    || raw.cols.is_some()
                    || raw.row_offset.is_some()
                    || raw.col_offset.is_some()
                {
                    Err(serde::de::Error::custom(
                        "search-window fields do not apply to a coordinate target",
                    ))
                } else {
                    Ok(CellTarget::Coordinates { row, col })
                }
            }
            _ => Err(serde::de::Error::custom(
                "target requires either 'row' and 'col' or a 'title'",
            )),
        }
    }
}

fn default_header_offset() -> usize {
    1
}

fn default_true() -> bool {
    true
}

/// Single named value extracted from one cell location.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeyValueSpec {
    /// Logical name, also the destination column name when merged
    pub name: String,
    /// Cell resolution rule
    pub target: CellTarget,
    /// Declared type the cell value must coerce to
    #[serde(rename = "type", default)]
    pub value_type: Option<ColumnType>,
    /// chrono format string for date re-emission
    #[serde(default)]
    pub format: Option<String>,
    #[serde(default)]
    pub placement: Placement,
}

/// Header-delimited table extraction rule.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    /// Title text that locates the header row
    #[serde(default)]
    pub title: Option<String>,
    /// Fixed header row index, alternative to the title scan
    #[serde(default)]
    pub header_row: Option<usize>,
    /// Rows between the title row and the header row
    #[serde(default = "default_header_offset")]
    pub header_offset: usize,
    /// Restrict the title scan to one column
    #[serde(default)]
    pub search_col: Option<usize>,
    /// Destination table name
    pub table_name: String,
    /// Conflict-resolution key for the upsert
    pub primary_keys: Vec<String>,
    /// Merge the sheet's key-values into this table's rows
    #[serde(default)]
    pub merge_key_values: bool,
    /// Fixed number of header columns starting at the title column
    #[serde(default)]
    pub col_count: Option<usize>,
    /// Positional rename applied after the calculated-column pass
    #[serde(default)]
    pub headers: Option<Vec<String>>,
    /// Stop reading after this many data rows
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub calculated_columns: Vec<CalculatedColumnSpec>,
    /// Write the assembled records to the destination store
    #[serde(default = "default_true")]
    pub export: bool,
    /// Keep existing non-null destination values on conflict
    #[serde(default)]
    pub merge_updates: bool,
}

/// Headerless table extraction rule: column semantics are declared here
/// because no header row exists in the source.
#[derive(Clone, Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NoTitleTableSpec {
    /// Destination table name
    pub table_name: String,
    /// First data row (0-based)
    pub start_row: usize,
    /// First data column (0-based)
    #[serde(default)]
    pub start_col: usize,
    /// Declared column names, in sheet order
    pub headers: Vec<String>,
    /// Declared per-column coercion types, keyed by header name
    #[serde(default)]
    pub column_types: HashMap<String, ColumnType>,
    /// Declared columns to drop after coercion
    #[serde(default)]
    pub exclude_columns: Vec<String>,
    pub primary_keys: Vec<String>,
    #[serde(default)]
    pub merge_key_values: bool,
    #[serde(default)]
    pub row_limit: Option<usize>,
    #[serde(default)]
    pub calculated_columns: Vec<CalculatedColumnSpec>,
    #[serde(default = "default_true")]
    pub export: bool,
    #[serde(default)]
    pub merge_updates: bool,
}

/// Extraction rules for one worksheet.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SheetSpec {
    #[serde(default)]
    pub key_values: Vec<KeyValueSpec>,
    #[serde(default)]
    pub tables: Vec<TableSpec>,
    #[serde(default)]
    pub no_title_tables: Vec<NoTitleTableSpec>,
}

/// Extraction rules for one file, keyed by exact sheet name.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FileSpec {
    pub sheets: HashMap<String, SheetSpec>,
}

impl FileSpec {
    /// Looks up the rules for a sheet by exact name.
    pub fn sheet(&self, sheet_name: &str) -> Option<&SheetSpec> {
        self.sheets.get(sheet_name)
    }
}

/// The full declarative configuration, keyed by exact file name.
/// Loaded once per run and shared read-only by all extractors.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ExtractionSpec {
    pub files: HashMap<String, FileSpec>,
}

impl ExtractionSpec {
    /// Parses and validates a spec from TOML text.
    pub fn from_toml(text: &str) -> Result<Self, SheetSinkError> {
        let spec: ExtractionSpec = toml::from_str(text)?;
        spec.validate()?;
        Ok(spec)
    }

    /// Parses and validates a spec from a TOML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SheetSinkError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(SheetSinkError::from);
        text.and_then(|text| Self::from_toml(&text))
            .with_prefix(&path.to_string_lossy())
    }

    /// Looks up the rules for a file by exact name.
    pub fn file(&self, file_name: &str) -> Option<&FileSpec> {
        self.files.get(file_name)
    }

    /// Validates the whole spec eagerly.
    /// A spec that passes cannot fail later for structural reasons the
    /// configuration alone could have revealed.
    pub fn validate(&self) -> Result<(), SpecError> {
        for file in self.files.values() {
            for (sheet_name, sheet) in &file.sheets {
                let mut key_value_names = HashSet::new();
                for key_value in &sheet.key_values {
                    if !key_value_names.insert(key_value.name.as_str()) {
                        return Err(SpecError::DuplicateKeyValue {
                            sheet: sheet_name.to_owned(),
                            name: key_value.name.to_owned(),
                        });
                    }
                }
                let merged: Vec<&str> = sheet
                    .key_values
                    .iter()
                    .filter(|key_value| key_value.placement != Placement::None)
                    .map(|key_value| key_value.name.as_str())
                    .collect();
                for table in &sheet.tables {
                    validate_table(table, &merged)?;
                }
                for table in &sheet.no_title_tables {
                    validate_no_title_table(table, &merged)?;
                }
            }
        }
        Ok(())
    }
}

fn validate_table(table: &TableSpec, merged_key_values: &[&str]) -> Result<(), SpecError> {
    let name = table.table_name.as_str();
    match (&table.title, table.header_row) {
        (None, None) => {
            return Err(SpecError::MissingHeaderTarget {
                table: name.to_owned(),
            })
        }
        (Some(_), Some(_)) => {
            return Err(SpecError::AmbiguousHeaderTarget {
                table: name.to_owned(),
            })
        }
        _ => (),
    }
    if table.col_count == Some(0) {
        return Err(SpecError::ZeroColumnCount {
            table: name.to_owned(),
        });
    }
    if table.primary_keys.is_empty() {
        return Err(SpecError::EmptyPrimaryKey {
            table: name.to_owned(),
        });
    }
    let declared = table.headers.as_deref().unwrap_or_default();
    validate_calculated_columns(
        name,
        &table.calculated_columns,
        declared,
        table.merge_key_values,
        merged_key_values,
    )
}

fn validate_no_title_table(
    table: &NoTitleTableSpec,
    merged_key_values: &[&str],
) -> Result<(), SpecError> {
    let name = table.table_name.as_str();
    if table.headers.is_empty() {
        return Err(SpecError::EmptyHeaders {
            table: name.to_owned(),
        });
    }
    let mut seen = HashSet::new();
    for header in &table.headers {
        if !seen.insert(header.as_str()) {
            return Err(SpecError::DuplicateColumn {
                table: name.to_owned(),
                column: header.to_owned(),
            });
        }
    }
    for excluded in &table.exclude_columns {
        if !table.headers.contains(excluded) {
            return Err(SpecError::UnknownExcludedColumn {
                table: name.to_owned(),
                column: excluded.to_owned(),
            });
        }
    }
    if table.primary_keys.is_empty() {
        return Err(SpecError::EmptyPrimaryKey {
            table: name.to_owned(),
        });
    }
    validate_calculated_columns(
        name,
        &table.calculated_columns,
        &table.headers,
        table.merge_key_values,
        merged_key_values,
    )?;
    // The headerless column set is fully declared, so the primary-key
    // invariant is decidable at load time.
    let mut columns: HashSet<&str> = table
        .headers
        .iter()
        .map(String::as_str)
        .filter(|header| !table.exclude_columns.iter().any(|excluded| excluded == header))
        .collect();
    columns.extend(table.calculated_columns.iter().map(|calc| calc.name()));
    if table.merge_key_values {
        columns.extend(merged_key_values);
    }
    for key in &table.primary_keys {
        if !columns.contains(key.as_str()) {
            return Err(SpecError::PrimaryKeyMissing {
                table: name.to_owned(),
                column: key.to_owned(),
            });
        }
    }
    Ok(())
}

fn validate_calculated_columns(
    table: &str,
    columns: &[CalculatedColumnSpec],
    declared_headers: &[String],
    merge_key_values: bool,
    merged_key_values: &[&str],
) -> Result<(), SpecError> {
    let mut names: HashSet<&str> = declared_headers.iter().map(String::as_str).collect();
    if merge_key_values {
        names.extend(merged_key_values);
    }
    for column in columns {
        if !names.insert(column.name()) {
            return Err(SpecError::DuplicateColumn {
                table: table.to_owned(),
                column: column.name().to_owned(),
            });
        }
        match column {
            CalculatedColumnSpec::Rolling { name, window, .. } if *window == 0 => {
                return Err(SpecError::ZeroWindow {
                    table: table.to_owned(),
                    column: name.to_owned(),
                });
            }
            CalculatedColumnSpec::Custom {
                name, expression, ..
            } => {
                Expr::parse(expression).map_err(|error| SpecError::BadExpression {
                    table: table.to_owned(),
                    column: name.to_owned(),
                    message: error.to_string(),
                })?;
            }
            _ => (),
        }
    }
    Ok(())
}
