//! Per-file orchestration: extract, assemble, calculate, synthesize,
//! upsert, one table at a time in configuration order.
//!
//! Failure policy: configuration errors abort the run immediately (the
//! run cannot possibly succeed); extraction and storage errors fail only
//! the affected table, and tables depending on a failed key-value fail
//! with it. One table's write is atomic; already-committed tables are
//! never rolled back by a later failure.

pub mod report;

use crate::assemble::deduplicate;
use crate::assemble::merge_key_values;
use crate::calculate::apply_calculated_columns;
use crate::calculate::expr::Expr;
use crate::calculate::CalcContext;
use crate::database::sanitize_identifier;
use crate::database::synthesize;
use crate::database::RecordStore;
use crate::database::UpdateMode;
use crate::error::SheetSinkError;
use crate::extract::extract_key_value;
use crate::extract::extract_no_title_table;
use crate::extract::extract_table;
use crate::extract::ExtractionError;
use crate::record::Record;
use crate::record::Value;
use crate::spec::CalculatedColumnSpec;
use crate::spec::ExtractionSpec;
use crate::spec::KeyValueSpec;
use crate::spec::Placement;
use crate::spec::SheetSpec;
use crate::spec::SpecError;
use crate::spreadsheet::WorksheetGrid;
use chrono::Local;
use chrono::NaiveDateTime;
use std::collections::HashMap;
use std::collections::HashSet;
use tracing::info;
use tracing::warn;

pub use report::FileReport;
pub use report::RunStatus;
pub use report::TableReport;

/// The extraction engine: a validated spec plus the orchestration that
/// runs it against supplied worksheet grids.
pub struct Engine {
    spec: ExtractionSpec,
}

/// Table-level fields shared by titled and no-title table specs.
struct TableJob<'a> {
    table_name: &'a str,
    primary_keys: &'a [String],
    merge_key_values: bool,
    headers: Option<&'a [String]>,
    calculated_columns: &'a [CalculatedColumnSpec],
    export: bool,
    merge_updates: bool,
}

impl Engine {
    pub fn new(spec: ExtractionSpec) -> Self {
        Engine { spec }
    }

    pub fn spec(&self) -> &ExtractionSpec {
        &self.spec
    }

    /// Processes every configured sheet of one file against the supplied
    /// grids and writes each logical table through the store.
    ///
    /// Grids are processed in the order supplied; key-values accumulate
    /// across sheets, so later sheets' expressions may reference values
    /// extracted earlier. Sheets named by the spec but missing from the
    /// grids fail their tables with partial-failure semantics.
    pub fn process_file(
        &self,
        file_name: &str,
        grids: &[WorksheetGrid],
        store: &mut dyn RecordStore,
    ) -> Result<FileReport, SheetSinkError> {
        let file_spec = self.spec.file(file_name).ok_or_else(|| SpecError::UnknownFile {
            file: file_name.to_owned(),
        })?;
        info!(file = file_name, "processing file");
        let now = Local::now().naive_local();

        // File-level key-value state, accumulated across sheets
        let mut scalars: HashMap<String, Value> = HashMap::new();
        let mut failed_names: HashSet<String> = HashSet::new();
        let mut key_value_errors: Vec<String> = Vec::new();
        let mut tables: Vec<TableReport> = Vec::new();
        let mut seen_sheets: HashSet<&str> = HashSet::new();

        for grid in grids {
            let Some(sheet) = file_spec.sheet(&grid.sheet_name) else {
                continue;
            };
            seen_sheets.insert(grid.sheet_name.as_str());
            info!(sheet = %grid.sheet_name, "processing sheet");

            let mut sheet_key_values: Vec<(&KeyValueSpec, Value)> = Vec::new();
            let mut sheet_failed: Vec<&KeyValueSpec> = Vec::new();
            for key_value in &sheet.key_values {
                match extract_key_value(grid, key_value) {
                    Ok(value) => {
                        scalars.insert(key_value.name.to_owned(), value.clone());
                        sheet_key_values.push((key_value, value));
                    }
                    Err(error) => {
                        warn!(key = %key_value.name, %error, "key-value extraction failed");
                        key_value_errors.push(format!("{}: {}", key_value.name, error));
                        failed_names.insert(key_value.name.to_owned());
                        sheet_failed.push(key_value);
                    }
                }
            }

            for spec in &sheet.tables {
                let job = TableJob {
                    table_name: &spec.table_name,
                    primary_keys: &spec.primary_keys,
                    merge_key_values: spec.merge_key_values,
                    headers: spec.headers.as_deref(),
                    calculated_columns: &spec.calculated_columns,
                    export: spec.export,
                    merge_updates: spec.merge_updates,
                };
                let extracted = extract_table(grid, spec);
                tables.push(self.run_table(
                    job,
                    extracted,
                    &sheet_key_values,
                    &sheet_failed,
                    &failed_names,
                    &scalars,
                    now,
                    store,
                )?);
            }
            for spec in &sheet.no_title_tables {
                let job = TableJob {
                    table_name: &spec.table_name,
                    primary_keys: &spec.primary_keys,
                    merge_key_values: spec.merge_key_values,
                    headers: None,
                    calculated_columns: &spec.calculated_columns,
                    export: spec.export,
                    merge_updates: spec.merge_updates,
                };
                let extracted = extract_no_title_table(grid, spec);
                tables.push(self.run_table(
                    job,
                    extracted,
                    &sheet_key_values,
                    &sheet_failed,
                    &failed_names,
                    &scalars,
                    now,
                    store,
                )?);
            }
        }

        // Configured sheets the caller never supplied fail their tables
        let mut missing: Vec<(&String, &SheetSpec)> = file_spec
            .sheets
            .iter()
            .filter(|(name, _)| !seen_sheets.contains(name.as_str()))
            .collect();
        missing.sort_by_key(|(name, _)| name.as_str());
        for (sheet_name, sheet) in missing {
            let error = ExtractionError::MissingSheet {
                file: file_name.to_owned(),
                sheet: sheet_name.to_owned(),
            };
            warn!(%error, "configured sheet not supplied");
            let names = sheet
                .tables
                .iter()
                .map(|spec| spec.table_name.as_str())
                .chain(sheet.no_title_tables.iter().map(|spec| spec.table_name.as_str()));
            for table_name in names {
                tables.push(TableReport {
                    table_name: table_name.to_owned(),
                    rows_written: 0,
                    error: Some(error.to_string()),
                });
            }
        }

        let report = FileReport::conclude(file_name.to_owned(), tables, key_value_errors);
        info!(file = file_name, status = ?report.status, "file processed");
        Ok(report)
    }

    /// Runs one logical table through assembly, calculation, schema
    /// synthesis, and the upsert. Extraction and storage failures become
    /// table reports; configuration errors propagate as fatal.
    #[allow(clippy::too_many_arguments)]
    fn run_table(
        &self,
        job: TableJob,
        extracted: Result<Vec<Record>, ExtractionError>,
        key_values: &[(&KeyValueSpec, Value)],
        sheet_failed: &[&KeyValueSpec],
        failed_names: &HashSet<String>,
        scalars: &HashMap<String, Value>,
        now: NaiveDateTime,
        store: &mut dyn RecordStore,
    ) -> Result<TableReport, SheetSinkError> {
        let failure = |message: String| TableReport {
            table_name: job.table_name.to_owned(),
            rows_written: 0,
            error: Some(message),
        };

        // A table merging a failed key-value fails with it
        if job.merge_key_values {
            let broken: Vec<&str> = sheet_failed
                .iter()
                .filter(|spec| spec.placement != Placement::None)
                .map(|spec| spec.name.as_str())
                .collect();
            if !broken.is_empty() {
                warn!(table = job.table_name, ?broken, "table depends on failed key-values");
                return Ok(failure(format!(
                    "dependent key-value extraction failed: {}",
                    broken.join(", ")
                )));
            }
        }

        let mut records = match extracted {
            Ok(records) => records,
            Err(error) => {
                warn!(table = job.table_name, %error, "table extraction failed");
                return Ok(failure(error.to_string()));
            }
        };

        // Expressions referencing a failed key-value make this table
        // dependent too, unless the reference is satisfied by a column
        if let Some(first) = records.first() {
            for spec in job.calculated_columns {
                if let CalculatedColumnSpec::Custom { expression, .. } = spec {
                    if let Ok(expr) = Expr::parse(expression) {
                        for reference in expr.references() {
                            if failed_names.contains(reference) && !first.contains(reference) {
                                warn!(
                                    table = job.table_name,
                                    reference, "expression depends on failed key-value"
                                );
                                return Ok(failure(format!(
                                    "dependent key-value extraction failed: {reference}"
                                )));
                            }
                        }
                    }
                }
            }
        }

        if records.is_empty() {
            info!(table = job.table_name, "no data rows extracted");
            return Ok(TableReport {
                table_name: job.table_name.to_owned(),
                rows_written: 0,
                error: None,
            });
        }

        if job.merge_key_values {
            merge_key_values(&mut records, key_values);
        }
        let dedup_keys = resolve_key_columns(&records[0], job.primary_keys);
        if !dedup_keys.is_empty() {
            records = deduplicate(records, &dedup_keys);
        }

        let context = CalcContext { now, scalars };
        let mut records =
            match apply_calculated_columns(&records, job.calculated_columns, &context, job.table_name)
            {
                Ok(records) => records,
                Err(SheetSinkError::ExtractionError(error)) => {
                    warn!(table = job.table_name, %error, "calculation failed");
                    return Ok(failure(error.to_string()));
                }
                // Configuration errors cannot be recovered per-table
                Err(error) => return Err(error),
            };

        if let Some(headers) = job.headers {
            for record in records.iter_mut() {
                record.rename_columns(headers);
            }
        }

        if !job.export {
            info!(table = job.table_name, rows = records.len(), "export disabled, skipping write");
            return Ok(TableReport {
                table_name: job.table_name.to_owned(),
                rows_written: 0,
                error: None,
            });
        }

        // Primary keys absent from the final column set surface here as
        // a fatal configuration error
        let schema = synthesize(job.table_name, &records, job.primary_keys)?;
        let mode = if job.merge_updates {
            UpdateMode::Coalesce
        } else {
            UpdateMode::Replace
        };
        match store.upsert(&schema, &records, mode) {
            Ok(rows_written) => Ok(TableReport {
                table_name: job.table_name.to_owned(),
                rows_written,
                error: None,
            }),
            Err(error) => {
                warn!(table = job.table_name, %error, "storage write failed, rolled back");
                Ok(failure(error.to_string()))
            }
        }
    }
}

/// Resolves declared primary-key names to the record columns they denote,
/// matching exactly first and by sanitized identifier second. Keys that
/// resolve to no column yet (e.g. produced later by a calculated column)
/// do not take part in deduplication.
fn resolve_key_columns(record: &Record, primary_keys: &[String]) -> Vec<String> {
    primary_keys
        .iter()
        .filter_map(|key| {
            if record.contains(key) {
                Some(key.to_owned())
            } else {
                let sanitized = sanitize_identifier(key);
                record
                    .columns()
                    .into_iter()
                    .find(|column| sanitize_identifier(column) == sanitized)
                    .map(str::to_owned)
            }
        })
        .collect()
}
