//! End-to-end pipeline tests: spec in, grids in, rows in DuckDB out.

use pretty_assertions::assert_eq;
use sheetsink::database::StorageError;
use sheetsink::pipeline::RunStatus;
use sheetsink::record::Record;
use sheetsink::spreadsheet::CellValue;
use sheetsink::DuckDbStore;
use sheetsink::Engine;
use sheetsink::ExtractionSpec;
use sheetsink::RecordStore;
use sheetsink::SheetSinkError;
use sheetsink::TableSchema;
use sheetsink::UpdateMode;
use sheetsink::WorksheetGrid;

fn text(value: &str) -> CellValue {
    CellValue::Text(value.to_owned())
}

fn number(value: f64) -> CellValue {
    CellValue::Number(value)
}

/// The worksheet from the end-to-end contract: a header row at index 2
/// and two data rows sharing one primary-key tuple.
fn summary_grid() -> WorksheetGrid {
    WorksheetGrid::from_rows(
        "Monthly Report.xlsx",
        "Summary",
        vec![
            vec![],
            vec![],
            vec![text("date"), text("category"), text("value")],
            vec![text("2024-01-01"), text("A"), number(100.0)],
            vec![text("2024-01-01"), text("A"), number(150.0)],
        ],
    )
}

const SUMMARY_SPEC: &str = r#"
    [files."Monthly Report.xlsx".sheets."Summary"]

    [[files."Monthly Report.xlsx".sheets."Summary".tables]]
    header_row = 2
    table_name = "monthly_summary"
    primary_keys = ["date", "category"]

    [[files."Monthly Report.xlsx".sheets."Summary".tables.calculated_columns]]
    kind = "current_date"
    name = "loaded_at"
"#;

#[test]
fn duplicate_keys_collapse_to_the_last_row() {
    let engine = Engine::new(ExtractionSpec::from_toml(SUMMARY_SPEC).unwrap());
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine
        .process_file("Monthly Report.xlsx", &[summary_grid()], &mut store)
        .unwrap();

    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.tables.len(), 1);
    assert_eq!(report.tables[0].rows_written, 1);

    let count: i64 = store
        .connection()
        .query_row("SELECT count(*) FROM monthly_summary", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
    let (value, loaded_at): (i64, Option<String>) = store
        .connection()
        .query_row(
            "SELECT value, loaded_at FROM monthly_summary",
            [],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .unwrap();
    assert_eq!(value, 150);
    assert!(loaded_at.is_some());
}

#[test]
fn reprocessing_the_same_file_is_idempotent() {
    let engine = Engine::new(ExtractionSpec::from_toml(SUMMARY_SPEC).unwrap());
    let mut store = DuckDbStore::open_in_memory().unwrap();
    engine
        .process_file("Monthly Report.xlsx", &[summary_grid()], &mut store)
        .unwrap();
    engine
        .process_file("Monthly Report.xlsx", &[summary_grid()], &mut store)
        .unwrap();

    let count: i64 = store
        .connection()
        .query_row("SELECT count(*) FROM monthly_summary", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn unconfigured_file_is_a_fatal_configuration_error() {
    let engine = Engine::new(ExtractionSpec::from_toml(SUMMARY_SPEC).unwrap());
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let result = engine.process_file("Unknown.xlsx", &[summary_grid()], &mut store);
    assert!(matches!(result, Err(SheetSinkError::SpecError(_))));
}

#[test]
fn primary_key_missing_from_final_columns_is_fatal() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."Monthly Report.xlsx".sheets."Summary"]
        [[files."Monthly Report.xlsx".sheets."Summary".tables]]
        header_row = 2
        table_name = "monthly_summary"
        primary_keys = ["ghost"]
        "#,
    )
    .unwrap();
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let result = engine.process_file("Monthly Report.xlsx", &[summary_grid()], &mut store);
    assert!(matches!(result, Err(SheetSinkError::SpecError(_))));
}

#[test]
fn one_failed_table_is_a_partial_failure() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."S"]

        [[files."f.xlsx".sheets."S".tables]]
        header_row = 2
        table_name = "good"
        primary_keys = ["date"]

        [[files."f.xlsx".sheets."S".tables]]
        title = "No Such Title"
        table_name = "bad"
        primary_keys = ["date"]
        "#,
    )
    .unwrap();
    let grid = WorksheetGrid::from_rows(
        "f.xlsx",
        "S",
        vec![
            vec![],
            vec![],
            vec![text("date"), text("value")],
            vec![text("2024-01-01"), number(1.0)],
        ],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine.process_file("f.xlsx", &[grid], &mut store).unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    let good = report.tables.iter().find(|t| t.table_name == "good").unwrap();
    let bad = report.tables.iter().find(|t| t.table_name == "bad").unwrap();
    assert!(good.succeeded());
    assert!(!bad.succeeded());

    // The successful table stays committed
    let count: i64 = store
        .connection()
        .query_row("SELECT count(*) FROM good", [], |row| row.get(0))
        .unwrap();
    assert_eq!(count, 1);
}

#[test]
fn key_values_broadcast_onto_table_rows() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."S"]

        [[files."f.xlsx".sheets."S".key_values]]
        name = "report_date"
        target = { row = 0, col = 1 }
        placement = "all_rows"

        [[files."f.xlsx".sheets."S".tables]]
        title = "Rides"
        table_name = "rides"
        primary_keys = ["report_date", "region"]
        merge_key_values = true
        "#,
    )
    .unwrap();
    let grid = WorksheetGrid::from_rows(
        "f.xlsx",
        "S",
        vec![
            vec![text("date:"), text("2024-05-01")],
            vec![text("Rides")],
            vec![text("region"), text("count")],
            vec![text("north"), number(3.0)],
            vec![text("south"), number(5.0)],
        ],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine.process_file("f.xlsx", &[grid], &mut store).unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.tables[0].rows_written, 2);

    let dates: Vec<String> = {
        let mut statement = store
            .connection()
            .prepare("SELECT DISTINCT report_date FROM rides")
            .unwrap();
        let rows = statement
            .query_map([], |row| row.get::<_, String>(0))
            .unwrap();
        rows.collect::<Result<Vec<_>, _>>().unwrap()
    };
    assert_eq!(dates, vec!["2024-05-01".to_owned()]);
}

#[test]
fn tables_depending_on_a_failed_key_value_fail_with_it() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."S"]

        [[files."f.xlsx".sheets."S".key_values]]
        name = "report_date"
        target = { row = 40, col = 40 }
        placement = "all_rows"

        [[files."f.xlsx".sheets."S".tables]]
        header_row = 0
        table_name = "dependent"
        primary_keys = ["region"]
        merge_key_values = true

        [[files."f.xlsx".sheets."S".tables]]
        header_row = 0
        table_name = "independent"
        primary_keys = ["region"]
        "#,
    )
    .unwrap();
    let grid = WorksheetGrid::from_rows(
        "f.xlsx",
        "S",
        vec![
            vec![text("region"), text("count")],
            vec![text("north"), number(3.0)],
        ],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine.process_file("f.xlsx", &[grid], &mut store).unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    assert_eq!(report.key_value_errors.len(), 1);
    let dependent = report
        .tables
        .iter()
        .find(|t| t.table_name == "dependent")
        .unwrap();
    assert!(!dependent.succeeded());
    let independent = report
        .tables
        .iter()
        .find(|t| t.table_name == "independent")
        .unwrap();
    assert!(independent.succeeded());
}

#[test]
fn expressions_see_key_values_from_earlier_sheets() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."First"]

        [[files."f.xlsx".sheets."First".key_values]]
        name = "factor"
        target = { row = 0, col = 0 }
        type = "int"

        [files."f.xlsx".sheets."Second"]

        [[files."f.xlsx".sheets."Second".no_title_tables]]
        table_name = "scaled"
        start_row = 0
        headers = ["region", "value"]
        primary_keys = ["region"]

        [[files."f.xlsx".sheets."Second".no_title_tables.calculated_columns]]
        kind = "custom"
        name = "scaled_value"
        expression = "value * factor"
        "#,
    )
    .unwrap();
    let first = WorksheetGrid::from_rows("f.xlsx", "First", vec![vec![number(4.0)]]);
    let second = WorksheetGrid::from_rows(
        "f.xlsx",
        "Second",
        vec![
            vec![text("north"), number(2.0)],
            vec![text("south"), number(3.0)],
        ],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine
        .process_file("f.xlsx", &[first, second], &mut store)
        .unwrap();
    assert_eq!(report.status, RunStatus::Success);

    let scaled: f64 = store
        .connection()
        .query_row(
            "SELECT scaled_value FROM scaled WHERE region = 'south'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(scaled, 12.0);
}

#[test]
fn configured_sheet_without_a_grid_fails_its_tables() {
    let engine = Engine::new(ExtractionSpec::from_toml(SUMMARY_SPEC).unwrap());
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine
        .process_file("Monthly Report.xlsx", &[], &mut store)
        .unwrap();
    assert_eq!(report.status, RunStatus::Failure);
    assert_eq!(report.tables.len(), 1);
    assert!(!report.tables[0].succeeded());
}

#[test]
fn unexported_tables_are_processed_but_not_written() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."S"]
        [[files."f.xlsx".sheets."S".tables]]
        header_row = 0
        table_name = "dry_run"
        primary_keys = ["region"]
        export = false
        "#,
    )
    .unwrap();
    let grid = WorksheetGrid::from_rows(
        "f.xlsx",
        "S",
        vec![
            vec![text("region"), text("count")],
            vec![text("north"), number(3.0)],
        ],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine.process_file("f.xlsx", &[grid], &mut store).unwrap();
    assert_eq!(report.status, RunStatus::Success);
    assert_eq!(report.tables[0].rows_written, 0);

    let tables: i64 = store
        .connection()
        .query_row(
            "SELECT count(*) FROM information_schema.tables WHERE table_name = 'dry_run'",
            [],
            |row| row.get(0),
        )
        .unwrap();
    assert_eq!(tables, 0);
}

#[test]
fn coercion_failure_fails_only_the_affected_table() {
    let spec = ExtractionSpec::from_toml(
        r#"
        [files."f.xlsx".sheets."S"]

        [[files."f.xlsx".sheets."S".no_title_tables]]
        table_name = "typed"
        start_row = 0
        headers = ["region", "rides"]
        column_types = { rides = "int" }
        primary_keys = ["region"]

        [[files."f.xlsx".sheets."S".no_title_tables]]
        table_name = "untyped"
        start_row = 0
        headers = ["region", "rides"]
        primary_keys = ["region"]
        "#,
    )
    .unwrap();
    let grid = WorksheetGrid::from_rows(
        "f.xlsx",
        "S",
        vec![vec![text("north"), text("a dozen")]],
    );
    let engine = Engine::new(spec);
    let mut store = DuckDbStore::open_in_memory().unwrap();
    let report = engine.process_file("f.xlsx", &[grid], &mut store).unwrap();

    assert_eq!(report.status, RunStatus::PartialFailure);
    let typed = report.tables.iter().find(|t| t.table_name == "typed").unwrap();
    assert!(typed.error.as_deref().unwrap().contains("BIGINT"));
    let untyped = report
        .tables
        .iter()
        .find(|t| t.table_name == "untyped")
        .unwrap();
    assert!(untyped.succeeded());
}

/// A store that refuses every write, for exercising storage-failure
/// scoping without a broken database.
struct RefusingStore;

impl RecordStore for RefusingStore {
    fn upsert(
        &mut self,
        _schema: &TableSchema,
        _records: &[Record],
        _mode: UpdateMode,
    ) -> Result<usize, StorageError> {
        Err(StorageError::DatabaseError(
            duckdb::Error::QueryReturnedNoRows,
        ))
    }
}

#[test]
fn storage_errors_are_table_scoped() {
    let engine = Engine::new(ExtractionSpec::from_toml(SUMMARY_SPEC).unwrap());
    let mut store = RefusingStore;
    let report = engine
        .process_file("Monthly Report.xlsx", &[summary_grid()], &mut store)
        .unwrap();
    assert_eq!(report.status, RunStatus::Failure);
    assert!(report.tables[0].error.is_some());
}
