/// Terminal result of processing one file.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RunStatus {
    /// Every configured table was processed
    Success,
    /// Some tables were written, at least one failed
    PartialFailure,
    /// No tables were written
    Failure,
}

/// Outcome of one logical table.
#[derive(Clone, Debug)]
pub struct TableReport {
    /// Destination table name as declared
    pub table_name: String,
    /// Rows affected by the upsert (zero for empty or unexported tables)
    pub rows_written: usize,
    /// Error detail when the table failed
    pub error: Option<String>,
}

impl TableReport {
    pub fn succeeded(&self) -> bool {
        self.error.is_none()
    }
}

/// Per-file processing report handed to the status-tracking collaborator.
/// The engine itself holds no persistent state.
#[derive(Clone, Debug)]
pub struct FileReport {
    pub file_name: String,
    pub status: RunStatus,
    pub tables: Vec<TableReport>,
    /// Failed key-value extractions, for diagnostics
    pub key_value_errors: Vec<String>,
}

impl FileReport {
    /// Derives the terminal status from the per-table outcomes.
    pub(crate) fn conclude(
        file_name: String,
        tables: Vec<TableReport>,
        key_value_errors: Vec<String>,
    ) -> Self {
        let failed = tables.iter().filter(|table| !table.succeeded()).count();
        let status = if failed == 0 {
            RunStatus::Success
        } else if failed == tables.len() {
            RunStatus::Failure
        } else {
            RunStatus::PartialFailure
        };
        FileReport {
            file_name,
            status,
            tables,
            key_value_errors,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(name: &str, error: Option<&str>) -> TableReport {
        TableReport {
            table_name: name.to_owned(),
            rows_written: 0,
            error: error.map(str::to_owned),
        }
    }

    #[test]
    fn all_tables_succeeding_is_success() {
        let report = FileReport::conclude(
            "f".to_owned(),
            vec![table("a", None), table("b", None)],
            Vec::new(),
        );
        assert_eq!(report.status, RunStatus::Success);
    }

    #[test]
    fn mixed_outcomes_are_partial_failure() {
        let report = FileReport::conclude(
            "f".to_owned(),
            vec![table("a", None), table("b", Some("boom"))],
            Vec::new(),
        );
        assert_eq!(report.status, RunStatus::PartialFailure);
    }

    #[test]
    fn all_tables_failing_is_failure() {
        let report = FileReport::conclude(
            "f".to_owned(),
            vec![table("a", Some("boom"))],
            Vec::new(),
        );
        assert_eq!(report.status, RunStatus::Failure);
    }

    #[test]
    fn no_tables_is_success() {
        let report = FileReport::conclude("f".to_owned(), Vec::new(), Vec::new());
        assert_eq!(report.status, RunStatus::Success);
    }
}
