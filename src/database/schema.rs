use crate::database::column::Column;
use crate::database::column::ColumnType;
use crate::record::Record;
use crate::spec::SpecError;
use regex::Regex;
use std::collections::HashSet;

/// Destination schema descriptor for one logical table.
#[derive(Clone, Debug, PartialEq)]
pub struct TableSchema {
    /// Sanitized destination table name
    pub table_name: String,
    /// Ordered column definitions, matching record column order
    pub columns: Vec<Column>,
    /// Sanitized primary-key column names
    pub primary_keys: Vec<String>,
}

impl TableSchema {
    /// Non-key columns, the ones an upsert conflict updates.
    pub fn update_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(|column| column.name.as_str())
            .filter(|name| !self.primary_keys.iter().any(|key| key == name))
            .collect()
    }
}

/// Converts a declared name into a valid destination identifier:
/// non-word runs collapse to underscores, case folds to lower, and a
/// leading digit gets prefixed.
pub fn sanitize_identifier(name: &str) -> String {
    let pattern = Regex::new(r"[^\w]+").expect("Hardcode regex pattern");
    let sanitized = pattern
        .replace_all(name.trim(), "_")
        .trim_matches('_')
        .to_lowercase();
    if sanitized.is_empty() {
        "unnamed".to_owned()
    } else if sanitized.chars().next().is_some_and(|first| first.is_ascii_digit()) {
        format!("_{sanitized}")
    } else {
        sanitized
    }
}

/// Synthesizes the destination schema from the final record set.
///
/// Column order follows the records; each column gets the narrowest type
/// that accommodates every non-null value, all-null columns default to
/// VARCHAR. Synthesis is deterministic: the same records always produce
/// the same descriptor. A primary key absent from the final column set,
/// or two columns collapsing to one identifier, is a configuration
/// error.
pub fn synthesize(
    table_name: &str,
    records: &[Record],
    primary_keys: &[String],
) -> Result<TableSchema, SpecError> {
    let table = sanitize_identifier(table_name);
    let mut columns = Vec::new();
    let mut seen = HashSet::new();
    if let Some(first) = records.first() {
        for name in first.columns() {
            let sanitized = sanitize_identifier(name);
            if !seen.insert(sanitized.clone()) {
                return Err(SpecError::DuplicateColumn {
                    table: table.clone(),
                    column: sanitized,
                });
            }
            let kind = ColumnType::detect(
                records
                    .iter()
                    .map(|record| {
                        record
                            .get(name)
                            .and_then(ColumnType::from_value)
                    })
                    .collect(),
            );
            columns.push(Column {
                name: sanitized,
                kind,
            });
        }
    }
    let mut keys = Vec::new();
    for key in primary_keys {
        let sanitized = sanitize_identifier(key);
        if !seen.contains(&sanitized) {
            return Err(SpecError::PrimaryKeyMissing {
                table: table.clone(),
                column: key.to_owned(),
            });
        }
        keys.push(sanitized);
    }
    Ok(TableSchema {
        table_name: table,
        columns,
        primary_keys: keys,
    })
}
