use crate::database::column::ColumnType;
use crate::database::schema::TableSchema;
use crate::record::Record;
use crate::record::Value;
use duckdb::params;
use duckdb::params_from_iter;
use duckdb::types::Value as SqlValue;
use duckdb::Connection;
use duckdb::Transaction;
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;
use tracing::debug;
use tracing::info;

/// Errors raised by the destination store.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("{0}")]
    DatabaseError(#[from] duckdb::Error),
}

/// Conflict-update behavior of the upsert.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum UpdateMode {
    /// Incoming values replace every non-key column
    #[default]
    Replace,
    /// Incoming nulls keep the existing value
    Coalesce,
}

/// The single storage operation the engine depends on.
///
/// Writing one table's record set is atomic: either the whole set
/// commits or none of it does, on every exit path.
pub trait RecordStore {
    fn upsert(
        &mut self,
        schema: &TableSchema,
        records: &[Record],
        mode: UpdateMode,
    ) -> Result<usize, StorageError>;
}

/// Embedded DuckDB destination store.
pub struct DuckDbStore {
    connection: Connection,
}

impl DuckDbStore {
    /// Opens an in-memory destination database.
    pub fn open_in_memory() -> Result<Self, StorageError> {
        Ok(DuckDbStore {
            connection: Connection::open_in_memory()?,
        })
    }

    /// Opens (or creates) a destination database file.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StorageError> {
        Ok(DuckDbStore {
            connection: Connection::open(path)?,
        })
    }

    /// Direct access to the underlying connection.
    pub fn connection(&self) -> &Connection {
        &self.connection
    }
}

impl RecordStore for DuckDbStore {
    /// Inserts each record, replacing the non-key columns of an existing
    /// row on a primary-key collision. Runs inside one transaction per
    /// call; a failure rolls the whole table write back.
    fn upsert(
        &mut self,
        schema: &TableSchema,
        records: &[Record],
        mode: UpdateMode,
    ) -> Result<usize, StorageError> {
        if records.is_empty() {
            return Ok(0);
        }
        let tx = self.connection.transaction()?;
        reconcile_table(&tx, schema)?;
        let sql = upsert_statement(schema, mode);
        let mut written = 0usize;
        {
            let mut statement = tx.prepare(&sql)?;
            for record in records {
                // Record column order matches the synthesized schema
                let values = record.iter().map(|(_, value)| to_sql_value(value));
                written += statement.execute(params_from_iter(values))?;
            }
        }
        tx.commit()?;
        info!(table = %schema.table_name, rows = written, "upsert committed");
        Ok(written)
    }
}

/// Creates the destination table when absent, otherwise reconciles its
/// columns against the synthesized schema: missing columns are added and
/// narrower columns are widened. Never narrows, never drops.
fn reconcile_table(tx: &Transaction, schema: &TableSchema) -> Result<(), StorageError> {
    let existing = existing_columns(tx, &schema.table_name)?;
    if existing.is_empty() {
        let sql = create_statement(schema);
        debug!(table = %schema.table_name, "creating destination table");
        tx.execute_batch(&sql)?;
        return Ok(());
    }
    for column in &schema.columns {
        match existing.get(&column.name) {
            None => {
                tx.execute_batch(&format!(
                    "ALTER TABLE \"{}\" ADD COLUMN \"{}\" {}",
                    schema.table_name,
                    column.name,
                    column.kind.as_sql()
                ))?;
            }
            Some(stored) if stored.widens_to(column.kind) => {
                debug!(
                    table = %schema.table_name,
                    column = %column.name,
                    from = %stored,
                    to = %column.kind,
                    "widening destination column"
                );
                tx.execute_batch(&format!(
                    "ALTER TABLE \"{}\" ALTER COLUMN \"{}\" SET DATA TYPE {}",
                    schema.table_name,
                    column.name,
                    column.kind.as_sql()
                ))?;
            }
            _ => (),
        }
    }
    Ok(())
}

fn existing_columns(
    tx: &Transaction,
    table_name: &str,
) -> Result<HashMap<String, ColumnType>, StorageError> {
    let mut statement = tx.prepare(
        "SELECT column_name, data_type FROM information_schema.columns WHERE table_name = ?",
    )?;
    let rows = statement.query_map(params![table_name], |row| {
        Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
    })?;
    let mut columns = HashMap::new();
    for row in rows {
        let (name, data_type) = row?;
        // Types outside the engine's vocabulary are left untouched
        if let Ok(kind) = ColumnType::parse(&data_type) {
            columns.insert(name, kind);
        }
    }
    Ok(columns)
}

fn create_statement(schema: &TableSchema) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| format!("\"{}\" {}", column.name, column.kind.as_sql()))
        .collect::<Vec<_>>()
        .join(", ");
    let keys = schema
        .primary_keys
        .iter()
        .map(|key| format!("\"{key}\""))
        .collect::<Vec<_>>()
        .join(", ");
    format!(
        "CREATE TABLE IF NOT EXISTS \"{}\" ({columns}, PRIMARY KEY ({keys}))",
        schema.table_name
    )
}

fn upsert_statement(schema: &TableSchema, mode: UpdateMode) -> String {
    let columns = schema
        .columns
        .iter()
        .map(|column| format!("\"{}\"", column.name))
        .collect::<Vec<_>>()
        .join(", ");
    let placeholders = vec!["?"; schema.columns.len()].join(", ");
    let conflict = schema
        .primary_keys
        .iter()
        .map(|key| format!("\"{key}\""))
        .collect::<Vec<_>>()
        .join(", ");
    let updates = schema
        .update_columns()
        .into_iter()
        .map(|name| match mode {
            UpdateMode::Replace => format!("\"{name}\" = excluded.\"{name}\""),
            UpdateMode::Coalesce => {
                format!("\"{name}\" = COALESCE(excluded.\"{name}\", \"{name}\")")
            }
        })
        .collect::<Vec<_>>()
        .join(", ");
    if updates.is_empty() {
        format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders}) \
             ON CONFLICT ({conflict}) DO NOTHING",
            schema.table_name
        )
    } else {
        format!(
            "INSERT INTO \"{}\" ({columns}) VALUES ({placeholders}) \
             ON CONFLICT ({conflict}) DO UPDATE SET {updates}",
            schema.table_name
        )
    }
}

/// Maps a record scalar onto a bindable SQL value. Dates and timestamps
/// bind as ISO text; DuckDB casts them to the declared column types.
fn to_sql_value(value: &Value) -> SqlValue {
    match value {
        Value::Null => SqlValue::Null,
        Value::Bool(flag) => SqlValue::Boolean(*flag),
        Value::Integer(number) => SqlValue::BigInt(*number),
        Value::Float(number) => SqlValue::Double(*number),
        Value::Text(text) => SqlValue::Text(text.to_owned()),
        Value::Date(date) => SqlValue::Text(date.format("%Y-%m-%d").to_string()),
        Value::Timestamp(datetime) => {
            SqlValue::Text(datetime.format("%Y-%m-%d %H:%M:%S").to_string())
        }
    }
}
