//! Destination schema synthesis and the transactional upsert writer.

pub mod column;
pub mod schema;
pub mod writer;

pub use column::Column;
pub use column::ColumnType;
pub use schema::sanitize_identifier;
pub use schema::synthesize;
pub use schema::TableSchema;
pub use writer::DuckDbStore;
pub use writer::RecordStore;
pub use writer::StorageError;
pub use writer::UpdateMode;
