use crate::record::Value;
use serde::Deserialize;
use serde::Deserializer;
use thiserror::Error;

/// Errors related to column type parsing.
#[derive(Error, Debug)]
pub enum ColumnError {
    #[error("Invalid column type '{0}'")]
    TypeError(String),
}

/// Supported destination column data types.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ColumnType {
    /// Boolean values (true/false)
    Boolean,
    /// 64-bit signed integers
    Integer,
    /// Double-precision floating point numbers
    Float,
    /// Variable-length strings
    Text,
    /// Date without time component
    Date,
    /// Date and time
    Timestamp,
}

/// Represents one destination column with name and data type.
#[derive(Clone, Debug, PartialEq)]
pub struct Column {
    /// Destination column name (sanitized)
    pub name: String,
    /// Column data type
    pub kind: ColumnType,
}

impl ColumnType {
    /// Returns the SQL type name used in destination DDL.
    pub const fn as_sql(&self) -> &'static str {
        match self {
            ColumnType::Boolean => "BOOLEAN",
            ColumnType::Integer => "BIGINT",
            ColumnType::Float => "DOUBLE",
            ColumnType::Text => "VARCHAR",
            ColumnType::Date => "DATE",
            ColumnType::Timestamp => "TIMESTAMP",
        }
    }

    /// Parses a column type from a string representation.
    /// Supports various aliases for each type.
    pub fn parse(name: &str) -> Result<Self, ColumnError> {
        match name.to_ascii_uppercase().as_str() {
            "BOOL" | "BOOLEAN" => Ok(Self::Boolean),
            "INT" | "BIGINT" | "INTEGER" => Ok(Self::Integer),
            "FLOAT" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Ok(Self::Float),
            "TEXT" | "STRING" | "VARCHAR" => Ok(Self::Text),
            "DATE" => Ok(Self::Date),
            "DATETIME" | "TIMESTAMP" => Ok(Self::Timestamp),
            _ => Err(ColumnError::TypeError(name.to_string())),
        }
    }

    /// Infers the column type a single record value would need.
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Null => None,
            Value::Bool(_) => Some(ColumnType::Boolean),
            Value::Integer(_) => Some(ColumnType::Integer),
            Value::Float(_) => Some(ColumnType::Float),
            Value::Text(_) => Some(ColumnType::Text),
            Value::Date(_) => Some(ColumnType::Date),
            Value::Timestamp(_) => Some(ColumnType::Timestamp),
        }
    }

    /// Detects the most specific common type from candidate types.
    /// Falls back to VARCHAR for mixed or all-null columns.
    pub fn detect(types: Vec<Option<ColumnType>>) -> ColumnType {
        let types: Vec<ColumnType> = types.into_iter().flatten().collect();
        if types.is_empty() {
            ColumnType::Text
        } else if types.iter().all(|kind| kind.is_boolean()) {
            ColumnType::Boolean
        } else if types.iter().all(|kind| kind.is_int()) {
            ColumnType::Integer
        } else if types.iter().all(|kind| kind.is_float()) {
            ColumnType::Float
        } else if types.iter().all(|kind| kind.is_date()) {
            ColumnType::Date
        } else if types.iter().all(|kind| kind.is_datetime()) {
            ColumnType::Timestamp
        } else {
            ColumnType::Text
        }
    }

    /// Returns true if this column type represents boolean values.
    #[inline]
    pub fn is_boolean(&self) -> bool {
        matches!(self, ColumnType::Boolean)
    }

    /// Returns true if this column type represents integer values.
    #[inline]
    pub fn is_int(&self) -> bool {
        matches!(self, ColumnType::Integer)
    }

    /// Returns true if this column type represents numeric values.
    #[inline]
    pub fn is_float(&self) -> bool {
        matches!(self, ColumnType::Integer | ColumnType::Float)
    }

    /// Returns true if this column type represents date values.
    #[inline]
    pub fn is_date(&self) -> bool {
        matches!(self, ColumnType::Date)
    }

    /// Returns true if this column type represents date/time values.
    #[inline]
    pub fn is_datetime(&self) -> bool {
        matches!(self, ColumnType::Date | ColumnType::Timestamp)
    }

    /// Checks whether a stored column of this type may be altered to
    /// `target` without data loss. Widening only, never narrowing.
    pub fn widens_to(&self, target: ColumnType) -> bool {
        if *self == target {
            return false;
        }
        match (self, target) {
            (_, ColumnType::Text) => true,
            (ColumnType::Integer, ColumnType::Float) => true,
            (ColumnType::Date, ColumnType::Timestamp) => true,
            _ => false,
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_sql())
    }
}

impl<'de> Deserialize<'de> for ColumnType {
    /// Accepts the same aliases as [`ColumnType::parse`] in configuration.
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let name = String::deserialize(deserializer)?;
        ColumnType::parse(&name).map_err(serde::de::Error::custom)
    }
}
