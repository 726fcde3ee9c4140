use crate::spreadsheet::CellValue;
use chrono::NaiveDate;
use chrono::NaiveDateTime;
use std::fmt::Display;
use std::hash::Hash;
use std::hash::Hasher;

/// Typed scalar carried by one column of one record.
#[derive(Clone, Debug)]
pub enum Value {
    Null,
    Bool(bool),
    Integer(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// Returns true if the value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view of the value, if it has one.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Integer(value) => Some(*value as f64),
            Value::Float(value) => Some(*value),
            _ => None,
        }
    }
}

impl From<&CellValue> for Value {
    /// Converts a cell into a record scalar.
    /// Numbers with no fractional part become integers.
    fn from(cell: &CellValue) -> Self {
        match cell {
            CellValue::Empty => Value::Null,
            CellValue::Bool(value) => Value::Bool(*value),
            CellValue::Number(value) => {
                if value.fract() == 0.0 && value.abs() < 9e18 {
                    Value::Integer(*value as i64)
                } else {
                    Value::Float(*value)
                }
            }
            CellValue::Text(value) => Value::Text(value.trim().to_owned()),
            CellValue::Date(value) => Value::Date(*value),
            CellValue::DateTime(value) => Value::Timestamp(*value),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Integer(a), Value::Integer(b)) => a == b,
            // Bit-pattern comparison keeps Eq and Hash consistent
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Text(a), Value::Text(b)) => a == b,
            (Value::Date(a), Value::Date(b)) => a == b,
            (Value::Timestamp(a), Value::Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        std::mem::discriminant(self).hash(state);
        match self {
            Value::Null => (),
            Value::Bool(value) => value.hash(state),
            Value::Integer(value) => value.hash(state),
            Value::Float(value) => value.to_bits().hash(state),
            Value::Text(value) => value.hash(state),
            Value::Date(value) => value.hash(state),
            Value::Timestamp(value) => value.hash(state),
        }
    }
}

impl Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Value::Null => write!(f, ""),
            Value::Bool(value) => write!(f, "{value}"),
            Value::Integer(value) => write!(f, "{value}"),
            Value::Float(value) => write!(f, "{value}"),
            Value::Text(value) => write!(f, "{value}"),
            Value::Date(value) => write!(f, "{}", value.format("%Y-%m-%d")),
            Value::Timestamp(value) => write!(f, "{}", value.format("%Y-%m-%d %H:%M:%S")),
        }
    }
}

/// One logical output row: an ordered mapping from column name to value.
///
/// Column order is the order of first insertion, which downstream becomes
/// the destination column order.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    fields: Vec<(String, Value)>,
}

impl Record {
    /// Creates an empty record.
    pub fn new() -> Self {
        Record { fields: Vec::new() }
    }

    /// Number of columns in the record.
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Returns true if the record has no columns.
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Looks up a column value by name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(column, _)| column == name)
            .map(|(_, value)| value)
    }

    /// Returns true if the record has a column with the given name.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    /// Sets a column value, replacing in place when the column exists and
    /// appending at the end when it does not.
    pub fn set(&mut self, name: &str, value: Value) {
        if let Some(field) = self.fields.iter_mut().find(|(column, _)| column == name) {
            field.1 = value;
        } else {
            self.fields.push((name.to_owned(), value));
        }
    }

    /// Renames columns positionally: the first `names.len()` columns take
    /// the new names, any remaining columns keep theirs.
    pub fn rename_columns(&mut self, names: &[String]) {
        for (field, name) in self.fields.iter_mut().zip(names.iter()) {
            field.0 = name.to_owned();
        }
    }

    /// Iterates over (column, value) pairs in order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields
            .iter()
            .map(|(column, value)| (column.as_str(), value))
    }

    /// Column names in order.
    pub fn columns(&self) -> Vec<&str> {
        self.fields.iter().map(|(column, _)| column.as_str()).collect()
    }

    /// Builds the key tuple for the given columns.
    /// Columns absent from the record contribute null.
    pub fn key_tuple(&self, columns: &[String]) -> Vec<Value> {
        columns
            .iter()
            .map(|column| self.get(column).cloned().unwrap_or(Value::Null))
            .collect()
    }
}

impl FromIterator<(String, Value)> for Record {
    fn from_iter<T: IntoIterator<Item = (String, Value)>>(iter: T) -> Self {
        Record {
            fields: iter.into_iter().collect(),
        }
    }
}
