//! Record assembly: key-value merge and primary-key deduplication.
//!
//! Merging happens per placement policy before the calculated-column
//! pass; deduplication enforces the uniqueness invariant on the declared
//! primary-key tuple with last-write-within-file semantics.

use crate::record::Record;
use crate::record::Value;
use crate::spec::KeyValueSpec;
use crate::spec::Placement;
use std::collections::HashMap;
use tracing::debug;

/// Merges extracted key-values into a table's records.
///
/// `all_rows` copies the value into every record, `first_row` into the
/// first record with null elsewhere (the column still exists on every
/// row), and `none` leaves the records untouched; the value remains
/// visible to calculated-column expressions only.
pub fn merge_key_values(
    records: &mut [Record],
    key_values: &[(&KeyValueSpec, Value)],
) {
    for (spec, value) in key_values {
        match spec.placement {
            Placement::None => (),
            Placement::AllRows => {
                for record in records.iter_mut() {
                    record.set(&spec.name, value.clone());
                }
            }
            Placement::FirstRow => {
                for (index, record) in records.iter_mut().enumerate() {
                    let merged = if index == 0 { value.clone() } else { Value::Null };
                    record.set(&spec.name, merged);
                }
            }
        }
    }
}

/// Deduplicates records on the primary-key tuple.
///
/// When two records share a key tuple the later one wins entirely (all
/// columns, not just the keys), taking over the earlier record's
/// position so output order stays a subsequence of extraction order.
/// Key columns not yet present contribute null to the tuple.
pub fn deduplicate(records: Vec<Record>, primary_keys: &[String]) -> Vec<Record> {
    let mut seen: HashMap<Vec<Value>, usize> = HashMap::new();
    let mut output: Vec<Record> = Vec::with_capacity(records.len());
    let mut replaced = 0usize;
    for record in records {
        let key = record.key_tuple(primary_keys);
        match seen.get(&key) {
            Some(index) => {
                output[*index] = record;
                replaced += 1;
            }
            None => {
                seen.insert(key, output.len());
                output.push(record);
            }
        }
    }
    if replaced > 0 {
        debug!(replaced, "deduplicated records on primary key");
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::spec::CellTarget;

    fn record(pairs: &[(&str, Value)]) -> Record {
        pairs
            .iter()
            .map(|(name, value)| (name.to_string(), value.clone()))
            .collect()
    }

    fn key_value(name: &str, placement: Placement) -> KeyValueSpec {
        KeyValueSpec {
            name: name.to_owned(),
            target: CellTarget::Coordinates { row: 0, col: 0 },
            value_type: None,
            format: None,
            placement,
        }
    }

    fn keys(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn all_rows_placement_broadcasts() {
        let mut records = vec![
            record(&[("a", Value::Integer(1))]),
            record(&[("a", Value::Integer(2))]),
        ];
        let spec = key_value("report_date", Placement::AllRows);
        merge_key_values(
            &mut records,
            &[(&spec, Value::Text("2024-01-01".to_owned()))],
        );
        assert_eq!(
            records[0].get("report_date"),
            Some(&Value::Text("2024-01-01".to_owned()))
        );
        assert_eq!(
            records[1].get("report_date"),
            Some(&Value::Text("2024-01-01".to_owned()))
        );
    }

    #[test]
    fn first_row_placement_nulls_the_rest() {
        let mut records = vec![
            record(&[("a", Value::Integer(1))]),
            record(&[("a", Value::Integer(2))]),
        ];
        let spec = key_value("total", Placement::FirstRow);
        merge_key_values(&mut records, &[(&spec, Value::Integer(99))]);
        assert_eq!(records[0].get("total"), Some(&Value::Integer(99)));
        assert_eq!(records[1].get("total"), Some(&Value::Null));
    }

    #[test]
    fn none_placement_is_not_merged() {
        let mut records = vec![record(&[("a", Value::Integer(1))])];
        let spec = key_value("hidden", Placement::None);
        merge_key_values(&mut records, &[(&spec, Value::Integer(5))]);
        assert!(!records[0].contains("hidden"));
    }

    #[test]
    fn later_record_wins_entirely() {
        let records = vec![
            record(&[
                ("date", Value::Text("2024-01-01".to_owned())),
                ("category", Value::Text("A".to_owned())),
                ("value", Value::Integer(100)),
            ]),
            record(&[
                ("date", Value::Text("2024-01-01".to_owned())),
                ("category", Value::Text("A".to_owned())),
                ("value", Value::Integer(150)),
            ]),
        ];
        let output = deduplicate(records, &keys(&["date", "category"]));
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get("value"), Some(&Value::Integer(150)));
    }

    #[test]
    fn dedup_keeps_first_position() {
        let records = vec![
            record(&[("k", Value::Integer(1)), ("v", Value::Integer(10))]),
            record(&[("k", Value::Integer(2)), ("v", Value::Integer(20))]),
            record(&[("k", Value::Integer(1)), ("v", Value::Integer(30))]),
        ];
        let output = deduplicate(records, &keys(&["k"]));
        assert_eq!(output.len(), 2);
        assert_eq!(output[0].get("v"), Some(&Value::Integer(30)));
        assert_eq!(output[1].get("v"), Some(&Value::Integer(20)));
    }

    #[test]
    fn dedup_is_idempotent() {
        let records = vec![
            record(&[("k", Value::Integer(1)), ("v", Value::Integer(10))]),
            record(&[("k", Value::Integer(1)), ("v", Value::Integer(20))]),
            record(&[("k", Value::Integer(2)), ("v", Value::Integer(30))]),
        ];
        let once = deduplicate(records, &keys(&["k"]));
        let twice = deduplicate(once.clone(), &keys(&["k"]));
        assert_eq!(once, twice);
    }

    #[test]
    fn missing_key_columns_group_as_null() {
        let records = vec![
            record(&[("v", Value::Integer(1))]),
            record(&[("v", Value::Integer(2))]),
        ];
        let output = deduplicate(records, &keys(&["absent"]));
        assert_eq!(output.len(), 1);
        assert_eq!(output[0].get("v"), Some(&Value::Integer(2)));
    }
}
