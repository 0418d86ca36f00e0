//! Reference-field normalization.
//!
//! Reference fields come back from the Table API as objects such as
//! `{"link": "https://...", "value": "abc123"}`, or
//! `{"display_value": "Jane", "link": "...", "value": "abc123"}` when
//! display values are requested. These helpers reshape every reference column
//! of a result set the same way, according to the requested [`DisplayValue`]
//! mode, so callers never see the `link` envelope.

use serde_json::{Map, Value};

use crate::models::{DisplayValue, Record};

const LINK: &str = "link";
const VALUE: &str = "value";
const DISPLAY_VALUE: &str = "display_value";

/// True when `value` looks like a reference envelope.
fn is_reference(value: &Value) -> bool {
    match value {
        Value::Object(map) => {
            !map.is_empty()
                && map.keys().all(|k| k == LINK || k == VALUE || k == DISPLAY_VALUE)
                && (map.contains_key(VALUE) || map.contains_key(DISPLAY_VALUE))
        }
        _ => false,
    }
}

fn reshape(value: Value, mode: DisplayValue) -> Value {
    let mut map = match (mode, value) {
        (_, Value::Object(map)) => map,
        (DisplayValue::All, Value::String(s)) => {
            return pair(Value::String(s.clone()), Value::String(s))
        }
        (_, other) => return other,
    };

    let raw = map.remove(VALUE);
    let display = map.remove(DISPLAY_VALUE);
    match mode {
        DisplayValue::False => raw.or(display).unwrap_or(Value::Null),
        DisplayValue::True => display.or(raw).unwrap_or(Value::Null),
        DisplayValue::All => {
            let raw = raw.unwrap_or_else(|| display.clone().unwrap_or(Value::Null));
            let display = display.unwrap_or_else(|| raw.clone());
            pair(raw, display)
        }
    }
}

fn pair(value: Value, display_value: Value) -> Value {
    let mut map = Map::new();
    map.insert(VALUE.to_string(), value);
    map.insert(DISPLAY_VALUE.to_string(), display_value);
    Value::Object(map)
}

/// Normalizes the reference columns of a single record.
pub fn normalize_record(record: Record, mode: DisplayValue) -> Record {
    record
        .into_iter()
        .map(|(key, value)| {
            if is_reference(&value) {
                (key, reshape(value, mode))
            } else {
                (key, value)
            }
        })
        .collect()
}

/// Normalizes every record in a result set.
///
/// A column counts as a reference column when any record holds a reference
/// envelope in it. In `all` mode, plain strings in such a column are also
/// lifted into `{"value", "display_value"}` pairs so the column has one shape.
pub fn normalize_records(records: Vec<Record>, mode: DisplayValue) -> Vec<Record> {
    let reference_columns: Vec<String> = {
        let mut columns: Vec<String> = Vec::new();
        for record in &records {
            for (key, value) in record {
                if is_reference(value) && !columns.contains(key) {
                    columns.push(key.clone());
                }
            }
        }
        columns
    };

    if reference_columns.is_empty() {
        return records;
    }

    records
        .into_iter()
        .map(|record| {
            record
                .into_iter()
                .map(|(key, value)| {
                    let reshape_it = reference_columns.contains(&key)
                        && (is_reference(&value) || value.is_string());
                    if reshape_it {
                        let shaped = reshape(value, mode);
                        (key, shaped)
                    } else {
                        (key, value)
                    }
                })
                .collect()
        })
        .collect()
}
