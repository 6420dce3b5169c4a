//! Translation between native values and wire attribute values.

use dynopage_model::AttributeValue;

use crate::value::{Record, Value};

/// Sentinel stored in place of an empty string attribute.
///
/// Empty strings used to be rejected by the store, so writers substitute this
/// marker and readers map it back. The substitution applies to plain string
/// attributes at any nesting depth, but never inside string sets.
pub const EMPTY_STRING: &str = "__EMPTY_STRING__";

/// Encode a native value into its wire form.
#[must_use]
pub fn encode(value: &Value) -> AttributeValue {
    match value {
        Value::Bool(b) => AttributeValue::Bool(*b),
        Value::Num(n) => AttributeValue::N(format_number(*n)),
        Value::Str(s) if s.is_empty() => AttributeValue::S(EMPTY_STRING.to_owned()),
        Value::Str(s) => AttributeValue::S(s.clone()),
        Value::Null => AttributeValue::null(),
        Value::Bytes(b) => AttributeValue::B(b.clone()),
        Value::List(items) => AttributeValue::L(items.iter().map(encode).collect()),
        Value::Map(map) => AttributeValue::M(
            map.iter()
                .map(|(k, v)| (k.clone(), encode(v)))
                .collect(),
        ),
        Value::StrSet(items) => AttributeValue::SS(items.clone()),
        Value::NumSet(items) => {
            AttributeValue::NS(items.iter().map(|n| format_number(*n)).collect())
        }
    }
}

/// Decode a wire value into its native form.
///
/// Unparseable number strings decode as `0`. Number sets come back sorted
/// ascending regardless of wire order; string sets keep wire order. Binary
/// sets have no native set variant and decode as a list of buffers.
#[must_use]
pub fn decode(value: &AttributeValue) -> Value {
    match value {
        AttributeValue::Bool(b) => Value::Bool(*b),
        AttributeValue::N(n) => Value::Num(parse_number(n)),
        AttributeValue::S(s) if s == EMPTY_STRING => Value::Str(String::new()),
        AttributeValue::S(s) => Value::Str(s.clone()),
        AttributeValue::Null(_) => Value::Null,
        AttributeValue::B(b) => Value::Bytes(b.clone()),
        AttributeValue::L(items) => Value::List(items.iter().map(decode).collect()),
        AttributeValue::M(map) => Value::Map(
            map.iter()
                .map(|(k, v)| (k.clone(), decode(v)))
                .collect(),
        ),
        AttributeValue::SS(items) => Value::StrSet(items.clone()),
        AttributeValue::NS(items) => {
            let mut nums: Vec<f64> = items.iter().map(|n| parse_number(n)).collect();
            nums.sort_by(f64::total_cmp);
            Value::NumSet(nums)
        }
        AttributeValue::BS(items) => {
            Value::List(items.iter().map(|b| Value::Bytes(b.clone())).collect())
        }
    }
}

/// Encode a whole record into a wire item.
#[must_use]
pub fn encode_item(record: &Record) -> dynopage_model::Item {
    record
        .iter()
        .map(|(k, v)| (k.clone(), encode(v)))
        .collect()
}

/// Decode a wire item into a record.
#[must_use]
pub fn decode_item(item: &dynopage_model::Item) -> Record {
    item.iter().map(|(k, v)| (k.clone(), decode(v))).collect()
}

/// Decode a batch of wire items.
#[must_use]
pub fn decode_items(items: &[dynopage_model::Item]) -> Vec<Record> {
    items.iter().map(decode_item).collect()
}

/// Render a number the way the wire expects: integral values without a
/// fractional part (`3`, not `3.0`).
#[must_use]
pub fn format_number(n: f64) -> String {
    n.to_string()
}

fn parse_number(s: &str) -> f64 {
    s.parse().unwrap_or(0.0)
}

#[cfg(test)]
mod tests {
    use bytes::Bytes;

    use super::*;

    #[test]
    fn test_should_substitute_empty_strings() {
        let encoded = encode(&Value::Str(String::new()));
        assert_eq!(encoded, AttributeValue::S(EMPTY_STRING.to_owned()));
        assert_eq!(decode(&encoded), Value::Str(String::new()));
    }

    #[test]
    fn test_should_substitute_nested_empty_strings() {
        let value = Value::List(vec![Value::Map(Record::from([(
            "note".to_owned(),
            Value::Str(String::new()),
        )]))]);
        let encoded = encode(&value);
        let AttributeValue::L(items) = &encoded else {
            panic!("expected list, got {encoded:?}");
        };
        let AttributeValue::M(map) = &items[0] else {
            panic!("expected map");
        };
        assert_eq!(map["note"], AttributeValue::S(EMPTY_STRING.to_owned()));
        assert_eq!(decode(&encoded), value);
    }

    #[test]
    fn test_should_keep_empty_like_strings_inside_sets() {
        let value = Value::str_set([EMPTY_STRING, "a"]);
        let encoded = encode(&value);
        assert_eq!(
            encoded,
            AttributeValue::SS(vec![EMPTY_STRING.to_owned(), "a".to_owned()])
        );
        // Round-trips verbatim: set members are never remapped.
        assert_eq!(decode(&encoded), value);
    }

    #[test]
    fn test_should_format_integral_numbers_without_fraction() {
        assert_eq!(format_number(3.0), "3");
        assert_eq!(format_number(3.5), "3.5");
        assert_eq!(format_number(-2.0), "-2");
        assert_eq!(encode(&Value::Num(42.0)), AttributeValue::N("42".into()));
    }

    #[test]
    fn test_should_decode_unparseable_numbers_as_zero() {
        assert_eq!(decode(&AttributeValue::N("bogus".into())), Value::Num(0.0));
    }

    #[test]
    fn test_should_sort_number_sets_on_decode() {
        let wire = AttributeValue::NS(vec!["5".into(), "1".into(), "3".into()]);
        assert_eq!(decode(&wire), Value::NumSet(vec![1.0, 3.0, 5.0]));
    }

    #[test]
    fn test_should_keep_string_set_order() {
        let wire = AttributeValue::SS(vec!["b".into(), "a".into()]);
        assert_eq!(decode(&wire), Value::StrSet(vec!["b".into(), "a".into()]));
    }

    #[test]
    fn test_should_decode_binary_sets_as_lists() {
        let wire = AttributeValue::BS(vec![Bytes::from_static(b"x")]);
        assert_eq!(
            decode(&wire),
            Value::List(vec![Value::Bytes(Bytes::from_static(b"x"))])
        );
    }

    #[test]
    fn test_should_round_trip_items() {
        let record = Record::from([
            ("pk".to_owned(), Value::from("user#1")),
            ("count".to_owned(), Value::from(7_i64)),
            ("flag".to_owned(), Value::from(false)),
        ]);
        let item = encode_item(&record);
        assert_eq!(item["count"], AttributeValue::N("7".into()));
        assert_eq!(decode_item(&item), record);
    }
}
