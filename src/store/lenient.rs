//! Tolerant decoders for backend rows.
//!
//! PostgREST returns `numeric` columns as JSON numbers or strings depending on
//! the column definition, and joined rows may be null. Numbers, numeric
//! strings and null are accepted; anything else reads as 0 and is logged.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer};
use serde_json::Value;
use tracing::warn;

use crate::models::parse_timestamp;

pub(crate) fn value_to_f64(value: &Value) -> Option<f64> {
    match value {
        Value::Null => None,
        Value::Number(n) => Some(n.as_f64().unwrap_or(0.0)),
        Value::String(s) => match s.trim().parse::<f64>() {
            Ok(v) if v.is_finite() => Some(v),
            _ => {
                warn!(value = %s, "non-numeric amount coerced to 0");
                Some(0.0)
            }
        },
        other => {
            warn!(value = %other, "non-numeric amount coerced to 0");
            Some(0.0)
        }
    }
}

/// Numeric field; null and malformed values read as 0.
pub(crate) fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value).unwrap_or(0.0))
}

/// Numeric field where null stays `None`.
pub(crate) fn opt_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    Ok(value_to_f64(&value))
}

/// Integer field; fractional values are truncated.
pub(crate) fn integer<'de, D>(deserializer: D) -> Result<i64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    if let Some(i) = value.as_i64() {
        return Ok(i);
    }
    Ok(value_to_f64(&value).unwrap_or(0.0).trunc() as i64)
}

/// Timestamp field; unparseable text is logged and dropped.
pub(crate) fn opt_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.and_then(|s| {
        let parsed = parse_timestamp(&s);
        if parsed.is_none() {
            warn!(value = %s, "unparseable timestamp ignored");
        }
        parsed
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[derive(Deserialize)]
    struct Row {
        #[serde(deserialize_with = "number")]
        total: f64,
        #[serde(default, deserialize_with = "opt_number")]
        cost: Option<f64>,
        #[serde(deserialize_with = "integer")]
        qty: i64,
        #[serde(default, deserialize_with = "opt_timestamp")]
        at: Option<DateTime<Utc>>,
    }

    #[test]
    fn test_accepts_numbers_and_numeric_strings() {
        let row: Row =
            serde_json::from_value(json!({ "total": "116.00", "cost": 10, "qty": 2 })).unwrap();
        assert_eq!(row.total, 116.0);
        assert_eq!(row.cost, Some(10.0));
        assert_eq!(row.qty, 2);
        assert_eq!(row.at, None);
    }

    #[test]
    fn test_malformed_values_read_as_zero() {
        let row: Row = serde_json::from_value(json!({
            "total": "n/a",
            "cost": null,
            "qty": "3.7",
            "at": "yesterday"
        }))
        .unwrap();
        assert_eq!(row.total, 0.0);
        assert_eq!(row.cost, None);
        assert_eq!(row.qty, 3);
        assert_eq!(row.at, None);
    }

    #[test]
    fn test_null_total_reads_as_zero() {
        let row: Row = serde_json::from_value(json!({ "total": null, "qty": 1 })).unwrap();
        assert_eq!(row.total, 0.0);
    }
}
