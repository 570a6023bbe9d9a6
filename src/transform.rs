//! Record transformation: nested date-part arrays to ISO dates.
//!
//! Source records encode partial dates as `{"date-parts": [[year, month?, day?]]}`.
//! The warehouse schema expects a single `DATE` column, so every object that
//! carries a `date-parts` key gets it replaced by a `date` key holding either an
//! ISO-8601 string (`"2024-03-15"`) or `null` when the parts cannot form a
//! calendar date.
//!
//! The rewrite is total: nothing in here returns an error. Malformed parts are
//! reported at debug level and mapped to `null`.
//!
//! ```
//! use ironload::transform::transform;
//! use serde_json::json;
//!
//! let doc = json!({"issued": {"date-parts": [[2024, 3, 15]]}});
//! assert_eq!(transform(&doc), json!({"issued": {"date": "2024-03-15"}}));
//! ```

use chrono::{Datelike, NaiveDate};
use serde_json::{Map, Value};
use tracing::debug;

/// Key holding the nested date-part array in source records.
pub const DATE_PARTS_KEY: &str = "date-parts";

/// Key that replaces [`DATE_PARTS_KEY`] in transformed records.
pub const DATE_KEY: &str = "date";

/// Rewrite a decoded JSON document, replacing every `date-parts` entry.
///
/// Recurses into every nested object and every array element. Values other
/// than objects and arrays are returned unchanged.
#[must_use]
pub fn transform(doc: &Value) -> Value {
    match doc {
        Value::Object(map) => Value::Object(transform_object(map)),
        Value::Array(items) => Value::Array(items.iter().map(transform).collect()),
        other => other.clone(),
    }
}

fn transform_object(map: &Map<String, Value>) -> Map<String, Value> {
    let mut out = Map::with_capacity(map.len());
    for (key, value) in map {
        if key == DATE_PARTS_KEY {
            let date = date_parts_to_date(value).map_or(Value::Null, Value::String);
            out.insert(DATE_KEY.to_string(), date);
        } else {
            out.insert(key.clone(), transform(value));
        }
    }
    out
}

/// Convert a `[[year, month?, day?]]` value into a `YYYY-MM-DD` string.
///
/// Missing month and day default to 1 when a year is present. The month is
/// clamped to `1..=12` and the day to `1..=31` before the date is built, so
/// `[[2024, 13, 1]]` becomes `2024-12-01` while `[[2024, 2, 30]]` has no
/// calendar date and yields `None`.
#[must_use]
pub fn date_parts_to_date(parts: &Value) -> Option<String> {
    let inner = match parts.as_array().and_then(|outer| outer.first()) {
        Some(Value::Array(inner)) if !inner.is_empty() => inner,
        _ => return None,
    };

    let year = match part_as_i64(&inner[0]) {
        Ok(Some(year)) => year,
        Ok(None) => return None,
        Err(()) => {
            debug!(parts = %parts, "invalid date parts format");
            return None;
        }
    };
    let month = optional_part(inner.get(1), parts)?;
    let day = optional_part(inner.get(2), parts)?;

    let month = month.unwrap_or(1).clamp(1, 12);
    let day = day.unwrap_or(1).clamp(1, 31);

    // ISO-8601 calendar dates are four-digit years.
    if !(1..=9999).contains(&year) {
        debug!(year, month, day, parts = %parts, "date year out of range");
        return None;
    }

    // Both values are clamped above, so the narrowing casts cannot truncate.
    let Some(date) = NaiveDate::from_ymd_opt(year as i32, month as u32, day as u32) else {
        debug!(year, month, day, parts = %parts, "invalid calendar date");
        return None;
    };
    Some(format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        date.month(),
        date.day()
    ))
}

/// Reads the month or day slot. `None` in the outer option means the parts are
/// malformed; `Some(None)` means the slot is absent or `null`.
fn optional_part(part: Option<&Value>, parts: &Value) -> Option<Option<i64>> {
    match part.map(part_as_i64) {
        None => Some(None),
        Some(Ok(value)) => Some(value),
        Some(Err(())) => {
            debug!(parts = %parts, "invalid date parts format");
            None
        }
    }
}

/// Interpret one date component. Integers are taken as is, floats are
/// truncated toward zero and numeric strings are parsed.
fn part_as_i64(part: &Value) -> Result<Option<i64>, ()> {
    match part {
        Value::Null => Ok(None),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                Ok(Some(i))
            } else {
                match n.as_f64() {
                    Some(f) if f.is_finite() && f.abs() < i64::MAX as f64 => Ok(Some(f.trunc() as i64)),
                    _ => Err(()),
                }
            }
        }
        Value::String(s) => s.trim().parse::<i64>().map(Some).map_err(|_| ()),
        Value::Bool(_) | Value::Array(_) | Value::Object(_) => Err(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn full_date() {
        assert_eq!(
            date_parts_to_date(&json!([[2024, 3, 15]])).as_deref(),
            Some("2024-03-15")
        );
    }

    #[test]
    fn year_only_defaults_month_and_day() {
        assert_eq!(
            date_parts_to_date(&json!([[2024]])).as_deref(),
            Some("2024-01-01")
        );
        assert_eq!(
            date_parts_to_date(&json!([[2024, 7]])).as_deref(),
            Some("2024-07-01")
        );
    }

    #[test]
    fn month_and_day_are_clamped() {
        assert_eq!(
            date_parts_to_date(&json!([[2024, 13, 1]])).as_deref(),
            Some("2024-12-01")
        );
        assert_eq!(
            date_parts_to_date(&json!([[2024, 0, 0]])).as_deref(),
            Some("2024-01-01")
        );
        assert_eq!(
            date_parts_to_date(&json!([[2023, 1, 99]])).as_deref(),
            Some("2023-01-31")
        );
    }

    #[test]
    fn impossible_date_is_absent() {
        assert_eq!(date_parts_to_date(&json!([[2024, 2, 30]])), None);
        assert_eq!(date_parts_to_date(&json!([[2023, 4, 31]])), None);
    }

    #[test]
    fn leap_day() {
        assert_eq!(
            date_parts_to_date(&json!([[2024, 2, 29]])).as_deref(),
            Some("2024-02-29")
        );
        assert_eq!(date_parts_to_date(&json!([[2023, 2, 29]])), None);
    }

    #[test]
    fn malformed_parts_are_absent() {
        for parts in [
            json!([]),
            json!([[]]),
            json!([null]),
            json!([[null]]),
            json!([["abc", 1, 1]]),
            json!([[2024, true]]),
            json!([[2024, [1]]]),
            json!("2024-01-01"),
            json!({"year": 2024}),
            json!([[0]]),
            json!([[10000, 1, 1]]),
        ] {
            assert_eq!(date_parts_to_date(&parts), None, "parts: {parts}");
        }
    }

    #[test]
    fn numeric_strings_and_floats_are_accepted() {
        assert_eq!(
            date_parts_to_date(&json!([["2021", "6", "9"]])).as_deref(),
            Some("2021-06-09")
        );
        assert_eq!(
            date_parts_to_date(&json!([[1999.0, 12.7, 31]])).as_deref(),
            Some("1999-12-31")
        );
    }

    #[test]
    fn small_years_are_zero_padded() {
        assert_eq!(
            date_parts_to_date(&json!([[5, 1, 2]])).as_deref(),
            Some("0005-01-02")
        );
    }

    #[test]
    fn null_month_defaults_to_one() {
        assert_eq!(
            date_parts_to_date(&json!([[2020, null, 5]])).as_deref(),
            Some("2020-01-05")
        );
    }

    #[test]
    fn key_order_is_preserved() {
        let doc = json!({"a": 1, "date-parts": [[2020, 1, 1]], "z": 2});
        let out = transform(&doc);
        let keys: Vec<&String> = out.as_object().unwrap().keys().collect();
        assert_eq!(keys, ["a", "date", "z"]);
    }
}
