// Licensed to the Apache Software Foundation (ASF) under one
// or more contributor license agreements.  See the NOTICE file
// distributed with this work for additional information
// regarding copyright ownership.  The ASF licenses this file
// to you under the Apache License, Version 2.0 (the
// "License"); you may not use this file except in compliance
// with the License.  You may obtain a copy of the License at
//
//   http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing,
// software distributed under the License is distributed on an
// "AS IS" BASIS, WITHOUT WARRANTIES OR CONDITIONS OF ANY
// KIND, either express or implied.  See the License for the
// specific language governing permissions and limitations
// under the License.

//! Type inference from string cells, used by every reader whose source
//! carries no type metadata (CSV, HTML, Markdown, XML, JSONL-as-text)

use std::str::FromStr;

use bigdecimal::BigDecimal;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};

use crate::{promote, DataType, Value};

/// Cell texts recognized as null, case-insensitively
const NULL_TOKENS: [&str; 5] = ["", "null", "none", "n/a", "-"];

const DATE_FORMATS: [&str; 2] = ["%Y-%m-%d", "%m/%d/%Y"];
const TIME_FORMATS: [&str; 2] = ["%H:%M:%S%.f", "%H:%M"];
const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M",
];

/// Whether `s` is one of the recognized null tokens
pub fn is_null_token(s: &str) -> bool {
    NULL_TOKENS.iter().any(|t| s.eq_ignore_ascii_case(t))
}

/// Count of significant digits: all digits from the first non-zero one,
/// including trailing zeros after the decimal point
fn significant_digits(s: &str) -> usize {
    s.chars()
        .filter(|c| c.is_ascii_digit())
        .skip_while(|c| *c == '0')
        .count()
}

/// A numeric string with a decimal point is decimal when it carries at
/// least five significant digits, float otherwise
fn is_decimal_form(s: &str) -> bool {
    s.contains('.') && significant_digits(s) >= 5
}

fn parse_date(s: &str) -> Option<NaiveDate> {
    DATE_FORMATS
        .iter()
        .find_map(|f| NaiveDate::parse_from_str(s, f).ok())
}

fn parse_time(s: &str) -> Option<NaiveTime> {
    TIME_FORMATS
        .iter()
        .find_map(|f| NaiveTime::parse_from_str(s, f).ok())
}

/// Timestamps with an explicit offset (`Z` or `±HH:MM`) normalize to
/// naive UTC; bare timestamps are taken as-is
fn parse_timestamp(s: &str) -> Option<NaiveDateTime> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    DATETIME_FORMATS
        .iter()
        .find_map(|f| NaiveDateTime::parse_from_str(s, f).ok())
}

fn looks_like_json(s: &str) -> bool {
    let trimmed = s.trim_start();
    trimmed.starts_with('{') || trimmed.starts_with('[')
}

/// Infer the [`DataType`] a string cell denotes, trying in order: null
/// token, boolean, integer, float/decimal, date, time, datetime, json,
/// and finally utf8 as the catch-all.
pub fn infer_type_from_string(s: &str) -> DataType {
    if is_null_token(s) {
        return DataType::Null;
    }
    if s.eq_ignore_ascii_case("true") || s.eq_ignore_ascii_case("false") {
        return DataType::Boolean;
    }
    if s.parse::<i64>().is_ok() {
        return DataType::Integer;
    }
    // "inf" and "nan" parse as f64 but should stay text
    if s.contains(|c: char| c.is_ascii_digit()) && s.parse::<f64>().is_ok() {
        return if is_decimal_form(s) {
            DataType::Decimal
        } else {
            DataType::Float
        };
    }
    if parse_date(s).is_some() {
        return DataType::Date;
    }
    if parse_time(s).is_some() {
        return DataType::Time;
    }
    if parse_timestamp(s).is_some() {
        return DataType::Timestamp;
    }
    if looks_like_json(s) && serde_json::from_str::<serde_json::Value>(s).is_ok() {
        return DataType::Json;
    }
    DataType::Utf8
}

/// Parse a string cell as the given type. `None` means the cell is not
/// coercible; permissive readers degrade it to null with a warning.
/// Null tokens parse as null under every type.
pub fn parse_string_as(s: &str, data_type: &DataType) -> Option<Value> {
    if is_null_token(s) {
        return Some(Value::Null);
    }
    match data_type {
        // a column sampled as all-null accepts nothing else
        DataType::Null => None,
        DataType::Boolean => {
            if s.eq_ignore_ascii_case("true") {
                Some(Value::Boolean(true))
            } else if s.eq_ignore_ascii_case("false") {
                Some(Value::Boolean(false))
            } else {
                None
            }
        }
        DataType::Integer => s.parse::<i64>().ok().map(Value::Integer),
        DataType::Float => s.parse::<f64>().ok().map(Value::Float),
        DataType::Decimal => BigDecimal::from_str(s).ok().map(Value::Decimal),
        DataType::Date => parse_date(s).map(Value::Date),
        DataType::Time => parse_time(s).map(Value::Time),
        DataType::Timestamp => {
            // a bare date widens into a timestamp column
            parse_timestamp(s)
                .or_else(|| parse_date(s).and_then(|d| d.and_hms_opt(0, 0, 0)))
                .map(Value::Timestamp)
        }
        DataType::Json => serde_json::from_str(s).ok().map(Value::Json),
        DataType::Utf8 => Some(Value::Utf8(s.to_string())),
    }
}

/// Fold the inferred types of sampled cells through the promotion
/// lattice, ignoring nulls. An all-null (or empty) sample stays `null`.
pub fn infer_common_type(samples: impl IntoIterator<Item = DataType>) -> DataType {
    samples
        .into_iter()
        .filter(|t| *t != DataType::Null)
        .fold(DataType::Null, |acc, t| {
            if acc == DataType::Null {
                t
            } else {
                promote(&acc, &t)
            }
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_inferred(s: &str, expected: DataType) {
        assert_eq!(infer_type_from_string(s), expected, "input: '{s}'");
    }

    #[test]
    fn null_tokens() {
        for s in ["", "null", "NULL", "None", "n/a", "N/A", "-"] {
            assert_inferred(s, DataType::Null);
        }
    }

    #[test]
    fn booleans_before_integers() {
        assert_inferred("true", DataType::Boolean);
        assert_inferred("FALSE", DataType::Boolean);
    }

    #[test]
    fn integers() {
        assert_inferred("0", DataType::Integer);
        assert_inferred("-42", DataType::Integer);
        assert_inferred("+7", DataType::Integer);
    }

    #[test]
    fn float_vs_decimal_split() {
        // fewer than five significant digits: float
        assert_inferred("1.5", DataType::Float);
        assert_inferred("20.0", DataType::Float);
        assert_inferred("1e3", DataType::Float);
        // five or more significant digits with a decimal point: decimal
        assert_inferred("123.45", DataType::Decimal);
        assert_inferred("0.00012345", DataType::Decimal);
        // "inf" and "nan" stay text
        assert_inferred("inf", DataType::Utf8);
        assert_inferred("NaN", DataType::Utf8);
    }

    #[test]
    fn temporal() {
        assert_inferred("2023-04-01", DataType::Date);
        assert_inferred("04/01/2023", DataType::Date);
        assert_inferred("09:30", DataType::Time);
        assert_inferred("09:30:15", DataType::Time);
        assert_inferred("2023-04-01 09:30:15", DataType::Timestamp);
        assert_inferred("2023-04-01T09:30:15.250", DataType::Timestamp);
        assert_inferred("2023-04-01T09:30:15Z", DataType::Timestamp);
        assert_inferred("2023-04-01T09:30:15+02:00", DataType::Timestamp);
    }

    #[test]
    fn json_and_fallback() {
        assert_inferred(r#"{"a": 1}"#, DataType::Json);
        assert_inferred("[1, 2, 3]", DataType::Json);
        assert_inferred("{not json", DataType::Utf8);
        assert_inferred("hello", DataType::Utf8);
    }

    #[test]
    fn offset_normalizes_to_utc() {
        let v = parse_string_as("2023-04-01T12:00:00+02:00", &DataType::Timestamp);
        assert_eq!(
            v,
            Some(Value::Timestamp(
                NaiveDate::from_ymd_opt(2023, 4, 1)
                    .unwrap()
                    .and_hms_opt(10, 0, 0)
                    .unwrap()
            ))
        );
    }

    #[test]
    fn parse_as_degrades() {
        assert_eq!(parse_string_as("abc", &DataType::Integer), None);
        assert_eq!(
            parse_string_as("n/a", &DataType::Integer),
            Some(Value::Null)
        );
        assert_eq!(
            parse_string_as("12", &DataType::Float),
            Some(Value::Float(12.0))
        );
    }

    #[test]
    fn common_type_folds() {
        use DataType::*;
        assert_eq!(infer_common_type([Integer, Float, Null]), Float);
        assert_eq!(infer_common_type([Integer, Utf8]), Utf8);
        assert_eq!(infer_common_type([Null, Null]), Null);
        assert_eq!(infer_common_type([Date, Timestamp]), Timestamp);
    }

    #[test]
    fn round_trip_inference() {
        // for a value of inferred type T, the canonical string form
        // re-infers T (floats may widen to decimal when the text gains
        // five significant digits; not exercised here)
        let values = [
            Value::Boolean(true),
            Value::Integer(42),
            Value::Float(1.5),
            Value::Decimal(BigDecimal::from_str("123.456").unwrap()),
            Value::Date(NaiveDate::from_ymd_opt(2023, 4, 1).unwrap()),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(2023, 4, 1)
                    .unwrap()
                    .and_hms_opt(9, 30, 0)
                    .unwrap(),
            ),
            Value::Json(serde_json::json!({"a": 1})),
        ];
        for v in values {
            assert_eq!(
                infer_type_from_string(&v.to_string()),
                v.data_type(),
                "value: {v}"
            );
        }
    }
}
