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

//! [`Value`]: the dynamically typed cell of a row

use std::cmp::Ordering;
use std::fmt;
use std::hash::{Hash, Hasher};

use bigdecimal::{BigDecimal, FromPrimitive, ToPrimitive};
use chrono::{NaiveDate, NaiveDateTime, NaiveTime};

use crate::error::{QuarryError, Result};
use crate::DataType;

/// A single dynamically typed value.
///
/// `Null` is a first-class variant, not a sentinel; every operation on
/// values treats it explicitly.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Boolean(bool),
    Integer(i64),
    Float(f64),
    Decimal(BigDecimal),
    Utf8(String),
    Json(serde_json::Value),
    Date(NaiveDate),
    Time(NaiveTime),
    Timestamp(NaiveDateTime),
}

impl Value {
    /// The precise [`DataType`] of this value. Booleans are checked
    /// before integers so that `true` never reads as `1`.
    pub fn data_type(&self) -> DataType {
        match self {
            Value::Null => DataType::Null,
            Value::Boolean(_) => DataType::Boolean,
            Value::Integer(_) => DataType::Integer,
            Value::Float(_) => DataType::Float,
            Value::Decimal(_) => DataType::Decimal,
            Value::Utf8(_) => DataType::Utf8,
            Value::Json(_) => DataType::Json,
            Value::Date(_) => DataType::Date,
            Value::Time(_) => DataType::Time,
            Value::Timestamp(_) => DataType::Timestamp,
        }
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Convert this value to the given type through the promotion
    /// lattice. Only widening conversions succeed; `Null` casts to
    /// anything (staying null).
    pub fn cast_to(&self, target: &DataType) -> Result<Value> {
        if self.data_type() == *target {
            return Ok(self.clone());
        }
        match (self, target) {
            (Value::Null, _) => Ok(Value::Null),
            (Value::Integer(i), DataType::Float) => Ok(Value::Float(*i as f64)),
            (Value::Integer(i), DataType::Decimal) => {
                Ok(Value::Decimal(BigDecimal::from(*i)))
            }
            (Value::Float(f), DataType::Decimal) => BigDecimal::from_f64(*f)
                .map(Value::Decimal)
                .ok_or_else(|| {
                    QuarryError::Data(format!("float {f} has no decimal form"))
                }),
            (Value::Date(d), DataType::Timestamp) => {
                Ok(Value::Timestamp(d.and_hms_opt(0, 0, 0).expect("midnight")))
            }
            (_, DataType::Utf8) => Ok(Value::Utf8(self.to_string())),
            (left, right) => Err(QuarryError::type_mismatch(
                "cast",
                left.data_type(),
                *right,
            )),
        }
    }

    /// SQL comparison semantics: `None` when either side is null (or a
    /// float comparison involves NaN), an error when the types are not
    /// comparable, an [`Ordering`] otherwise. Numeric mixes compare
    /// exactly through [`BigDecimal`].
    pub fn compare(&self, other: &Value) -> Result<Option<Ordering>> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => Ok(None),
            (Integer(a), Integer(b)) => Ok(Some(a.cmp(b))),
            (Float(a), Float(b)) => Ok(a.partial_cmp(b)),
            (Decimal(a), Decimal(b)) => Ok(Some(a.cmp(b))),
            (Boolean(a), Boolean(b)) => Ok(Some(a.cmp(b))),
            (Utf8(a), Utf8(b)) => Ok(Some(a.cmp(b))),
            (Date(a), Date(b)) => Ok(Some(a.cmp(b))),
            (Time(a), Time(b)) => Ok(Some(a.cmp(b))),
            (Timestamp(a), Timestamp(b)) => Ok(Some(a.cmp(b))),
            // json values order by their canonical text so that sorting
            // over a json column is total
            (Json(a), Json(b)) => Ok(Some(a.to_string().cmp(&b.to_string()))),
            (a, b) if a.data_type().is_numeric() && b.data_type().is_numeric() => {
                match (a.as_decimal(), b.as_decimal()) {
                    (Some(x), Some(y)) => Ok(Some(x.cmp(&y))),
                    // NaN has no decimal form; its comparisons are null
                    _ => Ok(None),
                }
            }
            (a, b) => Err(QuarryError::type_mismatch(
                "compare",
                a.data_type(),
                b.data_type(),
            )),
        }
    }

    /// The exact decimal form of a numeric value, `None` for NaN and
    /// non-numerics
    pub fn as_decimal(&self) -> Option<BigDecimal> {
        match self {
            Value::Integer(i) => Some(BigDecimal::from(*i)),
            Value::Float(f) => BigDecimal::from_f64(*f),
            Value::Decimal(d) => Some(d.clone()),
            _ => None,
        }
    }

    fn numeric_binary(
        &self,
        other: &Value,
        op: &str,
        int_op: fn(i64, i64) -> Option<i64>,
        float_op: fn(f64, f64) -> f64,
        dec_op: fn(&BigDecimal, &BigDecimal) -> BigDecimal,
    ) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => Ok(Null),
            (Integer(a), Integer(b)) => match int_op(*a, *b) {
                Some(v) => Ok(Integer(v)),
                // overflow promotes to decimal rather than wrapping
                None => Ok(Decimal(dec_op(
                    &BigDecimal::from(*a),
                    &BigDecimal::from(*b),
                ))),
            },
            (Float(a), Float(b)) => Ok(Float(float_op(*a, *b))),
            (Decimal(a), Decimal(b)) => Ok(Decimal(dec_op(a, b))),
            (a, b) if a.data_type().is_numeric() && b.data_type().is_numeric() => {
                let target = crate::promote(&a.data_type(), &b.data_type());
                a.cast_to(&target)?.numeric_binary(
                    &b.cast_to(&target)?,
                    op,
                    int_op,
                    float_op,
                    dec_op,
                )
            }
            (a, b) => Err(QuarryError::type_mismatch(
                op,
                a.data_type(),
                b.data_type(),
            )),
        }
    }

    /// `self + other` with numeric promotion; null propagates
    pub fn add(&self, other: &Value) -> Result<Value> {
        self.numeric_binary(other, "+", i64::checked_add, |a, b| a + b, |a, b| a + b)
    }

    /// `self - other` with numeric promotion; null propagates
    pub fn sub(&self, other: &Value) -> Result<Value> {
        self.numeric_binary(other, "-", i64::checked_sub, |a, b| a - b, |a, b| a - b)
    }

    /// `self * other` with numeric promotion; null propagates
    pub fn mul(&self, other: &Value) -> Result<Value> {
        self.numeric_binary(other, "*", i64::checked_mul, |a, b| a * b, |a, b| a * b)
    }

    /// `self / other`. Integer division yields a float; division by
    /// zero yields null.
    pub fn div(&self, other: &Value) -> Result<Value> {
        use Value::*;
        match (self, other) {
            (Null, _) | (_, Null) => Ok(Null),
            (a, b) if a.data_type().is_numeric() && b.data_type().is_numeric() => {
                if let (Decimal(_), _) | (_, Decimal(_)) = (a, b) {
                    let x = a.as_decimal();
                    let y = b.as_decimal();
                    match (x, y) {
                        (Some(_), Some(y)) if y == BigDecimal::from(0) => Ok(Null),
                        (Some(x), Some(y)) => Ok(Decimal(x / y)),
                        _ => Ok(Null),
                    }
                } else {
                    let x = a.to_f64_lossy().expect("numeric");
                    let y = b.to_f64_lossy().expect("numeric");
                    if y == 0.0 {
                        Ok(Null)
                    } else {
                        Ok(Float(x / y))
                    }
                }
            }
            (a, b) => Err(QuarryError::type_mismatch(
                "/",
                a.data_type(),
                b.data_type(),
            )),
        }
    }

    fn to_f64_lossy(&self) -> Option<f64> {
        match self {
            Value::Integer(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            Value::Decimal(d) => d.to_f64(),
            _ => None,
        }
    }
}

/// Identity semantics used for hashing (group keys, join keys): floats
/// compare by bit pattern so that `Value` can implement `Eq`. SQL
/// comparison semantics live in [`Value::compare`].
impl PartialEq for Value {
    fn eq(&self, other: &Value) -> bool {
        use Value::*;
        match (self, other) {
            (Null, Null) => true,
            (Boolean(a), Boolean(b)) => a == b,
            (Integer(a), Integer(b)) => a == b,
            (Float(a), Float(b)) => a.to_bits() == b.to_bits(),
            (Decimal(a), Decimal(b)) => a == b,
            (Utf8(a), Utf8(b)) => a == b,
            (Json(a), Json(b)) => a == b,
            (Date(a), Date(b)) => a == b,
            (Time(a), Time(b)) => a == b,
            (Timestamp(a), Timestamp(b)) => a == b,
            _ => false,
        }
    }
}

impl Eq for Value {}

impl Hash for Value {
    fn hash<H: Hasher>(&self, state: &mut H) {
        use Value::*;
        std::mem::discriminant(self).hash(state);
        match self {
            Null => {}
            Boolean(b) => b.hash(state),
            Integer(i) => i.hash(state),
            Float(f) => f.to_bits().hash(state),
            Decimal(d) => d.hash(state),
            Utf8(s) => s.hash(state),
            Json(j) => j.to_string().hash(state),
            Date(d) => d.hash(state),
            Time(t) => t.hash(state),
            Timestamp(t) => t.hash(state),
        }
    }
}

impl fmt::Display for Value {
    /// The canonical string form. Re-inferring the type from this form
    /// yields the original type, except that a float printing at least
    /// five significant digits reads back as decimal.
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Boolean(b) => write!(f, "{b}"),
            Value::Integer(i) => write!(f, "{i}"),
            // Debug formatting keeps a trailing `.0` on round floats so
            // the text never reads back as an integer
            Value::Float(v) => write!(f, "{v:?}"),
            Value::Decimal(d) => write!(f, "{d}"),
            Value::Utf8(s) => write!(f, "{s}"),
            Value::Json(j) => write!(f, "{j}"),
            Value::Date(d) => write!(f, "{d}"),
            Value::Time(t) => write!(f, "{t}"),
            Value::Timestamp(t) => write!(f, "{t}"),
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Boolean(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Utf8(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Utf8(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn compare_nulls() {
        assert_eq!(Value::Null.compare(&Value::Integer(1)).unwrap(), None);
        assert_eq!(Value::Utf8("a".into()).compare(&Value::Null).unwrap(), None);
    }

    #[test]
    fn compare_numeric_mix() {
        let cases = [
            (Value::Integer(1), Value::Float(1.5), Ordering::Less),
            (Value::Float(2.0), Value::Integer(2), Ordering::Equal),
            (
                Value::Decimal(BigDecimal::from_str("2.5").unwrap()),
                Value::Integer(2),
                Ordering::Greater,
            ),
        ];
        for (a, b, expected) in cases {
            assert_eq!(a.compare(&b).unwrap(), Some(expected), "{a} vs {b}");
        }
    }

    #[test]
    fn compare_incompatible() {
        let err = Value::Utf8("1".into())
            .compare(&Value::Integer(1))
            .unwrap_err();
        assert!(err.to_string().contains("cannot apply 'compare'"));
    }

    #[test]
    fn nan_comparison_is_null() {
        assert_eq!(
            Value::Float(f64::NAN).compare(&Value::Integer(0)).unwrap(),
            None
        );
    }

    #[test]
    fn integer_overflow_promotes_to_decimal() {
        let sum = Value::Integer(i64::MAX).add(&Value::Integer(1)).unwrap();
        assert_eq!(sum.data_type(), DataType::Decimal);
        let expected = BigDecimal::from(i64::MAX) + BigDecimal::from(1);
        assert_eq!(sum, Value::Decimal(expected));
    }

    #[test]
    fn integer_division_is_float() {
        assert_eq!(
            Value::Integer(1).div(&Value::Integer(2)).unwrap(),
            Value::Float(0.5)
        );
        assert_eq!(Value::Integer(1).div(&Value::Integer(0)).unwrap(), Value::Null);
    }

    #[test]
    fn arithmetic_propagates_null() {
        assert_eq!(Value::Null.add(&Value::Integer(1)).unwrap(), Value::Null);
        assert_eq!(Value::Float(1.0).mul(&Value::Null).unwrap(), Value::Null);
    }

    #[test]
    fn canonical_float_keeps_fraction() {
        assert_eq!(Value::Float(1.0).to_string(), "1.0");
        assert_eq!(Value::Float(0.25).to_string(), "0.25");
    }

    #[test]
    fn cast_widens_only() {
        assert_eq!(
            Value::Integer(3).cast_to(&DataType::Float).unwrap(),
            Value::Float(3.0)
        );
        assert!(Value::Float(1.5).cast_to(&DataType::Integer).is_err());
        assert_eq!(
            Value::Null.cast_to(&DataType::Timestamp).unwrap(),
            Value::Null
        );
    }
}
