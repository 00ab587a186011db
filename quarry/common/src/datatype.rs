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

//! The ten data types understood by the engine and the promotion
//! lattice used to combine them

use std::fmt;

/// The type of a [`crate::Value`] or a schema column.
///
/// `Null` is a first-class type: a column whose sampled values are all
/// null keeps it until merged with a typed column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataType {
    Null,
    Boolean,
    Integer,
    Float,
    Decimal,
    Utf8,
    Json,
    Date,
    Time,
    Timestamp,
}

impl DataType {
    /// Whether this is one of the three numeric types
    pub fn is_numeric(&self) -> bool {
        matches!(self, DataType::Integer | DataType::Float | DataType::Decimal)
    }

    /// Whether this is a temporal type
    pub fn is_temporal(&self) -> bool {
        matches!(self, DataType::Date | DataType::Time | DataType::Timestamp)
    }
}

impl fmt::Display for DataType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            DataType::Null => "null",
            DataType::Boolean => "boolean",
            DataType::Integer => "integer",
            DataType::Float => "float",
            DataType::Decimal => "decimal",
            DataType::Utf8 => "utf8",
            DataType::Json => "json",
            DataType::Date => "date",
            DataType::Time => "time",
            DataType::Timestamp => "timestamp",
        };
        write!(f, "{name}")
    }
}

/// Promotion rule for the two numeric chains: the wider type wins.
/// Returns `None` when either side is not numeric.
fn numeric_promotion(lhs: &DataType, rhs: &DataType) -> Option<DataType> {
    use DataType::*;
    if !lhs.is_numeric() || !rhs.is_numeric() {
        return None;
    }
    // ordered from most informative to least informative so that the
    // promotion removes the least amount of information
    match (lhs, rhs) {
        (Decimal, _) | (_, Decimal) => Some(Decimal),
        (Float, _) | (_, Float) => Some(Float),
        (Integer, _) | (_, Integer) => Some(Integer),
        _ => None,
    }
}

/// Promotion rule for temporal types: `date` and `time` each widen to
/// `timestamp`, nothing else combines.
fn temporal_promotion(lhs: &DataType, rhs: &DataType) -> Option<DataType> {
    use DataType::*;
    match (lhs, rhs) {
        (Date, Timestamp) | (Timestamp, Date) => Some(Timestamp),
        (Time, Timestamp) | (Timestamp, Time) => Some(Timestamp),
        _ => None,
    }
}

/// Combine two types through the promotion lattice.
///
/// - identical types stay put
/// - `null` unifies with anything, resolving to the other type
/// - numeric mixes promote to the widest member
/// - `date`/`time` widen to `timestamp`
/// - everything else, including `json` against any non-`json` type,
///   resolves to `utf8`
pub fn promote(lhs: &DataType, rhs: &DataType) -> DataType {
    use DataType::*;
    if lhs == rhs {
        return *lhs;
    }
    match (lhs, rhs) {
        (Null, other) | (other, Null) => *other,
        _ => numeric_promotion(lhs, rhs)
            .or_else(|| temporal_promotion(lhs, rhs))
            .unwrap_or(Utf8),
    }
}

/// Whether values of the two types may be compared.
///
/// Identical types compare directly, numeric types compare through
/// promotion, and `null` compares with anything (the comparison result
/// is null). Any other cross-type comparison is rejected.
pub fn is_comparable(lhs: &DataType, rhs: &DataType) -> bool {
    lhs == rhs
        || matches!(lhs, DataType::Null)
        || matches!(rhs, DataType::Null)
        || (lhs.is_numeric() && rhs.is_numeric())
}
