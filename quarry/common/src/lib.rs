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

//! Common functionality for the Quarry query engine: the value and
//! type system, schemas, rows, and the engine-wide error type.

pub mod datatype;
pub mod error;
pub mod inference;
pub mod row;
pub mod schema;
pub mod value;

pub use datatype::{is_comparable, promote, DataType};
pub use error::{GenericError, ParseError, QuarryError, Result};
pub use inference::{
    infer_common_type, infer_type_from_string, is_null_token, parse_string_as,
};
pub use row::Row;
pub use schema::Schema;
pub use value::Value;

/// Reader tuning knobs, threaded through reader constructors rather
/// than held in any global state
#[derive(Debug, Clone)]
pub struct ReaderOptions {
    /// How many leading rows a string-based reader samples when
    /// inferring its schema
    pub schema_sample_rows: usize,
}

impl Default for ReaderOptions {
    fn default() -> Self {
        Self {
            schema_sample_rows: 100,
        }
    }
}

/// A recoverable problem encountered while decoding rows, surfaced on
/// the query result's side channel instead of failing the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Warning {
    /// The source locator the warning arose in
    pub source: String,
    /// Human-readable description, e.g. a malformed line number
    pub message: String,
}

impl std::fmt::Display for Warning {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}: {}", self.source, self.message)
    }
}
