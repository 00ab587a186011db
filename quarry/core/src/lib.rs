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

//! Quarry is a file-oriented SQL query engine: analytical, read-only
//! SQL over CSV, Parquet, JSON/JSONL, HTML, Markdown and XML sources,
//! local or remote (HTTP, S3).
//!
//! The pipeline is a hand-written recursive-descent parser, a logical
//! optimizer (partition pruning, predicate pushdown, column pruning,
//! limit pushdown) and a pull-based operator tree over per-format
//! readers that honor the pushdown hints.
//!
//! ```no_run
//! # use quarry::Result;
//! # fn main() -> Result<()> {
//! let result = quarry::execute(
//!     "SELECT name FROM 'people.csv' WHERE age >= 25 ORDER BY name",
//!     None,
//! )?;
//! for row in result {
//!     println!("{:?}", row?);
//! }
//! # Ok(())
//! # }
//! ```

pub mod context;
pub mod datasource;
pub mod execution;

pub use context::{execute, infer_schema, Engine, QueryResult};
pub use quarry_common::{
    DataType, QuarryError, ReaderOptions, Result, Row, Schema, Value, Warning,
};

// the layered crates, re-exported the way the core crate of the
// workspace usually surfaces them
pub use quarry_common as common;
pub use quarry_expr as logical_expr;
pub use quarry_optimizer as optimizer;
pub use quarry_sql as sql;
