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

//! The pull-operator contract. One query is one single-threaded
//! cooperative pipeline: no operator sees concurrent `next` calls.

use std::cell::RefCell;
use std::rc::Rc;

use quarry_common::{Result, Row, Schema, Warning};

/// Recoverable warnings flow from the scans to the query result
/// through this shared sink
pub type WarningSink = Rc<RefCell<Vec<Warning>>>;

/// One operator of the executing pipeline.
///
/// `open` runs once before the first `next` and may drain a child
/// completely (blocking operators). `close` releases resources, runs
/// on normal end and on early termination alike, and must be
/// idempotent.
pub trait Operator {
    fn schema(&self) -> &Schema;

    fn open(&mut self) -> Result<()>;

    fn next(&mut self) -> Result<Option<Row>>;

    fn close(&mut self);
}
