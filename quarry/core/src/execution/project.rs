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

//! The projection operator: evaluates each output expression against
//! the child row and builds a fresh row under the output names

use quarry_common::{Result, Row, Schema};
use quarry_expr::Expr;

use crate::execution::evaluator::evaluate;
use crate::execution::operator::Operator;

pub struct ProjectExec {
    input: Box<dyn Operator>,
    exprs: Vec<(Expr, String)>,
    schema: Schema,
}

impl ProjectExec {
    pub fn new(input: Box<dyn Operator>, exprs: Vec<(Expr, String)>, schema: Schema) -> Self {
        Self {
            input,
            exprs,
            schema,
        }
    }
}

impl Operator for ProjectExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        let Some(row) = self.input.next()? else {
            return Ok(None);
        };
        let mut projected = Row::new();
        for (expr, name) in &self.exprs {
            projected.insert(name.clone(), evaluate(expr, &row)?);
        }
        Ok(Some(projected))
    }

    fn close(&mut self) {
        self.input.close();
    }
}
