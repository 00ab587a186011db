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

//! The limit operator: forwards up to `n` rows, closes its child as
//! soon as the cap is reached, and keeps answering end-of-stream on
//! further calls

use quarry_common::{Result, Row, Schema};

use crate::execution::operator::Operator;

pub struct LimitExec {
    input: Box<dyn Operator>,
    n: usize,
    emitted: usize,
    exhausted: bool,
}

impl LimitExec {
    pub fn new(input: Box<dyn Operator>, n: usize) -> Self {
        Self {
            input,
            n,
            emitted: 0,
            exhausted: false,
        }
    }
}

impl Operator for LimitExec {
    fn schema(&self) -> &Schema {
        self.input.schema()
    }

    fn open(&mut self) -> Result<()> {
        if self.n == 0 {
            self.exhausted = true;
            return Ok(());
        }
        self.input.open()
    }

    fn next(&mut self) -> Result<Option<Row>> {
        if self.exhausted {
            return Ok(None);
        }
        match self.input.next()? {
            Some(row) => {
                self.emitted += 1;
                if self.emitted >= self.n {
                    // early termination cascades through close
                    self.exhausted = true;
                    self.input.close();
                }
                Ok(Some(row))
            }
            None => {
                self.exhausted = true;
                Ok(None)
            }
        }
    }

    fn close(&mut self) {
        self.input.close();
    }
}
