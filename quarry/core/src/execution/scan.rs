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

//! The scan operator: owns one reader, configures it from the plan's
//! hints (with the scan's qualifier stripped), re-applies any filter
//! the reader did not consume, and qualifies emitted rows

use quarry_common::{Result, Row, Schema};
use quarry_expr::{Scan, SimplePredicate};

use crate::datasource::reader::{row_matches, Reader};
use crate::execution::operator::{Operator, WarningSink};

pub struct ScanExec {
    locator: String,
    qualifier: Option<String>,
    schema: Schema,
    reader: Box<dyn Reader>,
    hints: quarry_expr::ScanHints,
    /// Pushed filters the reader declined, enforced here (with the
    /// reader's plain column names)
    residual: Vec<SimplePredicate>,
    warnings: WarningSink,
    closed: bool,
}

impl ScanExec {
    pub fn new(node: &Scan, reader: Box<dyn Reader>, warnings: WarningSink) -> Self {
        Self {
            locator: node.locator.clone(),
            qualifier: node.qualifier.clone(),
            schema: node.schema.clone(),
            reader,
            hints: node.hints.clone(),
            residual: vec![],
            warnings,
            closed: false,
        }
    }

    /// Remove this scan's qualifier prefix so the reader sees its own
    /// plain column names
    fn strip(&self, name: &str) -> String {
        match &self.qualifier {
            Some(qualifier) => name
                .strip_prefix(&format!("{qualifier}."))
                .unwrap_or(name)
                .to_string(),
            None => name.to_string(),
        }
    }

    fn drain_warnings(&mut self) {
        let mut sink = self.warnings.borrow_mut();
        sink.extend(self.reader.take_warnings());
    }
}

impl Operator for ScanExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        if let Some(required) = &self.hints.required_columns {
            let stripped: Vec<String> =
                required.iter().map(|c| self.strip(c)).collect();
            self.reader.set_required_columns(&stripped);
        }
        let partition_filters: Vec<SimplePredicate> = self
            .hints
            .partition_filters
            .iter()
            .map(|f| f.with_column(self.strip(&f.column)))
            .collect();
        if !partition_filters.is_empty() {
            self.reader.set_partition_filters(&partition_filters);
        }
        let pushdown: Vec<SimplePredicate> = self
            .hints
            .pushdown_filters
            .iter()
            .map(|f| f.with_column(self.strip(&f.column)))
            .collect();
        if !pushdown.is_empty() {
            let consumed = self.reader.set_pushdown_filters(&pushdown);
            self.residual = pushdown
                .iter()
                .enumerate()
                .filter(|(index, _)| !consumed.contains(index))
                .map(|(_, filter)| filter.clone())
                .collect();
        }
        if let Some(cap) = self.hints.row_cap {
            self.reader.set_row_cap(cap);
        }
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            let Some(row) = self.reader.next_row().transpose()? else {
                self.drain_warnings();
                return Ok(None);
            };
            if !row_matches(&row, &self.residual) {
                continue;
            }
            let row = match &self.qualifier {
                Some(qualifier) => row.qualify(qualifier),
                None => row,
            };
            return Ok(Some(row));
        }
    }

    fn close(&mut self) {
        if !self.closed {
            self.drain_warnings();
            self.reader.close();
            self.closed = true;
        }
    }
}

impl std::fmt::Debug for ScanExec {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("ScanExec")
            .field("locator", &self.locator)
            .field("qualifier", &self.qualifier)
            .finish()
    }
}
