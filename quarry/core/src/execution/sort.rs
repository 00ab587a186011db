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

//! The blocking sort operator: materializes its input and runs a
//! stable sort over the composite key. Ties keep input order; nulls
//! sort last whatever the direction, which is the engine's convention
//! rather than ANSI's NULLS FIRST/LAST.

use std::cmp::Ordering;

use quarry_common::{Result, Row, Schema};
use quarry_expr::SortKey;

use crate::execution::operator::Operator;

pub struct SortExec {
    input: Box<dyn Operator>,
    keys: Vec<SortKey>,
    sorted: Option<std::vec::IntoIter<Row>>,
}

impl SortExec {
    pub fn new(input: Box<dyn Operator>, keys: Vec<SortKey>) -> Self {
        Self {
            input,
            keys,
            sorted: None,
        }
    }
}

/// Compare one key column of two rows. The sort key columns share a
/// type (or are null), so value comparison cannot fail here; an
/// incomparable pair keeps the rows' relative order.
fn compare_key(a: &Row, b: &Row, key: &SortKey) -> Ordering {
    let left = a.get_or_null(&key.column);
    let right = b.get_or_null(&key.column);
    let ordering = match (left.is_null(), right.is_null()) {
        (true, true) => Ordering::Equal,
        // nulls last regardless of ASC/DESC
        (true, false) => return Ordering::Greater,
        (false, true) => return Ordering::Less,
        (false, false) => left
            .compare(&right)
            .ok()
            .flatten()
            .unwrap_or(Ordering::Equal),
    };
    if key.ascending {
        ordering
    } else {
        ordering.reverse()
    }
}

impl Operator for SortExec {
    fn schema(&self) -> &Schema {
        self.input.schema()
    }

    fn open(&mut self) -> Result<()> {
        self.input.open()?;
        let mut rows = vec![];
        while let Some(row) = self.input.next()? {
            rows.push(row);
        }
        self.input.close();

        let keys = self.keys.clone();
        // Vec::sort_by is stable, which keeps input order for ties
        rows.sort_by(|a, b| {
            keys.iter()
                .map(|key| compare_key(a, b, key))
                .find(|o| *o != Ordering::Equal)
                .unwrap_or(Ordering::Equal)
        });
        self.sorted = Some(rows.into_iter());
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        Ok(self.sorted.as_mut().and_then(|rows| rows.next()))
    }

    fn close(&mut self) {
        self.sorted = None;
        self.input.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::Value;

    fn row(name: &str, amount: Value) -> Row {
        Row::from_pairs([("name", Value::from(name)), ("amt", amount)])
    }

    #[test]
    fn nulls_sort_last_in_both_directions() {
        let rows = vec![
            row("a", Value::Null),
            row("b", Value::Integer(2)),
            row("c", Value::Integer(1)),
        ];
        let key = SortKey {
            column: "amt".to_string(),
            ascending: true,
        };
        let mut sorted = rows.clone();
        sorted.sort_by(|a, b| compare_key(a, b, &key));
        let names: Vec<Value> = sorted.iter().map(|r| r.get_or_null("name")).collect();
        assert_eq!(
            names,
            vec![Value::from("c"), Value::from("b"), Value::from("a")]
        );

        let key = SortKey {
            column: "amt".to_string(),
            ascending: false,
        };
        let mut sorted = rows;
        sorted.sort_by(|a, b| compare_key(a, b, &key));
        let names: Vec<Value> = sorted.iter().map(|r| r.get_or_null("name")).collect();
        assert_eq!(
            names,
            vec![Value::from("b"), Value::from("c"), Value::from("a")]
        );
    }
}
