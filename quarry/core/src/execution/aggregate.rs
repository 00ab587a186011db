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

//! The blocking aggregate operator: drains its child into a hash
//! table keyed by the group values, one accumulator set per group.
//! Group output order is unspecified; a groupless aggregate over an
//! empty input still yields its single row.

use std::collections::VecDeque;

use ahash::RandomState;
use indexmap::IndexMap;
use quarry_common::{Result, Row, Schema, Value};
use quarry_expr::{AggregateExpr, AggregateFunc};

use crate::execution::operator::Operator;

/// Per-group accumulator state for one aggregate call
#[derive(Debug, Clone)]
pub(crate) enum Accumulator {
    CountStar(i64),
    /// Counts only non-null inputs
    Count(i64),
    /// `None` until the first non-null input; integer sums promote to
    /// decimal instead of overflowing
    Sum(Option<Value>),
    Avg { sum: Option<Value>, count: i64 },
    Min(Option<Value>),
    Max(Option<Value>),
}

impl Accumulator {
    pub(crate) fn new(agg: &AggregateExpr) -> Self {
        match (agg.func, &agg.column) {
            (AggregateFunc::Count, None) => Accumulator::CountStar(0),
            (AggregateFunc::Count, Some(_)) => Accumulator::Count(0),
            (AggregateFunc::Sum, _) => Accumulator::Sum(None),
            (AggregateFunc::Avg, _) => Accumulator::Avg {
                sum: None,
                count: 0,
            },
            (AggregateFunc::Min, _) => Accumulator::Min(None),
            (AggregateFunc::Max, _) => Accumulator::Max(None),
        }
    }

    pub(crate) fn update(&mut self, value: &Value) -> Result<()> {
        match self {
            Accumulator::CountStar(count) => *count += 1,
            Accumulator::Count(count) => {
                if !value.is_null() {
                    *count += 1;
                }
            }
            Accumulator::Sum(sum) => {
                if !value.is_null() {
                    *sum = Some(match sum.take() {
                        None => value.clone(),
                        Some(current) => current.add(value)?,
                    });
                }
            }
            Accumulator::Avg { sum, count } => {
                if !value.is_null() {
                    *count += 1;
                    *sum = Some(match sum.take() {
                        None => value.clone(),
                        Some(current) => current.add(value)?,
                    });
                }
            }
            Accumulator::Min(extreme) => {
                if !value.is_null() {
                    let replace = match extreme.as_ref() {
                        None => true,
                        Some(current) => {
                            value.compare(current)? == Some(std::cmp::Ordering::Less)
                        }
                    };
                    if replace {
                        *extreme = Some(value.clone());
                    }
                }
            }
            Accumulator::Max(extreme) => {
                if !value.is_null() {
                    let replace = match extreme.as_ref() {
                        None => true,
                        Some(current) => {
                            value.compare(current)? == Some(std::cmp::Ordering::Greater)
                        }
                    };
                    if replace {
                        *extreme = Some(value.clone());
                    }
                }
            }
        }
        Ok(())
    }

    pub(crate) fn evaluate(self) -> Result<Value> {
        Ok(match self {
            Accumulator::CountStar(count) | Accumulator::Count(count) => {
                Value::Integer(count)
            }
            // SUM over no non-null input is null, not zero
            Accumulator::Sum(sum) => sum.unwrap_or(Value::Null),
            Accumulator::Avg { sum, count } => match sum {
                None => Value::Null,
                Some(sum) => sum.div(&Value::Integer(count))?,
            },
            Accumulator::Min(extreme) | Accumulator::Max(extreme) => {
                extreme.unwrap_or(Value::Null)
            }
        })
    }
}

pub struct AggregateExec {
    input: Box<dyn Operator>,
    group_by: Vec<String>,
    aggregates: Vec<AggregateExpr>,
    schema: Schema,
    output: Option<VecDeque<Row>>,
}

impl AggregateExec {
    pub fn new(
        input: Box<dyn Operator>,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
        schema: Schema,
    ) -> Self {
        Self {
            input,
            group_by,
            aggregates,
            schema,
            output: None,
        }
    }

    fn drain(&mut self) -> Result<VecDeque<Row>> {
        let mut groups: IndexMap<Vec<Value>, Vec<Accumulator>, RandomState> =
            IndexMap::with_hasher(RandomState::new());

        while let Some(row) = self.input.next()? {
            let key: Vec<Value> = self
                .group_by
                .iter()
                .map(|column| row.get_or_null(column))
                .collect();
            let accumulators = groups.entry(key).or_insert_with(|| {
                self.aggregates.iter().map(Accumulator::new).collect()
            });
            for (accumulator, agg) in accumulators.iter_mut().zip(&self.aggregates) {
                let value = match &agg.column {
                    None => Value::Null,
                    Some(column) => row.get_or_null(column),
                };
                accumulator.update(&value)?;
            }
        }

        // a groupless aggregate yields exactly one row even over an
        // empty input: COUNT(*)=0, everything else null
        if groups.is_empty() && self.group_by.is_empty() {
            groups.insert(
                vec![],
                self.aggregates.iter().map(Accumulator::new).collect(),
            );
        }

        let mut output = VecDeque::with_capacity(groups.len());
        for (key, accumulators) in groups {
            let mut row = Row::new();
            for (column, value) in self.group_by.iter().zip(key) {
                row.insert(column.clone(), value);
            }
            for (agg, accumulator) in self.aggregates.iter().zip(accumulators) {
                row.insert(agg.output_name.clone(), accumulator.evaluate()?);
            }
            output.push_back(row);
        }
        Ok(output)
    }
}

impl Operator for AggregateExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.input.open()?;
        let output = self.drain()?;
        // the input is fully consumed, release it early
        self.input.close();
        self.output = Some(output);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        Ok(self.output.as_mut().and_then(|rows| rows.pop_front()))
    }

    fn close(&mut self) {
        self.output = None;
        self.input.close();
    }
}
