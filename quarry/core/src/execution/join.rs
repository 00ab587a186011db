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

//! The hash join operator: drains the build (right) side into a hash
//! table on `open`, then streams the probe (left) side. Matched rows
//! follow probe order; FULL OUTER emits the unmatched build rows once
//! the probe side is exhausted. Join keys hash on their promoted
//! common type, and a null key never matches anything.

use std::collections::{HashMap, VecDeque};

use ahash::RandomState;
use quarry_common::{DataType, Result, Row, Schema, Value};
use quarry_expr::JoinKind;

use crate::execution::operator::Operator;

pub struct JoinExec {
    probe: Box<dyn Operator>,
    build: Box<dyn Operator>,
    kind: JoinKind,
    /// `(probe column, build column, promoted key type)` triples
    keys: Vec<(String, String, DataType)>,
    schema: Schema,
    state: Option<BuildState>,
    pending: VecDeque<Row>,
    emitted_unmatched: bool,
}

struct BuildState {
    rows: Vec<(Row, bool)>,
    table: HashMap<Vec<Value>, Vec<usize>, RandomState>,
}

impl JoinExec {
    /// `kind` here is INNER, LEFT or FULL; a logical RIGHT join
    /// arrives with its inputs swapped by the physical planner
    pub fn new(
        probe: Box<dyn Operator>,
        build: Box<dyn Operator>,
        kind: JoinKind,
        keys: Vec<(String, String, DataType)>,
        schema: Schema,
    ) -> Self {
        Self {
            probe,
            build,
            kind,
            keys,
            schema,
            state: None,
            pending: VecDeque::new(),
            emitted_unmatched: false,
        }
    }

    /// The key values of a row, promoted to the common key types;
    /// `None` when any component is null (null never joins)
    fn key_of(
        row: &Row,
        columns: impl Iterator<Item = (String, DataType)>,
    ) -> Result<Option<Vec<Value>>> {
        let mut key = vec![];
        for (column, data_type) in columns {
            let value = row.get_or_null(&column);
            if value.is_null() {
                return Ok(None);
            }
            key.push(value.cast_to(&data_type)?);
        }
        Ok(Some(key))
    }

    fn probe_key(&self, row: &Row) -> Result<Option<Vec<Value>>> {
        Self::key_of(
            row,
            self.keys.iter().map(|(p, _, t)| (p.clone(), *t)),
        )
    }

    fn build_key(&self, row: &Row) -> Result<Option<Vec<Value>>> {
        Self::key_of(
            row,
            self.keys.iter().map(|(_, b, t)| (b.clone(), *t)),
        )
    }

    /// Assemble an output row in schema order from the two sides;
    /// a missing side null-extends
    fn combine(&self, probe: Option<&Row>, build: Option<&Row>) -> Row {
        let mut row = Row::new();
        for name in self.schema.names() {
            let value = probe
                .and_then(|r| r.get(name).cloned())
                .or_else(|| build.and_then(|r| r.get(name).cloned()))
                .unwrap_or(Value::Null);
            row.insert(name, value);
        }
        row
    }

    fn drain_build(&mut self) -> Result<BuildState> {
        let mut rows = vec![];
        let mut table: HashMap<Vec<Value>, Vec<usize>, RandomState> =
            HashMap::with_hasher(RandomState::new());
        while let Some(row) = self.build.next()? {
            let index = rows.len();
            if let Some(key) = self.build_key(&row)? {
                table.entry(key).or_default().push(index);
            }
            rows.push((row, false));
        }
        self.build.close();
        Ok(BuildState { rows, table })
    }
}

impl Operator for JoinExec {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    fn open(&mut self) -> Result<()> {
        self.probe.open()?;
        self.build.open()?;
        let state = self.drain_build()?;
        self.state = Some(state);
        Ok(())
    }

    fn next(&mut self) -> Result<Option<Row>> {
        loop {
            if let Some(row) = self.pending.pop_front() {
                return Ok(Some(row));
            }
            let Some(probe_row) = self.probe.next()? else {
                // probe exhausted: FULL OUTER still owes the unmatched
                // build rows
                if self.kind == JoinKind::Full && !self.emitted_unmatched {
                    self.emitted_unmatched = true;
                    let unmatched: Vec<Row> = {
                        let state = self.state.as_ref().expect("opened");
                        state
                            .rows
                            .iter()
                            .filter(|(_, matched)| !*matched)
                            .map(|(row, _)| self.combine(None, Some(row)))
                            .collect()
                    };
                    self.pending.extend(unmatched);
                    continue;
                }
                return Ok(None);
            };

            let key = self.probe_key(&probe_row)?;
            let matches: Vec<usize> = match &key {
                None => vec![],
                Some(key) => self
                    .state
                    .as_ref()
                    .expect("opened")
                    .table
                    .get(key)
                    .cloned()
                    .unwrap_or_default(),
            };

            if matches.is_empty() {
                if matches!(self.kind, JoinKind::Left | JoinKind::Full) {
                    return Ok(Some(self.combine(Some(&probe_row), None)));
                }
                continue;
            }

            let build_rows: Vec<Row> = {
                let state = self.state.as_mut().expect("opened");
                matches
                    .iter()
                    .map(|&index| {
                        state.rows[index].1 = true;
                        state.rows[index].0.clone()
                    })
                    .collect()
            };
            for build_row in &build_rows {
                self.pending
                    .push_back(self.combine(Some(&probe_row), Some(build_row)));
            }
        }
    }

    fn close(&mut self) {
        self.state = None;
        self.pending.clear();
        self.probe.close();
        self.build.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::execution::operator::Operator;
    use quarry_common::promote;

    /// A fixed-rows operator for driving the join directly
    struct RowsExec {
        schema: Schema,
        rows: VecDeque<Row>,
        closed: bool,
    }

    impl RowsExec {
        fn new(schema: Schema, rows: Vec<Row>) -> Self {
            Self {
                schema,
                rows: rows.into(),
                closed: false,
            }
        }
    }

    impl Operator for RowsExec {
        fn schema(&self) -> &Schema {
            &self.schema
        }

        fn open(&mut self) -> Result<()> {
            Ok(())
        }

        fn next(&mut self) -> Result<Option<Row>> {
            if self.closed {
                return quarry_common::internal_err!("next after close");
            }
            Ok(self.rows.pop_front())
        }

        fn close(&mut self) {
            self.closed = true;
        }
    }

    fn users() -> RowsExec {
        RowsExec::new(
            Schema::new([
                ("u.id", DataType::Integer),
                ("u.name", DataType::Utf8),
            ])
            .unwrap(),
            vec![
                Row::from_pairs([("u.id", Value::Integer(1)), ("u.name", Value::from("Alice"))]),
                Row::from_pairs([("u.id", Value::Integer(2)), ("u.name", Value::from("Bob"))]),
            ],
        )
    }

    fn orders() -> RowsExec {
        RowsExec::new(
            Schema::new([
                ("o.uid", DataType::Integer),
                ("o.amt", DataType::Integer),
            ])
            .unwrap(),
            vec![
                Row::from_pairs([("o.uid", Value::Integer(1)), ("o.amt", Value::Integer(100))]),
                Row::from_pairs([("o.uid", Value::Integer(1)), ("o.amt", Value::Integer(50))]),
                Row::from_pairs([("o.uid", Value::Integer(3)), ("o.amt", Value::Integer(999))]),
            ],
        )
    }

    fn join(kind: JoinKind) -> JoinExec {
        let probe = users();
        let build = orders();
        let schema = probe.schema.merge(&build.schema);
        JoinExec::new(
            Box::new(probe),
            Box::new(build),
            kind,
            vec![(
                "u.id".to_string(),
                "o.uid".to_string(),
                DataType::Integer,
            )],
            schema,
        )
    }

    fn run(mut exec: JoinExec) -> Vec<Row> {
        exec.open().unwrap();
        let mut rows = vec![];
        while let Some(row) = exec.next().unwrap() {
            rows.push(row);
        }
        exec.close();
        rows
    }

    #[test]
    fn inner_join_emits_matches_in_probe_order() {
        let rows = run(join(JoinKind::Inner));
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_or_null("u.name"), Value::from("Alice"));
        assert_eq!(rows[0].get_or_null("o.amt"), Value::Integer(100));
        assert_eq!(rows[1].get_or_null("o.amt"), Value::Integer(50));
    }

    #[test]
    fn left_join_null_extends_unmatched_probe_rows() {
        let rows = run(join(JoinKind::Left));
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[2].get_or_null("u.name"), Value::from("Bob"));
        assert_eq!(rows[2].get_or_null("o.amt"), Value::Null);
    }

    #[test]
    fn full_join_emits_unmatched_build_rows_after_probe() {
        let rows = run(join(JoinKind::Full));
        assert_eq!(rows.len(), 4);
        let last = &rows[3];
        assert_eq!(last.get_or_null("u.name"), Value::Null);
        assert_eq!(last.get_or_null("o.amt"), Value::Integer(999));
    }

    #[test]
    fn null_keys_never_match() {
        let probe = RowsExec::new(
            Schema::new([("a.k", DataType::Integer)]).unwrap(),
            vec![Row::from_pairs([("a.k", Value::Null)])],
        );
        let build = RowsExec::new(
            Schema::new([("b.k", DataType::Integer)]).unwrap(),
            vec![Row::from_pairs([("b.k", Value::Null)])],
        );
        let schema = probe.schema.merge(&build.schema);
        let mut exec = JoinExec::new(
            Box::new(probe),
            Box::new(build),
            JoinKind::Inner,
            vec![("a.k".to_string(), "b.k".to_string(), DataType::Integer)],
            schema,
        );
        exec.open().unwrap();
        assert!(exec.next().unwrap().is_none());
    }

    #[test]
    fn empty_keys_make_a_cross_product() {
        let probe = users();
        let build = orders();
        let schema = probe.schema.merge(&build.schema);
        let rows = run(JoinExec::new(
            Box::new(probe),
            Box::new(build),
            JoinKind::Inner,
            vec![],
            schema,
        ));
        assert_eq!(rows.len(), 6);
    }

    #[test]
    fn mixed_numeric_keys_join_through_promotion() {
        let probe = RowsExec::new(
            Schema::new([("a.k", DataType::Integer)]).unwrap(),
            vec![Row::from_pairs([("a.k", Value::Integer(1))])],
        );
        let build = RowsExec::new(
            Schema::new([("b.k", DataType::Float)]).unwrap(),
            vec![Row::from_pairs([("b.k", Value::Float(1.0))])],
        );
        let schema = probe.schema.merge(&build.schema);
        let common = promote(&DataType::Integer, &DataType::Float);
        let rows = run(JoinExec::new(
            Box::new(probe),
            Box::new(build),
            JoinKind::Inner,
            vec![("a.k".to_string(), "b.k".to_string(), common)],
            schema,
        ));
        assert_eq!(rows.len(), 1);
    }

    #[test]
    fn next_after_exhaustion_is_end() {
        let mut exec = join(JoinKind::Inner);
        exec.open().unwrap();
        while exec.next().unwrap().is_some() {}
        assert!(exec.next().unwrap().is_none());
    }
}
