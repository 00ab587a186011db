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

//! The reader contract every format implements, plus the shared
//! machinery for sources that materialize into a table of text cells
//! (HTML, Markdown, XML)

use log::warn;
use quarry_common::{
    infer_common_type, infer_type_from_string, parse_string_as, ReaderOptions, Result,
    Row, Schema, Value, Warning,
};
use quarry_expr::SimplePredicate;

/// A lazy row producer for one source instance.
///
/// Hints are declarative: a reader SHOULD return only the required
/// columns but MAY include extras; it MUST honor an accepted pushdown
/// filter and an installed row cap. `next_row` is non-restartable and
/// `close` may arrive before the stream has ended.
pub trait Reader {
    /// The inferred or decoded schema; sampled on first call and
    /// cached after
    fn schema(&mut self) -> Result<Schema>;

    /// Names of the partition columns this reader synthesizes, empty
    /// for unpartitioned sources
    fn partition_columns(&mut self) -> Vec<String> {
        vec![]
    }

    fn set_required_columns(&mut self, columns: &[String]);

    /// Install pushdown filters, returning the indices of the filters
    /// this reader will enforce; the executor re-applies the rest
    fn set_pushdown_filters(&mut self, filters: &[SimplePredicate]) -> Vec<usize>;

    /// Emit at most `cap` rows
    fn set_row_cap(&mut self, cap: usize);

    /// Predicates over partition columns, evaluated before opening the
    /// underlying files. Ignored by unpartitioned readers.
    fn set_partition_filters(&mut self, _filters: &[SimplePredicate]) {}

    /// The next row, or `None` at end of stream
    fn next_row(&mut self) -> Option<Result<Row>>;

    /// Release the reader's resources; idempotent
    fn close(&mut self);

    /// Drain the recoverable warnings collected so far
    fn take_warnings(&mut self) -> Vec<Warning> {
        vec![]
    }
}

/// Whether a row passes every given filter (nulls never match)
pub(crate) fn row_matches(row: &Row, filters: &[SimplePredicate]) -> bool {
    filters
        .iter()
        .all(|f| f.evaluate(&row.get_or_null(&f.column)))
}

/// Narrow a row to the required columns, preserving the row's own
/// column order
pub(crate) fn project_row(row: Row, required: Option<&Vec<String>>) -> Row {
    match required {
        None => row,
        Some(required) => Row::from_pairs(
            row.into_iter()
                .filter(|(name, _)| required.iter().any(|r| r == name)),
        ),
    }
}

/// A materialized table of optional text cells, the common shape HTML,
/// Markdown and XML sources decode into
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TextTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Option<String>>>,
}

/// Shared [`Reader`] over a [`TextTable`]: samples for the schema,
/// parses cells per column type with null degradation, and applies
/// the pushdown hints post-parse
pub struct TextTableReader {
    locator: String,
    table: TextTable,
    options: ReaderOptions,
    schema: Option<Schema>,
    required: Option<Vec<String>>,
    filters: Vec<SimplePredicate>,
    row_cap: Option<usize>,
    cursor: usize,
    emitted: usize,
    warnings: Vec<Warning>,
    closed: bool,
}

impl TextTableReader {
    pub fn new(locator: impl Into<String>, table: TextTable, options: ReaderOptions) -> Self {
        Self {
            locator: locator.into(),
            table,
            options,
            schema: None,
            required: None,
            filters: vec![],
            row_cap: None,
            cursor: 0,
            emitted: 0,
            warnings: vec![],
            closed: false,
        }
    }

    fn infer_schema(&self) -> Result<Schema> {
        let sample = self.options.schema_sample_rows;
        let mut schema = Schema::empty();
        for (index, column) in self.table.columns.iter().enumerate() {
            let data_type = infer_common_type(
                self.table
                    .rows
                    .iter()
                    .take(sample)
                    .map(|row| match row.get(index).and_then(|c| c.as_deref()) {
                        Some(cell) => infer_type_from_string(cell),
                        None => quarry_common::DataType::Null,
                    }),
            );
            schema.push_field(column.clone(), data_type)?;
        }
        Ok(schema)
    }
}

impl Reader for TextTableReader {
    fn schema(&mut self) -> Result<Schema> {
        if self.schema.is_none() {
            self.schema = Some(self.infer_schema()?);
        }
        Ok(self.schema.clone().expect("schema cached above"))
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: &[SimplePredicate]) -> Vec<usize> {
        self.filters = filters.to_vec();
        // everything is evaluated post-parse, so everything is accepted
        (0..filters.len()).collect()
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn next_row(&mut self) -> Option<Result<Row>> {
        if self.closed {
            return None;
        }
        let schema = match self.schema() {
            Ok(schema) => schema,
            Err(e) => return Some(Err(e)),
        };
        loop {
            if self.row_cap.is_some_and(|cap| self.emitted >= cap) {
                return None;
            }
            let cells = self.table.rows.get(self.cursor)?;
            let line = self.cursor;
            self.cursor += 1;

            let mut row = Row::new();
            for (index, (name, data_type)) in schema.iter().enumerate() {
                let value = match cells.get(index).and_then(|c| c.as_deref()) {
                    None => Value::Null,
                    Some(cell) => match parse_string_as(cell, data_type) {
                        Some(value) => value,
                        None => {
                            let message = format!(
                                "row {line}: cell '{cell}' is not a valid {data_type} \
                                 for column '{name}', using null"
                            );
                            warn!("{}: {message}", self.locator);
                            self.warnings.push(Warning {
                                source: self.locator.clone(),
                                message,
                            });
                            Value::Null
                        }
                    },
                };
                row.insert(name, value);
            }

            if !row_matches(&row, &self.filters) {
                continue;
            }
            self.emitted += 1;
            return Some(Ok(project_row(row, self.required.as_ref())));
        }
    }

    fn close(&mut self) {
        self.closed = true;
    }

    fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::DataType;
    use quarry_expr::CompareOp;

    fn table() -> TextTable {
        TextTable {
            columns: vec!["name".to_string(), "age".to_string()],
            rows: vec![
                vec![Some("Alice".to_string()), Some("30".to_string())],
                vec![Some("Bob".to_string()), Some("twenty".to_string())],
                vec![Some("Cara".to_string()), None],
            ],
        }
    }

    #[test]
    fn samples_schema_and_degrades_bad_cells() {
        let mut reader =
            TextTableReader::new("t.html", table(), ReaderOptions::default());
        let schema = reader.schema().unwrap();
        // the "twenty" sample promotes the age column to utf8
        assert_eq!(schema.field_type("age"), Some(&DataType::Utf8));
    }

    #[test]
    fn bad_cell_for_inferred_type_becomes_null_with_warning() {
        let mut t = table();
        // make the sample window miss the bad cell so the column
        // stays integer
        t.rows[1][1] = Some("20".to_string());
        t.rows.push(vec![Some("Dan".to_string()), Some("oops".to_string())]);
        let mut reader = TextTableReader::new("t.html", t, ReaderOptions {
            schema_sample_rows: 2,
        });
        let rows: Vec<Row> = std::iter::from_fn(|| reader.next_row())
            .map(|r| r.unwrap())
            .collect();
        assert_eq!(rows[3].get_or_null("age"), Value::Null);
        let warnings = reader.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("'oops'"));
    }

    #[test]
    fn cap_counts_filtered_rows() {
        let mut reader =
            TextTableReader::new("t.html", table(), ReaderOptions::default());
        reader.set_pushdown_filters(&[SimplePredicate {
            column: "name".to_string(),
            op: CompareOp::NotEq,
            value: Value::Utf8("Alice".to_string()),
        }]);
        reader.set_row_cap(1);
        let row = reader.next_row().unwrap().unwrap();
        assert_eq!(row.get_or_null("name"), Value::Utf8("Bob".to_string()));
        assert!(reader.next_row().is_none());
    }

    #[test]
    fn close_before_end_is_safe() {
        let mut reader =
            TextTableReader::new("t.html", table(), ReaderOptions::default());
        assert!(reader.next_row().is_some());
        reader.close();
        assert!(reader.next_row().is_none());
    }
}
