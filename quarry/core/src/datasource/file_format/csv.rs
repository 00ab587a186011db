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

//! Streaming CSV reader. The header row is mandatory and the
//! delimiter is a comma; types come from sampling the leading rows.
//! Malformed rows degrade to nulls with a warning instead of failing
//! the query.

use std::io::Read;

use log::warn;
use quarry_common::{
    infer_common_type, infer_type_from_string, parse_string_as, QuarryError,
    ReaderOptions, Result, Row, Schema, Value, Warning,
};
use quarry_expr::SimplePredicate;

use crate::datasource::fetch::ByteSource;
use crate::datasource::reader::{project_row, row_matches, Reader};

pub struct CsvReader {
    locator: String,
    source: ByteSource,
    options: ReaderOptions,
    schema: Option<Schema>,
    required: Option<Vec<String>>,
    filters: Vec<SimplePredicate>,
    row_cap: Option<usize>,
    emitted: usize,
    records: Option<csv::StringRecordsIntoIter<Box<dyn Read + Send>>>,
    /// 1-based data row number, for warnings
    line: u64,
    warnings: Vec<Warning>,
    closed: bool,
}

impl CsvReader {
    pub fn new(locator: impl Into<String>, source: ByteSource, options: ReaderOptions) -> Self {
        Self {
            locator: locator.into(),
            source,
            options,
            schema: None,
            required: None,
            filters: vec![],
            row_cap: None,
            emitted: 0,
            records: None,
            line: 0,
            warnings: vec![],
            closed: false,
        }
    }

    fn open_csv(&self) -> Result<csv::Reader<Box<dyn Read + Send>>> {
        Ok(csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(self.source.open_reader()?))
    }

    fn infer_schema(&self) -> Result<Schema> {
        let mut reader = self.open_csv()?;
        let headers: Vec<String> = reader
            .headers()
            .map_err(|e| QuarryError::io(self.locator.clone(), e))?
            .iter()
            .map(|h| h.trim().to_string())
            .collect();
        if headers.is_empty() {
            return Err(QuarryError::Data(format!(
                "'{}' has no header row",
                self.locator
            )));
        }

        // sample the leading rows column by column
        let mut samples: Vec<Vec<quarry_common::DataType>> =
            vec![vec![]; headers.len()];
        for record in reader.records().take(self.options.schema_sample_rows) {
            let Ok(record) = record else {
                continue;
            };
            for (index, samples) in samples.iter_mut().enumerate() {
                if let Some(cell) = record.get(index) {
                    samples.push(infer_type_from_string(cell));
                }
            }
        }

        let mut schema = Schema::empty();
        for (header, samples) in headers.into_iter().zip(samples) {
            schema.push_field(header, infer_common_type(samples))?;
        }
        Ok(schema)
    }

    fn warn(&mut self, message: String) {
        warn!("{}: {message}", self.locator);
        self.warnings.push(Warning {
            source: self.locator.clone(),
            message,
        });
    }

    fn decode_record(&mut self, record: &csv::StringRecord, schema: &Schema) -> Row {
        if record.len() != schema.len() {
            self.warn(format!(
                "row {}: expected {} fields, found {}",
                self.line,
                schema.len(),
                record.len()
            ));
        }
        let mut row = Row::new();
        for (index, (name, data_type)) in schema.iter().enumerate() {
            let value = match record.get(index) {
                None => Value::Null,
                Some(cell) => match parse_string_as(cell, data_type) {
                    Some(value) => value,
                    None => {
                        let line = self.line;
                        self.warn(format!(
                            "row {line}: cell '{cell}' is not a valid {data_type} \
                             for column '{name}', using null"
                        ));
                        Value::Null
                    }
                },
            };
            row.insert(name, value);
        }
        row
    }
}

impl Reader for CsvReader {
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
        // filters run post-parse, pre-emit, so all of them are honored
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
        if self.records.is_none() {
            match self.open_csv() {
                Ok(reader) => self.records = Some(reader.into_records()),
                Err(e) => return Some(Err(e)),
            }
        }
        loop {
            if self.row_cap.is_some_and(|cap| self.emitted >= cap) {
                return None;
            }
            let record = match self.records.as_mut()?.next()? {
                Ok(record) => record,
                Err(e) => match e.kind() {
                    // a read failure is terminal, a malformed record is
                    // only a warning
                    csv::ErrorKind::Io(_) => {
                        return Some(Err(QuarryError::io(self.locator.clone(), e)))
                    }
                    _ => {
                        self.line += 1;
                        let line = self.line;
                        self.warn(format!("row {line}: skipping malformed record: {e}"));
                        continue;
                    }
                },
            };
            self.line += 1;

            let row = self.decode_record(&record, &schema);
            if !row_matches(&row, &self.filters) {
                continue;
            }
            self.emitted += 1;
            return Some(Ok(project_row(row, self.required.as_ref())));
        }
    }

    fn close(&mut self) {
        self.records = None;
        self.closed = true;
    }

    fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::locator::resolve;
    use quarry_common::DataType;
    use quarry_expr::CompareOp;
    use std::io::Write;

    fn csv_source(content: &str) -> (tempfile::NamedTempFile, CsvReader) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let locator = file.path().to_str().unwrap().to_string();
        let source = ByteSource::new(&resolve(&locator).unwrap()).unwrap();
        let reader = CsvReader::new(locator, source, ReaderOptions::default());
        (file, reader)
    }

    fn collect(reader: &mut CsvReader) -> Vec<Row> {
        std::iter::from_fn(|| reader.next_row())
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn infers_schema_from_samples() {
        let (_file, mut reader) = csv_source(
            "id,name,age,score\n1,Alice,30,1.5\n2,Bob,20,2.25\n",
        );
        let schema = reader.schema().unwrap();
        assert_eq!(
            schema.to_string(),
            "id: integer, name: utf8, age: integer, score: float"
        );
        // schema inference is idempotent
        assert_eq!(reader.schema().unwrap(), schema);
    }

    #[test]
    fn reads_rows_in_file_order() {
        let (_file, mut reader) =
            csv_source("id,name\n1,Alice\n2,Bob\n3,Cara\n");
        let rows = collect(&mut reader);
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].get_or_null("id"), Value::Integer(1));
        assert_eq!(rows[2].get_or_null("name"), Value::Utf8("Cara".to_string()));
    }

    #[test]
    fn malformed_rows_degrade_to_nulls() {
        let (_file, mut reader) = csv_source(
            "id,age\n1,30\n2,notanumber\n3\n4,40\n",
        );
        let rows = collect(&mut reader);
        assert_eq!(rows.len(), 4);
        assert_eq!(rows[1].get_or_null("age"), Value::Null);
        assert_eq!(rows[2].get_or_null("age"), Value::Null);
        let warnings = reader.take_warnings();
        assert!(warnings.len() >= 2);
    }

    #[test]
    fn filters_and_cap_apply_at_the_reader() {
        let (_file, mut reader) = csv_source(
            "id,age\n1,30\n2,20\n3,25\n4,35\n",
        );
        let consumed = reader.set_pushdown_filters(&[SimplePredicate {
            column: "age".to_string(),
            op: CompareOp::GtEq,
            value: Value::Integer(25),
        }]);
        assert_eq!(consumed, vec![0]);
        reader.set_row_cap(2);
        let rows = collect(&mut reader);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_or_null("id"), Value::Integer(1));
        assert_eq!(rows[1].get_or_null("id"), Value::Integer(3));
    }

    #[test]
    fn required_columns_narrow_the_rows() {
        let (_file, mut reader) =
            csv_source("id,name,age\n1,Alice,30\n");
        reader.set_required_columns(&["name".to_string()]);
        let rows = collect(&mut reader);
        assert_eq!(rows[0].columns().collect::<Vec<_>>(), vec!["name"]);
    }

    #[test]
    fn null_tokens_are_null_in_typed_columns() {
        let (_file, mut reader) =
            csv_source("id,age\n1,30\n2,n/a\n3,-\n");
        let schema = reader.schema().unwrap();
        assert_eq!(schema.field_type("age"), Some(&DataType::Integer));
        let rows = collect(&mut reader);
        assert_eq!(rows[1].get_or_null("age"), Value::Null);
        assert_eq!(rows[2].get_or_null("age"), Value::Null);
        // no warnings for recognized null tokens
        assert!(reader.take_warnings().is_empty());
    }
}
