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

//! JSON and JSONL readers. A JSON document loads whole and a fragment
//! selector (`a.b`, `a[0]`, one `a[]`) navigates to the target array
//! of objects. JSONL parses line by line, with malformed lines
//! surfacing as warnings; its string values go through the same text
//! inference the CSV reader uses.

use log::warn;
use quarry_common::{
    infer_common_type, infer_type_from_string, parse_string_as, DataType, QuarryError,
    ReaderOptions, Result, Row, Schema, Value, Warning,
};
use quarry_expr::SimplePredicate;
use serde_json::Value as JsonValue;

use crate::datasource::fetch::ByteSource;
use crate::datasource::reader::{project_row, row_matches, Reader};

type JsonObject = serde_json::Map<String, JsonValue>;

pub struct JsonReader {
    locator: String,
    source: ByteSource,
    selector: Option<String>,
    options: ReaderOptions,
    /// JSONL mode: line-delimited objects with text-style inference
    /// over string values
    lines_mode: bool,
    objects: Option<Vec<JsonObject>>,
    schema: Option<Schema>,
    required: Option<Vec<String>>,
    filters: Vec<SimplePredicate>,
    row_cap: Option<usize>,
    cursor: usize,
    emitted: usize,
    warnings: Vec<Warning>,
    closed: bool,
}

impl JsonReader {
    /// A whole-document JSON source, optionally navigated by a
    /// fragment selector
    pub fn document(
        locator: impl Into<String>,
        source: ByteSource,
        selector: Option<String>,
        options: ReaderOptions,
    ) -> Self {
        Self::new(locator, source, selector, options, false)
    }

    /// A line-delimited source
    pub fn lines(
        locator: impl Into<String>,
        source: ByteSource,
        options: ReaderOptions,
    ) -> Self {
        Self::new(locator, source, None, options, true)
    }

    fn new(
        locator: impl Into<String>,
        source: ByteSource,
        selector: Option<String>,
        options: ReaderOptions,
        lines_mode: bool,
    ) -> Self {
        Self {
            locator: locator.into(),
            source,
            selector,
            options,
            lines_mode,
            objects: None,
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

    fn warn(&mut self, message: String) {
        warn!("{}: {message}", self.locator);
        self.warnings.push(Warning {
            source: self.locator.clone(),
            message,
        });
    }

    fn load(&mut self) -> Result<()> {
        if self.objects.is_some() {
            return Ok(());
        }
        let bytes = self.source.read_all()?;
        let objects = if self.lines_mode {
            let text = String::from_utf8_lossy(&bytes).to_string();
            let mut objects = vec![];
            for (number, line) in text.lines().enumerate() {
                if line.trim().is_empty() {
                    continue;
                }
                match serde_json::from_str::<JsonValue>(line) {
                    Ok(JsonValue::Object(object)) => objects.push(object),
                    Ok(other) => self.warn(format!(
                        "line {}: expected an object, found {other}",
                        number + 1
                    )),
                    Err(e) => {
                        self.warn(format!("line {}: malformed JSON: {e}", number + 1))
                    }
                }
            }
            objects
        } else {
            let document: JsonValue = serde_json::from_slice(&bytes)
                .map_err(|e| QuarryError::Data(format!("{}: {e}", self.locator)))?;
            let rows = navigate(&document, self.selector.as_deref())
                .map_err(|e| match e {
                    QuarryError::Data(msg) => {
                        QuarryError::Data(format!("{}: {msg}", self.locator))
                    }
                    other => other,
                })?;
            let mut objects = vec![];
            for row in rows {
                match row {
                    JsonValue::Object(object) => objects.push(object),
                    other => {
                        return Err(QuarryError::Data(format!(
                            "{}: the selected array holds {other}, not objects",
                            self.locator
                        )))
                    }
                }
            }
            objects
        };
        self.objects = Some(objects);
        Ok(())
    }

    fn infer_schema(&mut self) -> Result<Schema> {
        self.load()?;
        let objects = self.objects.as_ref().expect("loaded");
        let sample = self.options.schema_sample_rows;
        let lines_mode = self.lines_mode;

        // keys union over the sample, in first-seen order
        let mut columns: Vec<String> = vec![];
        for object in objects.iter().take(sample) {
            for key in object.keys() {
                if !columns.iter().any(|c| c == key) {
                    columns.push(key.clone());
                }
            }
        }

        let mut schema = Schema::empty();
        for column in columns {
            let data_type = infer_common_type(objects.iter().take(sample).map(|o| {
                o.get(&column)
                    .map(|v| json_value_type(v, lines_mode))
                    .unwrap_or(DataType::Null)
            }));
            schema.push_field(column, data_type)?;
        }
        Ok(schema)
    }

    fn decode(&mut self, index: usize, schema: &Schema) -> Row {
        let object = &self.objects.as_ref().expect("loaded")[index];
        let mut row = Row::new();
        let mut bad_cells: Vec<String> = vec![];
        for (name, data_type) in schema.iter() {
            let value = match object.get(name) {
                None | Some(JsonValue::Null) => Value::Null,
                Some(json) => match json_to_value(json, data_type, self.lines_mode) {
                    Some(value) => value,
                    None => {
                        bad_cells.push(format!(
                            "row {index}: value {json} does not fit {data_type} \
                             column '{name}', using null"
                        ));
                        Value::Null
                    }
                },
            };
            row.insert(name, value);
        }
        for message in bad_cells {
            self.warn(message);
        }
        row
    }
}

impl Reader for JsonReader {
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
            if self.cursor >= self.objects.as_ref()?.len() {
                return None;
            }
            let index = self.cursor;
            self.cursor += 1;
            let row = self.decode(index, &schema);
            if !row_matches(&row, &self.filters) {
                continue;
            }
            self.emitted += 1;
            return Some(Ok(project_row(row, self.required.as_ref())));
        }
    }

    fn close(&mut self) {
        self.objects = None;
        self.closed = true;
    }

    fn take_warnings(&mut self) -> Vec<Warning> {
        std::mem::take(&mut self.warnings)
    }
}

/// The engine type a JSON value denotes. In lines mode string values
/// go through text inference, the way CSV cells do.
fn json_value_type(value: &JsonValue, lines_mode: bool) -> DataType {
    match value {
        JsonValue::Null => DataType::Null,
        JsonValue::Bool(_) => DataType::Boolean,
        JsonValue::Number(n) => {
            if n.is_i64() || n.is_u64() {
                DataType::Integer
            } else {
                DataType::Float
            }
        }
        JsonValue::String(s) if lines_mode => infer_type_from_string(s),
        JsonValue::String(_) => DataType::Utf8,
        JsonValue::Object(_) | JsonValue::Array(_) => DataType::Json,
    }
}

fn json_to_value(json: &JsonValue, target: &DataType, lines_mode: bool) -> Option<Value> {
    let native = match json {
        JsonValue::Null => Value::Null,
        JsonValue::Bool(b) => Value::Boolean(*b),
        JsonValue::Number(n) => {
            if let Some(i) = n.as_i64() {
                Value::Integer(i)
            } else {
                Value::Float(n.as_f64()?)
            }
        }
        JsonValue::String(s) => {
            if lines_mode {
                return parse_string_as(s, target);
            }
            Value::Utf8(s.clone())
        }
        JsonValue::Object(_) | JsonValue::Array(_) => Value::Json(json.clone()),
    };
    if native.data_type() == *target || native.is_null() {
        Some(native)
    } else {
        // later rows may be narrower than the sampled type; widen them
        native.cast_to(target).ok()
    }
}

/// Follow a fragment selector to the array of row objects. Segments
/// are dotted keys with an optional `[index]` or a single flattening
/// `[]`.
fn navigate(document: &JsonValue, selector: Option<&str>) -> Result<Vec<JsonValue>> {
    let mut current: Vec<JsonValue> = vec![document.clone()];
    let mut flattened = false;

    if let Some(path) = selector {
        if path.matches("[]").count() > 1 {
            return Err(QuarryError::Data(format!(
                "selector '{path}' uses [] more than once"
            )));
        }
        for segment in path.split('.') {
            let (key, suffix) = match segment.find('[') {
                Some(at) => (&segment[..at], Some(&segment[at..])),
                None => (segment, None),
            };
            if !key.is_empty() {
                current = current
                    .into_iter()
                    .map(|v| {
                        v.get(key).cloned().ok_or_else(|| {
                            QuarryError::Data(format!("selector key '{key}' not found"))
                        })
                    })
                    .collect::<Result<_>>()?;
            }
            match suffix {
                None => {}
                Some("[]") => {
                    flattened = true;
                    let mut next = vec![];
                    for v in current {
                        match v {
                            JsonValue::Array(items) => next.extend(items),
                            other => {
                                return Err(QuarryError::Data(format!(
                                    "selector '{segment}' flattens {other}, not an array"
                                )))
                            }
                        }
                    }
                    current = next;
                }
                Some(indexed) => {
                    let index: i64 = indexed
                        .strip_prefix('[')
                        .and_then(|s| s.strip_suffix(']'))
                        .and_then(|s| s.parse().ok())
                        .ok_or_else(|| {
                            QuarryError::Data(format!(
                                "selector segment '{segment}' is malformed"
                            ))
                        })?;
                    current = current
                        .into_iter()
                        .map(|v| match &v {
                            JsonValue::Array(items) => {
                                let at = resolve_index(index, items.len())?;
                                Ok(items[at].clone())
                            }
                            other => Err(QuarryError::Data(format!(
                                "selector indexes into {other}, not an array"
                            ))),
                        })
                        .collect::<Result<_>>()?;
                }
            }
        }
    }

    // the selector must land on an array of rows: either the single
    // selected array, or the objects a [] already flattened out
    if !flattened {
        match current.as_slice() {
            [JsonValue::Array(items)] => return Ok(items.clone()),
            _ => {
                return Err(QuarryError::Data(
                    "the selected value is not an array".to_string(),
                ))
            }
        }
    }
    if current.iter().all(|v| v.is_array()) {
        let mut rows = vec![];
        for v in current {
            if let JsonValue::Array(items) = v {
                rows.extend(items);
            }
        }
        return Ok(rows);
    }
    Ok(current)
}

/// Negative indices count from the end
fn resolve_index(index: i64, len: usize) -> Result<usize> {
    let resolved = if index < 0 {
        index + len as i64
    } else {
        index
    };
    if resolved < 0 || resolved as usize >= len {
        return Err(QuarryError::Data(format!(
            "index {index} is out of bounds for an array of {len}"
        )));
    }
    Ok(resolved as usize)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::locator::resolve;
    use serde_json::json;
    use std::io::Write;

    fn source_of(content: &str) -> (tempfile::NamedTempFile, ByteSource) {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(content.as_bytes()).unwrap();
        let locator = file.path().to_str().unwrap().to_string();
        let source = ByteSource::new(&resolve(&locator).unwrap()).unwrap();
        (file, source)
    }

    fn collect(reader: &mut JsonReader) -> Vec<Row> {
        std::iter::from_fn(|| reader.next_row())
            .map(|r| r.unwrap())
            .collect()
    }

    #[test]
    fn nested_path_selects_the_array() {
        let (_file, source) =
            source_of(r#"{"data":{"users":[{"n":"A"},{"n":"B"}]}}"#);
        let mut reader = JsonReader::document(
            "api.json",
            source,
            Some("data.users".to_string()),
            ReaderOptions::default(),
        );
        let rows = collect(&mut reader);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].get_or_null("n"), Value::Utf8("A".to_string()));
        assert_eq!(rows[1].get_or_null("n"), Value::Utf8("B".to_string()));
    }

    #[test]
    fn index_and_flatten_segments() {
        let document = json!({
            "batches": [
                {"items": [{"v": 1}, {"v": 2}]},
                {"items": [{"v": 3}]}
            ]
        });
        let rows = navigate(&document, Some("batches[0].items")).unwrap();
        assert_eq!(rows.len(), 2);

        let rows = navigate(&document, Some("batches[].items")).unwrap();
        assert_eq!(rows.len(), 3);

        let rows = navigate(&document, Some("batches[-1].items")).unwrap();
        assert_eq!(rows.len(), 1);

        let err = navigate(&document, Some("batches[].items[]")).unwrap_err();
        assert!(err.to_string().contains("more than once"));
    }

    #[test]
    fn target_must_be_an_array_of_objects() {
        let (_file, source) = source_of(r#"{"data": {"x": 1}}"#);
        let mut reader = JsonReader::document(
            "api.json",
            source,
            Some("data".to_string()),
            ReaderOptions::default(),
        );
        assert!(reader.schema().is_err());
    }

    #[test]
    fn nested_values_become_json_columns() {
        let (_file, source) = source_of(
            r#"[{"id": 1, "tags": ["a", "b"], "meta": {"k": "v"}}]"#,
        );
        let mut reader =
            JsonReader::document("t.json", source, None, ReaderOptions::default());
        let schema = reader.schema().unwrap();
        assert_eq!(schema.field_type("tags"), Some(&DataType::Json));
        assert_eq!(schema.field_type("meta"), Some(&DataType::Json));
        let rows = collect(&mut reader);
        assert_eq!(rows[0].get_or_null("tags"), Value::Json(json!(["a", "b"])));
    }

    #[test]
    fn jsonl_skips_malformed_lines_with_warnings() {
        let (_file, source) = source_of(
            "{\"id\": 1}\nnot json at all\n{\"id\": 3}\n",
        );
        let mut reader =
            JsonReader::lines("t.jsonl", source, ReaderOptions::default());
        let rows = collect(&mut reader);
        assert_eq!(rows.len(), 2);
        let warnings = reader.take_warnings();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].message.contains("line 2"));
    }

    #[test]
    fn jsonl_infers_types_inside_strings() {
        let (_file, source) = source_of(
            "{\"day\": \"2023-04-01\", \"n\": 1}\n{\"day\": \"2023-04-02\", \"n\": 2}\n",
        );
        let mut reader =
            JsonReader::lines("t.jsonl", source, ReaderOptions::default());
        let schema = reader.schema().unwrap();
        assert_eq!(schema.field_type("day"), Some(&DataType::Date));
    }

    #[test]
    fn numbers_widen_to_the_sampled_type() {
        let (_file, source) = source_of(r#"[{"v": 1.5}, {"v": 2}]"#);
        let mut reader =
            JsonReader::document("t.json", source, None, ReaderOptions::default());
        let rows = collect(&mut reader);
        assert_eq!(rows[1].get_or_null("v"), Value::Float(2.0));
    }
}
