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

//! HTML table reader: the `:index` selector picks the n-th `<table>`
//! (negative indices count from the end), column names come from the
//! header row, and cell types are inferred from the text contents

use quarry_common::{QuarryError, ReaderOptions, Result};
use scraper::{ElementRef, Html, Selector};

use crate::datasource::fetch::ByteSource;
use crate::datasource::reader::{TextTable, TextTableReader};

/// Resolve a possibly negative table/element index selector
pub(crate) fn pick_index(selector: Option<&str>, len: usize, what: &str) -> Result<usize> {
    let index: i64 = match selector {
        None => 0,
        Some(text) => text.parse().map_err(|_| {
            QuarryError::Data(format!("'{text}' is not a valid {what} index"))
        })?,
    };
    let resolved = if index < 0 { index + len as i64 } else { index };
    if resolved < 0 || resolved as usize >= len {
        return Err(QuarryError::Data(format!(
            "{what} index {index} is out of bounds, the document has {len}"
        )));
    }
    Ok(resolved as usize)
}

pub fn open(
    locator: impl Into<String>,
    source: ByteSource,
    selector: Option<String>,
    options: ReaderOptions,
) -> Result<TextTableReader> {
    let locator = locator.into();
    let text = String::from_utf8_lossy(&source.read_all()?).to_string();
    let table = parse_table(&text, selector.as_deref())
        .map_err(|e| match e {
            QuarryError::Data(msg) => QuarryError::Data(format!("{locator}: {msg}")),
            other => other,
        })?;
    Ok(TextTableReader::new(locator, table, options))
}

fn parse_table(text: &str, selector: Option<&str>) -> Result<TextTable> {
    let document = Html::parse_document(text);
    let table_selector = Selector::parse("table").expect("static selector");
    let row_selector = Selector::parse("tr").expect("static selector");
    let cell_selector = Selector::parse("th, td").expect("static selector");

    let tables: Vec<ElementRef> = document.select(&table_selector).collect();
    if tables.is_empty() {
        return Err(QuarryError::Data("no <table> in the document".to_string()));
    }
    let table = tables[pick_index(selector, tables.len(), "table")?];

    let mut rows = table.select(&row_selector);
    let Some(header) = rows.next() else {
        return Err(QuarryError::Data("the table has no rows".to_string()));
    };
    let columns: Vec<String> = header
        .select(&cell_selector)
        .map(|cell| cell_text(&cell))
        .collect();
    if columns.is_empty() {
        return Err(QuarryError::Data("the table has no header row".to_string()));
    }

    let data = rows
        .map(|row| {
            row.select(&cell_selector)
                .map(|cell| Some(cell_text(&cell)))
                .collect()
        })
        .collect();

    Ok(TextTable {
        columns,
        rows: data,
    })
}

fn cell_text(cell: &ElementRef) -> String {
    cell.text().collect::<String>().trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::{DataType, Row, Value};

    const PAGE: &str = r#"
        <html><body>
        <table>
          <tr><th>name</th><th>age</th></tr>
          <tr><td>Alice</td><td>30</td></tr>
          <tr><td>Bob</td><td>n/a</td></tr>
        </table>
        <table>
          <tr><th>k</th></tr>
          <tr><td>x</td></tr>
        </table>
        </body></html>
    "#;

    #[test]
    fn header_and_inference() {
        let table = parse_table(PAGE, None).unwrap();
        assert_eq!(table.columns, vec!["name", "age"]);

        let mut reader =
            TextTableReader::new("page.html", table, ReaderOptions::default());
        use crate::datasource::reader::Reader;
        let schema = reader.schema().unwrap();
        assert_eq!(schema.field_type("age"), Some(&DataType::Integer));
        let rows: Vec<Row> = std::iter::from_fn(|| reader.next_row())
            .map(|r| r.unwrap())
            .collect();
        // "n/a" is a recognized null token
        assert_eq!(rows[1].get_or_null("age"), Value::Null);
    }

    #[test]
    fn negative_index_counts_from_the_end() {
        let table = parse_table(PAGE, Some("-1")).unwrap();
        assert_eq!(table.columns, vec!["k"]);
        let table = parse_table(PAGE, Some("1")).unwrap();
        assert_eq!(table.columns, vec!["k"]);
    }

    #[test]
    fn out_of_bounds_index_errors() {
        let err = parse_table(PAGE, Some("5")).unwrap_err();
        assert!(err.to_string().contains("out of bounds"));
        let err = parse_table("<p>plain</p>", None).unwrap_err();
        assert!(err.to_string().contains("no <table>"));
    }
}
