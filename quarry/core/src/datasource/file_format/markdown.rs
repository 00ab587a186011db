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

//! Markdown pipe-table reader. A table is a header line over a
//! `|---|` separator line; `\|` escapes a pipe inside a cell.

use quarry_common::{QuarryError, ReaderOptions, Result};
use regex::Regex;

use crate::datasource::fetch::ByteSource;
use crate::datasource::file_format::html::pick_index;
use crate::datasource::reader::{TextTable, TextTableReader};

/// The separator row under a table header: cells of dashes with
/// optional alignment colons
pub(crate) fn separator_regex() -> Regex {
    Regex::new(r"^\s*\|?\s*:?-{3,}:?\s*(\|\s*:?-{3,}:?\s*)*\|?\s*$")
        .expect("static regex")
}

pub fn open(
    locator: impl Into<String>,
    source: ByteSource,
    selector: Option<String>,
    options: ReaderOptions,
) -> Result<TextTableReader> {
    let locator = locator.into();
    let text = String::from_utf8_lossy(&source.read_all()?).to_string();
    let mut tables = find_tables(&text);
    if tables.is_empty() {
        return Err(QuarryError::Data(format!(
            "{locator}: no pipe table in the document"
        )));
    }
    let index = pick_index(selector.as_deref(), tables.len(), "table")
        .map_err(|e| match e {
            QuarryError::Data(msg) => QuarryError::Data(format!("{locator}: {msg}")),
            other => other,
        })?;
    let table = tables.swap_remove(index);
    Ok(TextTableReader::new(locator, table, options))
}

/// Split a table line into trimmed cells, honoring `\|` escapes; the
/// escaped pipe stays in the cell text as a literal pipe
pub(crate) fn split_row(line: &str) -> Vec<String> {
    let mut cells = vec![];
    let mut cell = String::new();
    let mut chars = line.chars().peekable();
    while let Some(c) = chars.next() {
        match c {
            '\\' if chars.peek() == Some(&'|') => {
                chars.next();
                cell.push('|');
            }
            '|' => {
                cells.push(cell.trim().to_string());
                cell.clear();
            }
            other => cell.push(other),
        }
    }
    cells.push(cell.trim().to_string());
    cells
}

fn find_tables(text: &str) -> Vec<TextTable> {
    let separator = separator_regex();
    let lines: Vec<&str> = text.lines().collect();
    let mut tables = vec![];
    let mut at = 0;
    while at + 1 < lines.len() {
        if lines[at].contains('|') && separator.is_match(lines[at + 1]) {
            let columns = trim_boundary(split_row(lines[at]));
            let mut rows = vec![];
            let mut end = at + 2;
            while end < lines.len() && lines[end].contains('|') {
                let cells = trim_boundary(split_row(lines[end]));
                rows.push(cells.into_iter().map(Some).collect());
                end += 1;
            }
            tables.push(TextTable { columns, rows });
            at = end;
        } else {
            at += 1;
        }
    }
    tables
}

/// Leading/trailing empty cells produced by boundary pipes are not
/// data
fn trim_boundary(mut cells: Vec<String>) -> Vec<String> {
    if cells.first().is_some_and(|c| c.is_empty()) {
        cells.remove(0);
    }
    if cells.last().is_some_and(|c| c.is_empty()) {
        cells.pop();
    }
    cells
}
