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

//! XML reader: the `:element` selector names the repeating element
//! that forms a row, auto-detected when omitted. Attributes of the
//! row element become `@name` columns; nested children flatten into
//! dot-joined column names.

use quick_xml::events::Event;
use quarry_common::{QuarryError, ReaderOptions, Result};

use crate::datasource::fetch::ByteSource;
use crate::datasource::reader::{TextTable, TextTableReader};

#[derive(Debug, Default, Clone)]
struct XmlElement {
    name: String,
    attributes: Vec<(String, String)>,
    children: Vec<XmlElement>,
    text: String,
}

impl XmlElement {
    fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }
}

pub fn open(
    locator: impl Into<String>,
    source: ByteSource,
    selector: Option<String>,
    options: ReaderOptions,
) -> Result<TextTableReader> {
    let locator = locator.into();
    let text = String::from_utf8_lossy(&source.read_all()?).to_string();
    let root = parse_document(&text)
        .map_err(|e| QuarryError::Data(format!("{locator}: {e}")))?;

    let row_name = match selector {
        Some(name) => name,
        None => detect_row_element(&root).ok_or_else(|| {
            QuarryError::Data(format!(
                "{locator}: no repeating element to use as rows"
            ))
        })?,
    };
    let mut rows = vec![];
    collect_by_name(&root, &row_name, &mut rows);
    if rows.is_empty() {
        return Err(QuarryError::Data(format!(
            "{locator}: no <{row_name}> elements in the document"
        )));
    }

    Ok(TextTableReader::new(locator, build_table(&rows), options))
}

fn parse_document(text: &str) -> std::result::Result<XmlElement, quick_xml::Error> {
    let mut reader = quick_xml::Reader::from_str(text);
    let mut stack: Vec<XmlElement> = vec![XmlElement {
        name: String::new(),
        ..Default::default()
    }];
    loop {
        match reader.read_event()? {
            Event::Start(start) => {
                let mut element = XmlElement {
                    name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
                    ..Default::default()
                };
                for attribute in start.attributes().flatten() {
                    let key =
                        String::from_utf8_lossy(attribute.key.as_ref()).to_string();
                    let value = attribute
                        .unescape_value()
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    element.attributes.push((key, value));
                }
                stack.push(element);
            }
            Event::Empty(start) => {
                let mut element = XmlElement {
                    name: String::from_utf8_lossy(start.name().as_ref()).to_string(),
                    ..Default::default()
                };
                for attribute in start.attributes().flatten() {
                    let key =
                        String::from_utf8_lossy(attribute.key.as_ref()).to_string();
                    let value = attribute
                        .unescape_value()
                        .map(|v| v.to_string())
                        .unwrap_or_default();
                    element.attributes.push((key, value));
                }
                let parent = stack.last_mut().expect("root frame");
                parent.children.push(element);
            }
            Event::Text(text) => {
                let element = stack.last_mut().expect("root frame");
                element.text.push_str(&text.unescape()?);
            }
            Event::CData(data) => {
                let element = stack.last_mut().expect("root frame");
                element
                    .text
                    .push_str(&String::from_utf8_lossy(&data.into_inner()));
            }
            Event::End(_) => {
                let element = stack.pop().expect("balanced document");
                let parent = stack.last_mut().expect("root frame");
                parent.children.push(element);
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(stack.pop().expect("root frame"))
}

/// The most common direct-child element name at the deepest level
/// that repeats at least twice
fn detect_row_element(root: &XmlElement) -> Option<String> {
    fn walk(
        element: &XmlElement,
        depth: usize,
        best: &mut Option<(usize, usize, String)>,
    ) {
        let mut counts: Vec<(&str, usize)> = vec![];
        for child in &element.children {
            match counts.iter_mut().find(|(name, _)| *name == child.name) {
                Some((_, count)) => *count += 1,
                None => counts.push((&child.name, 1)),
            }
        }
        for (name, count) in counts {
            if count < 2 {
                continue;
            }
            let candidate = (depth, count, name.to_string());
            let better = match best.as_ref() {
                None => true,
                Some((best_depth, best_count, _)) => {
                    depth > *best_depth || (depth == *best_depth && count > *best_count)
                }
            };
            if better {
                *best = Some(candidate);
            }
        }
        for child in &element.children {
            walk(child, depth + 1, best);
        }
    }

    let mut best = None;
    walk(root, 0, &mut best);
    best.map(|(_, _, name)| name)
}

fn collect_by_name<'a>(
    element: &'a XmlElement,
    name: &str,
    out: &mut Vec<&'a XmlElement>,
) {
    for child in &element.children {
        if child.name == name {
            out.push(child);
        } else {
            collect_by_name(child, name, out);
        }
    }
}

/// Flatten each row element into `(column, value)` cells: `@attr`
/// columns first, then children with nested names dot-joined
fn flatten_row(element: &XmlElement, out: &mut Vec<(String, String)>) {
    for (key, value) in &element.attributes {
        out.push((format!("@{key}"), value.clone()));
    }
    for child in &element.children {
        flatten_child(child, &child.name, out);
    }
}

fn flatten_child(element: &XmlElement, prefix: &str, out: &mut Vec<(String, String)>) {
    if element.is_leaf() {
        out.push((prefix.to_string(), element.text.trim().to_string()));
    } else {
        for child in &element.children {
            flatten_child(child, &format!("{prefix}.{}", child.name), out);
        }
    }
}

fn build_table(rows: &[&XmlElement]) -> TextTable {
    // the column set is the union over all rows, in first-seen order
    let mut columns: Vec<String> = vec![];
    let mut flattened: Vec<Vec<(String, String)>> = vec![];
    for row in rows {
        let mut cells = vec![];
        flatten_row(row, &mut cells);
        for (name, _) in &cells {
            if !columns.iter().any(|c| c == name) {
                columns.push(name.clone());
            }
        }
        flattened.push(cells);
    }

    let table_rows = flattened
        .into_iter()
        .map(|cells| {
            columns
                .iter()
                .map(|column| {
                    cells
                        .iter()
                        .find(|(name, _)| name == column)
                        .map(|(_, value)| value.clone())
                })
                .collect()
        })
        .collect();

    TextTable {
        columns,
        rows: table_rows,
    }
}
