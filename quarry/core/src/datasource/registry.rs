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

//! The reader registry: binds a resolved locator to a concrete format
//! reader. Resolution order is fragment hint, then file extension,
//! then content sniffing over the first 4 KiB.

use log::debug;
use quarry_common::{QuarryError, ReaderOptions, Result};

use crate::datasource::fetch::ByteSource;
use crate::datasource::file_format::{csv, html, json, markdown, parquet, xml};
use crate::datasource::locator::{FileFormat, ResolvedLocator};
use crate::datasource::reader::Reader;

const SNIFF_BYTES: usize = 4096;

/// Decide the format of a source: explicit fragment wins, then the
/// extension of the last path component, then sniffing
pub fn detect_format(resolved: &ResolvedLocator) -> Result<FileFormat> {
    if let Some(format) = resolved.format_hint {
        return Ok(format);
    }
    if let Some(format) = resolved.extension().and_then(FileFormat::from_extension) {
        return Ok(format);
    }
    let source = ByteSource::new(resolved)?;
    if source.is_local_dir() {
        // a bare directory is only meaningful as a parquet dataset
        return Ok(FileFormat::Parquet);
    }
    let prefix = source.read_prefix(SNIFF_BYTES)?;
    match sniff(&prefix) {
        Some(format) => {
            debug!("{resolved}: sniffed format {format}");
            Ok(format)
        }
        None => Err(QuarryError::UnknownFormat(resolved.to_string())),
    }
}

/// Open a fresh reader for the locator. Two calls return two
/// independent readers; nothing is cached across scans.
pub fn open_reader(
    resolved: &ResolvedLocator,
    options: &ReaderOptions,
) -> Result<Box<dyn Reader>> {
    let format = detect_format(resolved)?;
    let locator = resolved.to_string();
    let source = ByteSource::new(resolved)?;
    let reader: Box<dyn Reader> = match format {
        FileFormat::Csv => {
            Box::new(csv::CsvReader::new(locator, source, options.clone()))
        }
        FileFormat::Parquet => {
            Box::new(parquet::ParquetReader::new(locator, resolved.clone()))
        }
        FileFormat::Json => Box::new(json::JsonReader::document(
            locator,
            source,
            resolved.selector.clone(),
            options.clone(),
        )),
        FileFormat::Jsonl => {
            Box::new(json::JsonReader::lines(locator, source, options.clone()))
        }
        FileFormat::Html => Box::new(html::open(
            locator,
            source,
            resolved.selector.clone(),
            options.clone(),
        )?),
        FileFormat::Markdown => Box::new(markdown::open(
            locator,
            source,
            resolved.selector.clone(),
            options.clone(),
        )?),
        FileFormat::Xml => Box::new(xml::open(
            locator,
            source,
            resolved.selector.clone(),
            options.clone(),
        )?),
    };
    Ok(reader)
}

/// Content sniffing over the leading bytes: the Parquet magic, HTML
/// tags, a Markdown separator row, JSON braces, and CSV as the text
/// fallback
fn sniff(prefix: &[u8]) -> Option<FileFormat> {
    if prefix.starts_with(b"PAR1") {
        return Some(FileFormat::Parquet);
    }
    let text = String::from_utf8_lossy(prefix);
    let trimmed = text.trim_start();
    let lowered = trimmed.to_ascii_lowercase();
    if lowered.starts_with("<!doctype html")
        || lowered.starts_with("<html")
        || lowered.starts_with("<table")
    {
        return Some(FileFormat::Html);
    }
    if trimmed.starts_with('<') {
        return Some(FileFormat::Xml);
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        // several complete lines of objects make it JSONL, one
        // document makes it JSON
        let mut lines = trimmed.lines();
        let first_is_object = lines
            .next()
            .is_some_and(|l| serde_json::from_str::<serde_json::Value>(l).is_ok());
        let second_is_object = lines
            .next()
            .is_some_and(|l| serde_json::from_str::<serde_json::Value>(l).is_ok());
        return Some(if first_is_object && second_is_object {
            FileFormat::Jsonl
        } else {
            FileFormat::Json
        });
    }
    let separator = markdown::separator_regex();
    if text.lines().any(|line| {
        line.contains('|') && separator.is_match(line)
    }) {
        return Some(FileFormat::Markdown);
    }
    if !trimmed.is_empty() {
        return Some(FileFormat::Csv);
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::locator::resolve;
    use std::io::Write;

    fn detect(content: &[u8], name: &str) -> Result<FileFormat> {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(name);
        let mut file = std::fs::File::create(&path).unwrap();
        file.write_all(content).unwrap();
        detect_format(&resolve(path.to_str().unwrap()).unwrap())
    }

    #[test]
    fn extension_decides_without_a_fragment() {
        assert_eq!(
            detect(b"a,b\n1,2\n", "data.csv").unwrap(),
            FileFormat::Csv
        );
        assert_eq!(detect(b"{}", "api.json").unwrap(), FileFormat::Json);
        assert_eq!(detect(b"# hi", "notes.md").unwrap(), FileFormat::Markdown);
    }

    #[test]
    fn fragment_wins_over_extension() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("data.bin");
        std::fs::write(&path, b"a,b\n1,2\n").unwrap();
        let locator = format!("{}#csv", path.to_str().unwrap());
        assert_eq!(
            detect_format(&resolve(&locator).unwrap()).unwrap(),
            FileFormat::Csv
        );
    }

    #[test]
    fn sniffing_recognizes_the_formats() {
        assert_eq!(detect(b"PAR1....", "blob").unwrap(), FileFormat::Parquet);
        assert_eq!(
            detect(b"<!DOCTYPE html><html></html>", "page").unwrap(),
            FileFormat::Html
        );
        assert_eq!(
            detect(b"<catalog><r/></catalog>", "feed").unwrap(),
            FileFormat::Xml
        );
        assert_eq!(
            detect(br#"{"a": [1, 2]}"#, "blob2").unwrap(),
            FileFormat::Json
        );
        assert_eq!(
            detect(b"{\"a\": 1}\n{\"a\": 2}\n", "blob3").unwrap(),
            FileFormat::Jsonl
        );
        assert_eq!(
            detect(b"| a | b |\n|---|---|\n| 1 | 2 |\n", "table").unwrap(),
            FileFormat::Markdown
        );
        assert_eq!(detect(b"a,b\n1,2\n", "plain").unwrap(), FileFormat::Csv);
    }

    #[test]
    fn empty_files_have_no_format() {
        let err = detect(b"", "void").unwrap_err();
        assert!(matches!(err, QuarryError::UnknownFormat(_)));
    }
}
