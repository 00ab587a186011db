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

//! Source locator parsing: `path_or_url ["#" format [":" selector]]`

use std::fmt;

use quarry_common::{QuarryError, Result};
use url::Url;

/// The supported file formats, whether named in a fragment hint or
/// detected from extension/content
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileFormat {
    Csv,
    Parquet,
    Json,
    Jsonl,
    Html,
    Markdown,
    Xml,
}

impl FileFormat {
    /// The fragment/format names of the locator grammar
    pub fn from_name(name: &str) -> Option<FileFormat> {
        match name.to_ascii_lowercase().as_str() {
            "csv" => Some(FileFormat::Csv),
            "parquet" => Some(FileFormat::Parquet),
            "json" => Some(FileFormat::Json),
            "jsonl" => Some(FileFormat::Jsonl),
            "html" => Some(FileFormat::Html),
            "markdown" => Some(FileFormat::Markdown),
            "xml" => Some(FileFormat::Xml),
            _ => None,
        }
    }

    /// Map a file extension to a format; a superset of the fragment
    /// names (`md`, `htm`, `ndjson`)
    pub fn from_extension(ext: &str) -> Option<FileFormat> {
        match ext.to_ascii_lowercase().as_str() {
            "md" => Some(FileFormat::Markdown),
            "htm" => Some(FileFormat::Html),
            "ndjson" => Some(FileFormat::Jsonl),
            other => FileFormat::from_name(other),
        }
    }
}

impl fmt::Display for FileFormat {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let name = match self {
            FileFormat::Csv => "csv",
            FileFormat::Parquet => "parquet",
            FileFormat::Json => "json",
            FileFormat::Jsonl => "jsonl",
            FileFormat::Html => "html",
            FileFormat::Markdown => "markdown",
            FileFormat::Xml => "xml",
        };
        write!(f, "{name}")
    }
}

/// Where the bytes live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    File,
    Http,
    S3,
}

/// A parsed locator: scheme, normalized path, and the optional
/// `#format[:selector]` fragment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedLocator {
    pub scheme: Scheme,
    /// For `File` a filesystem path; for `Http` the full URL without
    /// the fragment; for `S3` the `s3://bucket/key` form
    pub path: String,
    pub format_hint: Option<FileFormat>,
    pub selector: Option<String>,
}

impl ResolvedLocator {
    /// The last path component, used for extension-based format
    /// detection
    pub fn file_name(&self) -> &str {
        self.path
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or(&self.path)
    }

    /// The extension of the last path component, if any
    pub fn extension(&self) -> Option<&str> {
        match self.file_name().rsplit_once('.') {
            Some((stem, ext)) if !stem.is_empty() => Some(ext),
            _ => None,
        }
    }
}

impl fmt::Display for ResolvedLocator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.path)?;
        if let Some(format) = self.format_hint {
            write!(f, "#{format}")?;
            if let Some(selector) = &self.selector {
                write!(f, ":{selector}")?;
            }
        }
        Ok(())
    }
}

/// Parse a locator string.
///
/// The explicit fragment wins over everything: `data.bin#csv` reads as
/// CSV whatever the extension says. An unknown fragment format is an
/// error rather than a silent fallback.
pub fn resolve(locator: &str) -> Result<ResolvedLocator> {
    let (base, fragment) = match locator.rsplit_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (locator, None),
    };

    let (format_hint, selector) = match fragment {
        None => (None, None),
        Some(fragment) => {
            let (name, selector) = match fragment.split_once(':') {
                Some((name, selector)) => (name, Some(selector.to_string())),
                None => (fragment, None),
            };
            let format = FileFormat::from_name(name).ok_or_else(|| {
                QuarryError::UnknownFormat(format!(
                    "'{locator}' names an unknown format '{name}' in its fragment"
                ))
            })?;
            (Some(format), selector)
        }
    };

    let (scheme, path) = parse_scheme(base)?;
    Ok(ResolvedLocator {
        scheme,
        path,
        format_hint,
        selector,
    })
}

/// Split off the scheme: absolute filesystem paths first, then URL
/// parsing, with scheme-less strings falling back to relative
/// filesystem paths
fn parse_scheme(base: &str) -> Result<(Scheme, String)> {
    if std::path::Path::new(base).is_absolute() {
        return Ok((Scheme::File, base.to_string()));
    }
    match Url::parse(base) {
        Ok(url) => match url.scheme() {
            "http" | "https" => Ok((Scheme::Http, base.to_string())),
            "s3" => Ok((Scheme::S3, base.to_string())),
            "file" => Ok((Scheme::File, url.path().to_string())),
            other => Err(QuarryError::UnknownFormat(format!(
                "unsupported scheme '{other}' in '{base}'"
            ))),
        },
        Err(url::ParseError::RelativeUrlWithoutBase) => {
            Ok((Scheme::File, base.to_string()))
        }
        Err(e) => Err(QuarryError::UnknownFormat(format!(
            "cannot parse locator '{base}': {e}"
        ))),
    }
}
