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

//! Byte-source adapters consumed by the format readers: local files,
//! HTTP(S) with range probing, and S3 through `object_store` bridged
//! onto a current-thread runtime. Remote bytes fetched once are kept
//! for the lifetime of the source, which never outlives its scan.

use std::fs;
use std::io::Read;
use std::sync::OnceLock;

use bytes::Bytes;
use futures::TryStreamExt;
use log::debug;
use object_store::aws::AmazonS3Builder;
use object_store::path::Path as ObjectPath;
use object_store::ObjectStore;
use quarry_common::{QuarryError, Result};

use crate::datasource::locator::{ResolvedLocator, Scheme};

/// A source of bytes for one reader instance
#[derive(Debug)]
pub struct ByteSource {
    kind: SourceKind,
    /// The locator text, carried for error context
    path: String,
}

#[derive(Debug)]
enum SourceKind {
    Local(String),
    Http(HttpSource),
    S3(S3Source),
}

impl ByteSource {
    pub fn new(resolved: &ResolvedLocator) -> Result<ByteSource> {
        let kind = match resolved.scheme {
            Scheme::File => SourceKind::Local(resolved.path.clone()),
            Scheme::Http => SourceKind::Http(HttpSource::new(resolved.path.clone())),
            Scheme::S3 => SourceKind::S3(S3Source::new(&resolved.path)?),
        };
        Ok(ByteSource {
            kind,
            path: resolved.path.clone(),
        })
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    /// Whether this source points at a local directory (a partitioned
    /// dataset root)
    pub fn is_local_dir(&self) -> bool {
        match &self.kind {
            SourceKind::Local(path) => std::path::Path::new(path).is_dir(),
            _ => false,
        }
    }

    /// The total byte length of the object
    pub fn len(&self) -> Result<u64> {
        match &self.kind {
            SourceKind::Local(path) => Ok(fs::metadata(path)
                .map_err(|e| QuarryError::io(path.clone(), e))?
                .len()),
            SourceKind::Http(http) => http.len(),
            SourceKind::S3(s3) => s3.len(),
        }
    }

    /// Fetch the entire object
    pub fn read_all(&self) -> Result<Bytes> {
        match &self.kind {
            SourceKind::Local(path) => Ok(Bytes::from(
                fs::read(path).map_err(|e| QuarryError::io(path.clone(), e))?,
            )),
            SourceKind::Http(http) => http.read_all(),
            SourceKind::S3(s3) => s3.read_all(),
        }
    }

    /// Fetch `[start, start + length)`. Remote sources use range
    /// requests when the origin supports them and fall back to a full
    /// download otherwise.
    pub fn read_range(&self, start: u64, length: usize) -> Result<Bytes> {
        match &self.kind {
            SourceKind::Local(path) => {
                use std::io::{Seek, SeekFrom};
                let mut file =
                    fs::File::open(path).map_err(|e| QuarryError::io(path.clone(), e))?;
                file.seek(SeekFrom::Start(start))
                    .map_err(|e| QuarryError::io(path.clone(), e))?;
                let mut buf = vec![0u8; length];
                let read = read_up_to(&mut file, &mut buf)
                    .map_err(|e| QuarryError::io(path.clone(), e))?;
                buf.truncate(read);
                Ok(Bytes::from(buf))
            }
            SourceKind::Http(http) => http.read_range(start, length),
            SourceKind::S3(s3) => s3.read_range(start, length),
        }
    }

    /// The first `n` bytes, used by content sniffing
    pub fn read_prefix(&self, n: usize) -> Result<Bytes> {
        self.read_range(0, n)
    }

    /// A fresh sequential reader over the whole object. Local files
    /// stream; remote sources serve from the fetched bytes.
    pub fn open_reader(&self) -> Result<Box<dyn Read + Send>> {
        match &self.kind {
            SourceKind::Local(path) => {
                let file =
                    fs::File::open(path).map_err(|e| QuarryError::io(path.clone(), e))?;
                Ok(Box::new(file))
            }
            _ => Ok(Box::new(bytes_reader(self.read_all()?))),
        }
    }

    /// List the files under this source when it names a directory or
    /// prefix, returning locator paths relative roots joined back to
    /// absolute form. Only local and S3 sources can list; HTTP cannot.
    pub fn list_files(&self, suffix: &str) -> Result<Vec<String>> {
        match &self.kind {
            SourceKind::Local(path) => {
                let mut files = vec![];
                walk_local(std::path::Path::new(path), suffix, &mut files)?;
                files.sort();
                Ok(files)
            }
            SourceKind::S3(s3) => s3.list_files(suffix),
            SourceKind::Http(_) => Ok(vec![]),
        }
    }
}

fn bytes_reader(bytes: Bytes) -> impl Read + Send {
    std::io::Cursor::new(bytes)
}

fn read_up_to(reader: &mut impl Read, buf: &mut [u8]) -> std::io::Result<usize> {
    let mut total = 0;
    while total < buf.len() {
        match reader.read(&mut buf[total..])? {
            0 => break,
            n => total += n,
        }
    }
    Ok(total)
}

fn walk_local(
    dir: &std::path::Path,
    suffix: &str,
    out: &mut Vec<String>,
) -> Result<()> {
    let entries = fs::read_dir(dir)
        .map_err(|e| QuarryError::io(dir.display().to_string(), e))?;
    for entry in entries {
        let entry = entry.map_err(|e| QuarryError::io(dir.display().to_string(), e))?;
        let path = entry.path();
        let name = entry.file_name().to_string_lossy().to_string();
        // skip hidden and marker files the way listing tables do
        if name.starts_with('.') || name.starts_with('_') {
            continue;
        }
        if path.is_dir() {
            walk_local(&path, suffix, out)?;
        } else if name.ends_with(suffix) {
            out.push(path.to_string_lossy().to_string());
        }
    }
    Ok(())
}

/// HTTP(S) byte source: probes `Accept-Ranges` once and caches a full
/// download when the origin cannot serve ranges
#[derive(Debug)]
struct HttpSource {
    url: String,
    client: reqwest::blocking::Client,
    cache: OnceLock<Bytes>,
    head: OnceLock<(Option<u64>, bool)>,
}

impl HttpSource {
    fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::blocking::Client::new(),
            cache: OnceLock::new(),
            head: OnceLock::new(),
        }
    }

    /// `(content length, ranges supported)` from a single HEAD probe
    fn probe(&self) -> (Option<u64>, bool) {
        *self.head.get_or_init(|| {
            match self.client.head(&self.url).send() {
                Ok(response) => {
                    let length = response.content_length();
                    let ranges = response
                        .headers()
                        .get(reqwest::header::ACCEPT_RANGES)
                        .and_then(|v| v.to_str().ok())
                        .is_some_and(|v| v.eq_ignore_ascii_case("bytes"));
                    (length, ranges)
                }
                Err(_) => (None, false),
            }
        })
    }

    fn len(&self) -> Result<u64> {
        match self.probe().0 {
            Some(length) => Ok(length),
            None => Ok(self.read_all()?.len() as u64),
        }
    }

    fn read_all(&self) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get() {
            return Ok(bytes.clone());
        }
        let response = self
            .client
            .get(&self.url)
            .send()?
            .error_for_status()?;
        let bytes = response.bytes()?;
        Ok(self.cache.get_or_init(|| bytes).clone())
    }

    fn read_range(&self, start: u64, length: usize) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get() {
            return Ok(slice_range(bytes, start, length));
        }
        if !self.probe().1 {
            debug!("{}: no range support, falling back to full download", self.url);
            return Ok(slice_range(&self.read_all()?, start, length));
        }
        let end = start + length as u64 - 1;
        let response = self
            .client
            .get(&self.url)
            .header(reqwest::header::RANGE, format!("bytes={start}-{end}"))
            .send()?
            .error_for_status()?;
        if response.status() == reqwest::StatusCode::PARTIAL_CONTENT {
            Ok(response.bytes()?)
        } else {
            // origin ignored the range header and sent everything
            let bytes = response.bytes()?;
            let bytes = self.cache.get_or_init(|| bytes).clone();
            Ok(slice_range(&bytes, start, length))
        }
    }
}

fn slice_range(bytes: &Bytes, start: u64, length: usize) -> Bytes {
    let start = (start as usize).min(bytes.len());
    let end = (start + length).min(bytes.len());
    bytes.slice(start..end)
}

/// S3 byte source over `object_store`, driven from synchronous reader
/// code through a current-thread runtime
struct S3Source {
    store: Box<dyn ObjectStore>,
    location: ObjectPath,
    bucket: String,
    runtime: tokio::runtime::Runtime,
    cache: OnceLock<Bytes>,
}

impl std::fmt::Debug for S3Source {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("S3Source")
            .field("store", &self.store)
            .field("location", &self.location)
            .field("bucket", &self.bucket)
            .field("cache", &self.cache)
            .finish()
    }
}

impl S3Source {
    fn new(path: &str) -> Result<Self> {
        let trimmed = path.strip_prefix("s3://").ok_or_else(|| {
            QuarryError::UnknownFormat(format!("'{path}' is not an s3:// locator"))
        })?;
        let (bucket, key) = trimmed.split_once('/').unwrap_or((trimmed, ""));
        // credentials come from the process environment only
        if std::env::var("AWS_ACCESS_KEY_ID").is_err()
            || std::env::var("AWS_SECRET_ACCESS_KEY").is_err()
        {
            return Err(QuarryError::Auth(format!(
                "missing AWS credentials in the environment for '{path}'"
            )));
        }
        let store = AmazonS3Builder::from_env()
            .with_bucket_name(bucket)
            .build()
            .map_err(|e| QuarryError::Auth(format!("cannot configure S3 for '{path}': {e}")))?;
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .map_err(|e| QuarryError::io(path.to_string(), e))?;
        Ok(Self {
            store: Box::new(store),
            location: ObjectPath::from(key),
            bucket: bucket.to_string(),
            runtime,
            cache: OnceLock::new(),
        })
    }

    fn len(&self) -> Result<u64> {
        let meta = self
            .runtime
            .block_on(self.store.head(&self.location))?;
        Ok(meta.size as u64)
    }

    fn read_all(&self) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get() {
            return Ok(bytes.clone());
        }
        let bytes = self.runtime.block_on(async {
            self.store.get(&self.location).await?.bytes().await
        })?;
        Ok(self.cache.get_or_init(|| bytes).clone())
    }

    fn read_range(&self, start: u64, length: usize) -> Result<Bytes> {
        if let Some(bytes) = self.cache.get() {
            return Ok(slice_range(bytes, start, length));
        }
        let range = (start as usize)..(start as usize + length);
        let bytes = self
            .runtime
            .block_on(self.store.get_range(&self.location, range))?;
        Ok(bytes)
    }

    fn list_files(&self, suffix: &str) -> Result<Vec<String>> {
        let metas: Vec<object_store::ObjectMeta> = self.runtime.block_on(async {
            self.store
                .list(Some(&self.location))
                .try_collect()
                .await
        })?;
        let mut files: Vec<String> = metas
            .into_iter()
            .filter(|m| m.location.as_ref().ends_with(suffix))
            .map(|m| format!("s3://{}/{}", self.bucket, m.location))
            .collect();
        files.sort();
        Ok(files)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::datasource::locator::resolve;
    use std::io::Write;

    #[test]
    fn local_read_and_range() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"hello quarry").unwrap();

        let resolved = resolve(file.path().to_str().unwrap()).unwrap();
        let source = ByteSource::new(&resolved).unwrap();

        assert_eq!(source.len().unwrap(), 12);
        assert_eq!(source.read_all().unwrap().as_ref(), b"hello quarry");
        assert_eq!(source.read_range(6, 6).unwrap().as_ref(), b"quarry");
        // a range past the end truncates instead of failing
        assert_eq!(source.read_range(6, 100).unwrap().as_ref(), b"quarry");
    }

    #[test]
    fn missing_file_reports_path() {
        let resolved = resolve("/no/such/file.csv").unwrap();
        let source = ByteSource::new(&resolved).unwrap();
        let err = source.read_all().unwrap_err();
        assert!(err.to_string().contains("/no/such/file.csv"));
    }

    #[test]
    fn s3_without_credentials_is_an_auth_error() {
        // the test environment has no AWS credentials configured
        if std::env::var("AWS_ACCESS_KEY_ID").is_ok() {
            return;
        }
        let resolved = resolve("s3://bucket/data.parquet").unwrap();
        let err = ByteSource::new(&resolved).unwrap_err();
        assert!(matches!(err, QuarryError::Auth(_)));
    }

    #[test]
    fn local_listing_skips_hidden_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("year=2023")).unwrap();
        std::fs::write(dir.path().join("year=2023/part.parquet"), b"x").unwrap();
        std::fs::write(dir.path().join("_SUCCESS"), b"").unwrap();
        std::fs::write(dir.path().join(".hidden.parquet"), b"").unwrap();

        let resolved = resolve(dir.path().to_str().unwrap()).unwrap();
        let source = ByteSource::new(&resolved).unwrap();
        let files = source.list_files(".parquet").unwrap();
        assert_eq!(files.len(), 1);
        assert!(files[0].ends_with("year=2023/part.parquet"));
    }
}
