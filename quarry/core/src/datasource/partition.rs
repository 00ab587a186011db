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

//! Hive-style partition discovery: `.../key1=v1/key2=v2/file` path
//! components become typed virtual columns on every row of the file

use quarry_common::{
    infer_type_from_string, parse_string_as, QuarryError, Result, Value,
};
use quarry_expr::SimplePredicate;

/// A single file of a (possibly partitioned) dataset, along with the
/// partition values its directory components encode
#[derive(Debug, Clone, PartialEq)]
pub struct PartitionedFile {
    /// Full path or locator of the file
    pub path: String,
    /// `(column, value)` pairs in path order
    pub partition_values: Vec<(String, Value)>,
}

impl PartitionedFile {
    /// A plain, unpartitioned file
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            partition_values: vec![],
        }
    }

    /// Parse the `key=value` components of `path` below `base`. Values
    /// type themselves through string inference, so `year=2024` is an
    /// integer partition column.
    pub fn from_hive_path(base: &str, path: &str) -> Self {
        let relative = path
            .strip_prefix(base)
            .unwrap_or(path)
            .trim_start_matches('/');
        let partition_values = relative
            .split('/')
            .filter_map(|component| component.split_once('='))
            .map(|(key, raw)| {
                let inferred = infer_type_from_string(raw);
                let value =
                    parse_string_as(raw, &inferred).unwrap_or(Value::Null);
                (key.to_string(), value)
            })
            .collect();
        Self {
            path: path.to_string(),
            partition_values,
        }
    }

    /// Whether this file can satisfy the conjunction of partition
    /// filters. Pruning is exact: a filter on a key this file does not
    /// carry keeps the file.
    pub fn matches(&self, filters: &[SimplePredicate]) -> bool {
        filters.iter().all(|filter| {
            match self
                .partition_values
                .iter()
                .find(|(key, _)| *key == filter.column)
            {
                Some((_, value)) => filter.evaluate(value),
                None => true,
            }
        })
    }
}

/// The partition columns of a dataset, taken from its first file; a
/// file disagreeing on the keys is a malformed layout
pub fn partition_columns(files: &[PartitionedFile]) -> Result<Vec<String>> {
    let Some(first) = files.first() else {
        return Ok(vec![]);
    };
    let columns: Vec<String> = first
        .partition_values
        .iter()
        .map(|(key, _)| key.clone())
        .collect();
    for file in files {
        let keys: Vec<&String> =
            file.partition_values.iter().map(|(k, _)| k).collect();
        if keys.len() != columns.len()
            || keys.iter().zip(&columns).any(|(a, b)| *a != b)
        {
            return Err(QuarryError::Data(format!(
                "inconsistent partition layout: '{}' has keys [{}], expected [{}]",
                file.path,
                keys.iter().map(|s| s.as_str()).collect::<Vec<_>>().join(","),
                columns.join(","),
            )));
        }
    }
    Ok(columns)
}
