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

//! [`Row`]: an ordered mapping from column name to [`Value`]

use indexmap::IndexMap;

use crate::Value;

/// One row of query output or reader output. Column order follows the
/// producing schema, not insertion history of any one operator. Rows
/// are never mutated after production; transforming operators build
/// new rows.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Row {
    values: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs(
        pairs: impl IntoIterator<Item = (impl Into<String>, Value)>,
    ) -> Self {
        Row {
            values: pairs.into_iter().map(|(n, v)| (n.into(), v)).collect(),
        }
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.values.get(column)
    }

    /// The value for `column`, reading absent columns as null (readers
    /// may emit extra columns; consumers tolerate missing ones)
    pub fn get_or_null(&self, column: &str) -> Value {
        self.values.get(column).cloned().unwrap_or(Value::Null)
    }

    pub fn insert(&mut self, column: impl Into<String>, value: Value) {
        self.values.insert(column.into(), value);
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(|s| s.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.values.iter().map(|(n, v)| (n.as_str(), v))
    }

    /// A new row with every column renamed to `qualifier.name`, used by
    /// scans feeding multi-source plans
    pub fn qualify(&self, qualifier: &str) -> Row {
        Row {
            values: self
                .values
                .iter()
                .map(|(n, v)| (format!("{qualifier}.{n}"), v.clone()))
                .collect(),
        }
    }

    /// A new row concatenating the columns of `self` and `other`
    pub fn concat(&self, other: &Row) -> Row {
        let mut values = self.values.clone();
        for (n, v) in &other.values {
            values.insert(n.clone(), v.clone());
        }
        Row { values }
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.values.into_iter()
    }
}
