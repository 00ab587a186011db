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

//! [`Schema`]: an ordered mapping from column name to [`DataType`]

use std::fmt;

use indexmap::IndexMap;

use crate::error::Result;
use crate::{promote, schema_err, DataType};

/// An ordered column-name → type mapping. Names are unique; every row
/// produced under a schema carries values of the declared type or null.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Schema {
    fields: IndexMap<String, DataType>,
}

impl Schema {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build a schema from `(name, type)` pairs, rejecting duplicates
    pub fn new(
        fields: impl IntoIterator<Item = (impl Into<String>, DataType)>,
    ) -> Result<Self> {
        let mut schema = Self::empty();
        for (name, data_type) in fields {
            schema.push_field(name.into(), data_type)?;
        }
        Ok(schema)
    }

    /// Append a column, rejecting duplicate names
    pub fn push_field(&mut self, name: impl Into<String>, data_type: DataType) -> Result<()> {
        let name = name.into();
        if self.fields.contains_key(&name) {
            return schema_err!("duplicate column name '{name}'");
        }
        self.fields.insert(name, data_type);
        Ok(())
    }

    pub fn field_type(&self, name: &str) -> Option<&DataType> {
        self.fields.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.get_index_of(name)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Column names in schema order
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(|s| s.as_str())
    }

    /// `(name, type)` pairs in schema order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &DataType)> {
        self.fields.iter().map(|(n, t)| (n.as_str(), t))
    }

    /// Union with another schema: columns of `self` first, then the
    /// columns only `other` has; overlapping columns promote through
    /// the lattice.
    pub fn merge(&self, other: &Schema) -> Schema {
        let mut fields = self.fields.clone();
        for (name, data_type) in &other.fields {
            match fields.get_mut(name) {
                Some(existing) => *existing = promote(existing, data_type),
                None => {
                    fields.insert(name.clone(), *data_type);
                }
            }
        }
        Schema { fields }
    }

    /// A schema containing exactly the requested columns, in the
    /// requested order
    pub fn project(&self, columns: &[String]) -> Result<Schema> {
        let mut projected = Schema::empty();
        for name in columns {
            match self.field_type(name) {
                Some(data_type) => projected.push_field(name.clone(), *data_type)?,
                None => return schema_err!("column '{name}' not found in schema"),
            }
        }
        Ok(projected)
    }

    /// Rename every column to `qualifier.name`
    pub fn qualify(&self, qualifier: &str) -> Schema {
        Schema {
            fields: self
                .fields
                .iter()
                .map(|(n, t)| (format!("{qualifier}.{n}"), *t))
                .collect(),
        }
    }
}

impl fmt::Display for Schema {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let mut first = true;
        for (name, data_type) in self.iter() {
            if !first {
                write!(f, ", ")?;
            }
            write!(f, "{name}: {data_type}")?;
            first = false;
        }
        Ok(())
    }
}
