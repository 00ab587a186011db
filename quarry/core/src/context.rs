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

//! The engine entry points: `execute` and `infer_schema`, plus the
//! lazy [`QueryResult`] they hand back

use std::cell::RefCell;
use std::rc::Rc;

use log::debug;
use quarry_common::{
    QuarryError, ReaderOptions, Result, Row, Schema, Warning,
};
use quarry_optimizer::{AuditEntry, Optimizer};
use quarry_sql::ast::SourceName;
use quarry_sql::{extract_source_paths, plan_query, BoundSource, Parser};

use crate::datasource::{locator, registry};
use crate::execution::{build_operator, Operator, WarningSink};

/// A query engine instance: reader options plus the statically known
/// registry. There is no per-query shared state beyond this.
#[derive(Debug, Clone, Default)]
pub struct Engine {
    options: ReaderOptions,
}

impl Engine {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_options(options: ReaderOptions) -> Self {
        Self { options }
    }

    /// Execute a read-only SQL query. Quoted FROM paths bind to their
    /// own sources; bare table names bind to `default_source`.
    pub fn execute(&self, sql: &str, default_source: Option<&str>) -> Result<QueryResult> {
        // pre-pass over the token stream: every inline quoted source
        // must resolve before planning starts
        for path in extract_source_paths(sql).map_err(QuarryError::Parse)? {
            locator::resolve(&path)?;
        }
        let query = Parser::parse_query(sql).map_err(QuarryError::Parse)?;

        // bind each FROM/JOIN source to a fresh reader for schema
        // inference; the same path twice opens two readers
        let tables = query.from.iter().chain(query.joins.iter().map(|j| &j.table));
        let mut sources = vec![];
        for table in tables {
            let locator_string = match &table.source {
                SourceName::Path(path) => path.clone(),
                SourceName::Named(name) => default_source
                    .ok_or_else(|| {
                        QuarryError::UnknownFormat(format!(
                            "table '{name}' has no source: no default source was given"
                        ))
                    })?
                    .to_string(),
            };
            let resolved = locator::resolve(&locator_string)?;
            let mut reader = registry::open_reader(&resolved, &self.options)?;
            let schema = reader.schema()?;
            let partition_columns = reader.partition_columns();
            reader.close();
            sources.push(BoundSource {
                locator: locator_string,
                alias: table.alias.clone(),
                schema,
                partition_columns,
            });
        }

        let plan = plan_query(&query, &sources)?;
        let (plan, audit) = Optimizer::new().optimize(plan)?;
        debug!("optimized plan:\n{plan}");

        let warnings: WarningSink = Rc::new(RefCell::new(vec![]));
        let root = build_operator(&plan, &self.options, &warnings)?;
        Ok(QueryResult {
            schema: plan.schema().clone(),
            plan_text: plan.to_string(),
            audit,
            root,
            warnings,
            opened: false,
            finished: false,
        })
    }

    /// The inferred schema of a source, including its virtual
    /// partition columns. Inferring twice yields equal schemas.
    pub fn infer_schema(&self, locator: &str) -> Result<Schema> {
        let resolved = locator::resolve(locator)?;
        let mut reader = registry::open_reader(&resolved, &self.options)?;
        let schema = reader.schema()?;
        reader.close();
        Ok(schema)
    }
}

/// Execute a query with default options
pub fn execute(sql: &str, default_source: Option<&str>) -> Result<QueryResult> {
    Engine::new().execute(sql, default_source)
}

/// Infer a source's schema with default options
pub fn infer_schema(locator: &str) -> Result<Schema> {
    Engine::new().infer_schema(locator)
}

/// The lazy result of one query: an iterator of rows plus the schema,
/// the explain surface and the recoverable-warning side channel.
///
/// Abandoning iteration (dropping the result) closes the operator
/// tree, which closes every reader exactly once.
pub struct QueryResult {
    schema: Schema,
    plan_text: String,
    audit: Vec<AuditEntry>,
    root: Box<dyn Operator>,
    warnings: WarningSink,
    opened: bool,
    finished: bool,
}

impl std::fmt::Debug for QueryResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueryResult")
            .field("schema", &self.schema)
            .field("plan_text", &self.plan_text)
            .field("opened", &self.opened)
            .field("finished", &self.finished)
            .finish()
    }
}

impl QueryResult {
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// Drain the remaining rows into a vector
    pub fn collect(mut self) -> Result<Vec<Row>> {
        let mut rows = vec![];
        for row in &mut self {
            rows.push(row?);
        }
        Ok(rows)
    }

    /// The operator nesting and the per-rule optimizer audit, as
    /// deterministic text
    pub fn explain(&self) -> String {
        let mut out = self.plan_text.clone();
        out.push_str("Optimizations:\n");
        let width = self
            .audit
            .iter()
            .map(|entry| entry.rule.len() + 1)
            .max()
            .unwrap_or(0);
        for entry in &self.audit {
            let rule = format!("{}:", entry.rule);
            let status = if entry.applied { "applied" } else { "skipped" };
            out.push_str(&format!("  {rule:<width$} {status} ({})\n", entry.note));
        }
        out
    }

    /// The recoverable warnings collected so far; consult after
    /// iteration for the full set
    pub fn warnings(&self) -> Vec<Warning> {
        self.warnings.borrow().clone()
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            self.root.close();
        }
    }
}

impl Iterator for QueryResult {
    type Item = Result<Row>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        if !self.opened {
            self.opened = true;
            if let Err(e) = self.root.open() {
                self.finish();
                return Some(Err(e));
            }
        }
        match self.root.next() {
            Ok(Some(row)) => Some(Ok(row)),
            Ok(None) => {
                self.finish();
                None
            }
            Err(e) => {
                // executor errors are terminal, resources still close
                self.finish();
                Some(Err(e))
            }
        }
    }
}

impl Drop for QueryResult {
    fn drop(&mut self) {
        self.finish();
    }
}
