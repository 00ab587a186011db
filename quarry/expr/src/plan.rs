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

//! The logical plan: an immutable tree constructed by the planner,
//! rewritten by the optimizer and consumed once by the executor.
//! Every node has a stable, precomputed output schema.

use std::fmt;

use quarry_common::{DataType, QuarryError, Result, Schema};

use crate::{Expr, ScanHints};

/// How rows of two inputs combine in a join
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Full,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            JoinKind::Inner => "INNER",
            JoinKind::Left => "LEFT",
            JoinKind::Right => "RIGHT",
            JoinKind::Full => "FULL",
        };
        write!(f, "{s}")
    }
}

/// One ORDER BY key; ties preserve input order and nulls sort last
/// regardless of direction
#[derive(Debug, Clone, PartialEq)]
pub struct SortKey {
    pub column: String,
    pub ascending: bool,
}

impl fmt::Display for SortKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "{} {}",
            self.column,
            if self.ascending { "ASC" } else { "DESC" }
        )
    }
}

/// The supported aggregate functions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateFunc {
    Count,
    Sum,
    Avg,
    Min,
    Max,
}

impl fmt::Display for AggregateFunc {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            AggregateFunc::Count => "COUNT",
            AggregateFunc::Sum => "SUM",
            AggregateFunc::Avg => "AVG",
            AggregateFunc::Min => "MIN",
            AggregateFunc::Max => "MAX",
        };
        write!(f, "{s}")
    }
}

/// One aggregate call inside an [`Aggregate`] node
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateExpr {
    pub func: AggregateFunc,
    /// The bound input column; `None` only for `COUNT(*)`
    pub column: Option<String>,
    /// The column name this aggregate produces, e.g. `AVG(v)`
    pub output_name: String,
}

impl AggregateExpr {
    /// The output type of this aggregate against the input schema.
    /// SUM/AVG over non-numeric columns are rejected at plan time.
    pub fn output_type(&self, input: &Schema) -> Result<DataType> {
        let column_type = match &self.column {
            None => None,
            Some(c) => Some(input.field_type(c).copied().ok_or_else(|| {
                QuarryError::Schema(format!("column '{c}' not found in schema"))
            })?),
        };
        match self.func {
            AggregateFunc::Count => Ok(DataType::Integer),
            AggregateFunc::Sum | AggregateFunc::Avg => {
                let t = column_type.expect("SUM/AVG require a column");
                if !t.is_numeric() && t != DataType::Null {
                    return Err(QuarryError::Schema(format!(
                        "{} requires a numeric column, '{}' is {t}",
                        self.func,
                        self.column.as_deref().unwrap_or_default(),
                    )));
                }
                match self.func {
                    AggregateFunc::Sum => Ok(t),
                    // AVG divides, so integers widen to float
                    _ => Ok(if t == DataType::Decimal {
                        DataType::Decimal
                    } else {
                        DataType::Float
                    }),
                }
            }
            AggregateFunc::Min | AggregateFunc::Max => {
                Ok(column_type.expect("MIN/MAX require a column"))
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Scan {
    /// The resolved locator string this scan reads
    pub locator: String,
    /// Prefix applied to every emitted column name, when the source is
    /// aliased or the query has several sources
    pub qualifier: Option<String>,
    /// Output schema, including virtual partition columns, with the
    /// qualifier already applied
    pub schema: Schema,
    /// Partition columns (qualified like the schema); virtual, not
    /// stored in the underlying files
    pub partition_columns: Vec<String>,
    pub hints: ScanHints,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Filter {
    pub input: Box<LogicalPlan>,
    pub predicate: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Projection {
    pub input: Box<LogicalPlan>,
    /// `(expression, output column name)` pairs
    pub exprs: Vec<(Expr, String)>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Aggregate {
    pub input: Box<LogicalPlan>,
    /// Bound group-key columns
    pub group_by: Vec<String>,
    pub aggregates: Vec<AggregateExpr>,
    pub schema: Schema,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sort {
    pub input: Box<LogicalPlan>,
    pub keys: Vec<SortKey>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Limit {
    pub input: Box<LogicalPlan>,
    pub n: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub left: Box<LogicalPlan>,
    pub right: Box<LogicalPlan>,
    pub kind: JoinKind,
    /// Equi-join key pairs `(left column, right column)`; hash joins
    /// support nothing else
    pub on: Vec<(String, String)>,
    pub schema: Schema,
}

/// A logical query plan node
#[derive(Debug, Clone, PartialEq)]
pub enum LogicalPlan {
    Scan(Scan),
    Filter(Filter),
    Projection(Projection),
    Aggregate(Aggregate),
    Sort(Sort),
    Limit(Limit),
    Join(Join),
}

impl LogicalPlan {
    /// The output schema of this node
    pub fn schema(&self) -> &Schema {
        match self {
            LogicalPlan::Scan(scan) => &scan.schema,
            LogicalPlan::Filter(filter) => filter.input.schema(),
            LogicalPlan::Projection(p) => &p.schema,
            LogicalPlan::Aggregate(a) => &a.schema,
            LogicalPlan::Sort(s) => s.input.schema(),
            LogicalPlan::Limit(l) => l.input.schema(),
            LogicalPlan::Join(j) => &j.schema,
        }
    }

    /// Build a projection, computing and validating its output schema
    pub fn projection(
        input: LogicalPlan,
        exprs: Vec<(Expr, String)>,
    ) -> Result<LogicalPlan> {
        let mut schema = Schema::empty();
        for (expr, name) in &exprs {
            schema.push_field(name.clone(), expr.data_type(input.schema())?)?;
        }
        Ok(LogicalPlan::Projection(Projection {
            input: Box::new(input),
            exprs,
            schema,
        }))
    }

    /// Build an aggregate, computing and validating its output schema:
    /// group keys first, then one column per aggregate
    pub fn aggregate(
        input: LogicalPlan,
        group_by: Vec<String>,
        aggregates: Vec<AggregateExpr>,
    ) -> Result<LogicalPlan> {
        let mut schema = Schema::empty();
        for key in &group_by {
            let t = input.schema().field_type(key).copied().ok_or_else(|| {
                QuarryError::Schema(format!("column '{key}' not found in schema"))
            })?;
            schema.push_field(key.clone(), t)?;
        }
        for agg in &aggregates {
            schema.push_field(agg.output_name.clone(), agg.output_type(input.schema())?)?;
        }
        Ok(LogicalPlan::Aggregate(Aggregate {
            input: Box::new(input),
            group_by,
            aggregates,
            schema,
        }))
    }

    /// Build a join; the output schema is left columns then right
    /// columns
    pub fn join(
        left: LogicalPlan,
        right: LogicalPlan,
        kind: JoinKind,
        on: Vec<(String, String)>,
    ) -> Result<LogicalPlan> {
        let schema = left.schema().merge(right.schema());
        Ok(LogicalPlan::Join(Join {
            left: Box::new(left),
            right: Box::new(right),
            kind,
            on,
            schema,
        }))
    }

    fn fmt_indent(&self, f: &mut fmt::Formatter, indent: usize) -> fmt::Result {
        let pad = "  ".repeat(indent);
        match self {
            LogicalPlan::Scan(scan) => {
                write!(f, "{pad}Scan({})", scan.locator)?;
                if let Some(columns) = &scan.hints.required_columns {
                    write!(f, " columns=[{}]", columns.join(","))?;
                }
                if !scan.hints.pushdown_filters.is_empty() {
                    let filters: Vec<String> = scan
                        .hints
                        .pushdown_filters
                        .iter()
                        .map(|p| p.to_string())
                        .collect();
                    write!(f, " pushdown_filters=[{}]", filters.join(","))?;
                }
                if let Some(cap) = scan.hints.row_cap {
                    write!(f, " row_cap={cap}")?;
                }
                if !scan.hints.partition_filters.is_empty() {
                    let filters: Vec<String> = scan
                        .hints
                        .partition_filters
                        .iter()
                        .map(|p| p.to_string())
                        .collect();
                    write!(f, " partition_filters=[{}]", filters.join(","))?;
                }
                writeln!(f)
            }
            LogicalPlan::Filter(filter) => {
                writeln!(f, "{pad}Filter({})", filter.predicate)?;
                filter.input.fmt_indent(f, indent + 1)
            }
            LogicalPlan::Projection(p) => {
                let items: Vec<String> = p
                    .exprs
                    .iter()
                    .map(|(expr, name)| {
                        let text = expr.to_string();
                        if &text == name {
                            text
                        } else {
                            format!("{text} AS {name}")
                        }
                    })
                    .collect();
                writeln!(f, "{pad}Project({})", items.join(", "))?;
                p.input.fmt_indent(f, indent + 1)
            }
            LogicalPlan::Aggregate(a) => {
                let aggs: Vec<&str> =
                    a.aggregates.iter().map(|x| x.output_name.as_str()).collect();
                writeln!(
                    f,
                    "{pad}Aggregate(group_by=[{}], aggregates=[{}])",
                    a.group_by.join(","),
                    aggs.join(","),
                )?;
                a.input.fmt_indent(f, indent + 1)
            }
            LogicalPlan::Sort(s) => {
                let keys: Vec<String> = s.keys.iter().map(|k| k.to_string()).collect();
                writeln!(f, "{pad}Sort({})", keys.join(", "))?;
                s.input.fmt_indent(f, indent + 1)
            }
            LogicalPlan::Limit(l) => {
                writeln!(f, "{pad}Limit({})", l.n)?;
                l.input.fmt_indent(f, indent + 1)
            }
            LogicalPlan::Join(j) => {
                let on: Vec<String> = j
                    .on
                    .iter()
                    .map(|(l, r)| format!("{l} = {r}"))
                    .collect();
                writeln!(f, "{pad}Join({}, {})", j.kind, on.join(" AND "))?;
                j.left.fmt_indent(f, indent + 1)?;
                j.right.fmt_indent(f, indent + 1)
            }
        }
    }
}

impl fmt::Display for LogicalPlan {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        self.fmt_indent(f, 0)
    }
}
