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

//! The abstract syntax tree produced by the parser. Column references
//! here are unresolved; the planner binds them against source schemas.

use std::fmt;

use quarry_common::Value;
use quarry_expr::{AggregateFunc, JoinKind, Operator};

/// A possibly qualified column reference as written in the query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnRef {
    pub qualifier: Option<String>,
    pub name: String,
}

impl fmt::Display for ColumnRef {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.qualifier {
            Some(q) => write!(f, "{q}.{}", self.name),
            None => write!(f, "{}", self.name),
        }
    }
}

/// An unresolved scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Identifier(ColumnRef),
    Literal(Value),
    BinaryOp {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
    /// An aggregate call; `column` is `None` only for `COUNT(*)`
    Aggregate {
        func: AggregateFunc,
        column: Option<ColumnRef>,
    },
}

impl Expr {
    /// Whether this expression contains an aggregate call anywhere
    pub fn has_aggregate(&self) -> bool {
        match self {
            Expr::Aggregate { .. } => true,
            Expr::Identifier(_) | Expr::Literal(_) => false,
            Expr::BinaryOp { left, right, .. } => {
                left.has_aggregate() || right.has_aggregate()
            }
            Expr::Not(e) => e.has_aggregate(),
            Expr::IsNull { expr, .. } => expr.has_aggregate(),
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Identifier(c) => write!(f, "{c}"),
            Expr::Literal(v) => match v {
                Value::Utf8(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
            Expr::BinaryOp { left, op, right } => write!(f, "{left} {op} {right}"),
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::IsNull {
                expr,
                negated: false,
            } => write!(f, "{expr} IS NULL"),
            Expr::IsNull {
                expr,
                negated: true,
            } => write!(f, "{expr} IS NOT NULL"),
            Expr::Aggregate { func, column } => match column {
                Some(c) => write!(f, "{func}({c})"),
                None => write!(f, "{func}(*)"),
            },
        }
    }
}

/// One item of the SELECT list
#[derive(Debug, Clone, PartialEq)]
pub enum SelectItem {
    /// `SELECT *`
    Wildcard,
    Expr { expr: Expr, alias: Option<String> },
}

/// Where a FROM item points: a bare table name (bound through the
/// caller's default source) or an inline quoted path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceName {
    Named(String),
    Path(String),
}

impl fmt::Display for SourceName {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            SourceName::Named(n) => write!(f, "{n}"),
            SourceName::Path(p) => write!(f, "'{p}'"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRef {
    pub source: SourceName,
    pub alias: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: TableRef,
    pub on: Expr,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderByExpr {
    pub column: ColumnRef,
    pub ascending: bool,
}

/// A parsed SELECT query
#[derive(Debug, Clone, PartialEq)]
pub struct Query {
    pub projection: Vec<SelectItem>,
    /// Comma-separated FROM items (the comma form is a cross join)
    pub from: Vec<TableRef>,
    pub joins: Vec<JoinClause>,
    pub selection: Option<Expr>,
    pub group_by: Vec<ColumnRef>,
    pub order_by: Vec<OrderByExpr>,
    pub limit: Option<usize>,
}
