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

//! Resolved expressions as they appear inside a logical plan. Column
//! references have already been bound to concrete row keys; aggregate
//! calls have been rewritten to references of aggregate output columns.

use std::fmt;

use quarry_common::{is_comparable, promote, DataType, QuarryError, Result, Schema, Value};

/// A binary operator in a resolved expression
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    And,
    Or,
    Plus,
    Minus,
    Multiply,
    Divide,
}

impl Operator {
    pub fn is_comparison(&self) -> bool {
        matches!(
            self,
            Operator::Eq
                | Operator::NotEq
                | Operator::Lt
                | Operator::LtEq
                | Operator::Gt
                | Operator::GtEq
        )
    }

    pub fn is_logical(&self) -> bool {
        matches!(self, Operator::And | Operator::Or)
    }

    pub fn is_arithmetic(&self) -> bool {
        matches!(
            self,
            Operator::Plus | Operator::Minus | Operator::Multiply | Operator::Divide
        )
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            Operator::Eq => "=",
            Operator::NotEq => "!=",
            Operator::Lt => "<",
            Operator::LtEq => "<=",
            Operator::Gt => ">",
            Operator::GtEq => ">=",
            Operator::And => "AND",
            Operator::Or => "OR",
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Multiply => "*",
            Operator::Divide => "/",
        };
        write!(f, "{s}")
    }
}

/// A resolved scalar expression
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// A bound column reference; the string is the row key it reads
    Column(String),
    Literal(Value),
    BinaryExpr {
        left: Box<Expr>,
        op: Operator,
        right: Box<Expr>,
    },
    Not(Box<Expr>),
    IsNull {
        expr: Box<Expr>,
        negated: bool,
    },
}

impl Expr {
    /// The output type of this expression against the given input
    /// schema. Comparisons over types the lattice cannot compare are
    /// rejected here, at plan time.
    pub fn data_type(&self, schema: &Schema) -> Result<DataType> {
        match self {
            Expr::Column(name) => schema.field_type(name).copied().ok_or_else(|| {
                QuarryError::Schema(format!("column '{name}' not found in schema"))
            }),
            Expr::Literal(v) => Ok(v.data_type()),
            Expr::BinaryExpr { left, op, right } => {
                let lhs = left.data_type(schema)?;
                let rhs = right.data_type(schema)?;
                if op.is_comparison() {
                    if !is_comparable(&lhs, &rhs) {
                        return Err(QuarryError::type_mismatch(op.to_string(), lhs, rhs));
                    }
                    Ok(DataType::Boolean)
                } else if op.is_logical() {
                    Ok(DataType::Boolean)
                } else {
                    if !lhs.is_numeric() && lhs != DataType::Null {
                        return Err(QuarryError::type_mismatch(op.to_string(), lhs, rhs));
                    }
                    if !rhs.is_numeric() && rhs != DataType::Null {
                        return Err(QuarryError::type_mismatch(op.to_string(), lhs, rhs));
                    }
                    if *op == Operator::Divide && lhs != DataType::Decimal
                        && rhs != DataType::Decimal
                    {
                        // integer division yields a float
                        return Ok(DataType::Float);
                    }
                    Ok(promote(&lhs, &rhs))
                }
            }
            Expr::Not(_) | Expr::IsNull { .. } => Ok(DataType::Boolean),
        }
    }

    /// Collect every column this expression reads, in first-seen order
    pub fn columns(&self, out: &mut Vec<String>) {
        match self {
            Expr::Column(name) => {
                if !out.contains(name) {
                    out.push(name.clone());
                }
            }
            Expr::Literal(_) => {}
            Expr::BinaryExpr { left, right, .. } => {
                left.columns(out);
                right.columns(out);
            }
            Expr::Not(e) => e.columns(out),
            Expr::IsNull { expr, .. } => expr.columns(out),
        }
    }

    /// Split a conjunction into its conjuncts: `a AND b AND c` yields
    /// `[a, b, c]`; anything that is not an `AND` yields itself
    pub fn split_conjunction(&self) -> Vec<&Expr> {
        match self {
            Expr::BinaryExpr {
                left,
                op: Operator::And,
                right,
            } => {
                let mut out = left.split_conjunction();
                out.extend(right.split_conjunction());
                out
            }
            other => vec![other],
        }
    }

    /// Rebuild a conjunction from conjuncts; `None` when the list is
    /// empty
    pub fn conjunction(exprs: Vec<Expr>) -> Option<Expr> {
        exprs.into_iter().reduce(|acc, e| Expr::BinaryExpr {
            left: Box::new(acc),
            op: Operator::And,
            right: Box::new(e),
        })
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Expr::Column(name) => write!(f, "{name}"),
            Expr::Literal(v) => match v {
                Value::Utf8(s) => write!(f, "'{s}'"),
                other => write!(f, "{other}"),
            },
            Expr::BinaryExpr { left, op, right } => {
                write!(f, "{left} {op} {right}")
            }
            Expr::Not(e) => write!(f, "NOT {e}"),
            Expr::IsNull {
                expr,
                negated: false,
            } => write!(f, "{expr} IS NULL"),
            Expr::IsNull {
                expr,
                negated: true,
            } => write!(f, "{expr} IS NOT NULL"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column(name.to_string())
    }

    fn lit(v: impl Into<Value>) -> Expr {
        Expr::Literal(v.into())
    }

    fn binary(left: Expr, op: Operator, right: Expr) -> Expr {
        Expr::BinaryExpr {
            left: Box::new(left),
            op,
            right: Box::new(right),
        }
    }

    fn test_schema() -> Schema {
        Schema::new([
            ("age", DataType::Integer),
            ("name", DataType::Utf8),
            ("score", DataType::Float),
        ])
        .unwrap()
    }

    #[test]
    fn comparison_type_checks_at_plan_time() {
        let schema = test_schema();
        let ok = binary(col("age"), Operator::Gt, lit(25i64));
        assert_eq!(ok.data_type(&schema).unwrap(), DataType::Boolean);

        let bad = binary(col("name"), Operator::Gt, lit(25i64));
        assert!(bad.data_type(&schema).is_err());
    }

    #[test]
    fn arithmetic_promotes() {
        let schema = test_schema();
        let e = binary(col("age"), Operator::Plus, col("score"));
        assert_eq!(e.data_type(&schema).unwrap(), DataType::Float);

        let div = binary(col("age"), Operator::Divide, lit(2i64));
        assert_eq!(div.data_type(&schema).unwrap(), DataType::Float);
    }

    #[test]
    fn split_and_rebuild_conjunction() {
        let e = binary(
            binary(col("a"), Operator::Gt, lit(1i64)),
            Operator::And,
            binary(
                binary(col("b"), Operator::Eq, lit(2i64)),
                Operator::And,
                binary(col("c"), Operator::Lt, lit(3i64)),
            ),
        );
        let parts = e.split_conjunction();
        assert_eq!(parts.len(), 3);

        let rebuilt = Expr::conjunction(parts.into_iter().cloned().collect()).unwrap();
        assert_eq!(rebuilt.split_conjunction().len(), 3);

        assert_eq!(Expr::conjunction(vec![]), None);
    }

    #[test]
    fn columns_deduplicate() {
        let e = binary(
            binary(col("a"), Operator::Gt, col("b")),
            Operator::And,
            binary(col("a"), Operator::Lt, lit(10i64)),
        );
        let mut cols = vec![];
        e.columns(&mut cols);
        assert_eq!(cols, vec!["a", "b"]);
    }

    #[test]
    fn display() {
        let e = binary(
            binary(col("age"), Operator::Gt, lit(25i64)),
            Operator::And,
            Expr::IsNull {
                expr: Box::new(col("name")),
                negated: true,
            },
        );
        assert_eq!(e.to_string(), "age > 25 AND name IS NOT NULL");
    }
}
