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

//! Pushdown hints attached to scan nodes, and the restricted predicate
//! algebra that travels in them

use std::fmt;

use quarry_common::Value;

use crate::{Expr, Operator};

/// The comparison operators a reader can be asked to evaluate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    /// Evaluate this operator over an ordering produced by
    /// [`Value::compare`]
    pub fn matches(&self, ordering: std::cmp::Ordering) -> bool {
        use std::cmp::Ordering::*;
        match self {
            CompareOp::Eq => ordering == Equal,
            CompareOp::NotEq => ordering != Equal,
            CompareOp::Lt => ordering == Less,
            CompareOp::LtEq => ordering != Greater,
            CompareOp::Gt => ordering == Greater,
            CompareOp::GtEq => ordering != Less,
        }
    }
}

impl fmt::Display for CompareOp {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let s = match self {
            CompareOp::Eq => "=",
            CompareOp::NotEq => "!=",
            CompareOp::Lt => "<",
            CompareOp::LtEq => "<=",
            CompareOp::Gt => ">",
            CompareOp::GtEq => ">=",
        };
        write!(f, "{s}")
    }
}

/// `column op literal`, the only predicate form readers are asked to
/// evaluate. Richer expressions stay in the residual filter above the
/// scan; disjunctions are never pushed.
#[derive(Debug, Clone, PartialEq)]
pub struct SimplePredicate {
    pub column: String,
    pub op: CompareOp,
    pub value: Value,
}

impl SimplePredicate {
    /// Recognize `column op literal` (or `literal op column`, flipped)
    /// in a resolved expression
    pub fn from_expr(expr: &Expr) -> Option<SimplePredicate> {
        let Expr::BinaryExpr { left, op, right } = expr else {
            return None;
        };
        let op = match op {
            Operator::Eq => CompareOp::Eq,
            Operator::NotEq => CompareOp::NotEq,
            Operator::Lt => CompareOp::Lt,
            Operator::LtEq => CompareOp::LtEq,
            Operator::Gt => CompareOp::Gt,
            Operator::GtEq => CompareOp::GtEq,
            _ => return None,
        };
        match (left.as_ref(), right.as_ref()) {
            (Expr::Column(column), Expr::Literal(value)) => Some(SimplePredicate {
                column: column.clone(),
                op,
                value: value.clone(),
            }),
            (Expr::Literal(value), Expr::Column(column)) => Some(SimplePredicate {
                column: column.clone(),
                op: flip(op),
                value: value.clone(),
            }),
            _ => None,
        }
    }

    /// Whether a row value satisfies this predicate. Null never
    /// matches, whatever the operator.
    pub fn evaluate(&self, value: &Value) -> bool {
        match value.compare(&self.value) {
            Ok(Some(ordering)) => self.op.matches(ordering),
            _ => false,
        }
    }

    /// The same predicate with the column key rewritten (used when a
    /// scan strips its qualifier before talking to a reader)
    pub fn with_column(&self, column: impl Into<String>) -> SimplePredicate {
        SimplePredicate {
            column: column.into(),
            op: self.op,
            value: self.value.clone(),
        }
    }
}

fn flip(op: CompareOp) -> CompareOp {
    match op {
        CompareOp::Lt => CompareOp::Gt,
        CompareOp::LtEq => CompareOp::GtEq,
        CompareOp::Gt => CompareOp::Lt,
        CompareOp::GtEq => CompareOp::LtEq,
        other => other,
    }
}

impl fmt::Display for SimplePredicate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}{}{}", self.column, self.op, self.value)
    }
}

/// The hint bundle every scan carries. The optimizer fills it in; the
/// reader honors what it can and reports back what it consumed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScanHints {
    /// Columns the plan actually reads, in schema order. `None` means
    /// the set was never computed and the reader returns everything.
    pub required_columns: Option<Vec<String>>,
    /// Conjuncts the reader should evaluate before emitting rows
    pub pushdown_filters: Vec<SimplePredicate>,
    /// Emit at most this many rows
    pub row_cap: Option<usize>,
    /// Predicates over partition columns, used to skip whole files
    pub partition_filters: Vec<SimplePredicate>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn col(name: &str) -> Expr {
        Expr::Column(name.to_string())
    }

    #[test]
    fn recognizes_simple_predicates() {
        let e = Expr::BinaryExpr {
            left: Box::new(col("age")),
            op: Operator::GtEq,
            right: Box::new(Expr::Literal(Value::Integer(25))),
        };
        let p = SimplePredicate::from_expr(&e).unwrap();
        assert_eq!(p.to_string(), "age>=25");
    }

    #[test]
    fn flips_literal_on_the_left() {
        let e = Expr::BinaryExpr {
            left: Box::new(Expr::Literal(Value::Integer(25))),
            op: Operator::Lt,
            right: Box::new(col("age")),
        };
        let p = SimplePredicate::from_expr(&e).unwrap();
        assert_eq!(p.to_string(), "age>25");
    }

    #[test]
    fn rejects_non_simple_shapes() {
        // column-to-column comparison is not pushable
        let e = Expr::BinaryExpr {
            left: Box::new(col("a")),
            op: Operator::Eq,
            right: Box::new(col("b")),
        };
        assert_eq!(SimplePredicate::from_expr(&e), None);

        // OR is not pushable
        let e = Expr::BinaryExpr {
            left: Box::new(col("a")),
            op: Operator::Or,
            right: Box::new(col("b")),
        };
        assert_eq!(SimplePredicate::from_expr(&e), None);
    }

    #[test]
    fn null_never_matches() {
        let p = SimplePredicate {
            column: "age".to_string(),
            op: CompareOp::NotEq,
            value: Value::Integer(1),
        };
        assert!(!p.evaluate(&Value::Null));
        assert!(p.evaluate(&Value::Integer(2)));
    }
}
