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

//! Row-expression evaluation with three-valued logic: comparisons
//! against null are null, and null reads as false in filter context

use quarry_common::{QuarryError, Result, Row, Value};
use quarry_expr::{Expr, Operator};

/// Evaluate an expression against a row
pub fn evaluate(expr: &Expr, row: &Row) -> Result<Value> {
    match expr {
        Expr::Column(name) => Ok(row.get_or_null(name)),
        Expr::Literal(value) => Ok(value.clone()),
        Expr::BinaryExpr { left, op, right } => {
            if op.is_logical() {
                return evaluate_logical(left, *op, right, row);
            }
            let lhs = evaluate(left, row)?;
            let rhs = evaluate(right, row)?;
            if op.is_comparison() {
                return Ok(match lhs.compare(&rhs)? {
                    None => Value::Null,
                    Some(ordering) => Value::Boolean(comparison_matches(*op, ordering)),
                });
            }
            match op {
                Operator::Plus => lhs.add(&rhs),
                Operator::Minus => lhs.sub(&rhs),
                Operator::Multiply => lhs.mul(&rhs),
                Operator::Divide => lhs.div(&rhs),
                _ => quarry_common::internal_err!("unexpected operator {op}"),
            }
        }
        Expr::Not(inner) => match truth(&evaluate(inner, row)?, "NOT")? {
            None => Ok(Value::Null),
            Some(b) => Ok(Value::Boolean(!b)),
        },
        Expr::IsNull { expr, negated } => {
            let value = evaluate(expr, row)?;
            Ok(Value::Boolean(value.is_null() != *negated))
        }
    }
}

/// Evaluate a predicate for filter context: null collapses to false
pub fn evaluate_predicate(expr: &Expr, row: &Row) -> Result<bool> {
    Ok(truth(&evaluate(expr, row)?, "a filter predicate")?.unwrap_or(false))
}

/// Kleene AND/OR over possibly-null boolean operands
fn evaluate_logical(left: &Expr, op: Operator, right: &Expr, row: &Row) -> Result<Value> {
    let lhs = truth(&evaluate(left, row)?, "AND/OR")?;
    // short-circuit on the dominating operand
    match (op, lhs) {
        (Operator::And, Some(false)) => return Ok(Value::Boolean(false)),
        (Operator::Or, Some(true)) => return Ok(Value::Boolean(true)),
        _ => {}
    }
    let rhs = truth(&evaluate(right, row)?, "AND/OR")?;
    let result = match op {
        Operator::And => match (lhs, rhs) {
            (_, Some(false)) => Some(false),
            (Some(true), Some(true)) => Some(true),
            _ => None,
        },
        Operator::Or => match (lhs, rhs) {
            (_, Some(true)) => Some(true),
            (Some(false), Some(false)) => Some(false),
            _ => None,
        },
        _ => unreachable!("only AND/OR reach here"),
    };
    Ok(match result {
        None => Value::Null,
        Some(b) => Value::Boolean(b),
    })
}

fn truth(value: &Value, context: &str) -> Result<Option<bool>> {
    match value {
        Value::Null => Ok(None),
        Value::Boolean(b) => Ok(Some(*b)),
        other => Err(QuarryError::type_mismatch(
            context,
            other.data_type(),
            quarry_common::DataType::Boolean,
        )),
    }
}

fn comparison_matches(op: Operator, ordering: std::cmp::Ordering) -> bool {
    use std::cmp::Ordering::*;
    match op {
        Operator::Eq => ordering == Equal,
        Operator::NotEq => ordering != Equal,
        Operator::Lt => ordering == Less,
        Operator::LtEq => ordering != Greater,
        Operator::Gt => ordering == Greater,
        Operator::GtEq => ordering != Less,
        _ => unreachable!("only comparisons reach here"),
    }
}
