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

//! AST → logical plan binder. Column references are resolved against
//! the bound source schemas here, so every schema error is reported
//! before a single row is read.

use quarry_common::{parse_string_as, DataType, QuarryError, Result, Schema};
use quarry_expr::{
    AggregateExpr, Expr, JoinKind, LogicalPlan, Operator, Scan, ScanHints, SortKey,
};

use crate::ast::{self, ColumnRef, Query, SelectItem};

/// A FROM source bound to a concrete reader: its resolved locator, the
/// schema the reader inferred (including virtual partition columns)
/// and the partition column names
#[derive(Debug, Clone)]
pub struct BoundSource {
    pub locator: String,
    pub alias: Option<String>,
    pub schema: Schema,
    pub partition_columns: Vec<String>,
}

/// Derive a qualifier from a locator when the query gives no alias:
/// the file stem of the last path component
fn locator_stem(locator: &str) -> String {
    let path = locator.split('#').next().unwrap_or(locator);
    let base = path
        .trim_end_matches('/')
        .rsplit(['/', '\\'])
        .next()
        .unwrap_or(path);
    match base.rsplit_once('.') {
        Some((stem, _ext)) if !stem.is_empty() => stem.to_string(),
        _ => base.to_string(),
    }
}

/// Resolve a written column reference against a schema whose keys may
/// be plain or `qualifier.name` shaped
fn resolve_against(schema: &Schema, column: &ColumnRef) -> Result<String> {
    let written = column.to_string();
    if schema.contains(&written) {
        return Ok(written);
    }
    if column.qualifier.is_none() {
        let suffix = format!(".{}", column.name);
        let candidates: Vec<&str> = schema
            .names()
            .filter(|n| n.ends_with(suffix.as_str()))
            .collect();
        match candidates.len() {
            1 => return Ok(candidates[0].to_string()),
            0 => {}
            _ => {
                return Err(QuarryError::Schema(format!(
                    "column '{written}' is ambiguous, matches: {}",
                    candidates.join(", ")
                )))
            }
        }
    }
    Err(QuarryError::Schema(format!(
        "column '{written}' not found in schema"
    )))
}

/// When a comparison mixes a temporal or boolean column with a string
/// literal, parse the literal into the column's type at plan time, the
/// way users write `d >= '2023-01-01'`
fn coerce_comparison_literal(left: Expr, op: Operator, right: Expr, schema: &Schema) -> Result<Expr> {
    fn column_type(e: &Expr, schema: &Schema) -> Option<DataType> {
        match e {
            Expr::Column(name) => schema.field_type(name).copied(),
            _ => None,
        }
    }

    fn coerce(literal: &Expr, target: DataType) -> Option<Expr> {
        let Expr::Literal(quarry_common::Value::Utf8(s)) = literal else {
            return None;
        };
        if !matches!(
            target,
            DataType::Date | DataType::Time | DataType::Timestamp | DataType::Boolean
        ) {
            return None;
        }
        parse_string_as(s, &target).map(Expr::Literal)
    }

    let (left, right) = if op.is_comparison() {
        match (column_type(&left, schema), column_type(&right, schema)) {
            (Some(t), None) => {
                let right = coerce(&right, t).unwrap_or(right);
                (left, right)
            }
            (None, Some(t)) => {
                let left = coerce(&left, t).unwrap_or(left);
                (left, right)
            }
            _ => (left, right),
        }
    } else {
        (left, right)
    };
    Ok(Expr::BinaryExpr {
        left: Box::new(left),
        op,
        right: Box::new(right),
    })
}

/// Resolve an unresolved expression; aggregates are rejected (the
/// SELECT list handles them separately)
fn resolve_expr(expr: &ast::Expr, schema: &Schema, context: &str) -> Result<Expr> {
    match expr {
        ast::Expr::Identifier(c) => Ok(Expr::Column(resolve_against(schema, c)?)),
        ast::Expr::Literal(v) => Ok(Expr::Literal(v.clone())),
        ast::Expr::BinaryOp { left, op, right } => {
            let left = resolve_expr(left, schema, context)?;
            let right = resolve_expr(right, schema, context)?;
            coerce_comparison_literal(left, *op, right, schema)
        }
        ast::Expr::Not(e) => Ok(Expr::Not(Box::new(resolve_expr(e, schema, context)?))),
        ast::Expr::IsNull { expr, negated } => Ok(Expr::IsNull {
            expr: Box::new(resolve_expr(expr, schema, context)?),
            negated: *negated,
        }),
        ast::Expr::Aggregate { .. } => Err(QuarryError::Schema(format!(
            "aggregate calls are not allowed in {context}"
        ))),
    }
}

/// Collect the aggregate calls of a SELECT expression, keyed by their
/// written form
fn collect_aggregates(expr: &ast::Expr, out: &mut Vec<ast::Expr>) {
    match expr {
        ast::Expr::Aggregate { .. } => {
            if !out.contains(expr) {
                out.push(expr.clone());
            }
        }
        ast::Expr::Identifier(_) | ast::Expr::Literal(_) => {}
        ast::Expr::BinaryOp { left, right, .. } => {
            collect_aggregates(left, out);
            collect_aggregates(right, out);
        }
        ast::Expr::Not(e) => collect_aggregates(e, out),
        ast::Expr::IsNull { expr, .. } => collect_aggregates(expr, out),
    }
}

/// Resolve a SELECT expression after aggregation: aggregate calls read
/// the aggregate node's output column, bare identifiers must be group
/// keys (enforced by resolution against the aggregate output schema)
fn resolve_projected_expr(expr: &ast::Expr, schema: &Schema) -> Result<Expr> {
    match expr {
        ast::Expr::Aggregate { .. } => {
            let name = expr.to_string();
            if schema.contains(&name) {
                Ok(Expr::Column(name))
            } else {
                Err(QuarryError::Schema(format!(
                    "aggregate '{name}' not produced by the aggregation"
                )))
            }
        }
        ast::Expr::Identifier(c) => Ok(Expr::Column(resolve_against(schema, c)?)),
        ast::Expr::Literal(v) => Ok(Expr::Literal(v.clone())),
        ast::Expr::BinaryOp { left, op, right } => {
            let left = resolve_projected_expr(left, schema)?;
            let right = resolve_projected_expr(right, schema)?;
            coerce_comparison_literal(left, *op, right, schema)
        }
        ast::Expr::Not(e) => Ok(Expr::Not(Box::new(resolve_projected_expr(e, schema)?))),
        ast::Expr::IsNull { expr, negated } => Ok(Expr::IsNull {
            expr: Box::new(resolve_projected_expr(expr, schema)?),
            negated: *negated,
        }),
    }
}

/// Build a logical plan for `query`. `sources` must line up with the
/// query's FROM items followed by its JOIN items, in order.
pub fn plan_query(query: &Query, sources: &[BoundSource]) -> Result<LogicalPlan> {
    let expected = query.from.len() + query.joins.len();
    if sources.len() != expected {
        return quarry_common::internal_err!(
            "planner got {} bound sources for {expected} query sources",
            sources.len()
        );
    }

    // a source is qualified when it has an alias or shares the query
    // with other sources
    let multi_source = expected > 1;
    let qualifiers: Vec<Option<String>> = sources
        .iter()
        .map(|s| {
            s.alias.clone().or_else(|| {
                multi_source.then(|| locator_stem(&s.locator))
            })
        })
        .collect();
    for (i, q) in qualifiers.iter().enumerate() {
        if let Some(q) = q {
            if qualifiers[..i].iter().any(|other| other.as_deref() == Some(q)) {
                return Err(QuarryError::Schema(format!(
                    "duplicate table alias '{q}'"
                )));
            }
        }
    }

    let mut scans = sources
        .iter()
        .zip(&qualifiers)
        .map(|(source, qualifier)| {
            let (schema, partition_columns) = match qualifier {
                Some(q) => (
                    source.schema.qualify(q),
                    source
                        .partition_columns
                        .iter()
                        .map(|c| format!("{q}.{c}"))
                        .collect(),
                ),
                None => (source.schema.clone(), source.partition_columns.clone()),
            };
            LogicalPlan::Scan(Scan {
                locator: source.locator.clone(),
                qualifier: qualifier.clone(),
                schema,
                partition_columns,
                hints: ScanHints::default(),
            })
        })
        .collect::<Vec<_>>();

    // comma sources cross join; explicit JOIN clauses chain on the end
    let join_scans = scans.split_off(query.from.len());
    let mut plan = scans.remove(0);
    for scan in scans {
        plan = LogicalPlan::join(plan, scan, JoinKind::Inner, vec![])?;
    }
    for (clause, scan) in query.joins.iter().zip(join_scans) {
        let on = extract_equi_keys(&clause.on, plan.schema(), scan.schema())?;
        plan = LogicalPlan::join(plan, scan, clause.kind, on)?;
    }

    if let Some(selection) = &query.selection {
        let predicate = resolve_expr(selection, plan.schema(), "WHERE")?;
        // reject ill-typed predicates at plan time
        predicate.data_type(plan.schema())?;
        plan = LogicalPlan::Filter(quarry_expr::Filter {
            input: Box::new(plan),
            predicate,
        });
    }

    // gather aggregate calls across the whole SELECT list
    let mut agg_asts = vec![];
    for item in &query.projection {
        if let SelectItem::Expr { expr, .. } = item {
            collect_aggregates(expr, &mut agg_asts);
        }
    }
    let has_aggregation = !agg_asts.is_empty() || !query.group_by.is_empty();

    if has_aggregation {
        if query.projection.contains(&SelectItem::Wildcard) {
            return Err(QuarryError::Schema(
                "SELECT * cannot be combined with GROUP BY or aggregates".to_string(),
            ));
        }
        let group_by = query
            .group_by
            .iter()
            .map(|c| resolve_against(plan.schema(), c))
            .collect::<Result<Vec<_>>>()?;
        let aggregates = agg_asts
            .iter()
            .map(|agg| {
                let ast::Expr::Aggregate { func, column } = agg else {
                    unreachable!("collect_aggregates only returns aggregate nodes");
                };
                let column = column
                    .as_ref()
                    .map(|c| resolve_against(plan.schema(), c))
                    .transpose()?;
                Ok(AggregateExpr {
                    func: *func,
                    column,
                    output_name: agg.to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plan = LogicalPlan::aggregate(plan, group_by, aggregates)?;
    }

    // ORDER BY binds below the projection, against the aggregate
    // output or the raw source columns; a key naming a projection
    // alias falls back to the aliased column
    if !query.order_by.is_empty() {
        let keys = query
            .order_by
            .iter()
            .map(|key| {
                let column = match resolve_against(plan.schema(), &key.column) {
                    Ok(c) => c,
                    Err(e) => resolve_alias_fallback(query, plan.schema(), &key.column)
                        .ok_or(e)?,
                };
                Ok(SortKey {
                    column,
                    ascending: key.ascending,
                })
            })
            .collect::<Result<Vec<_>>>()?;
        plan = LogicalPlan::Sort(quarry_expr::Sort {
            input: Box::new(plan),
            keys,
        });
    }

    plan = build_projection(query, plan, has_aggregation)?;

    if let Some(n) = query.limit {
        plan = LogicalPlan::Limit(quarry_expr::Limit {
            input: Box::new(plan),
            n,
        });
    }

    Ok(plan)
}

/// `ORDER BY x` where `x` is `SELECT col AS x`: sort by the underlying
/// column. Computed aliases cannot be sorted on (the sort runs below
/// the projection).
fn resolve_alias_fallback(
    query: &Query,
    schema: &Schema,
    key: &ColumnRef,
) -> Option<String> {
    if key.qualifier.is_some() {
        return None;
    }
    query.projection.iter().find_map(|item| match item {
        SelectItem::Expr {
            expr,
            alias: Some(alias),
        } if *alias == key.name => match expr {
            ast::Expr::Identifier(c) => resolve_against(schema, c).ok(),
            ast::Expr::Aggregate { .. } => {
                let name = expr.to_string();
                schema.contains(&name).then_some(name)
            }
            _ => None,
        },
        _ => None,
    })
}

fn build_projection(
    query: &Query,
    input: LogicalPlan,
    has_aggregation: bool,
) -> Result<LogicalPlan> {
    if query.projection == [SelectItem::Wildcard] {
        let exprs: Vec<(Expr, String)> = input
            .schema()
            .names()
            .map(|name| (Expr::Column(name.to_string()), name.to_string()))
            .collect();
        return LogicalPlan::projection(input, exprs);
    }

    let mut items: Vec<(Expr, String)> = vec![];
    for item in &query.projection {
        let SelectItem::Expr { expr, alias } = item else {
            return Err(QuarryError::Schema(
                "SELECT * cannot be mixed with other projection items".to_string(),
            ));
        };
        let resolved = if has_aggregation {
            resolve_projected_expr(expr, input.schema())?
        } else {
            resolve_expr(expr, input.schema(), "the SELECT list")?
        };
        let name = match alias {
            Some(alias) => alias.clone(),
            None => match expr {
                // a bare column projects under its unqualified name
                ast::Expr::Identifier(c) => c.name.clone(),
                other => other.to_string(),
            },
        };
        items.push((resolved, name));
    }

    // when unqualified names collide (u.name and o.name both project
    // as "name"), fall back to the written form for the duplicates
    let mut deduped: Vec<(Expr, String)> = vec![];
    for (i, (expr, name)) in items.iter().enumerate() {
        let collides = items
            .iter()
            .enumerate()
            .any(|(j, (_, other))| j != i && other == name);
        let name = if collides {
            match &query.projection[i] {
                SelectItem::Expr { expr, .. } => expr.to_string(),
                SelectItem::Wildcard => name.clone(),
            }
        } else {
            name.clone()
        };
        deduped.push((expr.clone(), name));
    }

    LogicalPlan::projection(input, deduped)
}

/// Extract the equi-key pairs of a hash join's ON condition. Anything
/// other than a conjunction of cross-side column equalities is
/// unsupported.
fn extract_equi_keys(
    on: &ast::Expr,
    left: &Schema,
    right: &Schema,
) -> Result<Vec<(String, String)>> {
    fn conjuncts<'a>(e: &'a ast::Expr, out: &mut Vec<&'a ast::Expr>) {
        match e {
            ast::Expr::BinaryOp {
                left,
                op: Operator::And,
                right,
            } => {
                conjuncts(left, out);
                conjuncts(right, out);
            }
            other => out.push(other),
        }
    }

    let mut flat = vec![];
    conjuncts(on, &mut flat);

    let mut keys = vec![];
    for conjunct in flat {
        let unsupported =
            || QuarryError::UnsupportedJoinCondition(on.to_string());
        let ast::Expr::BinaryOp {
            left: a,
            op: Operator::Eq,
            right: b,
        } = conjunct
        else {
            return Err(unsupported());
        };
        let (ast::Expr::Identifier(a), ast::Expr::Identifier(b)) =
            (a.as_ref(), b.as_ref())
        else {
            return Err(unsupported());
        };
        // each side of the equality must bind to a different input
        let pair = match (resolve_against(left, a), resolve_against(right, b)) {
            (Ok(l), Ok(r)) => (l, r),
            _ => match (resolve_against(left, b), resolve_against(right, a)) {
                (Ok(l), Ok(r)) => (l, r),
                _ => return Err(unsupported()),
            },
        };
        keys.push(pair);
    }
    Ok(keys)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::Parser;
    use quarry_common::DataType;

    fn users() -> BoundSource {
        BoundSource {
            locator: "u.csv".to_string(),
            alias: Some("u".to_string()),
            schema: Schema::new([
                ("id", DataType::Integer),
                ("name", DataType::Utf8),
            ])
            .unwrap(),
            partition_columns: vec![],
        }
    }

    fn orders() -> BoundSource {
        BoundSource {
            locator: "o.csv".to_string(),
            alias: Some("o".to_string()),
            schema: Schema::new([
                ("uid", DataType::Integer),
                ("amt", DataType::Integer),
            ])
            .unwrap(),
            partition_columns: vec![],
        }
    }

    fn plan(sql: &str, sources: &[BoundSource]) -> Result<LogicalPlan> {
        let query = Parser::parse_query(sql).map_err(QuarryError::Parse)?;
        plan_query(&query, sources)
    }

    #[test]
    fn single_source_stays_unqualified() {
        let source = BoundSource {
            locator: "e.csv".to_string(),
            alias: None,
            schema: Schema::new([
                ("id", DataType::Integer),
                ("name", DataType::Utf8),
                ("age", DataType::Integer),
            ])
            .unwrap(),
            partition_columns: vec![],
        };
        let plan = plan(
            "SELECT name FROM 'e.csv' WHERE age >= 25 ORDER BY name",
            &[source],
        )
        .unwrap();
        let expected = "Project(name)\
        \n  Sort(name ASC)\
        \n    Filter(age >= 25)\
        \n      Scan(e.csv)\n";
        assert_eq!(plan.to_string(), expected);
    }

    #[test]
    fn join_resolves_qualified_columns() {
        let plan = plan(
            "SELECT u.name, o.amt FROM 'u.csv' u \
             LEFT JOIN 'o.csv' o ON u.id = o.uid ORDER BY u.name, o.amt",
            &[users(), orders()],
        )
        .unwrap();
        let expected = "Project(u.name AS name, o.amt AS amt)\
        \n  Sort(u.name ASC, o.amt ASC)\
        \n    Join(LEFT, u.id = o.uid)\
        \n      Scan(u.csv)\
        \n      Scan(o.csv)\n";
        assert_eq!(plan.to_string(), expected);
    }

    #[test]
    fn non_equi_join_is_unsupported() {
        let err = plan(
            "SELECT u.name FROM 'u.csv' u INNER JOIN 'o.csv' o ON u.id > o.uid",
            &[users(), orders()],
        )
        .unwrap_err();
        assert!(matches!(err, QuarryError::UnsupportedJoinCondition(_)));
    }

    #[test]
    fn aggregates_group_and_rename() {
        let source = BoundSource {
            locator: "s.csv".to_string(),
            alias: None,
            schema: Schema::new([("k", DataType::Utf8), ("v", DataType::Integer)])
                .unwrap(),
            partition_columns: vec![],
        };
        let plan = plan(
            "SELECT k, AVG(v) FROM 's.csv' GROUP BY k ORDER BY k",
            &[source],
        )
        .unwrap();
        let expected = "Project(k, AVG(v))\
        \n  Sort(k ASC)\
        \n    Aggregate(group_by=[k], aggregates=[AVG(v)])\
        \n      Scan(s.csv)\n";
        assert_eq!(plan.to_string(), expected);
        assert_eq!(plan.schema().to_string(), "k: utf8, AVG(v): float");
    }

    #[test]
    fn selecting_ungrouped_column_fails() {
        let source = BoundSource {
            locator: "s.csv".to_string(),
            alias: None,
            schema: Schema::new([
                ("k", DataType::Utf8),
                ("x", DataType::Utf8),
                ("v", DataType::Integer),
            ])
            .unwrap(),
            partition_columns: vec![],
        };
        let err = plan("SELECT x, SUM(v) FROM 's.csv' GROUP BY k", &[source])
            .unwrap_err();
        assert!(err.to_string().contains("'x' not found"));
    }

    #[test]
    fn unknown_and_ambiguous_columns() {
        let err = plan(
            "SELECT missing FROM 'u.csv' u INNER JOIN 'o.csv' o ON u.id = o.uid",
            &[users(), orders()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("'missing' not found"));

        let mut o = orders();
        o.schema = Schema::new([
            ("uid", DataType::Integer),
            ("name", DataType::Utf8),
        ])
        .unwrap();
        let err = plan(
            "SELECT name FROM 'u.csv' u INNER JOIN 'o.csv' o ON u.id = o.uid",
            &[users(), o],
        )
        .unwrap_err();
        assert!(err.to_string().contains("ambiguous"));
    }

    #[test]
    fn temporal_literal_coerces_at_plan_time() {
        let source = BoundSource {
            locator: "d.csv".to_string(),
            alias: None,
            schema: Schema::new([("day", DataType::Date)]).unwrap(),
            partition_columns: vec![],
        };
        let plan = plan(
            "SELECT day FROM 'd.csv' WHERE day >= '2023-01-01'",
            &[source],
        )
        .unwrap();
        // the literal is now a date, so the plan type-checks
        assert!(plan.to_string().contains("Filter(day >= 2023-01-01)"));
    }

    #[test]
    fn where_rejects_aggregates_and_bad_types() {
        let source = BoundSource {
            locator: "e.csv".to_string(),
            alias: None,
            schema: Schema::new([
                ("name", DataType::Utf8),
                ("age", DataType::Integer),
            ])
            .unwrap(),
            partition_columns: vec![],
        };
        let err = plan(
            "SELECT name FROM 'e.csv' WHERE SUM(age) > 10",
            &[source.clone()],
        )
        .unwrap_err();
        assert!(err.to_string().contains("not allowed in WHERE"));

        let err =
            plan("SELECT name FROM 'e.csv' WHERE name > 10", &[source]).unwrap_err();
        assert!(matches!(err, QuarryError::Type { .. }));
    }

    #[test]
    fn colliding_output_names_requalify() {
        let mut o = orders();
        o.schema = Schema::new([
            ("uid", DataType::Integer),
            ("name", DataType::Utf8),
        ])
        .unwrap();
        let plan = plan(
            "SELECT u.name, o.name FROM 'u.csv' u INNER JOIN 'o.csv' o ON u.id = o.uid",
            &[users(), o],
        )
        .unwrap();
        assert_eq!(
            plan.schema().to_string(),
            "u.name: utf8, o.name: utf8"
        );
    }
}
