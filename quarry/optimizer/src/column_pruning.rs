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

//! Optimizer rule computing the set of columns each scan must produce:
//! the upward union of the SELECT list, filter predicates, group keys,
//! sort keys, join keys and aggregate arguments.

use quarry_common::Result;
use quarry_expr::LogicalPlan;

use crate::{OptimizerRule, RuleOutcome};

/// Attaches the required-column set to every scan's hints
#[derive(Default)]
pub struct ColumnPruning {}

impl ColumnPruning {
    pub fn new() -> Self {
        Self {}
    }
}

#[derive(Default)]
struct PruneStats {
    total_columns: usize,
    required_columns: usize,
    scans_pruned: usize,
}

impl OptimizerRule for ColumnPruning {
    fn name(&self) -> &str {
        "column_pruning"
    }

    fn optimize(&self, plan: &mut LogicalPlan) -> Result<RuleOutcome> {
        let mut stats = PruneStats::default();
        prune(plan, None, &mut stats);
        Ok(if stats.scans_pruned > 0 {
            RuleOutcome::applied(format!(
                "{} of {} columns",
                stats.required_columns, stats.total_columns
            ))
        } else if stats.total_columns > 0 {
            RuleOutcome::skipped("all columns required")
        } else {
            RuleOutcome::skipped("no scans")
        })
    }
}

fn add_column(required: &mut Vec<String>, column: &str) {
    if !required.iter().any(|c| c == column) {
        required.push(column.to_string());
    }
}

/// Walk down carrying the columns the parent needs. `None` means
/// everything (no narrowing operator above).
fn prune(plan: &mut LogicalPlan, required: Option<Vec<String>>, stats: &mut PruneStats) {
    match plan {
        LogicalPlan::Projection(p) => {
            let mut needed = vec![];
            for (expr, _) in &p.exprs {
                expr.columns(&mut needed);
            }
            prune(&mut p.input, Some(needed), stats);
        }
        LogicalPlan::Filter(f) => {
            let required = required.map(|mut r| {
                f.predicate.columns(&mut r);
                r
            });
            prune(&mut f.input, required, stats);
        }
        LogicalPlan::Sort(s) => {
            let required = required.map(|mut r| {
                for key in &s.keys {
                    add_column(&mut r, &key.column);
                }
                r
            });
            prune(&mut s.input, required, stats);
        }
        LogicalPlan::Limit(l) => prune(&mut l.input, required, stats),
        LogicalPlan::Aggregate(a) => {
            // the aggregate reads exactly its keys and arguments,
            // whatever the parent wanted of its outputs
            let mut needed = vec![];
            for key in &a.group_by {
                add_column(&mut needed, key);
            }
            for agg in &a.aggregates {
                if let Some(column) = &agg.column {
                    add_column(&mut needed, column);
                }
            }
            prune(&mut a.input, Some(needed), stats);
        }
        LogicalPlan::Join(j) => {
            let split = required.map(|mut r| {
                for (left_key, right_key) in &j.on {
                    add_column(&mut r, left_key);
                    add_column(&mut r, right_key);
                }
                let left: Vec<String> = r
                    .iter()
                    .filter(|c| j.left.schema().contains(c))
                    .cloned()
                    .collect();
                let right: Vec<String> = r
                    .iter()
                    .filter(|c| j.right.schema().contains(c))
                    .cloned()
                    .collect();
                (left, right)
            });
            match split {
                Some((left, right)) => {
                    prune(&mut j.left, Some(left), stats);
                    prune(&mut j.right, Some(right), stats);
                }
                None => {
                    prune(&mut j.left, None, stats);
                    prune(&mut j.right, None, stats);
                }
            }
        }
        LogicalPlan::Scan(scan) => {
            stats.total_columns += scan.schema.len();
            match required {
                Some(required) => {
                    // keep schema order; drop requirements the scan
                    // cannot satisfy (they would have failed binding)
                    let ordered: Vec<String> = scan
                        .schema
                        .names()
                        .filter(|n| required.iter().any(|r| r == n))
                        .map(|n| n.to_string())
                        .collect();
                    stats.required_columns += ordered.len();
                    if ordered.len() < scan.schema.len() {
                        stats.scans_pruned += 1;
                    }
                    scan.hints.required_columns = Some(ordered);
                }
                None => stats.required_columns += scan.schema.len(),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use quarry_common::DataType;
    use quarry_expr::{Expr, Operator};

    fn project(input: LogicalPlan, columns: &[&str]) -> LogicalPlan {
        LogicalPlan::projection(
            input,
            columns
                .iter()
                .map(|c| (Expr::Column(c.to_string()), c.to_string()))
                .collect(),
        )
        .unwrap()
    }

    #[test]
    fn requires_select_and_filter_columns() {
        let scan = test_scan(
            "data.csv",
            &[
                ("id", DataType::Integer),
                ("name", DataType::Utf8),
                ("age", DataType::Integer),
                ("city", DataType::Utf8),
            ],
        );
        let filtered = filter(scan, binary(col("age"), Operator::Gt, lit(25i64)));
        let mut plan = project(filtered, &["name"]);

        let outcome = ColumnPruning::new().optimize(&mut plan).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.note, "2 of 4 columns");
        // the scan keeps schema order: name before age
        assert!(plan
            .to_string()
            .contains("Scan(data.csv) columns=[name,age]"));
    }

    #[test]
    fn aggregate_requires_keys_and_arguments() {
        let scan = test_scan(
            "s.csv",
            &[
                ("k", DataType::Utf8),
                ("v", DataType::Integer),
                ("extra", DataType::Utf8),
            ],
        );
        let agg = LogicalPlan::aggregate(
            scan,
            vec!["k".to_string()],
            vec![quarry_expr::AggregateExpr {
                func: quarry_expr::AggregateFunc::Avg,
                column: Some("v".to_string()),
                output_name: "AVG(v)".to_string(),
            }],
        )
        .unwrap();
        let mut plan = project(agg, &["k", "AVG(v)"]);

        ColumnPruning::new().optimize(&mut plan).unwrap();
        assert!(plan.to_string().contains("Scan(s.csv) columns=[k,v]"));
    }

    #[test]
    fn join_keys_are_required_on_both_sides() {
        let join = LogicalPlan::join(
            test_scan(
                "u.csv",
                &[("u.id", DataType::Integer), ("u.name", DataType::Utf8)],
            ),
            test_scan(
                "o.csv",
                &[
                    ("o.uid", DataType::Integer),
                    ("o.amt", DataType::Integer),
                    ("o.note", DataType::Utf8),
                ],
            ),
            quarry_expr::JoinKind::Left,
            vec![("u.id".to_string(), "o.uid".to_string())],
        )
        .unwrap();
        let mut plan = project(join, &["u.name", "o.amt"]);

        ColumnPruning::new().optimize(&mut plan).unwrap();
        let text = plan.to_string();
        assert!(text.contains("Scan(u.csv) columns=[u.id,u.name]"));
        assert!(text.contains("Scan(o.csv) columns=[o.uid,o.amt]"));
    }

    #[test]
    fn no_projection_means_no_pruning() {
        let mut plan = test_scan("data.csv", &[("a", DataType::Integer)]);
        let outcome = ColumnPruning::new().optimize(&mut plan).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, "all columns required");
    }
}
