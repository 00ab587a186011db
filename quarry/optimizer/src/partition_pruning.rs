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

//! Optimizer rule moving simple predicates over partition columns out
//! of the WHERE clause and into scan hints. The predicates are
//! consumed: partition pruning against directory-encoded values is
//! exact, so the residual filter need not re-check them.

use quarry_common::Result;
use quarry_expr::{Expr, Filter, LogicalPlan, SimplePredicate};

use crate::{take_plan, OptimizerRule, RuleOutcome};

/// Moves exact partition-key predicates from filters into the scan
/// hints of partitioned sources
#[derive(Default)]
pub struct PartitionPruning {}

impl PartitionPruning {
    pub fn new() -> Self {
        Self {}
    }
}

impl OptimizerRule for PartitionPruning {
    fn name(&self) -> &str {
        "partition_pruning"
    }

    fn optimize(&self, plan: &mut LogicalPlan) -> Result<RuleOutcome> {
        let mut moved = 0;
        let mut saw_partitions = false;
        *plan = rewrite(take_plan(plan), &mut moved, &mut saw_partitions);
        Ok(if moved > 0 {
            RuleOutcome::applied(format!(
                "{moved} partition predicate{}",
                if moved == 1 { "" } else { "s" }
            ))
        } else if !saw_partitions {
            RuleOutcome::skipped("no partitions")
        } else {
            RuleOutcome::skipped("no partition predicates")
        })
    }
}

fn rewrite(plan: LogicalPlan, moved: &mut usize, saw_partitions: &mut bool) -> LogicalPlan {
    match plan {
        LogicalPlan::Filter(filter) => {
            let input = rewrite(*filter.input, moved, saw_partitions);
            let predicate = filter.predicate;
            match input {
                LogicalPlan::Scan(mut scan) if !scan.partition_columns.is_empty() => {
                    let mut residual = vec![];
                    for conjunct in predicate.split_conjunction() {
                        let partition_predicate = SimplePredicate::from_expr(conjunct)
                            .filter(|p| scan.partition_columns.contains(&p.column));
                        match partition_predicate {
                            Some(p) => {
                                if !scan.hints.partition_filters.contains(&p) {
                                    scan.hints.partition_filters.push(p);
                                }
                                *moved += 1;
                            }
                            None => residual.push(conjunct.clone()),
                        }
                    }
                    match Expr::conjunction(residual) {
                        Some(predicate) => LogicalPlan::Filter(Filter {
                            input: Box::new(LogicalPlan::Scan(scan)),
                            predicate,
                        }),
                        None => LogicalPlan::Scan(scan),
                    }
                }
                other => LogicalPlan::Filter(Filter {
                    input: Box::new(other),
                    predicate,
                }),
            }
        }
        LogicalPlan::Scan(scan) => {
            if !scan.partition_columns.is_empty() {
                *saw_partitions = true;
            }
            LogicalPlan::Scan(scan)
        }
        LogicalPlan::Projection(mut p) => {
            *p.input = rewrite(take_plan(&mut p.input), moved, saw_partitions);
            LogicalPlan::Projection(p)
        }
        LogicalPlan::Aggregate(mut a) => {
            *a.input = rewrite(take_plan(&mut a.input), moved, saw_partitions);
            LogicalPlan::Aggregate(a)
        }
        LogicalPlan::Sort(mut s) => {
            *s.input = rewrite(take_plan(&mut s.input), moved, saw_partitions);
            LogicalPlan::Sort(s)
        }
        LogicalPlan::Limit(mut l) => {
            *l.input = rewrite(take_plan(&mut l.input), moved, saw_partitions);
            LogicalPlan::Limit(l)
        }
        LogicalPlan::Join(mut j) => {
            *j.left = rewrite(take_plan(&mut j.left), moved, saw_partitions);
            *j.right = rewrite(take_plan(&mut j.right), moved, saw_partitions);
            LogicalPlan::Join(j)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use quarry_common::DataType;
    use quarry_expr::Operator;

    fn assert_optimized(mut plan: LogicalPlan, expected: &str) -> RuleOutcome {
        let outcome = PartitionPruning::new().optimize(&mut plan).unwrap();
        assert_eq!(plan.to_string(), expected);
        outcome
    }

    #[test]
    fn moves_partition_predicates_into_hints() {
        let scan = test_partitioned_scan(
            "ds",
            &[("v", DataType::Integer), ("year", DataType::Integer)],
            &["year"],
        );
        let plan = filter(
            scan,
            binary(col("year"), Operator::Eq, lit(2024i64)),
        );
        let outcome = assert_optimized(plan, "Scan(ds) partition_filters=[year=2024]\n");
        assert!(outcome.applied);
        assert_eq!(outcome.note, "1 partition predicate");
    }

    #[test]
    fn keeps_residual_conjuncts() {
        let scan = test_partitioned_scan(
            "ds",
            &[("v", DataType::Integer), ("year", DataType::Integer)],
            &["year"],
        );
        let plan = filter(
            scan,
            and(
                binary(col("year"), Operator::Eq, lit(2024i64)),
                binary(col("v"), Operator::Gt, lit(5i64)),
            ),
        );
        assert_optimized(
            plan,
            "Filter(v > 5)\
            \n  Scan(ds) partition_filters=[year=2024]\n",
        );
    }

    #[test]
    fn skips_unpartitioned_sources() {
        let plan = filter(
            test_scan("t.csv", &[("year", DataType::Integer)]),
            binary(col("year"), Operator::Eq, lit(2024i64)),
        );
        let outcome = assert_optimized(
            plan,
            "Filter(year = 2024)\
            \n  Scan(t.csv)\n",
        );
        assert!(!outcome.applied);
        assert_eq!(outcome.note, "no partitions");
    }

    #[test]
    fn rule_is_idempotent() {
        let scan = test_partitioned_scan(
            "ds",
            &[("v", DataType::Integer), ("year", DataType::Integer)],
            &["year"],
        );
        let mut plan = filter(
            scan,
            binary(col("year"), Operator::Eq, lit(2024i64)),
        );
        let rule = PartitionPruning::new();
        rule.optimize(&mut plan).unwrap();
        let first = plan.clone();
        rule.optimize(&mut plan).unwrap();
        assert_eq!(plan, first);
    }
}
