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

//! Optimizer rule capping the scan's row count when a LIMIT sits over
//! a linear, non-blocking pipeline. Sorts, aggregates and joins need
//! every input row, so any of them blocks the pushdown; a filter is
//! transparent only when the reader itself enforces each of its
//! conjuncts.

use quarry_common::Result;
use quarry_expr::{LogicalPlan, Scan, SimplePredicate};

use crate::{OptimizerRule, RuleOutcome};

/// Pushes `LIMIT n` down to the scan's row cap where sound
#[derive(Default)]
pub struct LimitPushdown {}

impl LimitPushdown {
    pub fn new() -> Self {
        Self {}
    }
}

impl OptimizerRule for LimitPushdown {
    fn name(&self) -> &str {
        "limit_pushdown"
    }

    fn optimize(&self, plan: &mut LogicalPlan) -> Result<RuleOutcome> {
        let LogicalPlan::Limit(limit) = plan else {
            return Ok(RuleOutcome::skipped("no limit"));
        };
        let n = limit.n;
        Ok(match find_cappable_scan(&mut limit.input, n) {
            Ok((scan, n)) => {
                scan.hints.row_cap =
                    Some(scan.hints.row_cap.map_or(n, |cap| cap.min(n)));
                RuleOutcome::applied(format!("n={n}"))
            }
            Err(reason) => RuleOutcome::skipped(reason),
        })
    }
}

/// Descend towards a single scan, proving every operator on the way
/// preserves the row-for-row correspondence the cap relies on
fn find_cappable_scan(
    plan: &mut LogicalPlan,
    n: usize,
) -> Result<(&mut Scan, usize), &'static str> {
    match plan {
        LogicalPlan::Scan(scan) => Ok((scan, n)),
        LogicalPlan::Projection(p) => find_cappable_scan(&mut p.input, n),
        LogicalPlan::Limit(l) => {
            let n = n.min(l.n);
            find_cappable_scan(&mut l.input, n)
        }
        LogicalPlan::Filter(f) => {
            let conjuncts: Option<Vec<SimplePredicate>> = f
                .predicate
                .split_conjunction()
                .into_iter()
                .map(SimplePredicate::from_expr)
                .collect();
            let Some(conjuncts) = conjuncts else {
                return Err("filter above the scan is not fully pushed");
            };
            let (scan, n) = find_cappable_scan(&mut f.input, n)?;
            if conjuncts
                .iter()
                .all(|c| scan.hints.pushdown_filters.contains(c))
            {
                Ok((scan, n))
            } else {
                Err("filter above the scan is not fully pushed")
            }
        }
        LogicalPlan::Sort(_) => Err("sort is blocking"),
        LogicalPlan::Aggregate(_) => Err("aggregate is blocking"),
        LogicalPlan::Join(_) => Err("join is blocking"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_util::*;
    use crate::PredicatePushdown;
    use quarry_common::DataType;
    use quarry_expr::{Expr, Limit, Operator};

    fn limit(input: LogicalPlan, n: usize) -> LogicalPlan {
        LogicalPlan::Limit(Limit {
            input: Box::new(input),
            n,
        })
    }

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
    fn caps_scan_through_projection() {
        let scan = test_scan("big.csv", &[("a", DataType::Integer)]);
        let mut plan = limit(project(scan, &["a"]), 3);

        let outcome = LimitPushdown::new().optimize(&mut plan).unwrap();
        assert!(outcome.applied);
        assert_eq!(outcome.note, "n=3");
        assert!(plan.to_string().contains("Scan(big.csv) row_cap=3"));
    }

    #[test]
    fn nested_limits_take_the_smaller() {
        let scan = test_scan("big.csv", &[("a", DataType::Integer)]);
        let mut plan = limit(limit(scan, 10), 1000);
        LimitPushdown::new().optimize(&mut plan).unwrap();
        assert!(plan.to_string().contains("row_cap=10"));
    }

    #[test]
    fn aggregate_blocks_pushdown() {
        let scan = test_scan("s.csv", &[("v", DataType::Integer)]);
        let agg = LogicalPlan::aggregate(
            scan,
            vec![],
            vec![quarry_expr::AggregateExpr {
                func: quarry_expr::AggregateFunc::Count,
                column: None,
                output_name: "COUNT(*)".to_string(),
            }],
        )
        .unwrap();
        let mut plan = limit(agg, 10);

        let outcome = LimitPushdown::new().optimize(&mut plan).unwrap();
        assert!(!outcome.applied);
        assert_eq!(outcome.note, "aggregate is blocking");
        assert!(!plan.to_string().contains("row_cap"));
    }

    #[test]
    fn unpushed_filter_blocks_but_pushed_filter_does_not() {
        let scan = test_scan("data.csv", &[("age", DataType::Integer)]);
        let filtered = filter(scan, binary(col("age"), Operator::Gt, lit(25i64)));
        let mut plan = limit(filtered, 10);

        // without predicate pushdown the filter blocks the cap
        let outcome = LimitPushdown::new().optimize(&mut plan).unwrap();
        assert!(!outcome.applied);

        // once the reader enforces the predicate, the cap is sound
        PredicatePushdown::new().optimize(&mut plan).unwrap();
        let outcome = LimitPushdown::new().optimize(&mut plan).unwrap();
        assert!(outcome.applied);
        assert_eq!(
            plan.to_string(),
            "Limit(10)\
            \n  Filter(age > 25)\
            \n    Scan(data.csv) pushdown_filters=[age>25] row_cap=10\n"
        );
    }

    #[test]
    fn rule_is_idempotent() {
        let scan = test_scan("big.csv", &[("a", DataType::Integer)]);
        let mut plan = limit(scan, 5);
        let rule = LimitPushdown::new();
        rule.optimize(&mut plan).unwrap();
        let first = plan.clone();
        rule.optimize(&mut plan).unwrap();
        assert_eq!(plan, first);
    }
}
