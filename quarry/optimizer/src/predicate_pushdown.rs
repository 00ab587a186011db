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

//! Optimizer rule attaching simple filter conjuncts to the scan that
//! owns their column. The residual filter keeps every conjunct: a
//! reader that consumed a pushed filter saves decoding work, and the
//! re-check above costs one comparison per row. Predicates whose
//! columns span a join never move, and neither does any conjunct
//! below an outer join.

use quarry_common::{is_comparable, Result};
use quarry_expr::{JoinKind, LogicalPlan, SimplePredicate};

use crate::{OptimizerRule, RuleOutcome};

/// Pushes simple single-scan conjuncts into scan hints
#[derive(Default)]
pub struct PredicatePushdown {}

impl PredicatePushdown {
    pub fn new() -> Self {
        Self {}
    }
}

impl OptimizerRule for PredicatePushdown {
    fn name(&self) -> &str {
        "predicate_pushdown"
    }

    fn optimize(&self, plan: &mut LogicalPlan) -> Result<RuleOutcome> {
        let mut pushed = 0;
        rewrite(plan, &mut pushed);
        Ok(if pushed > 0 {
            RuleOutcome::applied(format!(
                "{pushed} conjunct{}",
                if pushed == 1 { "" } else { "s" }
            ))
        } else {
            RuleOutcome::skipped("no pushable conjuncts")
        })
    }
}

fn rewrite(plan: &mut LogicalPlan, pushed: &mut usize) {
    match plan {
        LogicalPlan::Filter(filter) => {
            rewrite(&mut filter.input, pushed);
            let conjuncts: Vec<SimplePredicate> = filter
                .predicate
                .split_conjunction()
                .into_iter()
                .filter_map(SimplePredicate::from_expr)
                .collect();
            for predicate in conjuncts {
                push_to_scan(&mut filter.input, &predicate, pushed);
            }
        }
        LogicalPlan::Projection(p) => rewrite(&mut p.input, pushed),
        LogicalPlan::Aggregate(a) => rewrite(&mut a.input, pushed),
        LogicalPlan::Sort(s) => rewrite(&mut s.input, pushed),
        LogicalPlan::Limit(l) => rewrite(&mut l.input, pushed),
        LogicalPlan::Join(j) => {
            rewrite(&mut j.left, pushed);
            rewrite(&mut j.right, pushed);
        }
        LogicalPlan::Scan(_) => {}
    }
}

/// Attach `predicate` to the scan that owns its column, descending
/// only through inner joins; below an outer join the filter would
/// change null-extension semantics. Returns whether a scan took it.
fn push_to_scan(
    plan: &mut LogicalPlan,
    predicate: &SimplePredicate,
    pushed: &mut usize,
) -> bool {
    match plan {
        LogicalPlan::Scan(scan) => {
            if !scan.schema.contains(&predicate.column) {
                return false;
            }
            // the reader only supports comparisons the type system can
            // decide
            let column_type = scan
                .schema
                .field_type(&predicate.column)
                .expect("column checked above");
            if !is_comparable(column_type, &predicate.value.data_type()) {
                return false;
            }
            if !scan.hints.pushdown_filters.contains(predicate) {
                scan.hints.pushdown_filters.push(predicate.clone());
                *pushed += 1;
            }
            true
        }
        LogicalPlan::Join(j) if j.kind == JoinKind::Inner => {
            push_to_scan(&mut j.left, predicate, pushed)
                || push_to_scan(&mut j.right, predicate, pushed)
        }
        LogicalPlan::Filter(f) => push_to_scan(&mut f.input, predicate, pushed),
        _ => false,
    }
}
