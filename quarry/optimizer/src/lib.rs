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

//! The optimizer pipeline: a fixed sequence of idempotent rewrite
//! rules, each mutating the plan in place and recording an audit
//! entry for the `explain` surface.

pub mod column_pruning;
pub mod limit_pushdown;
pub mod partition_pruning;
pub mod predicate_pushdown;

use log::debug;
use quarry_common::Result;
use quarry_expr::LogicalPlan;

pub use column_pruning::ColumnPruning;
pub use limit_pushdown::LimitPushdown;
pub use partition_pruning::PartitionPruning;
pub use predicate_pushdown::PredicatePushdown;

/// What one rule did to the plan
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuditEntry {
    pub rule: String,
    pub applied: bool,
    /// The effect when applied, the reason when skipped
    pub note: String,
}

impl std::fmt::Display for AuditEntry {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        let status = if self.applied { "applied" } else { "skipped" };
        write!(f, "{}: {status} ({})", self.rule, self.note)
    }
}

/// The outcome a rule reports back to the driver
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleOutcome {
    pub applied: bool,
    pub note: String,
}

impl RuleOutcome {
    pub fn applied(note: impl Into<String>) -> Self {
        Self {
            applied: true,
            note: note.into(),
        }
    }

    pub fn skipped(note: impl Into<String>) -> Self {
        Self {
            applied: false,
            note: note.into(),
        }
    }
}

/// One rewrite rule. Rules must be idempotent: running a rule twice
/// leaves the same plan as running it once.
pub trait OptimizerRule {
    fn name(&self) -> &str;

    /// Rewrite the plan in place, reporting whether and how the rule
    /// applied
    fn optimize(&self, plan: &mut LogicalPlan) -> Result<RuleOutcome>;
}

/// Applies the rules in their fixed order and collects the audit trail
pub struct Optimizer {
    rules: Vec<Box<dyn OptimizerRule + Send + Sync>>,
}

impl Default for Optimizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Optimizer {
    /// The standard pipeline: partition pruning, predicate pushdown,
    /// column pruning, limit pushdown
    pub fn new() -> Self {
        Self {
            rules: vec![
                Box::new(PartitionPruning::new()),
                Box::new(PredicatePushdown::new()),
                Box::new(ColumnPruning::new()),
                Box::new(LimitPushdown::new()),
            ],
        }
    }

    pub fn with_rules(rules: Vec<Box<dyn OptimizerRule + Send + Sync>>) -> Self {
        Self { rules }
    }

    pub fn optimize(&self, mut plan: LogicalPlan) -> Result<(LogicalPlan, Vec<AuditEntry>)> {
        let mut audit = Vec::with_capacity(self.rules.len());
        for rule in &self.rules {
            let outcome = rule.optimize(&mut plan)?;
            debug!(
                "optimizer rule {} {}: {}",
                rule.name(),
                if outcome.applied { "applied" } else { "skipped" },
                outcome.note
            );
            audit.push(AuditEntry {
                rule: rule.name().to_string(),
                applied: outcome.applied,
                note: outcome.note,
            });
        }
        Ok((plan, audit))
    }
}

/// Swap the plan out of a mutable slot so a rule can rebuild it by
/// value, leaving an empty scan behind until the rule writes back
pub(crate) fn take_plan(slot: &mut LogicalPlan) -> LogicalPlan {
    let placeholder = LogicalPlan::Scan(quarry_expr::Scan {
        locator: String::new(),
        qualifier: None,
        schema: quarry_common::Schema::empty(),
        partition_columns: vec![],
        hints: quarry_expr::ScanHints::default(),
    });
    std::mem::replace(slot, placeholder)
}


#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::{DataType, Schema};
    use quarry_expr::{Scan, ScanHints};

    #[test]
    fn driver_collects_audit_in_rule_order() {
        let plan = LogicalPlan::Scan(Scan {
            locator: "t.csv".to_string(),
            qualifier: None,
            schema: Schema::new([("a", DataType::Integer)]).unwrap(),
            partition_columns: vec![],
            hints: ScanHints::default(),
        });
        let (_, audit) = Optimizer::new().optimize(plan).unwrap();
        let names: Vec<&str> = audit.iter().map(|e| e.rule.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "partition_pruning",
                "predicate_pushdown",
                "column_pruning",
                "limit_pushdown",
            ]
        );
    }
}
