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

//! Builds the operator tree from an optimized logical plan. The plan
//! is consumed once; each operator exclusively owns its children and
//! its state for the duration of the query.

use quarry_common::{is_comparable, promote, QuarryError, ReaderOptions, Result};
use quarry_expr::{JoinKind, LogicalPlan};

use crate::datasource::{locator, registry};
use crate::execution::aggregate::AggregateExec;
use crate::execution::filter::FilterExec;
use crate::execution::join::JoinExec;
use crate::execution::limit::LimitExec;
use crate::execution::operator::{Operator, WarningSink};
use crate::execution::project::ProjectExec;
use crate::execution::scan::ScanExec;
use crate::execution::sort::SortExec;

pub fn build_operator(
    plan: &LogicalPlan,
    options: &ReaderOptions,
    warnings: &WarningSink,
) -> Result<Box<dyn Operator>> {
    Ok(match plan {
        LogicalPlan::Scan(node) => {
            let resolved = locator::resolve(&node.locator)?;
            let reader = registry::open_reader(&resolved, options)?;
            Box::new(ScanExec::new(node, reader, warnings.clone()))
        }
        LogicalPlan::Filter(node) => Box::new(FilterExec::new(
            build_operator(&node.input, options, warnings)?,
            node.predicate.clone(),
        )),
        LogicalPlan::Projection(node) => Box::new(ProjectExec::new(
            build_operator(&node.input, options, warnings)?,
            node.exprs.clone(),
            node.schema.clone(),
        )),
        LogicalPlan::Aggregate(node) => Box::new(AggregateExec::new(
            build_operator(&node.input, options, warnings)?,
            node.group_by.clone(),
            node.aggregates.clone(),
            node.schema.clone(),
        )),
        LogicalPlan::Sort(node) => Box::new(SortExec::new(
            build_operator(&node.input, options, warnings)?,
            node.keys.clone(),
        )),
        LogicalPlan::Limit(node) => Box::new(LimitExec::new(
            build_operator(&node.input, options, warnings)?,
            node.n,
        )),
        LogicalPlan::Join(node) => {
            let left_schema = node.left.schema();
            let right_schema = node.right.schema();
            let mut keys = vec![];
            for (left_key, right_key) in &node.on {
                let left_type =
                    left_schema.field_type(left_key).copied().ok_or_else(|| {
                        QuarryError::Schema(format!(
                            "join key '{left_key}' not found in the left input"
                        ))
                    })?;
                let right_type =
                    right_schema.field_type(right_key).copied().ok_or_else(|| {
                        QuarryError::Schema(format!(
                            "join key '{right_key}' not found in the right input"
                        ))
                    })?;
                if !is_comparable(&left_type, &right_type) {
                    return Err(QuarryError::type_mismatch(
                        "=", left_type, right_type,
                    ));
                }
                keys.push((
                    left_key.clone(),
                    right_key.clone(),
                    promote(&left_type, &right_type),
                ));
            }

            let left = build_operator(&node.left, options, warnings)?;
            let right = build_operator(&node.right, options, warnings)?;
            // a RIGHT join runs as a LEFT join with its inputs
            // swapped; the declared output schema restores the
            // column order
            let (probe, build, kind, keys) = match node.kind {
                JoinKind::Right => (
                    right,
                    left,
                    JoinKind::Left,
                    keys.into_iter().map(|(l, r, t)| (r, l, t)).collect(),
                ),
                kind => (left, right, kind, keys),
            };
            Box::new(JoinExec::new(probe, build, kind, keys, node.schema.clone()))
        }
    })
}
