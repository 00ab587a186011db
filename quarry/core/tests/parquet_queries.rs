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

//! End-to-end Parquet queries: footer schemas, partition pruning over
//! Hive-style directories, and row-group statistics pruning

use std::fs::File;
use std::path::Path;
use std::sync::Arc;

use parquet::data_type::Int64Type;
use parquet::file::properties::WriterProperties;
use parquet::file::writer::SerializedFileWriter;
use parquet::schema::parser::parse_message_type;
use quarry::{execute, infer_schema, Value};

/// Write a single-column `v: int64` parquet file, one row group per
/// chunk
fn write_parquet(path: &Path, chunks: &[&[i64]]) {
    let schema = Arc::new(
        parse_message_type("message rows { required int64 v; }").unwrap(),
    );
    let properties = Arc::new(WriterProperties::builder().build());
    let file = File::create(path).unwrap();
    let mut writer = SerializedFileWriter::new(file, schema, properties).unwrap();
    for chunk in chunks {
        let mut row_group = writer.next_row_group().unwrap();
        let mut column = row_group.next_column().unwrap().unwrap();
        column
            .typed::<Int64Type>()
            .write_batch(chunk, None, None)
            .unwrap();
        column.close().unwrap();
        row_group.close().unwrap();
    }
    writer.close().unwrap();
}

#[test]
fn schema_comes_from_the_footer() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.parquet");
    write_parquet(&path, &[&[1, 2, 3]]);

    let schema = infer_schema(path.to_str().unwrap()).unwrap();
    assert_eq!(schema.to_string(), "v: integer");
}

#[test]
fn reads_rows_in_row_group_order() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.parquet");
    write_parquet(&path, &[&[1, 2], &[3, 4]]);

    let rows = execute(
        &format!("SELECT v FROM '{}'", path.display()),
        None,
    )
    .unwrap()
    .collect()
    .unwrap();
    let values: Vec<Value> = rows.iter().map(|r| r.get_or_null("v")).collect();
    assert_eq!(
        values,
        vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
            Value::Integer(4),
        ]
    );
}

#[test]
fn partition_pruning_skips_whole_files() {
    let dir = tempfile::tempdir().unwrap();
    for (year, count) in [(2023, 100i64), (2024, 50)] {
        let sub = dir.path().join(format!("year={year}"));
        std::fs::create_dir(&sub).unwrap();
        let rows: Vec<i64> = (0..count).collect();
        write_parquet(&sub.join("part.parquet"), &[&rows]);
    }

    let result = execute(
        &format!(
            "SELECT COUNT(*) FROM '{}' WHERE year = 2024",
            dir.path().display()
        ),
        None,
    )
    .unwrap();
    let explain = result.explain();
    assert!(
        explain.contains("partition_filters=[year=2024]"),
        "explain was:\n{explain}"
    );
    assert!(explain.contains("partition_pruning:  applied (1 partition predicate)"));
    // the filter was consumed by exact pruning, nothing residual
    assert!(!explain.contains("Filter("));

    let rows = result.collect().unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].get_or_null("COUNT(*)"), Value::Integer(50));
}

#[test]
fn partition_column_is_a_virtual_column() {
    let dir = tempfile::tempdir().unwrap();
    for year in [2023, 2024] {
        let sub = dir.path().join(format!("year={year}"));
        std::fs::create_dir(&sub).unwrap();
        write_parquet(&sub.join("part.parquet"), &[&[1, 2]]);
    }

    let schema = infer_schema(dir.path().to_str().unwrap()).unwrap();
    assert_eq!(schema.to_string(), "v: integer, year: integer");

    let rows = execute(
        &format!(
            "SELECT year, v FROM '{}' ORDER BY year, v",
            dir.path().display()
        ),
        None,
    )
    .unwrap()
    .collect()
    .unwrap();
    assert_eq!(rows.len(), 4);
    assert_eq!(rows[0].get_or_null("year"), Value::Integer(2023));
    assert_eq!(rows[3].get_or_null("year"), Value::Integer(2024));
}

#[test]
fn row_group_statistics_prune_reads() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.parquet");
    // two row groups with disjoint ranges; a filter above 100 can only
    // match the second
    write_parquet(&path, &[&[1, 2, 3], &[101, 102, 103]]);

    let rows = execute(
        &format!("SELECT v FROM '{}' WHERE v > 100", path.display()),
        None,
    )
    .unwrap()
    .collect()
    .unwrap();
    assert_eq!(rows.len(), 3);
    let values: Vec<Value> = rows.iter().map(|r| r.get_or_null("v")).collect();
    assert_eq!(
        values,
        vec![Value::Integer(101), Value::Integer(102), Value::Integer(103)]
    );
}

#[test]
fn limit_stops_across_row_groups() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("rows.parquet");
    write_parquet(&path, &[&[1, 2], &[3, 4], &[5, 6]]);

    let result = execute(
        &format!("SELECT v FROM '{}' LIMIT 3", path.display()),
        None,
    )
    .unwrap();
    assert!(result.explain().contains("row_cap=3"));
    let rows = result.collect().unwrap();
    assert_eq!(rows.len(), 3);
}

#[test]
fn aggregates_over_partitioned_dataset() {
    let dir = tempfile::tempdir().unwrap();
    for (year, values) in [(2023, vec![10i64, 20]), (2024, vec![30, 40])] {
        let sub = dir.path().join(format!("year={year}"));
        std::fs::create_dir(&sub).unwrap();
        write_parquet(&sub.join("part.parquet"), &[&values]);
    }

    let rows = execute(
        &format!(
            "SELECT year, SUM(v) FROM '{}' GROUP BY year ORDER BY year",
            dir.path().display()
        ),
        None,
    )
    .unwrap()
    .collect()
    .unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[0].get_or_null("SUM(v)"), Value::Integer(30));
    assert_eq!(rows[1].get_or_null("SUM(v)"), Value::Integer(70));
}
