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

//! Parquet reader: schema from footer metadata, Hive partition
//! discovery with exact file pruning, row-group skipping against
//! min/max statistics, column projection and a row cap. Remote
//! sources are read through ranged requests: the footer first, then
//! only the row groups that survive pruning.

use std::cmp::Ordering;
use std::collections::VecDeque;

use bigdecimal::num_bigint::BigInt;
use bigdecimal::BigDecimal;
use bytes::{Buf, Bytes};
use chrono::{DateTime, Duration, NaiveDate, NaiveTime};
use log::debug;
use parquet::basic::{LogicalType, Type as PhysicalType};
use parquet::errors::ParquetError;
use parquet::file::reader::{ChunkReader, FileReader, Length, SerializedFileReader};
use parquet::file::statistics::Statistics;
use parquet::record::{Field, Row as ParquetRow};
use parquet::schema::types::{Type, TypePtr};
use quarry_common::{DataType, QuarryError, Result, Row, Schema, Value};
use quarry_expr::{CompareOp, SimplePredicate};

use crate::datasource::fetch::ByteSource;
use crate::datasource::locator::{ResolvedLocator, Scheme};
use crate::datasource::partition::{partition_columns, PartitionedFile};
use crate::datasource::reader::{project_row, row_matches, Reader};

/// A [`ChunkReader`] over a [`ByteSource`], so the parquet decoder
/// pulls exactly the byte ranges it needs (footer, then pages)
struct ChunkSource {
    source: ByteSource,
    length: u64,
}

impl ChunkSource {
    fn new(source: ByteSource) -> Result<Self> {
        let length = source.len()?;
        Ok(Self { source, length })
    }
}

impl Length for ChunkSource {
    fn len(&self) -> u64 {
        self.length
    }
}

impl ChunkReader for ChunkSource {
    type T = bytes::buf::Reader<Bytes>;

    fn get_read(&self, start: u64) -> parquet::errors::Result<Self::T> {
        let remaining = self.length.saturating_sub(start) as usize;
        Ok(self
            .source
            .read_range(start, remaining)
            .map_err(|e| ParquetError::External(Box::new(e)))?
            .reader())
    }

    fn get_bytes(&self, start: u64, length: usize) -> parquet::errors::Result<Bytes> {
        self.source
            .read_range(start, length)
            .map_err(|e| ParquetError::External(Box::new(e)))
    }
}

pub struct ParquetReader {
    locator: String,
    resolved: ResolvedLocator,
    files: Option<Vec<PartitionedFile>>,
    partition_cols: Vec<String>,
    schema: Option<Schema>,
    required: Option<Vec<String>>,
    filters: Vec<SimplePredicate>,
    partition_filters: Vec<SimplePredicate>,
    row_cap: Option<usize>,
    emitted: usize,
    cursor: Option<DatasetCursor>,
    closed: bool,
}

/// Iteration state: which file, which surviving row groups, and the
/// decoded rows of the current group
struct DatasetCursor {
    files: VecDeque<PartitionedFile>,
    current: Option<FileCursor>,
}

struct FileCursor {
    reader: SerializedFileReader<ChunkSource>,
    partition_values: Vec<(String, Value)>,
    groups: VecDeque<usize>,
    buffer: VecDeque<Row>,
}

impl ParquetReader {
    pub fn new(locator: impl Into<String>, resolved: ResolvedLocator) -> Self {
        Self {
            locator: locator.into(),
            resolved,
            files: None,
            partition_cols: vec![],
            schema: None,
            required: None,
            filters: vec![],
            partition_filters: vec![],
            row_cap: None,
            emitted: 0,
            cursor: None,
            closed: false,
        }
    }

    /// Discover the dataset's files: a single object, or every
    /// `.parquet` file under a directory/prefix with its Hive
    /// partition descriptor
    fn discover(&mut self) -> Result<&[PartitionedFile]> {
        if self.files.is_none() {
            let source = ByteSource::new(&self.resolved)?;
            let is_dataset = match self.resolved.scheme {
                Scheme::File => source.is_local_dir(),
                Scheme::S3 => !self.resolved.path.ends_with(".parquet"),
                Scheme::Http => false,
            };
            let files = if is_dataset {
                let listed = source.list_files(".parquet")?;
                if listed.is_empty() {
                    return Err(QuarryError::io(
                        self.locator.clone(),
                        std::io::Error::new(
                            std::io::ErrorKind::NotFound,
                            "no .parquet files under the dataset root",
                        ),
                    ));
                }
                listed
                    .into_iter()
                    .map(|path| PartitionedFile::from_hive_path(&self.resolved.path, &path))
                    .collect()
            } else {
                vec![PartitionedFile::new(self.resolved.path.clone())]
            };
            self.partition_cols = partition_columns(&files)?;
            self.files = Some(files);
        }
        Ok(self.files.as_deref().expect("files discovered above"))
    }

    fn open_file(&self, file: &PartitionedFile) -> Result<SerializedFileReader<ChunkSource>> {
        let resolved = ResolvedLocator {
            scheme: self.resolved.scheme,
            path: file.path.clone(),
            format_hint: None,
            selector: None,
        };
        let chunk = ChunkSource::new(ByteSource::new(&resolved)?)?;
        SerializedFileReader::new(chunk)
            .map_err(|e| QuarryError::io(file.path.clone(), e))
    }

    fn infer_schema(&mut self) -> Result<Schema> {
        self.discover()?;
        let files = self.files.as_ref().expect("discovered");
        let first = files.first().expect("at least one file");
        let reader = self.open_file(first)?;
        let mut schema =
            schema_from_parquet(reader.metadata().file_metadata().schema())?;
        // partition columns are virtual: appended to the schema, typed
        // by their directory-encoded values
        for (key, value) in &first.partition_values {
            schema.push_field(key.clone(), value.data_type())?;
        }
        Ok(schema)
    }

    /// Row groups of `reader` that can contain a row matching the
    /// accepted filters, judged by their min/max statistics
    fn surviving_groups(
        &self,
        path: &str,
        reader: &SerializedFileReader<ChunkSource>,
    ) -> VecDeque<usize> {
        let metadata = reader.metadata();
        let mut keep = VecDeque::new();
        for index in 0..metadata.num_row_groups() {
            let group = metadata.row_group(index);
            let prunable = self.filters.iter().find(|filter| {
                group_violates(group, filter, metadata.file_metadata().schema_descr())
            });
            match prunable {
                Some(filter) => {
                    debug!(
                        "{path}: skipping row group {index}, statistics violate {filter}"
                    );
                }
                None => keep.push_back(index),
            }
        }
        keep
    }

    fn advance_file(&mut self) -> Result<bool> {
        let Some(file) = self
            .cursor
            .as_mut()
            .expect("cursor initialized")
            .files
            .pop_front()
        else {
            return Ok(false);
        };
        let reader = self.open_file(&file)?;
        let groups = self.surviving_groups(&file.path, &reader);
        self.cursor.as_mut().expect("cursor initialized").current = Some(FileCursor {
            reader,
            partition_values: file.partition_values,
            groups,
            buffer: VecDeque::new(),
        });
        Ok(true)
    }

    /// Decode the next surviving row group of the current file into
    /// the buffer; false when the file is exhausted
    fn fill_buffer(&mut self) -> Result<bool> {
        let schema = self.schema()?;
        let locator = self.locator.clone();
        let required = self.required.clone();
        let cursor = self
            .cursor
            .as_mut()
            .and_then(|c| c.current.as_mut())
            .expect("current file");
        let Some(group_index) = cursor.groups.pop_front() else {
            return Ok(false);
        };
        let projection = build_projection(
            required.as_ref(),
            cursor.reader.metadata().file_metadata().schema(),
        );
        let mut decoded_rows = vec![];
        {
            let group = cursor
                .reader
                .get_row_group(group_index)
                .map_err(|e| QuarryError::Data(format!("{locator}: {e}")))?;
            let rows = group
                .get_row_iter(projection)
                .map_err(|e| QuarryError::Data(format!("{locator}: {e}")))?;
            for decoded in rows {
                let decoded = decoded
                    .map_err(|e| QuarryError::Data(format!("{locator}: {e}")))?;
                let mut row = parquet_row_to_row(&decoded, &schema);
                for (key, value) in &cursor.partition_values {
                    row.insert(key.clone(), value.clone());
                }
                decoded_rows.push(row);
            }
        }
        cursor.buffer.extend(decoded_rows);
        Ok(true)
    }
}

impl Reader for ParquetReader {
    fn schema(&mut self) -> Result<Schema> {
        if self.schema.is_none() {
            self.schema = Some(self.infer_schema()?);
        }
        Ok(self.schema.clone().expect("schema cached above"))
    }

    fn partition_columns(&mut self) -> Vec<String> {
        if self.files.is_none() && self.discover().is_err() {
            return vec![];
        }
        self.partition_cols.clone()
    }

    fn set_required_columns(&mut self, columns: &[String]) {
        self.required = Some(columns.to_vec());
    }

    fn set_pushdown_filters(&mut self, filters: &[SimplePredicate]) -> Vec<usize> {
        self.filters = filters.to_vec();
        // row-group pruning is coarse, so rows are re-checked after
        // decode and every filter counts as consumed
        (0..filters.len()).collect()
    }

    fn set_row_cap(&mut self, cap: usize) {
        self.row_cap = Some(cap);
    }

    fn set_partition_filters(&mut self, filters: &[SimplePredicate]) {
        self.partition_filters = filters.to_vec();
    }

    fn next_row(&mut self) -> Option<Result<Row>> {
        if self.closed {
            return None;
        }
        if self.cursor.is_none() {
            if let Err(e) = self.discover() {
                return Some(Err(e));
            }
            let files: VecDeque<PartitionedFile> = self
                .files
                .clone()
                .expect("discovered")
                .into_iter()
                .filter(|file| {
                    let keep = file.matches(&self.partition_filters);
                    if !keep {
                        debug!(
                            "{}: partition pruning skips '{}'",
                            self.locator, file.path
                        );
                    }
                    keep
                })
                .collect();
            self.cursor = Some(DatasetCursor {
                files,
                current: None,
            });
        }
        loop {
            if self.row_cap.is_some_and(|cap| self.emitted >= cap) {
                return None;
            }
            let has_current = self
                .cursor
                .as_ref()
                .is_some_and(|c| c.current.is_some());
            if !has_current {
                match self.advance_file() {
                    Ok(true) => {}
                    Ok(false) => return None,
                    Err(e) => return Some(Err(e)),
                }
            }
            let buffered = self
                .cursor
                .as_mut()
                .and_then(|c| c.current.as_mut())
                .and_then(|c| c.buffer.pop_front());
            match buffered {
                Some(row) => {
                    if !row_matches(&row, &self.filters) {
                        continue;
                    }
                    self.emitted += 1;
                    return Some(Ok(project_row(row, self.required.as_ref())));
                }
                None => match self.fill_buffer() {
                    Ok(true) => {}
                    Ok(false) => {
                        // file exhausted, move on
                        if let Some(cursor) = self.cursor.as_mut() {
                            cursor.current = None;
                        }
                    }
                    Err(e) => return Some(Err(e)),
                },
            }
        }
    }

    fn close(&mut self) {
        self.cursor = None;
        self.closed = true;
    }
}

/// The projection passed to the record decoder: the required
/// top-level fields, or everything when no requirement was set
fn build_projection(required: Option<&Vec<String>>, file_schema: &Type) -> Option<Type> {
    let required = required?;
    let mut fields: Vec<TypePtr> = file_schema
        .get_fields()
        .iter()
        .filter(|f| required.iter().any(|r| r == f.name()))
        .cloned()
        .collect();
    if fields.is_empty() {
        // a pure COUNT(*) still needs one column to drive row iteration
        fields = file_schema.get_fields().iter().take(1).cloned().collect();
    }
    Type::group_type_builder(file_schema.name())
        .with_fields(fields)
        .build()
        .ok()
}

/// Map the footer schema's top-level fields onto engine types. Nested
/// groups and lists surface as `json` columns.
fn schema_from_parquet(file_schema: &Type) -> Result<Schema> {
    let mut schema = Schema::empty();
    for field in file_schema.get_fields() {
        let data_type = match field.as_ref() {
            Type::PrimitiveType {
                basic_info,
                physical_type,
                ..
            } => primitive_data_type(basic_info.logical_type(), *physical_type),
            Type::GroupType { .. } => DataType::Json,
        };
        schema.push_field(field.name().to_string(), data_type)?;
    }
    Ok(schema)
}

fn primitive_data_type(
    logical: Option<LogicalType>,
    physical: PhysicalType,
) -> DataType {
    if let Some(logical) = logical {
        return match logical {
            LogicalType::String | LogicalType::Enum | LogicalType::Uuid => DataType::Utf8,
            LogicalType::Decimal { .. } => DataType::Decimal,
            LogicalType::Date => DataType::Date,
            LogicalType::Time { .. } => DataType::Time,
            LogicalType::Timestamp { .. } => DataType::Timestamp,
            LogicalType::Json => DataType::Json,
            LogicalType::Integer { .. } => DataType::Integer,
            LogicalType::Float16 => DataType::Float,
            _ => DataType::Utf8,
        };
    }
    match physical {
        PhysicalType::BOOLEAN => DataType::Boolean,
        PhysicalType::INT32 | PhysicalType::INT64 => DataType::Integer,
        PhysicalType::FLOAT | PhysicalType::DOUBLE => DataType::Float,
        PhysicalType::INT96 => DataType::Timestamp,
        PhysicalType::BYTE_ARRAY | PhysicalType::FIXED_LEN_BYTE_ARRAY => DataType::Utf8,
    }
}

/// Convert a decoded parquet record into an engine row following the
/// declared schema types
fn parquet_row_to_row(decoded: &ParquetRow, schema: &Schema) -> Row {
    let mut row = Row::new();
    for (name, field) in decoded.get_column_iter() {
        let target = schema.field_type(name).copied().unwrap_or(DataType::Utf8);
        row.insert(name.clone(), field_to_value(field, &target));
    }
    row
}

fn field_to_value(field: &Field, target: &DataType) -> Value {
    match field {
        Field::Null => Value::Null,
        Field::Bool(b) => Value::Boolean(*b),
        Field::Byte(v) => integer_value(*v as i64, target),
        Field::Short(v) => integer_value(*v as i64, target),
        Field::Int(v) => integer_value(*v as i64, target),
        Field::Long(v) => integer_value(*v, target),
        Field::UByte(v) => integer_value(*v as i64, target),
        Field::UShort(v) => integer_value(*v as i64, target),
        Field::UInt(v) => integer_value(*v as i64, target),
        Field::ULong(v) => match i64::try_from(*v) {
            Ok(v) => integer_value(v, target),
            Err(_) => Value::Decimal(BigDecimal::from(*v)),
        },
        Field::Float(v) => Value::Float(*v as f64),
        Field::Double(v) => Value::Float(*v),
        Field::Decimal(d) => {
            let unscaled = BigInt::from_signed_bytes_be(d.data());
            Value::Decimal(BigDecimal::new(unscaled, d.scale() as i64))
        }
        Field::Str(s) => match target {
            DataType::Json => serde_json::from_str(s)
                .map(Value::Json)
                .unwrap_or_else(|_| Value::Utf8(s.clone())),
            _ => Value::Utf8(s.clone()),
        },
        Field::Bytes(b) => Value::Utf8(String::from_utf8_lossy(b.data()).to_string()),
        Field::Date(days) => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).expect("epoch");
            match epoch.checked_add_signed(Duration::days(*days as i64)) {
                Some(date) => Value::Date(date),
                None => Value::Null,
            }
        }
        Field::TimestampMillis(ms) => DateTime::from_timestamp_millis(*ms)
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        Field::TimestampMicros(us) => DateTime::from_timestamp_micros(*us)
            .map(|dt| Value::Timestamp(dt.naive_utc()))
            .unwrap_or(Value::Null),
        group @ Field::Group(_) => Value::Json(group.to_json_value()),
        other => {
            // lists, maps and any future variants fall back to their
            // json form
            Value::Json(other.to_json_value())
        }
    }
}

/// TIME columns decode as raw integers; everything else stays integer
fn integer_value(v: i64, target: &DataType) -> Value {
    match target {
        DataType::Time => {
            // TIME_MILLIS comes as INT32, TIME_MICROS as INT64
            let (secs, nanos) = if v < i32::MAX as i64 {
                ((v / 1_000) as u32, ((v % 1_000) * 1_000_000) as u32)
            } else {
                ((v / 1_000_000) as u32, ((v % 1_000_000) * 1_000) as u32)
            };
            NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos)
                .map(Value::Time)
                .unwrap_or(Value::Null)
        }
        _ => Value::Integer(v),
    }
}

/// Whether the row group's statistics prove no row can match `filter`
fn group_violates(
    group: &parquet::file::metadata::RowGroupMetaData,
    filter: &SimplePredicate,
    descr: &parquet::schema::types::SchemaDescriptor,
) -> bool {
    let Some(column_index) = (0..descr.num_columns())
        .find(|i| descr.column(*i).path().string() == filter.column)
    else {
        return false;
    };
    let Some(statistics) = group.column(column_index).statistics() else {
        return false;
    };
    if !statistics.has_min_max_set() {
        return false;
    }
    let Some((min, max)) = statistics_bounds(statistics) else {
        return false;
    };
    let (Ok(Some(min_vs_lit)), Ok(Some(max_vs_lit))) =
        (min.compare(&filter.value), max.compare(&filter.value))
    else {
        return false;
    };
    use Ordering::*;
    match filter.op {
        // col > v is impossible when max <= v
        CompareOp::Gt => max_vs_lit != Greater,
        CompareOp::GtEq => max_vs_lit == Less,
        CompareOp::Lt => min_vs_lit != Less,
        CompareOp::LtEq => min_vs_lit == Greater,
        CompareOp::Eq => min_vs_lit == Greater || max_vs_lit == Less,
        CompareOp::NotEq => min_vs_lit == Equal && max_vs_lit == Equal,
    }
}

fn statistics_bounds(statistics: &Statistics) -> Option<(Value, Value)> {
    match statistics {
        Statistics::Boolean(s) => Some((
            Value::Boolean(*s.min()),
            Value::Boolean(*s.max()),
        )),
        Statistics::Int32(s) => Some((
            Value::Integer(*s.min() as i64),
            Value::Integer(*s.max() as i64),
        )),
        Statistics::Int64(s) => {
            Some((Value::Integer(*s.min()), Value::Integer(*s.max())))
        }
        Statistics::Float(s) => Some((
            Value::Float(*s.min() as f64),
            Value::Float(*s.max() as f64),
        )),
        Statistics::Double(s) => {
            Some((Value::Float(*s.min()), Value::Float(*s.max())))
        }
        Statistics::ByteArray(s) => {
            let min = s.min().as_utf8().ok()?.to_string();
            let max = s.max().as_utf8().ok()?.to_string();
            Some((Value::Utf8(min), Value::Utf8(max)))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_common::DataType;

    #[test]
    fn physical_and_logical_type_mapping() {
        assert_eq!(
            primitive_data_type(None, PhysicalType::INT64),
            DataType::Integer
        );
        assert_eq!(
            primitive_data_type(None, PhysicalType::DOUBLE),
            DataType::Float
        );
        assert_eq!(
            primitive_data_type(Some(LogicalType::String), PhysicalType::BYTE_ARRAY),
            DataType::Utf8
        );
        assert_eq!(
            primitive_data_type(
                Some(LogicalType::Decimal {
                    scale: 2,
                    precision: 10
                }),
                PhysicalType::INT64
            ),
            DataType::Decimal
        );
        assert_eq!(
            primitive_data_type(Some(LogicalType::Date), PhysicalType::INT32),
            DataType::Date
        );
        assert_eq!(
            primitive_data_type(Some(LogicalType::Json), PhysicalType::BYTE_ARRAY),
            DataType::Json
        );
    }

    #[test]
    fn field_conversion_covers_temporal_types() {
        assert_eq!(
            field_to_value(&Field::Date(19814), &DataType::Date),
            Value::Date(NaiveDate::from_ymd_opt(2024, 4, 1).unwrap())
        );
        assert_eq!(
            field_to_value(&Field::TimestampMillis(86_400_000), &DataType::Timestamp),
            Value::Timestamp(
                NaiveDate::from_ymd_opt(1970, 1, 2)
                    .unwrap()
                    .and_hms_opt(0, 0, 0)
                    .unwrap()
            )
        );
        // TIME_MILLIS decodes through the integer path
        assert_eq!(
            field_to_value(&Field::Int(34_200_000), &DataType::Time),
            Value::Time(NaiveTime::from_hms_opt(9, 30, 0).unwrap())
        );
    }

    #[test]
    fn decimal_field_converts_exactly() {
        use parquet::data_type::Decimal as ParquetDecimal;
        let decimal = ParquetDecimal::from_i32(12345, 9, 2);
        let value = field_to_value(&Field::Decimal(decimal), &DataType::Decimal);
        assert_eq!(
            value,
            Value::Decimal(BigDecimal::new(BigInt::from(12345), 2))
        );
    }
}
