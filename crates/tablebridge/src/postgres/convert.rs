//! Conversions between Postgres rows and Arrow arrays.

use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use datafusion::arrow::array::{
    Array,
    ArrayRef,
    BooleanArray,
    Date32Array,
    Float32Array,
    Float64Array,
    Int16Array,
    Int32Array,
    Int64Array,
    StringArray,
    TimestampMicrosecondArray,
};
use datafusion::arrow::datatypes::{
    DataType,
    Date32Type,
    Field,
    Schema,
    SchemaRef,
    TimeUnit,
};
use datafusion::arrow::record_batch::{RecordBatch, RecordBatchOptions};
use datafusion::scalar::ScalarValue;
use tokio_postgres::types::{FromSql, ToSql, Type as PgType};
use tokio_postgres::{Column, Row};

use crate::errors::{ReadError, WriteError};

/// A single value ready to be sent to Postgres.
pub type PgValue = Box<dyn ToSql + Sync + Send>;

/// Returns the arrow type used to hold values of a Postgres column.
pub fn pg_to_arrow_type(column: &str, typ: &PgType) -> Result<DataType, ReadError> {
    Ok(match typ {
        &PgType::BOOL => DataType::Boolean,
        &PgType::INT2 => DataType::Int16,
        &PgType::INT4 => DataType::Int32,
        &PgType::INT8 => DataType::Int64,
        &PgType::FLOAT4 => DataType::Float32,
        &PgType::FLOAT8 => DataType::Float64,
        &PgType::TEXT | &PgType::VARCHAR | &PgType::BPCHAR | &PgType::NAME => DataType::Utf8,
        &PgType::DATE => DataType::Date32,
        &PgType::TIMESTAMP => DataType::Timestamp(TimeUnit::Microsecond, None),
        &PgType::TIMESTAMPTZ => DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into())),
        other => {
            return Err(ReadError::UnsupportedPostgresType {
                column: column.to_string(),
                pg_type: other.to_string(),
            })
        }
    })
}

/// Returns the Postgres column type used to store an arrow type.
pub fn arrow_to_pg_type(column: &str, typ: &DataType) -> Result<PgType, WriteError> {
    Ok(match typ {
        DataType::Boolean => PgType::BOOL,
        DataType::Int8 | DataType::Int16 => PgType::INT2,
        DataType::Int32 => PgType::INT4,
        DataType::Int64 => PgType::INT8,
        DataType::Float32 => PgType::FLOAT4,
        DataType::Float64 => PgType::FLOAT8,
        DataType::Utf8 | DataType::LargeUtf8 => PgType::TEXT,
        DataType::Date32 => PgType::DATE,
        DataType::Timestamp(_, None) => PgType::TIMESTAMP,
        DataType::Timestamp(_, Some(_)) => PgType::TIMESTAMPTZ,
        other => return Err(WriteError::UnsupportedArrowType(column.to_string(), other.clone())),
    })
}

/// Name of the type as written in DDL.
pub fn pg_type_ddl(typ: &PgType) -> &'static str {
    match typ {
        &PgType::BOOL => "BOOLEAN",
        &PgType::INT2 => "SMALLINT",
        &PgType::INT4 => "INTEGER",
        &PgType::INT8 => "BIGINT",
        &PgType::FLOAT4 => "REAL",
        &PgType::FLOAT8 => "DOUBLE PRECISION",
        &PgType::DATE => "DATE",
        &PgType::TIMESTAMP => "TIMESTAMP",
        &PgType::TIMESTAMPTZ => "TIMESTAMPTZ",
        _ => "TEXT",
    }
}

/// Build an arrow schema from the result columns of a prepared statement.
pub fn schema_from_columns(columns: &[Column]) -> Result<SchemaRef, ReadError> {
    let fields = columns
        .iter()
        .map(|col| {
            let dt = pg_to_arrow_type(col.name(), col.type_())?;
            Ok(Field::new(col.name(), dt, true))
        })
        .collect::<Result<Vec<_>, ReadError>>()?;
    Ok(Arc::new(Schema::new(fields)))
}

fn collect_column<'a, T, A>(rows: &'a [Row], idx: usize) -> Result<A, ReadError>
where
    T: FromSql<'a>,
    A: FromIterator<Option<T>>,
{
    let col = rows
        .iter()
        .map(|row| row.try_get::<_, Option<T>>(idx))
        .collect::<Result<A, _>>()?;
    Ok(col)
}

/// Convert fetched rows into a single record batch matching `schema`.
pub fn rows_to_batch(schema: SchemaRef, rows: &[Row]) -> Result<RecordBatch, ReadError> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.fields().len());

    for (idx, field) in schema.fields().iter().enumerate() {
        let col: ArrayRef = match field.data_type() {
            DataType::Boolean => Arc::new(collect_column::<bool, BooleanArray>(rows, idx)?),
            DataType::Int16 => Arc::new(collect_column::<i16, Int16Array>(rows, idx)?),
            DataType::Int32 => Arc::new(collect_column::<i32, Int32Array>(rows, idx)?),
            DataType::Int64 => Arc::new(collect_column::<i64, Int64Array>(rows, idx)?),
            DataType::Float32 => Arc::new(collect_column::<f32, Float32Array>(rows, idx)?),
            DataType::Float64 => Arc::new(collect_column::<f64, Float64Array>(rows, idx)?),
            DataType::Utf8 => Arc::new(collect_column::<String, StringArray>(rows, idx)?),
            DataType::Date32 => {
                let dates: Vec<Option<NaiveDate>> = collect_column(rows, idx)?;
                Arc::new(
                    dates
                        .into_iter()
                        .map(|d| d.map(Date32Type::from_naive_date))
                        .collect::<Date32Array>(),
                )
            }
            DataType::Timestamp(TimeUnit::Microsecond, None) => {
                let values: Vec<Option<NaiveDateTime>> = collect_column(rows, idx)?;
                Arc::new(
                    values
                        .into_iter()
                        .map(|v| v.map(|v| v.and_utc().timestamp_micros()))
                        .collect::<TimestampMicrosecondArray>(),
                )
            }
            DataType::Timestamp(TimeUnit::Microsecond, Some(tz)) => {
                let values: Vec<Option<DateTime<Utc>>> = collect_column(rows, idx)?;
                Arc::new(
                    values
                        .into_iter()
                        .map(|v| v.map(|v| v.timestamp_micros()))
                        .collect::<TimestampMicrosecondArray>()
                        .with_timezone(tz.clone()),
                )
            }
            other => {
                return Err(ReadError::UnsupportedPostgresType {
                    column: field.name().clone(),
                    pg_type: other.to_string(),
                })
            }
        };
        columns.push(col);
    }

    // Explicit row count so zero-column results still carry their rows.
    let options = RecordBatchOptions::new().with_row_count(Some(rows.len()));
    Ok(RecordBatch::try_new_with_options(schema, columns, &options)?)
}

fn timestamp_parts(value: i64, unit: &TimeUnit) -> (i64, u32) {
    let per_sec: i64 = match unit {
        TimeUnit::Second => 1,
        TimeUnit::Millisecond => 1_000,
        TimeUnit::Microsecond => 1_000_000,
        TimeUnit::Nanosecond => 1_000_000_000,
    };
    let secs = value.div_euclid(per_sec);
    let nanos = value.rem_euclid(per_sec) * (1_000_000_000 / per_sec);
    (secs, nanos as u32)
}

fn timestamp_value(
    column: &str,
    value: Option<i64>,
    unit: TimeUnit,
    tz: Option<Arc<str>>,
) -> Result<PgValue, WriteError> {
    let value = value
        .map(|v| {
            let (secs, nanos) = timestamp_parts(v, &unit);
            DateTime::<Utc>::from_timestamp(secs, nanos).ok_or_else(|| {
                WriteError::UnsupportedArrowType(
                    column.to_string(),
                    DataType::Timestamp(unit.clone(), tz.clone()),
                )
            })
        })
        .transpose()?;
    Ok(match tz {
        Some(_) => Box::new(value),
        None => Box::new(value.map(|v| v.naive_utc())),
    })
}

/// Extract one row from a set of arrays as values the binary copy writer
/// accepts. Each value's Rust type matches `arrow_to_pg_type` for its column.
pub fn row_values(
    fields: &[Arc<Field>],
    columns: &[ArrayRef],
    row: usize,
) -> Result<Vec<PgValue>, WriteError> {
    let mut values: Vec<PgValue> = Vec::with_capacity(columns.len());
    for (field, array) in fields.iter().zip(columns) {
        let scalar = ScalarValue::try_from_array(array, row)?;
        let value: PgValue = match scalar {
            ScalarValue::Boolean(v) => Box::new(v),
            ScalarValue::Int8(v) => Box::new(v.map(i16::from)),
            ScalarValue::Int16(v) => Box::new(v),
            ScalarValue::Int32(v) => Box::new(v),
            ScalarValue::Int64(v) => Box::new(v),
            ScalarValue::Float32(v) => Box::new(v),
            ScalarValue::Float64(v) => Box::new(v),
            ScalarValue::Utf8(v) | ScalarValue::LargeUtf8(v) => Box::new(v),
            ScalarValue::Date32(v) => Box::new(v.map(Date32Type::to_naive_date)),
            ScalarValue::TimestampSecond(v, tz) => {
                timestamp_value(field.name(), v, TimeUnit::Second, tz)?
            }
            ScalarValue::TimestampMillisecond(v, tz) => {
                timestamp_value(field.name(), v, TimeUnit::Millisecond, tz)?
            }
            ScalarValue::TimestampMicrosecond(v, tz) => {
                timestamp_value(field.name(), v, TimeUnit::Microsecond, tz)?
            }
            ScalarValue::TimestampNanosecond(v, tz) => {
                timestamp_value(field.name(), v, TimeUnit::Nanosecond, tz)?
            }
            _ => {
                return Err(WriteError::UnsupportedArrowType(
                    field.name().clone(),
                    array.data_type().clone(),
                ))
            }
        };
        values.push(value);
    }
    Ok(values)
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::TimestampMillisecondArray;

    use super::*;

    #[test]
    fn arrow_types_round_trip_through_pg_types() {
        let cases = [
            (DataType::Boolean, DataType::Boolean),
            (DataType::Int16, DataType::Int16),
            (DataType::Int32, DataType::Int32),
            (DataType::Int64, DataType::Int64),
            (DataType::Float64, DataType::Float64),
            (DataType::Utf8, DataType::Utf8),
            (DataType::Date32, DataType::Date32),
            // Widened on the way back.
            (DataType::Int8, DataType::Int16),
            (DataType::LargeUtf8, DataType::Utf8),
            (
                DataType::Timestamp(TimeUnit::Nanosecond, None),
                DataType::Timestamp(TimeUnit::Microsecond, None),
            ),
        ];
        for (arrow, back) in cases {
            let pg = arrow_to_pg_type("c", &arrow).unwrap();
            assert_eq!(back, pg_to_arrow_type("c", &pg).unwrap(), "{arrow}");
        }
    }

    #[test]
    fn unsupported_types() {
        let err = arrow_to_pg_type("blob", &DataType::Binary).unwrap_err();
        assert!(matches!(err, WriteError::UnsupportedArrowType(ref c, _) if c == "blob"));

        let err = pg_to_arrow_type("n", &PgType::NUMERIC).unwrap_err();
        assert!(matches!(err, ReadError::UnsupportedPostgresType { .. }));
    }

    #[test]
    fn ddl_names() {
        assert_eq!("DOUBLE PRECISION", pg_type_ddl(&PgType::FLOAT8));
        assert_eq!("BIGINT", pg_type_ddl(&PgType::INT8));
        assert_eq!("TEXT", pg_type_ddl(&PgType::TEXT));
    }

    #[test]
    fn split_negative_timestamps() {
        assert_eq!((-2, 500_000_000), timestamp_parts(-1_500, &TimeUnit::Millisecond));
        assert_eq!((1, 5_000), timestamp_parts(1_000_005, &TimeUnit::Microsecond));
    }

    #[test]
    fn extract_row_values() {
        let fields = vec![
            Arc::new(Field::new("id", DataType::Int64, true)),
            Arc::new(Field::new("at", DataType::Timestamp(TimeUnit::Millisecond, None), true)),
        ];
        let columns: Vec<ArrayRef> = vec![
            Arc::new(Int64Array::from(vec![Some(1), None])),
            Arc::new(TimestampMillisecondArray::from(vec![Some(1_000), None])),
        ];
        assert_eq!(2, row_values(&fields, &columns, 0).unwrap().len());
        assert_eq!(2, row_values(&fields, &columns, 1).unwrap().len());

        let fields = vec![Arc::new(Field::new("b", DataType::Binary, true))];
        let columns: Vec<ArrayRef> = vec![Arc::new(
            datafusion::arrow::array::BinaryArray::from(vec![Some(b"x".as_ref())]),
        )];
        row_values(&fields, &columns, 0).unwrap_err();
    }
}
