use std::fmt;
use std::sync::Arc;

use datafusion::arrow::datatypes::{Field, Schema, SchemaRef};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::arrow::util::pretty::pretty_format_batches;
use datafusion::datasource::MemTable;
use datafusion::error::Result as DataFusionResult;

/// An in-memory table of named, typed columns.
///
/// Every batch carries the declared column names and types. Row order is whatever the
/// producer emitted.
#[derive(Debug, Clone)]
pub struct Table {
    schema: SchemaRef,
    batches: Vec<RecordBatch>,
}

impl Table {
    pub fn try_new(schema: SchemaRef, batches: Vec<RecordBatch>) -> Result<Self, ArrowError> {
        for (idx, batch) in batches.iter().enumerate() {
            if !same_fields(&batch.schema(), &schema) {
                return Err(ArrowError::SchemaError(format!(
                    "batch {idx} has fields [{}], table declares [{}]",
                    field_names(&batch.schema()).join(", "),
                    field_names(&schema).join(", "),
                )));
            }
        }
        Ok(Table { schema, batches })
    }

    pub fn empty(schema: SchemaRef) -> Self {
        Table {
            schema,
            batches: Vec::new(),
        }
    }

    pub fn schema(&self) -> &SchemaRef {
        &self.schema
    }

    pub fn batches(&self) -> &[RecordBatch] {
        &self.batches
    }

    pub fn num_rows(&self) -> usize {
        self.batches.iter().map(|b| b.num_rows()).sum()
    }

    pub fn num_columns(&self) -> usize {
        self.schema.fields().len()
    }

    pub fn column_names(&self) -> Vec<String> {
        field_names(&self.schema)
    }

    /// Returns the first `n` rows without copying column data.
    pub fn head(&self, n: usize) -> Table {
        let mut remaining = n;
        let mut batches = Vec::new();
        for batch in &self.batches {
            if remaining == 0 {
                break;
            }
            let take = remaining.min(batch.num_rows());
            batches.push(batch.slice(0, take));
            remaining -= take;
        }
        Table {
            schema: self.schema.clone(),
            batches,
        }
    }

    /// Concatenate `other` onto this table. Column names and types must
    /// match.
    pub fn append(&mut self, other: Table) -> Result<(), ArrowError> {
        if !same_fields(&other.schema, &self.schema) {
            return Err(ArrowError::SchemaError(format!(
                "cannot append [{}] to [{}]",
                other.column_names().join(", "),
                self.column_names().join(", "),
            )));
        }
        self.batches.extend(other.batches);
        Ok(())
    }

    /// Declared fields, nullable wherever the declaration or any batch is.
    fn storage_schema(&self) -> SchemaRef {
        let fields: Vec<Field> = self
            .schema
            .fields()
            .iter()
            .enumerate()
            .map(|(idx, field)| {
                let nullable = field.is_nullable()
                    || self
                        .batches
                        .iter()
                        .any(|b| b.schema().field(idx).is_nullable());
                field.as_ref().clone().with_nullable(nullable)
            })
            .collect();
        Arc::new(Schema::new(fields))
    }

    /// Batches may disagree on nullability (appended reads, inferred
    /// schemas), so they are rewrapped under one widened schema first.
    pub fn into_mem_table(self) -> DataFusionResult<MemTable> {
        let schema = self.storage_schema();
        let batches = self
            .batches
            .into_iter()
            .map(|batch| {
                if batch.schema() == schema {
                    Ok(batch)
                } else {
                    RecordBatch::try_new(schema.clone(), batch.columns().to_vec())
                }
            })
            .collect::<Result<Vec<_>, ArrowError>>()?;
        MemTable::try_new(schema, vec![batches])
    }

    pub fn to_pretty_string(&self) -> Result<String, ArrowError> {
        if self.batches.is_empty() {
            // The pretty printer needs at least one batch to render headers.
            let empty = RecordBatch::new_empty(self.schema.clone());
            return Ok(pretty_format_batches(&[empty])?.to_string());
        }
        Ok(pretty_format_batches(&self.batches)?.to_string())
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.to_pretty_string() {
            Ok(s) => write!(f, "{s}"),
            Err(_) => Err(fmt::Error),
        }
    }
}

fn field_names(schema: &SchemaRef) -> Vec<String> {
    schema.fields().iter().map(|f| f.name().clone()).collect()
}

/// Column names and data types match, ignoring nullability and metadata.
pub(crate) fn same_fields(a: &SchemaRef, b: &SchemaRef) -> bool {
    if Arc::ptr_eq(a, b) {
        return true;
    }
    a.fields().len() == b.fields().len()
        && a.fields()
            .iter()
            .zip(b.fields().iter())
            .all(|(a, b)| a.name() == b.name() && a.data_type() == b.data_type())
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::{Int64Array, StringArray};
    use datafusion::arrow::datatypes::DataType;
    use datafusion::datasource::TableProvider;

    use super::*;

    fn batch(ids: Vec<i64>) -> RecordBatch {
        let names: Vec<String> = ids.iter().map(|i| format!("row{i}")).collect();
        RecordBatch::try_new(
            schema(),
            vec![
                Arc::new(Int64Array::from(ids)),
                Arc::new(StringArray::from(names)),
            ],
        )
        .unwrap()
    }

    fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, true),
        ]))
    }

    #[test]
    fn head_spans_batches() {
        let table = Table::try_new(schema(), vec![batch(vec![1, 2]), batch(vec![3, 4, 5])]).unwrap();
        assert_eq!(5, table.num_rows());

        let head = table.head(3);
        assert_eq!(3, head.num_rows());
        assert_eq!(2, head.batches().len());

        assert_eq!(5, table.head(100).num_rows());
        assert_eq!(0, table.head(0).num_rows());
    }

    #[test]
    fn rejects_mismatched_batch() {
        let other = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        let b = RecordBatch::try_new(other, vec![Arc::new(Int64Array::from(vec![1]))]).unwrap();
        Table::try_new(schema(), vec![b]).unwrap_err();
    }

    #[test]
    fn append_requires_same_fields() {
        let mut table = Table::try_new(schema(), vec![batch(vec![1])]).unwrap();
        table
            .append(Table::try_new(schema(), vec![batch(vec![2, 3])]).unwrap())
            .unwrap();
        assert_eq!(3, table.num_rows());

        let other = Arc::new(Schema::new(vec![Field::new("x", DataType::Int64, false)]));
        table.append(Table::empty(other)).unwrap_err();
    }

    #[test]
    fn pretty_prints_empty_table_headers() {
        let out = Table::empty(schema()).to_pretty_string().unwrap();
        assert!(out.contains("id"));
        assert!(out.contains("name"));
    }

    #[test]
    fn mem_table_accepts_mixed_nullability() {
        let strict = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("name", DataType::Utf8, false),
        ]));
        let first = RecordBatch::try_new(strict.clone(), batch(vec![1, 2]).columns().to_vec())
            .unwrap();

        let mut table = Table::try_new(strict, vec![first]).unwrap();
        table
            .append(Table::try_new(schema(), vec![batch(vec![3])]).unwrap())
            .unwrap();

        let mem = table.into_mem_table().unwrap();
        let schema = mem.schema();
        assert!(schema.field_with_name("name").unwrap().is_nullable());
        assert!(!schema.field_with_name("id").unwrap().is_nullable());
    }
}
