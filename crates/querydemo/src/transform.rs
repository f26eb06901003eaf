//! The fixed sequence of dataframe transformations run over the sample.

use std::sync::Arc;

use datafusion::dataframe::DataFrame;
use datafusion::logical_expr::{avg, col, count, lit, sum};
use datafusion::prelude::SessionContext;
use tablebridge::Table;

use crate::errors::{Result, TransformError};
use crate::session::collect_table;

/// One named step of the demonstration and what it produced.
#[derive(Debug)]
pub struct TransformStep {
    pub title: &'static str,
    pub output: Result<Table>,
}

/// Transformations over a single table.
#[derive(Clone)]
pub struct TransformDemo {
    ctx: SessionContext,
    table: Table,
}

impl TransformDemo {
    pub fn new(ctx: SessionContext, table: Table) -> Self {
        TransformDemo { ctx, table }
    }

    /// Indented tree of column names, types and nullability.
    pub fn schema_string(&self) -> String {
        let mut out = String::from("root\n");
        for field in self.table.schema().fields() {
            out.push_str(&format!(
                " |-- {}: {} (nullable = {})\n",
                field.name(),
                field.data_type(),
                field.is_nullable()
            ));
        }
        out
    }

    fn dataframe(&self) -> Result<DataFrame> {
        let provider = Arc::new(self.table.clone().into_mem_table()?);
        Ok(self.ctx.read_table(provider)?)
    }

    fn require_column(&self, column: &str) -> Result<()> {
        if self.table.schema().field_with_name(column).is_err() {
            return Err(TransformError::MissingColumn {
                column: column.to_string(),
                available: self.table.column_names().join(", "),
            });
        }
        Ok(())
    }

    pub fn head(&self, n: usize) -> Table {
        self.table.head(n)
    }

    pub async fn select(&self, columns: &[&str]) -> Result<Table> {
        for column in columns {
            self.require_column(column)?;
        }
        let df = self.dataframe()?.select_columns(columns)?;
        collect_table(df).await
    }

    /// Rows where `column > threshold`.
    pub async fn filter_greater(&self, column: &str, threshold: f64) -> Result<Table> {
        self.require_column(column)?;
        let df = self.dataframe()?.filter(col(column).gt(lit(threshold)))?;
        collect_table(df).await
    }

    /// Count, average and sum per group, ordered by the group column.
    pub async fn aggregate_by(
        &self,
        group_column: &str,
        id_column: &str,
        amount_column: &str,
    ) -> Result<Table> {
        for column in [group_column, id_column, amount_column] {
            self.require_column(column)?;
        }
        let df = self
            .dataframe()?
            .aggregate(
                vec![col(group_column)],
                vec![
                    count(col(id_column)).alias("count"),
                    avg(col(amount_column)).alias("avg_amount"),
                    sum(col(amount_column)).alias("total_amount"),
                ],
            )?
            .sort(vec![col(group_column).sort(true, false)])?;
        collect_table(df).await
    }

    pub async fn sort_desc(&self, column: &str) -> Result<Table> {
        self.require_column(column)?;
        let df = self.dataframe()?.sort(vec![col(column).sort(false, true)])?;
        collect_table(df).await
    }

    /// Run the whole demonstration in order. A failing step does not stop
    /// the ones after it.
    pub async fn run(&self) -> Vec<TransformStep> {
        vec![
            TransformStep {
                title: "First 5 rows of data",
                output: Ok(self.head(5)),
            },
            TransformStep {
                title: "Selecting specific columns",
                output: self.select(&["id", "category"]).await.map(|t| t.head(5)),
            },
            TransformStep {
                title: "Filtering data",
                output: self
                    .filter_greater("amount", 100.0)
                    .await
                    .map(|t| t.head(5)),
            },
            TransformStep {
                title: "Aggregating data",
                output: self.aggregate_by("category", "id", "amount").await,
            },
            TransformStep {
                title: "Sorting data",
                output: self.sort_desc("amount").await.map(|t| t.head(5)),
            },
        ]
    }
}

#[cfg(test)]
mod tests {
    use datafusion::arrow::array::{Array, Float64Array, Int64Array, StringArray};
    use datafusion::arrow::compute::concat_batches;
    use datafusion::arrow::datatypes::{DataType, Field, Schema};
    use datafusion::arrow::record_batch::RecordBatch;
    use tablebridge::{DefaultData, FixedSample};

    use super::*;
    use crate::session::create_session;

    fn demo() -> TransformDemo {
        TransformDemo::new(create_session(), FixedSample.default_table().unwrap())
    }

    fn single_batch(table: &Table) -> RecordBatch {
        concat_batches(table.schema(), table.batches()).unwrap()
    }

    fn f64_column(batch: &RecordBatch, name: &str) -> Vec<f64> {
        let arr = batch.column_by_name(name).unwrap();
        let arr = arr.as_any().downcast_ref::<Float64Array>().unwrap();
        (0..arr.len()).map(|i| arr.value(i)).collect()
    }

    #[tokio::test]
    async fn filter_amount_over_100() {
        let out = demo().filter_greater("amount", 100.0).await.unwrap();
        assert_eq!(6, out.num_rows());

        let amounts = f64_column(&single_batch(&out), "amount");
        assert_eq!(vec![120.5, 200.0, 150.3, 180.2, 110.4, 220.1], amounts);
    }

    #[tokio::test]
    async fn group_counts_per_category() {
        let out = demo().aggregate_by("category", "id", "amount").await.unwrap();
        assert_eq!(
            vec!["category", "count", "avg_amount", "total_amount"],
            out.column_names()
        );

        let batch = single_batch(&out);
        let categories = batch
            .column_by_name("category")
            .unwrap()
            .as_any()
            .downcast_ref::<StringArray>()
            .unwrap()
            .iter()
            .map(|v| v.unwrap().to_string())
            .collect::<Vec<_>>();
        let counts = batch
            .column_by_name("count")
            .unwrap()
            .as_any()
            .downcast_ref::<Int64Array>()
            .unwrap()
            .values()
            .to_vec();

        assert_eq!(vec!["A", "B", "C", "D"], categories);
        assert_eq!(vec![4, 3, 2, 1], counts);

        let totals = f64_column(&batch, "total_amount");
        assert!((totals[3] - 220.1).abs() < 1e-9);
    }

    #[tokio::test]
    async fn sort_descending() {
        let out = demo().sort_desc("amount").await.unwrap();
        let amounts = f64_column(&single_batch(&out), "amount");
        assert_eq!(10, amounts.len());
        assert_eq!(220.1, amounts[0]);
        assert!(amounts.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn select_projects_columns() {
        let out = demo().select(&["id", "category"]).await.unwrap();
        assert_eq!(vec!["id", "category"], out.column_names());
        assert_eq!(10, out.num_rows());
    }

    #[tokio::test]
    async fn missing_column() {
        let err = demo().filter_greater("price", 1.0).await.unwrap_err();
        assert!(matches!(err, TransformError::MissingColumn { .. }), "{err}");
    }

    #[tokio::test]
    async fn full_sequence() {
        let demo = demo();
        let steps = demo.run().await;
        let titles: Vec<_> = steps.iter().map(|s| s.title).collect();
        assert_eq!(
            vec![
                "First 5 rows of data",
                "Selecting specific columns",
                "Filtering data",
                "Aggregating data",
                "Sorting data",
            ],
            titles
        );
        assert!(steps
            .iter()
            .all(|s| s.output.as_ref().unwrap().num_rows() <= 5));
        assert!(demo.schema_string().contains(" |-- amount: Float64"));
    }

    #[tokio::test]
    async fn failing_steps_do_not_stop_the_sequence() {
        let schema = Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, true),
            Field::new("price", DataType::Float64, true),
        ]));
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from(vec![1])),
                Arc::new(Float64Array::from(vec![5.0])),
            ],
        )
        .unwrap();
        let demo = TransformDemo::new(create_session(), Table::try_new(schema, vec![batch]).unwrap());

        let steps = demo.run().await;
        assert_eq!(5, steps.len());
        assert_eq!(1, steps[0].output.as_ref().unwrap().num_rows());
        for step in &steps[1..] {
            assert!(
                matches!(step.output, Err(TransformError::MissingColumn { .. })),
                "{}",
                step.title
            );
        }
    }
}
