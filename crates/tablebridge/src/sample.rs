use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{Days, NaiveDate};
use datafusion::arrow::array::{Date32Array, Float64Array, Int64Array, StringArray};
use datafusion::arrow::datatypes::{DataType, Date32Type, Field, Schema, SchemaRef};
use datafusion::arrow::error::ArrowError;
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::prelude::{CsvReadOptions, SessionContext};
use tracing::{info, warn};

use crate::errors::ReadError;
use crate::table::Table;

/// Relative path of the demonstration sample, resolved against the working
/// directory.
pub const DEFAULT_SAMPLE_PATH: &str = "data/sample_data.csv";

/// Supplies a table to use when the sample file can't be read.
pub trait DefaultData: Send + Sync {
    fn default_table(&self) -> Result<Table, ArrowError>;
}

/// The fixed ten row sample: `id`, `category`, `amount`, `date`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FixedSample;

impl FixedSample {
    pub const CATEGORIES: [&'static str; 10] = ["A", "B", "A", "C", "B", "A", "C", "B", "A", "D"];
    pub const AMOUNTS: [f64; 10] = [
        120.5, 85.2, 200.0, 65.7, 150.3, 95.6, 180.2, 110.4, 75.9, 220.1,
    ];

    pub fn schema() -> SchemaRef {
        Arc::new(Schema::new(vec![
            Field::new("id", DataType::Int64, false),
            Field::new("category", DataType::Utf8, false),
            Field::new("amount", DataType::Float64, false),
            Field::new("date", DataType::Date32, false),
        ]))
    }
}

impl DefaultData for FixedSample {
    fn default_table(&self) -> Result<Table, ArrowError> {
        let start = NaiveDate::from_ymd_opt(2023, 1, 1)
            .ok_or_else(|| ArrowError::ComputeError("invalid start date".to_string()))?;
        let dates = (0..10u64)
            .map(|offset| {
                start
                    .checked_add_days(Days::new(offset))
                    .map(Date32Type::from_naive_date)
                    .ok_or_else(|| ArrowError::ComputeError("date out of range".to_string()))
            })
            .collect::<Result<Vec<_>, _>>()?;

        let schema = Self::schema();
        let batch = RecordBatch::try_new(
            schema.clone(),
            vec![
                Arc::new(Int64Array::from_iter_values(1..=10)),
                Arc::new(StringArray::from(Self::CATEGORIES.to_vec())),
                Arc::new(Float64Array::from(Self::AMOUNTS.to_vec())),
                Arc::new(Date32Array::from(dates)),
            ],
        )?;
        Table::try_new(schema, vec![batch])
    }
}

/// Loads the demonstration sample from a local CSV file.
pub struct SampleLoader {
    path: PathBuf,
    fallback: Option<Box<dyn DefaultData>>,
}

impl Default for SampleLoader {
    fn default() -> Self {
        Self::new(DEFAULT_SAMPLE_PATH)
    }
}

impl SampleLoader {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        SampleLoader {
            path: path.into(),
            fallback: None,
        }
    }

    /// Use `provider` when the file can't be read. Without a provider, load
    /// failures are returned to the caller.
    pub fn with_fallback(mut self, provider: impl DefaultData + 'static) -> Self {
        self.fallback = Some(Box::new(provider));
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self, ctx: &SessionContext) -> Result<Table, ReadError> {
        match self.read_csv(ctx).await {
            Ok(table) => {
                info!(path = %self.path.display(), rows = table.num_rows(), "loaded sample data");
                Ok(table)
            }
            Err(e) => match &self.fallback {
                Some(provider) => {
                    warn!(%e, "using default data for demonstration purposes");
                    Ok(provider.default_table()?)
                }
                None => Err(e),
            },
        }
    }

    async fn read_csv(&self, ctx: &SessionContext) -> Result<Table, ReadError> {
        let path = self.path.to_string_lossy().to_string();
        let to_err = |source| ReadError::SampleFile {
            path: path.clone(),
            source,
        };

        let opts = CsvReadOptions::new().has_header(true).file_extension("");
        let df = ctx.read_csv(path.as_str(), opts).await.map_err(to_err)?;
        let schema: SchemaRef = Arc::new(df.schema().into());
        let batches = df.collect().await.map_err(to_err)?;
        Ok(Table::try_new(schema, batches)?)
    }
}
