#[derive(Debug, thiserror::Error)]
pub enum TransformError {
    #[error("Table '{0}' is not bound in the session")]
    UnboundTable(String),

    #[error("Missing column '{column}', available: [{available}]")]
    MissingColumn { column: String, available: String },

    #[error(transparent)]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
}

pub type Result<T, E = TransformError> = std::result::Result<T, E>;
