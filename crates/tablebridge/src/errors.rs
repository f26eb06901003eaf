use datafusion::arrow::datatypes::DataType;

/// Failure to establish a handle to the store.
#[derive(Debug, thiserror::Error)]
pub enum ConnectionError {
    #[error("Failed to connect to Postgres instance: {0}")]
    TokioPostgres(#[from] tokio_postgres::Error),

    #[error("Missing tokio runtime for the Postgres connection task")]
    MissingRuntime,
}

/// Failure to produce a table from the store or from a local file.
#[derive(Debug, thiserror::Error)]
pub enum ReadError {
    #[error("Table not found: {0}")]
    TableNotFound(String),

    #[error("Failed to query Postgres: {0}")]
    Query(#[from] tokio_postgres::Error),

    #[error("Unsupported Postgres type '{pg_type}' for column '{column}'")]
    UnsupportedPostgresType { column: String, pg_type: String },

    #[error("Failed to load sample data from '{path}': {source}")]
    SampleFile {
        path: String,
        #[source]
        source: datafusion::error::DataFusionError,
    },

    #[error(transparent)]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
}

/// Failure to persist a table.
#[derive(Debug, thiserror::Error)]
pub enum WriteError {
    #[error("Table '{0}' already exists")]
    TableExists(String),

    #[error("Schema mismatch appending to '{table}': expected [{expected}], got [{actual}]")]
    SchemaMismatch {
        table: String,
        expected: String,
        actual: String,
    },

    #[error("Unsupported arrow type for column '{0}': {1}")]
    UnsupportedArrowType(String, DataType),

    #[error("Failed to write to Postgres: {0}")]
    Postgres(#[from] tokio_postgres::Error),

    #[error(transparent)]
    DataFusion(#[from] datafusion::error::DataFusionError),

    #[error(transparent)]
    Arrow(#[from] datafusion::arrow::error::ArrowError),
}

pub type Result<T, E = ReadError> = std::result::Result<T, E>;
