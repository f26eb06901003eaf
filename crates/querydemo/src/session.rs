use std::sync::Arc;

use datafusion::arrow::datatypes::SchemaRef;
use datafusion::dataframe::DataFrame;
use datafusion::prelude::{SessionConfig, SessionContext};
use tablebridge::Table;
use tracing::debug;

use crate::errors::Result;

/// Create the query session tables get bound into.
pub fn create_session() -> SessionContext {
    let config = SessionConfig::new()
        .with_target_partitions(1)
        .with_information_schema(true);
    SessionContext::new_with_config(config)
}

/// Bind `table` under `name`, replacing any earlier binding.
pub fn bind_table(ctx: &SessionContext, name: &str, table: &Table) -> Result<()> {
    ctx.deregister_table(name)?;
    ctx.register_table(name, Arc::new(table.clone().into_mem_table()?))?;
    debug!(%name, rows = table.num_rows(), "bound table");
    Ok(())
}

/// Execute a dataframe into a table, keeping the schema even when no rows
/// come back.
pub async fn collect_table(df: DataFrame) -> Result<Table> {
    let schema: SchemaRef = Arc::new(df.schema().into());
    let batches = df.collect().await?;
    Ok(Table::try_new(schema, batches)?)
}
