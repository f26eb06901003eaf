use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::prelude::SessionContext;
use parking_lot::RwLock;
use tracing::{debug, info};

use super::{ReadSource, TableStore, WritePolicy};
use crate::errors::{ReadError, WriteError};
use crate::table::{same_fields, Table};

/// A process-local store.
///
/// Queries are evaluated with DataFusion over a snapshot of every stored
/// table.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: RwLock<HashMap<String, Table>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn get(&self, name: &str) -> Option<Table> {
        self.tables.read().get(name).cloned()
    }

    fn snapshot_context(&self) -> Result<SessionContext, ReadError> {
        let ctx = SessionContext::new();
        let tables = self.tables.read().clone();
        for (name, table) in tables {
            ctx.register_table(name.as_str(), Arc::new(table.into_mem_table()?))?;
        }
        Ok(ctx)
    }
}

#[async_trait]
impl TableStore for MemoryStore {
    async fn read(&self, source: &ReadSource) -> Result<Table, ReadError> {
        let table = match source {
            ReadSource::Table(name) => self
                .get(name)
                .ok_or_else(|| ReadError::TableNotFound(name.clone()))?,
            ReadSource::Query(sql) => {
                let ctx = self.snapshot_context()?;
                debug!(%sql, "evaluating query against memory store");
                let df = ctx.sql(sql).await?;
                let schema: SchemaRef = Arc::new(df.schema().into());
                let batches = df.collect().await?;
                Table::try_new(schema, batches)?
            }
        };
        info!(%source, rows = table.num_rows(), "read from memory store");
        Ok(table)
    }

    async fn write(
        &self,
        name: &str,
        table: &Table,
        policy: WritePolicy,
    ) -> Result<u64, WriteError> {
        let mut tables = self.tables.write();
        match policy {
            WritePolicy::Fail if tables.contains_key(name) => {
                return Err(WriteError::TableExists(name.to_string()));
            }
            WritePolicy::Append => match tables.get_mut(name) {
                Some(existing) => {
                    if !same_fields(existing.schema(), table.schema()) {
                        return Err(WriteError::SchemaMismatch {
                            table: name.to_string(),
                            expected: existing.column_names().join(", "),
                            actual: table.column_names().join(", "),
                        });
                    }
                    existing.append(table.clone())?;
                }
                None => {
                    tables.insert(name.to_string(), table.clone());
                }
            },
            WritePolicy::Fail | WritePolicy::Replace => {
                tables.insert(name.to_string(), table.clone());
            }
        }
        drop(tables);

        let rows = table.num_rows() as u64;
        info!(table = %name, %policy, rows, "wrote to memory store");
        Ok(rows)
    }
}
