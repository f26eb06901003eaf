pub mod memory;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;

use crate::errors::{ReadError, WriteError};
use crate::table::Table;

/// What to read from a store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReadSource {
    /// Every row of the named table.
    Table(String),
    /// The result of a literal SQL query, evaluated by the store.
    Query(String),
}

impl ReadSource {
    pub fn table(name: impl Into<String>) -> Self {
        ReadSource::Table(name.into())
    }

    pub fn query(sql: impl Into<String>) -> Self {
        ReadSource::Query(sql.into())
    }
}

impl fmt::Display for ReadSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ReadSource::Table(name) => write!(f, "table '{name}'"),
            ReadSource::Query(sql) => write!(f, "query '{}'", sql.trim()),
        }
    }
}

/// How a write behaves when the target table already exists.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Refuse to write if the target exists.
    Fail,
    /// Drop the existing target, then write.
    #[default]
    Replace,
    /// Add rows to the existing target, creating it if missing.
    Append,
}

impl WritePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            WritePolicy::Fail => "fail",
            WritePolicy::Replace => "replace",
            WritePolicy::Append => "append",
        }
    }
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for WritePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(match s.to_ascii_lowercase().as_str() {
            "fail" | "error" => WritePolicy::Fail,
            "replace" | "overwrite" => WritePolicy::Replace,
            "append" => WritePolicy::Append,
            other => return Err(format!("unknown write policy: {other}")),
        })
    }
}

/// A place tables can be read from and written to.
#[async_trait]
pub trait TableStore: Send + Sync {
    async fn read(&self, source: &ReadSource) -> Result<Table, ReadError>;

    /// Persist `table` under `name`, returning the number of rows written.
    async fn write(&self, name: &str, table: &Table, policy: WritePolicy)
        -> Result<u64, WriteError>;
}
