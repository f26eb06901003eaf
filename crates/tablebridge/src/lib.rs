//! Moving tables between local files, Postgres, and memory.
//!
//! A [`TableStore`] reads a [`Table`] by name or query and writes one back
//! under a [`WritePolicy`]. [`postgres::PostgresStore`] talks to a real
//! database, [`MemoryStore`] keeps everything in process.

pub mod config;
pub mod errors;
pub mod postgres;
pub mod sample;
pub mod store;
pub mod table;

pub use config::DatabaseConfig;
pub use errors::{ConnectionError, ReadError, WriteError};
pub use sample::{DefaultData, FixedSample, SampleLoader};
pub use store::memory::MemoryStore;
pub use store::{ReadSource, TableStore, WritePolicy};
pub use table::Table;
