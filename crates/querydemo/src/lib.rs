//! Transform and query demonstrations over tables bound in a DataFusion
//! session.
//!
//! [`TransformDemo`] runs the dataframe-style steps over a single table.
//! [`QueryTemplate`] covers the SQL examples, each with typed parameters.

pub mod errors;
pub mod fixtures;
pub mod session;
pub mod templates;
pub mod transform;

pub use errors::TransformError;
pub use session::{bind_table, collect_table, create_session};
pub use templates::{QueryParam, QueryTemplate};
pub use transform::{TransformDemo, TransformStep};
