//! Core abstractions shared by the pipeline and the drivers.
//!
//! - [`value`]: owned SQL values and row sets
//! - [`identifier`]: identifier validation and quoting
//! - [`traits`]: executor, reader, writer and connector capabilities

pub mod identifier;
pub mod traits;
pub mod value;

pub use traits::{Connector, Executor, SourceReader, TargetWriter};
pub use value::{RowSet, SqlNullType, SqlValue};
