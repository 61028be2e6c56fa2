//! Per-table extract, transform and load stages.
//!
//! - [`extract`]: builds the source query (filter plus incremental cursor) and reads rows
//! - [`transform`]: applies masking rules and computes the watermark candidate
//! - [`load`]: shapes rows per the load descriptor and upserts them page by page
//!
//! Each stage is a free function over the core traits, so the orchestrator can
//! drive them against PostgreSQL or the in-memory backend alike.

pub mod extract;
pub mod load;
pub mod transform;

pub use extract::{extract, CursorPredicate, ExtractQuery};
pub use load::{load, shape_rows, LoadOutcome, UpsertPlan};
pub use transform::{transform, Transformed};
