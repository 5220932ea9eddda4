//! Small reusable stages.
//!
//! Producers, processors, a result cache and a static metadata setter. They
//! implement the contracts from [`crate::core`] directly and can be placed in
//! any pipeline.

mod cache;
mod metadata;
mod processors;
mod sources;

pub use cache::Cache;
pub use metadata::SetMetadata;
pub use processors::{Call, Filter, FnRun, Slice};
pub use sources::{CountFrom, FnSource, Values};
