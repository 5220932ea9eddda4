//! # Capability-adapting pipelines for Rust
//!
//! This crate composes heterogeneous processing elements into lazy pipelines.
//! An element advertises whichever capabilities it has (transforming single
//! values, producing a flow, running over a flow, accumulating values) and
//! every composite adapts its members to the one contract it needs.
//!
//! ## Core Concepts
//!
//! - **Flow**: a lazy, pull-based sequence of [`Value`](crate::core::Value)s
//! - **Element**: anything that exposes one or more capabilities
//! - **Pipeline**: a chain of run stages, itself an element
//! - **Source**: a producer followed by a pipeline
//! - **Split**: fans one input out to several branches
//! - **Rewrites**: cache replay and head merging, applied at construction
//!
//! ## Example
//!
//! ```rust
//! use pipeweld::prelude::*;
//!
//! fn main() -> Result<()> {
//!     let mut source = Source::new(vec![
//!         Box::new(CountFrom::new(1)),
//!         Box::new(Call::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)))),
//!         Box::new(Slice::new(3)),
//!     ])?;
//!
//!     let out: Vec<Value> = source.produce()?.collect::<Result<_>>()?;
//!     assert_eq!(out, vec![Value::Int(2), Value::Int(4), Value::Int(6)]);
//!     Ok(())
//! }
//! ```

pub mod adapters;
pub mod core;
pub mod elements;
pub mod pipeline;
pub mod rewrite;
pub mod split;

// Re-export commonly used items
pub mod prelude {
    pub use crate::core::{
        flow_from, Element, Error, Fill, FillCompute, FillInto, FillRequest, FillStatus, Flow,
        Map, Produce, Result, Run, Transform, Value, CONTINUE, STOP,
    };
    pub use crate::elements::{Cache, Call, CountFrom, Filter, SetMetadata, Slice, Values};
    pub use crate::pipeline::{
        FillChain, FillComputePipeline, FillRequestPipeline, Pipeline, Source,
    };
    pub use crate::rewrite::merge_heads;
    pub use crate::split::{Split, SplitBranch, SplitConfig};
}

// Re-export main error type
pub use crate::core::{Error, Result};

#[cfg(feature = "metrics")]
pub mod metrics;

// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
