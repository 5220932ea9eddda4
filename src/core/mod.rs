//! Core traits and types for the pipeweld library.
//!
//! This module contains the value model, the stage contracts and the error
//! type that every other module builds on.

pub mod error;
pub mod metadata;
pub mod traits;
pub mod value;

// Re-export core items
pub use error::{Contract, Error, IntoError, Result};
pub use traits::{
    downcast_mut, downcast_ref, empty_flow, flow_from, same_element, Cached, Element, Fill,
    FillCompute, FillInto, FillRequest, FillStatus, Flow, Produce, Run, Transform, CONTINUE, STOP,
};
pub use value::{get_data, get_data_metadata, get_metadata, Map, Value};
