//! Core contracts for pipeline stages.
//!
//! A stage object is anything implementing [`Element`]. An element advertises
//! the contracts it supports through capability views (`as_run`,
//! `as_fill_compute`, ...). Adapters in [`crate::adapters`] inspect those views
//! once, at construction, and expose exactly one contract afterwards.
//!
//! Flows are pull-based: nothing is computed until the consumer asks for the
//! next value.

use std::any::Any;
use std::fmt;
use std::ops::ControlFlow;

use crate::core::error::{Contract, Result};
use crate::core::value::{Map, Value};

/// A lazy, pull-based sequence of values.
///
/// Runtime failures travel inside the flow as `Err` items.
pub type Flow = Box<dyn Iterator<Item = Result<Value>>>;

/// Outcome of a single `fill`.
///
/// `Break` is the early-termination signal: the accumulator wants no more
/// values. It is not an error.
pub type FillStatus = ControlFlow<()>;

/// Continue filling.
pub const CONTINUE: FillStatus = ControlFlow::Continue(());

/// Stop filling.
pub const STOP: FillStatus = ControlFlow::Break(());

/// Build a flow from already computed values.
pub fn flow_from<I>(values: I) -> Flow
where
    I: IntoIterator<Item = Value>,
    I::IntoIter: 'static,
{
    Box::new(values.into_iter().map(Ok))
}

/// An empty flow.
pub fn empty_flow() -> Flow {
    Box::new(std::iter::empty())
}

/// A pure function from one value to one value.
pub trait Transform {
    fn apply(&self, value: Value) -> Result<Value>;
}

/// A stage with no input.
///
/// Each call starts a new, non-restartable flow.
pub trait Produce {
    fn produce(&mut self) -> Result<Flow>;
}

/// A stage mapping an input flow to an output flow.
///
/// # Examples
///
/// ```rust
/// use pipeweld::core::{Flow, Result, Run, Value};
///
/// struct Double;
///
/// impl Run for Double {
///     fn run(&mut self, flow: Flow) -> Result<Flow> {
///         Ok(Box::new(flow.map(|v| -> Result<Value> {
///             Ok(Value::Int(v?.as_int().unwrap_or(0) * 2))
///         })))
///     }
/// }
/// ```
pub trait Run {
    fn run(&mut self, flow: Flow) -> Result<Flow>;
}

/// Accepts values one at a time.
pub trait Fill {
    /// Accept a value. Returning [`STOP`] asks the caller to stop filling.
    fn fill(&mut self, value: Value) -> Result<FillStatus>;
}

/// An accumulator finalized once per epoch.
///
/// `compute` drains accumulated state into a flow; the next `fill` starts a
/// new epoch unless the stage keeps a baseline of its own.
pub trait FillCompute: Fill {
    fn compute(&mut self) -> Result<Flow>;
}

/// An accumulator that may be asked for results at any time.
pub trait FillRequest: Fill {
    /// Yield current results without necessarily discarding state.
    fn request(&mut self) -> Result<Flow>;

    /// Reset accumulated state.
    fn clear(&mut self) -> Result<()> {
        Ok(())
    }
}

/// Pushes a single (possibly transformed) value into a waiting accumulator.
pub trait FillInto {
    fn fill_into(&mut self, target: &mut dyn Fill, value: Value) -> Result<FillStatus>;
}

/// A stage backed by a persisted result.
pub trait Cached {
    /// True if a complete prior run exists.
    fn cache_exists(&self) -> bool;

    /// Replay persisted values in the order they were written.
    fn replay(&self) -> Result<Flow>;
}

/// Any object that can be placed in a pipeline.
///
/// All capability views default to `None`; an implementation overrides the
/// ones it supports, usually by returning `Some(self)`.
///
/// # Examples
///
/// ```rust
/// use pipeweld::core::{same_element, Element, Fill, FillCompute, FillStatus, Flow, Result, Value, CONTINUE, flow_from};
///
/// #[derive(Debug, PartialEq)]
/// struct Sum(i64);
///
/// impl Fill for Sum {
///     fn fill(&mut self, value: Value) -> Result<FillStatus> {
///         self.0 += value.data().as_int().unwrap_or(0);
///         Ok(CONTINUE)
///     }
/// }
///
/// impl FillCompute for Sum {
///     fn compute(&mut self) -> Result<Flow> {
///         Ok(flow_from([Value::Int(std::mem::take(&mut self.0))]))
///     }
/// }
///
/// impl Element for Sum {
///     fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
///         Some(self)
///     }
///
///     fn eq_element(&self, other: &dyn Element) -> bool {
///         same_element(self, other)
///     }
/// }
/// ```
pub trait Element: Any + fmt::Debug {
    fn as_transform(&self) -> Option<&dyn Transform> {
        None
    }

    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        None
    }

    fn as_run(&mut self) -> Option<&mut dyn Run> {
        None
    }

    fn as_fill_compute(&mut self) -> Option<&mut dyn FillCompute> {
        None
    }

    fn as_fill_request(&mut self) -> Option<&mut dyn FillRequest> {
        None
    }

    fn as_fill_into(&mut self) -> Option<&mut dyn FillInto> {
        None
    }

    fn as_cache(&self) -> Option<&dyn Cached> {
        None
    }

    /// Structural equality. Elements that cannot be compared are never equal,
    /// not even to themselves.
    fn eq_element(&self, _other: &dyn Element) -> bool {
        false
    }

    /// Contribute to construction-time metadata.
    fn update_static(&self, _metadata: &mut Map) -> Result<()> {
        Ok(())
    }

    /// Contracts this element advertises.
    fn contracts(&mut self) -> Vec<Contract> {
        let mut contracts = Vec::new();
        if self.as_transform().is_some() {
            contracts.push(Contract::Transform);
        }
        if self.as_produce().is_some() {
            contracts.push(Contract::Produce);
        }
        if self.as_run().is_some() {
            contracts.push(Contract::Run);
        }
        if self.as_fill_compute().is_some() {
            contracts.push(Contract::FillCompute);
        }
        if self.as_fill_request().is_some() {
            contracts.push(Contract::FillRequest);
        }
        if self.as_fill_into().is_some() {
            contracts.push(Contract::FillInto);
        }
        contracts
    }
}

/// `eq_element` for types with a `PartialEq` implementation.
pub fn same_element<T: Element + PartialEq>(this: &T, other: &dyn Element) -> bool {
    downcast_ref::<T>(other).is_some_and(|other| other == this)
}

/// Concrete type of an element, if it is `T`.
pub fn downcast_ref<T: Element>(element: &dyn Element) -> Option<&T> {
    let any: &dyn Any = element;
    any.downcast_ref::<T>()
}

/// Mutable concrete type of an element, if it is `T`.
pub fn downcast_mut<T: Element>(element: &mut dyn Element) -> Option<&mut T> {
    let any: &mut dyn Any = element;
    any.downcast_mut::<T>()
}
