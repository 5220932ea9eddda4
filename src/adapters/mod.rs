//! Capability adapters.
//!
//! An adapter wraps an arbitrary [`Element`] and exposes exactly one
//! execution contract. Which of the element's capabilities backs that
//! contract is decided once, when the adapter is built; an element that
//! cannot be adapted is rejected right there with
//! [`Error::CapabilityMismatch`].
//!
//! | Adapter              | Contract    | Accepted from                                   |
//! |----------------------|-------------|-------------------------------------------------|
//! | [`TransformStage`]   | Transform   | transform                                       |
//! | [`ProducerStage`]    | Produce     | producer                                        |
//! | [`RunStage`]         | Run         | run, transform (mapped), fill-compute (drained) |
//! | [`FillComputeStage`] | FillCompute | fill-compute, fill-request                      |
//! | [`FillRequestStage`] | FillRequest | fill-request, fill-compute                      |
//! | [`FillIntoStage`]    | FillInto    | fill-into, transform, run (only on request)     |

mod fill;
mod run;
mod source_el;
mod transform;

pub use fill::{FillComputeStage, FillIntoStage, FillRequestConfig, FillRequestStage};
pub(crate) use fill::BufferedRequest;
pub use run::RunStage;
pub use source_el::ProducerStage;
pub use transform::TransformStage;

use std::cell::{Ref, RefCell, RefMut};
use std::fmt;
use std::rc::Rc;

use crate::core::{Contract, Element, Error, Result};

/// A stage object shared between its adapter and the flows it hands out.
///
/// Flows are `'static`, so a flow that must reach back into its stage (a
/// mapped transform, a buffered request loop) holds a clone of this handle.
/// Borrows are taken per call and never held across a yield.
#[derive(Clone)]
pub(crate) struct Node(Rc<RefCell<Box<dyn Element>>>);

impl Node {
    pub(crate) fn new(element: Box<dyn Element>) -> Self {
        Node(Rc::new(RefCell::new(element)))
    }

    pub(crate) fn get(&self) -> Result<Ref<'_, Box<dyn Element>>> {
        self.0
            .try_borrow()
            .map_err(|_| Error::StageBusy("stage is being modified".to_string()))
    }

    pub(crate) fn get_mut(&self) -> Result<RefMut<'_, Box<dyn Element>>> {
        self.0
            .try_borrow_mut()
            .map_err(|_| Error::StageBusy("stage is already in use".to_string()))
    }

    /// Take the element back. Fails while a flow still holds the handle.
    pub(crate) fn into_inner(self) -> Result<Box<dyn Element>> {
        Rc::try_unwrap(self.0)
            .map(RefCell::into_inner)
            .map_err(|_| Error::StageBusy("stage is still referenced by a live flow".to_string()))
    }

    pub(crate) fn eq_node(&self, other: &Node) -> bool {
        match (self.get(), other.get()) {
            (Ok(a), Ok(b)) => a.eq_element(b.as_ref()),
            _ => false,
        }
    }

    pub(crate) fn eq_element(&self, other: &dyn Element) -> bool {
        self.get().map(|el| el.eq_element(other)).unwrap_or(false)
    }

    pub(crate) fn update_static(&self, metadata: &mut crate::core::Map) -> Result<()> {
        self.get()?.update_static(metadata)
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.try_borrow() {
            Ok(el) => write!(f, "{:?}", el),
            Err(_) => write!(f, "<busy>"),
        }
    }
}

/// The element lost a capability it advertised at construction.
pub(crate) fn view_lost(element: &dyn Element, contract: Contract) -> Error {
    Error::mismatch(element, contract)
}
