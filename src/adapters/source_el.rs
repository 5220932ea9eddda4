use crate::adapters::{view_lost, Node};
use crate::core::{downcast_ref, Contract, Element, Error, Flow, Produce, Result};
use crate::elements::FnSource;

/// Adapter exposing the Produce contract.
#[derive(Debug)]
pub struct ProducerStage {
    node: Node,
}

impl ProducerStage {
    /// Wrap an element that can produce values with no input.
    pub fn new(mut element: Box<dyn Element>) -> Result<Self> {
        if element.as_produce().is_none() {
            return Err(Error::unsupported(&mut *element, Contract::Produce));
        }
        Ok(Self {
            node: Node::new(element),
        })
    }

    /// Build directly from a generator function.
    pub fn from_fn<F>(f: F) -> Self
    where
        F: FnMut() -> Result<Flow> + 'static,
    {
        Self {
            node: Node::new(Box::new(FnSource::new(f))),
        }
    }

    pub fn into_inner(self) -> Result<Box<dyn Element>> {
        self.node.into_inner()
    }

    pub(crate) fn node_eq(&self, other: &ProducerStage) -> bool {
        self.node.eq_node(&other.node)
    }
}

impl Produce for ProducerStage {
    fn produce(&mut self) -> Result<Flow> {
        let mut el = self.node.get_mut()?;
        match el.as_produce() {
            Some(producer) => producer.produce(),
            None => Err(view_lost(el.as_ref(), Contract::Produce)),
        }
    }
}

impl Element for ProducerStage {
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<ProducerStage>(other).is_some_and(|other| self.node_eq(other))
    }

    fn update_static(&self, metadata: &mut crate::core::Map) -> Result<()> {
        self.node.update_static(metadata)
    }
}
