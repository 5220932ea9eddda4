use tracing::debug;

use crate::adapters::ProducerStage;
use crate::core::{downcast_ref, Element, Error, Flow, Map, Produce, Result, Run};
use crate::pipeline::{flatten, Pipeline};
use crate::rewrite::{rewrite_cached, Rewritten};

/// A producer followed by a pipeline.
///
/// ```rust
/// use pipeweld::core::{Produce, Value};
/// use pipeweld::elements::{Call, CountFrom, Slice};
/// use pipeweld::pipeline::Source;
///
/// let mut source = Source::new(vec![
///     Box::new(CountFrom::new(1)),
///     Box::new(Slice::new(3)),
///     Box::new(Call::new(|v: Value| Ok(Value::Int(v.as_int().unwrap_or(0) * 2)))),
/// ])?;
/// let out: Vec<Value> = source.produce()?.collect::<Result<_, _>>()?;
/// assert_eq!(out, vec![Value::Int(2), Value::Int(4), Value::Int(6)]);
/// # Ok::<(), pipeweld::Error>(())
/// ```
#[derive(Debug)]
pub struct Source {
    head: ProducerStage,
    tail: Pipeline,
}

impl Source {
    /// The first element must produce; the rest must run.
    pub fn new(elements: Vec<Box<dyn Element>>) -> Result<Self> {
        let mut elements = flatten(elements)?.into_iter();
        let Some(first) = elements.next() else {
            return Err(Error::invalid("Source must contain at least one element"));
        };
        let head = ProducerStage::new(first)?;
        let tail = Pipeline::new(elements.collect())?;
        debug!(stages = tail.len() + 1, "source built");
        Ok(Self { head, tail })
    }

    pub(crate) fn from_parts(head: ProducerStage, tail: Pipeline) -> Self {
        Self { head, tail }
    }

    /// Number of stages, producer included.
    pub fn len(&self) -> usize {
        self.tail.len() + 1
    }

    pub fn is_empty(&self) -> bool {
        false
    }

    pub fn static_metadata(&self) -> Result<Map> {
        let mut metadata = Map::new();
        self.update_static(&mut metadata)?;
        Ok(metadata)
    }

    pub fn into_elements(self) -> Result<Vec<Box<dyn Element>>> {
        let mut elements = vec![self.head.into_inner()?];
        elements.extend(self.tail.into_elements()?);
        Ok(elements)
    }

    /// Start from the last filled cache, if there is one.
    pub fn rewrite_cached(self) -> Result<Source> {
        match rewrite_cached(self.into_elements()?)? {
            Rewritten::Unchanged(elements) => Source::new(elements),
            Rewritten::Replayed(source) => Ok(source),
        }
    }
}

impl Produce for Source {
    fn produce(&mut self) -> Result<Flow> {
        let flow = self.head.produce()?;
        self.tail.run(flow)
    }
}

impl PartialEq for Source {
    fn eq(&self, other: &Self) -> bool {
        self.head.node_eq(&other.head) && self.tail == other.tail
    }
}

impl Element for Source {
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<Source>(other).is_some_and(|other| self == other)
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.head.update_static(metadata)?;
        self.tail.update_static(metadata)
    }
}
