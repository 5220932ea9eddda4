use tracing::debug;

use crate::adapters::ProducerStage;
use crate::core::{downcast_ref, Contract, Element, Error, Flow, Map, Produce, Result};
use crate::pipeline::{flatten, Pipeline, Source};

/// Outcome of a rewrite that may not apply.
#[derive(Debug)]
pub enum Rewritten<T> {
    /// Nothing to rewrite.
    Unchanged(T),
    /// Everything up to a filled cache became a replay of it.
    Replayed(Source),
}

impl<T> Rewritten<T> {
    pub fn is_replayed(&self) -> bool {
        matches!(self, Rewritten::Replayed(_))
    }
}

/// Produces the persisted output of a cached element.
#[derive(Debug)]
pub struct CacheReplay {
    cached: Box<dyn Element>,
}

impl CacheReplay {
    /// The element must expose the cache capability.
    pub fn new(cached: Box<dyn Element>) -> Result<Self> {
        if cached.as_cache().is_none() {
            return Err(Error::mismatch(&cached, Contract::Produce));
        }
        Ok(Self { cached })
    }
}

impl Produce for CacheReplay {
    fn produce(&mut self) -> Result<Flow> {
        match self.cached.as_cache() {
            Some(cache) => cache.replay(),
            None => Err(Error::mismatch(&self.cached, Contract::Produce)),
        }
    }
}

impl Element for CacheReplay {
    fn as_produce(&mut self) -> Option<&mut dyn Produce> {
        Some(self)
    }

    fn eq_element(&self, other: &dyn Element) -> bool {
        downcast_ref::<CacheReplay>(other)
            .is_some_and(|other| self.cached.eq_element(other.cached.as_ref()))
    }

    fn update_static(&self, metadata: &mut Map) -> Result<()> {
        self.cached.update_static(metadata)
    }
}

/// Replace everything up to the last filled cache with a replay of it.
///
/// The list is flattened first and scanned right to left. Without a filled
/// cache the flattened list comes back unchanged.
pub fn rewrite_cached(
    elements: Vec<Box<dyn Element>>,
) -> Result<Rewritten<Vec<Box<dyn Element>>>> {
    let mut elements = flatten(elements)?;
    let filled = elements.iter().rposition(|element| {
        element
            .as_cache()
            .is_some_and(|cache| cache.cache_exists())
    });
    let Some(index) = filled else {
        return Ok(Rewritten::Unchanged(elements));
    };
    let mut tail = elements.split_off(index).into_iter();
    let Some(cached) = tail.next() else {
        return Ok(Rewritten::Unchanged(elements));
    };
    let rest: Vec<Box<dyn Element>> = tail.collect();
    debug!(dropped = elements.len(), remaining = rest.len(), "replaying filled cache");
    let head = ProducerStage::new(Box::new(CacheReplay::new(cached)?))?;
    Ok(Rewritten::Replayed(Source::from_parts(head, Pipeline::new(rest)?)))
}
